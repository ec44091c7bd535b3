//! Tokenizer for IMAP server responses.

use crate::{Error, Result};

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Atom (unquoted string without special characters).
    Atom(&'a str),
    /// Quoted string.
    QuotedString(String),
    /// Literal string with size prefix {n}.
    Literal(Vec<u8>),
    /// Number.
    Number(u32),
    /// Opening parenthesis.
    LParen,
    /// Closing parenthesis.
    RParen,
    /// Opening bracket.
    LBracket,
    /// Closing bracket.
    RBracket,
    /// Space character.
    Space,
    /// Asterisk (untagged response prefix).
    Asterisk,
    /// Plus (continuation response prefix).
    Plus,
    /// NIL.
    Nil,
    /// CRLF line ending.
    Crlf,
    /// End of input.
    Eof,
}

/// IMAP lexer state.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Advances by one byte and returns it.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Returns the rest of the current line as text, without CRLF.
    pub fn rest_of_line(&mut self) -> String {
        let input = self.input;
        let rest = &input[self.pos..];
        let end = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap_or(rest.len());
        self.skip(end);
        String::from_utf8_lossy(&rest[..end]).trim().to_string()
    }

    /// Consumes raw bytes up to and including `delimiter`, returning them
    /// without the delimiter.
    pub fn take_until(&mut self, delimiter: u8) -> Result<&'a [u8]> {
        let input = self.input;
        let start = self.pos;
        while let Some(b) = self.advance() {
            if b == delimiter {
                return Ok(&input[start..self.pos - 1]);
            }
        }
        Err(self.error(&format!("Expected {:?}", char::from(delimiter))))
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'\r' => {
                if self.peek_at(1) == Some(b'\n') {
                    self.skip(2);
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("Expected LF after CR"))
                }
            }
            b' ' => self.single(Token::Space),
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'[' => self.single(Token::LBracket),
            b']' => self.single(Token::RBracket),
            b'*' => self.single(Token::Asterisk),
            b'+' => self.single(Token::Plus),
            b'"' => self.read_quoted_string(),
            b'{' => self.read_literal(),
            b'0'..=b'9' => self.read_number_or_atom(),
            _ if is_atom_char(byte) => self.read_atom(),
            _ => Err(self.error(&format!("Unexpected character: {byte:#04x}"))),
        }
    }

    fn single(&mut self, token: Token<'a>) -> Result<Token<'a>> {
        self.advance();
        Ok(token)
    }

    fn read_quoted_string(&mut self) -> Result<Token<'a>> {
        self.advance();
        let mut result = Vec::new();

        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => result.push(c),
                    Some(c) => return Err(self.error(&format!("Invalid escape: \\{c}"))),
                    None => return Err(self.error("Unexpected EOF in quoted string")),
                },
                Some(c) => result.push(c),
                None => return Err(self.error("Unexpected EOF in quoted string")),
            }
        }

        String::from_utf8(result)
            .map(Token::QuotedString)
            .map_err(|_| self.error("Invalid UTF-8 in quoted string"))
    }

    fn read_literal(&mut self) -> Result<Token<'a>> {
        self.advance();
        let digits = self.take_until(b'}')?;
        let size: usize = std::str::from_utf8(digits)
            .ok()
            .map(|s| s.trim_end_matches('+'))
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("Invalid literal size"))?;

        if self.advance() != Some(b'\r') || self.advance() != Some(b'\n') {
            return Err(self.error("Expected CRLF after literal size"));
        }
        if self.pos + size > self.input.len() {
            return Err(self.error("Incomplete literal data"));
        }

        let data = self.input[self.pos..self.pos + size].to_vec();
        self.skip(size);
        Ok(Token::Literal(data))
    }

    fn read_number_or_atom(&mut self) -> Result<Token<'a>> {
        let atom = self.read_atom_str()?;
        if atom.bytes().all(|b| b.is_ascii_digit()) {
            atom.parse()
                .map(Token::Number)
                .map_err(|_| self.error("Number too large"))
        } else {
            Ok(Token::Atom(atom))
        }
    }

    fn read_atom(&mut self) -> Result<Token<'a>> {
        let atom = self.read_atom_str()?;
        if atom.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(atom))
        }
    }

    fn read_atom_str(&mut self) -> Result<&'a str> {
        let input = self.input;
        let start = self.pos;
        while self.peek().is_some_and(is_atom_char) {
            self.advance();
        }
        std::str::from_utf8(&input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))
    }

    /// Creates a parse error at the current position.
    pub fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Expects and consumes a space.
    pub fn expect_space(&mut self) -> Result<()> {
        match self.next_token()? {
            Token::Space => Ok(()),
            token => Err(self.error(&format!("Expected space, got {token:?}"))),
        }
    }

    /// Reads a number.
    pub fn read_number(&mut self) -> Result<u32> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("Expected number, got {token:?}"))),
        }
    }

    /// Skips one value: an atom, string, literal or parenthesized list.
    pub fn skip_value(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.next_token()? {
                Token::LParen => depth += 1,
                Token::RParen if depth > 0 => depth -= 1,
                Token::Eof | Token::Crlf | Token::RParen => {
                    return Err(self.error("Unexpected end of value"));
                }
                _ => {}
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }
}

/// Returns true if the byte can appear in an atom.
///
/// `\` is included so flags like `\Seen` lex as single atoms; `[` and `]`
/// are excluded so section specifiers tokenize separately.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x27 | 0x2B..=0x5A | 0x5C | 0x5E..=0x7A | 0x7C | 0x7E)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens(input: &[u8]) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                return out;
            }
            out.push(token);
        }
    }

    #[test]
    fn flags_and_sections() {
        assert_eq!(
            tokens(b"(\\Seen) BODY[]"),
            vec![
                Token::LParen,
                Token::Atom("\\Seen"),
                Token::RParen,
                Token::Space,
                Token::Atom("BODY"),
                Token::LBracket,
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn quoted_string_escapes() {
        assert_eq!(
            tokens(br#""a \"b\" \\c""#),
            vec![Token::QuotedString("a \"b\" \\c".into())]
        );
    }

    #[test]
    fn literal_reads_exact_bytes() {
        assert_eq!(
            tokens(b"{5}\r\n(a)\r\n)"),
            vec![Token::Literal(b"(a)\r\n".to_vec()), Token::RParen]
        );
        assert!(Lexer::new(b"{10}\r\nshort").next_token().is_err());
    }

    #[test]
    fn numbers_nil_and_crlf() {
        assert_eq!(
            tokens(b"42 NIL 4a\r\n"),
            vec![
                Token::Number(42),
                Token::Space,
                Token::Nil,
                Token::Space,
                Token::Atom("4a"),
                Token::Crlf,
            ]
        );
    }

    #[test]
    fn skip_nested_value_with_literal() {
        let mut lexer = Lexer::new(b"(\"x\" (NIL {2}\r\n)))) UID 7");
        lexer.skip_value().unwrap();
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("UID"));
    }
}
