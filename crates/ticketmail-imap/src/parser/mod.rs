//! Response parsing for the subset of IMAP the client speaks.

mod lexer;

pub use lexer::{Lexer, Token, is_atom_char};

use chrono::{DateTime, FixedOffset};

use crate::Result;

/// Status of a tagged or untagged condition response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// OK
    Ok,
    /// NO
    No,
    /// BAD
    Bad,
    /// BYE
    Bye,
    /// PREAUTH
    PreAuth,
}

impl Status {
    fn from_atom(atom: &str) -> Option<Self> {
        match atom.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "BYE" => Some(Self::Bye),
            "PREAUTH" => Some(Self::PreAuth),
            _ => None,
        }
    }
}

/// Bracketed response code, e.g. `[UIDVALIDITY 3857529045]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// UIDVALIDITY of the selected mailbox.
    UidValidity(u32),
    /// Predicted next UID.
    UidNext(u32),
    /// Capability list sent inline.
    Capability(Vec<String>),
    /// Any other code, raw.
    Other(String),
}

/// Data items of a FETCH response the client asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchData {
    /// UID item.
    pub uid: Option<u32>,
    /// FLAGS item.
    pub flags: Vec<String>,
    /// INTERNALDATE item.
    pub internal_date: Option<DateTime<FixedOffset>>,
    /// `BODY[]` or `RFC822` contents.
    pub body: Option<Vec<u8>>,
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// OK/NO/BAD/BYE/PREAUTH with optional code.
    Condition {
        /// Status keyword.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY list.
    Capability(Vec<String>),
    /// `n EXISTS`
    Exists(u32),
    /// SEARCH results.
    Search(Vec<u32>),
    /// `n FETCH (...)`
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Parsed data items.
        data: FetchData,
    },
    /// Anything the client does not interpret.
    Other(String),
}

/// A complete server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Completion of a tagged command.
    Tagged {
        /// Command tag.
        tag: String,
        /// Completion status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged data.
    Untagged(UntaggedResponse),
    /// Continuation request (`+ ...`).
    Continuation(String),
}

/// Parses one complete response as returned by the framed reader.
///
/// # Errors
///
/// Returns [`crate::Error::Parse`] for malformed input.
pub fn parse_response(input: &[u8]) -> Result<Response> {
    let mut lexer = Lexer::new(input);

    match lexer.next_token()? {
        Token::Asterisk => {
            lexer.expect_space()?;
            parse_untagged(&mut lexer).map(Response::Untagged)
        }
        Token::Plus => Ok(Response::Continuation(lexer.rest_of_line())),
        Token::Atom(tag) => {
            let tag = tag.to_string();
            lexer.expect_space()?;
            let status = match lexer.next_token()? {
                Token::Atom(atom) => Status::from_atom(atom),
                _ => None,
            }
            .ok_or_else(|| lexer.error("Expected status after tag"))?;
            let (code, text) = parse_condition_tail(&mut lexer)?;
            Ok(Response::Tagged {
                tag,
                status,
                code,
                text,
            })
        }
        token => Err(lexer.error(&format!("Unexpected response start: {token:?}"))),
    }
}

fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    match lexer.next_token()? {
        Token::Number(n) => {
            lexer.expect_space()?;
            let Token::Atom(kind) = lexer.next_token()? else {
                return Err(lexer.error("Expected keyword after number"));
            };
            match kind.to_ascii_uppercase().as_str() {
                "EXISTS" => Ok(UntaggedResponse::Exists(n)),
                "FETCH" => {
                    lexer.expect_space()?;
                    let data = parse_fetch(lexer)?;
                    Ok(UntaggedResponse::Fetch { seq: n, data })
                }
                other => Ok(UntaggedResponse::Other(format!(
                    "{n} {other} {}",
                    lexer.rest_of_line()
                ))),
            }
        }
        Token::Atom(keyword) => {
            if let Some(status) = Status::from_atom(keyword) {
                let (code, text) = parse_condition_tail(lexer)?;
                return Ok(UntaggedResponse::Condition { status, code, text });
            }
            match keyword.to_ascii_uppercase().as_str() {
                "CAPABILITY" => Ok(UntaggedResponse::Capability(parse_atoms(lexer)?)),
                "SEARCH" => parse_search(lexer).map(UntaggedResponse::Search),
                other => Ok(UntaggedResponse::Other(format!(
                    "{other} {}",
                    lexer.rest_of_line()
                ))),
            }
        }
        token => Err(lexer.error(&format!("Unexpected untagged data: {token:?}"))),
    }
}

/// Parses `[code] text` after a status keyword.
fn parse_condition_tail(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
    if lexer.peek() == Some(b' ') {
        lexer.advance();
    }
    let code = if lexer.peek() == Some(b'[') {
        lexer.advance();
        Some(parse_response_code(lexer)?)
    } else {
        None
    };
    Ok((code, lexer.rest_of_line()))
}

fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    let raw = lexer.take_until(b']')?;
    let raw = String::from_utf8_lossy(raw);
    let mut words = raw.split_ascii_whitespace();
    let name = words.next().unwrap_or_default().to_ascii_uppercase();
    let number = |value: Option<&str>| value.and_then(|v| v.parse::<u32>().ok());

    Ok(match name.as_str() {
        "UIDVALIDITY" => number(words.next())
            .map_or_else(|| ResponseCode::Other(raw.to_string()), ResponseCode::UidValidity),
        "UIDNEXT" => number(words.next())
            .map_or_else(|| ResponseCode::Other(raw.to_string()), ResponseCode::UidNext),
        "CAPABILITY" => ResponseCode::Capability(words.map(str::to_string).collect()),
        _ => ResponseCode::Other(raw.to_string()),
    })
}

fn parse_atoms(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    let mut atoms = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::Space => {}
            Token::Atom(atom) => atoms.push(atom.to_string()),
            Token::Number(n) => atoms.push(n.to_string()),
            Token::Crlf | Token::Eof => return Ok(atoms),
            token => return Err(lexer.error(&format!("Unexpected token: {token:?}"))),
        }
    }
}

fn parse_search(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::Space => {}
            Token::Number(n) => ids.push(n),
            Token::Crlf | Token::Eof => return Ok(ids),
            // Extensions such as (MODSEQ n) trail the id list.
            Token::LParen => {
                lexer.take_until(b')')?;
            }
            token => return Err(lexer.error(&format!("Unexpected token in SEARCH: {token:?}"))),
        }
    }
}

fn parse_fetch(lexer: &mut Lexer<'_>) -> Result<FetchData> {
    if lexer.next_token()? != Token::LParen {
        return Err(lexer.error("Expected ( after FETCH"));
    }

    let mut data = FetchData::default();
    loop {
        match lexer.next_token()? {
            Token::RParen => return Ok(data),
            Token::Space => {}
            Token::Atom(name) => match name.to_ascii_uppercase().as_str() {
                "UID" => {
                    lexer.expect_space()?;
                    data.uid = Some(lexer.read_number()?);
                }
                "FLAGS" => {
                    lexer.expect_space()?;
                    data.flags = parse_flag_list(lexer)?;
                }
                "INTERNALDATE" => {
                    lexer.expect_space()?;
                    let Token::QuotedString(date) = lexer.next_token()? else {
                        return Err(lexer.error("Expected quoted INTERNALDATE"));
                    };
                    data.internal_date = Some(
                        parse_internal_date(&date)
                            .ok_or_else(|| lexer.error(&format!("Invalid INTERNALDATE: {date}")))?,
                    );
                }
                "BODY" | "RFC822" => {
                    let section = if lexer.peek() == Some(b'[') {
                        lexer.advance();
                        Some(lexer.take_until(b']')?)
                    } else {
                        None
                    };
                    if lexer.peek() == Some(b'<') {
                        lexer.take_until(b'>')?;
                    }
                    lexer.expect_space()?;
                    let value = match lexer.next_token()? {
                        Token::Literal(bytes) => Some(bytes),
                        Token::QuotedString(text) => Some(text.into_bytes()),
                        Token::Nil => None,
                        Token::LParen => {
                            // BODY without a section is a body structure.
                            skip_list(lexer)?;
                            continue;
                        }
                        token => {
                            return Err(lexer.error(&format!("Unexpected body value: {token:?}")));
                        }
                    };
                    let whole_message = name.eq_ignore_ascii_case("RFC822")
                        || section.is_some_and(<[u8]>::is_empty);
                    if whole_message {
                        data.body = value;
                    }
                }
                _ => {
                    lexer.expect_space()?;
                    lexer.skip_value()?;
                }
            },
            token => return Err(lexer.error(&format!("Unexpected FETCH item: {token:?}"))),
        }
    }
}

fn skip_list(lexer: &mut Lexer<'_>) -> Result<()> {
    let mut depth = 1usize;
    while depth > 0 {
        match lexer.next_token()? {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            Token::Eof => return Err(lexer.error("Unterminated list")),
            _ => {}
        }
    }
    Ok(())
}

fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    if lexer.next_token()? != Token::LParen {
        return Err(lexer.error("Expected ( before flags"));
    }
    let mut flags = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => return Ok(flags),
            Token::Space => {}
            Token::Atom(flag) => flags.push(flag.to_string()),
            token => return Err(lexer.error(&format!("Unexpected flag: {token:?}"))),
        }
    }
}

/// Parses an IMAP `date-time` such as `17-Jul-1996 02:44:25 -0700`.
#[must_use]
pub fn parse_internal_date(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value.trim(), "%d-%b-%Y %H:%M:%S %z").ok()
}
