//! Framed I/O for the IMAP protocol.
//!
//! IMAP uses CRLF-terminated lines with embedded literals (`{n}\r\n` followed
//! by exactly `n` bytes). A response is read as one unit including every
//! literal it carries.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Framed connection for the IMAP protocol.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    read_timeout: Option<Duration>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            read_timeout: None,
        }
    }

    /// Bounds every socket read by `limit`. A response that keeps arriving
    /// may take longer in total; a silent server fails after `limit`.
    #[must_use]
    pub fn with_read_timeout(mut self, limit: Duration) -> Self {
        self.read_timeout = Some(limit);
        self
    }

    /// Reads a complete response, including any literals.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, EOF, or oversized lines and literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(literal_len) = parse_literal_length(&line) else {
                break;
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            let mut filled = response.len();
            response.resize(filled + literal_len, 0);
            while filled < response.len() {
                let read = within(self.read_timeout, self.reader.read(&mut response[filled..])).await?;
                if read == 0 {
                    return Err(closed());
                }
                filled += read;
            }
        }

        Ok(response)
    }

    /// Reads responses until the tagged completion for `tag`.
    ///
    /// # Errors
    ///
    /// Propagates read errors; the partial response list is discarded.
    pub async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut responses = Vec::new();
        loop {
            let response = self.read_response().await?;
            let is_tagged = response.starts_with(tag.as_bytes())
                && response.get(tag.len()) == Some(&b' ');
            responses.push(response);
            if is_tagged {
                return Ok(responses);
            }
        }
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let limit = self.read_timeout;

        loop {
            let buf = within(limit, self.reader.fill_buf()).await?;
            if buf.is_empty() {
                return Err(closed());
            }

            // A CR may end one read and its LF start the next.
            let search_from = line.len().saturating_sub(1);
            line.extend_from_slice(buf);
            if let Some(pos) = find_crlf(&line[search_from..]) {
                let end = search_from + pos + 2;
                let consumed = buf.len() - (line.len() - end);
                self.reader.consume(consumed);
                line.truncate(end);
                return Ok(line);
            }
            let len = buf.len();
            self.reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }
    }

    /// Writes a serialized command.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or flush fails.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Returns true if bytes were received that no response consumed yet.
    pub fn has_buffered_data(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    /// Shuts down the write half of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().await?;
        Ok(())
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Buffered input is dropped; check [`Self::has_buffered_data`] first.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

async fn within<T>(limit: Option<Duration>, read: impl Future<Output = io::Result<T>>) -> Result<T> {
    match limit {
        Some(limit) => Ok(tokio::time::timeout(limit, read)
            .await
            .map_err(|_| Error::Timeout(limit))??),
        None => Ok(read.await?),
    }
}

fn closed() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line: `{123}\r\n` or `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
