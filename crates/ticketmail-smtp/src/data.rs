//! DATA body transfer encoding.
//!
//! After `354` the client sends the message as CRLF-terminated lines and ends
//! it with a line holding a single `.`. Any line that itself begins with `.`
//! gets a second `.` prepended so the server cannot mistake it for the end
//! marker (RFC 5321 section 4.5.2).

/// Encodes a message for the DATA phase.
///
/// Bare LF line endings are normalized to CRLF, lines starting with `.` are
/// dot-stuffed, a final CRLF is added if missing, and the `.` terminator line
/// is appended.
#[must_use]
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 64 + 5);
    let mut at_line_start = true;
    let mut prev = 0u8;

    for &byte in payload {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        if byte == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
        prev = byte;
    }

    if !out.is_empty() && !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}

/// Reverses [`encode`]: strips the terminator line and removes the stuffed
/// leading `.` from every line that has one.
#[must_use]
pub fn decode(wire: &[u8]) -> Vec<u8> {
    let body = if wire == b".\r\n" {
        &[][..]
    } else {
        wire.strip_suffix(b"\r\n.\r\n")
            .map_or(wire, |rest| &wire[..rest.len() + 2])
    };

    let mut out = Vec::with_capacity(body.len());
    let mut at_line_start = true;
    for &byte in body {
        if at_line_start && byte == b'.' {
            at_line_start = false;
            continue;
        }
        out.push(byte);
        at_line_start = byte == b'\n';
    }
    out
}
