//! HTTP/1.1 framing: a server-side request framer and a client-side
//! response framer, each paired with a fluent writer for the opposite
//! direction. Both sides share the strict line discipline below.

mod client;
mod server;

pub use client::{ClientConnection, ClientEvent};
pub use server::{ServerConnection, ServerEvent};

use crate::{Error, Result};

pub(crate) fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\r\n")
}

/// Splits `key: value`. The parser requires the colon and the single space;
/// anything else is malformed and drops the request.
pub(crate) fn split_header_line(line: &[u8]) -> Result<(String, String)> {
    let colon = line
        .iter()
        .position(|&byte| byte == b':')
        .ok_or_else(|| Error::Malformed("header line without a colon".into()))?;
    if line.get(colon + 1) != Some(&b' ') {
        return Err(Error::Malformed("header line without a space after the colon".into()));
    }
    let key = String::from_utf8_lossy(&line[..colon]).to_string();
    let value = String::from_utf8_lossy(&line[colon + 2..]).to_string();
    Ok((key, value))
}

pub(crate) fn parse_decimal(value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Malformed(format!("bad content length {value:?}")))
}

pub(crate) fn parse_hex(line: &[u8]) -> Result<usize> {
    let text = String::from_utf8_lossy(line);
    usize::from_str_radix(text.trim(), 16)
        .map_err(|_| Error::Malformed(format!("bad chunk size {text:?}")))
}

/// Body-delimitation classification of a received header.
pub(crate) enum HeaderKind {
    Chunked,
    Length(usize),
    Close,
    Other,
}

pub(crate) fn classify_header(key: &str, value: &str) -> Result<HeaderKind> {
    if key.eq_ignore_ascii_case("transfer-encoding") && value.eq_ignore_ascii_case("chunked") {
        Ok(HeaderKind::Chunked)
    } else if key.eq_ignore_ascii_case("content-length") {
        Ok(HeaderKind::Length(parse_decimal(value)?))
    } else if key.eq_ignore_ascii_case("connection") && value.eq_ignore_ascii_case("close") {
        Ok(HeaderKind::Close)
    } else {
        Ok(HeaderKind::Other)
    }
}
