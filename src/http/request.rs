//! Request head reading and parsing.
//!
//! # Responsibilities
//! - Read the request line and header block off a raw client socket
//! - Enforce head size and time limits
//! - Parse into a structured [`RequestHead`] or a typed [`ParseError`]
//! - Re-encode the head with a new header list for forwarding
//!
//! # Design Decisions
//! - Bytes read past the blank line are handed back untouched; they belong
//!   to the body (or to the TLS handshake of a CONNECT tunnel)
//! - Header order and duplicates are preserved exactly
//! - `\n\n` is accepted as a terminator alongside `\r\n\r\n`

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

/// Typed failures while reading or parsing a request head.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("connection closed before any request bytes")]
    Empty,
    #[error("connection closed after {0} bytes, before the end of the request head")]
    Incomplete(usize),
    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),
    #[error("timed out after {0:?} waiting for the request head")]
    Timeout(Duration),
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
    #[error("malformed request line {0:?}")]
    MalformedRequestLine(String),
    #[error("request line {0:?} has no target")]
    MissingTarget(String),
    #[error("malformed header line {0:?}")]
    MalformedHeader(String),
    #[error("no target host in request target or Host header")]
    MissingHost,
    #[error("invalid request target {0:?}")]
    InvalidTarget(String),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("invalid Content-Length {0:?}")]
    InvalidContentLength(String),
    #[error("unsupported Transfer-Encoding {0:?}")]
    UnsupportedTransferEncoding(String),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A single header field, name casing preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// How many request body bytes follow the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body.
    None,
    /// Exactly this many bytes.
    Length(u64),
    /// `Transfer-Encoding: chunked`; ends at the zero-size chunk and trailers.
    Chunked,
}

/// Parsed request line and header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<Header>,
}

impl RequestHead {
    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    /// First header with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn body_framing(&self) -> Result<BodyFraming, ParseError> {
        let codings: Vec<&str> = self
            .headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case("transfer-encoding"))
            .flat_map(|h| h.value.split(','))
            .map(str::trim)
            .filter(|coding| !coding.is_empty())
            .collect();
        if let Some(last) = codings.last() {
            // Without chunked last there is no way to find the end of the body.
            return if last.eq_ignore_ascii_case("chunked") {
                Ok(BodyFraming::Chunked)
            } else {
                Err(ParseError::UnsupportedTransferEncoding(codings.join(", ")))
            };
        }

        let mut length: Option<u64> = None;
        for header in self
            .headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case("content-length"))
        {
            let parsed: u64 = header
                .value
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidContentLength(header.value.clone()))?;
            match length {
                Some(existing) if existing != parsed => {
                    return Err(ParseError::InvalidContentLength(header.value.clone()));
                }
                _ => length = Some(parsed),
            }
        }

        Ok(match length {
            Some(0) | None => BodyFraming::None,
            Some(n) => BodyFraming::Length(n),
        })
    }

    /// Serialize the request line followed by `headers` and the blank line.
    pub fn encode_with(&self, headers: &[Header]) -> Vec<u8> {
        let mut out = format!("{} {} {}\r\n", self.method, self.target, self.version);
        for header in headers {
            out.push_str(&header.name);
            out.push_str(": ");
            out.push_str(&header.value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.into_bytes()
    }
}

/// RFC 9110 `token`.
pub fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^'
                        | b'_' | b'`' | b'|' | b'~'
                )
        })
}

/// Offset of the first body byte, if the head terminator is present.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.iter().enumerate().find_map(|(i, b)| {
        if *b != b'\n' {
            return None;
        }
        match (buf.get(i + 1), buf.get(i + 2)) {
            (Some(b'\n'), _) => Some(i + 2),
            (Some(b'\r'), Some(b'\n')) => Some(i + 3),
            _ => None,
        }
    })
}

/// Read a full request head from `reader`.
///
/// Returns the parsed head and any bytes that arrived after it.
pub async fn read_head<R>(
    reader: &mut R,
    max_bytes: usize,
    deadline: Duration,
) -> Result<(RequestHead, Vec<u8>), ParseError>
where
    R: AsyncRead + Unpin,
{
    let (buf, head_end) = tokio::time::timeout(deadline, read_until_head_end(reader, max_bytes))
        .await
        .map_err(|_| ParseError::Timeout(deadline))??;

    let head = parse_head(&buf[..head_end])?;
    Ok((head, buf[head_end..].to_vec()))
}

async fn read_until_head_end<R>(reader: &mut R, max_bytes: usize) -> Result<(Vec<u8>, usize), ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(if buf.is_empty() {
                ParseError::Empty
            } else {
                ParseError::Incomplete(buf.len())
            });
        }

        // Rescan a few bytes back in case the terminator straddles reads.
        let scan_from = buf.len().saturating_sub(3);
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_head_end(&buf[scan_from..]) {
            let end = scan_from + end;
            if end > max_bytes {
                return Err(ParseError::TooLarge(max_bytes));
            }
            return Ok((buf, end));
        }
        if buf.len() > max_bytes {
            return Err(ParseError::TooLarge(max_bytes));
        }
    }
}

/// Parse a complete head (request line through the blank line).
pub fn parse_head(raw: &[u8]) -> Result<RequestHead, ParseError> {
    let text = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidEncoding)?;
    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .skip_while(|line| line.is_empty());

    let request_line = lines
        .next()
        .ok_or_else(|| ParseError::MalformedRequestLine(String::new()))?;
    let (method, target, version) = parse_request_line(request_line)?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        headers.push(parse_header_line(line)?);
    }

    Ok(RequestHead {
        method,
        target,
        version,
        headers,
    })
}

fn parse_request_line(line: &str) -> Result<(String, String, String), ParseError> {
    let mut parts = line.split_ascii_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ParseError::MalformedRequestLine(line.to_string()))?;
    if !is_token(method) {
        return Err(ParseError::MalformedRequestLine(line.to_string()));
    }
    let target = parts
        .next()
        .ok_or_else(|| ParseError::MissingTarget(line.to_string()))?;
    let version = parts
        .next()
        .filter(|v| v.starts_with("HTTP/"))
        .ok_or_else(|| ParseError::MalformedRequestLine(line.to_string()))?;
    if parts.next().is_some() {
        return Err(ParseError::MalformedRequestLine(line.to_string()));
    }
    Ok((method.to_string(), target.to_string(), version.to_string()))
}

fn parse_header_line(line: &str) -> Result<Header, ParseError> {
    // obs-fold continuation lines are not supported
    if line.starts_with([' ', '\t']) {
        return Err(ParseError::MalformedHeader(line.to_string()));
    }
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| ParseError::MalformedHeader(line.to_string()))?;
    if !is_token(name) {
        return Err(ParseError::MalformedHeader(line.to_string()));
    }
    Ok(Header::new(name, value.trim_matches([' ', '\t'])))
}
