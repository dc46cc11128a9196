//! Incremental HTTP/1.x message framing.
//!
//! # Responsibilities
//! - Accumulate raw bytes from a socket in arbitrary chunk sizes
//! - Locate the header/body separator (CRLFCRLF)
//! - Parse the header block once, on first access
//! - Decide completion from `Content-Length` or connection close
//!
//! # States
//! ```text
//! AccumulatingHeaders → AccumulatingBody → Complete
//!                    └──────────────────→ Complete   (no body expected)
//! ```
//!
//! # Design Decisions
//! - The separator search resumes where the previous one stopped, so feeding a
//!   message one byte at a time stays linear
//! - The header block is parsed lazily and cached; `add_data` never parses
//! - Requests without `Content-Length` carry no body; responses without it are
//!   close-delimited
//! - 1xx/204/304 responses and responses to HEAD never carry a body
//! - An interim 1xx response can be split off, after which the same parser
//!   frames the response that follows it
//! - No chunked transfer-encoding, no pipelining: bytes past `Content-Length`
//!   are dropped

use memchr::memmem;
use thiserror::Error;

use crate::http::header::Header;
use crate::http::message::Message;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Errors produced while framing a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A header line without a `:` separator, or with an empty or non-UTF-8 name.
    #[error("malformed header line: {0:?}")]
    MalformedHeaderLine(String),

    /// A `Content-Length` that is not a non-negative integer, or duplicates that disagree.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// The header block starts with an empty line.
    #[error("empty start line")]
    EmptyStartLine,

    /// The message was converted before framing completed.
    #[error("message is not complete")]
    Incomplete,
}

/// Which side of the exchange a parser is framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

/// Framing progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    AccumulatingHeaders,
    AccumulatingBody,
    Complete,
}

/// Parsed header block.
#[derive(Debug)]
struct Head {
    start_line: Vec<u8>,
    headers: Vec<Header>,
    content_length: Option<usize>,
    status: Option<u16>,
}

impl Head {
    fn parse(block: &[u8], kind: MessageKind) -> Result<Self, ParseError> {
        let mut lines = block
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line));

        let start_line = match lines.next() {
            Some(line) if !line.is_empty() => line.to_vec(),
            _ => return Err(ParseError::EmptyStartLine),
        };

        let mut headers = Vec::new();
        let mut content_length = None;
        for line in lines {
            let header = parse_header_line(line)?;
            if header.is_named("content-length") {
                let length = parse_content_length(header.value())?;
                match content_length {
                    Some(existing) if existing != length => {
                        return Err(ParseError::InvalidContentLength(
                            String::from_utf8_lossy(header.value()).into_owned(),
                        ));
                    }
                    _ => content_length = Some(length),
                }
            }
            headers.push(header);
        }

        let status = match kind {
            MessageKind::Request => None,
            MessageKind::Response => status_code(&start_line),
        };

        Ok(Self {
            start_line,
            headers,
            content_length,
            status,
        })
    }

    /// 1xx, 204 and 304 responses never have a body.
    fn body_allowed(&self) -> bool {
        !matches!(self.status, Some(100..=199 | 204 | 304))
    }

    /// 1xx other than 101 precedes the real response on the same connection.
    fn is_interim(&self) -> bool {
        matches!(self.status, Some(100..=199)) && self.status != Some(101)
    }
}

fn parse_header_line(line: &[u8]) -> Result<Header, ParseError> {
    let malformed = || ParseError::MalformedHeaderLine(String::from_utf8_lossy(line).into_owned());

    let colon = memchr::memchr(b':', line).ok_or_else(malformed)?;
    let name = std::str::from_utf8(&line[..colon]).map_err(|_| malformed())?;
    if name.is_empty() {
        return Err(malformed());
    }

    let value = trim_ows(&line[colon + 1..]);
    Ok(Header::new(name, value))
}

fn trim_ows(mut value: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = value {
        value = rest;
    }
    value
}

fn parse_content_length(value: &[u8]) -> Result<usize, ParseError> {
    let invalid = || ParseError::InvalidContentLength(String::from_utf8_lossy(value).into_owned());

    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(value)
        .ok()
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(invalid)
}

fn status_code(status_line: &[u8]) -> Option<u16> {
    status_line
        .split(|&b| b == b' ')
        .nth(1)
        .and_then(|code| std::str::from_utf8(code).ok())
        .and_then(|code| code.parse::<u16>().ok())
}

/// Explicit parser state over an append-only buffer.
#[derive(Debug)]
pub struct MessageParser {
    kind: MessageKind,
    buffer: Vec<u8>,
    state: ParseState,
    /// Offset where the next separator search starts.
    scan_from: usize,
    /// Offset of the first body byte, once the separator is found.
    body_start: Option<usize>,
    head: Option<Head>,
    peer_closed: bool,
    bodiless: bool,
}

impl MessageParser {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            buffer: Vec::new(),
            state: ParseState::AccumulatingHeaders,
            scan_from: 0,
            body_start: None,
            head: None,
            peer_closed: false,
            bodiless: false,
        }
    }

    pub fn request() -> Self {
        Self::new(MessageKind::Request)
    }

    pub fn response() -> Self {
        Self::new(MessageKind::Response)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Number of bytes buffered so far.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append newly received bytes.
    pub fn add_data(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        if self.body_start.is_some() {
            return;
        }
        match memmem::find(&self.buffer[self.scan_from..], HEADER_TERMINATOR) {
            Some(pos) => {
                self.body_start = Some(self.scan_from + pos + HEADER_TERMINATOR.len());
                self.state = ParseState::AccumulatingBody;
            }
            // Keep the last few bytes in range: the separator may straddle chunks.
            None => {
                self.scan_from = self.buffer.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
            }
        }
    }

    /// Record that the peer closed its side; ends close-delimited bodies.
    pub fn mark_closed(&mut self) {
        self.peer_closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.peer_closed
    }

    /// The message is known to have no body (e.g. the response to a HEAD request).
    pub fn expect_no_body(&mut self) {
        self.bodiless = true;
    }

    /// True once the full header block has been received.
    pub fn has_header_block(&self) -> bool {
        self.body_start.is_some()
    }

    /// Body bytes buffered past the header block.
    pub fn body_len(&self) -> usize {
        self.body_start.map_or(0, |start| self.buffer.len() - start)
    }

    /// True when the buffered head is an interim (1xx, not 101) response.
    pub fn is_interim(&mut self) -> Result<bool, ParseError> {
        Ok(self.head()?.is_some_and(Head::is_interim))
    }

    /// Detach a complete interim response, returning its raw bytes.
    ///
    /// The parser restarts on whatever followed it, keeping the close and
    /// no-body flags, so the final response is framed next.
    pub fn split_interim(&mut self) -> Option<Vec<u8>> {
        let body_start = self.body_start?;
        if !self.head.as_ref().is_some_and(Head::is_interim) {
            return None;
        }

        let rest = self.buffer.split_off(body_start);
        let interim = std::mem::take(&mut self.buffer);
        self.state = ParseState::AccumulatingHeaders;
        self.scan_from = 0;
        self.body_start = None;
        self.head = None;
        self.add_data(&rest);
        Some(interim)
    }

    /// Parsed headers, or `None` while the header block is still arriving.
    pub fn headers(&mut self) -> Result<Option<&[Header]>, ParseError> {
        Ok(self.head()?.map(|head| head.headers.as_slice()))
    }

    /// Start line, or `None` while the header block is still arriving.
    pub fn start_line(&mut self) -> Result<Option<&[u8]>, ParseError> {
        Ok(self.head()?.map(|head| head.start_line.as_slice()))
    }

    /// Declared body length, if the header block carries one.
    pub fn content_length(&mut self) -> Result<Option<usize>, ParseError> {
        Ok(self.head()?.and_then(|head| head.content_length))
    }

    /// Re-evaluate completion against everything buffered so far.
    pub fn is_complete(&mut self) -> Result<bool, ParseError> {
        let Some(body_start) = self.body_start else {
            return Ok(false);
        };
        let (content_length, body_allowed) = match self.head()? {
            Some(head) => (head.content_length, head.body_allowed()),
            None => return Ok(false),
        };

        let buffered = self.buffer.len() - body_start;
        let complete = if self.bodiless || !body_allowed {
            true
        } else {
            match (content_length, self.kind) {
                (Some(length), _) => buffered >= length,
                (None, MessageKind::Request) => true,
                (None, MessageKind::Response) => self.peer_closed,
            }
        };

        if complete {
            self.state = ParseState::Complete;
        }
        Ok(complete)
    }

    /// Consume the parser and produce the framed message.
    pub fn into_message(mut self) -> Result<Message, ParseError> {
        if !self.is_complete()? {
            return Err(ParseError::Incomplete);
        }
        let (Some(body_start), Some(head)) = (self.body_start, self.head.take()) else {
            return Err(ParseError::Incomplete);
        };

        let mut body = self.buffer.split_off(body_start);
        let body = if self.bodiless || !head.body_allowed() {
            None
        } else {
            match head.content_length {
                Some(length) => {
                    body.truncate(length);
                    Some(body)
                }
                None if body.is_empty() => None,
                None => Some(body),
            }
        };

        Ok(Message::new(head.start_line, head.headers, body))
    }

    fn head(&mut self) -> Result<Option<&Head>, ParseError> {
        let Some(body_start) = self.body_start else {
            return Ok(None);
        };
        if self.head.is_none() {
            let block = &self.buffer[..body_start - HEADER_TERMINATOR.len()];
            self.head = Some(Head::parse(block, self.kind)?);
        }
        Ok(self.head.as_ref())
    }
}
