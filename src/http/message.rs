//! A fully framed HTTP request or response.
//!
//! Produced by [`MessageParser::into_message`](crate::http::MessageParser::into_message)
//! once framing completes. From then on only the header list changes: filters
//! swap it out wholesale via [`Message::set_headers`], while the start line and
//! body stay byte-for-byte as received.

use crate::http::header::Header;

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    start_line: Vec<u8>,
    headers: Vec<Header>,
    body: Option<Vec<u8>>,
}

impl Message {
    pub fn new(start_line: impl Into<Vec<u8>>, headers: Vec<Header>, body: Option<Vec<u8>>) -> Self {
        Self {
            start_line: start_line.into(),
            headers,
            body,
        }
    }

    /// Request line or status line, verbatim and without its line terminator.
    pub fn start_line(&self) -> &[u8] {
        &self.start_line
    }

    /// Headers in their current order.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Replace the whole header list.
    pub fn set_headers(&mut self, headers: Vec<Header>) {
        self.headers = headers;
    }

    /// Move the header list out, leaving it empty.
    pub fn take_headers(&mut self) -> Vec<Header> {
        std::mem::take(&mut self.headers)
    }

    /// First header whose name matches `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.is_named(name))
    }

    /// Body bytes, or `None` when the message carries no body at all.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Wire form: start line, one CRLF-terminated line per header, an empty
    /// line, then the body if present.
    pub fn serialize(&self) -> Vec<u8> {
        let body_len = self.body.as_ref().map_or(0, Vec::len);
        let mut out = Vec::with_capacity(self.start_line.len() + 64 * self.headers.len() + body_len);

        out.extend_from_slice(&self.start_line);
        out.extend_from_slice(CRLF);
        for header in &self.headers {
            header.write_to(&mut out);
            out.extend_from_slice(CRLF);
        }
        out.extend_from_slice(CRLF);
        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }
        out
    }
}
