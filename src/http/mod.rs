//! HTTP/1.x message model.
//!
//! # Data Flow
//! ```text
//! socket bytes
//!     → parser.rs (MessageParser: buffer, find CRLFCRLF, lazy head parse, completion)
//!     → message.rs (Message: start line + ordered headers + body)
//!     → [tamper pipeline rewrites the header list]
//!     → Message::serialize → socket
//! ```
//!
//! # Design Decisions
//! - Byte-exact: start line, header name case and order, and body survive untouched
//! - Headers are a Vec, not a map, so duplicates and ordering are preserved

pub mod header;
pub mod message;
pub mod parser;

pub use header::Header;
pub use message::Message;
pub use parser::{MessageKind, MessageParser, ParseError, ParseState};
