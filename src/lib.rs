//! Tampering HTTP proxy.
//!
//! Sits between an HTTP client and a single upstream server, reassembles each
//! upstream response, and rewrites it in protocol-legal ways (reordered
//! headers, randomized header-name case) before relaying it. Clients opt in or
//! out of individual filters with the `Tamper-Resp-Filters` request header.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──bytes──▶ net::handler ──bytes (verbatim)──▶ upstream
//!                         │
//!                         │ request head → tamper::Directive
//!                         ▼
//!   client ◀──bytes── Message::serialize ◀── tamper::TamperPipeline ◀── http::MessageParser ◀── upstream
//!                                                 ▲
//!                                   tamper::FilterPolicy::pick
//! ```

// Core subsystems
pub mod http;
pub mod net;
pub mod tamper;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use lifecycle::Shutdown;
pub use net::TamperServer;
