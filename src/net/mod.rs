//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → server.rs (spawn one task per connection, timeouts, drain on shutdown)
//!     → handler.rs (connect upstream, relay request, buffer + tamper response)
//!     → connection.rs (ids, state machine, live-connection tracking)
//!
//! Connection States:
//!     Connecting → RelayingRequest → AwaitingResponse → Tampering → Sent → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Connections share nothing mutable; the filter policy is read-only
//! - Cancelling a session (timeout, shutdown) drops both sockets

pub mod connection;
pub mod handler;
pub mod listener;
pub mod server;

pub use connection::{ConnectionId, ConnectionState, ConnectionTracker};
pub use handler::{ConnectionHandler, HandlerError, Outcome};
pub use listener::{Listener, ListenerError};
pub use server::TamperServer;
