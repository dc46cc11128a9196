//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (connection_id, upstream, filters)
//!     → logging.rs (subscriber: env filter + fmt layer → stdout)
//! ```

pub mod logging;
