//! Response tampering subsystem.
//!
//! # Data Flow
//! ```text
//! request headers
//!     → policy.rs (Directive from Tamper-Resp-Filters, allowed ∩ catalog, shuffle, cap)
//!     → pipeline.rs (fold the selected filters over the response)
//!         - shuffle.rs (reorder headers, always to a different order)
//!         - case.rs (randomize header name case)
//!     → Message::serialize
//! ```
//!
//! # Design Decisions
//! - Filters are trait objects registered in a fixed, ordered catalog
//! - The catalog is immutable after startup and shared by every connection
//! - Policy decides selection and order; the pipeline only executes

pub mod case;
pub mod filter;
pub mod pipeline;
pub mod policy;
pub mod shuffle;

pub use case::RandomizeHeaderCase;
pub use filter::{CatalogError, FilterCatalog, HeaderFilter};
pub use pipeline::TamperPipeline;
pub use policy::{Directive, FilterPolicy, NEGOTIATION_HEADER};
pub use shuffle::ShuffleHeaderOrder;
