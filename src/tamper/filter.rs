//! Filter capability and the catalog of available filters.
//!
//! # Responsibilities
//! - Define the `HeaderFilter` trait every transformation implements
//! - Hold the ordered, immutable set of filters a process may apply
//! - Resolve filters by their stable names
//!
//! # Design Decisions
//! - Filters see only the header list, never the request
//! - Randomness is injected (`&mut dyn RngCore`) so tests can seed it
//! - The catalog is built once at startup and shared read-only via `Arc`

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use thiserror::Error;

use crate::http::{Header, Message};
use crate::tamper::case::RandomizeHeaderCase;
use crate::tamper::shuffle::ShuffleHeaderOrder;

/// A transformation over a message's header list.
pub trait HeaderFilter: Send + Sync + fmt::Debug {
    /// Stable name used by the negotiation header and configuration.
    fn name(&self) -> &'static str;

    /// Produce the new header list.
    fn filter_headers(&self, headers: Vec<Header>, rng: &mut dyn RngCore) -> Vec<Header>;

    /// Apply the filter to a message, leaving its start line and body untouched.
    fn apply(&self, mut message: Message, rng: &mut dyn RngCore) -> Message {
        let headers = message.take_headers();
        message.set_headers(self.filter_headers(headers, rng));
        message
    }
}

/// Errors raised while building a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown filter: {0}")]
    UnknownFilter(String),
}

/// The fixed, ordered set of filters available to a process.
#[derive(Debug, Clone)]
pub struct FilterCatalog {
    filters: Vec<Arc<dyn HeaderFilter>>,
}

impl FilterCatalog {
    /// Every built-in filter, in catalog order.
    pub fn standard() -> Self {
        Self {
            filters: vec![
                Arc::new(ShuffleHeaderOrder::new()),
                Arc::new(RandomizeHeaderCase::new()),
            ],
        }
    }

    /// Build a catalog from an explicit list of filters.
    pub fn new(filters: Vec<Arc<dyn HeaderFilter>>) -> Self {
        Self { filters }
    }

    /// Restrict the standard catalog to `names`, in the order given.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, CatalogError> {
        let standard = Self::standard();
        let filters = names
            .iter()
            .map(|name| {
                standard
                    .get(name.as_ref())
                    .ok_or_else(|| CatalogError::UnknownFilter(name.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { filters })
    }

    /// Names of the built-in filters.
    pub fn standard_names() -> Vec<&'static str> {
        Self::standard().names()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HeaderFilter>> {
        self.filters.iter().find(|f| f.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.iter().any(|f| f.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn HeaderFilter>> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
