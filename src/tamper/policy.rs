//! Filter selection driven by the client's negotiation header.
//!
//! # Negotiation
//! The request may carry a `Tamper-Resp-Filters` header holding a JSON object:
//! ```text
//! Tamper-Resp-Filters: {"allow":["ShuffleHeaderOrder","RandomizeHeaderCase"]}
//! Tamper-Resp-Filters: {"disallow":["ShuffleHeaderOrder"]}
//! Tamper-Resp-Filters: {"disallow":[]}            (everything allowed)
//! ```
//! - Header absent: every catalog filter is allowed
//! - `allow` present: catalog ∩ allow, in catalog order (`disallow` is ignored)
//! - `disallow` present: catalog − disallow
//! - Anything else: fail closed, nothing is allowed
//!
//! # Design Decisions
//! - A bad directive never aborts the connection; tampering is best-effort
//! - Selection never returns a filter outside the catalog, nor more than `max_selected`

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::RngCore;
use serde_json::Value;

use crate::config::TamperConfig;
use crate::http::Header;
use crate::tamper::filter::{FilterCatalog, HeaderFilter};

/// Request header carrying the client's filter directive.
pub const NEGOTIATION_HEADER: &str = "Tamper-Resp-Filters";

/// Default upper bound on filters applied per response.
pub const DEFAULT_MAX_SELECTED: usize = 3;

/// The client's opt-in/opt-out request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// No negotiation header.
    Absent,
    Allow(Vec<String>),
    Disallow(Vec<String>),
    /// Header present but not one of the accepted shapes.
    Unrecognized,
}

impl Directive {
    /// Parse a negotiation header value.
    ///
    /// Only a JSON object qualifies. The first of `allow`/`disallow` present
    /// decides, and it must hold an array of strings.
    pub fn parse(raw: &str) -> Self {
        let fields = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => return Directive::Unrecognized,
            Err(e) => {
                tracing::debug!(error = %e, "Negotiation header is not JSON");
                return Directive::Unrecognized;
            }
        };

        if let Some(list) = fields.get("allow") {
            string_list(list).map_or(Directive::Unrecognized, Directive::Allow)
        } else if let Some(list) = fields.get("disallow") {
            string_list(list).map_or(Directive::Unrecognized, Directive::Disallow)
        } else {
            Directive::Unrecognized
        }
    }

    /// Read the directive from a request's headers. Only the first matching
    /// header is consulted.
    pub fn from_headers(headers: &[Header]) -> Self {
        match headers.iter().find(|h| h.is_named(NEGOTIATION_HEADER)) {
            None => Directive::Absent,
            Some(header) => match header.value_str() {
                Some(raw) => Self::parse(raw),
                None => Directive::Unrecognized,
            },
        }
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|name| name.as_str().map(str::to_owned))
        .collect()
}

/// Decides which filters run for a given request.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    catalog: Arc<FilterCatalog>,
    max_selected: usize,
    preserve_request_order: bool,
}

impl FilterPolicy {
    /// Policy over `catalog` with the defaults: at most three filters, random order.
    pub fn new(catalog: Arc<FilterCatalog>) -> Self {
        Self {
            catalog,
            max_selected: DEFAULT_MAX_SELECTED,
            preserve_request_order: false,
        }
    }

    pub fn from_config(catalog: Arc<FilterCatalog>, config: &TamperConfig) -> Self {
        Self::new(catalog)
            .with_max_selected(config.max_filters)
            .with_preserve_request_order(config.retain_order)
    }

    pub fn with_max_selected(mut self, max_selected: usize) -> Self {
        self.max_selected = max_selected;
        self
    }

    pub fn with_preserve_request_order(mut self, preserve: bool) -> Self {
        self.preserve_request_order = preserve;
        self
    }

    pub fn catalog(&self) -> &FilterCatalog {
        &self.catalog
    }

    pub fn max_selected(&self) -> usize {
        self.max_selected
    }

    /// Catalog filters the directive permits, in catalog order.
    pub fn allowed_filters(&self, directive: &Directive) -> Vec<Arc<dyn HeaderFilter>> {
        let permitted = |filter: &&Arc<dyn HeaderFilter>| match directive {
            Directive::Absent => true,
            Directive::Allow(names) => names.iter().any(|n| n == filter.name()),
            Directive::Disallow(names) => !names.iter().any(|n| n == filter.name()),
            Directive::Unrecognized => false,
        };

        if *directive == Directive::Unrecognized {
            tracing::warn!(
                header = NEGOTIATION_HEADER,
                "Directive specifies neither 'allow' nor 'disallow', applying no filters"
            );
        }

        self.catalog.iter().filter(permitted).cloned().collect()
    }

    /// Allowed filters, shuffled unless request order is preserved, capped at
    /// `max_selected`.
    pub fn pick(&self, directive: &Directive, rng: &mut dyn RngCore) -> Vec<Arc<dyn HeaderFilter>> {
        let mut selected = self.allowed_filters(directive);
        if !self.preserve_request_order {
            selected.shuffle(rng);
        }
        selected.truncate(self.max_selected);
        selected
    }
}
