//! Header name case randomization.

use rand::{Rng, RngCore};

use crate::http::Header;
use crate::tamper::filter::HeaderFilter;

/// Flips every letter of every header name to upper or lower case at random.
///
/// Values are never touched. A short name may come out with its original case;
/// unlike [`ShuffleHeaderOrder`](crate::tamper::ShuffleHeaderOrder) there is no
/// must-differ guarantee.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomizeHeaderCase;

impl RandomizeHeaderCase {
    pub const NAME: &'static str = "RandomizeHeaderCase";

    pub fn new() -> Self {
        Self
    }
}

fn randomize_case(name: &str, rng: &mut dyn RngCore) -> String {
    name.chars()
        .map(|c| {
            if !c.is_ascii_alphabetic() {
                c
            } else if rng.gen_bool(0.5) {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

impl HeaderFilter for RandomizeHeaderCase {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter_headers(&self, headers: Vec<Header>, rng: &mut dyn RngCore) -> Vec<Header> {
        headers
            .iter()
            .map(|header| header.renamed(randomize_case(header.name(), rng)))
            .collect()
    }
}
