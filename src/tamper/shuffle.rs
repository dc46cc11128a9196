//! Header order shuffling.
//!
//! The output order is guaranteed to differ from the input whenever that is
//! possible at all, i.e. when the list holds at least two distinct normalized
//! names. Otherwise every permutation looks the same and the list is returned
//! as-is.

use rand::seq::SliceRandom;
use rand::RngCore;

use crate::http::Header;
use crate::tamper::filter::HeaderFilter;

/// Random attempts before falling back to a rotation.
const MAX_SHUFFLE_ATTEMPTS: usize = 64;

/// Reorders headers into a random permutation that differs from the original.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShuffleHeaderOrder;

impl ShuffleHeaderOrder {
    pub const NAME: &'static str = "ShuffleHeaderOrder";

    pub fn new() -> Self {
        Self
    }
}

fn order_key(headers: &[Header]) -> Vec<String> {
    headers.iter().map(Header::normalized_name).collect()
}

/// True when no permutation can change the normalized-name order.
fn is_degenerate(headers: &[Header]) -> bool {
    match headers.split_first() {
        None => true,
        Some((first, rest)) => rest.iter().all(|h| h.is_same_header(first)),
    }
}

impl HeaderFilter for ShuffleHeaderOrder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter_headers(&self, headers: Vec<Header>, rng: &mut dyn RngCore) -> Vec<Header> {
        shuffle_until_different(headers, rng, MAX_SHUFFLE_ATTEMPTS)
    }
}

fn shuffle_until_different(mut headers: Vec<Header>, rng: &mut dyn RngCore, attempts: usize) -> Vec<Header> {
    if is_degenerate(&headers) {
        tracing::trace!(headers = headers.len(), "Header order cannot change, skipping shuffle");
        return headers;
    }

    let original = order_key(&headers);
    for _ in 0..attempts {
        headers.shuffle(rng);
        if order_key(&headers) != original {
            return headers;
        }
    }

    // Every attempt reproduced the original order. Rotating by one changes the
    // order of any list with two distinct names.
    headers.rotate_left(1);
    headers
}
