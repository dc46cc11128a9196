//! Ordered application of selected filters.

use std::sync::Arc;

use rand::RngCore;

use crate::http::Message;
use crate::tamper::filter::HeaderFilter;

/// Folds a message through filters in the order the policy chose.
///
/// The pipeline makes no selection or ordering decisions of its own.
#[derive(Debug, Clone, Default)]
pub struct TamperPipeline {
    filters: Vec<Arc<dyn HeaderFilter>>,
}

impl TamperPipeline {
    pub fn new(filters: Vec<Arc<dyn HeaderFilter>>) -> Self {
        Self { filters }
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every filter, feeding each one the previous one's output.
    pub fn apply(&self, message: Message, rng: &mut dyn RngCore) -> Message {
        self.filters.iter().fold(message, |message, filter| {
            tracing::trace!(filter = filter.name(), "Applying filter");
            filter.apply(message, rng)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Header;
    use crate::tamper::{FilterCatalog, RandomizeHeaderCase};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Appends a header naming itself, to record application order.
    #[derive(Debug)]
    struct Marker(&'static str);

    impl HeaderFilter for Marker {
        fn name(&self) -> &'static str {
            self.0
        }

        fn filter_headers(&self, mut headers: Vec<Header>, _rng: &mut dyn RngCore) -> Vec<Header> {
            headers.push(Header::new("X-Applied", self.0));
            headers
        }
    }

    fn message() -> Message {
        Message::new(
            "HTTP/1.1 200 OK",
            vec![
                Header::new("Date", "X"),
                Header::new("Content-Type", "text/html"),
                Header::new("Content-Length", "5"),
            ],
            Some(b"hello".to_vec()),
        )
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let mut rng = StdRng::seed_from_u64(0);
        let pipeline = TamperPipeline::default();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.apply(message(), &mut rng), message());
    }

    #[test]
    fn filters_run_in_given_order() {
        let mut rng = StdRng::seed_from_u64(0);
        let pipeline = TamperPipeline::new(vec![Arc::new(Marker("second")), Arc::new(Marker("first"))]);
        let output = pipeline.apply(message(), &mut rng);
        let applied: Vec<_> = output
            .headers()
            .iter()
            .filter(|h| h.is_named("x-applied"))
            .map(|h| h.value().to_vec())
            .collect();
        assert_eq!(applied, [b"second".to_vec(), b"first".to_vec()]);
        assert_eq!(pipeline.filter_names(), ["second", "first"]);
    }

    #[test]
    fn full_catalog_keeps_start_line_body_and_fields() {
        let catalog = FilterCatalog::standard();
        let pipeline = TamperPipeline::new(catalog.iter().cloned().collect());
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let output = pipeline.apply(message(), &mut rng);
            assert_eq!(output.start_line(), b"HTTP/1.1 200 OK");
            assert_eq!(output.body(), Some(&b"hello"[..]));

            let mut fields: Vec<_> = output
                .headers()
                .iter()
                .map(|h| (h.normalized_name(), h.value().to_vec()))
                .collect();
            fields.sort();
            assert_eq!(
                fields,
                [
                    ("content-length".to_string(), b"5".to_vec()),
                    ("content-type".to_string(), b"text/html".to_vec()),
                    ("date".to_string(), b"X".to_vec()),
                ]
            );
        }
    }

    #[test]
    fn single_case_filter_keeps_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let pipeline = TamperPipeline::new(vec![Arc::new(RandomizeHeaderCase::new())]);
        let output = pipeline.apply(message(), &mut rng);
        let order: Vec<_> = output.headers().iter().map(Header::normalized_name).collect();
        assert_eq!(order, ["date", "content-type", "content-length"]);
    }
}
