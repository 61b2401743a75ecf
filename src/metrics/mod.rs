//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry, Counter, CounterVec, Encoder, Histogram, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Extraction metrics
    pub extractions_total: CounterVec,
    pub extraction_selected_tokens: Histogram,
    pub extraction_compression_ratio: Histogram,

    // Transcript metrics
    pub transcript_skipped_records: Counter,

    // Classification cache metrics
    pub classification_cache_hits: Counter,
    pub classification_cache_misses: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let extractions_total = register_counter_vec_with_registry!(
            Opts::new("extractions_total", "Total extraction runs"),
            &["mode"],
            registry
        )?;

        let extraction_selected_tokens = register_histogram_with_registry!(
            "extraction_selected_tokens",
            "Tokens retained per extraction",
            vec![1_000.0, 5_000.0, 10_000.0, 25_000.0, 50_000.0, 100_000.0, 200_000.0],
            registry
        )?;

        let extraction_compression_ratio = register_histogram_with_registry!(
            "extraction_compression_ratio",
            "Fraction of available tokens dropped per extraction",
            vec![0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0],
            registry
        )?;

        let transcript_skipped_records = register_counter_with_registry!(
            Opts::new(
                "transcript_skipped_records_total",
                "Malformed transcript records skipped during parsing"
            ),
            registry
        )?;

        let classification_cache_hits = register_counter_with_registry!(
            Opts::new(
                "classification_cache_hits_total",
                "Extractions that reused a cached classification"
            ),
            registry
        )?;

        let classification_cache_misses = register_counter_with_registry!(
            Opts::new(
                "classification_cache_misses_total",
                "Extractions that had to classify the transcript"
            ),
            registry
        )?;

        Ok(Self {
            registry,
            extractions_total,
            extraction_selected_tokens,
            extraction_compression_ratio,
            transcript_skipped_records,
            classification_cache_hits,
            classification_cache_misses,
        })
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_render_registered_families() {
        let metrics = Metrics::new().unwrap();
        metrics.extractions_total.with_label_values(&["full"]).inc();
        metrics.transcript_skipped_records.inc_by(2.0);

        let text = metrics.render();
        assert!(text.contains("extractions_total{mode=\"full\"} 1"));
        assert!(text.contains("transcript_skipped_records_total 2"));
    }
}
