//! Metrics collection for observability

use prometheus::{
    Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry,
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Retrieval metrics
    pub retrievals: CounterVec,
    pub vector_stage_skips: CounterVec,

    // Generation metrics
    pub llm_completions: CounterVec,
    pub llm_fallbacks: CounterVec,
    pub advice_refusals: CounterVec,

    // Embedding metrics
    pub embedding_cache_hits: Counter,
    pub embedding_cache_misses: Counter,

    // Fact store metrics
    pub facts_rejected: CounterVec,

    pub answer_duration: Histogram,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let retrievals = register_counter_vec_with_registry!(
            Opts::new("fund_retrievals_total", "Retrieval outcomes by strategy"),
            &["strategy"],
            registry
        )?;

        let vector_stage_skips = register_counter_vec_with_registry!(
            Opts::new(
                "fund_vector_stage_skips_total",
                "Vector stage degradations by reason"
            ),
            &["reason"],
            registry
        )?;

        let llm_completions = register_counter_vec_with_registry!(
            Opts::new("fund_llm_completions_total", "Language model completions"),
            &["status"],
            registry
        )?;

        let llm_fallbacks = register_counter_vec_with_registry!(
            Opts::new("fund_llm_fallbacks_total", "Extractive fallbacks by failure kind"),
            &["kind"],
            registry
        )?;

        let advice_refusals = register_counter_vec_with_registry!(
            Opts::new("fund_advice_refusals_total", "Advice requests refused by topic"),
            &["topic"],
            registry
        )?;

        let embedding_cache_hits = register_counter_with_registry!(
            Opts::new("fund_embedding_cache_hits_total", "Query embedding cache hits"),
            registry
        )?;

        let embedding_cache_misses = register_counter_with_registry!(
            Opts::new("fund_embedding_cache_misses_total", "Query embedding cache misses"),
            registry
        )?;

        let facts_rejected = register_counter_vec_with_registry!(
            Opts::new("fund_facts_rejected_total", "Facts skipped while loading"),
            &["reason"],
            registry
        )?;

        let answer_duration = register_histogram_with_registry!(
            HistogramOpts::new("fund_answer_duration_seconds", "End-to-end answer latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            registry
        )?;

        Ok(Self {
            registry,
            retrievals,
            vector_stage_skips,
            llm_completions,
            llm_fallbacks,
            advice_refusals,
            embedding_cache_hits,
            embedding_cache_misses,
            facts_rejected,
            answer_duration,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record which strategy produced a retrieval result
    pub fn record_retrieval(&self, strategy: &str) {
        self.retrievals.with_label_values(&[strategy]).inc();
    }

    /// Record why the vector stage was skipped or rejected
    pub fn record_vector_skip(&self, reason: &str) {
        self.vector_stage_skips.with_label_values(&[reason]).inc();
    }

    /// Record a language model completion
    pub fn record_llm_completion(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.llm_completions.with_label_values(&[status]).inc();
    }

    /// Record an extractive fallback
    pub fn record_llm_fallback(&self, kind: &str) {
        self.llm_fallbacks.with_label_values(&[kind]).inc();
    }

    /// Record a refused advice request
    pub fn record_advice_refusal(&self, topic: &str) {
        self.advice_refusals.with_label_values(&[topic]).inc();
    }

    /// Record an embedding cache lookup
    pub fn record_embedding_cache(&self, hit: bool) {
        if hit {
            self.embedding_cache_hits.inc();
        } else {
            self.embedding_cache_misses.inc();
        }
    }

    /// Record a fact skipped during loading
    pub fn record_fact_rejected(&self, reason: &str) {
        self.facts_rejected.with_label_values(&[reason]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_retrieval() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retrieval("vector");
        metrics.record_retrieval("vector");
        metrics.record_retrieval("not_found");

        assert_eq!(metrics.retrievals.with_label_values(&["vector"]).get(), 2.0);
        assert_eq!(metrics.retrievals.with_label_values(&["not_found"]).get(), 1.0);
    }

    #[test]
    fn test_export_contains_recorded_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_llm_fallback("timeout");
        metrics.record_embedding_cache(true);

        let exported = metrics.export_prometheus();
        assert!(exported.contains("fund_llm_fallbacks_total"));
        assert!(exported.contains("fund_embedding_cache_hits_total"));
    }
}
