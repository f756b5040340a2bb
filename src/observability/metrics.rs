// ============================================================================
// PROMETHEUS METRICS
// ============================================================================
// Counters and histograms for the booking pipeline, scraped from /metrics
// ============================================================================

use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

lazy_static! {
    // ========================================================================
    // HTTP REQUEST METRICS
    // ========================================================================

    /// Total de requests HTTP por método, endpoint y status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "endpoint"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========================================================================
    // WEBHOOK PIPELINE METRICS
    // ========================================================================

    /// Inbound webhook messages by provider and terminal outcome
    pub static ref WEBHOOK_MESSAGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "webhook_messages_total",
        "Inbound webhook messages by provider and outcome",
        &["provider", "outcome"]
    )
    .unwrap();

    pub static ref WEBHOOK_PROCESSING_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "webhook_processing_duration_seconds",
        "Background processing time of one inbound message",
        &["provider"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    pub static ref DEDUP_CLAIMS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dedup_claims_total",
        "Message deduplication gate outcomes",
        &["outcome"]
    )
    .unwrap();

    // ========================================================================
    // CACHE METRICS
    // ========================================================================

    pub static ref CACHE_HITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_hits_total",
        "Total number of cache hits",
        &["cache_type", "cache_name"]
    )
    .unwrap();

    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_misses_total",
        "Total number of cache misses",
        &["cache_type", "cache_name"]
    )
    .unwrap();

    // ========================================================================
    // BOOKING / LLM / OUTBOUND METRICS
    // ========================================================================

    pub static ref BOOKINGS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "bookings_total",
        "Booking attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref LLM_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "llm_calls_total",
        "Language model calls by purpose and outcome",
        &["purpose", "outcome"]
    )
    .unwrap();

    pub static ref LLM_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "llm_call_duration_seconds",
        "Language model call duration in seconds",
        &["purpose"],
        vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
    )
    .unwrap();

    pub static ref OUTBOUND_MESSAGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "outbound_messages_total",
        "Outbound WhatsApp messages by provider and outcome",
        &["provider", "outcome"]
    )
    .unwrap();

    // ========================================================================
    // ERROR METRICS
    // ========================================================================

    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "errors_total",
        "Total errors by type and component",
        &["error_type", "component"]
    )
    .unwrap();
}

// ============================================================================
// HELPERS
// ============================================================================

/// Helper para registrar una request HTTP
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration_secs);
}

/// Terminal outcome of one inbound webhook message
pub fn record_webhook_message(provider: &str, outcome: &str) {
    WEBHOOK_MESSAGES_TOTAL
        .with_label_values(&[provider, outcome])
        .inc();
}

pub fn record_webhook_processing(provider: &str, duration_secs: f64) {
    WEBHOOK_PROCESSING_DURATION_SECONDS
        .with_label_values(&[provider])
        .observe(duration_secs);
}

pub fn record_dedup_outcome(outcome: &str) {
    DEDUP_CLAIMS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper para registrar cache hit/miss
pub fn record_cache_access(cache_type: &str, cache_name: &str, hit: bool) {
    if hit {
        CACHE_HITS_TOTAL
            .with_label_values(&[cache_type, cache_name])
            .inc();
    } else {
        CACHE_MISSES_TOTAL
            .with_label_values(&[cache_type, cache_name])
            .inc();
    }
}

pub fn record_booking_outcome(outcome: &str) {
    BOOKINGS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_llm_call(purpose: &str, outcome: &str, duration_secs: f64) {
    LLM_CALLS_TOTAL.with_label_values(&[purpose, outcome]).inc();
    LLM_CALL_DURATION_SECONDS
        .with_label_values(&[purpose])
        .observe(duration_secs);
}

pub fn record_outbound_message(provider: &str, outcome: &str) {
    OUTBOUND_MESSAGES_TOTAL
        .with_label_values(&[provider, outcome])
        .inc();
}

/// Helper para registrar error
pub fn record_error(error_type: &str, component: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, component])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment_per_label_set() {
        let before = BOOKINGS_TOTAL.with_label_values(&["test_outcome"]).get();
        record_booking_outcome("test_outcome");
        record_booking_outcome("test_outcome");
        assert_eq!(BOOKINGS_TOTAL.with_label_values(&["test_outcome"]).get(), before + 2);
    }

    #[test]
    fn test_cache_access_splits_hits_and_misses() {
        let hits = CACHE_HITS_TOTAL.with_label_values(&["test", "metrics"]).get();
        let misses = CACHE_MISSES_TOTAL.with_label_values(&["test", "metrics"]).get();
        record_cache_access("test", "metrics", true);
        record_cache_access("test", "metrics", false);
        record_cache_access("test", "metrics", false);
        assert_eq!(CACHE_HITS_TOTAL.with_label_values(&["test", "metrics"]).get(), hits + 1);
        assert_eq!(CACHE_MISSES_TOTAL.with_label_values(&["test", "metrics"]).get(), misses + 2);
    }
}
