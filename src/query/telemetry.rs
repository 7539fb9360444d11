use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const METRICS_TARGET: &str = "nexuslite_repository::metrics";

#[derive(Default)]
pub struct Metrics {
    pub methods_compiled: AtomicU64,
    pub cache_hits: AtomicU64,
    pub queries_total: AtomicU64,
    pub queries_slow_total: AtomicU64,
    pub execution_failures: AtomicU64,
}

#[derive(Default)]
pub struct Telemetry {
    pub metrics: Metrics,
    // Tests capture query lines in memory
    query_sink: RwLock<Option<Arc<RwLock<Vec<String>>>>>,
}

pub(crate) static TELEMETRY: std::sync::LazyLock<Telemetry> = std::sync::LazyLock::new(Telemetry::default);

pub fn set_query_sink_for_tests(sink: Arc<RwLock<Vec<String>>>) {
    *TELEMETRY.query_sink.write() = Some(sink);
}

fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub(crate) fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut h = Sha256::new();
    h.update(input.as_bytes());
    hex::encode(h.finalize())
}

pub fn record_compiled() {
    TELEMETRY.metrics.methods_compiled.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_hit() {
    TELEMETRY.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
}

pub fn record_failure() {
    TELEMETRY.metrics.execution_failures.fetch_add(1, Ordering::Relaxed);
}

/// One executed query as it appears in the metrics log.
#[derive(Debug, Clone, Copy)]
pub struct QueryRecord<'a> {
    pub collection: &'a str,
    pub method: &'a str,
    pub filter_fingerprint: &'a str,
    pub duration_ms: u128,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub result_count: Option<u64>,
    /// `RepositoryConfig::slow_query_ms` of the executing repository.
    pub slow_query_ms: u64,
}

/// Count the query and write its log line. Returns whether it was slow.
pub fn log_query(rec: &QueryRecord<'_>) -> bool {
    TELEMETRY.metrics.queries_total.fetch_add(1, Ordering::Relaxed);
    let duration_ms = crate::utils::num::u128_to_u64_saturating(rec.duration_ms);
    let slow = duration_ms >= rec.slow_query_ms;
    if slow {
        TELEMETRY.metrics.queries_slow_total.fetch_add(1, Ordering::Relaxed);
    }
    let line = serde_json::json!({
        "ts": now_ts(),
        "collection": rec.collection,
        "method": rec.method,
        "filter_hash": rec.filter_fingerprint,
        "duration_ms": duration_ms,
        "limit": rec.limit,
        "skip": rec.skip,
        "result_count": rec.result_count,
        "slow": slow
    })
    .to_string();
    if slow {
        log::warn!(target: METRICS_TARGET, "{line}");
    } else {
        log::info!(target: METRICS_TARGET, "{line}");
    }
    let sink = TELEMETRY.query_sink.read().clone();
    if let Some(sink) = sink {
        sink.write().push(line);
    }
    slow
}

#[must_use]
pub fn metrics_text() -> String {
    // OpenMetrics/Prometheus exposition format (no types/HELP for brevity)
    let m = &TELEMETRY.metrics;
    format!(
        "nexusrepo_methods_compiled_total {}\n\
         nexusrepo_compile_cache_hits_total {}\n\
         nexusrepo_queries_total {}\n\
         nexusrepo_queries_slow_total {}\n\
         nexusrepo_execution_failures_total {}\n",
        m.methods_compiled.load(Ordering::Relaxed),
        m.cache_hits.load(Ordering::Relaxed),
        m.queries_total.load(Ordering::Relaxed),
        m.queries_slow_total.load(Ordering::Relaxed),
        m.execution_failures.load(Ordering::Relaxed),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(text: &str, name: &str) -> u64 {
        text.lines()
            .find_map(|l| l.strip_prefix(name)?.trim().parse().ok())
            .unwrap_or_default()
    }

    #[test]
    fn counters_only_grow() {
        let before = metrics_text();
        record_compiled();
        record_failure();
        let after = metrics_text();
        assert!(counter(&after, "nexusrepo_methods_compiled_total") > counter(&before, "nexusrepo_methods_compiled_total"));
        assert!(counter(&after, "nexusrepo_execution_failures_total") > counter(&before, "nexusrepo_execution_failures_total"));
    }

    #[test]
    fn query_lines_are_tagged_slow_at_threshold() {
        let sink = Arc::new(RwLock::new(Vec::new()));
        set_query_sink_for_tests(sink.clone());
        let rec = QueryRecord {
            collection: "people",
            method: "findByLastname",
            filter_fingerprint: "abc",
            duration_ms: 5,
            limit: Some(10),
            skip: None,
            result_count: Some(2),
            slow_query_ms: 5,
        };
        assert!(log_query(&rec));
        assert!(!log_query(&QueryRecord { slow_query_ms: 6, ..rec }));
        let lines = sink.read().clone();
        let mine: Vec<serde_json::Value> = lines
            .iter()
            .filter_map(|l| serde_json::from_str(l).ok())
            .filter(|v: &serde_json::Value| v["filter_hash"] == "abc")
            .collect();
        assert!(mine.iter().any(|v| v["slow"] == true && v["method"] == "findByLastname"));
        assert!(mine.iter().any(|v| v["slow"] == false));
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let a = sha256_hex("{\"age\":{\"$gt\":30}}");
        assert_eq!(a.len(), 64);
        assert_eq!(a, sha256_hex("{\"age\":{\"$gt\":30}}"));
    }
}
