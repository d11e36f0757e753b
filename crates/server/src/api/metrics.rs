//! Prometheus metrics recording and background collection.

use corpusdb_core::storage::Database;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Records HTTP request metrics: increments `http_requests_total` and
/// records `http_request_duration_seconds`, labeled by method, path, and
/// status code.
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Records a search, labeled by the index kind that served it.
pub fn record_search(index_kind: &str) {
    counter!("corpusdb_search_total", "index_kind" => index_kind.to_string()).increment(1);
}

/// Records a write operation, labeled by entity and operation type.
pub fn record_write(entity: &'static str, operation: &'static str) {
    counter!("corpusdb_operations_total", "entity" => entity, "operation" => operation)
        .increment(1);
}

/// Updates store-level gauges: library count and total chunk count.
pub fn update_store_metrics(db: &Database) {
    gauge!("corpusdb_libraries_total").set(db.library_count() as f64);
    gauge!("corpusdb_chunks_total").set(db.chunk_count() as f64);
}
