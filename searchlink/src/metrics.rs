//! Client observability metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! application installs a recorder.
//! - Node liveness (marked dead, resurrected, live count)
//! - Bulk item outcomes and retries
//! - Scroll pages and shard inconsistencies

/// Record a node being marked dead
pub fn record_node_marked_dead(node: &str, failures: u32) {
    metrics::counter!(
        "searchlink_node_marked_dead_total",
        "node" => node.to_string(),
    )
    .increment(1);

    metrics::gauge!(
        "searchlink_node_consecutive_failures",
        "node" => node.to_string(),
    )
    .set(failures as f64);
}

/// Record a node returning to the live set
pub fn record_node_resurrected(forced: bool) {
    let kind = if forced { "forced" } else { "timed" };
    metrics::counter!(
        "searchlink_node_resurrections_total",
        "kind" => kind,
    )
    .increment(1);
}

/// Record the current number of live nodes
pub fn record_live_nodes(count: usize) {
    metrics::gauge!("searchlink_live_nodes").set(count as f64);
}

/// Record the final outcome of one bulk item
pub fn record_bulk_item(op_type: &str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(
        "searchlink_bulk_items_total",
        "op_type" => op_type.to_string(),
        "status" => status,
    )
    .increment(1);
}

/// Record items queued for another bulk attempt
pub fn record_bulk_retry(items: usize) {
    metrics::counter!("searchlink_bulk_retries_total").increment(1);
    metrics::counter!("searchlink_bulk_retried_items_total").increment(items as u64);
}

/// Record a bulk call that failed as a whole
pub fn record_bulk_chunk_failure(error_type: &str) {
    metrics::counter!(
        "searchlink_bulk_chunk_failures_total",
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}

/// Record one scroll page
pub fn record_scroll_page(hits: usize) {
    metrics::counter!("searchlink_scroll_pages_total").increment(1);
    metrics::histogram!("searchlink_scroll_page_hits").record(hits as f64);
}

/// Record a scroll page answered by fewer shards than expected
pub fn record_scroll_inconsistency() {
    metrics::counter!("searchlink_scroll_inconsistencies_total").increment(1);
}
