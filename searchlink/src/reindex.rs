//! Copy documents between indices by composing [`scan`] and [`bulk`]

use crate::actions::{BulkAction, OpType};
use crate::bulk::{bulk, BulkOptions, BulkSummary};
use crate::error::{Error, Result};
use crate::scan::{scan, ScanOptions};
use crate::transport::SearchClient;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Settings for [`reindex`]
#[derive(Debug, Clone, Default)]
pub struct ReindexOptions {
    /// Scan settings; `index` and `query` are overwritten per call
    pub scan: ScanOptions,
    /// Bulk settings for the write side
    pub bulk: BulkOptions,
    /// Operation written for each document, `index` when unset
    pub op_type: Option<OpType>,
    /// Count failures without keeping the failed items
    pub stats_only: bool,
}

/// Copy every document matching `query` from `source_index` to `target_index`
/// on the same cluster
pub async fn reindex<C>(
    client: Arc<C>,
    source_index: &str,
    target_index: &str,
    query: Option<Value>,
    options: ReindexOptions,
) -> Result<BulkSummary>
where
    C: SearchClient + ?Sized + 'static,
{
    reindex_to(client.clone(), client, source_index, target_index, query, options).await
}

/// Like [`reindex`], writing through `target_client` (possibly another cluster).
///
/// Hits keep their `_id`, `_source` and routing. A failure on either side
/// aborts the whole copy; documents already written stay written.
pub async fn reindex_to<C>(
    client: Arc<C>,
    target_client: Arc<C>,
    source_index: &str,
    target_index: &str,
    query: Option<Value>,
    options: ReindexOptions,
) -> Result<BulkSummary>
where
    C: SearchClient + ?Sized + 'static,
{
    info!("Reindexing '{}' into '{}'", source_index, target_index);

    let scan_options = ScanOptions {
        index: source_index.to_string(),
        query,
        ..options.scan
    };

    let target = target_index.to_string();
    let op_type = options.op_type;
    let actions = scan(client, scan_options)
        .map(move |hit| hit.and_then(|hit| hit_to_action(hit, &target, op_type)));

    let summary = bulk(target_client, actions, options.bulk, options.stats_only).await?;
    info!(
        "Reindexed '{}' into '{}': {} ok, {} failed",
        source_index, target_index, summary.success, summary.failed
    );
    Ok(summary)
}

/// Turn a search hit into a write against `target_index`.
///
/// Stored fields returned under `fields` are merged in first, so a `_routing`
/// field survives even when the hit carries it there instead of top-level.
pub fn hit_to_action(hit: Value, target_index: &str, op_type: Option<OpType>) -> Result<BulkAction> {
    let Value::Object(mut hit) = hit else {
        return Err(Error::InvalidAction("search hit is not an object".into()));
    };

    if let Some(Value::Object(fields)) = hit.remove("fields") {
        for (key, value) in fields {
            hit.insert(key, value);
        }
    }

    let op_type = op_type.unwrap_or_default();
    let source = if op_type.has_body() {
        Some(hit.remove("_source").unwrap_or_else(|| Value::Object(Default::default())))
    } else {
        None
    };

    Ok(BulkAction {
        op_type,
        index: Some(target_index.to_string()),
        id: hit.get("_id").and_then(first_scalar),
        routing: hit.get("_routing").and_then(first_scalar),
        meta: Default::default(),
        source,
    })
}

/// Plain string form of a scalar or of the first element of an array
fn first_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.first().and_then(first_scalar),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hit_keeps_id_source_and_routing() {
        let hit = json!({
            "_index": "test_index",
            "_id": "42",
            "_score": 1.0,
            "_routing": "es",
            "_source": {"answer": 42, "correct": true}
        });
        let action = hit_to_action(hit, "prod_index", None).unwrap();

        assert_eq!(action.op_type, OpType::Index);
        assert_eq!(action.index.as_deref(), Some("prod_index"));
        assert_eq!(action.id.as_deref(), Some("42"));
        assert_eq!(action.routing.as_deref(), Some("es"));
        assert_eq!(action.source, Some(json!({"answer": 42, "correct": true})));
    }

    #[test]
    fn test_routing_from_fields_is_merged() {
        let hit = json!({
            "_id": "1",
            "fields": {"_routing": ["shard-a"]},
            "_source": {"a": 1}
        });
        let action = hit_to_action(hit, "dest", Some(OpType::Create)).unwrap();
        assert_eq!(action.op_type, OpType::Create);
        assert_eq!(action.routing.as_deref(), Some("shard-a"));
    }

    #[test]
    fn test_hit_without_source_writes_empty_document() {
        let action = hit_to_action(json!({"_id": "7"}), "dest", None).unwrap();
        assert_eq!(action.source, Some(json!({})));
        assert_eq!(
            action.header(),
            json!({"index": {"_index": "dest", "_id": "7"}})
        );
    }

    #[test]
    fn test_non_object_hit_is_rejected() {
        assert!(hit_to_action(json!([1, 2]), "dest", None).is_err());
    }
}
