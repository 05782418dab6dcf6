//! Client seam between the helpers and the cluster
//!
//! The bulk, scan and reindex helpers only talk to a [`SearchClient`]. The
//! crate ships [`HttpTransport`] (pooled nodes over HTTP); tests and embedders
//! can supply their own implementation.

mod http;

pub use http::{parse_version, HttpTransport, Node};

use crate::actions::BulkAction;
use crate::bulk::BulkItem;
use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Query-string parameters passed through to a call
pub type Params = BTreeMap<String, String>;

/// Operations the helpers need from a cluster client
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Submit one bulk request. `index` is the default for actions without one.
    async fn bulk(
        &self,
        index: Option<&str>,
        actions: &[BulkAction],
        params: &Params,
    ) -> Result<BulkResponse, TransportError>;

    /// Run a search; a `scroll` param opens a scroll context
    async fn search(
        &self,
        index: &str,
        body: &Value,
        params: &Params,
    ) -> Result<SearchResponse, TransportError>;

    /// Fetch the next page of an open scroll
    async fn scroll(&self, scroll_id: &str, scroll: &str)
        -> Result<SearchResponse, TransportError>;

    /// Release a scroll context. A context that no longer exists is not an error.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), TransportError>;
}

/// Bulk API response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

/// Search / scroll response, reduced to what scanning needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    #[serde(rename = "_shards", default, skip_serializing_if = "Option::is_none")]
    pub shards: Option<ShardStats>,
    #[serde(default)]
    pub hits: SearchHits,
}

impl SearchResponse {
    pub fn hit_count(&self) -> usize {
        self.hits.hits.len()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHits {
    #[serde(default)]
    pub hits: Vec<Value>,
}

/// Shard accounting of one search or scroll page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStats {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub successful: u32,
    #[serde(default)]
    pub skipped: u32,
    #[serde(default)]
    pub failed: u32,
}

impl ShardStats {
    /// Every shard either answered or was skipped
    pub fn is_complete(&self) -> bool {
        self.successful.saturating_add(self.skipped) >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_response_parses_scroll_page() {
        let response: SearchResponse = serde_json::from_value(json!({
            "_scroll_id": "abc",
            "took": 3,
            "_shards": {"total": 5, "successful": 4, "skipped": 0, "failed": 1},
            "hits": {"total": {"value": 2}, "hits": [{"_id": "1"}, {"_id": "2"}]}
        }))
        .unwrap();

        assert_eq!(response.scroll_id.as_deref(), Some("abc"));
        assert_eq!(response.hit_count(), 2);
        let shards = response.shards.unwrap();
        assert!(!shards.is_complete());
    }

    #[test]
    fn test_shard_counts_near_u32_max_do_not_overflow() {
        let shards = ShardStats {
            total: u32::MAX,
            successful: u32::MAX,
            skipped: 1,
            failed: 0,
        };
        assert!(shards.is_complete());
    }

    #[test]
    fn test_search_response_tolerates_missing_sections() {
        let response: SearchResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.scroll_id.is_none());
        assert!(response.shards.is_none());
        assert_eq!(response.hit_count(), 0);
    }

    #[test]
    fn test_skipped_shards_count_as_complete() {
        let shards = ShardStats {
            total: 5,
            successful: 3,
            skipped: 2,
            failed: 0,
        };
        assert!(shards.is_complete());
    }
}
