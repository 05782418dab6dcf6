//! In-memory cluster double shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use searchlink::actions::BulkAction;
use searchlink::bulk::{BulkItem, BulkItemInfo};
use searchlink::transport::{BulkResponse, Params, SearchClient, SearchResponse, ShardStats};
use searchlink::TransportError;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

type BulkHandler =
    Box<dyn Fn(usize, &[BulkAction]) -> Result<BulkResponse, TransportError> + Send + Sync>;

/// Scriptable [`SearchClient`] recording every call it receives
pub struct MockClient {
    bulk_handler: BulkHandler,
    bulk_calls: AtomicUsize,
    pub bulk_batches: Mutex<Vec<(Option<String>, Vec<BulkAction>)>>,
    first_page: Mutex<Option<Result<SearchResponse, TransportError>>>,
    scroll_pages: Mutex<VecDeque<Result<SearchResponse, TransportError>>>,
    pub searches: Mutex<Vec<(String, Value, Params)>>,
    pub scroll_ids: Mutex<Vec<String>>,
    pub cleared: Mutex<Vec<String>>,
    clear_fails: bool,
}

impl MockClient {
    /// Client whose bulk calls all succeed
    pub fn new() -> Self {
        Self::with_bulk(|_, actions| Ok(ok_response(actions)))
    }

    /// Client answering bulk call number `n` (1-based) with `handler(n, actions)`
    pub fn with_bulk<F>(handler: F) -> Self
    where
        F: Fn(usize, &[BulkAction]) -> Result<BulkResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            bulk_handler: Box::new(handler),
            bulk_calls: AtomicUsize::new(0),
            bulk_batches: Mutex::new(Vec::new()),
            first_page: Mutex::new(None),
            scroll_pages: Mutex::new(VecDeque::new()),
            searches: Mutex::new(Vec::new()),
            scroll_ids: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
            clear_fails: false,
        }
    }

    /// Script the initial search response and the scroll pages after it
    pub fn with_pages(
        self,
        first: SearchResponse,
        rest: Vec<Result<SearchResponse, TransportError>>,
    ) -> Self {
        *self.first_page.lock() = Some(Ok(first));
        *self.scroll_pages.lock() = rest.into();
        self
    }

    pub fn with_failing_search(self, err: TransportError) -> Self {
        *self.first_page.lock() = Some(Err(err));
        self
    }

    pub fn with_failing_clear(mut self) -> Self {
        self.clear_fails = true;
        self
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn scroll_calls(&self) -> usize {
        self.scroll_ids.lock().len()
    }

    pub fn clear_calls(&self) -> usize {
        self.cleared.lock().len()
    }

    /// Every action sent in every bulk call, in order
    pub fn sent_actions(&self) -> Vec<BulkAction> {
        self.bulk_batches
            .lock()
            .iter()
            .flat_map(|(_, batch)| batch.clone())
            .collect()
    }
}

#[async_trait]
impl SearchClient for MockClient {
    async fn bulk(
        &self,
        index: Option<&str>,
        actions: &[BulkAction],
        _params: &Params,
    ) -> Result<BulkResponse, TransportError> {
        let call = self.bulk_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.bulk_batches
            .lock()
            .push((index.map(str::to_string), actions.to_vec()));
        (self.bulk_handler)(call, actions)
    }

    async fn search(
        &self,
        index: &str,
        body: &Value,
        params: &Params,
    ) -> Result<SearchResponse, TransportError> {
        self.searches
            .lock()
            .push((index.to_string(), body.clone(), params.clone()));
        self.first_page
            .lock()
            .take()
            .unwrap_or_else(|| Ok(SearchResponse::default()))
    }

    async fn scroll(&self, scroll_id: &str, _scroll: &str) -> Result<SearchResponse, TransportError> {
        self.scroll_ids.lock().push(scroll_id.to_string());
        self.scroll_pages
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(page(Some(scroll_id), vec![], None)))
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), TransportError> {
        self.cleared.lock().push(scroll_id.to_string());
        if self.clear_fails {
            return Err(TransportError::status(500, "clear failed"));
        }
        Ok(())
    }
}

/// Successful item for `action` with the status its op type gets on success
pub fn ok_item(action: &BulkAction) -> BulkItem {
    let status = match action.op_type {
        searchlink::OpType::Index | searchlink::OpType::Create => 201,
        _ => 200,
    };
    item_with_status(action, status)
}

pub fn item_with_status(action: &BulkAction, status: u16) -> BulkItem {
    let error = if (200..300).contains(&status) {
        None
    } else {
        Some(json!({"type": "mock_exception", "reason": format!("status {}", status)}))
    };
    BulkItem::new(
        action.op_type,
        BulkItemInfo {
            index: action.index.clone(),
            id: action.id.clone(),
            status: Some(status),
            error,
            ..Default::default()
        },
    )
}

pub fn ok_response(actions: &[BulkAction]) -> BulkResponse {
    BulkResponse {
        took: 1,
        errors: false,
        items: actions.iter().map(ok_item).collect(),
    }
}

/// Response with the given per-item statuses
pub fn status_response(actions: &[BulkAction], statuses: &[u16]) -> BulkResponse {
    let items: Vec<BulkItem> = actions
        .iter()
        .zip(statuses)
        .map(|(action, status)| item_with_status(action, *status))
        .collect();
    BulkResponse {
        took: 1,
        errors: items.iter().any(|item| !item.is_ok()),
        items,
    }
}

/// Scroll page with hits `{"_id": id}` and optional shard accounting
pub fn page(scroll_id: Option<&str>, ids: Vec<&str>, shards: Option<(u32, u32, u32)>) -> SearchResponse {
    let hits = ids
        .into_iter()
        .map(|id| json!({"_index": "test_index", "_id": id, "_source": {"id": id}}))
        .collect();
    SearchResponse {
        scroll_id: scroll_id.map(str::to_string),
        shards: shards.map(|(total, successful, skipped)| ShardStats {
            total,
            successful,
            skipped,
            failed: total.saturating_sub(successful + skipped),
        }),
        hits: searchlink::transport::SearchHits { hits },
    }
}

/// `n` index actions with ids "0".."n-1"
pub fn actions(n: usize) -> Vec<BulkAction> {
    (0..n)
        .map(|i| BulkAction::index("i", json!({"answer": i})).with_id(i.to_string()))
        .collect()
}
