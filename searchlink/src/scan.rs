//! Scroll-based scanning over every hit of a query
//!
//! The first search opens a scroll context; each following page is fetched
//! with the latest scroll id. The context is released once iteration ends,
//! fails, or the consumer drops the stream early.

use crate::error::{Error, Result};
use crate::metrics;
use crate::transport::{Params, SearchClient, ShardStats};
use async_stream::stream;
use futures::stream::BoxStream;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Settings for [`scan`]
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Index name or pattern to search
    pub index: String,
    /// Search body, e.g. `{"query": {...}}`
    pub query: Option<Value>,
    /// How long the server keeps the context alive between pages
    pub scroll: String,
    /// Hits per shard per page
    pub size: usize,
    /// Keep the query's own sort instead of `_doc` order
    pub preserve_order: bool,
    /// Fail on pages that not every shard answered
    pub raise_on_error: bool,
    /// Release the scroll context when done
    pub clear_scroll: bool,
    /// Extra query parameters for the initial search
    pub params: Params,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            index: "_all".to_string(),
            query: None,
            scroll: "5m".to_string(),
            size: 1000,
            preserve_order: false,
            raise_on_error: true,
            clear_scroll: true,
            params: Params::new(),
        }
    }
}

impl ScanOptions {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Body of the initial search; a query that is not a JSON object is rejected
    pub fn search_body(&self) -> Result<Value> {
        let mut body = match &self.query {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(other) => {
                return Err(Error::Config(format!(
                    "scan query must be a JSON object, got {}",
                    other
                )))
            }
            None => json!({}),
        };
        if !self.preserve_order {
            body["sort"] = json!("_doc");
        }
        Ok(body)
    }

    /// Query parameters of the initial search
    pub fn search_params(&self) -> Params {
        let mut params = self.params.clone();
        params.insert("scroll".to_string(), self.scroll.clone());
        params.insert("size".to_string(), self.size.to_string());
        params
    }
}

/// Stream every hit matching `options.query`.
///
/// Hits of a page are always yielded before that page's shard accounting is
/// checked. A page is inconsistent when fewer shards answered than were
/// targeted (skipped shards count as answered) or fewer than answered the
/// first page; such a page is logged, and with `raise_on_error` the stream
/// then ends with [`Error::Scan`].
pub fn scan<C>(client: Arc<C>, options: ScanOptions) -> BoxStream<'static, Result<Value>>
where
    C: SearchClient + ?Sized + 'static,
{
    Box::pin(stream! {
        let body = match options.search_body() {
            Ok(body) => body,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        let params = options.search_params();
        let first = match client.search(&options.index, &body, &params).await {
            Ok(response) => response,
            Err(e) => {
                yield Err(e.into());
                return;
            }
        };

        let Some(scroll_id) = first.scroll_id.clone() else {
            debug!("Search on '{}' opened no scroll, yielding single page", options.index);
            for hit in first.hits.hits {
                yield Ok(hit);
            }
            return;
        };

        let mut guard = ScrollGuard::new(client.clone(), scroll_id, options.clear_scroll);
        let baseline = first.shards.map(|s| s.successful);
        let mut page = first;

        loop {
            if page.hits.hits.is_empty() {
                break;
            }
            metrics::record_scroll_page(page.hit_count());

            let has_next = page.scroll_id.is_some();
            let shards = page.shards;
            for hit in std::mem::take(&mut page.hits.hits) {
                yield Ok(hit);
            }

            if let Some(problem) = shards.and_then(|s| shard_problem(&s, baseline)) {
                warn!("Scroll {}: {}", guard.scroll_id(), problem);
                metrics::record_scroll_inconsistency();
                if options.raise_on_error {
                    let scroll_id = guard.scroll_id().to_string();
                    guard.release().await;
                    yield Err(Error::Scan { scroll_id, message: problem });
                    return;
                }
            }

            if !has_next {
                break;
            }

            page = match client.scroll(guard.scroll_id(), &options.scroll).await {
                Ok(next) => next,
                Err(e) => {
                    guard.release().await;
                    yield Err(e.into());
                    return;
                }
            };
            if let Some(id) = page.scroll_id.clone() {
                guard.update(id);
            }
        }

        guard.release().await;
    })
}

/// Describe why a page's shard accounting is off, if it is
fn shard_problem(shards: &ShardStats, baseline: Option<u32>) -> Option<String> {
    if !shards.is_complete() {
        return Some(format!(
            "Scroll request has only succeeded on {} (+{} skipped) shards out of {}.",
            shards.successful, shards.skipped, shards.total
        ));
    }
    match baseline {
        Some(expected) if shards.successful < expected => Some(format!(
            "Scroll request succeeded on {} shards, fewer than the {} the scroll started with.",
            shards.successful, expected
        )),
        _ => None,
    }
}

/// Owns the latest scroll id and makes sure it is released exactly once
struct ScrollGuard<C: SearchClient + ?Sized + 'static> {
    client: Arc<C>,
    scroll_id: String,
    clear: bool,
    released: bool,
}

impl<C: SearchClient + ?Sized + 'static> ScrollGuard<C> {
    fn new(client: Arc<C>, scroll_id: String, clear: bool) -> Self {
        Self {
            client,
            scroll_id,
            clear,
            released: false,
        }
    }

    fn scroll_id(&self) -> &str {
        &self.scroll_id
    }

    fn update(&mut self, scroll_id: String) {
        self.scroll_id = scroll_id;
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if !self.clear {
            return;
        }
        if let Err(e) = self.client.clear_scroll(&self.scroll_id).await {
            debug!("Failed to clear scroll {}: {}", self.scroll_id, e);
        }
    }
}

impl<C: SearchClient + ?Sized + 'static> Drop for ScrollGuard<C> {
    fn drop(&mut self) {
        if self.released || !self.clear {
            return;
        }
        self.released = true;

        let client = self.client.clone();
        let scroll_id = std::mem::take(&mut self.scroll_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.clear_scroll(&scroll_id).await {
                        debug!("Failed to clear abandoned scroll {}: {}", scroll_id, e);
                    }
                });
            }
            Err(_) => {
                warn!(
                    "Scroll {} abandoned outside a runtime, leaving it to expire",
                    scroll_id
                );
            }
        }
    }
}
