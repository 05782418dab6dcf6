//! Streaming bulk indexing
//!
//! Actions are pulled lazily from the input stream, grouped into chunks by
//! count and encoded size, and sent one chunk at a time. Items rejected with
//! 429 are resent with exponential backoff; everything else is reported once,
//! in input order, as `(ok, item)`.
//!
//! ```text
//! actions ──▶ Chunker ──▶ send_chunk ──┬──▶ (true, item)
//!                            ▲         ├──▶ (false, item)
//!                            └─ 429 ◀──┘    sleep(backoff)
//! ```

use crate::actions::{BulkAction, Chunker, OpType};
use crate::error::{Error, Result, TransportError};
use crate::metrics;
use crate::transport::{Params, SearchClient};
use async_stream::stream;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Status the cluster answers with when it is overloaded
pub const REJECTED_STATUS: u16 = 429;

/// Tuning for [`streaming_bulk`] and [`bulk`]
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// Maximum actions per request
    pub chunk_size: usize,
    /// Maximum encoded bytes per request
    pub max_chunk_bytes: usize,
    /// How many times rejected items are resent
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Collect failed items and end the stream with [`Error::BulkIndex`]
    pub raise_on_error: bool,
    /// Propagate call-level failures instead of reporting them per item
    pub raise_on_exception: bool,
    /// Default index for actions that name none
    pub index: Option<String>,
    /// Extra query parameters, e.g. `refresh`
    pub params: Params,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            max_chunk_bytes: 100 * 1024 * 1024,
            max_retries: 0,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(600),
            raise_on_error: true,
            raise_on_exception: true,
            index: None,
            params: Params::new(),
        }
    }
}

impl BulkOptions {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Per-item result details as reported by the bulk API.
///
/// Items that failed because the whole call failed carry the original
/// source in `data` and the call error in `exception`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkItemInfo {
    #[serde(rename = "_index", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(rename = "_seq_no", default, skip_serializing_if = "Option::is_none")]
    pub seq_no: Option<i64>,
    #[serde(rename = "_primary_term", default, skip_serializing_if = "Option::is_none")]
    pub primary_term: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip)]
    pub exception: Option<TransportError>,
}

/// One entry of a bulk response: `{"<op_type>": {...}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(
    try_from = "HashMap<OpType, BulkItemInfo>",
    into = "HashMap<OpType, BulkItemInfo>"
)]
pub struct BulkItem {
    pub op_type: OpType,
    pub info: BulkItemInfo,
}

impl BulkItem {
    pub fn new(op_type: OpType, info: BulkItemInfo) -> Self {
        Self { op_type, info }
    }

    /// Failure record for an action whose whole request failed
    pub fn from_exception(
        action: &BulkAction,
        default_index: Option<&str>,
        err: &TransportError,
    ) -> Self {
        Self {
            op_type: action.op_type,
            info: BulkItemInfo {
                index: action
                    .index
                    .clone()
                    .or_else(|| default_index.map(str::to_string)),
                id: action.id.clone(),
                status: err.status_code(),
                error: Some(Value::String(err.to_string())),
                data: action.source.clone(),
                exception: Some(err.clone()),
                ..Default::default()
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.info.status
    }

    /// 2xx status
    pub fn is_ok(&self) -> bool {
        matches!(self.info.status, Some(200..=299))
    }

    pub fn id(&self) -> Option<&str> {
        self.info.id.as_deref()
    }

    pub fn error(&self) -> Option<&Value> {
        self.info.error.as_ref()
    }
}

impl TryFrom<HashMap<OpType, BulkItemInfo>> for BulkItem {
    type Error = String;

    fn try_from(map: HashMap<OpType, BulkItemInfo>) -> std::result::Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(format!(
                "bulk item must have exactly one operation key, got {}",
                map.len()
            ));
        }
        map.into_iter()
            .next()
            .map(|(op_type, info)| BulkItem { op_type, info })
            .ok_or_else(|| "empty bulk item".to_string())
    }
}

impl From<BulkItem> for HashMap<OpType, BulkItemInfo> {
    fn from(item: BulkItem) -> Self {
        HashMap::from([(item.op_type, item.info)])
    }
}

/// Outcome counts of a [`bulk`] run
#[derive(Debug, Default)]
pub struct BulkSummary {
    pub success: usize,
    pub failed: usize,
    /// Failed items, unless only stats were requested
    pub errors: Vec<BulkItem>,
}

/// Index a stream of actions, yielding one `(ok, item)` per action.
///
/// Results come back in input order. With `raise_on_error` the failed items
/// are still yielded, and the stream then ends with [`Error::BulkIndex`]
/// holding all of them. Call-level failures with `raise_on_exception` end the
/// stream with that error, after the items earlier calls already settled;
/// without it each affected action is reported as a failed item carrying the
/// call error.
pub fn streaming_bulk<C, S>(
    client: Arc<C>,
    actions: S,
    options: BulkOptions,
) -> BoxStream<'static, Result<(bool, BulkItem)>>
where
    C: SearchClient + ?Sized + 'static,
    S: Stream<Item = Result<BulkAction>> + Send + 'static,
{
    Box::pin(stream! {
        let mut actions = Box::pin(actions);
        let mut chunker = Chunker::new(options.chunk_size, options.max_chunk_bytes);
        let mut failed = Vec::new();
        let mut exhausted = false;

        while !exhausted {
            let chunk = match actions.next().await {
                Some(Ok(action)) => match chunker.push(action) {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => continue,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                },
                Some(Err(e)) => {
                    yield Err(e);
                    return;
                }
                None => {
                    exhausted = true;
                    match chunker.finish() {
                        Some(chunk) => chunk,
                        None => break,
                    }
                }
            };

            debug!("Sending bulk chunk of {} actions", chunk.len());
            let outcome = send_chunk(client.as_ref(), &chunk, &options).await;

            for (ok, item) in outcome.settled {
                metrics::record_bulk_item(item.op_type.as_str(), ok);
                if !ok && options.raise_on_error {
                    failed.push(item.clone());
                }
                yield Ok((ok, item));
            }

            if let Some(e) = outcome.error {
                yield Err(e);
                return;
            }
        }

        if !failed.is_empty() {
            warn!("{} document(s) failed to index", failed.len());
            yield Err(Error::BulkIndex { errors: failed });
        }
    })
}

/// Run [`streaming_bulk`] to completion and count the outcomes.
///
/// With `stats_only` the failed items are counted but not kept.
pub async fn bulk<C, S>(
    client: Arc<C>,
    actions: S,
    options: BulkOptions,
    stats_only: bool,
) -> Result<BulkSummary>
where
    C: SearchClient + ?Sized + 'static,
    S: Stream<Item = Result<BulkAction>> + Send + 'static,
{
    let mut results = streaming_bulk(client, actions, options);
    let mut summary = BulkSummary::default();

    while let Some(result) = results.next().await {
        let (ok, item) = result?;
        if ok {
            summary.success += 1;
        } else {
            summary.failed += 1;
            if !stats_only {
                summary.errors.push(item);
            }
        }
    }

    Ok(summary)
}

/// What became of one chunk
struct ChunkOutcome {
    /// Settled results in input order
    settled: Vec<(bool, BulkItem)>,
    /// Call failure that stopped the chunk before every action settled
    error: Option<Error>,
}

/// Send one chunk, resending rejected items until they settle or retries run out.
///
/// Without an error, `settled` holds one result per action of `chunk`. When a
/// call fails for good, items settled by earlier calls are still returned.
async fn send_chunk<C>(client: &C, chunk: &[BulkAction], options: &BulkOptions) -> ChunkOutcome
where
    C: SearchClient + ?Sized,
{
    let mut slots: Vec<Option<(bool, BulkItem)>> = vec![None; chunk.len()];
    let mut pending: Vec<usize> = (0..chunk.len()).collect();
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            let delay = options.backoff_for(attempt);
            debug!(
                "Retrying {} bulk action(s) in {:?} (attempt {})",
                pending.len(),
                delay,
                attempt
            );
            tokio::time::sleep(delay).await;
        }

        let batch: Vec<BulkAction> = pending.iter().map(|&i| chunk[i].clone()).collect();
        let can_retry = attempt < options.max_retries;
        let mut rejected = Vec::new();

        match client
            .bulk(options.index.as_deref(), &batch, &options.params)
            .await
        {
            Ok(response) => {
                let mut items = response.items.into_iter();
                for &slot in &pending {
                    let action = &chunk[slot];
                    let mut item = items
                        .next()
                        .unwrap_or_else(|| missing_item(action, options.index.as_deref()));
                    if item.status() == Some(REJECTED_STATUS) && can_retry {
                        rejected.push(slot);
                        continue;
                    }
                    let ok = item.is_ok();
                    if !ok && item.info.data.is_none() {
                        item.info.data = action.source.clone();
                    }
                    slots[slot] = Some((ok, item));
                }
            }
            Err(err) => {
                metrics::record_bulk_chunk_failure(err.error_type());
                if options.raise_on_exception {
                    if err.is_rejection() && can_retry {
                        warn!("Bulk request rejected, backing off: {}", err);
                        metrics::record_bulk_retry(pending.len());
                        attempt += 1;
                        continue;
                    }
                    return ChunkOutcome {
                        settled: slots.into_iter().flatten().collect(),
                        error: Some(err.into()),
                    };
                }

                warn!("Bulk request of {} action(s) failed: {}", batch.len(), err);
                for &slot in &pending {
                    if err.is_rejection() && can_retry {
                        rejected.push(slot);
                        continue;
                    }
                    let item = BulkItem::from_exception(&chunk[slot], options.index.as_deref(), &err);
                    slots[slot] = Some((false, item));
                }
            }
        }

        if rejected.is_empty() {
            break;
        }
        metrics::record_bulk_retry(rejected.len());
        pending = rejected;
        attempt += 1;
    }

    ChunkOutcome {
        settled: slots.into_iter().flatten().collect(),
        error: None,
    }
}

/// Failure record for an action the response did not account for
fn missing_item(action: &BulkAction, default_index: Option<&str>) -> BulkItem {
    BulkItem {
        op_type: action.op_type,
        info: BulkItemInfo {
            index: action
                .index
                .clone()
                .or_else(|| default_index.map(str::to_string)),
            id: action.id.clone(),
            error: Some(Value::String("no result for action in bulk response".into())),
            ..Default::default()
        },
    }
}
