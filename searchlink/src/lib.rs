//! Searchlink - Resilient client helpers for Elasticsearch-compatible clusters
//!
//! Keeps a pool of cluster nodes healthy and moves documents in bulk without
//! the caller having to handle node failures, overload or scroll cleanup.
//!
//! # Architecture
//!
//! - **Pool**: live/dead node tracking with exponential dead timeouts and
//!   pluggable selectors (round-robin, random, custom)
//! - **Transport**: [`SearchClient`] seam plus a pooled HTTP implementation
//! - **Bulk**: chunked streaming indexing with per-item results and
//!   backoff on 429 rejections
//! - **Scan**: scroll iteration over every hit with shard-consistency checks
//! - **Reindex**: scan from one index, bulk into another
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use searchlink::{scan, ClientConfig, HttpTransport, ScanOptions};
//! use std::sync::Arc;
//!
//! # async fn run() -> searchlink::Result<()> {
//! let client = Arc::new(HttpTransport::new(&ClientConfig::default())?);
//! let mut hits = scan(client, ScanOptions::new("logs-*"));
//! while let Some(hit) = hits.next().await {
//!     println!("{}", hit?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod bulk;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod reindex;
pub mod scan;
pub mod transport;

pub use actions::{action_stream, document_stream, BulkAction, Chunker, OpType};
pub use bulk::{bulk, streaming_bulk, BulkItem, BulkItemInfo, BulkOptions, BulkSummary};
pub use config::{BulkConfig, ClientConfig, Config, ScanConfig};
pub use error::{Error, Result, TransportError};
pub use pool::{
    ConnectionPool, NodeOptions, NodePool, PoolOptions, RandomSelector, RoundRobinSelector,
    Selector, SelectorKind, SingleNodePool,
};
pub use reindex::{reindex, reindex_to, ReindexOptions};
pub use scan::{scan, ScanOptions};
pub use transport::{
    BulkResponse, HttpTransport, Node, Params, SearchClient, SearchResponse, ShardStats,
};
