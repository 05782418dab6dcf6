//! Node pooling: which node to use next, and when a node is too unreliable to use
//!
//! ```text
//! Node lifecycle:  live ──mark_dead──▶ dead (scheduled) ──timeout / forced──▶ live
//!                    ▲                                                         │
//!                    └─────────────────────mark_live───────────────────────────┘
//! ```
//!
//! - [`ConnectionPool`]: many nodes, failure counting and timed resurrection
//! - [`SingleNodePool`]: exactly one node, never marked dead
//! - [`Selector`]: pluggable choice among the live nodes

mod connection_pool;
mod selector;
mod single;

pub use connection_pool::{ConnectionPool, PoolOptions};
pub use selector::{RandomSelector, RoundRobinSelector, Selector, SelectorKind};
pub use single::SingleNodePool;

use crate::error::Result;
use std::fmt::Display;
use std::hash::Hash;

/// Arbitrary per-node settings handed to selectors
pub type NodeOptions = serde_json::Map<String, serde_json::Value>;

/// Requirements on a node identifier held by a pool
pub trait PoolNode: Clone + Eq + Hash + Display + Send + Sync + 'static {}

impl<T> PoolNode for T where T: Clone + Eq + Hash + Display + Send + Sync + 'static {}

/// Liveness-tracking pool of nodes, consulted by the transport for every call
pub trait NodePool<N: PoolNode>: Send + Sync {
    /// Node to use for the next request. Never fails because nodes are dead.
    fn get_connection(&self) -> Result<N>;

    /// Report a connection-level failure on `node`
    fn mark_dead(&self, node: &N);

    /// Report a successful response from `node`
    fn mark_live(&self, node: &N);

    /// Number of registered nodes
    fn node_count(&self) -> usize;
}
