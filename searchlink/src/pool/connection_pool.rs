//! Multi-node pool with failure penalties and timed resurrection

use super::{NodeOptions, NodePool, PoolNode, Selector, SelectorKind};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::metrics;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Construction-time pool settings
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Shuffle the registration order once; the order is never reshuffled later
    pub randomize_hosts: bool,
    /// Built-in selection policy (ignored when a custom selector is supplied)
    pub selector: SelectorKind,
    /// Penalty for a first failure
    pub dead_timeout: Duration,
    /// Cap on the penalty
    pub max_dead_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            randomize_hosts: true,
            selector: SelectorKind::RoundRobin,
            dead_timeout: Duration::from_secs(60),
            max_dead_timeout: Duration::from_secs(1800),
        }
    }
}

impl From<&ClientConfig> for PoolOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            randomize_hosts: config.randomize_hosts,
            selector: config.selector,
            dead_timeout: config.dead_timeout(),
            max_dead_timeout: config.max_dead_timeout(),
        }
    }
}

/// Mutable liveness bookkeeping, guarded by a single lock
struct PoolState<N> {
    /// Nodes eligible for selection, in pool order
    live: Vec<N>,
    /// (resurrect at, registration slot); min-heap via `Reverse`
    dead: BinaryHeap<Reverse<(Instant, usize)>>,
    /// Consecutive failures; present only for nodes that failed since their last success
    fail_count: HashMap<N, u32>,
}

/// Pool of nodes with dead-node tracking.
///
/// A failing node is removed from the live list and scheduled for resurrection
/// after `dead_timeout * 2^(failures - 1)`, capped at `max_dead_timeout`. When
/// every node is dead, the one due soonest is resurrected immediately so that
/// [`get_connection`](NodePool::get_connection) always yields a node.
pub struct ConnectionPool<N: PoolNode> {
    nodes: Vec<N>,
    slots: HashMap<N, usize>,
    options: HashMap<N, NodeOptions>,
    selector: Box<dyn Selector<N>>,
    dead_timeout: Duration,
    max_dead_timeout: Duration,
    state: Mutex<PoolState<N>>,
}

impl<N: PoolNode> ConnectionPool<N> {
    /// Register `nodes` with their option bags.
    ///
    /// Fails with [`Error::Config`] when `nodes` is empty or lists a node twice.
    pub fn new(nodes: Vec<(N, NodeOptions)>, pool_options: PoolOptions) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::Config("no nodes specified for the connection pool".into()));
        }

        let mut ordered = Vec::with_capacity(nodes.len());
        let mut options = HashMap::with_capacity(nodes.len());
        for (node, opts) in nodes {
            if options.insert(node.clone(), opts).is_some() {
                return Err(Error::Config(format!("node {} registered twice", node)));
            }
            ordered.push(node);
        }

        if pool_options.randomize_hosts {
            ordered.shuffle(&mut rand::thread_rng());
        }

        let slots = ordered
            .iter()
            .enumerate()
            .map(|(slot, node)| (node.clone(), slot))
            .collect();

        info!(
            "Connection pool created with {} nodes (selector: {}, randomized: {})",
            ordered.len(),
            pool_options.selector.as_str(),
            pool_options.randomize_hosts
        );
        metrics::record_live_nodes(ordered.len());

        Ok(Self {
            state: Mutex::new(PoolState {
                live: ordered.clone(),
                dead: BinaryHeap::new(),
                fail_count: HashMap::new(),
            }),
            nodes: ordered,
            slots,
            options,
            selector: pool_options.selector.build(),
            dead_timeout: pool_options.dead_timeout,
            max_dead_timeout: pool_options.max_dead_timeout,
        })
    }

    /// Build a pool from bare node identifiers with empty option bags
    pub fn from_nodes(nodes: impl IntoIterator<Item = N>, pool_options: PoolOptions) -> Result<Self> {
        let nodes = nodes.into_iter().map(|n| (n, NodeOptions::new())).collect();
        Self::new(nodes, pool_options)
    }

    /// Replace the selection policy
    pub fn with_selector(mut self, selector: Box<dyn Selector<N>>) -> Self {
        self.selector = selector;
        self
    }

    /// Penalty applied after `failures` consecutive failures
    pub fn dead_timeout_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.dead_timeout
            .saturating_mul(1u32 << exponent)
            .min(self.max_dead_timeout)
    }

    /// [`get_connection`](NodePool::get_connection) evaluated at `now`
    pub fn get_connection_at(&self, now: Instant) -> Result<N> {
        let mut state = self.state.lock();

        self.resurrect_due(&mut state, now);

        if state.live.is_empty() {
            return Ok(self.force_resurrect(&mut state));
        }

        self.selector.select(&state.live, &self.options)
    }

    /// [`mark_dead`](NodePool::mark_dead) with an explicit failure time
    pub fn mark_dead_at(&self, node: &N, now: Instant) {
        let Some(&slot) = self.slots.get(node) else {
            info!("Attempted to mark {} dead, but it is not part of the pool", node);
            return;
        };

        let mut state = self.state.lock();
        state.live.retain(|n| n != node);

        let failures = {
            let count = state.fail_count.entry(node.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let timeout = self.dead_timeout_for(failures);
        state.dead.push(Reverse((now + timeout, slot)));

        warn!(
            "Node {} marked dead ({} consecutive failures), resurrecting in {}s",
            node,
            failures,
            timeout.as_secs()
        );
        metrics::record_node_marked_dead(&node.to_string(), failures);
        metrics::record_live_nodes(state.live.len());
    }

    /// Nodes currently eligible for selection, in pool order
    pub fn live_nodes(&self) -> Vec<N> {
        self.state.lock().live.clone()
    }

    /// Registered nodes in pool order (after any randomization)
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Consecutive failures recorded for `node` (0 when none)
    pub fn failure_count(&self, node: &N) -> u32 {
        self.state.lock().fail_count.get(node).copied().unwrap_or(0)
    }

    /// Number of pending resurrection entries (duplicates included)
    pub fn dead_count(&self) -> usize {
        self.state.lock().dead.len()
    }

    /// Earliest pending resurrection
    pub fn next_resurrection(&self) -> Option<(Instant, N)> {
        let state = self.state.lock();
        state
            .dead
            .peek()
            .map(|Reverse((at, slot))| (*at, self.nodes[*slot].clone()))
    }

    /// Move every node whose penalty has expired back into the live list
    fn resurrect_due(&self, state: &mut PoolState<N>, now: Instant) {
        while let Some(Reverse((at, slot))) = state.dead.peek().copied() {
            if at > now {
                break;
            }
            state.dead.pop();

            let node = &self.nodes[slot];
            if state.live.contains(node) {
                // stale entry: node was marked live or already resurrected
                continue;
            }
            info!("Resurrecting node {}", node);
            state.live.push(node.clone());
            metrics::record_node_resurrected(false);
            metrics::record_live_nodes(state.live.len());
        }
    }

    /// Revive the node due soonest; only called with an empty live list
    fn force_resurrect(&self, state: &mut PoolState<N>) -> N {
        let node = match state.dead.pop() {
            Some(Reverse((_, slot))) => self.nodes[slot].clone(),
            // every node not in the live list has a schedule entry, so an
            // empty schedule here means there is nothing better than any node
            None => self.nodes[rand::thread_rng().gen_range(0..self.nodes.len())].clone(),
        };

        warn!("No live nodes left, forcing resurrection of {}", node);
        state.live.push(node.clone());
        metrics::record_node_resurrected(true);
        metrics::record_live_nodes(state.live.len());
        node
    }
}

impl<N: PoolNode> NodePool<N> for ConnectionPool<N> {
    fn get_connection(&self) -> Result<N> {
        self.get_connection_at(Instant::now())
    }

    fn mark_dead(&self, node: &N) {
        self.mark_dead_at(node, Instant::now());
    }

    fn mark_live(&self, node: &N) {
        if !self.slots.contains_key(node) {
            return;
        }

        let mut state = self.state.lock();
        if state.fail_count.remove(node).is_some() {
            debug!("Node {} is healthy again, failure count cleared", node);
        }
        if !state.live.contains(node) {
            state.live.push(node.clone());
            metrics::record_live_nodes(state.live.len());
        }
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
