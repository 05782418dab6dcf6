//! Node selection policies
//!
//! A [`Selector`] picks one node out of the pool's current live list. The
//! pool owns the list and its order; selectors only decide which position to
//! take. Custom policies may consult the per-node option bag and return a
//! value derived from it instead of the candidate itself.

use super::NodeOptions;
use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Strategy for choosing a node among live candidates
pub trait Selector<N>: Send + Sync {
    /// Pick one node. `candidates` is never reordered by the caller between
    /// calls except for nodes leaving or rejoining the live set.
    fn select(&self, candidates: &[N], options: &HashMap<N, NodeOptions>) -> Result<N>;
}

/// Built-in selection policies, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// Cycle through the live list in order
    #[default]
    RoundRobin,
    /// Uniform random choice on every call
    Random,
}

impl SelectorKind {
    /// Create a fresh selector for a pool
    pub fn build<N>(self) -> Box<dyn Selector<N>>
    where
        N: Clone + Eq + Hash + Send + Sync + 'static,
    {
        match self {
            SelectorKind::RoundRobin => Box::new(RoundRobinSelector::new()),
            SelectorKind::Random => Box::new(RandomSelector),
        }
    }

    /// Get policy name as a string for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorKind::RoundRobin => "round_robin",
            SelectorKind::Random => "random",
        }
    }
}

/// Round-robin over the current candidate list.
///
/// A single monotonically increasing counter is taken modulo the length of
/// whatever list is passed in, so a shrinking live set keeps rotating over
/// the survivors.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position the next call will use for a list of `len` candidates
    pub fn next_index(&self, len: usize) -> Result<usize> {
        if len == 0 {
            return Err(Error::Config("no nodes available for selection".into()));
        }
        Ok(self.next.fetch_add(1, Ordering::Relaxed) % len)
    }
}

impl<N> Selector<N> for RoundRobinSelector
where
    N: Clone + Eq + Hash + Send + Sync,
{
    fn select(&self, candidates: &[N], _options: &HashMap<N, NodeOptions>) -> Result<N> {
        let idx = self.next_index(candidates.len())?;
        Ok(candidates[idx].clone())
    }
}

/// Picks a random candidate on every call
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl<N> Selector<N> for RandomSelector
where
    N: Clone + Eq + Hash + Send + Sync,
{
    fn select(&self, candidates: &[N], _options: &HashMap<N, NodeOptions>) -> Result<N> {
        candidates
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| Error::Config("no nodes available for selection".into()))
    }
}
