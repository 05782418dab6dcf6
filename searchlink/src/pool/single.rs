//! Pool for a single node

use super::{NodeOptions, NodePool, PoolNode};
use crate::error::{Error, Result};

/// Pool holding exactly one node.
///
/// There is nowhere else to route a request, so liveness reports are ignored
/// and the node is always returned.
pub struct SingleNodePool<N: PoolNode> {
    node: N,
    options: NodeOptions,
}

impl<N: PoolNode> SingleNodePool<N> {
    /// Fails with [`Error::Config`] unless exactly one node is given
    pub fn new(nodes: Vec<(N, NodeOptions)>) -> Result<Self> {
        let count = nodes.len();
        let mut nodes = nodes.into_iter();
        match (nodes.next(), count) {
            (Some((node, options)), 1) => Ok(Self { node, options }),
            _ => Err(Error::Config(format!(
                "single node pool needs exactly one node, got {}",
                count
            ))),
        }
    }

    /// Options registered with the node
    pub fn options(&self) -> &NodeOptions {
        &self.options
    }
}

impl<N: PoolNode> NodePool<N> for SingleNodePool<N> {
    fn get_connection(&self) -> Result<N> {
        Ok(self.node.clone())
    }

    fn mark_dead(&self, _node: &N) {}

    fn mark_live(&self, _node: &N) {}

    fn node_count(&self) -> usize {
        1
    }
}
