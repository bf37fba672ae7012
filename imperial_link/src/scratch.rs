// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reusable scratch buffers for invalidation traversals.

use alloc::vec::Vec;

use hashbrown::HashSet;

use crate::node::NodeId;

/// Reusable traversal state for [`LinkGraph::invalidate_with`](crate::LinkGraph::invalidate_with).
///
/// The visited set doubles as the per-call memo that makes invalidation
/// terminate on cyclic graphs: a node already in `visited` is skipped.
/// Callers that invalidate many nodes in one logical step can share one
/// scratch so each node is invalidated at most once across the whole step.
///
/// The buffers retain capacity across calls.
#[derive(Debug, Default)]
pub struct TraversalScratch {
    pub(crate) stack: Vec<NodeId>,
    pub(crate) visited: HashSet<NodeId>,
}

impl TraversalScratch {
    /// Creates an empty scratch buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            visited: HashSet::new(),
        }
    }

    /// Creates an empty scratch buffer with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stack: Vec::with_capacity(capacity),
            visited: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `true` if `node` was already visited since the last reset.
    #[must_use]
    pub fn visited(&self, node: NodeId) -> bool {
        self.visited.contains(&node)
    }

    /// Clears the memo so the scratch can serve a new call.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.visited.clear();
    }
}
