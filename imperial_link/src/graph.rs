// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena of cache nodes with reverse dependency edges.

use alloc::vec::Vec;
use core::fmt;

use crate::node::{CacheNode, NodeId};
use crate::scratch::TraversalScratch;

/// Arena of [`CacheNode`]s and the "B must invalidate when A does" edges
/// between them.
///
/// Nodes are owned by the graph but logically belong to whoever created
/// them; the owner keeps the returned [`NodeId`] and removes the node with
/// [`remove`](Self::remove) on teardown, which prunes every edge touching
/// it.
///
/// Edges point from a dependency to its dependents: `add_link(a, b)` means
/// "when `a` invalidates, `b` invalidates too".
///
/// # Example
///
/// ```
/// use imperial_link::{CacheNode, LinkGraph};
///
/// let mut graph = LinkGraph::<i32, &str>::new();
/// let a = graph.insert(CacheNode::with_value(1, "a"));
/// let sum = graph.insert(CacheNode::new("sum"));
/// graph.add_link(a, sum);
///
/// let v = graph
///     .get_or_refresh(sum, |g, _| Ok::<_, ()>(g.value(a).copied().unwrap_or(0) + 1))
///     .unwrap();
/// assert_eq!(*v, 2);
///
/// // Changing `a` invalidates `sum`.
/// assert!(graph.set(a, 5));
/// assert!(!graph.is_valid(sum));
/// ```
#[derive(Clone)]
pub struct LinkGraph<V, T> {
    nodes: Vec<Option<CacheNode<V, T>>>,
    live: usize,
}

impl<V, T> Default for LinkGraph<V, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, T> LinkGraph<V, T> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            live: 0,
        }
    }

    /// Returns the number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the graph holds no live nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Adds a node and returns its handle.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` nodes are ever inserted.
    pub fn insert(&mut self, node: CacheNode<V, T>) -> NodeId {
        let id = NodeId::new(
            u32::try_from(self.nodes.len()).expect("too many cache nodes for NodeId (u32)"),
        );
        self.nodes.push(Some(node));
        self.live += 1;
        id
    }

    /// Removes a node, pruning every edge that mentions it.
    ///
    /// Only the node's own neighbours are visited. Returns the removed
    /// node, or `None` if it was already gone.
    pub fn remove(&mut self, id: NodeId) -> Option<CacheNode<V, T>> {
        let removed = self.nodes.get_mut(id.index())?.take()?;
        self.live -= 1;
        for dependency in &removed.links_out {
            if let Some(node) = self.node_mut(*dependency) {
                node.links_in.retain(|n| *n != id);
            }
        }
        for target in &removed.references_to {
            if let Some(node) = self.node_mut(*target) {
                node.references_in.remove(&id);
            }
        }
        for dependent in &removed.links_in {
            if let Some(node) = self.node_mut(*dependent) {
                node.links_out.retain(|n| *n != id);
            }
        }
        for dependent in &removed.references_in {
            if let Some(node) = self.node_mut(*dependent) {
                node.references_to.retain(|n| *n != id);
            }
        }
        Some(removed)
    }

    /// Returns `true` if `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Returns the node for `id`, if it is live.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&CacheNode<V, T>> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut CacheNode<V, T>> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Returns the cached value of `id` if it is valid.
    #[must_use]
    pub fn value(&self, id: NodeId) -> Option<&V> {
        self.node(id).and_then(CacheNode::value)
    }

    /// Returns `true` if `id` is live and holds a current value.
    #[must_use]
    pub fn is_valid(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(CacheNode::is_valid)
    }

    /// Returns the role tag of `id`.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&T> {
        self.node(id).map(CacheNode::tag)
    }

    /// Caches a freshly computed value without notifying dependents.
    ///
    /// This is the write half of a refresh: dependents were already
    /// invalidated when this node went stale, so nothing needs to fan out.
    pub fn store(&mut self, id: NodeId, value: V) {
        if let Some(node) = self.node_mut(id) {
            node.value = Some(value);
            node.valid = true;
        }
    }

    /// Drops the value of `id` and invalidates its dependents.
    ///
    /// Unlike [`invalidate`](Self::invalidate) the stale value is gone
    /// too. Returns the number of nodes invalidated, `id` included.
    pub fn clear(&mut self, id: NodeId) -> usize {
        let Some(node) = self.node_mut(id) else {
            return 0;
        };
        node.value = None;
        node.valid = true;
        self.invalidate(id)
    }

    /// Returns the valid value of `id`, refreshing it first if needed.
    ///
    /// `refresh` receives the graph (so it may read other nodes) and the
    /// node's tag. A failed refresh leaves the node invalid, so the next
    /// read retries.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a live node.
    pub fn get_or_refresh<E>(
        &mut self,
        id: NodeId,
        refresh: impl FnOnce(&mut Self, &T) -> Result<V, E>,
    ) -> Result<&V, E>
    where
        T: Clone,
    {
        let node = self.node(id).expect("get_or_refresh on a removed cache node");
        if !node.valid {
            let tag = node.tag.clone();
            let value = refresh(self, &tag)?;
            self.store(id, value);
        }
        Ok(self
            .value(id)
            .expect("cache node holds a value after refresh"))
    }

    /// Invalidates `id` and every transitive dependent.
    ///
    /// Returns the number of nodes that were invalidated. Each node is
    /// visited at most once, so this terminates on cyclic graphs.
    pub fn invalidate(&mut self, id: NodeId) -> usize {
        let mut scratch = TraversalScratch::new();
        self.invalidate_with(id, &mut scratch)
    }

    /// Invalidates `id` using `scratch` as the per-call memo.
    ///
    /// Nodes already recorded in `scratch` are skipped, which lets callers
    /// batch several invalidations into one logical call. The scratch is
    /// not reset.
    pub fn invalidate_with(&mut self, id: NodeId, scratch: &mut TraversalScratch) -> usize {
        scratch.stack.push(id);
        self.propagate(scratch)
    }

    /// Stores `value` and invalidates dependents if it changed.
    ///
    /// Setting a value equal to the cached one is a no-op apart from
    /// marking the node valid; change detection keeps redundant
    /// invalidation from fanning out. Returns `true` if the value changed.
    pub fn set(&mut self, id: NodeId, value: V) -> bool
    where
        V: PartialEq,
    {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        let changed = node.value.as_ref() != Some(&value);
        node.value = Some(value);
        node.valid = true;
        if changed {
            let mut scratch = TraversalScratch::new();
            scratch.visited.insert(id);
            if let Some(node) = self.node(id) {
                scratch.stack.extend(node.dependents());
            }
            self.propagate(&mut scratch);
        }
        changed
    }

    fn propagate(&mut self, scratch: &mut TraversalScratch) -> usize {
        let mut count = 0;
        while let Some(current) = scratch.stack.pop() {
            let Some(node) = self.node_mut(current) else {
                continue;
            };
            if node.rigid || !scratch.visited.insert(current) {
                continue;
            }
            node.valid = false;
            count += 1;
            scratch.stack.extend(node.dependents());
        }
        count
    }

    /// Registers `dependent` to invalidate whenever `dependency` does.
    ///
    /// Returns `true` if the edge was newly added.
    pub fn add_link(&mut self, dependency: NodeId, dependent: NodeId) -> bool {
        if !self.contains(dependent) {
            return false;
        }
        let added = match self.node_mut(dependency) {
            Some(node) if !node.links_in.contains(&dependent) => {
                node.links_in.push(dependent);
                true
            }
            _ => false,
        };
        if added && let Some(node) = self.node_mut(dependent) {
            node.links_out.push(dependency);
        }
        added
    }

    /// Registers several dependents of `dependency` at once.
    pub fn add_links(&mut self, dependency: NodeId, dependents: impl IntoIterator<Item = NodeId>) {
        for dependent in dependents {
            self.add_link(dependency, dependent);
        }
    }

    /// Removes a link edge. Returns `true` if it existed.
    pub fn remove_link(&mut self, dependency: NodeId, dependent: NodeId) -> bool {
        let Some(node) = self.node_mut(dependency) else {
            return false;
        };
        let before = node.links_in.len();
        node.links_in.retain(|n| *n != dependent);
        let removed = node.links_in.len() != before;
        if removed && let Some(node) = self.node_mut(dependent) {
            node.links_out.retain(|n| *n != dependency);
        }
        removed
    }

    /// Adds a named-reference dependent directly to `target`.
    pub fn add_reference(&mut self, target: NodeId, dependent: NodeId) -> bool {
        if !self.contains(dependent) {
            return false;
        }
        let added = self
            .node_mut(target)
            .is_some_and(|node| node.references_in.insert(dependent));
        if added && let Some(node) = self.node_mut(dependent) {
            node.references_to.push(target);
        }
        added
    }

    /// Removes a named-reference dependent from `target`.
    pub fn remove_reference(&mut self, target: NodeId, dependent: NodeId) -> bool {
        let removed = self
            .node_mut(target)
            .is_some_and(|node| node.references_in.remove(&dependent));
        if removed && let Some(node) = self.node_mut(dependent) {
            node.references_to.retain(|n| *n != target);
        }
        removed
    }

    /// Detaches every named-reference dependent of `target` and returns
    /// them.
    pub(crate) fn take_references(&mut self, target: NodeId) -> Vec<NodeId> {
        let dependents: Vec<NodeId> = match self.node_mut(target) {
            Some(node) => node.references_in.drain().collect(),
            None => return Vec::new(),
        };
        for dependent in &dependents {
            if let Some(node) = self.node_mut(*dependent) {
                node.references_to.retain(|n| *n != target);
            }
        }
        dependents
    }

    /// Iterates the direct dependents of `id`.
    pub fn dependents(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id).into_iter().flat_map(CacheNode::dependents)
    }
}

impl<V, T> fmt::Debug for LinkGraph<V, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkGraph")
            .field("live", &self.live)
            .field("slots", &self.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    fn chain(graph: &mut LinkGraph<u32, ()>, len: usize) -> Vec<NodeId> {
        let ids: Vec<_> = (0..len)
            .map(|i| graph.insert(CacheNode::with_value(i as u32, ())))
            .collect();
        for pair in ids.windows(2) {
            graph.add_link(pair[0], pair[1]);
        }
        ids
    }

    #[test]
    fn invalidate_follows_transitive_dependents() {
        let mut graph = LinkGraph::new();
        let ids = chain(&mut graph, 4);

        assert_eq!(graph.invalidate(ids[1]), 3);
        assert!(graph.is_valid(ids[0]));
        assert!(!graph.is_valid(ids[1]));
        assert!(!graph.is_valid(ids[3]));
    }

    #[test]
    fn invalidate_terminates_on_cycles_and_counts_each_node_once() {
        let mut graph = LinkGraph::new();
        let ids = chain(&mut graph, 3);
        // Close the loop: 0 -> 1 -> 2 -> 0, plus a reference back edge.
        graph.add_link(ids[2], ids[0]);
        graph.add_reference(ids[1], ids[0]);

        assert_eq!(graph.invalidate(ids[0]), 3);
        assert!(ids.iter().all(|id| !graph.is_valid(*id)));
    }

    #[test]
    fn shared_scratch_skips_nodes_from_earlier_calls() {
        let mut graph = LinkGraph::new();
        let ids = chain(&mut graph, 3);
        let mut scratch = TraversalScratch::new();

        assert_eq!(graph.invalidate_with(ids[1], &mut scratch), 2);
        assert_eq!(graph.invalidate_with(ids[0], &mut scratch), 1);
        assert!(scratch.visited(ids[2]));
    }

    #[test]
    fn rigid_nodes_neither_invalidate_nor_forward() {
        let mut graph = LinkGraph::new();
        let a = graph.insert(CacheNode::with_value(1_u32, ()));
        let name = graph.insert(CacheNode::with_value(2_u32, ()).rigid());
        let behind = graph.insert(CacheNode::with_value(3_u32, ()));
        graph.add_link(a, name);
        graph.add_link(name, behind);

        assert_eq!(graph.invalidate(a), 1);
        assert!(graph.is_valid(name));
        assert!(graph.is_valid(behind));
        assert_eq!(graph.invalidate(name), 0);
    }

    #[test]
    fn set_fans_out_only_on_change() {
        let mut graph = LinkGraph::new();
        let ids = chain(&mut graph, 2);

        assert!(!graph.set(ids[0], 0));
        assert!(graph.is_valid(ids[1]));

        assert!(graph.set(ids[0], 7));
        assert_eq!(graph.value(ids[0]), Some(&7));
        assert!(!graph.is_valid(ids[1]));
    }

    #[test]
    fn set_on_self_referencing_node_keeps_it_valid() {
        let mut graph = LinkGraph::new();
        let a = graph.insert(CacheNode::with_value(1_u32, ()));
        graph.add_link(a, a);

        assert!(graph.set(a, 2));
        assert!(graph.is_valid(a));
    }

    #[test]
    fn get_or_refresh_memoizes_until_invalidated() {
        let mut graph = LinkGraph::<u32, ()>::new();
        let source = graph.insert(CacheNode::with_value(10, ()));
        let derived = graph.insert(CacheNode::new(()));
        graph.add_link(source, derived);
        let calls = Cell::new(0);

        let read = |graph: &mut LinkGraph<u32, ()>| {
            *graph
                .get_or_refresh(derived, |g, _| {
                    calls.set(calls.get() + 1);
                    Ok::<_, ()>(g.value(source).copied().unwrap_or_default() * 2)
                })
                .unwrap()
        };

        assert_eq!(read(&mut graph), 20);
        assert_eq!(read(&mut graph), 20);
        assert_eq!(calls.get(), 1);

        graph.set(source, 11);
        assert_eq!(read(&mut graph), 22);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn failed_refresh_leaves_node_invalid() {
        let mut graph = LinkGraph::<u32, ()>::new();
        let node = graph.insert(CacheNode::new(()));

        assert_eq!(graph.get_or_refresh(node, |_, _| Err("nope")), Err("nope"));
        assert!(!graph.is_valid(node));
        assert_eq!(graph.get_or_refresh(node, |_, _| Ok::<_, ()>(3)), Ok(&3));
    }

    #[test]
    fn remove_prunes_edges() {
        let mut graph = LinkGraph::new();
        let ids = chain(&mut graph, 3);
        graph.add_reference(ids[0], ids[2]);

        assert!(graph.remove(ids[1]).is_some());
        assert_eq!(graph.len(), 2);
        assert!(!graph.contains(ids[1]));
        assert_eq!(graph.dependents(ids[0]).collect::<Vec<_>>(), [ids[2]]);
        assert!(graph.remove(ids[1]).is_none());
    }

    #[test]
    fn remove_prunes_edges_in_both_directions() {
        let mut graph = LinkGraph::new();
        let ids = chain(&mut graph, 3);
        graph.add_reference(ids[2], ids[0]);

        // Dependencies of the removed node forget it.
        graph.remove(ids[0]);
        assert_eq!(graph.dependents(ids[2]).count(), 0);
        assert_eq!(graph.node(ids[1]).unwrap().links_out.len(), 0);

        // Edges to dead nodes are refused.
        assert!(!graph.add_link(ids[1], ids[0]));
        assert!(!graph.add_reference(ids[1], ids[0]));

        graph.remove(ids[2]);
        assert_eq!(graph.dependents(ids[1]).count(), 0);
        assert_eq!(graph.invalidate(ids[1]), 1);
    }

    #[test]
    fn removed_references_can_be_added_again() {
        let mut graph = LinkGraph::new();
        let ids = chain(&mut graph, 2);
        assert!(graph.add_reference(ids[1], ids[0]));
        assert!(graph.remove_reference(ids[1], ids[0]));
        assert!(graph.node(ids[0]).unwrap().references_to.is_empty());
        assert!(graph.add_reference(ids[1], ids[0]));
        assert_eq!(graph.take_references(ids[1]), [ids[0]]);
        assert!(graph.node(ids[0]).unwrap().references_to.is_empty());
    }

    #[test]
    fn clear_drops_the_value_and_fans_out() {
        let mut graph = LinkGraph::new();
        let ids = chain(&mut graph, 2);
        assert_eq!(graph.clear(ids[0]), 2);
        assert!(graph.node(ids[0]).unwrap().stale_value().is_none());
        assert!(!graph.is_valid(ids[1]));
    }

    #[test]
    fn add_link_dedups() {
        let mut graph = LinkGraph::new();
        let ids = chain(&mut graph, 2);

        assert!(!graph.add_link(ids[0], ids[1]));
        assert!(graph.remove_link(ids[0], ids[1]));
        assert!(!graph.remove_link(ids[0], ids[1]));
        assert_eq!(graph.invalidate(ids[0]), 1);
    }
}
