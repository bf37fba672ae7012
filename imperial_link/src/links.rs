// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Combined node graph and link maps.

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashSet;

use crate::graph::LinkGraph;
use crate::map::{LinkMap, MapId};
use crate::node::{CacheNode, NodeId};

/// A [`LinkGraph`] together with the [`LinkMap`] scopes that name its nodes.
///
/// Named references are how calculation rules declare what they read: a
/// dependent asks for `"Root.key/basic"` and is attached to whichever node
/// gets bound under that name, now or later.
///
/// # Example
///
/// ```
/// use imperial_link::{CacheNode, Links};
///
/// let mut links = Links::<i32, ()>::new();
/// let root = links.new_map(None);
///
/// // The dependent is created before the node it reads.
/// let sum = links.graph_mut().insert(CacheNode::with_value(0, ()));
/// links.add_reference(root, sum, "Root.a/basic");
///
/// let a = links.graph_mut().insert(CacheNode::with_value(1, ()));
/// links.register(root, "Root.a/basic", a);
///
/// links.graph_mut().set(a, 2);
/// assert!(!links.graph().is_valid(sum));
/// ```
#[derive(Debug, Clone)]
pub struct Links<V, T> {
    graph: LinkGraph<V, T>,
    maps: Vec<LinkMap>,
}

impl<V, T> Default for Links<V, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, T> Links<V, T> {
    /// Creates an empty graph with no maps.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: LinkGraph::new(),
            maps: Vec::new(),
        }
    }

    /// Returns the underlying node graph.
    #[must_use]
    pub fn graph(&self) -> &LinkGraph<V, T> {
        &self.graph
    }

    /// Returns the underlying node graph mutably.
    #[must_use]
    pub fn graph_mut(&mut self) -> &mut LinkGraph<V, T> {
        &mut self.graph
    }

    /// Creates a new scope, optionally nested under `parent`.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` maps are created.
    pub fn new_map(&mut self, parent: Option<MapId>) -> MapId {
        let id = MapId::new(u32::try_from(self.maps.len()).expect("too many link maps"));
        self.maps.push(LinkMap::with_parent(parent));
        id
    }

    /// Returns the map for `id`.
    #[must_use]
    pub fn map(&self, id: MapId) -> Option<&LinkMap> {
        self.maps.get(id.index())
    }

    /// Iterates the ancestors of `map`, nearest first.
    pub fn ancestors(&self, map: MapId) -> impl Iterator<Item = MapId> + '_ {
        let mut next = self.map(map).and_then(LinkMap::parent);
        core::iter::from_fn(move || {
            let current = next?;
            next = self.map(current).and_then(LinkMap::parent);
            Some(current)
        })
    }

    /// Looks `name` up in `map` and then in its ancestors.
    #[must_use]
    pub fn lookup(&self, map: MapId, name: &str) -> Option<NodeId> {
        core::iter::once(map)
            .chain(self.ancestors(map))
            .find_map(|m| self.map(m).and_then(|scope| scope.get(name)))
    }

    /// Binds `name` to `node` in `map`.
    ///
    /// Dependents staged under `name` are attached to `node`, and the
    /// copies of those requests that were forwarded to ancestor scopes are
    /// withdrawn. A previous binding of the same name is released first,
    /// with its dependents re-staged so they migrate to `node`.
    pub fn register(&mut self, map: MapId, name: impl Into<String>, node: NodeId) {
        let name = name.into();
        if self
            .map(map)
            .is_some_and(|scope| scope.names.contains_key(&name))
        {
            self.release(map.index(), &name);
        }
        let ancestors: Vec<MapId> = self.ancestors(map).collect();
        let Some(scope) = self.maps.get_mut(map.index()) else {
            return;
        };
        let waiting = scope.staged.remove(&name).unwrap_or_default();
        for dependent in &waiting {
            self.graph.add_reference(node, *dependent);
            for ancestor in &ancestors {
                self.maps[ancestor.index()].unstage(&name, *dependent);
            }
        }
        self.maps[map.index()].names.insert(name, node);
    }

    /// Unbinds every name of `map` that falls under `prefix`.
    ///
    /// The aspect suffix of `prefix` is ignored (see
    /// [`LinkMap::names_under`]). Dependents of each unbound node are
    /// re-staged under its name rather than dropped, so rebinding the name
    /// later restores the edges. Returns the number of names unbound.
    pub fn unregister(&mut self, map: MapId, prefix: &str) -> usize {
        let Some(scope) = self.map(map) else {
            return 0;
        };
        let names = scope.names_under(prefix);
        for name in &names {
            self.release(map.index(), name);
        }
        names.len()
    }

    fn release(&mut self, map: usize, name: &str) {
        let Some(node) = self.maps[map].names.remove(name) else {
            return;
        };
        let dependents = self.graph.take_references(node);
        let scope = &mut self.maps[map];
        for dependent in dependents {
            scope.stage(name, dependent);
        }
    }

    /// Makes `dependent` invalidate whenever the node named `target` does.
    ///
    /// If `target` is bound in `map` the edge is added immediately.
    /// Otherwise the request is staged in `map` and forwarded to the
    /// parent scope, so an outward reference can be satisfied by an
    /// ancestor.
    pub fn add_reference(&mut self, map: MapId, dependent: NodeId, target: &str) {
        let mut current = Some(map);
        while let Some(id) = current {
            let Some(scope) = self.maps.get_mut(id.index()) else {
                return;
            };
            if let Some(node) = scope.get(target) {
                self.graph.add_reference(node, dependent);
                return;
            }
            scope.stage(target, dependent);
            current = scope.parent;
        }
    }

    /// Undoes [`add_reference`](Self::add_reference) in `map` and its ancestors.
    pub fn remove_reference(&mut self, map: MapId, dependent: NodeId, target: &str) {
        let mut current = Some(map);
        while let Some(id) = current {
            let Some(scope) = self.maps.get_mut(id.index()) else {
                return;
            };
            if let Some(node) = scope.get(target) {
                self.graph.remove_reference(node, dependent);
            }
            scope.unstage(target, dependent);
            current = scope.parent;
        }
    }

    /// Replaces the set of names `node` references.
    ///
    /// The previous set is diffed against `names`: removed names are
    /// dereferenced and added names referenced, in every scope of `maps`.
    /// Returns `true` if the set changed.
    pub fn set_outgoing<S: AsRef<str>>(
        &mut self,
        node: NodeId,
        names: impl IntoIterator<Item = S>,
        maps: &[MapId],
    ) -> bool {
        let wanted: HashSet<String> = names
            .into_iter()
            .map(|n| String::from(n.as_ref()))
            .collect();
        let Some(current) = self.graph.node(node) else {
            return false;
        };
        let removed: Vec<String> = current
            .references_out
            .difference(&wanted)
            .cloned()
            .collect();
        let added: Vec<String> = wanted
            .difference(&current.references_out)
            .cloned()
            .collect();
        if removed.is_empty() && added.is_empty() {
            return false;
        }
        for &map in maps {
            for name in &removed {
                self.remove_reference(map, node, name);
            }
            for name in &added {
                self.add_reference(map, node, name);
            }
        }
        if let Some(n) = self.graph.node_mut(node) {
            n.references_out = wanted;
        }
        true
    }

    /// Removes `node` from the graph and from every scope.
    ///
    /// Bindings to the node are released (re-staging its dependents) and
    /// any staged requests made by the node are discarded.
    pub fn remove_node(&mut self, node: NodeId) -> Option<CacheNode<V, T>> {
        for index in 0..self.maps.len() {
            let bound: Vec<String> = self.maps[index]
                .names
                .iter()
                .filter(|(_, n)| **n == node)
                .map(|(name, _)| name.clone())
                .collect();
            for name in bound {
                self.release(index, &name);
            }
            let scope = &mut self.maps[index];
            scope.staged.retain(|_, waiting| {
                waiting.remove(&node);
                !waiting.is_empty()
            });
        }
        self.graph.remove(node)
    }
}
