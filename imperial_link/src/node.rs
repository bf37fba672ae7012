// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cache node identifiers and storage.

use alloc::string::String;
use core::fmt;

use hashbrown::HashSet;
use smallvec::SmallVec;

/// A compact handle to a [`CacheNode`] inside a [`LinkGraph`](crate::LinkGraph).
///
/// Handles are never reused: once a node is removed, its id stays dead.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns this id as a `usize` index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeId").field(&self.0).finish()
    }
}

/// A single memoized, invalidatable value cell.
///
/// A node caches a value of type `V` together with a validity flag. The
/// node does not know how to recompute itself; instead it carries a `tag`
/// describing its role, which the owner inspects to run the refresh (see
/// [`LinkGraph::get_or_refresh`](crate::LinkGraph::get_or_refresh)).
///
/// Dependents come in two flavours:
///
/// - **links**: unconditional reverse edges added directly between nodes.
/// - **references**: edges established by name through a
///   [`LinkMap`](crate::LinkMap), which may be staged before the target
///   node exists.
///
/// Both are followed by invalidation.
#[derive(Clone)]
pub struct CacheNode<V, T> {
    pub(crate) value: Option<V>,
    pub(crate) valid: bool,
    pub(crate) rigid: bool,
    pub(crate) tag: T,
    pub(crate) links_in: SmallVec<[NodeId; 4]>,
    pub(crate) references_in: HashSet<NodeId>,
    /// Nodes whose `links_in` hold this one.
    pub(crate) links_out: SmallVec<[NodeId; 4]>,
    /// Nodes whose `references_in` hold this one.
    pub(crate) references_to: SmallVec<[NodeId; 4]>,
    pub(crate) references_out: HashSet<String>,
}

impl<V, T> CacheNode<V, T> {
    /// Creates an empty, invalid node.
    #[must_use]
    pub fn new(tag: T) -> Self {
        Self {
            value: None,
            valid: false,
            rigid: false,
            tag,
            links_in: SmallVec::new(),
            references_in: HashSet::new(),
            links_out: SmallVec::new(),
            references_to: SmallVec::new(),
            references_out: HashSet::new(),
        }
    }

    /// Creates a node that already holds a valid value.
    #[must_use]
    pub fn with_value(value: V, tag: T) -> Self {
        let mut node = Self::new(tag);
        node.value = Some(value);
        node.valid = true;
        node
    }

    /// Marks the node as rigid.
    ///
    /// Rigid nodes are immune to invalidation and do not forward it. They
    /// are meant for identity facets that never change, such as a
    /// structural name.
    #[must_use]
    pub fn rigid(mut self) -> Self {
        self.rigid = true;
        self
    }

    /// Returns the cached value if it is valid.
    #[must_use]
    pub fn value(&self) -> Option<&V> {
        if self.valid { self.value.as_ref() } else { None }
    }

    /// Returns the last cached value, valid or not.
    #[must_use]
    pub fn stale_value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Returns `true` if the cached value is current.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Returns `true` if this node never invalidates.
    #[must_use]
    pub fn is_rigid(&self) -> bool {
        self.rigid
    }

    /// Returns the role tag supplied at creation.
    #[must_use]
    pub fn tag(&self) -> &T {
        &self.tag
    }

    /// Returns the names this node currently references.
    pub fn references_out(&self) -> impl Iterator<Item = &str> + '_ {
        self.references_out.iter().map(String::as_str)
    }

    /// Iterates every direct dependent (links first, then references).
    pub fn dependents(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.links_in
            .iter()
            .copied()
            .chain(self.references_in.iter().copied())
    }
}

impl<V: fmt::Debug, T: fmt::Debug> fmt::Debug for CacheNode<V, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheNode")
            .field("value", &self.value)
            .field("valid", &self.valid)
            .field("rigid", &self.rigid)
            .field("tag", &self.tag)
            .field("links_in", &self.links_in.len())
            .field("references_in", &self.references_in.len())
            .finish_non_exhaustive()
    }
}
