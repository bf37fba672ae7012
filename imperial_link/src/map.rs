// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Named registry of cache nodes with staging for forward references.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::{HashMap, HashSet};

use crate::node::NodeId;

/// Handle to a [`LinkMap`] owned by [`Links`](crate::Links).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct MapId(u32);

impl MapId {
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

impl fmt::Debug for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MapId").field(&self.0).finish()
    }
}

/// One scope of the link namespace.
///
/// A map binds path names (see [`path`](crate::path)) to nodes without
/// owning them, and keeps a staging table of dependents waiting for names
/// that are not bound yet. Maps form a tree through their optional parent:
/// a struct tree root owns a map, nested structs share it, and detached
/// value structs get a child map whose parent is their owner's map.
///
/// Maps are manipulated through [`Links`](crate::Links), which also owns the
/// node graph the bindings point into.
#[derive(Clone, Default)]
pub struct LinkMap {
    pub(crate) names: HashMap<String, NodeId>,
    pub(crate) staged: HashMap<String, HashSet<NodeId>>,
    pub(crate) parent: Option<MapId>,
}

impl LinkMap {
    pub(crate) fn with_parent(parent: Option<MapId>) -> Self {
        Self {
            names: HashMap::new(),
            staged: HashMap::new(),
            parent,
        }
    }

    /// Returns the parent scope, if any.
    #[must_use]
    pub fn parent(&self) -> Option<MapId> {
        self.parent
    }

    /// Returns the node bound to `name` in this scope only.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Returns the number of bound names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing is bound in this scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns `true` if dependents are waiting for `name`.
    #[must_use]
    pub fn is_staged(&self, name: &str) -> bool {
        self.staged.get(name).is_some_and(|set| !set.is_empty())
    }

    /// Iterates the dependents staged under `name`.
    pub fn staged(&self, name: &str) -> impl Iterator<Item = NodeId> + '_ {
        self.staged.get(name).into_iter().flatten().copied()
    }

    /// Returns the bound names that fall under `prefix`.
    ///
    /// The aspect suffix of `prefix` (everything from the last `/`) is
    /// ignored, so `"Root{child}/name"` selects every facet of
    /// `Root{child}` and of its descendants. The stem only matches at a
    /// path boundary: `Root{child}` does not select `Root{children}`.
    #[must_use]
    pub fn names_under(&self, prefix: &str) -> Vec<String> {
        let stem = prefix.rsplit_once('/').map_or(prefix, |(stem, _)| stem);
        self.names
            .keys()
            .filter(|name| {
                name.strip_prefix(stem)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(['{', '.', '/']))
            })
            .cloned()
            .collect()
    }

    pub(crate) fn stage(&mut self, name: &str, dependent: NodeId) {
        if let Some(set) = self.staged.get_mut(name) {
            set.insert(dependent);
        } else {
            let mut set = HashSet::new();
            set.insert(dependent);
            self.staged.insert(String::from(name), set);
        }
    }

    pub(crate) fn unstage(&mut self, name: &str, dependent: NodeId) -> bool {
        let Some(set) = self.staged.get_mut(name) else {
            return false;
        };
        let removed = set.remove(&dependent);
        if set.is_empty() {
            self.staged.remove(name);
        }
        removed
    }
}

impl fmt::Debug for LinkMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkMap")
            .field("names", &self.names.len())
            .field("staged", &self.staged.len())
            .field("parent", &self.parent)
            .finish()
    }
}
