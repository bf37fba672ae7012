// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Imperial Link: memoized cache nodes and hierarchical link maps.
//!
//! This crate is the dependency graph underneath Imperial's struct trees.
//! It models lazily computed values as:
//!
//! - **Cache nodes** ([`CacheNode`]): a cached value, a validity flag, an
//!   optional rigid flag and the reverse edges to everything that must
//!   invalidate with it.
//! - **Link graph** ([`LinkGraph`]): the arena owning every node, with
//!   change-detecting [`set`](LinkGraph::set), memoizing
//!   [`get_or_refresh`](LinkGraph::get_or_refresh) and cycle-safe
//!   [`invalidate`](LinkGraph::invalidate).
//! - **Link maps** ([`LinkMap`], [`Links`]): scoped name tables that let a
//!   node depend on another by [`path`] name, before that name exists.
//!
//! Nodes do not store their refresh logic. Each node carries a tag `T`
//! chosen by the owner; when a node is invalid the owner reads the tag and
//! recomputes the value however it likes.
//!
//! ## Quick Start
//!
//! ```rust
//! use imperial_link::{Aspect, CacheNode, Links, path};
//!
//! let mut links = Links::<u64, &str>::new();
//! let scope = links.new_map(None);
//!
//! let total = links.graph_mut().insert(CacheNode::new("total"));
//! links.add_reference(scope, total, &path::key("Root", "count"));
//!
//! let count = links.graph_mut().insert(CacheNode::with_value(3, "count"));
//! links.register(scope, path::key("Root", "count"), count);
//!
//! let n = *links
//!     .graph_mut()
//!     .get_or_refresh(total, |g, _| Ok::<_, ()>(g.value(count).copied().unwrap_or(0) * 10))
//!     .unwrap();
//! assert_eq!(n, 30);
//!
//! links.graph_mut().set(count, 4);
//! assert!(!links.graph().is_valid(total));
//! assert_eq!(path::aspect("Root", Aspect::Name), "Root/name");
//! ```
//!
//! ## Cycles
//!
//! Dependency cycles are legal (mutually consistent calculation rules read
//! each other). Invalidation records every visited node in a
//! [`TraversalScratch`] and never visits a node twice, so it terminates and
//! reports how many nodes it invalidated.
//!
//! ## Teardown
//!
//! Handles are plain indices. When the owner of a node goes away it calls
//! [`Links::remove_node`], which unbinds the node's names (re-staging the
//! dependents that referenced them) and prunes every edge mentioning it.
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod graph;
mod links;
mod map;
mod node;
pub mod path;
mod scratch;

pub use graph::LinkGraph;
pub use links::Links;
pub use map::{LinkMap, MapId};
pub use node::{CacheNode, NodeId};
pub use path::Aspect;
pub use scratch::TraversalScratch;
