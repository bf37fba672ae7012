// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The struct tree: an arena of structs sharing one link graph.
//!
//! Every struct registers four aspect nodes under its path prefix:
//!
//! - `/name`: rigid, holds the struct's name.
//! - `/basic`: the basic value, stored or computed.
//! - `/children`: the ordered child list.
//! - `/packed`: the serialized bytes, for types with a codec.
//!
//! Keys register one more node each, `<prefix>.<key>/basic`, holding the
//! struct the key resolves to. Children share their parent's link map;
//! roots, value structs owned by keys, and clones each get their own, with
//! value structs and clones scoped under the map they were created from.

use core::fmt;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use imperial_link::{Aspect, CacheNode, Links, MapId, NodeId, path};

use crate::codec::Unserializer;
use crate::error::{Error, Result};
use crate::id::{StructId, TypeHandle};
use crate::journal::Journal;
use crate::key::KeyState;
use crate::reference::{Ref, Relative};
use crate::schema::{BasicKind, Schema};
use crate::value::Value;

/// What a cache node of the tree holds.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Cached {
    Value(Value),
    Struct(StructId),
    Children(Vec<StructId>),
}

/// Which part of which struct a cache node belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum NodeRole {
    Name(StructId),
    Basic(StructId),
    Children(StructId),
    Packed(StructId),
    Key(StructId, usize),
}

impl NodeRole {
    fn owner(self) -> StructId {
        match self {
            Self::Name(id)
            | Self::Basic(id)
            | Self::Children(id)
            | Self::Packed(id)
            | Self::Key(id, _) => id,
        }
    }
}

#[derive(Debug)]
pub(crate) struct KeyData {
    pub(crate) name: String,
    pub(crate) node: NodeId,
    pub(crate) state: KeyState,
    /// The struct assigned with `set`, if any.
    pub(crate) explicit: Option<StructId>,
    /// The value struct this key created and must remove.
    pub(crate) owned: Option<StructId>,
    /// The maps the key's references were last registered in.
    pub(crate) watch: Vec<MapId>,
}

#[derive(Debug)]
pub(crate) struct StructData {
    pub(crate) ty: TypeHandle,
    pub(crate) name: String,
    pub(crate) prefix: String,
    pub(crate) map: MapId,
    pub(crate) parent: Option<StructId>,
    pub(crate) container: Option<StructId>,
    pub(crate) benefactor: Option<StructId>,
    pub(crate) donor: Option<StructId>,
    pub(crate) clones: Vec<StructId>,
    pub(crate) children: Vec<StructId>,
    pub(crate) keys: Vec<KeyData>,
    pub(crate) name_node: NodeId,
    pub(crate) basic_node: NodeId,
    pub(crate) children_node: NodeId,
    pub(crate) packed_node: NodeId,
}

impl StructData {
    pub(crate) fn key_index(&self, name: &str) -> Option<usize> {
        self.keys.iter().position(|k| k.name == name)
    }

    fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        [
            self.name_node,
            self.basic_node,
            self.children_node,
            self.packed_node,
        ]
        .into_iter()
        .chain(self.keys.iter().map(|k| k.node))
    }
}

/// Where a new struct goes.
struct Placement {
    map: MapId,
    prefix: String,
    parent: Option<StructId>,
    container: Option<StructId>,
    benefactor: Option<StructId>,
}

/// A tree of structs over one [`Schema`].
///
/// The tree owns every struct, key and cache node; structs are addressed by
/// [`StructId`]. Handles of removed structs stay invalid forever and every
/// operation on them fails with [`Error::LibraryMisuse`].
///
/// A tree is a single-threaded session. Values are computed when read and
/// cached until something they depend on changes.
///
/// # Example
///
/// ```rust
/// use imperial_core::{Tree, builtin};
///
/// let mut tree = Tree::new(builtin::schema().unwrap());
/// let number = tree.create_root("Number", "answer").unwrap();
/// tree.set(number, "", 42).unwrap();
///
/// assert_eq!(tree.number(number, "").unwrap(), 42);
/// // `size` was never assigned; it falls back to its default of 4 bytes.
/// assert_eq!(tree.number(number, "size.bits").unwrap(), 32);
/// assert!(tree.is_defaulted(number, "size").unwrap());
/// ```
pub struct Tree {
    pub(crate) schema: Arc<Schema>,
    structs: Vec<Option<StructData>>,
    pub(crate) links: Links<Cached, NodeRole>,
    pub(crate) parsers: HashMap<StructId, Unserializer>,
    /// Keys and aspects whose refresh is running, to break cycles.
    pub(crate) resolving: HashSet<(StructId, String)>,
    /// Undo log of the outermost `set_all` in progress.
    pub(crate) journal: Option<Journal>,
}

impl Tree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            structs: Vec::new(),
            links: Links::new(),
            parsers: HashMap::new(),
            resolving: HashSet::new(),
            journal: None,
        }
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the number of live structs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.structs.iter().flatten().count()
    }

    /// Returns `true` if the tree holds no structs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `id` is a live struct.
    #[must_use]
    pub fn contains(&self, id: StructId) -> bool {
        matches!(self.structs.get(id.index()), Some(Some(_)))
    }

    pub(crate) fn data(&self, id: StructId) -> Result<&StructData> {
        self.structs
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::misuse(format!("{id} is not a live struct")))
    }

    pub(crate) fn data_mut(&mut self, id: StructId) -> Result<&mut StructData> {
        self.structs
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::misuse(format!("{id} is not a live struct")))
    }

    pub(crate) fn key_mut(&mut self, id: StructId, index: usize) -> Result<&mut KeyData> {
        self.data_mut(id)?
            .keys
            .get_mut(index)
            .ok_or_else(|| Error::misuse(format!("{id} has no key #{index}")))
    }

    fn alloc(&mut self, ty: TypeHandle, name: &str, at: Placement) -> Result<StructId> {
        let index = u32::try_from(self.structs.len())
            .map_err(|_| Error::misuse("too many structs in one tree"))?;
        let id = StructId::new(index);
        let graph = self.links.graph_mut();
        let name_node = graph.insert(
            CacheNode::with_value(Cached::Value(Value::Str(name.into())), NodeRole::Name(id))
                .rigid(),
        );
        let basic_node = graph.insert(CacheNode::new(NodeRole::Basic(id)));
        let children_node = graph.insert(CacheNode::with_value(
            Cached::Children(Vec::new()),
            NodeRole::Children(id),
        ));
        let packed_node = graph.insert(CacheNode::new(NodeRole::Packed(id)));
        for (aspect, node) in [
            (Aspect::Name, name_node),
            (Aspect::Basic, basic_node),
            (Aspect::Children, children_node),
            (Aspect::Packed, packed_node),
        ] {
            self.links
                .register(at.map, path::aspect(&at.prefix, aspect), node);
        }
        self.structs.push(Some(StructData {
            ty,
            name: name.into(),
            prefix: at.prefix,
            map: at.map,
            parent: at.parent,
            container: at.container,
            benefactor: at.benefactor,
            donor: None,
            clones: Vec::new(),
            children: Vec::new(),
            keys: Vec::new(),
            name_node,
            basic_node,
            children_node,
            packed_node,
        }));
        Ok(id)
    }

    /// Creates a root struct of type `type_name` with its own link map.
    pub fn create_root(&mut self, type_name: &str, name: &str) -> Result<StructId> {
        let ty = self.schema.require(type_name)?;
        self.create_detached(ty, name)
    }

    pub(crate) fn create_detached(&mut self, ty: TypeHandle, name: &str) -> Result<StructId> {
        let map = self.links.new_map(None);
        self.alloc(
            ty,
            name,
            Placement {
                map,
                prefix: name.into(),
                parent: None,
                container: None,
                benefactor: None,
            },
        )
    }

    /// Creates a struct of type `type_name` as the last child of `parent`.
    ///
    /// The child shares its parent's link map and inherits from it unless a
    /// benefactor is set. Its name is its link prefix, so it must differ
    /// from every live sibling's; reusing one is [`Error::LibraryMisuse`].
    pub fn add_child(&mut self, parent: StructId, type_name: &str, name: &str) -> Result<StructId> {
        let ty = self.schema.require(type_name)?;
        if self.child(parent, name)?.is_some() {
            return Err(Error::misuse(format!(
                "{} already has a child named `{name}`",
                self.path(parent)?
            )));
        }
        let data = self.data(parent)?;
        let at = Placement {
            map: data.map,
            prefix: path::child(&data.prefix, name),
            parent: Some(parent),
            container: Some(parent),
            benefactor: None,
        };
        let child = self.alloc(ty, name, at)?;
        self.attach_child(parent, child)?;
        Ok(child)
    }

    fn attach_child(&mut self, parent: StructId, child: StructId) -> Result<()> {
        let data = self.data_mut(parent)?;
        data.children.push(child);
        let (node, children) = (data.children_node, data.children.clone());
        let invalidated = self.links.graph_mut().set(node, Cached::Children(children));
        tracing::trace!(?parent, ?child, invalidated, "tree.children.push");
        Ok(())
    }

    fn detach_child(&mut self, parent: StructId, child: StructId) -> Result<()> {
        let data = self.data_mut(parent)?;
        let before = data.children.len();
        data.children.retain(|c| *c != child);
        if data.children.len() != before {
            let (node, children) = (data.children_node, data.children.clone());
            self.links.graph_mut().set(node, Cached::Children(children));
        }
        Ok(())
    }

    /// Creates the value struct owned by `key` on `owner`.
    pub(crate) fn create_value(
        &mut self,
        owner: StructId,
        key: &str,
        ty: TypeHandle,
    ) -> Result<StructId> {
        let data = self.data(owner)?;
        let prefix = path::owned(&data.prefix, key);
        let parent_map = data.map;
        let map = self.links.new_map(Some(parent_map));
        self.alloc(
            ty,
            key,
            Placement {
                map,
                prefix,
                parent: None,
                container: Some(owner),
                benefactor: None,
            },
        )
    }

    /// Returns the name of a struct.
    pub fn name(&self, id: StructId) -> Result<&str> {
        Ok(&self.data(id)?.name)
    }

    /// Returns the link-map prefix of a struct, such as `root{header}`.
    pub fn path(&self, id: StructId) -> Result<&str> {
        Ok(&self.data(id)?.prefix)
    }

    /// Returns the type of a struct.
    pub fn type_handle(&self, id: StructId) -> Result<TypeHandle> {
        Ok(self.data(id)?.ty)
    }

    /// Returns the type name of a struct.
    pub fn type_name(&self, id: StructId) -> Result<&str> {
        Ok(self.schema.name(self.data(id)?.ty))
    }

    /// Returns the lexical parent.
    pub fn parent(&self, id: StructId) -> Result<Option<StructId>> {
        Ok(self.data(id)?.parent)
    }

    /// Returns the struct this one was created inside: the parent of a
    /// child, or the owner of a value struct.
    pub fn container(&self, id: StructId) -> Result<Option<StructId>> {
        Ok(self.data(id)?.container)
    }

    /// Returns the explicit inheritance source, if one was set.
    pub fn benefactor(&self, id: StructId) -> Result<Option<StructId>> {
        Ok(self.data(id)?.benefactor)
    }

    /// Makes `id` inherit from `benefactor` instead of its container.
    ///
    /// Every key of `id` is invalidated so it resolves again against the
    /// new chain.
    pub fn set_benefactor(&mut self, id: StructId, benefactor: Option<StructId>) -> Result<()> {
        if let Some(b) = benefactor {
            self.data(b)?;
        }
        let data = self.data_mut(id)?;
        data.benefactor = benefactor;
        let nodes: Vec<NodeId> = data.keys.iter().map(|k| k.node).collect();
        let mut scratch = imperial_link::TraversalScratch::new();
        let graph = self.links.graph_mut();
        let invalidated: usize = nodes
            .into_iter()
            .map(|node| graph.invalidate_with(node, &mut scratch))
            .sum();
        tracing::debug!(?id, ?benefactor, invalidated, "tree.benefactor");
        Ok(())
    }

    /// Returns the struct `id` was cloned from.
    pub fn donor(&self, id: StructId) -> Result<Option<StructId>> {
        Ok(self.data(id)?.donor)
    }

    /// Returns the structs cloned from `id`.
    pub fn clones(&self, id: StructId) -> Result<&[StructId]> {
        Ok(&self.data(id)?.clones)
    }

    /// Returns the children of a struct, in creation order.
    pub fn children(&self, id: StructId) -> Result<&[StructId]> {
        Ok(&self.data(id)?.children)
    }

    /// Returns the child named `name`.
    pub fn child(&self, id: StructId, name: &str) -> Result<Option<StructId>> {
        let data = self.data(id)?;
        Ok(data
            .children
            .iter()
            .copied()
            .find(|c| self.data(*c).is_ok_and(|d| d.name == name)))
    }

    /// Resolves a relative to a struct.
    pub(crate) fn relative(&self, id: StructId, relative: Relative) -> Result<StructId> {
        let data = self.data(id)?;
        match relative {
            Relative::This => Ok(id),
            Relative::Parent => data
                .parent
                .or(data.container)
                .ok_or_else(|| Error::KeyNotFound(format!("parent of {}", data.name))),
        }
    }

    /// The inheritance chain of `id`, nearest first.
    pub(crate) fn benefactors(&self, id: StructId) -> Vec<StructId> {
        let mut chain = Vec::new();
        let mut current = self.data(id).ok().and_then(|d| d.benefactor.or(d.container));
        while let Some(b) = current {
            if b == id || chain.contains(&b) {
                break;
            }
            chain.push(b);
            current = self.data(b).ok().and_then(|d| d.benefactor.or(d.container));
        }
        chain
    }

    /// Returns the link-map name a reference made from `id` points at.
    pub(crate) fn ref_path(&self, id: StructId, reference: &Ref) -> Result<String> {
        let target = self.relative(id, reference.relative())?;
        let prefix = &self.data(target)?.prefix;
        Ok(match reference {
            Ref::Key { name, .. } => path::key(prefix, name),
            Ref::Aspect { aspect, .. } => path::aspect(prefix, *aspect),
        })
    }

    /// Returns the structs and keys that directly depend on a key.
    ///
    /// Each dependent is named the way a reference would name it: a key
    /// name, or `!basic`, `!packed` and so on for aspects.
    pub fn dependents(&self, id: StructId, key: &str) -> Result<Vec<(StructId, String)>> {
        let data = self.data(id)?;
        let Some(index) = data.key_index(key) else {
            return Ok(Vec::new());
        };
        let graph = self.links.graph();
        let mut out = Vec::new();
        for node in graph.dependents(data.keys[index].node) {
            let Some(role) = graph.tag(node).copied() else {
                continue;
            };
            let owner = role.owner();
            let label = match role {
                NodeRole::Key(owner, i) => match self.data(owner) {
                    Ok(d) => d.keys[i].name.clone(),
                    Err(_) => continue,
                },
                NodeRole::Name(_) => format!("!{}", Aspect::Name),
                NodeRole::Basic(_) => format!("!{}", Aspect::Basic),
                NodeRole::Children(_) => format!("!{}", Aspect::Children),
                NodeRole::Packed(_) => format!("!{}", Aspect::Packed),
            };
            out.push((owner, label));
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Makes a copy of `id` that is linked to it but cannot be found from
    /// its position.
    ///
    /// The clone gets its own link map scoped under the original's, so it
    /// sees everything the original sees while nothing looking up names
    /// from the original's side finds it. Explicit keys are copied: value
    /// structs the original owns are copied deeply, structs it merely refers
    /// to are shared. Children are copied too. The clone is not one of its
    /// parent's children, keeps the original's parent, container and
    /// benefactor, and is invalidated whenever the original's basic value
    /// changes.
    pub fn clone_struct(&mut self, id: StructId) -> Result<StructId> {
        let data = self.data(id)?;
        let mut at = Placement {
            map: data.map,
            prefix: data.prefix.clone(),
            parent: data.parent,
            container: data.container,
            benefactor: data.benefactor,
        };
        at.map = self.links.new_map(Some(at.map));
        let clone = self.copy_struct(id, at)?;
        let (donor_basic, clone_basic) = (self.data(id)?.basic_node, self.data(clone)?.basic_node);
        self.data_mut(clone)?.donor = Some(id);
        self.data_mut(id)?.clones.push(clone);
        self.links.graph_mut().add_link(donor_basic, clone_basic);
        tracing::debug!(donor = ?id, ?clone, "tree.clone");
        Ok(clone)
    }

    fn copy_struct(&mut self, source: StructId, at: Placement) -> Result<StructId> {
        let data = self.data(source)?;
        let ty = data.ty;
        let name = data.name.clone();
        let children = data.children.clone();
        let stored = match self.links.graph().node(data.basic_node) {
            Some(node) => node.stale_value().cloned(),
            None => None,
        };
        let keys: Vec<(String, StructId, bool)> = data
            .keys
            .iter()
            .filter_map(|k| k.explicit.map(|e| (k.name.clone(), e, k.owned == Some(e))))
            .collect();

        let copy = self.alloc(ty, &name, at)?;
        if let (BasicKind::Stored, Some(Cached::Value(value))) =
            (self.schema.def(ty).basic(), stored)
        {
            let node = self.data(copy)?.basic_node;
            self.links.graph_mut().set(node, Cached::Value(value));
        }
        for (key, value, owned) in keys {
            let index = self.ensure_key(copy, &key)?;
            let target = if owned {
                let data = self.data(copy)?;
                let mut at = Placement {
                    prefix: path::owned(&data.prefix, &key),
                    map: data.map,
                    parent: None,
                    container: Some(copy),
                    benefactor: None,
                };
                at.map = self.links.new_map(Some(at.map));
                let target = self.copy_struct(value, at)?;
                self.key_mut(copy, index)?.owned = Some(target);
                target
            } else {
                value
            };
            self.bind_explicit(copy, index, target)?;
        }
        for child in children {
            let data = self.data(copy)?;
            let child_name = self.data(child)?.name.clone();
            let at = Placement {
                map: data.map,
                prefix: path::child(&data.prefix, &child_name),
                parent: Some(copy),
                container: Some(copy),
                benefactor: self.data(child)?.benefactor,
            };
            let child_copy = self.copy_struct(child, at)?;
            self.attach_child(copy, child_copy)?;
        }
        Ok(copy)
    }

    /// Removes a struct, its children and the value structs its keys own.
    ///
    /// Names the struct registered are unbound; anything that referenced
    /// them waits for a struct registering the same names again.
    pub fn remove(&mut self, id: StructId) -> Result<()> {
        let data = self.data(id)?;
        let children = data.children.clone();
        let owned: Vec<StructId> = data.keys.iter().filter_map(|k| k.owned).collect();
        let clones = data.clones.clone();
        for dependent in children.into_iter().chain(owned) {
            if self.contains(dependent) {
                self.remove(dependent)?;
            }
        }
        for clone in clones {
            if let Ok(data) = self.data_mut(clone) {
                data.donor = None;
            }
        }

        let data = self.data(id)?;
        let (parent, donor, map) = (data.parent, data.donor, data.map);
        let prefix = data.prefix.clone();
        let nodes: Vec<NodeId> = data.nodes().collect();
        if let Some(parent) = parent {
            self.detach_child(parent, id)?;
        }
        if let Some(donor) = donor
            && let Ok(data) = self.data_mut(donor)
        {
            data.clones.retain(|c| *c != id);
        }
        let unbound = self
            .links
            .unregister(map, &path::aspect(&prefix, Aspect::Name));
        for node in nodes {
            self.links.remove_node(node);
        }
        self.parsers.remove(&id);
        self.structs[id.index()] = None;
        tracing::debug!(?id, %prefix, unbound, "tree.remove");
        Ok(())
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("schema", &self.schema)
            .field("structs", &self.len())
            .field("nodes", &self.links.graph().len())
            .field("parsing", &self.parsers.len())
            .finish_non_exhaustive()
    }
}
