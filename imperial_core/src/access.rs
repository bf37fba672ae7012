// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reading and writing values by path.

use std::sync::Arc;

use imperial_link::{Aspect, CacheNode, path};

use crate::calc::Calc;
use crate::error::{Error, Result};
use crate::id::StructId;
use crate::journal::Undo;
use crate::reference::KeyPath;
use crate::schema::BasicKind;
use crate::tree::{Cached, Tree};
use crate::value::{Input, Value};

impl Tree {
    /// Resolves every segment of `path` in turn and returns the struct the
    /// last one holds. The empty path returns `id` itself.
    pub fn resolve_path<'p>(
        &mut self,
        id: StructId,
        path: impl Into<KeyPath<'p>>,
    ) -> Result<StructId> {
        let path = path.into();
        let mut current = id;
        for segment in path.segments() {
            current = self.resolve(current, segment)?;
        }
        Ok(current)
    }

    /// Reads the basic value at `path`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use imperial_core::{Tree, Value, builtin};
    ///
    /// let mut tree = Tree::new(builtin::schema().unwrap());
    /// let n = tree.create_root("Number", "n").unwrap();
    /// tree.set(n, "size", 2).unwrap();
    /// assert_eq!(tree.get(n, "size").unwrap(), Value::Int(2));
    /// assert_eq!(tree.get(n, "size.bits").unwrap(), Value::Int(16));
    /// ```
    pub fn get<'p>(&mut self, id: StructId, path: impl Into<KeyPath<'p>>) -> Result<Value> {
        let target = self.resolve_path(id, path)?;
        self.basic(target)
    }

    /// Assigns `input` at `path`.
    ///
    /// Every segment but the last is resolved; the last names the key that
    /// is set. The empty path assigns the struct's own basic value (or, for
    /// an entry list, several of its keys).
    pub fn set<'p>(
        &mut self,
        id: StructId,
        path: impl Into<KeyPath<'p>>,
        input: impl Into<Input>,
    ) -> Result<()> {
        let path = path.into();
        let input = input.into();
        match path.split_last() {
            None => self.apply(id, input),
            Some((key, owners)) => {
                let mut owner = id;
                for segment in owners {
                    owner = self.resolve(owner, segment)?;
                }
                self.set_key(owner, key, input)
            }
        }
    }

    /// Assigns several keys in order. An empty key names the basic value;
    /// dotted keys are paths.
    ///
    /// The batch is all-or-nothing: if any entry fails, every entry
    /// assigned before it is put back and the error is returned.
    pub fn set_all(&mut self, id: StructId, entries: Vec<(String, Input)>) -> Result<()> {
        let outermost = self.begin();
        let result = entries
            .into_iter()
            .try_for_each(|(key, input)| self.set(id, key.as_str(), input));
        if outermost {
            self.finish(result)
        } else {
            result
        }
    }

    /// Reads the number facet of the struct at `path`.
    pub fn number<'p>(&mut self, id: StructId, path: impl Into<KeyPath<'p>>) -> Result<i128> {
        let target = self.resolve_path(id, path)?;
        let facets = Arc::clone(self.schema().def(self.type_handle(target)?).facets());
        facets.number(&mut Calc::new(self, target))
    }

    /// Reads the string facet of the struct at `path`.
    pub fn string<'p>(&mut self, id: StructId, path: impl Into<KeyPath<'p>>) -> Result<String> {
        let target = self.resolve_path(id, path)?;
        let facets = Arc::clone(self.schema().def(self.type_handle(target)?).facets());
        facets.string(&mut Calc::new(self, target))
    }

    /// Reads the list facet of the struct at `path`.
    pub fn list<'p>(&mut self, id: StructId, path: impl Into<KeyPath<'p>>) -> Result<Vec<Value>> {
        let target = self.resolve_path(id, path)?;
        let facets = Arc::clone(self.schema().def(self.type_handle(target)?).facets());
        facets.list(&mut Calc::new(self, target))
    }

    /// Returns the basic value of a struct, computing it if needed.
    pub fn basic(&mut self, id: StructId) -> Result<Value> {
        let data = self.data(id)?;
        let (ty, node, map) = (data.ty, data.basic_node, data.map);
        let schema = Arc::clone(self.schema());
        let def = schema.def(ty);
        match def.basic() {
            BasicKind::None => Err(Error::unsupported(def.name(), "basic")),
            BasicKind::Stored => match self
                .links
                .graph()
                .node(node)
                .and_then(CacheNode::stale_value)
            {
                Some(Cached::Value(value)) => Ok(value.clone()),
                _ => Err(Error::KeyNotFound(format!("{}!basic", self.name(id)?))),
            },
            BasicKind::Computed(rule) => {
                if let Some(Cached::Value(value)) = self.links.graph().value(node) {
                    return Ok(value.clone());
                }
                let guard = (id, String::from("!basic"));
                if !self.resolving.insert(guard.clone()) {
                    return Err(Error::KeyNotFound(format!("{}!basic", self.name(id)?)));
                }
                let watched: Vec<String> = rule
                    .refs()
                    .iter()
                    .filter_map(|r| self.ref_path(id, r).ok())
                    .collect();
                self.links.set_outgoing(node, watched, &[map]);
                let computed = rule.run(&mut Calc::new(self, id));
                let computed = computed.and_then(|input| self.value_of(input));
                self.resolving.remove(&guard);
                let value = def.normalize(computed?)?;
                self.links
                    .graph_mut()
                    .store(node, Cached::Value(value.clone()));
                tracing::trace!(?id, %value, "basic.compute");
                Ok(value)
            }
        }
    }

    /// Stores the basic value of a struct.
    ///
    /// The value is normalized first. Dependents are invalidated only if
    /// the stored value actually changes.
    pub fn set_basic(&mut self, id: StructId, value: impl Into<Value>) -> Result<()> {
        let data = self.data(id)?;
        let (ty, node) = (data.ty, data.basic_node);
        let schema = Arc::clone(self.schema());
        let def = schema.def(ty);
        match def.basic() {
            BasicKind::None => Err(Error::unsupported(def.name(), "basic")),
            BasicKind::Computed(_) => Err(Error::misuse(format!(
                "the basic value of {} is computed and cannot be assigned",
                def.name()
            ))),
            BasicKind::Stored => {
                let value = def.normalize(value.into())?;
                if let Some(journal) = self.journal.as_mut() {
                    let previous = match self
                        .links
                        .graph()
                        .node(node)
                        .and_then(CacheNode::stale_value)
                    {
                        Some(Cached::Value(value)) => Some(value.clone()),
                        _ => None,
                    };
                    journal.record(Undo::Basic {
                        id,
                        value: previous,
                    });
                }
                let changed = self.links.graph_mut().set(node, Cached::Value(value));
                tracing::trace!(?id, changed, "basic.set");
                Ok(())
            }
        }
    }

    /// Assigns an input to a struct as a whole.
    pub(crate) fn apply(&mut self, id: StructId, input: Input) -> Result<()> {
        match input {
            Input::Value(value) => self.set_basic(id, value),
            Input::Entries(entries) => self.set_all(id, entries),
            Input::Struct(source) => {
                let ty = self.type_handle(id)?;
                match self.convert_input(source, ty)? {
                    Some(converted) => self.apply(id, converted),
                    None => {
                        let value = self.basic(source)?;
                        self.set_basic(id, value)
                    }
                }
            }
        }
    }

    /// Applies `input` to a struct that was just created for it, removing
    /// the struct again if that fails.
    pub(crate) fn fill(&mut self, id: StructId, input: Input) -> Result<()> {
        if let Err(error) = self.apply(id, input) {
            self.remove(id)?;
            return Err(error);
        }
        Ok(())
    }

    fn value_of(&mut self, input: Input) -> Result<Value> {
        match input {
            Input::Value(value) => Ok(value),
            Input::Struct(source) => self.basic(source),
            Input::Entries(_) => Err(Error::misuse(
                "a basic value must be computed as a primitive or a struct",
            )),
        }
    }

    /// Returns the serialized bytes of a struct.
    ///
    /// The bytes are cached until the struct's basic value or anything its
    /// codec declares changes.
    pub fn packed(&mut self, id: StructId) -> Result<Vec<u8>> {
        let data = self.data(id)?;
        let (ty, node, map) = (data.ty, data.packed_node, data.map);
        let own_basic = path::aspect(&data.prefix, Aspect::Basic);
        if let Some(Cached::Value(Value::Bytes(bytes))) = self.links.graph().value(node) {
            return Ok(bytes.clone());
        }
        let schema = Arc::clone(self.schema());
        let def = schema.def(ty);
        let codec = def.codec().ok_or_else(|| {
            Error::SerializationUnsupported(format!("{} has no codec", def.name()))
        })?;
        let guard = (id, String::from("!packed"));
        if !self.resolving.insert(guard.clone()) {
            return Err(Error::KeyNotFound(format!("{}!packed", self.name(id)?)));
        }
        let mut watched: Vec<String> = codec
            .refs()
            .iter()
            .filter_map(|r| self.ref_path(id, r).ok())
            .collect();
        watched.push(own_basic);
        self.links.set_outgoing(node, watched, &[map]);
        let bytes = self.serialize(id);
        self.resolving.remove(&guard);
        let bytes = bytes?;
        self.links
            .graph_mut()
            .store(node, Cached::Value(Value::Bytes(bytes.clone())));
        Ok(bytes)
    }
}
