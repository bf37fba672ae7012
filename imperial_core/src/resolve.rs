// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Key resolution.
//!
//! A key without a cached value resolves, in order, to:
//!
//! 1. its explicit value;
//! 2. the explicit value of the same key on the nearest benefactor that
//!    has one and does not hide it;
//! 3. the agreed result of every applicable calculation;
//! 4. the result of the first applicable estimation;
//! 5. its static default.
//!
//! A rule is applicable when every reference it reads could resolve. That
//! check walks the same chain without running anything, and is memoized
//! per pass so mutually defined keys (`a = data - b`, `data = a + b`)
//! terminate.

use std::sync::Arc;

use hashbrown::HashMap;
use imperial_link::{Aspect, CacheNode, MapId, path};

use crate::calc::Calc;
use crate::error::{Error, Result};
use crate::id::{StructId, TypeHandle};
use crate::journal::Undo;
use crate::key::{KeyDef, KeyState, Rule};
use crate::reference::{Ref, parse_all};
use crate::schema::{BasicKind, Schema};
use crate::tree::{Cached, KeyData, NodeRole, Tree};
use crate::value::Input;

type Memo = HashMap<(StructId, String), bool>;

impl Tree {
    /// Finds the definition governing `name` on `id`.
    ///
    /// An override registered for the type of the struct's context wins,
    /// then a locator declared by the context type, then the struct's own
    /// key.
    pub(crate) fn key_def<'s>(
        &self,
        schema: &'s Schema,
        id: StructId,
        name: &str,
    ) -> Result<&'s KeyDef> {
        let data = self.data(id)?;
        let def = schema.def(data.ty);
        if let Some(context) = data.parent.or(data.container) {
            let context = schema.def(self.data(context)?.ty);
            if let Some(key) = def
                .override_for(context.name(), name)
                .or_else(|| context.locator(name))
            {
                return Ok(key);
            }
        }
        def.key(name)
            .ok_or_else(|| Error::KeyNotFound(format!("{}.{name}", def.name())))
    }

    /// Returns the declared type of a key on a struct.
    pub fn key_type(&self, id: StructId, name: &str) -> Result<&str> {
        Ok(self.key_def(&self.schema, id, name)?.type_name())
    }

    /// Returns the index of key `name` on `id`, creating it on first use.
    pub(crate) fn ensure_key(&mut self, id: StructId, name: &str) -> Result<usize> {
        if let Some(index) = self.data(id)?.key_index(name) {
            return Ok(index);
        }
        self.key_def(&self.schema, id, name)?;
        let data = self.data(id)?;
        let (map, name_path, index) = (data.map, path::key(&data.prefix, name), data.keys.len());
        let node = self
            .links
            .graph_mut()
            .insert(CacheNode::new(NodeRole::Key(id, index)));
        self.links.register(map, name_path, node);
        self.data_mut(id)?.keys.push(KeyData {
            name: name.into(),
            node,
            state: KeyState::Unresolved,
            explicit: None,
            owned: None,
            watch: Vec::new(),
        });
        Ok(index)
    }

    /// Resolves key `name` on `id` to the struct holding its value.
    pub fn resolve(&mut self, id: StructId, name: &str) -> Result<StructId> {
        let index = self.ensure_key(id, name)?;
        let node = self.data(id)?.keys[index].node;
        if let Some(Cached::Struct(value)) = self.links.graph().value(node)
            && self.contains(*value)
        {
            return Ok(*value);
        }
        let guard = (id, String::from(name));
        if !self.resolving.insert(guard.clone()) {
            return Err(Error::KeyNotFound(name.into()));
        }
        let refreshed = self.refresh_key(id, index);
        self.resolving.remove(&guard);
        let (value, state) = refreshed?;
        self.links.graph_mut().store(node, Cached::Struct(value));
        self.key_mut(id, index)?.state = state;
        tracing::trace!(?id, key = name, ?state, ?value, "key.resolve");
        Ok(value)
    }

    fn refresh_key(&mut self, id: StructId, index: usize) -> Result<(StructId, KeyState)> {
        let data = self.data(id)?;
        let key = &data.keys[index];
        if let Some(explicit) = key.explicit {
            return Ok((explicit, KeyState::Explicit));
        }
        let (name, map) = (key.name.clone(), data.map);
        let schema = Arc::clone(&self.schema);
        let def = self.key_def(&schema, id, &name)?;
        let ty = schema.require(def.type_name())?;

        let mut watched: Vec<String> = def
            .references()
            .filter_map(|r| self.ref_path(id, r).ok())
            .collect();
        let mut maps = vec![map];
        for benefactor in self.benefactors(id) {
            let data = self.data(benefactor)?;
            watched.push(path::key(&data.prefix, &name));
            if !maps.contains(&data.map) {
                maps.push(data.map);
            }
        }
        self.watch(id, index, watched, maps)?;

        if let Some(source) = self.find_inherited(&schema, id, &name) {
            let value = self.resolve(source, &name)?;
            let target = self.materialize(id, index, ty, false, Input::Struct(value))?;
            return Ok((target, KeyState::Inherited));
        }

        let mut memo = Memo::new();
        memo.insert((id, name.clone()), false);
        let calculations: Vec<&Rule> = def
            .calculations()
            .iter()
            .filter(|rule| self.has_refs(id, rule.refs(), &mut memo))
            .collect();
        if !calculations.is_empty() {
            let input = self.agree(id, &name, ty, &calculations, None)?;
            let target = self.materialize(id, index, ty, false, input)?;
            return Ok((target, KeyState::Calculated));
        }
        if let Some(rule) = def
            .estimations()
            .iter()
            .find(|rule| self.has_refs(id, rule.refs(), &mut memo))
        {
            let input = rule.run(&mut Calc::new(self, id))?;
            let target = self.materialize(id, index, ty, false, input)?;
            return Ok((target, KeyState::Estimated));
        }
        if let Some(default) = def.default() {
            let target = self.materialize(id, index, ty, false, Input::Value(default.clone()))?;
            return Ok((target, KeyState::Defaulted));
        }
        Err(Error::KeyNotFound(name))
    }

    /// The nearest benefactor holding an explicit, visible `name`.
    fn find_inherited(&self, schema: &Schema, id: StructId, name: &str) -> Option<StructId> {
        self.benefactors(id).into_iter().find(|b| {
            let Ok(data) = self.data(*b) else {
                return false;
            };
            data.key_index(name)
                .is_some_and(|i| data.keys[i].explicit.is_some())
                && self
                    .key_def(schema, *b, name)
                    .is_ok_and(|def| !def.hidden())
        })
    }

    /// Runs `rules` and checks that they agree with each other and with
    /// `explicit`, if given. Returns the first result.
    fn agree(
        &mut self,
        id: StructId,
        name: &str,
        ty: TypeHandle,
        rules: &[&Rule],
        explicit: Option<StructId>,
    ) -> Result<Input> {
        let mut first: Option<(Input, Input)> = None;
        if let Some(explicit) = explicit {
            let input = Input::Struct(explicit);
            let comparable = self.comparable(ty, &input)?;
            first = Some((input, comparable));
        }
        for rule in rules {
            let input = rule.run(&mut Calc::new(self, id))?;
            let comparable = self.comparable(ty, &input)?;
            let Some((_, expected)) = &first else {
                first = Some((input, comparable));
                continue;
            };
            if *expected != comparable {
                tracing::debug!(
                    ?id,
                    key = name,
                    ?expected,
                    found = ?comparable,
                    "key.sanity_conflict"
                );
                return Err(Error::SanityConflict(name.into()));
            }
        }
        first
            .map(|(input, _)| input)
            .ok_or_else(|| Error::KeyNotFound(name.into()))
    }

    /// Reduces an input to what two calculations are compared by: the
    /// normalized basic value where there is one.
    fn comparable(&mut self, ty: TypeHandle, input: &Input) -> Result<Input> {
        let schema = Arc::clone(&self.schema);
        let def = schema.def(ty);
        Ok(match input {
            Input::Value(value) => Input::Value(def.normalize(value.clone())?),
            Input::Struct(source) => match self.basic(*source) {
                Ok(value) => Input::Value(def.normalize(value.clone()).unwrap_or(value)),
                Err(_) => Input::Struct(*source),
            },
            Input::Entries(_) => input.clone(),
        })
    }

    /// Turns `input` into the struct key `index` of `id` will hold.
    ///
    /// Structs of the declared type are shared as they are; structs of
    /// another type are converted into a new value struct. Primitives reuse
    /// the value struct the key already owns when its type fits, and
    /// otherwise get a new one. A value struct the key no longer holds is
    /// removed.
    ///
    /// A `journaled` assignment never writes into the old value struct and
    /// hands it to the journal instead of removing it, so it can be put
    /// back.
    fn materialize(
        &mut self,
        id: StructId,
        index: usize,
        ty: TypeHandle,
        journaled: bool,
        input: Input,
    ) -> Result<StructId> {
        let key = &self.data(id)?.keys[index];
        let (name, previous) = (key.name.clone(), key.owned);
        let (target, owned) = match input {
            Input::Struct(source) => match self.convert_input(source, ty)? {
                None => (source, None),
                Some(converted) => {
                    let value = self.create_value(id, &name, ty)?;
                    self.fill(value, converted)?;
                    (value, Some(value))
                }
            },
            input => {
                let primitive = matches!(input, Input::Value(_));
                let stored = matches!(self.schema.def(ty).basic(), BasicKind::Stored);
                let reusable = previous.filter(|old| {
                    !journaled && primitive && stored && self.data(*old).is_ok_and(|d| d.ty == ty)
                });
                match reusable {
                    Some(value) => {
                        self.apply(value, input)?;
                        (value, Some(value))
                    }
                    None => {
                        let value = self.create_value(id, &name, ty)?;
                        self.fill(value, input)?;
                        (value, Some(value))
                    }
                }
            }
        };
        self.link_key(id, index, target)?;
        if let Some(old) = previous
            && Some(old) != owned
            && old != target
            && self.contains(old)
        {
            match self.journal.as_mut() {
                Some(journal) if journaled => journal.retire(old),
                _ => self.remove(old)?,
            }
        }
        self.key_mut(id, index)?.owned = owned;
        Ok(target)
    }

    /// Points the key's node at `target`'s basic value, so changing that
    /// value invalidates the key.
    fn link_key(&mut self, id: StructId, index: usize, target: StructId) -> Result<()> {
        let node = self.data(id)?.keys[index].node;
        let previous = match self
            .links
            .graph()
            .node(node)
            .and_then(CacheNode::stale_value)
        {
            Some(Cached::Struct(previous)) => Some(*previous),
            _ => None,
        };
        if previous == Some(target) {
            return Ok(());
        }
        if let Some(previous) = previous
            && let Ok(data) = self.data(previous)
        {
            let basic = data.basic_node;
            self.links.graph_mut().remove_link(basic, node);
        }
        let basic = self.data(target)?.basic_node;
        self.links.graph_mut().add_link(basic, node);
        Ok(())
    }

    /// Records `target` as the explicit value of key `index` and
    /// invalidates everything depending on the key.
    pub(crate) fn bind_explicit(
        &mut self,
        id: StructId,
        index: usize,
        target: StructId,
    ) -> Result<()> {
        self.link_key(id, index, target)?;
        self.watch(id, index, Vec::new(), Vec::new())?;
        let key = self.key_mut(id, index)?;
        key.explicit = Some(target);
        key.state = KeyState::Explicit;
        let node = key.node;
        let graph = self.links.graph_mut();
        let invalidated = graph.invalidate(node);
        graph.store(node, Cached::Struct(target));
        tracing::trace!(?id, index, ?target, invalidated, "key.set");
        Ok(())
    }

    /// Makes key `index` reference `names` in `maps`.
    ///
    /// References made through other maps last time are dropped from
    /// those maps first.
    fn watch(
        &mut self,
        id: StructId,
        index: usize,
        names: Vec<String>,
        maps: Vec<MapId>,
    ) -> Result<()> {
        let key = self.key_mut(id, index)?;
        let node = key.node;
        if key.watch != maps {
            let old = core::mem::take(&mut key.watch);
            self.links.set_outgoing(node, core::iter::empty::<&str>(), &old);
        }
        self.links.set_outgoing(node, names, &maps);
        self.key_mut(id, index)?.watch = maps;
        Ok(())
    }

    /// Assigns `input` to key `name` of `id`.
    pub(crate) fn set_key(&mut self, id: StructId, name: &str, input: Input) -> Result<()> {
        let index = self.ensure_key(id, name)?;
        let ty = {
            let def = self.key_def(&self.schema, id, name)?;
            self.schema.require(def.type_name())?
        };
        let key = &self.data(id)?.keys[index];
        let undo = Undo::Key {
            id,
            index,
            explicit: key.explicit,
            owned: key.owned,
            state: key.state,
        };
        let journaled = match self.journal.as_mut() {
            Some(journal) => {
                journal.record(undo);
                true
            }
            None => false,
        };
        let target = self.materialize(id, index, ty, journaled, input)?;
        self.bind_explicit(id, index, target)
    }

    /// Drops the explicit value of a key.
    ///
    /// The key resolves again on its next read, and everything depending on
    /// it is invalidated.
    pub fn unset(&mut self, id: StructId, name: &str) -> Result<()> {
        let index = self.ensure_key(id, name)?;
        let key = self.key_mut(id, index)?;
        let was_set = key.explicit.take().is_some();
        key.state = KeyState::Unresolved;
        let node = key.node;
        let invalidated = self.links.graph_mut().invalidate(node);
        tracing::trace!(?id, key = name, was_set, invalidated, "key.unset");
        Ok(())
    }

    /// Returns where the current value of a key came from.
    ///
    /// Keys that were never read, or were invalidated since, are
    /// [`KeyState::Unresolved`].
    pub fn key_state(&self, id: StructId, name: &str) -> Result<KeyState> {
        self.key_def(&self.schema, id, name)?;
        let data = self.data(id)?;
        Ok(match data.key_index(name).map(|i| &data.keys[i]) {
            Some(key) if key.explicit.is_some() => KeyState::Explicit,
            Some(key) if self.links.graph().is_valid(key.node) => key.state,
            _ => KeyState::Unresolved,
        })
    }

    /// Returns `true` if a key holds an explicit value.
    pub fn is_set(&self, id: StructId, name: &str) -> Result<bool> {
        self.key_def(&self.schema, id, name)?;
        let data = self.data(id)?;
        Ok(data
            .key_index(name)
            .is_some_and(|i| data.keys[i].explicit.is_some()))
    }

    /// Resolves a key and returns `true` if its value was calculated,
    /// estimated or defaulted rather than set or inherited.
    pub fn is_defaulted(&mut self, id: StructId, name: &str) -> Result<bool> {
        let index = self.ensure_key(id, name)?;
        self.resolve(id, name)?;
        Ok(self.data(id)?.keys[index].state.is_defaulted())
    }

    /// Returns `true` if every reference in `refs` could resolve from `id`.
    ///
    /// Nothing is computed or created; references use the grammar of
    /// [`Ref`].
    pub fn has_keys(&self, id: StructId, refs: &[&str]) -> Result<bool> {
        self.data(id)?;
        let refs = parse_all(refs)?;
        Ok(self.has_refs(id, &refs, &mut Memo::new()))
    }

    /// Runs every applicable calculation of a key and checks that they
    /// agree with each other and with the explicit value, if any.
    pub fn check_constraints(&mut self, id: StructId, name: &str) -> Result<()> {
        let index = self.ensure_key(id, name)?;
        let schema = Arc::clone(&self.schema);
        let def = self.key_def(&schema, id, name)?;
        let ty = schema.require(def.type_name())?;
        let explicit = self.data(id)?.keys[index].explicit;
        let mut memo = Memo::new();
        memo.insert((id, name.into()), false);
        let rules: Vec<&Rule> = def
            .calculations()
            .iter()
            .filter(|rule| self.has_refs(id, rule.refs(), &mut memo))
            .collect();
        tracing::debug!(?id, key = name, rules = rules.len(), "key.check_constraints");
        if rules.is_empty() {
            return Ok(());
        }
        self.agree(id, name, ty, &rules, explicit).map(drop)
    }

    pub(crate) fn has_refs(&self, id: StructId, refs: &[Ref], memo: &mut Memo) -> bool {
        refs.iter().all(|r| self.has_ref(id, r, memo))
    }

    fn has_ref(&self, id: StructId, reference: &Ref, memo: &mut Memo) -> bool {
        let Ok(target) = self.relative(id, reference.relative()) else {
            return false;
        };
        match reference {
            Ref::Key { name, .. } => self.has_key(target, name, memo),
            Ref::Aspect { aspect, .. } => match aspect {
                Aspect::Name | Aspect::Children => true,
                Aspect::Basic => self.has_basic(target, memo),
                Aspect::Packed => self.codec(target).is_ok(),
            },
        }
    }

    fn has_key(&self, id: StructId, name: &str, memo: &mut Memo) -> bool {
        let slot = (id, String::from(name));
        if let Some(known) = memo.get(&slot) {
            return *known;
        }
        memo.insert(slot.clone(), false);
        let found = self.scan_key(id, name, memo);
        memo.insert(slot, found);
        found
    }

    fn scan_key(&self, id: StructId, name: &str, memo: &mut Memo) -> bool {
        let schema = &*self.schema;
        let Ok(def) = self.key_def(schema, id, name) else {
            return false;
        };
        if let Ok(data) = self.data(id)
            && let Some(index) = data.key_index(name)
        {
            let key = &data.keys[index];
            if key.explicit.is_some() || self.links.graph().is_valid(key.node) {
                return true;
            }
        }
        self.find_inherited(schema, id, name).is_some()
            || def
                .calculations()
                .iter()
                .chain(def.estimations())
                .any(|rule| self.has_refs(id, rule.refs(), memo))
            || def.default().is_some()
    }

    fn has_basic(&self, id: StructId, memo: &mut Memo) -> bool {
        let Ok(data) = self.data(id) else {
            return false;
        };
        let graph = self.links.graph();
        match self.schema.def(data.ty).basic() {
            BasicKind::None => false,
            BasicKind::Stored => graph
                .node(data.basic_node)
                .and_then(CacheNode::stale_value)
                .is_some(),
            BasicKind::Computed(rule) => {
                if graph.is_valid(data.basic_node) {
                    return true;
                }
                let slot = (id, String::from("!basic"));
                if let Some(known) = memo.get(&slot) {
                    return *known;
                }
                memo.insert(slot.clone(), false);
                let found = self.has_refs(id, rule.refs(), memo);
                memo.insert(slot, found);
                found
            }
        }
    }

    /// Returns `true` if the basic value of `id` is present or computable.
    #[must_use]
    pub fn has_basic_value(&self, id: StructId) -> bool {
        self.has_basic(id, &mut Memo::new())
    }
}
