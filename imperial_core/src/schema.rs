// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct type definitions and the schema registry.
//!
//! Types are registered once, up front, with explicit builder calls. A
//! [`SchemaBuilder`] lets types be declared before they are defined so
//! definitions may refer to each other by name; [`SchemaBuilder::build`]
//! checks every name and freezes the result into a shared [`Schema`].

use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::calc::Calc;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::facet::{NoFacets, ValueFacets};
use crate::id::TypeHandle;
use crate::key::{CalcFn, KeyDef, Rule};
use crate::reference::{Ref, parse_all};
use crate::value::{Input, Value};

/// Normalizes an assigned primitive into a type's canonical basic value.
pub type NormalizeFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// How a struct type obtains its basic value.
#[derive(Clone, Debug, Default)]
pub enum BasicKind {
    /// The type has no basic value.
    #[default]
    None,
    /// The basic value is assigned and stored.
    Stored,
    /// The basic value is computed from other references.
    Computed(Rule),
}

/// A conversion registered on one type, to or from another.
#[derive(Clone)]
pub struct Converter {
    source: Option<String>,
    target: Option<String>,
    convert: CalcFn,
}

impl Converter {
    /// The type converted from, when this converter builds the owning type.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The type converted to, when this converter reads the owning type.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub(crate) fn run(&self, cx: &mut Calc<'_>) -> Result<Input> {
        (self.convert)(cx)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// A codec together with the references its output depends on.
#[derive(Clone)]
pub struct CodecDef {
    refs: Vec<Ref>,
    codec: Arc<dyn Codec>,
}

impl CodecDef {
    /// References whose changes alter the encoding.
    #[must_use]
    pub fn refs(&self) -> &[Ref] {
        &self.refs
    }

    /// The codec itself.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }
}

impl fmt::Debug for CodecDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecDef")
            .field("refs", &self.refs)
            .finish_non_exhaustive()
    }
}

/// Definition of a struct type.
///
/// # Example
///
/// ```rust
/// use imperial_core::{KeyDef, StructDef};
///
/// let header = StructDef::builder("Header")
///     .key(KeyDef::builder("magic", "Str").build().unwrap())
///     .key(KeyDef::builder("version", "Int").default(1).build().unwrap())
///     .build()
///     .unwrap();
///
/// assert_eq!(header.name(), "Header");
/// assert!(header.key("version").is_some());
/// assert!(header.key("flags").is_none());
/// ```
#[derive(Clone)]
pub struct StructDef {
    name: String,
    basic: BasicKind,
    normalize: Option<NormalizeFn>,
    facets: Arc<dyn ValueFacets>,
    keys: Vec<KeyDef>,
    locators: Vec<KeyDef>,
    overrides: Vec<(String, KeyDef)>,
    converters: Vec<Converter>,
    codec: Option<CodecDef>,
}

impl StructDef {
    /// Starts a definition of the type `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> StructDefBuilder {
        StructDefBuilder {
            def: Self {
                name: name.into(),
                basic: BasicKind::None,
                normalize: None,
                facets: Arc::new(NoFacets),
                keys: Vec::new(),
                locators: Vec::new(),
                overrides: Vec::new(),
                converters: Vec::new(),
                codec: None,
            },
            error: None,
        }
    }

    /// Returns the type name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns how the basic value is obtained.
    #[must_use]
    #[inline]
    pub fn basic(&self) -> &BasicKind {
        &self.basic
    }

    /// Returns the value facets.
    #[must_use]
    pub fn facets(&self) -> &Arc<dyn ValueFacets> {
        &self.facets
    }

    /// Returns the declared keys, in declaration order.
    #[must_use]
    pub fn keys(&self) -> &[KeyDef] {
        &self.keys
    }

    /// Returns the key declared as `name`.
    #[must_use]
    pub fn key(&self, name: &str) -> Option<&KeyDef> {
        self.keys.iter().find(|k| k.name() == name)
    }

    /// Returns the locator `name`, applied to substructs of this type.
    #[must_use]
    pub fn locator(&self, name: &str) -> Option<&KeyDef> {
        self.locators.iter().find(|k| k.name() == name)
    }

    /// Returns the override of `name` used when the context is `context`.
    #[must_use]
    pub fn override_for(&self, context: &str, name: &str) -> Option<&KeyDef> {
        self.overrides
            .iter()
            .find(|(ctx, k)| ctx == context && k.name() == name)
            .map(|(_, k)| k)
    }

    /// Returns the codec, if the type is serializable.
    #[must_use]
    pub fn codec(&self) -> Option<&CodecDef> {
        self.codec.as_ref()
    }

    /// Returns the converter from this type to `target`.
    #[must_use]
    pub fn converter_to(&self, target: &str) -> Option<&Converter> {
        self.converters
            .iter()
            .find(|c| c.target.as_deref() == Some(target))
    }

    /// Returns the converter from `source` to this type.
    #[must_use]
    pub fn converter_from(&self, source: &str) -> Option<&Converter> {
        self.converters
            .iter()
            .find(|c| c.source.as_deref() == Some(source))
    }

    /// Normalizes a primitive into this type's basic value.
    ///
    /// Types without a normalizer accept every value unchanged.
    pub fn normalize(&self, value: Value) -> Result<Value> {
        match &self.normalize {
            Some(normalize) => normalize(value),
            None => Ok(value),
        }
    }

    fn all_keys(&self) -> impl Iterator<Item = &KeyDef> + '_ {
        self.keys
            .iter()
            .chain(&self.locators)
            .chain(self.overrides.iter().map(|(_, k)| k))
    }
}

impl fmt::Debug for StructDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructDef")
            .field("name", &self.name)
            .field("basic", &self.basic)
            .field("keys", &self.keys)
            .field("locators", &self.locators.len())
            .field("overrides", &self.overrides.len())
            .field("converters", &self.converters)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

/// Builder for [`StructDef`].
///
/// The first error encountered (a malformed reference, a duplicate key, a
/// converter naming both or neither side) is reported by
/// [`build`](Self::build).
pub struct StructDefBuilder {
    def: StructDef,
    error: Option<Error>,
}

impl fmt::Debug for StructDefBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructDefBuilder")
            .field("def", &self.def)
            .field("error", &self.error)
            .finish()
    }
}

impl StructDefBuilder {
    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn parse(&mut self, refs: &[&str]) -> Vec<Ref> {
        parse_all(refs).unwrap_or_else(|e| {
            self.fail(e);
            Vec::new()
        })
    }

    /// Gives the type a stored basic value.
    #[must_use]
    pub fn stored_basic(mut self) -> Self {
        self.def.basic = BasicKind::Stored;
        self
    }

    /// Gives the type a basic value computed from `refs`.
    #[must_use]
    pub fn computed_basic<F>(mut self, refs: &[&str], calc: F) -> Self
    where
        F: Fn(&mut Calc<'_>) -> Result<Input> + Send + Sync + 'static,
    {
        let refs = self.parse(refs);
        self.def.basic = BasicKind::Computed(Rule::new(refs, Arc::new(calc)));
        self
    }

    /// Sets the normalizer applied to assigned primitives.
    #[must_use]
    pub fn normalize<F>(mut self, normalize: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.def.normalize = Some(Arc::new(normalize));
        self
    }

    /// Sets the value facets.
    #[must_use]
    pub fn facets(mut self, facets: impl ValueFacets + 'static) -> Self {
        self.def.facets = Arc::new(facets);
        self
    }

    /// Declares a key.
    #[must_use]
    pub fn key(mut self, key: KeyDef) -> Self {
        if self.def.key(key.name()).is_some() {
            self.fail(Error::misuse(format!(
                "key `{}` registered twice on {}",
                key.name(),
                self.def.name
            )));
        }
        self.def.keys.push(key);
        self
    }

    /// Declares a locator: a key this type owns but applies to its
    /// substructs.
    #[must_use]
    pub fn locator(mut self, key: KeyDef) -> Self {
        if self.def.locator(key.name()).is_some() {
            self.fail(Error::misuse(format!(
                "locator `{}` registered twice on {}",
                key.name(),
                self.def.name
            )));
        }
        self.def.locators.push(key);
        self
    }

    /// Replaces the definition of a key while this type's context is a
    /// struct of type `context`.
    #[must_use]
    pub fn override_for(mut self, context: impl Into<String>, key: KeyDef) -> Self {
        let context = context.into();
        if self.def.override_for(&context, key.name()).is_some() {
            self.fail(Error::misuse(format!(
                "override of `{}` for {context} registered twice on {}",
                key.name(),
                self.def.name
            )));
        }
        self.def.overrides.push((context, key));
        self
    }

    /// Registers a converter.
    ///
    /// Exactly one side must be named: `source` for a converter that builds
    /// this type from another, `target` for one that turns this type into
    /// another. The calculation runs on the struct being converted.
    #[must_use]
    pub fn converter<F>(mut self, source: Option<&str>, target: Option<&str>, convert: F) -> Self
    where
        F: Fn(&mut Calc<'_>) -> Result<Input> + Send + Sync + 'static,
    {
        if source.is_some() == target.is_some() {
            self.fail(Error::misuse(format!(
                "converter on {} must name exactly one of source and target",
                self.def.name
            )));
            return self;
        }
        self.def.converters.push(Converter {
            source: source.map(String::from),
            target: target.map(String::from),
            convert: Arc::new(convert),
        });
        self
    }

    /// Makes the type serializable. `refs` names what the encoding depends
    /// on besides the basic value.
    #[must_use]
    pub fn codec(mut self, refs: &[&str], codec: impl Codec + 'static) -> Self {
        if self.def.codec.is_some() {
            self.fail(Error::misuse(format!(
                "codec registered twice on {}",
                self.def.name
            )));
        }
        let refs = self.parse(refs);
        self.def.codec = Some(CodecDef {
            refs,
            codec: Arc::new(codec),
        });
        self
    }

    /// Builds the [`StructDef`].
    pub fn build(self) -> Result<StructDef> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.def),
        }
    }
}

/// Collects struct type definitions.
///
/// # Example
///
/// ```rust
/// use imperial_core::{KeyDef, SchemaBuilder, StructDef};
///
/// let mut builder = SchemaBuilder::new();
/// // Node refers to itself, and to Leaf before Leaf is defined.
/// builder.declare("Leaf").unwrap();
/// builder
///     .define(
///         StructDef::builder("Node")
///             .key(KeyDef::builder("next", "Node").build().unwrap())
///             .key(KeyDef::builder("leaf", "Leaf").build().unwrap())
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
/// assert!(builder.build().is_err()); // Leaf is declared but not defined
/// ```
#[derive(Default)]
pub struct SchemaBuilder {
    defs: Vec<Option<StructDef>>,
    names: Vec<String>,
    by_name: HashMap<String, TypeHandle>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a handle for `name` without defining it yet.
    pub fn declare(&mut self, name: &str) -> Result<TypeHandle> {
        if self.by_name.contains_key(name) {
            return Err(Error::misuse(format!("type {name} declared twice")));
        }
        let index = u16::try_from(self.defs.len())
            .map_err(|_| Error::misuse("too many struct types (max 65535)"))?;
        let handle = TypeHandle::new(index);
        self.defs.push(None);
        self.names.push(name.into());
        self.by_name.insert(name.into(), handle);
        Ok(handle)
    }

    /// Defines a type, declaring it first if needed.
    pub fn define(&mut self, def: StructDef) -> Result<TypeHandle> {
        let handle = match self.by_name.get(def.name()) {
            Some(handle) => *handle,
            None => self.declare(def.name())?,
        };
        let slot = &mut self.defs[handle.index()];
        if slot.is_some() {
            return Err(Error::misuse(format!("type {} defined twice", def.name())));
        }
        *slot = Some(def);
        Ok(handle)
    }

    /// Returns the handle of a declared type.
    #[must_use]
    pub fn handle(&self, name: &str) -> Option<TypeHandle> {
        self.by_name.get(name).copied()
    }

    /// Checks every name and freezes the schema.
    pub fn build(self) -> Result<Arc<Schema>> {
        let mut defs = Vec::with_capacity(self.defs.len());
        for (def, name) in self.defs.into_iter().zip(&self.names) {
            defs.push(def.ok_or_else(|| {
                Error::misuse(format!("type {name} declared but never defined"))
            })?);
        }
        let known = |name: &str| self.by_name.contains_key(name);
        for def in &defs {
            for key in def.all_keys() {
                if !known(key.type_name()) {
                    return Err(Error::misuse(format!(
                        "key `{}` of {} has undefined type {}",
                        key.name(),
                        def.name(),
                        key.type_name()
                    )));
                }
            }
            for (context, _) in &def.overrides {
                if !known(context) {
                    return Err(Error::misuse(format!(
                        "override on {} names undefined context {context}",
                        def.name()
                    )));
                }
            }
            for converter in &def.converters {
                let other = converter.source().or(converter.target()).unwrap_or_default();
                if !known(other) {
                    return Err(Error::misuse(format!(
                        "converter on {} names undefined type {other}",
                        def.name()
                    )));
                }
            }
        }
        Ok(Arc::new(Schema {
            defs,
            by_name: self.by_name,
        }))
    }
}

impl fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("types", &self.names)
            .finish_non_exhaustive()
    }
}

/// A frozen set of struct types.
pub struct Schema {
    defs: Vec<StructDef>,
    by_name: HashMap<String, TypeHandle>,
}

impl Schema {
    /// Returns the number of types.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Returns `true` if no types are defined.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Looks up a type by name.
    #[must_use]
    pub fn handle(&self, name: &str) -> Option<TypeHandle> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn require(&self, name: &str) -> Result<TypeHandle> {
        self.handle(name)
            .ok_or_else(|| Error::misuse(format!("unknown struct type {name}")))
    }

    /// Returns the definition of a type.
    ///
    /// # Panics
    ///
    /// Panics if `handle` came from a different schema.
    #[must_use]
    pub fn def(&self, handle: TypeHandle) -> &StructDef {
        &self.defs[handle.index()]
    }

    /// Returns the name of a type.
    ///
    /// # Panics
    ///
    /// Panics if `handle` came from a different schema.
    #[must_use]
    pub fn name(&self, handle: TypeHandle) -> &str {
        self.def(handle).name()
    }

    /// Iterates every type with its handle.
    pub fn iter(&self) -> impl Iterator<Item = (TypeHandle, &StructDef)> + '_ {
        self.defs.iter().enumerate().map(|(i, def)| {
            #[expect(clippy::cast_possible_truncation, reason = "index < len <= u16::MAX")]
            (TypeHandle::new(i as u16), def)
        })
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("count", &self.defs.len())
            .field(
                "types",
                &self.defs.iter().map(StructDef::name).collect::<Vec<_>>(),
            )
            .finish()
    }
}
