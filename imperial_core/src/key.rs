// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Key definitions.
//!
//! This module provides [`KeyDef`] for describing a typed field of a struct
//! type and [`KeyDefBuilder`] for ergonomic construction.

use core::fmt;
use std::sync::Arc;

use crate::calc::Calc;
use crate::error::Result;
use crate::reference::{Ref, parse_all};
use crate::value::{Input, Value};

/// A calculation body.
///
/// The closure receives a [`Calc`] bound to the struct owning the key and
/// returns the computed input, which is then normalized into the key's
/// declared type.
pub type CalcFn = Arc<dyn Fn(&mut Calc<'_>) -> Result<Input> + Send + Sync>;

/// A calculation together with the references it reads.
///
/// A rule only runs when every reference is resolvable, and a key depending
/// on the rule is invalidated whenever any of them changes.
#[derive(Clone)]
pub struct Rule {
    refs: Vec<Ref>,
    calc: CalcFn,
}

impl Rule {
    pub(crate) fn new(refs: Vec<Ref>, calc: CalcFn) -> Self {
        Self { refs, calc }
    }

    /// Returns the references this rule reads.
    #[must_use]
    pub fn refs(&self) -> &[Ref] {
        &self.refs
    }

    pub(crate) fn run(&self, cx: &mut Calc<'_>) -> Result<Input> {
        (self.calc)(cx)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("refs", &self.refs)
            .finish_non_exhaustive()
    }
}

/// Where a key's current value came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum KeyState {
    /// Not resolved since the last change.
    #[default]
    Unresolved,
    /// Assigned with `set`.
    Explicit,
    /// Borrowed from the same key on a benefactor.
    Inherited,
    /// Produced by the agreeing calculations.
    Calculated,
    /// Produced by an estimation.
    Estimated,
    /// The static default.
    Defaulted,
}

impl KeyState {
    /// Returns `true` if the value did not come from an explicit assignment
    /// or inheritance.
    #[must_use]
    pub fn is_defaulted(self) -> bool {
        matches!(self, Self::Calculated | Self::Estimated | Self::Defaulted)
    }
}

/// Definition of a typed key.
///
/// # Example
///
/// ```rust
/// use imperial_core::{Input, KeyDef};
///
/// let data = KeyDef::builder("data", "Int")
///     .calculate(&["a", "b"], |cx| Ok(Input::from(cx.number("a")? + cx.number("b")?)))
///     .build()
///     .unwrap();
///
/// assert_eq!(data.name(), "data");
/// assert_eq!(data.calculations().len(), 1);
/// assert!(data.default().is_none());
/// ```
#[derive(Clone)]
pub struct KeyDef {
    name: String,
    type_name: String,
    default: Option<Value>,
    hidden: bool,
    calculations: Vec<Rule>,
    estimations: Vec<Rule>,
}

impl KeyDef {
    /// Starts a definition of `name` holding values of type `type_name`.
    #[must_use]
    pub fn builder(name: impl Into<String>, type_name: impl Into<String>) -> KeyDefBuilder {
        KeyDefBuilder {
            def: Self {
                name: name.into(),
                type_name: type_name.into(),
                default: None,
                hidden: false,
                calculations: Vec::new(),
                estimations: Vec::new(),
            },
            rules: Vec::new(),
        }
    }

    /// Returns the key name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type name.
    #[must_use]
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the static default, if any.
    #[must_use]
    #[inline]
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns `true` if the key is never inherited by other structs.
    #[must_use]
    #[inline]
    pub fn hidden(&self) -> bool {
        self.hidden
    }

    /// Returns the sanity-checked calculations.
    #[must_use]
    pub fn calculations(&self) -> &[Rule] {
        &self.calculations
    }

    /// Returns the estimations.
    #[must_use]
    pub fn estimations(&self) -> &[Rule] {
        &self.estimations
    }

    /// Iterates every reference any rule of this key reads.
    pub fn references(&self) -> impl Iterator<Item = &Ref> + '_ {
        self.calculations
            .iter()
            .chain(&self.estimations)
            .flat_map(|rule| rule.refs.iter())
    }
}

impl fmt::Debug for KeyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDef")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("default", &self.default)
            .field("hidden", &self.hidden)
            .field("calculations", &self.calculations.len())
            .field("estimations", &self.estimations.len())
            .finish()
    }
}

/// Builder for [`KeyDef`].
///
/// Reference strings are parsed by [`build`](Self::build), which reports
/// the first malformed one.
pub struct KeyDefBuilder {
    def: KeyDef,
    rules: Vec<(bool, Vec<String>, CalcFn)>,
}

impl fmt::Debug for KeyDefBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDefBuilder")
            .field("def", &self.def)
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl KeyDefBuilder {
    /// Sets the static default.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.def.default = Some(value.into());
        self
    }

    /// Hides the key from inheritance.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.def.hidden = true;
        self
    }

    /// Adds a calculation reading `refs`.
    ///
    /// Every applicable calculation runs on resolution and all results must
    /// agree.
    #[must_use]
    pub fn calculate<F>(self, refs: &[&str], calc: F) -> Self
    where
        F: Fn(&mut Calc<'_>) -> Result<Input> + Send + Sync + 'static,
    {
        self.rule(false, refs, Arc::new(calc))
    }

    /// Adds an estimation reading `refs`.
    ///
    /// Estimations are consulted only when no calculation applies, and the
    /// first applicable one wins without any agreement check.
    #[must_use]
    pub fn estimate<F>(self, refs: &[&str], calc: F) -> Self
    where
        F: Fn(&mut Calc<'_>) -> Result<Input> + Send + Sync + 'static,
    {
        self.rule(true, refs, Arc::new(calc))
    }

    fn rule(mut self, estimation: bool, refs: &[&str], calc: CalcFn) -> Self {
        let refs = refs.iter().map(|r| String::from(*r)).collect();
        self.rules.push((estimation, refs, calc));
        self
    }

    /// Builds the [`KeyDef`].
    pub fn build(self) -> Result<KeyDef> {
        let mut def = self.def;
        for (estimation, refs, calc) in self.rules {
            let refs: Vec<&str> = refs.iter().map(String::as_str).collect();
            let rule = Rule::new(parse_all(&refs)?, calc);
            if estimation {
                def.estimations.push(rule);
            } else {
                def.calculations.push(rule);
            }
        }
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::reference::Relative;

    #[test]
    fn builder_defaults() {
        let key = KeyDef::builder("size", "Size").build().unwrap();
        assert_eq!(key.name(), "size");
        assert_eq!(key.type_name(), "Size");
        assert!(key.default().is_none());
        assert!(!key.hidden());
        assert_eq!(key.references().count(), 0);
    }

    #[test]
    fn builder_collects_rules_in_order() {
        let key = KeyDef::builder("max", "Int")
            .default(10)
            .hidden()
            .estimate(&["!basic"], |cx| cx.basic().map(Input::Value))
            .calculate(&["parent.limit"], |cx| cx.number("parent.limit").map(Input::from))
            .build()
            .unwrap();

        assert_eq!(key.default(), Some(&Value::Int(10)));
        assert!(key.hidden());
        assert_eq!(key.calculations().len(), 1);
        assert_eq!(key.estimations().len(), 1);
        assert_eq!(
            key.calculations()[0].refs()[0],
            Ref::Key {
                relative: Relative::Parent,
                name: "limit".into()
            }
        );
        assert_eq!(key.references().count(), 2);
    }

    #[test]
    fn malformed_references_fail_the_build() {
        let result = KeyDef::builder("x", "Int")
            .calculate(&["sibling.y"], |_| Ok(Input::from(0)))
            .build();
        assert!(matches!(result, Err(Error::LibraryMisuse(_))));
    }

    #[test]
    fn defaulted_states() {
        assert!(!KeyState::Explicit.is_defaulted());
        assert!(!KeyState::Inherited.is_defaulted());
        assert!(KeyState::Calculated.is_defaulted());
        assert!(KeyState::Defaulted.is_defaulted());
    }

    #[test]
    fn debug_hides_closures() {
        let key = KeyDef::builder("a", "Int").default(1).build().unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("KeyDef"));
        assert!(debug.contains("calculations: 0"));
    }
}
