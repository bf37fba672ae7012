// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The view of a tree handed to calculations, converters, facets and codecs.

use core::fmt;

use imperial_link::Aspect;

use crate::error::{Error, Result};
use crate::id::StructId;
use crate::reference::Ref;
use crate::tree::Tree;
use crate::value::Value;

/// A tree borrowed on behalf of one struct.
///
/// Reference strings passed to the accessors use the grammar of
/// [`Ref`]: `"size"`, `"parent.size"`, `"!basic"`, `"parent!children"`.
pub struct Calc<'a> {
    tree: &'a mut Tree,
    this: StructId,
}

impl<'a> Calc<'a> {
    pub(crate) fn new(tree: &'a mut Tree, this: StructId) -> Self {
        Self { tree, this }
    }

    /// Returns the struct this calculation runs on.
    #[must_use]
    pub fn this(&self) -> StructId {
        self.this
    }

    /// Returns the whole tree.
    pub fn tree(&mut self) -> &mut Tree {
        self.tree
    }

    /// Returns the struct a reference points at.
    ///
    /// For key references this is the key's value struct; for aspect
    /// references it is the relative itself.
    pub fn resolve(&mut self, reference: &str) -> Result<StructId> {
        match Ref::parse(reference)? {
            Ref::Key { relative, name } => {
                let target = self.tree.relative(self.this, relative)?;
                self.tree.resolve(target, name.as_str())
            }
            Ref::Aspect { relative, .. } => self.tree.relative(self.this, relative),
        }
    }

    /// Reads the basic value a reference points at.
    ///
    /// `!name` yields the struct's name and `!packed` its serialized bytes.
    pub fn get(&mut self, reference: &str) -> Result<Value> {
        match Ref::parse(reference)? {
            Ref::Key { relative, name } => {
                let target = self.tree.relative(self.this, relative)?;
                self.tree.get(target, name.as_str())
            }
            Ref::Aspect { relative, aspect } => {
                let target = self.tree.relative(self.this, relative)?;
                match aspect {
                    Aspect::Basic => self.tree.basic(target),
                    Aspect::Name => Ok(Value::Str(self.tree.name(target)?.into())),
                    Aspect::Packed => self.tree.packed(target).map(Value::Bytes),
                    Aspect::Children => Err(Error::misuse(format!(
                        "`{reference}` is a struct list; use Calc::children"
                    ))),
                }
            }
        }
    }

    /// Reads the number facet of what a reference points at.
    pub fn number(&mut self, reference: &str) -> Result<i128> {
        let target = self.resolve(reference)?;
        self.tree.number(target, "")
    }

    /// Reads the string facet of what a reference points at.
    pub fn string(&mut self, reference: &str) -> Result<String> {
        let target = self.resolve(reference)?;
        self.tree.string(target, "")
    }

    /// Reads the list facet of what a reference points at.
    pub fn list(&mut self, reference: &str) -> Result<Vec<Value>> {
        let target = self.resolve(reference)?;
        self.tree.list(target, "")
    }

    /// Returns the children of the struct a reference points at.
    pub fn children(&mut self, reference: &str) -> Result<Vec<StructId>> {
        let target = self.resolve(reference)?;
        Ok(self.tree.children(target)?.to_vec())
    }

    /// Reads this struct's own basic value.
    pub fn basic(&mut self) -> Result<Value> {
        self.tree.basic(self.this)
    }

    /// Builds the error a facet reports when this struct's type lacks it.
    #[must_use]
    pub fn unsupported(&self, facet: &'static str) -> Error {
        let type_name = self.tree.type_name(self.this).unwrap_or("<removed>");
        Error::unsupported(type_name, facet)
    }
}

impl fmt::Debug for Calc<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calc")
            .field("this", &self.this)
            .finish_non_exhaustive()
    }
}
