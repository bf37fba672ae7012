// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversion between struct types.

use std::sync::Arc;

use crate::calc::Calc;
use crate::error::{Error, Result};
use crate::id::{StructId, TypeHandle};
use crate::tree::Tree;
use crate::value::Input;

impl Tree {
    /// Converts a struct to the type `target`.
    ///
    /// A struct already of that type is returned as is. Otherwise the
    /// source type's converter to `target` is tried, then `target`'s
    /// converter from the source type, and the result becomes a new root
    /// struct named like the source.
    ///
    /// # Example
    ///
    /// ```rust
    /// use imperial_core::{Tree, builtin};
    ///
    /// let mut tree = Tree::new(builtin::schema().unwrap());
    /// let text = tree.create_root("Str", "text").unwrap();
    /// tree.set(text, "", "17").unwrap();
    ///
    /// let number = tree.convert(text, "Int").unwrap();
    /// assert_eq!(tree.number(number, "").unwrap(), 17);
    /// ```
    pub fn convert(&mut self, id: StructId, target: &str) -> Result<StructId> {
        let ty = self.schema().require(target)?;
        let Some(input) = self.convert_input(id, ty)? else {
            return Ok(id);
        };
        let name = String::from(self.name(id)?);
        let converted = self.create_detached(ty, &name)?;
        self.fill(converted, input)?;
        Ok(converted)
    }

    /// Runs the converter from `source` to `ty`, or returns `None` if no
    /// conversion is needed.
    pub(crate) fn convert_input(
        &mut self,
        source: StructId,
        ty: TypeHandle,
    ) -> Result<Option<Input>> {
        let from = self.type_handle(source)?;
        if from == ty {
            return Ok(None);
        }
        let schema = Arc::clone(self.schema());
        let (from, to) = (schema.def(from), schema.def(ty));
        let converter = from
            .converter_to(to.name())
            .or_else(|| to.converter_from(from.name()))
            .ok_or_else(|| Error::mismatch(to.name(), from.name()))?;
        let input = converter.run(&mut Calc::new(self, source))?;
        tracing::trace!(?source, from = from.name(), to = to.name(), "struct.convert");
        Ok(Some(input))
    }
}
