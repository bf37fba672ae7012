// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct and type identification.

use core::fmt;

/// A handle to a struct living in a [`Tree`](crate::Tree).
///
/// Handles are never reused. Once a struct is removed, operations on its
/// handle fail with [`Error::LibraryMisuse`](crate::Error::LibraryMisuse).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StructId(u32);

impl StructId {
    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this struct ID.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StructId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StructId").field(&self.0).finish()
    }
}

impl fmt::Display for StructId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StructId({})", self.0)
    }
}

/// A handle to a struct type defined in a [`Schema`](crate::Schema).
///
/// # Example
///
/// ```rust
/// use imperial_core::{SchemaBuilder, StructDef};
///
/// let mut builder = SchemaBuilder::new();
/// let unit = builder.define(StructDef::builder("Unit").build().unwrap()).unwrap();
/// let schema = builder.build().unwrap();
/// assert_eq!(schema.handle("Unit"), Some(unit));
/// assert_eq!(schema.name(unit), "Unit");
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeHandle(u16);

impl TypeHandle {
    #[inline]
    pub(crate) const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this type handle.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeHandle").field(&self.0).finish()
    }
}
