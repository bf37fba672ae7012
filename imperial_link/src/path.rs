// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Link-map path names.
//!
//! A path names one facet of one struct in a tree:
//!
//! ```text
//! Root{header}{magic}.size/basic
//! ^^^^ ^^^^^^^^^^^^^^ ^^^^ ^^^^^
//! root   child chain  key  aspect
//! ```
//!
//! The prefix (root plus child chain) mirrors struct nesting; a value
//! struct owned by a key extends its owner's prefix with `.key`.

use alloc::format;
use alloc::string::String;
use core::fmt;

/// The facet of a struct a path refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Aspect {
    /// The structural name. Registered as a rigid node.
    Name,
    /// The resolved basic value.
    Basic,
    /// The serialized bytes.
    Packed,
    /// The list of children.
    Children,
}

impl Aspect {
    /// All aspects, in declaration order.
    pub const ALL: [Self; 4] = [Self::Name, Self::Basic, Self::Packed, Self::Children];

    /// Returns the aspect's path suffix without the leading `/`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Basic => "basic",
            Self::Packed => "packed",
            Self::Children => "children",
        }
    }

    /// Parses an aspect name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the prefix of a child named `child` under `parent`.
#[must_use]
pub fn child(parent: &str, child: &str) -> String {
    format!("{parent}{{{child}}}")
}

/// Returns the prefix of the value struct owned by `key` under `owner`.
#[must_use]
pub fn owned(owner: &str, key: &str) -> String {
    format!("{owner}.{key}")
}

/// Returns the path of `aspect` of the struct at `prefix`.
#[must_use]
pub fn aspect(prefix: &str, aspect: Aspect) -> String {
    format!("{prefix}/{aspect}")
}

/// Returns the path of the resolved value of `key` on the struct at `prefix`.
///
/// This is the name calculation rules reference when they read a key.
#[must_use]
pub fn key(prefix: &str, key: &str) -> String {
    format!("{prefix}.{key}/{}", Aspect::Basic)
}

/// Splits a path into its prefix and aspect.
///
/// Returns `None` if the path has no `/` or the suffix is not a known aspect.
#[must_use]
pub fn split(path: &str) -> Option<(&str, Aspect)> {
    let (prefix, suffix) = path.rsplit_once('/')?;
    Some((prefix, Aspect::parse(suffix)?))
}
