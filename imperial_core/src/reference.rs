// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference strings and key paths.
//!
//! Calculations declare what they read with reference strings:
//!
//! | Form             | Meaning                                           |
//! |------------------|---------------------------------------------------|
//! | `key`            | `key` on this struct                              |
//! | `this.key`, `.key` | same                                            |
//! | `parent.key`     | `key` on the parent (or the container)            |
//! | `!aspect`        | an aspect of this struct: `basic`, `children`, ...|
//! | `parent!aspect`  | an aspect of the parent                           |

use core::fmt;

use imperial_link::Aspect;
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Which struct a [`Ref`] starts from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Relative {
    /// The struct the calculation runs on.
    This,
    /// Its lexical parent, or its container when it has no parent.
    Parent,
}

impl Relative {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "" | "this" => Some(Self::This),
            "parent" => Some(Self::Parent),
            _ => None,
        }
    }
}

/// A parsed reference string.
///
/// # Example
///
/// ```rust
/// use imperial_core::{Ref, Relative};
/// use imperial_link::Aspect;
///
/// assert_eq!(
///     Ref::parse("parent.size").unwrap(),
///     Ref::Key { relative: Relative::Parent, name: "size".into() },
/// );
/// assert_eq!(
///     Ref::parse("!basic").unwrap(),
///     Ref::Aspect { relative: Relative::This, aspect: Aspect::Basic },
/// );
/// assert!(Ref::parse("cousin.size").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ref {
    /// A key on the relative.
    Key {
        /// Where to look.
        relative: Relative,
        /// The key name.
        name: String,
    },
    /// A structural aspect of the relative.
    Aspect {
        /// Where to look.
        relative: Relative,
        /// Which aspect.
        aspect: Aspect,
    },
}

impl Ref {
    /// Parses a reference string.
    ///
    /// Unknown relatives, unknown aspects and empty key names are
    /// [`Error::LibraryMisuse`].
    pub fn parse(text: &str) -> Result<Self> {
        let malformed = || Error::misuse(format!("malformed reference `{text}`"));
        if let Some((relative, aspect)) = text.split_once('!') {
            let relative = Relative::parse(relative).ok_or_else(malformed)?;
            let aspect = Aspect::parse(aspect).ok_or_else(malformed)?;
            return Ok(Self::Aspect { relative, aspect });
        }
        let (relative, name) = match text.split_once('.') {
            Some((relative, name)) => (Relative::parse(relative).ok_or_else(malformed)?, name),
            None => (Relative::This, text),
        };
        if name.is_empty() || name.contains('.') {
            return Err(malformed());
        }
        Ok(Self::Key {
            relative,
            name: name.into(),
        })
    }

    /// Returns the relative the reference starts from.
    #[must_use]
    pub fn relative(&self) -> Relative {
        match self {
            Self::Key { relative, .. } | Self::Aspect { relative, .. } => *relative,
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relative = |r: &Relative| match r {
            Relative::This => "",
            Relative::Parent => "parent",
        };
        match self {
            Self::Key {
                relative: Relative::This,
                name,
            } => f.write_str(name),
            Self::Key { relative: r, name } => write!(f, "{}.{name}", relative(r)),
            Self::Aspect { relative: r, aspect } => write!(f, "{}!{aspect}", relative(r)),
        }
    }
}

pub(crate) fn parse_all(refs: &[&str]) -> Result<Vec<Ref>> {
    refs.iter().map(|r| Ref::parse(r)).collect()
}

/// A chain of key names walked from a struct.
///
/// Each segment but the last is resolved to the struct it holds; the last
/// names the key to read or write. An empty path means the struct's own
/// basic value.
///
/// Strings are split on `.`, so `"size.bits"` and `["size", "bits"]` are
/// the same path and `""` is the empty path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyPath<'a>(SmallVec<[&'a str; 4]>);

impl<'a> KeyPath<'a> {
    /// The empty path.
    #[must_use]
    pub fn basic() -> Self {
        Self(SmallVec::new())
    }

    /// Returns `true` for the empty path.
    #[must_use]
    pub fn is_basic(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[&'a str] {
        &self.0
    }

    /// Splits off the last segment.
    #[must_use]
    pub fn split_last(&self) -> Option<(&'a str, &[&'a str])> {
        self.0.split_last().map(|(last, rest)| (*last, rest))
    }
}

impl<'a> From<&'a str> for KeyPath<'a> {
    fn from(value: &'a str) -> Self {
        Self(value.split('.').filter(|s| !s.is_empty()).collect())
    }
}

impl<'a> From<&'a String> for KeyPath<'a> {
    fn from(value: &'a String) -> Self {
        Self::from(value.as_str())
    }
}

impl<'a> From<&[&'a str]> for KeyPath<'a> {
    fn from(value: &[&'a str]) -> Self {
        Self(value.iter().copied().collect())
    }
}

impl<'a, const N: usize> From<[&'a str; N]> for KeyPath<'a> {
    fn from(value: [&'a str; N]) -> Self {
        Self(value.into_iter().collect())
    }
}

impl fmt::Display for KeyPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}
