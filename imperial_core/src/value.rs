// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive values and assignment inputs.
//!
//! [`Value`] is the basic (scalar) representation of a struct. [`Input`] is
//! anything that can be assigned to a key: a primitive, an existing struct,
//! or a list of entries to build a new struct from.

use core::fmt;

use crate::id::StructId;

/// A primitive basic value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    /// An integer. Wide enough for every fixed-width codec field.
    Int(i128),
    /// A boolean.
    Bool(bool),
    /// A string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A list of values.
    List(Vec<Self>),
}

impl Value {
    /// Returns a short name for the variant, used in type errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
        }
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bytes, if this is a byte string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                f.write_str("b\"")?;
                for byte in b {
                    write!(f, "\\x{byte:02x}")?;
                }
                f.write_str("\"")
            }
            Self::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

macro_rules! int_conversions {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Int(i128::from(value))
                }
            }

            impl From<$ty> for Input {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

int_conversions!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<Self>> for Value {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

/// Something that can be assigned to a key or a struct.
///
/// Calculations return an `Input`, as do codec field parsers.
///
/// # Example
///
/// ```rust
/// use imperial_core::{Input, Value};
///
/// // A number with value 1 whose `size` key is 2.
/// let field = Input::entries([("", Input::from(1)), ("size", Input::from(2))]);
/// assert_eq!(field.entry(""), Some(&Input::Value(Value::Int(1))));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    /// A primitive to normalize into the declared type.
    Value(Value),
    /// An existing struct, converted to the declared type if needed.
    Struct(StructId),
    /// Key assignments for a new struct of the declared type. The empty
    /// key names the basic value.
    Entries(Vec<(String, Self)>),
}

impl Input {
    /// Builds an [`Input::Entries`].
    pub fn entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Entries(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns the entry for `key` if this is an entry list.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Entries(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<StructId> for Input {
    fn from(value: StructId) -> Self {
        Self::Struct(value)
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

impl From<Vec<u8>> for Input {
    fn from(value: Vec<u8>) -> Self {
        Self::Value(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_pick_the_obvious_variant() {
        assert_eq!(Value::from(7_u8), Value::Int(7));
        assert_eq!(Value::from(-3), Value::Int(-3));
        assert_eq!(Value::from("x"), Value::Str("x".into()));
        assert_eq!(Input::from(true), Input::Value(Value::Bool(true)));
    }

    #[test]
    fn accessors_match_variants() {
        assert_eq!(Value::Int(4).as_int(), Some(4));
        assert_eq!(Value::Str("a".into()).as_int(), None);
        assert_eq!(Value::Bytes(vec![1]).as_bytes(), Some(&[1_u8][..]));
        assert_eq!(Value::List(vec![]).kind(), "list");
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(Value::Bytes(vec![0, 255]).to_string(), "b\"\\x00\\xff\"");
        assert_eq!(Value::Str("hi".into()).to_string(), "\"hi\"");
    }

    #[test]
    fn entries_lookup() {
        let input = Input::entries([("", Input::from(1)), ("size", Input::from(2))]);
        assert_eq!(input.entry("size"), Some(&Input::from(2)));
        assert_eq!(input.entry("missing"), None);
        assert_eq!(Input::from(1).entry(""), None);
    }
}
