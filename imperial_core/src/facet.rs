// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value facets: typed views of a struct's basic value.

use crate::calc::Calc;
use crate::error::{Error, Result};
use crate::value::Value;

/// The numeric, string and list views a struct type may offer.
///
/// Every method defaults to [`Error::ValueUnsupported`], so a type
/// implements only the facets it actually has.
///
/// # Example
///
/// ```rust
/// use imperial_core::{Calc, Result, Value, ValueFacets};
///
/// struct Doubled;
///
/// impl ValueFacets for Doubled {
///     fn number(&self, cx: &mut Calc<'_>) -> Result<i128> {
///         match cx.basic()? {
///             Value::Int(i) => Ok(i * 2),
///             _ => Err(cx.unsupported("number")),
///         }
///     }
/// }
/// ```
pub trait ValueFacets: Send + Sync {
    /// The value as an integer.
    fn number(&self, cx: &mut Calc<'_>) -> Result<i128> {
        Err(cx.unsupported("number"))
    }

    /// The value as a string.
    fn string(&self, cx: &mut Calc<'_>) -> Result<String> {
        Err(cx.unsupported("string"))
    }

    /// The value as a list.
    fn list(&self, cx: &mut Calc<'_>) -> Result<Vec<Value>> {
        Err(cx.unsupported("list"))
    }
}

/// Facets for types that offer none.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoFacets;

impl ValueFacets for NoFacets {}

/// Reads the basic value as an integer.
#[derive(Copy, Clone, Debug, Default)]
pub struct NumberFacet;

impl ValueFacets for NumberFacet {
    fn number(&self, cx: &mut Calc<'_>) -> Result<i128> {
        match cx.basic()? {
            Value::Int(i) => Ok(i),
            other => Err(Error::mismatch("int", other.kind())),
        }
    }

    fn string(&self, cx: &mut Calc<'_>) -> Result<String> {
        self.number(cx).map(|n| n.to_string())
    }
}

/// Reads the basic value as a string.
#[derive(Copy, Clone, Debug, Default)]
pub struct StringFacet;

impl ValueFacets for StringFacet {
    fn string(&self, cx: &mut Calc<'_>) -> Result<String> {
        match cx.basic()? {
            Value::Str(s) => Ok(s),
            other => Err(Error::mismatch("str", other.kind())),
        }
    }
}

/// Reads the basic value as a list.
#[derive(Copy, Clone, Debug, Default)]
pub struct ListFacet;

impl ValueFacets for ListFacet {
    fn list(&self, cx: &mut Calc<'_>) -> Result<Vec<Value>> {
        match cx.basic()? {
            Value::List(items) => Ok(items),
            other => Err(Error::mismatch("list", other.kind())),
        }
    }
}
