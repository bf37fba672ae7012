// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Built-in value types.
//!
//! | Type     | Basic value | Facets  | Keys                                         |
//! |----------|-------------|---------|----------------------------------------------|
//! | `Int`    | integer     | number  |                                              |
//! | `Str`    | string      | string  |                                              |
//! | `List`   | list        | list    |                                              |
//! | `Size`   | byte count  | number  | `bits`, calculated                           |
//! | `Number` | integer     | number  | `size` = 4, `endian` = `"little"`, `sign` = `"unsigned"`, `min`/`max`, estimated |
//!
//! `Str` converts to and from `Int`. `Number` has a codec writing a
//! fixed-width integer of `size` bytes.

use std::io;
use std::sync::Arc;

use crate::calc::Calc;
use crate::codec::{BitStream, Codec, Endian, Field, FieldParser, decode_int, encode_int};
use crate::error::{Error, Result};
use crate::facet::{ListFacet, NumberFacet, StringFacet};
use crate::key::KeyDef;
use crate::schema::{Schema, SchemaBuilder, StructDef};
use crate::value::{Input, Value};

/// Defines the built-in types on `builder`.
pub fn register(builder: &mut SchemaBuilder) -> Result<()> {
    for def in [int()?, string()?, list()?, size()?, number()?] {
        builder.define(def)?;
    }
    Ok(())
}

/// Returns a schema holding only the built-in types.
pub fn schema() -> Result<Arc<Schema>> {
    let mut builder = SchemaBuilder::new();
    register(&mut builder)?;
    builder.build()
}

fn normalize_int(value: Value) -> Result<Value> {
    match value {
        Value::Int(_) => Ok(value),
        Value::Bool(b) => Ok(Value::Int(i128::from(b))),
        other => Err(Error::mismatch("int", other.kind())),
    }
}

fn int_of(value: Value) -> Result<i128> {
    match value {
        Value::Int(i) => Ok(i),
        other => Err(Error::mismatch("int", other.kind())),
    }
}

fn int() -> Result<StructDef> {
    StructDef::builder("Int")
        .stored_basic()
        .normalize(normalize_int)
        .facets(NumberFacet)
        .build()
}

fn string() -> Result<StructDef> {
    StructDef::builder("Str")
        .stored_basic()
        .normalize(|value| match value {
            Value::Str(_) => Ok(value),
            other => Err(Error::mismatch("str", other.kind())),
        })
        .facets(StringFacet)
        .converter(None, Some("Int"), |cx| {
            let text = match cx.basic()? {
                Value::Str(text) => text,
                other => return Err(Error::mismatch("str", other.kind())),
            };
            text.trim()
                .parse::<i128>()
                .map(Input::from)
                .map_err(|_| Error::mismatch("Int", format!("{text:?}")))
        })
        .converter(Some("Int"), None, |cx| {
            Ok(Input::from(int_of(cx.basic()?)?.to_string()))
        })
        .build()
}

fn list() -> Result<StructDef> {
    StructDef::builder("List")
        .stored_basic()
        .normalize(|value| match value {
            Value::List(_) => Ok(value),
            other => Err(Error::mismatch("list", other.kind())),
        })
        .facets(ListFacet)
        .build()
}

fn size() -> Result<StructDef> {
    let bits = KeyDef::builder("bits", "Int")
        .calculate(&["!basic"], |cx| {
            let bytes = int_of(cx.basic()?)?;
            bytes
                .checked_mul(8)
                .map(Input::from)
                .ok_or_else(|| Error::SerializationUnsupported(format!("{bytes} bytes in bits")))
        })
        .build()?;
    StructDef::builder("Size")
        .stored_basic()
        .normalize(normalize_int)
        .facets(NumberFacet)
        .key(bits)
        .build()
}

fn number() -> Result<StructDef> {
    let own_value = |cx: &mut Calc<'_>| cx.basic().map(Input::Value);
    StructDef::builder("Number")
        .stored_basic()
        .normalize(normalize_int)
        .facets(NumberFacet)
        .key(KeyDef::builder("size", "Size").default(4).build()?)
        .key(
            KeyDef::builder("endian", "Str")
                .default(Endian::Little.as_str())
                .build()?,
        )
        .key(KeyDef::builder("sign", "Str").default("unsigned").build()?)
        .key(KeyDef::builder("min", "Int").estimate(&["!basic"], own_value).build()?)
        .key(KeyDef::builder("max", "Int").estimate(&["!basic"], own_value).build()?)
        .codec(&["size", "endian", "sign"], NumberCodec)
        .build()
}

/// Width, byte order and signedness of a `Number`.
fn layout(cx: &mut Calc<'_>) -> Result<(usize, Endian, bool)> {
    let size = cx.number("size")?;
    let width = usize::try_from(size)
        .map_err(|_| Error::SerializationUnsupported(format!("invalid width {size}")))?;
    let endian = Endian::parse(&cx.string("endian")?)?;
    let signed = match cx.string("sign")?.as_str() {
        "signed" => true,
        "unsigned" => false,
        other => return Err(Error::mismatch("\"signed\" or \"unsigned\"", format!("{other:?}"))),
    };
    Ok((width, endian, signed))
}

#[derive(Debug)]
struct NumberCodec;

impl Codec for NumberCodec {
    fn serialize(&self, cx: &mut Calc<'_>, stream: &mut dyn BitStream) -> Result<()> {
        let (width, endian, signed) = layout(cx)?;
        let bytes = encode_int(int_of(cx.basic()?)?, width, endian, signed)?;
        let written = stream.write(&bytes)?;
        if written < bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("wrote {written} of {} bytes", bytes.len()),
            )
            .into());
        }
        Ok(())
    }

    fn parser(&self) -> Box<dyn FieldParser> {
        Box::new(NumberParser { done: false })
    }
}

#[derive(Debug)]
struct NumberParser {
    done: bool,
}

impl FieldParser for NumberParser {
    fn step(&mut self, cx: &mut Calc<'_>, stream: &mut dyn BitStream) -> Result<Option<Field>> {
        if self.done {
            return Ok(None);
        }
        let (width, endian, signed) = layout(cx)?;
        let value = decode_int(&stream.read_exact(width)?, endian, signed)?;
        self.done = true;
        Ok(Some(Field::new("", value)))
    }
}
