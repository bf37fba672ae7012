// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Imperial Core: self-describing struct trees for binary formats.
//!
//! A format is described by a [`Schema`] of struct types. Each type has:
//!
//! - **A basic value** ([`BasicKind`]): stored, computed from other keys, or
//!   absent.
//! - **Keys** ([`KeyDef`]): typed slots holding other structs. A key
//!   without an explicit value is inherited from a benefactor, calculated,
//!   estimated or defaulted, in that order. Calculations that apply at the
//!   same time must agree, or the read fails with
//!   [`Error::SanityConflict`].
//! - **Facets** ([`ValueFacets`]): number, string and list views of the
//!   basic value.
//! - **Converters** and an optional **codec** ([`codec::Codec`]).
//!
//! A [`Tree`] instantiates structs. Values are computed lazily and cached
//! in an [`imperial_link`] graph; changing a value invalidates exactly what
//! read it.
//!
//! ## Quick Start
//!
//! ```rust
//! use imperial_core::{Input, KeyDef, SchemaBuilder, StructDef, Tree, builtin};
//!
//! let mut builder = SchemaBuilder::new();
//! builtin::register(&mut builder).unwrap();
//! builder
//!     .define(
//!         StructDef::builder("Adder")
//!             .key(
//!                 KeyDef::builder("a", "Int")
//!                     .calculate(&["data", "b"], |cx| {
//!                         Ok(Input::from(cx.number("data")? - cx.number("b")?))
//!                     })
//!                     .build()
//!                     .unwrap(),
//!             )
//!             .key(KeyDef::builder("b", "Int").default(8).build().unwrap())
//!             .key(
//!                 KeyDef::builder("data", "Int")
//!                     .calculate(&["a", "b"], |cx| {
//!                         Ok(Input::from(cx.number("a")? + cx.number("b")?))
//!                     })
//!                     .build()
//!                     .unwrap(),
//!             )
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let mut tree = Tree::new(builder.build().unwrap());
//! let adder = tree.create_root("Adder", "adder").unwrap();
//! tree.set(adder, "a", 1).unwrap();
//! assert_eq!(tree.number(adder, "data").unwrap(), 9);
//!
//! // Changing an input invalidates the sum.
//! tree.set(adder, "b", 2).unwrap();
//! assert_eq!(tree.number(adder, "data").unwrap(), 3);
//! ```
//!
//! ## Binary data
//!
//! Types with a codec serialize to bytes and parse back, eagerly with
//! [`Tree::unserialize`] or a few fields at a time with
//! [`Tree::unserialize_until`]:
//!
//! ```rust
//! use imperial_core::codec::{BitStream, BytesBuffer};
//! use imperial_core::{Tree, builtin};
//!
//! let mut tree = Tree::new(builtin::schema().unwrap());
//! let n = tree.create_root("Number", "n").unwrap();
//! tree.set(n, "size", 2).unwrap();
//!
//! let mut stream = BytesBuffer::from_bytes([0x34, 0x12, 0xff]);
//! tree.unserialize(n, &mut stream).unwrap();
//! assert_eq!(tree.number(n, "").unwrap(), 0x1234);
//! assert_eq!(stream.tell(), 2);
//! assert_eq!(tree.packed(n).unwrap(), [0x34, 0x12]);
//! ```

mod access;
mod calc;
mod convert;
mod error;
mod facet;
mod id;
mod journal;
mod key;
mod reference;
mod resolve;
mod schema;
mod tree;
mod value;

pub mod builtin;
pub mod codec;

pub use calc::Calc;
pub use codec::{BitStream, BytesBuffer, Codec, Endian, Field, FieldParser, Unserializer, Until};
pub use error::{Error, Result};
pub use facet::{ListFacet, NoFacets, NumberFacet, StringFacet, ValueFacets};
pub use id::{StructId, TypeHandle};
pub use key::{CalcFn, KeyDef, KeyDefBuilder, KeyState, Rule};
pub use reference::{KeyPath, Ref, Relative};
pub use schema::{
    BasicKind, CodecDef, Converter, NormalizeFn, Schema, SchemaBuilder, StructDef,
    StructDefBuilder,
};
pub use tree::Tree;
pub use value::{Input, Value};
