// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Serialization of struct trees to and from byte streams.
//!
//! A type becomes serializable by registering a [`Codec`] with
//! [`StructDefBuilder::codec`](crate::StructDefBuilder::codec). The codec
//! writes the struct with [`Codec::serialize`] and reads it back through a
//! [`FieldParser`], a small state machine that yields one [`Field`] per
//! [`step`](FieldParser::step).
//!
//! Two decoding modes are offered:
//!
//! - [`Tree::unserialize`] runs the parser to completion, then assigns
//!   every field at once. A failure leaves the struct untouched.
//! - [`Tree::unserialize_until`] assigns fields as they are produced and
//!   stops as soon as the requested keys are present. The parser state is
//!   kept in the tree, so a later call without a new stream continues from
//!   the same cursor position.
//!
//! Only whole bytes are addressed; bit counts that are not a multiple of 8
//! are [`Error::SerializationUnsupported`].

mod buffer;
mod number;
mod parser;

use std::sync::Arc;

pub use buffer::{BitStream, BytesBuffer};
pub use number::{Endian, decode_int, encode_int};
pub use parser::Unserializer;

use crate::calc::Calc;
use crate::error::{Error, Result};
use crate::id::StructId;
use crate::tree::Tree;
use crate::value::Input;

/// Writes a struct to a stream and builds parsers that read it back.
pub trait Codec: Send + Sync {
    /// Writes the struct `cx` is bound to at the stream's cursor.
    fn serialize(&self, cx: &mut Calc<'_>, stream: &mut dyn BitStream) -> Result<()>;

    /// Starts a new parse.
    fn parser(&self) -> Box<dyn FieldParser>;
}

/// The resumable half of a [`Codec`].
///
/// Each call to [`step`](Self::step) reads the next field from the stream
/// and returns it, or returns `None` once the structure is complete. The
/// parser may read keys that earlier steps produced through `cx`.
pub trait FieldParser {
    /// Produces the next field.
    fn step(&mut self, cx: &mut Calc<'_>, stream: &mut dyn BitStream) -> Result<Option<Field>>;
}

/// One decoded field.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// The key to assign; empty for the basic value.
    pub key: String,
    /// The decoded input.
    pub value: Input,
}

impl Field {
    /// Builds a field.
    pub fn new(key: impl Into<String>, value: impl Into<Input>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// How far a resumable parse should go.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Until {
    /// To the end of the structure.
    #[default]
    All,
    /// Until every listed key is present. The empty name stands for the
    /// basic value.
    Keys(Vec<String>),
}

impl Until {
    /// Stops once every key in `keys` is present.
    pub fn keys<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self::Keys(keys.into_iter().map(Into::into).collect())
    }
}

impl Tree {
    pub(crate) fn codec(&self, id: StructId) -> Result<Arc<dyn Codec>> {
        let def = self.schema().def(self.type_handle(id)?);
        def.codec()
            .map(|codec| Arc::clone(codec.codec()))
            .ok_or_else(|| {
                Error::SerializationUnsupported(format!("{} has no codec", def.name()))
            })
    }

    /// Serializes a struct into a freshly allocated buffer.
    ///
    /// The buffer length comes from the struct's `size.bits` key.
    pub fn serialize(&mut self, id: StructId) -> Result<Vec<u8>> {
        let bits = self.number(id, "size.bits")?;
        if bits < 0 || bits % 8 != 0 {
            return Err(Error::SerializationUnsupported(format!(
                "{bits} bits is not a whole number of bytes"
            )));
        }
        let size = usize::try_from(bits / 8).map_err(|_| {
            Error::SerializationUnsupported(format!("{bits} bits does not fit in memory"))
        })?;
        let mut buffer = BytesBuffer::zeroed(size);
        self.serialize_into(id, &mut buffer)?;
        tracing::trace!(?id, size, "codec.serialize");
        Ok(buffer.into_bytes())
    }

    /// Serializes a struct in place at the stream's cursor.
    pub fn serialize_into(&mut self, id: StructId, stream: &mut dyn BitStream) -> Result<()> {
        let codec = self.codec(id)?;
        codec.serialize(&mut Calc::new(self, id), stream)
    }

    /// Parses a whole struct from `stream` and assigns every field.
    ///
    /// Fields are only assigned once the parser has finished, and are
    /// assigned with [`set_all`](Tree::set_all), so a failed parse or a
    /// field that does not fit its key leaves the struct as it was.
    pub fn unserialize(&mut self, id: StructId, stream: &mut dyn BitStream) -> Result<()> {
        let codec = self.codec(id)?;
        let mut parser = codec.parser();
        let mut fields = Vec::new();
        {
            let mut cx = Calc::new(self, id);
            while let Some(field) = parser.step(&mut cx, stream)? {
                fields.push((field.key, field.value));
            }
        }
        tracing::trace!(?id, fields = fields.len(), "codec.unserialize");
        self.set_all(id, fields)
    }

    /// Parses a whole struct from a byte slice.
    pub fn unserialize_bytes(&mut self, id: StructId, bytes: &[u8]) -> Result<()> {
        let mut buffer = BytesBuffer::from_bytes(bytes);
        self.unserialize(id, &mut buffer)
    }

    /// Parses a struct incrementally.
    ///
    /// With a stream, any parse in progress for `id` is discarded and a new
    /// one starts at the stream's cursor. Without one, the parse in progress
    /// continues where it stopped. Fields whose key is already set are
    /// skipped. Returns `true` once the structure has been read completely,
    /// and also when there is nothing to resume.
    ///
    /// A parse that fails keeps its state, so the call can be retried.
    pub fn unserialize_until(
        &mut self,
        id: StructId,
        stream: Option<Box<dyn BitStream>>,
        until: &Until,
    ) -> Result<bool> {
        if let Some(stream) = stream {
            let parser = Unserializer::new(self, id, stream)?;
            self.parsers.insert(id, parser);
        }
        let Some(mut parser) = self.parsers.remove(&id) else {
            return Ok(true);
        };
        let result = parser.resume(self, id, until);
        let finished = parser.is_finished();
        if !finished || result.is_err() {
            self.parsers.insert(id, parser);
        }
        result.map(|()| finished)
    }

    /// Returns the parse in progress for `id`, if any.
    #[must_use]
    pub fn unserializer(&self, id: StructId) -> Option<&Unserializer> {
        self.parsers.get(&id)
    }
}
