// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;

use crate::calc::Calc;
use crate::error::{Error, Result};
use crate::id::StructId;
use crate::tree::Tree;

use super::{BitStream, FieldParser, Until};

/// The state of a resumable parse: the field parser, the stream it reads
/// and the struct it assigns to.
///
/// An `Unserializer` is bound to one struct for its whole life.
pub struct Unserializer {
    target: StructId,
    parser: Box<dyn FieldParser>,
    stream: Box<dyn BitStream>,
    finished: bool,
}

impl Unserializer {
    /// Starts parsing `target` from the stream's cursor.
    pub fn new(tree: &Tree, target: StructId, stream: Box<dyn BitStream>) -> Result<Self> {
        let parser = tree.codec(target)?.parser();
        Ok(Self {
            target,
            parser,
            stream,
            finished: false,
        })
    }

    /// Returns the struct this parse assigns to.
    #[must_use]
    pub fn target(&self) -> StructId {
        self.target
    }

    /// Returns `true` once the parser has produced its last field.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns the stream cursor.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.stream.tell()
    }

    /// Steps the parser until `until` is satisfied or the structure ends.
    ///
    /// Resuming against any struct but the target is
    /// [`Error::LibraryMisuse`].
    pub fn resume(&mut self, tree: &mut Tree, id: StructId, until: &Until) -> Result<()> {
        if id != self.target {
            return Err(Error::misuse(format!(
                "parser bound to {} resumed against {id}",
                self.target
            )));
        }
        while !self.finished && !satisfied(tree, id, until) {
            let field = {
                let mut cx = Calc::new(tree, id);
                self.parser.step(&mut cx, &mut *self.stream)?
            };
            let Some(field) = field else {
                self.finished = true;
                tracing::trace!(?id, position = self.position(), "codec.resume.finished");
                break;
            };
            let present = is_present(tree, id, &field.key);
            tracing::trace!(
                ?id,
                key = %field.key,
                present,
                position = self.position(),
                "codec.resume.step"
            );
            if !present {
                tree.set_all(id, vec![(field.key, field.value)])?;
            }
        }
        Ok(())
    }
}

fn is_present(tree: &Tree, id: StructId, key: &str) -> bool {
    if key.is_empty() {
        tree.has_basic_value(id)
    } else {
        tree.is_set(id, key).unwrap_or(false)
    }
}

fn satisfied(tree: &Tree, id: StructId, until: &Until) -> bool {
    match until {
        Until::All => false,
        Until::Keys(keys) => keys.iter().all(|key| is_present(tree, id, key)),
    }
}

impl fmt::Debug for Unserializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unserializer")
            .field("target", &self.target)
            .field("position", &self.position())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
