// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type shared by every fallible operation.

use std::io;

use thiserror::Error;

/// Convenience alias for results carrying [`enum@Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can go wrong while resolving, assigning or coding keys.
///
/// Errors are raised synchronously and never retried. A failed operation
/// leaves already committed values untouched; a failed calculation leaves
/// the key's cache invalid so the next read tries again.
#[derive(Debug, Error)]
pub enum Error {
    /// No explicit value, usable inheritance, applicable calculation or
    /// default exists for the key.
    #[error("key `{0}` not found")]
    KeyNotFound(String),
    /// Applicable calculations for a key produced different values.
    #[error("calculations for key `{0}` disagree")]
    SanityConflict(String),
    /// A value could not be normalized into the declared type.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// The declared type.
        expected: String,
        /// What was supplied instead.
        found: String,
    },
    /// A value facet was requested from a type that does not provide it.
    #[error("{type_name} has no {facet} facet")]
    ValueUnsupported {
        /// The struct type that was asked.
        type_name: String,
        /// The facet that was requested.
        facet: &'static str,
    },
    /// The value cannot be represented by the codec.
    #[error("cannot serialize: {0}")]
    SerializationUnsupported(String),
    /// The format definition or the calling code is wrong.
    #[error("library misuse: {0}")]
    LibraryMisuse(String),
    /// The backing stream failed. Short reads surface as
    /// [`io::ErrorKind::UnexpectedEof`].
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn misuse(message: impl Into<String>) -> Self {
        Self::LibraryMisuse(message.into())
    }

    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn unsupported(type_name: impl Into<String>, facet: &'static str) -> Self {
        Self::ValueUnsupported {
            type_name: type_name.into(),
            facet,
        }
    }

    /// Returns `true` for [`Error::KeyNotFound`].
    #[must_use]
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }
}
