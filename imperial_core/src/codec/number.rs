// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-width integer encoding.

use core::fmt;

use crate::error::{Error, Result};

/// Byte order of a multi-byte integer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

impl Endian {
    /// Parses `"little"` or `"big"`.
    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "little" => Ok(Self::Little),
            "big" => Ok(Self::Big),
            other => Err(Error::mismatch("\"little\" or \"big\"", format!("{other:?}"))),
        }
    }

    /// Returns the keyword this byte order parses from.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Little => "little",
            Self::Big => "big",
        }
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encodes `value` into exactly `width` bytes.
///
/// Negative values in an unsigned field and values outside the range of
/// `width` bytes are [`Error::SerializationUnsupported`]. Widths beyond 16
/// bytes are padded with the sign.
pub fn encode_int(value: i128, width: usize, endian: Endian, signed: bool) -> Result<Vec<u8>> {
    if !signed && value < 0 {
        return Err(Error::SerializationUnsupported(format!(
            "{value} is negative but the field is unsigned"
        )));
    }
    if !fits(value, width, signed) {
        return Err(Error::SerializationUnsupported(format!(
            "{value} does not fit in {width} {} byte(s)",
            if signed { "signed" } else { "unsigned" }
        )));
    }
    let fill = if value < 0 { 0xff } else { 0 };
    let mut bytes: Vec<u8> = value
        .to_le_bytes()
        .into_iter()
        .chain(core::iter::repeat(fill))
        .take(width)
        .collect();
    if endian == Endian::Big {
        bytes.reverse();
    }
    Ok(bytes)
}

fn fits(value: i128, width: usize, signed: bool) -> bool {
    let bits = width.saturating_mul(8);
    match (signed, bits) {
        (_, 0) => value == 0,
        (true, 1..128) => {
            let bound = 1_i128 << (bits - 1);
            (-bound..bound).contains(&value)
        }
        (false, 1..127) => value < 1_i128 << bits,
        _ => true,
    }
}

/// Decodes a fixed-width integer.
///
/// Signed values are sign-extended from the top bit of the field. Fields
/// whose value does not fit an `i128` are
/// [`Error::SerializationUnsupported`].
pub fn decode_int(bytes: &[u8], endian: Endian, signed: bool) -> Result<i128> {
    let mut le = bytes.to_vec();
    if endian == Endian::Big {
        le.reverse();
    }
    let negative = signed && le.last().is_some_and(|b| b & 0x80 != 0);
    let fill = if negative { 0xff } else { 0 };
    if le.len() > 16 {
        // The bytes past 128 bits must be pure sign extension of bit 127.
        let truncated_negative = le[15] & 0x80 != 0;
        if le[16..].iter().any(|b| *b != fill) || (signed && truncated_negative != negative) {
            return Err(unrepresentable(bytes.len()));
        }
        le.truncate(16);
    }
    let mut raw = [fill; 16];
    raw[..le.len()].copy_from_slice(&le);
    let value = i128::from_le_bytes(raw);
    // A full-width unsigned field with the top bit set exceeds i128.
    if !signed && value < 0 {
        return Err(unrepresentable(bytes.len()));
    }
    Ok(value)
}

fn unrepresentable(width: usize) -> Error {
    Error::SerializationUnsupported(format!("{width}-byte integer exceeds 128 bits"))
}
