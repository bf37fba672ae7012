// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounded byte windows over seekable streams.

use core::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};

/// The stream interface codecs read from and write to.
///
/// Positions are byte offsets relative to the start of the stream's window.
/// Reads and writes never leave the window: [`read`](Self::read) and
/// [`write`](Self::write) clip, [`read_exact`](Self::read_exact) fails with
/// [`io::ErrorKind::UnexpectedEof`] without consuming anything.
pub trait BitStream {
    /// Reads up to `max` bytes.
    fn read(&mut self, max: usize) -> Result<Vec<u8>>;

    /// Reads everything up to the end of the window.
    fn read_all(&mut self) -> Result<Vec<u8>>;

    /// Writes as much of `data` as fits and returns the number of bytes
    /// written.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Moves the cursor, clamped to the window, and returns the new position.
    fn seek(&mut self, position: u64) -> u64;

    /// Returns the cursor position.
    fn tell(&self) -> u64;

    /// Returns the window length in bytes.
    fn len(&self) -> u64;

    /// Returns `true` if the window is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the window length in bits.
    fn len_bits(&self) -> u64 {
        self.len() * 8
    }

    /// Returns the number of bytes between the cursor and the window end.
    fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.tell())
    }

    /// Reads exactly `len` bytes.
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let remaining = self.remaining();
        if u64::try_from(len).map_or(true, |len| len > remaining) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("wanted {len} bytes, {remaining} left"),
            )
            .into());
        }
        self.read(len)
    }
}

/// A window `[base, base + size)` over a `Read + Write + Seek` stream.
///
/// A window built with [`new`](Self::new) spans from `base` 0 to the end the
/// stream had when the buffer was created.
///
/// # Example
///
/// ```rust
/// use std::io::Cursor;
/// use imperial_core::codec::{BitStream, BytesBuffer};
///
/// let raw = Cursor::new(vec![1, 2, 3, 4, 5, 6, 7, 8]);
/// let mut window = BytesBuffer::window(raw, 1, 4).unwrap();
/// assert_eq!(window.read_all().unwrap(), [2, 3, 4, 5]);
///
/// window.seek(2);
/// assert_eq!(window.write(&[0xaa, 0xbb, 0xcc]).unwrap(), 2);
/// assert_eq!(window.into_inner().into_inner(), [1, 2, 3, 0xaa, 0xbb, 6, 7, 8]);
/// ```
pub struct BytesBuffer<S> {
    raw: S,
    base: u64,
    end: u64,
    cursor: u64,
}

impl<S: Read + Write + Seek> BytesBuffer<S> {
    /// Spans the whole stream as it is now.
    pub fn new(mut raw: S) -> Result<Self> {
        let end = raw.seek(SeekFrom::End(0))?;
        Ok(Self {
            raw,
            base: 0,
            end,
            cursor: 0,
        })
    }

    /// Spans `size` bytes starting at `base`.
    ///
    /// A window reaching past the largest stream offset is
    /// [`Error::SerializationUnsupported`].
    pub fn window(raw: S, base: u64, size: u64) -> Result<Self> {
        let end = window_end(base, size)?;
        Ok(Self {
            raw,
            base,
            end,
            cursor: 0,
        })
    }

    /// Spans `bits` bits starting at byte `base`.
    ///
    /// Only whole bytes are supported.
    pub fn window_bits(raw: S, base: u64, bits: u64) -> Result<Self> {
        if bits % 8 != 0 {
            return Err(Error::SerializationUnsupported(format!(
                "{bits} bits is not a whole number of bytes"
            )));
        }
        Self::window(raw, base, bits / 8)
    }

    /// Returns the window start in the backing stream.
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Returns the backing stream.
    #[must_use]
    pub fn get_ref(&self) -> &S {
        &self.raw
    }

    /// Unwraps the backing stream.
    pub fn into_inner(self) -> S {
        self.raw
    }

    fn span(&self, want: usize) -> usize {
        let left = self.end.saturating_sub(self.base + self.cursor);
        usize::try_from(left).map_or(want, |left| left.min(want))
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n as u64;
    }
}

impl BytesBuffer<Cursor<Vec<u8>>> {
    /// Spans an in-memory copy of `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let end = bytes.len() as u64;
        Self {
            raw: Cursor::new(bytes),
            base: 0,
            end,
            cursor: 0,
        }
    }

    /// Spans `size` bytes of `bytes` starting at `base`, zero-padding
    /// `bytes` if it is too short.
    pub fn from_bytes_window(bytes: impl Into<Vec<u8>>, base: u64, size: u64) -> Result<Self> {
        let mut bytes = bytes.into();
        let needed = usize::try_from(window_end(base, size)?).map_err(|_| {
            Error::SerializationUnsupported(format!("{size}-byte window does not fit in memory"))
        })?;
        if bytes.len() < needed {
            bytes.resize(needed, 0);
        }
        Self::window(Cursor::new(bytes), base, size)
    }

    /// A zero-filled buffer of `size` bytes.
    #[must_use]
    pub fn zeroed(size: usize) -> Self {
        Self::from_bytes(vec![0; size])
    }

    /// Unwraps the backing bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.raw.into_inner()
    }
}

impl<S: Read + Write + Seek> BitStream for BytesBuffer<S> {
    fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let n = self.span(max);
        self.raw.seek(SeekFrom::Start(self.base + self.cursor))?;
        let mut data = vec![0; n];
        self.raw.read_exact(&mut data)?;
        self.advance(n);
        Ok(data)
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        self.read(usize::MAX)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let n = self.span(data.len());
        self.raw.seek(SeekFrom::Start(self.base + self.cursor))?;
        self.raw.write_all(&data[..n])?;
        self.advance(n);
        Ok(n)
    }

    fn seek(&mut self, position: u64) -> u64 {
        self.cursor = position.min(self.len());
        self.cursor
    }

    fn tell(&self) -> u64 {
        self.cursor
    }

    fn len(&self) -> u64 {
        self.end.saturating_sub(self.base)
    }
}

impl<S> fmt::Debug for BytesBuffer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytesBuffer")
            .field("base", &self.base)
            .field("end", &self.end)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

fn window_end(base: u64, size: u64) -> Result<u64> {
    base.checked_add(size).ok_or_else(|| {
        Error::SerializationUnsupported(format!("{size}-byte window at offset {base} overflows"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eight() -> Cursor<Vec<u8>> {
        Cursor::new(vec![1, 2, 3, 4, 5, 6, 7, 8])
    }

    #[test]
    fn window_exposes_only_its_bytes() {
        let mut window = BytesBuffer::window(eight(), 1, 4).unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window.len_bits(), 32);
        assert_eq!(window.read(2).unwrap(), [2, 3]);
        assert_eq!(window.read(10).unwrap(), [4, 5]);
        assert!(window.read(1).unwrap().is_empty());
    }

    #[test]
    fn writes_clip_at_the_window_end() {
        let mut window = BytesBuffer::window(eight(), 1, 4).unwrap();
        assert_eq!(window.write(&[10, 0, 0, 0, 0xff]).unwrap(), 4);
        assert_eq!(window.remaining(), 0);
        assert_eq!(window.into_inner().into_inner(), [1, 10, 0, 0, 0, 6, 7, 8]);
    }

    #[test]
    fn seek_clamps_to_the_window() {
        let mut window = BytesBuffer::window(eight(), 2, 3).unwrap();
        assert_eq!(window.seek(10), 3);
        assert_eq!(window.seek(1), 1);
        assert_eq!(window.read_all().unwrap(), [4, 5]);
    }

    #[test]
    fn short_exact_reads_fail_without_consuming() {
        let mut buffer = BytesBuffer::from_bytes([1_u8, 2, 3]);
        let err = buffer.read_exact(4).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert_eq!(buffer.tell(), 0);
        assert_eq!(buffer.read_exact(3).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn byte_windows_are_zero_padded() {
        let mut window = BytesBuffer::from_bytes_window([9_u8], 0, 4).unwrap();
        assert_eq!(window.read_all().unwrap(), [9, 0, 0, 0]);
    }

    #[test]
    fn unbounded_buffers_span_the_stream() {
        let mut buffer = BytesBuffer::new(eight()).unwrap();
        assert_eq!(buffer.len(), 8);
        buffer.seek(6);
        assert_eq!(buffer.read_all().unwrap(), [7, 8]);
    }

    #[test]
    fn windows_past_the_last_offset_are_rejected() {
        assert!(matches!(
            BytesBuffer::window(eight(), u64::MAX, 1),
            Err(Error::SerializationUnsupported(_))
        ));
        assert!(matches!(
            BytesBuffer::from_bytes_window([0_u8], 2, u64::MAX),
            Err(Error::SerializationUnsupported(_))
        ));
        assert_eq!(BytesBuffer::window(eight(), u64::MAX, 0).unwrap().len(), 0);
    }

    #[test]
    fn partial_byte_windows_are_rejected() {
        assert!(matches!(
            BytesBuffer::window_bits(eight(), 0, 12),
            Err(Error::SerializationUnsupported(_))
        ));
        assert_eq!(BytesBuffer::window_bits(eight(), 0, 16).unwrap().len(), 2);
    }
}
