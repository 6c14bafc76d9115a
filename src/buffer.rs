//! The owning byte buffer underneath a journal.
//!
//! A buffer either owns its bytes and may grow and shrink freely, or wraps
//! a caller-provided slice in zero-copy mode, in which case any operation
//! that would change its length fails with [`Error::Alloc`].

use std::fmt;

use crate::error::Error;

enum Storage<'a> {
    Owned(Vec<u8>),
    ZeroCopy(&'a mut [u8]),
}

/// A flat byte buffer with range write and clear operations.
pub struct Buffer<'a> {
    storage: Storage<'a>,
}

impl<'a> Buffer<'a> {
    /// Creates an empty growable buffer.
    pub fn new() -> Self {
        Buffer {
            storage: Storage::Owned(Vec::new()),
        }
    }

    /// Creates a growable buffer holding a copy of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Buffer {
            storage: Storage::Owned(data.to_vec()),
        }
    }

    /// Wraps `data` without copying. The buffer cannot change size.
    pub fn zero_copy(data: &'a mut [u8]) -> Self {
        Buffer {
            storage: Storage::ZeroCopy(data),
        }
    }

    /// Whether the buffer is in zero-copy mode.
    pub fn is_zero_copy(&self) -> bool {
        matches!(self.storage, Storage::ZeroCopy(_))
    }

    /// The raw bytes.
    pub fn data(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(bytes) => bytes,
            Storage::ZeroCopy(bytes) => bytes,
        }
    }

    /// Number of bytes in the buffer.
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// Replaces `[start, end)` with `data`, which may differ in length.
    ///
    /// Fails with [`Error::Offset`] when the range lies outside the buffer
    /// and with [`Error::Alloc`] when a zero-copy buffer would have to
    /// change size.
    pub fn write(&mut self, start: usize, end: usize, data: &[u8]) -> Result<(), Error> {
        if start > end || end > self.len() {
            return Err(Error::Offset);
        }
        match &mut self.storage {
            Storage::Owned(bytes) => {
                if data.len() == end - start {
                    bytes[start..end].copy_from_slice(data);
                } else {
                    bytes.splice(start..end, data.iter().copied());
                }
                Ok(())
            }
            Storage::ZeroCopy(bytes) => {
                if data.len() != end - start {
                    return Err(Error::Alloc);
                }
                bytes[start..end].copy_from_slice(data);
                Ok(())
            }
        }
    }

    /// Removes `[start, end)`, shifting the tail left.
    pub fn clear(&mut self, start: usize, end: usize) -> Result<(), Error> {
        self.write(start, end, &[])
    }

    /// Renders the buffer as hex and printable ASCII, sixteen bytes per
    /// line, for diagnostics only.
    pub fn dump(&self) -> String {
        let data = self.data();
        let mut out = String::new();
        for (line, chunk) in data.chunks(16).enumerate() {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            let ascii: String = chunk
                .iter()
                .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { '.' })
                .collect();
            out.push_str(&format!("{:08x}  {:<47}  |{}|\n", line * 16, hex.join(" "), ascii));
        }
        out
    }
}

impl Default for Buffer<'_> {
    fn default() -> Self {
        Buffer::new()
    }
}

impl fmt::Debug for Buffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("zero_copy", &self.is_zero_copy())
            .finish()
    }
}
