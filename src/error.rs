//! Defines the error type shared by all codec operations.

use thiserror::Error;

/// An error raised by a buffer, journal, part, field, message or cursor
/// operation.
///
/// Errors are local to the failing call unless they invalidate the handle:
/// once a part loses its place in the buffer it stays in [`Error::Offset`]
/// and every later operation on it short-circuits to that error.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// The allocator returned no memory, or a zero-copy buffer was asked to
    /// change size.
    #[error("Allocation failed")]
    Alloc,
    /// The handle was never valid, or preconditions were violated.
    #[error("Invalid arguments or data")]
    Invalid,
    /// The operation is incompatible with the field's descriptor.
    #[error("Invalid descriptor")]
    Descriptor,
    /// The wire bytes declare a wire type incompatible with the descriptor.
    #[error("Invalid wiretype")]
    Wiretype,
    /// A varint is malformed, truncated or wider than ten bytes.
    #[error("Invalid varint")]
    Varint,
    /// The part's ancestor was erased, or offsets drifted past the buffer.
    #[error("Invalid offset")]
    Offset,
    /// No value is present and no default is available.
    #[error("Absent field or value")]
    Absent,
}
