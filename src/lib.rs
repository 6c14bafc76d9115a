//! A low-footprint Protocol Buffers codec built around a journaled byte
//! buffer, supporting streaming decoding, append-only encoding and
//! in-place random access to individual fields without materializing an
//! object tree.
//!
//! The random-access subsystem is the interesting part: a [`Journal`]
//! owns the wire-encoded bytes plus a replayable log of length-changing
//! mutations; [`Message`], [`Field`] and [`Cursor`] handles carry
//! versioned windows into it and re-project their offsets after mutations
//! made through other handles. Writes keep every enclosing length prefix
//! consistent by cascading rewrites up the nesting tree.
//!
//! Schemas are consumed as static [`descriptor`] tables; parsing `.proto`
//! sources and generating those tables is out of scope.

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

pub mod buffer;
pub mod cursor;
pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod field;
pub mod journal;
pub mod message;
pub mod part;
pub mod value;
pub mod wire;

pub use buffer::Buffer;
pub use cursor::Cursor;
pub use decode::Decoder;
pub use encode::Encoder;
pub use error::Error;
pub use field::Field;
pub use journal::{Journal, JournalEntry, Version};
pub use message::Message;
pub use part::Part;
pub use value::Value;
