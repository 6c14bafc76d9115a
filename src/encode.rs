//! The append-only streaming encoder.
//!
//! An encoder writes tag-framed values straight into a growing buffer in
//! call order. It shares the wire primitives with the journal but never
//! touches one; the finished bytes can seed a journal for later in-place
//! access.

use crate::descriptor::{FieldType, MessageDescriptor};
use crate::error::Error;
use crate::value::Value;
use crate::wire::{self, WireType};

/// A streaming encoder for one message type.
#[derive(Debug)]
pub struct Encoder {
    descriptor: &'static MessageDescriptor,
    buf: Vec<u8>,
}

impl Encoder {
    /// Creates an empty encoder.
    pub fn new(descriptor: &'static MessageDescriptor) -> Self {
        Encoder {
            descriptor,
            buf: Vec::new(),
        }
    }

    /// The message descriptor being encoded.
    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    /// Appends one field occurrence.
    ///
    /// Message-typed fields are written with [`Encoder::message`]; packed
    /// repeated fields with [`Encoder::put_packed`].
    pub fn put(&mut self, tag: u32, value: &Value<'_>) -> Result<(), Error> {
        let descriptor = self.descriptor.field_by_tag(tag).ok_or(Error::Descriptor)?;
        if descriptor.typ == FieldType::Message || descriptor.packed() {
            return Err(Error::Descriptor);
        }
        if !value.fits(descriptor.typ) {
            return Err(Error::Descriptor);
        }
        wire::write_varint32(&mut self.buf, wire::make_key(tag, descriptor.wire_type()));
        match descriptor.wire_type() {
            WireType::LengthDelimited => {
                let mut payload = Vec::new();
                value.encode(&mut payload);
                wire::write_varint64(&mut self.buf, payload.len() as u64);
                self.buf.extend_from_slice(&payload);
            }
            _ => value.encode(&mut self.buf),
        }
        Ok(())
    }

    /// Appends a packed repeated field holding all given elements in one
    /// length-delimited payload.
    pub fn put_packed(&mut self, tag: u32, values: &[Value<'_>]) -> Result<(), Error> {
        let descriptor = self.descriptor.field_by_tag(tag).ok_or(Error::Descriptor)?;
        if !descriptor.packed() {
            return Err(Error::Descriptor);
        }
        let mut payload = Vec::new();
        for value in values {
            if !value.fits(descriptor.typ) {
                return Err(Error::Descriptor);
            }
            value.encode(&mut payload);
        }
        wire::write_varint32(&mut self.buf, wire::make_key(tag, WireType::LengthDelimited));
        wire::write_varint64(&mut self.buf, payload.len() as u64);
        self.buf.extend_from_slice(&payload);
        Ok(())
    }

    /// Appends a nested message field, encoded by the closure into its own
    /// sub-encoder and framed with the final payload length.
    pub fn message<F>(&mut self, tag: u32, encode: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Encoder) -> Result<(), Error>,
    {
        let descriptor = self.descriptor.field_by_tag(tag).ok_or(Error::Descriptor)?;
        let nested = descriptor.message().ok_or(Error::Descriptor)?;

        let mut sub = Encoder::new(nested);
        encode(&mut sub)?;
        wire::write_varint32(&mut self.buf, wire::make_key(tag, WireType::LengthDelimited));
        wire::write_varint64(&mut self.buf, sub.buf.len() as u64);
        self.buf.extend_from_slice(&sub.buf);
        Ok(())
    }

    /// The encoded bytes so far.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Number of encoded bytes so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been encoded yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the encoder, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
