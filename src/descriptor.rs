//! Static descriptors for messages, fields and enums.
//!
//! Descriptors are immutable schema data, normally emitted by a code
//! generator and registered as `&'static` tables. The codec only consumes
//! them; parsing `.proto` sources is somebody else's job.

use bitflags::bitflags;

use crate::value::Value;
use crate::wire::WireType;

bitflags! {
    /// Modifier flags on a field descriptor.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct FieldFlags: u32 {
        /// Repeated scalar elements are packed into one length-delimited
        /// payload.
        const PACKED = 1;
        /// The field is deprecated in the schema.
        const DEPRECATED = 2;
    }
}

/// Occurrence label of a field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Label {
    /// Exactly one occurrence must be present.
    Required,
    /// At most one occurrence may be present.
    Optional,
    /// Any number of occurrences may be present.
    Repeated,
    /// Member of the oneof group with the given index; at most one member
    /// of a group may be present.
    Oneof(usize),
}

/// Declared type of a field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Varint-encoded signed 32-bit integer.
    Int32,
    /// Varint-encoded signed 64-bit integer.
    Int64,
    /// Varint-encoded unsigned 32-bit integer.
    UInt32,
    /// Varint-encoded unsigned 64-bit integer.
    UInt64,
    /// Zig-zag varint-encoded signed 32-bit integer.
    SInt32,
    /// Zig-zag varint-encoded signed 64-bit integer.
    SInt64,
    /// Fixed 32-bit unsigned integer.
    Fixed32,
    /// Fixed 64-bit unsigned integer.
    Fixed64,
    /// Fixed 32-bit signed integer.
    SFixed32,
    /// Fixed 64-bit signed integer.
    SFixed64,
    /// 32-bit IEEE floating point number.
    Float,
    /// 64-bit IEEE floating point number.
    Double,
    /// Varint-encoded boolean.
    Bool,
    /// Varint-encoded enum number.
    Enum,
    /// Length-delimited UTF-8 string.
    String,
    /// Length-delimited raw bytes.
    Bytes,
    /// Length-delimited nested message.
    Message,
}

impl FieldType {
    /// Maps the declared type onto its wire type.
    pub fn wire_type(self) -> WireType {
        use FieldType::*;
        match self {
            Int32 | Int64 | UInt32 | UInt64 | SInt32 | SInt64 | Bool | Enum => WireType::Varint,
            Fixed64 | SFixed64 | Double => WireType::SixtyFourBit,
            Fixed32 | SFixed32 | Float => WireType::ThirtyTwoBit,
            String | Bytes | Message => WireType::LengthDelimited,
        }
    }

    /// Size of the native representation in bytes; zero for types that are
    /// not stored inline (strings, bytes and submessages).
    pub fn native_size(self) -> usize {
        use FieldType::*;
        match self {
            Bool => 1,
            Int32 | UInt32 | SInt32 | Fixed32 | SFixed32 | Float | Enum => 4,
            Int64 | UInt64 | SInt64 | Fixed64 | SFixed64 | Double => 8,
            String | Bytes | Message => 0,
        }
    }

    /// Whether values of this type may appear as packed repeated elements.
    pub fn packable(self) -> bool {
        self.native_size() != 0
    }
}

/// Reference from a field descriptor to the descriptor of its value type.
#[derive(Debug, Copy, Clone)]
pub enum Refer {
    /// Scalar, string or bytes field; nothing to refer to.
    None,
    /// Nested message type.
    Message(&'static MessageDescriptor),
    /// Enum type.
    Enum(&'static EnumDescriptor),
}

/// Descriptor of a single field.
#[derive(Debug, Copy, Clone)]
pub struct FieldDescriptor {
    /// Field tag, unique within the message.
    pub tag: u32,
    /// Field name as declared in the schema.
    pub name: &'static str,
    /// Declared type.
    pub typ: FieldType,
    /// Occurrence label.
    pub label: Label,
    /// Descriptor of the nested message or enum type, if any.
    pub refer: Refer,
    /// Declared default value, if any.
    pub default: Option<Value<'static>>,
    /// Modifier flags.
    pub flags: FieldFlags,
}

impl FieldDescriptor {
    /// The wire type values of this field carry.
    pub fn wire_type(&self) -> WireType {
        self.typ.wire_type()
    }

    /// Whether occurrences of this field are packed into one payload.
    pub fn packed(&self) -> bool {
        self.flags.contains(FieldFlags::PACKED) && self.typ.packable()
    }

    /// Whether this field may occur more than once.
    pub fn repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    /// The nested message descriptor, for message-typed fields.
    pub fn message(&self) -> Option<&'static MessageDescriptor> {
        match self.refer {
            Refer::Message(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// The enum descriptor, for enum-typed fields.
    pub fn enumeration(&self) -> Option<&'static EnumDescriptor> {
        match self.refer {
            Refer::Enum(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}

/// Descriptor of a message type.
///
/// `fields` must be sorted by ascending tag; the lookup shortcut depends
/// on it.
#[derive(Debug, Copy, Clone)]
pub struct MessageDescriptor {
    /// Fully qualified message name.
    pub name: &'static str,
    /// Field descriptors in ascending tag order.
    pub fields: &'static [FieldDescriptor],
    /// Optional extension descriptor whose fields join all lookups.
    pub extension: Option<&'static MessageDescriptor>,
}

impl MessageDescriptor {
    /// Looks up a field descriptor by tag.
    ///
    /// Since generated field tables are in ascending tag order, the scan
    /// starts at `min(tag - 1, len - 1)` and walks left, so messages with
    /// dense tag numbering resolve in one probe.
    pub fn field_by_tag(&self, tag: u32) -> Option<&'static FieldDescriptor> {
        if tag != 0 && !self.fields.is_empty() {
            let mut index = (tag as usize - 1).min(self.fields.len() - 1);
            loop {
                let field = &self.fields[index];
                if field.tag == tag {
                    return Some(field);
                }
                if field.tag < tag || index == 0 {
                    break;
                }
                index -= 1;
            }
        }
        self.extension.and_then(|e| e.field_by_tag(tag))
    }

    /// Looks up a field descriptor by name, linearly.
    pub fn field_by_name(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .or_else(|| self.extension.and_then(|e| e.field_by_name(name)))
    }

    /// Iterates the field descriptors, extension chain included.
    pub fn iter(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        let mut tail = self.extension;
        let mut fields = self.fields.iter();
        std::iter::from_fn(move || loop {
            match fields.next() {
                Some(field) => return Some(field),
                None => {
                    fields = tail?.fields.iter();
                    tail = tail?.extension;
                }
            }
        })
    }
}

/// A single enum value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EnumValueDescriptor {
    /// Declared number.
    pub number: i32,
    /// Declared name.
    pub name: &'static str,
}

/// Descriptor of an enum type.
#[derive(Debug, Copy, Clone)]
pub struct EnumDescriptor {
    /// Fully qualified enum name.
    pub name: &'static str,
    /// Declared values.
    pub values: &'static [EnumValueDescriptor],
}

impl EnumDescriptor {
    /// Looks up an enum value by number.
    pub fn value_by_number(&self, number: i32) -> Option<&'static EnumValueDescriptor> {
        self.values.iter().find(|value| value.number == number)
    }

    /// Looks up an enum value by name.
    pub fn value_by_name(&self, name: &str) -> Option<&'static EnumValueDescriptor> {
        self.values.iter().find(|value| value.name == name)
    }
}
