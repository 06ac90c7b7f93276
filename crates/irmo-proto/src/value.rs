use irmo_schema::ValueType;

use crate::buffer::{BufferError, PacketBuffer};
use crate::MAX_STRING_FIELD_BYTES;

/// A runtime value of one of the four scalar types (spec.md §3 "Value
/// codec"). Encoding is big-endian for integers; strings are
/// length-implicit, NUL-terminated UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    String(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::U8(_) => ValueType::U8,
            Value::U16(_) => ValueType::U16,
            Value::U32(_) => ValueType::U32,
            Value::String(_) => ValueType::String,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::U8(v) => Some(u32::from(v)),
            Value::U16(v) => Some(u32::from(v)),
            Value::U32(v) => Some(v),
            Value::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn encode(&self, buf: &mut PacketBuffer) {
        match self {
            Value::U8(v) => buf.write_u8(*v),
            Value::U16(v) => buf.write_u16(*v),
            Value::U32(v) => buf.write_u32(*v),
            Value::String(s) => buf.write_cstring(s),
        }
    }

    pub fn decode(buf: &mut PacketBuffer, value_type: ValueType) -> Result<Value, BufferError> {
        Ok(match value_type {
            ValueType::U8 => Value::U8(buf.read_u8()?),
            ValueType::U16 => Value::U16(buf.read_u16()?),
            ValueType::U32 => Value::U32(buf.read_u32()?),
            ValueType::String => Value::String(buf.read_cstring(MAX_STRING_FIELD_BYTES)?),
        })
    }

    /// Wire length in bytes, used by atoms to keep `wire_length` accurate
    /// without re-encoding (spec.md §3, atom "byte length on the wire").
    pub fn wire_length(&self) -> usize {
        match self {
            Value::U8(_) => 1,
            Value::U16(_) => 2,
            Value::U32(_) => 4,
            Value::String(s) => s.len() + 1,
        }
    }

    /// A type's zero value, used to initialise new objects' variable slots
    /// (spec.md §4.1 "Initialises u*-typed slots to 0 and string slots to
    /// `""`").
    pub fn default_for(value_type: ValueType) -> Value {
        match value_type {
            ValueType::U8 => Value::U8(0),
            ValueType::U16 => Value::U16(0),
            ValueType::U32 => Value::U32(0),
            ValueType::String => Value::String(String::new()),
        }
    }

    /// Whether an integer value fits within `value_type`'s width; used by
    /// `set_int` to reject oversized values (spec.md §4.1).
    pub fn fits(n: u32, value_type: ValueType) -> bool {
        match value_type {
            ValueType::U8 => n <= u32::from(u8::MAX),
            ValueType::U16 => n <= u32::from(u16::MAX),
            ValueType::U32 => true,
            ValueType::String => false,
        }
    }
}
