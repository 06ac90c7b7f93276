use irmo_schema::{Schema, ValueType};
use thiserror::Error;

use crate::buffer::{BufferError, PacketBuffer};
use crate::value::Value;

/// The tag that goes in a group header's top 3 bits (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomKind {
    Null = 0,
    NewObject = 1,
    Change = 2,
    Destroy = 3,
    Method = 4,
    WindowAdvertisement = 5,
}

impl AtomKind {
    pub fn from_u8(v: u8) -> Option<AtomKind> {
        match v {
            0 => Some(AtomKind::Null),
            1 => Some(AtomKind::NewObject),
            2 => Some(AtomKind::Change),
            3 => Some(AtomKind::Destroy),
            4 => Some(AtomKind::Method),
            5 => Some(AtomKind::WindowAdvertisement),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AtomError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("undefined atom kind {0}")]
    UnknownKind(u8),
    #[error("class ordinal {0} is out of range")]
    UnknownClass(u8),
    #[error("method ordinal {0} is out of range")]
    UnknownMethod(u8),
}

/// A single record describing a state change, in its in-memory (decoded)
/// form (spec.md §3 "Atom").
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Null,
    NewObject {
        id: u16,
        class_ordinal: u8,
    },
    Change {
        class_ordinal: u8,
        id: u16,
        /// `(variable_ordinal, value)` pairs, strictly ascending by
        /// ordinal, one entry per set bitmap bit (spec.md §8 property 2).
        changes: Vec<(u8, Value)>,
        /// `ceil(nvars/8)`, cached from the schema at construction so
        /// `encode`/`wire_length` don't need the schema again.
        bitmap_len: u8,
    },
    Destroy {
        id: u16,
    },
    Method {
        method_ordinal: u8,
        arguments: Vec<Value>,
    },
    WindowAdvertisement {
        max_bytes: u16,
    },
}

impl Atom {
    pub fn kind(&self) -> AtomKind {
        match self {
            Atom::Null => AtomKind::Null,
            Atom::NewObject { .. } => AtomKind::NewObject,
            Atom::Change { .. } => AtomKind::Change,
            Atom::Destroy { .. } => AtomKind::Destroy,
            Atom::Method { .. } => AtomKind::Method,
            Atom::WindowAdvertisement { .. } => AtomKind::WindowAdvertisement,
        }
    }

    /// Build a change atom for `class_ordinal`/`id` from an explicit list
    /// of `(variable_ordinal, value)` pairs. `nvars` is the class's total
    /// (inherited-inclusive) variable count, needed only to size the
    /// bitmap.
    pub fn new_change(class_ordinal: u8, id: u16, mut changes: Vec<(u8, Value)>, nvars: u8) -> Atom {
        changes.sort_by_key(|(ord, _)| *ord);
        let bitmap_len = nvars.div_ceil(8);
        Atom::Change {
            class_ordinal,
            id,
            changes,
            bitmap_len,
        }
    }

    pub fn wire_length(&self) -> usize {
        match self {
            Atom::Null => 0,
            Atom::NewObject { .. } => 3,
            Atom::Change {
                changes,
                bitmap_len,
                ..
            } => {
                1 + 2
                    + *bitmap_len as usize
                    + changes.iter().map(|(_, v)| v.wire_length()).sum::<usize>()
            }
            Atom::Destroy { .. } => 2,
            Atom::Method { arguments, .. } => {
                1 + arguments.iter().map(Value::wire_length).sum::<usize>()
            }
            Atom::WindowAdvertisement { .. } => 2,
        }
    }

    pub fn encode(&self, buf: &mut PacketBuffer) {
        match self {
            Atom::Null => {}
            Atom::NewObject { id, class_ordinal } => {
                buf.write_u16(*id);
                buf.write_u8(*class_ordinal);
            }
            Atom::Change {
                class_ordinal,
                id,
                changes,
                bitmap_len,
            } => {
                buf.write_u8(*class_ordinal);
                buf.write_u16(*id);
                let mut bitmap = vec![0u8; *bitmap_len as usize];
                for (ord, _) in changes {
                    bitmap[(*ord / 8) as usize] |= 1 << (*ord % 8);
                }
                buf.write_bytes(&bitmap);
                for (_, value) in changes {
                    value.encode(buf);
                }
            }
            Atom::Destroy { id } => buf.write_u16(*id),
            Atom::Method {
                method_ordinal,
                arguments,
            } => {
                buf.write_u8(*method_ordinal);
                for arg in arguments {
                    arg.encode(buf);
                }
            }
            Atom::WindowAdvertisement { max_bytes } => buf.write_u16(*max_bytes),
        }
    }

    pub fn decode(buf: &mut PacketBuffer, kind: AtomKind, schema: &Schema) -> Result<Atom, AtomError> {
        Ok(match kind {
            AtomKind::Null => Atom::Null,
            AtomKind::NewObject => {
                let id = buf.read_u16()?;
                let class_ordinal = buf.read_u8()?;
                Atom::NewObject { id, class_ordinal }
            }
            AtomKind::Change => {
                let class_ordinal = buf.read_u8()?;
                let id = buf.read_u16()?;
                let class = schema
                    .class(class_ordinal)
                    .ok_or(AtomError::UnknownClass(class_ordinal))?;
                let nvars = class.variables().len() as u8;
                let bitmap_len = nvars.div_ceil(8);
                let bitmap = buf.read_exact(bitmap_len as usize)?;
                let mut changes = Vec::new();
                for ord in 0..nvars {
                    if bitmap[(ord / 8) as usize] & (1 << (ord % 8)) != 0 {
                        let value_type = class.variable(ord).unwrap().value_type;
                        let value = Value::decode(buf, value_type)?;
                        changes.push((ord, value));
                    }
                }
                Atom::Change {
                    class_ordinal,
                    id,
                    changes,
                    bitmap_len,
                }
            }
            AtomKind::Destroy => Atom::Destroy { id: buf.read_u16()? },
            AtomKind::Method => {
                let method_ordinal = buf.read_u8()?;
                let method = schema
                    .method(method_ordinal)
                    .ok_or(AtomError::UnknownMethod(method_ordinal))?;
                let mut arguments = Vec::with_capacity(method.arguments().len());
                for arg in method.arguments() {
                    arguments.push(Value::decode(buf, arg.value_type)?);
                }
                Atom::Method {
                    method_ordinal,
                    arguments,
                }
            }
            AtomKind::WindowAdvertisement => Atom::WindowAdvertisement {
                max_bytes: buf.read_u16()?,
            },
        })
    }

    /// Read-only verification pass (spec.md §4.5 step 2): confirms the
    /// atom parses against `schema` without mutating anything but the
    /// cursor, so the caller can rewind and parse for real afterwards.
    /// Returns `false` (never an error) on any malformed input, matching
    /// the "reject (drop) on any failure" / sentinel-return error policy
    /// in spec.md §7.
    pub fn verify(buf: &mut PacketBuffer, kind: AtomKind, schema: &Schema) -> bool {
        match kind {
            AtomKind::Null => true,
            AtomKind::NewObject => {
                if buf.read_u16().is_err() {
                    return false;
                }
                match buf.read_u8() {
                    Ok(class_ordinal) => schema.class(class_ordinal).is_some(),
                    Err(_) => false,
                }
            }
            AtomKind::Change => {
                let Ok(class_ordinal) = buf.read_u8() else {
                    return false;
                };
                let Some(class) = schema.class(class_ordinal) else {
                    return false;
                };
                if buf.read_u16().is_err() {
                    return false;
                }
                let nvars = class.variables().len() as u8;
                let bitmap_len = nvars.div_ceil(8) as usize;
                let Ok(bitmap) = buf.read_exact(bitmap_len) else {
                    return false;
                };
                for ord in 0..nvars {
                    if bitmap[(ord / 8) as usize] & (1 << (ord % 8)) == 0 {
                        continue;
                    }
                    let value_type = class.variable(ord).unwrap().value_type;
                    if !verify_value(buf, value_type) {
                        return false;
                    }
                }
                true
            }
            AtomKind::Destroy => buf.read_u16().is_ok(),
            AtomKind::Method => {
                let Ok(method_ordinal) = buf.read_u8() else {
                    return false;
                };
                let Some(method) = schema.method(method_ordinal) else {
                    return false;
                };
                for arg in method.arguments() {
                    if !verify_value(buf, arg.value_type) {
                        return false;
                    }
                }
                true
            }
            AtomKind::WindowAdvertisement => buf.read_u16().is_ok(),
        }
    }
}

fn verify_value(buf: &mut PacketBuffer, value_type: ValueType) -> bool {
    Value::decode(buf, value_type).is_ok()
}
