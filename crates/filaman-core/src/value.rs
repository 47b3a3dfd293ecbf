//! Register value types and their fixed-width bus encoding
//!
//! Numeric layout is a firmware compatibility contract: `Int32` is 4-byte
//! little-endian two's-complement, `Float32` is 4-byte little-endian IEEE-754
//! single precision, `Bool` and `Byte` are one raw byte. Strings are
//! length-prefixed and go through the transport's dedicated string path.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FilamanError, Result};
use crate::register::Register;

/// Wire type of a register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Bool,
    Int32,
    Float32,
    Byte,
    Utf8String,
}

impl ValueType {
    /// Number of bytes one transaction of this type carries, `None` for strings
    pub fn width(self) -> Option<usize> {
        match self {
            ValueType::Bool | ValueType::Byte => Some(1),
            ValueType::Int32 | ValueType::Float32 => Some(4),
            ValueType::Utf8String => None,
        }
    }
}

/// A scalar register value
///
/// Serialized as a bare JSON scalar so records read back exactly like the
/// mappings callers write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Float32(f32),
    Byte(u8),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int32(_) => ValueType::Int32,
            Value::Float32(_) => ValueType::Float32,
            Value::Byte(_) => ValueType::Byte,
        }
    }

    /// Convert to `target` when the conversion is lossless
    ///
    /// Callers hand in loosely typed scalars (JSON numbers have no width), so an
    /// integer destined for a float register, or a 0/1 destined for a bool, is
    /// accepted. Anything that would lose information is a `TypeMismatch`.
    pub fn coerce(self, target: ValueType, register: &str) -> Result<Value> {
        let mismatch = || FilamanError::TypeMismatch {
            register: register.to_string(),
            expected: target,
        };

        let coerced = match (self, target) {
            (v, t) if v.value_type() == t => v,
            (Value::Int32(i), ValueType::Float32) => Value::Float32(i as f32),
            (Value::Int32(i), ValueType::Byte) => {
                Value::Byte(u8::try_from(i).map_err(|_| mismatch())?)
            }
            (Value::Int32(0), ValueType::Bool) => Value::Bool(false),
            (Value::Int32(1), ValueType::Bool) => Value::Bool(true),
            (Value::Byte(b), ValueType::Int32) => Value::Int32(i32::from(b)),
            (Value::Byte(b), ValueType::Float32) => Value::Float32(f32::from(b)),
            (Value::Bool(b), ValueType::Int32) => Value::Int32(i32::from(b)),
            (Value::Bool(b), ValueType::Byte) => Value::Byte(u8::from(b)),
            (Value::Float32(f), ValueType::Int32)
                if f.fract() == 0.0 && (-2_147_483_648.0..2_147_483_648.0).contains(&f) =>
            {
                Value::Int32(f as i32)
            }
            _ => return Err(mismatch()),
        };
        Ok(coerced)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::Int32(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        match *self {
            Value::Byte(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Byte(b) => write!(f, "0x{:02x}", b),
        }
    }
}

/// Encoder/decoder for the fixed-width register types
pub struct ValueCodec;

impl ValueCodec {
    /// Encode `value` for `register`
    ///
    /// The value must already have the register's type; see [`Value::coerce`].
    pub fn encode(register: &Register, value: &Value) -> Result<Vec<u8>> {
        let bytes = match (register.value_type, value) {
            (ValueType::Bool, Value::Bool(b)) => vec![u8::from(*b)],
            (ValueType::Byte, Value::Byte(b)) => vec![*b],
            (ValueType::Int32, Value::Int32(i)) => i.to_le_bytes().to_vec(),
            (ValueType::Float32, Value::Float32(f)) => f.to_le_bytes().to_vec(),
            (ValueType::Utf8String, _) => {
                return Err(FilamanError::UnsupportedFieldType {
                    register: register.name,
                    value_type: register.value_type,
                })
            }
            (expected, _) => {
                return Err(FilamanError::TypeMismatch {
                    register: register.name.to_string(),
                    expected,
                })
            }
        };
        Ok(bytes)
    }

    /// Decode the bytes of one `register` transaction
    pub fn decode(register: &Register, bytes: &[u8]) -> Result<Value> {
        let width = register
            .value_type
            .width()
            .ok_or(FilamanError::UnsupportedFieldType {
                register: register.name,
                value_type: register.value_type,
            })?;

        if bytes.len() != width {
            return Err(FilamanError::MalformedResponse {
                register: register.name,
                expected: width,
                actual: bytes.len(),
            });
        }

        let value = match register.value_type {
            ValueType::Bool => Value::Bool(bytes[0] != 0),
            ValueType::Byte => Value::Byte(bytes[0]),
            ValueType::Int32 => Value::Int32(i32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])),
            ValueType::Float32 => Value::Float32(f32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])),
            ValueType::Utf8String => unreachable!("strings have no fixed width"),
        };
        Ok(value)
    }
}
