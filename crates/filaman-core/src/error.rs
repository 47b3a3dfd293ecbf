//! Error types shared by the register protocol layers

use std::string::FromUtf8Error;
use thiserror::Error;

use crate::value::ValueType;

/// Failure reported by a bus implementation for a single transaction
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Bus I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No acknowledgment from device 0x{device:02x}")]
    NoAcknowledge { device: u8 },
}

#[derive(Error, Debug)]
pub enum FilamanError {
    #[error("Device 0x{device:02x} unavailable: {source}")]
    DeviceUnavailable {
        device: u8,
        #[source]
        source: TransportError,
    },
    #[error("Unknown register: {0}")]
    UnknownRegister(String),
    #[error("Register {register} has type {value_type:?}, which the generic path cannot transfer")]
    UnsupportedFieldType {
        register: &'static str,
        value_type: ValueType,
    },
    #[error("Register {register} returned invalid UTF-8: {source}")]
    EncodingError {
        register: &'static str,
        #[source]
        source: FromUtf8Error,
    },
    #[error("Register {register} (0x{address:02x}) is not covered by the optional bitmap")]
    RegisterNotOptional { register: &'static str, address: u8 },
    #[error("Value for {register} cannot be represented as {expected:?}")]
    TypeMismatch {
        register: String,
        expected: ValueType,
    },
    #[error("Register {register}: expected {expected} bytes, got {actual}")]
    MalformedResponse {
        register: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid register catalog: {0}")]
    InvalidCatalog(String),
}

impl FilamanError {
    /// True when the failure came from the bus rather than from catalog or value misuse
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, FilamanError::DeviceUnavailable { .. })
    }
}

pub type Result<T, E = FilamanError> = std::result::Result<T, E>;
