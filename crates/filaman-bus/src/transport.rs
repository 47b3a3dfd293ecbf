//! Single-register transactions against the filament manager

use filaman_core::{
    names, FilamanError, Operation, Register, RegisterCatalog, Result, TransportError, Value,
    ValueCodec, ValueType, MAX_STRING_LEN,
};
use tracing::{debug, info};

use crate::bus::Bus;

/// Register-level access to one device on a bus
///
/// Each method issues exactly the bus transactions it describes, once. Failures
/// are not retried.
pub struct RegisterTransport<B> {
    bus: B,
    device: u8,
    catalog: RegisterCatalog,
}

impl<B: Bus> RegisterTransport<B> {
    /// Probe `device` on `bus` and wrap it with the standard register map
    pub fn open(bus: B, device: u8) -> Result<Self> {
        Self::with_catalog(bus, device, RegisterCatalog::standard())
    }

    /// Probe `device` and use `catalog` for register lookups
    pub fn with_catalog(mut bus: B, device: u8, catalog: RegisterCatalog) -> Result<Self> {
        bus.probe(device).map_err(|source| unavailable(device, source))?;
        info!(device, "Filament manager responded to probe");
        Ok(Self {
            bus,
            device,
            catalog,
        })
    }

    pub fn catalog(&self) -> &RegisterCatalog {
        &self.catalog
    }

    /// Look up a register by name in this transport's catalog
    pub fn register(&self, name: &str) -> Result<Register> {
        self.catalog.lookup(name).copied()
    }

    /// Read a fixed-width register
    pub fn read(&mut self, register: &Register) -> Result<Value> {
        let width = register
            .value_type
            .width()
            .ok_or(FilamanError::UnsupportedFieldType {
                register: register.name,
                value_type: register.value_type,
            })?;

        let bytes = self
            .bus
            .read_bytes(self.device, register.address, width)
            .map_err(|source| unavailable(self.device, source))?;
        let value = ValueCodec::decode(register, &bytes)?;

        debug!(register = register.name, value = %value, "Read register");
        Ok(value)
    }

    /// Write a fixed-width register, converting `value` to the register's type
    pub fn write(&mut self, register: &Register, value: Value) -> Result<()> {
        if register.value_type == ValueType::Utf8String {
            return Err(FilamanError::UnsupportedFieldType {
                register: register.name,
                value_type: register.value_type,
            });
        }
        let value = value.coerce(register.value_type, register.name)?;
        let bytes = ValueCodec::encode(register, &value)?;

        self.bus
            .write_bytes(self.device, register.address, &bytes)
            .map_err(|source| unavailable(self.device, source))?;

        debug!(register = register.name, value = %value, "Wrote register");
        Ok(())
    }

    /// Read a string register holding `length` bytes
    ///
    /// The transfer is capped at [`MAX_STRING_LEN`]; a negative length reads
    /// nothing.
    pub fn read_string(&mut self, register: &Register, length: i32) -> Result<String> {
        ensure_string(register)?;
        let count = usize::try_from(length).unwrap_or(0).min(MAX_STRING_LEN);
        if count == 0 {
            debug!(register = register.name, length, "Skipping empty string read");
            return Ok(String::new());
        }

        let bytes = self
            .bus
            .read_bytes(self.device, register.address, count)
            .map_err(|source| unavailable(self.device, source))?;
        if bytes.len() != count {
            return Err(FilamanError::MalformedResponse {
                register: register.name,
                expected: count,
                actual: bytes.len(),
            });
        }
        let value = String::from_utf8(bytes).map_err(|source| FilamanError::EncodingError {
            register: register.name,
            source,
        })?;

        debug!(register = register.name, requested = length, count, "Read string register");
        Ok(value)
    }

    /// Write `value` to a string register, preceded by its byte length
    ///
    /// Values longer than [`MAX_STRING_LEN`] bytes are cut at the last character
    /// boundary that fits. Returns the number of bytes sent.
    pub fn write_string(
        &mut self,
        register: &Register,
        value: &str,
        length_register: &Register,
    ) -> Result<usize> {
        ensure_string(register)?;
        let original_len = value.len();
        let value = truncate_utf8(value, MAX_STRING_LEN);
        if value.len() < original_len {
            debug!(
                register = register.name,
                original_len,
                len = value.len(),
                "String truncated to block size"
            );
        }

        self.write(length_register, Value::Int32(value.len() as i32))?;
        self.bus
            .write_bytes(self.device, register.address, value.as_bytes())
            .map_err(|source| unavailable(self.device, source))?;

        debug!(register = register.name, len = value.len(), "Wrote string register");
        Ok(value.len())
    }

    /// Signal the device to act on staged writes
    pub fn write_operation(&mut self, op: Operation) -> Result<()> {
        let register = self.register(names::OPERATION)?;
        self.write(&register, Value::Byte(op.tag()))?;
        info!(operation = ?op, "Sent operation");
        Ok(())
    }
}

fn unavailable(device: u8, source: TransportError) -> FilamanError {
    FilamanError::DeviceUnavailable { device, source }
}

fn ensure_string(register: &Register) -> Result<()> {
    if register.value_type == ValueType::Utf8String {
        Ok(())
    } else {
        Err(FilamanError::TypeMismatch {
            register: register.name.to_string(),
            expected: ValueType::Utf8String,
        })
    }
}

/// Longest prefix of `value` that fits in `max` bytes without splitting a character
fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
