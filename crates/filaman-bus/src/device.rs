//! Whole-record transactions: status poll, tag read, tag write with commit

use filaman_core::{
    names, FilamanError, FilamentRecord, OptionalFieldBitmap, Operation, Register, Result,
    StatusSnapshot, Value, ValueType,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::transport::RegisterTransport;

/// Progress of a record write, used to report where an abandoned write stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStage {
    Idle,
    MandatoryFieldsWritten,
    OptionalFieldsWritten,
    BitmapCommitted,
    OperationCommitted,
}

/// Filament manager device driven through a [`RegisterTransport`]
pub struct FilamentDevice<B> {
    transport: RegisterTransport<B>,
}

impl<B: Bus> FilamentDevice<B> {
    /// Probe `device` on `bus` and wrap it
    pub fn open(bus: B, device: u8) -> Result<Self> {
        Ok(Self::new(RegisterTransport::open(bus, device)?))
    }

    pub fn new(transport: RegisterTransport<B>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &RegisterTransport<B> {
        &self.transport
    }

    /// Read the `present` and `nfc_valid` flags, and nothing else
    pub fn read_status(&mut self) -> Result<StatusSnapshot> {
        let present = self.read_bool(names::PRESENT)?;
        let nfc_valid = self.read_bool(names::NFC_VALID)?;
        Ok(StatusSnapshot { present, nfc_valid })
    }

    /// Read the record stored on the current tag
    ///
    /// Mandatory fields are read first, then the bitmap decides which optional
    /// registers follow.
    pub fn read_record(&mut self) -> Result<FilamentRecord> {
        let name_len = self.read_i32(names::FILAMENT_NAME_LEN)?;
        let id = self.read_i32(names::FILAMENT_ID)?;
        let name_register = self.transport.register(names::FILAMENT_NAME)?;
        let name = self.transport.read_string(&name_register, name_len)?;
        let spool_weight = self.read_i32(names::SPOOL_WEIGHT)?;
        let total_weight = self.read_i32(names::TOTAL_WEIGHT)?;
        let bitmap = OptionalFieldBitmap::from_bits(self.read_u8(names::OPT_BITMAP)?);

        debug!(id, name_len, bitmap = %bitmap, "Read mandatory fields");

        let present = bitmap.decode_present_registers(self.transport.catalog().optional_registers());
        let mut optional = BTreeMap::new();
        for register in present {
            let value = self.transport.read(&register)?;
            optional.insert(register.name.to_string(), value);
        }

        Ok(FilamentRecord {
            id,
            name,
            spool_weight,
            total_weight,
            optional,
        })
    }

    /// Write `record` to the tag and commit it
    ///
    /// Optional fields absent from `record` keep their bit clear and are not
    /// written. Keys that are not optional registers are ignored. Every optional
    /// value is converted before the first bus write, so a bad value never leaves
    /// a half-written transaction behind.
    pub fn write_record(&mut self, record: &FilamentRecord) -> Result<()> {
        let optional = self.prepare_optional(&record.optional)?;
        let mut stage = WriteStage::Idle;

        let result = self.write_stages(record, &optional, &mut stage);
        match &result {
            Ok(bitmap) => info!(
                id = record.id,
                name = %record.name,
                bitmap = %bitmap,
                "Filament record committed"
            ),
            Err(e) => warn!(
                id = record.id,
                stage = ?stage,
                error = %e,
                "Filament record write abandoned before commit"
            ),
        }
        result.map(|_| ())
    }

    fn write_stages(
        &mut self,
        record: &FilamentRecord,
        optional: &[(Register, u8, Value)],
        stage: &mut WriteStage,
    ) -> Result<OptionalFieldBitmap> {
        self.write_named(names::FILAMENT_ID, Value::Int32(record.id))?;
        let name_register = self.transport.register(names::FILAMENT_NAME)?;
        let len_register = self.transport.register(names::FILAMENT_NAME_LEN)?;
        self.transport
            .write_string(&name_register, &record.name, &len_register)?;
        self.write_named(names::SPOOL_WEIGHT, Value::Int32(record.spool_weight))?;
        self.write_named(names::TOTAL_WEIGHT, Value::Int32(record.total_weight))?;
        *stage = WriteStage::MandatoryFieldsWritten;

        let mut bitmap = OptionalFieldBitmap::EMPTY;
        for (register, index, value) in optional {
            bitmap = bitmap.set(*index);
            self.transport.write(register, *value)?;
        }
        *stage = WriteStage::OptionalFieldsWritten;

        self.write_named(names::OPT_BITMAP, Value::Byte(bitmap.bits()))?;
        *stage = WriteStage::BitmapCommitted;

        self.transport.write_operation(Operation::Commit)?;
        *stage = WriteStage::OperationCommitted;

        Ok(bitmap)
    }

    /// Optional registers named in `fields`, in catalog order, with converted values
    fn prepare_optional(
        &self,
        fields: &BTreeMap<String, Value>,
    ) -> Result<Vec<(Register, u8, Value)>> {
        let catalog = self.transport.catalog();
        for key in fields.keys() {
            if !catalog.optional_registers().iter().any(|r| r.name == key.as_str()) {
                debug!(field = %key, "Ignoring field without an optional register");
            }
        }

        catalog
            .optional_registers()
            .iter()
            .filter_map(|register| fields.get(register.name).map(|value| (register, value)))
            .map(|(register, value)| {
                let index = OptionalFieldBitmap::bit_index(catalog, register)?;
                let value = value.coerce(register.value_type, register.name)?;
                Ok((*register, index, value))
            })
            .collect()
    }

    fn write_named(&mut self, name: &str, value: Value) -> Result<()> {
        let register = self.transport.register(name)?;
        self.transport.write(&register, value)
    }

    fn read_bool(&mut self, name: &str) -> Result<bool> {
        let register = self.transport.register(name)?;
        let value = self.transport.read(&register)?;
        value.as_bool().ok_or_else(|| mismatch(&register, ValueType::Bool))
    }

    fn read_i32(&mut self, name: &str) -> Result<i32> {
        let register = self.transport.register(name)?;
        let value = self.transport.read(&register)?;
        value.as_i32().ok_or_else(|| mismatch(&register, ValueType::Int32))
    }

    fn read_u8(&mut self, name: &str) -> Result<u8> {
        let register = self.transport.register(name)?;
        let value = self.transport.read(&register)?;
        value.as_u8().ok_or_else(|| mismatch(&register, ValueType::Byte))
    }
}

fn mismatch(register: &Register, expected: ValueType) -> FilamanError {
    FilamanError::TypeMismatch {
        register: register.name.to_string(),
        expected,
    }
}
