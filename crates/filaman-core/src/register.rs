//! Register map of the filament manager device
//!
//! The device exposes sixteen one-byte addresses. Registers after `opt_bitmap`
//! are optional fields: each one is only transferred when its bit in the bitmap
//! is set, and its bit index is its distance from the first optional address.

use serde::Serialize;
use std::collections::HashSet;

use crate::error::{FilamanError, Result};
use crate::value::ValueType;

/// Longest string a single block transaction can carry
pub const MAX_STRING_LEN: usize = 32;

/// Symbolic register names
pub mod names {
    pub const OPERATION: &str = "operation";
    pub const PRESENT: &str = "present";
    pub const NFC_VALID: &str = "nfc_valid";
    pub const FILAMENT_ID: &str = "filament_id";
    pub const FILAMENT_NAME_LEN: &str = "filament_name_len";
    pub const FILAMENT_NAME: &str = "filament_name";
    pub const SPOOL_WEIGHT: &str = "spool_weight";
    pub const TOTAL_WEIGHT: &str = "total_weight";
    pub const OPT_BITMAP: &str = "opt_bitmap";
    pub const EXTR_MULTIPLIER: &str = "extr_multiplier";
    pub const PRESSURE_ADVANCE: &str = "pressure_advance";
    pub const EXTR_TEMP: &str = "extr_temp";
    pub const BED_TEMP: &str = "bed_temp";
    pub const REGULAR_FAN: &str = "regular_fan";
    pub const BRIDGE_FAN: &str = "bridge_fan";
}

/// A single addressable unit of device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Register {
    pub name: &'static str,
    pub address: u8,
    pub value_type: ValueType,
}

impl Register {
    pub const fn new(name: &'static str, address: u8, value_type: ValueType) -> Self {
        Self {
            name,
            address,
            value_type,
        }
    }
}

/// Device register layout, in catalog order
const STANDARD_REGISTERS: [Register; 15] = [
    Register::new(names::OPERATION, 0x0F, ValueType::Byte),
    Register::new(names::PRESENT, 0x00, ValueType::Bool),
    Register::new(names::NFC_VALID, 0x01, ValueType::Bool),
    Register::new(names::FILAMENT_ID, 0x02, ValueType::Int32),
    Register::new(names::FILAMENT_NAME_LEN, 0x03, ValueType::Int32),
    Register::new(names::FILAMENT_NAME, 0x04, ValueType::Utf8String),
    Register::new(names::SPOOL_WEIGHT, 0x05, ValueType::Int32),
    Register::new(names::TOTAL_WEIGHT, 0x06, ValueType::Int32),
    Register::new(names::OPT_BITMAP, 0x07, ValueType::Byte),
    Register::new(names::EXTR_MULTIPLIER, 0x08, ValueType::Float32),
    Register::new(names::PRESSURE_ADVANCE, 0x09, ValueType::Float32),
    Register::new(names::EXTR_TEMP, 0x0A, ValueType::Int32),
    Register::new(names::BED_TEMP, 0x0B, ValueType::Int32),
    Register::new(names::REGULAR_FAN, 0x0C, ValueType::Int32),
    Register::new(names::BRIDGE_FAN, 0x0D, ValueType::Int32),
];

/// Operation codes written to the `operation` register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    /// Apply every register write staged since the last commit
    Commit = 0,
}

impl Operation {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Immutable, validated register map
#[derive(Debug, Clone)]
pub struct RegisterCatalog {
    registers: Vec<Register>,
    bitmap_start: u8,
    /// Optional registers sorted by address; position equals bit index
    optional: Vec<Register>,
}

impl RegisterCatalog {
    /// Build a catalog from `registers`, checking the layout the bitmap relies on
    ///
    /// Requires unique names and addresses, an `opt_bitmap` byte register, and
    /// optional registers that are fixed-width, contiguous from the bitmap start,
    /// and few enough to fit in one byte.
    pub fn new(registers: Vec<Register>) -> Result<Self> {
        let mut seen_names = HashSet::new();
        let mut seen_addresses = HashSet::new();
        for r in &registers {
            if !seen_names.insert(r.name) {
                return Err(FilamanError::InvalidCatalog(format!(
                    "duplicate register name {}",
                    r.name
                )));
            }
            if !seen_addresses.insert(r.address) {
                return Err(FilamanError::InvalidCatalog(format!(
                    "duplicate address 0x{:02x} ({})",
                    r.address, r.name
                )));
            }
        }

        let bitmap = registers
            .iter()
            .find(|r| r.name == names::OPT_BITMAP)
            .ok_or_else(|| FilamanError::InvalidCatalog("missing opt_bitmap register".into()))?;
        if bitmap.value_type != ValueType::Byte {
            return Err(FilamanError::InvalidCatalog(
                "opt_bitmap must be a byte register".into(),
            ));
        }
        let bitmap_start = bitmap.address.checked_add(1).ok_or_else(|| {
            FilamanError::InvalidCatalog("opt_bitmap cannot be the last address".into())
        })?;

        // The operation register sits outside the optional window by definition.
        let mut optional: Vec<Register> = registers
            .iter()
            .filter(|r| r.address >= bitmap_start && r.name != names::OPERATION)
            .copied()
            .collect();
        optional.sort_by_key(|r| r.address);

        if optional.len() > 8 {
            return Err(FilamanError::InvalidCatalog(format!(
                "{} optional registers do not fit in a bitmap byte",
                optional.len()
            )));
        }
        for (i, r) in optional.iter().enumerate() {
            if usize::from(r.address - bitmap_start) != i {
                return Err(FilamanError::InvalidCatalog(format!(
                    "optional register {} at 0x{:02x} breaks the contiguous run from 0x{:02x}",
                    r.name, r.address, bitmap_start
                )));
            }
            if r.value_type.width().is_none() {
                return Err(FilamanError::InvalidCatalog(format!(
                    "optional register {} cannot be a string",
                    r.name
                )));
            }
        }

        Ok(Self {
            registers,
            bitmap_start,
            optional,
        })
    }

    /// The device's register map
    pub fn standard() -> Self {
        Self::new(STANDARD_REGISTERS.to_vec())
            .unwrap_or_else(|e| panic!("built-in register table is invalid: {e}"))
    }

    /// Find a register by symbolic name
    pub fn lookup(&self, name: &str) -> Result<&Register> {
        self.registers
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| FilamanError::UnknownRegister(name.to_string()))
    }

    /// Registers in catalog order
    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    /// Optional registers in ascending address (bit) order
    pub fn optional_registers(&self) -> &[Register] {
        &self.optional
    }

    /// First address covered by the optional bitmap
    pub fn bitmap_start(&self) -> u8 {
        self.bitmap_start
    }

    pub fn is_optional(&self, register: &Register) -> bool {
        self.optional.iter().any(|r| r == register)
    }
}

impl Default for RegisterCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_layout() {
        let catalog = RegisterCatalog::standard();
        assert_eq!(catalog.registers().len(), 15);
        assert_eq!(catalog.bitmap_start(), 0x08);
        assert_eq!(catalog.lookup(names::OPERATION).unwrap().address, 0x0F);
        assert_eq!(
            catalog.lookup(names::FILAMENT_NAME).unwrap().value_type,
            ValueType::Utf8String
        );

        let optional: Vec<_> = catalog.optional_registers().iter().map(|r| r.name).collect();
        assert_eq!(
            optional,
            vec![
                names::EXTR_MULTIPLIER,
                names::PRESSURE_ADVANCE,
                names::EXTR_TEMP,
                names::BED_TEMP,
                names::REGULAR_FAN,
                names::BRIDGE_FAN,
            ]
        );
    }

    #[test]
    fn test_catalog_order_preserved() {
        let catalog = RegisterCatalog::standard();
        assert_eq!(catalog.registers()[0].name, names::OPERATION);
        assert_eq!(catalog.registers()[1].name, names::PRESENT);
    }

    #[test]
    fn test_unknown_register() {
        let catalog = RegisterCatalog::standard();
        assert!(matches!(
            catalog.lookup("nozzle_size"),
            Err(FilamanError::UnknownRegister(name)) if name == "nozzle_size"
        ));
    }

    #[test]
    fn test_rejects_gap_in_optional_run() {
        let registers = vec![
            Register::new(names::OPT_BITMAP, 0x07, ValueType::Byte),
            Register::new(names::EXTR_MULTIPLIER, 0x08, ValueType::Float32),
            Register::new(names::EXTR_TEMP, 0x0A, ValueType::Int32),
        ];
        assert!(matches!(
            RegisterCatalog::new(registers),
            Err(FilamanError::InvalidCatalog(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_address() {
        let registers = vec![
            Register::new(names::PRESENT, 0x00, ValueType::Bool),
            Register::new(names::NFC_VALID, 0x00, ValueType::Bool),
            Register::new(names::OPT_BITMAP, 0x07, ValueType::Byte),
        ];
        assert!(RegisterCatalog::new(registers).is_err());
    }

    #[test]
    fn test_rejects_optional_string() {
        let registers = vec![
            Register::new(names::OPT_BITMAP, 0x07, ValueType::Byte),
            Register::new("note", 0x08, ValueType::Utf8String),
        ];
        assert!(RegisterCatalog::new(registers).is_err());
    }

    #[test]
    fn test_commit_tag() {
        assert_eq!(Operation::Commit.tag(), 0);
    }
}
