//! Presence bitmap for optional record fields
//!
//! Bit `i` (LSB = 0) of the `opt_bitmap` register tells whether the optional
//! register at `bitmap_start + i` carries a value.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FilamanError, Result};
use crate::register::{Register, RegisterCatalog};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionalFieldBitmap(u8);

impl OptionalFieldBitmap {
    pub const EMPTY: Self = Self(0);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Bit index of an optional register
    pub fn bit_index(catalog: &RegisterCatalog, register: &Register) -> Result<u8> {
        let start = catalog.bitmap_start();
        if register.address < start || !catalog.is_optional(register) {
            return Err(FilamanError::RegisterNotOptional {
                register: register.name,
                address: register.address,
            });
        }
        Ok(register.address - start)
    }

    /// Copy of `self` with bit `index` set
    pub fn set(self, index: u8) -> Self {
        debug_assert!(index < 8, "bit index {index} out of range");
        Self(self.0 | (1 << index))
    }

    pub fn get(self, index: u8) -> bool {
        index < 8 && (self.0 >> index) & 0x01 != 0
    }

    /// Optional registers whose bit is set, in bit order
    pub fn decode_present_registers(self, optional: &[Register]) -> Vec<Register> {
        optional
            .iter()
            .enumerate()
            .filter(|(i, _)| self.get(*i as u8))
            .map(|(_, r)| *r)
            .collect()
    }
}

impl fmt::Display for OptionalFieldBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010b}", self.0)
    }
}
