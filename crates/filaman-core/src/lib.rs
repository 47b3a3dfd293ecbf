//! Filaman Core - Register map, value codec and record types
//!
//! This crate describes the host-visible contract of the filament manager:
//! - Register catalog with addresses and wire types
//! - Fixed-width little-endian value encoding
//! - Optional field presence bitmap
//! - Filament record and status types

pub mod bitmap;
pub mod error;
pub mod record;
pub mod register;
pub mod value;

pub use bitmap::OptionalFieldBitmap;
pub use error::{FilamanError, Result, TransportError};
pub use record::{FilamentRecord, StatusSnapshot};
pub use register::{names, Operation, Register, RegisterCatalog, MAX_STRING_LEN};
pub use value::{Value, ValueCodec, ValueType};
