//! Filaman Bus - Register transport for the filament manager device
//!
//! This crate drives the device's register protocol over a byte bus:
//! single-register reads and writes, length-prefixed strings, and whole-record
//! transactions finished by a commit handshake.

pub mod bus;
pub mod device;
#[cfg(target_os = "linux")]
pub mod i2c;
pub mod memory;
pub mod transport;

pub use bus::Bus;
pub use device::FilamentDevice;
#[cfg(target_os = "linux")]
pub use i2c::LinuxI2cBus;
pub use memory::{MemoryBus, Transaction};
pub use transport::RegisterTransport;
