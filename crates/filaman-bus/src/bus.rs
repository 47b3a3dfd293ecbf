//! Bus primitives consumed by the register transport

use filaman_core::TransportError;

/// A register-addressed byte bus (SMBus/I2C style)
///
/// Every call is one complete transaction that either succeeds or fails as a
/// whole. Implementations add no retries; timeouts are whatever the underlying
/// driver enforces.
pub trait Bus: Send {
    /// Read `count` bytes starting at `register` of `device`
    fn read_bytes(&mut self, device: u8, register: u8, count: usize) -> Result<Vec<u8>, TransportError>;

    /// Write `data` starting at `register` of `device`
    fn write_bytes(&mut self, device: u8, register: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Single-byte read without a register address, used to check the device answers
    fn probe(&mut self, device: u8) -> Result<(), TransportError>;
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn read_bytes(&mut self, device: u8, register: u8, count: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read_bytes(device, register, count)
    }

    fn write_bytes(&mut self, device: u8, register: u8, data: &[u8]) -> Result<(), TransportError> {
        (**self).write_bytes(device, register, data)
    }

    fn probe(&mut self, device: u8) -> Result<(), TransportError> {
        (**self).probe(device)
    }
}
