//! Linux i2c-dev bus (`/dev/i2c-N`)
//!
//! Register reads are one combined `I2C_RDWR` transfer (register byte, then a
//! repeated-start read), which is what SMBus "read block data" puts on the wire.

use filaman_core::TransportError;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use tracing::{debug, trace};

use crate::bus::Bus;

const I2C_RDWR: libc::c_ulong = 0x0707;
const I2C_M_RD: u16 = 0x0001;

#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrIoctlData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

/// Bus backed by a Linux i2c-dev character device
pub struct LinuxI2cBus {
    file: File,
}

impl LinuxI2cBus {
    /// Open `/dev/i2c-<bus_id>`
    pub fn open(bus_id: u32) -> io::Result<Self> {
        Self::open_path(format!("/dev/i2c-{}", bus_id))
    }

    pub fn open_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!(path = %path.display(), "Opened i2c bus");
        Ok(Self { file })
    }

    fn transfer(&self, device: u8, msgs: &mut [I2cMsg]) -> Result<(), TransportError> {
        let mut data = I2cRdwrIoctlData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };

        // SAFETY: every message buffer outlives this call and its `len` matches
        // the buffer size; the kernel only touches memory described by `data`.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_RDWR as _,
                &mut data as *mut I2cRdwrIoctlData,
            )
        };
        if rc < 0 {
            return Err(map_os_error(device, io::Error::last_os_error()));
        }
        Ok(())
    }
}

/// NACKs surface as ENXIO or EREMOTEIO depending on the adapter driver
fn map_os_error(device: u8, err: io::Error) -> TransportError {
    match err.raw_os_error() {
        Some(libc::ENXIO) | Some(libc::EREMOTEIO) => TransportError::NoAcknowledge { device },
        _ => TransportError::Io(err),
    }
}

impl Bus for LinuxI2cBus {
    fn read_bytes(&mut self, device: u8, register: u8, count: usize) -> Result<Vec<u8>, TransportError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut reg = [register];
        let mut buf = vec![0u8; count];
        let mut msgs = [
            I2cMsg {
                addr: u16::from(device),
                flags: 0,
                len: 1,
                buf: reg.as_mut_ptr(),
            },
            I2cMsg {
                addr: u16::from(device),
                flags: I2C_M_RD,
                len: count as u16,
                buf: buf.as_mut_ptr(),
            },
        ];
        self.transfer(device, &mut msgs)?;

        trace!(device, register, count, "i2c read");
        Ok(buf)
    }

    fn write_bytes(&mut self, device: u8, register: u8, data: &[u8]) -> Result<(), TransportError> {
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.push(register);
        buf.extend_from_slice(data);

        let mut msgs = [I2cMsg {
            addr: u16::from(device),
            flags: 0,
            len: buf.len() as u16,
            buf: buf.as_mut_ptr(),
        }];
        self.transfer(device, &mut msgs)?;

        trace!(device, register, len = data.len(), "i2c write");
        Ok(())
    }

    fn probe(&mut self, device: u8) -> Result<(), TransportError> {
        let mut byte = [0u8];
        let mut msgs = [I2cMsg {
            addr: u16::from(device),
            flags: I2C_M_RD,
            len: 1,
            buf: byte.as_mut_ptr(),
        }];
        self.transfer(device, &mut msgs)
    }
}
