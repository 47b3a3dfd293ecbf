//! In-memory register file implementing [`Bus`]
//!
//! Behaves as a faithful loopback: whatever was written to a register is read
//! back, zero-padded to the requested length. The most recent transactions
//! are logged so callers can assert on the exact bus traffic.

use filaman_core::TransportError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

use crate::bus::Bus;

/// Number of transactions kept in the log; older entries are dropped first
pub const LOG_CAPACITY: usize = 1024;

/// One bus transaction as observed by [`MemoryBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Probe { device: u8 },
    Read { device: u8, register: u8, count: usize },
    Write { device: u8, register: u8, data: Vec<u8> },
}

#[derive(Debug, Default)]
struct Inner {
    attached: HashSet<u8>,
    registers: HashMap<(u8, u8), Vec<u8>>,
    log: VecDeque<Transaction>,
}

impl Inner {
    fn record(&mut self, transaction: Transaction) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(transaction);
    }
}

/// Shared in-memory bus; clones refer to the same register file
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus with a single responding device at `device`
    pub fn with_device(device: u8) -> Self {
        let bus = Self::new();
        bus.attach(device);
        bus
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `device` acknowledge transactions
    pub fn attach(&self, device: u8) {
        self.lock().attached.insert(device);
    }

    /// Stop `device` from acknowledging; register contents are kept
    pub fn detach(&self, device: u8) {
        self.lock().attached.remove(&device);
    }

    /// Set register contents directly, bypassing the transaction log
    pub fn set_register(&self, device: u8, register: u8, data: &[u8]) {
        self.lock().registers.insert((device, register), data.to_vec());
    }

    pub fn register(&self, device: u8, register: u8) -> Option<Vec<u8>> {
        self.lock().registers.get(&(device, register)).cloned()
    }

    /// Transactions since creation or the last [`clear_log`](Self::clear_log),
    /// at most [`LOG_CAPACITY`] of them
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().log.iter().cloned().collect()
    }

    /// Register addresses of logged writes, in order
    pub fn write_addresses(&self) -> Vec<u8> {
        self.lock()
            .log
            .iter()
            .filter_map(|t| match t {
                Transaction::Write { register, .. } => Some(*register),
                _ => None,
            })
            .collect()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }
}

impl Bus for MemoryBus {
    fn read_bytes(&mut self, device: u8, register: u8, count: usize) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.lock();
        inner.record(Transaction::Read {
            device,
            register,
            count,
        });
        if !inner.attached.contains(&device) {
            return Err(TransportError::NoAcknowledge { device });
        }

        let mut data = inner
            .registers
            .get(&(device, register))
            .cloned()
            .unwrap_or_default();
        data.resize(count, 0);
        trace!(device, register, count, "memory bus read");
        Ok(data)
    }

    fn write_bytes(&mut self, device: u8, register: u8, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.record(Transaction::Write {
            device,
            register,
            data: data.to_vec(),
        });
        if !inner.attached.contains(&device) {
            return Err(TransportError::NoAcknowledge { device });
        }

        inner.registers.insert((device, register), data.to_vec());
        trace!(device, register, len = data.len(), "memory bus write");
        Ok(())
    }

    fn probe(&mut self, device: u8) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.record(Transaction::Probe { device });
        if inner.attached.contains(&device) {
            Ok(())
        } else {
            Err(TransportError::NoAcknowledge { device })
        }
    }
}
