//! Application state management
//!
//! The device handle sits behind one async mutex: every request, watcher
//! poll and refresh takes it for the whole transaction, so at most one bus
//! transaction sequence is in flight.

use anyhow::Result;
use chrono::{DateTime, Utc};
use filaman_bus::{Bus, FilamentDevice, MemoryBus};
use filaman_core::{names, FilamanError, FilamentRecord, StatusSnapshot, Value};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinError;
use tracing::{debug, info};

use crate::config::{Config, DeviceConfig};

/// Notification name for filament changes
pub const FILAMENT_CHANGED_NOTIF: &str = "filaman:filament_changed";

pub type DynDevice = FilamentDevice<Box<dyn Bus>>;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error(transparent)]
    Device(#[from] FilamanError),
    #[error("Device task failed: {0}")]
    Task(#[from] JoinError),
}

/// Payload of a filament change notification
///
/// Serializes as the status flags merged with the record fields, when a
/// record was readable.
#[derive(Debug, Clone, Serialize)]
pub struct FilamentChanged {
    #[serde(flatten)]
    pub status: StatusSnapshot,
    #[serde(flatten)]
    pub record: Option<FilamentRecord>,
    pub timestamp: DateTime<Utc>,
}

/// Shared application state
pub struct AppState {
    /// Filament manager, one transaction sequence at a time
    device: Arc<Mutex<DynDevice>>,
    /// Configuration
    pub config: Config,
    /// Event broadcast for WebSocket clients
    events: broadcast::Sender<FilamentChanged>,
}

impl AppState {
    /// Open the configured device and create application state
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let device = open_device(&config.device, config.device_address()?)?;
        Ok(Self::with_device(config, device))
    }

    /// Create application state around an already opened device
    pub fn with_device(config: Config, device: DynDevice) -> Arc<Self> {
        let (events, _) = broadcast::channel(100);
        Arc::new(Self {
            device: Arc::new(Mutex::new(device)),
            config,
            events,
        })
    }

    /// Run `f` against the device on the blocking pool while holding the device lock
    async fn with_device_locked<T, F>(&self, f: F) -> Result<T, DeviceError>
    where
        F: FnOnce(&mut DynDevice) -> filaman_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = self.device.clone().lock_owned().await;
        let result = tokio::task::spawn_blocking(move || f(&mut *guard)).await?;
        Ok(result?)
    }

    /// Read presence flags
    pub async fn get_status(&self) -> Result<StatusSnapshot, DeviceError> {
        self.with_device_locked(|d| d.read_status()).await
    }

    /// Read the record on the current tag
    pub async fn get_record(&self) -> Result<FilamentRecord, DeviceError> {
        self.with_device_locked(|d| d.read_record()).await
    }

    /// Write and commit a record
    pub async fn set_record(&self, record: FilamentRecord) -> Result<(), DeviceError> {
        self.with_device_locked(move |d| d.write_record(&record)).await
    }

    /// Refresh status, read the record when one is available, and notify subscribers
    ///
    /// Status and record come from one hold of the device lock, so a concurrent
    /// write cannot land between them.
    pub async fn on_presence_interrupt(&self) -> Result<FilamentChanged, DeviceError> {
        let (status, record) = self
            .with_device_locked(|d| {
                let status = d.read_status()?;
                let record = if status.has_record() {
                    Some(d.read_record()?)
                } else {
                    None
                };
                Ok((status, record))
            })
            .await?;

        let event = FilamentChanged {
            status,
            record,
            timestamp: Utc::now(),
        };
        let receivers = self.events.send(event.clone()).unwrap_or(0);
        debug!(
            present = status.present,
            nfc_valid = status.nfc_valid,
            receivers,
            "Sent {}",
            FILAMENT_CHANGED_NOTIF
        );
        Ok(event)
    }

    /// Subscribe to filament change events
    pub fn subscribe(&self) -> broadcast::Receiver<FilamentChanged> {
        self.events.subscribe()
    }
}

/// Open the bus selected by `config` and probe the device at `address`
pub fn open_device(config: &DeviceConfig, address: u8) -> Result<DynDevice> {
    if config.simulate {
        info!(address, "Using simulated filament manager");
        let bus = MemoryBus::with_device(address);
        let mut device = FilamentDevice::open(Box::new(bus.clone()) as Box<dyn Bus>, address)?;
        seed_simulated_device(&bus, &mut device, address)?;
        return Ok(device);
    }

    open_i2c_device(config, address)
}

#[cfg(target_os = "linux")]
fn open_i2c_device(config: &DeviceConfig, address: u8) -> Result<DynDevice> {
    let bus = filaman_bus::LinuxI2cBus::open(config.smbus_id).map_err(|e| {
        anyhow::anyhow!("Failed to open /dev/i2c-{}: {}", config.smbus_id, e)
    })?;
    let device = FilamentDevice::open(Box::new(bus) as Box<dyn Bus>, address).map_err(|e| {
        anyhow::anyhow!(
            "There is no device on i2c bus {} with address 0x{:02x}: {}",
            config.smbus_id,
            address,
            e
        )
    })?;
    Ok(device)
}

#[cfg(not(target_os = "linux"))]
fn open_i2c_device(_config: &DeviceConfig, _address: u8) -> Result<DynDevice> {
    anyhow::bail!("i2c access is only supported on Linux; set device.simulate = true")
}

/// Put a spool with a valid tag into a simulated device
fn seed_simulated_device(bus: &MemoryBus, device: &mut DynDevice, address: u8) -> Result<()> {
    let record = FilamentRecord::new(1, "Generic PLA", 200, 1200)
        .with_field(names::EXTR_TEMP, Value::Int32(215))
        .with_field(names::BED_TEMP, Value::Int32(60));
    device.write_record(&record)?;

    let catalog = device.transport().catalog();
    let present = catalog.lookup(names::PRESENT)?.address;
    let nfc_valid = catalog.lookup(names::NFC_VALID)?.address;
    bus.set_register(address, present, &[1]);
    bus.set_register(address, nfc_valid, &[1]);
    bus.clear_log();
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use filaman_bus::Transaction;

    pub const DEV: u8 = 0x42;

    pub fn test_state() -> (MemoryBus, Arc<AppState>) {
        let bus = MemoryBus::with_device(DEV);
        let device = FilamentDevice::open(Box::new(bus.clone()) as Box<dyn Bus>, DEV).unwrap();
        bus.clear_log();
        let mut config = Config::default();
        config.device.dev_address = Some(DEV);
        (bus, AppState::with_device(config, device))
    }

    #[tokio::test]
    async fn test_status_reads_flags() {
        let (bus, state) = test_state();
        bus.set_register(DEV, 0x00, &[1]);

        let status = state.get_status().await.unwrap();
        assert!(status.present);
        assert!(!status.nfc_valid);
        assert_eq!(bus.transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_set_then_get_record() {
        let (_bus, state) = test_state();
        let record = FilamentRecord::new(7, "PLA", 200, 950)
            .with_field(names::PRESSURE_ADVANCE, Value::Float32(0.045));

        state.set_record(record.clone()).await.unwrap();
        assert_eq!(state.get_record().await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_interrupt_without_valid_tag_reads_only_status() {
        let (bus, state) = test_state();
        bus.set_register(DEV, 0x00, &[1]);
        bus.set_register(DEV, 0x01, &[0]);
        let mut rx = state.subscribe();

        let event = state.on_presence_interrupt().await.unwrap();
        assert!(event.record.is_none());
        assert_eq!(bus.transactions().len(), 2);

        let received = rx.recv().await.unwrap();
        assert!(received.status.present);
        assert!(received.record.is_none());
    }

    #[tokio::test]
    async fn test_interrupt_with_valid_tag_includes_record() {
        let (bus, state) = test_state();
        state
            .set_record(FilamentRecord::new(3, "PETG", 250, 1250))
            .await
            .unwrap();
        bus.set_register(DEV, 0x00, &[1]);
        bus.set_register(DEV, 0x01, &[1]);

        let event = state.on_presence_interrupt().await.unwrap();
        let record = event.record.clone().unwrap();
        assert_eq!(record.name, "PETG");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["present"], true);
        assert_eq!(json["nfc_valid"], true);
        assert_eq!(json["id"], 3);
        assert_eq!(json["total_weight"], 1250);
        assert!(json.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn test_interrupt_is_not_split_by_concurrent_write() {
        let (bus, state) = test_state();
        state
            .set_record(FilamentRecord::new(1, "PLA", 200, 1000))
            .await
            .unwrap();
        bus.set_register(DEV, 0x00, &[1]);
        bus.set_register(DEV, 0x01, &[1]);
        bus.clear_log();

        let writer = state.clone();
        let (event, written) = tokio::join!(
            state.on_presence_interrupt(),
            writer.set_record(FilamentRecord::new(2, "PETG", 250, 1250)),
        );
        event.unwrap();
        written.unwrap();

        // every read of the interrupt sits on one side of the write sequence
        let log = bus.transactions();
        let first_write = log
            .iter()
            .position(|t| matches!(t, Transaction::Write { .. }))
            .unwrap();
        let last_write = log
            .iter()
            .rposition(|t| matches!(t, Transaction::Write { .. }))
            .unwrap();
        assert!(log[first_write..=last_write]
            .iter()
            .all(|t| matches!(t, Transaction::Write { .. })));
    }

    #[tokio::test]
    async fn test_device_errors_surface() {
        let (bus, state) = test_state();
        bus.detach(DEV);
        let err = state.get_status().await.unwrap_err();
        assert!(matches!(err, DeviceError::Device(e) if e.is_device_unavailable()));
    }

    #[test]
    fn test_simulated_device_has_valid_tag() {
        let config = DeviceConfig {
            simulate: true,
            ..DeviceConfig::default()
        };
        let mut device = open_device(&config, DEV).unwrap();
        assert!(device.read_status().unwrap().has_record());
        assert_eq!(device.read_record().unwrap().name, "Generic PLA");
    }
}
