//! Device driver facade
//!
//! [`DeviceDriver`] is the surface the device-management framework calls.
//! [`CanDriver`] keeps one [`TransportHandle`] per device in a registry; the
//! registry lock only guards the map and is never held across socket I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::codec::DecodeMode;
use crate::config::{parse_address, DriverConfig, ProtocolMap};
use crate::error::{CanSrvError, Result};
use crate::handlers::{self, CommandRequest, GetOutcome, PutOutcome};
use crate::transport::{BusConnector, LinkState, TransportHandle};

/// Callbacks a device service implements for the framework
pub trait DeviceDriver: Send + Sync {
    /// Apply service-level settings; may be called more than once
    fn initialize(&self, config: DriverConfig) -> Result<()>;

    /// Register (or replace) a device from its protocol properties
    fn create_address(&self, device: &str, protocols: &ProtocolMap) -> Result<()>;

    /// Forget a device, closing its transport once any batch on it finishes
    fn free_address(&self, device: &str) -> Result<()>;

    fn handle_get(&self, device: &str, requests: &[CommandRequest]) -> GetOutcome;

    fn handle_put(
        &self,
        device: &str,
        requests: &[CommandRequest],
        values: &[Vec<u32>],
    ) -> PutOutcome;

    /// Close every transport; in-flight batches complete first
    fn stop(&self, force: bool);
}

/// SocketCAN device driver
///
/// `stopped` only changes while the registry write lock is held, so a device
/// is either registered before `stop` collects the handles or refused.
pub struct CanDriver<C: BusConnector> {
    connector: Arc<C>,
    devices: RwLock<HashMap<String, Arc<TransportHandle<C>>>>,
    decode_mode: RwLock<DecodeMode>,
    stopped: AtomicBool,
}

impl<C: BusConnector> CanDriver<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            devices: RwLock::new(HashMap::new()),
            decode_mode: RwLock::new(DecodeMode::default()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Registered device names, sorted
    pub fn device_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_open(&self, device: &str) -> bool {
        self.link_state(device) == Some(LinkState::Open)
    }

    pub fn link_state(&self, device: &str) -> Option<LinkState> {
        self.handle(device).map(|h| h.state())
    }

    pub fn decode_mode(&self) -> DecodeMode {
        *self.decode_mode.read()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn handle(&self, device: &str) -> Option<Arc<TransportHandle<C>>> {
        self.devices.read().get(device).cloned()
    }
}

impl<C: BusConnector> DeviceDriver for CanDriver<C> {
    fn initialize(&self, config: DriverConfig) -> Result<()> {
        let mode = config.decode_mode();
        *self.decode_mode.write() = mode;
        info!("CAN driver initialized (payload decoding: {:?})", mode);
        Ok(())
    }

    fn create_address(&self, device: &str, protocols: &ProtocolMap) -> Result<()> {
        let spec = parse_address(protocols).inspect_err(|e| {
            warn!("Device {}: invalid address: {}", device, e);
        })?;
        info!(
            "Device {}: {} filter 0x{:X}/0x{:X} timeout {:?}",
            device, spec.interface_name, spec.match_id, spec.match_mask, spec.receive_timeout
        );

        let handle = Arc::new(TransportHandle::new(
            device,
            spec,
            Arc::clone(&self.connector),
        ));
        let previous = {
            let mut devices = self.devices.write();
            if self.is_stopped() {
                return Err(CanSrvError::Stopped);
            }
            devices.insert(device.to_string(), handle)
        };

        if let Some(previous) = previous {
            debug!("Device {}: replacing previous address", device);
            previous.close();
        }
        Ok(())
    }

    fn free_address(&self, device: &str) -> Result<()> {
        let handle = self
            .devices
            .write()
            .remove(device)
            .ok_or_else(|| CanSrvError::DeviceNotFound(device.to_string()))?;

        handle.close();
        info!("Device {}: address released", device);
        Ok(())
    }

    fn handle_get(&self, device: &str, requests: &[CommandRequest]) -> GetOutcome {
        match self.handle(device) {
            Some(handle) => handlers::handle_get(&handle, requests),
            None => {
                let err = CanSrvError::DeviceNotFound(device.to_string());
                warn!("GET: {}", err);
                GetOutcome::failed(requests.len(), &err)
            },
        }
    }

    fn handle_put(
        &self,
        device: &str,
        requests: &[CommandRequest],
        values: &[Vec<u32>],
    ) -> PutOutcome {
        match self.handle(device) {
            Some(handle) => handlers::handle_put(&handle, requests, values, self.decode_mode()),
            None => {
                let err = CanSrvError::DeviceNotFound(device.to_string());
                warn!("PUT: {}", err);
                PutOutcome::failed(values.len(), &err)
            },
        }
    }

    fn stop(&self, force: bool) {
        let handles: Vec<_> = {
            let devices = self.devices.write();
            if self.stopped.swap(true, Ordering::SeqCst) {
                debug!("CAN driver already stopped");
                return;
            }
            devices.values().cloned().collect()
        };
        info!(
            "Stopping CAN driver: closing {} transport(s){}",
            handles.len(),
            if force { " (forced)" } else { "" }
        );

        // Each close takes the device lock, so running batches finish first
        for handle in handles {
            handle.close();
        }
        info!("CAN driver stopped");
    }
}

impl<C: BusConnector> Drop for CanDriver<C> {
    fn drop(&mut self) {
        if !self.is_stopped() {
            self.stop(false);
        }
    }
}
