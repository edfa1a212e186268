//! CAN transport layer
//!
//! A [`BusConnector`] opens a [`CanBus`] (one bound, filtered raw socket) for a
//! [`FilterSpec`]. A [`TransportHandle`] owns at most one open bus per device
//! together with the lock that serializes every read and write on it. The bus
//! is opened lazily on first use and the lock is held through a
//! [`TransportGuard`] for the length of a command batch.

#[cfg(target_os = "linux")]
pub mod socketcan;

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::FilterSpec;
use crate::error::TransportError;
use crate::frame::Frame;

/// One open raw CAN socket
pub trait CanBus: Send {
    /// Block until one frame arrives or the receive timeout elapses
    fn read_frame(&mut self) -> Result<Frame, TransportError>;

    /// Write one complete frame
    fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// OS descriptor backing the bus
    fn descriptor(&self) -> i32;
}

/// Opens buses; all-or-nothing, a failed open leaves nothing behind
pub trait BusConnector: Send + Sync + 'static {
    type Bus: CanBus;

    fn open(&self, spec: &FilterSpec) -> Result<Self::Bus, TransportError>;
}

/// Observable link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Uninitialized,
    Open,
    Failed,
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Open => write!(f, "open"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

enum Link<B> {
    Uninitialized,
    Open(B),
    Failed(String),
    Closed,
}

impl<B> Link<B> {
    fn state(&self) -> LinkState {
        match self {
            Self::Uninitialized => LinkState::Uninitialized,
            Self::Open(_) => LinkState::Open,
            Self::Failed(_) => LinkState::Failed,
            Self::Closed => LinkState::Closed,
        }
    }
}

/// Per-device transport: filter spec, connector and the guarded link
pub struct TransportHandle<C: BusConnector> {
    device: String,
    spec: FilterSpec,
    connector: Arc<C>,
    link: Mutex<Link<C::Bus>>,
}

impl<C: BusConnector> TransportHandle<C> {
    pub fn new(device: impl Into<String>, spec: FilterSpec, connector: Arc<C>) -> Self {
        Self {
            device: device.into(),
            spec,
            connector,
            link: Mutex::new(Link::Uninitialized),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Take the device lock, blocking until any in-flight batch finishes
    pub fn lock(&self) -> TransportGuard<'_, C> {
        TransportGuard {
            handle: self,
            link: self.link.lock(),
        }
    }

    /// Open the bus if it is not open yet
    pub fn open(&self) -> Result<(), TransportError> {
        self.lock().ensure_open()
    }

    /// Close the bus; waits for an in-flight batch, idempotent
    pub fn close(&self) {
        self.lock().close();
    }

    pub fn state(&self) -> LinkState {
        self.link.lock().state()
    }

    /// Descriptor of the open bus, `None` unless open
    pub fn descriptor(&self) -> Option<i32> {
        match &*self.link.lock() {
            Link::Open(bus) => Some(bus.descriptor()),
            _ => None,
        }
    }
}

impl<C: BusConnector> fmt::Debug for TransportHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("device", &self.device)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a device's link for the duration of a batch
pub struct TransportGuard<'a, C: BusConnector> {
    handle: &'a TransportHandle<C>,
    link: MutexGuard<'a, Link<C::Bus>>,
}

impl<C: BusConnector> TransportGuard<'_, C> {
    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    /// Open the bus unless it is already open
    ///
    /// A failed or closed link is not reopened.
    pub fn ensure_open(&mut self) -> Result<(), TransportError> {
        match &*self.link {
            Link::Open(_) => return Ok(()),
            Link::Failed(reason) => return Err(TransportError::LinkDown(reason.clone())),
            Link::Closed => return Err(TransportError::Closed),
            Link::Uninitialized => {},
        }

        let handle = self.handle;
        let spec = &handle.spec;
        let bus = handle.connector.open(spec)?;
        info!(
            "Device {}: opened {} (filter 0x{:X}/0x{:X}, timeout {:?}, fd {})",
            handle.device,
            spec.interface_name,
            spec.match_id,
            spec.match_mask,
            spec.receive_timeout,
            bus.descriptor()
        );
        *self.link = Link::Open(bus);
        Ok(())
    }

    pub fn read_frame(&mut self) -> Result<Frame, TransportError> {
        let result = self.bus()?.read_frame();
        match &result {
            Ok(frame) => debug!(
                "Device {}: read 0x{:X} [{}] {:02X?}",
                self.handle.device,
                frame.identifier(),
                frame.data_length(),
                frame.data()
            ),
            Err(e) => self.note_failure(e),
        }
        result
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let result = self.bus()?.write_frame(frame);
        match &result {
            Ok(()) => debug!(
                "Device {}: wrote 0x{:X} [{}] {:02X?}",
                self.handle.device,
                frame.identifier(),
                frame.data_length(),
                frame.data()
            ),
            Err(e) => self.note_failure(e),
        }
        result
    }

    /// Release the socket; later use fails with `Closed`
    pub fn close(&mut self) {
        if let Link::Open(_) = &*self.link {
            info!(
                "Device {}: closing {}",
                self.handle.device, self.handle.spec.interface_name
            );
        }
        *self.link = Link::Closed;
    }

    fn bus(&mut self) -> Result<&mut C::Bus, TransportError> {
        self.ensure_open()?;
        match &mut *self.link {
            Link::Open(bus) => Ok(bus),
            Link::Failed(reason) => Err(TransportError::LinkDown(reason.clone())),
            Link::Uninitialized | Link::Closed => Err(TransportError::Closed),
        }
    }

    fn note_failure(&mut self, err: &TransportError) {
        if err.is_fatal() {
            warn!(
                "Device {}: link to {} failed: {}",
                self.handle.device, self.handle.spec.interface_name, err
            );
            // Dropping the bus releases the descriptor
            *self.link = Link::Failed(err.to_string());
        }
    }
}

/// Pick the open step for an error from the combined create-and-bind call
///
/// Errors the kernel raises while allocating a socket are creation failures;
/// everything else happened while binding.
pub fn socket_open_step(err: &std::io::Error) -> crate::error::OpenStep {
    use crate::error::OpenStep;

    match err.raw_os_error() {
        Some(
            libc::EAFNOSUPPORT
            | libc::EPROTONOSUPPORT
            | libc::EMFILE
            | libc::ENFILE
            | libc::ENOBUFS
            | libc::ENOMEM
            | libc::EACCES
            | libc::EPERM,
        ) => OpenStep::SocketCreation,
        _ => OpenStep::Bind,
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::error::OpenStep;
    use crate::test_utils::{MockConnector, MockFault};
    use std::io;

    fn handle(connector: &MockConnector) -> TransportHandle<MockConnector> {
        TransportHandle::new(
            "engine",
            FilterSpec::new("vcan0", 0x100, 0x700, 1).unwrap(),
            Arc::new(connector.clone()),
        )
    }

    #[test]
    fn test_open_is_idempotent() {
        let connector = MockConnector::new();
        let handle = handle(&connector);
        assert_eq!(handle.state(), LinkState::Uninitialized);
        assert_eq!(handle.descriptor(), None);

        handle.open().unwrap();
        let fd = handle.descriptor().unwrap();
        handle.open().unwrap();

        assert_eq!(connector.open_count(), 1);
        assert_eq!(handle.descriptor(), Some(fd));
        assert_eq!(handle.state(), LinkState::Open);
    }

    #[test]
    fn test_failed_open_stays_uninitialized() {
        let connector = MockConnector::new();
        connector.fail_open(OpenStep::FilterInstall);
        let handle = handle(&connector);

        let err = handle.open().unwrap_err();
        assert_eq!(err.open_step(), Some(OpenStep::FilterInstall));
        assert_eq!(handle.state(), LinkState::Uninitialized);
        assert_eq!(connector.live_buses(), 0);

        // Next attempt retries the open
        handle.open().unwrap();
        assert_eq!(handle.state(), LinkState::Open);
    }

    #[test]
    fn test_fatal_read_marks_link_failed() {
        let connector = MockConnector::new();
        connector.push_fault(MockFault::Os(libc::ENETDOWN));
        let handle = handle(&connector);

        let mut guard = handle.lock();
        assert!(matches!(guard.read_frame(), Err(TransportError::Read(_))));
        assert_eq!(guard.state(), LinkState::Failed);
        assert!(matches!(
            guard.read_frame(),
            Err(TransportError::LinkDown(_))
        ));
        drop(guard);

        assert_eq!(connector.live_buses(), 0);
        assert_eq!(connector.open_count(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let connector = MockConnector::new();
        let handle = handle(&connector);
        handle.open().unwrap();

        handle.close();
        handle.close();
        assert_eq!(handle.state(), LinkState::Closed);
        assert_eq!(connector.live_buses(), 0);
        assert!(matches!(handle.open(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_socket_open_step() {
        assert_eq!(
            socket_open_step(&io::Error::from_raw_os_error(libc::EAFNOSUPPORT)),
            OpenStep::SocketCreation
        );
        assert_eq!(
            socket_open_step(&io::Error::from_raw_os_error(libc::EMFILE)),
            OpenStep::SocketCreation
        );
        assert_eq!(
            socket_open_step(&io::Error::from_raw_os_error(libc::ENODEV)),
            OpenStep::Bind
        );
        assert_eq!(
            socket_open_step(&io::Error::from_raw_os_error(libc::EADDRNOTAVAIL)),
            OpenStep::Bind
        );
    }
}
