//! SocketCAN Device Service (`cansrv`)
//!
//! Bridges a raw CAN interface to a device-management framework that issues
//! GET and PUT commands. Frames cross the command boundary as
//! `[identifier, data_length, byte0, byte1, ...]`.
//!
//! # Architecture
//!
//! - `transport` - raw socket lifecycle and per-device locking
//! - `codec` / `frame` - frame model and `u32` sequence marshalling
//! - `handlers` - GET/PUT batches over one device transport
//! - `driver` - device registry and the framework-facing [`DeviceDriver`] trait
//! - `config` / `bootstrap` - configuration file, address parsing, startup

pub mod bootstrap;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod handlers;
pub mod test_utils;
pub mod transport;

pub use codec::{decode, decode_strict, encode, DecodeMode};
pub use config::{DriverConfig, FilterSpec, ProtocolMap, ServiceConfig};
pub use driver::{CanDriver, DeviceDriver};
pub use error::{CanSrvError, CodecError, ConfigError, TransportError};
pub use frame::Frame;
pub use handlers::{CommandRequest, GetOutcome, PutOutcome};
pub use transport::{BusConnector, CanBus, LinkState, TransportHandle};

#[cfg(target_os = "linux")]
pub use transport::socketcan::SocketCanConnector;
