//! Error handling for the CAN device service
//!
//! One `thiserror` enum per concern (address configuration, socket transport,
//! frame codec) composed into [`CanSrvError`]. Every error exposes a stable
//! code and category through [`ServiceErrorTrait`] so it can be reported to
//! the framework as an [`errors::ErrorInfo`].

use std::io;

use errors::{ErrorCategory, ServiceError, ServiceErrorTrait};
use thiserror::Error;

/// Device address (protocol property) errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The device has no `CAN` protocol section
    #[error("CAN field not present in device address")]
    MissingProtocol,

    /// A required property is absent
    #[error("{0} in device address missing")]
    MissingKey(String),

    /// A property is present but cannot be used
    #[error("{key} access error: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub fn missing(key: &str) -> Self {
        Self::MissingKey(key.to_string())
    }

    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Property name the error refers to, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::MissingProtocol => None,
            Self::MissingKey(key) | Self::InvalidValue { key, .. } => Some(key),
        }
    }
}

/// Step of the transport open sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStep {
    InterfaceResolution,
    SocketCreation,
    Bind,
    TimeoutConfig,
    FilterInstall,
}

/// Raw CAN socket errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("cannot resolve CAN interface {interface}: {source}")]
    InterfaceResolution {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot create CAN socket for {interface}: {source}")]
    SocketCreation {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot bind CAN socket to {interface}: {source}")]
    Bind {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot set socket timeouts on {interface}: {source}")]
    TimeoutConfig {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot install CAN filter on {interface}: {source}")]
    FilterInstall {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("CAN read timed out")]
    TimedOut,

    #[error("CAN read interrupted")]
    Interrupted,

    #[error("CAN read failed: {0}")]
    Read(#[source] io::Error),

    /// An error frame arrived; carries the error class bits
    #[error("CAN error frame received (class 0x{0:08X})")]
    ErrorFrame(u32),

    #[error("CAN frame write incomplete")]
    ShortWrite,

    #[error("CAN write timed out")]
    WriteTimedOut,

    #[error("CAN write failed: {0}")]
    Write(#[source] io::Error),

    /// The link failed earlier and has not been re-created
    #[error("CAN link down: {0}")]
    LinkDown(String),

    #[error("CAN transport closed")]
    Closed,
}

impl TransportError {
    /// Build the error for a failed open step
    pub fn open_failure(step: OpenStep, interface: &str, source: io::Error) -> Self {
        let interface = interface.to_string();
        match step {
            OpenStep::InterfaceResolution => Self::InterfaceResolution { interface, source },
            OpenStep::SocketCreation => Self::SocketCreation { interface, source },
            OpenStep::Bind => Self::Bind { interface, source },
            OpenStep::TimeoutConfig => Self::TimeoutConfig { interface, source },
            OpenStep::FilterInstall => Self::FilterInstall { interface, source },
        }
    }

    /// The open step this error came from, `None` for I/O errors
    pub fn open_step(&self) -> Option<OpenStep> {
        match self {
            Self::InterfaceResolution { .. } => Some(OpenStep::InterfaceResolution),
            Self::SocketCreation { .. } => Some(OpenStep::SocketCreation),
            Self::Bind { .. } => Some(OpenStep::Bind),
            Self::TimeoutConfig { .. } => Some(OpenStep::TimeoutConfig),
            Self::FilterInstall { .. } => Some(OpenStep::FilterInstall),
            _ => None,
        }
    }

    /// Classify an OS error returned by a frame read
    pub fn from_read_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::Interrupted => Self::Interrupted,
            _ if err.raw_os_error() == Some(libc::EINPROGRESS) => Self::TimedOut,
            _ => Self::Read(err),
        }
    }

    /// Classify an OS error returned by a frame write
    ///
    /// SocketCAN reports a short write without setting errno, which surfaces
    /// as OS error 0.
    pub fn from_write_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::WriteTimedOut,
            io::ErrorKind::WriteZero => Self::ShortWrite,
            _ if err.raw_os_error() == Some(0) => Self::ShortWrite,
            _ => Self::Write(err),
        }
    }

    /// The descriptor or interface is gone; the link cannot be used again
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Read(err) | Self::Write(err) => is_fatal_io(err),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut | Self::WriteTimedOut)
    }
}

fn is_fatal_io(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EBADF | libc::ENODEV | libc::ENETDOWN | libc::ENXIO)
    )
}

/// Frame codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("sequence truncated: expected {expected} elements, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid data length {0} (max 8)")]
    InvalidLength(u32),

    #[error("payload element {index} out of byte range: {value}")]
    ByteOutOfRange { index: usize, value: u32 },

    #[error("trailing data: expected {expected} elements, got {actual}")]
    TrailingData { expected: usize, actual: usize },
}

/// CAN device service error type
#[derive(Error, Debug)]
pub enum CanSrvError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Batch mismatch: {requests} requests but {values} values")]
    BatchMismatch { requests: usize, values: usize },

    #[error("Driver stopped")]
    Stopped,
}

/// Result type alias for the CAN device service
pub type Result<T> = std::result::Result<T, CanSrvError>;

// ============================================================================
// ServiceErrorTrait implementations
// ============================================================================

impl ServiceErrorTrait for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingProtocol => "CANSRV_PROTOCOL_MISSING",
            Self::MissingKey(_) => "CANSRV_ADDRESS_KEY_MISSING",
            Self::InvalidValue { .. } => "CANSRV_ADDRESS_INVALID",
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

impl ServiceErrorTrait for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InterfaceResolution { .. } => "CANSRV_INTERFACE_RESOLUTION",
            Self::SocketCreation { .. } => "CANSRV_SOCKET_CREATION",
            Self::Bind { .. } => "CANSRV_BIND",
            Self::TimeoutConfig { .. } => "CANSRV_TIMEOUT_CONFIG",
            Self::FilterInstall { .. } => "CANSRV_FILTER_INSTALL",
            Self::TimedOut => "CANSRV_READ_TIMEOUT",
            Self::Interrupted => "CANSRV_READ_INTERRUPTED",
            Self::Read(_) => "CANSRV_READ_ERROR",
            Self::ErrorFrame(_) => "CANSRV_ERROR_FRAME",
            Self::ShortWrite => "CANSRV_SHORT_WRITE",
            Self::WriteTimedOut => "CANSRV_WRITE_TIMEOUT",
            Self::Write(_) => "CANSRV_WRITE_ERROR",
            Self::LinkDown(_) => "CANSRV_LINK_DOWN",
            Self::Closed => "CANSRV_CLOSED",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InterfaceResolution { .. }
            | Self::SocketCreation { .. }
            | Self::Bind { .. }
            | Self::TimeoutConfig { .. }
            | Self::FilterInstall { .. } => ErrorCategory::Connection,
            Self::TimedOut | Self::WriteTimedOut => ErrorCategory::Timeout,
            Self::Interrupted | Self::Read(_) | Self::Write(_) | Self::ShortWrite => {
                ErrorCategory::Network
            },
            Self::ErrorFrame(_) => ErrorCategory::Protocol,
            Self::LinkDown(_) | Self::Closed => ErrorCategory::Unavailable,
        }
    }
}

impl ServiceErrorTrait for CodecError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Truncated { .. } => "CANSRV_CODEC_TRUNCATED",
            Self::InvalidLength(_) => "CANSRV_CODEC_INVALID_LENGTH",
            Self::ByteOutOfRange { .. } => "CANSRV_CODEC_BYTE_RANGE",
            Self::TrailingData { .. } => "CANSRV_CODEC_TRAILING_DATA",
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

impl ServiceErrorTrait for CanSrvError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Transport(e) => e.error_code(),
            Self::Codec(e) => e.error_code(),
            Self::DeviceNotFound(_) => "CANSRV_DEVICE_NOT_FOUND",
            Self::BatchMismatch { .. } => "CANSRV_BATCH_MISMATCH",
            Self::Stopped => "CANSRV_STOPPED",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Transport(e) => e.category(),
            Self::Codec(e) => e.category(),
            Self::DeviceNotFound(_) => ErrorCategory::NotFound,
            Self::BatchMismatch { .. } => ErrorCategory::Validation,
            Self::Stopped => ErrorCategory::Unavailable,
        }
    }
}

// ============================================================================
// Conversion from CanSrvError to ServiceError for the binary boundary
// ============================================================================

impl From<CanSrvError> for ServiceError {
    fn from(err: CanSrvError) -> Self {
        match err {
            CanSrvError::Config(ConfigError::MissingProtocol) => {
                ServiceError::MissingConfig("CAN protocol properties".to_string())
            },
            CanSrvError::Config(ConfigError::MissingKey(key)) => ServiceError::MissingConfig(key),
            CanSrvError::Config(ConfigError::InvalidValue { key, reason }) => {
                ServiceError::InvalidConfig { field: key, reason }
            },
            CanSrvError::Transport(e) if e.open_step().is_some() => {
                ServiceError::ConnectionFailed {
                    endpoint: "socketcan".to_string(),
                    reason: e.to_string(),
                }
            },
            CanSrvError::Transport(e) if e.is_timeout() => ServiceError::Timeout(e.to_string()),
            CanSrvError::Transport(e) => ServiceError::Communication(e.to_string()),
            CanSrvError::Codec(e) => ServiceError::Validation(e.to_string()),
            CanSrvError::DeviceNotFound(name) => ServiceError::NotFound {
                resource: format!("device {}", name),
            },
            e @ CanSrvError::BatchMismatch { .. } => ServiceError::Validation(e.to_string()),
            CanSrvError::Stopped => ServiceError::ShutdownError("driver stopped".to_string()),
        }
    }
}
