//! GET and PUT command handlers
//!
//! Each handler holds the device lock for the whole batch so frames of two
//! batches never interleave on the socket. Failures are reported per resource
//! in the outcome's [`ErrorInfo`]; nothing is retried here.

use std::fmt;

use errors::{ErrorInfo, ServiceErrorTrait};
use tracing::{debug, error, info, warn, Level};

use crate::codec::{self, DecodeMode};
use crate::error::CanSrvError;
use crate::transport::{BusConnector, TransportHandle};

/// One resource named by a command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandRequest {
    pub resource: String,
}

impl CommandRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
        }
    }
}

/// Result of a GET batch: one slot per request, `None` where the read failed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOutcome {
    pub readings: Vec<Option<Vec<u32>>>,
    pub exception: Option<ErrorInfo>,
}

impl GetOutcome {
    pub fn success(&self) -> bool {
        self.exception.is_none() && self.readings.iter().all(Option::is_some)
    }

    /// Outcome where no request was attempted
    pub fn failed(requests: usize, err: &impl ServiceErrorTrait) -> Self {
        Self {
            readings: vec![None; requests],
            exception: Some(err.to_error_info()),
        }
    }
}

/// Result of a PUT batch: how many values reached the bus, in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutOutcome {
    pub requested: usize,
    pub written: usize,
    pub exception: Option<ErrorInfo>,
}

impl PutOutcome {
    pub fn success(&self) -> bool {
        self.exception.is_none() && self.written == self.requested
    }

    /// Outcome where nothing was written
    pub fn failed(requested: usize, err: &impl ServiceErrorTrait) -> Self {
        Self {
            requested,
            written: 0,
            exception: Some(err.to_error_info()),
        }
    }
}

/// Log a command failure at the level its category calls for
fn log_failure(err: &impl ServiceErrorTrait, message: fmt::Arguments<'_>) {
    let level = err.log_level();
    if level == Level::ERROR {
        error!("{}", message);
    } else if level == Level::WARN {
        warn!("{}", message);
    } else if level == Level::INFO {
        info!("{}", message);
    } else {
        debug!("{}", message);
    }
}

/// Attach a per-resource failure, creating the exception on first use
///
/// The first failure decides the exception's code, details and retry hint.
fn record_failure(
    exception: &mut Option<ErrorInfo>,
    verb: &str,
    device: &str,
    resource: &str,
    err: &impl ServiceErrorTrait,
) {
    exception
        .get_or_insert_with(|| {
            ErrorInfo::new(format!("{} failed on device {}", verb, device))
                .with_code(err.category().status_code())
                .with_details(err.error_code())
                .with_retryable(err.is_retryable())
        })
        .push_field_error(resource, err.to_string());
}

/// Read one frame per request
///
/// A failed read leaves its slot empty and the batch carries on, unless the
/// link itself failed.
pub fn handle_get<C: BusConnector>(
    handle: &TransportHandle<C>,
    requests: &[CommandRequest],
) -> GetOutcome {
    let device = handle.device();
    let mut guard = handle.lock();

    if let Err(e) = guard.ensure_open() {
        log_failure(
            &e,
            format_args!("Device {}: GET failed to open transport: {}", device, e),
        );
        return GetOutcome::failed(requests.len(), &e);
    }

    let mut outcome = GetOutcome {
        readings: vec![None; requests.len()],
        exception: None,
    };

    for (slot, request) in outcome.readings.iter_mut().zip(requests) {
        match guard.read_frame() {
            Ok(frame) => {
                *slot = Some(codec::encode(&frame));
            },
            Err(e) => {
                log_failure(
                    &e,
                    format_args!("Device {}: GET {} failed: {}", device, request.resource, e),
                );
                let fatal = e.is_fatal();
                record_failure(&mut outcome.exception, "GET", device, &request.resource, &e);
                if fatal {
                    error!("Device {}: link lost, aborting GET batch", device);
                    break;
                }
            },
        }
    }

    debug!(
        "Device {}: GET {} of {} readings",
        device,
        outcome.readings.iter().filter(|r| r.is_some()).count(),
        requests.len()
    );
    outcome
}

/// Decode and write one frame per value, stopping at the first failure
///
/// Frames written before the failure stay written.
pub fn handle_put<C: BusConnector>(
    handle: &TransportHandle<C>,
    requests: &[CommandRequest],
    values: &[Vec<u32>],
    mode: DecodeMode,
) -> PutOutcome {
    let device = handle.device();

    if requests.len() != values.len() {
        let err = CanSrvError::BatchMismatch {
            requests: requests.len(),
            values: values.len(),
        };
        log_failure(&err, format_args!("Device {}: PUT rejected: {}", device, err));
        return PutOutcome::failed(values.len(), &err);
    }

    let mut guard = handle.lock();
    if let Err(e) = guard.ensure_open() {
        log_failure(
            &e,
            format_args!("Device {}: PUT failed to open transport: {}", device, e),
        );
        return PutOutcome::failed(values.len(), &e);
    }

    let mut outcome = PutOutcome {
        requested: values.len(),
        written: 0,
        exception: None,
    };

    for (request, value) in requests.iter().zip(values) {
        let result = mode
            .decode(value)
            .map_err(CanSrvError::from)
            .and_then(|frame| guard.write_frame(&frame).map_err(CanSrvError::from));

        if let Err(e) = result {
            log_failure(
                &e,
                format_args!(
                    "Device {}: PUT {} failed after {} frame(s): {}",
                    device, request.resource, outcome.written, e
                ),
            );
            record_failure(&mut outcome.exception, "PUT", device, &request.resource, &e);
            break;
        }
        outcome.written += 1;
    }

    outcome
}
