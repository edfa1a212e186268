//! SocketCAN implementation of the transport traits
//!
//! Opens a raw `CAN_RAW` socket bound to the configured interface with a
//! single id/mask filter and symmetric read/write timeouts.

use std::io;
use std::os::fd::AsRawFd;

use ::socketcan::{
    CanAddr, CanFilter, CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame as SocketCanFrame,
    Id, Socket, SocketOptions, StandardId,
};
use tracing::debug;

use super::{socket_open_step, BusConnector, CanBus};
use crate::config::FilterSpec;
use crate::error::{OpenStep, TransportError};
use crate::frame::{Frame, EFF_FLAG, EFF_MASK};

/// Opens real SocketCAN buses
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketCanConnector;

impl BusConnector for SocketCanConnector {
    type Bus = SocketCanBus;

    fn open(&self, spec: &FilterSpec) -> Result<SocketCanBus, TransportError> {
        let interface = spec.interface_name.as_str();
        let fail = |step: OpenStep| {
            move |e: io::Error| TransportError::open_failure(step, interface, e)
        };

        let addr = CanAddr::from_iface(interface).map_err(fail(OpenStep::InterfaceResolution))?;

        // socket(2) and bind(2) happen in one call; the errno tells them apart
        let socket = CanSocket::open_addr(&addr).map_err(|e| {
            let step = socket_open_step(&e);
            TransportError::open_failure(step, interface, e)
        })?;

        // From here on an early return drops (and closes) the socket
        socket
            .set_read_timeout(spec.receive_timeout)
            .map_err(fail(OpenStep::TimeoutConfig))?;
        socket
            .set_write_timeout(spec.receive_timeout)
            .map_err(fail(OpenStep::TimeoutConfig))?;
        socket
            .set_filters(&[CanFilter::new(spec.match_id, spec.match_mask)])
            .map_err(fail(OpenStep::FilterInstall))?;

        debug!(
            "SocketCAN {} bound, fd {}",
            interface,
            socket.as_raw_fd()
        );
        Ok(SocketCanBus { socket })
    }
}

/// An open, bound and filtered SocketCAN socket
#[derive(Debug)]
pub struct SocketCanBus {
    socket: CanSocket,
}

impl CanBus for SocketCanBus {
    fn read_frame(&mut self) -> Result<Frame, TransportError> {
        let frame = self
            .socket
            .read_frame()
            .map_err(TransportError::from_read_io)?;
        from_socketcan(frame)
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let frame = to_socketcan(frame)?;
        self.socket
            .write_frame(&frame)
            .map_err(TransportError::from_write_io)
    }

    fn descriptor(&self) -> i32 {
        self.socket.as_raw_fd()
    }
}

/// Identifier as reported to the framework: extended ids keep the EFF flag
///
/// `Frame::remote` adds the RTR flag for remote requests.
fn identifier<F: SocketCanFrame>(frame: &F) -> u32 {
    let raw = frame.raw_id();
    if EmbeddedFrame::is_extended(frame) {
        raw | EFF_FLAG
    } else {
        raw
    }
}

fn from_socketcan(frame: CanFrame) -> Result<Frame, TransportError> {
    let converted = match frame {
        CanFrame::Data(data) => Frame::new(identifier(&data), EmbeddedFrame::data(&data)),
        CanFrame::Remote(remote) => {
            Frame::remote(identifier(&remote), EmbeddedFrame::dlc(&remote) as u8)
        },
        CanFrame::Error(error) => {
            return Err(TransportError::ErrorFrame(error.id_word() & EFF_MASK));
        },
    };
    converted.map_err(|e| TransportError::Read(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn to_socketcan(frame: &Frame) -> Result<CanFrame, TransportError> {
    let invalid = |reason: &str| {
        TransportError::Write(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} (id 0x{:X})", reason, frame.identifier()),
        ))
    };

    if frame.is_error() {
        return Err(invalid("error frames cannot be sent"));
    }

    let id = if frame.is_extended() {
        ExtendedId::new(frame.raw_id()).map(Id::Extended)
    } else {
        StandardId::new(frame.raw_id() as u16).map(Id::Standard)
    };

    let built = if frame.is_remote() {
        id.and_then(|id| CanFrame::new_remote(id, usize::from(frame.data_length())))
    } else {
        id.and_then(|id| CanFrame::new(id, frame.data()))
    };
    built.ok_or_else(|| invalid("cannot build CAN frame"))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::frame::{ERR_FLAG, RTR_FLAG};

    #[test]
    fn test_standard_frame_conversion() {
        let frame = Frame::new(0x123, &[1, 2, 3]).unwrap();
        let wire = to_socketcan(&frame).unwrap();
        assert!(!EmbeddedFrame::is_extended(&wire));
        assert_eq!(SocketCanFrame::raw_id(&wire), 0x123);
        assert_eq!(EmbeddedFrame::data(&wire), &[1, 2, 3]);

        assert_eq!(from_socketcan(wire).unwrap(), frame);
    }

    #[test]
    fn test_extended_frame_conversion() {
        let frame = Frame::new(0x18FF_50E5, &[0xAA]).unwrap();
        let wire = to_socketcan(&frame).unwrap();
        assert!(EmbeddedFrame::is_extended(&wire));
        assert_eq!(SocketCanFrame::raw_id(&wire), 0x18FF_50E5);

        let back = from_socketcan(wire).unwrap();
        assert_eq!(back.identifier(), 0x18FF_50E5 | EFF_FLAG);
        assert_eq!(back.raw_id(), 0x18FF_50E5);
        assert_eq!(back.data(), &[0xAA]);
    }

    #[test]
    fn test_remote_frame_reads_as_zero_payload() {
        let wire = CanFrame::new_remote(StandardId::new(0x7DF).unwrap(), 4).unwrap();
        let frame = from_socketcan(wire).unwrap();
        assert_eq!(frame.identifier(), RTR_FLAG | 0x7DF);
        assert!(frame.is_remote());
        assert_eq!(frame.data_length(), 4);
        assert_eq!(frame.data(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_remote_frame_writes_as_remote() {
        let frame = Frame::remote(0x123, 2).unwrap();
        let wire = to_socketcan(&frame).unwrap();
        assert!(EmbeddedFrame::is_remote_frame(&wire));
        assert!(!EmbeddedFrame::is_extended(&wire));
        assert_eq!(SocketCanFrame::raw_id(&wire), 0x123);
        assert_eq!(EmbeddedFrame::dlc(&wire), 2);

        let extended = Frame::remote(EFF_FLAG | 0x18DA_F110, 0).unwrap();
        let wire = to_socketcan(&extended).unwrap();
        assert!(EmbeddedFrame::is_remote_frame(&wire));
        assert!(EmbeddedFrame::is_extended(&wire));
        assert_eq!(from_socketcan(wire).unwrap(), extended);
    }

    #[test]
    fn test_error_flag_is_not_writable() {
        let frame = Frame::new(ERR_FLAG | 0x4, &[]).unwrap();
        assert!(matches!(to_socketcan(&frame), Err(TransportError::Write(_))));
    }

    #[test]
    fn test_unknown_interface_fails_resolution() {
        let spec = FilterSpec::new("nocan9", 0, 0, 1).unwrap();
        let err = SocketCanConnector.open(&spec).unwrap_err();
        assert_eq!(err.open_step(), Some(OpenStep::InterfaceResolution));
    }

    /// Needs a virtual CAN interface:
    /// `ip link add dev vcan0 type vcan && ip link set up vcan0`
    #[test]
    #[ignore]
    fn test_vcan_loopback() {
        let spec = FilterSpec::new("vcan0", 0, 0, 1).unwrap();
        let mut writer = SocketCanConnector.open(&spec).unwrap();
        let mut reader = SocketCanConnector.open(&spec).unwrap();
        assert_ne!(writer.descriptor(), reader.descriptor());

        let frame = Frame::new(0x456, &[0xAA, 0xBB]).unwrap();
        writer.write_frame(&frame).unwrap();
        assert_eq!(reader.read_frame().unwrap(), frame);

        // Nothing else is queued, so the next read runs into the timeout
        assert!(matches!(reader.read_frame(), Err(TransportError::TimedOut)));
    }
}
