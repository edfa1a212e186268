//! CAN 2.0 frame
//!
//! A classic frame carries at most eight data bytes. Bytes past the data
//! length are always zero so two frames with the same meaningful content
//! compare equal.
//!
//! The identifier is a SocketCAN identifier word: the low 29 bits hold the
//! id and the top three bits flag extended (`EFF`), remote request (`RTR`)
//! and error (`ERR`) frames.

use crate::error::CodecError;

/// Maximum data bytes in a classic CAN frame
pub const MAX_DATA_LENGTH: usize = 8;

/// Largest 11-bit standard identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Extended frame flag in a SocketCAN identifier word
pub const EFF_FLAG: u32 = 0x8000_0000;

/// Remote transmission request flag
pub const RTR_FLAG: u32 = 0x4000_0000;

/// Error frame flag
pub const ERR_FLAG: u32 = 0x2000_0000;

/// 29-bit extended identifier mask
pub const EFF_MASK: u32 = 0x1FFF_FFFF;

/// One CAN message on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    identifier: u32,
    data_length: u8,
    payload: [u8; MAX_DATA_LENGTH],
}

impl Frame {
    /// Create a frame from an identifier and up to eight data bytes
    ///
    /// A remote request keeps the data length but never carries data.
    pub fn new(identifier: u32, data: &[u8]) -> Result<Self, CodecError> {
        if data.len() > MAX_DATA_LENGTH {
            return Err(CodecError::InvalidLength(data.len() as u32));
        }

        let mut payload = [0u8; MAX_DATA_LENGTH];
        if identifier & RTR_FLAG == 0 {
            payload[..data.len()].copy_from_slice(data);
        }
        Ok(Self {
            identifier,
            data_length: data.len() as u8,
            payload,
        })
    }

    /// Create a frame from a raw payload buffer
    ///
    /// Bytes past `data_length` are discarded.
    pub fn from_parts(
        identifier: u32,
        data_length: u8,
        payload: [u8; MAX_DATA_LENGTH],
    ) -> Result<Self, CodecError> {
        let len = usize::from(data_length);
        if len > MAX_DATA_LENGTH {
            return Err(CodecError::InvalidLength(u32::from(data_length)));
        }
        Self::new(identifier, &payload[..len])
    }

    /// A remote request announcing `data_length` bytes; sets `RTR_FLAG`
    pub fn remote(identifier: u32, data_length: u8) -> Result<Self, CodecError> {
        Self::from_parts(identifier | RTR_FLAG, data_length, [0u8; MAX_DATA_LENGTH])
    }

    pub fn identifier(&self) -> u32 {
        self.identifier
    }

    pub fn data_length(&self) -> u8 {
        self.data_length
    }

    /// The meaningful data bytes
    pub fn data(&self) -> &[u8] {
        &self.payload[..usize::from(self.data_length)]
    }

    /// Full payload buffer, zero-filled past the data length
    pub fn payload(&self) -> &[u8; MAX_DATA_LENGTH] {
        &self.payload
    }

    /// Whether the identifier needs a 29-bit extended frame on the wire
    pub fn is_extended(&self) -> bool {
        self.identifier & EFF_FLAG != 0 || self.raw_id() > MAX_STANDARD_ID
    }

    pub fn is_remote(&self) -> bool {
        self.identifier & RTR_FLAG != 0
    }

    pub fn is_error(&self) -> bool {
        self.identifier & ERR_FLAG != 0
    }

    /// Identifier with SocketCAN flag bits stripped
    pub fn raw_id(&self) -> u32 {
        self.identifier & EFF_MASK
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_new_zero_fills() {
        let frame = Frame::new(0x456, &[0xAA, 0xBB]).unwrap();
        assert_eq!(frame.data_length(), 2);
        assert_eq!(frame.data(), &[0xAA, 0xBB]);
        assert_eq!(frame.payload(), &[0xAA, 0xBB, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_too_much_data() {
        let err = Frame::new(0x1, &[0; 9]).unwrap_err();
        assert_eq!(err, CodecError::InvalidLength(9));
        assert!(Frame::from_parts(0x1, 9, [0; 8]).is_err());
    }

    #[test]
    fn test_from_parts_discards_tail() {
        let a = Frame::from_parts(0x10, 2, [1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let b = Frame::new(0x10, &[1, 2]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_remote_frame_has_zero_payload() {
        let frame = Frame::remote(0x7DF, 8).unwrap();
        assert_eq!(frame.identifier(), RTR_FLAG | 0x7DF);
        assert_eq!(frame.data_length(), 8);
        assert_eq!(frame.data(), &[0u8; 8]);
        assert!(frame.is_remote());
        assert!(!frame.is_extended());

        // Data handed to a remote request is dropped
        let frame = Frame::new(RTR_FLAG | 0x7DF, &[1, 2]).unwrap();
        assert_eq!(frame, Frame::remote(0x7DF, 2).unwrap());
    }

    #[test]
    fn test_extended_detection() {
        assert!(!Frame::new(0x7FF, &[]).unwrap().is_extended());
        assert!(Frame::new(0x800, &[]).unwrap().is_extended());

        let flagged = Frame::new(EFF_FLAG | 0x100, &[]).unwrap();
        assert!(flagged.is_extended());
        assert_eq!(flagged.raw_id(), 0x100);
    }

    #[test]
    fn test_flag_bits_do_not_imply_extended() {
        let remote = Frame::new(RTR_FLAG | 0x123, &[]).unwrap();
        assert!(!remote.is_extended());
        assert_eq!(remote.raw_id(), 0x123);

        let error = Frame::new(ERR_FLAG | 0x4, &[]).unwrap();
        assert!(error.is_error());
        assert!(!error.is_extended());

        let extended_remote = Frame::new(EFF_FLAG | RTR_FLAG | 0x1234_5678, &[]).unwrap();
        assert!(extended_remote.is_extended());
        assert!(extended_remote.is_remote());
        assert_eq!(extended_remote.raw_id(), 0x1234_5678);
    }
}
