//! Frame codec
//!
//! Converts between a [`Frame`] and the flat `u32` sequence used at the
//! command boundary: `[identifier, data_length, byte0, byte1, ...]`.

use crate::error::CodecError;
use crate::frame::{Frame, MAX_DATA_LENGTH};

/// Number of header elements before the payload
const HEADER_LEN: usize = 2;

/// How strictly PUT values are validated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Truncate payload values to their low byte, ignore trailing elements
    #[default]
    Lenient,
    /// Reject payload values above 255 and trailing elements
    Strict,
}

impl DecodeMode {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::Lenient
        }
    }

    pub fn decode(self, seq: &[u32]) -> Result<Frame, CodecError> {
        match self {
            Self::Lenient => decode(seq),
            Self::Strict => decode_strict(seq),
        }
    }
}

/// Encode a frame as `[identifier, data_length, data...]`
///
/// The result always has `data_length + 2` elements.
pub fn encode(frame: &Frame) -> Vec<u32> {
    let mut seq = Vec::with_capacity(HEADER_LEN + usize::from(frame.data_length()));
    seq.push(frame.identifier());
    seq.push(u32::from(frame.data_length()));
    seq.extend(frame.data().iter().map(|&b| u32::from(b)));
    seq
}

/// Decode a sequence leniently
///
/// Payload values above 255 keep their low eight bits and elements past the
/// announced length are ignored.
pub fn decode(seq: &[u32]) -> Result<Frame, CodecError> {
    let (identifier, len) = header(seq)?;
    let mut payload = [0u8; MAX_DATA_LENGTH];
    for (slot, &value) in payload.iter_mut().zip(&seq[HEADER_LEN..HEADER_LEN + len]) {
        *slot = (value & 0xFF) as u8;
    }
    Frame::from_parts(identifier, len as u8, payload)
}

/// Decode a sequence, rejecting anything [`decode`] would silently fix up
pub fn decode_strict(seq: &[u32]) -> Result<Frame, CodecError> {
    let (identifier, len) = header(seq)?;
    let expected = HEADER_LEN + len;
    if seq.len() > expected {
        return Err(CodecError::TrailingData {
            expected,
            actual: seq.len(),
        });
    }

    let mut payload = [0u8; MAX_DATA_LENGTH];
    for (index, (slot, &value)) in payload
        .iter_mut()
        .zip(&seq[HEADER_LEN..expected])
        .enumerate()
    {
        *slot = u8::try_from(value).map_err(|_| CodecError::ByteOutOfRange {
            index: HEADER_LEN + index,
            value,
        })?;
    }
    Frame::from_parts(identifier, len as u8, payload)
}

/// Validate the header and announced length, returning `(identifier, len)`
fn header(seq: &[u32]) -> Result<(u32, usize), CodecError> {
    if seq.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            actual: seq.len(),
        });
    }

    let announced = seq[1];
    if announced as usize > MAX_DATA_LENGTH {
        return Err(CodecError::InvalidLength(announced));
    }

    let len = announced as usize;
    if seq.len() < HEADER_LEN + len {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN + len,
            actual: seq.len(),
        });
    }

    Ok((seq[0], len))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = Frame::new(0x123, &[1, 2, 3]).unwrap();
        let seq = encode(&frame);
        assert_eq!(seq, vec![0x123, 3, 1, 2, 3]);
        assert_eq!(seq.len(), usize::from(frame.data_length()) + 2);

        let empty = Frame::new(0x7FF, &[]).unwrap();
        assert_eq!(encode(&empty), vec![0x7FF, 0]);
    }

    #[test]
    fn test_round_trip() {
        for len in 0..=MAX_DATA_LENGTH {
            let data: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37)).collect();
            let frame = Frame::new(0x1ABC_DEF0 & 0x1FFF_FFFF, &data).unwrap();
            assert_eq!(decode(&encode(&frame)).unwrap(), frame);
            assert_eq!(decode_strict(&encode(&frame)).unwrap(), frame);
        }
    }

    #[test]
    fn test_decode_zero_fills_payload() {
        let frame = decode(&[0x456, 2, 0xAA, 0xBB]).unwrap();
        assert_eq!(frame.identifier(), 0x456);
        assert_eq!(frame.data_length(), 2);
        assert_eq!(frame.payload(), &[0xAA, 0xBB, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(
            decode(&[]),
            Err(CodecError::Truncated {
                expected: 2,
                actual: 0
            })
        );
        assert_eq!(
            decode(&[0x100]),
            Err(CodecError::Truncated {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            decode(&[0x100, 4, 1, 2]),
            Err(CodecError::Truncated {
                expected: 6,
                actual: 4
            })
        );
    }

    #[test]
    fn test_decode_invalid_length() {
        assert_eq!(decode(&[0x100, 9]), Err(CodecError::InvalidLength(9)));
        assert_eq!(
            decode(&[0x100, u32::MAX, 1, 2]),
            Err(CodecError::InvalidLength(u32::MAX))
        );
        assert_eq!(decode_strict(&[0x100, 12]), Err(CodecError::InvalidLength(12)));
    }

    #[test]
    fn test_lenient_truncates_and_ignores_trailing() {
        let frame = decode(&[0x10, 2, 0x1FF, 0x02, 99, 100]).unwrap();
        assert_eq!(frame.data(), &[0xFF, 0x02]);
    }

    #[test]
    fn test_strict_rejects() {
        assert_eq!(
            decode_strict(&[0x10, 2, 0x1FF, 0x02]),
            Err(CodecError::ByteOutOfRange {
                index: 2,
                value: 0x1FF
            })
        );
        assert_eq!(
            decode_strict(&[0x10, 1, 0x01, 0x02]),
            Err(CodecError::TrailingData {
                expected: 3,
                actual: 4
            })
        );
    }

    #[test]
    fn test_decode_keeps_remote_request_standard() {
        let frame = decode(&[0x4000_0123, 0]).unwrap();
        assert!(frame.is_remote());
        assert!(!frame.is_extended());
        assert_eq!(frame.raw_id(), 0x123);
        assert_eq!(encode(&frame), vec![0x4000_0123, 0]);
    }

    #[test]
    fn test_decode_mode_selection() {
        let seq = [0x10, 1, 0x100];
        assert!(DecodeMode::from_strict(false).decode(&seq).is_ok());
        assert!(DecodeMode::from_strict(true).decode(&seq).is_err());
        assert_eq!(DecodeMode::default(), DecodeMode::Lenient);
    }
}
