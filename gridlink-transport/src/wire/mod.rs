//! Wire format for frame serialization.
//!
//! Frame format: `[length:4][checksum:4][tag:1][flags:1][op_code:2][correlation:8][payload:N]`
//!
//! - **length**: Total frame size including header (little-endian u32)
//! - **checksum**: CRC32C of everything after the checksum field
//! - **tag**: [`FrameTag`] used by the read loop to demultiplex
//! - **flags**: bit set, see [`FLAG_ERROR`]
//! - **op_code**: operation id (little-endian u16)
//! - **correlation**: request/response correlation id (little-endian u64)
//! - **payload**: codec-encoded body

use gridlink_core::CorrelationId;

/// Header size: 4 (length) + 4 (checksum) + 1 (tag) + 1 (flags) + 2 (op) + 8 (correlation).
pub const HEADER_SIZE: usize = 20;

/// Maximum payload size (16 MiB).
///
/// Frames larger than this are rejected on both encode and decode.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Response flag: the payload carries a remote error instead of a result.
pub const FLAG_ERROR: u8 = 0x01;

/// Offset where checksummed bytes start.
const CHECKSUM_START: usize = 8;

/// Wire format error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Not enough data to parse the frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required to parse.
        needed: usize,
        /// Actual bytes available.
        have: usize,
    },

    /// Checksum verification failed - data was corrupted.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum from header.
        expected: u32,
        /// Computed checksum from data.
        actual: u32,
    },

    /// Payload exceeds maximum allowed size.
    #[error("frame too large: {size} bytes (max {MAX_PAYLOAD_SIZE})")]
    FrameTooLarge {
        /// Payload size in bytes.
        size: usize,
    },

    /// Length field has an invalid value.
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The invalid length value from the header.
        length: u32,
    },

    /// Tag byte does not name a known frame kind.
    #[error("unknown frame tag: {tag}")]
    UnknownTag {
        /// The raw tag byte.
        tag: u8,
    },
}

/// Kind of frame, used by the read loop to pick a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameTag {
    /// Client to member request.
    Request = 1,
    /// Member to client response, matched by correlation id.
    Response = 2,
    /// Server-pushed listener event.
    Event = 3,
    /// Server-pushed member list or partition table.
    MembershipUpdate = 4,
}

impl TryFrom<u8> for FrameTag {
    type Error = WireError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(FrameTag::Request),
            2 => Ok(FrameTag::Response),
            3 => Ok(FrameTag::Event),
            4 => Ok(FrameTag::MembershipUpdate),
            other => Err(WireError::UnknownTag { tag: other }),
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame kind.
    pub tag: FrameTag,
    /// Flag bits.
    pub flags: u8,
    /// Operation id.
    pub op_code: u16,
    /// Correlation id (zero for pushed frames).
    pub correlation_id: CorrelationId,
    /// Encoded body.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a request frame.
    pub fn request(op_code: u16, correlation_id: CorrelationId, payload: Vec<u8>) -> Self {
        Self {
            tag: FrameTag::Request,
            flags: 0,
            op_code,
            correlation_id,
            payload,
        }
    }

    /// Build a successful response frame.
    pub fn response(op_code: u16, correlation_id: CorrelationId, payload: Vec<u8>) -> Self {
        Self {
            tag: FrameTag::Response,
            flags: 0,
            op_code,
            correlation_id,
            payload,
        }
    }

    /// Build an error response frame carrying an encoded remote error.
    pub fn error_response(op_code: u16, correlation_id: CorrelationId, payload: Vec<u8>) -> Self {
        Self {
            flags: FLAG_ERROR,
            ..Self::response(op_code, correlation_id, payload)
        }
    }

    /// Build a pushed frame (event or membership update).
    pub fn pushed(tag: FrameTag, payload: Vec<u8>) -> Self {
        Self {
            tag,
            flags: 0,
            op_code: 0,
            correlation_id: CorrelationId::default(),
            payload,
        }
    }

    /// Whether the error flag is set.
    pub fn is_error(&self) -> bool {
        self.flags & FLAG_ERROR != 0
    }
}

/// Serialize a frame.
///
/// # Errors
///
/// Returns `FrameTooLarge` if the payload exceeds [`MAX_PAYLOAD_SIZE`].
///
/// # Examples
///
/// ```
/// use gridlink_core::CorrelationId;
/// use gridlink_transport::wire::{decode_frame, encode_frame, Frame};
///
/// let frame = Frame::request(0x0601, CorrelationId::new(7), b"{}".to_vec());
/// let bytes = encode_frame(&frame).expect("encode");
/// assert_eq!(decode_frame(&bytes).expect("decode"), frame);
/// ```
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, WireError> {
    if frame.payload.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::FrameTooLarge {
            size: frame.payload.len(),
        });
    }

    let total_length = HEADER_SIZE + frame.payload.len();
    let mut data = Vec::with_capacity(total_length);
    data.extend_from_slice(&(total_length as u32).to_le_bytes());
    data.extend_from_slice(&[0u8; 4]);
    data.push(frame.tag as u8);
    data.push(frame.flags);
    data.extend_from_slice(&frame.op_code.to_le_bytes());
    data.extend_from_slice(&frame.correlation_id.value().to_le_bytes());
    data.extend_from_slice(&frame.payload);

    let checksum = crc32c::crc32c(&data[CHECKSUM_START..]);
    data[4..8].copy_from_slice(&checksum.to_le_bytes());

    Ok(data)
}

/// Deserialize exactly one complete frame.
///
/// # Errors
///
/// - `InsufficientData`: Not enough bytes for header or full frame
/// - `InvalidLength` / `FrameTooLarge`: Length field is malformed
/// - `ChecksumMismatch`: Data was corrupted
/// - `UnknownTag`: Tag byte is not a [`FrameTag`]
pub fn decode_frame(data: &[u8]) -> Result<Frame, WireError> {
    match try_decode_frame(data)? {
        Some((frame, _)) => Ok(frame),
        None => Err(WireError::InsufficientData {
            needed: frame_length(data).unwrap_or(HEADER_SIZE),
            have: data.len(),
        }),
    }
}

/// Try to decode a frame from a buffer that may hold partial data.
///
/// # Returns
///
/// - `Ok(Some((frame, consumed)))` if a complete frame was parsed
/// - `Ok(None)` if more data is needed
/// - `Err` if data is malformed
pub fn try_decode_frame(data: &[u8]) -> Result<Option<(Frame, usize)>, WireError> {
    if data.len() < HEADER_SIZE {
        return Ok(None);
    }

    let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if (length as usize) < HEADER_SIZE {
        return Err(WireError::InvalidLength { length });
    }
    let expected_len = length as usize;
    if expected_len - HEADER_SIZE > MAX_PAYLOAD_SIZE {
        return Err(WireError::FrameTooLarge {
            size: expected_len - HEADER_SIZE,
        });
    }
    if data.len() < expected_len {
        return Ok(None);
    }

    let expected = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let actual = crc32c::crc32c(&data[CHECKSUM_START..expected_len]);
    if expected != actual {
        return Err(WireError::ChecksumMismatch { expected, actual });
    }

    let tag = FrameTag::try_from(data[8])?;
    let flags = data[9];
    let op_code = u16::from_le_bytes([data[10], data[11]]);
    let mut correlation = [0u8; 8];
    correlation.copy_from_slice(&data[12..20]);

    let frame = Frame {
        tag,
        flags,
        op_code,
        correlation_id: CorrelationId::new(u64::from_le_bytes(correlation)),
        payload: data[HEADER_SIZE..expected_len].to_vec(),
    };
    Ok(Some((frame, expected_len)))
}

fn frame_length(data: &[u8]) -> Option<usize> {
    let bytes = data.get(0..4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
}
