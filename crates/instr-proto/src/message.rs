//! Frame layout, checksum, and message/reply types.
//!
//! One frame is `[kind, address, length, payload…, checksum]`. The checksum
//! is the wrapping byte sum of every byte before it, so a single flipped bit
//! anywhere in the frame is detected. A buffer shorter than the declared
//! total is "no message yet"; everything else that fails validation is a
//! malformed message.

use instr_common::{DeviceError, DeviceResult};

use crate::bounded::BoundedBytes;

/// Maximum payload size in bytes (the widest register: device name).
pub const MAX_PAYLOAD_LEN: usize = 25;

/// Maximum total frame size in bytes.
pub const MAX_FRAME_LEN: usize = 64;

/// Fixed header size: kind, address, length.
pub const HEADER_LEN: usize = 3;

/// Bit set in the kind byte of error replies.
pub const ERROR_BIT: u8 = 0x08;

/// Payload container sized for the widest register.
pub type Payload = BoundedBytes<MAX_PAYLOAD_LEN>;

/// Encoded-frame container.
pub type FrameBuf = BoundedBytes<MAX_FRAME_LEN>;

/// Operation kinds carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Read a register's current value.
    Read = 0x01,
    /// Write a register's value.
    Write = 0x02,
}

impl MessageKind {
    /// Parse a kind from a wire byte, ignoring the error bit.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte & !ERROR_BIT {
            0x01 => Some(Self::Read),
            0x02 => Some(Self::Write),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "READ"),
            Self::Write => write!(f, "WRITE"),
        }
    }
}

/// Error codes carried in the payload of error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Length or checksum validation failed.
    MalformedMessage = 0x01,
    /// Register address outside the valid range.
    UnknownRegister = 0x02,
    /// Write attempted on a read-only register.
    ReadOnlyViolation = 0x03,
    /// Peripheral operation failed.
    HardwareFault = 0x04,
}

impl ErrorCode {
    /// Parse an error code from a wire byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::MalformedMessage),
            0x02 => Some(Self::UnknownRegister),
            0x03 => Some(Self::ReadOnlyViolation),
            0x04 => Some(Self::HardwareFault),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedMessage => write!(f, "Malformed Message"),
            Self::UnknownRegister => write!(f, "Unknown Register"),
            Self::ReadOnlyViolation => write!(f, "Read-Only Violation"),
            Self::HardwareFault => write!(f, "Hardware Fault"),
        }
    }
}

impl From<&DeviceError> for ErrorCode {
    fn from(err: &DeviceError) -> Self {
        match err {
            DeviceError::UnknownRegister { .. } => Self::UnknownRegister,
            DeviceError::ReadOnlyViolation(_) => Self::ReadOnlyViolation,
            DeviceError::HardwareFault(_) => Self::HardwareFault,
            DeviceError::MalformedMessage(_) | DeviceError::Config(_) => Self::MalformedMessage,
        }
    }
}

/// Wrapping byte-sum checksum over a frame prefix.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// A decoded host request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Read or write.
    pub kind: MessageKind,
    /// Destination register address.
    pub address: u8,
    /// Payload bytes (empty for read requests).
    pub payload: Payload,
}

/// Result of attempting to decode one frame from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Not enough bytes for a complete frame yet.
    Incomplete,
    /// One complete frame was decoded; `consumed` bytes belong to it.
    Frame {
        /// The decoded request.
        message: Message,
        /// Number of buffer bytes the frame occupied.
        consumed: usize,
    },
}

/// Header fields readable before full validation.
///
/// Used to address an error reply when the body fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw kind byte as received.
    pub kind_byte: u8,
    /// Register address as received.
    pub address: u8,
    /// Declared payload length.
    pub length: u8,
}

/// Read the fixed header without validating the rest of the frame.
#[must_use]
pub fn peek_header(buf: &[u8]) -> Option<FrameHeader> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    Some(FrameHeader {
        kind_byte: buf[0],
        address: buf[1],
        length: buf[2],
    })
}

impl Message {
    /// Build a read request.
    #[must_use]
    pub fn read(address: u8) -> Self {
        Self {
            kind: MessageKind::Read,
            address,
            payload: Payload::new(),
        }
    }

    /// Build a write request.
    ///
    /// # Errors
    ///
    /// Fails if the payload exceeds [`MAX_PAYLOAD_LEN`].
    pub fn write(address: u8, payload: &[u8]) -> DeviceResult<Self> {
        Ok(Self {
            kind: MessageKind::Write,
            address,
            payload: Payload::from_slice(payload)?,
        })
    }

    /// Decode one frame from the start of `buf`.
    ///
    /// Returns [`DecodeOutcome::Incomplete`] while bytes are still arriving;
    /// any byte beyond one complete frame is left for the next call.
    ///
    /// # Errors
    ///
    /// Fails with `MalformedMessage` on an invalid kind byte, an oversized
    /// declared length, or a checksum mismatch.
    pub fn decode(buf: &[u8]) -> DeviceResult<DecodeOutcome> {
        let Some(header) = peek_header(buf) else {
            return Ok(DecodeOutcome::Incomplete);
        };

        let length = header.length as usize;
        if length > MAX_PAYLOAD_LEN {
            return Err(DeviceError::MalformedMessage(format!(
                "declared payload of {length} bytes exceeds maximum {MAX_PAYLOAD_LEN}"
            )));
        }

        let total = HEADER_LEN + length + 1;
        if buf.len() < total {
            return Ok(DecodeOutcome::Incomplete);
        }

        let expected = checksum(&buf[..total - 1]);
        let received = buf[total - 1];
        if expected != received {
            return Err(DeviceError::MalformedMessage(format!(
                "checksum mismatch: expected 0x{expected:02X}, got 0x{received:02X}"
            )));
        }

        let kind = MessageKind::from_byte(header.kind_byte).ok_or_else(|| {
            DeviceError::MalformedMessage(format!(
                "invalid kind byte 0x{:02X}",
                header.kind_byte
            ))
        })?;

        Ok(DecodeOutcome::Frame {
            message: Self {
                kind,
                address: header.address,
                payload: Payload::from_slice(&buf[HEADER_LEN..HEADER_LEN + length])?,
            },
            consumed: total,
        })
    }

    /// Serialize the request to a frame.
    #[must_use]
    pub fn encode(&self) -> FrameBuf {
        encode_frame(self.kind as u8, self.address, self.payload.as_slice())
    }
}

/// The response to one decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Operation kind of the request being answered.
    pub kind: MessageKind,
    /// Register address of the request being answered.
    pub address: u8,
    /// Value bytes (read) or echo of the written bytes (write).
    pub payload: Payload,
    /// Set when the request failed; the reply then carries the code
    /// as its single payload byte and the error bit in its kind byte.
    pub error: Option<ErrorCode>,
}

impl Reply {
    /// Build a successful read reply carrying the register value.
    #[must_use]
    pub fn read_value(address: u8, value: Payload) -> Self {
        Self {
            kind: MessageKind::Read,
            address,
            payload: value,
            error: None,
        }
    }

    /// Build a write acknowledgement echoing the written bytes.
    #[must_use]
    pub fn write_ack(address: u8, echoed: Payload) -> Self {
        Self {
            kind: MessageKind::Write,
            address,
            payload: echoed,
            error: None,
        }
    }

    /// Build an error reply.
    #[must_use]
    pub fn error(kind: MessageKind, address: u8, code: ErrorCode) -> Self {
        Self {
            kind,
            address,
            payload: Payload::new(),
            error: Some(code),
        }
    }

    /// Whether this reply reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Serialize the reply to a frame.
    #[must_use]
    pub fn encode(&self) -> FrameBuf {
        match self.error {
            Some(code) => encode_frame(
                self.kind as u8 | ERROR_BIT,
                self.address,
                &[code as u8],
            ),
            None => encode_frame(self.kind as u8, self.address, self.payload.as_slice()),
        }
    }

    /// Decode a reply frame (host side of the link).
    ///
    /// # Errors
    ///
    /// Fails with `MalformedMessage` on truncated frames, checksum
    /// mismatches, or invalid kind/error bytes.
    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        let header = peek_header(buf).ok_or_else(|| {
            DeviceError::MalformedMessage("reply shorter than frame header".into())
        })?;

        let length = header.length as usize;
        let total = HEADER_LEN + length + 1;
        if length > MAX_PAYLOAD_LEN || buf.len() < total {
            return Err(DeviceError::MalformedMessage(format!(
                "truncated reply: declared {length} payload bytes, buffer holds {}",
                buf.len()
            )));
        }

        let expected = checksum(&buf[..total - 1]);
        if expected != buf[total - 1] {
            return Err(DeviceError::MalformedMessage(format!(
                "reply checksum mismatch: expected 0x{expected:02X}, got 0x{:02X}",
                buf[total - 1]
            )));
        }

        let kind = MessageKind::from_byte(header.kind_byte).ok_or_else(|| {
            DeviceError::MalformedMessage(format!(
                "invalid reply kind byte 0x{:02X}",
                header.kind_byte
            ))
        })?;

        let body = &buf[HEADER_LEN..HEADER_LEN + length];
        let error = if header.kind_byte & ERROR_BIT != 0 {
            let code_byte = *body.first().ok_or_else(|| {
                DeviceError::MalformedMessage("error reply with empty payload".into())
            })?;
            Some(ErrorCode::from_byte(code_byte).ok_or_else(|| {
                DeviceError::MalformedMessage(format!("invalid error code 0x{code_byte:02X}"))
            })?)
        } else {
            None
        };

        Ok(Self {
            kind,
            address: header.address,
            payload: Payload::from_slice(body)?,
            error,
        })
    }
}

/// Assemble `[kind, address, length, payload…, checksum]`.
///
/// Payload length is bounded by [`MAX_PAYLOAD_LEN`], so the frame always
/// fits [`MAX_FRAME_LEN`] and assembly cannot fail.
fn encode_frame(kind_byte: u8, address: u8, payload: &[u8]) -> FrameBuf {
    debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);
    let mut raw = [0u8; MAX_FRAME_LEN];
    raw[0] = kind_byte;
    raw[1] = address;
    raw[2] = payload.len() as u8;
    raw[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    let body_len = HEADER_LEN + payload.len();
    raw[body_len] = checksum(&raw[..body_len]);
    // Capacity is checked above; from_slice cannot fail here.
    FrameBuf::from_slice(&raw[..body_len + 1]).unwrap_or_default()
}
