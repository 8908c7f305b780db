//! Message dispatcher driving the register bank from host frames.
//!
//! Dispatch is table-driven: one read handler and one write handler per
//! register address, looked up by index. Most registers use the generic
//! stored-value handlers; the timestamp pair samples and programs the
//! hardware timer, and the reset register triggers the default-restore
//! sweep. Every decoded request produces exactly one reply.

use static_assertions::const_assert_eq;
use tracing::{trace, warn};

use instr_common::{DeviceError, DeviceResult};
use instr_proto::{
    peek_header, DecodeOutcome, ErrorCode, Message, MessageKind, Payload, Reply,
};

use crate::registers::{expect_width, RegisterBank, RegisterId, REG_COUNT};

type ReadHandler = fn(&mut DeviceCore, RegisterId) -> DeviceResult<Payload>;
type WriteHandler = fn(&mut DeviceCore, RegisterId, &[u8]) -> DeviceResult<Payload>;

/// Read handlers, indexed by register address.
const READ_TABLE: [ReadHandler; REG_COUNT] = [
    DeviceCore::read_stored, // WhoAmI
    DeviceCore::read_stored, // HwVersionMajor
    DeviceCore::read_stored, // HwVersionMinor
    DeviceCore::read_stored, // AssemblyVersion
    DeviceCore::read_stored, // ProtocolVersionMajor
    DeviceCore::read_stored, // ProtocolVersionMinor
    DeviceCore::read_stored, // FwVersionMajor
    DeviceCore::read_stored, // FwVersionMinor
    DeviceCore::read_timestamp_seconds,
    DeviceCore::read_timestamp_micros,
    DeviceCore::read_stored, // OperationCtrl
    DeviceCore::read_stored, // ResetDevice
    DeviceCore::read_stored, // DeviceName
    DeviceCore::read_stored, // SerialNumber
    DeviceCore::read_stored, // ClockConfig
    DeviceCore::read_stored, // TimestampOffset
];

/// Write handlers, indexed by register address.
const WRITE_TABLE: [WriteHandler; REG_COUNT] = [
    DeviceCore::write_read_only_error, // WhoAmI
    DeviceCore::write_read_only_error, // HwVersionMajor
    DeviceCore::write_read_only_error, // HwVersionMinor
    DeviceCore::write_read_only_error, // AssemblyVersion
    DeviceCore::write_read_only_error, // ProtocolVersionMajor
    DeviceCore::write_read_only_error, // ProtocolVersionMinor
    DeviceCore::write_read_only_error, // FwVersionMajor
    DeviceCore::write_read_only_error, // FwVersionMinor
    DeviceCore::write_timestamp_seconds,
    DeviceCore::write_timestamp_micros,
    DeviceCore::write_stored, // OperationCtrl
    DeviceCore::write_reset_device,
    DeviceCore::write_stored, // DeviceName
    DeviceCore::write_stored, // SerialNumber
    DeviceCore::write_stored, // ClockConfig
    DeviceCore::write_stored, // TimestampOffset
];

// Every register address must have exactly one entry in each table.
const_assert_eq!(READ_TABLE.len(), REG_COUNT);
const_assert_eq!(WRITE_TABLE.len(), REG_COUNT);

/// Dispatch statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreCounters {
    /// Requests decoded and dispatched.
    pub messages: u64,
    /// Replies produced, error replies included.
    pub replies: u64,
    /// Frames rejected during decode or width validation.
    pub malformed: u64,
    /// Requests addressing a register outside the bank.
    pub unknown_register: u64,
    /// Writes rejected by read-only registers.
    pub read_only_violations: u64,
}

/// The device core: register bank plus dispatcher state.
#[derive(Debug)]
pub struct DeviceCore {
    bank: RegisterBank,
    counters: CoreCounters,
    /// Bytes received but not yet forming a complete frame.
    rx: Vec<u8>,
}

impl DeviceCore {
    /// Build a core around a register bank.
    #[must_use]
    pub fn new(bank: RegisterBank) -> Self {
        Self {
            bank,
            counters: CoreCounters::default(),
            rx: Vec::new(),
        }
    }

    /// The register bank.
    #[must_use]
    pub fn bank(&self) -> &RegisterBank {
        &self.bank
    }

    /// Mutable access to the register bank.
    pub fn bank_mut(&mut self) -> &mut RegisterBank {
        &mut self.bank
    }

    /// Dispatch statistics so far.
    #[must_use]
    pub fn counters(&self) -> CoreCounters {
        self.counters
    }

    /// Feed received bytes into the dispatcher.
    ///
    /// Complete frames are dispatched in order; a trailing partial frame
    /// is kept for the next call. A frame that fails validation flushes
    /// the receive buffer to resynchronize the stream and, when its
    /// header was readable, produces an error reply.
    pub fn handle_incoming(&mut self, bytes: &[u8]) -> Vec<Reply> {
        self.rx.extend_from_slice(bytes);
        let mut replies = Vec::new();

        loop {
            match Message::decode(&self.rx) {
                Ok(DecodeOutcome::Incomplete) => break,
                Ok(DecodeOutcome::Frame { message, consumed }) => {
                    self.rx.drain(..consumed);
                    replies.push(self.handle_message(&message));
                }
                Err(err) => {
                    self.counters.malformed += 1;
                    let header = peek_header(&self.rx);
                    warn!(%err, "malformed frame, flushing receive buffer");
                    self.rx.clear();
                    if let Some(header) = header {
                        let kind = MessageKind::from_byte(header.kind_byte)
                            .unwrap_or(MessageKind::Read);
                        self.counters.replies += 1;
                        replies.push(Reply::error(kind, header.address, ErrorCode::from(&err)));
                    }
                    break;
                }
            }
        }

        replies
    }

    /// Dispatch one decoded request to its register handler.
    pub fn handle_message(&mut self, message: &Message) -> Reply {
        self.counters.messages += 1;

        let reply = match self.dispatch(message) {
            Ok(reply) => reply,
            Err(err) => {
                match &err {
                    DeviceError::UnknownRegister { .. } => self.counters.unknown_register += 1,
                    DeviceError::ReadOnlyViolation(_) => self.counters.read_only_violations += 1,
                    DeviceError::MalformedMessage(_) => self.counters.malformed += 1,
                    DeviceError::Config(_) | DeviceError::HardwareFault(_) => {}
                }
                warn!(
                    kind = %message.kind,
                    address = message.address,
                    %err,
                    "request rejected"
                );
                Reply::error(message.kind, message.address, ErrorCode::from(&err))
            }
        };

        self.counters.replies += 1;
        reply
    }

    fn dispatch(&mut self, message: &Message) -> DeviceResult<Reply> {
        let id = RegisterId::from_address(message.address).ok_or(
            DeviceError::UnknownRegister {
                address: message.address,
                count: REG_COUNT as u8,
            },
        )?;
        let idx = id.address() as usize;

        match message.kind {
            MessageKind::Read => {
                let value = READ_TABLE[idx](self, id)?;
                trace!(register = id.name(), len = value.len(), "read");
                Ok(Reply::read_value(message.address, value))
            }
            MessageKind::Write => {
                let echoed = WRITE_TABLE[idx](self, id, message.payload.as_slice())?;
                trace!(register = id.name(), len = echoed.len(), "write");
                Ok(Reply::write_ack(message.address, echoed))
            }
        }
    }

    // Read handlers.

    fn read_stored(&mut self, id: RegisterId) -> DeviceResult<Payload> {
        self.bank.read(id)
    }

    fn read_timestamp_seconds(&mut self, _id: RegisterId) -> DeviceResult<Payload> {
        Payload::from_slice(&self.bank.timestamp_seconds().to_le_bytes())
    }

    fn read_timestamp_micros(&mut self, _id: RegisterId) -> DeviceResult<Payload> {
        Payload::from_slice(&self.bank.timestamp_micro_ticks().to_le_bytes())
    }

    // Write handlers.

    fn write_read_only_error(&mut self, id: RegisterId, _bytes: &[u8]) -> DeviceResult<Payload> {
        Err(DeviceError::ReadOnlyViolation(id.address()))
    }

    fn write_stored(&mut self, id: RegisterId, bytes: &[u8]) -> DeviceResult<Payload> {
        self.bank.write_stored(id, bytes)?;
        Payload::from_slice(bytes)
    }

    fn write_reset_device(&mut self, _id: RegisterId, bytes: &[u8]) -> DeviceResult<Payload> {
        self.bank.write_reset_device(bytes)?;
        Payload::from_slice(bytes)
    }

    fn write_timestamp_seconds(&mut self, id: RegisterId, bytes: &[u8]) -> DeviceResult<Payload> {
        expect_width(id, bytes)?;
        let seconds = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        self.bank.set_timestamp_seconds(seconds);
        Payload::from_slice(bytes)
    }

    fn write_timestamp_micros(&mut self, id: RegisterId, bytes: &[u8]) -> DeviceResult<Payload> {
        expect_width(id, bytes)?;
        let ticks = u16::from_le_bytes([bytes[0], bytes[1]]);
        self.bank.set_timestamp_micro_ticks(ticks);
        Payload::from_slice(bytes)
    }
}
