//! The common register bank.
//!
//! Every device carries the same 16 registers at fixed addresses: identity
//! constants, the two timestamp registers backed by the hardware timer, and
//! a handful of writable housekeeping registers. Multi-byte values are
//! little-endian on the wire.

use std::sync::Arc;

use instr_common::{DeviceError, DeviceResult, IdentityConfig, DEVICE_NAME_LEN};
use instr_proto::Payload;

use crate::timer::{InstrumentTimer, US_PER_SECOND};

/// Number of registers in the common bank.
pub const REG_COUNT: usize = 16;

/// The microsecond register counts in 32 µs ticks.
pub const MICRO_TICK_SHIFT: u32 = 5;

/// Bit in the reset register that restores writable registers to their
/// configured defaults.
pub const RESET_TO_DEFAULTS_BIT: u8 = 0x01;

/// Addresses of the common registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegisterId {
    /// Device type identifier.
    WhoAmI = 0,
    /// Hardware version, major part.
    HwVersionMajor = 1,
    /// Hardware version, minor part.
    HwVersionMinor = 2,
    /// Assembly version.
    AssemblyVersion = 3,
    /// Register protocol version, major part.
    ProtocolVersionMajor = 4,
    /// Register protocol version, minor part.
    ProtocolVersionMinor = 5,
    /// Firmware version, major part.
    FwVersionMajor = 6,
    /// Firmware version, minor part.
    FwVersionMinor = 7,
    /// Whole seconds of the device clock.
    TimestampSeconds = 8,
    /// Sub-second part of the device clock, in 32 µs ticks.
    TimestampMicros = 9,
    /// Operation mode bits.
    OperationCtrl = 10,
    /// Reset and default-restore control.
    ResetDevice = 11,
    /// Human-readable device name, up to 25 bytes.
    DeviceName = 12,
    /// Device serial number.
    SerialNumber = 13,
    /// Clock-line role configuration bits.
    ClockConfig = 14,
    /// Signed calibration trim for the synchronizer, in its own units.
    TimestampOffset = 15,
}

/// Host access granted to a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Reads only; writes are rejected.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

impl RegisterId {
    /// Map a wire address to a register, if it exists.
    #[must_use]
    pub fn from_address(address: u8) -> Option<Self> {
        match address {
            0 => Some(Self::WhoAmI),
            1 => Some(Self::HwVersionMajor),
            2 => Some(Self::HwVersionMinor),
            3 => Some(Self::AssemblyVersion),
            4 => Some(Self::ProtocolVersionMajor),
            5 => Some(Self::ProtocolVersionMinor),
            6 => Some(Self::FwVersionMajor),
            7 => Some(Self::FwVersionMinor),
            8 => Some(Self::TimestampSeconds),
            9 => Some(Self::TimestampMicros),
            10 => Some(Self::OperationCtrl),
            11 => Some(Self::ResetDevice),
            12 => Some(Self::DeviceName),
            13 => Some(Self::SerialNumber),
            14 => Some(Self::ClockConfig),
            15 => Some(Self::TimestampOffset),
            _ => None,
        }
    }

    /// Wire address of this register.
    #[must_use]
    pub fn address(self) -> u8 {
        self as u8
    }

    /// Register name for logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::WhoAmI => "WhoAmI",
            Self::HwVersionMajor => "HwVersionMajor",
            Self::HwVersionMinor => "HwVersionMinor",
            Self::AssemblyVersion => "AssemblyVersion",
            Self::ProtocolVersionMajor => "ProtocolVersionMajor",
            Self::ProtocolVersionMinor => "ProtocolVersionMinor",
            Self::FwVersionMajor => "FwVersionMajor",
            Self::FwVersionMinor => "FwVersionMinor",
            Self::TimestampSeconds => "TimestampSeconds",
            Self::TimestampMicros => "TimestampMicros",
            Self::OperationCtrl => "OperationCtrl",
            Self::ResetDevice => "ResetDevice",
            Self::DeviceName => "DeviceName",
            Self::SerialNumber => "SerialNumber",
            Self::ClockConfig => "ClockConfig",
            Self::TimestampOffset => "TimestampOffset",
        }
    }

    /// Host access for this register.
    #[must_use]
    pub fn access(self) -> Access {
        match self {
            Self::WhoAmI
            | Self::HwVersionMajor
            | Self::HwVersionMinor
            | Self::AssemblyVersion
            | Self::ProtocolVersionMajor
            | Self::ProtocolVersionMinor
            | Self::FwVersionMajor
            | Self::FwVersionMinor => Access::ReadOnly,
            _ => Access::ReadWrite,
        }
    }

    /// Value width in bytes. For the name register this is the maximum;
    /// writes may be shorter and replace the stored name wholesale.
    #[must_use]
    pub fn width(self) -> usize {
        match self {
            Self::WhoAmI | Self::SerialNumber | Self::TimestampMicros => 2,
            Self::TimestampSeconds => 4,
            Self::DeviceName => DEVICE_NAME_LEN,
            _ => 1,
        }
    }
}

/// Storage for the common bank plus the timer behind its
/// timestamp registers.
pub struct RegisterBank {
    identity: IdentityConfig,
    operation_ctrl: u8,
    reset_device: u8,
    device_name: [u8; DEVICE_NAME_LEN],
    name_len: usize,
    serial_number: u16,
    clock_config: u8,
    timestamp_offset: i8,
    timer: Arc<dyn InstrumentTimer>,
}

impl std::fmt::Debug for RegisterBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterBank")
            .field("who_am_i", &self.identity.who_am_i)
            .field("serial_number", &self.serial_number)
            .finish_non_exhaustive()
    }
}

impl RegisterBank {
    /// Build a bank from identity defaults and a timer.
    ///
    /// # Errors
    ///
    /// Fails with `DeviceError::Config` if the configured device name does
    /// not fit the name register.
    pub fn new(
        identity: IdentityConfig,
        timer: Arc<dyn InstrumentTimer>,
    ) -> DeviceResult<Self> {
        let (device_name, name_len) = pack_name(&identity.device_name)?;
        let serial_number = identity.serial_number;
        Ok(Self {
            identity,
            operation_ctrl: 0,
            reset_device: 0,
            device_name,
            name_len,
            serial_number,
            clock_config: 0,
            timestamp_offset: 0,
            timer,
        })
    }

    /// The timer backing the timestamp registers.
    #[must_use]
    pub fn timer(&self) -> &Arc<dyn InstrumentTimer> {
        &self.timer
    }

    /// Restore every writable register to its configured default in one
    /// sweep. The timer keeps running.
    pub fn reset_to_defaults(&mut self) {
        // The name was validated at construction; repacking cannot fail.
        if let Ok((name, len)) = pack_name(&self.identity.device_name) {
            self.device_name = name;
            self.name_len = len;
        }
        self.operation_ctrl = 0;
        self.reset_device = 0;
        self.serial_number = self.identity.serial_number;
        self.clock_config = 0;
        self.timestamp_offset = 0;
        tracing::info!("writable registers restored to defaults");
    }

    /// Read a register's current value, little-endian encoded.
    ///
    /// # Errors
    ///
    /// Propagates payload-construction failures, which cannot occur for
    /// the fixed widths in the bank.
    pub fn read(&self, id: RegisterId) -> DeviceResult<Payload> {
        match id {
            RegisterId::WhoAmI => Payload::from_slice(&self.identity.who_am_i.to_le_bytes()),
            RegisterId::HwVersionMajor => Payload::from_slice(&[self.identity.hw_version_major]),
            RegisterId::HwVersionMinor => Payload::from_slice(&[self.identity.hw_version_minor]),
            RegisterId::AssemblyVersion => Payload::from_slice(&[self.identity.assembly_version]),
            RegisterId::ProtocolVersionMajor => {
                Payload::from_slice(&[self.identity.protocol_version_major])
            }
            RegisterId::ProtocolVersionMinor => {
                Payload::from_slice(&[self.identity.protocol_version_minor])
            }
            RegisterId::FwVersionMajor => Payload::from_slice(&[self.identity.fw_version_major]),
            RegisterId::FwVersionMinor => Payload::from_slice(&[self.identity.fw_version_minor]),
            RegisterId::TimestampSeconds => {
                Payload::from_slice(&self.timestamp_seconds().to_le_bytes())
            }
            RegisterId::TimestampMicros => {
                Payload::from_slice(&self.timestamp_micro_ticks().to_le_bytes())
            }
            RegisterId::OperationCtrl => Payload::from_slice(&[self.operation_ctrl]),
            RegisterId::ResetDevice => Payload::from_slice(&[self.reset_device]),
            RegisterId::DeviceName => Payload::from_slice(&self.device_name[..self.name_len]),
            RegisterId::SerialNumber => Payload::from_slice(&self.serial_number.to_le_bytes()),
            RegisterId::ClockConfig => Payload::from_slice(&[self.clock_config]),
            RegisterId::TimestampOffset => {
                Payload::from_slice(&self.timestamp_offset.to_le_bytes())
            }
        }
    }

    /// Store a value into one of the plainly-stored writable registers.
    ///
    /// Timestamp registers are hardware-backed and handled by their own
    /// dispatch handlers, not here.
    ///
    /// # Errors
    ///
    /// Fails with `MalformedMessage` if the payload width does not match
    /// the register, and `ReadOnlyViolation` for registers this method
    /// must not touch.
    pub fn write_stored(&mut self, id: RegisterId, bytes: &[u8]) -> DeviceResult<()> {
        expect_width(id, bytes)?;
        match id {
            RegisterId::OperationCtrl => self.operation_ctrl = bytes[0],
            RegisterId::DeviceName => {
                self.device_name = [0; DEVICE_NAME_LEN];
                self.device_name[..bytes.len()].copy_from_slice(bytes);
                self.name_len = bytes.len();
            }
            RegisterId::SerialNumber => {
                self.serial_number = u16::from_le_bytes([bytes[0], bytes[1]]);
            }
            RegisterId::ClockConfig => self.clock_config = bytes[0],
            RegisterId::TimestampOffset => self.timestamp_offset = bytes[0] as i8,
            _ => return Err(DeviceError::ReadOnlyViolation(id.address())),
        }
        Ok(())
    }

    /// Handle a write to the reset register.
    ///
    /// Bit 0 restores writable registers to defaults. The write always
    /// acknowledges, whatever bits are set.
    ///
    /// # Errors
    ///
    /// Fails with `MalformedMessage` on a width mismatch.
    pub fn write_reset_device(&mut self, bytes: &[u8]) -> DeviceResult<()> {
        expect_width(RegisterId::ResetDevice, bytes)?;
        if bytes[0] & RESET_TO_DEFAULTS_BIT != 0 {
            self.reset_to_defaults();
        }
        // The trigger bit is acted on, not latched.
        self.reset_device = bytes[0] & !RESET_TO_DEFAULTS_BIT;
        Ok(())
    }

    /// Whole seconds of the device clock.
    #[must_use]
    pub fn timestamp_seconds(&self) -> u32 {
        (self.timer.now_us() / US_PER_SECOND) as u32
    }

    /// Sub-second part of the device clock, in 32 µs ticks.
    #[must_use]
    pub fn timestamp_micro_ticks(&self) -> u16 {
        ((self.timer.now_us() % US_PER_SECOND) >> MICRO_TICK_SHIFT) as u16
    }

    /// Program the clock to the start of `seconds`. The sub-second part
    /// is discarded.
    pub fn set_timestamp_seconds(&self, seconds: u32) {
        self.timer.set_us(u64::from(seconds) * US_PER_SECOND);
    }

    /// Reprogram the sub-second part of the clock, keeping the current
    /// whole second.
    pub fn set_timestamp_micro_ticks(&self, ticks: u16) {
        let second_start = (self.timer.now_us() / US_PER_SECOND) * US_PER_SECOND;
        self.timer
            .set_us(second_start + (u64::from(ticks) << MICRO_TICK_SHIFT));
    }
}

/// Pack a configured name into the fixed-capacity name buffer.
fn pack_name(name: &str) -> DeviceResult<([u8; DEVICE_NAME_LEN], usize)> {
    let bytes = name.as_bytes();
    if bytes.len() > DEVICE_NAME_LEN {
        return Err(DeviceError::Config(format!(
            "device name is {} bytes, register holds at most {DEVICE_NAME_LEN}",
            bytes.len()
        )));
    }
    let mut packed = [0u8; DEVICE_NAME_LEN];
    packed[..bytes.len()].copy_from_slice(bytes);
    Ok((packed, bytes.len()))
}

/// Reject payloads that do not fit the register.
///
/// Fixed-width registers take exactly their width; the name register
/// takes any non-empty payload up to its capacity.
pub(crate) fn expect_width(id: RegisterId, bytes: &[u8]) -> DeviceResult<()> {
    let ok = match id {
        RegisterId::DeviceName => (1..=DEVICE_NAME_LEN).contains(&bytes.len()),
        _ => bytes.len() == id.width(),
    };
    if !ok {
        return Err(DeviceError::MalformedMessage(format!(
            "register {} takes {} bytes, got {}",
            id.name(),
            id.width(),
            bytes.len()
        )));
    }
    Ok(())
}
