use thiserror::Error;

/// Device error types covering configuration, protocol faults, and
/// peripheral failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Inbound message failed length or checksum validation.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Register address outside the valid id space.
    #[error("unknown register address {address} (valid range 0..{count})")]
    UnknownRegister {
        /// The address carried by the request.
        address: u8,
        /// Number of registers in the common bank.
        count: u8,
    },

    /// Write attempted on a read-only register.
    #[error("write to read-only register {0}")]
    ReadOnlyViolation(u8),

    /// Underlying peripheral operation failed.
    #[error("hardware fault: {0}")]
    HardwareFault(String),
}

/// Convenience type alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
