//! Clock synchronization over the shared timing line.
//!
//! This crate provides:
//! - [`SyncLine`] trait for the byte source feeding the synchronizer
//! - [`decoder`] module with the timestamp frame state machine
//! - [`synchronizer`] module programming the device timer from decoded frames
//!
//! A master broadcasts a 6-byte frame once per second: the two header
//! bytes followed by the whole-second count, least significant byte first.
//! Devices decode it and program their clocks, minus a fixed offset that
//! compensates for the frame's own transmission time.

pub mod decoder;
pub mod synchronizer;

pub use decoder::*;
pub use synchronizer::*;

use instr_common::DeviceResult;

/// The two header bytes opening every timestamp frame.
pub const SYNC_HEADER: [u8; 2] = [0xAA, 0xAF];

/// Total frame size: header plus four seconds bytes.
pub const SYNC_FRAME_LEN: usize = 6;

/// Line rate in baud. The line runs 8 data bits, no parity, one stop bit.
pub const SYNC_BAUD_RATE: u32 = 100_000;

/// A byte source carrying the synchronization broadcast.
pub trait SyncLine: Send {
    /// Take the next pending byte, or `None` when the line is idle.
    fn poll_byte(&mut self) -> DeviceResult<Option<u8>>;
}

/// In-memory sync line for testing.
#[derive(Debug, Default)]
pub struct SimulatedSyncLine {
    pending: std::collections::VecDeque<u8>,
}

impl SimulatedSyncLine {
    /// Create an idle line.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if the master had broadcast them.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    /// Bytes still waiting to be polled.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl SyncLine for SimulatedSyncLine {
    fn poll_byte(&mut self) -> DeviceResult<Option<u8>> {
        Ok(self.pending.pop_front())
    }
}
