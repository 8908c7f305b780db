//! Programming the device timer from decoded broadcasts.
//!
//! The synchronizer drains the line, feeds the frame decoder, and on every
//! completed frame programs the timer to the broadcast second minus the
//! calibration offset. Failures on the line never surface to the host
//! protocol: they are counted and logged, and the clock simply keeps free
//! running until the next broadcast lands.

use serde::Serialize;
use tracing::{info, trace, warn};

use instr_common::DeviceResult;
use instr_core::{InstrumentTimer, US_PER_SECOND};

use crate::decoder::FrameDecoder;
use crate::SyncLine;

/// Synchronization statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncStats {
    /// Bytes consumed from the line.
    pub bytes_consumed: u64,
    /// Complete frames decoded and applied.
    pub frames_applied: u64,
    /// Line poll failures.
    pub line_errors: u64,
    /// Whole-second count of the most recent applied frame.
    pub last_seconds: Option<u32>,
}

/// Decodes the timing broadcast and keeps the device clock on it.
#[derive(Debug)]
pub struct Synchronizer {
    decoder: FrameDecoder,
    /// Calibration offset subtracted from every broadcast, in
    /// microseconds. Compensates for the frame's transmission time.
    offset_us: u64,
    stats: SyncStats,
}

impl Synchronizer {
    /// Create a synchronizer with the given calibration offset.
    #[must_use]
    pub fn new(offset_us: u64) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            offset_us,
            stats: SyncStats::default(),
        }
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Whether a frame is currently being received.
    #[must_use]
    pub fn in_frame(&self) -> bool {
        self.decoder.in_frame()
    }

    /// Feed one byte from the line, programming the timer if it
    /// completes a frame. Returns the applied second count if so.
    pub fn push_byte(&mut self, timer: &dyn InstrumentTimer, byte: u8) -> Option<u32> {
        self.stats.bytes_consumed += 1;
        let seconds = self.decoder.push(byte)?;
        self.apply(timer, seconds);
        Some(seconds)
    }

    /// Drain pending line bytes into the decoder.
    ///
    /// Stops as soon as one frame completes, leaving any bytes behind it
    /// on the line for the next pass, the way the interrupt handler this
    /// models returns after programming the clock.
    ///
    /// # Errors
    ///
    /// Propagates line poll failures after counting them.
    pub fn pump(
        &mut self,
        line: &mut dyn SyncLine,
        timer: &dyn InstrumentTimer,
    ) -> DeviceResult<Option<u32>> {
        loop {
            let byte = match line.poll_byte() {
                Ok(Some(byte)) => byte,
                Ok(None) => return Ok(None),
                Err(err) => {
                    self.stats.line_errors += 1;
                    warn!(%err, "sync line poll failed");
                    return Err(err);
                }
            };

            trace!(byte = %format_args!("0x{byte:02X}"), "sync byte");
            if let Some(seconds) = self.push_byte(timer, byte) {
                return Ok(Some(seconds));
            }
        }
    }

    fn apply(&mut self, timer: &dyn InstrumentTimer, seconds: u32) {
        let target_us = (u64::from(seconds) * US_PER_SECOND).saturating_sub(self.offset_us);
        timer.set_us(target_us);

        self.stats.frames_applied += 1;
        self.stats.last_seconds = Some(seconds);
        info!(seconds, target_us, "clock synchronized to broadcast");
    }
}
