//! Timestamp frame state machine.
//!
//! Frames are decoded one byte at a time, exactly as they arrive from the
//! line interrupt. The machine looks for the two header bytes and then
//! accumulates the four seconds bytes, least significant first.

use crate::SYNC_HEADER;

/// Number of seconds bytes in a frame.
const SECONDS_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for the first header byte.
    AwaitHeader0,
    /// First header byte seen; waiting for the second.
    AwaitHeader1,
    /// Header matched; accumulating seconds bytes.
    Timestamp { received: usize },
}

/// Byte-at-a-time decoder for the 6-byte timestamp frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    state: State,
    seconds: [u8; SECONDS_LEN],
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder waiting for a header.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: State::AwaitHeader0,
            seconds: [0; SECONDS_LEN],
        }
    }

    /// Whether the decoder is mid-frame.
    #[must_use]
    pub fn in_frame(&self) -> bool {
        self.state != State::AwaitHeader0
    }

    /// Feed one byte. Returns the decoded whole-second count when the
    /// byte completes a frame.
    ///
    /// A mismatch on the second header byte returns to the idle state
    /// without re-testing the mismatched byte, so a frame whose first
    /// header byte immediately follows a stray `0xAA` is not recognized.
    /// The master rebroadcasts every second, so at most one update is
    /// lost.
    pub fn push(&mut self, byte: u8) -> Option<u32> {
        match self.state {
            State::AwaitHeader0 => {
                if byte == SYNC_HEADER[0] {
                    self.state = State::AwaitHeader1;
                }
                None
            }
            State::AwaitHeader1 => {
                self.state = if byte == SYNC_HEADER[1] {
                    State::Timestamp { received: 0 }
                } else {
                    State::AwaitHeader0
                };
                None
            }
            State::Timestamp { received } => {
                self.seconds[received] = byte;
                if received + 1 == SECONDS_LEN {
                    self.state = State::AwaitHeader0;
                    Some(u32::from_le_bytes(self.seconds))
                } else {
                    self.state = State::Timestamp {
                        received: received + 1,
                    };
                    None
                }
            }
        }
    }

    /// Abandon any partial frame and wait for a fresh header.
    pub fn reset(&mut self) {
        self.state = State::AwaitHeader0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut FrameDecoder, bytes: &[u8]) -> Option<u32> {
        let mut decoded = None;
        for b in bytes {
            if let Some(seconds) = decoder.push(*b) {
                decoded = Some(seconds);
            }
        }
        decoded
    }

    #[test]
    fn test_decode_complete_frame() {
        let mut decoder = FrameDecoder::new();
        let seconds = feed(&mut decoder, &[0xAA, 0xAF, 0x15, 0xCD, 0x5B, 0x07]);
        assert_eq!(seconds, Some(0x075B_CD15));
        assert!(!decoder.in_frame());
    }

    #[test]
    fn test_noise_before_header_ignored() {
        let mut decoder = FrameDecoder::new();
        let seconds = feed(&mut decoder, &[0x00, 0xFF, 0xAA, 0xAF, 1, 0, 0, 0]);
        assert_eq!(seconds, Some(1));
    }

    #[test]
    fn test_header_bytes_in_payload_do_not_restart() {
        // Seconds bytes that happen to equal the header must not be
        // mistaken for a new frame.
        let mut decoder = FrameDecoder::new();
        let seconds = feed(&mut decoder, &[0xAA, 0xAF, 0xAA, 0xAF, 0xAA, 0xAF]);
        assert_eq!(seconds, Some(0xAFAA_AFAA));
    }

    #[test]
    fn test_mismatched_second_header_byte_not_retested() {
        // After 0xAA 0xAA, the second 0xAA is dropped rather than treated
        // as a fresh first header byte, so the frame that follows it is
        // missed. Documented behavior of the line decoder.
        let mut decoder = FrameDecoder::new();
        let seconds = feed(&mut decoder, &[0xAA, 0xAA, 0xAF, 2, 0, 0, 0]);
        assert_eq!(seconds, None);

        // The next clean broadcast gets through.
        let seconds = feed(&mut decoder, &[0xAA, 0xAF, 2, 0, 0, 0]);
        assert_eq!(seconds, Some(2));
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(feed(&mut decoder, &[0xAA, 0xAF, 5, 0, 0, 0]), Some(5));
        assert_eq!(feed(&mut decoder, &[0xAA, 0xAF, 6, 0, 0, 0]), Some(6));
    }

    #[test]
    fn test_reset_abandons_partial_frame() {
        let mut decoder = FrameDecoder::new();
        feed(&mut decoder, &[0xAA, 0xAF, 1, 2]);
        assert!(decoder.in_frame());
        decoder.reset();
        assert!(!decoder.in_frame());
        assert_eq!(feed(&mut decoder, &[0xAA, 0xAF, 9, 0, 0, 0]), Some(9));
    }
}
