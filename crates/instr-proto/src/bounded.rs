//! Fixed-capacity byte container for message payloads.
//!
//! Payloads on the dispatch path must not allocate: both the message buffer
//! and every register value fit in a compile-time-bounded array, keeping
//! worst-case latency independent of heap state.

use instr_common::{DeviceError, DeviceResult};

/// A byte buffer with compile-time capacity `N` and runtime length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedBytes<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> Default for BoundedBytes<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BoundedBytes<N> {
    /// Create an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: [0; N], len: 0 }
    }

    /// Build a buffer from a slice.
    ///
    /// # Errors
    ///
    /// Fails with `MalformedMessage` if the slice exceeds the capacity.
    pub fn from_slice(bytes: &[u8]) -> DeviceResult<Self> {
        let mut out = Self::new();
        out.extend_from_slice(bytes)?;
        Ok(out)
    }

    /// Append a slice to the buffer.
    ///
    /// # Errors
    ///
    /// Fails with `MalformedMessage` if the result would exceed the capacity.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> DeviceResult<()> {
        let new_len = self.len + bytes.len();
        if new_len > N {
            return Err(DeviceError::MalformedMessage(format!(
                "payload of {new_len} bytes exceeds capacity {N}"
            )));
        }
        self.buf[self.len..new_len].copy_from_slice(bytes);
        self.len = new_len;
        Ok(())
    }

    /// Append a single byte.
    ///
    /// # Errors
    ///
    /// Fails with `MalformedMessage` when the buffer is full.
    pub fn push(&mut self, byte: u8) -> DeviceResult<()> {
        self.extend_from_slice(&[byte])
    }

    /// Current length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the occupied portion of the buffer.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Discard the contents, keeping the storage.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<const N: usize> AsRef<[u8]> for BoundedBytes<N> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
