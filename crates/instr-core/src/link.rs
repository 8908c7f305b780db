//! Host link abstraction.
//!
//! The dispatcher consumes a byte stream and produces reply frames; the
//! [`HostLink`] trait is the seam between it and whatever carries the
//! bytes. The daemon implements it over TCP; tests use the in-memory
//! [`SimulatedHostLink`].

use instr_common::DeviceResult;

use crate::dispatch::DeviceCore;

/// A bidirectional byte channel to the host.
pub trait HostLink: Send {
    /// Pull received bytes into `buf`, returning how many were written.
    /// Returns 0 when nothing is pending.
    fn recv(&mut self, buf: &mut [u8]) -> DeviceResult<usize>;

    /// Send one encoded reply frame to the host.
    fn send(&mut self, frame: &[u8]) -> DeviceResult<()>;
}

/// Drain pending bytes from the link into the core and send back every
/// reply it produces. One call services everything currently queued.
///
/// # Errors
///
/// Propagates link receive and send failures.
pub fn service_link(core: &mut DeviceCore, link: &mut dyn HostLink) -> DeviceResult<()> {
    let mut buf = [0u8; 256];
    loop {
        let n = link.recv(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        for reply in core.handle_incoming(&buf[..n]) {
            link.send(reply.encode().as_slice())?;
        }
    }
}

/// In-memory host link for testing.
///
/// Bytes injected with [`SimulatedHostLink::inject`] are handed to the
/// core on the next service pass; frames the core sends accumulate for
/// inspection via [`SimulatedHostLink::sent`].
#[derive(Debug, Default)]
pub struct SimulatedHostLink {
    inbound: Vec<u8>,
    sent: Vec<Vec<u8>>,
}

impl SimulatedHostLink {
    /// Create an empty link.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if the host had sent them.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);
    }

    /// Frames the device has sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Drop recorded frames.
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }
}

impl HostLink for SimulatedHostLink {
    fn recv(&mut self, buf: &mut [u8]) -> DeviceResult<usize> {
        let n = self.inbound.len().min(buf.len());
        buf[..n].copy_from_slice(&self.inbound[..n]);
        self.inbound.drain(..n);
        Ok(n)
    }

    fn send(&mut self, frame: &[u8]) -> DeviceResult<()> {
        self.sent.push(frame.to_vec());
        Ok(())
    }
}
