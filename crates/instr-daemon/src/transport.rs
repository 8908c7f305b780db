//! Network adapters for the host link and the sync line.
//!
//! The host speaks the register protocol over a TCP connection; the
//! timing broadcast arrives as UDP datagrams standing in for the shared
//! serial line.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::time::Duration;

use instr_common::{DeviceError, DeviceResult};
use instr_core::HostLink;
use instr_sync::SyncLine;

/// [`HostLink`] over one accepted TCP connection.
pub struct TcpHostLink {
    stream: TcpStream,
    closed: bool,
}

impl TcpHostLink {
    /// Wrap an accepted connection, applying the read timeout.
    pub fn new(stream: TcpStream, read_timeout: Duration) -> std::io::Result<Self> {
        stream.set_read_timeout(Some(read_timeout))?;
        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Whether the peer has closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl HostLink for TcpHostLink {
    fn recv(&mut self, buf: &mut [u8]) -> DeviceResult<usize> {
        if self.closed {
            return Ok(0);
        }
        match self.stream.read(buf) {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(DeviceError::HardwareFault(format!(
                "host connection read failed: {e}"
            ))),
        }
    }

    fn send(&mut self, frame: &[u8]) -> DeviceResult<()> {
        self.stream
            .write_all(frame)
            .map_err(|e| DeviceError::HardwareFault(format!("host connection write failed: {e}")))
    }
}

/// [`SyncLine`] fed by UDP datagrams.
///
/// Datagram payloads are treated as a raw byte stream: a broadcast frame
/// may arrive whole in one datagram or split across several.
pub struct UdpSyncLine {
    socket: UdpSocket,
    pending: VecDeque<u8>,
}

impl UdpSyncLine {
    /// Bind the line to a local address.
    pub fn bind(addr: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            pending: VecDeque::new(),
        })
    }

    fn refill(&mut self) -> DeviceResult<()> {
        let mut buf = [0u8; 256];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, _peer)) => self.pending.extend(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    return Err(DeviceError::HardwareFault(format!(
                        "sync line receive failed: {e}"
                    )))
                }
            }
        }
    }
}

impl SyncLine for UdpSyncLine {
    fn poll_byte(&mut self) -> DeviceResult<Option<u8>> {
        if self.pending.is_empty() {
            self.refill()?;
        }
        Ok(self.pending.pop_front())
    }
}
