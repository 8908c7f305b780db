//! Common utilities for the acceptance tests.

#![allow(dead_code)]

use std::sync::Arc;

use instr_common::IdentityConfig;
use instr_core::{
    service_link, DeviceCore, InstrumentTimer, ManualTimer, RegisterBank, SimulatedHostLink,
};
use instr_proto::{Message, Reply};

/// A device wired to an in-memory host link and a manual timer.
pub struct TestDevice {
    pub core: DeviceCore,
    pub link: SimulatedHostLink,
    pub timer: Arc<ManualTimer>,
}

impl TestDevice {
    /// Build a device with default identity.
    pub fn new() -> Self {
        Self::with_identity(IdentityConfig::default())
    }

    /// Build a device with the given identity.
    pub fn with_identity(identity: IdentityConfig) -> Self {
        let timer = Arc::new(ManualTimer::new());
        let bank = RegisterBank::new(identity, Arc::clone(&timer) as Arc<dyn InstrumentTimer>)
            .expect("test identity must fit the register bank");
        Self {
            core: DeviceCore::new(bank),
            link: SimulatedHostLink::new(),
            timer,
        }
    }

    /// Send one request over the link and return the decoded reply.
    pub fn exchange(&mut self, message: &Message) -> Reply {
        self.link.clear_sent();
        self.link.inject(message.encode().as_slice());
        service_link(&mut self.core, &mut self.link).expect("simulated link cannot fail");
        assert_eq!(self.link.sent().len(), 1, "expected exactly one reply");
        Reply::decode(&self.link.sent()[0]).expect("device replies must decode")
    }

    /// Send raw bytes over the link and return all decoded replies.
    pub fn exchange_raw(&mut self, bytes: &[u8]) -> Vec<Reply> {
        self.link.clear_sent();
        self.link.inject(bytes);
        service_link(&mut self.core, &mut self.link).expect("simulated link cannot fail");
        self.link
            .sent()
            .iter()
            .map(|frame| Reply::decode(frame).expect("device replies must decode"))
            .collect()
    }

    /// Read a register and return its value bytes.
    pub fn read_register(&mut self, address: u8) -> Vec<u8> {
        let reply = self.exchange(&Message::read(address));
        assert!(!reply.is_error(), "read of register {address} failed");
        reply.payload.as_slice().to_vec()
    }

    /// Write a register, asserting success.
    pub fn write_register(&mut self, address: u8, payload: &[u8]) {
        let message = Message::write(address, payload).expect("test payload fits a frame");
        let reply = self.exchange(&message);
        assert!(!reply.is_error(), "write of register {address} failed");
    }
}

/// The 6-byte timestamp broadcast for a whole-second count.
pub fn sync_frame(seconds: u32) -> Vec<u8> {
    let mut bytes = instr_sync::SYNC_HEADER.to_vec();
    bytes.extend_from_slice(&seconds.to_le_bytes());
    bytes
}
