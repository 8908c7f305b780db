//! End-to-end register protocol scenarios over encoded frames.

use instr_common::{IdentityConfig, DEVICE_NAME_LEN};
use instr_core::InstrumentTimer;
use instr_proto::{checksum, ErrorCode, Message, MessageKind};

use crate::acceptance::common::TestDevice;

#[test]
fn identity_registers_read_back_configured_values() {
    let mut identity = IdentityConfig::default();
    identity.who_am_i = 4242;
    identity.fw_version_major = 9;
    let mut device = TestDevice::with_identity(identity);

    assert_eq!(device.read_register(0), 4242u16.to_le_bytes());
    assert_eq!(device.read_register(6), vec![9]);
    assert_eq!(device.read_register(1), vec![1]); // hw major default
}

#[test]
fn device_name_round_trip() {
    let mut device = TestDevice::new();

    device.write_register(12, b"MyDevice");

    assert_eq!(device.read_register(12), b"MyDevice");
}

#[test]
fn device_name_at_capacity_accepted() {
    let mut device = TestDevice::new();
    let reply = device.exchange(&Message::write(12, &[0x41; DEVICE_NAME_LEN]).unwrap());
    assert!(!reply.is_error());
    assert_eq!(device.read_register(12), [0x41; DEVICE_NAME_LEN]);
}

#[test]
fn serial_number_round_trip() {
    let mut device = TestDevice::new();
    device.write_register(13, &0xBEEFu16.to_le_bytes());
    assert_eq!(device.read_register(13), 0xBEEFu16.to_le_bytes());
}

#[test]
fn read_only_registers_reject_writes() {
    let mut device = TestDevice::new();

    for address in 0..8u8 {
        let width = if address == 0 { 2 } else { 1 };
        let message = Message::write(address, &vec![0u8; width]).unwrap();
        let reply = device.exchange(&message);
        assert_eq!(reply.error, Some(ErrorCode::ReadOnlyViolation));
        assert_eq!(reply.kind, MessageKind::Write);
        assert_eq!(reply.address, address);
    }
}

#[test]
fn unknown_register_rejected_both_ways() {
    let mut device = TestDevice::new();

    let reply = device.exchange(&Message::read(16));
    assert_eq!(reply.error, Some(ErrorCode::UnknownRegister));

    let reply = device.exchange(&Message::write(200, &[0]).unwrap());
    assert_eq!(reply.error, Some(ErrorCode::UnknownRegister));
}

#[test]
fn width_mismatch_rejected() {
    let mut device = TestDevice::new();
    let reply = device.exchange(&Message::write(13, &[1, 2, 3]).unwrap());
    assert_eq!(reply.error, Some(ErrorCode::MalformedMessage));
}

#[test]
fn corrupted_checksum_gets_error_reply_and_stream_recovers() {
    let mut device = TestDevice::new();

    let mut frame = Message::read(0).encode().as_slice().to_vec();
    let last = frame.len() - 1;
    frame[last] ^= 0x55;

    let replies = device.exchange_raw(&frame);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].error, Some(ErrorCode::MalformedMessage));

    // A clean request afterwards succeeds.
    assert_eq!(device.read_register(0), 1216u16.to_le_bytes());
}

#[test]
fn pipelined_requests_each_get_a_reply_in_order() {
    let mut device = TestDevice::new();

    let mut bytes = Vec::new();
    bytes.extend_from_slice(Message::read(0).encode().as_slice());
    bytes.extend_from_slice(
        Message::write(13, &7u16.to_le_bytes())
            .unwrap()
            .encode()
            .as_slice(),
    );
    bytes.extend_from_slice(Message::read(13).encode().as_slice());

    let replies = device.exchange_raw(&bytes);
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0].address, 0);
    assert_eq!(replies[1].address, 13);
    assert_eq!(replies[2].payload.as_slice(), &7u16.to_le_bytes());
}

#[test]
fn reset_register_restores_writable_registers_atomically() {
    let mut device = TestDevice::new();

    device.write_register(13, &999u16.to_le_bytes());
    device.write_register(10, &[0x0F]);
    device.write_register(12, b"bench");

    device.write_register(11, &[0x01]);

    assert_eq!(device.read_register(13), 0u16.to_le_bytes());
    assert_eq!(device.read_register(10), vec![0]);
    assert_eq!(device.read_register(12), b"Virtual Instrument");
}

#[test]
fn reset_without_trigger_bit_changes_nothing() {
    let mut device = TestDevice::new();
    device.write_register(13, &77u16.to_le_bytes());

    device.write_register(11, &[0x02]);

    assert_eq!(device.read_register(13), 77u16.to_le_bytes());
}

#[test]
fn timestamp_registers_reflect_the_timer() {
    let mut device = TestDevice::new();
    device.timer.set_us(42_000_320);

    assert_eq!(device.read_register(8), 42u32.to_le_bytes());
    // 320 µs = 10 ticks of 32 µs
    assert_eq!(device.read_register(9), 10u16.to_le_bytes());
}

#[test]
fn writing_timestamp_seconds_programs_the_timer() {
    let mut device = TestDevice::new();
    device.timer.set_us(5_999_999);

    device.write_register(8, &1000u32.to_le_bytes());

    assert_eq!(device.timer.now_us(), 1_000_000_000);
}

#[test]
fn writing_timestamp_micros_keeps_the_current_second() {
    let mut device = TestDevice::new();
    device.timer.set_us(17_500_000);

    device.write_register(9, &3u16.to_le_bytes());

    assert_eq!(device.timer.now_us(), 17_000_096);
}

#[test]
fn hand_built_frame_matches_the_wire_format() {
    let mut device = TestDevice::new();

    // [kind, address, length, payload.., checksum] with a wrapping sum.
    let mut frame = vec![0x01, 0x00, 0x00];
    frame.push(checksum(&frame));

    let replies = device.exchange_raw(&frame);
    assert_eq!(replies.len(), 1);
    assert!(!replies[0].is_error());
    assert_eq!(replies[0].payload.as_slice(), &1216u16.to_le_bytes());
}
