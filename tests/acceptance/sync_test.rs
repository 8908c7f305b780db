//! Clock synchronization flowing through to the host-visible registers.

use instr_core::{InstrumentTimer, US_PER_SECOND};
use instr_sync::{SimulatedSyncLine, Synchronizer};

use crate::acceptance::common::{sync_frame, TestDevice};

#[test]
fn broadcast_updates_the_timestamp_registers() {
    let mut device = TestDevice::new();
    let mut sync = Synchronizer::new(0);
    let mut line = SimulatedSyncLine::new();

    line.inject(&sync_frame(5000));
    sync.pump(&mut line, device.timer.as_ref()).unwrap();

    assert_eq!(device.read_register(8), 5000u32.to_le_bytes());
    assert_eq!(device.read_register(9), 0u16.to_le_bytes());
}

#[test]
fn calibration_offset_lands_just_before_the_second() {
    let mut device = TestDevice::new();
    let mut sync = Synchronizer::new(600);
    let mut line = SimulatedSyncLine::new();

    line.inject(&sync_frame(5000));
    sync.pump(&mut line, device.timer.as_ref()).unwrap();

    // 600 µs before the broadcast second: still in second 4999.
    assert_eq!(device.timer.now_us(), 5000 * US_PER_SECOND - 600);
    assert_eq!(device.read_register(8), 4999u32.to_le_bytes());
}

#[test]
fn host_writes_and_broadcasts_share_the_clock() {
    let mut device = TestDevice::new();
    let mut sync = Synchronizer::new(0);
    let mut line = SimulatedSyncLine::new();

    // Host programs the clock, then a broadcast overrides it.
    device.write_register(8, &100u32.to_le_bytes());
    assert_eq!(device.read_register(8), 100u32.to_le_bytes());

    line.inject(&sync_frame(2_000_000));
    sync.pump(&mut line, device.timer.as_ref()).unwrap();
    assert_eq!(device.read_register(8), 2_000_000u32.to_le_bytes());
}

#[test]
fn noise_on_the_line_leaves_the_clock_alone() {
    let mut device = TestDevice::new();
    device.timer.set_us(9 * US_PER_SECOND);
    let mut sync = Synchronizer::new(0);
    let mut line = SimulatedSyncLine::new();

    line.inject(&[0x13, 0xAA, 0x00, 0xAF, 0xAA]);
    sync.pump(&mut line, device.timer.as_ref()).unwrap();

    assert_eq!(device.read_register(8), 9u32.to_le_bytes());
    assert_eq!(sync.stats().frames_applied, 0);
}

#[test]
fn seconds_bytes_matching_the_header_decode_correctly() {
    let mut device = TestDevice::new();
    let mut sync = Synchronizer::new(0);
    let mut line = SimulatedSyncLine::new();

    // A second count whose little-endian bytes repeat the header pattern.
    line.inject(&sync_frame(0xAFAA_AFAA));
    let applied = sync.pump(&mut line, device.timer.as_ref()).unwrap();

    assert_eq!(applied, Some(0xAFAA_AFAA));
}

#[test]
fn each_broadcast_reapplies_the_clock() {
    let mut device = TestDevice::new();
    let mut sync = Synchronizer::new(0);
    let mut line = SimulatedSyncLine::new();

    for seconds in [10u32, 11, 12] {
        line.inject(&sync_frame(seconds));
        sync.pump(&mut line, device.timer.as_ref()).unwrap();
        assert_eq!(device.read_register(8), seconds.to_le_bytes());
    }
    assert_eq!(sync.stats().frames_applied, 3);
    assert_eq!(sync.stats().last_seconds, Some(12));
}
