//! Timer consistency while sync traffic and host reads run concurrently.

use std::sync::Arc;
use std::thread;

use instr_core::{FreeRunningTimer, InstrumentTimer, US_PER_SECOND};
use instr_sync::{SimulatedSyncLine, Synchronizer};

use crate::acceptance::common::sync_frame;

#[test]
fn readers_never_see_torn_timer_values() {
    let timer = Arc::new(FreeRunningTimer::new());

    // Broadcast epochs far enough apart that a reader mixing the halves
    // of two different epochs would observe time running backwards.
    let writer_timer = Arc::clone(&timer);
    let writer = thread::spawn(move || {
        let mut sync = Synchronizer::new(0);
        let mut line = SimulatedSyncLine::new();
        for i in 1..200u32 {
            line.inject(&sync_frame(i * 5000));
            sync.pump(&mut line, writer_timer.as_ref()).unwrap();
        }
        sync.stats().frames_applied
    });

    let reader_timer = Arc::clone(&timer);
    let reader = thread::spawn(move || {
        let mut last = 0u64;
        for _ in 0..2000 {
            let now = reader_timer.now_us();
            assert!(now >= last, "clock went backwards: {last} -> {now}");
            last = now;
        }
    });

    assert_eq!(writer.join().unwrap(), 199);
    reader.join().unwrap();
}

#[test]
fn concurrent_register_style_reads_are_consistent() {
    let timer = Arc::new(FreeRunningTimer::new());
    timer.set_us(100 * US_PER_SECOND);

    let writer_timer = Arc::clone(&timer);
    let writer = thread::spawn(move || {
        for i in 0..1000u64 {
            writer_timer.set_us((100 + i) * US_PER_SECOND);
        }
    });

    // Model the dispatcher sampling seconds and micros registers while
    // the sync side reprograms the clock.
    let reader_timer = Arc::clone(&timer);
    let reader = thread::spawn(move || {
        for _ in 0..1000 {
            let now = reader_timer.now_us();
            let seconds = now / US_PER_SECOND;
            assert!((100..=1100).contains(&seconds), "seconds out of range: {seconds}");
        }
    });

    writer.join().unwrap();
    reader.join().unwrap();
}
