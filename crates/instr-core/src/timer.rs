//! The 64-bit microsecond clock behind the timestamp registers.
//!
//! Hardware exposes the counter as two 32-bit halves, and programming it
//! means writing both halves. A seqlock makes that pair of writes atomic
//! with respect to readers: the low and high words are published inside a
//! write-in-progress window, and readers retry until they observe a window
//! that was closed the whole time they were sampling.

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Microseconds per second, the unit boundary between the two
/// timestamp registers.
pub const US_PER_SECOND: u64 = 1_000_000;

/// The device clock: a 64-bit microsecond counter that can be
/// reprogrammed at any time.
pub trait InstrumentTimer: Send + Sync {
    /// Current counter value in microseconds.
    fn now_us(&self) -> u64;

    /// Program the counter to `us`. Subsequent reads continue from there.
    fn set_us(&self, us: u64);
}

/// A free-running timer that advances with wall time.
///
/// The programmed epoch is stored as two 32-bit words, mirroring the split
/// hardware counter, plus the instant it was programmed. All three are
/// guarded by one seqlock so a reader can never combine the low word of one
/// epoch with the high word of another.
pub struct FreeRunningTimer {
    /// Sequence number (odd = write in progress).
    sequence: CachePadded<AtomicU64>,
    /// Low 32 bits of the programmed epoch.
    epoch_low: CachePadded<AtomicU32>,
    /// High 32 bits of the programmed epoch.
    epoch_high: CachePadded<AtomicU32>,
    /// Instant at which the epoch was programmed.
    anchor: CachePadded<UnsafeCell<Instant>>,
    /// Serializes writers; readers never take it.
    write_lock: Mutex<()>,
}

// SAFETY: the anchor cell is only written between the odd/even sequence
// transitions while write_lock is held, and readers validate the sequence
// around every sample. See read/write below.
#[allow(unsafe_code)]
unsafe impl Send for FreeRunningTimer {}
#[allow(unsafe_code)]
unsafe impl Sync for FreeRunningTimer {}

impl std::fmt::Debug for FreeRunningTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreeRunningTimer")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for FreeRunningTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeRunningTimer {
    /// Create a timer starting at zero.
    pub fn new() -> Self {
        Self {
            sequence: CachePadded::new(AtomicU64::new(0)),
            epoch_low: CachePadded::new(AtomicU32::new(0)),
            epoch_high: CachePadded::new(AtomicU32::new(0)),
            anchor: CachePadded::new(UnsafeCell::new(Instant::now())),
            write_lock: Mutex::new(()),
        }
    }

    /// Sample the epoch halves and anchor under seqlock protection.
    fn read_epoch(&self) -> (u64, Instant) {
        loop {
            let seq1 = self.sequence.load(Ordering::Acquire);

            // Odd sequence means a writer is mid-update.
            if seq1 & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }

            let low = self.epoch_low.load(Ordering::Acquire);
            let high = self.epoch_high.load(Ordering::Acquire);
            // SAFETY: validated by the sequence re-check below. A writer
            // that touched the cell concurrently bumps the sequence and
            // forces a retry.
            #[allow(unsafe_code)]
            let anchor = unsafe { *self.anchor.get() };

            let seq2 = self.sequence.load(Ordering::Acquire);
            if seq1 == seq2 {
                return ((u64::from(high) << 32) | u64::from(low), anchor);
            }

            std::hint::spin_loop();
        }
    }
}

impl InstrumentTimer for FreeRunningTimer {
    fn now_us(&self) -> u64 {
        let (epoch, anchor) = self.read_epoch();
        epoch.saturating_add(anchor.elapsed().as_micros() as u64)
    }

    fn set_us(&self, us: u64) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        // Open the write window (sequence becomes odd).
        self.sequence.fetch_add(1, Ordering::Release);

        // Both halves land inside the window, like the two hardware
        // register writes they model.
        self.epoch_low.store(us as u32, Ordering::Release);
        self.epoch_high.store((us >> 32) as u32, Ordering::Release);
        // SAFETY: writers are serialized by write_lock and readers retry
        // while the sequence is odd.
        #[allow(unsafe_code)]
        unsafe {
            *self.anchor.get() = Instant::now();
        }

        // Close the window (sequence becomes even again).
        self.sequence.fetch_add(1, Ordering::Release);
    }
}

/// A timer that only moves when told to. Used in tests to make
/// timestamp reads deterministic.
#[derive(Debug, Default)]
pub struct ManualTimer {
    now_us: Mutex<u64>,
}

impl ManualTimer {
    /// Create a manual timer starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manual timer starting at `us`.
    pub fn starting_at(us: u64) -> Self {
        Self {
            now_us: Mutex::new(us),
        }
    }

    /// Move the clock forward by `delta_us` microseconds.
    pub fn advance_us(&self, delta_us: u64) {
        let mut now = self.now_us.lock().unwrap_or_else(|e| e.into_inner());
        *now = now.saturating_add(delta_us);
    }
}

impl InstrumentTimer for ManualTimer {
    fn now_us(&self) -> u64 {
        *self.now_us.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_us(&self, us: u64) {
        *self.now_us.lock().unwrap_or_else(|e| e.into_inner()) = us;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_running_starts_near_zero() {
        let timer = FreeRunningTimer::new();
        assert!(timer.now_us() < US_PER_SECOND);
    }

    #[test]
    fn test_set_then_read() {
        let timer = FreeRunningTimer::new();
        let epoch = 42 * US_PER_SECOND;
        timer.set_us(epoch);
        let now = timer.now_us();
        assert!(now >= epoch);
        assert!(now < epoch + US_PER_SECOND);
    }

    #[test]
    fn test_set_crossing_half_boundary() {
        // An epoch above 2^32 µs exercises both halves.
        let timer = FreeRunningTimer::new();
        let epoch = (1u64 << 32) + 123;
        timer.set_us(epoch);
        let now = timer.now_us();
        assert!(now >= epoch);
        assert!(now < epoch + US_PER_SECOND);
    }

    #[test]
    fn test_monotonic_between_sets() {
        let timer = FreeRunningTimer::new();
        timer.set_us(US_PER_SECOND);
        let a = timer.now_us();
        let b = timer.now_us();
        assert!(b >= a);
    }

    #[test]
    fn test_concurrent_set_and_read() {
        use std::sync::Arc;
        use std::thread;

        let timer = Arc::new(FreeRunningTimer::new());
        let writer_timer = Arc::clone(&timer);
        let reader_timer = Arc::clone(&timer);

        // Writer jumps the clock forward in large strides. Each stride is
        // far bigger than test runtime, so a reader combining halves from
        // different epochs would see time run backwards.
        let writer = thread::spawn(move || {
            for i in 1..500u64 {
                writer_timer.set_us(i << 33);
            }
        });

        let reader = thread::spawn(move || {
            let mut last = 0u64;
            for _ in 0..500 {
                let now = reader_timer.now_us();
                assert!(now >= last, "clock went backwards: {last} -> {now}");
                last = now;
            }
        });

        writer.join().unwrap();
        reader.join().unwrap();
    }

    #[test]
    fn test_manual_timer_advances() {
        let timer = ManualTimer::starting_at(10);
        assert_eq!(timer.now_us(), 10);
        timer.advance_us(5);
        assert_eq!(timer.now_us(), 15);
        timer.set_us(100);
        assert_eq!(timer.now_us(), 100);
    }
}
