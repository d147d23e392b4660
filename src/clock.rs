//! Milliseconds-since-boot timebase shared by every lesson.
//!
//! Demo output lines are prefixed with a timestamp so interleavings of
//! concurrent tasks can be read off the console, the same way serial
//! logs are read off a dev board.

use std::time::{Duration, Instant};

use lazy_static::lazy_static;

lazy_static! {
    static ref BOOT: Instant = Instant::now();
}

/// Pins the boot instant. Call first thing in `main` so timestamps
/// start near zero instead of at the first log line.
pub fn init() {
    lazy_static::initialize(&BOOT);
}

/// Time elapsed since [`init`] (or since the first call, whichever
/// came first).
pub fn uptime() -> Duration {
    BOOT.elapsed()
}

/// Uptime in whole milliseconds.
pub fn now_ms() -> u64 {
    BOOT.elapsed().as_millis() as u64
}

/// Right-aligned timestamp prefix for demo log lines, e.g. `[  1503ms]`.
pub fn stamp() -> String {
    format!("[{:>6}ms]", now_ms())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_now_ms_is_monotonic() {
        init();
        let a = now_ms();
        thread::sleep(Duration::from_millis(10));
        let b = now_ms();
        assert!(b >= a + 5, "clock went backwards or stalled: {} -> {}", a, b);
    }

    #[test]
    fn test_stamp_format() {
        init();
        let s = stamp();
        assert!(s.starts_with('['));
        assert!(s.ends_with("ms]"));
    }
}
