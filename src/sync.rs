//! Counting/binary semaphores and a spinlock, shaped after the RTOS
//! primitives the lessons teach.
//!
//! The semaphore is the workhorse: `give` never blocks (so a simulated
//! ISR can call it), `take` blocks with an optional timeout, and giving
//! past the maximum count is reported as an error instead of silently
//! succeeding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SemError {
    #[error("semaphore already at its maximum count of {max}")]
    AtMax { max: usize },
}

// ============================================================================
// Counting semaphore (binary = max count 1)
// ============================================================================

pub struct Semaphore {
    max: usize,
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Counting semaphore holding up to `max` permits, starting with
    /// `initial` of them available.
    pub fn counting(max: usize, initial: usize) -> Self {
        assert!(max >= 1, "semaphore needs at least one permit slot");
        assert!(initial <= max, "initial count exceeds maximum");
        Self {
            max,
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Binary semaphore, initially empty. The classic signal: one task
    /// (or ISR) gives, another takes.
    pub fn binary() -> Self {
        Self::counting(1, 0)
    }

    /// Blocks until a permit is available, then consumes it.
    pub fn take(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.available.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// Consumes a permit if one is available right now.
    pub fn try_take(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Blocks up to `timeout` for a permit. Returns `false` when the
    /// wait expired empty-handed.
    pub fn take_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock().unwrap();
        loop {
            if *count > 0 {
                *count -= 1;
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .available
                .wait_timeout(count, deadline - now)
                .unwrap();
            count = guard;
        }
    }

    /// Returns a permit. Never blocks, which is what makes it legal in
    /// an interrupt handler. Giving past `max` fails, matching a
    /// counting semaphore that is already full.
    pub fn give(&self) -> Result<(), SemError> {
        let mut count = self.count.lock().unwrap();
        if *count == self.max {
            return Err(SemError::AtMax { max: self.max });
        }
        *count += 1;
        self.available.notify_one();
        Ok(())
    }

    /// Permits currently available. Demo reporting only; the value can
    /// be stale by the time the caller looks at it.
    pub fn count(&self) -> usize {
        *self.count.lock().unwrap()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

// ============================================================================
// Spinlock (the critical-section lock; guard-scoped)
// ============================================================================

/// Busy-wait lock for short critical sections, the stand-in for the
/// scheduler-disabling critical sections real firmware uses around
/// multi-step updates shared with an ISR.
pub struct SpinLock {
    locked: AtomicBool,
}

pub struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> SpinGuard<'_> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
        SpinGuard { lock: self }
    }

    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinGuard { lock: self })
        } else {
            None
        }
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_binary_semaphore_signals_once() {
        let sem = Semaphore::binary();
        assert!(!sem.try_take());
        sem.give().unwrap();
        assert!(sem.try_take());
        assert!(!sem.try_take());
    }

    #[test]
    fn test_give_past_max_is_an_error() {
        let sem = Semaphore::binary();
        sem.give().unwrap();
        assert_eq!(sem.give(), Err(SemError::AtMax { max: 1 }));
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn test_counting_semaphore_tracks_permits() {
        let sem = Semaphore::counting(5, 5);
        for _ in 0..5 {
            assert!(sem.try_take());
        }
        assert!(!sem.try_take());
        sem.give().unwrap();
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn test_take_blocks_until_given() {
        let sem = Arc::new(Semaphore::binary());
        let giver = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                sem.give().unwrap();
            })
        };
        let start = Instant::now();
        sem.take();
        assert!(start.elapsed() >= Duration::from_millis(20));
        giver.join().unwrap();
    }

    #[test]
    fn test_take_timeout_expires() {
        let sem = Semaphore::binary();
        let start = Instant::now();
        assert!(!sem.take_timeout(Duration::from_millis(40)));
        assert!(start.elapsed() >= Duration::from_millis(35));
    }

    #[test]
    fn test_take_timeout_succeeds_when_given() {
        let sem = Arc::new(Semaphore::binary());
        let giver = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                sem.give().unwrap();
            })
        };
        assert!(sem.take_timeout(Duration::from_millis(500)));
        giver.join().unwrap();
    }

    #[test]
    fn test_spinlock_mutual_exclusion() {
        use std::sync::atomic::AtomicU32;

        let lock = Arc::new(SpinLock::new());
        let inside = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    let _guard = lock.lock();
                    if inside.swap(true, Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    std::hint::spin_loop();
                    inside.store(false, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_spinlock_try_lock() {
        let lock = SpinLock::new();
        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }
}
