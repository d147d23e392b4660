//! Simulated hardware interrupts and the state-sharing shapes that go
//! with them.
//!
//! A [`HwTimer`] plays the role of a periodic timer interrupt: a
//! dedicated thread fires the handler at a fixed cadence. The handler
//! runs in "ISR context" by convention: it must not block, so it talks
//! to tasks through atomics, [`IsrCell`], semaphore gives and the
//! [`DoubleBuffer`] handoff, exactly the menu the ISR lessons walk
//! through.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use critical_section::Mutex;

use crate::board;
use crate::sync::{Semaphore, SpinLock};

// ============================================================================
// Periodic timer "interrupt"
// ============================================================================

pub struct HwTimer {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HwTimer {
    /// Arms an auto-reload timer: `handler` fires every `period` until
    /// [`HwTimer::stop`] (or drop). The handler is the ISR body; keep
    /// it short and non-blocking.
    pub fn every<F>(label: &str, period: Duration, mut handler: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                let mut next = Instant::now() + period;
                loop {
                    if flag.load(Ordering::Relaxed) {
                        break;
                    }
                    let now = Instant::now();
                    if now < next {
                        thread::sleep((next - now).min(Duration::from_millis(20)));
                        continue;
                    }
                    handler();
                    next += period;
                    let after = Instant::now();
                    if next < after {
                        // Handler overran; missed periods coalesce the
                        // way a latched interrupt flag does.
                        next = after + period;
                    }
                }
            });
        let thread = match spawned {
            Ok(handle) => handle,
            Err(e) => board::restart(&format!("could not start timer '{label}': {e}")),
        };
        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Disarms the timer and waits for the handler thread to exit.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for HwTimer {
    fn drop(&mut self) {
        self.halt();
    }
}

// ============================================================================
// Critical-section cell for multi-word state shared with an ISR
// ============================================================================

/// State too wide for a single atomic, shared between task and ISR
/// context. Every access runs inside a critical section; keep the
/// closures short.
pub struct IsrCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> IsrCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| {
            let mut value = self.inner.borrow(cs).borrow_mut();
            f(&mut value)
        })
    }

    pub fn get(&self) -> T
    where
        T: Copy,
    {
        critical_section::with(|cs| *self.inner.borrow(cs).borrow())
    }

    pub fn set(&self, value: T) {
        critical_section::with(|cs| {
            *self.inner.borrow(cs).borrow_mut() = value;
        });
    }
}

// ============================================================================
// Double buffer: ISR fills one half while a task drains the other
// ============================================================================

/// What happened to a pushed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// Landed in the write half.
    Stored,
    /// The write half just filled and was handed to the reader.
    Handoff,
    /// Both halves busy: the reader still owns the other half, so
    /// samples are being dropped until it calls `finish_read`.
    Overrun,
}

/// Two fixed buffers with the classic swap protocol: the ISR fills one
/// half a sample at a time; when it fills, ownership flips and the
/// reader is signaled. If the reader is still chewing on the previous
/// half, the overrun flag goes up and samples drop on the floor.
pub struct DoubleBuffer<T, const N: usize> {
    halves: [StdMutex<[T; N]>; 2],
    write_sel: AtomicUsize,
    fill: AtomicUsize,
    overrun: AtomicBool,
    done_reading: Semaphore,
    ready: Semaphore,
    swap_lock: SpinLock,
}

impl<T: Copy + Default, const N: usize> DoubleBuffer<T, N> {
    pub fn new() -> Self {
        Self {
            halves: [
                StdMutex::new([T::default(); N]),
                StdMutex::new([T::default(); N]),
            ],
            write_sel: AtomicUsize::new(0),
            fill: AtomicUsize::new(0),
            overrun: AtomicBool::new(false),
            done_reading: Semaphore::counting(1, 1),
            ready: Semaphore::binary(),
            swap_lock: SpinLock::new(),
        }
    }

    /// ISR side: store one sample, swapping halves when the write half
    /// fills. Never blocks.
    pub fn push(&self, value: T) -> Push {
        let fill = self.fill.load(Ordering::Relaxed);
        if fill < N {
            let sel = self.write_sel.load(Ordering::Relaxed);
            self.halves[sel].lock().unwrap()[fill] = value;
            self.fill.store(fill + 1, Ordering::Relaxed);
            if fill + 1 < N {
                return Push::Stored;
            }
        }
        // Write half is full. The swap decision pairs with
        // `finish_read` on the reader side, so both run under the same
        // spinlock.
        let _cs = self.swap_lock.lock();
        if self.done_reading.try_take() {
            self.write_sel.fetch_xor(1, Ordering::Relaxed);
            self.fill.store(0, Ordering::Relaxed);
            let _ = self.ready.give();
            Push::Handoff
        } else {
            self.overrun.store(true, Ordering::Relaxed);
            Push::Overrun
        }
    }

    /// Task side: block until a full half is handed over.
    pub fn wait_ready(&self) {
        self.ready.take();
    }

    pub fn wait_ready_timeout(&self, timeout: Duration) -> bool {
        self.ready.take_timeout(timeout)
    }

    /// Task side: borrow the full half. Only valid between
    /// `wait_ready` and `finish_read`; the protocol guarantees the ISR
    /// is writing the other half meanwhile.
    pub fn with_ready<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let sel = 1 - self.write_sel.load(Ordering::Relaxed);
        let half = self.halves[sel].lock().unwrap();
        f(&half[..])
    }

    /// Task side: return the half to the ISR and clear the overrun
    /// flag in one indivisible step.
    pub fn finish_read(&self) {
        let _cs = self.swap_lock.lock();
        self.overrun.store(false, Ordering::Relaxed);
        let _ = self.done_reading.give();
    }

    /// True once samples have been dropped because the reader fell
    /// behind. Cleared by `finish_read`.
    pub fn overrun(&self) -> bool {
        self.overrun.load(Ordering::Relaxed)
    }
}

impl<T: Copy + Default, const N: usize> Default for DoubleBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn test_hw_timer_fires_periodically() {
        let count = Arc::new(AtomicU32::new(0));
        let timer = {
            let count = Arc::clone(&count);
            HwTimer::every("tick", Duration::from_millis(10), move || {
                count.fetch_add(1, Ordering::Relaxed);
            })
        };
        thread::sleep(Duration::from_millis(105));
        timer.stop();
        let fired = count.load(Ordering::Relaxed);
        assert!(
            (4..=20).contains(&fired),
            "expected roughly 10 fires in 100ms, got {fired}"
        );
        let after_stop = count.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::Relaxed), after_stop);
    }

    #[test]
    fn test_isr_cell_compound_update() {
        let cell: IsrCell<(u32, u32)> = IsrCell::new((0, 0));
        cell.with(|v| {
            v.0 = 7;
            v.1 = 9;
        });
        assert_eq!(cell.get(), (7, 9));
        cell.set((1, 2));
        assert_eq!(cell.get(), (1, 2));
    }

    #[test]
    fn test_double_buffer_handoff() {
        let db: DoubleBuffer<u16, 4> = DoubleBuffer::new();
        assert_eq!(db.push(10), Push::Stored);
        assert_eq!(db.push(11), Push::Stored);
        assert_eq!(db.push(12), Push::Stored);
        assert_eq!(db.push(13), Push::Handoff);

        db.wait_ready();
        let sum: u32 = db.with_ready(|half| half.iter().map(|&v| v as u32).sum());
        assert_eq!(sum, 10 + 11 + 12 + 13);
        db.finish_read();

        // Next batch lands in the other half.
        for v in [20, 21, 22] {
            assert_eq!(db.push(v), Push::Stored);
        }
        assert_eq!(db.push(23), Push::Handoff);
        db.wait_ready();
        let first = db.with_ready(|half| half[0]);
        assert_eq!(first, 20);
        db.finish_read();
    }

    #[test]
    fn test_double_buffer_overrun_when_reader_lags() {
        let db: DoubleBuffer<u16, 2> = DoubleBuffer::new();
        assert_eq!(db.push(1), Push::Stored);
        assert_eq!(db.push(2), Push::Handoff);

        // Reader has not finished; fill the second half too.
        assert_eq!(db.push(3), Push::Stored);
        assert_eq!(db.push(4), Push::Overrun);
        assert!(db.overrun());
        // Everything past this point drops.
        assert_eq!(db.push(5), Push::Overrun);

        db.wait_ready();
        db.with_ready(|half| assert_eq!(half, &[1, 2]));
        db.finish_read();
        assert!(!db.overrun());

        // The stalled full half gets handed over on the next push.
        assert_eq!(db.push(6), Push::Handoff);
        db.wait_ready();
        db.with_ready(|half| assert_eq!(half, &[3, 4]));
        db.finish_read();
    }
}
