//! A one-core priority arbiter for the lessons where priority itself
//! is the subject: preemption, unbounded priority inversion, and the
//! starvation that trips a watchdog.
//!
//! Host threads are scheduled by the OS, which happily runs a "low
//! priority" thread on a spare core and hides the whole story. Tasks
//! attached to a [`VirtualCore`] therefore compete for one simulated
//! CPU: work advances only while a task holds the core, and the core
//! always goes to the highest effective priority in the ready set,
//! preempting at slice boundaries.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::board;
use crate::clock;

/// Scheduling quantum: a preempted task loses the core within one
/// slice of a higher-priority task becoming ready.
pub const SLICE: Duration = Duration::from_millis(2);

struct ReadyEntry {
    id: usize,
    base: u8,
    boost: Arc<AtomicU8>,
    /// Round-robin position among equal priorities; refreshed each
    /// time the task yields the core.
    seq: u64,
}

impl ReadyEntry {
    fn eff(&self) -> u8 {
        self.base.max(self.boost.load(Ordering::Relaxed))
    }
}

#[derive(Default)]
struct CoreState {
    running: Option<usize>,
    ready: Vec<ReadyEntry>,
    next_seq: u64,
}

struct CoreShared {
    label: String,
    next_task: AtomicUsize,
    state: Mutex<CoreState>,
    changed: Condvar,
}

#[derive(Clone)]
pub struct VirtualCore {
    shared: Arc<CoreShared>,
}

/// A task bound to one core. Move it into the thread that plays the
/// task; grab a [`PriorityProbe`] first if a monitor wants to watch
/// its effective priority from outside.
pub struct CoreTask {
    core: VirtualCore,
    id: usize,
    label: String,
    base: u8,
    boost: Arc<AtomicU8>,
}

/// Read-only view of a task's effective priority.
pub struct PriorityProbe {
    base: u8,
    boost: Arc<AtomicU8>,
}

impl PriorityProbe {
    pub fn effective(&self) -> u8 {
        self.base.max(self.boost.load(Ordering::Relaxed))
    }
}

impl VirtualCore {
    pub fn new(label: &str) -> Self {
        Self {
            shared: Arc::new(CoreShared {
                label: label.to_string(),
                next_task: AtomicUsize::new(0),
                state: Mutex::new(CoreState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn attach(&self, label: &str, base_priority: u8) -> CoreTask {
        CoreTask {
            core: self.clone(),
            id: self.shared.next_task.fetch_add(1, Ordering::Relaxed),
            label: label.to_string(),
            base: base_priority,
            boost: Arc::new(AtomicU8::new(0)),
        }
    }

    fn enter_ready(&self, task: &CoreTask) {
        let mut st = self.shared.state.lock().unwrap();
        let seq = st.next_seq;
        st.next_seq += 1;
        st.ready.push(ReadyEntry {
            id: task.id,
            base: task.base,
            boost: Arc::clone(&task.boost),
            seq,
        });
        self.shared.changed.notify_all();
    }

    fn leave_ready(&self, task: &CoreTask) {
        let mut st = self.shared.state.lock().unwrap();
        st.ready.retain(|e| e.id != task.id);
        if st.running == Some(task.id) {
            st.running = None;
        }
        self.shared.changed.notify_all();
    }

    /// Blocks until this task is the highest effective priority in the
    /// ready set and the core is free, then takes the core.
    fn claim(&self, task: &CoreTask) {
        let mut st = self.shared.state.lock().unwrap();
        loop {
            if st.running.is_none() && top_id(&st) == Some(task.id) {
                st.running = Some(task.id);
                return;
            }
            st = self.shared.changed.wait(st).unwrap();
        }
    }

    fn release(&self, task: &CoreTask) {
        let mut st = self.shared.state.lock().unwrap();
        if st.running == Some(task.id) {
            st.running = None;
        }
        // Rotate to the back of its priority band so equals share the
        // core round-robin.
        let seq = st.next_seq;
        st.next_seq += 1;
        if let Some(e) = st.ready.iter_mut().find(|e| e.id == task.id) {
            e.seq = seq;
        }
        self.shared.changed.notify_all();
    }

    /// Wakes every claim loop so a priority change takes effect at the
    /// next slice boundary.
    fn kick(&self) {
        self.shared.changed.notify_all();
    }
}

fn top_id(st: &CoreState) -> Option<usize> {
    st.ready
        .iter()
        .max_by_key(|e| (e.eff(), std::cmp::Reverse(e.seq)))
        .map(|e| e.id)
}

impl CoreTask {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn base_priority(&self) -> u8 {
        self.base
    }

    pub fn effective_priority(&self) -> u8 {
        self.base.max(self.boost.load(Ordering::Relaxed))
    }

    pub fn probe(&self) -> PriorityProbe {
        PriorityProbe {
            base: self.base,
            boost: Arc::clone(&self.boost),
        }
    }

    /// Consumes `work` worth of CPU in preemptible slices. The task
    /// only advances while it holds the core.
    pub fn run(&self, work: Duration) {
        self.core.enter_ready(self);
        let mut remaining = work;
        while remaining > Duration::ZERO {
            self.core.claim(self);
            let slice = remaining.min(SLICE);
            thread::sleep(slice);
            self.core.release(self);
            remaining = remaining.saturating_sub(slice);
        }
        self.core.leave_ready(self);
    }

    /// Consumes `work` without ever yielding: the spinlock/critical-
    /// section model. Even higher-priority tasks wait until this
    /// returns, which is exactly how a hogged critical section starves
    /// the rest of the core.
    pub fn run_locked(&self, work: Duration) {
        self.core.enter_ready(self);
        self.core.claim(self);
        thread::sleep(work);
        self.core.release(self);
        self.core.leave_ready(self);
    }

    /// Blocked-state delay: the task leaves the core alone entirely.
    pub fn sleep(&self, dur: Duration) {
        thread::sleep(dur);
    }
}

// ============================================================================
// Mutex with priority inheritance
// ============================================================================

struct PmState {
    owner: Option<PmOwner>,
}

struct PmOwner {
    id: usize,
    boost: Arc<AtomicU8>,
}

/// Lock whose holder inherits the priority of its highest waiter, the
/// fix for unbounded priority inversion. Compare with taking a plain
/// [`crate::sync::Semaphore`] as a lock, which leaves the holder
/// priority where it was.
pub struct PrioMutex {
    core: VirtualCore,
    state: Mutex<PmState>,
    freed: Condvar,
}

pub struct PmGuard<'a> {
    mutex: &'a PrioMutex,
}

impl PrioMutex {
    pub fn new(core: &VirtualCore) -> Self {
        Self {
            core: core.clone(),
            state: Mutex::new(PmState { owner: None }),
            freed: Condvar::new(),
        }
    }

    pub fn lock(&self, task: &CoreTask) -> PmGuard<'_> {
        let mut st = self.state.lock().unwrap();
        loop {
            match &st.owner {
                None => {
                    st.owner = Some(PmOwner {
                        id: task.id,
                        boost: Arc::clone(&task.boost),
                    });
                    return PmGuard { mutex: self };
                }
                Some(owner) => {
                    // Donate our effective priority to the holder and
                    // nudge the core so the change is seen.
                    owner.boost.fetch_max(task.effective_priority(), Ordering::Relaxed);
                    self.core.kick();
                    st = self.freed.wait(st).unwrap();
                }
            }
        }
    }

    pub fn holder(&self) -> Option<usize> {
        self.state.lock().unwrap().owner.as_ref().map(|o| o.id)
    }
}

impl Drop for PmGuard<'_> {
    fn drop(&mut self) {
        let mut st = self.mutex.state.lock().unwrap();
        if let Some(owner) = st.owner.take() {
            // Inherited priority ends with the critical section.
            owner.boost.store(0, Ordering::Relaxed);
        }
        self.mutex.freed.notify_all();
        self.mutex.core.kick();
    }
}

// ============================================================================
// Task watchdog
// ============================================================================

/// Expires when [`Watchdog::feed`] stops arriving within the timeout,
/// the way the interrupt watchdog catches a core that stopped
/// servicing anything.
pub struct Watchdog {
    last_feed: Arc<AtomicU64>,
    fired: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    checker: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn arm(label: &str, timeout: Duration) -> Self {
        let last_feed = Arc::new(AtomicU64::new(clock::now_ms()));
        let fired = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let spawned = {
            let last_feed = Arc::clone(&last_feed);
            let fired = Arc::clone(&fired);
            let stop = Arc::clone(&stop);
            let timeout_ms = timeout.as_millis() as u64;
            thread::Builder::new().name(label.to_string()).spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let starved = clock::now_ms().saturating_sub(last_feed.load(Ordering::Relaxed));
                    if starved > timeout_ms {
                        fired.store(true, Ordering::Relaxed);
                        break;
                    }
                    thread::sleep(Duration::from_millis(25));
                }
            })
        };
        let checker = match spawned {
            Ok(handle) => handle,
            Err(e) => board::restart(&format!("could not arm watchdog '{label}': {e}")),
        };
        Self {
            last_feed,
            fired,
            stop,
            checker: Some(checker),
        }
    }

    pub fn feed(&self) {
        self.last_feed.store(clock::now_ms(), Ordering::Relaxed);
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::Relaxed)
    }

    /// Polls until the watchdog fires or `max_wait` passes.
    pub fn wait_fired(&self, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        while Instant::now() < deadline {
            if self.fired() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.fired()
    }

    pub fn disarm(mut self) {
        self.halt();
    }

    /// Shareable feed handle for the task whose job is keeping the
    /// watchdog happy.
    pub fn feeder(&self) -> WatchdogFeeder {
        WatchdogFeeder {
            last_feed: Arc::clone(&self.last_feed),
        }
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(c) = self.checker.take() {
            let _ = c.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.halt();
    }
}

#[derive(Clone)]
pub struct WatchdogFeeder {
    last_feed: Arc<AtomicU64>,
}

impl WatchdogFeeder {
    pub fn feed(&self) {
        self.last_feed.store(clock::now_ms(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn record(events: &Arc<StdMutex<Vec<String>>>, what: &str) {
        events.lock().unwrap().push(what.to_string());
    }

    #[test]
    fn test_higher_priority_finishes_first() {
        let core = VirtualCore::new("core0");
        let events = Arc::new(StdMutex::new(Vec::new()));

        let low = core.attach("L", 1);
        let high = core.attach("H", 3);

        let low_thread = {
            let events = Arc::clone(&events);
            thread::spawn(move || {
                record(&events, "L start");
                low.run(Duration::from_millis(60));
                record(&events, "L done");
            })
        };
        // Let L get going before H shows up.
        thread::sleep(Duration::from_millis(10));
        let high_thread = {
            let events = Arc::clone(&events);
            thread::spawn(move || {
                record(&events, "H start");
                high.run(Duration::from_millis(40));
                record(&events, "H done");
            })
        };

        low_thread.join().unwrap();
        high_thread.join().unwrap();

        let log = events.lock().unwrap();
        let pos = |s: &str| log.iter().position(|e| e == s).unwrap();
        assert!(
            pos("H done") < pos("L done"),
            "high priority should finish first: {log:?}"
        );
    }

    #[test]
    fn test_run_locked_blocks_even_higher_priority() {
        let core = VirtualCore::new("core0");
        let hog = core.attach("hog", 1);
        let urgent = core.attach("urgent", 5);

        let hog_thread = thread::spawn(move || {
            hog.run_locked(Duration::from_millis(120));
        });
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        urgent.run(Duration::from_millis(5));
        let waited = started.elapsed();

        hog_thread.join().unwrap();
        assert!(
            waited >= Duration::from_millis(60),
            "urgent task should have been held out by the locked section, waited {waited:?}"
        );
    }

    #[test]
    fn test_prio_mutex_boosts_holder() {
        let core = VirtualCore::new("core0");
        let mutex = Arc::new(PrioMutex::new(&core));

        let low = core.attach("L", 1);
        let low_probe = low.probe();
        let high = core.attach("H", 3);

        let low_thread = {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                let guard = mutex.lock(&low);
                low.run(Duration::from_millis(80));
                drop(guard);
            })
        };
        thread::sleep(Duration::from_millis(20));

        let high_thread = {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                let guard = mutex.lock(&high);
                drop(guard);
            })
        };

        // While H is blocked on the mutex, L runs with H's priority.
        thread::sleep(Duration::from_millis(30));
        assert_eq!(low_probe.effective(), 3, "holder should inherit waiter priority");

        low_thread.join().unwrap();
        high_thread.join().unwrap();
        assert_eq!(low_probe.effective(), 1, "boost should end with the critical section");
        assert_eq!(mutex.holder(), None);
    }

    #[test]
    fn test_equal_priorities_both_make_progress() {
        let core = VirtualCore::new("core0");
        let a = core.attach("A", 2);
        let b = core.attach("B", 2);

        let start = Instant::now();
        let ta = thread::spawn(move || a.run(Duration::from_millis(40)));
        let tb = thread::spawn(move || b.run(Duration::from_millis(40)));
        ta.join().unwrap();
        tb.join().unwrap();
        // Serialized on one core: total is at least the sum, without
        // either task being starved forever.
        let total = start.elapsed();
        assert!(total >= Duration::from_millis(75), "core ran both at once: {total:?}");
        assert!(total < Duration::from_secs(5), "round robin stalled: {total:?}");
    }

    #[test]
    fn test_watchdog_fires_only_when_starved() {
        let wd = Watchdog::arm("iwdt", Duration::from_millis(80));
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(20));
            wd.feed();
        }
        assert!(!wd.fired(), "watchdog fired despite regular feeding");

        // Stop feeding.
        assert!(wd.wait_fired(Duration::from_millis(400)), "watchdog never fired");
        wd.disarm();
    }
}
