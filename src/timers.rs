//! Software timers backed by a single service task, the way an RTOS
//! timer daemon works: callbacks run in the daemon's context, not the
//! caller's, and tasks talk to the daemon only through its command
//! queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::board;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reload {
    /// Fires once, then goes dormant.
    OneShot,
    /// Re-arms itself after every expiry.
    Auto,
}

type Callback = Box<dyn FnMut() + Send>;

enum TimerCmd {
    Create {
        id: usize,
        label: String,
        period: Duration,
        reload: Reload,
        callback: Callback,
    },
    Start(usize),
    Stop(usize),
    Reset(usize),
    Shutdown,
}

struct TimerEntry {
    id: usize,
    label: String,
    period: Duration,
    reload: Reload,
    callback: Callback,
    /// `None` while dormant.
    deadline: Option<Instant>,
}

// ============================================================================
// The daemon task
// ============================================================================

struct TimerDaemon {
    inbox: Receiver<TimerCmd>,
    timers: Vec<TimerEntry>,
}

impl TimerDaemon {
    fn new(inbox: Receiver<TimerCmd>) -> Self {
        Self {
            inbox,
            timers: Vec::new(),
        }
    }

    fn run(mut self) {
        loop {
            let wait = match self.next_deadline() {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                // Nothing armed: sleep on the queue until a command
                // shows up.
                None => Duration::from_secs(3600),
            };
            match self.inbox.recv_timeout(wait) {
                Ok(TimerCmd::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(cmd) => self.apply(cmd),
                Err(RecvTimeoutError::Timeout) => {}
            }
            self.fire_due();
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().filter_map(|t| t.deadline).min()
    }

    fn apply(&mut self, cmd: TimerCmd) {
        match cmd {
            TimerCmd::Create {
                id,
                label,
                period,
                reload,
                callback,
            } => {
                // Created dormant; nothing happens until Start/Reset.
                self.timers.push(TimerEntry {
                    id,
                    label,
                    period,
                    reload,
                    callback,
                    deadline: None,
                });
            }
            TimerCmd::Start(id) | TimerCmd::Reset(id) => {
                // Reset and Start are the same operation here: re-arm
                // for a full period from now. Resetting a running
                // timer pushes its expiry out, which is the whole
                // trick behind the backlight lesson.
                if let Some(t) = self.timers.iter_mut().find(|t| t.id == id) {
                    t.deadline = Some(Instant::now() + t.period);
                }
            }
            TimerCmd::Stop(id) => {
                if let Some(t) = self.timers.iter_mut().find(|t| t.id == id) {
                    t.deadline = None;
                }
            }
            TimerCmd::Shutdown => {}
        }
    }

    fn fire_due(&mut self) {
        let now = Instant::now();
        for t in &mut self.timers {
            let Some(deadline) = t.deadline else { continue };
            if deadline > now {
                continue;
            }
            (t.callback)();
            t.deadline = match t.reload {
                Reload::OneShot => None,
                Reload::Auto => {
                    let mut next = deadline + t.period;
                    let after = Instant::now();
                    if next <= after {
                        // Missed periods coalesce rather than burst.
                        next = after + t.period;
                    }
                    Some(next)
                }
            };
        }
    }
}

// ============================================================================
// Handles
// ============================================================================

pub struct TimerService {
    tx: Sender<TimerCmd>,
    daemon: Option<JoinHandle<()>>,
    next_id: AtomicUsize,
}

#[derive(Clone)]
pub struct TimerHandle {
    id: usize,
    label: String,
    tx: Sender<TimerCmd>,
}

impl TimerService {
    /// Spawns the timer daemon task.
    pub fn start() -> Self {
        let (tx, rx) = unbounded();
        let spawned = thread::Builder::new()
            .name("tmr-svc".to_string())
            .spawn(move || TimerDaemon::new(rx).run());
        let daemon = match spawned {
            Ok(handle) => handle,
            Err(e) => board::restart(&format!("could not start timer service: {e}")),
        };
        Self {
            tx,
            daemon: Some(daemon),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Registers a timer with the daemon. It comes back dormant; call
    /// [`TimerHandle::start`] to arm it.
    pub fn create<F>(&self, label: &str, period: Duration, reload: Reload, callback: F) -> TimerHandle
    where
        F: FnMut() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(TimerCmd::Create {
            id,
            label: label.to_string(),
            period,
            reload,
            callback: Box::new(callback),
        });
        TimerHandle {
            id,
            label: label.to_string(),
            tx: self.tx.clone(),
        }
    }

    pub fn one_shot<F>(&self, label: &str, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnMut() + Send + 'static,
    {
        self.create(label, delay, Reload::OneShot, callback)
    }

    pub fn auto_reload<F>(&self, label: &str, period: Duration, callback: F) -> TimerHandle
    where
        F: FnMut() + Send + 'static,
    {
        self.create(label, period, Reload::Auto, callback)
    }

    /// Stops the daemon and waits for it to drain.
    pub fn shutdown(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        let _ = self.tx.send(TimerCmd::Shutdown);
        if let Some(d) = self.daemon.take() {
            let _ = d.join();
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.halt();
    }
}

impl TimerHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Arms the timer for a full period from now.
    pub fn start(&self) {
        let _ = self.tx.send(TimerCmd::Start(self.id));
    }

    /// Disarms without firing.
    pub fn stop(&self) {
        let _ = self.tx.send(TimerCmd::Stop(self.id));
    }

    /// Pushes the expiry a full period out from now, arming the timer
    /// if it was dormant.
    pub fn reset(&self) {
        let _ = self.tx.send(TimerCmd::Reset(self.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn test_created_timer_is_dormant() {
        let svc = TimerService::start();
        let fired = Arc::new(AtomicU32::new(0));
        let _timer = {
            let fired = Arc::clone(&fired);
            svc.one_shot("dormant", Duration::from_millis(10), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        svc.shutdown();
    }

    #[test]
    fn test_one_shot_fires_exactly_once() {
        let svc = TimerService::start();
        let fired = Arc::new(AtomicU32::new(0));
        let timer = {
            let fired = Arc::clone(&fired);
            svc.one_shot("once", Duration::from_millis(20), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        timer.start();
        thread::sleep(Duration::from_millis(120));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        svc.shutdown();
    }

    #[test]
    fn test_auto_reload_keeps_firing_until_stopped() {
        let svc = TimerService::start();
        let fired = Arc::new(AtomicU32::new(0));
        let timer = {
            let fired = Arc::clone(&fired);
            svc.auto_reload("tick", Duration::from_millis(15), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        timer.start();
        thread::sleep(Duration::from_millis(100));
        timer.stop();
        thread::sleep(Duration::from_millis(20));
        let count = fired.load(Ordering::SeqCst);
        assert!((3..=10).contains(&count), "expected ~6 fires, got {count}");
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), count, "timer fired after stop");
        svc.shutdown();
    }

    #[test]
    fn test_reset_defers_expiry() {
        let svc = TimerService::start();
        let fired = Arc::new(AtomicU32::new(0));
        let timer = {
            let fired = Arc::clone(&fired);
            svc.one_shot("backlight", Duration::from_millis(80), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        timer.start();
        thread::sleep(Duration::from_millis(40));
        timer.reset();
        // 50ms after reset is only 90ms after start, but the reset
        // moved the deadline to 40+80=120ms.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), 0, "reset did not defer expiry");
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        svc.shutdown();
    }
}
