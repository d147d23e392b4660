//! Tasks as named threads, with the control operations the
//! task-management lessons need: delay, suspend/resume, and a
//! cooperative stop.
//!
//! Suspension and deletion are cooperative here: the task parks or
//! exits at its next `delay`/`checkpoint` call instead of being frozen
//! mid-instruction by the scheduler. The lessons call that difference
//! out where it matters.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::board;

#[derive(Default)]
struct ControlState {
    suspended: bool,
    stopped: bool,
}

struct Control {
    state: Mutex<ControlState>,
    changed: Condvar,
}

/// Handed to a task body; the task's view of itself.
pub struct TaskCtx {
    name: String,
    priority: u8,
    ctl: Arc<Control>,
}

/// The spawner's end: control and join.
pub struct TaskHandle {
    name: String,
    ctl: Arc<Control>,
    thread: JoinHandle<()>,
}

/// Starts a task. Priority is advisory for plain tasks (the host OS
/// schedules threads); the lessons about priority itself run on the
/// virtual core in [`crate::vcore`], where priority really arbitrates.
///
/// A failed spawn takes the device-restart path: a board that cannot
/// create its tasks has nothing sensible left to do.
pub fn spawn<F>(name: &str, priority: u8, body: F) -> TaskHandle
where
    F: FnOnce(&TaskCtx) + Send + 'static,
{
    let ctl = Arc::new(Control {
        state: Mutex::new(ControlState::default()),
        changed: Condvar::new(),
    });
    let ctx = TaskCtx {
        name: name.to_string(),
        priority,
        ctl: Arc::clone(&ctl),
    };
    let thread = match thread::Builder::new()
        .name(name.to_string())
        .spawn(move || body(&ctx))
    {
        Ok(handle) => handle,
        Err(e) => board::restart(&format!("could not create task '{name}': {e}")),
    };
    TaskHandle {
        name: name.to_string(),
        ctl,
        thread,
    }
}

impl TaskCtx {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// The task's `vTaskDelay`: sleeps for `dur`, honoring suspension
    /// and stop along the way. Returns `false` when the task has been
    /// stopped and should unwind its loop.
    pub fn delay(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        loop {
            if !self.checkpoint() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            // Sleep in short slices so stop/suspend take effect
            // promptly instead of after a full delay period.
            let chunk = (deadline - now).min(Duration::from_millis(20));
            thread::sleep(chunk);
        }
    }

    /// Control gate without sleeping: parks while suspended, returns
    /// `false` once stopped. Busy loops call this each iteration.
    pub fn checkpoint(&self) -> bool {
        let mut st = self.ctl.state.lock().unwrap();
        loop {
            if st.stopped {
                return false;
            }
            if !st.suspended {
                return true;
            }
            st = self.ctl.changed.wait(st).unwrap();
        }
    }
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parks the task at its next checkpoint.
    pub fn suspend(&self) {
        let mut st = self.ctl.state.lock().unwrap();
        st.suspended = true;
        self.ctl.changed.notify_all();
    }

    /// Lets a suspended task continue.
    pub fn resume(&self) {
        let mut st = self.ctl.state.lock().unwrap();
        st.suspended = false;
        self.ctl.changed.notify_all();
    }

    /// Asks the task to exit; it will observe this at its next
    /// checkpoint. Also wakes a suspended task so it can leave.
    pub fn stop(&self) {
        let mut st = self.ctl.state.lock().unwrap();
        st.stopped = true;
        st.suspended = false;
        self.ctl.changed.notify_all();
    }

    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }

    /// stop + join in one call; the common episode teardown.
    pub fn stop_and_join(self) -> thread::Result<()> {
        self.stop();
        self.thread.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_task_runs_and_joins() {
        let ran = Arc::new(AtomicU32::new(0));
        let handle = {
            let ran = Arc::clone(&ran);
            spawn("worker", 1, move |ctx| {
                assert_eq!(ctx.name(), "worker");
                assert_eq!(ctx.priority(), 1);
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };
        handle.join().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_interrupts_delay() {
        let clean_exit = Arc::new(AtomicU32::new(0));
        let handle = {
            let clean_exit = Arc::clone(&clean_exit);
            spawn("sleeper", 1, move |ctx| {
                // A delay far longer than the test; stop must cut it
                // short.
                if !ctx.delay(Duration::from_secs(30)) {
                    clean_exit.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        thread::sleep(Duration::from_millis(30));
        let start = Instant::now();
        handle.stop_and_join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(clean_exit.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_suspend_pauses_and_resume_continues() {
        let ticks = Arc::new(AtomicU32::new(0));
        let handle = {
            let ticks = Arc::clone(&ticks);
            spawn("counter", 1, move |ctx| {
                while ctx.delay(Duration::from_millis(5)) {
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        thread::sleep(Duration::from_millis(40));
        handle.suspend();
        // Grace period for an in-flight iteration to finish.
        thread::sleep(Duration::from_millis(20));
        let frozen = ticks.load(Ordering::SeqCst);
        assert!(frozen > 0, "task never ran before suspension");

        thread::sleep(Duration::from_millis(60));
        let still = ticks.load(Ordering::SeqCst);
        assert!(
            still <= frozen + 1,
            "task kept counting while suspended: {frozen} -> {still}"
        );

        handle.resume();
        thread::sleep(Duration::from_millis(40));
        assert!(ticks.load(Ordering::SeqCst) > still, "task never resumed");

        handle.stop_and_join().unwrap();
    }
}
