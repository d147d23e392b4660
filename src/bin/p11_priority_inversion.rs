//! Lesson 11: Priority Inversion
//! Task M Steals the CPU Out From Under Task H
//!
//! The Mars Pathfinder failure mode on one simulated core. Low-priority
//! L takes a lock and gets preempted by medium-priority M; high-priority
//! H blocks on the lock, so the most urgent task in the system waits on
//! the least urgent one's tormentor. A priority-inheritance mutex caps
//! the damage at one critical section.
//!
//! Run with: cargo run --bin p11_priority_inversion

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use rtos_patterns::sync::Semaphore;
use rtos_patterns::vcore::{PrioMutex, VirtualCore};
use rtos_patterns::{board, clock};

/// CPU time each critical section needs.
const CRIT_SEC_WAIT: Duration = Duration::from_millis(250);
/// CPU time task M burns through once it gets going.
const MED_WAIT: Duration = Duration::from_millis(2500);

#[derive(Clone, Copy)]
enum LockKind {
    /// A binary semaphore used as a lock: no inheritance, the 1997
    /// configuration.
    Semaphore,
    /// Mutex whose holder inherits its highest waiter's priority.
    Inherit,
}

fn main() {
    clock::init();
    board::banner("Priority Inversion Demonstration");

    println!("=== Part 1: lock is a plain binary semaphore ===\n");
    let waited = run_round(LockKind::Semaphore);
    println!(
        "\n{}",
        format!(
            "Task H (priority 3) sat blocked for {waited} ms while Task M (priority 2) worked"
        )
        .yellow()
    );

    println!("\n=== Part 2: lock inherits the waiter's priority ===\n");
    let waited = run_round(LockKind::Inherit);
    println!(
        "\n{}",
        format!("with inheritance, Task H's wait shrank to {waited} ms, about one critical section")
            .green()
    );

    println!("\n=== Key Points ===");
    println!("1. H never shares data with M, yet M decides when H runs;");
    println!("   that is what makes the inversion 'unbounded'");
    println!("2. Inheritance lends H's priority to whoever holds the lock,");
    println!("   so L sprints through its critical section and gets out");
    println!("3. Pathfinder's fix was one flag: its VxWorks mutexes already");
    println!("   supported inheritance, just not by default");
}

/// One inversion episode. Returns how long task H waited for the lock.
fn run_round(kind: LockKind) -> u64 {
    let core = VirtualCore::new("core1");
    let task_l = core.attach("task-l", 1);
    let task_m = core.attach("task-m", 2);
    let task_h = core.attach("task-h", 3);
    let probe = task_l.probe();

    let sem = Arc::new(Semaphore::counting(1, 1));
    let pm = Arc::new(PrioMutex::new(&core));

    // The monitor watches L's effective priority from outside; in
    // part 2 it catches the inheritance happening.
    let monitor_stop = Arc::new(AtomicBool::new(false));
    let monitor = {
        let stop = Arc::clone(&monitor_stop);
        thread::spawn(move || {
            let mut last = probe.effective();
            while !stop.load(Ordering::Relaxed) {
                let now = probe.effective();
                if now != last {
                    println!(
                        "{} [monitor] task-l effective priority {last} -> {now}",
                        clock::stamp()
                    );
                    last = now;
                }
                thread::sleep(Duration::from_millis(10));
            }
        })
    };

    let l_thread = {
        let sem = Arc::clone(&sem);
        let pm = Arc::clone(&pm);
        thread::spawn(move || {
            println!("{} [task-l] Task L Trying To Take Lock...", clock::stamp());
            let started = clock::now_ms();
            let guard = match kind {
                LockKind::Semaphore => {
                    sem.take();
                    None
                }
                LockKind::Inherit => Some(pm.lock(&task_l)),
            };
            println!(
                "{} [task-l] Task L Rec'd Lock. Spent {} ms waiting for the lock. Working in Critical Section...",
                clock::stamp(),
                clock::now_ms() - started
            );

            task_l.run(CRIT_SEC_WAIT);

            println!("{} [task-l] Task L *DONE!* Releasing Lock...", clock::stamp());
            match kind {
                LockKind::Semaphore => sem.give().unwrap(),
                LockKind::Inherit => drop(guard),
            }
        })
    };
    thread::sleep(Duration::from_millis(50));

    let h_thread = {
        let sem = Arc::clone(&sem);
        let pm = Arc::clone(&pm);
        thread::spawn(move || -> u64 {
            println!("{} [task-h] Task H Trying To Take Lock...", clock::stamp());
            let started = clock::now_ms();
            let guard = match kind {
                LockKind::Semaphore => {
                    sem.take();
                    None
                }
                LockKind::Inherit => Some(pm.lock(&task_h)),
            };
            let waited = clock::now_ms() - started;
            println!(
                "{} [task-h] Task H Got Lock...Spent {waited} ms Waiting For Lock. Now Doing Work...",
                clock::stamp()
            );

            task_h.run(CRIT_SEC_WAIT);

            println!("{} [task-h] Task H *DONE!* Releasing Lock...", clock::stamp());
            match kind {
                LockKind::Semaphore => sem.give().unwrap(),
                LockKind::Inherit => drop(guard),
            }
            waited
        })
    };
    thread::sleep(Duration::from_millis(50));

    let m_thread = thread::spawn(move || {
        println!("{} [task-m] Task M doing some work...", clock::stamp());
        task_m.run(MED_WAIT);
        println!("{} [task-m] Task M *DONE!*", clock::stamp());
    });

    l_thread.join().unwrap();
    let waited = h_thread.join().unwrap();
    m_thread.join().unwrap();
    monitor_stop.store(true, Ordering::Relaxed);
    monitor.join().unwrap();
    waited
}
