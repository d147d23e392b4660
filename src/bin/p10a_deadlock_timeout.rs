//! Lesson 10a: Deadlock
//! Breaking the Deadlock: Timeouts, Then Lock Ordering
//!
//! Same two tasks and mutexes as lesson 10, two different cures. A
//! timeout on the second take lets a task back out and release what it
//! holds, trading deadlock for retries. Taking the locks in one global
//! order prevents the cycle outright and retries drop to zero.
//!
//! Run with: cargo run --bin p10a_deadlock_timeout

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use rand::Rng;
use rtos_patterns::sync::Semaphore;
use rtos_patterns::{board, clock, task};

const MUTEX_TIMEOUT: Duration = Duration::from_millis(300);
const WORK_TIME: Duration = Duration::from_millis(150);
const SLEEP_TIME: Duration = Duration::from_millis(150);
const FORCE_DELAY: Duration = Duration::from_millis(25);
const ROUNDS: u32 = 3;

struct Locks {
    mutex1: Semaphore,
    mutex2: Semaphore,
}

impl Locks {
    fn new() -> Self {
        Self {
            mutex1: Semaphore::counting(1, 1),
            mutex2: Semaphore::counting(1, 1),
        }
    }
}

fn main() {
    clock::init();
    board::banner("Deadlock Timeout Fix Demo");

    println!("=== Part 1: back out on timeout ===\n");
    let retries = run_with_timeouts();
    println!(
        "\n{}",
        format!("both tasks finished {ROUNDS} rounds; {retries} backed-out attempts along the way")
            .yellow()
    );

    println!("\n=== Part 2: one global lock order ===\n");
    let retries = run_ordered();
    println!(
        "\n{}",
        format!("both tasks finished {ROUNDS} rounds; {retries} backed-out attempts").green()
    );

    println!("\n=== Key Points ===");
    println!("1. The timeout removes 'hold and wait': a task that cannot");
    println!("   get the second lock gives the first one back");
    println!("2. Backing out costs retries and needs a little random");
    println!("   backoff, or both tasks retry in lockstep forever");
    println!("3. Agreeing that Mutex 1 always comes before Mutex 2 removes");
    println!("   the circular wait, and with it every retry");
}

fn run_with_timeouts() -> u32 {
    let locks = Arc::new(Locks::new());
    let retries = Arc::new(AtomicU32::new(0));

    // Task A wants 1 then 2; task B wants 2 then 1.
    let a = spawn_worker("task-a", Arc::clone(&locks), Arc::clone(&retries), false);
    let b = spawn_worker("task-b", Arc::clone(&locks), Arc::clone(&retries), true);
    a.join().unwrap();
    b.join().unwrap();
    retries.load(Ordering::Relaxed)
}

fn run_ordered() -> u32 {
    let locks = Arc::new(Locks::new());
    let retries = Arc::new(AtomicU32::new(0));

    // Both tasks agree: Mutex 1 first, always.
    let a = spawn_worker("task-a", Arc::clone(&locks), Arc::clone(&retries), false);
    let b = spawn_worker("task-b", Arc::clone(&locks), Arc::clone(&retries), false);
    a.join().unwrap();
    b.join().unwrap();
    retries.load(Ordering::Relaxed)
}

fn spawn_worker(
    name: &'static str,
    locks: Arc<Locks>,
    retries: Arc<AtomicU32>,
    reversed: bool,
) -> rtos_patterns::task::TaskHandle {
    task::spawn(name, 1, move |_ctx| {
        let (first, second, first_no, second_no) = if reversed {
            (&locks.mutex2, &locks.mutex1, 2, 1)
        } else {
            (&locks.mutex1, &locks.mutex2, 1, 2)
        };
        let mut rng = rand::thread_rng();
        let mut done = 0;

        while done < ROUNDS {
            if !first.take_timeout(MUTEX_TIMEOUT) {
                println!(
                    "{} [{name}] Timed Out Waiting For Mutex {first_no}",
                    clock::stamp()
                );
                retries.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            println!("{} [{name}] Took Mutex {first_no}...", clock::stamp());
            thread::sleep(FORCE_DELAY);

            if !second.take_timeout(MUTEX_TIMEOUT) {
                first.give().unwrap();
                println!(
                    "{} [{name}] Timed Out Waiting For Mutex {second_no} & Released Mutex {first_no}",
                    clock::stamp()
                );
                retries.fetch_add(1, Ordering::Relaxed);
                // Without jitter the two tasks back off in lockstep and
                // collide again on the next attempt.
                thread::sleep(Duration::from_millis(rng.gen_range(10..50)));
                continue;
            }
            println!("{} [{name}] Took Mutex {second_no}...", clock::stamp());
            println!("{} [{name}] Working in Critical Section", clock::stamp());
            thread::sleep(WORK_TIME);

            second.give().unwrap();
            first.give().unwrap();
            println!(
                "{} [{name}] Released Both Mutexes: Going To Sleep",
                clock::stamp()
            );
            done += 1;
            thread::sleep(SLEEP_TIME);
        }
    })
}
