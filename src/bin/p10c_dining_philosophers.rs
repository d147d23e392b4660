//! Lesson 10c: Deadlock
//! The Dining Philosophers, Done Naively
//!
//! Five philosophers, five chopsticks, and everyone grabs left then
//! right. A forcing pause between the grabs all but guarantees the
//! classic outcome: each holds one chopstick and waits forever for a
//! neighbor. A monitor names the culprits and ends the demo.
//!
//! Run with: cargo run --bin p10c_dining_philosophers

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use rtos_patterns::sync::Semaphore;
use rtos_patterns::{board, clock, task};

const NUM_TASKS: usize = 5;
const FORCE_DELAY: Duration = Duration::from_millis(25);
const EAT_TIME: Duration = Duration::from_millis(50);
const STALL_LIMIT: u64 = 2000;

const THINKING: u8 = 0;
const HAS_LEFT: u8 = 1;
const DONE: u8 = 3;

fn main() {
    clock::init();
    board::banner("Dining Philosopher's Challenge");

    let chopsticks: Arc<Vec<Semaphore>> =
        Arc::new((0..NUM_TASKS).map(|_| Semaphore::counting(1, 1)).collect());
    let done = Arc::new(Semaphore::counting(NUM_TASKS, 0));
    let states: Arc<Vec<AtomicU8>> =
        Arc::new((0..NUM_TASKS).map(|_| AtomicU8::new(THINKING)).collect());
    let progress = Arc::new(AtomicU64::new(0));

    for num in 0..NUM_TASKS {
        let chopsticks = Arc::clone(&chopsticks);
        let done = Arc::clone(&done);
        let states = Arc::clone(&states);
        let progress = Arc::clone(&progress);
        task::spawn(&format!("philosopher-{num}"), 1, move |_ctx| {
            let left = num;
            let right = (num + 1) % NUM_TASKS;

            chopsticks[left].take();
            println!("{} Philosopher {num} Took Chopstick {left}", clock::stamp());
            states[num].store(HAS_LEFT, Ordering::Relaxed);
            progress.store(clock::now_ms(), Ordering::Relaxed);
            thread::sleep(FORCE_DELAY);

            chopsticks[right].take();
            println!("{} Philosopher {num} Took Chopstick {right}", clock::stamp());
            println!("{} Philosopher {num} is eating", clock::stamp());
            progress.store(clock::now_ms(), Ordering::Relaxed);
            thread::sleep(EAT_TIME);

            chopsticks[right].give().unwrap();
            println!("{} Philosopher {num} Returned Chopstick {right}", clock::stamp());
            chopsticks[left].give().unwrap();
            println!("{} Philosopher {num} Returned Chopstick {left}", clock::stamp());
            states[num].store(DONE, Ordering::Relaxed);
            progress.store(clock::now_ms(), Ordering::Relaxed);
            done.give().unwrap();
        });
    }

    loop {
        thread::sleep(Duration::from_millis(100));
        if done.count() == NUM_TASKS {
            // The naive order can get lucky when the timing breaks the
            // symmetry. Not this run's usual ending.
            println!("\nDONE! No Deadlock Occurred!");
            break;
        }
        let idle_for = clock::now_ms().saturating_sub(progress.load(Ordering::Relaxed));
        if idle_for > STALL_LIMIT {
            println!();
            println!(
                "{} [monitor] {}",
                clock::stamp(),
                "DEADLOCK: no philosopher has made progress for 2 seconds".red()
            );
            for (num, state) in states.iter().enumerate() {
                if state.load(Ordering::Relaxed) == HAS_LEFT {
                    println!(
                        "{} [monitor] Philosopher {num} holds Chopstick {num}, starving for Chopstick {}",
                        clock::stamp(),
                        (num + 1) % NUM_TASKS
                    );
                }
            }
            break;
        }
    }

    println!("\n=== Key Points ===");
    println!("1. Everyone following the same local rule (left first) builds");
    println!("   a perfect cycle of waiters");
    println!("2. The forcing pause only makes the window reliable; the bug");
    println!("   is there at any speed");
    println!("3. Lesson 10d fixes the same table twice: once with a lock");
    println!("   hierarchy, once with an arbitrator");
}
