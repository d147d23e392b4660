//! Lesson 10d: Deadlock
//! The Philosophers Fed Twice Over: Hierarchy, Then Arbitrator
//!
//! Two working answers to lesson 10c's stuck table. The hierarchy fix
//! has everyone pick up their lower-numbered chopstick first, which
//! breaks the cycle of waiters. The arbitrator fix leaves the greedy
//! left-then-right habit alone and gates the table with a permission
//! mutex instead.
//!
//! Run with: cargo run --bin p10d_philosophers_fixed

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use rtos_patterns::sync::Semaphore;
use rtos_patterns::{board, clock, task};

const NUM_TASKS: usize = 5;
const FORCE_DELAY: Duration = Duration::from_millis(25);
const EAT_TIME: Duration = Duration::from_millis(50);

/// Chopstick pickup order for the hierarchy fix: lowest index first,
/// no matter which side it sits on.
fn fork_order(num: usize, tasks: usize) -> (usize, usize) {
    let left = num;
    let right = (num + 1) % tasks;
    if left < right {
        (left, right)
    } else {
        (right, left)
    }
}

fn main() {
    clock::init();
    board::banner("Dining Philosophers: Two Fixes");

    println!("=== Part 1: lock hierarchy ===\n");
    run_hierarchy();
    println!("\nDONE! No Deadlock Occurred!");

    println!("\n=== Part 2: arbitrator ===\n");
    run_arbitrator();
    println!("\nDONE! No Deadlock Occurred!");

    println!("\n=== Key Points ===");
    println!("1. A global lock order makes a waiting cycle impossible: the");
    println!("   philosopher holding the highest chopstick can always eat");
    println!("2. The arbitrator removes concurrency instead of reordering");
    println!("   locks; simpler to reason about, but one diner at a time");
    println!("3. A roomier arbitrator (admit up to four) would keep the");
    println!("   guarantee and let neighbors overlap");
}

fn run_hierarchy() {
    let chopsticks: Arc<Vec<Semaphore>> =
        Arc::new((0..NUM_TASKS).map(|_| Semaphore::counting(1, 1)).collect());
    let done = Arc::new(Semaphore::counting(NUM_TASKS, 0));

    for num in 0..NUM_TASKS {
        let chopsticks = Arc::clone(&chopsticks);
        let done = Arc::clone(&done);
        task::spawn(&format!("philosopher-{num}"), 1, move |_ctx| {
            let (first, second) = fork_order(num, NUM_TASKS);

            chopsticks[first].take();
            println!("{} Philosopher {num} Took Chopstick {first}", clock::stamp());
            thread::sleep(FORCE_DELAY);

            chopsticks[second].take();
            println!("{} Philosopher {num} Took Chopstick {second}", clock::stamp());
            println!("{} Philosopher {num} is eating", clock::stamp());
            thread::sleep(EAT_TIME);

            chopsticks[second].give().unwrap();
            println!("{} Philosopher {num} Returned Chopstick {second}", clock::stamp());
            chopsticks[first].give().unwrap();
            println!("{} Philosopher {num} Returned Chopstick {first}", clock::stamp());
            done.give().unwrap();
        });
    }

    for _ in 0..NUM_TASKS {
        done.take();
    }
}

fn run_arbitrator() {
    let chopsticks: Arc<Vec<Semaphore>> =
        Arc::new((0..NUM_TASKS).map(|_| Semaphore::counting(1, 1)).collect());
    let done = Arc::new(Semaphore::counting(NUM_TASKS, 0));
    let arbitrator = Arc::new(Semaphore::counting(1, 1));

    for num in 0..NUM_TASKS {
        let chopsticks = Arc::clone(&chopsticks);
        let done = Arc::clone(&done);
        let arbitrator = Arc::clone(&arbitrator);
        task::spawn(&format!("philosopher-{num}"), 1, move |_ctx| {
            // Back to the greedy left-then-right order on purpose: with
            // the arbitrator it no longer matters.
            let left = num;
            let right = (num + 1) % NUM_TASKS;

            arbitrator.take();
            println!(
                "{} {}",
                clock::stamp(),
                format!("Philosopher {num} Got Permission From Arbitrator").cyan()
            );

            chopsticks[left].take();
            println!("{} Philosopher {num} Took Chopstick {left}", clock::stamp());
            thread::sleep(FORCE_DELAY);

            chopsticks[right].take();
            println!("{} Philosopher {num} Took Chopstick {right}", clock::stamp());
            println!("{} Philosopher {num} is eating", clock::stamp());
            thread::sleep(EAT_TIME);

            chopsticks[right].give().unwrap();
            chopsticks[left].give().unwrap();
            println!("{} Philosopher {num} Returned Both Chopsticks", clock::stamp());

            println!(
                "{} Philosopher {num} Notified Arbitrator They Are Finished",
                clock::stamp()
            );
            arbitrator.give().unwrap();
            done.give().unwrap();
        });
    }

    for _ in 0..NUM_TASKS {
        done.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_order_is_lower_first() {
        assert_eq!(fork_order(0, 5), (0, 1));
        assert_eq!(fork_order(2, 5), (2, 3));
        // The wraparound seat is the one the hierarchy actually fixes.
        assert_eq!(fork_order(4, 5), (0, 4));
    }

    #[test]
    fn test_fork_order_never_inverts() {
        for n in 0..5 {
            let (first, second) = fork_order(n, 5);
            assert!(first < second);
        }
    }
}
