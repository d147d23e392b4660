//! Lesson 10: Deadlock
//! Two Tasks, Two Mutexes, Opposite Order
//!
//! Task A takes mutex 1 then wants mutex 2; task B takes mutex 2 then
//! wants mutex 1. A short pause between the two takes guarantees the
//! circular wait. A monitor watches both heartbeats and calls the
//! deadlock instead of letting the demo hang forever.
//!
//! Run with: cargo run --bin p10_deadlock

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use colored::Colorize;
use rtos_patterns::{board, clock, task};

/// Pause between the first and second take. This is what forces the
/// interleaving; without it one task can sometimes grab both.
const FORCE_DELAY: Duration = Duration::from_millis(50);
/// No heartbeat for this long means nobody is making progress.
const STALL_LIMIT: u64 = 2000;

fn main() {
    clock::init();
    board::banner("Deadlock Demo");

    let mutex1 = Arc::new(Mutex::new(()));
    let mutex2 = Arc::new(Mutex::new(()));
    let heart_a = Arc::new(AtomicU64::new(0));
    let heart_b = Arc::new(AtomicU64::new(0));

    {
        let mutex1 = Arc::clone(&mutex1);
        let mutex2 = Arc::clone(&mutex2);
        let heart = Arc::clone(&heart_a);
        task::spawn("task-a", 2, move |_ctx| loop {
            heart.store(clock::now_ms(), Ordering::Relaxed);
            let _m1 = mutex1.lock().unwrap();
            println!("{} [task-a] Took Mutex 1...", clock::stamp());
            heart.store(clock::now_ms(), Ordering::Relaxed);
            thread::sleep(FORCE_DELAY);

            let _m2 = mutex2.lock().unwrap();
            println!("{} [task-a] Took Mutex 2...", clock::stamp());
            println!("{} [task-a] Working in Critical Section", clock::stamp());
            heart.store(clock::now_ms(), Ordering::Relaxed);
            thread::sleep(Duration::from_millis(150));

            drop(_m2);
            drop(_m1);
            println!("{} [task-a] Released Both Mutexes: Going To Sleep", clock::stamp());
            heart.store(clock::now_ms(), Ordering::Relaxed);
            thread::sleep(Duration::from_millis(150));
        });
    }

    {
        let mutex1 = Arc::clone(&mutex1);
        let mutex2 = Arc::clone(&mutex2);
        let heart = Arc::clone(&heart_b);
        task::spawn("task-b", 1, move |_ctx| loop {
            heart.store(clock::now_ms(), Ordering::Relaxed);
            let _m2 = mutex2.lock().unwrap();
            println!("{} [task-b] Took Mutex 2...", clock::stamp());
            heart.store(clock::now_ms(), Ordering::Relaxed);
            thread::sleep(FORCE_DELAY);

            let _m1 = mutex1.lock().unwrap();
            println!("{} [task-b] Took Mutex 1...", clock::stamp());
            println!("{} [task-b] Working in Critical Section", clock::stamp());
            heart.store(clock::now_ms(), Ordering::Relaxed);
            thread::sleep(Duration::from_millis(150));

            drop(_m1);
            drop(_m2);
            println!("{} [task-b] Released Both Mutexes: Going To Sleep", clock::stamp());
            heart.store(clock::now_ms(), Ordering::Relaxed);
            thread::sleep(Duration::from_millis(150));
        });
    }

    // Watchdog duty: the tasks cannot report a deadlock themselves,
    // they are inside it.
    loop {
        thread::sleep(Duration::from_millis(100));
        let now = clock::now_ms();
        let last_a = heart_a.load(Ordering::Relaxed);
        let last_b = heart_b.load(Ordering::Relaxed);
        if now.saturating_sub(last_a) > STALL_LIMIT && now.saturating_sub(last_b) > STALL_LIMIT {
            println!();
            println!(
                "{} [monitor] {}",
                clock::stamp(),
                "DEADLOCK: no heartbeat from either task for 2 seconds".red()
            );
            println!(
                "{} [monitor] task-a holds Mutex 1 and waits for Mutex 2",
                clock::stamp()
            );
            println!(
                "{} [monitor] task-b holds Mutex 2 and waits for Mutex 1",
                clock::stamp()
            );
            break;
        }
    }

    println!("\n=== Key Points ===");
    println!("1. Four ingredients, all present: mutual exclusion, hold and");
    println!("   wait, no preemption of a held lock, circular wait");
    println!("2. Remove any one ingredient and the deadlock is impossible;");
    println!("   lessons 10a and 10d each remove a different one");
    println!("3. A deadlocked system looks idle, not busy. External");
    println!("   monitoring is how you notice");
}
