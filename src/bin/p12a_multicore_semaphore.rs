//! Lesson 12a: Multicore
//! A Semaphore Signals Across Cores
//!
//! A task on core 0 gives a binary semaphore on a fixed beat; a task
//! on core 1 blocks on it and toggles the LED. Kernel objects do not
//! care which core either side runs on, and the cross-core wakeup
//! latency is small enough to print.
//!
//! Run with: cargo run --bin p12a_multicore_semaphore

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rtos_patterns::hal::Led;
use rtos_patterns::sync::Semaphore;
use rtos_patterns::{board, clock, task};

const ROUNDS: u32 = 5;
const BEAT: Duration = Duration::from_millis(500);

fn main() {
    clock::init();
    board::banner("Multicore Semaphore Blink");

    let sem = Arc::new(Semaphore::binary());
    // Stamp of the latest give, for measuring the wakeup latency.
    let given_at = Arc::new(AtomicU64::new(0));

    let producer = {
        let sem = Arc::clone(&sem);
        let given_at = Arc::clone(&given_at);
        task::spawn("cpu0-task", 1, move |ctx| {
            for _ in 0..ROUNDS {
                if !ctx.delay(BEAT) {
                    return;
                }
                given_at.store(clock::now_ms(), Ordering::Relaxed);
                let _ = sem.give();
            }
        })
    };

    let consumer = {
        let sem = Arc::clone(&sem);
        let given_at = Arc::clone(&given_at);
        task::spawn("cpu1-task", 1, move |_ctx| {
            let led = Led::new("LED13");
            for _ in 0..ROUNDS {
                sem.take();
                let latency = clock::now_ms().saturating_sub(given_at.load(Ordering::Relaxed));
                led.toggle();
                println!(
                    "{} [cpu1-task] woke {latency} ms after the give",
                    clock::stamp()
                );
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();

    println!("\n=== Key Points ===");
    println!("1. Semaphores, queues, and mutexes are core-agnostic; only");
    println!("   spinlocks and critical sections are per-core business");
    println!("2. The giver never knows or cares where the taker runs");
    println!("3. Cross-core wakeups cost microseconds, not milliseconds;");
    println!("   the printed latency is mostly scheduler, not distance");
}
