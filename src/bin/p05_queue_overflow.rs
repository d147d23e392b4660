//! Lesson 05: Queues
//! What Happens When a Bounded Queue Fills (or Runs Dry)
//!
//! Run with: cargo run --bin p05_queue_overflow

use std::time::Duration;

use colored::Colorize;
use crossbeam::channel::{bounded, TryRecvError, TrySendError};
use rtos_patterns::{board, clock, task};

/// Five slots, like the classic demo. Small on purpose: the lesson is
/// the overflow.
const QUEUE_LEN: usize = 5;

fn main() {
    clock::init();
    board::banner("Queue Demo");

    println!("=== Fast Producer, Slow Consumer ===\n");
    println!("The producer posts every 150 ms, the consumer drains every");
    println!("400 ms. Five slots buy slack, not safety: the queue fills");
    println!("and further sends are dropped and logged.\n");

    run_round(Duration::from_millis(150), Duration::from_millis(400));

    println!("\n=== Slow Producer, Fast Consumer ===\n");
    println!("Now the consumer polls faster than items arrive and sees");
    println!("the empty-queue error instead.\n");

    run_round(Duration::from_millis(500), Duration::from_millis(150));

    println!("\n=== Key Points ===");
    println!("1. A queue its producer outruns will fill, whatever its size");
    println!("2. Full means choose: block, drop, or redesign the rates");
    println!("3. These lessons drop and log; data loss you can see beats");
    println!("   a stall you cannot");
    println!("4. Polling an empty queue wastes wakeups; blocking reads wait");
}

fn run_round(send_every: Duration, recv_every: Duration) {
    let (tx, rx) = bounded::<i32>(QUEUE_LEN);

    let producer = task::spawn("producer", 1, move |ctx| {
        let mut dropped = 0u32;
        for item in 1..=12 {
            match tx.try_send(item) {
                Ok(()) => {
                    println!(
                        "{} [producer] *** item {item} added, {} in queue ***",
                        clock::stamp(),
                        tx.len()
                    );
                }
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    println!(
                        "{} [producer] {}",
                        clock::stamp(),
                        "Error: Queue Is Full!!".red()
                    );
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
            if !ctx.delay(send_every) {
                return;
            }
        }
        println!("{} [producer] done, {dropped} item(s) dropped", clock::stamp());
        // tx drops here; the consumer sees the queue close.
    });

    let consumer = task::spawn("consumer", 1, move |ctx| {
        loop {
            match rx.try_recv() {
                Ok(item) => {
                    println!(
                        "{} [consumer] removed item {item}, {} left",
                        clock::stamp(),
                        rx.len()
                    );
                }
                Err(TryRecvError::Empty) => {
                    println!(
                        "{} [consumer] {}",
                        clock::stamp(),
                        "Error: Queue Empty!!!".yellow()
                    );
                }
                Err(TryRecvError::Disconnected) => {
                    println!("{} [consumer] queue closed, draining done", clock::stamp());
                    return;
                }
            }
            if !ctx.delay(recv_every) {
                return;
            }
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}
