//! Lesson 07c: Semaphores
//! The Queue That Replaces the Whole Semaphore Dance
//!
//! Same traffic as lesson 07b, five producers and two consumers, but
//! the hand-built ring plus two counting semaphores collapses into one
//! bounded queue. A zero-capacity channel then serves as a rendezvous
//! for the consumers' final tallies.
//!
//! Run with: cargo run --bin p07c_queue_rendezvous

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam::channel::bounded;
use rand::Rng;
use rtos_patterns::{board, clock, task};

const QUEUE_LEN: usize = 10;
const NUM_PRODUCERS: usize = 5;
const NUM_CONSUMERS: usize = 2;
const NUM_WRITES: usize = 3;

fn main() {
    clock::init();
    board::banner("Counting Semaphores With A Queue");

    let (tx, rx) = bounded::<i32>(QUEUE_LEN);
    // Capacity zero: a send completes only when a recv is waiting.
    let (report_tx, report_rx) = bounded::<(usize, usize)>(0);
    let serial = Arc::new(Mutex::new(()));

    let mut handles = Vec::new();
    for i in 0..NUM_PRODUCERS {
        let tx = tx.clone();
        handles.push(task::spawn(&format!("prod-{i}"), 1, move |_ctx| {
            let mut rng = rand::thread_rng();
            for _ in 0..NUM_WRITES {
                // Blocking send: the queue's own backpressure stands in
                // for the 'empty' semaphore.
                tx.send(i as i32).unwrap();
                thread::sleep(Duration::from_millis(rng.gen_range(1..5)));
            }
        }));
    }
    // Producers hold the only senders now; the queue disconnects when
    // the last one finishes.
    drop(tx);

    for j in 0..NUM_CONSUMERS {
        let rx = rx.clone();
        let report_tx = report_tx.clone();
        let serial = Arc::clone(&serial);
        handles.push(task::spawn(&format!("cons-{j}"), 1, move |_ctx| {
            let mut consumed = 0;
            while let Ok(val) = rx.recv() {
                let _guard = serial.lock().unwrap();
                print!("{val}  ");
                io::stdout().flush().unwrap();
                consumed += 1;
            }
            // Rendezvous: this blocks until main is ready to hear it.
            report_tx.send((j, consumed)).unwrap();
        }));
    }
    drop(report_tx);

    println!("\n*** All Tasks Created ***\n");

    let mut total = 0;
    for _ in 0..NUM_CONSUMERS {
        let (j, consumed) = report_rx.recv().unwrap();
        println!("\n{} [main] cons-{j} consumed {consumed} values", clock::stamp());
        total += consumed;
    }
    println!(
        "{} [main] {total}/{} values accounted for",
        clock::stamp(),
        NUM_PRODUCERS * NUM_WRITES
    );

    for h in handles {
        h.join().unwrap();
    }

    println!("\n=== Key Points ===");
    println!("1. A bounded queue is the ring, the mutex, and both counting");
    println!("   semaphores rolled into one primitive");
    println!("2. Closures capture their task number by value, so the");
    println!("   parameter handshake from lesson 07 is simply not needed");
    println!("3. A zero-capacity channel is a rendezvous: neither side");
    println!("   proceeds until both have arrived");
}
