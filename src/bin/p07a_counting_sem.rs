//! Lesson 07a: Semaphores
//! Counting Semaphores Tally a Fleet of Task Startups
//!
//! Five identical tasks read one shared parameter block. Each gives a
//! counting semaphore once it has its own copy; main takes five times,
//! so it knows exactly when the block can go away. A mutex guards the
//! console so the five reports come out whole.
//!
//! Run with: cargo run --bin p07a_counting_sem

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rtos_patterns::sync::Semaphore;
use rtos_patterns::{board, clock, task};

const NUM_TASKS: usize = 5;
const MSG_BODY: usize = 20;

/// Parameter block shared by every task at startup.
#[derive(Clone)]
struct Message {
    body: heapless::String<MSG_BODY>,
    len: u8,
}

fn main() {
    clock::init();
    board::banner("Counting Semaphore Demo");

    let mut body = heapless::String::new();
    let _ = body.push_str("Here We Go");
    let param = Arc::new(Message {
        len: body.len() as u8,
        body,
    });

    let started = Arc::new(Semaphore::counting(NUM_TASKS, 0));
    let serial = Arc::new(Mutex::new(()));

    let handles: Vec<_> = (0..NUM_TASKS)
        .map(|i| {
            let param = Arc::clone(&param);
            let started = Arc::clone(&started);
            let serial = Arc::clone(&serial);
            task::spawn(&format!("sem-task-{i}"), 1, move |_ctx| {
                // Copy the parameter before announcing readiness.
                let msg = (*param).clone();

                let guard = serial.lock().unwrap();
                started.give().unwrap();
                // Two separate writes; without the mutex the five
                // tasks would shred each other's lines.
                print!("{} [sem-task-{i}] Message Rec'd: {}", clock::stamp(), msg.body);
                io::stdout().flush().unwrap();
                thread::sleep(Duration::from_millis(10));
                println!(" || Msg Length: {}", msg.len);
                thread::sleep(Duration::from_millis(50));
                drop(guard);

                thread::sleep(Duration::from_millis(300));
            })
        })
        .collect();

    for j in 1..=NUM_TASKS {
        started.take();
        println!(
            "{} [main] startup {j}/{NUM_TASKS} confirmed (count now {})",
            clock::stamp(),
            started.count()
        );
    }
    println!("\nAll Tasks Created Successfully!");

    for h in handles {
        h.join().unwrap();
    }

    println!("\n=== Key Points ===");
    println!("1. A counting semaphore is a tally, not a lock: five gives,");
    println!("   five takes, no owner");
    println!("2. Main never polls; each take sleeps until a task reports in");
    println!("3. The serial mutex and the semaphore solve different");
    println!("   problems and this lesson needs both");
}
