//! Lesson 03: Task Priorities
//! A Higher-Priority Task Interrupts a Lower One Mid-Sentence
//!
//! Run with: cargo run --bin p03_task_preemption

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtos_patterns::vcore::VirtualCore;
use rtos_patterns::{board, clock};

const MSG: &str = "a low priority task prints this sentence one letter at a time";
/// Serial-at-300-baud pacing: each character costs this much CPU.
const CHAR_COST: Duration = Duration::from_millis(30);

fn main() {
    clock::init();
    board::banner("Task Priority Demo");

    println!("=== One Core, Two Priorities ===\n");
    println!("The sentence task (priority 1) needs the core for every");
    println!("letter. The star task (priority 2) wakes every 100 ms and");
    println!("wins the core immediately: watch the *s land mid-word.\n");

    let core = VirtualCore::new("core1");
    let writer = core.attach("sentence", 1);
    let star = core.attach("star", 2);
    let stars_done = Arc::new(AtomicBool::new(false));

    let star_thread = {
        let stop = Arc::clone(&stars_done);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                // A tiny burst of work, but at priority 2 it preempts
                // the sentence at the next slice boundary.
                star.run(Duration::from_millis(2));
                print!("*");
                io::stdout().flush().ok();
                star.sleep(Duration::from_millis(98));
            }
        })
    };

    let writer_thread = thread::spawn(move || {
        for round in 1..=2 {
            println!("\n--- pass {round} ---");
            for ch in MSG.chars() {
                writer.run(CHAR_COST);
                print!("{ch}");
                io::stdout().flush().ok();
            }
            println!();
            writer.sleep(Duration::from_millis(1000));
        }
    });

    writer_thread.join().unwrap();
    stars_done.store(true, Ordering::Relaxed);
    star_thread.join().unwrap();

    println!("\n=== Key Points ===");
    println!("1. Ready tasks at higher priority always get the core first");
    println!("2. Preemption lands at a slice boundary, not a polite pause");
    println!("3. The low task only runs in the gaps the high task leaves");
    println!("4. Delays put a task to sleep; sleeping tasks cost nothing");
}
