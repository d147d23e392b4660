//! Lesson 12: Multicore
//! One Core Shares, Two Cores Split
//!
//! The same two tasks run twice: first pinned to a single core, where
//! priority decides who goes first and the wall clock pays for both,
//! then pinned to separate cores, where they genuinely overlap.
//!
//! Run with: cargo run --bin p12_multicore

use std::thread;
use std::time::{Duration, Instant};

use rtos_patterns::vcore::VirtualCore;
use rtos_patterns::{board, clock};

/// CPU each task needs per round.
const WORK: Duration = Duration::from_millis(600);

fn main() {
    clock::init();
    board::banner("Multicore Demo");

    println!(
        "host machine reports {} cores; the demo pins tasks to simulated ones\n",
        board::host_cores()
    );

    println!("=== Part 1: both tasks pinned to core 0 ===\n");
    let core0 = VirtualCore::new("core0");
    let shared = timed_pair(&core0, &core0);
    println!("\none core: {} ms wall for both tasks", shared.as_millis());

    println!("\n=== Part 2: one task per core ===\n");
    let core0 = VirtualCore::new("core0");
    let core1 = VirtualCore::new("core1");
    let split = timed_pair(&core0, &core1);
    println!("\ntwo cores: {} ms wall for both tasks", split.as_millis());

    println!("\n=== Key Points ===");
    println!("1. Priority arbitrates a core; it buys nothing across cores,");
    println!("   where tasks simply run at the same time");
    println!("2. Pinning is about locality and interference: the ESP32");
    println!("   keeps WiFi on core 0 and hands applications core 1");
    println!("3. Total CPU spent is identical in both parts; only the");
    println!("   wall clock changed");
}

/// Runs task L (priority 1) on `core_l` and task H (priority 2) on
/// `core_h`, returning the wall time until both finish.
fn timed_pair(core_l: &VirtualCore, core_h: &VirtualCore) -> Duration {
    let task_l = core_l.attach("task-l", 1);
    let task_h = core_h.attach("task-h", 2);
    let where_l = core_l.label().to_string();
    let where_h = core_h.label().to_string();

    let start = Instant::now();
    let tl = thread::spawn(move || {
        println!("{} [task-l] Task L: {where_l}", clock::stamp());
        task_l.run(WORK);
        println!("{} [task-l] Task L done", clock::stamp());
    });
    let th = thread::spawn(move || {
        println!("{} [task-h] Task H: {where_h}", clock::stamp());
        task_h.run(WORK);
        println!("{} [task-h] Task H done", clock::stamp());
    });
    tl.join().unwrap();
    th.join().unwrap();
    start.elapsed()
}
