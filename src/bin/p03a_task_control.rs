//! Lesson 03a: Task Lifecycle
//! Suspend, Resume, Delete, and a Live Tuning Knob
//!
//! Part 1 drives a blink task from outside through its handle. Part 2
//! gives the blinker a serial sidekick: type a number of milliseconds
//! and the blink rate changes on the fly.
//!
//! Run with: cargo run --bin p03a_task_control
//! Add --interactive to type the commands yourself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtos_patterns::hal::Led;
use rtos_patterns::shell::Console;
use rtos_patterns::{board, clock, task};

const INITIAL_DELAY_MS: u64 = 500;

fn main() {
    clock::init();
    board::banner("Multi-Task LED Demo");

    println!("=== Part 1: Suspend / Resume / Delete ===\n");
    println!("A blink task runs on its own; the main task plays");
    println!("scheduler-whisperer with its handle.\n");

    let led = Arc::new(Led::new("LED13"));
    let blinker = {
        let led = Arc::clone(&led);
        task::spawn("blinker", 1, move |ctx| {
            // Runs until told to stop; the handle decides when.
            loop {
                led.toggle();
                if !ctx.delay(Duration::from_millis(250)) {
                    println!("{} [blinker] deleted, cleaning up", clock::stamp());
                    return;
                }
            }
        })
    };

    thread::sleep(Duration::from_millis(1100));
    println!("{} [main] suspending blinker", clock::stamp());
    blinker.suspend();

    // The LED freezes wherever it was; suspended tasks get no cycles
    // at all.
    thread::sleep(Duration::from_millis(1100));
    println!("{} [main] resuming blinker", clock::stamp());
    blinker.resume();

    thread::sleep(Duration::from_millis(1100));
    println!("{} [main] deleting blinker", clock::stamp());
    blinker.stop_and_join().unwrap();

    println!("\n=== Part 2: Serial Control of the Blink Rate ===\n");
    println!("Enter # of milliseconds to change LED Delay:\n");

    let delay_ms = Arc::new(AtomicU64::new(INITIAL_DELAY_MS));

    let blinker = {
        let led = Arc::clone(&led);
        let delay_ms = Arc::clone(&delay_ms);
        task::spawn("blinker", 1, move |ctx| loop {
            let half = Duration::from_millis(delay_ms.load(Ordering::Relaxed));
            led.set_high();
            if !ctx.delay(half) {
                return;
            }
            led.set_low();
            if !ctx.delay(half) {
                return;
            }
        })
    };

    let reader = {
        let delay_ms = Arc::clone(&delay_ms);
        task::spawn("serial-read", 1, move |_ctx| {
            let console = Console::from_env(&["100", "750"]);
            while let Some(line) = console.read_line() {
                match line.trim().parse::<i64>() {
                    Ok(ms) => {
                        // Magnitude, minimum one tick; a zero delay
                        // would starve everything else on the core.
                        let ms = ms.unsigned_abs().max(1);
                        delay_ms.store(ms, Ordering::Relaxed);
                        println!("{} [serial-read] New LED Delay = {ms}ms", clock::stamp());
                    }
                    Err(_) => {
                        println!(
                            "{} [serial-read] not a number: {:?}",
                            clock::stamp(),
                            line.trim()
                        );
                    }
                }
            }
        })
    };

    reader.join().unwrap();
    thread::sleep(Duration::from_millis(1800));
    blinker.stop_and_join().unwrap();

    println!("\n=== Key Points ===");
    println!("1. Suspension freezes a task between two of its own steps;");
    println!("   the task does not cooperate or consent");
    println!("2. Deletion here is cooperative: the task sees it and unwinds,");
    println!("   so its resources come back (unlike a hard vTaskDelete)");
    println!("3. One atomic is all it takes to tune a running task; the");
    println!("   blinker picks up the new delay on its next cycle");
}
