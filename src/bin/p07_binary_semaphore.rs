//! Lesson 07: Semaphores
//! The Binary Semaphore Task Parameter Handshake
//!
//! Main hands a blink rate to a freshly spawned task through a slot it
//! wants to recycle. The task copies the value out and gives a binary
//! semaphore; main takes the semaphore before touching the slot again.
//! In the C original the slot is a stack variable about to go out of
//! scope, which is exactly the kind of lifetime Rust refuses to
//! express without this handshake.
//!
//! Run with: cargo run --bin p07_binary_semaphore

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use colored::Colorize;
use rtos_patterns::hal::Led;
use rtos_patterns::shell::{Command, Console};
use rtos_patterns::sync::Semaphore;
use rtos_patterns::{board, clock, task};

fn main() {
    clock::init();
    board::banner("Binary Semaphore Task Parameter Handshake");

    println!("Enter an integer delay in milliseconds:\n");
    let console = Console::from_env(&["delay 323"]);
    let ms_delay = match console.read_line().map(|l| l.parse::<Command>()) {
        Some(Ok(Command::Delay(ms))) => ms.max(1),
        _ => 500,
    };
    println!("Sending: {ms_delay}");

    // The parameter slot. Main owns it and wants it back after the
    // task has copied the value.
    let param = Arc::new(Mutex::new(ms_delay));
    let confirmed = Arc::new(Semaphore::binary());

    let blinker = {
        let param = Arc::clone(&param);
        let confirmed = Arc::clone(&confirmed);
        task::spawn("led-blink", 2, move |ctx| {
            // Copy first, give second. After the give, main is free to
            // reuse the slot.
            let rate = Duration::from_millis(*param.lock().unwrap());
            confirmed.give().unwrap();
            println!("{} [led-blink] Parameter Rec'd: {:?}", clock::stamp(), rate);

            let led = Led::new("LED13");
            loop {
                led.toggle();
                if !ctx.delay(rate) {
                    return;
                }
            }
        })
    };

    confirmed.take();
    println!("{} [main] DONE! parameter slot is safe to recycle", clock::stamp());
    // Prove it: scribble over the slot. The blink rate does not change
    // because the task kept its own copy.
    *param.lock().unwrap() = 9999;

    thread::sleep(Duration::from_millis(2000));
    blinker.stop_and_join().unwrap();

    println!("\n=== Part 2: a handshake that never arrives ===\n");
    let silent = Arc::new(Semaphore::binary());
    let worker = {
        let silent = Arc::clone(&silent);
        task::spawn("forgetful", 1, move |_ctx| {
            // Copies the parameter but never gives the semaphore.
            let _ = silent.count();
            thread::sleep(Duration::from_millis(100));
        })
    };
    if silent.take_timeout(Duration::from_millis(500)) {
        println!("{} [main] confirmation arrived", clock::stamp());
    } else {
        println!(
            "{} [main] {}",
            clock::stamp(),
            "no confirmation within 500 ms: the parameter must stay alive".yellow()
        );
    }
    worker.join().unwrap();

    println!("\n=== Key Points ===");
    println!("1. A binary semaphore is a one-shot flag: give sets it, take");
    println!("   consumes it, no ownership involved");
    println!("2. Copy the parameter before giving; the give is the promise");
    println!("   that the slot is no longer needed");
    println!("3. Always pair a take with a timeout when the giver might");
    println!("   never show up");
}
