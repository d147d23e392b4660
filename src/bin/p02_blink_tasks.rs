//! Lesson 02: Tasks
//! Two Tasks, Two Rates, One LED
//!
//! The same pin driven two ways. A single loop can hold exactly one
//! rhythm; two tasks with coprime periods produce the famous irregular
//! blink, because both write the same LED and neither knows the other
//! exists.
//!
//! Run with: cargo run --bin p02_blink_tasks

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtos_patterns::hal::Led;
use rtos_patterns::{board, clock, task};

// Coprime rates drift in and out of phase instead of locking step.
const RATE_1: Duration = Duration::from_millis(500);
const RATE_2: Duration = Duration::from_millis(323);

fn main() {
    clock::init();
    board::banner("Blink: One Loop, Then Two Tasks");

    let led = Arc::new(Led::new("LED13"));

    println!("=== Part 1: one loop, one rhythm ===\n");
    for _ in 0..2 {
        led.set_high();
        thread::sleep(RATE_1);
        led.set_low();
        thread::sleep(RATE_1);
    }
    println!("\nsteady and predictable, and the loop can do nothing else\n");

    println!("=== Part 2: two tasks share the pin ===\n");
    let blink_1 = {
        let led = Arc::clone(&led);
        task::spawn("toggle-1", 1, move |ctx| {
            for _ in 0..4 {
                led.set_high();
                if !ctx.delay(RATE_1) {
                    return;
                }
                led.set_low();
                if !ctx.delay(RATE_1) {
                    return;
                }
            }
        })
    };
    let blink_2 = {
        let led = Arc::clone(&led);
        task::spawn("toggle-2", 1, move |ctx| {
            for _ in 0..6 {
                led.set_high();
                if !ctx.delay(RATE_2) {
                    return;
                }
                led.set_low();
                if !ctx.delay(RATE_2) {
                    return;
                }
            }
        })
    };

    blink_1.join().unwrap();
    blink_2.join().unwrap();

    println!("\n=== Key Points ===");
    println!("1. Both tasks write pin 13, so the combined pattern is the");
    println!("   interference of 500 ms against 323 ms, not a bug");
    println!("2. delay() suspends only the calling task; the other keeps");
    println!("   its own beat");
    println!("3. Two tasks with one job each replace one loop juggling both");
}
