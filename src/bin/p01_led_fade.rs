//! Lesson 01: The Superloop
//! Fading an LED, With and Without a Task
//!
//! The same triangle fade twice. As a superloop, the fade IS the
//! program: nothing else can run between ticks. Moved into a task, the
//! fade keeps its exact timing while main is free for unrelated work.
//!
//! Run with: cargo run --bin p01_led_fade

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtos_patterns::hal::{Fader, PwmLed};
use rtos_patterns::{board, clock, task};

/// Brightness change per tick.
const FADE_STEP: u8 = 5;
/// Tick period; together with the step this gives a full ramp about
/// every second and a half.
const TICK: Duration = Duration::from_millis(30);

fn main() {
    clock::init();
    board::banner("LED Software Fade");

    let led = Arc::new(PwmLed::new("LED13"));

    println!("=== Part 1: the superloop ===\n");
    let mut fader = Fader::new(FADE_STEP);
    // One full up-down ramp, rendering every 10th tick plus both rails
    // so the triangle shape is visible in the log.
    let mut rails_hit = 0;
    let mut tick = 0u32;
    while rails_hit < 2 {
        led.set_brightness(fader.advance());
        if tick % 10 == 0 || fader.at_rail() {
            led.render();
        }
        if fader.at_rail() {
            rails_hit += 1;
        }
        tick += 1;
        thread::sleep(TICK);
    }
    println!("\none loop, one job: the fade owned the CPU the whole time\n");

    println!("=== Part 2: the fade as a task ===\n");
    let fade_task = {
        let led = Arc::clone(&led);
        task::spawn("led-fade", 1, move |ctx| {
            let mut fader = Fader::new(FADE_STEP);
            let mut tick = 0u32;
            loop {
                led.set_brightness(fader.advance());
                if tick % 10 == 0 || fader.at_rail() {
                    led.render();
                }
                tick += 1;
                if !ctx.delay(TICK) {
                    return;
                }
            }
        })
    };

    // Main is its own task now, with time for its own duties.
    for n in 1..=3 {
        thread::sleep(Duration::from_millis(800));
        println!(
            "{} [main] housekeeping pass {n} while the LED fades",
            clock::stamp()
        );
    }
    fade_task.stop_and_join().unwrap();

    println!("\n=== Key Points ===");
    println!("1. The superloop is fine until the program has two jobs");
    println!("2. The task carries the same loop body and the same timing;");
    println!("   only its owner changed");
    println!("3. delay() is the polite sleep: the fade never busy-waits");
}
