//! Lesson 08a: Software Timers
//! A Backlight That Dims When the Console Goes Quiet
//!
//! Every keystroke turns the backlight on and re-arms a one-shot
//! timer. While the user keeps typing the timer never gets to expire;
//! five seconds of silence and the callback dims the light. The classic
//! LCD backlight pattern.
//!
//! Run with: cargo run --bin p08a_backlight_timer
//! Add --interactive to type the commands yourself.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtos_patterns::hal::Led;
use rtos_patterns::shell::Console;
use rtos_patterns::timers::TimerService;
use rtos_patterns::{board, clock, task};

/// Backlight stays lit this long after the last keystroke.
const DIMMER_DELAY: Duration = Duration::from_millis(5000);

fn main() {
    clock::init();
    board::banner("CLI LED Timer Demo");

    let service = TimerService::start();
    let backlight = Arc::new(Led::new("TFT-backlight"));

    let dimmer = {
        let backlight = Arc::clone(&backlight);
        service.one_shot("auto-dimmer", DIMMER_DELAY, move || {
            backlight.set_low();
            println!("{} [tmr-svc] console idle, backlight dimmed", clock::stamp());
        })
    };

    let cli = {
        let backlight = Arc::clone(&backlight);
        task::spawn("user-cli", 1, move |_ctx| {
            let console = Console::from_env(&["brightness up", "hello backlight", "status"]);
            while let Some(line) = console.read_line() {
                if !backlight.is_on() {
                    backlight.set_high();
                }
                // Reset arms a dormant timer and defers a running one,
                // so every keystroke buys a fresh full delay.
                dimmer.reset();
                println!("{} [user-cli] echo: {line}", clock::stamp());
            }
            println!("{} [user-cli] console closed, dimmer keeps its last arm", clock::stamp());
        })
    };

    cli.join().unwrap();
    // Let the final arm run out so the dim is visible.
    thread::sleep(DIMMER_DELAY + Duration::from_millis(400));
    service.shutdown();

    println!("\n=== Key Points ===");
    println!("1. One-shot plus reset is the universal idle-timeout pattern:");
    println!("   backlights, screensavers, connection keepalives");
    println!("2. The callback runs on the timer daemon, so it must stay");
    println!("   short; flipping a pin is fine, parsing input is not");
    println!("3. No task ever sleeps waiting for idleness; the timer list");
    println!("   does the bookkeeping");
}
