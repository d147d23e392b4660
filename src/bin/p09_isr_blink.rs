//! Lesson 09: Interrupts
//! A Hardware Timer Toggles the LED From Interrupt Context
//!
//! No task blinks this LED. A periodic timer interrupt flips the pin
//! directly in its handler, the smallest possible ISR. Main just
//! watches and counts.
//!
//! Run with: cargo run --bin p09_isr_blink

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtos_patterns::hal::Led;
use rtos_patterns::isr::HwTimer;
use rtos_patterns::{board, clock};

/// Interrupt period. A prescaler dividing an 80 MHz clock to 1 MHz
/// and an alarm count of one million give one fire per second; here
/// the period is stated directly.
const TIMER_PERIOD: Duration = Duration::from_millis(1000);

fn main() {
    clock::init();
    board::banner("Hardware Timer ISR Demo");

    let led = Arc::new(Led::new("LED13"));
    let fires = Arc::new(AtomicU32::new(0));

    let isr_led = Arc::clone(&led);
    let isr_fires = Arc::clone(&fires);
    let timer = HwTimer::every("hw-timer-0", TIMER_PERIOD, move || {
        // Handler body: read the pin, write the opposite. Nothing that
        // could block belongs in here.
        isr_led.toggle();
        isr_fires.fetch_add(1, Ordering::Relaxed);
    });

    thread::sleep(Duration::from_millis(4300));
    timer.stop();

    let count = fires.load(Ordering::Relaxed);
    println!("\n{} [main] handler ran {count} times, main did nothing", clock::stamp());

    println!("\n=== Key Points ===");
    println!("1. The handler preempts whatever is running; it borrowed the");
    println!("   CPU, so it flips the pin and gets out");
    println!("2. No task, no stack to size, no scheduler involvement for a");
    println!("   fixed-rate pin toggle");
    println!("3. The counter is atomic because handler and main touch it");
    println!("   from different contexts");
}
