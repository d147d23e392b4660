//! Lesson 09a: Interrupts
//! Critical Sections Around State an ISR Shares With a Task
//!
//! The handler bumps a counter ten times a second; a task wakes every
//! 800 ms and drains it, printing as it goes. Both sides wrap their
//! access in a critical section, so every increment and decrement is
//! whole even when the interrupt lands mid-drain.
//!
//! Run with: cargo run --bin p09a_isr_critical

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use rtos_patterns::isr::{HwTimer, IsrCell};
use rtos_patterns::{board, clock, task};

static ISR_COUNTER: IsrCell<u32> = IsrCell::new(0);
/// Compound state: fire count and the stamp of the latest fire. The
/// two fields must never be seen half-updated.
static LAST_FIRE: IsrCell<(u32, u64)> = IsrCell::new((0, 0));

fn main() {
    clock::init();
    board::banner("ISR Using Critical Section");

    println!("=== Part 1: drain a counter the ISR keeps bumping ===\n");

    let timer = HwTimer::every("hw-timer-0", Duration::from_millis(100), || {
        ISR_COUNTER.with(|c| *c += 1);
    });

    let printer = task::spawn("print-serial", 1, move |ctx| {
        for _ in 0..3 {
            if !ctx.delay(Duration::from_millis(800)) {
                return;
            }
            // A repeated value here means the interrupt fired between
            // two prints. Expected; the handler runs whenever it likes.
            loop {
                let v = ISR_COUNTER.with(|c| {
                    let v = *c;
                    if v > 0 {
                        *c -= 1;
                    }
                    v
                });
                if v == 0 {
                    break;
                }
                print!("{v}  ");
                io::stdout().flush().unwrap();
            }
            println!("\n");
        }
    });

    printer.join().unwrap();
    timer.stop();

    println!("=== Part 2: a two-field snapshot stays consistent ===\n");

    let timer = HwTimer::every("hw-timer-1", Duration::from_millis(50), || {
        LAST_FIRE.with(|s| *s = (s.0 + 1, clock::now_ms()));
    });

    for _ in 0..3 {
        thread::sleep(Duration::from_millis(200));
        // One critical section, one coherent pair. Reading the fields
        // separately could pair an old count with a new stamp.
        let (count, at_ms) = LAST_FIRE.get();
        println!(
            "{} [main] snapshot: {count} fires, latest at {at_ms} ms",
            clock::stamp()
        );
    }
    timer.stop();

    println!("\n=== Key Points ===");
    println!("1. 'counter += 1' is not atomic; the critical section makes it");
    println!("   so for task and handler alike");
    println!("2. Critical sections must stay short: interrupts are blocked");
    println!("   for everyone while one is held");
    println!("3. Multi-field state is the real argument: a single atomic");
    println!("   integer cannot keep two fields in step");
}
