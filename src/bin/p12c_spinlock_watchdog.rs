//! Lesson 12c: Multicore
//! The Spinlock That Reboots the Chip
//!
//! A critical section held for a whole second keeps the core from
//! servicing anything else, including the interrupt watchdog's feed.
//! Boot one ends in a watchdog reset. Boot two does the same work in
//! preemptible slices and the feeder never misses a meal.
//!
//! Run with: cargo run --bin p12c_spinlock_watchdog

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use colored::Colorize;
use rtos_patterns::hal::Led;
use rtos_patterns::vcore::{VirtualCore, Watchdog};
use rtos_patterns::{board, clock};

/// Interrupt watchdog timeout, the ESP32's stock 300 ms.
const WDT_TIMEOUT: Duration = Duration::from_millis(300);
/// How long the task keeps the core to itself.
const HOG_TIME: Duration = Duration::from_millis(1000);

fn main() {
    clock::init();
    board::banner("Multicore 2 Task Blinker");

    // Same firmware, two boots: the reset teaches the lesson and the
    // retry applies it.
    let mut boot = 1;
    loop {
        let hold_spinlock = boot == 1;
        if run_boot(boot, hold_spinlock) {
            break;
        }
        boot += 1;
    }

    println!("\n=== Key Points ===");
    println!("1. A critical section doesn't just lock data, it silences the");
    println!("   core: no scheduler, no interrupts, no watchdog feed");
    println!("2. The interrupt watchdog cannot be argued with; past 300 ms");
    println!("   the chip resets, mid-print if need be");
    println!("3. Long work belongs in preemptible code; save spinlocks for");
    println!("   microseconds, not milliseconds");
}

/// One boot of the firmware. Returns true if the work completed
/// without tripping the watchdog.
fn run_boot(boot: u32, hold_spinlock: bool) -> bool {
    println!("\n*** BOOT #{boot} ***\n");

    let wd = Watchdog::arm("iwdt", WDT_TIMEOUT);
    println!("{} [iwdt] armed, {} ms timeout", clock::stamp(), WDT_TIMEOUT.as_millis());

    let core = VirtualCore::new("core1");
    let stop = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));

    // The feeder plays the interrupt service path: top priority, tiny
    // slices, feeds on every pass. It only starves if the core is
    // locked out from under it.
    {
        let feeder_task = core.attach("isr-feed", 3);
        let feeder = wd.feeder();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                feeder_task.run(Duration::from_millis(1));
                feeder.feed();
                thread::sleep(Duration::from_millis(20));
            }
        });
    }

    {
        let worker = core.attach("task1", 1);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let led = Led::new("LED13");
            led.toggle();
            if hold_spinlock {
                println!(
                    "{} [task1] taking spinlock for {} ms of work",
                    clock::stamp(),
                    HOG_TIME.as_millis()
                );
                worker.run_locked(HOG_TIME);
            } else {
                println!(
                    "{} [task1] same {} ms of work, preemptible this time",
                    clock::stamp(),
                    HOG_TIME.as_millis()
                );
                worker.run(HOG_TIME);
            }
            done.store(true, Ordering::Relaxed);
        });
    }

    let deadline = Instant::now() + Duration::from_secs(3);
    let completed = loop {
        if wd.fired() {
            break false;
        }
        if done.load(Ordering::Relaxed) {
            break true;
        }
        if Instant::now() > deadline {
            break done.load(Ordering::Relaxed);
        }
        thread::sleep(Duration::from_millis(10));
    };
    stop.store(true, Ordering::Relaxed);

    if completed {
        println!(
            "{} [main] {}",
            clock::stamp(),
            "work finished and the watchdog never starved".green()
        );
    } else {
        board::reset_notice("Interrupt WDT timeout on CPU1");
    }
    wd.disarm();
    completed
}
