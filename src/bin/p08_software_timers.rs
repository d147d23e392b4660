//! Lesson 08: Software Timers
//! One-Shot and Auto-Reload Timers From One Daemon
//!
//! Neither timer owns a task. Both are entries in the timer service's
//! list, and one daemon thread fires whichever is due, exactly how the
//! kernel's timer task multiplexes every software timer in the system.
//!
//! Run with: cargo run --bin p08_software_timers

use std::thread;
use std::time::Duration;

use rtos_patterns::timers::TimerService;
use rtos_patterns::{board, clock};

fn main() {
    clock::init();
    board::banner("Timer Demo");

    let service = TimerService::start();

    let one_shot = service.one_shot("one-shot", Duration::from_millis(2000), || {
        println!("{} [tmr-svc] One-Shot Timer Expired", clock::stamp());
    });
    let auto_reload = service.auto_reload("auto-reload", Duration::from_millis(1000), || {
        println!("{} [tmr-svc] Auto-Reload Timer Expired", clock::stamp());
    });

    println!("*** Starting Timers ***\n");
    one_shot.start();
    auto_reload.start();

    // The one-shot fires once at 2s; the auto-reload keeps firing
    // every second until told otherwise. Five reloads, then stop.
    thread::sleep(Duration::from_millis(5300));

    println!("\n*** Stopping Auto-Reload Timer ***");
    auto_reload.stop();
    thread::sleep(Duration::from_millis(800));
    println!("(quiet: a stopped timer stays in the list, just dormant)");

    println!("\n=== Part 2: reset pushes the deadline back ===\n");
    let late = service.one_shot("late", Duration::from_millis(1000), || {
        println!("{} [tmr-svc] late timer finally expired", clock::stamp());
    });
    println!("{} [main] armed for 1000 ms", clock::stamp());
    late.start();
    thread::sleep(Duration::from_millis(600));
    println!("{} [main] reset: full 1000 ms from now", clock::stamp());
    late.reset();
    thread::sleep(Duration::from_millis(1200));

    service.shutdown();

    println!("\n=== Key Points ===");
    println!("1. Software timers share one daemon task; a slow callback");
    println!("   delays every other timer in the list");
    println!("2. One-shot fires and disarms; auto-reload re-arms itself from");
    println!("   its own deadline so the period never drifts");
    println!("3. Start, stop, and reset are messages to the daemon, safe to");
    println!("   send from any task");
}
