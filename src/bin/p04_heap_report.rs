//! Lesson 04: Memory
//! Stack, Heap, and the Budget a Small Board Lives On
//!
//! Part 1 watches the heap meter while a task allocates and frees.
//! Part 2 runs the same greedy firmware twice: once blind until the
//! budget blows and the board resets, once with a malloc guard that
//! turns the failure into a refused request.
//!
//! Run with: cargo run --bin p04_heap_report

use std::thread;
use std::time::Duration;

use colored::Colorize;
use rtos_patterns::mem::{self, CountingAlloc, HeapBudget};
use rtos_patterns::{board, clock, task};

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc;

/// The pretend device RAM. An ESP32-class part gives application code
/// roughly this much dynamic memory to live on.
const DEVICE_RAM: usize = 320 * 1024;

/// What the greedy firmware in Part 2 grabs per cycle.
const CHUNK: usize = 64 * 1024;

fn main() {
    clock::init();
    board::banner("FreeRTOS Memory Test");

    println!("=== Part 1: Stack vs Heap ===\n");
    let budget = HeapBudget::new(DEVICE_RAM);
    println!("device budget: {} B", budget.limit());
    println!("heap used at boot: {} B\n", mem::heap_used());

    let reporter = task::spawn("mem-report", 1, move |ctx| {
        for round in 1..=3 {
            println!("--- round {round} ---");

            // Locals live on the task's stack: the heap meter does
            // not move for this array.
            let scratch = [round as i32; 100];
            let before = mem::heap_used();
            println!("stack array of {} ints, heap still {} B used", scratch.len(), before);

            // Now a real allocation, 1024 ints like the classic
            // malloc demo.
            let chunk = vec![round as i32; 1024];
            println!(
                "after alloc of {} B: {} B used, {} B free in budget",
                chunk.len() * std::mem::size_of::<i32>(),
                mem::heap_used(),
                budget.free()
            );

            drop(chunk);
            println!("after free: {} B used (peak so far {} B)", mem::heap_used(), mem::heap_peak());

            if !ctx.delay(Duration::from_millis(100)) {
                return;
            }
        }
    });
    reporter.join().unwrap();

    println!("\n=== Part 2: Blowing the Budget ===");

    // Same firmware, two boots: boot one never checks and pays for
    // it, boot two guards every request.
    let mut boot = 1;
    loop {
        if run_boot(boot, boot > 1) {
            break;
        }
        boot += 1;
    }

    println!("\n=== Key Points ===");
    println!("1. Stack memory is automatic and per-task; the heap is shared");
    println!("2. Every task's stack itself comes out of the same RAM budget");
    println!("3. Check before you allocate: a refused request is recoverable,");
    println!("   a failed one on a small board means a reboot");
    println!("4. Watch the peak, not just the current figure");
}

/// One boot of the hoarding firmware. Returns true if it survived the
/// episode.
fn run_boot(boot: u32, guarded: bool) -> bool {
    println!("\n*** BOOT #{boot} ***\n");

    let budget = HeapBudget::new(DEVICE_RAM);
    let mut hoard: Vec<Vec<u8>> = Vec::new();

    loop {
        if guarded {
            // The malloc guard: measure the request against the
            // budget before committing to it.
            if let Err(e) = budget.check(CHUNK) {
                println!("{}", e.to_string().red());
                println!("request refused; dropping the batch and carrying on");
                return true;
            }
        }

        hoard.push(vec![0xA5u8; CHUNK]);
        println!(
            "hoarding {} B: {} B used, {} B free in budget",
            CHUNK,
            mem::heap_used(),
            budget.free()
        );

        // The blind firmware only finds out after the fact, the way a
        // null pointer does.
        if !guarded && mem::heap_used() > budget.limit() {
            board::reset_notice("NOT ENOUGH HEAP MEMORY");
            return false;
        }

        thread::sleep(Duration::from_millis(120));
    }
}
