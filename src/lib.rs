//! Desktop renditions of the RTOS building blocks used by the lesson
//! binaries in `src/bin/`: tasks, queues, semaphores, spinlocks,
//! software timers, simulated interrupts and a tiny serial console.
//!
//! Each lesson is a standalone binary. List them with:
//! `cargo run --bin <lesson>` — e.g. `cargo run --bin p05_queue_overflow`.

pub mod board;
pub mod clock;
pub mod hal;
pub mod isr;
pub mod mem;
pub mod shell;
pub mod sync;
pub mod task;
pub mod timers;
pub mod vcore;
