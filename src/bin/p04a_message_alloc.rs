//! Lesson 04a: Memory
//! Passing a Heap Message Between Tasks by Handing Over Ownership
//!
//! Run with: cargo run --bin p04a_message_alloc

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use colored::Colorize;
use rtos_patterns::mem::{self, CountingAlloc, HeapBudget};
use rtos_patterns::shell::Console;
use rtos_patterns::{board, clock, task};

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc;

const DEVICE_RAM: usize = 320 * 1024;

/// One-message mailbox. The classic C version is a raw pointer plus a
/// volatile flag; here the Option is the flag and moving the String is
/// the handover.
struct Mailbox {
    slot: Mutex<Option<String>>,
    posted: Condvar,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            posted: Condvar::new(),
        }
    }

    /// True if the message was accepted; false while the previous one
    /// is still unclaimed (the reader drops input in that case).
    fn post(&self, msg: String) -> bool {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_some() {
            return false;
        }
        *slot = Some(msg);
        self.posted.notify_one();
        true
    }

    fn collect_timeout(&self, timeout: Duration) -> Option<String> {
        let mut slot = self.slot.lock().unwrap();
        while slot.is_none() {
            let (guard, res) = self.posted.wait_timeout(slot, timeout).unwrap();
            slot = guard;
            if res.timed_out() {
                return slot.take();
            }
        }
        slot.take()
    }
}

fn main() {
    clock::init();
    board::banner("Heap Message Demo");

    println!("=== Read, Allocate, Hand Over, Free ===\n");
    println!("One task turns console lines into heap-allocated messages;");
    println!("the other prints and frees them. The allocation moves");
    println!("between tasks; it is never shared.\n");

    let mailbox = Arc::new(Mailbox::new());
    let budget = Arc::new(HeapBudget::new(DEVICE_RAM));

    let reader = {
        let mailbox = Arc::clone(&mailbox);
        let budget = Arc::clone(&budget);
        task::spawn("read-serial", 1, move |_ctx| {
            let console = Console::from_env(&["hello rtos", "a somewhat longer message to allocate", "bye"]);
            while let Some(line) = console.read_line() {
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = budget.check(line.len()) {
                    println!("{}", e.to_string().red());
                    continue;
                }
                let size = line.len();
                // `line` is already the heap copy; posting moves it.
                if mailbox.post(line) {
                    println!(
                        "{} [read-serial] posted {size} B message, heap {} B used",
                        clock::stamp(),
                        mem::heap_used()
                    );
                } else {
                    println!(
                        "{} [read-serial] {}",
                        clock::stamp(),
                        "previous message unclaimed, input dropped".yellow()
                    );
                }
            }
        })
    };

    let printer = {
        let mailbox = Arc::clone(&mailbox);
        task::spawn("print-message", 1, move |ctx| {
            loop {
                match mailbox.collect_timeout(Duration::from_millis(400)) {
                    Some(msg) => {
                        println!("{} [print-message] =>> {msg}", clock::stamp());
                        println!(
                            "{} [print-message] before free: {} B used",
                            clock::stamp(),
                            mem::heap_used()
                        );
                        drop(msg);
                        println!(
                            "{} [print-message] after free:  {} B used",
                            clock::stamp(),
                            mem::heap_used()
                        );
                    }
                    None => {
                        // Console idle; check whether we should wind
                        // down.
                        if !ctx.checkpoint() {
                            return;
                        }
                    }
                }
                if !ctx.checkpoint() {
                    return;
                }
            }
        })
    };

    reader.join().unwrap();
    // Give the printer a beat to drain the last message, then stop it.
    std::thread::sleep(Duration::from_millis(600));
    printer.stop_and_join().unwrap();

    println!("\n=== Key Points ===");
    println!("1. Allocate in one task, free in another: ownership moves");
    println!("2. The Option in the mailbox is the ready flag, made honest");
    println!("3. Input that arrives while the mailbox is full gets dropped");
    println!("4. Budget-check the allocation first; refusal beats a reboot");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_accepts_then_refuses() {
        let mb = Mailbox::new();
        assert!(mb.post("first".to_string()));
        assert!(!mb.post("second".to_string()), "mailbox should hold one message");
        assert_eq!(mb.collect_timeout(Duration::from_millis(10)).as_deref(), Some("first"));
        assert!(mb.post("second".to_string()));
    }

    #[test]
    fn test_mailbox_timeout_empty() {
        let mb = Mailbox::new();
        assert_eq!(mb.collect_timeout(Duration::from_millis(20)), None);
    }
}
