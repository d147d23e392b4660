//! Lesson 07b: Semaphores
//! Producers, Consumers, and the Two-Semaphore Buffer
//!
//! Five producers write three values each into a five-slot ring while
//! two consumers drain it. Without flow control the ring overwrites
//! unread slots and serves stale ones. A pair of counting semaphores
//! (empty slots, filled slots) fixes both failure modes at once.
//!
//! Run with: cargo run --bin p07b_producer_consumer

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use colored::Colorize;
use heapless::Deque;
use rand::Rng;
use rtos_patterns::sync::Semaphore;
use rtos_patterns::{board, clock, task};

const BUFFER_SIZE: usize = 5;
const NUM_PRODUCERS: usize = 5;
const NUM_CONSUMERS: usize = 2;
const NUM_WRITES: usize = 3;

// ============================================================================
// Part 1: a ring buffer with no flow control
// ============================================================================

/// Bare ring the way the broken original keeps it: indices advance no
/// matter what, so it can overwrite unread data and replay old data.
struct Ring {
    slots: [i32; BUFFER_SIZE],
    head: usize,
    tail: usize,
    live: usize,
}

impl Ring {
    fn new() -> Self {
        Self {
            slots: [0; BUFFER_SIZE],
            head: 0,
            tail: 0,
            live: 0,
        }
    }

    /// Writes unconditionally. Returns true if an unread slot died.
    fn force_push(&mut self, val: i32) -> bool {
        self.slots[self.head] = val;
        self.head = (self.head + 1) % BUFFER_SIZE;
        if self.live == BUFFER_SIZE {
            true
        } else {
            self.live += 1;
            false
        }
    }

    /// Reads unconditionally. Returns the value and whether it was
    /// stale (nothing new had been written).
    fn force_pop(&mut self) -> (i32, bool) {
        let val = self.slots[self.tail];
        self.tail = (self.tail + 1) % BUFFER_SIZE;
        if self.live == 0 {
            (val, true)
        } else {
            self.live -= 1;
            (val, false)
        }
    }
}

fn run_unsynced() {
    let ring = Arc::new(Mutex::new(Ring::new()));
    let overwrites = Arc::new(AtomicUsize::new(0));
    let stale = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..NUM_PRODUCERS {
        let ring = Arc::clone(&ring);
        let overwrites = Arc::clone(&overwrites);
        handles.push(task::spawn(&format!("prod-{i}"), 1, move |_ctx| {
            for _ in 0..NUM_WRITES {
                if ring.lock().unwrap().force_push(i as i32) {
                    overwrites.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }
    for j in 0..NUM_CONSUMERS {
        let ring = Arc::clone(&ring);
        let stale = Arc::clone(&stale);
        handles.push(task::spawn(&format!("cons-{j}"), 1, move |_ctx| {
            // Each consumer grabs its share with no idea whether the
            // data is ready.
            for _ in 0..(NUM_PRODUCERS * NUM_WRITES / NUM_CONSUMERS) {
                let (_, was_stale) = ring.lock().unwrap().force_pop();
                if was_stale {
                    stale.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let lost = overwrites.load(Ordering::Relaxed);
    let replayed = stale.load(Ordering::Relaxed);
    println!(
        "{}",
        format!("{lost} unread values overwritten, {replayed} stale reads served").yellow()
    );
}

// ============================================================================
// Part 2: the same traffic, flow-controlled
// ============================================================================

fn run_synced() {
    let buffer: Arc<Mutex<Deque<i32, BUFFER_SIZE>>> = Arc::new(Mutex::new(Deque::new()));
    let empty = Arc::new(Semaphore::counting(BUFFER_SIZE, BUFFER_SIZE));
    let filled = Arc::new(Semaphore::counting(BUFFER_SIZE, 0));
    let consumed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..NUM_PRODUCERS {
        let buffer = Arc::clone(&buffer);
        let empty = Arc::clone(&empty);
        let filled = Arc::clone(&filled);
        handles.push(task::spawn(&format!("prod-{i}"), 1, move |_ctx| {
            let mut rng = rand::thread_rng();
            for _ in 0..NUM_WRITES {
                empty.take();
                // An empty permit in hand means push_back cannot fail.
                buffer.lock().unwrap().push_back(i as i32).unwrap();
                filled.give().unwrap();
                thread::sleep(Duration::from_millis(rng.gen_range(1..10)));
            }
        }));
    }
    for j in 0..NUM_CONSUMERS {
        let buffer = Arc::clone(&buffer);
        let empty = Arc::clone(&empty);
        let filled = Arc::clone(&filled);
        let consumed = Arc::clone(&consumed);
        handles.push(task::spawn(&format!("cons-{j}"), 1, move |_ctx| {
            loop {
                // Quiet for this long means the producers are done.
                if !filled.take_timeout(Duration::from_millis(300)) {
                    return;
                }
                let val = buffer.lock().unwrap().pop_front().unwrap();
                empty.give().unwrap();
                consumed.fetch_add(1, Ordering::Relaxed);
                println!("{} [cons-{j}] {val}", clock::stamp());
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let total = consumed.load(Ordering::Relaxed);
    println!(
        "\n{}",
        format!(
            "consumed {total}/{} values, nothing lost, nothing replayed",
            NUM_PRODUCERS * NUM_WRITES
        )
        .green()
    );
}

fn main() {
    clock::init();
    board::banner("Counting Semaphores With Tasks");

    println!("=== Part 1: shared ring, no flow control ===\n");
    run_unsynced();

    println!("\n=== Part 2: empty/filled semaphore pair ===\n");
    run_synced();

    println!("\n=== Key Points ===");
    println!("1. The mutex alone cannot help: it keeps the indices sane but");
    println!("   says nothing about whether a slot holds fresh data");
    println!("2. 'empty' counts room to write, 'filled' counts work to read;");
    println!("   producers and consumers block on exactly the one they need");
    println!("3. With both permits enforced, push and pop can never fail,");
    println!("   which is why the unwraps in part 2 are safe");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_detects_overwrite() {
        let mut ring = Ring::new();
        for v in 0..BUFFER_SIZE as i32 {
            assert!(!ring.force_push(v));
        }
        assert!(ring.force_push(99));
    }

    #[test]
    fn test_ring_detects_stale_read() {
        let mut ring = Ring::new();
        ring.force_push(7);
        assert_eq!(ring.force_pop(), (7, false));
        let (_, stale) = ring.force_pop();
        assert!(stale);
    }

    #[test]
    fn test_ring_wraps_in_order() {
        let mut ring = Ring::new();
        for v in 0..BUFFER_SIZE as i32 {
            ring.force_push(v);
        }
        ring.force_pop();
        ring.force_push(5);
        let vals: Vec<i32> = (0..BUFFER_SIZE).map(|_| ring.force_pop().0).collect();
        assert_eq!(vals, vec![1, 2, 3, 4, 5]);
    }
}
