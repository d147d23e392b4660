//! Lesson 12d: Multicore
//! The Sampling Pipeline Split Across Cores
//!
//! The multicore cut of lesson 09c. Core 0 owns the data path: the
//! timer interrupt samples the ADC into a double buffer and an
//! averaging task drains it. Core 1 owns the console. The two sides
//! share nothing but kernel objects: the buffer handshake, a
//! critical-section cell holding the published average, and a small
//! message queue for echoes and bad news.
//!
//! Run with: cargo run --bin p12d_multicore_pipeline
//! Add --interactive to type the commands yourself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use crossbeam::channel::{bounded, Receiver, Sender};
use rtos_patterns::hal::Adc;
use rtos_patterns::isr::{DoubleBuffer, HwTimer, IsrCell};
use rtos_patterns::shell::{Command, Console};
use rtos_patterns::task::TaskCtx;
use rtos_patterns::{board, clock, task};

const BUF_LEN: usize = 10;
const MSG_QUEUE_LEN: usize = 5;
/// Ten samples at this rate: one fresh batch per second.
const SAMPLE_PERIOD: Duration = Duration::from_millis(100);
/// How long the averager sits on a batch in part 2. Longer than a
/// full fill cycle, so the interrupt runs out of room.
const STALL_TIME: Duration = Duration::from_millis(1500);

fn main() {
    clock::init();
    board::banner("Multicore ADC Sample & Average w/ CLI");

    println!(
        "data path on cpu 0, console on cpu 1 ({} host cores underneath)\n",
        board::host_cores()
    );

    let buffer: Arc<DoubleBuffer<u16, BUF_LEN>> = Arc::new(DoubleBuffer::new());
    let avg = Arc::new(IsrCell::new(0.0f32));
    let (msg_tx, msg_rx) = bounded::<String>(MSG_QUEUE_LEN);
    let stall = Arc::new(AtomicBool::new(false));

    let timer = {
        let adc = Adc::new("ADC2_CH0");
        let buffer = Arc::clone(&buffer);
        HwTimer::every("hw-timer-0", SAMPLE_PERIOD, move || {
            let _ = buffer.push(adc.sample());
        })
    };

    let averager = {
        let buffer = Arc::clone(&buffer);
        let avg = Arc::clone(&avg);
        let msg_tx = msg_tx.clone();
        let stall = Arc::clone(&stall);
        task::spawn("cpu0-avg", 1, move |ctx| {
            average_batches(ctx, &buffer, &avg, &msg_tx, &stall);
        })
    };

    let cli = {
        let avg = Arc::clone(&avg);
        let msg_tx = msg_tx.clone();
        let msg_rx = msg_rx.clone();
        task::spawn("cpu1-cli", 2, move |_ctx| {
            console_loop(&avg, &msg_tx, &msg_rx);
        })
    };

    cli.join().unwrap();

    println!("\n=== Part 2: linger over a batch, overrun the buffer ===\n");
    println!(
        "{} [main] asking cpu0-avg to hold its next batch for {} ms",
        clock::stamp(),
        STALL_TIME.as_millis()
    );
    stall.store(true, Ordering::Relaxed);
    match msg_rx.recv_timeout(Duration::from_millis(4000)) {
        Ok(msg) => println!("{} [main] {}", clock::stamp(), msg.red()),
        Err(_) => println!("{} [main] no overrun reported", clock::stamp()),
    }
    // Give the pipeline one clean batch after the stall.
    thread::sleep(Duration::from_millis(1200));
    println!(
        "{} [main] average recovered to {:.2}",
        clock::stamp(),
        avg.get()
    );

    averager.stop_and_join().unwrap();
    timer.stop();

    println!("\n=== Key Points ===");
    println!("1. The split costs nothing at the seams: semaphores, queues");
    println!("   and the buffer handshake work the same across cores");
    println!("2. The published average is multi-word state, so both cores");
    println!("   only touch it inside a critical section");
    println!("3. Moving the console off the data-path core removes the usual");
    println!("   cause of slow reads; a slow reader still drops samples");
}

/// Core 0's half of the pipeline: wait for a full half, publish its
/// average, report any overrun, hand the half back.
fn average_batches(
    ctx: &TaskCtx,
    buffer: &DoubleBuffer<u16, BUF_LEN>,
    avg: &IsrCell<f32>,
    msg_tx: &Sender<String>,
    stall: &AtomicBool,
) {
    loop {
        if !ctx.checkpoint() {
            return;
        }
        if !buffer.wait_ready_timeout(Duration::from_millis(500)) {
            continue;
        }
        let sum: u32 = buffer.with_ready(|half| half.iter().map(|&v| u32::from(v)).sum());
        if stall.swap(false, Ordering::Relaxed) {
            // Sitting on an unread half past a fill cycle leaves the
            // interrupt nowhere to swap to.
            thread::sleep(STALL_TIME);
        }
        avg.set(sum as f32 / BUF_LEN as f32);
        if buffer.overrun() {
            let _ = msg_tx.try_send("ERROR: BUFFER OVERRUN!! SAMPLES DROPPED!!".to_string());
        }
        buffer.finish_read();
    }
}

/// Core 1's console: `avg` reads the published value, anything else is
/// echoed through the message queue.
fn console_loop(avg: &IsrCell<f32>, msg_tx: &Sender<String>, msg_rx: &Receiver<String>) {
    let console = Console::from_env(&["avg", "multicore hello", "avg"]);

    while let Some(line) = console.read_line() {
        pump(msg_rx);
        match line.parse::<Command>() {
            Ok(Command::Avg) => {
                println!(
                    "{} [cpu1-cli] Average ADC Value: {:.2}",
                    clock::stamp(),
                    avg.get()
                );
            }
            _ => {
                if !line.trim().is_empty() {
                    let _ = msg_tx.try_send(format!("User Entered: {}", line.trim()));
                }
            }
        }
    }
    // Let the last echo cross the queue before the console goes away.
    thread::sleep(Duration::from_millis(100));
    pump(msg_rx);
}

fn pump(msg_rx: &Receiver<String>) {
    while let Ok(msg) = msg_rx.try_recv() {
        if msg.starts_with("ERROR") {
            println!("{} [cpu1-cli] {}", clock::stamp(), msg.red());
        } else {
            println!("{} [cpu1-cli] {msg}", clock::stamp());
        }
    }
}
