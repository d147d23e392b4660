//! Lesson 09c: Interrupts
//! Double-Buffered ADC Sampling With a CLI on the Side
//!
//! The handler fills one half of a double buffer while a task averages
//! the other; a semaphore handshake swaps the halves. A second task
//! runs the console: "avg" prints the latest average, anything else is
//! echoed through a message queue. Stalling the averaging task shows
//! what the overrun flag is for.
//!
//! Run with: cargo run --bin p09c_isr_double_buffer
//! Add --interactive to type the commands yourself.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use crossbeam::channel::{bounded, Receiver, Sender};
use rtos_patterns::hal::Adc;
use rtos_patterns::isr::{DoubleBuffer, HwTimer, IsrCell};
use rtos_patterns::shell::{Command, Console};
use rtos_patterns::{board, clock, task};

const BUF_LEN: usize = 10;
const MSG_QUEUE_LEN: usize = 5;
const SAMPLE_PERIOD: Duration = Duration::from_millis(50);

/// Latest computed average, written by the calc task, read by the CLI.
static ADC_AVG: IsrCell<f32> = IsrCell::new(0.0);

fn main() {
    clock::init();
    board::banner("ADC Sample & Average Demo w/ CLI");

    let buffer: Arc<DoubleBuffer<u16, BUF_LEN>> = Arc::new(DoubleBuffer::new());
    let (msg_tx, msg_rx) = bounded::<String>(MSG_QUEUE_LEN);

    let timer = {
        let adc = Adc::new("ADC2_CH0");
        let buffer = Arc::clone(&buffer);
        HwTimer::every("hw-timer-0", SAMPLE_PERIOD, move || {
            // A full buffer with the reader still busy drops the
            // sample; the overrun flag remembers that it happened.
            let _ = buffer.push(adc.sample());
        })
    };

    let calc = {
        let buffer = Arc::clone(&buffer);
        let msg_tx = msg_tx.clone();
        task::spawn("calc-avg", 1, move |ctx| {
            loop {
                if !ctx.checkpoint() {
                    return;
                }
                if !buffer.wait_ready_timeout(Duration::from_millis(300)) {
                    continue;
                }
                let sum: u32 = buffer.with_ready(|half| half.iter().map(|&v| u32::from(v)).sum());
                ADC_AVG.set(sum as f32 / BUF_LEN as f32);
                if buffer.overrun() {
                    let _ = msg_tx.try_send("ERROR: BUFFER OVERRUN!! SAMPLES DROPPED!!".to_string());
                }
                buffer.finish_read();
            }
        })
    };

    let cli = {
        let msg_rx = msg_rx.clone();
        task::spawn("user-cli", 2, move |_ctx| {
            cli_loop(&msg_tx, &msg_rx);
        })
    };

    cli.join().unwrap();

    println!("\n=== Part 2: stall the reader, overrun the buffer ===\n");
    println!("{} [main] suspending calc-avg for 1 second", clock::stamp());
    calc.suspend();
    thread::sleep(Duration::from_millis(1000));
    calc.resume();
    // The first batch processed after the stall carries the bad news.
    if let Ok(msg) = msg_rx.recv_timeout(Duration::from_millis(600)) {
        println!("{} [main] {}", clock::stamp(), msg.red());
    }
    println!(
        "{} [main] average recovered to {:.2} after the stall",
        clock::stamp(),
        ADC_AVG.get()
    );

    calc.stop_and_join().unwrap();
    timer.stop();

    println!("\n=== Key Points ===");
    println!("1. Two halves let the ISR write at full rate while the task");
    println!("   reads stable data, no copying, no locking the ISR out");
    println!("2. The swap happens only when the reader has signed off;");
    println!("   otherwise samples drop and the overrun flag says so");
    println!("3. The CLI never touches the buffer, only the published");
    println!("   average, so a slow terminal cannot cause overruns");
}

fn cli_loop(msg_tx: &Sender<String>, msg_rx: &Receiver<String>) {
    let console = Console::from_env(&["avg", "what a nice demo", "avg"]);

    while let Some(line) = console.read_line() {
        drain(msg_rx);
        match line.parse::<Command>() {
            Ok(Command::Avg) => {
                println!("{} [user-cli] Average ADC Value: {:.2}", clock::stamp(), ADC_AVG.get());
            }
            _ => {
                if !line.trim().is_empty() {
                    let _ = msg_tx.try_send(format!("User Entered: {}", line.trim()));
                }
            }
        }
    }
    // Let the last echo land before the console goes away.
    thread::sleep(Duration::from_millis(100));
    drain(msg_rx);
}

fn drain(msg_rx: &Receiver<String>) {
    while let Ok(msg) = msg_rx.try_recv() {
        if msg.starts_with("ERROR") {
            println!("{} [user-cli] {}", clock::stamp(), msg.red());
        } else {
            println!("{} [user-cli] {msg}", clock::stamp());
        }
    }
}
