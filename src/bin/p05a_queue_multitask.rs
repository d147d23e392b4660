//! Lesson 05a: Queues
//! Two Queues Wire a CLI Task to a Blink Task
//!
//! Commands flow one way ("delay 100" changes the blink rate), status
//! messages flow back the other ("# Of Blinks: 100"). The tasks share
//! no state at all, only queue items.
//!
//! Run with: cargo run --bin p05a_queue_multitask
//! Add --interactive to type the commands yourself.

use std::time::Duration;

use colored::Colorize;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use rtos_patterns::hal::Led;
use rtos_patterns::shell::{Command, Console};
use rtos_patterns::task::TaskCtx;
use rtos_patterns::{board, clock, task};

const QUEUE_LEN: usize = 5;
/// Fixed message body, the size a queue-item struct would carry.
const MSG_BODY: usize = 20;
/// Report every this many blinks.
const BLINK_NOTIFY: u64 = 100;

/// Sent by value through the message queue, like a C struct with a
/// `char body[20]` and an int.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Message {
    body: heapless::String<MSG_BODY>,
    count: u64,
}

impl Message {
    fn new(text: &str, count: u64) -> Self {
        Self {
            body: clip_body(text),
            count,
        }
    }
}

/// Fits `text` into the fixed body, truncating like a careful strcpy.
fn clip_body(text: &str) -> heapless::String<MSG_BODY> {
    let mut body = heapless::String::new();
    for ch in text.chars() {
        if body.push(ch).is_err() {
            break;
        }
    }
    body
}

fn main() {
    clock::init();
    board::banner("Queue Multitask Demo");

    println!("Enter 'delay xxx' where xxx is the blink delay in ms\n");

    let (delay_tx, delay_rx) = bounded::<u64>(QUEUE_LEN);
    let (msg_tx, msg_rx) = bounded::<Message>(QUEUE_LEN);

    let cli = task::spawn("user-cli", 1, move |_ctx| {
        cli_loop(&delay_tx, &msg_rx);
    });

    let blinker = task::spawn("blink-led", 1, move |ctx| {
        blink_loop(ctx, &delay_rx, &msg_tx);
    });

    cli.join().unwrap();
    blinker.stop_and_join().unwrap();

    println!("\n=== Key Points ===");
    println!("1. Queues move copies; neither task can touch the other's state");
    println!("2. Two queues give each direction its own backpressure");
    println!("3. The blink task never parses text and the CLI never blinks:");
    println!("   clean division of labor");
}

fn cli_loop(delay_tx: &Sender<u64>, msg_rx: &Receiver<Message>) {
    let console = Console::from_env(&["delay 100", "delay 35", "hello queue demo", "delay -15"]);

    // Console attached: parse commands, relay status between lines.
    while let Some(line) = console.read_line() {
        drain_status(msg_rx);

        match line.parse::<Command>() {
            Ok(Command::Delay(ms)) => {
                if delay_tx.try_send(ms).is_err() {
                    println!(
                        "{} [user-cli] {}",
                        clock::stamp(),
                        "ERROR: Could Not Put Item In Delay Queue!".red()
                    );
                }
            }
            Ok(_) => {
                if !line.trim().is_empty() {
                    println!(
                        "{} [user-cli] User Entered: {} ({} chars)",
                        clock::stamp(),
                        line.trim(),
                        line.trim().len()
                    );
                }
            }
            Err(e) => println!("{} [user-cli] {}", clock::stamp(), e.to_string().red()),
        }
    }

    // Console gone; hang around for the next blink report, then wrap up.
    println!(
        "{} [user-cli] console closed, waiting for the blink report",
        clock::stamp()
    );
    loop {
        match msg_rx.recv_timeout(Duration::from_secs(30)) {
            Ok(msg) => {
                let done = msg.body.starts_with("# Of Blinks");
                print_status(&msg);
                if done {
                    return;
                }
            }
            Err(_) => {
                println!(
                    "{} [user-cli] {}",
                    clock::stamp(),
                    "no blink report arrived; giving up".yellow()
                );
                return;
            }
        }
    }
}

fn drain_status(msg_rx: &Receiver<Message>) {
    while let Ok(msg) = msg_rx.try_recv() {
        print_status(&msg);
    }
}

fn print_status(msg: &Message) {
    println!("{} [user-cli] {}{}", clock::stamp(), msg.body, msg.count);
}

fn blink_loop(ctx: &TaskCtx, delay_rx: &Receiver<u64>, msg_tx: &Sender<Message>) {
    let led = Led::silent("LED13");
    let mut led_delay = Duration::from_millis(500);
    let mut blinks: u64 = 0;

    loop {
        if let Ok(ms) = delay_rx.try_recv() {
            led_delay = Duration::from_millis(ms.max(1));
            let _ = msg_tx.try_send(Message::new("New Delay Val: ", ms));
        }

        led.set_high();
        if !ctx.delay(led_delay) {
            return;
        }
        led.set_low();
        if !ctx.delay(led_delay) {
            return;
        }
        blinks += 1;

        if blinks % BLINK_NOTIFY == 0 {
            match msg_tx.try_send(Message::new("# Of Blinks: ", blinks)) {
                Ok(()) => {}
                // Status is best-effort; a full queue drops the report.
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_body_fits() {
        assert_eq!(clip_body("short").as_str(), "short");
        let long = clip_body("a string well past the twenty byte limit");
        assert_eq!(long.len(), MSG_BODY);
    }

    #[test]
    fn test_message_carries_count() {
        let msg = Message::new("# Of Blinks: ", 100);
        assert_eq!(msg.body.as_str(), "# Of Blinks: ");
        assert_eq!(msg.count, 100);
    }
}
