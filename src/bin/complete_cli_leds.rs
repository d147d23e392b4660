//! Capstone: CLI-Driven RGB Patterns
//! Everything From the Course in One Program
//!
//! Three cooperating tasks: a console reader queues raw command
//! structs, an interpreter parses them and updates shared settings,
//! and the wheel task animates the RGB LED off those settings. The
//! `delay`, `fade` and `pattern` commands retune the animation while
//! it runs. A power-on self test lights the LED white before any task
//! starts.
//!
//! Run with: cargo run --bin complete_cli_leds
//! Add --interactive to type the commands yourself.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use colored::Colorize;
use crossbeam::channel::{bounded, Receiver, Sender};
use rtos_patterns::hal::RgbLed;
use rtos_patterns::shell::{Command, Console};
use rtos_patterns::task::TaskCtx;
use rtos_patterns::{board, clock, task};

const MSG_QUEUE_LEN: usize = 5;
/// Fixed size of one queued command, terminal line clipped to fit.
const CMD_LEN: usize = 24;

const INITIAL_BRIGHTNESS: i16 = 65;
const INITIAL_FADE: u8 = 5;
const INITIAL_DELAY_MS: u64 = 30;

/// Red and blue on the 43-counts-per-sector hue wheel, for the police
/// pattern.
const HUE_RED: i16 = 0;
const HUE_BLUE: i16 = 172;

/// Console line in transit between the reader and the interpreter.
struct CmdMsg {
    body: heapless::String<CMD_LEN>,
}

/// The knobs the console can turn, snapshotted by the wheel each tick.
#[derive(Clone, Copy)]
struct Settings {
    delay_ms: u64,
    fade: u8,
    pattern: u8,
}

fn main() {
    clock::init();
    board::banner("RGB LED Color Wheel Demo");

    let led = Arc::new(RgbLed::new("GPIO2"));

    // Power-on self test: full white for two seconds, then dark for
    // half a second, before any task runs.
    led.set_hsv(0, 0, 255);
    led.render();
    thread::sleep(Duration::from_millis(2000));
    println!("{} [main] Power On Test Complete...Starting Tasks", clock::stamp());
    led.set_hsv(0, 0, 0);
    led.render();
    thread::sleep(Duration::from_millis(500));

    let (cmd_tx, cmd_rx) = bounded::<CmdMsg>(MSG_QUEUE_LEN);
    let settings = Arc::new(Mutex::new(Settings {
        delay_ms: INITIAL_DELAY_MS,
        fade: INITIAL_FADE,
        pattern: 1,
    }));

    let cli = {
        let cmd_tx = cmd_tx.clone();
        task::spawn("user-cli", 1, move |_ctx| user_cli(&cmd_tx))
    };
    println!("{} [main] User CLI Task Instantiation Complete", clock::stamp());

    let interpreter = {
        let settings = Arc::clone(&settings);
        task::spawn("msg-rx", 1, move |_ctx| interpret(&cmd_rx, &settings))
    };
    println!("{} [main] Message RX Task Instantiation Complete", clock::stamp());

    let wheel = {
        let led = Arc::clone(&led);
        let settings = Arc::clone(&settings);
        task::spawn("rgb-wheel", 1, move |ctx| wheel_loop(ctx, &led, &settings))
    };
    println!("{} [main] RGB LED Task Instantiation Complete", clock::stamp());
    // The interpreter must see end-of-input once the reader is done,
    // so main gives up its sender now.
    drop(cmd_tx);

    println!();
    println!("Enter 'delay xxx' to change RGB Fade Speed");
    println!("Enter 'fade xxx' to change RGB Fade Amount");
    println!("Enter 'pattern xxx' to change RGB Pattern");
    println!();

    cli.join().unwrap();
    interpreter.join().unwrap();
    // Let the wheel animate the final settings before shutdown.
    thread::sleep(Duration::from_millis(1500));
    wheel.stop_and_join().unwrap();

    println!("\n=== Key Points ===");
    println!("1. Three tasks, three jobs: read lines, interpret commands,");
    println!("   animate; the queue is the only coupling between the first");
    println!("   two, the settings mutex the only coupling to the third");
    println!("2. The wheel snapshots the settings once per tick, so a");
    println!("   command lands between frames, never inside one");
    println!("3. Every piece here ran solo in an earlier lesson; the");
    println!("   capstone is composition, not new machinery");
}

/// Reads console lines and queues them raw; parsing is the
/// interpreter's job.
fn user_cli(cmd_tx: &Sender<CmdMsg>) {
    let console = Console::from_env(&[
        "fade 20",
        "delay 15",
        "pattern 2",
        "pattern 9",
        "pattern 3",
        "all systems nominal",
    ]);
    while let Some(line) = console.read_line() {
        // A full queue behaves like a full UART buffer: the line drops.
        let _ = cmd_tx.send_timeout(
            CmdMsg {
                body: clip_cmd(&line),
            },
            Duration::from_millis(10),
        );
    }
}

/// Applies each queued command to the shared settings, reporting what
/// changed. Runs until the reader hangs up.
fn interpret(cmd_rx: &Receiver<CmdMsg>, settings: &Mutex<Settings>) {
    while let Ok(msg) = cmd_rx.recv() {
        match msg.body.parse::<Command>() {
            Ok(Command::Fade(step)) => {
                settings.lock().unwrap().fade = step;
                println!("{} [msg-rx] New Fade Value: {step}", clock::stamp());
            }
            Ok(Command::Delay(ms)) => {
                settings.lock().unwrap().delay_ms = ms;
                println!("{} [msg-rx] New Delay Value: {ms}", clock::stamp());
            }
            Ok(Command::Pattern(n)) => {
                settings.lock().unwrap().pattern = n;
                println!("{} [msg-rx] New Pattern Type: {n}", clock::stamp());
            }
            Ok(_) => {
                println!("{} [msg-rx] User Entered:  {}", clock::stamp(), msg.body);
            }
            Err(e) => {
                println!("{} [msg-rx] {e}", clock::stamp());
            }
        }
    }
}

/// Steps the animation; one pass per tick, delay taken from the
/// settings so the console can retime it live.
fn wheel_loop(ctx: &TaskCtx, led: &RgbLed, settings: &Mutex<Settings>) {
    let mut state = WheelState::new(INITIAL_BRIGHTNESS, INITIAL_FADE);
    let mut applied_fade = INITIAL_FADE;

    led.set_hsv(HUE_RED as u8, 255, state.brightness());
    led.render();

    loop {
        let snap = *settings.lock().unwrap();
        if snap.pattern == 0 || snap.pattern > 3 {
            println!(
                "{} [rgb-wheel] {}",
                clock::stamp(),
                "Invalid Selection: Defaulting to Pattern 1".yellow()
            );
            settings.lock().unwrap().pattern = 1;
        } else {
            if snap.fade != applied_fade {
                state.set_fade(snap.fade);
                applied_fade = snap.fade;
            }
            let event = state.tick(snap.pattern);
            led.set_hsv(state.hue(), 255, state.brightness());
            // Rendering every few-millisecond tick would flood the
            // log; rails and color changes tell the story.
            let show = match snap.pattern {
                3 => state.hue() % 32 == 0,
                _ => event != WheelEvent::Fading,
            };
            if show {
                led.render();
            }
        }
        if !ctx.delay(Duration::from_millis(snap.delay_ms)) {
            return;
        }
    }
}

fn clip_cmd(line: &str) -> heapless::String<CMD_LEN> {
    let mut body = heapless::String::new();
    for ch in line.chars() {
        if body.push(ch).is_err() {
            break;
        }
    }
    body
}

// ============================================================================
// The wheel's animation state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WheelEvent {
    /// Brightness moved, same color.
    Fading,
    /// Bottomed out: ramp reversed and the color advanced.
    ColorChange,
    /// Topped out: ramp reversed.
    Peak,
}

/// Pattern arithmetic, kept apart from the task loop so it can be
/// stepped in tests. The fade field carries its own sign; the console
/// only ever supplies magnitudes.
struct WheelState {
    brightness: i16,
    fade: i16,
    hue: i16,
    swap: bool,
}

impl WheelState {
    fn new(brightness: i16, fade: u8) -> Self {
        Self {
            brightness,
            fade: fade as i16,
            hue: 0,
            swap: false,
        }
    }

    /// New magnitude from the console; the ramp restarts rising.
    fn set_fade(&mut self, magnitude: u8) {
        self.fade = magnitude as i16;
    }

    fn tick(&mut self, pattern: u8) -> WheelEvent {
        match pattern {
            // Police fade: red and blue trade places at the bottom.
            2 => {
                let event = self.ramp();
                if event == WheelEvent::ColorChange {
                    self.swap = !self.swap;
                    self.hue = if self.swap { HUE_BLUE } else { HUE_RED };
                }
                event
            }
            // Steady rotate, no fade.
            3 => {
                self.brightness = 250;
                self.hue += 1;
                if self.hue >= 255 {
                    self.hue = 0;
                }
                WheelEvent::Fading
            }
            // Pattern 1: fade through eight colors, advancing only at
            // the zero crossing so the change is invisible.
            _ => {
                let event = self.ramp();
                if event == WheelEvent::ColorChange {
                    self.hue += 32;
                    if self.hue >= 255 {
                        self.hue = 0;
                    }
                }
                event
            }
        }
    }

    fn ramp(&mut self) -> WheelEvent {
        self.brightness += self.fade;
        if self.brightness <= 0 {
            self.brightness = 0;
            self.fade = -self.fade;
            WheelEvent::ColorChange
        } else if self.brightness >= 255 {
            self.brightness = 255;
            self.fade = -self.fade;
            WheelEvent::Peak
        } else {
            WheelEvent::Fading
        }
    }

    fn hue(&self) -> u8 {
        self.hue as u8
    }

    fn brightness(&self) -> u8 {
        self.brightness as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_reverses_at_both_rails() {
        let mut w = WheelState::new(250, 10);
        assert_eq!(w.tick(1), WheelEvent::Peak);
        assert_eq!(w.brightness(), 255);
        let mut bottomed = false;
        for _ in 0..60 {
            if w.tick(1) == WheelEvent::ColorChange {
                bottomed = true;
                break;
            }
        }
        assert!(bottomed, "ramp never came back down");
        assert_eq!(w.brightness(), 0);
    }

    #[test]
    fn test_pattern1_advances_hue_only_at_zero() {
        let mut w = WheelState::new(65, 5);
        // Climbing: the color must hold.
        loop {
            let event = w.tick(1);
            assert_eq!(w.hue(), 0);
            if event == WheelEvent::Peak {
                break;
            }
        }
        // Descending to zero is where the wheel turns.
        while w.tick(1) != WheelEvent::ColorChange {}
        assert_eq!(w.hue(), 32);
    }

    #[test]
    fn test_pattern1_eight_colors_then_wrap() {
        let mut w = WheelState::new(65, 5);
        let mut hues = vec![w.hue()];
        while hues.len() < 9 {
            if w.tick(1) == WheelEvent::ColorChange {
                hues.push(w.hue());
            }
        }
        assert_eq!(hues, vec![0, 32, 64, 96, 128, 160, 192, 224, 0]);
    }

    #[test]
    fn test_pattern2_swaps_red_and_blue() {
        let mut w = WheelState::new(65, 5);
        let mut seen = Vec::new();
        while seen.len() < 3 {
            if w.tick(2) == WheelEvent::ColorChange {
                seen.push(w.hue());
            }
        }
        assert_eq!(seen, vec![HUE_BLUE as u8, HUE_RED as u8, HUE_BLUE as u8]);
    }

    #[test]
    fn test_pattern3_rotates_at_full_brightness() {
        let mut w = WheelState::new(65, 5);
        for expect in 1..=100u8 {
            w.tick(3);
            assert_eq!(w.hue(), expect);
        }
        assert_eq!(w.brightness(), 250);
        // The wheel wraps a count short of the top.
        for _ in 100..255 {
            w.tick(3);
        }
        assert_eq!(w.hue(), 0);
    }

    #[test]
    fn test_set_fade_turns_the_ramp_upward() {
        let mut w = WheelState::new(65, 5);
        while w.tick(1) != WheelEvent::Peak {}
        w.tick(1);
        let before = w.brightness();
        w.set_fade(20);
        w.tick(1);
        assert!(w.brightness() > before, "fresh fade setting should climb");
    }

    #[test]
    fn test_clip_cmd_respects_message_size() {
        let clipped = clip_cmd("pattern 123456789012345678901234567890");
        assert_eq!(clipped.len(), CMD_LEN);
        assert!(clipped.starts_with("pattern 1"));
    }
}
