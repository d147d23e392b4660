//! Lesson 09d: Interrupts
//! Audio-Rate Sampling, RMS Math, and a Brightness Readout
//!
//! Same double-buffer skeleton as lesson 09c, pushed harder: the
//! handler samples every 2 ms, the processing task computes the RMS
//! voltage of each 200-sample batch and drives a PWM LED with it, and
//! the console answers "rms" with the latest figure.
//!
//! Run with: cargo run --bin p09d_adc_rms
//! Add --interactive to type the commands yourself.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use crossbeam::channel::{bounded, Receiver, Sender};
use rtos_patterns::hal::{Adc, PwmLed, ADC_MAX};
use rtos_patterns::isr::{DoubleBuffer, HwTimer, IsrCell};
use rtos_patterns::shell::{Command, Console};
use rtos_patterns::{board, clock, task};

const BUF_LEN: usize = 200;
const MSG_QUEUE_LEN: usize = 5;
const SAMPLE_PERIOD: Duration = Duration::from_millis(2);
/// Full-scale ADC input in volts.
const ADC_VOLTAGE: f32 = 3.3;

static ADC_RMS: IsrCell<f32> = IsrCell::new(0.0);

fn to_volts(raw: f32) -> f32 {
    raw * ADC_VOLTAGE / ADC_MAX as f32
}

fn mean(samples: &[u16]) -> f32 {
    let sum: u32 = samples.iter().map(|&v| u32::from(v)).sum();
    sum as f32 / samples.len() as f32
}

/// RMS of the AC component, in volts: the DC mean is subtracted first,
/// the way an audio level meter would.
fn rms_volts(samples: &[u16]) -> f32 {
    let avg_v = to_volts(mean(samples));
    let sum_sq: f32 = samples
        .iter()
        .map(|&s| {
            let v = to_volts(s as f32);
            (v - avg_v) * (v - avg_v)
        })
        .sum();
    (sum_sq / samples.len() as f32).sqrt()
}

fn main() {
    clock::init();
    board::banner("ADC RMS Audio Sample & Process Demo w/ CLI");

    let buffer: Arc<DoubleBuffer<u16, BUF_LEN>> = Arc::new(DoubleBuffer::new());
    let (msg_tx, msg_rx) = bounded::<String>(MSG_QUEUE_LEN);

    let timer = {
        // One 400 ms waveform period spans exactly one batch.
        let adc = Adc::new("ADC2_CH0").with_period(Duration::from_millis(400));
        let buffer = Arc::clone(&buffer);
        HwTimer::every("hw-timer-0", SAMPLE_PERIOD, move || {
            let _ = buffer.push(adc.sample());
        })
    };

    let calc = {
        let buffer = Arc::clone(&buffer);
        let msg_tx = msg_tx.clone();
        task::spawn("calc-rms", 1, move |ctx| {
            let led = PwmLed::new("PWM0(GPIO25)");
            loop {
                if !ctx.checkpoint() {
                    return;
                }
                if !buffer.wait_ready_timeout(Duration::from_millis(300)) {
                    continue;
                }
                let rms = buffer.with_ready(|half| rms_volts(half));
                ADC_RMS.set(rms);
                // Louder signal, brighter LED.
                led.set_brightness((rms * 255.0 / ADC_VOLTAGE) as u8);
                led.render();
                if buffer.overrun() {
                    let _ = msg_tx.try_send("ERROR: BUFFER OVERRUN!! SAMPLES DROPPED!!".to_string());
                }
                buffer.finish_read();
            }
        })
    };

    let cli = task::spawn("user-cli", 2, move |_ctx| {
        cli_loop(&msg_tx, &msg_rx);
    });

    cli.join().unwrap();
    calc.stop_and_join().unwrap();
    timer.stop();

    println!("\n=== Key Points ===");
    println!("1. 200 samples every 2 ms is far beyond what per-sample");
    println!("   signaling could keep up with; batching is the only way");
    println!("2. RMS about the mean measures the wiggle, not the offset;");
    println!("   a silent input reads zero volts no matter its bias");
    println!("3. The processing task owns the math and the LED; the ISR");
    println!("   only ever moves one number into a slot");
}

fn cli_loop(msg_tx: &Sender<String>, msg_rx: &Receiver<String>) {
    let console = Console::from_env(&["rms", "turn it up", "rms"]);

    while let Some(line) = console.read_line() {
        while let Ok(msg) = msg_rx.try_recv() {
            if msg.starts_with("ERROR") {
                println!("{} [user-cli] {}", clock::stamp(), msg.red());
            } else {
                println!("{} [user-cli] {msg}", clock::stamp());
            }
        }
        match line.parse::<Command>() {
            Ok(Command::Rms) => {
                println!("{} [user-cli] RMS Voltage: {:.3} V", clock::stamp(), ADC_RMS.get());
            }
            _ => {
                if !line.trim().is_empty() {
                    let _ = msg_tx.try_send(format!("User Entered: {}", line.trim()));
                }
            }
        }
    }
    thread::sleep(Duration::from_millis(100));
    while let Ok(msg) = msg_rx.try_recv() {
        println!("{} [user-cli] {msg}", clock::stamp());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtos_patterns::hal::waveform;

    #[test]
    fn test_flat_signal_has_zero_rms() {
        let samples = [1000u16; BUF_LEN];
        assert!(rms_volts(&samples) < 1e-6);
        assert_eq!(mean(&samples), 1000.0);
    }

    #[test]
    fn test_sine_rms_is_amplitude_over_root_two() {
        // One full 400 ms waveform cycle sampled every 2 ms.
        let samples: Vec<u16> = (0..BUF_LEN).map(|i| waveform(i as u64 * 2, 400)).collect();
        // Amplitude 1024 counts: RMS = 1024 / sqrt(2) counts, in volts.
        let expected = to_volts(1024.0 / std::f32::consts::SQRT_2);
        let got = rms_volts(&samples);
        assert!((got - expected).abs() < 0.02, "rms {got} vs {expected}");
    }

    #[test]
    fn test_rms_ignores_dc_offset() {
        let low: Vec<u16> = (0..BUF_LEN).map(|i| 500 + (i % 2) as u16 * 100).collect();
        let high: Vec<u16> = (0..BUF_LEN).map(|i| 3000 + (i % 2) as u16 * 100).collect();
        assert!((rms_volts(&low) - rms_volts(&high)).abs() < 1e-4);
    }
}
