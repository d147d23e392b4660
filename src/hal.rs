//! Console LEDs and a fake ADC.
//!
//! On the bench these lessons drive real pins; here every state change
//! is rendered as a serial-log line instead, so the blink patterns and
//! fades can be read off the terminal. State lives in atomics so one
//! LED can be shared by several tasks, the way a GPIO register is.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use colored::Colorize;
use rand::Rng;

use crate::clock;

// ============================================================================
// Digital LED
// ============================================================================

pub struct Led {
    label: String,
    lit: AtomicBool,
    silent: bool,
}

impl Led {
    /// LED that logs every edge to the console.
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            lit: AtomicBool::new(false),
            silent: false,
        }
    }

    /// LED that only tracks state. Used by tests and by lessons where
    /// the interesting output is elsewhere.
    pub fn silent(label: &str) -> Self {
        Self {
            label: label.to_string(),
            lit: AtomicBool::new(false),
            silent: true,
        }
    }

    pub fn set_high(&self) {
        self.lit.store(true, Ordering::Relaxed);
        self.render();
    }

    pub fn set_low(&self) {
        self.lit.store(false, Ordering::Relaxed);
        self.render();
    }

    /// Flips the LED and returns the new state.
    pub fn toggle(&self) -> bool {
        let now = !self.lit.fetch_xor(true, Ordering::Relaxed);
        self.render();
        now
    }

    pub fn is_on(&self) -> bool {
        self.lit.load(Ordering::Relaxed)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn render(&self) {
        if self.silent {
            return;
        }
        let glyph = if self.is_on() {
            "● on ".green()
        } else {
            "○ off".bright_black()
        };
        println!("{} [{}] {}", clock::stamp(), self.label, glyph);
    }
}

// ============================================================================
// PWM LED (brightness 0..=255)
// ============================================================================

pub struct PwmLed {
    label: String,
    duty: AtomicU8,
}

impl PwmLed {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            duty: AtomicU8::new(0),
        }
    }

    pub fn set_brightness(&self, duty: u8) {
        self.duty.store(duty, Ordering::Relaxed);
    }

    pub fn brightness(&self) -> u8 {
        self.duty.load(Ordering::Relaxed)
    }

    /// Prints the current duty as a bar. The fade loops update duty
    /// every few milliseconds; callers render at coarser checkpoints
    /// to keep the log readable.
    pub fn render(&self) {
        let duty = self.brightness();
        let filled = duty as usize * 16 / 255;
        let bar = format!("{}{}", "▮".repeat(filled), "▯".repeat(16 - filled));
        println!(
            "{} [{}] {:>3}/255 |{}|",
            clock::stamp(),
            self.label,
            duty,
            bar.yellow()
        );
    }
}

/// Triangle-wave brightness stepper: walks 0..=255 and back, flipping
/// direction at the rails.
pub struct Fader {
    level: i16,
    step: i16,
}

impl Fader {
    pub fn new(step: u8) -> Self {
        Self {
            level: 0,
            step: step as i16,
        }
    }

    /// One fade tick. Returns the new level.
    pub fn advance(&mut self) -> u8 {
        self.level += self.step;
        if self.level >= 255 {
            self.level = 255;
            self.step = -self.step;
        } else if self.level <= 0 {
            self.level = 0;
            self.step = -self.step;
        }
        self.level as u8
    }

    /// True on the tick where the direction just flipped.
    pub fn at_rail(&self) -> bool {
        self.level == 0 || self.level == 255
    }
}

// ============================================================================
// RGB LED (hue/sat/val, like the usual addressable-LED color wheel)
// ============================================================================

pub struct RgbLed {
    label: String,
    hue: AtomicU8,
    sat: AtomicU8,
    val: AtomicU8,
}

impl RgbLed {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            hue: AtomicU8::new(0),
            sat: AtomicU8::new(255),
            val: AtomicU8::new(0),
        }
    }

    pub fn set_hsv(&self, hue: u8, sat: u8, val: u8) {
        self.hue.store(hue, Ordering::Relaxed);
        self.sat.store(sat, Ordering::Relaxed);
        self.val.store(val, Ordering::Relaxed);
    }

    pub fn set_hue(&self, hue: u8) {
        self.hue.store(hue, Ordering::Relaxed);
    }

    pub fn set_brightness(&self, val: u8) {
        self.val.store(val, Ordering::Relaxed);
    }

    pub fn hue(&self) -> u8 {
        self.hue.load(Ordering::Relaxed)
    }

    pub fn rgb(&self) -> (u8, u8, u8) {
        hsv_to_rgb(
            self.hue.load(Ordering::Relaxed),
            self.sat.load(Ordering::Relaxed),
            self.val.load(Ordering::Relaxed),
        )
    }

    /// Prints a true-color swatch plus the numeric channel values.
    pub fn render(&self) {
        let (r, g, b) = self.rgb();
        println!(
            "{} [{}] {} hue={:>3} rgb=({:>3},{:>3},{:>3})",
            clock::stamp(),
            self.label,
            "██".truecolor(r, g, b),
            self.hue(),
            r,
            g,
            b
        );
    }
}

/// Integer HSV to RGB, all channels 0..=255. Matches the 6-sector hue
/// wheel the addressable-LED libraries use (43 hue counts per sector).
pub fn hsv_to_rgb(h: u8, s: u8, v: u8) -> (u8, u8, u8) {
    if s == 0 {
        return (v, v, v);
    }
    let region = h / 43;
    let remainder = (h as u16 - region as u16 * 43) * 6;
    let v16 = v as u16;
    let s16 = s as u16;
    let p = (v16 * (255 - s16) / 255) as u8;
    let q = (v16 * (255 - s16 * remainder / 255) / 255) as u8;
    let t = (v16 * (255 - s16 * (255 - remainder) / 255) / 255) as u8;
    match region {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

// ============================================================================
// Fake ADC: sine wave plus sampling noise, 12-bit like an ESP32 pin
// ============================================================================

pub const ADC_MAX: u16 = 4095;

pub struct Adc {
    label: String,
    period_ms: u64,
}

impl Adc {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            period_ms: 1000,
        }
    }

    /// Overrides the simulated signal's period (default one second).
    pub fn with_period(mut self, period: std::time::Duration) -> Self {
        self.period_ms = period.as_millis() as u64;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// One conversion: the waveform at the current uptime, with a few
    /// counts of noise mixed in.
    pub fn sample(&self) -> u16 {
        let base = waveform(clock::now_ms(), self.period_ms) as i32;
        let noise = rand::thread_rng().gen_range(-32..=32);
        (base + noise).clamp(0, ADC_MAX as i32) as u16
    }
}

/// The noiseless waveform: a sine centered mid-scale, swinging half
/// the range. Kept separate from [`Adc::sample`] so tests can pin
/// exact values.
pub fn waveform(t_ms: u64, period_ms: u64) -> u16 {
    let phase = (t_ms % period_ms) as f64 / period_ms as f64;
    let value = 2048.0 + 1024.0 * (phase * std::f64::consts::TAU).sin();
    value.clamp(0.0, ADC_MAX as f64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_led_state_tracking() {
        let led = Led::silent("LED13");
        assert!(!led.is_on());
        led.set_high();
        assert!(led.is_on());
        assert!(!led.toggle());
        assert!(led.toggle());
    }

    #[test]
    fn test_fader_bounces_at_rails() {
        let mut fader = Fader::new(85);
        let mut seen = Vec::new();
        for _ in 0..12 {
            seen.push(fader.advance());
        }
        assert!(seen.contains(&255), "never reached full brightness: {seen:?}");
        assert!(seen.contains(&0), "never came back to zero: {seen:?}");
        assert!(seen.iter().all(|&v| v <= 255));
    }

    #[test]
    fn test_hsv_primary_colors() {
        // Full saturation, full value: sector starts land on the
        // primaries.
        assert_eq!(hsv_to_rgb(0, 255, 255), (255, 0, 0));
        let (r, g, b) = hsv_to_rgb(86, 255, 255);
        assert!(g > 200 && r < 32 && b < 32, "hue 86 not green: ({r},{g},{b})");
        let (r, g, b) = hsv_to_rgb(172, 255, 255);
        assert!(b > 200 && r < 32 && g < 32, "hue 172 not blue: ({r},{g},{b})");
    }

    #[test]
    fn test_hsv_zero_saturation_is_gray() {
        assert_eq!(hsv_to_rgb(123, 0, 77), (77, 77, 77));
    }

    #[test]
    fn test_waveform_stays_in_range() {
        for t in (0..2000).step_by(7) {
            let v = waveform(t, 1000);
            assert!(v <= ADC_MAX);
        }
        // Quarter period is the crest, three quarters the trough.
        assert!(waveform(250, 1000) > 2900);
        assert!(waveform(750, 1000) < 1200);
    }

    #[test]
    fn test_adc_sample_in_range() {
        let adc = Adc::new("GPIO34");
        for _ in 0..100 {
            assert!(adc.sample() <= ADC_MAX);
        }
    }
}
