//! Lesson 01b: Tasks
//! An RGB LED Walks the Color Wheel
//!
//! A fade task dims the RGB LED to black, advances the hue by an
//! eighth of the wheel, and brightens again: the color only ever
//! changes while the LED is dark, so the wheel appears to rotate
//! between pulses. Three full laps, then done.
//!
//! Run with: cargo run --bin p01b_color_wheel

use std::time::Duration;

use rtos_patterns::hal::{Fader, RgbLed};
use rtos_patterns::{board, clock, task};

/// Hue advance at each zero crossing: 8 colors per lap of the 0..=255
/// wheel.
const HUE_STEP: u8 = 32;
const FADE_STEP: u8 = 15;
const TICK: Duration = Duration::from_millis(10);
const LAPS: u32 = 3;

fn main() {
    clock::init();
    board::banner("RGB LED Color Wheel");

    let wheel = task::spawn("rgb-wheel", 1, move |ctx| {
        let led = RgbLed::new("GPIO2");
        led.set_hsv(0, 255, 0);
        let mut fader = Fader::new(FADE_STEP);

        let mut laps = 0;
        while laps < LAPS {
            let level = fader.advance();
            led.set_brightness(level);
            if fader.at_rail() {
                if level == 0 {
                    // The hue moves only while the LED is dark, so a
                    // color never changes mid-pulse.
                    let hue = led.hue().wrapping_add(HUE_STEP);
                    led.set_hue(hue);
                    if hue == 0 {
                        laps += 1;
                        println!(
                            "{} [rgb-wheel] lap {laps} of {LAPS} complete",
                            clock::stamp()
                        );
                    }
                } else {
                    // Peak brightness is where the color shows.
                    led.render();
                }
            }
            if !ctx.delay(TICK) {
                return;
            }
        }
    });

    wheel.join().unwrap();

    println!("\n=== Key Points ===");
    println!("1. Hue, saturation, value: one knob for color, one for depth,");
    println!("   one for brightness; the fade only touches value");
    println!("2. Changing hue at the bottom of the fade hides the switch;");
    println!("   at the top it would be a visible jump");
    println!("3. A u8 hue wraps on its own: 224 + 32 lands back on red");
}
