//! Lesson 09b: Interrupts
//! An ISR Hands Fresh ADC Readings to a Task With a Semaphore
//!
//! The handler samples the ADC and gives a binary semaphore; a task
//! blocks on the take and prints each reading. The atomic slot keeps
//! the value whole, the semaphore says when it is fresh. Part 2 speeds
//! the timer up past the task and counts the wakeups that got lost.
//!
//! Run with: cargo run --bin p09b_isr_semaphore

use std::io::{self, Write};
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use rtos_patterns::hal::Adc;
use rtos_patterns::isr::HwTimer;
use rtos_patterns::sync::Semaphore;
use rtos_patterns::{board, clock, task};

fn main() {
    clock::init();
    board::banner("ISR Semaphore ADC Demo");

    println!("=== Part 1: every reading consumed ===\n");

    let value = Arc::new(AtomicU16::new(0));
    let fresh = Arc::new(Semaphore::binary());

    let timer = {
        // Signal period off the sample period, or a 1 Hz sampler of a
        // 1 Hz signal reads the same value forever.
        let adc = Adc::new("ADC2_CH0").with_period(Duration::from_millis(700));
        let value = Arc::clone(&value);
        let fresh = Arc::clone(&fresh);
        HwTimer::every("hw-timer-0", Duration::from_millis(1000), move || {
            value.store(adc.sample(), Ordering::Relaxed);
            // Give never blocks, so it is legal here. A leftover permit
            // just means the task has not caught up yet.
            let _ = fresh.give();
        })
    };

    let printer = {
        let value = Arc::clone(&value);
        let fresh = Arc::clone(&fresh);
        task::spawn("print-adc", 2, move |_ctx| {
            for _ in 0..4 {
                fresh.take();
                print!("{}  ", value.load(Ordering::Relaxed));
                io::stdout().flush().unwrap();
            }
            println!();
        })
    };

    printer.join().unwrap();
    timer.stop();

    println!("\n=== Part 2: the ISR outruns the task ===\n");

    let value = Arc::new(AtomicU16::new(0));
    let fresh = Arc::new(Semaphore::binary());
    let missed = Arc::new(AtomicU32::new(0));

    let timer = {
        let adc = Adc::new("ADC2_CH0").with_period(Duration::from_millis(400));
        let value = Arc::clone(&value);
        let fresh = Arc::clone(&fresh);
        let missed = Arc::clone(&missed);
        HwTimer::every("hw-timer-1", Duration::from_millis(50), move || {
            value.store(adc.sample(), Ordering::Relaxed);
            if fresh.give().is_err() {
                // Permit already pending: this wakeup is lost, the task
                // will only ever see the newest value.
                missed.fetch_add(1, Ordering::Relaxed);
            }
        })
    };

    let printer = {
        let value = Arc::clone(&value);
        let fresh = Arc::clone(&fresh);
        task::spawn("slow-consumer", 2, move |ctx| {
            for _ in 0..8 {
                fresh.take();
                print!("{}  ", value.load(Ordering::Relaxed));
                io::stdout().flush().unwrap();
                // Pretend each reading takes real work to digest.
                if !ctx.delay(Duration::from_millis(200)) {
                    return;
                }
            }
            println!();
        })
    };

    printer.join().unwrap();
    timer.stop();

    let lost = missed.load(Ordering::Relaxed);
    println!(
        "\n{}",
        format!("{lost} readings produced no wakeup: a binary semaphore cannot queue").yellow()
    );

    println!("\n=== Key Points ===");
    println!("1. Give from interrupt context must never block, and a binary");
    println!("   semaphore's give never does");
    println!("2. The atomic slot and the semaphore split the job: integrity");
    println!("   of the value versus news that it changed");
    println!("3. When the producer can outrun the consumer, a queue or a");
    println!("   counting semaphore is the honest fix");
}
