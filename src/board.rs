//! Console stand-ins for things a dev board does out of band: the boot
//! banner, the panic-restart path, and a report of the cores we have to
//! play with.

use std::process;

use colored::Colorize;

/// Prints the demo title the way the serial monitor shows a sketch
/// banner after reset.
pub fn banner(title: &str) {
    println!();
    println!("{}", banner_line(title).bold().cyan());
    println!();
}

pub(crate) fn banner_line(title: &str) -> String {
    format!("=>> {title} <<=")
}

/// Unrecoverable-error policy: report and restart the device. On the
/// desktop the closest honest equivalent is to end the process with a
/// failure code.
pub fn restart(reason: &str) -> ! {
    eprintln!("{} {}", "ERROR:".red().bold(), reason.red());
    eprintln!("{}", "RESTARTING DEVICE".red().bold());
    process::exit(1);
}

/// A reset that the lesson script recovers from: prints the reset
/// marker and lets the caller run its "next boot". Used by the
/// watchdog lesson, where the whole point is to watch the device come
/// back up and take the fixed path.
pub fn reset_notice(reason: &str) {
    println!("{}", format!("*** DEVICE RESET: {reason} ***").red().bold());
}

/// Number of host cores available. The multicore lessons pin tasks to
/// two simulated cores regardless, but report the real count so runs
/// on a single-core CI box can be interpreted.
pub fn host_cores() -> usize {
    num_cpus::get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_line_wraps_title() {
        assert_eq!(banner_line("Queue Demo"), "=>> Queue Demo <<=");
    }

    #[test]
    fn test_host_cores_nonzero() {
        assert!(host_cores() >= 1);
    }
}
