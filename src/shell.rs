//! The serial console: a line-oriented command channel feeding the
//! CLI lessons.
//!
//! By default each lesson replays a short script, so the demo runs
//! hands-free and terminates. Pass `--interactive` to any CLI lesson
//! to type at it yourself (Ctrl-D ends the session, like unplugging
//! the serial cable).

use std::env;
use std::io::{self, BufRead};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use crossbeam::channel::{unbounded, Receiver};
use thiserror::Error;

/// Longest accepted input line; the size of the receive buffer a
/// UART handler would use. Anything longer is truncated.
pub const CMD_MAX: usize = 255;

// ============================================================================
// Command grammar
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `delay <ms>` — set a blink/step interval.
    Delay(u64),
    /// `fade <step>` — set the brightness step per fade tick.
    Fade(u8),
    /// `pattern <n>` — select an LED pattern.
    Pattern(u8),
    /// `avg` — report the latest computed average.
    Avg,
    /// `rms` — report the latest computed RMS value.
    Rms,
    /// Anything else; lessons echo it back.
    Text(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CmdError {
    #[error("'{command}' needs a value")]
    MissingValue { command: &'static str },
    #[error("'{command}' wants a number, got {given:?}")]
    BadValue { command: &'static str, given: String },
}

impl FromStr for Command {
    type Err = CmdError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let trimmed = line.trim();
        let mut words = trimmed.split_whitespace();
        match words.next() {
            Some("delay") => Ok(Command::Delay(int_arg("delay", words.next())?)),
            Some("fade") => {
                let step = int_arg("fade", words.next())?;
                Ok(Command::Fade(step.min(255) as u8))
            }
            Some("pattern") => {
                let n = int_arg("pattern", words.next())?;
                Ok(Command::Pattern(n.min(255) as u8))
            }
            Some("avg") => Ok(Command::Avg),
            Some("rms") => Ok(Command::Rms),
            _ => Ok(Command::Text(trimmed.to_string())),
        }
    }
}

/// Values are taken as magnitudes: `delay -500` means 500, matching
/// consoles that shrug off a stray minus sign.
fn int_arg(command: &'static str, word: Option<&str>) -> Result<u64, CmdError> {
    let word = word.ok_or(CmdError::MissingValue { command })?;
    word.parse::<i64>()
        .map(|v| v.unsigned_abs())
        .map_err(|_| CmdError::BadValue {
            command,
            given: word.to_string(),
        })
}

// ============================================================================
// Console input source
// ============================================================================

pub struct Console {
    rx: Receiver<String>,
}

impl Console {
    /// Replays `script` one line at a time with a default typing pace.
    pub fn scripted(script: &[&str]) -> Self {
        Self::scripted_with_pace(script, Duration::from_millis(500))
    }

    pub fn scripted_with_pace(script: &[&str], pace: Duration) -> Self {
        let lines: Vec<String> = script.iter().map(|s| s.to_string()).collect();
        let (tx, rx) = unbounded();
        thread::spawn(move || {
            for line in lines {
                thread::sleep(pace);
                // Local echo, the way the serial monitor shows what
                // was typed.
                println!("{}", format!("> {line}").dimmed());
                if tx.send(clip(line)).is_err() {
                    break;
                }
            }
            // tx drops here; readers see end-of-input.
        });
        Self { rx }
    }

    /// Reads real lines from stdin until EOF.
    pub fn interactive() -> Self {
        let (tx, rx) = unbounded();
        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(clip(line)).is_err() {
                    break;
                }
            }
        });
        Self { rx }
    }

    /// Scripted by default; `--interactive` on the command line hands
    /// the console to the user instead.
    pub fn from_env(script: &[&str]) -> Self {
        if env::args().any(|a| a == "--interactive") {
            println!(
                "{}",
                "interactive console: type commands, Ctrl-D to end".dimmed()
            );
            Self::interactive()
        } else {
            Self::scripted(script)
        }
    }

    /// Next line, blocking. `None` once input is exhausted.
    pub fn read_line(&self) -> Option<String> {
        self.rx.recv().ok()
    }

    /// Next line if one is already waiting.
    pub fn try_read_line(&self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    pub fn read_line_timeout(&self, timeout: Duration) -> Option<String> {
        self.rx.recv_timeout(timeout).ok()
    }
}

fn clip(line: String) -> String {
    if line.len() <= CMD_MAX {
        line
    } else {
        line.chars().take(CMD_MAX).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delay() {
        assert_eq!("delay 500".parse(), Ok(Command::Delay(500)));
        assert_eq!("  delay   75  ".parse(), Ok(Command::Delay(75)));
    }

    #[test]
    fn test_parse_negative_takes_magnitude() {
        assert_eq!("delay -323".parse(), Ok(Command::Delay(323)));
        assert_eq!("fade -5".parse(), Ok(Command::Fade(5)));
    }

    #[test]
    fn test_parse_fade_and_pattern_clamp_to_u8() {
        assert_eq!("fade 5".parse(), Ok(Command::Fade(5)));
        assert_eq!("fade 999".parse(), Ok(Command::Fade(255)));
        assert_eq!("pattern 2".parse(), Ok(Command::Pattern(2)));
    }

    #[test]
    fn test_parse_report_commands() {
        assert_eq!("avg".parse(), Ok(Command::Avg));
        assert_eq!("rms".parse(), Ok(Command::Rms));
    }

    #[test]
    fn test_parse_missing_and_bad_values() {
        assert_eq!(
            "delay".parse::<Command>(),
            Err(CmdError::MissingValue { command: "delay" })
        );
        assert_eq!(
            "pattern x".parse::<Command>(),
            Err(CmdError::BadValue {
                command: "pattern",
                given: "x".to_string()
            })
        );
    }

    #[test]
    fn test_parse_everything_else_is_text() {
        assert_eq!(
            "hello world".parse(),
            Ok(Command::Text("hello world".to_string()))
        );
        // Case matters, like a real firmware parser.
        assert_eq!(
            "DELAY 100".parse(),
            Ok(Command::Text("DELAY 100".to_string()))
        );
        assert_eq!("".parse(), Ok(Command::Text(String::new())));
    }

    #[test]
    fn test_scripted_console_delivers_in_order_then_ends() {
        let console =
            Console::scripted_with_pace(&["delay 100", "done"], Duration::from_millis(1));
        assert_eq!(console.read_line().as_deref(), Some("delay 100"));
        assert_eq!(console.read_line().as_deref(), Some("done"));
        assert_eq!(console.read_line(), None);
    }

    #[test]
    fn test_long_lines_are_clipped() {
        let long = "x".repeat(CMD_MAX + 40);
        assert_eq!(clip(long).len(), CMD_MAX);
    }
}
