//! User-facing console output. Diagnostics go through `tracing` instead.

use crate::utils::colors::{BLUE, GREEN, RED, RESET, YELLOW};
use std::fmt;

const BOLD: &str = "\x1b[1m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    fn icon(self) -> &'static str {
        match self {
            Level::Info => "ℹ️",
            Level::Success => "✅",
            Level::Warning => "⚠️",
            Level::Error => "❌",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Level::Info => BLUE,
            Level::Success => GREEN,
            Level::Warning => YELLOW,
            Level::Error => RED,
        }
    }
}

fn line(level: Level, msg: impl fmt::Display) -> String {
    format!("{}{}{}{} {}", level.color(), BOLD, level.icon(), RESET, msg)
}

pub fn info<T: fmt::Display>(msg: T) {
    println!("{}", line(Level::Info, msg));
}

pub fn success<T: fmt::Display>(msg: T) {
    println!("{}", line(Level::Success, msg));
}

pub fn warning<T: fmt::Display>(msg: T) {
    println!("{}", line(Level::Warning, msg));
}

/// Errors go to stderr.
pub fn error<T: fmt::Display>(msg: T) {
    eprintln!("{}", line(Level::Error, msg));
}

pub fn header<T: fmt::Display>(msg: T) {
    println!("{BLUE}{BOLD}== {msg} =={RESET}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_icon_and_message() {
        let l = line(Level::Warning, "careful");
        assert!(l.contains("⚠️"));
        assert!(l.ends_with("careful"));
    }
}
