//! Console output helpers
//!
//! Role-based coloring, disabled automatically when stdout is not a
//! terminal.

use crossterm::style::{Color, ResetColor, SetForegroundColor};
use is_terminal::IsTerminal;

const ACCENT: Color = Color::Cyan;
const HIGHLIGHT: Color = Color::Green;
const WARNING: Color = Color::Yellow;
const ERROR: Color = Color::Red;
const DIM: Color = Color::DarkGrey;

fn colors_enabled() -> bool {
    std::io::stdout().is_terminal()
}

fn colored(color: Color, text: &str) -> String {
    if colors_enabled() {
        format!("{}{}{}", SetForegroundColor(color), text, ResetColor)
    } else {
        text.to_string()
    }
}

/// Section banner, e.g. around a refresh pass.
pub fn banner(text: &str) {
    println!("================= {text} =================");
}

/// Prominent status line.
pub fn accent(text: &str) {
    println!("{}", colored(ACCENT, text));
}

/// Plain informational line.
pub fn note(text: &str) {
    println!("{text}");
}

/// Low-importance detail line (verbose logging).
pub fn detail(text: &str) {
    println!("{}", colored(DIM, text));
}

/// A step with a highlighted subject, e.g. `  Building <file>`.
pub fn step(prefix: &str, subject: &str) {
    println!("{}{}", prefix, colored(HIGHLIGHT, subject));
}

/// A watched path and what a change to it triggers.
pub fn route(path: &str, effect: &str) {
    println!("  {} {}", colored(HIGHLIGHT, path), effect);
}

pub fn warn(text: &str) {
    eprintln!("{}", colored(WARNING, text));
}

pub fn error(text: &str) {
    eprintln!("{}", colored(ERROR, text));
}
