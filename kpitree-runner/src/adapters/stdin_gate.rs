//! Operator confirmation on the terminal.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use kpitree_core::collab::HumanGate;

/// Prompts on stdout and reads one line from the wrapped reader.
///
/// An empty line or `y`/`yes` confirms; end of input declines.
pub struct StdinGate<R = io::StdinLock<'static>> {
    input: Mutex<R>,
}

impl StdinGate {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(io::stdin().lock()),
        }
    }
}

impl Default for StdinGate {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: BufRead> StdinGate<R> {
    pub fn from_reader(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }
}

impl<R: BufRead> HumanGate for StdinGate<R> {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [Enter/y = yes, n = no]: ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        let read = match self.input.lock() {
            Ok(mut input) => input.read_line(&mut line),
            Err(_) => return false,
        };
        match read {
            Ok(0) | Err(_) => false,
            Ok(_) => is_affirmative(&line),
        }
    }
}

fn is_affirmative(line: &str) -> bool {
    matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "" | "y" | "yes"
    )
}
