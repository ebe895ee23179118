//! Confirmation gate between reconciliation and deletion

use super::GcSummary;

use parking_lot::Mutex;
use std::io::{self, BufRead, Write};

/// Decides whether a cycle may delete. Called at most once per cycle and
/// only when there is garbage; may block.
pub trait Confirm: Send + Sync {
    fn confirm(&self, summary: &GcSummary) -> bool;
}

/// Proceeds without asking (`--yes`)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&self, _summary: &GcSummary) -> bool {
        true
    }
}

/// Never deletes; a dry run
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDeny;

impl Confirm for AlwaysDeny {
    fn confirm(&self, _summary: &GcSummary) -> bool {
        false
    }
}

/// Prints the summary and waits for the user.
///
/// An empty line, `y` or `yes` proceeds. Anything else, end of input or a
/// read error aborts.
pub struct PromptConfirm {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl PromptConfirm {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Prompt on stdout, read from stdin
    pub fn stdio() -> Self {
        Self::new(Box::new(io::BufReader::new(io::stdin())), Box::new(io::stdout()))
    }

    fn prompt(&self, summary: &GcSummary) -> io::Result<bool> {
        {
            let mut output = self.output.lock();
            writeln!(output, "{}", summary)?;
            write!(output, "Press ENTER to proceed, or type 'n' to abort: ")?;
            output.flush()?;
        }

        let mut line = String::new();
        if self.input.lock().read_line(&mut line)? == 0 {
            return Ok(false);
        }
        let answer = line.trim().to_ascii_lowercase();
        Ok(matches!(answer.as_str(), "" | "y" | "yes"))
    }
}

impl Confirm for PromptConfirm {
    fn confirm(&self, summary: &GcSummary) -> bool {
        match self.prompt(summary) {
            Ok(proceed) => proceed,
            Err(e) => {
                tracing::warn!("Could not read confirmation: {}", e);
                false
            }
        }
    }
}
