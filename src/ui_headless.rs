//! Headless UI for tests and non-interactive environments.
//!
//! Collects all output in a buffer, feeds input from a pre-loaded
//! script, and keeps saves in memory.

use std::collections::VecDeque;

use crate::snapshot::Snapshot;
use crate::ui::{UiError, ZMachineUi};

#[derive(Default)]
pub struct HeadlessUi {
    output: String,
    input_script: VecDeque<String>,
    status: Vec<String>,
    saved: Option<Snapshot>,
    /// When set, the next save reports failure (for exercising the
    /// branch-on-failure paths).
    pub fail_saves: bool,
}

impl HeadlessUi {
    pub fn new() -> HeadlessUi {
        HeadlessUi::default()
    }

    /// Queue a line the next `read_line` will return.
    pub fn push_input(&mut self, line: impl Into<String>) {
        self.input_script.push_back(line.into());
    }

    /// Everything printed so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn status_lines(&self) -> &[String] {
        &self.status
    }

    pub fn saved_snapshot(&self) -> Option<&Snapshot> {
        self.saved.as_ref()
    }
}

impl ZMachineUi for HeadlessUi {
    fn print_string(&mut self, s: &str) -> Result<(), UiError> {
        self.output.push_str(s);
        Ok(())
    }

    fn print_char(&mut self, c: char) -> Result<(), UiError> {
        self.output.push(c);
        Ok(())
    }

    fn read_line(&mut self, max_len: usize) -> Result<Option<(String, u8)>, UiError> {
        match self.input_script.pop_front() {
            Some(mut line) => {
                line.truncate(max_len);
                Ok(Some((line, 13)))
            }
            None => Ok(None),
        }
    }

    fn show_status(&mut self, location: &str, score: i16, turns: u16) -> Result<(), UiError> {
        self.status.push(format!("{location} {score}/{turns}"));
        Ok(())
    }

    fn save(&mut self, snapshot: &Snapshot) -> bool {
        if self.fail_saves {
            return false;
        }
        self.saved = Some(snapshot.clone());
        true
    }

    fn restore(&mut self) -> Option<Snapshot> {
        self.saved.clone()
    }
}
