//! Plain stdin/stdout UI for the command-line binary.
//!
//! No windowing, no cursor control: status lines and window requests
//! degrade to ordinary output or no-ops. Good enough to play V3 games in
//! a pipe or a dumb terminal.

use std::io::{self, BufRead, Write};

use crate::snapshot::Snapshot;
use crate::ui::{UiError, ZMachineUi};

#[derive(Default)]
pub struct StdioUi;

impl StdioUi {
    pub fn new() -> StdioUi {
        StdioUi
    }
}

impl ZMachineUi for StdioUi {
    fn print_string(&mut self, s: &str) -> Result<(), UiError> {
        print!("{s}");
        io::stdout().flush()?;
        Ok(())
    }

    fn print_char(&mut self, c: char) -> Result<(), UiError> {
        print!("{c}");
        io::stdout().flush()?;
        Ok(())
    }

    fn read_line(&mut self, max_len: usize) -> Result<Option<(String, u8)>, UiError> {
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        let mut line = line.trim_end_matches(['\n', '\r']).to_string();
        line.truncate(max_len);
        Ok(Some((line, 13)))
    }

    fn show_status(&mut self, location: &str, score: i16, turns: u16) -> Result<(), UiError> {
        println!("[{location}  score: {score}  turns: {turns}]");
        Ok(())
    }

    fn save(&mut self, _snapshot: &Snapshot) -> bool {
        // Durable persistence is not wired up for the plain CLI.
        false
    }

    fn restore(&mut self) -> Option<Snapshot> {
        None
    }
}
