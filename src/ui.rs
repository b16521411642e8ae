//! The boundary between the VM core and whatever renders it.
//!
//! Opcodes never touch a terminal directly; the print family, `sread`
//! and the window opcodes call through this trait. Implementations own
//! durable save persistence too — the core only hands them an in-memory
//! snapshot and takes one back.

use std::fmt;

use crate::error::VmFailure;
use crate::snapshot::Snapshot;

/// Error raised by a UI implementation. Propagates into the VM as a
/// `VmFailure` and aborts the current `execute()`.
#[derive(Debug, Clone)]
pub struct UiError {
    pub message: String,
}

impl UiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for UiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UI error: {}", self.message)
    }
}

impl std::error::Error for UiError {}

impl From<std::io::Error> for UiError {
    fn from(error: std::io::Error) -> Self {
        Self::new(format!("I/O error: {error}"))
    }
}

impl From<UiError> for VmFailure {
    fn from(error: UiError) -> VmFailure {
        VmFailure::UiFailure {
            message: error.message,
        }
    }
}

/// Capability set the opcodes rely on.
///
/// Units for cursor positions and widths are UI-defined but must stay
/// stable for a session. `read_line` returning `None` signals end of
/// input; the VM treats it as a request to quit, not as an error.
pub trait ZMachineUi {
    fn print_string(&mut self, s: &str) -> Result<(), UiError>;

    fn print_char(&mut self, c: char) -> Result<(), UiError>;

    /// Read one input line of at most `max_len` characters. Returns the
    /// line and the terminating character (13 for return), or `None` at
    /// end of input.
    fn read_line(&mut self, max_len: usize) -> Result<Option<(String, u8)>, UiError>;

    fn set_cursor(&mut self, _x: u16, _y: u16) -> Result<(), UiError> {
        Ok(())
    }

    fn set_window(&mut self, _window: u16) -> Result<(), UiError> {
        Ok(())
    }

    fn erase_window(&mut self, _window: i16) -> Result<(), UiError> {
        Ok(())
    }

    fn scroll_region(&mut self, _x: u16, _y: u16, _w: u16, _h: u16) -> Result<(), UiError> {
        Ok(())
    }

    /// Rendered width of `s` in UI units.
    fn string_width(&self, s: &str) -> u16 {
        s.chars().count() as u16
    }

    /// V3 status line: current location, score and turn count.
    fn show_status(&mut self, location: &str, score: i16, turns: u16) -> Result<(), UiError>;

    /// Persist a snapshot somewhere durable. True on success.
    fn save(&mut self, snapshot: &Snapshot) -> bool;

    /// Bring back a previously saved snapshot, if there is one.
    fn restore(&mut self) -> Option<Snapshot>;

    /// (rows, columns) reported to the story through the header.
    fn screen_size(&self) -> (u16, u16) {
        (24, 80)
    }
}
