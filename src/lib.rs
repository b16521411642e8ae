#![crate_name = "gruecore"]

//! The Z-Machine core: processor, text subsystem, object tree, memory
//! image and snapshots. The screen/terminal layer lives behind the
//! `ZMachineUi` trait; `HeadlessUi` drives tests and `StdioUi` the CLI.

#[macro_use]
extern crate lazy_static;

pub mod dictionary;
pub mod error;
pub mod header;
pub mod memory;
pub mod opcode_tables;
pub mod opcodes_display;
pub mod opcodes_flow;
pub mod opcodes_math;
pub mod opcodes_memory;
pub mod opcodes_object;
pub mod processor;
pub mod snapshot;
pub mod text;
pub mod ui;
pub mod ui_headless;
pub mod ui_stdio;
pub mod version;
pub mod zobject;
pub mod zrand;
pub mod zstack;

#[cfg(test)]
mod test_utils;
