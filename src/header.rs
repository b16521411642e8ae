use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use crate::error::VmFailure;
use crate::memory::MemoryBuffer;

/// Header byte offsets consumed by the core.
pub mod offsets {
    pub const VERSION: usize = 0x00;
    pub const FLAGS1: usize = 0x01;
    pub const RELEASE: usize = 0x02;
    pub const HIGH_MEM: usize = 0x04;
    pub const INITIAL_PC: usize = 0x06;
    pub const DICTIONARY: usize = 0x08;
    pub const OBJECT_TABLE: usize = 0x0A;
    pub const GLOBALS: usize = 0x0C;
    pub const STATIC_MEM: usize = 0x0E;
    pub const FLAGS2: usize = 0x10;
    pub const SERIAL: usize = 0x12;
    pub const ABBREVIATIONS: usize = 0x18;
    pub const FILE_LENGTH: usize = 0x1A;
    pub const CHECKSUM: usize = 0x1C;
    pub const INTERPRETER: usize = 0x1E;
    pub const SCREEN_ROWS: usize = 0x20;
    pub const SCREEN_COLS: usize = 0x21;
    pub const ROUTINE_OFFSET: usize = 0x28;
    pub const STRING_OFFSET: usize = 0x2A;
    pub const STANDARD_MAJOR: usize = 0x32;
    pub const STANDARD_MINOR: usize = 0x33;
    pub const ALPHABET_TABLE: usize = 0x34;
    pub const EXTENSION_TABLE: usize = 0x36;
}

/// The first 64 bytes of the image. Read-only to the story; the
/// interpreter itself patches a few fields during reset.
pub const HEADER_SIZE: usize = 64;

/// Parsed view of the story header.
pub struct Header {
    pub version: u8,
    pub release: u16,
    pub serial: String,
    pub base_high_mem: usize,
    pub base_static_mem: usize,
    pub initial_pc: usize,
    pub abbrev_table: usize,
    pub dictionary: usize,
    pub object_table: usize,
    pub global_variables: usize,
    pub alphabet_table: usize,
    pub extension_table: usize,
    pub len_file: usize,
    pub checksum_file: u16,
}

impl Header {
    pub fn new(memory: &MemoryBuffer) -> Result<Header, VmFailure> {
        if memory.len() < HEADER_SIZE {
            return Err(VmFailure::HeaderViolation(
                "story file too small for header".to_string(),
            ));
        }
        let version = memory.get_byte(offsets::VERSION)?;
        let mut serial = String::new();
        for pos in offsets::SERIAL..offsets::SERIAL + 6 {
            serial.push(memory.get_byte(pos)? as char);
        }
        // The file-length word is scaled by version, same factor as packed
        // addresses (2/4/8).
        let length_scale = match version {
            1..=3 => 2,
            4..=5 => 4,
            _ => 8,
        };
        Ok(Header {
            version,
            release: memory.get_u16(offsets::RELEASE)?,
            serial,
            base_high_mem: memory.get_u16(offsets::HIGH_MEM)? as usize,
            base_static_mem: memory.get_u16(offsets::STATIC_MEM)? as usize,
            initial_pc: memory.get_u16(offsets::INITIAL_PC)? as usize,
            abbrev_table: memory.get_u16(offsets::ABBREVIATIONS)? as usize,
            dictionary: memory.get_u16(offsets::DICTIONARY)? as usize,
            object_table: memory.get_u16(offsets::OBJECT_TABLE)? as usize,
            global_variables: memory.get_u16(offsets::GLOBALS)? as usize,
            alphabet_table: memory.get_u16(offsets::ALPHABET_TABLE)? as usize,
            extension_table: memory.get_u16(offsets::EXTENSION_TABLE)? as usize,
            len_file: memory.get_u16(offsets::FILE_LENGTH)? as usize * length_scale,
            checksum_file: memory.get_u16(offsets::CHECKSUM)?,
        })
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Release number:           {}
Serial number:            {}
Start PC:                 {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Size of dynamic memory:   {:#06x}
Size of resident memory:  {:#06x}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version,
            self.release,
            self.serial,
            self.initial_pc,
            self.dictionary,
            self.object_table,
            self.global_variables,
            self.base_static_mem,
            self.base_high_mem,
            self.abbrev_table,
            self.len_file,
            self.checksum_file,
        )
    }
}
