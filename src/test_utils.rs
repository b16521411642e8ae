//! Builder for minimal in-memory story images used across the test
//! suites. Two fixtures share one memory map: a V3 image with small
//! 9-byte object records, and a V5 image with large 14-byte records
//! and a two-byte property size prefix.

use crate::header::offsets;
use crate::memory::MemoryBuffer;

/// Where the fixtures put things.
pub const GLOBALS_ADDR: usize = 0x0040;
pub const OBJECT_TABLE_ADDR: usize = 0x0220;
pub const OBJECT_RECORDS_ADDR: usize = 0x025E;
pub const LARGE_OBJECT_RECORDS_ADDR: usize = 0x029E;
pub const TEXT_BUFFER_ADDR: usize = 0x0300;
pub const PARSE_BUFFER_ADDR: usize = 0x0340;
pub const DICTIONARY_ADDR: usize = 0x0400;
pub const STATIC_BASE: usize = 0x0400;
pub const START_PC: usize = 0x0500;
pub const IMAGE_LEN: usize = 0x8000;

pub struct TestStory {
    bytes: Vec<u8>,
    version: u8,
}

impl TestStory {
    /// Header, zeroed globals and the two-word dictionary ("go",
    /// "north", ',' as separator) shared by both fixtures.
    fn base(version: u8) -> TestStory {
        let mut bytes = vec![0u8; IMAGE_LEN];

        bytes[offsets::VERSION] = version;
        bytes[offsets::RELEASE + 1] = 1;
        put_word(&mut bytes, offsets::HIGH_MEM, START_PC as u16);
        put_word(&mut bytes, offsets::INITIAL_PC, START_PC as u16);
        put_word(&mut bytes, offsets::DICTIONARY, DICTIONARY_ADDR as u16);
        put_word(&mut bytes, offsets::OBJECT_TABLE, OBJECT_TABLE_ADDR as u16);
        put_word(&mut bytes, offsets::GLOBALS, GLOBALS_ADDR as u16);
        put_word(&mut bytes, offsets::STATIC_MEM, STATIC_BASE as u16);
        put_word(&mut bytes, offsets::FILE_LENGTH, (IMAGE_LEN / 2) as u16);
        for (i, b) in b"850101".iter().enumerate() {
            bytes[offsets::SERIAL + i] = *b;
        }

        // Property defaults: property 5 defaults to 0x1111 (the table
        // spans 31 or 63 words depending on the fixture; index 4 is
        // within both).
        put_word(&mut bytes, OBJECT_TABLE_ADDR + 4 * 2, 0x1111);

        // Dictionary: 1 separator ',', 2 sorted entries of 7 bytes.
        let dict = [
            0x01, b',', 0x00, 0x02, 0x07, //
            0x32, 0x85, 0x94, 0xA5, 0x00, 0x00, 0x00, // "go"
            0x4E, 0x97, 0xE5, 0xA5, 0x00, 0x00, 0x00, // "north"
        ];
        bytes[DICTIONARY_ADDR..DICTIONARY_ADDR + dict.len()].copy_from_slice(&dict);

        TestStory { bytes, version }
    }

    /// A V3 story with objects `1 -> [2, 3]` and a detached `4`; object 1
    /// is named "box" and carries property 17 (word 0xBEEF) and property
    /// 4 (byte 0x42).
    pub fn v3() -> TestStory {
        let mut story = TestStory::base(3);

        // Object records, 9 bytes each: attrs x4, parent, sibling,
        // child, property table word.
        let objects = [
            // (parent, sibling, child, prop table)
            (0u8, 0u8, 2u8, 0x0290u16),
            (1, 3, 0, 0x02C0),
            (1, 0, 0, 0x02D0),
            (0, 0, 0, 0x02E0),
        ];
        for (i, (parent, sibling, child, props)) in objects.iter().enumerate() {
            let at = OBJECT_RECORDS_ADDR + i * 9;
            story.bytes[at + 4] = *parent;
            story.bytes[at + 5] = *sibling;
            story.bytes[at + 6] = *child;
            put_word(&mut story.bytes, at + 7, *props);
        }

        // Object 1 property table: name "box", then properties 17 and 4
        // in descending order, then the terminator.
        let props = [
            0x02, 0x1E, 0x9D, 0x94, 0xA5, // name: 2 words, "box"
            0x31, 0xBE, 0xEF, // property 17, length 2
            0x04, 0x42, // property 4, length 1
            0x00,
        ];
        story.write(0x290, &props);
        // Empty property tables for the other objects.
        for addr in [0x2C0, 0x2D0, 0x2E0] {
            story.write(addr, &[0x00, 0x00]);
        }
        story
    }

    /// A V5 story with the same tree shape in the large format: 14-byte
    /// records, u16 pointers, 48 attribute bits, and a 63-word defaults
    /// table. Object 1 is named "box" and carries property 17 (4 bytes,
    /// two-byte size prefix), property 4 (word 0xBEEF) and property 3
    /// (byte 0x42).
    pub fn v5() -> TestStory {
        let mut story = TestStory::base(5);

        let objects = [
            // (parent, sibling, child, prop table)
            (0u16, 0u16, 2u16, 0x02E0u16),
            (1, 3, 0, 0x0310),
            (1, 0, 0, 0x0318),
            (0, 0, 0, 0x0320),
        ];
        for (i, (parent, sibling, child, props)) in objects.iter().enumerate() {
            let at = LARGE_OBJECT_RECORDS_ADDR + i * 14;
            put_word(&mut story.bytes, at + 6, *parent);
            put_word(&mut story.bytes, at + 8, *sibling);
            put_word(&mut story.bytes, at + 10, *child);
            put_word(&mut story.bytes, at + 12, *props);
        }

        // The second byte of a two-byte prefix carries the top bit,
        // as compiled story files emit it.
        let props = [
            0x02, 0x1E, 0x9D, 0x94, 0xA5, // name: 2 words, "box"
            0x91, 0x84, 0xDE, 0xAD, 0xBE, 0xEF, // property 17, length 4
            0x44, 0xBE, 0xEF, // property 4, length 2
            0x03, 0x42, // property 3, length 1
            0x00,
        ];
        story.write(0x2E0, &props);
        for addr in [0x310, 0x318, 0x320] {
            story.write(addr, &[0x00, 0x00]);
        }
        story
    }

    /// Place a program at the initial PC.
    pub fn code(mut self, program: &[u8]) -> TestStory {
        self.write(START_PC, program);
        self
    }

    pub fn write(&mut self, addr: usize, data: &[u8]) {
        self.bytes[addr..addr + data.len()].copy_from_slice(data);
    }

    pub fn write_word(&mut self, addr: usize, value: u16) {
        put_word(&mut self.bytes, addr, value);
    }

    /// Recompute the header checksum over bytes 0x40 to the end.
    pub fn finalise_checksum(&mut self) {
        let mut sum = 0u16;
        for &b in &self.bytes[0x40..] {
            sum = sum.wrapping_add(b as u16);
        }
        put_word(&mut self.bytes, offsets::CHECKSUM, sum);
    }

    pub fn object_addr(&self, object: u16) -> usize {
        if self.version >= 4 {
            LARGE_OBJECT_RECORDS_ADDR + (object as usize - 1) * 14
        } else {
            OBJECT_RECORDS_ADDR + (object as usize - 1) * 9
        }
    }

    pub fn into_memory(self) -> MemoryBuffer {
        MemoryBuffer::new(self.bytes)
    }
}

fn put_word(bytes: &mut [u8], addr: usize, value: u16) {
    bytes[addr] = (value >> 8) as u8;
    bytes[addr + 1] = (value & 0xFF) as u8;
}
