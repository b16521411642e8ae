use crate::error::VmFailure;
use crate::header::offsets;
use crate::memory::MemoryBuffer;

/// Kinds of packed address; V6-7 apply different offsets to each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedKind {
    Routine,
    ZString,
}

/// Everything the core varies on by story version, folded into one
/// descriptor so the processor and tables stay free of scattered
/// version checks.
#[derive(Debug, Clone, Copy)]
pub struct VersionSpec {
    pub number: u8,
    /// Maximum legal story file size in bytes.
    pub max_story_size: usize,
    /// Packed address multiplier (2, 4 or 8).
    pub packed_multiplier: usize,
    /// V6-7 routine/string offsets (in 8-byte units) from the header.
    routine_offset: usize,
    string_offset: usize,
    /// Object records are 14 bytes with u16 pointers from V4 up.
    pub large_objects: bool,
    pub attribute_count: u16,
    pub max_properties: u8,
    pub object_entry_size: usize,
    /// V1-4 routines carry initial values for their locals.
    pub initialises_locals: bool,
    /// Encoded dictionary words: 4 bytes (6 z-chars) or 6 bytes (9 z-chars).
    pub dictionary_word_bytes: usize,
    /// 0 in V1, 32 in V2, 96 from V3 up.
    pub abbreviation_count: usize,
}

impl VersionSpec {
    pub fn new(memory: &MemoryBuffer) -> Result<VersionSpec, VmFailure> {
        let number = memory.get_byte(offsets::VERSION)?;
        let max_story_size = match number {
            1..=3 => 128 * 1024,
            4..=5 => 256 * 1024,
            6 | 7 => 576 * 1024,
            8 => 512 * 1024,
            _ => {
                return Err(VmFailure::HeaderViolation(format!(
                    "unsupported story version {number}"
                )))
            }
        };
        if memory.len() > max_story_size {
            return Err(VmFailure::HeaderViolation(format!(
                "story of {} bytes exceeds the V{} limit",
                memory.len(),
                number
            )));
        }
        let packed_multiplier = match number {
            1..=3 => 2,
            4..=7 => 4,
            8 => 8,
            _ => unreachable!(),
        };
        let (routine_offset, string_offset) = if (6..=7).contains(&number) {
            (
                memory.get_u16(offsets::ROUTINE_OFFSET)? as usize,
                memory.get_u16(offsets::STRING_OFFSET)? as usize,
            )
        } else {
            (0, 0)
        };
        let large_objects = number >= 4;
        Ok(VersionSpec {
            number,
            max_story_size,
            packed_multiplier,
            routine_offset,
            string_offset,
            large_objects,
            attribute_count: if large_objects { 48 } else { 32 },
            max_properties: if large_objects { 63 } else { 31 },
            object_entry_size: if large_objects { 14 } else { 9 },
            initialises_locals: number <= 4,
            dictionary_word_bytes: if number <= 3 { 4 } else { 6 },
            abbreviation_count: match number {
                1 => 0,
                2 => 32,
                _ => 96,
            },
        })
    }

    /// Expand a packed routine or string address to a byte address.
    pub fn unpack(&self, packed: u16, kind: PackedKind) -> usize {
        let base = packed as usize * self.packed_multiplier;
        if (6..=7).contains(&self.number) {
            let offset = match kind {
                PackedKind::Routine => self.routine_offset,
                PackedKind::ZString => self.string_offset,
            };
            base + 8 * offset
        } else {
            base
        }
    }
}
