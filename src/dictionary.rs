use log::debug;

use crate::error::VmFailure;
use crate::memory::MemoryBuffer;
use crate::text::TextCodec;
use crate::version::VersionSpec;

/// A parsed dictionary header.
///
/// Layout at the dictionary address: a separator count, that many
/// separator bytes, a signed entry count (negative means the entries are
/// not sorted), an entry-size byte, then the entries themselves. Each
/// entry starts with 4 (V1-3) or 6 (V4+) bytes of encoded Z-characters.
pub struct Dictionary {
    separators: Vec<u8>,
    entry_count: i16,
    entry_size: usize,
    entries_addr: usize,
    word_bytes: usize,
}

impl Dictionary {
    pub fn new(
        memory: &MemoryBuffer,
        addr: usize,
        version: VersionSpec,
    ) -> Result<Dictionary, VmFailure> {
        let sep_count = memory.get_byte(addr)? as usize;
        let mut separators = Vec::with_capacity(sep_count);
        for i in 0..sep_count {
            separators.push(memory.get_byte(addr + 1 + i)?);
        }
        let entry_count = memory.get_u16(addr + 1 + sep_count)? as i16;
        let entry_size = memory.get_byte(addr + 3 + sep_count)? as usize;
        let entries_addr = addr + 4 + sep_count;
        if entry_size < version.dictionary_word_bytes {
            return Err(VmFailure::HeaderViolation(format!(
                "dictionary entry size {} below encoded word width",
                entry_size
            )));
        }
        debug!(
            "dictionary at {:#06x}: {} entries of {} bytes, {} separators",
            addr,
            entry_count,
            entry_size,
            separators.len()
        );
        Ok(Dictionary {
            separators,
            entry_count,
            entry_size,
            entries_addr,
            word_bytes: version.dictionary_word_bytes,
        })
    }

    pub fn separators(&self) -> &[u8] {
        &self.separators
    }

    /// Look up an encoded word. Binary search when the stored entry count
    /// is positive (sorted), linear otherwise. Comparison covers the full
    /// packed integer: 32 bits in V1-3, 48 bits in V4+.
    pub fn lookup(&self, memory: &MemoryBuffer, encoded: &[u16]) -> Result<usize, VmFailure> {
        let needle = pack_words(encoded);
        if self.entry_count >= 0 {
            let mut low = 0i32;
            let mut high = self.entry_count as i32 - 1;
            while low <= high {
                let mid = (low + high) / 2;
                let addr = self.entries_addr + mid as usize * self.entry_size;
                let key = self.entry_key(memory, addr)?;
                match needle.cmp(&key) {
                    std::cmp::Ordering::Less => high = mid - 1,
                    std::cmp::Ordering::Greater => low = mid + 1,
                    std::cmp::Ordering::Equal => return Ok(addr),
                }
            }
        } else {
            for index in 0..(-(self.entry_count as i32)) as usize {
                let addr = self.entries_addr + index * self.entry_size;
                if self.entry_key(memory, addr)? == needle {
                    return Ok(addr);
                }
            }
        }
        Ok(0)
    }

    fn entry_key(&self, memory: &MemoryBuffer, addr: usize) -> Result<u64, VmFailure> {
        let mut words = Vec::with_capacity(self.word_bytes / 2);
        for i in 0..self.word_bytes / 2 {
            words.push(memory.get_u16(addr + i * 2)?);
        }
        Ok(pack_words(&words))
    }
}

fn pack_words(words: &[u16]) -> u64 {
    let mut packed = 0u64;
    for w in words {
        packed = packed << 16 | *w as u64;
    }
    packed
}

/// One token recognised while splitting user input.
struct RawToken {
    start: usize,
    len: usize,
}

/// Split `text` at spaces and at the dictionary separators. Separators
/// are tokens in their own right; spaces are discarded.
fn split_tokens(text: &[u8], separators: &[u8]) -> Vec<RawToken> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;
    for (pos, &byte) in text.iter().enumerate() {
        if byte == b' ' || separators.contains(&byte) {
            if let Some(start) = word_start.take() {
                tokens.push(RawToken {
                    start,
                    len: pos - start,
                });
            }
            if byte != b' ' {
                tokens.push(RawToken { start: pos, len: 1 });
            }
        } else if word_start.is_none() {
            word_start = Some(pos);
        }
    }
    if let Some(start) = word_start {
        tokens.push(RawToken {
            start,
            len: text.len() - start,
        });
    }
    tokens
}

/// Tokenise user text against a dictionary, filling the parse buffer.
///
/// `text` is the typed line as ZSCII bytes and `text_base` the offset of
/// its first byte within the text buffer, so stored word positions are
/// buffer-relative. The parse buffer holds its capacity at byte 0; the
/// token count lands in byte 1, then one 4-byte record per token:
/// entry address, length, position.
pub fn tokenise(
    memory: &mut MemoryBuffer,
    codec: &TextCodec,
    dict: &Dictionary,
    text: &[u8],
    text_base: u8,
    parse_buffer: usize,
    ignore_unknown: bool,
) -> Result<(), VmFailure> {
    let max_tokens = memory.get_byte(parse_buffer)? as usize;
    let tokens = split_tokens(text, dict.separators());
    let stored = tokens.len().min(max_tokens);

    for (index, token) in tokens.iter().take(stored).enumerate() {
        let word = &text[token.start..token.start + token.len];
        let encoded = codec.encode_zscii_word(word);
        let entry = dict.lookup(memory, &encoded)?;
        let record = parse_buffer + 2 + index * 4;
        if entry == 0 {
            if ignore_unknown {
                debug!("leaving unknown word {:?} untouched", word);
                continue;
            }
            // A miss zeroes the whole 4-byte record.
            memory.set_u16(record, 0)?;
            memory.set_byte(record + 2, 0)?;
            memory.set_byte(record + 3, 0)?;
            continue;
        }
        memory.set_u16(record, entry as u16)?;
        memory.set_byte(record + 2, token.len as u8)?;
        memory.set_byte(record + 3, text_base.wrapping_add(token.start as u8))?;
    }

    memory.set_byte(parse_buffer + 1, stored as u8)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionSpec;

    /// Build a V3 image containing a sorted dictionary with the given
    /// words at 0x300 and open dynamic memory for the parse buffer.
    fn dict_image(words: &[&str]) -> (MemoryBuffer, TextCodec, Dictionary) {
        let mut bytes = vec![0u8; 0x800];
        bytes[0] = 3;
        let dict_addr = 0x300;
        bytes[dict_addr] = 1; // one separator
        bytes[dict_addr + 1] = b',';
        bytes[dict_addr + 2] = 0;
        bytes[dict_addr + 3] = words.len() as u8;
        bytes[dict_addr + 4] = 7; // entry size: 4 encoded + 3 data bytes

        let memory = MemoryBuffer::new(bytes);
        let version = VersionSpec::new(&memory).unwrap();
        let codec = TextCodec::new(&memory, version).unwrap();

        let mut encoded: Vec<Vec<u16>> = words
            .iter()
            .map(|w| codec.encode_zscii_word(w.as_bytes()))
            .collect();
        encoded.sort_by_key(|e| pack_words(e));

        let mut bytes = memory.raw().to_vec();
        for (i, words) in encoded.iter().enumerate() {
            let addr = dict_addr + 5 + i * 7;
            for (j, w) in words.iter().enumerate() {
                bytes[addr + j * 2] = (w >> 8) as u8;
                bytes[addr + j * 2 + 1] = (w & 0xFF) as u8;
            }
        }
        let memory = MemoryBuffer::new(bytes);
        let dict = Dictionary::new(&memory, dict_addr, version).unwrap();
        (memory, codec, dict)
    }

    #[test]
    fn test_lookup_sorted() {
        let (memory, codec, dict) = dict_image(&["go", "north", "south", "take"]);
        let hit = dict
            .lookup(&memory, &codec.encode_zscii_word(b"north"))
            .unwrap();
        assert_ne!(hit, 0);
        let miss = dict
            .lookup(&memory, &codec.encode_zscii_word(b"west"))
            .unwrap();
        assert_eq!(miss, 0);
    }

    #[test]
    fn test_tokenise_two_words() {
        let (mut memory, codec, dict) = dict_image(&["go", "north"]);
        let parse = 0x100;
        let mut raw = memory.raw().to_vec();
        raw[parse] = 10; // capacity
        memory = MemoryBuffer::new(raw);

        tokenise(&mut memory, &codec, &dict, b"go north", 0, parse, false).unwrap();

        assert_eq!(memory.get_byte(parse + 1).unwrap(), 2);
        let first = memory.get_u16(parse + 2).unwrap();
        let second = memory.get_u16(parse + 6).unwrap();
        assert_ne!(first, 0);
        assert_ne!(second, 0);
        assert_ne!(first, second);
        // Lengths 2 and 5, text offsets 0 and 3.
        assert_eq!(memory.get_byte(parse + 4).unwrap(), 2);
        assert_eq!(memory.get_byte(parse + 5).unwrap(), 0);
        assert_eq!(memory.get_byte(parse + 8).unwrap(), 5);
        assert_eq!(memory.get_byte(parse + 9).unwrap(), 3);
    }

    #[test]
    fn test_tokenise_separator_is_its_own_token() {
        let (mut memory, codec, dict) = dict_image(&["go", "north", ","]);
        let parse = 0x100;
        let mut raw = memory.raw().to_vec();
        raw[parse] = 10;
        memory = MemoryBuffer::new(raw);

        tokenise(&mut memory, &codec, &dict, b"go,north", 0, parse, false).unwrap();

        assert_eq!(memory.get_byte(parse + 1).unwrap(), 3);
        // The comma is a 1-byte token at position 2 with its own entry.
        assert_ne!(memory.get_u16(parse + 6).unwrap(), 0);
        assert_eq!(memory.get_byte(parse + 8).unwrap(), 1);
        assert_eq!(memory.get_byte(parse + 9).unwrap(), 2);
        // "north" follows at position 3.
        assert_eq!(memory.get_byte(parse + 12).unwrap(), 5);
        assert_eq!(memory.get_byte(parse + 13).unwrap(), 3);
    }

    #[test]
    fn test_tokenise_unknown_word_zeroed_or_kept() {
        let (mut memory, codec, dict) = dict_image(&["go"]);
        let parse = 0x100;
        let mut raw = memory.raw().to_vec();
        raw[parse] = 10;
        // Pre-seed the second record to observe both behaviours.
        raw[parse + 6] = 0xAA;
        raw[parse + 8] = 0xBB;
        raw[parse + 9] = 0xCC;
        memory = MemoryBuffer::new(raw);

        tokenise(&mut memory, &codec, &dict, b"go west", 0, parse, true).unwrap();
        assert_eq!(memory.get_byte(parse + 6).unwrap(), 0xAA);
        assert_eq!(memory.get_byte(parse + 8).unwrap(), 0xBB);
        assert_eq!(memory.get_byte(parse + 9).unwrap(), 0xCC);

        tokenise(&mut memory, &codec, &dict, b"go west", 0, parse, false).unwrap();
        // A miss zeroes the whole 4-byte record.
        assert_eq!(memory.get_u16(parse + 6).unwrap(), 0);
        assert_eq!(memory.get_byte(parse + 8).unwrap(), 0);
        assert_eq!(memory.get_byte(parse + 9).unwrap(), 0);
    }

    #[test]
    fn test_tokenise_respects_capacity() {
        let (mut memory, codec, dict) = dict_image(&["go"]);
        let parse = 0x100;
        let mut raw = memory.raw().to_vec();
        raw[parse] = 1;
        memory = MemoryBuffer::new(raw);

        tokenise(&mut memory, &codec, &dict, b"go go go", 0, parse, false).unwrap();
        assert_eq!(memory.get_byte(parse + 1).unwrap(), 1);
    }

    #[test]
    fn test_unsorted_dictionary_uses_linear_scan() {
        // Entry count stored negative: entries deliberately unsorted.
        let mut bytes = vec![0u8; 0x800];
        bytes[0] = 3;
        let dict_addr = 0x300;
        bytes[dict_addr] = 0;
        let neg = (-2i16) as u16;
        bytes[dict_addr + 1] = (neg >> 8) as u8;
        bytes[dict_addr + 2] = (neg & 0xFF) as u8;
        bytes[dict_addr + 3] = 4;

        let memory = MemoryBuffer::new(bytes);
        let version = VersionSpec::new(&memory).unwrap();
        let codec = TextCodec::new(&memory, version).unwrap();
        let zebra = codec.encode_zscii_word(b"zebra");
        let apple = codec.encode_zscii_word(b"apple");

        let mut raw = memory.raw().to_vec();
        for (i, enc) in [&zebra, &apple].iter().enumerate() {
            let addr = dict_addr + 4 + i * 4;
            for (j, w) in enc.iter().enumerate() {
                raw[addr + j * 2] = (w >> 8) as u8;
                raw[addr + j * 2 + 1] = (w & 0xFF) as u8;
            }
        }
        let memory = MemoryBuffer::new(raw);
        let dict = Dictionary::new(&memory, dict_addr, version).unwrap();

        assert_eq!(dict.lookup(&memory, &apple).unwrap(), dict_addr + 8);
        assert_eq!(dict.lookup(&memory, &zebra).unwrap(), dict_addr + 4);
        assert_eq!(
            dict.lookup(&memory, &codec.encode_zscii_word(b"pear")).unwrap(),
            0
        );
    }
}
