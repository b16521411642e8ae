use std::collections::HashMap;

use bitreader::BitReader;
use log::{debug, trace};

use crate::error::VmFailure;
use crate::header::offsets;
use crate::memory::MemoryBuffer;
use crate::version::VersionSpec;

/// Default alphabet rows, one 26-character row per alphabet, covering
/// Z-characters 6..=31.
///
///| Alphabet |   Z-char offset            |
///|----------|----------------------------|
///|          | 6789abcdef0123456789abcdef |
///|  A0      | abcdefghijklmnopqrstuvwxyz |
///|  A1      | ABCDEFGHIJKLMNOPQRSTUVWXYZ |
///|  A2      | ^0123456789.,!?_#'"/\-:()  |
///
/// Z-char 6 in A2 is the ZSCII escape and z-char 7 is always a newline,
/// so the first two A2 cells are placeholders in every version.
const ALPHABET_A0: &str = "abcdefghijklmnopqrstuvwxyz";
const ALPHABET_A1: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHABET_A2: &str = " \n0123456789.,!?_#'\"/\\-:()";
const ALPHABET_A2_V1: &str = " 0123456789.,!?_#'\"/\\<-:()";

/// The default extended ZSCII range, codes 155..=223.
const DEFAULT_EXTENDED: &str =
    "äöüÄÖÜß»«ëïÿËÏáéíóúýÁÉÍÓÚÝàèìòùÀÈÌÒÙâêîôûÂÊÎÔÛåÅøØãñõÃÑÕæÆçÇþðÞÐ£œŒ¡¿";

const ALPHABET_ROW: usize = 26;
const ZSCII_ESCAPE: u8 = 6;
const ZSCII_NEWLINE: u8 = 7;

lazy_static! {
    static ref DEFAULT_ALPHABET: Vec<char> = ALPHABET_A0
        .chars()
        .chain(ALPHABET_A1.chars())
        .chain(ALPHABET_A2.chars())
        .collect();
    static ref DEFAULT_ALPHABET_V1: Vec<char> = ALPHABET_A0
        .chars()
        .chain(ALPHABET_A1.chars())
        .chain(ALPHABET_A2_V1.chars())
        .collect();
    static ref DEFAULT_EXTENDED_CHARS: Vec<char> = DEFAULT_EXTENDED.chars().collect();
}

/// The Z-character decoder/encoder with its four caches: the three
/// alphabet rows, the ZSCII-to-Unicode table, its reverse, and the
/// decoded abbreviation strings. All are built once from the header.
pub struct TextCodec {
    version: VersionSpec,
    alphabet: Vec<char>,
    unicode: Vec<char>,
    reverse_unicode: HashMap<char, u8>,
    abbreviations: Vec<String>,
}

impl TextCodec {
    pub fn new(memory: &MemoryBuffer, version: VersionSpec) -> Result<TextCodec, VmFailure> {
        let unicode = build_unicode_table(memory, version)?;
        let reverse_unicode = build_reverse_table(&unicode);
        let alphabet = build_alphabet_table(memory, version, &unicode)?;

        let mut codec = TextCodec {
            version,
            alphabet,
            unicode,
            reverse_unicode,
            abbreviations: Vec::new(),
        };
        codec.load_abbreviations(memory)?;
        Ok(codec)
    }

    /// Decode abbreviation strings from the word-address table. The
    /// entries themselves are decoded with abbreviations still absent, so
    /// a nested abbreviation fails cleanly instead of recursing.
    fn load_abbreviations(&mut self, memory: &MemoryBuffer) -> Result<(), VmFailure> {
        let count = self.version.abbreviation_count;
        if count == 0 {
            return Ok(());
        }
        let table = memory.get_u16(offsets::ABBREVIATIONS)? as usize;
        if table == 0 {
            return Ok(());
        }
        let mut strings = Vec::with_capacity(count);
        for index in 0..count {
            let word_addr = memory.get_u16(table + index * 2)? as usize;
            // Entries a story never references are often junk; skip them
            // instead of refusing to load.
            let text = if word_addr == 0 {
                String::new()
            } else {
                match self.decode(memory, word_addr * 2) {
                    Ok((text, _)) => text,
                    Err(e) => {
                        debug!("skipping undecodable abbreviation {}: {}", index, e);
                        String::new()
                    }
                }
            };
            trace!("abbreviation {} = {:?}", index, text);
            strings.push(text);
        }
        self.abbreviations = strings;
        Ok(())
    }

    /// Decode a Z-string at `addr`. Returns the text and the address of
    /// the byte after the word whose terminator bit was set.
    pub fn decode(
        &self,
        memory: &MemoryBuffer,
        addr: usize,
    ) -> Result<(String, usize), VmFailure> {
        let mut result = String::new();
        let mut offset = addr;

        // Decoder state. `alphabet` is the shift applied to the current
        // character only; `alphabet_perm` persists across characters in
        // V1-2 shift-lock mode. `special` tracks abbreviation rows (1-3)
        // and the two halves of a 10-bit ZSCII escape (4, 5).
        let mut alphabet: u8 = 0;
        let mut alphabet_perm: u8 = 0;
        let mut special: u8 = 0;
        let mut zscii_high: u8 = 0;

        loop {
            let word = [memory.get_byte(offset)?, memory.get_byte(offset + 1)?];
            offset += 2;
            let (last, zchars) = split_zword(&word)?;

            for z in zchars {
                if special >= 1 && special <= 3 {
                    let index = (special - 1) as usize * 32 + z as usize;
                    special = 0;
                    alphabet = alphabet_perm;
                    let entry = self.abbreviations.get(index).ok_or_else(|| {
                        VmFailure::EncodingError(format!(
                            "abbreviation {index} referenced but not available"
                        ))
                    })?;
                    result.push_str(entry);
                    continue;
                }
                if special == 4 {
                    zscii_high = z;
                    special = 5;
                    continue;
                }
                if special == 5 {
                    special = 0;
                    alphabet = alphabet_perm;
                    let code = (zscii_high as u16) << 5 | z as u16;
                    if code >= 256 {
                        result.push(char::REPLACEMENT_CHARACTER);
                    } else {
                        result.push(self.unicode[code as usize]);
                    }
                    continue;
                }

                match z {
                    0 => {
                        result.push(' ');
                        alphabet = alphabet_perm;
                    }
                    1 => {
                        if self.version.number == 1 {
                            result.push('\n');
                            alphabet = alphabet_perm;
                        } else {
                            special = 1;
                        }
                    }
                    2 | 3 => {
                        if self.version.number <= 2 {
                            // Temporary shift relative to the lock.
                            let delta = if z == 2 { 1 } else { 2 };
                            alphabet = (alphabet_perm + delta) % 3;
                        } else {
                            special = z;
                        }
                    }
                    4 | 5 => {
                        if self.version.number <= 2 {
                            let delta = if z == 4 { 1 } else { 2 };
                            alphabet_perm = (alphabet_perm + delta) % 3;
                            alphabet = alphabet_perm;
                        } else {
                            alphabet = z - 3; // 4 -> A1, 5 -> A2
                        }
                    }
                    ZSCII_ESCAPE if alphabet == 2 => {
                        special = 4;
                        alphabet = alphabet_perm;
                    }
                    ZSCII_NEWLINE if alphabet == 2 => {
                        result.push('\n');
                        alphabet = alphabet_perm;
                    }
                    _ => {
                        let index = alphabet as usize * ALPHABET_ROW + (z - 6) as usize;
                        result.push(self.alphabet[index]);
                        alphabet = alphabet_perm;
                    }
                }
            }

            if last {
                break;
            }
        }

        Ok((result, offset))
    }

    /// Encode `len` ZSCII bytes at `addr` into the fixed-width packed
    /// form used by dictionary entries: 6 (V1-3) or 9 (V4+) Z-characters,
    /// upper case folded to lower, padded with 5s, silently truncated.
    pub fn encode_for_dictionary(
        &self,
        memory: &MemoryBuffer,
        addr: usize,
        len: usize,
    ) -> Result<Vec<u16>, VmFailure> {
        let mut bytes = Vec::with_capacity(len);
        for i in 0..len {
            bytes.push(memory.get_byte(addr + i)?);
        }
        Ok(self.encode_zscii_word(&bytes))
    }

    /// The encoding core, shared with tests that feed raw bytes.
    pub fn encode_zscii_word(&self, word: &[u8]) -> Vec<u16> {
        let capacity = self.version.dictionary_word_bytes / 2 * 3;
        let mut zchars: Vec<u8> = Vec::with_capacity(capacity + 4);

        for &raw in word {
            if zchars.len() >= capacity {
                break; // silent truncation
            }
            let zscii = if raw.is_ascii_uppercase() {
                raw + 32
            } else {
                raw
            };
            match self.find_in_alphabet(zscii) {
                Some((0, z)) => zchars.push(z),
                Some((row, z)) => {
                    zchars.push(self.shift_for_row(row));
                    zchars.push(z);
                }
                None => {
                    // Not in any alphabet: 10-bit ZSCII escape, 4 Z-chars.
                    zchars.push(self.shift_for_row(2));
                    zchars.push(ZSCII_ESCAPE);
                    zchars.push((zscii >> 5) & 0x1F);
                    zchars.push(zscii & 0x1F);
                }
            }
        }

        zchars.truncate(capacity);
        while zchars.len() < capacity {
            zchars.push(5);
        }

        let mut words = Vec::with_capacity(capacity / 3);
        for triple in zchars.chunks(3) {
            words.push(
                (triple[0] as u16) << 10 | (triple[1] as u16) << 5 | triple[2] as u16,
            );
        }
        let last = words.len() - 1;
        words[last] |= 0x8000;
        words
    }

    fn find_in_alphabet(&self, zscii: u8) -> Option<(u8, u8)> {
        let ch = self.unicode[zscii as usize];
        for (index, entry) in self.alphabet.iter().enumerate() {
            // The first two A2 cells are the escape and newline slots.
            if index >= 2 * ALPHABET_ROW && index < 2 * ALPHABET_ROW + 2 {
                continue;
            }
            if *entry == ch {
                return Some(((index / ALPHABET_ROW) as u8, (index % ALPHABET_ROW) as u8 + 6));
            }
        }
        None
    }

    fn shift_for_row(&self, row: u8) -> u8 {
        if self.version.number <= 2 {
            // Single-shift characters: 2 moves one alphabet up, 3 two up.
            if row == 1 {
                2
            } else {
                3
            }
        } else {
            row + 3 // 4 -> A1, 5 -> A2
        }
    }

    /// ZSCII output byte to Unicode.
    pub fn zscii_to_unicode(&self, zscii: u8) -> char {
        self.unicode[zscii as usize]
    }

    /// Unicode input character to ZSCII, '?' when unmappable.
    pub fn unicode_to_zscii(&self, ch: char) -> u8 {
        match self.reverse_unicode.get(&ch) {
            Some(z) => *z,
            None => b'?',
        }
    }

    pub fn abbreviation(&self, index: usize) -> Option<&str> {
        self.abbreviations.get(index).map(String::as_str)
    }
}

/// Split a packed word into its terminator bit and three 5-bit Z-chars.
fn split_zword(word: &[u8; 2]) -> Result<(bool, [u8; 3]), VmFailure> {
    let mut reader = BitReader::new(word);
    let last = reader.read_u8(1).map_err(unpack_err)? == 1;
    let mut chars = [0u8; 3];
    for slot in chars.iter_mut() {
        *slot = reader.read_u8(5).map_err(unpack_err)?;
    }
    Ok((last, chars))
}

fn unpack_err(e: bitreader::BitReaderError) -> VmFailure {
    VmFailure::EncodingError(format!("z-word unpack failed: {e}"))
}

fn build_unicode_table(
    memory: &MemoryBuffer,
    version: VersionSpec,
) -> Result<Vec<char>, VmFailure> {
    let mut table = vec![char::REPLACEMENT_CHARACTER; 256];
    table[0] = '\0';
    table[9] = '\t';
    table[11] = ' ';
    table[13] = '\n';
    for code in 32..=126u8 {
        table[code as usize] = code as char;
    }

    let custom = custom_unicode_table(memory, version)?;
    match custom {
        Some(addr) => {
            let count = memory.get_byte(addr)? as usize;
            for i in 0..count {
                let scalar = memory.get_u16(addr + 1 + i * 2)? as u32;
                if 155 + i > 251 {
                    break;
                }
                table[155 + i] =
                    char::from_u32(scalar).unwrap_or(char::REPLACEMENT_CHARACTER);
            }
            debug!("custom unicode table with {} entries at {:#06x}", count, addr);
        }
        None => {
            for (i, ch) in DEFAULT_EXTENDED_CHARS.iter().enumerate() {
                table[155 + i] = *ch;
            }
        }
    }
    Ok(table)
}

/// V5+ stories may point at a custom unicode translation table through
/// word 3 of the header extension table.
fn custom_unicode_table(
    memory: &MemoryBuffer,
    version: VersionSpec,
) -> Result<Option<usize>, VmFailure> {
    if version.number < 5 {
        return Ok(None);
    }
    let extension = memory.get_u16(offsets::EXTENSION_TABLE)? as usize;
    if extension == 0 {
        return Ok(None);
    }
    let words = memory.get_u16(extension)? as usize;
    if words < 3 {
        return Ok(None);
    }
    let addr = memory.get_u16(extension + 3 * 2)? as usize;
    Ok(if addr == 0 { None } else { Some(addr) })
}

/// Reverse mapping, built by walking the table from the top down so the
/// ASCII range wins whenever two ZSCII codes map to the same character.
fn build_reverse_table(unicode: &[char]) -> HashMap<char, u8> {
    let mut reverse = HashMap::new();
    for code in (0..=255u8).rev() {
        let ch = unicode[code as usize];
        if ch != char::REPLACEMENT_CHARACTER {
            reverse.insert(ch, code);
        }
    }
    reverse
}

fn build_alphabet_table(
    memory: &MemoryBuffer,
    version: VersionSpec,
    unicode: &[char],
) -> Result<Vec<char>, VmFailure> {
    let custom = if version.number >= 5 {
        memory.get_u16(offsets::ALPHABET_TABLE)? as usize
    } else {
        0
    };

    let mut table: Vec<char> = if custom != 0 {
        let mut chars = Vec::with_capacity(3 * ALPHABET_ROW);
        for i in 0..3 * ALPHABET_ROW {
            let zscii = memory.get_byte(custom + i)?;
            chars.push(unicode[zscii as usize]);
        }
        chars
    } else if version.number == 1 {
        DEFAULT_ALPHABET_V1.clone()
    } else {
        DEFAULT_ALPHABET.clone()
    };

    // Z-char 7 in A2 is a newline no matter what table is installed.
    table[2 * ALPHABET_ROW + 1] = '\n';
    Ok(table)
}
