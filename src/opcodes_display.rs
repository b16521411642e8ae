//! Opcodes that talk to the UI: the print family, `sread`, the status
//! line and the few window controls the UI contract names.

use log::debug;

use crate::dictionary;
use crate::error::VmFailure;
use crate::processor::{two, Processor};
use crate::ui::ZMachineUi;
use crate::version::PackedKind;

impl<U: ZMachineUi> Processor<U> {
    /// 0OP:0x02 print — inline Z-string.
    pub(crate) fn op_print(&mut self) -> Result<(), VmFailure> {
        let text = self.inline_string()?;
        self.ui.print_string(&text)?;
        Ok(())
    }

    /// 0OP:0x03 print_ret — inline string, newline, return true.
    pub(crate) fn op_print_ret(&mut self) -> Result<(), VmFailure> {
        let text = self.inline_string()?;
        self.ui.print_string(&text)?;
        self.ui.print_char('\n')?;
        self.return_value(1)
    }

    /// 1OP:0x07 print_addr — Z-string at a byte address.
    pub(crate) fn op_print_addr(&mut self, addr: u16) -> Result<(), VmFailure> {
        let (text, _) = self.text.decode(&self.memory, addr as usize)?;
        self.ui.print_string(&text)?;
        Ok(())
    }

    /// 1OP:0x0D print_paddr — Z-string at a packed address.
    pub(crate) fn op_print_paddr(&mut self, packed: u16) -> Result<(), VmFailure> {
        let addr = self.version.unpack(packed, PackedKind::ZString);
        let (text, _) = self.text.decode(&self.memory, addr)?;
        self.ui.print_string(&text)?;
        Ok(())
    }

    /// VAR:0x05 print_char
    pub(crate) fn op_print_char(&mut self, zscii: u16) -> Result<(), VmFailure> {
        let ch = self.text.zscii_to_unicode((zscii & 0xFF) as u8);
        self.ui.print_char(ch)?;
        Ok(())
    }

    /// VAR:0x06 print_num — signed.
    pub(crate) fn op_print_num(&mut self, value: u16) -> Result<(), VmFailure> {
        self.ui.print_string(&(value as i16).to_string())?;
        Ok(())
    }

    /// 0OP:0x0B new_line
    pub(crate) fn op_new_line(&mut self) -> Result<(), VmFailure> {
        self.ui.print_char('\n')?;
        Ok(())
    }

    /// 0OP:0x0C show_status (V3) — location object name, score, turns
    /// from globals G00-G02.
    pub(crate) fn op_show_status(&mut self) -> Result<(), VmFailure> {
        let globals = self.header.global_variables;
        let location = self.memory.get_u16(globals)?;
        let score = self.memory.get_u16(globals + 2)? as i16;
        let turns = self.memory.get_u16(globals + 4)?;
        let name = if location == 0 {
            String::new()
        } else {
            self.objects
                .short_name(&self.memory, &self.text, location)?
        };
        self.ui.show_status(&name, score, turns)?;
        Ok(())
    }

    /// VAR:0x04 sread — read a line into the text buffer and tokenise it
    /// into the parse buffer. End of input from the UI quits cleanly.
    pub(crate) fn op_sread(&mut self, operands: &[u16], op: u8) -> Result<(), VmFailure> {
        let (text_addr, parse_addr) = two(op, operands)?;
        let text_addr = text_addr as usize;
        let parse_addr = parse_addr as usize;

        if self.version.number == 3 {
            self.op_show_status()?;
        }

        // V1-4: byte 0 holds the buffer size; up to size-1 characters
        // land from byte 1 with a zero terminator. V5+: byte 1 receives
        // the count and the text starts at byte 2.
        let capacity = self.memory.get_byte(text_addr)? as usize;
        let max_len = if self.version.number <= 4 {
            capacity.saturating_sub(1)
        } else {
            capacity
        };

        let (line, terminator) = match self.ui.read_line(max_len)? {
            Some(input) => input,
            None => {
                debug!("end of input; treating as quit");
                self.finished = true;
                return Ok(());
            }
        };

        let line = line.to_lowercase();
        let zscii: Vec<u8> = line
            .chars()
            .take(max_len)
            .map(|c| self.text.unicode_to_zscii(c))
            .collect();

        let text_base = if self.version.number <= 4 { 1 } else { 2 };
        if self.version.number <= 4 {
            for (i, b) in zscii.iter().enumerate() {
                self.memory.set_byte(text_addr + 1 + i, *b)?;
            }
            self.memory.set_byte(text_addr + 1 + zscii.len(), 0)?;
        } else {
            self.memory.set_byte(text_addr + 1, zscii.len() as u8)?;
            for (i, b) in zscii.iter().enumerate() {
                self.memory.set_byte(text_addr + 2 + i, *b)?;
            }
        }

        if parse_addr != 0 {
            if let Some(dict) = self.dictionary.as_ref() {
                dictionary::tokenise(
                    &mut self.memory,
                    &self.text,
                    dict,
                    &zscii,
                    text_base,
                    parse_addr,
                    false,
                )?;
            }
        }

        if self.version.number >= 5 {
            self.store(terminator as u16)?;
        }
        Ok(())
    }

    /// VAR:0x0B set_window — forwarded to the UI.
    pub(crate) fn op_set_window(&mut self, window: u16) -> Result<(), VmFailure> {
        self.ui.set_window(window)?;
        Ok(())
    }

    /// VAR:0x0D erase_window — forwarded to the UI.
    pub(crate) fn op_erase_window(&mut self, window: u16) -> Result<(), VmFailure> {
        self.ui.erase_window(window as i16)?;
        Ok(())
    }

    /// VAR:0x0F set_cursor — forwarded to the UI.
    pub(crate) fn op_set_cursor(&mut self, line: u16, column: u16) -> Result<(), VmFailure> {
        self.ui.set_cursor(column, line)?;
        Ok(())
    }
}
