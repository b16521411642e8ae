//! Control-flow odds and ends outside the call machinery: jumps, stack
//! returns, save/restore/restart/quit, and verify.

use log::{debug, info};

use crate::error::VmFailure;
use crate::processor::Processor;
use crate::ui::ZMachineUi;

impl<U: ZMachineUi> Processor<U> {
    /// 1OP:0x0C jump — raw signed relative jump; this is an operand,
    /// not a branch post-argument.
    pub(crate) fn op_jump(&mut self, offset: u16) -> Result<(), VmFailure> {
        let target = self.pc as i64 + (offset as i16) as i64 - 2;
        if target < 0 {
            return Err(VmFailure::MemoryOutOfRange { addr: 0 });
        }
        self.pc = target as usize;
        Ok(())
    }

    /// 0OP:0x08 ret_popped
    pub(crate) fn op_ret_popped(&mut self) -> Result<(), VmFailure> {
        let value = self.stack.pop()?;
        self.return_value(value)
    }

    /// 0OP:0x09 pop — discard the stack top.
    pub(crate) fn op_pop(&mut self) -> Result<(), VmFailure> {
        self.stack.pop()?;
        Ok(())
    }

    /// 0OP:0x0A quit
    pub(crate) fn op_quit(&mut self) -> Result<(), VmFailure> {
        info!("quit");
        self.finished = true;
        Ok(())
    }

    /// 0OP:0x05 save — snapshot to the UI. Branches on the outcome in
    /// V1-3, stores it in V4.
    pub(crate) fn op_save(&mut self) -> Result<(), VmFailure> {
        let snapshot = self.snapshot();
        let saved = self.ui.save(&snapshot);
        debug!("save: {}", saved);
        if self.version.number <= 3 {
            self.branch(saved)
        } else {
            self.store(saved as u16)
        }
    }

    /// 0OP:0x06 restore — bring back the UI's snapshot. The program
    /// counter is not part of a snapshot; execution continues here with
    /// the restored memory and stack.
    pub(crate) fn op_restore(&mut self) -> Result<(), VmFailure> {
        match self.ui.restore() {
            Some(snapshot) => {
                self.restore_snapshot(&snapshot)?;
                debug!("restore succeeded");
                if self.version.number <= 3 {
                    self.branch(true)
                } else {
                    self.store(2)
                }
            }
            None => {
                debug!("restore failed or nothing saved");
                if self.version.number <= 3 {
                    self.branch(false)
                } else {
                    self.store(0)
                }
            }
        }
    }

    /// 0OP:0x0D verify — checksum everything past the header against
    /// the header checksum.
    pub(crate) fn op_verify(&mut self) -> Result<(), VmFailure> {
        let end = self.header.len_file.min(self.memory.len());
        let mut sum = 0u16;
        for pos in 0x40..end {
            sum = sum.wrapping_add(self.memory.get_byte(pos)? as u16);
        }
        debug!(
            "verify: computed {:#06x}, header {:#06x}",
            sum, self.header.checksum_file
        );
        self.branch(sum == self.header.checksum_file)
    }
}
