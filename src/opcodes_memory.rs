//! Table access and variable-transfer opcodes.

use crate::error::VmFailure;
use crate::processor::{three, variable_number, Processor};
use crate::ui::ZMachineUi;

impl<U: ZMachineUi> Processor<U> {
    /// 2OP:0x0F loadw — word at `array + 2*index`.
    pub(crate) fn op_loadw(&mut self, array: u16, index: u16) -> Result<(), VmFailure> {
        let value = self
            .memory
            .get_u16(array as usize + 2 * index as usize)?;
        self.store(value)
    }

    /// 2OP:0x10 loadb — byte at `array + index`.
    pub(crate) fn op_loadb(&mut self, array: u16, index: u16) -> Result<(), VmFailure> {
        let value = self.memory.get_byte(array as usize + index as usize)?;
        self.store(value as u16)
    }

    /// VAR:0x01 storew
    pub(crate) fn op_storew(&mut self, operands: &[u16], op: u8) -> Result<(), VmFailure> {
        let (array, index, value) = three(op, operands)?;
        self.memory
            .set_u16(array as usize + 2 * index as usize, value)
    }

    /// VAR:0x02 storeb
    pub(crate) fn op_storeb(&mut self, operands: &[u16], op: u8) -> Result<(), VmFailure> {
        let (array, index, value) = three(op, operands)?;
        self.memory
            .set_byte(array as usize + index as usize, (value & 0xFF) as u8)
    }

    /// 1OP:0x0E load — read the named variable; variable 0 peeks the
    /// stack rather than popping it.
    pub(crate) fn op_load(&mut self, var: u16) -> Result<(), VmFailure> {
        let value = self.read_variable_indirect(variable_number(var)?)?;
        self.store(value)
    }

    /// 2OP:0x0D store — write the named variable; variable 0 replaces
    /// the stack top in place.
    pub(crate) fn op_store(&mut self, var: u16, value: u16) -> Result<(), VmFailure> {
        self.write_variable_indirect(variable_number(var)?, value)
    }

    /// VAR:0x08 push
    pub(crate) fn op_push(&mut self, value: u16) -> Result<(), VmFailure> {
        self.stack.push(value)
    }

    /// VAR:0x09 pull — pop, then write through the variable number with
    /// in-place semantics for variable 0.
    pub(crate) fn op_pull(&mut self, var: u16) -> Result<(), VmFailure> {
        let var = variable_number(var)?;
        let value = self.stack.pop()?;
        self.write_variable_indirect(var, value)
    }
}
