//! Arithmetic, logic and comparison opcodes.
//!
//! All arithmetic is signed 16-bit with wrapping overflow; division
//! truncates toward zero and a zero divisor is a fatal failure.

use log::debug;

use crate::error::VmFailure;
use crate::processor::{variable_number, Processor};
use crate::ui::ZMachineUi;

impl<U: ZMachineUi> Processor<U> {
    /// 2OP:0x01 je — branch if the first operand equals any other.
    pub(crate) fn op_je(&mut self, operands: &[u16], op: u8) -> Result<(), VmFailure> {
        if operands.len() < 2 {
            return Err(VmFailure::IllegalInstruction {
                opcode: op,
                extended: false,
            });
        }
        let equal = operands[1..].contains(&operands[0]);
        self.branch(equal)
    }

    /// 1OP:0x00 jz
    pub(crate) fn op_jz(&mut self, a: u16) -> Result<(), VmFailure> {
        self.branch(a == 0)
    }

    /// 2OP:0x02 jl — signed less-than.
    pub(crate) fn op_jl(&mut self, a: u16, b: u16) -> Result<(), VmFailure> {
        self.branch((a as i16) < (b as i16))
    }

    /// 2OP:0x03 jg — signed greater-than.
    pub(crate) fn op_jg(&mut self, a: u16, b: u16) -> Result<(), VmFailure> {
        self.branch((a as i16) > (b as i16))
    }

    /// 2OP:0x04 dec_chk — decrement a variable, branch if now less.
    pub(crate) fn op_dec_chk(&mut self, var: u16, value: u16) -> Result<(), VmFailure> {
        let var = variable_number(var)?;
        let decremented = self.read_variable_indirect(var)?.wrapping_sub(1);
        self.write_variable_indirect(var, decremented)?;
        self.branch((decremented as i16) < (value as i16))
    }

    /// 2OP:0x05 inc_chk — increment a variable, branch if now greater.
    pub(crate) fn op_inc_chk(&mut self, var: u16, value: u16) -> Result<(), VmFailure> {
        let var = variable_number(var)?;
        let incremented = self.read_variable_indirect(var)?.wrapping_add(1);
        self.write_variable_indirect(var, incremented)?;
        self.branch((incremented as i16) > (value as i16))
    }

    /// 1OP:0x05 inc
    pub(crate) fn op_inc(&mut self, var: u16) -> Result<(), VmFailure> {
        let var = variable_number(var)?;
        let value = self.read_variable_indirect(var)?.wrapping_add(1);
        self.write_variable_indirect(var, value)
    }

    /// 1OP:0x06 dec
    pub(crate) fn op_dec(&mut self, var: u16) -> Result<(), VmFailure> {
        let var = variable_number(var)?;
        let value = self.read_variable_indirect(var)?.wrapping_sub(1);
        self.write_variable_indirect(var, value)
    }

    /// 2OP:0x07 test — branch if all bits of the mask are set.
    pub(crate) fn op_test(&mut self, bitmap: u16, mask: u16) -> Result<(), VmFailure> {
        self.branch(bitmap & mask == mask)
    }

    /// 2OP:0x08 or
    pub(crate) fn op_or(&mut self, a: u16, b: u16) -> Result<(), VmFailure> {
        self.store(a | b)
    }

    /// 2OP:0x09 and
    pub(crate) fn op_and(&mut self, a: u16, b: u16) -> Result<(), VmFailure> {
        self.store(a & b)
    }

    /// 1OP:0x0F not (V1-4) / VAR:0x18 not (V5+)
    pub(crate) fn op_not(&mut self, a: u16) -> Result<(), VmFailure> {
        self.store(!a)
    }

    /// 2OP:0x14-0x18 add/sub/mul/div/mod.
    pub(crate) fn op_arith(&mut self, opcode: u8, a: u16, b: u16) -> Result<(), VmFailure> {
        let a = a as i16;
        let b = b as i16;
        let result = match opcode {
            0x14 => a.wrapping_add(b),
            0x15 => a.wrapping_sub(b),
            0x16 => a.wrapping_mul(b),
            0x17 => {
                if b == 0 {
                    return Err(VmFailure::DivisionByZero);
                }
                a.wrapping_div(b)
            }
            0x18 => {
                if b == 0 {
                    return Err(VmFailure::DivisionByZero);
                }
                a.wrapping_rem(b)
            }
            _ => unreachable!("non-arithmetic opcode routed to op_arith"),
        };
        self.store(result as u16)
    }

    /// VAR:0x07 random — positive bounds roll, zero reseeds from
    /// entropy, negative reseeds deterministically; reseeds store 0.
    pub(crate) fn op_random(&mut self, range: u16) -> Result<(), VmFailure> {
        let range = range as i16;
        let result = if range > 0 {
            self.rand.next_in_range(range as u16)
        } else if range == 0 {
            debug!("random reseeded from entropy");
            self.rand.reseed_entropy();
            0
        } else {
            debug!("random reseeded with {}", -(range as i32));
            self.rand.reseed(-(range as i32) as u64);
            0
        };
        self.store(result)
    }
}
