use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, trace};

use crate::dictionary::Dictionary;
use crate::error::VmFailure;
use crate::header::{offsets, Header};
use crate::memory::MemoryBuffer;
use crate::opcode_tables;
use crate::snapshot::Snapshot;
use crate::text::TextCodec;
use crate::ui::ZMachineUi;
use crate::version::{PackedKind, VersionSpec};
use crate::zobject::ObjectTree;
use crate::zrand::ZRand;
use crate::zstack::{ZStack, MAX_LOCALS};

// Operand type codes from the instruction stream.
const OPERAND_LARGE: u8 = 0;
const OPERAND_SMALL: u8 = 1;
const OPERAND_VARIABLE: u8 = 2;
const OPERAND_OMITTED: u8 = 3;

/// The Z-Machine processor: fetch, decode, dispatch, and the state those
/// need — memory image, framed stack, program counter, and the text,
/// object and dictionary views over the image.
pub struct Processor<U: ZMachineUi> {
    pub(crate) memory: MemoryBuffer,
    pub(crate) stack: ZStack,
    pub(crate) pc: usize,
    pub(crate) version: VersionSpec,
    pub(crate) header: Header,
    pub(crate) objects: ObjectTree,
    pub(crate) text: TextCodec,
    pub(crate) dictionary: Option<Dictionary>,
    pub(crate) rand: ZRand,
    pub ui: U,
    pub(crate) finished: bool,
    /// Reentrancy guard for `execute()`.
    executing: AtomicBool,
    /// Pristine copy of dynamic memory for `restart`.
    original_dynamic: Vec<u8>,
}

impl<U: ZMachineUi> Processor<U> {
    pub fn new(mut memory: MemoryBuffer, ui: U) -> Result<Processor<U>, VmFailure> {
        let version = VersionSpec::new(&memory)?;
        let header = Header::new(&memory)?;
        memory.set_dynamic_limit(header.base_static_mem)?;
        let objects = ObjectTree::new(&memory, version)?;
        let text = TextCodec::new(&memory, version)?;
        let dictionary = if header.dictionary != 0 {
            Some(Dictionary::new(&memory, header.dictionary, version)?)
        } else {
            None
        };
        let original_dynamic = memory.raw()[..memory.dynamic_limit()].to_vec();
        let pc = header.initial_pc;
        info!(
            "loaded V{} story, {} bytes, dynamic limit {:#06x}",
            version.number,
            memory.len(),
            memory.dynamic_limit()
        );
        Ok(Processor {
            memory,
            stack: ZStack::new(),
            pc,
            version,
            header,
            objects,
            text,
            dictionary,
            rand: ZRand::new(),
            ui,
            finished: false,
            executing: AtomicBool::new(false),
            original_dynamic,
        })
    }

    pub fn memory(&self) -> &MemoryBuffer {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryBuffer {
        &mut self.memory
    }

    pub fn stack(&self) -> &ZStack {
        &self.stack
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Swap in a deterministic random sequence (tests, scripted runs).
    pub fn seed_random(&mut self, seed: u64) {
        self.rand = ZRand::new_predictable(seed);
    }

    /// Run the story until `quit` or a failure. Not reentrant: a second
    /// call while one is in flight fails without touching state.
    pub fn execute(&mut self) -> Result<(), VmFailure> {
        if self.executing.swap(true, Ordering::SeqCst) {
            return Err(VmFailure::AlreadyExecuting);
        }
        let result = self.execute_inner();
        self.executing.store(false, Ordering::SeqCst);
        result
    }

    fn execute_inner(&mut self) -> Result<(), VmFailure> {
        self.processor_reset()?;
        info!("execution started at {:#06x}", self.pc);
        while !self.finished {
            self.step()?;
        }
        info!("execution finished");
        Ok(())
    }

    /// Fresh stack and PC plus the interpreter's header patch.
    fn processor_reset(&mut self) -> Result<(), VmFailure> {
        self.stack.reset();
        self.pc = self.header.initial_pc;
        self.finished = false;
        self.patch_header()
    }

    /// Fields the interpreter owns inside the header: capability flags,
    /// the standards revision, and (V4+) the screen size from the UI.
    fn patch_header(&mut self) -> Result<(), VmFailure> {
        let flags1 = self.memory.get_byte(offsets::FLAGS1)?;
        let flags1 = if self.version.number <= 3 {
            // Status line available, screen splitting available,
            // fixed-pitch default.
            (flags1 & !0x70) | 0x20
        } else {
            // Boldface, italic and fixed-space styles available.
            flags1 | 0x1C
        };
        self.memory.set_byte(offsets::FLAGS1, flags1)?;
        self.memory.set_byte(offsets::STANDARD_MAJOR, 1)?;
        self.memory.set_byte(offsets::STANDARD_MINOR, 0)?;
        if self.version.number >= 4 {
            let (rows, cols) = self.ui.screen_size();
            self.memory
                .set_byte(offsets::SCREEN_ROWS, rows.min(255) as u8)?;
            self.memory
                .set_byte(offsets::SCREEN_COLS, cols.min(255) as u8)?;
        }
        Ok(())
    }

    /// Put dynamic memory back to its freshly-loaded contents and start
    /// over (the `restart` opcode).
    pub(crate) fn restart(&mut self) -> Result<(), VmFailure> {
        let original = std::mem::take(&mut self.original_dynamic);
        self.memory.restore_prefix(&original);
        self.original_dynamic = original;
        self.processor_reset()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.memory, &self.stack)
    }

    pub fn restore_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), VmFailure> {
        snapshot.restore(&mut self.memory, &mut self.stack)
    }

    // ---- fetch & decode ----

    pub(crate) fn next_byte(&mut self) -> Result<u8, VmFailure> {
        let byte = self.memory.get_byte(self.pc)?;
        self.pc += 1;
        Ok(byte)
    }

    pub(crate) fn next_word(&mut self) -> Result<u16, VmFailure> {
        let word = self.memory.get_u16(self.pc)?;
        self.pc += 2;
        Ok(word)
    }

    /// Fetch one operand of the given 2-bit type. Evaluating a variable
    /// operand with number 0 pops the stack.
    fn operand(&mut self, operand_type: u8) -> Result<u16, VmFailure> {
        match operand_type {
            OPERAND_LARGE => self.next_word(),
            OPERAND_SMALL => Ok(self.next_byte()? as u16),
            OPERAND_VARIABLE => {
                let var = self.next_byte()?;
                self.read_variable(var)
            }
            _ => unreachable!("omitted operand fetched"),
        }
    }

    /// Fetch operands described by one or two type-mask bytes. Scanning
    /// stops at the first omitted slot; the mask bytes are consumed
    /// either way.
    fn masked_operands(&mut self, mask_bytes: usize) -> Result<Vec<u16>, VmFailure> {
        let mut masks = [0u8; 2];
        for slot in masks.iter_mut().take(mask_bytes) {
            *slot = self.next_byte()?;
        }
        let mut operands = Vec::with_capacity(mask_bytes * 4);
        'scan: for mask in masks.iter().take(mask_bytes) {
            for field in 0..4 {
                let operand_type = (mask >> (6 - field * 2)) & 0x03;
                if operand_type == OPERAND_OMITTED {
                    break 'scan;
                }
                operands.push(self.operand(operand_type)?);
            }
        }
        Ok(operands)
    }

    /// Decode and execute one instruction.
    pub fn step(&mut self) -> Result<(), VmFailure> {
        let at = self.pc;
        let op = self.next_byte()?;
        match op {
            0x00..=0x7F => {
                // Long form 2OP: type bits 6 and 5, variable when set.
                let a = self.operand(if op & 0x40 != 0 {
                    OPERAND_VARIABLE
                } else {
                    OPERAND_SMALL
                })?;
                let b = self.operand(if op & 0x20 != 0 {
                    OPERAND_VARIABLE
                } else {
                    OPERAND_SMALL
                })?;
                trace!(
                    "{:05x}: {} {:04x} {:04x}",
                    at,
                    opcode_tables::name_2op(op & 0x1F),
                    a,
                    b
                );
                self.dispatch_2op(op, &[a, b])
            }
            0xBE if self.version.number >= 5 => {
                let ext = self.next_byte()?;
                let operands = self.masked_operands(1)?;
                trace!("{:05x}: extended {:02x} {:?}", at, ext, operands);
                self.dispatch_ext(ext, &operands)
            }
            0x80..=0xAF => {
                // Short form 1OP: type in bits 5-4.
                let a = self.operand((op >> 4) & 0x03)?;
                trace!(
                    "{:05x}: {} {:04x}",
                    at,
                    opcode_tables::name_1op(op & 0x0F, self.version.number),
                    a
                );
                self.dispatch_1op(op, a)
            }
            0xB0..=0xBF => {
                trace!("{:05x}: {}", at, opcode_tables::name_0op(op & 0x0F));
                self.dispatch_0op(op)
            }
            0xC0..=0xDF => {
                // Variable form of a 2OP opcode: one type-mask byte.
                let operands = self.masked_operands(1)?;
                trace!(
                    "{:05x}: {} {:?}",
                    at,
                    opcode_tables::name_2op(op & 0x1F),
                    operands
                );
                self.dispatch_2op(op, &operands)
            }
            0xE0..=0xFF => {
                // VAR form; call_vs2/call_vn2 carry two mask bytes.
                let mask_bytes = if op == 0xEC || op == 0xFA { 2 } else { 1 };
                let operands = self.masked_operands(mask_bytes)?;
                trace!(
                    "{:05x}: {} {:?}",
                    at,
                    opcode_tables::name_var(op & 0x1F, self.version.number),
                    operands
                );
                self.dispatch_var(op, &operands)
            }
        }
    }

    // ---- dispatch ----

    fn dispatch_2op(&mut self, op: u8, operands: &[u16]) -> Result<(), VmFailure> {
        let opcode = op & 0x1F;
        match opcode {
            0x01 => self.op_je(operands, op),
            0x02 => {
                let (a, b) = two(op, operands)?;
                self.op_jl(a, b)
            }
            0x03 => {
                let (a, b) = two(op, operands)?;
                self.op_jg(a, b)
            }
            0x04 => {
                let (a, b) = two(op, operands)?;
                self.op_dec_chk(a, b)
            }
            0x05 => {
                let (a, b) = two(op, operands)?;
                self.op_inc_chk(a, b)
            }
            0x06 => {
                let (a, b) = two(op, operands)?;
                self.op_jin(a, b)
            }
            0x07 => {
                let (a, b) = two(op, operands)?;
                self.op_test(a, b)
            }
            0x08 => {
                let (a, b) = two(op, operands)?;
                self.op_or(a, b)
            }
            0x09 => {
                let (a, b) = two(op, operands)?;
                self.op_and(a, b)
            }
            0x0A => {
                let (a, b) = two(op, operands)?;
                self.op_test_attr(a, b)
            }
            0x0B => {
                let (a, b) = two(op, operands)?;
                self.op_set_attr(a, b)
            }
            0x0C => {
                let (a, b) = two(op, operands)?;
                self.op_clear_attr(a, b)
            }
            0x0D => {
                let (a, b) = two(op, operands)?;
                self.op_store(a, b)
            }
            0x0E => {
                let (a, b) = two(op, operands)?;
                self.op_insert_obj(a, b)
            }
            0x0F => {
                let (a, b) = two(op, operands)?;
                self.op_loadw(a, b)
            }
            0x10 => {
                let (a, b) = two(op, operands)?;
                self.op_loadb(a, b)
            }
            0x11 => {
                let (a, b) = two(op, operands)?;
                self.op_get_prop(a, b)
            }
            0x12 => {
                let (a, b) = two(op, operands)?;
                self.op_get_prop_addr(a, b)
            }
            0x13 => {
                let (a, b) = two(op, operands)?;
                self.op_get_next_prop(a, b)
            }
            0x14..=0x18 => {
                let (a, b) = two(op, operands)?;
                self.op_arith(opcode, a, b)
            }
            0x19 if self.version.number >= 4 => self.op_call(operands, true),
            0x1A if self.version.number >= 5 => self.op_call(operands, false),
            _ => Err(VmFailure::IllegalInstruction {
                opcode: op,
                extended: false,
            }),
        }
    }

    fn dispatch_1op(&mut self, op: u8, a: u16) -> Result<(), VmFailure> {
        match op & 0x0F {
            0x00 => self.op_jz(a),
            0x01 => self.op_get_sibling(a),
            0x02 => self.op_get_child(a),
            0x03 => self.op_get_parent(a),
            0x04 => self.op_get_prop_len(a),
            0x05 => self.op_inc(a),
            0x06 => self.op_dec(a),
            0x07 => self.op_print_addr(a),
            0x08 if self.version.number >= 4 => self.op_call(&[a], true),
            0x09 => self.op_remove_obj(a),
            0x0A => self.op_print_obj(a),
            0x0B => self.return_value(a),
            0x0C => self.op_jump(a),
            0x0D => self.op_print_paddr(a),
            0x0E => self.op_load(a),
            0x0F => {
                if self.version.number <= 4 {
                    self.op_not(a)
                } else {
                    self.op_call(&[a], false)
                }
            }
            _ => Err(VmFailure::IllegalInstruction {
                opcode: op,
                extended: false,
            }),
        }
    }

    fn dispatch_0op(&mut self, op: u8) -> Result<(), VmFailure> {
        match op & 0x0F {
            0x00 => self.return_value(1),
            0x01 => self.return_value(0),
            0x02 => self.op_print(),
            0x03 => self.op_print_ret(),
            0x04 => Ok(()), // nop
            0x05 => self.op_save(),
            0x06 => self.op_restore(),
            0x07 => self.restart(),
            0x08 => self.op_ret_popped(),
            0x09 => self.op_pop(),
            0x0A => self.op_quit(),
            0x0B => self.op_new_line(),
            0x0C if self.version.number == 3 => self.op_show_status(),
            0x0D if self.version.number >= 3 => self.op_verify(),
            _ => Err(VmFailure::IllegalInstruction {
                opcode: op,
                extended: false,
            }),
        }
    }

    fn dispatch_var(&mut self, op: u8, operands: &[u16]) -> Result<(), VmFailure> {
        let opcode = op & 0x1F;
        match opcode {
            0x00 => self.op_call(operands, true),
            0x01 => self.op_storew(operands, op),
            0x02 => self.op_storeb(operands, op),
            0x03 => self.op_put_prop(operands, op),
            0x04 => self.op_sread(operands, op),
            0x05 => self.op_print_char(one(op, operands)?),
            0x06 => self.op_print_num(one(op, operands)?),
            0x07 => self.op_random(one(op, operands)?),
            0x08 => self.op_push(one(op, operands)?),
            0x09 => self.op_pull(one(op, operands)?),
            0x0B if self.version.number >= 3 => self.op_set_window(one(op, operands)?),
            0x0C if self.version.number >= 4 => self.op_call(operands, true),
            0x0D if self.version.number >= 4 => self.op_erase_window(one(op, operands)?),
            0x0F if self.version.number >= 4 => {
                let (a, b) = two(op, operands)?;
                self.op_set_cursor(a, b)
            }
            0x18 if self.version.number >= 5 => self.op_not(one(op, operands)?),
            0x19 | 0x1A if self.version.number >= 5 => self.op_call(operands, false),
            _ => Err(VmFailure::IllegalInstruction {
                opcode: op,
                extended: false,
            }),
        }
    }

    /// No extended opcodes are installed in the baseline set.
    fn dispatch_ext(&mut self, ext: u8, _operands: &[u16]) -> Result<(), VmFailure> {
        Err(VmFailure::IllegalInstruction {
            opcode: ext,
            extended: true,
        })
    }

    // ---- variable access ----

    /// Read a variable: 0 pops the evaluation stack, 1-15 are locals,
    /// 16-255 are globals.
    pub(crate) fn read_variable(&mut self, var: u8) -> Result<u16, VmFailure> {
        match var {
            0 => self.stack.pop(),
            1..=15 => self.stack.read_local(var),
            _ => self.memory.get_u16(self.global_addr(var)),
        }
    }

    /// Write a variable: 0 pushes, 1-15 are locals, 16-255 globals.
    pub(crate) fn write_variable(&mut self, var: u8, value: u16) -> Result<(), VmFailure> {
        match var {
            0 => self.stack.push(value),
            1..=15 => self.stack.write_local(var, value),
            _ => {
                let addr = self.global_addr(var);
                self.memory.set_u16(addr, value)
            }
        }
    }

    /// Indirect reference semantics for opcodes that take a variable
    /// *number* (`load`, `store`, `inc`, `dec`, `pull`...): variable 0
    /// touches the stack top in place instead of push/pop.
    pub(crate) fn read_variable_indirect(&mut self, var: u8) -> Result<u16, VmFailure> {
        match var {
            0 => self.stack.peek(),
            _ => self.read_variable(var),
        }
    }

    pub(crate) fn write_variable_indirect(&mut self, var: u8, value: u16) -> Result<(), VmFailure> {
        match var {
            0 => self.stack.replace_top(value),
            _ => self.write_variable(var, value),
        }
    }

    fn global_addr(&self, var: u8) -> usize {
        self.header.global_variables + (var as usize - 16) * 2
    }

    // ---- post-argument helpers ----

    /// Consume the store byte and write the result through it.
    pub(crate) fn store(&mut self, value: u16) -> Result<(), VmFailure> {
        let var = self.next_byte()?;
        self.write_variable(var, value)
    }

    /// Consume branch info and apply it. Offsets 0 and 1 return from the
    /// current routine instead of adjusting the PC.
    pub(crate) fn branch(&mut self, condition: bool) -> Result<(), VmFailure> {
        let info = self.next_byte()?;
        let offset: i32 = if info & 0x40 != 0 {
            (info & 0x3F) as i32
        } else {
            let second = self.next_byte()?;
            let raw = ((info & 0x3F) as u16) << 8 | second as u16;
            // 14-bit two's complement.
            if raw & 0x2000 != 0 {
                (raw | 0xC000) as i16 as i32
            } else {
                raw as i32
            }
        };
        let branch_on_true = info & 0x80 != 0;
        if branch_on_true != condition {
            return Ok(());
        }
        match offset {
            0 => self.return_value(0),
            1 => self.return_value(1),
            _ => {
                let target = self.pc as i64 + offset as i64 - 2;
                if target < 0 {
                    return Err(VmFailure::MemoryOutOfRange { addr: 0 });
                }
                self.pc = target as usize;
                trace!("branch to {:05x}", self.pc);
                Ok(())
            }
        }
    }

    /// Decode the Z-string at the PC and advance past it.
    pub(crate) fn inline_string(&mut self) -> Result<String, VmFailure> {
        let (text, end) = self.text.decode(&self.memory, self.pc)?;
        self.pc = end;
        Ok(text)
    }

    // ---- call & return ----

    /// The call family. `operands[0]` is the packed routine address, the
    /// rest are arguments. A packed address of 0 yields 0 immediately.
    pub(crate) fn op_call(&mut self, operands: &[u16], store_result: bool) -> Result<(), VmFailure> {
        let packed = match operands.first() {
            Some(p) => *p,
            None => {
                return Err(VmFailure::IllegalInstruction {
                    opcode: 0xE0,
                    extended: false,
                })
            }
        };
        if packed == 0 {
            if store_result {
                self.store(0)?;
            }
            return Ok(());
        }

        let addr = self.version.unpack(packed, PackedKind::Routine);
        let count = self.memory.get_byte(addr)? as usize;
        if count > MAX_LOCALS {
            return Err(VmFailure::BadLocal {
                index: count as u8,
                count: MAX_LOCALS as u8,
            });
        }

        let mut locals = [0u16; MAX_LOCALS];
        let mut code = addr + 1;
        if self.version.initialises_locals {
            for slot in locals.iter_mut().take(count) {
                *slot = self.memory.get_u16(code)?;
                code += 2;
            }
        }
        let args = &operands[1..];
        for (slot, arg) in locals.iter_mut().take(count).zip(args.iter()) {
            *slot = *arg;
        }

        debug!(
            "call {:#06x} with {} args into {} locals",
            addr,
            args.len(),
            count
        );
        // The return PC points at our own store byte; return_value
        // consumes it after the frame unwinds.
        self.stack
            .make_frame(self.pc, &locals[..count], args.len() as u8, store_result)?;
        self.pc = code;
        Ok(())
    }

    /// Pop the current frame and deliver `value` to the caller.
    pub(crate) fn return_value(&mut self, value: u16) -> Result<(), VmFailure> {
        let (return_pc, store_result) = self.stack.pop_frame()?;
        self.pc = return_pc;
        debug!("return {:#06x} to {:05x}", value, self.pc);
        if store_result {
            self.store(value)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_executing_for_test(&self, value: bool) {
        self.executing.store(value, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn set_pc_for_test(&mut self, pc: usize) {
        self.pc = pc;
    }
}

/// Indirect-reference opcodes name a variable in an operand; anything
/// past 255 cannot be one.
pub(crate) fn variable_number(value: u16) -> Result<u8, VmFailure> {
    if value > 0xFF {
        return Err(VmFailure::BadVariable { number: value });
    }
    Ok(value as u8)
}

/// Exactly one operand, or the instruction is malformed.
pub(crate) fn one(op: u8, operands: &[u16]) -> Result<u16, VmFailure> {
    operands
        .first()
        .copied()
        .ok_or(VmFailure::IllegalInstruction {
            opcode: op,
            extended: false,
        })
}

/// At least two operands, or the instruction is malformed.
pub(crate) fn two(op: u8, operands: &[u16]) -> Result<(u16, u16), VmFailure> {
    if operands.len() < 2 {
        return Err(VmFailure::IllegalInstruction {
            opcode: op,
            extended: false,
        });
    }
    Ok((operands[0], operands[1]))
}

/// At least three operands, or the instruction is malformed.
pub(crate) fn three(op: u8, operands: &[u16]) -> Result<(u16, u16, u16), VmFailure> {
    if operands.len() < 3 {
        return Err(VmFailure::IllegalInstruction {
            opcode: op,
            extended: false,
        });
    }
    Ok((operands[0], operands[1], operands[2]))
}
