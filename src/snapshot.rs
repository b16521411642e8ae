use crate::error::VmFailure;
use crate::memory::MemoryBuffer;
use crate::zstack::{ZStack, STACK_CELLS};

/// A frozen copy of everything the story can mutate: the dynamic memory
/// prefix, the live stack cells, and the frame bookkeeping.
///
/// Construction always copies; a snapshot never aliases live state, so
/// restoring one cannot be corrupted by later execution. Memory beyond
/// the dynamic limit is immutable after load and deliberately excluded.
#[derive(Clone)]
pub struct Snapshot {
    memory: Vec<u8>,
    stack: Vec<u16>,
    frame_ptr: usize,
    frame_count: usize,
}

impl Snapshot {
    pub fn capture(memory: &MemoryBuffer, stack: &ZStack) -> Snapshot {
        Snapshot {
            memory: memory.raw()[..memory.dynamic_limit()].to_vec(),
            stack: stack.contents().to_vec(),
            frame_ptr: stack.frame_ptr(),
            frame_count: stack.frame_count(),
        }
    }

    /// Write the snapshot back over live state. Fails without touching
    /// anything when the dynamic layout does not line up.
    pub fn restore(&self, memory: &mut MemoryBuffer, stack: &mut ZStack) -> Result<(), VmFailure> {
        if self.memory.len() != memory.dynamic_limit() {
            return Err(VmFailure::SnapshotMismatch);
        }
        if self.stack.len() > STACK_CELLS || self.frame_ptr > self.stack.len() {
            return Err(VmFailure::SnapshotMismatch);
        }
        memory.restore_prefix(&self.memory);
        stack.restore(&self.stack, self.frame_ptr, self.frame_count);
        Ok(())
    }

    pub fn dynamic_len(&self) -> usize {
        self.memory.len()
    }
}
