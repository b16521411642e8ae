use thiserror::Error;

/// The single failure type of the VM core.
///
/// Every kind is fatal to the current `execute()` invocation: the loop
/// exits, state is left as-is, and the failure is surfaced to the caller.
/// The UI layer may choose to recover by restoring a snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmFailure {
    #[error("Stack overflow")]
    StackOverflow,

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Local variable {index} out of range (routine has {count} locals)")]
    BadLocal { index: u8, count: u8 },

    #[error("Invalid variable number: {number:#04x}")]
    BadVariable { number: u16 },

    #[error("Invalid object number: {number}")]
    BadObject { number: u16 },

    #[error("Invalid attribute number: {number}")]
    BadAttribute { number: u16 },

    #[error("Property {number} not found for object {object}")]
    BadProperty { object: u16, number: u8 },

    #[error("Property size is not 1 or 2 bytes")]
    PropertyWrongSize,

    #[error("Header violation: {0}")]
    HeaderViolation(String),

    #[error("Illegal instruction: opcode {opcode:#04x} (extended: {extended})")]
    IllegalInstruction { opcode: u8, extended: bool },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Return from top-level frame")]
    ReturnFromTop,

    #[error("Memory address out of range: {addr:#06x}")]
    MemoryOutOfRange { addr: usize },

    #[error("Attempt to write to static memory at {addr:#06x}")]
    WriteToStaticMemory { addr: usize },

    #[error("Snapshot does not match current dynamic memory layout")]
    SnapshotMismatch,

    #[error("Text encoding error: {0}")]
    EncodingError(String),

    #[error("Interpreter is already executing")]
    AlreadyExecuting,

    #[error("UI failure: {message}")]
    UiFailure { message: String },
}
