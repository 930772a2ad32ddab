/// A fatal VM error. Execution stops at the first one.
///
/// `pc` is always the text address of the instruction that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("unknown instruction {op} at pc {pc:04}")]
    UnknownInstruction { op: i64, pc: usize },

    #[error("jump to {target} outside the text segment at pc {pc:04}")]
    PcOutOfRange { target: i64, pc: usize },

    #[error("memory fault at address {addr:#x} (pc {pc:04})")]
    MemoryFault { addr: i64, pc: usize },

    #[error("division by zero at pc {pc:04}")]
    DivisionByZero { pc: usize },

    #[error("stack overflow at pc {pc:04} (stack size {size})")]
    StackOverflow { pc: usize, size: usize },

    #[error("cycle limit exceeded ({limit})")]
    CycleLimit { limit: u64 },

    /// `printf` was not followed by the `ADJ` that carries its argument count
    #[error("printf at pc {pc:04} is not followed by ADJ")]
    MissingArgCount { pc: usize },

    #[error("output error: {message}")]
    Output { message: String },
}

impl RuntimeError {
    /// Process exit status the CLI uses for a program that died with this
    /// error.
    pub const EXIT_STATUS: i32 = -1;
}
