pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;

pub use compile::{Compiler, CompilerConfig, compile};
pub use compile_error::CompileError;
pub use ir::{ImageError, Program, WORD_SIZE};
pub use op::Op;
