//! A compiler and virtual machine for a small subset of C.
//!
//! Source is compiled in a single pass straight to bytecode (no syntax tree)
//! and then run on a stack-based VM with a handful of host calls.
//!
//! ```no_run
//! let program = pcc::compile("int main() { printf(\"hi\\n\"); return 0; }").unwrap();
//! let mut vm = pcc::Vm::new(pcc::VmConfig::default());
//! let code = vm.run(&program).unwrap();
//! assert_eq!(code, 0);
//! ```

pub mod bytecode;
pub mod frontend;
pub mod runtime;

pub use bytecode::{CompileError, Compiler, CompilerConfig, ImageError, Program, compile};
pub use runtime::{RuntimeError, Vm, VmConfig};
