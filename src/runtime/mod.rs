pub mod memory;
pub mod printf;
pub mod runtime_error;
pub mod syscall;
pub mod vm;

pub use runtime_error::RuntimeError;
pub use vm::{Vm, VmConfig};
