//! The eight host calls reachable from compiled code.
//!
//! Arguments are read off the stack with the last-pushed one at `sp`. A host
//! failure (missing file, exhausted heap) is reported to the program as `-1`
//! or `0` in `ax`; only bad VM addresses are runtime errors.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

use tracing::debug;

use crate::bytecode::ir::WORD_SIZE;
use crate::bytecode::op::Op;
use crate::runtime::printf;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm::Vm;

/// Most values `printf` takes after its format string.
pub const PRINTF_MAX_ARGS: i64 = 5;

// open(2) flag bits understood by `open`
const O_ACCMODE: i64 = 0o3;
const O_WRONLY: i64 = 0o1;
const O_RDWR: i64 = 0o2;
const O_CREAT: i64 = 0o100;
const O_TRUNC: i64 = 0o1000;
const O_APPEND: i64 = 0o2000;

// =============================================================================
// Heap
// =============================================================================

/// Bump allocator over the heap region. Memory is never freed.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    next: i64,
    end: i64,
}

impl Heap {
    pub fn new(start: i64, end: i64) -> Self {
        Self { next: start, end }
    }

    /// Word-aligned block of at least `size` bytes, or 0 when the heap is
    /// exhausted or `size` is negative.
    pub fn alloc(&mut self, size: i64) -> i64 {
        if size < 0 {
            return 0;
        }
        let Some(padded) = size.max(1).checked_add(WORD_SIZE - 1) else {
            return 0;
        };
        let rounded = padded / WORD_SIZE * WORD_SIZE;
        if rounded > self.end - self.next {
            return 0;
        }
        let addr = self.next;
        self.next += rounded;
        addr
    }
}

// =============================================================================
// Files
// =============================================================================

/// Open files by descriptor. 0 reads the host's stdin; opened files start
/// at 3.
#[derive(Debug)]
pub struct FileTable {
    open: HashMap<i64, File>,
    next_fd: i64,
}

impl Default for FileTable {
    fn default() -> Self {
        Self {
            open: HashMap::new(),
            next_fd: 3,
        }
    }
}

impl FileTable {
    pub fn open(&mut self, path: &str, flags: i64) -> i64 {
        let mut options = OpenOptions::new();
        match flags & O_ACCMODE {
            O_WRONLY => options.write(true),
            O_RDWR => options.read(true).write(true),
            _ => options.read(true),
        };
        if flags & O_ACCMODE != 0 {
            options
                .create(flags & O_CREAT != 0)
                .truncate(flags & O_TRUNC != 0)
                .append(flags & O_APPEND != 0);
        }

        match options.open(path) {
            Ok(file) => {
                let fd = self.next_fd;
                self.next_fd += 1;
                self.open.insert(fd, file);
                debug!(path, flags, fd, "open");
                fd
            }
            Err(e) => {
                debug!(path, flags, error = %e, "open failed");
                -1
            }
        }
    }

    pub fn read(&mut self, fd: i64, buf: &mut [u8]) -> i64 {
        let result = if fd == 0 {
            std::io::stdin().read(buf)
        } else {
            match self.open.get_mut(&fd) {
                Some(file) => file.read(buf),
                None => return -1,
            }
        };
        result.map(|n| n as i64).unwrap_or(-1)
    }

    pub fn close(&mut self, fd: i64) -> i64 {
        match self.open.remove(&fd) {
            Some(_) => 0,
            None => -1,
        }
    }

    pub fn close_all(&mut self) {
        self.open.clear();
    }
}

// =============================================================================
// Syscall dispatch
// =============================================================================

impl<W: Write> Vm<W> {
    /// `printf(fmt, ...)`. The argument count is the operand of the `ADJ`
    /// right after the `PRTF`.
    pub(super) fn printf(&mut self, text: &[i64]) -> Result<i64, RuntimeError> {
        let pc = self.op_pc;
        let after = pc + 1;
        let argc = match (text.get(after), text.get(after + 1)) {
            (Some(&adj), Some(&n)) if adj == Op::Adj as i64 => n,
            _ => return Err(RuntimeError::MissingArgCount { pc }),
        };
        if argc < 1 {
            return Ok(0);
        }

        let fmt_addr = self.arg(argc - 1)?;
        let values = (argc - 1).min(PRINTF_MAX_ARGS);
        let args = (0..values)
            .map(|k| self.arg(argc - 2 - k))
            .collect::<Result<Vec<i64>, RuntimeError>>()?;

        let memory = &self.memory;
        let fault = |addr: i64| RuntimeError::MemoryFault { addr, pc };
        let fmt = memory.c_string(fmt_addr).map_err(|e| fault(e.0))?;
        let bytes = printf::format(fmt, &args, |addr| {
            memory
                .c_string(addr)
                .map(<[u8]>::to_vec)
                .map_err(|e| fault(e.0))
        })?;

        self.out
            .write_all(&bytes)
            .map_err(|e| RuntimeError::Output {
                message: e.to_string(),
            })?;
        Ok(bytes.len() as i64)
    }

    /// Every syscall except `printf` and `exit`; returns the new `ax`.
    pub(super) fn syscall(&mut self, op: Op) -> Result<i64, RuntimeError> {
        match op {
            Op::Open => {
                let path_addr = self.arg(1)?;
                let flags = self.arg(0)?;
                let path = self
                    .memory
                    .c_string(path_addr)
                    .map_err(|e| self.fault(e))?;
                let path = String::from_utf8_lossy(path).into_owned();
                Ok(self.files.open(&path, flags))
            }
            Op::Read => {
                let fd = self.arg(2)?;
                let buf = self.arg(1)?;
                let n = self.arg(0)?;
                if n < 0 {
                    return Ok(-1);
                }
                let pc = self.op_pc;
                let slice = self
                    .memory
                    .slice_mut(buf, n)
                    .map_err(|e| RuntimeError::MemoryFault { addr: e.0, pc })?;
                Ok(self.files.read(fd, slice))
            }
            Op::Clos => {
                let fd = self.arg(0)?;
                Ok(self.files.close(fd))
            }
            Op::Malc => {
                let size = self.arg(0)?;
                Ok(self.heap.alloc(size))
            }
            Op::Mset => {
                let ptr = self.arg(2)?;
                let value = self.arg(1)?;
                let n = self.arg(0)?;
                let pc = self.op_pc;
                self.memory
                    .slice_mut(ptr, n)
                    .map_err(|e| RuntimeError::MemoryFault { addr: e.0, pc })?
                    .fill(value as u8);
                Ok(ptr)
            }
            Op::Mcmp => {
                let a = self.arg(2)?;
                let b = self.arg(1)?;
                let n = self.arg(0)?;
                let left = self.memory.slice(a, n).map_err(|e| self.fault(e))?;
                let right = self.memory.slice(b, n).map_err(|e| self.fault(e))?;
                Ok(left
                    .iter()
                    .zip(right)
                    .find(|(x, y)| x != y)
                    .map(|(&x, &y)| x as i64 - y as i64)
                    .unwrap_or(0))
            }
            _ => Err(RuntimeError::UnknownInstruction {
                op: op as i64,
                pc: self.op_pc,
            }),
        }
    }
}
