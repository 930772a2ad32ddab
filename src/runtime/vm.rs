use std::io::{Stdout, Write};

use tracing::{info, trace};

use crate::bytecode::ir::{DEFAULT_POOL_SIZE, Program, WORD_SIZE};
use crate::bytecode::op::Op;
use crate::runtime::memory::{BadAddress, Memory};
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::syscall::{FileTable, Heap};

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Bytes reserved for the stack.
    pub stack_size: usize,
    /// Bytes available to `malloc`.
    pub heap_size: usize,
    /// Stop with [`RuntimeError::CycleLimit`] after this many instructions.
    pub max_cycles: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: DEFAULT_POOL_SIZE,
            heap_size: DEFAULT_POOL_SIZE,
            max_cycles: None,
        }
    }
}

/// Accumulator machine with a downward-growing stack.
///
/// Binary operators pop their left operand from the stack and combine it
/// with `ax`; every result lands in `ax`. `printf` output goes to `W`.
pub struct Vm<W: Write = Stdout> {
    config: VmConfig,
    pub(super) out: W,

    // Registers
    pc: usize,
    pub(super) sp: i64,
    bp: i64,
    pub(super) ax: i64,
    cycle: u64,

    /// Address of the instruction being executed, for error reports.
    pub(super) op_pc: usize,

    pub(super) memory: Memory,
    pub(super) heap: Heap,
    pub(super) files: FileTable,
}

impl Vm<Stdout> {
    pub fn new(config: VmConfig) -> Self {
        Self::with_output(config, std::io::stdout())
    }
}

impl<W: Write> Vm<W> {
    pub fn with_output(config: VmConfig, out: W) -> Self {
        Self {
            config,
            out,
            pc: 0,
            sp: 0,
            bp: 0,
            ax: 0,
            cycle: 0,
            op_pc: 0,
            memory: Memory::new(&[], 0, 0),
            heap: Heap::default(),
            files: FileTable::default(),
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Instructions executed by the last run.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn ax(&self) -> i64 {
        self.ax
    }

    /// Loads `program` into fresh memory and runs it from its entry point.
    /// Returns the exit code passed to `exit` (or returned from `main`).
    pub fn run(&mut self, program: &Program) -> Result<i64, RuntimeError> {
        self.reset(program);
        let result = self.exec(&program.text);
        self.out.flush().map_err(|e| RuntimeError::Output {
            message: e.to_string(),
        })?;
        self.files.close_all();

        match &result {
            Ok(code) => info!(code, cycles = self.cycle, "program exited"),
            Err(e) => info!(error = %e, cycles = self.cycle, "program aborted"),
        }
        result
    }

    fn reset(&mut self, program: &Program) {
        self.memory = Memory::new(
            &program.data,
            self.config.heap_size,
            self.config.stack_size,
        );
        self.heap = Heap::new(self.memory.heap_start(), self.memory.heap_end());
        self.files = FileTable::default();
        self.pc = program.entry;
        self.op_pc = program.entry;
        self.sp = self.memory.top();
        self.bp = self.sp;
        self.ax = 0;
        self.cycle = 0;
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    pub(super) fn fault(&self, e: BadAddress) -> RuntimeError {
        RuntimeError::MemoryFault {
            addr: e.0,
            pc: self.op_pc,
        }
    }

    pub(super) fn read_word(&self, addr: i64) -> Result<i64, RuntimeError> {
        self.memory.read_word(addr).map_err(|e| self.fault(e))
    }

    fn write_word(&mut self, addr: i64, value: i64) -> Result<(), RuntimeError> {
        self.memory
            .write_word(addr, value)
            .map_err(|e| self.fault(e))
    }

    /// Moves `sp` down by `words` words, checking the stack limit.
    fn grow_stack(&mut self, words: i64) -> Result<(), RuntimeError> {
        let sp = self.sp.wrapping_sub(words.wrapping_mul(WORD_SIZE));
        if sp < self.memory.heap_end() {
            return Err(RuntimeError::StackOverflow {
                pc: self.op_pc,
                size: self.config.stack_size,
            });
        }
        self.sp = sp;
        Ok(())
    }

    fn push(&mut self, value: i64) -> Result<(), RuntimeError> {
        self.grow_stack(1)?;
        self.write_word(self.sp, value)
    }

    fn pop(&mut self) -> Result<i64, RuntimeError> {
        let value = self.read_word(self.sp)?;
        self.sp = self.sp.wrapping_add(WORD_SIZE);
        Ok(value)
    }

    /// Stack argument `n` of a syscall, `0` being the last one pushed.
    pub(super) fn arg(&self, n: i64) -> Result<i64, RuntimeError> {
        self.read_word(self.sp.wrapping_add(n.wrapping_mul(WORD_SIZE)))
    }

    fn jump(&mut self, target: i64, text_len: usize) -> Result<(), RuntimeError> {
        match usize::try_from(target) {
            Ok(pc) if pc < text_len => {
                self.pc = pc;
                Ok(())
            }
            _ => Err(RuntimeError::PcOutOfRange {
                target,
                pc: self.op_pc,
            }),
        }
    }

    fn fetch(&mut self, text: &[i64]) -> Result<i64, RuntimeError> {
        let word = *text.get(self.pc).ok_or(RuntimeError::PcOutOfRange {
            target: self.pc as i64,
            pc: self.op_pc,
        })?;
        self.pc += 1;
        Ok(word)
    }

    // =========================================================================
    // Execution
    // =========================================================================

    fn exec(&mut self, text: &[i64]) -> Result<i64, RuntimeError> {
        loop {
            self.cycle += 1;
            if let Some(limit) = self.config.max_cycles {
                if self.cycle > limit {
                    return Err(RuntimeError::CycleLimit { limit });
                }
            }

            self.op_pc = self.pc;
            let word = self.fetch(text)?;
            let op = Op::from_word(word).ok_or(RuntimeError::UnknownInstruction {
                op: word,
                pc: self.op_pc,
            })?;
            let operand = if op.has_operand() {
                self.fetch(text)?
            } else {
                0
            };

            if op.has_operand() {
                trace!(cycle = self.cycle, pc = self.op_pc, op = %op, operand, ax = self.ax, sp = self.sp);
            } else {
                trace!(cycle = self.cycle, pc = self.op_pc, op = %op, ax = self.ax, sp = self.sp);
            }

            match op {
                // Addressing and control
                Op::Lea => self.ax = self.bp.wrapping_add(operand.wrapping_mul(WORD_SIZE)),
                Op::Imm => self.ax = operand,
                Op::Jmp => self.jump(operand, text.len())?,
                Op::Call => {
                    self.push(self.pc as i64)?;
                    self.jump(operand, text.len())?;
                }
                Op::Jz => {
                    if self.ax == 0 {
                        self.jump(operand, text.len())?;
                    }
                }
                Op::Jnz => {
                    if self.ax != 0 {
                        self.jump(operand, text.len())?;
                    }
                }
                Op::Ent => {
                    self.push(self.bp)?;
                    self.bp = self.sp;
                    self.grow_stack(operand)?;
                }
                Op::Adj => self.sp = self.sp.wrapping_add(operand.wrapping_mul(WORD_SIZE)),
                Op::Lev => {
                    self.sp = self.bp;
                    self.bp = self.pop()?;
                    let ret = self.pop()?;
                    self.jump(ret, text.len())?;
                }

                // Loads and stores
                Op::Li => self.ax = self.read_word(self.ax)?,
                Op::Lc => {
                    self.ax = self.memory.read_byte(self.ax).map_err(|e| self.fault(e))?;
                }
                Op::Si => {
                    let addr = self.pop()?;
                    self.write_word(addr, self.ax)?;
                }
                Op::Sc => {
                    let addr = self.pop()?;
                    self.memory
                        .write_byte(addr, self.ax)
                        .map_err(|e| self.fault(e))?;
                    // the stored value is what a char load would give back
                    self.ax = self.ax as i8 as i64;
                }
                Op::Push => self.push(self.ax)?,

                // Arithmetic: left operand on the stack, right in ax
                Op::Or => self.ax = self.pop()? | self.ax,
                Op::Xor => self.ax = self.pop()? ^ self.ax,
                Op::And => self.ax = self.pop()? & self.ax,
                Op::Eq => self.ax = (self.pop()? == self.ax) as i64,
                Op::Ne => self.ax = (self.pop()? != self.ax) as i64,
                Op::Lt => self.ax = (self.pop()? < self.ax) as i64,
                Op::Gt => self.ax = (self.pop()? > self.ax) as i64,
                Op::Le => self.ax = (self.pop()? <= self.ax) as i64,
                Op::Ge => self.ax = (self.pop()? >= self.ax) as i64,
                Op::Shl => self.ax = self.pop()?.wrapping_shl(self.ax as u32),
                Op::Shr => self.ax = self.pop()?.wrapping_shr(self.ax as u32),
                Op::Add => self.ax = self.pop()?.wrapping_add(self.ax),
                Op::Sub => self.ax = self.pop()?.wrapping_sub(self.ax),
                Op::Mul => self.ax = self.pop()?.wrapping_mul(self.ax),
                Op::Div | Op::Mod => {
                    let left = self.pop()?;
                    if self.ax == 0 {
                        return Err(RuntimeError::DivisionByZero { pc: self.op_pc });
                    }
                    self.ax = if op == Op::Div {
                        left.wrapping_div(self.ax)
                    } else {
                        left.wrapping_rem(self.ax)
                    };
                }

                // Host calls
                Op::Exit => {
                    return self.arg(0);
                }
                Op::Prtf => self.ax = self.printf(text)?,
                Op::Open | Op::Read | Op::Clos | Op::Malc | Op::Mset | Op::Mcmp => {
                    self.ax = self.syscall(op)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use Op::*;

    fn program(code: &[(Op, Option<i64>)]) -> Program {
        let text = code
            .iter()
            .flat_map(|&(op, operand)| std::iter::once(op as i64).chain(operand))
            .collect();
        Program::from_text(text)
    }

    fn i(op: Op) -> (Op, Option<i64>) {
        (op, None)
    }

    fn w(op: Op, operand: i64) -> (Op, Option<i64>) {
        (op, Some(operand))
    }

    fn small() -> VmConfig {
        VmConfig {
            stack_size: 4096,
            heap_size: 4096,
            max_cycles: Some(100_000),
        }
    }

    fn run_ops(code: &[(Op, Option<i64>)]) -> Result<i64, RuntimeError> {
        let mut vm = Vm::with_output(small(), Vec::new());
        vm.run(&program(code))
    }

    fn assert_exit(code: &[(Op, Option<i64>)], expected: i64) {
        match run_ops(code) {
            Ok(v) => assert_eq!(v, expected),
            Err(e) => panic!("unexpected runtime error: {}", e),
        }
    }

    /// `left <op> right` through the accumulator.
    fn binop(op: Op, left: i64, right: i64) -> Result<i64, RuntimeError> {
        run_ops(&[
            w(Imm, left),
            i(Push),
            w(Imm, right),
            i(op),
            i(Push),
            i(Exit),
        ])
    }

    #[test]
    fn test_exit_returns_top_of_stack() {
        assert_exit(&[w(Imm, 7), i(Push), i(Exit)], 7);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(binop(Add, 2, 3), Ok(5));
        assert_eq!(binop(Sub, 2, 3), Ok(-1));
        assert_eq!(binop(Mul, -4, 3), Ok(-12));
        assert_eq!(binop(Div, 7, 2), Ok(3));
        assert_eq!(binop(Div, -7, 2), Ok(-3));
        assert_eq!(binop(Mod, -7, 2), Ok(-1));
        assert_eq!(binop(Add, i64::MAX, 1), Ok(i64::MIN));
        assert_eq!(binop(Div, i64::MIN, -1), Ok(i64::MIN));
    }

    #[test]
    fn test_bitwise_and_shifts() {
        assert_eq!(binop(Or, 0b1100, 0b1010), Ok(0b1110));
        assert_eq!(binop(Xor, 0b1100, 0b1010), Ok(0b0110));
        assert_eq!(binop(And, 0b1100, 0b1010), Ok(0b1000));
        assert_eq!(binop(Shl, 1, 4), Ok(16));
        assert_eq!(binop(Shr, -16, 2), Ok(-4));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(binop(Eq, 3, 3), Ok(1));
        assert_eq!(binop(Ne, 3, 3), Ok(0));
        assert_eq!(binop(Lt, -1, 0), Ok(1));
        assert_eq!(binop(Gt, -1, 0), Ok(0));
        assert_eq!(binop(Le, 2, 2), Ok(1));
        assert_eq!(binop(Ge, 1, 2), Ok(0));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(binop(Div, 1, 0), Err(RuntimeError::DivisionByZero { pc: 5 }));
        assert_eq!(binop(Mod, 1, 0), Err(RuntimeError::DivisionByZero { pc: 5 }));
    }

    #[test]
    fn test_unknown_instruction_halts() {
        // the IMM after the bad word never runs
        let mut vm = Vm::with_output(small(), Vec::new());
        let p = Program::from_text(vec![Imm as i64, 5, 99, Imm as i64, 6, Push as i64, Exit as i64]);
        assert_eq!(
            vm.run(&p),
            Err(RuntimeError::UnknownInstruction { op: 99, pc: 2 })
        );
        assert_eq!(vm.ax(), 5);
        assert_eq!(vm.cycles(), 2);
    }

    #[test]
    fn test_jumps() {
        // 0: IMM 0 | 2: JZ 7 | 4: IMM 1 | 6: EXIT... | 7: IMM 2 | 9: PUSH | 10: EXIT
        let p = Program::from_text(vec![
            Imm as i64, 0, Jz as i64, 7, Imm as i64, 1, Exit as i64, Imm as i64, 2, Push as i64,
            Exit as i64,
        ]);
        let mut vm = Vm::with_output(small(), Vec::new());
        assert_eq!(vm.run(&p), Ok(2));
    }

    #[test]
    fn test_jump_outside_text() {
        assert_eq!(
            run_ops(&[w(Jmp, 1000)]),
            Err(RuntimeError::PcOutOfRange { target: 1000, pc: 0 })
        );
        // running off the end
        assert_eq!(
            run_ops(&[w(Imm, 1)]),
            Err(RuntimeError::PcOutOfRange { target: 2, pc: 2 })
        );
    }

    #[test]
    fn test_call_frame_and_locals() {
        crate::test_utils::init_test_logging();
        // f(a) { int local; local = 40; return a + local; }  called as f(30)
        let text = vec![
            Imm as i64, 30, // 0
            Push as i64,    // 2
            Call as i64, 9, // 3
            Adj as i64, 1,  // 5
            Push as i64,    // 7
            Exit as i64,    // 8
            Ent as i64, 1,  // 9  f
            Lea as i64, -1, // 11 &local
            Push as i64,    // 13
            Imm as i64, 40, // 14
            Si as i64,      // 16
            Lea as i64, 2,  // 17 &a
            Li as i64,      // 19
            Push as i64,    // 20
            Lea as i64, -1, // 21
            Li as i64,      // 23
            Add as i64,     // 24
            Lev as i64,     // 25
        ];
        let mut vm = Vm::with_output(small(), Vec::new());
        assert_eq!(vm.run(&Program::from_text(text)), Ok(70));
    }

    #[test]
    fn test_char_store_truncates_and_sign_extends() {
        // global word at data address 8
        let mut p = program(&[
            w(Imm, 8),
            i(Push),
            w(Imm, 0x1ff),
            i(Sc),
            w(Imm, 8),
            i(Lc),
            i(Push),
            i(Exit),
        ]);
        p.data = vec![0; 16];
        let mut vm = Vm::with_output(small(), Vec::new());
        assert_eq!(vm.run(&p), Ok(-1));
    }

    #[test]
    fn test_null_load_faults() {
        assert_eq!(
            run_ops(&[w(Imm, 0), i(Li)]),
            Err(RuntimeError::MemoryFault { addr: 0, pc: 2 })
        );
    }

    #[test]
    fn test_stack_overflow() {
        // unbounded recursion: f() { f(); }
        let p = Program::from_text(vec![Ent as i64, 0, Call as i64, 0]);
        let mut vm = Vm::with_output(small(), Vec::new());
        assert!(matches!(vm.run(&p), Err(RuntimeError::StackOverflow { .. })));
    }

    #[test]
    fn test_cycle_limit() {
        let p = Program::from_text(vec![Jmp as i64, 0]);
        let mut vm = Vm::with_output(
            VmConfig {
                max_cycles: Some(50),
                ..small()
            },
            Vec::new(),
        );
        assert_eq!(vm.run(&p), Err(RuntimeError::CycleLimit { limit: 50 }));
        assert_eq!(vm.cycles(), 51);
    }
}
