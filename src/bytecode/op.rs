use serde::{Deserialize, Serialize};

// =============================================================================
// OP - Bytecode instructions
// =============================================================================

/// One opcode word. The discriminant is the encoded value in the text
/// segment; operands, when present, occupy the following word.
///
/// Binary operators pop their left operand from the stack and combine it with
/// the accumulator (the right operand), leaving the result in the accumulator.
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    // data movement and control
    /// `LEA off`: ax = bp + off words.
    Lea = 0,
    /// `IMM v`: ax = v.
    Imm,
    /// `JMP addr`
    Jmp,
    /// `CALL addr`: push return address, jump.
    Call,
    /// `JZ addr`: jump when ax == 0.
    Jz,
    /// `JNZ addr`: jump when ax != 0.
    Jnz,
    /// `ENT n`: push bp, bp = sp, reserve n local words.
    Ent,
    /// `ADJ n`: drop n argument words.
    Adj,
    /// `LEV`: sp = bp, pop bp, pop pc.
    Lev,
    /// ax = word at address ax.
    Li,
    /// ax = byte at address ax.
    Lc,
    /// Pop address, store ax as a word.
    Si,
    /// Pop address, store low byte of ax.
    Sc,
    /// Push ax.
    Push,

    // binary operators
    Or,
    Xor,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // syscalls
    Open,
    Read,
    Clos,
    Prtf,
    Malc,
    Mset,
    Mcmp,
    Exit,
}

impl Op {
    pub const COUNT: usize = 38;

    const ALL: [Op; Op::COUNT] = [
        Op::Lea,
        Op::Imm,
        Op::Jmp,
        Op::Call,
        Op::Jz,
        Op::Jnz,
        Op::Ent,
        Op::Adj,
        Op::Lev,
        Op::Li,
        Op::Lc,
        Op::Si,
        Op::Sc,
        Op::Push,
        Op::Or,
        Op::Xor,
        Op::And,
        Op::Eq,
        Op::Ne,
        Op::Lt,
        Op::Gt,
        Op::Le,
        Op::Ge,
        Op::Shl,
        Op::Shr,
        Op::Add,
        Op::Sub,
        Op::Mul,
        Op::Div,
        Op::Mod,
        Op::Open,
        Op::Read,
        Op::Clos,
        Op::Prtf,
        Op::Malc,
        Op::Mset,
        Op::Mcmp,
        Op::Exit,
    ];

    /// Syscall opcodes in the order their names are seeded into the
    /// symbol table.
    pub const SYSCALLS: [Op; 8] = [
        Op::Open,
        Op::Read,
        Op::Clos,
        Op::Prtf,
        Op::Malc,
        Op::Mset,
        Op::Mcmp,
        Op::Exit,
    ];

    /// Decodes a text-segment word. `None` for anything outside the set.
    pub fn from_word(word: i64) -> Option<Op> {
        usize::try_from(word)
            .ok()
            .and_then(|i| Op::ALL.get(i))
            .copied()
    }

    /// Opcodes followed by an immediate operand word.
    pub fn has_operand(self) -> bool {
        matches!(
            self,
            Op::Lea | Op::Imm | Op::Jmp | Op::Call | Op::Jz | Op::Jnz | Op::Ent | Op::Adj
        )
    }

    /// Operand is a text address (shown as a jump target by the disassembler).
    pub fn is_branch(self) -> bool {
        matches!(self, Op::Jmp | Op::Call | Op::Jz | Op::Jnz)
    }

    pub fn is_syscall(self) -> bool {
        self as i64 >= Op::Open as i64
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Lea => "LEA",
            Op::Imm => "IMM",
            Op::Jmp => "JMP",
            Op::Call => "CALL",
            Op::Jz => "JZ",
            Op::Jnz => "JNZ",
            Op::Ent => "ENT",
            Op::Adj => "ADJ",
            Op::Lev => "LEV",
            Op::Li => "LI",
            Op::Lc => "LC",
            Op::Si => "SI",
            Op::Sc => "SC",
            Op::Push => "PUSH",
            Op::Or => "OR",
            Op::Xor => "XOR",
            Op::And => "AND",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::Lt => "LT",
            Op::Gt => "GT",
            Op::Le => "LE",
            Op::Ge => "GE",
            Op::Shl => "SHL",
            Op::Shr => "SHR",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Mod => "MOD",
            Op::Open => "OPEN",
            Op::Read => "READ",
            Op::Clos => "CLOS",
            Op::Prtf => "PRTF",
            Op::Malc => "MALC",
            Op::Mset => "MSET",
            Op::Mcmp => "MCMP",
            Op::Exit => "EXIT",
        }
    }

    /// Source-level name of a syscall opcode, empty for everything else.
    pub fn syscall_name(self) -> &'static str {
        match self {
            Op::Open => "open",
            Op::Read => "read",
            Op::Clos => "close",
            Op::Prtf => "printf",
            Op::Malc => "malloc",
            Op::Mset => "memset",
            Op::Mcmp => "memcmp",
            Op::Exit => "exit",
            _ => "",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.mnemonic())
    }
}
