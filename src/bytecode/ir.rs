use crate::bytecode::Op;
use serde::{Deserialize, Serialize};

/// Size in bytes of one VM word (`int`, any pointer, a stack slot).
pub const WORD_SIZE: i64 = 8;

/// Default capacity of the text (in words) and data (in bytes) segments.
pub const DEFAULT_POOL_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{segment} segment exhausted (capacity {capacity})")]
pub struct SegmentOverflow {
    pub segment: &'static str,
    pub capacity: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("cannot encode bytecode image: {0}")]
    Encode(#[source] postcard::Error),
    #[error("cannot decode bytecode image: {0}")]
    Decode(#[source] postcard::Error),
}

// =============================================================================
// Text segment
// =============================================================================

/// The bytecode store: an append-only vector of words with a fixed capacity.
#[derive(Debug, Clone)]
pub struct Text {
    words: Vec<i64>,
    capacity: usize,
    /// Position of the most recently emitted opcode word.
    last_op: Option<usize>,
}

impl Text {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: Vec::new(),
            capacity,
            last_op: None,
        }
    }

    /// Address the next emitted word will get.
    pub fn here(&self) -> usize {
        self.words.len()
    }

    pub fn words(&self) -> &[i64] {
        &self.words
    }

    fn push(&mut self, word: i64) -> Result<usize, SegmentOverflow> {
        if self.words.len() >= self.capacity {
            return Err(SegmentOverflow {
                segment: "text",
                capacity: self.capacity,
            });
        }
        self.words.push(word);
        Ok(self.words.len() - 1)
    }

    /// Emits an opcode without operand.
    pub fn op(&mut self, op: Op) -> Result<(), SegmentOverflow> {
        let at = self.push(op as i64)?;
        self.last_op = Some(at);
        Ok(())
    }

    /// Emits an opcode and its operand; returns the operand's address so a
    /// forward branch can be patched later.
    pub fn op_with(&mut self, op: Op, operand: i64) -> Result<usize, SegmentOverflow> {
        self.op(op)?;
        self.push(operand)
    }

    pub fn patch(&mut self, at: usize, value: i64) {
        self.words[at] = value;
    }

    /// The last emitted opcode, if nothing has been emitted after it.
    pub fn last_op(&self) -> Option<Op> {
        let at = self.last_op?;
        let op = Op::from_word(self.words[at])?;
        let end = at + if op.has_operand() { 2 } else { 1 };
        (end == self.words.len()).then_some(op)
    }

    /// Removes the trailing operand-less opcode returned by [`Text::last_op`].
    pub fn pop_op(&mut self) -> Option<Op> {
        let op = self.last_op()?;
        if op.has_operand() {
            return None;
        }
        self.words.pop();
        self.last_op = None;
        Some(op)
    }

    pub fn into_words(self) -> Vec<i64> {
        self.words
    }
}

// =============================================================================
// Data segment
// =============================================================================

/// String literal bytes and global variable slots.
///
/// The first word is reserved so that no object is ever placed at address 0.
#[derive(Debug, Clone)]
pub struct DataSegment {
    bytes: Vec<u8>,
    capacity: usize,
}

impl DataSegment {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0; WORD_SIZE as usize],
            capacity: capacity.max(WORD_SIZE as usize),
        }
    }

    pub fn here(&self) -> i64 {
        self.bytes.len() as i64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn push_byte(&mut self, b: u8) -> Result<(), SegmentOverflow> {
        if self.bytes.len() >= self.capacity {
            return Err(SegmentOverflow {
                segment: "data",
                capacity: self.capacity,
            });
        }
        self.bytes.push(b);
        Ok(())
    }

    /// Terminates the string being built with a NUL and pads to a word
    /// boundary so the next object starts aligned.
    pub fn finish_string(&mut self) -> Result<(), SegmentOverflow> {
        self.push_byte(0)?;
        while self.bytes.len() % WORD_SIZE as usize != 0 {
            self.push_byte(0)?;
        }
        Ok(())
    }

    /// Reserves one zeroed word and returns its address.
    pub fn alloc_word(&mut self) -> Result<i64, SegmentOverflow> {
        let at = self.here();
        for _ in 0..WORD_SIZE {
            self.push_byte(0)?;
        }
        Ok(at)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// =============================================================================
// Program image
// =============================================================================

/// A compiled program, ready for the VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Bytecode words.
    pub text: Vec<i64>,

    /// Initial contents of the data segment, loaded at address 0.
    pub data: Vec<u8>,

    /// Address of the start-up trampoline (`CALL main; PUSH; EXIT`).
    pub entry: usize,

    /// Address of `main`.
    pub main: usize,
}

impl Program {
    /// A program that starts executing at text address 0, with an empty
    /// data segment apart from the null word. Mostly for running hand-built
    /// bytecode.
    pub fn from_text(text: Vec<i64>) -> Self {
        Self {
            text,
            data: vec![0; WORD_SIZE as usize],
            entry: 0,
            main: 0,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        postcard::to_allocvec(self).map_err(ImageError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        postcard::from_bytes(bytes).map_err(ImageError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_emit_and_patch() {
        let mut text = Text::with_capacity(16);
        let hole = text.op_with(Op::Jz, 0).unwrap();
        text.op(Op::Push).unwrap();
        text.patch(hole, text.here() as i64);
        assert_eq!(text.words(), &[Op::Jz as i64, 3, Op::Push as i64]);
    }

    #[test]
    fn test_text_capacity_is_enforced() {
        let mut text = Text::with_capacity(3);
        text.op_with(Op::Imm, 1).unwrap();
        text.op(Op::Push).unwrap();
        let err = text.op(Op::Push).unwrap_err();
        assert_eq!(err.segment, "text");
    }

    #[test]
    fn test_last_op_ignores_operand_words() {
        let mut text = Text::with_capacity(16);
        // IMM 10: the operand equals the LC opcode but must not be mistaken for it
        text.op_with(Op::Imm, Op::Lc as i64).unwrap();
        assert_eq!(text.last_op(), Some(Op::Imm));
        assert_eq!(text.pop_op(), None);

        text.op(Op::Li).unwrap();
        assert_eq!(text.pop_op(), Some(Op::Li));
        assert_eq!(text.here(), 2);
        assert_eq!(text.last_op(), None);
    }

    #[test]
    fn test_data_reserves_null_word() {
        let mut data = DataSegment::with_capacity(64);
        assert_eq!(data.here(), WORD_SIZE);
        data.push_byte(b'h').unwrap();
        data.push_byte(b'i').unwrap();
        data.finish_string().unwrap();
        assert_eq!(data.here(), 2 * WORD_SIZE);
        let g = data.alloc_word().unwrap();
        assert_eq!(g, 2 * WORD_SIZE);
        assert_eq!(&data.bytes()[8..11], b"hi\0");
    }

    #[test]
    fn test_data_capacity_is_enforced() {
        let mut data = DataSegment::with_capacity(9);
        data.push_byte(1).unwrap();
        assert!(data.push_byte(2).is_err());
    }

    #[test]
    fn test_image_round_trip() {
        let program = Program {
            text: vec![Op::Imm as i64, -42, Op::Push as i64, Op::Exit as i64],
            data: b"\0\0\0\0\0\0\0\0abc\0".to_vec(),
            entry: 0,
            main: 0,
        };
        let bytes = program.to_bytes().unwrap();
        assert_eq!(Program::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn test_image_decode_error() {
        assert!(matches!(
            Program::from_bytes(&[0xff]),
            Err(ImageError::Decode(_))
        ));
    }
}
