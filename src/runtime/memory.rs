//! Byte-addressed VM memory.
//!
//! ```text
//! 0          data_end   heap_end                top
//! | data segment | heap ->  |  <- stack             |
//! ```
//!
//! The first word of the data segment is the null word; every access that
//! touches it faults, as does anything past the top.

use crate::bytecode::ir::WORD_SIZE;

/// An access outside usable memory; the VM attaches the faulting pc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadAddress(pub i64);

#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
    heap_start: i64,
    heap_end: i64,
}

fn align_up(n: usize) -> usize {
    let w = WORD_SIZE as usize;
    n.div_ceil(w) * w
}

impl Memory {
    /// Lays out `data` at address 0, followed by `heap_size` bytes of heap
    /// and `stack_size` bytes of stack. Sizes are rounded up to whole words.
    pub fn new(data: &[u8], heap_size: usize, stack_size: usize) -> Self {
        let data_end = align_up(data.len().max(WORD_SIZE as usize));
        let heap_end = data_end + align_up(heap_size);
        let top = heap_end + align_up(stack_size);

        let mut bytes = vec![0; top];
        bytes[..data.len()].copy_from_slice(data);

        Self {
            bytes,
            heap_start: data_end as i64,
            heap_end: heap_end as i64,
        }
    }

    /// One past the highest address; the initial stack pointer.
    pub fn top(&self) -> i64 {
        self.bytes.len() as i64
    }

    pub fn heap_start(&self) -> i64 {
        self.heap_start
    }

    /// Lowest address the stack may grow down to.
    pub fn heap_end(&self) -> i64 {
        self.heap_end
    }

    fn range(&self, addr: i64, len: i64) -> Result<std::ops::Range<usize>, BadAddress> {
        if len == 0 {
            return Ok(0..0);
        }
        let end = addr.checked_add(len).ok_or(BadAddress(addr))?;
        if addr < WORD_SIZE || len < 0 || end > self.top() {
            return Err(BadAddress(addr));
        }
        Ok(addr as usize..end as usize)
    }

    pub fn read_word(&self, addr: i64) -> Result<i64, BadAddress> {
        let r = self.range(addr, WORD_SIZE)?;
        let mut word = [0u8; WORD_SIZE as usize];
        word.copy_from_slice(&self.bytes[r]);
        Ok(i64::from_le_bytes(word))
    }

    pub fn write_word(&mut self, addr: i64, value: i64) -> Result<(), BadAddress> {
        let r = self.range(addr, WORD_SIZE)?;
        self.bytes[r].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Loads a `char`, sign-extended.
    pub fn read_byte(&self, addr: i64) -> Result<i64, BadAddress> {
        let r = self.range(addr, 1)?;
        Ok(self.bytes[r.start] as i8 as i64)
    }

    pub fn write_byte(&mut self, addr: i64, value: i64) -> Result<(), BadAddress> {
        let r = self.range(addr, 1)?;
        self.bytes[r.start] = value as u8;
        Ok(())
    }

    pub fn slice(&self, addr: i64, len: i64) -> Result<&[u8], BadAddress> {
        let r = self.range(addr, len)?;
        Ok(&self.bytes[r])
    }

    pub fn slice_mut(&mut self, addr: i64, len: i64) -> Result<&mut [u8], BadAddress> {
        let r = self.range(addr, len)?;
        Ok(&mut self.bytes[r])
    }

    /// The NUL-terminated string at `addr`, without its terminator.
    pub fn c_string(&self, addr: i64) -> Result<&[u8], BadAddress> {
        let start = self.range(addr, 1)?.start;
        let len = self.bytes[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(BadAddress(self.top()))?;
        Ok(&self.bytes[start..start + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_layout() {
        let m = Memory::new(&[0; 13], 100, 64);
        assert_eq!(m.heap_start(), 16);
        assert_eq!(m.heap_end(), 16 + 104);
        assert_eq!(m.top(), 16 + 104 + 64);
    }

    #[test]
    fn test_word_and_byte_access() {
        let mut m = Memory::new(&[0; 8], 64, 64);
        m.write_word(16, -2).unwrap();
        assert_eq!(m.read_word(16).unwrap(), -2);
        assert_eq!(m.read_byte(16).unwrap(), -2);
        m.write_byte(17, 0x1ff).unwrap();
        assert_eq!(m.slice(16, 2).unwrap(), &[0xfe, 0xff]);
    }

    #[test]
    fn test_null_word_and_top_fault() {
        let mut m = Memory::new(&[0; 8], 0, 16);
        assert_eq!(m.read_word(0), Err(BadAddress(0)));
        assert_eq!(m.read_byte(7), Err(BadAddress(7)));
        assert_eq!(m.read_word(m.top() - 4), Err(BadAddress(m.top() - 4)));
        assert!(m.write_word(m.top() - 8, 1).is_ok());
        assert_eq!(m.slice(-8, 4), Err(BadAddress(-8)));
        assert_eq!(m.slice(8, -1), Err(BadAddress(8)));
    }

    #[test]
    fn test_c_string() {
        let mut data = vec![0; 8];
        data.extend_from_slice(b"hello\0");
        let m = Memory::new(&data, 0, 8);
        assert_eq!(m.c_string(8).unwrap(), b"hello");
        assert_eq!(m.c_string(10).unwrap(), b"llo");
    }
}
