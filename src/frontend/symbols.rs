//! Interned identifiers and their current bindings.
//!
//! There is exactly one table for the whole translation unit. A local or
//! parameter hides a global of the same name by saving the global binding
//! into the identifier's `shadow` slot; [`SymbolTable::restore_locals`] puts
//! every hidden binding back when a function body ends.

use crate::bytecode::op::Op;
use crate::bytecode::ir::WORD_SIZE;
use crate::frontend::token::Keyword;

/// Index of an identifier in the table. Stable for the life of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Char,
    Int,
}

/// Base type plus pointer depth. `depth == 0` is a plain value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ty {
    pub base: BaseType,
    pub depth: u32,
}

impl Ty {
    pub const CHAR: Ty = Ty {
        base: BaseType::Char,
        depth: 0,
    };
    pub const INT: Ty = Ty {
        base: BaseType::Int,
        depth: 0,
    };

    pub fn pointer_to(self) -> Ty {
        Ty {
            depth: self.depth + 1,
            ..self
        }
    }

    /// The pointee type, or `None` when this is not a pointer.
    pub fn deref(self) -> Option<Ty> {
        match self.depth {
            0 => None,
            d => Some(Ty {
                depth: d - 1,
                ..self
            }),
        }
    }

    pub fn is_pointer(self) -> bool {
        self.depth > 0
    }

    pub fn is_char(self) -> bool {
        self == Ty::CHAR
    }

    /// Storage size in bytes: 1 for `char`, a word for everything else.
    pub fn size(self) -> i64 {
        if self.is_char() { 1 } else { WORD_SIZE }
    }

    /// Bytes one step of pointer arithmetic moves. Only meaningful for
    /// pointers; plain values step by 1.
    pub fn stride(self) -> i64 {
        self.deref().map(Ty::size).unwrap_or(1)
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.base {
            BaseType::Char => write!(f, "char")?,
            BaseType::Int => write!(f, "int")?,
        }
        for _ in 0..self.depth {
            write!(f, "*")?;
        }
        Ok(())
    }
}

/// What an identifier currently denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unbound,
    Keyword(Keyword),
    EnumConstant,
    Function,
    Syscall,
    GlobalVar,
    LocalVar,
}

/// The mutable part of an identifier, saved and restored as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub role: Role,
    pub ty: Ty,
    pub value: i64,
}

#[derive(Debug, Clone)]
pub struct Identifier {
    pub name: String,
    pub hash: i64,
    pub role: Role,
    pub ty: Ty,
    /// Enum value, function address, syscall opcode, global address or
    /// local frame slot, depending on `role`.
    pub value: i64,
    /// Binding hidden by a local of the same name.
    pub shadow: Option<Binding>,
}

impl Identifier {
    pub fn binding(&self) -> Binding {
        Binding {
            role: self.role,
            ty: self.ty,
            value: self.value,
        }
    }

    fn set_binding(&mut self, b: Binding) {
        self.role = b.role;
        self.ty = b.ty;
        self.value = b.value;
    }
}

/// Rolling identifier hash, `hash * 147 + byte`, with wrapping arithmetic.
pub fn hash_name(bytes: &[u8]) -> i64 {
    bytes
        .iter()
        .fold(0i64, |h, &b| h.wrapping_mul(147).wrapping_add(b as i64))
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    ids: Vec<Identifier>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table seeded with the keywords, the syscall names and `main`.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        for (name, kw) in Keyword::ALL {
            let id = table.intern(name.as_bytes());
            table.get_mut(id).role = Role::Keyword(kw);
        }
        for op in Op::SYSCALLS {
            let id = table.intern(op.syscall_name().as_bytes());
            let ident = table.get_mut(id);
            ident.role = Role::Syscall;
            ident.ty = Ty::INT;
            ident.value = op as i64;
        }
        table.intern(b"main");
        table
    }

    /// Finds `name`, creating an `Unbound` identifier on a miss.
    ///
    /// Lookup is a linear scan comparing the hash first and then the bytes.
    pub fn intern(&mut self, name: &[u8]) -> SymbolId {
        let hash = hash_name(name);
        if let Some(pos) = self
            .ids
            .iter()
            .position(|id| id.hash == hash && id.name.as_bytes() == name)
        {
            return SymbolId(pos);
        }

        self.ids.push(Identifier {
            name: String::from_utf8_lossy(name).into_owned(),
            hash,
            role: Role::Unbound,
            ty: Ty::INT,
            value: 0,
            shadow: None,
        });
        SymbolId(self.ids.len() - 1)
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        let hash = hash_name(name.as_bytes());
        self.ids
            .iter()
            .position(|id| id.hash == hash && id.name == name)
            .map(SymbolId)
    }

    pub fn get(&self, id: SymbolId) -> &Identifier {
        &self.ids[id.0]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Identifier {
        &mut self.ids[id.0]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Identifier)> {
        self.ids.iter().enumerate().map(|(i, id)| (SymbolId(i), id))
    }

    /// Hides whatever `id` means now behind a local binding.
    ///
    /// The caller has already rejected names that are `LocalVar`.
    pub fn bind_local(&mut self, id: SymbolId, ty: Ty, slot: i64) {
        let ident = self.get_mut(id);
        ident.shadow = Some(ident.binding());
        ident.set_binding(Binding {
            role: Role::LocalVar,
            ty,
            value: slot,
        });
    }

    /// Sweeps the whole table and restores every local from its shadow.
    /// Returns how many bindings were restored.
    pub fn restore_locals(&mut self) -> usize {
        let mut restored = 0;
        for ident in self.ids.iter_mut().filter(|i| i.role == Role::LocalVar) {
            if let Some(saved) = ident.shadow.take() {
                ident.set_binding(saved);
                restored += 1;
            }
        }
        restored
    }
}
