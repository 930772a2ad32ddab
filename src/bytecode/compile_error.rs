use crate::bytecode::ir::SegmentOverflow;

/// A fatal compile-time error. Compilation stops at the first one.
///
/// Every variant carries the source line it was detected on; `Display`
/// renders it as `line N: message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// A specific token was required and something else was found
    #[error("line {line}: expected {expected}, found {found}")]
    Expected {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("line {line}: unexpected end of input in expression")]
    UnexpectedEof { line: usize },

    /// Malformed global, parameter or local declaration
    #[error("line {line}: invalid {what} declaration")]
    InvalidDeclaration { line: usize, what: &'static str },

    #[error("line {line}: duplicate {what} declaration of '{name}'")]
    DuplicateDeclaration {
        line: usize,
        what: &'static str,
        name: String,
    },

    #[error("line {line}: invalid enum {what}")]
    InvalidEnum { line: usize, what: &'static str },

    #[error("line {line}: '{name}' is not a function")]
    BadCall { line: usize, name: String },

    #[error("line {line}: undefined variable '{name}'")]
    UndefinedVariable { line: usize, name: String },

    #[error("line {line}: cannot dereference a non-pointer")]
    BadDereference { line: usize },

    #[error("line {line}: cannot take the address of this expression")]
    BadAddressOf { line: usize },

    #[error("line {line}: expression is not assignable")]
    BadLvalue { line: usize },

    #[error("line {line}: pointer type expected")]
    PointerExpected { line: usize },

    #[error("line {line}: {source}")]
    SegmentOverflow {
        line: usize,
        #[source]
        source: SegmentOverflow,
    },

    #[error("main() not defined")]
    MissingMain,
}

impl CompileError {
    /// Source line the error was reported on, if it has one.
    pub fn line(&self) -> Option<usize> {
        match self {
            CompileError::Expected { line, .. }
            | CompileError::UnexpectedEof { line }
            | CompileError::InvalidDeclaration { line, .. }
            | CompileError::DuplicateDeclaration { line, .. }
            | CompileError::InvalidEnum { line, .. }
            | CompileError::BadCall { line, .. }
            | CompileError::UndefinedVariable { line, .. }
            | CompileError::BadDereference { line }
            | CompileError::BadAddressOf { line }
            | CompileError::BadLvalue { line }
            | CompileError::PointerExpected { line }
            | CompileError::SegmentOverflow { line, .. } => Some(*line),
            CompileError::MissingMain => None,
        }
    }
}
