//! Single-pass compiler: parses declarations and emits bytecode as it goes.
//!
//! There is no syntax tree. The declaration compiler in this module drives
//! the lexer and calls into the statement ([`stmt`]) and expression
//! ([`expr`]) compilers, which append straight to the text segment.
//!
//! Grammar handled here:
//!
//! ```text
//! program        ::= { global_decl }
//! global_decl    ::= enum_decl | type { '*' } id ( func_rest | ) { ',' ... } ';'
//! enum_decl      ::= 'enum' [id] [ '{' id ['=' num] { ',' id ['=' num] } '}' ] ';'
//! func_rest      ::= '(' param_decl ')' '{' { local_decl } { statement } '}'
//! param_decl     ::= [ type { '*' } id { ',' type { '*' } id } ]
//! local_decl     ::= type { '*' } id { ',' { '*' } id } ';'
//! type           ::= 'int' | 'char' | 'void'
//! ```

mod expr;
mod stmt;

use tracing::{debug, info};

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::ir::{DEFAULT_POOL_SIZE, DataSegment, Program, SegmentOverflow, Text};
use crate::bytecode::op::Op;
use crate::frontend::lexer::Lexer;
use crate::frontend::symbols::{Role, SymbolId, SymbolTable, Ty};
use crate::frontend::token::{Keyword, Token};

/// Segment capacities for one compilation.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Maximum number of text words.
    pub text_capacity: usize,
    /// Maximum number of data bytes.
    pub data_capacity: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            text_capacity: DEFAULT_POOL_SIZE,
            data_capacity: DEFAULT_POOL_SIZE,
        }
    }
}

/// Compiles `source` with default capacities.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let mut compiler = Compiler::new(source, CompilerConfig::default());
    compiler.compile_program()?;
    compiler.finish()
}

pub struct Compiler<'src> {
    lexer: Lexer<'src>,
    symbols: SymbolTable,

    /// Output
    text: Text,
    data: DataSegment,

    /// Current lookahead token
    token: Token,

    /// Static type of the expression compiled last
    expr_ty: Ty,

    /// Text position just past the last load of an assignable location.
    /// Only a load ending exactly here may be turned back into an address.
    lvalue: Option<usize>,

    /// Frame slot of the saved base pointer in the function being compiled
    /// (parameter count + 1). A variable in slot `s` lives at word offset
    /// `index_of_bp - s` from the base pointer.
    index_of_bp: i64,
}

impl<'src> Compiler<'src> {
    pub fn new(source: &'src str, config: CompilerConfig) -> Self {
        Self {
            lexer: Lexer::new(source),
            symbols: SymbolTable::with_builtins(),
            text: Text::with_capacity(config.text_capacity),
            data: DataSegment::with_capacity(config.data_capacity),
            token: Token::Eof,
            expr_ty: Ty::INT,
            lvalue: None,
            index_of_bp: 0,
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Parses and compiles every top-level declaration.
    pub fn compile_program(&mut self) -> Result<(), CompileError> {
        self.next()?;
        while self.token != Token::Eof {
            self.global_declaration()?;
        }
        Ok(())
    }

    /// Resolves `main`, appends the start-up trampoline and hands out the
    /// finished program.
    pub fn finish(mut self) -> Result<Program, CompileError> {
        let main = self
            .symbols
            .lookup("main")
            .map(|id| self.symbols.get(id))
            .filter(|ident| ident.role == Role::Function)
            .map(|ident| ident.value)
            .ok_or(CompileError::MissingMain)?;

        let entry = self.text.here();
        self.emit_with(Op::Call, main)?;
        self.emit(Op::Push)?;
        self.emit(Op::Exit)?;

        info!(
            text_words = self.text.here(),
            data_bytes = self.data.here(),
            "compiled program"
        );

        Ok(Program {
            text: self.text.into_words(),
            data: self.data.into_bytes(),
            entry,
            main: main as usize,
        })
    }

    // =========================================================================
    // Token helpers
    // =========================================================================

    fn next(&mut self) -> Result<(), CompileError> {
        self.token = self
            .lexer
            .next(&mut self.symbols, &mut self.data)
            .map_err(|source| CompileError::SegmentOverflow {
                line: self.lexer.line(),
                source,
            })?;
        Ok(())
    }

    /// Consumes `expected` or fails.
    fn expect(&mut self, expected: Token) -> Result<(), CompileError> {
        if self.token != expected {
            return Err(self.expected(&expected.describe()));
        }
        self.next()
    }

    fn expected(&self, what: &str) -> CompileError {
        CompileError::Expected {
            line: self.lexer.line(),
            expected: what.to_string(),
            found: self.token.describe(),
        }
    }

    fn line(&self) -> usize {
        self.lexer.line()
    }

    fn overflow(&self, source: SegmentOverflow) -> CompileError {
        CompileError::SegmentOverflow {
            line: self.line(),
            source,
        }
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    fn emit(&mut self, op: Op) -> Result<(), CompileError> {
        self.text.op(op).map_err(|e| self.overflow(e))
    }

    /// Emits `op operand` and returns the operand's address for patching.
    fn emit_with(&mut self, op: Op, operand: i64) -> Result<usize, CompileError> {
        self.text.op_with(op, operand).map_err(|e| self.overflow(e))
    }

    /// Points a forward branch at the next instruction to be emitted.
    fn patch_here(&mut self, hole: usize) {
        let here = self.text.here() as i64;
        self.text.patch(hole, here);
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// Consumes an optional `int`/`char`/`void` and returns the base type.
    /// `int` is the default when no type keyword is present.
    fn base_type(&mut self) -> Result<Ty, CompileError> {
        match self.token {
            Token::Keyword(Keyword::Int) => {
                self.next()?;
                Ok(Ty::INT)
            }
            Token::Keyword(Keyword::Char | Keyword::Void) => {
                self.next()?;
                Ok(Ty::CHAR)
            }
            _ => Ok(Ty::INT),
        }
    }

    /// Applies any `*` prefixes to `ty`.
    fn pointer_suffix(&mut self, mut ty: Ty) -> Result<Ty, CompileError> {
        while self.token == Token::Mul {
            self.next()?;
            ty = ty.pointer_to();
        }
        Ok(ty)
    }

    fn global_declaration(&mut self) -> Result<(), CompileError> {
        if self.token == Token::Keyword(Keyword::Enum) {
            self.next()?;
            if self.token != Token::LBrace {
                // optional tag name, ignored
                match self.token {
                    Token::Id(_) => self.next()?,
                    _ => return Err(self.expected("enum name or '{'")),
                }
            }
            if self.token == Token::LBrace {
                self.next()?;
                self.enum_body()?;
                self.expect(Token::RBrace)?;
            }
            return self.expect(Token::Semi);
        }

        let base = self.base_type()?;

        while self.token != Token::Semi && self.token != Token::RBrace {
            let ty = self.pointer_suffix(base)?;
            let id = match self.token {
                Token::Id(id) => id,
                _ => {
                    return Err(CompileError::InvalidDeclaration {
                        line: self.line(),
                        what: "global",
                    });
                }
            };
            if self.symbols.get(id).role != Role::Unbound {
                return Err(CompileError::DuplicateDeclaration {
                    line: self.line(),
                    what: "global",
                    name: self.symbols.get(id).name.clone(),
                });
            }
            self.next()?;
            self.symbols.get_mut(id).ty = ty;

            if self.token == Token::LParen {
                let entry = self.text.here() as i64;
                let ident = self.symbols.get_mut(id);
                ident.role = Role::Function;
                ident.value = entry;
                self.function_declaration(id)?;
            } else {
                let addr = self.data.alloc_word().map_err(|e| self.overflow(e))?;
                let ident = self.symbols.get_mut(id);
                ident.role = Role::GlobalVar;
                ident.value = addr;
                debug!(name = %ident.name, addr, ty = %ty, "global variable");
            }

            if self.token == Token::Comma {
                self.next()?;
            }
        }

        // the ';' of a variable list or the '}' closing a function body
        self.next()
    }

    /// `id [= num], ...` up to (not including) the closing brace.
    fn enum_body(&mut self) -> Result<(), CompileError> {
        let mut value: i64 = 0;

        while self.token != Token::RBrace {
            let id = match self.token {
                Token::Id(id) => id,
                _ => {
                    return Err(CompileError::InvalidEnum {
                        line: self.line(),
                        what: "identifier",
                    });
                }
            };
            if self.symbols.get(id).role != Role::Unbound {
                return Err(CompileError::DuplicateDeclaration {
                    line: self.line(),
                    what: "enum",
                    name: self.symbols.get(id).name.clone(),
                });
            }
            self.next()?;

            if self.token == Token::Assign {
                self.next()?;
                let negative = self.token == Token::Sub;
                if negative {
                    self.next()?;
                }
                value = match self.token {
                    Token::Num(n) if negative => n.wrapping_neg(),
                    Token::Num(n) => n,
                    _ => {
                        return Err(CompileError::InvalidEnum {
                            line: self.line(),
                            what: "initializer",
                        });
                    }
                };
                self.next()?;
            }

            let ident = self.symbols.get_mut(id);
            ident.role = Role::EnumConstant;
            ident.ty = Ty::INT;
            ident.value = value;
            debug!(name = %ident.name, value, "enum constant");
            value = value.wrapping_add(1);

            if self.token == Token::Comma {
                self.next()?;
            }
        }

        Ok(())
    }

    /// Frame layout, high to low addresses:
    ///
    /// ```text
    ///   arg 0            bp + (n + 1)
    ///   ...
    ///   arg n-1          bp + 2
    ///   return address   bp + 1
    ///   saved bp      <- bp
    ///   local 1          bp - 1
    ///   local 2          bp - 2
    /// ```
    fn function_declaration(&mut self, id: SymbolId) -> Result<(), CompileError> {
        self.expect(Token::LParen)?;
        let params = self.parameters()?;
        self.index_of_bp = params + 1;
        self.expect(Token::RParen)?;
        self.expect(Token::LBrace)?;
        self.function_body()?;

        let restored = self.symbols.restore_locals();
        debug!(
            name = %self.symbols.get(id).name,
            entry = self.symbols.get(id).value,
            params,
            restored,
            "compiled function"
        );

        // the closing '}' is left for global_declaration
        Ok(())
    }

    /// Binds each parameter as a local in slots 0, 1, ... and returns the
    /// parameter count.
    fn parameters(&mut self) -> Result<i64, CompileError> {
        let mut count: i64 = 0;

        while self.token != Token::RParen {
            let is_void = self.token == Token::Keyword(Keyword::Void);
            let ty = self.base_type()?;
            // `f(void)` declares no parameters
            if is_void && count == 0 && self.token == Token::RParen {
                break;
            }
            let ty = self.pointer_suffix(ty)?;

            let id = match self.token {
                Token::Id(id) => id,
                _ => {
                    return Err(CompileError::InvalidDeclaration {
                        line: self.line(),
                        what: "parameter",
                    });
                }
            };
            if self.symbols.get(id).role == Role::LocalVar {
                return Err(CompileError::DuplicateDeclaration {
                    line: self.line(),
                    what: "parameter",
                    name: self.symbols.get(id).name.clone(),
                });
            }
            self.next()?;

            self.symbols.bind_local(id, ty, count);
            count += 1;

            if self.token == Token::Comma {
                self.next()?;
            }
        }

        Ok(count)
    }

    /// Local declarations, then statements up to the closing brace.
    fn function_body(&mut self) -> Result<(), CompileError> {
        let mut slot = self.index_of_bp;

        while self.token.is_type_keyword() {
            let base = self.base_type()?;

            while self.token != Token::Semi {
                let ty = self.pointer_suffix(base)?;
                let id = match self.token {
                    Token::Id(id) => id,
                    _ => {
                        return Err(CompileError::InvalidDeclaration {
                            line: self.line(),
                            what: "local",
                        });
                    }
                };
                if self.symbols.get(id).role == Role::LocalVar {
                    return Err(CompileError::DuplicateDeclaration {
                        line: self.line(),
                        what: "local",
                        name: self.symbols.get(id).name.clone(),
                    });
                }
                self.next()?;

                slot += 1;
                self.symbols.bind_local(id, ty, slot);

                if self.token == Token::Comma {
                    self.next()?;
                }
            }

            self.expect(Token::Semi)?;
        }

        self.emit_with(Op::Ent, slot - self.index_of_bp)?;

        while self.token != Token::RBrace {
            self.statement()?;
        }

        // falls off the end: return whatever is in the accumulator
        self.emit(Op::Lev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::symbols::Binding;
    use pretty_assertions::assert_eq;

    fn compile_ok(source: &str) -> (Program, SymbolTable) {
        let mut compiler = Compiler::new(source, CompilerConfig::default());
        compiler
            .compile_program()
            .unwrap_or_else(|e| panic!("compile failed: {}", e));
        let symbols = compiler.symbols().clone();
        let program = compiler
            .finish()
            .unwrap_or_else(|e| panic!("finish failed: {}", e));
        (program, symbols)
    }

    fn compile_err(source: &str) -> CompileError {
        let mut compiler = Compiler::new(source, CompilerConfig::default());
        match compiler.compile_program() {
            Err(e) => e,
            Ok(()) => match compiler.finish() {
                Err(e) => e,
                Ok(_) => panic!("expected a compile error for {:?}", source),
            },
        }
    }

    fn binding(symbols: &SymbolTable, name: &str) -> Binding {
        symbols.get(symbols.lookup(name).unwrap()).binding()
    }

    // =========================================================================
    // Enums
    // =========================================================================

    #[test]
    fn test_enum_values() {
        let (_, symbols) = compile_ok("enum { A, B = 5, C }; enum E { D = 0x10, F, G = -2, H }; int main() { return 0; }");
        let values: Vec<i64> = ["A", "B", "C", "D", "F", "G", "H"]
            .iter()
            .map(|n| binding(&symbols, n).value)
            .collect();
        assert_eq!(values, vec![0, 5, 6, 16, 17, -2, -1]);
        assert_eq!(binding(&symbols, "C").role, Role::EnumConstant);
    }

    #[test]
    fn test_enum_bad_initializer() {
        assert!(matches!(
            compile_err("enum { A = B };"),
            CompileError::InvalidEnum {
                what: "initializer",
                ..
            }
        ));
        assert!(matches!(
            compile_err("enum { 3 };"),
            CompileError::InvalidEnum {
                what: "identifier",
                ..
            }
        ));
    }

    // =========================================================================
    // Globals and functions
    // =========================================================================

    #[test]
    fn test_globals_get_consecutive_words() {
        let (program, symbols) = compile_ok("int a; char b, *c; int main() { return 0; }");
        let a = binding(&symbols, "a");
        let b = binding(&symbols, "b");
        let c = binding(&symbols, "c");
        assert_eq!(a.role, Role::GlobalVar);
        assert_eq!(b.value - a.value, 8);
        assert_eq!(c.value - b.value, 8);
        assert_eq!(b.ty, Ty::CHAR);
        assert_eq!(c.ty, Ty::CHAR.pointer_to());
        assert_eq!(program.data.len() as i64, c.value + 8);
    }

    #[test]
    fn test_function_entry_and_trampoline() {
        let (program, symbols) = compile_ok("int main() { return 7; }");
        let main = binding(&symbols, "main");
        assert_eq!(main.role, Role::Function);
        assert_eq!(main.value, 0);
        assert_eq!(
            program.text,
            vec![
                Op::Ent as i64,
                0,
                Op::Imm as i64,
                7,
                Op::Lev as i64,
                Op::Lev as i64,
                Op::Call as i64,
                0,
                Op::Push as i64,
                Op::Exit as i64,
            ]
        );
        assert_eq!(program.entry, 6);
        assert_eq!(program.main, 0);
    }

    #[test]
    fn test_locals_reserve_frame() {
        let (program, _) = compile_ok("int main() { int a, b; char *c; return 0; }");
        assert_eq!(&program.text[..2], &[Op::Ent as i64, 3]);
    }

    #[test]
    fn test_parameter_and_local_offsets() {
        // params a, b -> slots 0, 1 -> offsets +3, +2; local c -> slot 3 -> offset -1
        let (program, _) = compile_ok("int f(int a, int b) { int c; c = a; return b; } int main() { return 0; }");
        let mut lea = Vec::new();
        let mut pc = 0;
        while pc < program.main {
            let op = Op::from_word(program.text[pc]).unwrap();
            if op == Op::Lea {
                lea.push(program.text[pc + 1]);
            }
            pc += if op.has_operand() { 2 } else { 1 };
        }
        assert_eq!(lea, vec![-1, 3, 2]);
    }

    #[test]
    fn test_void_parameter_list() {
        let (_, symbols) = compile_ok("void f(void) { } int main() { f(); return 0; }");
        assert_eq!(binding(&symbols, "f").role, Role::Function);
    }

    #[test]
    fn test_shadow_restored_after_function() {
        crate::test_utils::init_test_logging();
        let source = "
            int x;
            char *y;
            enum { K = 9 };
            int f(char x, int **K) { int y; y = x; return y; }
            int y2;
            int main() { return 0; }
        ";
        let mut compiler = Compiler::new(source, CompilerConfig::default());
        compiler.compile_program().unwrap();
        let symbols = compiler.symbols();

        let x = binding(symbols, "x");
        assert_eq!(x.role, Role::GlobalVar);
        assert_eq!(x.ty, Ty::INT);
        let y = binding(symbols, "y");
        assert_eq!(y.role, Role::GlobalVar);
        assert_eq!(y.ty, Ty::CHAR.pointer_to());
        let k = binding(symbols, "K");
        assert_eq!((k.role, k.value), (Role::EnumConstant, 9));

        // nothing anywhere in the table is still a local
        assert!(
            symbols
                .iter()
                .all(|(_, ident)| ident.role != Role::LocalVar && ident.shadow.is_none())
        );
    }

    #[test]
    fn test_local_name_is_free_again_at_global_scope() {
        let (_, symbols) = compile_ok("int f() { int tmp; return 0; } int tmp; int main() { return tmp; }");
        assert_eq!(binding(&symbols, "tmp").role, Role::GlobalVar);
    }

    // =========================================================================
    // Declaration errors
    // =========================================================================

    #[test]
    fn test_duplicate_global() {
        assert!(matches!(
            compile_err("int a; char a;"),
            CompileError::DuplicateDeclaration { what: "global", .. }
        ));
        assert!(matches!(
            compile_err("int printf;"),
            CompileError::DuplicateDeclaration { what: "global", .. }
        ));
    }

    #[test]
    fn test_duplicate_parameter() {
        assert!(matches!(
            compile_err("int f(int a, char a) { return 0; }"),
            CompileError::DuplicateDeclaration {
                what: "parameter",
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_local() {
        assert!(matches!(
            compile_err("int f(int a) { int a; return 0; }"),
            CompileError::DuplicateDeclaration { what: "local", .. }
        ));
        assert!(matches!(
            compile_err("int f() { int b; char b; return 0; }"),
            CompileError::DuplicateDeclaration { what: "local", .. }
        ));
    }

    #[test]
    fn test_invalid_declarations() {
        assert!(matches!(
            compile_err("int 5;"),
            CompileError::InvalidDeclaration { what: "global", .. }
        ));
        assert!(matches!(
            compile_err("int f(int) { }"),
            CompileError::InvalidDeclaration {
                what: "parameter",
                ..
            }
        ));
        assert!(matches!(
            compile_err("int f() { int *; }"),
            CompileError::InvalidDeclaration { what: "local", .. }
        ));
    }

    #[test]
    fn test_missing_main() {
        assert_eq!(compile_err("int f() { return 1; }"), CompileError::MissingMain);
        assert_eq!(compile_err("int main;"), CompileError::MissingMain);
    }

    #[test]
    fn test_error_reports_line() {
        let err = compile_err("int main() {\n  return 1\n}\n");
        assert_eq!(err.line(), Some(3));
        assert!(matches!(err, CompileError::Expected { .. }));
    }

    #[test]
    fn test_text_overflow_is_an_error() {
        let config = CompilerConfig {
            text_capacity: 4,
            data_capacity: 64,
        };
        let mut compiler = Compiler::new("int main() { return 1 + 2; }", config);
        assert!(matches!(
            compiler.compile_program(),
            Err(CompileError::SegmentOverflow { .. })
        ));
    }
}
