use crate::bytecode::compile::Compiler;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::Op;
use crate::frontend::token::{Keyword, Token, prec};

impl Compiler<'_> {
    /// Compiles one statement.
    ///
    /// ```text
    /// if (c) s1 else s2        c; JZ a; s1; JMP b; a: s2; b:
    /// while (c) s              a: c; JZ b; s; JMP a; b:
    /// ```
    pub(super) fn statement(&mut self) -> Result<(), CompileError> {
        match self.token {
            Token::Keyword(Keyword::If) => {
                self.next()?;
                self.expect(Token::LParen)?;
                self.expr(prec::ASSIGN)?;
                self.expect(Token::RParen)?;

                let else_hole = self.emit_with(Op::Jz, 0)?;
                self.statement()?;

                if self.token == Token::Keyword(Keyword::Else) {
                    self.next()?;
                    let end_hole = self.emit_with(Op::Jmp, 0)?;
                    self.patch_here(else_hole);
                    self.statement()?;
                    self.patch_here(end_hole);
                } else {
                    self.patch_here(else_hole);
                }
                Ok(())
            }

            Token::Keyword(Keyword::While) => {
                self.next()?;
                let top = self.text.here() as i64;
                self.expect(Token::LParen)?;
                self.expr(prec::ASSIGN)?;
                self.expect(Token::RParen)?;

                let exit_hole = self.emit_with(Op::Jz, 0)?;
                self.statement()?;
                self.emit_with(Op::Jmp, top)?;
                self.patch_here(exit_hole);
                Ok(())
            }

            Token::Keyword(Keyword::Return) => {
                self.next()?;
                if self.token != Token::Semi {
                    self.expr(prec::ASSIGN)?;
                }
                self.emit(Op::Lev)?;
                self.expect(Token::Semi)
            }

            Token::LBrace => {
                self.next()?;
                while self.token != Token::RBrace {
                    if self.token == Token::Eof {
                        return Err(self.expected("'}'"));
                    }
                    self.statement()?;
                }
                self.next()
            }

            Token::Semi => self.next(),

            _ => {
                self.expr(prec::ASSIGN)?;
                self.expect(Token::Semi)
            }
        }
    }
}
