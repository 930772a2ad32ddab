//! Expression compiler: precedence climbing that emits code as it parses.
//!
//! Every expression leaves its value in the accumulator and its static type
//! in `expr_ty`. Binary operators push the left operand, compile the right
//! one into the accumulator and then emit the operator.
//!
//! Variables are compiled as "address, then load". When an expression turns
//! out to be used as an lvalue (assignment, `&`, `++`/`--`) the trailing
//! `LC`/`LI` is taken back off the text segment, leaving the address. Only
//! loads of a variable, a dereference or an index qualify; the value of
//! `?:`, `&&` or `||` ends in a load too but is not assignable.

use crate::bytecode::compile::Compiler;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::Op;
use crate::frontend::symbols::{Role, SymbolId, Ty};
use crate::frontend::token::{Keyword, Token, prec};

impl Compiler<'_> {
    pub(super) fn expr(&mut self, level: u8) -> Result<(), CompileError> {
        self.unary()?;

        loop {
            let Some(p) = self.token.precedence() else {
                break;
            };
            if p < level {
                break;
            }
            self.binary()?;
        }

        Ok(())
    }

    // =========================================================================
    // Loads and stores
    // =========================================================================

    /// Loads through the address in the accumulator. The load is recorded
    /// as assignable until anything else is emitted.
    fn load(&mut self, ty: Ty) -> Result<(), CompileError> {
        self.emit(if ty.is_char() { Op::Lc } else { Op::Li })?;
        self.lvalue = Some(self.text.here());
        Ok(())
    }

    fn store(&mut self, ty: Ty) -> Result<(), CompileError> {
        self.emit(if ty.is_char() { Op::Sc } else { Op::Si })
    }

    /// Removes the load just emitted, leaving the address in the
    /// accumulator. Fails unless the expression ended with the load of a
    /// variable, a dereference or an index.
    fn take_address(&mut self) -> Option<Op> {
        if self.lvalue.take() != Some(self.text.here()) {
            return None;
        }
        match self.text.last_op() {
            Some(Op::Lc | Op::Li) => self.text.pop_op(),
            _ => None,
        }
    }

    /// `PUSH; IMM n; op`, skipped entirely when scaling by 1.
    fn scale(&mut self, stride: i64, op: Op) -> Result<(), CompileError> {
        if stride > 1 {
            self.emit(Op::Push)?;
            self.emit_with(Op::Imm, stride)?;
            self.emit(op)?;
        }
        Ok(())
    }

    // =========================================================================
    // Unary and primary expressions
    // =========================================================================

    fn unary(&mut self) -> Result<(), CompileError> {
        match self.token {
            Token::Eof => Err(CompileError::UnexpectedEof { line: self.line() }),

            Token::Num(n) => {
                self.emit_with(Op::Imm, n)?;
                self.next()?;
                self.expr_ty = Ty::INT;
                Ok(())
            }

            Token::Str(addr) => {
                self.emit_with(Op::Imm, addr)?;
                self.next()?;
                // adjacent literals were scanned into consecutive bytes
                while let Token::Str(_) = self.token {
                    self.next()?;
                }
                self.data.finish_string().map_err(|e| self.overflow(e))?;
                self.expr_ty = Ty::CHAR.pointer_to();
                Ok(())
            }

            Token::Keyword(Keyword::Sizeof) => {
                self.next()?;
                self.expect(Token::LParen)?;
                let ty = self.base_type()?;
                let ty = self.pointer_suffix(ty)?;
                self.expect(Token::RParen)?;
                self.emit_with(Op::Imm, ty.size())?;
                self.expr_ty = Ty::INT;
                Ok(())
            }

            Token::Id(id) => {
                self.next()?;
                let ident = self.symbols.get(id).binding();

                if self.token == Token::LParen {
                    return self.call(id);
                }

                match ident.role {
                    Role::EnumConstant => {
                        self.emit_with(Op::Imm, ident.value)?;
                        self.expr_ty = Ty::INT;
                        return Ok(());
                    }
                    Role::LocalVar => {
                        self.emit_with(Op::Lea, self.index_of_bp - ident.value)?;
                    }
                    Role::GlobalVar => {
                        self.emit_with(Op::Imm, ident.value)?;
                    }
                    _ => {
                        return Err(CompileError::UndefinedVariable {
                            line: self.line(),
                            name: self.symbols.get(id).name.clone(),
                        });
                    }
                }
                self.expr_ty = ident.ty;
                self.load(ident.ty)
            }

            Token::LParen => {
                self.next()?;
                if self.token.is_type_keyword() {
                    let ty = self.base_type()?;
                    let ty = self.pointer_suffix(ty)?;
                    self.expect(Token::RParen)?;
                    self.expr(prec::INC)?;
                    self.expr_ty = ty;
                } else {
                    self.expr(prec::ASSIGN)?;
                    self.expect(Token::RParen)?;
                }
                Ok(())
            }

            Token::Mul => {
                self.next()?;
                self.expr(prec::INC)?;
                self.expr_ty = self
                    .expr_ty
                    .deref()
                    .ok_or(CompileError::BadDereference { line: self.line() })?;
                self.load(self.expr_ty)
            }

            Token::And => {
                self.next()?;
                self.expr(prec::INC)?;
                if self.take_address().is_none() {
                    return Err(CompileError::BadAddressOf { line: self.line() });
                }
                self.expr_ty = self.expr_ty.pointer_to();
                Ok(())
            }

            Token::Not => {
                self.next()?;
                self.expr(prec::INC)?;
                self.emit(Op::Push)?;
                self.emit_with(Op::Imm, 0)?;
                self.emit(Op::Eq)?;
                self.expr_ty = Ty::INT;
                Ok(())
            }

            Token::Tilde => {
                self.next()?;
                self.expr(prec::INC)?;
                self.emit(Op::Push)?;
                self.emit_with(Op::Imm, -1)?;
                self.emit(Op::Xor)?;
                self.expr_ty = Ty::INT;
                Ok(())
            }

            Token::Add => {
                self.next()?;
                self.expr(prec::INC)?;
                self.expr_ty = Ty::INT;
                Ok(())
            }

            Token::Sub => {
                self.next()?;
                if let Token::Num(n) = self.token {
                    self.emit_with(Op::Imm, n.wrapping_neg())?;
                    self.next()?;
                } else {
                    self.emit_with(Op::Imm, -1)?;
                    self.emit(Op::Push)?;
                    self.expr(prec::INC)?;
                    self.emit(Op::Mul)?;
                }
                self.expr_ty = Ty::INT;
                Ok(())
            }

            Token::Inc | Token::Dec => {
                let step = if self.token == Token::Inc { Op::Add } else { Op::Sub };
                self.next()?;
                self.expr(prec::INC)?;
                let Some(load) = self.take_address() else {
                    return Err(CompileError::BadLvalue { line: self.line() });
                };
                // keep the address for the store, reload the value
                self.emit(Op::Push)?;
                self.emit(load)?;
                self.emit(Op::Push)?;
                self.emit_with(Op::Imm, self.expr_ty.stride())?;
                self.emit(step)?;
                self.store(self.expr_ty)
            }

            _ => Err(self.expected("expression")),
        }
    }

    /// `name(args...)`; the identifier is consumed, the token is `(`.
    ///
    /// Arguments are pushed left to right. `ADJ argc` always follows the
    /// call, also for `printf`, which reads its argument count from it.
    fn call(&mut self, id: SymbolId) -> Result<(), CompileError> {
        self.next()?;
        let mut argc: i64 = 0;
        while self.token != Token::RParen {
            self.expr(prec::ASSIGN)?;
            self.emit(Op::Push)?;
            argc += 1;
            if self.token == Token::Comma {
                self.next()?;
            } else if self.token != Token::RParen {
                return Err(self.expected("',' or ')'"));
            }
        }
        self.next()?;

        let ident = self.symbols.get(id).binding();
        match ident.role {
            Role::Syscall => {
                let op = Op::from_word(ident.value)
                    .filter(|op| op.is_syscall())
                    .ok_or_else(|| CompileError::BadCall {
                        line: self.line(),
                        name: self.symbols.get(id).name.clone(),
                    })?;
                self.emit(op)?;
            }
            Role::Function => {
                self.emit_with(Op::Call, ident.value)?;
            }
            _ => {
                return Err(CompileError::BadCall {
                    line: self.line(),
                    name: self.symbols.get(id).name.clone(),
                });
            }
        }
        self.emit_with(Op::Adj, argc)?;
        self.expr_ty = ident.ty;
        Ok(())
    }

    // =========================================================================
    // Binary and postfix operators
    // =========================================================================

    /// One operator whose precedence is at least the current level. The left
    /// operand is in the accumulator, its type in `expr_ty`.
    fn binary(&mut self) -> Result<(), CompileError> {
        let left = self.expr_ty;
        let op = self.token;
        self.next()?;

        match op {
            Token::Assign => {
                if self.take_address().is_none() {
                    return Err(CompileError::BadLvalue { line: self.line() });
                }
                self.emit(Op::Push)?;
                self.expr(prec::ASSIGN)?;
                self.store(left)?;
                self.expr_ty = left;
            }

            Token::Cond => {
                let else_hole = self.emit_with(Op::Jz, 0)?;
                self.expr(prec::ASSIGN)?;
                self.expect(Token::Colon)?;
                let end_hole = self.emit_with(Op::Jmp, 0)?;
                self.patch_here(else_hole);
                self.expr(prec::COND)?;
                self.patch_here(end_hole);
                self.lvalue = None;
            }

            // short circuit: the deciding operand's value is left as is
            Token::Lor => {
                let hole = self.emit_with(Op::Jnz, 0)?;
                self.expr(prec::LAN)?;
                self.patch_here(hole);
                self.lvalue = None;
                self.expr_ty = Ty::INT;
            }
            Token::Lan => {
                let hole = self.emit_with(Op::Jz, 0)?;
                self.expr(prec::OR)?;
                self.patch_here(hole);
                self.lvalue = None;
                self.expr_ty = Ty::INT;
            }

            Token::Or => self.arith(prec::XOR, Op::Or)?,
            Token::Xor => self.arith(prec::AND, Op::Xor)?,
            Token::And => self.arith(prec::EQ, Op::And)?,
            Token::Eq => self.arith(prec::REL, Op::Eq)?,
            Token::Ne => self.arith(prec::REL, Op::Ne)?,
            Token::Lt => self.arith(prec::SHIFT, Op::Lt)?,
            Token::Gt => self.arith(prec::SHIFT, Op::Gt)?,
            Token::Le => self.arith(prec::SHIFT, Op::Le)?,
            Token::Ge => self.arith(prec::SHIFT, Op::Ge)?,
            Token::Shl => self.arith(prec::ADD, Op::Shl)?,
            Token::Shr => self.arith(prec::ADD, Op::Shr)?,
            Token::Mul => self.arith(prec::INC, Op::Mul)?,
            Token::Div => self.arith(prec::INC, Op::Div)?,
            Token::Mod => self.arith(prec::INC, Op::Mod)?,

            Token::Add => {
                self.emit(Op::Push)?;
                self.expr(prec::MUL)?;
                let right = self.expr_ty;
                if left.is_pointer() {
                    self.scale(left.stride(), Op::Mul)?;
                }
                self.emit(Op::Add)?;
                self.expr_ty = if left.is_pointer() {
                    left
                } else if right.is_pointer() {
                    right
                } else {
                    Ty::INT
                };
            }

            Token::Sub => {
                self.emit(Op::Push)?;
                self.expr(prec::MUL)?;
                let right = self.expr_ty;
                if left.is_pointer() && left == right {
                    // element distance between two pointers
                    self.emit(Op::Sub)?;
                    self.scale(left.stride(), Op::Div)?;
                    self.expr_ty = Ty::INT;
                } else if left.is_pointer() {
                    self.scale(left.stride(), Op::Mul)?;
                    self.emit(Op::Sub)?;
                    self.expr_ty = left;
                } else {
                    self.emit(Op::Sub)?;
                    self.expr_ty = Ty::INT;
                }
            }

            Token::Inc | Token::Dec => {
                let Some(load) = self.take_address() else {
                    return Err(CompileError::BadLvalue { line: self.line() });
                };
                let (step, undo) = if op == Token::Inc {
                    (Op::Add, Op::Sub)
                } else {
                    (Op::Sub, Op::Add)
                };
                let stride = left.stride();
                self.emit(Op::Push)?;
                self.emit(load)?;
                self.emit(Op::Push)?;
                self.emit_with(Op::Imm, stride)?;
                self.emit(step)?;
                self.store(left)?;
                // the expression's value is the one before the update
                self.emit(Op::Push)?;
                self.emit_with(Op::Imm, stride)?;
                self.emit(undo)?;
                if left.is_char() {
                    // back to the byte's range: `(v << 56) >> 56`
                    for shift in [Op::Shl, Op::Shr] {
                        self.emit(Op::Push)?;
                        self.emit_with(Op::Imm, 56)?;
                        self.emit(shift)?;
                    }
                }
                self.expr_ty = left;
            }

            Token::LBracket => {
                self.emit(Op::Push)?;
                self.expr(prec::ASSIGN)?;
                self.expect(Token::RBracket)?;
                let elem = left
                    .deref()
                    .ok_or(CompileError::PointerExpected { line: self.line() })?;
                self.scale(left.stride(), Op::Mul)?;
                self.emit(Op::Add)?;
                self.expr_ty = elem;
                self.load(elem)?;
            }

            other => return Err(self.expected(&format!("operator, not {}", other.describe()))),
        }

        Ok(())
    }

    /// `PUSH; <right operand>; op` for operators whose result is an `int`.
    fn arith(&mut self, right_level: u8, op: Op) -> Result<(), CompileError> {
        self.emit(Op::Push)?;
        self.expr(right_level)?;
        self.emit(op)?;
        self.expr_ty = Ty::INT;
        Ok(())
    }
}
