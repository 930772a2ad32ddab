use crate::bytecode::ir::{DataSegment, SegmentOverflow};
use crate::frontend::symbols::{Role, SymbolTable};
use crate::frontend::token::Token;

/// On-demand scanner over a source buffer.
///
/// The lexer is pulled one token at a time by the compiler. It interns
/// identifiers into the symbol table and copies string literal bytes straight
/// into the data segment, so both are passed to [`Lexer::next`].
///
/// Scanning is permissive: bytes that start no token are skipped, and the
/// only failure is running out of data segment space.
pub struct Lexer<'src> {
    src: &'src [u8],
    pos: usize,
    line: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    /// Line of the most recently scanned token (1-based).
    pub fn line(&self) -> usize {
        self.line
    }

    /// Current byte, with NUL standing for end of input.
    fn current(&self) -> u8 {
        self.src.get(self.pos).copied().unwrap_or(0)
    }

    fn peek(&self) -> u8 {
        self.src.get(self.pos + 1).copied().unwrap_or(0)
    }

    fn skip_line(&mut self) {
        while !matches!(self.current(), 0 | b'\n') {
            self.pos += 1;
        }
    }

    /// Consumes the second byte of a two-character operator when it matches.
    fn pair(&mut self, second: u8, double: Token, single: Token) -> Token {
        if self.current() == second {
            self.pos += 1;
            double
        } else {
            single
        }
    }

    pub fn next(
        &mut self,
        symbols: &mut SymbolTable,
        data: &mut DataSegment,
    ) -> Result<Token, SegmentOverflow> {
        loop {
            let ch = self.current();
            if ch == 0 {
                return Ok(Token::Eof);
            }
            self.pos += 1;

            let token = match ch {
                b'\n' => {
                    self.line += 1;
                    continue;
                }
                // no preprocessor: the whole line is ignored
                b'#' => {
                    self.skip_line();
                    continue;
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    let start = self.pos - 1;
                    while matches!(self.current(), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
                    {
                        self.pos += 1;
                    }
                    let id = symbols.intern(&self.src[start..self.pos]);
                    match symbols.get(id).role {
                        Role::Keyword(kw) => Token::Keyword(kw),
                        _ => Token::Id(id),
                    }
                }
                b'0'..=b'9' => Token::Num(self.read_number(ch)),
                b'"' | b'\'' => return self.read_quoted(ch, data),
                b'/' => {
                    if self.current() == b'/' {
                        self.skip_line();
                        continue;
                    }
                    Token::Div
                }
                b'=' => self.pair(b'=', Token::Eq, Token::Assign),
                b'+' => self.pair(b'+', Token::Inc, Token::Add),
                b'-' => self.pair(b'-', Token::Dec, Token::Sub),
                b'!' => self.pair(b'=', Token::Ne, Token::Not),
                b'<' => match self.current() {
                    b'=' => self.pair(b'=', Token::Le, Token::Lt),
                    _ => self.pair(b'<', Token::Shl, Token::Lt),
                },
                b'>' => match self.current() {
                    b'=' => self.pair(b'=', Token::Ge, Token::Gt),
                    _ => self.pair(b'>', Token::Shr, Token::Gt),
                },
                b'|' => self.pair(b'|', Token::Lor, Token::Or),
                b'&' => self.pair(b'&', Token::Lan, Token::And),
                b'^' => Token::Xor,
                b'%' => Token::Mod,
                b'*' => Token::Mul,
                b'[' => Token::LBracket,
                b'?' => Token::Cond,
                b'~' => Token::Tilde,
                b';' => Token::Semi,
                b'{' => Token::LBrace,
                b'}' => Token::RBrace,
                b'(' => Token::LParen,
                b')' => Token::RParen,
                b']' => Token::RBracket,
                b',' => Token::Comma,
                b':' => Token::Colon,
                // whitespace and anything unrecognised
                _ => continue,
            };

            return Ok(token);
        }
    }

    /// Decimal, `0x` hexadecimal or leading-zero octal. Accumulation wraps.
    fn read_number(&mut self, first: u8) -> i64 {
        let mut value = (first - b'0') as i64;

        if value > 0 {
            while let d @ b'0'..=b'9' = self.current() {
                value = value.wrapping_mul(10).wrapping_add((d - b'0') as i64);
                self.pos += 1;
            }
        } else if matches!(self.current(), b'x' | b'X') {
            self.pos += 1;
            loop {
                let digit = match self.current() {
                    d @ b'0'..=b'9' => d - b'0',
                    d @ b'a'..=b'f' => d - b'a' + 10,
                    d @ b'A'..=b'F' => d - b'A' + 10,
                    _ => break,
                };
                value = value.wrapping_mul(16).wrapping_add(digit as i64);
                self.pos += 1;
            }
        } else {
            while let d @ b'0'..=b'7' = self.current() {
                value = value.wrapping_mul(8).wrapping_add((d - b'0') as i64);
                self.pos += 1;
            }
        }

        value
    }

    /// String or character literal; the opening quote is already consumed.
    ///
    /// `\n` is the only escape with a meaning; `\c` stands for `c` itself.
    /// String bytes go to the data segment (without terminator; the compiler
    /// adds it once adjacent literals have been joined).
    fn read_quoted(
        &mut self,
        quote: u8,
        data: &mut DataSegment,
    ) -> Result<Token, SegmentOverflow> {
        let start = data.here();
        let mut first: Option<i64> = None;

        while self.current() != 0 && self.current() != quote {
            let mut ch = self.current();
            self.pos += 1;
            if ch == b'\n' {
                self.line += 1;
            } else if ch == b'\\' && self.current() != 0 {
                ch = self.current();
                self.pos += 1;
                if ch == b'n' {
                    ch = b'\n';
                } else if ch == b'\n' {
                    self.line += 1;
                }
            }
            if quote == b'"' {
                data.push_byte(ch)?;
            } else if first.is_none() {
                first = Some(ch as i64);
            }
        }

        // closing quote, unless the input ended first
        if self.current() == quote {
            self.pos += 1;
        }

        Ok(if quote == b'"' {
            Token::Str(start)
        } else {
            Token::Num(first.unwrap_or(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ir::WORD_SIZE;
    use crate::frontend::token::Keyword;
    use pretty_assertions::assert_eq;

    fn scan(source: &str) -> (Vec<Token>, SymbolTable, DataSegment) {
        let mut symbols = SymbolTable::with_builtins();
        let mut data = DataSegment::with_capacity(1024);
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            match lexer.next(&mut symbols, &mut data).unwrap() {
                Token::Eof => break,
                t => out.push(t),
            }
        }
        (out, symbols, data)
    }

    fn tokens(source: &str) -> Vec<Token> {
        scan(source).0
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("= == ! != < <= << > >= >> | || & && + ++ - -- ^ % * / ? ~"),
            vec![
                Token::Assign,
                Token::Eq,
                Token::Not,
                Token::Ne,
                Token::Lt,
                Token::Le,
                Token::Shl,
                Token::Gt,
                Token::Ge,
                Token::Shr,
                Token::Or,
                Token::Lor,
                Token::And,
                Token::Lan,
                Token::Add,
                Token::Inc,
                Token::Sub,
                Token::Dec,
                Token::Xor,
                Token::Mod,
                Token::Mul,
                Token::Div,
                Token::Cond,
                Token::Tilde,
            ]
        );
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            tokens("; { } ( ) [ ] , :"),
            vec![
                Token::Semi,
                Token::LBrace,
                Token::RBrace,
                Token::LParen,
                Token::RParen,
                Token::LBracket,
                Token::RBracket,
                Token::Comma,
                Token::Colon,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("0 7 42 0x1F 0XfF 017 08"),
            vec![
                Token::Num(0),
                Token::Num(7),
                Token::Num(42),
                Token::Num(31),
                Token::Num(255),
                Token::Num(15),
                // octal stops at 8, which then starts a new decimal literal
                Token::Num(0),
                Token::Num(8),
            ]
        );
    }

    #[test]
    fn test_number_overflow_wraps() {
        let t = tokens("99999999999999999999");
        let expected = "99999999999999999999"
            .bytes()
            .fold(0i64, |v, d| v.wrapping_mul(10).wrapping_add((d - b'0') as i64));
        assert_eq!(t, vec![Token::Num(expected)]);
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let (t, symbols, _) = scan("int x while whilex _y9 void");
        assert_eq!(t[0], Token::Keyword(Keyword::Int));
        assert_eq!(t[2], Token::Keyword(Keyword::While));
        assert_eq!(t[5], Token::Keyword(Keyword::Void));
        match (t[1], t[3], t[4]) {
            (Token::Id(x), Token::Id(wx), Token::Id(y)) => {
                assert_eq!(symbols.get(x).name, "x");
                assert_eq!(symbols.get(wx).name, "whilex");
                assert_eq!(symbols.get(y).name, "_y9");
            }
            other => panic!("expected identifiers, got {:?}", other),
        }
    }

    #[test]
    fn test_identifiers_are_interned_once() {
        let (t, symbols, _) = scan("abc abc abd");
        assert_eq!(t[0], t[1]);
        assert_ne!(t[0], t[2]);
        let before = SymbolTable::with_builtins().len();
        assert_eq!(symbols.len(), before + 2);
    }

    #[test]
    fn test_string_literal_goes_to_data() {
        let (t, _, data) = scan(r#""hi\n" "a\qb""#);
        assert_eq!(t, vec![Token::Str(WORD_SIZE), Token::Str(WORD_SIZE + 3)]);
        // unknown escape degrades to the escaped character
        assert_eq!(&data.bytes()[8..], b"hi\naqb");
    }

    #[test]
    fn test_char_literal_is_number() {
        let (t, _, data) = scan(r"'a' '\n' '\\' 'xy'");
        assert_eq!(
            t,
            vec![
                Token::Num(97),
                Token::Num(10),
                Token::Num(92),
                Token::Num(120)
            ]
        );
        // char literals never touch the data segment
        assert_eq!(data.here(), WORD_SIZE);
    }

    #[test]
    fn test_comments_and_hash_lines() {
        let src = "#include <stdio.h>\na // comment 1 2 3\n/ b";
        let t = tokens(src);
        assert_eq!(t.len(), 3);
        assert_eq!(t[1], Token::Div);
    }

    #[test]
    fn test_unknown_bytes_are_skipped() {
        assert_eq!(
            tokens("1 @ $ ` \\ . 2"),
            vec![Token::Num(1), Token::Num(2)]
        );
    }

    #[test]
    fn test_stops_at_nul() {
        assert_eq!(tokens("1\0 2"), vec![Token::Num(1)]);
    }

    #[test]
    fn test_line_counting() {
        let mut symbols = SymbolTable::new();
        let mut data = DataSegment::with_capacity(64);
        let mut lexer = Lexer::new("a\n\n// c\nb");
        lexer.next(&mut symbols, &mut data).unwrap();
        assert_eq!(lexer.line(), 1);
        lexer.next(&mut symbols, &mut data).unwrap();
        assert_eq!(lexer.line(), 4);
    }

    #[test]
    fn test_unterminated_string_stops_at_end() {
        let (t, _, data) = scan("\"abc");
        assert_eq!(t, vec![Token::Str(WORD_SIZE)]);
        assert_eq!(&data.bytes()[8..], b"abc");
    }

    #[test]
    fn test_string_overflows_data_segment() {
        let mut symbols = SymbolTable::new();
        let mut data = DataSegment::with_capacity(10);
        let mut lexer = Lexer::new("\"abcdef\"");
        assert!(lexer.next(&mut symbols, &mut data).is_err());
    }
}
