use crate::bytecode::ir::{DEFAULT_POOL_SIZE, DataSegment, SegmentOverflow};
use crate::frontend::lexer::Lexer;
use crate::frontend::symbols::SymbolTable;
use crate::frontend::token::Token;

/// Prints the token stream of a source file, one token per line.
pub struct TokenDumper {
    pub color: bool,
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self { color: true }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";
    const BLU: &'static str = "\x1b[34m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn dump(&self, source: &str) -> Result<(), SegmentOverflow> {
        print!("{}", self.render(source)?);
        Ok(())
    }

    /// Scans `source` with a fresh symbol table and returns the listing.
    pub fn render(&self, source: &str) -> Result<String, SegmentOverflow> {
        let mut symbols = SymbolTable::with_builtins();
        let mut data = DataSegment::with_capacity(DEFAULT_POOL_SIZE);
        let mut lexer = Lexer::new(source);
        let mut out = String::new();

        loop {
            let token = lexer.next(&mut symbols, &mut data)?;
            let text = match token {
                Token::Num(n) => n.to_string(),
                Token::Str(addr) => {
                    let bytes = &data.bytes()[addr as usize..];
                    let s = format!("{:?}", String::from_utf8_lossy(bytes));
                    data.finish_string()?;
                    s
                }
                Token::Id(id) => symbols.get(id).name.clone(),
                Token::Keyword(k) => k.as_str().to_string(),
                Token::Eof => String::new(),
                other => other.describe().trim_matches('\'').to_string(),
            };

            let colr = if self.color { self.color(&token) } else { "" };
            let reset = if self.color { Self::RESET } else { "" };
            out.push_str(&format!(
                "[{:03}] {}{:<8} {}{}\n",
                lexer.line(),
                colr,
                self.kind(&token),
                text,
                reset
            ));

            if token == Token::Eof {
                break;
            }
        }

        Ok(out)
    }

    fn kind(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof => "EOF",

            // literals
            Num(_) => "NUM",
            Str(_) => "STRING",

            // names
            Id(_) => "IDENT",
            Keyword(_) => "KEYWORD",

            // structure
            LParen | RParen | LBrace | RBrace | LBracket | RBracket => "BRACKET",
            Semi | Comma | Colon => "PUNCT",

            // comparisons
            Eq | Ne | Lt | Gt | Le | Ge => "CMP",

            // everything else is an operator
            _ => "OP",
        }
    }

    fn color(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof | Semi | Comma | Colon => Self::DIM,
            Str(_) => Self::GRN,
            Num(_) => Self::CYN,
            Id(_) => Self::YEL,
            Keyword(_) => Self::BLU,
            LParen | RParen | LBrace | RBrace | LBracket | RBracket => Self::RESET,
            _ => Self::MAG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_plain() {
        let out = TokenDumper::new()
            .no_color()
            .render("int x;\nx = \"hi\" ;")
            .unwrap();
        let lines: Vec<&str> = out.lines().map(str::trim_end).collect();
        assert_eq!(
            lines,
            vec![
                "[001] KEYWORD  int",
                "[001] IDENT    x",
                "[001] PUNCT    ;",
                "[002] IDENT    x",
                "[002] OP       =",
                "[002] STRING   \"hi\"",
                "[002] PUNCT    ;",
                "[002] EOF",
            ]
        );
    }

    #[test]
    fn test_render_color() {
        let out = TokenDumper::new().render("42").unwrap();
        assert!(out.starts_with("[001] \x1b[36mNUM"));
        assert!(out.contains("\x1b[0m"));
    }
}
