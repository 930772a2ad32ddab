use crate::frontend::symbols::SymbolId;

/// Reserved words. They live in the symbol table like any other identifier
/// and are told apart by their role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Char,
    Else,
    Enum,
    If,
    Int,
    Return,
    Sizeof,
    While,
    /// `void` is accepted wherever `char` is and means the same thing.
    Void,
}

impl Keyword {
    pub const ALL: [(&'static str, Keyword); 9] = [
        ("char", Keyword::Char),
        ("else", Keyword::Else),
        ("enum", Keyword::Enum),
        ("if", Keyword::If),
        ("int", Keyword::Int),
        ("return", Keyword::Return),
        ("sizeof", Keyword::Sizeof),
        ("while", Keyword::While),
        ("void", Keyword::Void),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Char => "char",
            Keyword::Else => "else",
            Keyword::Enum => "enum",
            Keyword::If => "if",
            Keyword::Int => "int",
            Keyword::Return => "return",
            Keyword::Sizeof => "sizeof",
            Keyword::While => "while",
            Keyword::Void => "void",
        }
    }

    /// True for the keywords that start a type (`int`, `char`, `void`).
    pub fn is_type(self) -> bool {
        matches!(self, Keyword::Int | Keyword::Char | Keyword::Void)
    }
}

/// Precedence levels used by the expression compiler, lowest first.
pub mod prec {
    pub const ASSIGN: u8 = 1;
    pub const COND: u8 = 2;
    pub const LOR: u8 = 3;
    pub const LAN: u8 = 4;
    pub const OR: u8 = 5;
    pub const XOR: u8 = 6;
    pub const AND: u8 = 7;
    pub const EQ: u8 = 8;
    pub const REL: u8 = 9;
    pub const SHIFT: u8 = 10;
    pub const ADD: u8 = 11;
    pub const MUL: u8 = 12;
    pub const INC: u8 = 13;
    pub const INDEX: u8 = 14;
}

// =============================================================================
// Token
// =============================================================================

/// One lexeme. Literal payloads travel inside the variant.
///
/// Operator variants are declared from lowest to highest binding power,
/// starting at `Assign`; see [`Token::precedence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    // Literals
    /// Numeric or character literal.
    Num(i64),
    /// String literal: data segment address of its first byte.
    Str(i64),

    // Names
    Id(SymbolId),
    Keyword(Keyword),

    // Operators, lowest precedence first
    Assign,   // =
    Cond,     // ?
    Lor,      // ||
    Lan,      // &&
    Or,       // |
    Xor,      // ^
    And,      // &
    Eq,       // ==
    Ne,       // !=
    Lt,       // <
    Gt,       // >
    Le,       // <=
    Ge,       // >=
    Shl,      // <<
    Shr,      // >>
    Add,      // +
    Sub,      // -
    Mul,      // *
    Div,      // /
    Mod,      // %
    Inc,      // ++
    Dec,      // --
    LBracket, // [

    // Punctuation
    Not,      // !
    Tilde,    // ~
    Semi,     // ;
    Comma,    // ,
    Colon,    // :
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    RBracket, // ]

    Eof,
}

impl Token {
    /// Binding power of a binary/postfix operator, or `None` for tokens that
    /// never continue an expression.
    pub fn precedence(&self) -> Option<u8> {
        Some(match self {
            Token::Assign => prec::ASSIGN,
            Token::Cond => prec::COND,
            Token::Lor => prec::LOR,
            Token::Lan => prec::LAN,
            Token::Or => prec::OR,
            Token::Xor => prec::XOR,
            Token::And => prec::AND,
            Token::Eq | Token::Ne => prec::EQ,
            Token::Lt | Token::Gt | Token::Le | Token::Ge => prec::REL,
            Token::Shl | Token::Shr => prec::SHIFT,
            Token::Add | Token::Sub => prec::ADD,
            Token::Mul | Token::Div | Token::Mod => prec::MUL,
            Token::Inc | Token::Dec => prec::INC,
            Token::LBracket => prec::INDEX,
            _ => return None,
        })
    }

    pub fn is_type_keyword(&self) -> bool {
        matches!(self, Token::Keyword(k) if k.is_type())
    }

    /// Source spelling for punctuation and operators, used in diagnostics.
    pub fn describe(&self) -> String {
        let s = match self {
            Token::Num(n) => return format!("number {}", n),
            Token::Str(_) => "string literal",
            Token::Id(_) => "identifier",
            Token::Keyword(k) => return format!("'{}'", k.as_str()),
            Token::Assign => "'='",
            Token::Cond => "'?'",
            Token::Lor => "'||'",
            Token::Lan => "'&&'",
            Token::Or => "'|'",
            Token::Xor => "'^'",
            Token::And => "'&'",
            Token::Eq => "'=='",
            Token::Ne => "'!='",
            Token::Lt => "'<'",
            Token::Gt => "'>'",
            Token::Le => "'<='",
            Token::Ge => "'>='",
            Token::Shl => "'<<'",
            Token::Shr => "'>>'",
            Token::Add => "'+'",
            Token::Sub => "'-'",
            Token::Mul => "'*'",
            Token::Div => "'/'",
            Token::Mod => "'%'",
            Token::Inc => "'++'",
            Token::Dec => "'--'",
            Token::LBracket => "'['",
            Token::Not => "'!'",
            Token::Tilde => "'~'",
            Token::Semi => "';'",
            Token::Comma => "','",
            Token::Colon => "':'",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::RBracket => "']'",
            Token::Eof => "end of input",
        };
        s.to_string()
    }
}
