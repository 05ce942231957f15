/// Broad token classes, used by diagnostics and the token dumper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Symbol,
    Keyword,
    Number,
    String,
    Operator,
    Punctuation,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    /// Digits as written (`42`, `0x2A`). Parsed where the value is needed.
    Number(String),
    StringLit(String),
    Bool(bool),

    // Names
    Symbol(String),

    // Type keywords
    IntType,
    StrType,
    BoolType,
    VoidType,

    // Statement keywords
    Break,
    Case,
    Const,
    Continue,
    Default,
    Do,
    Else,
    For,
    Goto,
    If,
    Switch,
    While,

    // Program structure
    State,
    Event,
    Mainloop,
    Onenter,
    Onexit,

    // Definition files
    Funcdef,
    Eventdef,

    // Reserved, not implemented
    Enum,
    Func,
    Return,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,

    // Comparison
    Lt,
    Gt,
    LtEq,
    GtEq,
    EqEq,
    NotEq,

    // Logic / bitwise
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Caret,
    Bang,

    // Assignment
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    ShlAssign,
    ShrAssign,
    PlusPlus,
    MinusMinus,

    // Ternary
    Question,
    Colon,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Dot,
    Hash,

    Eof,
}

impl Token {
    /// Maps a word to its keyword token, if it is one.
    pub fn keyword(word: &str) -> Option<Token> {
        let token = match word {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            "int" => Token::IntType,
            "str" => Token::StrType,
            "bool" => Token::BoolType,
            "void" => Token::VoidType,
            "break" => Token::Break,
            "case" => Token::Case,
            "const" => Token::Const,
            "continue" => Token::Continue,
            "default" => Token::Default,
            "do" => Token::Do,
            "else" => Token::Else,
            "for" => Token::For,
            "goto" => Token::Goto,
            "if" => Token::If,
            "switch" => Token::Switch,
            "while" => Token::While,
            "state" => Token::State,
            "event" => Token::Event,
            "mainloop" => Token::Mainloop,
            "onenter" => Token::Onenter,
            "onexit" => Token::Onexit,
            "funcdef" => Token::Funcdef,
            "eventdef" => Token::Eventdef,
            "enum" => Token::Enum,
            "func" => Token::Func,
            "return" => Token::Return,
            _ => return None,
        };
        Some(token)
    }

    pub fn kind(&self) -> TokenKind {
        use Token::*;
        match self {
            Number(_) => TokenKind::Number,
            StringLit(_) => TokenKind::String,
            Symbol(_) => TokenKind::Symbol,
            Bool(_) | IntType | StrType | BoolType | VoidType | Break | Case | Const | Continue
            | Default | Do | Else | For | Goto | If | Switch | While | State | Event | Mainloop
            | Onenter | Onexit | Funcdef | Eventdef | Enum | Func | Return => TokenKind::Keyword,
            LParen | RParen | LBrace | RBrace | Comma | Semicolon | Dot | Hash => {
                TokenKind::Punctuation
            }
            Eof => TokenKind::Eof,
            _ => TokenKind::Operator,
        }
    }

    /// True for keywords that are reserved but have no meaning yet.
    pub fn is_reserved(&self) -> bool {
        matches!(self, Token::Enum | Token::Func | Token::Return)
    }

    /// Describes the token for "expected X, got Y" messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Eof => "end of input".to_string(),
            Token::StringLit(s) => format!("\"{}\"", s),
            other => format!("`{}`", other),
        }
    }
}

/// Parses an integer literal as written by the lexer (decimal or `0x` hex).
pub fn parse_number(text: &str) -> Option<i64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Token::Number(n) => return write!(f, "{}", n),
            Token::StringLit(s) => return write!(f, "\"{}\"", s),
            Token::Bool(b) => return write!(f, "{}", b),
            Token::Symbol(s) => return write!(f, "{}", s),
            Token::IntType => "int",
            Token::StrType => "str",
            Token::BoolType => "bool",
            Token::VoidType => "void",
            Token::Break => "break",
            Token::Case => "case",
            Token::Const => "const",
            Token::Continue => "continue",
            Token::Default => "default",
            Token::Do => "do",
            Token::Else => "else",
            Token::For => "for",
            Token::Goto => "goto",
            Token::If => "if",
            Token::Switch => "switch",
            Token::While => "while",
            Token::State => "state",
            Token::Event => "event",
            Token::Mainloop => "mainloop",
            Token::Onenter => "onenter",
            Token::Onexit => "onexit",
            Token::Funcdef => "funcdef",
            Token::Eventdef => "eventdef",
            Token::Enum => "enum",
            Token::Func => "func",
            Token::Return => "return",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::LtEq => "<=",
            Token::GtEq => ">=",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::Bang => "!",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::PercentAssign => "%=",
            Token::ShlAssign => "<<=",
            Token::ShrAssign => ">>=",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Question => "?",
            Token::Colon => ":",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Dot => ".",
            Token::Hash => "#",
            Token::Eof => "EOF",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(Token::keyword("while"), Some(Token::While));
        assert_eq!(Token::keyword("true"), Some(Token::Bool(true)));
        assert_eq!(Token::keyword("While"), None);
        assert_eq!(Token::keyword("health"), None);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Token::Symbol("x".into()).kind(), TokenKind::Symbol);
        assert_eq!(Token::ShlAssign.kind(), TokenKind::Operator);
        assert_eq!(Token::Semicolon.kind(), TokenKind::Punctuation);
        assert_eq!(Token::Mainloop.kind(), TokenKind::Keyword);
        assert_eq!(Token::Eof.kind(), TokenKind::Eof);
    }

    #[test]
    fn test_describe() {
        assert_eq!(Token::Semicolon.describe(), "`;`");
        assert_eq!(Token::StringLit("idle".into()).describe(), "\"idle\"");
        assert_eq!(Token::Eof.describe(), "end of input");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("0x2A"), Some(42));
        assert_eq!(parse_number("0xZZ"), None);
    }
}
