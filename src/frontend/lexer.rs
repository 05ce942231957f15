use std::sync::Arc;

use thiserror::Error;

use crate::frontend::token::Token;

/// Source location of a token: file, 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub file: Arc<str>,
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(file: Arc<str>, line: usize, col: usize) -> Self {
        Span { file, line, col }
    }

    /// Location used for errors about a whole file (unreadable, bad header).
    pub fn start_of(file: &str) -> Self {
        Span::new(Arc::from(file), 1, 1)
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, Clone, Error)]
#[error("{span}: {message}")]
pub struct LexerError {
    pub message: String,
    pub span: Span,
}

pub struct Lexer {
    source: Vec<char>,
    file: Arc<str>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str, file: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            file: Arc::from(file),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.source.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span::new(self.file.clone(), self.line, self.col)
    }

    fn error(&self, message: impl Into<String>, span: Span) -> LexerError {
        LexerError {
            message: message.into(),
            span,
        }
    }

    /// Skips whitespace and both comment styles.
    fn skip_trivia(&mut self) -> Result<(), LexerError> {
        loop {
            match (self.current(), self.peek()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.advance();
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.current() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.span();
                    self.advance();
                    self.advance();
                    loop {
                        match (self.current(), self.peek()) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => {
                                self.advance();
                            }
                            (None, _) => {
                                return Err(self.error("unterminated block comment", start));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_string(&mut self) -> Result<Token, LexerError> {
        let start = self.span();
        self.advance();

        let mut string = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Ok(Token::StringLit(string));
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => string.push('\n'),
                        Some('t') => string.push('\t'),
                        Some('\\') => string.push('\\'),
                        Some('"') => string.push('"'),
                        Some(ch) => {
                            return Err(self.error(
                                format!("unknown escape sequence: \\{}", ch),
                                self.span(),
                            ));
                        }
                        None => {
                            return Err(
                                self.error("unexpected EOF in escape sequence", self.span())
                            );
                        }
                    }
                    self.advance();
                }
                Some('\n') => {
                    return Err(self.error(
                        "unterminated string (newline before closing quote)",
                        start,
                    ));
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
                None => return Err(self.error("unterminated string literal", start)),
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start = self.span();

        if self.current() == Some('0') && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            self.advance();

            let mut hex = String::from("0x");
            while let Some(ch) = self.current() {
                if ch.is_ascii_hexdigit() {
                    hex.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }

            if hex.len() == 2 {
                return Err(self.error("expected hex digits after 0x", start));
            }
            return Ok(Token::Number(hex));
        }

        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if self
            .current()
            .map(|c| c.is_alphabetic() || c == '_')
            .unwrap_or(false)
        {
            return Err(self.error(format!("invalid number: {}{}", digits, self.current().unwrap_or(' ')), start));
        }

        Ok(Token::Number(digits))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::keyword(&ident).unwrap_or(Token::Symbol(ident))
    }

    /// Longest-match operator and punctuation scan.
    fn read_operator(&mut self) -> Option<Token> {
        let three = match (self.current()?, self.peek(), self.peek_at(2)) {
            ('<', Some('<'), Some('=')) => Some(Token::ShlAssign),
            ('>', Some('>'), Some('=')) => Some(Token::ShrAssign),
            _ => None,
        };
        if let Some(token) = three {
            for _ in 0..3 {
                self.advance();
            }
            return Some(token);
        }

        let two = match (self.current()?, self.peek()) {
            ('<', Some('<')) => Some(Token::Shl),
            ('>', Some('>')) => Some(Token::Shr),
            ('<', Some('=')) => Some(Token::LtEq),
            ('>', Some('=')) => Some(Token::GtEq),
            ('=', Some('=')) => Some(Token::EqEq),
            ('!', Some('=')) => Some(Token::NotEq),
            ('&', Some('&')) => Some(Token::AndAnd),
            ('|', Some('|')) => Some(Token::OrOr),
            ('+', Some('=')) => Some(Token::PlusAssign),
            ('-', Some('=')) => Some(Token::MinusAssign),
            ('*', Some('=')) => Some(Token::StarAssign),
            ('/', Some('=')) => Some(Token::SlashAssign),
            ('%', Some('=')) => Some(Token::PercentAssign),
            ('+', Some('+')) => Some(Token::PlusPlus),
            ('-', Some('-')) => Some(Token::MinusMinus),
            _ => None,
        };
        if let Some(token) = two {
            self.advance();
            self.advance();
            return Some(token);
        }

        let one = match self.current()? {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '<' => Token::Lt,
            '>' => Token::Gt,
            '&' => Token::Amp,
            '|' => Token::Pipe,
            '^' => Token::Caret,
            '!' => Token::Bang,
            '=' => Token::Assign,
            '?' => Token::Question,
            ':' => Token::Colon,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '.' => Token::Dot,
            '#' => Token::Hash,
            _ => return None,
        };
        self.advance();
        Some(one)
    }

    /// Lexes the whole source. The result always ends with `Token::Eof`.
    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia()?;
            let span = self.span();

            let token = match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('"') => self.read_string()?,
                Some(ch) if ch.is_ascii_digit() => self.read_number()?,
                Some(ch) if ch.is_alphabetic() || ch == '_' => self.read_identifier(),
                Some(ch) => match self.read_operator() {
                    Some(token) => token,
                    None => {
                        return Err(self.error(format!("unexpected character: '{}'", ch), span));
                    }
                },
            };
            tokens.push(Spanned { token, span });
        }

        Ok(tokens)
    }
}
