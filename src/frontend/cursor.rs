use crate::error::{ErrorKind, ScriptError};
use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::token::Token;

/// Read-only cursor over an expanded token stream.
///
/// The stream always ends with `Token::Eof`; reading past it keeps
/// returning the `Eof` token, so lookahead never has to deal with `None`.
pub struct TokenCursor {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl TokenCursor {
    pub fn new(mut tokens: Vec<Spanned>) -> Self {
        if !matches!(tokens.last().map(|s| &s.token), Some(Token::Eof)) {
            let span = tokens
                .last()
                .map(|s| s.span.clone())
                .unwrap_or_else(|| Span::start_of("<input>"));
            tokens.push(Spanned {
                token: Token::Eof,
                span,
            });
        }
        TokenCursor { tokens, pos: 0 }
    }

    fn at(&self, index: usize) -> &Spanned {
        let last = self.tokens.len() - 1;
        &self.tokens[index.min(last)]
    }

    pub fn current(&self) -> &Spanned {
        self.at(self.pos)
    }

    pub fn peek(&self) -> &Token {
        &self.current().token
    }

    /// Looks `n` tokens ahead; `peek_nth(0)` is `peek()`.
    pub fn peek_nth(&self, n: usize) -> &Token {
        &self.at(self.pos + n).token
    }

    pub fn position(&self) -> Span {
        self.current().span.clone()
    }

    pub fn at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    /// Consumes and returns the current token.
    pub fn advance(&mut self) -> Spanned {
        let spanned = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        spanned
    }

    pub fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    /// Consumes the current token if it equals `token`.
    pub fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, token: &Token) -> Result<Span, ScriptError> {
        if self.check(token) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&token.describe()))
        }
    }

    pub fn expect_symbol(&mut self) -> Result<(String, Span), ScriptError> {
        match self.peek() {
            Token::Symbol(name) => {
                let name = name.clone();
                Ok((name, self.advance().span))
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    pub fn expect_string(&mut self) -> Result<(String, Span), ScriptError> {
        match self.peek() {
            Token::StringLit(text) => {
                let text = text.clone();
                Ok((text, self.advance().span))
            }
            _ => Err(self.unexpected("a string")),
        }
    }

    /// Syntax error of the form "expected X, got Y" at the current token.
    pub fn unexpected(&self, expected: &str) -> ScriptError {
        self.error(
            ErrorKind::Syntax,
            format!("expected {}, got {}", expected, self.peek().describe()),
        )
    }

    pub fn error(&self, kind: ErrorKind, message: impl Into<String>) -> ScriptError {
        ScriptError::new(kind, self.position(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn cursor(source: &str) -> TokenCursor {
        TokenCursor::new(Lexer::new(source, "test.bts").tokenize().unwrap())
    }

    #[test]
    fn test_peek_and_advance() {
        let mut c = cursor("wait ( 1 )");
        assert_eq!(c.peek(), &Token::Symbol("wait".to_string()));
        assert_eq!(c.peek_nth(1), &Token::LParen);
        assert_eq!(c.peek_nth(10), &Token::Eof);
        c.advance();
        assert!(c.check(&Token::LParen));
        assert!(c.eat(&Token::LParen));
        assert!(!c.eat(&Token::RParen));
    }

    #[test]
    fn test_advance_stops_at_eof() {
        let mut c = cursor("x");
        c.advance();
        assert!(c.at_end());
        c.advance();
        c.advance();
        assert!(c.at_end());
    }

    #[test]
    fn test_expect_message() {
        let mut c = cursor("}");
        let err = c.expect(&Token::Semicolon).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.message, "expected `;`, got `}`");
        assert_eq!(err.to_string(), "test.bts:1:1: expected `;`, got `}`");
    }

    #[test]
    fn test_expect_symbol_and_string() {
        let mut c = cursor("idle \"idle\"");
        assert_eq!(c.expect_symbol().unwrap().0, "idle");
        assert_eq!(c.expect_string().unwrap().0, "idle");
        let err = c.expect_symbol().unwrap_err();
        assert_eq!(err.message, "expected a name, got end of input");
    }

    #[test]
    fn test_empty_stream_gets_eof() {
        let c = TokenCursor::new(Vec::new());
        assert!(c.at_end());
        assert_eq!(c.position().line, 1);
    }
}
