use std::fmt::Write;

use crate::frontend::lexer::Spanned;
use crate::frontend::token::{Token, TokenKind};

pub struct TokenDumper {
    pub color: bool,
    pub show_file: bool, // prefix each line with the source file, useful once includes are expanded
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_file: false,
        }
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

    pub fn with_files(mut self) -> Self {
        self.show_file = true;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        print!("{}", self.render(tokens));
    }

    pub fn render(&self, tokens: &[Spanned]) -> String {
        let mut out = String::new();
        for s in tokens {
            self.render_one(&mut out, s);
        }
        out
    }

    fn render_one(&self, out: &mut String, s: &Spanned) {
        let colr = if self.color { self.color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        if self.show_file {
            let _ = write!(out, "{} ", s.span.file);
        }
        let _ = writeln!(
            out,
            "[{:02}:{:02}] {}{:<8} {}{}",
            s.span.line,
            s.span.col,
            colr,
            self.kind(&s.token),
            s.token,
            reset
        );
    }

    fn kind(&self, t: &Token) -> &'static str {
        match t.kind() {
            TokenKind::Symbol => "SYMBOL",
            TokenKind::Keyword => "KEYWORD",
            TokenKind::Number => "NUMBER",
            TokenKind::String => "STRING",
            TokenKind::Operator => "OP",
            TokenKind::Punctuation => "PUNCT",
            TokenKind::Eof => "EOF",
        }
    }

    fn color(&self, t: &Token) -> &'static str {
        match t.kind() {
            TokenKind::Eof | TokenKind::Punctuation => Self::DIM,
            TokenKind::String => Self::GRN,
            TokenKind::Number => Self::CYN,
            TokenKind::Symbol => Self::YEL,
            TokenKind::Operator => Self::MAG,
            TokenKind::Keyword => Self::BLU,
        }
    }
}
