use thiserror::Error;

use crate::bytecode::buffer::BufferError;
use crate::frontend::lexer::{LexerError, Span};

/// Classification of a user-facing script error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    UnknownIdentifier,
    TypeMismatch,
    DuplicateCase,
    DuplicateName,
    /// `break`, `continue`, `case` or `default` with no enclosing construct to bind to.
    Misplaced,
    LimitExceeded,
    Include,
    Reserved,
}

/// An error in the compiled script, reported with its source position.
///
/// Formats as `file:line:col: message` for CLI-friendly diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{span}: {message}")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        ScriptError {
            kind,
            span,
            message: message.into(),
        }
    }
}

impl From<LexerError> for ScriptError {
    fn from(e: LexerError) -> Self {
        ScriptError::new(ErrorKind::Syntax, e.span, e.message)
    }
}

/// A compiler defect. Never caused by script content.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("scope stack underflow")]
    ScopeUnderflow,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("internal compiler error: {0}")]
    Internal(#[from] InternalError),
}

impl CompileError {
    /// The script error kind, if this is a script error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CompileError::Script(e) => Some(e.kind),
            CompileError::Internal(_) => None,
        }
    }
}

impl From<BufferError> for CompileError {
    fn from(e: BufferError) -> Self {
        CompileError::Internal(InternalError::Buffer(e))
    }
}

impl From<LexerError> for CompileError {
    fn from(e: LexerError) -> Self {
        CompileError::Script(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        let err = ScriptError::new(
            ErrorKind::Syntax,
            Span::start_of("bot.bts"),
            "expected `;`, got `}`",
        );
        assert_eq!(err.to_string(), "bot.bts:1:1: expected `;`, got `}`");
    }

    #[test]
    fn test_kind_of_internal_error() {
        let err = CompileError::Internal(InternalError::ScopeUnderflow);
        assert_eq!(err.kind(), None);
        assert_eq!(err.to_string(), "internal compiler error: scope stack underflow");
    }
}
