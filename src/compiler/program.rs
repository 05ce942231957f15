use tracing::{debug, warn};

use crate::bytecode::{BytecodeBuffer, SegmentKind};
use crate::compiler::Compiler;
use crate::compiler::expr::int_value;
use crate::compiler::scope::ScopeStack;
use crate::error::{CompileError, ErrorKind};
use crate::frontend::lexer::Span;
use crate::frontend::token::Token;
use crate::types::{Literal, Type};

// =============================================================================
// Top level
// =============================================================================

impl<'a> Compiler<'a> {
    pub(crate) fn program(&mut self) -> Result<(), CompileError> {
        while !self.cursor.at_end() {
            self.top_level()?;
        }
        debug!(
            states = self.writer.state_count(),
            globals = self.globals.len(),
            strings = self.strings.len(),
            "compiled program"
        );
        Ok(())
    }

    fn top_level(&mut self) -> Result<(), CompileError> {
        let span = self.cursor.position();
        match self.cursor.peek() {
            Token::State => self.state_block(),
            Token::Event => {
                self.locals.clear();
                self.next_local_slot = 0;
                self.event_block(None)
            }
            Token::Const => self.const_declaration(),
            token if Type::from_token(token).is_some() => self.global_declaration(),
            token @ (Token::Mainloop | Token::Onenter | Token::Onexit) => Err(self.error(
                ErrorKind::Misplaced,
                span,
                format!("{} must be inside a state", token.describe()),
            )),
            token if token.is_reserved() => Err(self.error(
                ErrorKind::Reserved,
                span,
                format!("{} is reserved", token.describe()),
            )),
            _ => Err(self
                .cursor
                .unexpected("`state`, `event`, `const` or a declaration")
                .into()),
        }
    }

    // =========================================================================
    // States
    // =========================================================================

    fn state_block(&mut self) -> Result<(), CompileError> {
        self.cursor.advance();
        let span = self.cursor.position();
        let name = match self.cursor.peek() {
            Token::StringLit(_) => self.cursor.expect_string()?.0,
            _ => self.cursor.expect_symbol()?.0,
        };

        if !self.state_names.insert(name.to_lowercase()) {
            return Err(self.error(
                ErrorKind::DuplicateName,
                span,
                format!("state `{}` is already defined", name),
            ));
        }
        if self.writer.state_count() >= self.limits.max_states {
            return Err(self.error(
                ErrorKind::LimitExceeded,
                span,
                format!("too many states (limit {})", self.limits.max_states),
            ));
        }

        let index = self.writer.begin_state(&name);
        self.current_state = Some(index);
        self.state_segments.clear();
        self.locals.clear();
        self.next_local_slot = 0;

        self.cursor.expect(&Token::LBrace)?;
        while !self.cursor.eat(&Token::RBrace) {
            let span = self.cursor.position();
            let kind = match self.cursor.peek() {
                Token::Mainloop => SegmentKind::MainLoop,
                Token::Onenter => SegmentKind::OnEnter,
                Token::Onexit => SegmentKind::OnExit,
                Token::Event => {
                    self.event_block(Some(index))?;
                    continue;
                }
                token if Type::from_token(token).is_some() => {
                    self.declaration(false)?;
                    self.cursor.expect(&Token::Semicolon)?;
                    continue;
                }
                Token::State => {
                    return Err(self.error(
                        ErrorKind::Misplaced,
                        span,
                        "states cannot be nested",
                    ));
                }
                _ => {
                    return Err(self
                        .cursor
                        .unexpected("`mainloop`, `onenter`, `onexit`, `event` or a declaration")
                        .into());
                }
            };

            if self.state_segments.contains(&kind) {
                return Err(self.error(
                    ErrorKind::DuplicateName,
                    span,
                    format!("state `{}` has more than one {} block", name, kind),
                ));
            }
            self.state_segments.push(kind);
            self.cursor.advance();
            self.compile_segment(kind, Some(index), span)?;
        }

        self.writer.set_local_count(index, self.next_local_slot);
        debug!(state = %name, index, locals = self.next_local_slot, "compiled state");
        self.current_state = None;
        self.locals.clear();
        Ok(())
    }

    fn event_block(&mut self, owner: Option<u32>) -> Result<(), CompileError> {
        let span = self.cursor.advance().span;
        let (name, name_span) = self.cursor.expect_symbol()?;
        let index = match self.defs.events.lookup(&name) {
            Some(event) => event.index,
            None => {
                return Err(self.error(
                    ErrorKind::UnknownIdentifier,
                    name_span,
                    format!("unknown event `{}`", name),
                ));
            }
        };

        if self.handlers.contains(&(owner, index)) {
            return Err(self.error(
                ErrorKind::DuplicateName,
                name_span,
                format!("event `{}` is already handled here", name),
            ));
        }
        // A global handler and state handlers for one event exclude each other.
        let clash = match owner {
            None => self.handlers.iter().any(|&(o, i)| o.is_some() && i == index),
            Some(_) => self.handlers.contains(&(None, index)),
        };
        if clash {
            return Err(self.error(
                ErrorKind::DuplicateName,
                name_span,
                format!(
                    "event `{}` cannot have both a global handler and state handlers",
                    name
                ),
            ));
        }
        if self.handlers.len() >= self.limits.max_events {
            return Err(self.error(
                ErrorKind::LimitExceeded,
                name_span,
                format!("too many event handlers (limit {})", self.limits.max_events),
            ));
        }
        self.handlers.insert((owner, index));

        self.compile_segment(SegmentKind::Event(index), owner, span)
    }

    /// Compiles one `{ ... }` block into its own finalized segment.
    fn compile_segment(
        &mut self,
        kind: SegmentKind,
        owner: Option<u32>,
        span: Span,
    ) -> Result<(), CompileError> {
        self.segment = BytecodeBuffer::new();
        self.scopes = ScopeStack::new(self.limits.max_scope_depth, self.limits.max_cases);
        self.labels.clear();
        let locals_floor = self.locals.len();

        self.cursor.expect(&Token::LBrace)?;
        while !self.cursor.eat(&Token::RBrace) {
            if self.cursor.at_end() {
                return Err(self.cursor.unexpected("`}`").into());
            }
            self.statement()?;
        }
        self.check_labels()?;

        if kind == SegmentKind::MainLoop && self.segment.is_empty() {
            warn!(at = %span, "empty mainloop");
        }
        self.segment.emit(kind.end_op(), &[]);
        let code = self.segment.finalize()?;
        self.marks_resolved += self.segment.mark_count();
        self.references_resolved += self.segment.reference_count();

        debug!(
            segment = %kind,
            state = ?self.current_state,
            bytes = code.len(),
            marks = self.segment.mark_count(),
            "compiled segment"
        );
        self.writer.add_segment(owner, kind, code);
        self.locals.truncate(locals_floor);
        Ok(())
    }

    /// Every `goto` in the segment must name a label defined in it.
    fn check_labels(&self) -> Result<(), CompileError> {
        let undefined = self
            .labels
            .iter()
            .filter(|(_, label)| !label.defined)
            .filter_map(|(name, label)| label.first_use.clone().map(|span| (name, span)))
            .min_by_key(|(_, span)| (span.line, span.col));
        match undefined {
            Some((name, span)) => Err(self.error(
                ErrorKind::UnknownIdentifier,
                span,
                format!("undefined label `{}`", name),
            )),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// `const int NAME = 5;`
    fn const_declaration(&mut self) -> Result<(), CompileError> {
        self.cursor.advance();
        let ty_span = self.cursor.position();
        let ty = Type::from_token(self.cursor.peek())
            .ok_or_else(|| CompileError::from(self.cursor.unexpected("a type")))?;
        self.cursor.advance();
        if ty == Type::Void {
            return Err(self.error(ErrorKind::TypeMismatch, ty_span, "constants cannot be void"));
        }

        let (name, span) = self.cursor.expect_symbol()?;
        self.check_not_command(&name, &span)?;
        if self.constants.contains_key(&name) || self.globals.lookup(&name).is_some() {
            return Err(self.error(
                ErrorKind::DuplicateName,
                span,
                format!("`{}` is already declared", name),
            ));
        }

        self.cursor.expect(&Token::Assign)?;
        let value_span = self.cursor.position();
        let value = self.constant_value()?;
        self.check_type(ty, value.ty(), value_span)?;
        self.cursor.expect(&Token::Semicolon)?;

        let value = match (ty, value) {
            (Type::Bool, Literal::Int(v)) => Literal::Bool(v != 0),
            (Type::Int, Literal::Bool(b)) => Literal::Int(b as i32),
            (_, value) => value,
        };
        debug!(constant = %name, value = %value, "declared constant");
        self.constants.insert(name, value);
        Ok(())
    }

    fn constant_value(&mut self) -> Result<Literal, CompileError> {
        let span = self.cursor.position();
        let negative = self.cursor.eat(&Token::Minus);
        match self.cursor.peek().clone() {
            Token::Number(text) => {
                self.cursor.advance();
                int_value(&text, negative).map(Literal::Int).ok_or_else(|| {
                    self.error(
                        ErrorKind::Syntax,
                        span,
                        format!("number {} does not fit in 32 bits", text),
                    )
                })
            }
            Token::StringLit(text) if !negative => {
                self.cursor.advance();
                Ok(Literal::Str(text))
            }
            Token::Bool(b) if !negative => {
                self.cursor.advance();
                Ok(Literal::Bool(b))
            }
            _ => Err(self.cursor.unexpected("a literal").into()),
        }
    }

    /// `int a, b;` at the top level.
    fn global_declaration(&mut self) -> Result<(), CompileError> {
        let ty_span = self.cursor.position();
        let ty = Type::from_token(self.cursor.peek())
            .ok_or_else(|| CompileError::from(self.cursor.unexpected("a type")))?;
        self.cursor.advance();
        if ty == Type::Void {
            return Err(self.error(ErrorKind::TypeMismatch, ty_span, "variables cannot be void"));
        }

        loop {
            let (name, span) = self.cursor.expect_symbol()?;
            self.check_not_command(&name, &span)?;
            if self.constants.contains_key(&name) {
                return Err(self.error(
                    ErrorKind::DuplicateName,
                    span,
                    format!("`{}` is already declared", name),
                ));
            }
            if self.cursor.check(&Token::Assign) {
                return Err(self.error(
                    ErrorKind::Syntax,
                    self.cursor.position(),
                    "global variables cannot have initializers",
                ));
            }
            let slot = self
                .globals
                .declare(&name, ty)
                .map_err(|e| self.table_error(e, span))?;
            debug!(global = %name, slot, ty = %ty, "declared global");
            if !self.cursor.eat(&Token::Comma) {
                break;
            }
        }
        self.cursor.expect(&Token::Semicolon)?;
        Ok(())
    }
}
