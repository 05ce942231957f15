//! Single-pass compiler from a token stream to bytecode segments.
//!
//! The compiler never builds a syntax tree. Expressions and statements emit
//! straight into the current output buffer; jump targets that are not known
//! yet are marks, resolved when the segment is finalized. Code that has to
//! move (switch case bodies, `for` increments) is compiled into child
//! buffers and spliced into place when its construct closes.

pub mod expr;
pub mod program;
pub mod scope;
pub mod stmt;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::bytecode::{BytecodeBuffer, MarkId, ObjectFile, ObjectWriter, SegmentKind, Statistics};
use crate::config::Limits;
use crate::error::{CompileError, ErrorKind, ScriptError};
use crate::frontend::cursor::TokenCursor;
use crate::frontend::include::SourceLoader;
use crate::frontend::lexer::{Span, Spanned};
use crate::registry::Definitions;
use crate::tables::{GlobalTable, StringTable, TableError};
use crate::types::{Literal, ScriptVariable, Type, VarScope};

use scope::{ScopeError, ScopeStack};

/// Result of a successful compile.
#[derive(Debug)]
pub struct Compilation {
    pub object: ObjectFile,
    pub stats: Statistics,
}

/// Compiles an already expanded token stream.
pub fn compile(
    tokens: Vec<Spanned>,
    defs: &Definitions,
    limits: &Limits,
) -> Result<Compilation, CompileError> {
    let mut compiler = Compiler::new(tokens, defs, limits);
    compiler.program()?;
    Ok(compiler.finish())
}

/// Lexes, expands and compiles an in-memory script named `name`.
pub fn compile_source(
    source: &str,
    name: &str,
    defs: &Definitions,
    limits: &Limits,
) -> Result<Compilation, CompileError> {
    let tokens = SourceLoader::new(limits).load_source(source, Path::new(name))?;
    compile(tokens, defs, limits)
}

/// What a name in an expression refers to.
#[derive(Debug, Clone)]
enum Binding {
    Var(ScriptVariable),
    Const(Literal),
}

#[derive(Debug)]
struct Label {
    mark: MarkId,
    defined: bool,
    first_use: Option<Span>,
}

pub(crate) struct Compiler<'a> {
    cursor: TokenCursor,
    defs: &'a Definitions,
    limits: &'a Limits,

    strings: StringTable,
    globals: GlobalTable,
    constants: HashMap<String, Literal>,
    writer: ObjectWriter,
    state_names: HashSet<String>,
    /// (owning state, event index) pairs already handled.
    handlers: HashSet<(Option<u32>, u32)>,

    // Per state
    current_state: Option<u32>,
    state_segments: Vec<SegmentKind>,
    locals: Vec<ScriptVariable>,
    next_local_slot: u32,

    // Per segment
    segment: BytecodeBuffer,
    scopes: ScopeStack,
    /// Buffers that temporarily take all output, innermost last.
    captures: Vec<BytecodeBuffer>,
    labels: HashMap<String, Label>,
    /// Nesting depth of command argument lists; fractional literals are
    /// only accepted inside one.
    arg_depth: usize,
    /// Current expression nesting, bounded by `max_expression_depth`.
    expr_depth: usize,

    marks_resolved: usize,
    references_resolved: usize,
}

impl<'a> Compiler<'a> {
    fn new(tokens: Vec<Spanned>, defs: &'a Definitions, limits: &'a Limits) -> Self {
        Compiler {
            cursor: TokenCursor::new(tokens),
            defs,
            limits,
            strings: StringTable::new(limits),
            globals: GlobalTable::new(limits),
            constants: HashMap::new(),
            writer: ObjectWriter::new(),
            state_names: HashSet::new(),
            handlers: HashSet::new(),
            current_state: None,
            state_segments: Vec::new(),
            locals: Vec::new(),
            next_local_slot: 0,
            segment: BytecodeBuffer::new(),
            scopes: ScopeStack::new(limits.max_scope_depth, limits.max_cases),
            captures: Vec::new(),
            labels: HashMap::new(),
            arg_depth: 0,
            expr_depth: 0,
            marks_resolved: 0,
            references_resolved: 0,
        }
    }

    fn finish(self) -> Compilation {
        let object = self
            .writer
            .finish(self.strings.into_strings(), self.globals.len() as u32);
        let mut stats = Statistics::for_object(&object, self.limits);
        stats.marks = self.marks_resolved;
        stats.references = self.references_resolved;
        Compilation { object, stats }
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Buffer that currently receives code: an active capture, else the
    /// open case of the nearest switch, else the segment itself.
    fn out(&mut self) -> &mut BytecodeBuffer {
        if let Some(capture) = self.captures.last_mut() {
            return capture;
        }
        if let Some(case) = self.scopes.active_case_buffer() {
            return case;
        }
        &mut self.segment
    }

    fn new_mark(&self) -> MarkId {
        self.segment.create_mark()
    }

    fn bind_here(&mut self, mark: MarkId) -> Result<(), CompileError> {
        self.out().bind_here(mark)?;
        Ok(())
    }

    // =========================================================================
    // Errors
    // =========================================================================

    fn error(&self, kind: ErrorKind, span: Span, message: impl Into<String>) -> CompileError {
        ScriptError::new(kind, span, message).into()
    }

    fn scope_error(&self, e: ScopeError, span: Span) -> CompileError {
        let kind = match e {
            ScopeError::TooDeep { .. } | ScopeError::TooManyCases { .. } => ErrorKind::LimitExceeded,
            ScopeError::DuplicateCase(_) | ScopeError::DuplicateDefault => ErrorKind::DuplicateCase,
            ScopeError::NotInSwitch(_) | ScopeError::NoEnclosing(_) => ErrorKind::Misplaced,
        };
        self.error(kind, span, e.to_string())
    }

    fn table_error(&self, e: TableError, span: Span) -> CompileError {
        let kind = match e {
            TableError::DuplicateGlobal(_) => ErrorKind::DuplicateName,
            _ => ErrorKind::LimitExceeded,
        };
        self.error(kind, span, e.to_string())
    }

    // =========================================================================
    // Names
    // =========================================================================

    fn resolve(&self, name: &str) -> Option<Binding> {
        if let Some(var) = self.locals.iter().rev().find(|v| v.name == name) {
            return Some(Binding::Var(var.clone()));
        }
        if let Some(var) = self.globals.lookup(name) {
            return Some(Binding::Var(var.clone()));
        }
        self.constants.get(name).cloned().map(Binding::Const)
    }

    /// Rejects names that would be ambiguous with a command.
    fn check_not_command(&self, name: &str, span: &Span) -> Result<(), CompileError> {
        match self.defs.commands.lookup(name) {
            Some(def) => Err(self.error(
                ErrorKind::DuplicateName,
                span.clone(),
                format!("`{}` is the name of a command", def.name),
            )),
            None => Ok(()),
        }
    }

    fn declare_local(&mut self, name: &str, ty: Type, span: Span) -> Result<ScriptVariable, CompileError> {
        self.check_not_command(name, &span)?;
        if self.locals.iter().any(|v| v.name == name) {
            return Err(self.error(
                ErrorKind::DuplicateName,
                span,
                format!("`{}` is already declared", name),
            ));
        }
        if self.next_local_slot as usize >= self.limits.max_state_vars {
            return Err(self.error(
                ErrorKind::LimitExceeded,
                span,
                format!("too many state variables (limit {})", self.limits.max_state_vars),
            ));
        }
        let var = ScriptVariable {
            name: name.to_string(),
            ty,
            scope: VarScope::Local,
            slot: self.next_local_slot,
        };
        self.next_local_slot += 1;
        self.locals.push(var.clone());
        Ok(var)
    }

    fn check_type(&self, want: Type, found: Type, span: Span) -> Result<(), CompileError> {
        if want.accepts(found) {
            Ok(())
        } else {
            Err(self.error(
                ErrorKind::TypeMismatch,
                span,
                format!("expected {}, got {}", want, found),
            ))
        }
    }
}
