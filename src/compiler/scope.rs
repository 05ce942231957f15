use thiserror::Error;

use crate::bytecode::{BufferError, BytecodeBuffer, MarkAllocator, MarkId, Op, Operand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    If,
    Else,
    While,
    For,
    Do,
    Switch,
    /// A bare `{ ... }` used as a statement.
    Block,
}

impl ScopeKind {
    pub fn is_loop(self) -> bool {
        matches!(self, ScopeKind::While | ScopeKind::For | ScopeKind::Do)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("blocks nested too deeply (limit {max})")]
    TooDeep { max: usize },

    #[error("too many cases in switch (limit {max})")]
    TooManyCases { max: usize },

    #[error("duplicate case {0}")]
    DuplicateCase(i32),

    #[error("switch already has a default")]
    DuplicateDefault,

    #[error("{0} must be directly inside a switch")]
    NotInSwitch(&'static str),

    #[error("`{0}` outside of a loop or switch")]
    NoEnclosing(&'static str),
}

/// One `case`/`default` label and the code under it.
#[derive(Debug)]
pub struct CaseEntry {
    /// `None` for `default`.
    pub value: Option<i32>,
    pub mark: MarkId,
    pub body: BytecodeBuffer,
}

/// An open block construct.
///
/// `entry` is where `continue` goes (loops) or the false branch (if);
/// `exit` is where `break` goes or the end of the construct; `top` is the
/// first instruction of a loop body. All three are allocated for every
/// scope and bound by whoever closes it; unused ones stay unbound and are
/// never referenced.
#[derive(Debug)]
pub struct ScopeInfo {
    pub kind: ScopeKind,
    pub entry: MarkId,
    pub exit: MarkId,
    pub top: MarkId,
    /// Code compiled now but placed later (a `for` increment).
    pub deferred: Option<BytecodeBuffer>,
    pub cases: Vec<CaseEntry>,
    active_case: Option<usize>,
}

/// The three marks of a scope, detached from it.
#[derive(Debug, Clone, Copy)]
pub struct ScopeMarks {
    pub entry: MarkId,
    pub exit: MarkId,
    pub top: MarkId,
}

impl ScopeInfo {
    pub fn marks(&self) -> ScopeMarks {
        ScopeMarks {
            entry: self.entry,
            exit: self.exit,
            top: self.top,
        }
    }

    pub fn has_active_case(&self) -> bool {
        self.active_case.is_some()
    }

    /// Writes the dispatch table for a closed switch into `target`, then the
    /// case bodies in source order, then binds the exit mark after them.
    ///
    /// The switch value is on the stack when the table runs: each `CaseGoto`
    /// compares against it, a `Drop` discards it when nothing matched, and a
    /// `Goto` falls back to `default` or past the switch.
    pub fn close_switch(self, target: &mut BytecodeBuffer) -> Result<(), BufferError> {
        for case in &self.cases {
            if let Some(value) = case.value {
                target.emit(Op::CaseGoto, &[Operand::Int(value), case.mark.into()]);
            }
        }
        target.emit(Op::Drop, &[]);
        let fallback = self
            .cases
            .iter()
            .find(|c| c.value.is_none())
            .map(|c| c.mark)
            .unwrap_or(self.exit);
        target.emit(Op::Goto, &[fallback.into()]);

        for case in self.cases {
            let at = target.len();
            target.splice(case.body, at)?;
            target.bind_mark(case.mark, at)?;
        }
        target.bind_here(self.exit)
    }
}

/// Stack of open block constructs, bounded by a maximum depth.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<ScopeInfo>,
    max_depth: usize,
    max_cases: usize,
}

impl ScopeStack {
    pub fn new(max_depth: usize, max_cases: usize) -> Self {
        ScopeStack {
            scopes: Vec::new(),
            max_depth,
            max_cases,
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn push(
        &mut self,
        kind: ScopeKind,
        marks: &MarkAllocator,
    ) -> Result<&mut ScopeInfo, ScopeError> {
        if self.scopes.len() >= self.max_depth {
            return Err(ScopeError::TooDeep {
                max: self.max_depth,
            });
        }
        self.scopes.push(ScopeInfo {
            kind,
            entry: marks.next(),
            exit: marks.next(),
            top: marks.next(),
            deferred: None,
            cases: Vec::new(),
            active_case: None,
        });
        let last = self.scopes.len() - 1;
        Ok(&mut self.scopes[last])
    }

    pub fn pop(&mut self) -> Option<ScopeInfo> {
        self.scopes.pop()
    }

    pub fn top(&self) -> Option<&ScopeInfo> {
        self.scopes.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut ScopeInfo> {
        self.scopes.last_mut()
    }

    /// Nearest open scope, innermost first, that matches `pred`.
    pub fn find_nearest(&self, pred: impl Fn(&ScopeInfo) -> bool) -> Option<&ScopeInfo> {
        self.scopes.iter().rev().find(|s| pred(s))
    }

    pub fn break_target(&self) -> Result<MarkId, ScopeError> {
        self.find_nearest(|s| s.kind.is_loop() || s.kind == ScopeKind::Switch)
            .map(|s| s.exit)
            .ok_or(ScopeError::NoEnclosing("break"))
    }

    pub fn continue_target(&self) -> Result<MarkId, ScopeError> {
        self.find_nearest(|s| s.kind.is_loop())
            .map(|s| s.entry)
            .ok_or(ScopeError::NoEnclosing("continue"))
    }

    /// Opens a new case on the innermost scope, which must be a switch.
    /// The case's mark is bound to the start of `body` when the switch closes.
    pub fn add_case(
        &mut self,
        value: Option<i32>,
        body: BytecodeBuffer,
    ) -> Result<MarkId, ScopeError> {
        let label = if value.is_some() { "case" } else { "default" };
        let max_cases = self.max_cases;
        let scope = match self.scopes.last_mut() {
            Some(s) if s.kind == ScopeKind::Switch => s,
            _ => return Err(ScopeError::NotInSwitch(label)),
        };

        match value {
            Some(v) if scope.cases.iter().any(|c| c.value == Some(v)) => {
                return Err(ScopeError::DuplicateCase(v));
            }
            None if scope.cases.iter().any(|c| c.value.is_none()) => {
                return Err(ScopeError::DuplicateDefault);
            }
            _ => {}
        }
        if scope.cases.len() >= max_cases {
            return Err(ScopeError::TooManyCases { max: max_cases });
        }

        let mark = body.create_mark();
        scope.cases.push(CaseEntry { value, mark, body });
        scope.active_case = Some(scope.cases.len() - 1);
        Ok(mark)
    }

    /// Buffer of the case currently open in the nearest switch, if any.
    pub fn active_case_buffer(&mut self) -> Option<&mut BytecodeBuffer> {
        let scope = self
            .scopes
            .iter_mut()
            .rev()
            .find(|s| s.kind == ScopeKind::Switch)?;
        let i = scope.active_case?;
        Some(&mut scope.cases[i].body)
    }
}
