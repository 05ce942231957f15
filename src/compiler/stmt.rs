use crate::bytecode::{MarkId, Op, Operand};
use crate::compiler::expr::int_value;
use crate::compiler::scope::{ScopeInfo, ScopeKind, ScopeMarks};
use crate::compiler::{Binding, Compiler, Label};
use crate::error::{CompileError, ErrorKind, InternalError};
use crate::frontend::lexer::Span;
use crate::frontend::token::Token;
use crate::types::{Literal, ScriptVariable, Type, VarScope};

/// Opcode updating `var` for an assignment-like token.
fn update_op(token: &Token, scope: VarScope) -> Option<Op> {
    use VarScope::{Global, Local};
    let op = match (token, scope) {
        (Token::Assign, Global) => Op::AssignGlobalVar,
        (Token::Assign, Local) => Op::AssignLocalVar,
        (Token::PlusAssign, Global) => Op::AddGlobalVar,
        (Token::PlusAssign, Local) => Op::AddLocalVar,
        (Token::MinusAssign, Global) => Op::SubtractGlobalVar,
        (Token::MinusAssign, Local) => Op::SubtractLocalVar,
        (Token::StarAssign, Global) => Op::MultiplyGlobalVar,
        (Token::StarAssign, Local) => Op::MultiplyLocalVar,
        (Token::SlashAssign, Global) => Op::DivideGlobalVar,
        (Token::SlashAssign, Local) => Op::DivideLocalVar,
        (Token::PercentAssign, Global) => Op::ModGlobalVar,
        (Token::PercentAssign, Local) => Op::ModLocalVar,
        (Token::ShlAssign, Global) => Op::LeftShiftGlobalVar,
        (Token::ShlAssign, Local) => Op::LeftShiftLocalVar,
        (Token::ShrAssign, Global) => Op::RightShiftGlobalVar,
        (Token::ShrAssign, Local) => Op::RightShiftLocalVar,
        (Token::PlusPlus, Global) => Op::IncreaseGlobalVar,
        (Token::PlusPlus, Local) => Op::IncreaseLocalVar,
        (Token::MinusMinus, Global) => Op::DecreaseGlobalVar,
        (Token::MinusMinus, Local) => Op::DecreaseLocalVar,
        _ => return None,
    };
    Some(op)
}

impl<'a> Compiler<'a> {
    pub(crate) fn statement(&mut self) -> Result<(), CompileError> {
        let span = self.cursor.position();

        if let Some(top) = self.scopes.top() {
            if top.kind == ScopeKind::Switch
                && !top.has_active_case()
                && !matches!(self.cursor.peek(), Token::Case | Token::Default)
            {
                return Err(self.error(
                    ErrorKind::Misplaced,
                    span.clone(),
                    "statements in a switch must follow a `case` or `default` label",
                ));
            }
        }

        match self.cursor.peek() {
            Token::LBrace => {
                self.push_scope(ScopeKind::Block)?;
                self.block()?;
                self.pop_scope()?;
                Ok(())
            }
            Token::Semicolon => {
                self.cursor.advance();
                Ok(())
            }
            Token::If => self.if_statement(),
            Token::While => self.while_statement(),
            Token::For => self.for_statement(),
            Token::Do => self.do_statement(),
            Token::Switch => self.switch_statement(),
            Token::Case | Token::Default => self.case_label(),
            Token::Break => {
                self.cursor.advance();
                let target = self
                    .scopes
                    .break_target()
                    .map_err(|e| self.scope_error(e, span))?;
                self.cursor.expect(&Token::Semicolon)?;
                self.out().emit(Op::Goto, &[target.into()]);
                Ok(())
            }
            Token::Continue => {
                self.cursor.advance();
                let target = self
                    .scopes
                    .continue_target()
                    .map_err(|e| self.scope_error(e, span))?;
                self.cursor.expect(&Token::Semicolon)?;
                self.out().emit(Op::Goto, &[target.into()]);
                Ok(())
            }
            Token::Goto => {
                self.cursor.advance();
                let (name, label_span) = self.cursor.expect_symbol()?;
                self.cursor.expect(&Token::Semicolon)?;
                let mark = self.label_mark(&name);
                if let Some(label) = self.labels.get_mut(&name) {
                    label.first_use.get_or_insert(label_span);
                }
                self.out().emit(Op::Goto, &[mark.into()]);
                Ok(())
            }
            Token::Symbol(name) if self.cursor.peek_nth(1) == &Token::Colon => {
                let name = name.clone();
                self.cursor.advance();
                self.cursor.advance();
                let mark = self.label_mark(&name);
                let defined = self.labels.get(&name).is_some_and(|l| l.defined);
                if defined {
                    return Err(self.error(
                        ErrorKind::DuplicateName,
                        span,
                        format!("label `{}` is already defined", name),
                    ));
                }
                if let Some(label) = self.labels.get_mut(&name) {
                    label.defined = true;
                }
                self.bind_here(mark)
            }
            Token::Const => Err(self.error(
                ErrorKind::Misplaced,
                span,
                "constants must be declared at the top level",
            )),
            token if token.is_reserved() => Err(self.error(
                ErrorKind::Reserved,
                span,
                format!("{} is reserved", token.describe()),
            )),
            _ => {
                self.simple_statement()?;
                self.cursor.expect(&Token::Semicolon)?;
                Ok(())
            }
        }
    }

    /// `{ statements }`, without a scope of its own.
    fn block(&mut self) -> Result<(), CompileError> {
        self.cursor.expect(&Token::LBrace)?;
        while !self.cursor.eat(&Token::RBrace) {
            if self.cursor.at_end() {
                return Err(self.cursor.unexpected("`}`").into());
            }
            self.statement()?;
        }
        Ok(())
    }

    /// Body of a control construct. A braced body belongs to the
    /// construct's scope.
    fn body(&mut self) -> Result<(), CompileError> {
        if self.cursor.check(&Token::LBrace) {
            self.block()
        } else {
            self.statement()
        }
    }

    fn label_mark(&mut self, name: &str) -> MarkId {
        if let Some(label) = self.labels.get(name) {
            return label.mark;
        }
        let mark = self.new_mark();
        self.labels.insert(
            name.to_string(),
            Label {
                mark,
                defined: false,
                first_use: None,
            },
        );
        mark
    }

    /// Statements allowed in `for` headers: declarations, assignments,
    /// increments and command calls. Does not consume a terminator.
    pub(crate) fn simple_statement(&mut self) -> Result<(), CompileError> {
        match self.cursor.peek() {
            token if Type::from_token(token).is_some() => self.declaration(true).map(|_| ()),
            Token::PlusPlus | Token::MinusMinus => {
                let op_token = self.cursor.advance().token;
                let (name, span) = self.cursor.expect_symbol()?;
                let var = self.assignable(&name, span.clone())?;
                self.step(&op_token, &var, span)
            }
            Token::Symbol(name) => {
                if self.defs.commands.lookup(name).is_some() {
                    let ty = self.command_call()?;
                    if ty != Type::Void {
                        self.out().emit(Op::Drop, &[]);
                    }
                    Ok(())
                } else {
                    self.assignment()
                }
            }
            _ => Err(self.cursor.unexpected("a statement").into()),
        }
    }

    /// `int a, b = 1` style local declaration.
    pub(crate) fn declaration(&mut self, allow_init: bool) -> Result<Vec<ScriptVariable>, CompileError> {
        let ty_span = self.cursor.position();
        let ty = Type::from_token(self.cursor.peek())
            .ok_or_else(|| CompileError::from(self.cursor.unexpected("a type")))?;
        self.cursor.advance();
        if ty == Type::Void {
            return Err(self.error(ErrorKind::TypeMismatch, ty_span, "variables cannot be void"));
        }

        let mut declared = Vec::new();
        loop {
            let (name, span) = self.cursor.expect_symbol()?;
            let var = self.declare_local(&name, ty, span.clone())?;
            if self.cursor.check(&Token::Assign) {
                if !allow_init {
                    return Err(self.error(
                        ErrorKind::Syntax,
                        self.cursor.position(),
                        "state variables cannot have initializers",
                    ));
                }
                self.cursor.advance();
                self.expression(Some(ty))?;
                self.out()
                    .emit(Op::AssignLocalVar, &[Operand::Int(var.slot as i32)]);
            }
            declared.push(var);
            if !self.cursor.eat(&Token::Comma) {
                break;
            }
        }
        Ok(declared)
    }

    /// Resolves an assignment target.
    fn assignable(&self, name: &str, span: Span) -> Result<ScriptVariable, CompileError> {
        match self.resolve(name) {
            Some(Binding::Var(var)) => Ok(var),
            Some(Binding::Const(_)) => Err(self.error(
                ErrorKind::Syntax,
                span,
                format!("cannot assign to constant `{}`", name),
            )),
            None => Err(self.error(
                ErrorKind::UnknownIdentifier,
                span,
                format!("unknown variable `{}`", name),
            )),
        }
    }

    fn step(&mut self, token: &Token, var: &ScriptVariable, span: Span) -> Result<(), CompileError> {
        if var.ty != Type::Int {
            return Err(self.error(
                ErrorKind::TypeMismatch,
                span,
                format!("{} needs an int variable, `{}` is {}", token.describe(), var.name, var.ty),
            ));
        }
        let op = update_op(token, var.scope)
            .ok_or_else(|| CompileError::from(self.cursor.unexpected("`++` or `--`")))?;
        self.out().emit(op, &[Operand::Int(var.slot as i32)]);
        Ok(())
    }

    fn assignment(&mut self) -> Result<(), CompileError> {
        let (name, span) = self.cursor.expect_symbol()?;
        let var = self.assignable(&name, span.clone())?;
        let token = self.cursor.peek().clone();

        match token {
            Token::Assign => {
                self.cursor.advance();
                self.expression(Some(var.ty))?;
            }
            Token::PlusPlus | Token::MinusMinus => {
                self.cursor.advance();
                return self.step(&token, &var, span);
            }
            _ if update_op(&token, var.scope).is_some() => {
                if var.ty != Type::Int {
                    return Err(self.error(
                        ErrorKind::TypeMismatch,
                        span,
                        format!("{} needs an int variable, `{}` is {}", token.describe(), name, var.ty),
                    ));
                }
                self.cursor.advance();
                self.expression(Some(Type::Int))?;
            }
            _ => return Err(self.cursor.unexpected("an assignment operator").into()),
        }

        if let Some(op) = update_op(&token, var.scope) {
            self.out().emit(op, &[Operand::Int(var.slot as i32)]);
        }
        Ok(())
    }

    fn condition(&mut self) -> Result<(), CompileError> {
        self.cursor.expect(&Token::LParen)?;
        self.expression(Some(Type::Bool))?;
        self.cursor.expect(&Token::RParen)?;
        Ok(())
    }

    fn push_scope(&mut self, kind: ScopeKind) -> Result<ScopeMarks, CompileError> {
        let span = self.cursor.position();
        match self.scopes.push(kind, self.segment.allocator()) {
            Ok(scope) => Ok(scope.marks()),
            Err(e) => Err(self.scope_error(e, span)),
        }
    }

    fn pop_scope(&mut self) -> Result<ScopeInfo, CompileError> {
        self.scopes
            .pop()
            .ok_or(CompileError::Internal(InternalError::ScopeUnderflow))
    }

    // if (cond) A [else B]
    //
    //     cond
    //     IfNotGoto false
    //     A
    //     Goto end          (only with else)
    // false:
    //     B
    // end:
    fn if_statement(&mut self) -> Result<(), CompileError> {
        self.cursor.advance();
        self.condition()?;
        let marks = self.push_scope(ScopeKind::If)?;
        self.out().emit(Op::IfNotGoto, &[marks.entry.into()]);
        self.body()?;
        self.pop_scope()?;

        if self.cursor.eat(&Token::Else) {
            self.out().emit(Op::Goto, &[marks.exit.into()]);
            self.bind_here(marks.entry)?;
            self.push_scope(ScopeKind::Else)?;
            self.body()?;
            self.pop_scope()?;
            self.bind_here(marks.exit)
        } else {
            self.bind_here(marks.entry)
        }
    }

    // entry: cond IfNotGoto exit; body; Goto entry; exit:
    fn while_statement(&mut self) -> Result<(), CompileError> {
        self.cursor.advance();
        let marks = self.push_scope(ScopeKind::While)?;
        self.bind_here(marks.entry)?;
        self.condition()?;
        self.out().emit(Op::IfNotGoto, &[marks.exit.into()]);
        self.body()?;
        self.out().emit(Op::Goto, &[marks.entry.into()]);
        self.bind_here(marks.exit)?;
        self.pop_scope()?;
        Ok(())
    }

    // init; top: cond IfNotGoto exit; body; entry: step; Goto top; exit:
    //
    // The step is parsed before the body but placed after it.
    fn for_statement(&mut self) -> Result<(), CompileError> {
        self.cursor.advance();
        self.cursor.expect(&Token::LParen)?;
        if !self.cursor.check(&Token::Semicolon) {
            self.simple_statement()?;
        }
        self.cursor.expect(&Token::Semicolon)?;

        let marks = self.push_scope(ScopeKind::For)?;
        self.bind_here(marks.top)?;
        if !self.cursor.check(&Token::Semicolon) {
            self.expression(Some(Type::Bool))?;
            self.out().emit(Op::IfNotGoto, &[marks.exit.into()]);
        }
        self.cursor.expect(&Token::Semicolon)?;

        self.captures.push(self.segment.child());
        let step = if self.cursor.check(&Token::RParen) {
            Ok(())
        } else {
            self.simple_statement()
        };
        let captured = self
            .captures
            .pop()
            .ok_or(CompileError::Internal(InternalError::ScopeUnderflow))?;
        step?;
        self.cursor.expect(&Token::RParen)?;
        if let Some(scope) = self.scopes.top_mut() {
            scope.deferred = Some(captured);
        }

        self.body()?;

        let scope = self.pop_scope()?;
        let out = self.out();
        let at = out.len();
        if let Some(step) = scope.deferred {
            out.splice(step, at)?;
        }
        out.bind_mark(marks.entry, at)?;
        out.emit(Op::Goto, &[marks.top.into()]);
        out.bind_here(marks.exit)?;
        Ok(())
    }

    // top: body; entry: cond IfGoto top; exit:
    fn do_statement(&mut self) -> Result<(), CompileError> {
        self.cursor.advance();
        let marks = self.push_scope(ScopeKind::Do)?;
        self.bind_here(marks.top)?;
        self.body()?;
        self.bind_here(marks.entry)?;
        self.cursor.expect(&Token::While)?;
        self.condition()?;
        self.cursor.expect(&Token::Semicolon)?;
        self.out().emit(Op::IfGoto, &[marks.top.into()]);
        self.bind_here(marks.exit)?;
        self.pop_scope()?;
        Ok(())
    }

    fn switch_statement(&mut self) -> Result<(), CompileError> {
        self.cursor.advance();
        self.cursor.expect(&Token::LParen)?;
        self.expression(Some(Type::Int))?;
        self.cursor.expect(&Token::RParen)?;

        self.push_scope(ScopeKind::Switch)?;
        self.cursor.expect(&Token::LBrace)?;
        while !self.cursor.eat(&Token::RBrace) {
            if self.cursor.at_end() {
                return Err(self.cursor.unexpected("`}`").into());
            }
            self.statement()?;
        }

        let scope = self.pop_scope()?;
        scope.close_switch(self.out())?;
        Ok(())
    }

    fn case_label(&mut self) -> Result<(), CompileError> {
        let span = self.cursor.position();
        let value = match self.cursor.advance().token {
            Token::Default => None,
            _ => Some(self.case_value()?),
        };
        self.cursor.expect(&Token::Colon)?;

        let body = self.segment.child();
        self.scopes
            .add_case(value, body)
            .map_err(|e| self.scope_error(e, span))?;
        Ok(())
    }

    /// Case values are integer literals, optionally negated, or int constants.
    fn case_value(&mut self) -> Result<i32, CompileError> {
        let span = self.cursor.position();
        let negative = self.cursor.eat(&Token::Minus);
        match self.cursor.peek().clone() {
            Token::Number(text) => {
                self.cursor.advance();
                int_value(&text, negative).ok_or_else(|| {
                    self.error(ErrorKind::Syntax, span, format!("case value {} does not fit in 32 bits", text))
                })
            }
            Token::Symbol(name) => {
                self.cursor.advance();
                match self.constants.get(&name) {
                    Some(Literal::Int(v)) => Ok(if negative { v.wrapping_neg() } else { *v }),
                    Some(other) => Err(self.error(
                        ErrorKind::TypeMismatch,
                        span,
                        format!("case value must be int, `{}` is {}", name, other.ty()),
                    )),
                    None => Err(self.error(
                        ErrorKind::UnknownIdentifier,
                        span,
                        format!("case value `{}` is not a constant", name),
                    )),
                }
            }
            _ => Err(self.cursor.unexpected("a case value").into()),
        }
    }
}
