use tracing::debug;

use crate::bytecode::{Op, Operand};
use crate::compiler::{Binding, Compiler};
use crate::error::{CompileError, ErrorKind};
use crate::frontend::lexer::Span;
use crate::frontend::token::{Token, parse_number};
use crate::types::{Literal, Type, VarScope};

// Binding power of binary operators; higher binds tighter. The ternary sits
// below all of them and assignment is not an expression at all.
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_BIT_OR: u8 = 3;
const PREC_BIT_XOR: u8 = 4;
const PREC_BIT_AND: u8 = 5;
const PREC_EQUALITY: u8 = 6;
const PREC_RELATIONAL: u8 = 7;
const PREC_SHIFT: u8 = 8;
const PREC_ADDITIVE: u8 = 9;
const PREC_MULTIPLICATIVE: u8 = 10;

fn binary_op(token: &Token) -> Option<(u8, Op)> {
    let entry = match token {
        Token::OrOr => (PREC_OR, Op::OrLogical),
        Token::AndAnd => (PREC_AND, Op::AndLogical),
        Token::Pipe => (PREC_BIT_OR, Op::OrBitwise),
        Token::Caret => (PREC_BIT_XOR, Op::EorBitwise),
        Token::Amp => (PREC_BIT_AND, Op::AndBitwise),
        Token::EqEq => (PREC_EQUALITY, Op::Equals),
        Token::NotEq => (PREC_EQUALITY, Op::NotEquals),
        Token::Lt => (PREC_RELATIONAL, Op::LessThan),
        Token::LtEq => (PREC_RELATIONAL, Op::AtMost),
        Token::Gt => (PREC_RELATIONAL, Op::GreaterThan),
        Token::GtEq => (PREC_RELATIONAL, Op::AtLeast),
        Token::Shl => (PREC_SHIFT, Op::LeftShift),
        Token::Shr => (PREC_SHIFT, Op::RightShift),
        Token::Plus => (PREC_ADDITIVE, Op::Add),
        Token::Minus => (PREC_ADDITIVE, Op::Subtract),
        Token::Star => (PREC_MULTIPLICATIVE, Op::Multiply),
        Token::Slash => (PREC_MULTIPLICATIVE, Op::Divide),
        Token::Percent => (PREC_MULTIPLICATIVE, Op::Modulus),
        _ => return None,
    };
    Some(entry)
}

fn yields_bool(op: Op) -> bool {
    matches!(
        op,
        Op::OrLogical
            | Op::AndLogical
            | Op::Equals
            | Op::NotEquals
            | Op::LessThan
            | Op::AtMost
            | Op::GreaterThan
            | Op::AtLeast
    )
}

pub(crate) fn is_assignment(token: &Token) -> bool {
    matches!(
        token,
        Token::Assign
            | Token::PlusAssign
            | Token::MinusAssign
            | Token::StarAssign
            | Token::SlashAssign
            | Token::PercentAssign
            | Token::ShlAssign
            | Token::ShrAssign
            | Token::PlusPlus
            | Token::MinusMinus
    )
}

/// Parses an integer literal that must fit the 32-bit operand word.
pub(crate) fn int_value(text: &str, negative: bool) -> Option<i32> {
    let v = parse_number(text)?;
    i32::try_from(if negative { -v } else { v }).ok()
}

impl<'a> Compiler<'a> {
    /// Compiles one expression, leaving its value on the stack, and returns
    /// its type. With `want` set the value must be usable as that type.
    pub(crate) fn expression(&mut self, want: Option<Type>) -> Result<Type, CompileError> {
        let span = self.cursor.position();
        let ty = self.nested(|c| c.ternary())?;

        if is_assignment(self.cursor.peek()) {
            return Err(self.error(
                ErrorKind::Syntax,
                self.cursor.position(),
                format!(
                    "{} is a statement and cannot be used inside an expression",
                    self.cursor.peek().describe()
                ),
            ));
        }
        if let Some(want) = want {
            self.check_type(want, ty, span)?;
        }
        Ok(ty)
    }

    /// Runs `inner` one expression level deeper.
    fn nested<T>(
        &mut self,
        inner: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        if self.expr_depth >= self.limits.max_expression_depth {
            return Err(self.error(
                ErrorKind::LimitExceeded,
                self.cursor.position(),
                format!(
                    "expression nested too deeply (limit {})",
                    self.limits.max_expression_depth
                ),
            ));
        }
        self.expr_depth += 1;
        let result = inner(self);
        self.expr_depth -= 1;
        result
    }

    fn ternary(&mut self) -> Result<Type, CompileError> {
        let cond_span = self.cursor.position();
        let cond = self.binary(PREC_OR)?;
        if !self.cursor.check(&Token::Question) {
            return Ok(cond);
        }
        self.check_type(Type::Bool, cond, cond_span)?;
        self.cursor.advance();

        let else_mark = self.new_mark();
        let end_mark = self.new_mark();
        self.out().emit(Op::IfNotGoto, &[else_mark.into()]);

        let then_span = self.cursor.position();
        let then_ty = self.nested(|c| c.ternary())?;
        self.cursor.expect(&Token::Colon)?;
        self.out().emit(Op::Goto, &[end_mark.into()]);
        self.bind_here(else_mark)?;

        let else_span = self.cursor.position();
        let else_ty = self.nested(|c| c.ternary())?;
        self.bind_here(end_mark)?;

        if then_ty == Type::Void {
            return Err(self.error(ErrorKind::TypeMismatch, then_span, "void value in `?:`"));
        }
        if then_ty == else_ty {
            Ok(then_ty)
        } else if Type::Int.accepts(then_ty) && Type::Int.accepts(else_ty) {
            Ok(Type::Int)
        } else {
            Err(self.error(
                ErrorKind::TypeMismatch,
                else_span,
                format!("`?:` branches differ: {} and {}", then_ty, else_ty),
            ))
        }
    }

    /// Precedence climbing over the binary operators; all are left-associative.
    fn binary(&mut self, min_prec: u8) -> Result<Type, CompileError> {
        let lhs_span = self.cursor.position();
        let mut lhs = self.unary()?;

        while let Some((prec, op)) = binary_op(self.cursor.peek()) {
            if prec < min_prec {
                break;
            }
            let symbol = self.cursor.advance().token;
            let rhs_span = self.cursor.position();
            let rhs = self.binary(prec + 1)?;

            self.check_operand(&symbol, lhs, lhs_span.clone())?;
            self.check_operand(&symbol, rhs, rhs_span)?;
            self.out().emit(op, &[]);
            lhs = if yields_bool(op) { Type::Bool } else { Type::Int };
        }
        Ok(lhs)
    }

    fn check_operand(&self, symbol: &Token, ty: Type, span: Span) -> Result<(), CompileError> {
        if Type::Int.accepts(ty) {
            Ok(())
        } else {
            Err(self.error(
                ErrorKind::TypeMismatch,
                span,
                format!("cannot apply {} to {}", symbol.describe(), ty),
            ))
        }
    }

    fn unary(&mut self) -> Result<Type, CompileError> {
        match self.cursor.peek() {
            Token::Minus => {
                self.cursor.advance();
                // Fold a negated literal so the full i32 range is reachable.
                if let Token::Number(text) = self.cursor.peek() {
                    if !matches!(self.cursor.peek_nth(1), Token::Dot) {
                        let text = text.clone();
                        let span = self.cursor.advance().span;
                        let value = self.number(&text, true, span)?;
                        self.out().emit(Op::PushNumber, &[Operand::Int(value)]);
                        return Ok(Type::Int);
                    }
                }
                let span = self.cursor.position();
                let ty = self.nested(|c| c.unary())?;
                self.check_operand(&Token::Minus, ty, span)?;
                self.out().emit(Op::UnaryMinus, &[]);
                Ok(Type::Int)
            }
            Token::Bang => {
                self.cursor.advance();
                let span = self.cursor.position();
                let ty = self.nested(|c| c.unary())?;
                self.check_operand(&Token::Bang, ty, span)?;
                self.out().emit(Op::NegateLogical, &[]);
                Ok(Type::Bool)
            }
            _ => self.primary(),
        }
    }

    fn number(&self, text: &str, negative: bool, span: Span) -> Result<i32, CompileError> {
        int_value(text, negative).ok_or_else(|| {
            self.error(
                ErrorKind::Syntax,
                span,
                format!("number {}{} does not fit in 32 bits", if negative { "-" } else { "" }, text),
            )
        })
    }

    fn primary(&mut self) -> Result<Type, CompileError> {
        let span = self.cursor.position();
        match self.cursor.peek().clone() {
            Token::Number(text) => {
                self.cursor.advance();
                let value = self.number(&text, false, span.clone())?;
                if self.cursor.check(&Token::Dot) {
                    self.fraction(&text, span)?;
                }
                self.out().emit(Op::PushNumber, &[Operand::Int(value)]);
                Ok(Type::Int)
            }
            Token::StringLit(text) => {
                self.cursor.advance();
                let index = self
                    .strings
                    .intern(&text)
                    .map_err(|e| self.table_error(e, span))?;
                self.out().emit(Op::PushStringIndex, &[Operand::Int(index as i32)]);
                Ok(Type::Str)
            }
            Token::Bool(b) => {
                self.cursor.advance();
                self.out().emit(Op::PushNumber, &[Operand::Int(b as i32)]);
                Ok(Type::Bool)
            }
            Token::LParen => {
                self.cursor.advance();
                let ty = self.expression(None)?;
                self.cursor.expect(&Token::RParen)?;
                Ok(ty)
            }
            Token::Symbol(name) => {
                if self.cursor.peek_nth(1) == &Token::LParen {
                    return self.command_call();
                }
                self.cursor.advance();
                match self.resolve(&name) {
                    Some(Binding::Var(var)) => {
                        let op = match var.scope {
                            VarScope::Global => Op::PushGlobalVar,
                            VarScope::Local => Op::PushLocalVar,
                        };
                        self.out().emit(op, &[Operand::Int(var.slot as i32)]);
                        Ok(var.ty)
                    }
                    Some(Binding::Const(literal)) => {
                        self.push_literal(&literal, span)?;
                        Ok(literal.ty())
                    }
                    None if self.defs.commands.lookup(&name).is_some() => Err(self.error(
                        ErrorKind::Syntax,
                        self.cursor.position(),
                        format!(
                            "expected `(` after command `{}`, got {}",
                            name,
                            self.cursor.peek().describe()
                        ),
                    )),
                    None => Err(self.error(
                        ErrorKind::UnknownIdentifier,
                        span,
                        format!("unknown identifier `{}`", name),
                    )),
                }
            }
            _ => Err(self.cursor.unexpected("an expression").into()),
        }
    }

    /// Consumes `.digits` after an integer. Fractional numbers exist only as
    /// command arguments; the runtime receives the integer part.
    fn fraction(&mut self, whole: &str, span: Span) -> Result<(), CompileError> {
        if self.arg_depth == 0 {
            return Err(self.error(
                ErrorKind::Syntax,
                span,
                "fractional numbers are only allowed as command arguments",
            ));
        }
        self.cursor.advance();
        let digits = match self.cursor.peek() {
            Token::Number(d) if d.chars().all(|c| c.is_ascii_digit()) => d.clone(),
            _ => return Err(self.cursor.unexpected("digits after `.`").into()),
        };
        self.cursor.advance();
        debug!(number = %format!("{}.{}", whole, digits), "fractional argument truncated");
        Ok(())
    }

    pub(crate) fn push_literal(&mut self, literal: &Literal, span: Span) -> Result<(), CompileError> {
        let operand = match literal {
            Literal::Int(v) => (Op::PushNumber, *v),
            Literal::Bool(b) => (Op::PushNumber, *b as i32),
            Literal::Str(s) => {
                let index = self
                    .strings
                    .intern(s)
                    .map_err(|e| self.table_error(e, span))?;
                (Op::PushStringIndex, index as i32)
            }
        };
        self.out().emit(operand.0, &[Operand::Int(operand.1)]);
        Ok(())
    }

    /// Compiles `name(args...)` and returns the command's return type.
    ///
    /// Missing trailing arguments are filled with their declared defaults,
    /// so the runtime always sees the full parameter list.
    pub(crate) fn command_call(&mut self) -> Result<Type, CompileError> {
        let (name, span) = self.cursor.expect_symbol()?;
        let defs = self.defs;
        let def = defs.commands.lookup(&name).ok_or_else(|| {
            self.error(
                ErrorKind::UnknownIdentifier,
                span.clone(),
                format!("unknown command `{}`", name),
            )
        })?;
        self.cursor.expect(&Token::LParen)?;

        let mut count = 0;
        self.arg_depth += 1;
        if !self.cursor.check(&Token::RParen) {
            loop {
                let Some(param) = def.params.get(count) else {
                    return Err(self.error(
                        ErrorKind::Syntax,
                        self.cursor.position(),
                        format!(
                            "too many arguments to `{}`: expected at most {}",
                            def.name,
                            def.max_args()
                        ),
                    ));
                };
                self.expression(Some(param.ty))?;
                count += 1;
                if !self.cursor.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.arg_depth -= 1;
        self.cursor.expect(&Token::RParen)?;

        if count < def.min_args {
            return Err(self.error(
                ErrorKind::Syntax,
                span,
                format!(
                    "too few arguments to `{}`: expected at least {}, got {}",
                    def.name, def.min_args, count
                ),
            ));
        }
        for param in &def.params[count..] {
            if let Some(default) = &param.default {
                self.push_literal(default, span.clone())?;
            }
        }

        self.out().emit(
            Op::Command,
            &[
                Operand::Int(def.opcode as i32),
                Operand::Int(def.params.len() as i32),
            ],
        );
        Ok(def.return_type)
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::Op;
    use crate::compiler::test_support::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_precedence_multiplication_binds_tighter() {
        let ins = mainloop("x = 1 + 2 * 3;");
        assert_eq!(
            ops(&ins),
            vec![
                Op::PushNumber,
                Op::PushNumber,
                Op::PushNumber,
                Op::Multiply,
                Op::Add,
                Op::AssignGlobalVar,
                Op::EndMainLoop
            ]
        );
        assert_eq!(ins[0].operands, vec![1]);
        assert_eq!(ins[1].operands, vec![2]);
        assert_eq!(ins[2].operands, vec![3]);
    }

    #[test]
    fn test_left_associativity() {
        let ins = mainloop("x = 10 - 4 - 3;");
        // (10 - 4) - 3
        assert_eq!(
            ops(&ins)[..5],
            [
                Op::PushNumber,
                Op::PushNumber,
                Op::Subtract,
                Op::PushNumber,
                Op::Subtract
            ]
        );
    }

    #[test]
    fn test_parentheses_and_unary() {
        let ins = mainloop("x = -(1 + y) * -2;");
        assert_eq!(
            ops(&ins)[..6],
            [
                Op::PushNumber,
                Op::PushGlobalVar,
                Op::Add,
                Op::UnaryMinus,
                Op::PushNumber,
                Op::Multiply
            ]
        );
        assert_eq!(ins[4].operands, vec![-2]);
    }

    #[test]
    fn test_logic_and_comparison_yield_bool() {
        let ins = mainloop("b = x < 3 && !b || y == 2;");
        assert_eq!(
            ops(&ins)[..10],
            [
                Op::PushGlobalVar,
                Op::PushNumber,
                Op::LessThan,
                Op::PushGlobalVar,
                Op::NegateLogical,
                Op::AndLogical,
                Op::PushGlobalVar,
                Op::PushNumber,
                Op::Equals,
                Op::OrLogical
            ]
        );
    }

    #[test]
    fn test_string_arithmetic_rejected() {
        let err = compile_err("state idle { mainloop { say(\"abc\" + 1); } }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(err.message, "cannot apply `+` to str");
    }

    #[test]
    fn test_string_to_int_rejected() {
        let err = compile_err("int x; state idle { mainloop { x = \"abc\"; } }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(err.message, "expected int, got str");
    }

    #[test]
    fn test_int_bool_coercion() {
        mainloop("b = 5; x = b; x = true + 1;");
    }

    #[test]
    fn test_ternary() {
        let ins = mainloop("x = b ? 1 : 2;");
        assert_eq!(
            ops(&ins),
            vec![
                Op::PushGlobalVar,
                Op::IfNotGoto,
                Op::PushNumber,
                Op::Goto,
                Op::PushNumber,
                Op::AssignGlobalVar,
                Op::EndMainLoop
            ]
        );
        // else branch and end of the ternary
        assert_eq!(ins[1].target(), Some(ins[4].offset));
        assert_eq!(ins[3].target(), Some(ins[5].offset));
    }

    #[test]
    fn test_ternary_is_below_logical_or() {
        let ins = mainloop("x = b || b ? 1 : 2;");
        assert_eq!(ops(&ins)[2], Op::OrLogical);
        assert_eq!(ops(&ins)[3], Op::IfNotGoto);
    }

    #[test]
    fn test_ternary_branch_types_must_agree() {
        let err = compile_err("int x; state idle { mainloop { x = 1 ? 2 : \"no\"; } }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_assignment_inside_expression_rejected() {
        let err = compile_err("int x; state idle { mainloop { wait(x = 2); } }");
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(err.message.contains("`=` is a statement"));
    }

    #[test]
    fn test_command_defaults_pushed_in_order() {
        let ins = mainloop("say(\"hi\");");
        assert_eq!(
            ops(&ins),
            vec![
                Op::PushStringIndex,
                Op::PushNumber,
                Op::PushNumber,
                Op::Command,
                Op::EndMainLoop
            ]
        );
        assert_eq!(ins[1].operands, vec![10]);
        assert_eq!(ins[2].operands, vec![0]);
        assert_eq!(ins[3].operands, vec![3, 3]);
    }

    #[test]
    fn test_command_with_all_arguments() {
        let ins = mainloop("x = random(1, 6);");
        assert_eq!(
            ops(&ins),
            vec![
                Op::PushNumber,
                Op::PushNumber,
                Op::Command,
                Op::AssignGlobalVar,
                Op::EndMainLoop
            ]
        );
        assert_eq!(ins[1].operands, vec![6]);
        assert_eq!(ins[2].operands, vec![2, 2]);
    }

    #[test]
    fn test_command_lookup_is_case_insensitive() {
        mainloop("WAIT(1); Flee();");
    }

    #[test]
    fn test_argument_count_errors() {
        let err = compile_err("state idle { mainloop { random(); } }");
        assert_eq!(err.message, "too few arguments to `random`: expected at least 1, got 0");
        let err = compile_err("state idle { mainloop { flee(1); } }");
        assert_eq!(err.message, "too many arguments to `flee`: expected at most 0");
        assert_eq!(err.span.col, 30);
    }

    #[test]
    fn test_argument_type_checked() {
        let err = compile_err("state idle { mainloop { wait(\"soon\"); } }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_unknown_names() {
        let err = compile_err("state idle { mainloop { teleport(); } }");
        assert_eq!(err.kind, ErrorKind::UnknownIdentifier);
        assert_eq!(err.message, "unknown command `teleport`");

        let err = compile_err("state idle { mainloop { wait(ammo); } }");
        assert_eq!(err.message, "unknown identifier `ammo`");

        let err = compile_err("int x; state idle { mainloop { x = random; } }");
        assert_eq!(err.message, "expected `(` after command `random`, got `;`");
    }

    #[test]
    fn test_void_command_in_expression_rejected() {
        let err = compile_err("int x; state idle { mainloop { x = flee(); } }");
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(err.message, "expected int, got void");
    }

    #[test]
    fn test_fractional_argument_truncated() {
        let ins = mainloop("wait(1.75);");
        assert_eq!(ops(&ins), vec![Op::PushNumber, Op::Command, Op::EndMainLoop]);
        assert_eq!(ins[0].operands, vec![1]);

        let err = compile_err("int x; state idle { mainloop { x = 1.5; } }");
        assert!(err.message.contains("only allowed as command arguments"));
    }

    #[test]
    fn test_number_range() {
        let ins = mainloop("x = -2147483648;");
        assert_eq!(ins[0].operands, vec![i32::MIN]);
        let err = compile_err("int x; state idle { mainloop { x = 2147483648; } }");
        assert!(err.message.contains("does not fit in 32 bits"));
    }

    #[test]
    fn test_string_literals_interned_once() {
        let c = compile_ok("state idle { mainloop { say(\"hi\"); say(\"hi\"); say(\"bye\"); } }");
        assert_eq!(c.object.strings, vec!["hi", "bye"]);
    }

    fn deep(body: &str) -> crate::error::ScriptError {
        compile_err(&format!(
            "int x; bool b; state s {{ mainloop {{ {} }} }}",
            body
        ))
    }

    #[test]
    fn test_deep_parentheses_are_a_limit_error() {
        let err = deep(&format!("x = {}1{};", "(".repeat(300), ")".repeat(300)));
        assert_eq!(err.kind, ErrorKind::LimitExceeded);
        assert_eq!(err.message, "expression nested too deeply (limit 64)");

        let ins = mainloop(&format!("x = {}1{};", "(".repeat(60), ")".repeat(60)));
        assert_eq!(ops(&ins), vec![Op::PushNumber, Op::AssignGlobalVar, Op::EndMainLoop]);
    }

    #[test]
    fn test_deep_unary_and_ternary_chains_are_limit_errors() {
        let err = deep(&format!("b = {}b;", "!".repeat(300)));
        assert_eq!(err.kind, ErrorKind::LimitExceeded);

        let err = deep(&format!("x = {}0;", "b ? 1 : ".repeat(300)));
        assert_eq!(err.kind, ErrorKind::LimitExceeded);

        let err = deep(&format!("aim({}0{});", "random(".repeat(300), ")".repeat(300)));
        assert_eq!(err.kind, ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_expression_depth_is_configurable() {
        let limits = crate::config::Limits {
            max_expression_depth: 3,
            ..Default::default()
        };
        let source = "int x; state s { mainloop { x = ((1)); x = (((1))); } }";
        match compile_with(source, &limits) {
            Err(crate::error::CompileError::Script(e)) => {
                assert_eq!(e.kind, ErrorKind::LimitExceeded);
                assert_eq!(e.span.col, 47);
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
