use crate::error::{ErrorKind, ScriptError};
use crate::frontend::cursor::TokenCursor;
use crate::frontend::lexer::{Lexer, Span};
use crate::frontend::token::{Token, parse_number};
use crate::registry::commands::{CommandDef, Param};
use crate::registry::events::EventDef;
use crate::registry::{Definitions, RegistryError};
use crate::types::{Literal, Type};

/// Parses a definitions file:
///
/// ```text
/// funcdef 2: int Random (int min, int max = 100);
/// eventdef 0: killed ();
/// ```
pub fn parse_definitions(source: &str, file: &str) -> Result<Definitions, ScriptError> {
    let tokens = Lexer::new(source, file).tokenize()?;
    let mut cursor = TokenCursor::new(tokens);
    let mut defs = Definitions::default();

    while !cursor.at_end() {
        match cursor.peek() {
            Token::Funcdef => {
                cursor.advance();
                let (def, span) = parse_funcdef(&mut cursor)?;
                defs.commands
                    .add(def)
                    .map_err(|e| registry_error(e, span))?;
            }
            Token::Eventdef => {
                cursor.advance();
                let index = parse_index(&mut cursor)?;
                cursor.expect(&Token::Colon)?;
                let (name, span) = cursor.expect_symbol()?;
                cursor.expect(&Token::LParen)?;
                cursor.expect(&Token::RParen)?;
                cursor.expect(&Token::Semicolon)?;
                defs.events
                    .add(EventDef { name, index })
                    .map_err(|e| registry_error(e, span))?;
            }
            _ => return Err(cursor.unexpected("`funcdef` or `eventdef`")),
        }
    }

    Ok(defs)
}

fn registry_error(e: RegistryError, span: Span) -> ScriptError {
    ScriptError::new(ErrorKind::DuplicateName, span, e.to_string())
}

fn parse_index(cursor: &mut TokenCursor) -> Result<u32, ScriptError> {
    match cursor.peek() {
        Token::Number(text) => {
            let value = parse_number(text)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| cursor.error(ErrorKind::Syntax, format!("bad number {}", text)))?;
            cursor.advance();
            Ok(value)
        }
        _ => Err(cursor.unexpected("a number")),
    }
}

fn parse_type(cursor: &mut TokenCursor) -> Result<Type, ScriptError> {
    match Type::from_token(cursor.peek()) {
        Some(ty) => {
            cursor.advance();
            Ok(ty)
        }
        None => Err(cursor.unexpected("a type")),
    }
}

fn parse_funcdef(cursor: &mut TokenCursor) -> Result<(CommandDef, Span), ScriptError> {
    let opcode = parse_index(cursor)?;
    cursor.expect(&Token::Colon)?;
    let return_type = parse_type(cursor)?;
    let (name, span) = cursor.expect_symbol()?;
    cursor.expect(&Token::LParen)?;

    let mut params: Vec<Param> = Vec::new();
    if !cursor.check(&Token::RParen) {
        loop {
            let ty_span = cursor.position();
            let ty = parse_type(cursor)?;
            if ty == Type::Void {
                return Err(ScriptError::new(
                    ErrorKind::TypeMismatch,
                    ty_span,
                    "parameters cannot be void",
                ));
            }
            let (param_name, param_span) = cursor.expect_symbol()?;

            let default = if cursor.eat(&Token::Assign) {
                let literal_span = cursor.position();
                let literal = parse_literal(cursor)?;
                if !ty.accepts(literal.ty()) {
                    return Err(ScriptError::new(
                        ErrorKind::TypeMismatch,
                        literal_span,
                        format!("default for `{}` must be {}, got {}", param_name, ty, literal.ty()),
                    ));
                }
                Some(literal)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(ScriptError::new(
                        ErrorKind::Syntax,
                        param_span,
                        format!("`{}` has no default but follows a parameter that does", param_name),
                    ));
                }
                None
            };

            params.push(Param {
                name: param_name,
                ty,
                default,
            });

            if !cursor.eat(&Token::Comma) {
                break;
            }
        }
    }
    cursor.expect(&Token::RParen)?;
    cursor.expect(&Token::Semicolon)?;

    let min_args = params.iter().take_while(|p| p.default.is_none()).count();
    Ok((
        CommandDef {
            name,
            opcode,
            return_type,
            params,
            min_args,
        },
        span,
    ))
}

fn parse_literal(cursor: &mut TokenCursor) -> Result<Literal, ScriptError> {
    let negative = cursor.eat(&Token::Minus);
    let literal = match cursor.peek() {
        Token::Number(text) => {
            let value = parse_number(text)
                .map(|v| if negative { -v } else { v })
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| cursor.error(ErrorKind::Syntax, format!("number {} is out of range", text)))?;
            Literal::Int(value)
        }
        Token::StringLit(s) if !negative => Literal::Str(s.clone()),
        Token::Bool(b) if !negative => Literal::Bool(*b),
        _ => return Err(cursor.unexpected("a literal")),
    };
    cursor.advance();
    Ok(literal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands_and_events() {
        let defs = parse_definitions(
            "funcdef 0: void Wait (int tics);\n\
             funcdef 2: int Random (int min, int max = 100);\n\
             funcdef 3: void Say (str text, int volume = -1, bool loud = false);\n\
             eventdef 0: killed ();\n",
            "defs.bts",
        )
        .unwrap();

        assert_eq!(defs.commands.len(), 3);
        let random = defs.commands.lookup("random").unwrap();
        assert_eq!(random.opcode, 2);
        assert_eq!(random.min_args, 1);
        assert_eq!(random.params[1].default, Some(Literal::Int(100)));

        let say = defs.commands.lookup("say").unwrap();
        assert_eq!(say.params[1].default, Some(Literal::Int(-1)));
        assert_eq!(say.params[2].default, Some(Literal::Bool(false)));

        assert_eq!(defs.events.lookup("KILLED").map(|e| e.index), Some(0));
    }

    #[test]
    fn test_required_after_default_rejected() {
        let err = parse_definitions("funcdef 1: void F (int a = 1, int b);", "d.bts").unwrap_err();
        assert!(err.message.contains("`b` has no default"));
    }

    #[test]
    fn test_default_type_checked() {
        let err = parse_definitions("funcdef 1: void F (str a = 3);", "d.bts").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_duplicate_definitions() {
        let err = parse_definitions(
            "funcdef 1: void F ();\nfuncdef 1: void G ();",
            "d.bts",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateName);
        assert_eq!(err.span.line, 2);
        assert!(err.message.contains("already used by `F`"));
    }

    #[test]
    fn test_garbage_rejected() {
        let err = parse_definitions("state x {}", "d.bts").unwrap_err();
        assert_eq!(err.message, "expected `funcdef` or `eventdef`, got `state`");
    }
}
