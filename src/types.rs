use serde::{Deserialize, Serialize};

use crate::frontend::token::Token;

/// The four primitive types of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int,
    Str,
    Bool,
    Void,
}

impl Type {
    pub fn from_token(token: &Token) -> Option<Type> {
        match token {
            Token::IntType => Some(Type::Int),
            Token::StrType => Some(Type::Str),
            Token::BoolType => Some(Type::Bool),
            Token::VoidType => Some(Type::Void),
            _ => None,
        }
    }

    /// Whether a value of type `found` may be used where `self` is required.
    /// Integers and booleans convert freely; strings never convert.
    pub fn accepts(self, found: Type) -> bool {
        match (self, found) {
            (Type::Void, _) | (_, Type::Void) => false,
            (Type::Int | Type::Bool, Type::Int | Type::Bool) => true,
            (Type::Str, Type::Str) => true,
            _ => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Str => "str",
            Type::Bool => "bool",
            Type::Void => "void",
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A compile-time constant value (parameter defaults, `const` declarations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Int(i32),
    Str(String),
    Bool(bool),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) => Type::Int,
            Literal::Str(_) => Type::Str,
            Literal::Bool(_) => Type::Bool,
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Str(s) => write!(f, "\"{}\"", s),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    Global,
    /// Owned by the enclosing state; slots are per state.
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptVariable {
    pub name: String,
    pub ty: Type,
    pub scope: VarScope,
    pub slot: u32,
}
