use std::collections::HashMap;

use thiserror::Error;

use crate::config::Limits;
use crate::types::{ScriptVariable, Type, VarScope};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("too many strings (limit {max})")]
    StringTableFull { max: usize },

    #[error("string is {len} characters long, limit is {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("too many global variables (limit {max})")]
    GlobalsFull { max: usize },

    #[error("global variable `{0}` is already declared")]
    DuplicateGlobal(String),
}

/// Deduplicating string table. Indices are assigned in first-use order.
#[derive(Debug, Clone)]
pub struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
    max_count: usize,
    max_len: usize,
}

impl StringTable {
    pub fn new(limits: &Limits) -> Self {
        StringTable {
            strings: Vec::new(),
            index: HashMap::new(),
            max_count: limits.max_strings,
            max_len: limits.max_string_length,
        }
    }

    pub fn intern(&mut self, text: &str) -> Result<u32, TableError> {
        if let Some(&i) = self.index.get(text) {
            return Ok(i);
        }
        // max_len includes the runtime's terminator.
        let len = text.chars().count();
        if len >= self.max_len {
            return Err(TableError::StringTooLong {
                len,
                max: self.max_len.saturating_sub(1),
            });
        }
        if self.strings.len() >= self.max_count {
            return Err(TableError::StringTableFull {
                max: self.max_count,
            });
        }
        let i = self.strings.len() as u32;
        self.strings.push(text.to_string());
        self.index.insert(text.to_string(), i);
        Ok(i)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn into_strings(self) -> Vec<String> {
        self.strings
    }
}

#[derive(Debug, Clone)]
pub struct GlobalTable {
    vars: Vec<ScriptVariable>,
    max: usize,
}

impl GlobalTable {
    pub fn new(limits: &Limits) -> Self {
        GlobalTable {
            vars: Vec::new(),
            max: limits.max_globals,
        }
    }

    pub fn declare(&mut self, name: &str, ty: Type) -> Result<u32, TableError> {
        if self.lookup(name).is_some() {
            return Err(TableError::DuplicateGlobal(name.to_string()));
        }
        if self.vars.len() >= self.max {
            return Err(TableError::GlobalsFull { max: self.max });
        }
        let slot = self.vars.len() as u32;
        self.vars.push(ScriptVariable {
            name: name.to_string(),
            ty,
            scope: VarScope::Global,
            slot,
        });
        Ok(slot)
    }

    pub fn lookup(&self, name: &str) -> Option<&ScriptVariable> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_strings: usize, max_string_length: usize, max_globals: usize) -> Limits {
        Limits {
            max_strings,
            max_string_length,
            max_globals,
            ..Limits::default()
        }
    }

    #[test]
    fn test_intern_deduplicates() {
        let mut table = StringTable::new(&Limits::default());
        assert_eq!(table.intern("a").unwrap(), 0);
        assert_eq!(table.intern("b").unwrap(), 1);
        assert_eq!(table.intern("a").unwrap(), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.into_strings(), vec!["a", "b"]);
    }

    #[test]
    fn test_string_limits() {
        let mut table = StringTable::new(&limits(1, 4, 1));
        assert_eq!(
            table.intern("abcd"),
            Err(TableError::StringTooLong { len: 4, max: 3 })
        );
        table.intern("abc").unwrap();
        assert_eq!(
            table.intern("x"),
            Err(TableError::StringTableFull { max: 1 })
        );
        // Existing strings still resolve when the table is full.
        assert_eq!(table.intern("abc").unwrap(), 0);
    }

    #[test]
    fn test_globals() {
        let mut globals = GlobalTable::new(&limits(1, 4, 2));
        assert_eq!(globals.declare("health", Type::Int).unwrap(), 0);
        assert_eq!(globals.declare("name", Type::Str).unwrap(), 1);
        assert_eq!(
            globals.declare("health", Type::Int),
            Err(TableError::DuplicateGlobal("health".to_string()))
        );
        assert_eq!(
            globals.declare("ammo", Type::Int),
            Err(TableError::GlobalsFull { max: 2 })
        );
        assert_eq!(globals.lookup("name").map(|v| v.ty), Some(Type::Str));
    }
}
