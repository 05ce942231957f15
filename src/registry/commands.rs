use std::collections::HashMap;

use crate::registry::RegistryError;
use crate::types::{Literal, Type};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub default: Option<Literal>,
}

/// A built-in command callable from scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDef {
    pub name: String,
    pub opcode: u32,
    pub return_type: Type,
    pub params: Vec<Param>,
    /// Parameters before this index have no default.
    pub min_args: usize,
}

impl CommandDef {
    pub fn max_args(&self) -> usize {
        self.params.len()
    }

    /// Human-readable signature, e.g. `int Random (int min[, int max = 100])`.
    pub fn signature(&self) -> String {
        let mut text = format!("{} {}", self.return_type, self.name);
        if !self.params.is_empty() {
            text.push(' ');
        }
        text.push('(');

        for (i, param) in self.params.iter().enumerate() {
            if i == self.min_args {
                text.push('[');
            }
            if i > 0 {
                text.push_str(", ");
            }
            text.push_str(&format!("{} {}", param.ty, param.name));
            if let Some(default) = &param.default {
                text.push_str(&format!(" = {}", default));
            }
        }

        if self.min_args < self.params.len() {
            text.push(']');
        }
        text.push(')');
        text
    }
}

/// Commands in definition order, looked up case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<CommandDef>,
    by_name: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, def: CommandDef) -> Result<(), RegistryError> {
        let key = def.name.to_lowercase();
        if self.by_name.contains_key(&key) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if let Some(existing) = self.commands.iter().find(|c| c.opcode == def.opcode) {
            return Err(RegistryError::DuplicateNumber {
                number: def.opcode,
                existing: existing.name.clone(),
            });
        }
        self.by_name.insert(key, self.commands.len());
        self.commands.push(def);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&CommandDef> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&i| &self.commands[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDef> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random() -> CommandDef {
        CommandDef {
            name: "Random".to_string(),
            opcode: 2,
            return_type: Type::Int,
            params: vec![
                Param {
                    name: "min".to_string(),
                    ty: Type::Int,
                    default: None,
                },
                Param {
                    name: "max".to_string(),
                    ty: Type::Int,
                    default: Some(Literal::Int(100)),
                },
            ],
            min_args: 1,
        }
    }

    #[test]
    fn test_signature() {
        assert_eq!(random().signature(), "int Random (int min[, int max = 100])");

        let flee = CommandDef {
            name: "Flee".to_string(),
            opcode: 1,
            return_type: Type::Void,
            params: Vec::new(),
            min_args: 0,
        };
        assert_eq!(flee.signature(), "void Flee()");

        let mut say = random();
        say.name = "Say".to_string();
        say.return_type = Type::Void;
        say.min_args = 0;
        say.params = vec![Param {
            name: "text".to_string(),
            ty: Type::Str,
            default: Some(Literal::Str("hi".to_string())),
        }];
        assert_eq!(say.signature(), "void Say ([str text = \"hi\"])");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut reg = CommandRegistry::new();
        reg.add(random()).unwrap();
        assert_eq!(reg.lookup("random").map(|c| c.opcode), Some(2));
        assert_eq!(reg.lookup("RANDOM").map(|c| c.opcode), Some(2));
        assert!(reg.lookup("rand").is_none());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut reg = CommandRegistry::new();
        reg.add(random()).unwrap();

        let mut same_name = random();
        same_name.opcode = 9;
        same_name.name = "RANDOM".to_string();
        assert_eq!(
            reg.add(same_name),
            Err(RegistryError::DuplicateName("RANDOM".to_string()))
        );

        let mut same_opcode = random();
        same_opcode.name = "Other".to_string();
        assert_eq!(
            reg.add(same_opcode),
            Err(RegistryError::DuplicateNumber {
                number: 2,
                existing: "Random".to_string()
            })
        );
        assert_eq!(reg.len(), 1);
    }
}
