use std::collections::HashMap;

use crate::registry::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDef {
    pub name: String,
    pub index: u32,
}

/// Events in definition order, looked up case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    events: Vec<EventDef>,
    by_name: HashMap<String, usize>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, def: EventDef) -> Result<(), RegistryError> {
        let key = def.name.to_lowercase();
        if self.by_name.contains_key(&key) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if let Some(existing) = self.events.iter().find(|e| e.index == def.index) {
            return Err(RegistryError::DuplicateNumber {
                number: def.index,
                existing: existing.name.clone(),
            });
        }
        self.by_name.insert(key, self.events.len());
        self.events.push(def);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&EventDef> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&i| &self.events[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventDef> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
