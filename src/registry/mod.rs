pub mod commands;
pub mod events;
pub mod loader;

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::error::ScriptError;

pub use commands::{CommandDef, CommandRegistry, Param};
pub use events::{EventDef, EventRegistry};

/// Definitions shipped with the compiler.
pub const BUILTIN_DEFS: &str = include_str!("../../defs/botc_defs.bts");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("`{0}` is already defined")]
    DuplicateName(String),

    #[error("number {number} is already used by `{existing}`")]
    DuplicateNumber { number: u32, existing: String },
}

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("cannot read definitions {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("bad definition: {0}")]
    Invalid(#[from] ScriptError),
}

/// Commands and events known to the compiler. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    pub commands: CommandRegistry,
    pub events: EventRegistry,
}

impl Definitions {
    pub fn builtin() -> Result<Self, DefinitionError> {
        Self::parse(BUILTIN_DEFS, "botc_defs.bts")
    }

    pub fn from_file(path: &Path) -> Result<Self, DefinitionError> {
        let display = path.display().to_string();
        let source = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: display.clone(),
            source,
        })?;
        Self::parse(&source, &display)
    }

    pub fn parse(source: &str, file: &str) -> Result<Self, DefinitionError> {
        let defs = loader::parse_definitions(source, file)?;
        info!(
            file = %file,
            commands = defs.commands.len(),
            events = defs.events.len(),
            "loaded definitions"
        );
        Ok(defs)
    }
}
