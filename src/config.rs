use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Compile-time maxima. Exceeding any of them is a script error.
///
/// Every field has a default, so a config file only needs the keys it
/// changes:
///
/// ```toml
/// max_states = 64
/// max_string_length = 128
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    pub max_scope_depth: usize,
    /// Parentheses, unary operators, `?:` branches and command arguments.
    pub max_expression_depth: usize,
    pub max_cases: usize,
    pub max_states: usize,
    pub max_events: usize,
    pub max_globals: usize,
    pub max_state_vars: usize,
    pub max_strings: usize,
    pub max_string_length: usize,
    pub max_include_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_scope_depth: 32,
            max_expression_depth: 64,
            max_cases: 64,
            max_states: 256,
            max_events: 32,
            max_globals: 128,
            max_state_vars: 20,
            max_strings: 128,
            max_string_length: 256,
            max_include_depth: 8,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

impl Limits {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }
}
