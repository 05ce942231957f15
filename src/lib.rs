//! botc: compiler for botscript, a small state-machine language used to
//! script game agents.
//!
//! The pipeline is [`frontend`] (lexing and `#include` expansion) into
//! [`compiler`] (single-pass code generation with backpatched jumps) into a
//! [`bytecode::ObjectFile`]. Commands and events a script may use come from
//! [`registry::Definitions`].

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod error;
pub mod frontend;
pub mod registry;
pub mod tables;
pub mod types;

pub use compiler::{Compilation, compile, compile_source};
pub use config::Limits;
pub use error::{CompileError, ErrorKind, ScriptError};
pub use registry::Definitions;
