use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::bytecode::op::Op;
use crate::config::Limits;

pub const MAGIC: &[u8; 4] = b"BOTC";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentKind {
    OnEnter,
    MainLoop,
    OnExit,
    /// Handler for the event with this registry index.
    Event(u32),
}

impl SegmentKind {
    /// Opcode that terminates code of this kind.
    pub fn end_op(self) -> Op {
        match self {
            SegmentKind::OnEnter => Op::EndOnEnter,
            SegmentKind::MainLoop => Op::EndMainLoop,
            SegmentKind::OnExit => Op::EndOnExit,
            SegmentKind::Event(_) => Op::EndEvent,
        }
    }
}

impl std::fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentKind::OnEnter => write!(f, "onenter"),
            SegmentKind::MainLoop => write!(f, "mainloop"),
            SegmentKind::OnExit => write!(f, "onexit"),
            SegmentKind::Event(index) => write!(f, "event #{}", index),
        }
    }
}

/// One finalized code block: every jump target is already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateObject {
    pub name: String,
    pub index: u32,
    /// Number of state-local variable slots the runtime must reserve.
    pub local_count: u32,
    pub segments: Vec<Segment>,
}

/// The compiled unit as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFile {
    pub version: u32,
    pub states: Vec<StateObject>,
    /// Event handlers declared outside any state.
    pub events: Vec<Segment>,
    pub strings: Vec<String>,
    pub global_count: u32,
}

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("not a botc object file")]
    BadMagic,

    #[error("unsupported object format version {0}")]
    UnsupportedVersion(u32),

    #[error("object encoding failed: {0}")]
    Encoding(#[from] postcard::Error),

    #[error("cannot write object file: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectFile {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ObjectError> {
        let mut out = MAGIC.to_vec();
        out.extend(postcard::to_allocvec(self)?);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ObjectError> {
        let body = bytes.strip_prefix(MAGIC).ok_or(ObjectError::BadMagic)?;
        let object: ObjectFile = postcard::from_bytes(body)?;
        if object.version != FORMAT_VERSION {
            return Err(ObjectError::UnsupportedVersion(object.version));
        }
        Ok(object)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ObjectError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "wrote object file");
        Ok(())
    }

    /// Event handlers across all states plus the global ones.
    pub fn event_count(&self) -> usize {
        let in_states: usize = self
            .states
            .iter()
            .flat_map(|s| &s.segments)
            .filter(|seg| matches!(seg.kind, SegmentKind::Event(_)))
            .count();
        in_states + self.events.len()
    }

    pub fn code_size(&self) -> usize {
        self.states
            .iter()
            .flat_map(|s| &s.segments)
            .chain(&self.events)
            .map(|seg| seg.code.len())
            .sum()
    }
}

/// Collects finalized segments into an `ObjectFile`.
#[derive(Debug, Default)]
pub struct ObjectWriter {
    states: Vec<StateObject>,
    events: Vec<Segment>,
}

impl ObjectWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new state and returns its index.
    pub fn begin_state(&mut self, name: &str) -> u32 {
        let index = self.states.len() as u32;
        self.states.push(StateObject {
            name: name.to_string(),
            index,
            local_count: 0,
            segments: Vec::new(),
        });
        index
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Adds a segment to state `owner`, or as a global event handler when
    /// `owner` is `None`.
    pub fn add_segment(&mut self, owner: Option<u32>, kind: SegmentKind, code: Vec<u8>) {
        let segment = Segment { kind, code };
        match owner.and_then(|i| self.states.get_mut(i as usize)) {
            Some(state) => state.segments.push(segment),
            None => self.events.push(segment),
        }
    }

    pub fn set_local_count(&mut self, state: u32, count: u32) {
        if let Some(s) = self.states.get_mut(state as usize) {
            s.local_count = count;
        }
    }

    pub fn finish(self, strings: Vec<String>, global_count: u32) -> ObjectFile {
        ObjectFile {
            version: FORMAT_VERSION,
            states: self.states,
            events: self.events,
            strings,
            global_count,
        }
    }
}

/// Counts reported after a successful compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub strings: usize,
    pub max_strings: usize,
    pub globals: usize,
    pub max_globals: usize,
    pub events: usize,
    pub max_events: usize,
    pub states: usize,
    pub max_states: usize,
    pub code_bytes: usize,
    pub marks: usize,
    pub references: usize,
}

impl Statistics {
    pub fn for_object(object: &ObjectFile, limits: &Limits) -> Self {
        Statistics {
            strings: object.strings.len(),
            max_strings: limits.max_strings,
            globals: object.global_count as usize,
            max_globals: limits.max_globals,
            events: object.event_count(),
            max_events: limits.max_events,
            states: object.states.len(),
            max_states: limits.max_states,
            code_bytes: object.code_size(),
            marks: 0,
            references: 0,
        }
    }
}

impl std::fmt::Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} / {} strings written", self.strings, self.max_strings)?;
        writeln!(f, "{} / {} global variables", self.globals, self.max_globals)?;
        writeln!(f, "{} / {} events", self.events, self.max_events)?;
        writeln!(f, "{} / {} states", self.states, self.max_states)?;
        write!(
            f,
            "{} bytes of code, {} marks, {} references resolved",
            self.code_bytes, self.marks, self.references
        )
    }
}
