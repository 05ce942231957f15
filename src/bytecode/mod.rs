pub mod buffer;
pub mod disasm;
pub mod object;
pub mod op;

pub use buffer::{BufferError, BytecodeBuffer, MarkAllocator, MarkId, Operand};
pub use object::{ObjectFile, ObjectWriter, SegmentKind, Statistics};
pub use op::Op;
