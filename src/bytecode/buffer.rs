use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::bytecode::op::Op;

/// Size of one opcode or operand word.
pub const WORD: usize = 4;

/// Written where a reference's target is not yet known.
pub const PLACEHOLDER: u32 = 0xFFFF_FFFF;

/// Handle of a jump target within a family of buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkId(u32);

impl std::fmt::Display for MarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Hands out mark ids. Shared by a buffer and all of its children so a
/// child's marks can be merged into the parent without renumbering.
#[derive(Debug, Clone, Default)]
pub struct MarkAllocator(Rc<Cell<u32>>);

impl MarkAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> MarkId {
        let id = self.0.get();
        self.0.set(id + 1);
        MarkId(id)
    }

    fn same_family(&self, other: &MarkAllocator) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Int(i32),
    Mark(MarkId),
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Int(v)
    }
}

impl From<MarkId> for Operand {
    fn from(m: MarkId) -> Self {
        Operand::Mark(m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reference {
    offset: usize,
    mark: MarkId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("mark {mark} is already bound to offset {offset}")]
    AlreadyBound { mark: MarkId, offset: usize },

    #[error("cannot bind mark {mark} to offset {offset} past the end ({len})")]
    BindOutOfRange {
        mark: MarkId,
        offset: usize,
        len: usize,
    },

    #[error("reference at offset {offset} to unbound mark {mark}")]
    Unresolved { mark: MarkId, offset: usize },

    #[error("splice offset {at} out of range (buffer length {len})")]
    SpliceOutOfRange { at: usize, len: usize },

    #[error("cannot splice a buffer from a different mark family")]
    ForeignBuffer,

    #[error("segment of {len} bytes is too large to address")]
    TooLarge { len: usize },
}

/// Append-only code buffer with backpatched jump targets.
///
/// Marks are bound to offsets once; references are operand slots that receive
/// a mark's offset when the buffer is finalized. Offsets are absolute within
/// the buffer, so splicing a child in only needs integer adjustments.
#[derive(Debug, Clone)]
pub struct BytecodeBuffer {
    code: Vec<u8>,
    marks: HashMap<MarkId, usize>,
    references: Vec<Reference>,
    allocator: MarkAllocator,
}

impl Default for BytecodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BytecodeBuffer {
    pub fn new() -> Self {
        Self::with_allocator(MarkAllocator::new())
    }

    pub fn with_allocator(allocator: MarkAllocator) -> Self {
        BytecodeBuffer {
            code: Vec::new(),
            marks: HashMap::new(),
            references: Vec::new(),
            allocator,
        }
    }

    /// An empty buffer whose marks can later be spliced into this one.
    pub fn child(&self) -> Self {
        Self::with_allocator(self.allocator.clone())
    }

    pub fn allocator(&self) -> &MarkAllocator {
        &self.allocator
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Raw bytes, placeholders included.
    pub fn bytes(&self) -> &[u8] {
        &self.code
    }

    fn write_word(&mut self, word: u32) {
        let mut bytes = [0u8; WORD];
        LittleEndian::write_u32(&mut bytes, word);
        self.code.extend_from_slice(&bytes);
    }

    /// Appends an instruction and returns the offset it starts at.
    pub fn emit(&mut self, op: Op, operands: &[Operand]) -> usize {
        debug_assert_eq!(operands.len(), op.operand_count(), "operands for {}", op);
        let offset = self.code.len();
        self.write_word(op.word());
        for operand in operands {
            match *operand {
                Operand::Int(v) => self.write_word(v as u32),
                Operand::Mark(m) => {
                    self.reference(m);
                }
            }
        }
        offset
    }

    pub fn create_mark(&self) -> MarkId {
        self.allocator.next()
    }

    pub fn bind_mark(&mut self, mark: MarkId, offset: usize) -> Result<(), BufferError> {
        if let Some(&bound) = self.marks.get(&mark) {
            return Err(BufferError::AlreadyBound {
                mark,
                offset: bound,
            });
        }
        if offset > self.code.len() {
            return Err(BufferError::BindOutOfRange {
                mark,
                offset,
                len: self.code.len(),
            });
        }
        self.marks.insert(mark, offset);
        Ok(())
    }

    /// Binds `mark` to the current end of the buffer.
    pub fn bind_here(&mut self, mark: MarkId) -> Result<(), BufferError> {
        self.bind_mark(mark, self.code.len())
    }

    /// Writes a placeholder word for `mark` and returns its offset.
    pub fn reference(&mut self, mark: MarkId) -> usize {
        let offset = self.code.len();
        self.write_word(PLACEHOLDER);
        self.references.push(Reference { offset, mark });
        offset
    }

    pub fn mark_offset(&self, mark: MarkId) -> Option<usize> {
        self.marks.get(&mark).copied()
    }

    /// Number of bound marks.
    pub fn mark_count(&self) -> usize {
        self.marks.len()
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Inserts `child` at byte offset `at`.
    ///
    /// Everything in this buffer at or after `at` (bound marks and reference
    /// slots) moves up by the child's length; the child's own marks and
    /// references move up by `at` and become part of this buffer.
    pub fn splice(&mut self, child: BytecodeBuffer, at: usize) -> Result<(), BufferError> {
        if at > self.code.len() {
            return Err(BufferError::SpliceOutOfRange {
                at,
                len: self.code.len(),
            });
        }
        if !self.allocator.same_family(&child.allocator) {
            return Err(BufferError::ForeignBuffer);
        }

        if let Some((&mark, _)) = child.marks.iter().find(|(m, _)| self.marks.contains_key(m)) {
            return Err(BufferError::AlreadyBound {
                mark,
                offset: self.marks[&mark],
            });
        }

        let shift = child.code.len();
        for offset in self.marks.values_mut() {
            if *offset >= at {
                *offset += shift;
            }
        }
        for reference in &mut self.references {
            if reference.offset >= at {
                reference.offset += shift;
            }
        }

        for (mark, offset) in child.marks {
            self.marks.insert(mark, offset + at);
        }
        self.references
            .extend(child.references.into_iter().map(|r| Reference {
                offset: r.offset + at,
                mark: r.mark,
            }));

        self.code.splice(at..at, child.code);
        Ok(())
    }

    /// Resolves every reference and returns the finished code.
    ///
    /// The buffer itself is left untouched, so finalizing twice yields the
    /// same bytes.
    pub fn finalize(&self) -> Result<Vec<u8>, BufferError> {
        let mut out = self.code.clone();
        for reference in &self.references {
            let target = self
                .marks
                .get(&reference.mark)
                .copied()
                .ok_or(BufferError::Unresolved {
                    mark: reference.mark,
                    offset: reference.offset,
                })?;
            let word = u32::try_from(target).map_err(|_| BufferError::TooLarge { len: out.len() })?;
            LittleEndian::write_u32(&mut out[reference.offset..reference.offset + WORD], word);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn word_at(code: &[u8], offset: usize) -> u32 {
        LittleEndian::read_u32(&code[offset..offset + WORD])
    }

    #[test]
    fn test_emit_returns_offsets() {
        let mut buf = BytecodeBuffer::new();
        assert_eq!(buf.emit(Op::PushNumber, &[Operand::Int(7)]), 0);
        assert_eq!(buf.emit(Op::Add, &[]), 8);
        assert_eq!(buf.len(), 12);
        assert_eq!(word_at(buf.bytes(), 0), Op::PushNumber.word());
        assert_eq!(word_at(buf.bytes(), 4), 7);
    }

    #[test]
    fn test_negative_operand_is_twos_complement() {
        let mut buf = BytecodeBuffer::new();
        buf.emit(Op::PushNumber, &[Operand::Int(-1)]);
        assert_eq!(word_at(buf.bytes(), 4), 0xFFFF_FFFF);
    }

    #[test]
    fn test_forward_reference_resolves() {
        let mut buf = BytecodeBuffer::new();
        let end = buf.create_mark();
        buf.emit(Op::Goto, &[end.into()]);
        buf.emit(Op::Add, &[]);
        assert_eq!(word_at(buf.bytes(), 4), PLACEHOLDER);
        buf.bind_here(end).unwrap();

        let code = buf.finalize().unwrap();
        assert_eq!(word_at(&code, 4), 12);
    }

    #[test]
    fn test_backward_reference_resolves() {
        let mut buf = BytecodeBuffer::new();
        buf.emit(Op::Add, &[]);
        let top = buf.create_mark();
        buf.bind_here(top).unwrap();
        buf.emit(Op::Goto, &[top.into()]);
        let code = buf.finalize().unwrap();
        assert_eq!(word_at(&code, 8), 4);
    }

    #[test]
    fn test_bind_twice_fails() {
        let mut buf = BytecodeBuffer::new();
        let m = buf.create_mark();
        buf.bind_here(m).unwrap();
        assert_eq!(
            buf.bind_here(m),
            Err(BufferError::AlreadyBound { mark: m, offset: 0 })
        );
        let other = buf.create_mark();
        assert!(matches!(
            buf.bind_mark(other, 100),
            Err(BufferError::BindOutOfRange { .. })
        ));
    }

    #[test]
    fn test_unbound_mark_fails_finalize() {
        let mut buf = BytecodeBuffer::new();
        let m = buf.create_mark();
        buf.emit(Op::IfNotGoto, &[m.into()]);
        assert_eq!(
            buf.finalize(),
            Err(BufferError::Unresolved { mark: m, offset: 4 })
        );
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut buf = BytecodeBuffer::new();
        let m = buf.create_mark();
        buf.emit(Op::Goto, &[m.into()]);
        buf.bind_here(m).unwrap();
        let first = buf.finalize().unwrap();
        let second = buf.finalize().unwrap();
        assert_eq!(first, second);
        assert!(!first.windows(WORD).any(|w| w == PLACEHOLDER.to_le_bytes()));
    }

    #[test]
    fn test_splice_moves_child_after_dispatch() {
        let mut parent = BytecodeBuffer::new();
        let body_mark = parent.create_mark();
        let exit = parent.create_mark();

        let mut body = parent.child();
        body.bind_here(body_mark).unwrap();
        body.emit(Op::PushNumber, &[Operand::Int(1)]);
        body.emit(Op::Goto, &[exit.into()]);

        parent.emit(Op::CaseGoto, &[Operand::Int(5), body_mark.into()]);
        let at = parent.len();
        parent.splice(body, at).unwrap();
        parent.bind_here(exit).unwrap();

        assert_eq!(parent.mark_offset(body_mark), Some(12));
        let code = parent.finalize().unwrap();
        assert_eq!(word_at(&code, 8), 12);
        assert_eq!(word_at(&code, 24), 28);
    }

    #[test]
    fn test_splice_in_middle_shifts_later_marks_and_references() {
        let mut parent = BytecodeBuffer::new();
        let early = parent.create_mark();
        let late = parent.create_mark();
        parent.bind_here(early).unwrap();
        parent.emit(Op::Add, &[]);
        parent.bind_here(late).unwrap();
        parent.emit(Op::Goto, &[late.into()]);

        let mut child = parent.child();
        child.emit(Op::Drop, &[]);
        child.emit(Op::Drop, &[]);
        parent.splice(child, 4).unwrap();

        assert_eq!(parent.mark_offset(early), Some(0));
        assert_eq!(parent.mark_offset(late), Some(12));
        let code = parent.finalize().unwrap();
        assert_eq!(word_at(&code, 12), Op::Goto.word());
        assert_eq!(word_at(&code, 16), 12);
    }

    #[test]
    fn test_splice_errors() {
        let mut parent = BytecodeBuffer::new();
        let child = parent.child();
        assert_eq!(
            parent.splice(child, 4),
            Err(BufferError::SpliceOutOfRange { at: 4, len: 0 })
        );
        assert_eq!(
            parent.splice(BytecodeBuffer::new(), 0),
            Err(BufferError::ForeignBuffer)
        );

        let m = parent.create_mark();
        parent.bind_here(m).unwrap();
        let mut child = parent.child();
        child.bind_here(m).unwrap();
        assert!(matches!(
            parent.splice(child, 0),
            Err(BufferError::AlreadyBound { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_splice_shifts_exactly_the_marks_at_or_after(
            before in 0usize..6,
            after in 0usize..6,
            child_len in 0usize..6,
        ) {
            let mut parent = BytecodeBuffer::new();
            let mut marks = Vec::new();
            for _ in 0..before + after {
                let m = parent.create_mark();
                parent.bind_here(m).unwrap();
                marks.push((m, parent.len()));
                parent.emit(Op::Goto, &[m.into()]);
            }

            let at = before * 2 * WORD;
            let mut child = parent.child();
            let child_mark = child.create_mark();
            child.bind_here(child_mark).unwrap();
            for _ in 0..child_len {
                child.emit(Op::Goto, &[child_mark.into()]);
            }
            let shift = child.len();
            parent.splice(child, at).unwrap();

            for (m, original) in &marks {
                let expected = if *original >= at { original + shift } else { *original };
                prop_assert_eq!(parent.mark_offset(*m), Some(expected));
            }
            prop_assert_eq!(parent.mark_offset(child_mark), Some(at));

            // Every reference still lands on its own mark after relocation.
            let code = parent.finalize().unwrap();
            for (m, _) in &marks {
                let target = parent.mark_offset(*m).unwrap();
                prop_assert_eq!(LittleEndian::read_u32(&code[target + WORD..target + 2 * WORD]) as usize, target);
            }
            prop_assert_eq!(parent.reference_count(), before + after + child_len);
        }
    }
}
