use std::collections::BTreeSet;
use std::fmt::Write;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::bytecode::buffer::WORD;
use crate::bytecode::object::{ObjectFile, Segment};
use crate::bytecode::op::Op;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub op: Op,
    pub operands: Vec<i32>,
}

impl Instruction {
    /// Jump target of a branch instruction.
    pub fn target(&self) -> Option<usize> {
        if self.op.is_branch() {
            self.operands.last().map(|&t| t as u32 as usize)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("code length {0} is not a multiple of the word size")]
    Misaligned(usize),

    #[error("unknown opcode {word} at offset {offset}")]
    UnknownOpcode { word: u32, offset: usize },

    #[error("instruction at offset {offset} is cut off")]
    Truncated { offset: usize },
}

/// Splits finalized code back into instructions.
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    if code.len() % WORD != 0 {
        return Err(DecodeError::Misaligned(code.len()));
    }

    let words: Vec<u32> = code.chunks_exact(WORD).map(LittleEndian::read_u32).collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let offset = i * WORD;
        let op = Op::from_word(words[i]).ok_or(DecodeError::UnknownOpcode {
            word: words[i],
            offset,
        })?;
        let count = op.operand_count();
        let operands = words
            .get(i + 1..i + 1 + count)
            .ok_or(DecodeError::Truncated { offset })?
            .iter()
            .map(|&w| w as i32)
            .collect();
        out.push(Instruction {
            offset,
            op,
            operands,
        });
        i += 1 + count;
    }
    Ok(out)
}

/// Renders one segment's code, marking jump targets with `►`.
pub fn disassemble(code: &[u8], strings: &[String]) -> Result<String, DecodeError> {
    let instructions = decode(code)?;
    let targets: BTreeSet<usize> = instructions.iter().filter_map(Instruction::target).collect();

    let mut out = String::new();
    for ins in &instructions {
        let is_target = targets.contains(&ins.offset);
        if is_target {
            let _ = writeln!(out, "      ┌──────────────────────────────────");
        }
        let _ = write!(
            out,
            "{:04} {}{:<12}",
            ins.offset,
            if is_target { "► " } else { "  " },
            ins.op.mnemonic()
        );
        let _ = writeln!(out, "{}", format_operands(ins, strings).trim_end());
    }

    // A jump to the very end of the code (loop exits at segment end are
    // always followed by a terminator, but hand-built code may not be).
    if targets.contains(&code.len()) {
        let _ = writeln!(out, "{:04} ► <end>", code.len());
    }
    Ok(out)
}

fn format_operands(ins: &Instruction, strings: &[String]) -> String {
    match (ins.op, ins.operands.as_slice()) {
        (Op::Command, [number, argc]) => format!("#{} ({} args)", number, argc),
        (Op::CaseGoto, [value, target]) => format!("{} → {:04}", value, target),
        (Op::PushStringIndex, [index]) => match strings.get(*index as usize) {
            Some(s) => format!("{} ; {:?}", index, s),
            None => format!("{} ; <missing string>", index),
        },
        (op, [target]) if op.is_branch() => {
            let direction = if (*target as usize) <= ins.offset { "↑" } else { "↓" };
            format!("{} (→ {:04})", direction, target)
        }
        (_, operands) => operands
            .iter()
            .map(|o| o.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn render_segment(out: &mut String, title: &str, segment: &Segment, strings: &[String]) {
    let _ = writeln!(out, "════════════════════════════════════════");
    let _ = writeln!(out, " {}", title);
    let _ = writeln!(out, " {} bytes", segment.code.len());
    let _ = writeln!(out, "════════════════════════════════════════");
    match disassemble(&segment.code, strings) {
        Ok(text) => out.push_str(&text),
        Err(e) => {
            let _ = writeln!(out, "<undecodable: {}>", e);
        }
    }
    out.push('\n');
}

/// Renders every segment of an object file.
pub fn render_object(object: &ObjectFile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== BOTC OBJECT v{} ===\n", object.version);

    for state in &object.states {
        for segment in &state.segments {
            let title = format!("state {} \"{}\" / {}", state.index, state.name, segment.kind);
            render_segment(&mut out, &title, segment, &object.strings);
        }
    }
    for segment in &object.events {
        render_segment(&mut out, &format!("global {}", segment.kind), segment, &object.strings);
    }

    if !object.strings.is_empty() {
        let _ = writeln!(out, "-- strings --");
        for (i, s) in object.strings.iter().enumerate() {
            let _ = writeln!(out, "  {:3}  {:?}", i, s);
        }
    }
    let _ = writeln!(out, "-- {} global variable(s) --", object.global_count);
    out
}

pub fn print_object(object: &ObjectFile) {
    print!("{}", render_object(object));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::buffer::{BytecodeBuffer, Operand};
    use crate::bytecode::object::SegmentKind;

    fn sample_code() -> Vec<u8> {
        let mut buf = BytecodeBuffer::new();
        let top = buf.create_mark();
        let exit = buf.create_mark();
        buf.bind_here(top).unwrap();
        buf.emit(Op::PushStringIndex, &[Operand::Int(0)]);
        buf.emit(Op::IfNotGoto, &[exit.into()]);
        buf.emit(Op::Command, &[Operand::Int(3), Operand::Int(1)]);
        buf.emit(Op::Goto, &[top.into()]);
        buf.bind_here(exit).unwrap();
        buf.emit(Op::EndMainLoop, &[]);
        buf.finalize().unwrap()
    }

    #[test]
    fn test_decode() {
        let ins = decode(&sample_code()).unwrap();
        let ops: Vec<Op> = ins.iter().map(|i| i.op).collect();
        assert_eq!(
            ops,
            vec![
                Op::PushStringIndex,
                Op::IfNotGoto,
                Op::Command,
                Op::Goto,
                Op::EndMainLoop
            ]
        );
        assert_eq!(ins[1].target(), Some(36));
        assert_eq!(ins[3].target(), Some(0));
        assert_eq!(ins[4].offset, 36);
        assert_eq!(ins[2].target(), None);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(&[0, 0]), Err(DecodeError::Misaligned(2)));
        assert_eq!(
            decode(&[0xFF, 0, 0, 0]),
            Err(DecodeError::UnknownOpcode {
                word: 0xFF,
                offset: 0
            })
        );
        // Goto without its operand word.
        let goto = Op::Goto.word().to_le_bytes();
        assert_eq!(decode(&goto), Err(DecodeError::Truncated { offset: 0 }));
    }

    #[test]
    fn test_disassemble_marks_targets() {
        let text = disassemble(&sample_code(), &["idle".to_string()]).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains('┌'));
        assert!(lines[1].starts_with("0000 ► PUSH_STR"));
        assert!(lines[1].contains("\"idle\""));
        assert!(lines[2].contains("IF_NOT_GOTO") && lines[2].contains("↓ (→ 0036)"));
        assert!(lines[3].contains("#3 (1 args)"));
        assert!(lines[4].contains("↑ (→ 0000)"));
        assert!(lines[6].starts_with("0036 ► END_MAINLOOP"));
    }

    #[test]
    fn test_render_object() {
        let object = ObjectFile {
            version: 1,
            states: vec![crate::bytecode::object::StateObject {
                name: "idle".to_string(),
                index: 0,
                local_count: 0,
                segments: vec![Segment {
                    kind: SegmentKind::MainLoop,
                    code: sample_code(),
                }],
            }],
            events: Vec::new(),
            strings: vec!["idle".to_string()],
            global_count: 2,
        };
        let text = render_object(&object);
        assert!(text.contains("state 0 \"idle\" / mainloop"));
        assert!(text.contains("-- strings --"));
        assert!(text.contains("-- 2 global variable(s) --"));
    }
}
