use std::fmt::Write as _;

use crate::vm::chunk::{Chunk, OpCode};

/// Disassemble a chunk into human-readable text: a header, the constant pool
/// and one line per instruction.
///
/// `source_name` is shown in the header (e.g. a file path or `"<repl>"`).
pub fn disassemble(chunk: &Chunk, source_name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Compiled from \"{source_name}\"");

    if !chunk.constants.is_empty() {
        out.push_str("  Constants:\n");
        for (i, constant) in chunk.constants.iter().enumerate() {
            let _ = writeln!(out, "    {:>5} = {constant}", format!("#{i}"));
        }
        out.push('\n');
    }

    out.push_str("  Code:\n");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, &mut out);
    }
    out
}

/// Format the instruction at `offset` into `out`, returning the offset of the
/// next instruction. Unknown opcodes occupy one byte; an instruction whose
/// operands run past the end of the code ends the walk.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let Some(&byte) = chunk.code.get(offset) else {
        let _ = writeln!(out, "    {offset:04} <end of code>");
        return offset;
    };

    let position = chunk.position_at(offset);
    let same_line = offset > 0 && chunk.position_at(offset - 1).line == position.line;
    let location = if same_line {
        "   |".to_string()
    } else {
        format!("{:>4}", position.line)
    };
    let _ = write!(out, "    {offset:04} {location}:{:<3} ", position.column);

    let Ok(op) = OpCode::try_from(byte) else {
        let _ = writeln!(out, "unknown opcode {byte}");
        return offset + 1;
    };

    let name = op.as_ref();
    let next = offset + 1 + op.operand_width();
    if next > chunk.code.len() {
        let _ = writeln!(out, "{name:<16} <truncated operand>");
        return chunk.code.len();
    }

    let index = match op {
        OpCode::Constant => Some(chunk.code[offset + 1] as usize),
        OpCode::ConstantLong => chunk.read_u24(offset + 1),
        _ => None,
    };
    match index {
        Some(index) => {
            let value = chunk
                .constants
                .get(index)
                .map(ToString::to_string)
                .unwrap_or_else(|| "<invalid constant>".to_string());
            let _ = writeln!(out, "{name:<16} #{index:<7} // {value}");
        }
        None => {
            let _ = writeln!(out, "{name}");
        }
    }
    next
}
