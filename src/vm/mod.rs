pub mod bytecode;
pub mod chunk;
pub mod compiler;
pub mod disassembler;
pub mod value;
#[allow(clippy::module_inception)]
pub mod vm;

use crate::error::{CompileError, InterpretError};
use crate::vm::chunk::Chunk;
use crate::vm::value::Value;
use crate::vm::vm::Vm;

/// Compile source code to bytecode and return the chunk.
pub fn compile_to_chunk(source: &str) -> Result<Chunk, Vec<CompileError>> {
    compiler::compile(source)
}

/// Compile and execute source code, yielding the value of the expression.
/// A chunk from a failed compile is never executed.
pub fn interpret(source: &str) -> Result<Value, InterpretError> {
    let chunk = compile_to_chunk(source)?;
    let value = Vm::new().interpret(&chunk)?;
    Ok(value)
}
