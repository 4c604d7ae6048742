use std::fmt::Write as _;

use tracing::{Level, trace};

use crate::error::RuntimeError;
use crate::vm::chunk::{Chunk, OpCode};
use crate::vm::disassembler;
use crate::vm::value::Value;

/// Operand stack capacity.
pub const STACK_MAX: usize = 256;

/// Stack machine over a borrowed chunk. The operand stack is a fixed array
/// with a cursor; `stack_top` is the index of the next free slot.
pub struct Vm {
    ip: usize,
    stack: [Value; STACK_MAX],
    stack_top: usize,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            ip: 0,
            stack: [Value::default(); STACK_MAX],
            stack_top: 0,
        }
    }

    /// Execute `chunk` from its first byte until `Return`, yielding the value
    /// on top of the stack.
    pub fn interpret(&mut self, chunk: &Chunk) -> Result<Value, RuntimeError> {
        self.ip = 0;
        self.stack_top = 0;
        self.run(chunk)
    }

    /// Live stack contents, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.stack[..self.stack_top]
    }

    pub fn stack_dump(&self) -> String {
        let mut out = String::new();
        for value in self.stack() {
            let _ = write!(out, "[ {value} ]");
        }
        out
    }

    fn run(&mut self, chunk: &Chunk) -> Result<Value, RuntimeError> {
        loop {
            if tracing::enabled!(Level::TRACE) {
                let mut instruction = String::new();
                disassembler::disassemble_instruction(chunk, self.ip, &mut instruction);
                trace!(
                    stack = %self.stack_dump(),
                    "{}",
                    instruction.trim_end()
                );
            }

            let offset = self.ip;
            let byte = self.read_byte(chunk)?;
            let op = OpCode::from_repr(byte).ok_or_else(|| RuntimeError::UnknownOpcode {
                byte,
                offset,
                position: chunk.position_at(offset),
            })?;

            match op {
                OpCode::Constant => {
                    let index = self.read_byte(chunk)? as usize;
                    self.push_constant(chunk, index, offset)?;
                }
                OpCode::ConstantLong => {
                    let index = chunk
                        .read_u24(self.ip)
                        .ok_or_else(|| Self::unexpected_end(chunk, offset))?;
                    self.ip += 3;
                    self.push_constant(chunk, index, offset)?;
                }
                OpCode::Negate => {
                    let top = self.peek_mut(chunk, offset)?;
                    *top = -*top;
                }
                OpCode::Add => self.binary_op(chunk, offset, |a, b| a + b)?,
                OpCode::Subtract => self.binary_op(chunk, offset, |a, b| a - b)?,
                OpCode::Multiply => self.binary_op(chunk, offset, |a, b| a * b)?,
                OpCode::Divide => self.binary_op(chunk, offset, |a, b| a / b)?,
                OpCode::Return => {
                    let result = self.pop(chunk, offset)?;
                    trace!(%result, "halt");
                    return Ok(result);
                }
            }
        }
    }

    fn read_byte(&mut self, chunk: &Chunk) -> Result<u8, RuntimeError> {
        let byte = *chunk
            .code
            .get(self.ip)
            .ok_or_else(|| Self::unexpected_end(chunk, self.ip))?;
        self.ip += 1;
        Ok(byte)
    }

    fn unexpected_end(chunk: &Chunk, offset: usize) -> RuntimeError {
        RuntimeError::UnexpectedEnd {
            offset,
            position: chunk.last_position().unwrap_or_default(),
        }
    }

    fn push_constant(&mut self, chunk: &Chunk, index: usize, offset: usize) -> Result<(), RuntimeError> {
        let value = *chunk
            .constants
            .get(index)
            .ok_or(RuntimeError::InvalidConstant {
                index,
                position: chunk.position_at(offset),
            })?;
        self.push(chunk, offset, value)
    }

    /// Pops `b` then `a` and pushes `a op b`, so the first-pushed operand is
    /// the left-hand side.
    fn binary_op(
        &mut self,
        chunk: &Chunk,
        offset: usize,
        op: fn(Value, Value) -> Value,
    ) -> Result<(), RuntimeError> {
        let b = self.pop(chunk, offset)?;
        let a = self.pop(chunk, offset)?;
        self.push(chunk, offset, op(a, b))
    }

    fn push(&mut self, chunk: &Chunk, offset: usize, value: Value) -> Result<(), RuntimeError> {
        let slot = self
            .stack
            .get_mut(self.stack_top)
            .ok_or(RuntimeError::StackOverflow {
                capacity: STACK_MAX,
                position: chunk.position_at(offset),
            })?;
        *slot = value;
        self.stack_top += 1;
        Ok(())
    }

    fn pop(&mut self, chunk: &Chunk, offset: usize) -> Result<Value, RuntimeError> {
        if self.stack_top == 0 {
            return Err(RuntimeError::StackUnderflow {
                position: chunk.position_at(offset),
            });
        }
        self.stack_top -= 1;
        Ok(self.stack[self.stack_top])
    }

    fn peek_mut(&mut self, chunk: &Chunk, offset: usize) -> Result<&mut Value, RuntimeError> {
        match self.stack_top.checked_sub(1) {
            Some(top) => Ok(&mut self.stack[top]),
            None => Err(RuntimeError::StackUnderflow {
                position: chunk.position_at(offset),
            }),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
