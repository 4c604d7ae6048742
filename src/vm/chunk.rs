use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::scanner::token::Position;
use crate::vm::value::Value;

/// Largest constant index addressable by the one-byte operand of `Constant`.
pub const MAX_SHORT_CONSTANT: usize = 0xFF;
/// Largest constant index addressable by the three-byte operand of `ConstantLong`.
pub const MAX_LONG_CONSTANT: usize = 0xFF_FFFF;

/// A bytecode instruction. Each opcode is followed by a fixed number of
/// operand bytes given by [`OpCode::operand_width`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr, strum::FromRepr,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum OpCode {
    Constant,
    ConstantLong,
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Return,
}

impl OpCode {
    pub fn operand_width(self) -> usize {
        match self {
            Self::Constant => 1,
            Self::ConstantLong => 3,
            Self::Add
            | Self::Subtract
            | Self::Multiply
            | Self::Divide
            | Self::Negate
            | Self::Return => 0,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_repr(byte).ok_or(byte)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("too many constants in one chunk: index {index} exceeds {max}", max = MAX_LONG_CONSTANT)]
    ConstantPoolOverflow { index: usize },
}

/// Encoding chosen for a constant-pool index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantLoad {
    Short(u8),
    /// Big-endian: most significant byte first.
    Long([u8; 3]),
}

impl ConstantLoad {
    pub fn for_index(index: usize) -> Result<Self, ChunkError> {
        if let Ok(byte) = u8::try_from(index) {
            Ok(Self::Short(byte))
        } else if index <= MAX_LONG_CONSTANT {
            Ok(Self::Long([
                (index >> 16) as u8,
                (index >> 8) as u8,
                index as u8,
            ]))
        } else {
            Err(ChunkError::ConstantPoolOverflow { index })
        }
    }

    pub fn opcode(&self) -> OpCode {
        match self {
            Self::Short(_) => OpCode::Constant,
            Self::Long(_) => OpCode::ConstantLong,
        }
    }
}

/// A chunk of bytecode: instructions + constant pool + per-byte source positions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    pub positions: Vec<Position>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_byte(&mut self, byte: u8, position: Position) {
        self.code.push(byte);
        self.positions.push(position);
    }

    pub fn write_op(&mut self, op: OpCode, position: Position) {
        self.write_byte(op as u8, position);
    }

    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Appends `value` to the pool and emits the load instruction for it,
    /// choosing the short or long form by index. On overflow nothing is written.
    pub fn write_constant(&mut self, value: Value, position: Position) -> Result<usize, ChunkError> {
        let load = ConstantLoad::for_index(self.constants.len())?;
        let index = self.add_constant(value);
        self.write_op(load.opcode(), position);
        match load {
            ConstantLoad::Short(byte) => self.write_byte(byte, position),
            ConstantLoad::Long(bytes) => {
                for byte in bytes {
                    self.write_byte(byte, position);
                }
            }
        }
        Ok(index)
    }

    /// Big-endian 24-bit operand starting at `offset`.
    pub fn read_u24(&self, offset: usize) -> Option<usize> {
        let bytes = self.code.get(offset..offset + 3)?;
        Some((bytes[0] as usize) << 16 | (bytes[1] as usize) << 8 | bytes[2] as usize)
    }

    pub fn position_at(&self, offset: usize) -> Position {
        self.positions.get(offset).copied().unwrap_or_default()
    }

    /// Position recorded by the most recent write.
    pub fn last_position(&self) -> Option<Position> {
        self.positions.last().copied()
    }
}
