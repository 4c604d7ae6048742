//! On-disk form of a compiled chunk: the magic `blox` followed by the
//! MessagePack encoding of the [`Chunk`].

use thiserror::Error;

use crate::vm::chunk::Chunk;

pub const MAGIC: &[u8; 4] = b"blox";

#[derive(Error, Debug)]
pub enum BytecodeError {
    #[error("not a bytecode file: missing 'blox' header")]
    MissingMagic,

    #[error("encode bytecode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode bytecode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

pub fn encode(chunk: &Chunk) -> Result<Vec<u8>, BytecodeError> {
    let payload = rmp_serde::to_vec(chunk)?;
    let mut bytes = Vec::with_capacity(MAGIC.len() + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Chunk, BytecodeError> {
    let payload = bytes
        .strip_prefix(MAGIC.as_slice())
        .ok_or(BytecodeError::MissingMagic)?;
    Ok(rmp_serde::from_slice(payload)?)
}

/// Whether `bytes` look like an encoded chunk.
pub fn is_bytecode(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}
