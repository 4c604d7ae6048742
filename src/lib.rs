pub mod error;
pub mod repl;
pub mod scanner;
pub mod vm;

// Re-export error types for convenience
pub use error::{CompileError, InterpretError, RuntimeError};
pub use vm::{compile_to_chunk, interpret};
