use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

use crate::scanner::token::{Position, Span};

// ============= Compile-time errors (with miette diagnostics) =============

#[derive(Error, Debug, Diagnostic)]
pub enum CompileError {
    #[error("[line {position}] scan error at '{lexeme}': {message}")]
    #[diagnostic(code(lox::scan))]
    Scan {
        message: String,
        lexeme: String,
        position: Position,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("[line {position}] parse error at {location}: {message}")]
    #[diagnostic(code(lox::parse))]
    Parse {
        message: String,
        /// `'lexeme'` or `end`.
        location: String,
        position: Position,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("[line {position}] {message}")]
    #[diagnostic(code(lox::constant_pool))]
    ConstantPool {
        message: String,
        position: Position,
        #[label("this constant")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },
}

fn empty_source() -> NamedSource<String> {
    NamedSource::new("input", String::new())
}

impl CompileError {
    pub fn scan(
        message: impl Into<String>,
        lexeme: impl Into<String>,
        span: Span,
        position: Position,
    ) -> Self {
        Self::Scan {
            message: message.into(),
            lexeme: lexeme.into(),
            position,
            span: span.into(),
            src: empty_source(),
        }
    }

    pub fn parse(
        message: impl Into<String>,
        location: impl Into<String>,
        span: Span,
        position: Position,
    ) -> Self {
        Self::Parse {
            message: message.into(),
            location: location.into(),
            position,
            span: span.into(),
            src: empty_source(),
        }
    }

    pub fn constant_pool(message: impl Into<String>, span: Span, position: Position) -> Self {
        Self::ConstantPool {
            message: message.into(),
            position,
            span: span.into(),
            src: empty_source(),
        }
    }

    /// Attach source code for fancy miette diagnostics
    pub fn with_source_code(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        let named = NamedSource::new(name.into(), source.into());
        match &mut self {
            Self::Scan { src, .. } | Self::Parse { src, .. } | Self::ConstantPool { src, .. } => {
                *src = named;
            }
        }
        self
    }

    /// Render with miette's graphical handler, falling back to the plain message.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match GraphicalReportHandler::new().render_report(&mut out, self) {
            Ok(()) => out,
            Err(_) => self.to_string(),
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Self::Scan { position, .. }
            | Self::Parse { position, .. }
            | Self::ConstantPool { position, .. } => *position,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Scan { message, .. }
            | Self::Parse { message, .. }
            | Self::ConstantPool { message, .. } => message,
        }
    }
}

// ============= Runtime errors (simple, no miette) =============

/// Fatal conditions raised while executing a chunk. There is no recovery at
/// this layer; the caller decides whether to terminate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("[line {position}] stack overflow: more than {capacity} values")]
    StackOverflow { capacity: usize, position: Position },

    #[error("[line {position}] stack underflow")]
    StackUnderflow { position: Position },

    #[error("[line {position}] unknown opcode {byte} at offset {offset}")]
    UnknownOpcode {
        byte: u8,
        offset: usize,
        position: Position,
    },

    #[error("[line {position}] constant index {index} out of range")]
    InvalidConstant { index: usize, position: Position },

    #[error("[line {position}] instruction stream ended at offset {offset} without a return")]
    UnexpectedEnd { offset: usize, position: Position },
}

impl RuntimeError {
    pub fn position(&self) -> Position {
        match self {
            Self::StackOverflow { position, .. }
            | Self::StackUnderflow { position }
            | Self::UnknownOpcode { position, .. }
            | Self::InvalidConstant { position, .. }
            | Self::UnexpectedEnd { position, .. } => *position,
        }
    }
}

// ============= Pipeline result =============

/// Failure of the compile-then-execute pipeline.
#[derive(Error, Debug)]
pub enum InterpretError {
    #[error("{} compile error(s)", .0.len())]
    Compile(Vec<CompileError>),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl InterpretError {
    /// sysexits-style status: 65 (data error) for compile errors, 70 (software
    /// error) for runtime errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Compile(_) => 65,
            Self::Runtime(_) => 70,
        }
    }
}

impl From<Vec<CompileError>> for InterpretError {
    fn from(errors: Vec<CompileError>) -> Self {
        Self::Compile(errors)
    }
}

// ============= Tests =============
