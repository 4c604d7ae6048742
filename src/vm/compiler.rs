use tracing::debug;

use crate::error::CompileError;
use crate::scanner::Scanner;
use crate::scanner::token::{Token, TokenKind};
use crate::vm::chunk::{Chunk, OpCode};
use crate::vm::value::Value;

/// Binding power, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    /// One level tighter; used for the right operand of left-associative operators.
    fn next(self) -> Self {
        match self {
            Self::None => Self::Assignment,
            Self::Assignment => Self::Or,
            Self::Or => Self::And,
            Self::And => Self::Equality,
            Self::Equality => Self::Comparison,
            Self::Comparison => Self::Term,
            Self::Term => Self::Factor,
            Self::Factor => Self::Unary,
            Self::Unary => Self::Call,
            Self::Call | Self::Primary => Self::Primary,
        }
    }
}

/// Handlers for a token that starts an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    Grouping,
    Unary,
    Number,
}

/// Handlers for a token that continues an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Infix {
    Binary,
}

#[derive(Debug, Clone, Copy)]
struct ParseRule {
    prefix: Option<Prefix>,
    infix: Option<Infix>,
    precedence: Precedence,
}

impl ParseRule {
    const fn new(prefix: Option<Prefix>, infix: Option<Infix>, precedence: Precedence) -> Self {
        Self {
            prefix,
            infix,
            precedence,
        }
    }
}

fn rule(kind: TokenKind) -> ParseRule {
    use Precedence as P;
    match kind {
        TokenKind::LeftParen => ParseRule::new(Some(Prefix::Grouping), None, P::None),
        TokenKind::Minus => ParseRule::new(Some(Prefix::Unary), Some(Infix::Binary), P::Term),
        TokenKind::Plus => ParseRule::new(None, Some(Infix::Binary), P::Term),
        TokenKind::Slash | TokenKind::Star => {
            ParseRule::new(None, Some(Infix::Binary), P::Factor)
        }
        TokenKind::Number => ParseRule::new(Some(Prefix::Number), None, P::None),
        _ => ParseRule::new(None, None, P::None),
    }
}

/// Deepest `parse_precedence` recursion accepted before reporting an error.
pub const MAX_NESTING: usize = 1024;

/// Single-pass compiler: pulls tokens from the scanner and emits bytecode as
/// it parses. State lives for one compilation.
pub struct Compiler<'src> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    chunk: Chunk,
    had_error: bool,
    panic_mode: bool,
    depth: usize,
    errors: Vec<CompileError>,
}

/// Compile a single expression into a chunk ending in `Return`.
pub fn compile(source: &str) -> Result<Chunk, Vec<CompileError>> {
    Compiler::new(source).compile()
}

impl<'src> Compiler<'src> {
    pub fn new(source: &'src str) -> Self {
        Self::with_chunk(source, Chunk::new())
    }

    /// Compile into `chunk`, appending after whatever it already holds.
    fn with_chunk(source: &'src str, chunk: Chunk) -> Self {
        let scanner = Scanner::new(source);
        let start = Token::eof(0, scanner.cursor_position());
        Self {
            scanner,
            current: start,
            previous: start,
            chunk,
            had_error: false,
            panic_mode: false,
            depth: 0,
            errors: Vec::new(),
        }
    }

    pub fn compile(mut self) -> Result<Chunk, Vec<CompileError>> {
        self.advance();
        self.expression();
        self.consume(TokenKind::Eof, "expect end of expression");
        self.emit_op(OpCode::Return);

        if self.had_error {
            return Err(self.errors);
        }
        debug!(
            bytes = self.chunk.code.len(),
            constants = self.chunk.constants.len(),
            "compiled chunk"
        );
        Ok(self.chunk)
    }

    // ========== Token handling ==========

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    // ========== Expressions ==========

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        if self.depth >= MAX_NESTING {
            self.error_at_current("expression nested too deeply");
            return;
        }
        self.depth += 1;
        self.parse_operand_and_operators(precedence);
        self.depth -= 1;
    }

    fn parse_operand_and_operators(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule(self.previous.kind).prefix else {
            self.error("expect expression");
            return;
        };
        self.apply_prefix(prefix);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule(self.previous.kind).infix {
                self.apply_infix(infix);
            }
        }
    }

    fn apply_prefix(&mut self, prefix: Prefix) {
        match prefix {
            Prefix::Grouping => self.grouping(),
            Prefix::Unary => self.unary(),
            Prefix::Number => self.number(),
        }
    }

    fn apply_infix(&mut self, infix: Infix) {
        match infix {
            Infix::Binary => self.binary(),
        }
    }

    fn number(&mut self) {
        match self.previous.lexeme.parse::<f64>() {
            Ok(n) => self.emit_constant(Value::Number(n)),
            Err(_) => self.error("invalid number literal"),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "expect ')' after expression");
    }

    fn unary(&mut self) {
        let operator = self.previous;
        self.parse_precedence(Precedence::Unary);
        match operator.kind {
            TokenKind::Minus => self.emit_op_at(OpCode::Negate, operator),
            _ => unreachable!("unary rule registered only for '-'"),
        }
    }

    fn binary(&mut self) {
        let operator = self.previous;
        self.parse_precedence(rule(operator.kind).precedence.next());
        let op = match operator.kind {
            TokenKind::Plus => OpCode::Add,
            TokenKind::Minus => OpCode::Subtract,
            TokenKind::Star => OpCode::Multiply,
            TokenKind::Slash => OpCode::Divide,
            _ => unreachable!("binary rule registered only for arithmetic operators"),
        };
        self.emit_op_at(op, operator);
    }

    // ========== Emission ==========

    fn emit_op(&mut self, op: OpCode) {
        self.emit_op_at(op, self.previous);
    }

    fn emit_op_at(&mut self, op: OpCode, token: Token<'src>) {
        self.chunk.write_op(op, token.position);
    }

    fn emit_constant(&mut self, value: Value) {
        let token = self.previous;
        if let Err(err) = self.chunk.write_constant(value, token.position) {
            self.report(CompileError::constant_pool(
                err.to_string(),
                token.span,
                token.position,
            ));
        }
    }

    // ========== Errors ==========

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        let err = match token.kind {
            TokenKind::Error => {
                let source = self.scanner.source();
                let text = &source[token.span.offset..token.span.end()];
                CompileError::scan(message, text, token.span, token.position)
            }
            TokenKind::Eof => CompileError::parse(message, "end", token.span, token.position),
            _ => CompileError::parse(
                message,
                format!("'{}'", token.lexeme),
                token.span,
                token.position,
            ),
        };
        self.report(err);
    }

    /// Records the first error. Once in panic mode later errors only keep
    /// `had_error` set; there are no statement boundaries to resynchronize on.
    fn report(&mut self, err: CompileError) {
        self.had_error = true;
        if self.panic_mode {
            debug!(error = %err, "suppressed error in panic mode");
            return;
        }
        self.panic_mode = true;
        self.errors.push(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::token::Position;
    use crate::vm::chunk::MAX_LONG_CONSTANT;
    use rstest::rstest;

    fn compile_ok(source: &str) -> Chunk {
        compile(source).expect("compile should succeed")
    }

    fn compile_err(source: &str) -> Vec<CompileError> {
        compile(source).expect_err("compile should fail")
    }

    fn constant(index: u8) -> [u8; 2] {
        [OpCode::Constant as u8, index]
    }

    fn code(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn single_number() {
        let chunk = compile_ok("1.2");
        assert_eq!(
            chunk.code,
            code(&[&constant(0), &[OpCode::Return as u8]])
        );
        assert_eq!(chunk.constants, vec![Value::Number(1.2)]);
    }

    #[test]
    fn negated_grouping() {
        let chunk = compile_ok("-(5+6)");
        assert_eq!(
            chunk.code,
            code(&[
                &constant(0),
                &constant(1),
                &[OpCode::Add as u8, OpCode::Negate as u8, OpCode::Return as u8],
            ])
        );
        assert_eq!(chunk.constants, vec![Value::Number(5.0), Value::Number(6.0)]);
    }

    #[test]
    fn factor_binds_tighter_than_term() {
        let chunk = compile_ok("2*3+4");
        assert_eq!(
            chunk.code,
            code(&[
                &constant(0),
                &constant(1),
                &[OpCode::Multiply as u8],
                &constant(2),
                &[OpCode::Add as u8, OpCode::Return as u8],
            ])
        );
    }

    #[test]
    fn grouping_overrides_precedence() {
        let chunk = compile_ok("(2+3)*4");
        assert_eq!(
            chunk.code,
            code(&[
                &constant(0),
                &constant(1),
                &[OpCode::Add as u8],
                &constant(2),
                &[OpCode::Multiply as u8, OpCode::Return as u8],
            ])
        );
    }

    #[test]
    fn same_precedence_is_left_associative() {
        let chunk = compile_ok("8-4-2");
        assert_eq!(
            chunk.code,
            code(&[
                &constant(0),
                &constant(1),
                &[OpCode::Subtract as u8],
                &constant(2),
                &[OpCode::Subtract as u8, OpCode::Return as u8],
            ])
        );
    }

    #[test]
    fn unary_binds_tighter_than_factor() {
        let chunk = compile_ok("-2*3");
        assert_eq!(
            chunk.code,
            code(&[
                &constant(0),
                &[OpCode::Negate as u8],
                &constant(1),
                &[OpCode::Multiply as u8, OpCode::Return as u8],
            ])
        );
    }

    #[test]
    fn operator_positions_are_recorded() {
        let chunk = compile_ok("1 +\n 2");
        let add_offset = chunk.code.len() - 2;
        assert_eq!(chunk.code[add_offset], OpCode::Add as u8);
        assert_eq!(chunk.position_at(add_offset), Position::new(1, 2));
        assert_eq!(chunk.position_at(2), Position::new(2, 1));
    }

    #[test]
    fn literals_past_255_use_long_form() {
        let source = (0..300).map(|i| i.to_string()).collect::<Vec<_>>().join("+");
        let chunk = compile_ok(&source);
        assert_eq!(chunk.constants.len(), 300);

        let mut offset = 0;
        let mut index = 0;
        while offset < chunk.code.len() {
            let op = OpCode::try_from(chunk.code[offset]).expect("valid opcode");
            match op {
                OpCode::Constant => {
                    assert!(index <= 0xFF, "short form used for index {index}");
                    assert_eq!(chunk.code[offset + 1] as usize, index);
                    index += 1;
                }
                OpCode::ConstantLong => {
                    assert!(index > 0xFF, "long form used for index {index}");
                    assert_eq!(chunk.read_u24(offset + 1), Some(index));
                    index += 1;
                }
                _ => {}
            }
            offset += 1 + op.operand_width();
        }
        assert_eq!(index, 300);
    }

    #[rstest]
    #[case("", "end", "expect expression")]
    #[case("+", "'+'", "expect expression")]
    #[case("(1 + 2", "end", "expect ')' after expression")]
    #[case("1 2", "'2'", "expect end of expression")]
    #[case("1 + nil", "'nil'", "expect expression")]
    #[case("\"text\"", "'\"text\"'", "expect expression")]
    fn parse_errors(#[case] source: &str, #[case] location: &str, #[case] message: &str) {
        let errors = compile_err(source);
        assert_eq!(errors.len(), 1, "{errors:?}");
        match &errors[0] {
            CompileError::Parse {
                location: got_location,
                message: got_message,
                ..
            } => {
                assert_eq!(got_location, location);
                assert_eq!(got_message, message);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_is_a_scan_error() {
        let errors = compile_err("1 + \"abc");
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], CompileError::Scan { message, .. } if message == "unterminated string"));
    }

    #[test]
    fn unexpected_character_reports_offending_text() {
        let errors = compile_err("1 + $");
        assert!(matches!(&errors[0], CompileError::Scan { lexeme, .. } if lexeme == "$"));
        assert_eq!(errors[0].position(), Position::new(1, 4));
    }

    #[test]
    fn panic_mode_suppresses_cascading_errors() {
        // missing operand, stray ')', an invalid character and a missing ')'
        let errors = compile_err("(1 + ) ) @ (");
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].message(), "expect expression");
    }

    #[test]
    fn nesting_limit_reports_instead_of_recursing() {
        let depth = 100_000;
        let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        let errors = compile_err(&source);
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].message(), "expression nested too deeply");
        assert_eq!(errors[0].position(), Position::new(1, MAX_NESTING));
    }

    #[test]
    fn nesting_at_limit_compiles() {
        let depth = MAX_NESTING - 1;
        let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        let chunk = compile_ok(&source);
        assert_eq!(chunk.constants, vec![Value::Number(1.0)]);
    }

    #[test]
    fn unary_chain_is_bounded_too() {
        let source = format!("{}1", "-".repeat(MAX_NESTING * 4));
        let errors = compile_err(&source);
        assert_eq!(errors[0].message(), "expression nested too deeply");
    }

    #[test]
    fn full_constant_pool_is_a_compile_error() {
        let mut chunk = Chunk::new();
        chunk.constants = vec![Value::default(); MAX_LONG_CONSTANT + 1];
        let errors = Compiler::with_chunk("1 + 2", chunk)
            .compile()
            .expect_err("compile should fail");
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(matches!(errors[0], CompileError::ConstantPool { .. }));
        let diag: &dyn miette::Diagnostic = &errors[0];
        assert_eq!(
            diag.code().map(|c| c.to_string()),
            Some("lox::constant_pool".into())
        );
        assert_eq!(errors[0].position(), Position::new(1, 0));
    }

    #[test]
    fn trailing_dot_number_is_accepted() {
        let chunk = compile_ok("1.");
        assert_eq!(chunk.constants, vec![Value::Number(1.0)]);
    }
}
