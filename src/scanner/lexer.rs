use winnow::combinator::{alt, opt};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::stream::{LocatingSlice, Location, Stream};
use winnow::token::{any, take_till, take_while};

use crate::error::CompileError;
use crate::scanner::token::{Position, Span, Token, TokenKind, keyword_kind};

type Input<'a> = LocatingSlice<&'a str>;

const UNTERMINATED_STRING: &str = "unterminated string";
const UNEXPECTED_CHARACTER: &str = "unexpected character";

fn shebang<'a>(input: &mut Input<'a>) -> ModalResult<()> {
    ("#!", take_till(0.., '\n')).void().parse_next(input)
}

fn whitespace_and_comments<'a>(input: &mut Input<'a>) -> ModalResult<()> {
    loop {
        let before = input.current_token_start();
        take_while(0.., |c: char| {
            c == ' ' || c == '\t' || c == '\r' || c == '\n'
        })
        .void()
        .parse_next(input)?;

        if input.starts_with("//") {
            take_while(0.., |c: char| c != '\n')
                .void()
                .parse_next(input)?;
        } else if input.current_token_start() == before {
            break;
        }
    }
    Ok(())
}

/// Consumes through the closing quote. A backslash escapes the next character.
/// Running out of input is a cut so `alt` does not try the other recognizers.
fn string_literal<'a>(input: &mut Input<'a>) -> ModalResult<TokenKind> {
    '"'.parse_next(input)?;
    loop {
        let c = any
            .parse_next(input)
            .map_err(|_: ErrMode<ContextError>| ErrMode::Cut(ContextError::new()))?;
        match c {
            '"' => return Ok(TokenKind::String),
            '\\' => {
                any.parse_next(input)
                    .map_err(|_: ErrMode<ContextError>| ErrMode::Cut(ContextError::new()))?;
            }
            _ => {}
        }
    }
}

/// Digits, optionally followed by `.` and more digits. `1.` is accepted here;
/// the compiler decides whether the lexeme is a usable literal.
fn number_literal<'a>(input: &mut Input<'a>) -> ModalResult<TokenKind> {
    (
        take_while(1.., |c: char| c.is_ascii_digit()),
        opt(('.', take_while(0.., |c: char| c.is_ascii_digit()))),
    )
        .value(TokenKind::Number)
        .parse_next(input)
}

fn identifier_or_keyword<'a>(input: &mut Input<'a>) -> ModalResult<TokenKind> {
    let lexeme: &str = (
        any.verify(|c: &char| c.is_ascii_alphabetic() || *c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)?;
    Ok(keyword_kind(lexeme).unwrap_or(TokenKind::Identifier))
}

fn two_char_token<'a>(input: &mut Input<'a>) -> ModalResult<TokenKind> {
    alt((
        "!=".value(TokenKind::BangEqual),
        "==".value(TokenKind::EqualEqual),
        ">=".value(TokenKind::GreaterEqual),
        "<=".value(TokenKind::LessEqual),
    ))
    .parse_next(input)
}

fn single_char_token<'a>(input: &mut Input<'a>) -> ModalResult<TokenKind> {
    any.verify_map(|c: char| match c {
        '(' => Some(TokenKind::LeftParen),
        ')' => Some(TokenKind::RightParen),
        '{' => Some(TokenKind::LeftBrace),
        '}' => Some(TokenKind::RightBrace),
        ',' => Some(TokenKind::Comma),
        '.' => Some(TokenKind::Dot),
        '-' => Some(TokenKind::Minus),
        '+' => Some(TokenKind::Plus),
        ';' => Some(TokenKind::Semicolon),
        '/' => Some(TokenKind::Slash),
        '*' => Some(TokenKind::Star),
        '!' => Some(TokenKind::Bang),
        '=' => Some(TokenKind::Equal),
        '<' => Some(TokenKind::Less),
        '>' => Some(TokenKind::Greater),
        _ => None,
    })
    .parse_next(input)
}

fn scan_token<'a>(input: &mut Input<'a>) -> ModalResult<TokenKind> {
    alt((
        string_literal,
        number_literal,
        identifier_or_keyword,
        two_char_token,
        single_char_token,
    ))
    .parse_next(input)
}

/// Pull-based scanner: each call to [`Scanner::next_token`] consumes input and
/// yields one token. Once the end of the buffer is reached it keeps returning EOF.
pub struct Scanner<'src> {
    source: &'src str,
    input: Input<'src>,
    line: usize,
    column: usize,
    finished: bool,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut scanner = Self {
            source,
            input: LocatingSlice::new(source),
            line: 1,
            column: 0,
            finished: false,
        };
        let _ = opt(shebang).parse_next(&mut scanner.input);
        scanner.track_from(0);
        scanner
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Line and column of the next unread character.
    pub fn cursor_position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn offset(&self) -> usize {
        self.input.current_token_start()
    }

    /// Advance line/column over everything consumed since `from`.
    fn track_from(&mut self, from: usize) {
        let to = self.offset();
        for c in self.source[from..to].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }

    pub fn next_token(&mut self) -> Token<'src> {
        let before = self.offset();
        // Trivia recognizers accept zero characters, so this never fails.
        let _ = whitespace_and_comments(&mut self.input);
        self.track_from(before);

        let start = self.offset();
        let position = self.cursor_position();
        if self.input.is_empty() {
            return Token::eof(start, position);
        }

        let checkpoint = self.input.checkpoint();
        let scanned = match scan_token(&mut self.input) {
            Ok(kind) => Ok(kind),
            Err(ErrMode::Cut(_)) => Err(UNTERMINATED_STRING),
            Err(_) => {
                self.input.reset(&checkpoint);
                let _ = any::<_, ContextError>.parse_next(&mut self.input);
                Err(UNEXPECTED_CHARACTER)
            }
        };
        self.track_from(start);

        let end = self.offset();
        let span = Span::new(start, end - start);
        match scanned {
            Ok(kind) => Token::new(kind, &self.source[start..end], span, position),
            Err(message) => Token::new(TokenKind::Error, message, span, position),
        }
    }
}

impl<'src> Iterator for Scanner<'src> {
    type Item = Token<'src>;

    /// Yields every token up to and including EOF, then `None`.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            self.finished = true;
        }
        Some(token)
    }
}

/// Scan all tokens from source, returning either a token list or scan errors.
pub fn scan_all(source: &str) -> Result<Vec<Token<'_>>, Vec<CompileError>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for token in Scanner::new(source) {
        if token.kind == TokenKind::Error {
            let text = &source[token.span.offset..token.span.end()];
            errors.push(CompileError::scan(
                token.lexeme,
                text,
                token.span,
                token.position,
            ));
        } else {
            tokens.push(token);
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}
