use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::error::InterpretError;
use crate::scanner::Scanner;
use crate::scanner::token::TokenKind;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = "... ";

/// Run the interactive REPL. Each entry is compiled and executed on its own;
/// unbalanced parentheses or a trailing operator continue the entry on the
/// next line.
pub fn run_repl() -> rustyline::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };
        match editor.readline(prompt) {
            Ok(line) => {
                buffer.push_str(&line);
                buffer.push('\n');
                if needs_continuation(&buffer) {
                    continue;
                }
                let entry = std::mem::take(&mut buffer);
                if entry.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(entry.trim_end());
                eval_and_print(&entry);
            }
            Err(ReadlineError::Interrupted) => {
                debug!("entry discarded");
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn eval_and_print(source: &str) {
    match crate::vm::interpret(source) {
        Ok(value) => println!("{value}"),
        Err(InterpretError::Compile(errors)) => {
            for e in errors {
                eprint!("{}", e.with_source_code("<repl>", source).render());
            }
        }
        Err(InterpretError::Runtime(e)) => eprintln!("{e}"),
    }
}

/// Heuristic: the entry is incomplete while a '(' is left open or the last
/// token is a binary operator.
fn needs_continuation(source: &str) -> bool {
    let mut depth: i64 = 0;
    let mut last = TokenKind::Eof;
    for token in Scanner::new(source) {
        match token.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => depth -= 1,
            TokenKind::Error => return false,
            TokenKind::Eof => break,
            _ => {}
        }
        last = token.kind;
    }
    depth > 0
        || matches!(
            last,
            TokenKind::Plus | TokenKind::Minus | TokenKind::Star | TokenKind::Slash
        )
}
