use bytelox::error::{CompileError, InterpretError};
use bytelox::scanner::token::Position;
use bytelox::vm::{compile_to_chunk, interpret};
use rstest::rstest;

fn compile_errors(source: &str) -> Vec<CompileError> {
    compile_to_chunk(source).expect_err("compile should fail")
}

#[test]
fn unterminated_string_reports_single_scan_error() {
    let source = include_str!("../fixtures/error_unterminated_string.lox");
    let errors = compile_errors(source);
    assert_eq!(errors.len(), 1, "expected 1 error but got {errors:?}");
    assert!(
        matches!(&errors[0], CompileError::Scan { .. }),
        "expected a scan error: {}",
        errors[0]
    );
    assert_eq!(errors[0].message(), "unterminated string");
    assert_eq!(errors[0].position(), Position::new(1, 4));
}

#[test]
fn missing_paren_reports_at_end() {
    let source = include_str!("../fixtures/error_missing_paren.lox");
    let errors = compile_errors(source);
    assert_eq!(errors.len(), 1, "expected 1 error but got {errors:?}");
    let message = errors[0].to_string();
    assert!(message.contains("at end"), "{message}");
    assert!(message.contains("expect ')' after expression"), "{message}");
}

#[test]
fn unexpected_character_is_the_first_error_reported() {
    let source = include_str!("../fixtures/error_unexpected_character.lox");
    let errors = compile_errors(source);
    assert_eq!(errors.len(), 1, "panic mode keeps only the first error: {errors:?}");
    assert_eq!(errors[0].message(), "unexpected character");
    assert!(errors[0].to_string().contains("'@'"), "{}", errors[0]);
    assert_eq!(errors[0].position(), Position::new(1, 4));
}

#[rstest]
#[case("1 +", "expect expression")]
#[case(")", "expect expression")]
#[case("(1) (2)", "expect end of expression")]
#[case("* 3", "expect expression")]
#[case("1 + foo", "expect expression")]
fn parse_error_message(#[case] source: &str, #[case] expected: &str) {
    let errors = compile_errors(source);
    assert_eq!(errors[0].message(), expected, "for source {source:?}");
}

#[test]
fn error_on_later_line_reports_that_line() {
    let errors = compile_errors("1 +\n2 *\n)");
    assert_eq!(errors[0].position().line, 3);
    assert!(errors[0].to_string().starts_with("[line 3:0]"), "{}", errors[0]);
}

#[test]
fn failed_compile_is_never_executed() {
    let err = interpret("(1 + 2").unwrap_err();
    assert!(matches!(&err, InterpretError::Compile(errors) if errors.len() == 1));
    assert_eq!(err.exit_code(), 65);
}

#[test]
fn diagnostics_render_against_source() {
    let source = "1 + )";
    let errors = compile_errors(source);
    let rendered = errors
        .into_iter()
        .next()
        .expect("one error")
        .with_source_code("input.lox", source)
        .render();
    assert!(rendered.contains("input.lox"), "{rendered}");
    assert!(rendered.contains("lox::parse"), "{rendered}");
}

#[test]
fn deeply_nested_input_is_a_compile_error() {
    let depth = 200_000;
    let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
    let errors = compile_errors(&source);
    assert_eq!(errors.len(), 1, "expected 1 error but got {errors:?}");
    assert_eq!(errors[0].message(), "expression nested too deeply");
}
