//! The literal error scenarios (spec.md §8 "Error scenarios"), run through
//! the published [`dojo_compiler::compile`] entry point only.

use dojo_compiler::CompileError;

#[test]
fn unexpected_closing_paren_on_its_own_line_names_line_and_column() {
    let err = dojo_compiler::compile("2+2\n2+3\n  )", None).unwrap_err();
    match err {
        CompileError::UnexpectedToken { line, column, .. } => assert_eq!((line, column), (3, 3)),
        other => panic!("expected UnexpectedToken, got {other:?}"),
    }
}

#[test]
fn unrecognized_character_is_invalid_syntax_at_line_1_column_1() {
    let err = dojo_compiler::compile("$", None).unwrap_err();
    match err {
        CompileError::InvalidSyntax { line, column, .. } => assert_eq!((line, column), (1, 1)),
        other => panic!("expected InvalidSyntax, got {other:?}"),
    }
}

#[test]
fn missing_comma_between_call_arguments_is_unexpected_token() {
    let err = dojo_compiler::compile("2*add(2+2 3+3)", None).unwrap_err();
    assert!(matches!(err, CompileError::UnexpectedToken { .. }));
}

#[test]
fn invalid_syntax_snippet_is_truncated_to_25_chars() {
    let long_garbage = "$".to_string() + &"x".repeat(40);
    let err = dojo_compiler::compile(&long_garbage, None).unwrap_err();
    match err {
        CompileError::InvalidSyntax { snippet, .. } => assert_eq!(snippet.chars().count(), 25),
        other => panic!("expected InvalidSyntax, got {other:?}"),
    }
}

#[test]
fn unexpected_token_names_the_full_expected_set() {
    // A bare assignment target is missing on the right-hand side entirely.
    let err = dojo_compiler::compile("a = )", None).unwrap_err();
    match err {
        CompileError::UnexpectedToken { found, expected, .. } => {
            assert_eq!(found, ")");
            assert!(!expected.is_empty());
        }
        other => panic!("expected UnexpectedToken, got {other:?}"),
    }
}

#[test]
fn compilation_aborts_on_the_first_error_with_no_recovery() {
    // Two unrelated errors in sequence: only the first is ever reported.
    let err = dojo_compiler::compile("$\n%", None).unwrap_err();
    match err {
        CompileError::InvalidSyntax { line, .. } => assert_eq!(line, 1),
        other => panic!("expected InvalidSyntax, got {other:?}"),
    }
}
