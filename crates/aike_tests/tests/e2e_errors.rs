//! End-to-end error scenarios: every phase's failures carry the narrowest
//! location and render in the driver-facing diagnostic format.

use aike_tests::{expect_error, expect_error_rendered};
use pretty_assertions::assert_eq;

#[test]
fn unknown_character_renders_with_a_caret() {
    let rendered = expect_error_rendered("let y = ?\n");
    assert_eq!(rendered, "test.aike(1,9): Unknown character '?'\nlet y = ?\n        ^\n");
}

#[test]
fn tab_in_source_is_a_lexical_error() {
    let err = expect_error("let a = 1\n\tlet b = 2\n");
    assert!(err.message.contains("tabs"));
    assert_eq!(err.location.line, 1);
}

#[test]
fn mismatched_bracket_reports_the_opening_location() {
    let err = expect_error("let x = (1]\n");
    assert!(err.message.contains("Mismatched closing bracket"));
    assert!(err.message.contains("(1,9)"));
}

#[test]
fn offside_body_is_a_syntax_error() {
    let err = expect_error("let x =\n1\n");
    assert!(err.message.contains("offside"));
    assert!(err.message.contains("Indent this token further"));
}

#[test]
fn unresolved_identifier_is_reported_with_its_name() {
    let err = expect_error("missing\n");
    assert_eq!(err.message, "Unresolved variable reference missing");
    assert_eq!(err.location.line, 0);
    assert_eq!(err.location.column, 0);
}

#[test]
fn unknown_type_is_reported() {
    let err = expect_error("let f(x: Widget) = x\nf\n");
    assert_eq!(err.message, "Unknown type Widget");
}

#[test]
fn unknown_generic_outside_definitions_is_reported() {
    let err = expect_error("extern id(x: 'a): 'a\nid\n");
    assert_eq!(err.message, "Unknown type 'a");
}

#[test]
fn duplicate_generic_parameter_is_rejected() {
    let err = expect_error("type Pair<'a, 'a> = { fst: 'a }\nPair\n");
    assert_eq!(err.message, "Generic type 'a already exists");
}

#[test]
fn duplicate_name_in_let_tuple_is_rejected() {
    let err = expect_error("let (a, a) = (1, 2)\na\n");
    assert!(err.message.contains("already used in this let expression"));
}

#[test]
fn unknown_named_argument_is_rejected() {
    let err = expect_error("let f(x, y) = x + y\nf(z = 1, w = 2)\n");
    assert_eq!(err.message, "Function doesn't accept an argument named 'z'");
}

#[test]
fn duplicate_named_argument_is_rejected() {
    let err = expect_error("let f(x, y) = x + y\nf(x = 1, x = 2)\n");
    assert_eq!(err.message, "Value for argument 'x' is already defined");
}

#[test]
fn missing_named_argument_is_rejected() {
    let err = expect_error("let f(x, y) = x + y\nf(x = 1)\n");
    assert_eq!(err.message, "Value for argument 'y' is missing");
}

#[test]
fn named_arguments_on_a_value_are_rejected() {
    let err = expect_error("let f(x) = x\nlet g = f\ng(x = 1)\n");
    assert_eq!(err.message, "Cannot match argument names to a value");
}

#[test]
fn condition_must_be_boolean() {
    let err = expect_error("if 1 then 2 else 3\n");
    assert!(err.message.contains("Type mismatch"));
    assert!(err.message.contains("bool"));
}

#[test]
fn missing_else_forces_unit_then_branch() {
    let err = expect_error("if true then 1\n");
    assert!(err.message.contains("Type mismatch"));
    assert!(err.message.contains("unit"));
}

#[test]
fn branch_types_must_agree() {
    let err = expect_error("if true then 1 else false\n");
    assert!(err.message.contains("Expecting a\n    int"));
    assert!(err.message.contains("but given a\n    bool"));
}

#[test]
fn type_error_location_is_the_narrowest_subexpression() {
    // The error points at the boolean operand, not the whole addition.
    let err = expect_error("let x = 1 + true\nx\n");
    assert_eq!(err.location.line, 0);
    assert_eq!(err.location.column, 12);
    assert_eq!(err.location.length, 4);
}

#[test]
fn generic_names_in_diagnostics_are_stable() {
    // Two unrelated inferred variables print as 'a and 'b.
    let err = expect_error("let first(p) = match p with | (a, b) -> a\nfirst(1)\n");
    assert!(err.message.contains("Type mismatch"));
    assert!(err.message.contains("'a"));
}

#[test]
fn rendered_errors_are_one_based() {
    let rendered = expect_error_rendered("let ok = 1\nmissing\n");
    assert!(rendered.starts_with("test.aike(2,1): Unresolved variable reference missing\n"));
    assert!(rendered.contains("missing\n^"));
}
