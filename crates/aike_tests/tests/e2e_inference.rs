//! End-to-end inference scenarios: literals through let-polymorphism and
//! monomorphised instance emission.

use aike_tests::{check, compile_to_tir, expect_error};
use pretty_assertions::assert_eq;

#[test]
fn increment_program_types_to_int() {
    let ty = check("let f(x) = x + 1\nf(41)\n").unwrap();
    assert_eq!(ty, "int");
}

#[test]
fn increment_program_emits_one_instance() {
    let (program, _, _) = compile_to_tir("let f(x) = x + 1\nf(41)\n").unwrap();
    let fs: Vec<&str> = program
        .instances
        .iter()
        .filter(|i| i.symbol.starts_with("f.."))
        .map(|i| i.symbol.as_str())
        .collect();
    assert_eq!(fs, vec!["f..F1ii"]);
}

#[test]
fn pair_generalises_over_two_variables() {
    let source = "\
let pair(a, b) = (a, b)
let p = pair(1, true)
let q = pair(false, 2)
q
";
    let ty = check(source).unwrap();
    assert_eq!(ty, "(bool, int)");

    let (program, _, _) = compile_to_tir(source).unwrap();
    let mut pairs: Vec<&str> = program
        .instances
        .iter()
        .filter(|i| i.symbol.starts_with("pair.."))
        .map(|i| i.symbol.as_str())
        .collect();
    pairs.sort_unstable();

    // One instance per distinct substitution, byte-stable mangles.
    assert_eq!(pairs, vec!["pair..F2biT2bi", "pair..F2ibT2ib"]);
}

#[test]
fn same_substitution_hits_the_instance_cache() {
    let source = "\
let pair(a, b) = (a, b)
let p = pair(1, true)
let q = pair(2, false)
q
";
    let (program, _, _) = compile_to_tir(source).unwrap();
    let count =
        program.instances.iter().filter(|i| i.symbol.starts_with("pair..")).count();
    assert_eq!(count, 1);
}

#[test]
fn identity_is_polymorphic_across_uses() {
    let source = "\
let id(x) = x
let a = id(1)
let b = id(true)
(a, b)
";
    assert_eq!(check(source).unwrap(), "(int, bool)");
}

#[test]
fn annotated_return_type_is_enforced() {
    let err = expect_error("let f(x): bool = x + 1\nf(1)\n");
    assert!(err.message.contains("Type mismatch"));
    assert!(err.message.contains("bool"));
    assert!(err.message.contains("int"));
}

#[test]
fn mismatched_let_annotation_reports_both_types() {
    let err = expect_error("let x: int = true\nx\n");
    assert!(err.message.contains("Type mismatch"));
    assert!(err.message.contains("Expecting a\n    int"));
    assert!(err.message.contains("but given a\n    bool"));
}

#[test]
fn occurs_check_rejects_self_application() {
    let err = expect_error("let f(x) = x(x)\nf\n");
    assert!(err.message.contains("Type mismatch"));
}

#[test]
fn call_arity_is_checked() {
    let err = expect_error("let f(x) = x + 1\nf(1, 2)\n");
    assert_eq!(err.message, "Expected 1 arguments but given 2");
}

#[test]
fn calling_a_non_function_is_rejected() {
    let err = expect_error("let x = 1\nx(2)\n");
    assert_eq!(err.message, "Cannot call a value of type int");
}

#[test]
fn while_and_assignment_type_to_unit_and_int() {
    let source = "\
let x = 0
while x < 3 do x := x + 1
x
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn assignment_requires_a_place() {
    let err = expect_error("let f(x) = x\nf := 1\n");
    assert!(err.message.contains("left side of ':='"));
}

#[test]
fn block_interior_expressions_must_be_unit() {
    let err = expect_error("let f(x) = x + 1\nf(1)\nf(2)\n");
    assert!(err.message.contains("Type mismatch"));
    assert!(err.message.contains("unit"));
}

#[test]
fn tuple_destructuring_binds_both_names() {
    let source = "\
let (a, b) = (1, true)
(b, a)
";
    assert_eq!(check(source).unwrap(), "(bool, int)");
}

#[test]
fn for_loops_type_to_unit() {
    let source = "\
extern print(x: int): unit
for v in [1, 2, 3] do print(v)
for i in 0..9 do print(i)
";
    assert_eq!(check(source).unwrap(), "unit");
}

#[test]
fn uniform_call_types_like_a_plain_call() {
    let source = "\
let double(x) = x * 2
3#double()
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn named_arguments_are_rewritten_to_positional() {
    let source = "\
let sub(a, b) = a - b
sub(b = 1, a = 10)
";
    assert_eq!(check(source).unwrap(), "int");

    let (program, _, _) = compile_to_tir(source).unwrap();
    assert!(program.instances.iter().any(|i| i.symbol == "sub..F2iii"));
}

#[test]
fn string_literals_are_char_arrays() {
    assert_eq!(check("\"hi\"\n").unwrap(), "char[]");
}

#[test]
fn slices_preserve_the_array_type() {
    assert_eq!(check("let a = [1, 2, 3]\na[1..]\n").unwrap(), "int[]");
    assert_eq!(check("let a = [1, 2, 3]\na[0]\n").unwrap(), "int");
}
