//! End-to-end match scenarios: inference through exhaustiveness analysis
//! and decision-tree lowering.

use aike_compile::{Decision, InstanceBody, InstanceId, Test, Tir};
use aike_tests::{check, compile_to_tir, expect_error};
use pretty_assertions::assert_eq;

#[test]
fn option_match_is_exhaustive_and_types_to_int() {
    let source = "\
type Option<'a> = None | Some 'a
let x = Some(1)
match x with | Some(v) -> v | None -> 0
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn missing_variant_is_rejected_at_the_match_keyword() {
    let source = "\
type Option<'a> = None | Some 'a
let x = Some(1)
match x with | Some(v) -> v
";
    let err = expect_error(source);
    assert_eq!(err.message, "The match doesn't cover all cases");
    assert_eq!(err.location.line, 2);
    assert_eq!(err.location.column, 0);
}

#[test]
fn covered_arm_is_rejected() {
    let err = expect_error("match 1 with | _ -> 0 | 1 -> 2\n");
    assert_eq!(err.message, "This case is already covered");
}

#[test]
fn duplicate_literal_arm_is_rejected() {
    let err = expect_error("match 1 with | 1 -> 0 | 1 -> 2 | _ -> 3\n");
    assert_eq!(err.message, "This case is already covered");
}

#[test]
fn guarded_arms_do_not_count_toward_exhaustiveness() {
    let err = expect_error("match 1 with | n if n > 0 -> 1\n");
    assert_eq!(err.message, "The match doesn't cover all cases");
}

#[test]
fn guarded_arm_with_wildcard_fallback_is_accepted() {
    let source = "match 1 with | n if n > 0 -> 1 | _ -> 0\n";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn wildcard_covers_integers() {
    assert_eq!(check("match 7 with | 1 -> 10 | _ -> 0\n").unwrap(), "int");
}

#[test]
fn boolean_literals_cover_booleans() {
    assert_eq!(check("match true with | true -> 1 | false -> 0\n").unwrap(), "int");
}

#[test]
fn alternation_shares_placeholders() {
    let source = "\
type Either = Left int | Right int
let e = Left(3)
match e with | Left(v) | Right(v) -> v
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn alternation_with_different_placeholders_is_rejected() {
    let source = "\
type Either = Left int | Right int
let e = Left(3)
match e with | Left(a) | Right(b) -> 0
";
    let err = expect_error(source);
    assert_eq!(err.message, "Different patterns must use the same placeholders");
}

#[test]
fn value_pattern_checks_equality_of_repeated_names() {
    let source = "\
match (1, 2) with | (x, x) -> x | (a, b) -> a + b
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn tuple_patterns_refine_scrutinee_types() {
    let source = "\
match (1, true) with | (n, true) -> n | (n, false) -> 0 - n | _ -> 0
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn unit_valued_pattern_is_a_parse_error() {
    let err = expect_error("match 1 with | () -> 0\n");
    assert_eq!(err.message, "unit cannot be matched");
}

/// Walks a lowered expression tree, visiting every node.
fn walk(tir: &Tir, f: &mut dyn FnMut(&Tir)) {
    f(tir);
    match tir {
        Tir::Unit
        | Tir::Int(_)
        | Tir::Char(_)
        | Tir::Bool(_)
        | Tir::ReadLocal(_)
        | Tir::ReadCaptured { .. }
        | Tir::Function { .. }
        | Tir::AllocContext { .. } => {}
        Tir::Array { elements, .. } | Tir::Tuple { elements, .. } => {
            for e in elements {
                walk(e, f);
            }
        }
        Tir::Call { callee, args } => {
            walk(callee, f);
            for a in args {
                walk(a, f);
            }
        }
        Tir::Unary { operand, .. } => walk(operand, f),
        Tir::Binary { left, right, .. } => {
            walk(left, f);
            walk(right, f);
        }
        Tir::Index { array, index } => {
            walk(array, f);
            walk(index, f);
        }
        Tir::Slice { array, start, end } => {
            walk(array, f);
            walk(start, f);
            if let Some(end) = end {
                walk(end, f);
            }
        }
        Tir::GetField { value, .. } => walk(value, f),
        Tir::MakeRecord { fields, .. } => {
            for field in fields {
                walk(field, f);
            }
        }
        Tir::MakeUnion { payload, .. } => {
            if let Some(payload) = payload {
                walk(payload, f);
            }
        }
        Tir::StoreContextField { context, value, .. } => {
            walk(context, f);
            walk(value, f);
        }
        Tir::SetLocal { value, .. } => walk(value, f),
        Tir::Assign { place, value } => {
            walk(place, f);
            walk(value, f);
        }
        Tir::Seq(items) => {
            for item in items {
                walk(item, f);
            }
        }
        Tir::If { cond, then_body, else_body } => {
            walk(cond, f);
            walk(then_body, f);
            walk(else_body, f);
        }
        Tir::ForIn { array, body, .. } => {
            walk(array, f);
            walk(body, f);
        }
        Tir::ForRange { start, end, body, .. } => {
            walk(start, f);
            walk(end, f);
            walk(body, f);
        }
        Tir::While { cond, body } => {
            walk(cond, f);
            walk(body, f);
        }
        Tir::Match { scrutinee, arms, .. } => {
            walk(scrutinee, f);
            for arm in arms {
                walk(&arm.body, f);
            }
        }
    }
}

fn decision_trees(tir: &Tir) -> Vec<Decision> {
    let mut trees = Vec::new();
    walk(tir, &mut |node| {
        if let Tir::Match { arms, .. } = node {
            trees.extend(arms.iter().map(|arm| arm.pattern.clone()));
        }
    });
    trees
}

#[test]
fn recursive_length_lowers_to_one_length_test_and_one_recursive_call() {
    let source = "\
let len(xs: int[]): int = match xs with | [] -> 0 | _ -> 1 + len(xs[1..])
len([1, 2, 3])
";
    let (program, _, _) = compile_to_tir(source).unwrap();

    let (len_index, len_instance) = program
        .instances
        .iter()
        .enumerate()
        .find(|(_, i)| i.symbol.starts_with("len.."))
        .expect("len instance emitted");

    let body = match &len_instance.body {
        InstanceBody::Defined(body) => body,
        InstanceBody::Extern => panic!("len must have a body"),
    };

    let length_tests: usize = decision_trees(body)
        .iter()
        .map(|tree| tree.count_tests(&|t| matches!(t, Test::ArrayLength(_))))
        .sum();
    assert_eq!(length_tests, 1);

    let mut recursive_calls = 0;
    walk(body, &mut |node| {
        if let Tir::Call { callee, .. } = node {
            if let Tir::Function { instance, .. } = callee.as_ref() {
                if *instance == InstanceId(len_index as u32) {
                    recursive_calls += 1;
                }
            }
        }
    });
    assert_eq!(recursive_calls, 1);
}

#[test]
fn union_match_lowers_to_tag_tests() {
    let source = "\
type Option<'a> = None | Some 'a
let x = Some(1)
match x with | Some(v) -> v | None -> 0
";
    let (program, _, _) = compile_to_tir(source).unwrap();
    let entry = program.instance(program.entry);

    let body = match &entry.body {
        InstanceBody::Defined(body) => body,
        InstanceBody::Extern => panic!("entry must have a body"),
    };

    let tag_tests: usize = decision_trees(body)
        .iter()
        .map(|tree| tree.count_tests(&|t| matches!(t, Test::UnionTag(_))))
        .sum();
    assert_eq!(tag_tests, 2);
}

#[test]
fn record_pattern_with_named_members_resolves_positions() {
    let source = "\
type Shape = Circle { r: int } | Square { s: int }
let x = Circle(3)
match x with | Circle(r = v) -> v | Square(s = v) -> v
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn record_pattern_with_unknown_member_is_rejected() {
    let source = "\
type Shape = Circle { r: int } | Square { s: int }
let x = Circle(3)
match x with | Circle(z = v) -> v | _ -> 0
";
    let err = expect_error(source);
    assert!(err.message.contains("doesn't have a member named 'z'"));
}

#[test]
fn omitted_record_members_become_wildcards() {
    let source = "\
type Point = P { x: int; y: int }
let p = P(1, 2)
match p with | P(x = v) -> v
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn char_and_string_patterns() {
    let source = "\
let c = 'x'
match c with | 'x' -> 1 | _ -> 0
";
    assert_eq!(check(source).unwrap(), "int");

    let source = "\
match \"hi\" with | \"hi\" -> 1 | _ -> 0
";
    assert_eq!(check(source).unwrap(), "int");
}
