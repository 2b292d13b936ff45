//! End-to-end scenarios for user-defined types: records, unions, generic
//! instantiation and constructor lowering.

use aike_compile::{InstanceBody, Tir};
use aike_tests::{check, compile_to_tir, expect_error};
use pretty_assertions::assert_eq;

#[test]
fn record_definition_and_member_access() {
    let source = "\
type Point = { x: int; y: int }
let p = Point(1, 2)
p.x + p.y
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn record_constructor_accepts_named_arguments() {
    let source = "\
type Point = { x: int; y: int }
let p = Point(y = 2, x = 1)
p.x
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn unknown_member_is_rejected() {
    let source = "\
type Point = { x: int; y: int }
let p = Point(1, 2)
p.z
";
    let err = expect_error(source);
    assert!(err.message.contains("doesn't have a member named 'z'"));
}

#[test]
fn member_access_on_non_record_is_rejected() {
    let err = expect_error("let t = 1\nt.x\n");
    assert_eq!(err.message, "Expected a record type");
}

#[test]
fn zero_argument_variant_is_a_value() {
    let source = "\
type Color = Red | Green
let c = Red
match c with | Red -> 1 | Green -> 2
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn duplicate_variant_name_is_rejected() {
    let err = expect_error("type Color = Red | Red\nRed\n");
    assert!(err.message.contains("already defined"));
}

#[test]
fn generic_union_instantiates_per_use() {
    let source = "\
type Option<'a> = None | Some 'a
let a = Some(1)
let b = Some(true)
(a, b)
";
    assert_eq!(check(source).unwrap(), "(Option<int>, Option<bool>)");

    let (program, _, _) = compile_to_tir(source).unwrap();
    let mut some_instances: Vec<&str> = program
        .instances
        .iter()
        .filter(|i| i.symbol.starts_with("Some.."))
        .map(|i| i.symbol.as_str())
        .collect();
    some_instances.sort_unstable();
    assert_eq!(some_instances, vec!["Some..F1bI1bN6Option", "Some..F1iI1iN6Option"]);
}

#[test]
fn recursive_union_closes_through_the_prototype() {
    let source = "\
type List = Nil | Cons (int, List)
let l = Cons(1, Cons(2, Nil))
match l with | Cons(h, t) -> h | Nil -> 0
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn mutually_recursive_types_resolve() {
    let source = "\
type Expr = Lit int | Branch Tree
type Tree = Leaf | Node (Expr, Expr)
let t = Node(Lit(1), Branch(Leaf))
match t with | Node(a, b) -> 1 | Leaf -> 0
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn tuple_payload_constructor_builds_a_tuple() {
    let source = "\
type List = Nil | Cons (int, List)
Cons(1, Nil)
";
    let (program, _, _) = compile_to_tir(source).unwrap();

    let cons = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with("Cons.."))
        .expect("Cons instance emitted");
    assert_eq!(cons.params.len(), 2);

    match &cons.body {
        InstanceBody::Defined(Tir::MakeUnion { tag, payload: Some(payload), .. }) => {
            assert_eq!(*tag, 1);
            assert!(matches!(payload.as_ref(), Tir::Tuple { .. }));
        }
        other => panic!("expected a union construction, got {other:?}"),
    }
}

#[test]
fn scalar_payload_constructor_is_a_scalar() {
    let source = "\
type Option<'a> = None | Some 'a
Some(7)
";
    let (program, _, _) = compile_to_tir(source).unwrap();

    let some = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with("Some.."))
        .expect("Some instance emitted");

    match &some.body {
        InstanceBody::Defined(Tir::MakeUnion { payload: Some(payload), .. }) => {
            assert!(matches!(payload.as_ref(), Tir::ReadLocal(_)));
        }
        other => panic!("expected a scalar union construction, got {other:?}"),
    }
}

#[test]
fn unit_variant_constructor_has_no_payload() {
    let source = "\
type Color = Red | Green
Red
";
    let (program, _, _) = compile_to_tir(source).unwrap();

    let red = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with("Red.."))
        .expect("Red instance emitted");

    match &red.body {
        InstanceBody::Defined(Tir::MakeUnion { tag: 0, payload: None, .. }) => {}
        other => panic!("expected a payload-free union construction, got {other:?}"),
    }
}

#[test]
fn record_payload_constructor_builds_a_record() {
    let source = "\
type Shape = Circle { r: int } | Square { s: int }
Circle(5)
";
    let (program, _, _) = compile_to_tir(source).unwrap();

    let circle = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with("Circle.."))
        .expect("Circle instance emitted");

    match &circle.body {
        InstanceBody::Defined(Tir::MakeUnion { payload: Some(payload), .. }) => {
            assert!(matches!(payload.as_ref(), Tir::MakeRecord { .. }));
        }
        other => panic!("expected a record union construction, got {other:?}"),
    }
}

#[test]
fn generic_record_substitutes_member_types() {
    let source = "\
type Box<'a> = { value: 'a }
let b = Box(true)
b.value
";
    assert_eq!(check(source).unwrap(), "bool");
}

#[test]
fn type_arity_is_checked() {
    let err = expect_error("type Box<'a> = { value: 'a }\nlet f(x: Box<int, bool>) = x\nf\n");
    assert!(err.message.contains("Expected 1 type arguments"));
}

#[test]
fn instantiating_a_non_generic_type_is_rejected() {
    let err = expect_error("let f(x: int<bool>) = x\nf\n");
    assert!(err.message.contains("Can't instantiate non-generic type"));
}

#[test]
fn type_definitions_are_block_scoped() {
    let source = "\
let f(x) =
  type Local = { v: int }
  let p = Local(x)
  p.v
f(1)
Local(2)
";
    let err = expect_error(source);
    assert!(err.message.contains("Unresolved variable reference Local"));
}
