//! End-to-end closure scenarios: capture discovery, context layouts and
//! closure-of-closure conversion.

use aike_compile::{InstanceBody, Tir};
use aike_tests::{check, compile_to_tir, dump_checked};
use pretty_assertions::assert_eq;

#[test]
fn returned_closure_captures_its_free_variable() {
    let source = "\
let outer(x) =
  let inner(y) = x + y
  inner
outer(3)(4)
";
    assert_eq!(check(source).unwrap(), "int");
}

#[test]
fn inner_context_has_exactly_one_int_field() {
    let source = "\
let outer(x) =
  let inner(y) = x + y
  inner
outer(3)(4)
";
    let (program, store, interner) = compile_to_tir(source).unwrap();

    let inner = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with("inner.."))
        .expect("inner instance emitted");

    let layout = inner.context.as_ref().expect("inner captures, so it has a context");
    assert_eq!(layout.fields.len(), 1);
    assert_eq!(interner.resolve(layout.fields[0].name), "x");
    assert_eq!(store.final_type(layout.fields[0].ty), store.int());
}

#[test]
fn capture_list_appears_in_the_dump() {
    let source = "\
let outer(x) =
  let inner(y) = x + y
  inner
outer(3)(4)
";
    let dump = dump_checked(source).unwrap();
    assert!(dump.contains("letfunc inner"));
    assert!(dump.contains("captures x"));
}

#[test]
fn externals_are_recorded_in_first_use_order() {
    let source = "\
let h(a, b) =
  let k(t) = b + a + t
  k(a)
h(1, 2)
";
    let (program, _, interner) = compile_to_tir(source).unwrap();

    let k = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with("k.."))
        .expect("k instance emitted");

    let layout = k.context.as_ref().expect("k captures a and b");
    let names: Vec<&str> =
        layout.fields.iter().map(|f| interner.resolve(f.name)).collect();
    assert_eq!(names, vec!["b", "a"]);
}

#[test]
fn closure_capturing_a_closure_stores_its_context() {
    let source = "\
let a(x) =
  let f(y) = x + y
  let g(z) = f(z)
  g
a(1)(2)
";
    assert_eq!(check(source).unwrap(), "int");

    let (program, store, interner) = compile_to_tir(source).unwrap();

    let g = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with("g.."))
        .expect("g instance emitted");

    let layout = g.context.as_ref().expect("g captures f");
    assert_eq!(layout.fields.len(), 1);
    assert_eq!(interner.resolve(layout.fields[0].name), "f.context");

    // The captured field is f's context record, not its code.
    assert!(matches!(
        store.get(store.final_type(layout.fields[0].ty)),
        aike_kernel::Type::ClosureContext { .. }
    ));
}

#[test]
fn sibling_contexts_are_allocated_before_either_is_filled() {
    // Mutually recursive nested functions: both contexts must exist
    // before either capture list is stored.
    let source = "\
let driver(x) =
  let even(n): bool = if n == 0 then true else odd(n - 1)
  let odd(n): bool = if n == 0 then false else even(n - 1)
  even(x)
driver(4)
";
    assert_eq!(check(source).unwrap(), "bool");

    let (program, _, _) = compile_to_tir(source).unwrap();
    let driver = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with("driver.."))
        .expect("driver instance emitted");

    let body = match &driver.body {
        InstanceBody::Defined(body) => body,
        InstanceBody::Extern => panic!("driver must have a body"),
    };

    // Context allocations precede every context-field store.
    fn scan(tir: &Tir, allocs: &mut usize, stores_after_alloc: &mut bool) {
        match tir {
            Tir::AllocContext { .. } => *allocs += 1,
            Tir::StoreContextField { .. } => {
                if *allocs < 2 {
                    *stores_after_alloc = false;
                }
            }
            Tir::Seq(items) => {
                for item in items {
                    scan(item, allocs, stores_after_alloc);
                }
            }
            _ => {}
        }
    }

    let mut allocs = 0;
    let mut ordered = true;
    scan(body, &mut allocs, &mut ordered);
    assert_eq!(allocs, 2);
    assert!(ordered, "a context field was stored before both contexts existed");
}

#[test]
fn anonymous_function_is_a_first_class_value() {
    let source = "\
let apply(f: (int) -> int, x: int): int = f(x)
apply(fun y -> y * 2, 21)
";
    assert_eq!(check(source).unwrap(), "int");

    let (program, _, _) = compile_to_tir(source).unwrap();
    assert!(program.instances.iter().any(|i| i.symbol.starts_with("..")));
}

#[test]
fn anonymous_closure_captures_locals() {
    let source = "\
let make(x) = fun y -> x + y
make(1)(2)
";
    assert_eq!(check(source).unwrap(), "int");

    let (program, _, interner) = compile_to_tir(source).unwrap();
    let anon = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with(".."))
        .expect("anonymous instance emitted");

    let layout = anon.context.as_ref().expect("the lambda captures x");
    let names: Vec<&str> =
        layout.fields.iter().map(|f| interner.resolve(f.name)).collect();
    assert_eq!(names, vec!["x"]);
}

#[test]
fn two_level_capture_routes_through_the_middle_context() {
    let source = "\
let top(x) =
  let middle(y) =
    let bottom(z) = x + y + z
    bottom(3)
  middle(2)
top(1)
";
    assert_eq!(check(source).unwrap(), "int");

    let (program, _, interner) = compile_to_tir(source).unwrap();

    // bottom captures x (from two levels up) and y; middle therefore
    // captures x as well, to be able to fill bottom's context.
    let bottom = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with("bottom.."))
        .expect("bottom instance emitted");
    let bottom_names: Vec<&str> = bottom
        .context
        .as_ref()
        .expect("bottom captures")
        .fields
        .iter()
        .map(|f| interner.resolve(f.name))
        .collect();
    assert_eq!(bottom_names, vec!["x", "y"]);

    let middle = program
        .instances
        .iter()
        .find(|i| i.symbol.starts_with("middle.."))
        .expect("middle instance emitted");
    let middle_names: Vec<&str> = middle
        .context
        .as_ref()
        .expect("middle captures x for bottom")
        .fields
        .iter()
        .map(|f| interner.resolve(f.name))
        .collect();
    assert!(middle_names.contains(&"x"));
}
