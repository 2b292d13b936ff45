//! Front-end pipeline tests: lexing through type checking, observed
//! through the typed-AST dump and the resolved structures.

use aike_base::{Arena, Interner, Result, SourceFile};
use aike_kernel::{type_name, PrettyContext, TypeStore};
use aike_language::arena_ctx::{ExprArenas, SynArenas};
use aike_language::expr::{Binding, Expr, ExprKind};
use aike_language::{dump_to_string, parse, resolve, tokenize, typecheck};
use pretty_assertions::assert_eq;

macro_rules! with_checked {
    ($text:expr, |$root:ident, $store:ident, $interner:ident| $body:block) => {{
        let source = SourceFile::new("test.aike", $text);
        let mut $interner = Interner::new();
        let mut $store = TypeStore::new();

        let stream = tokenize(&source, &mut $interner)?;

        let syn_exprs = Arena::new();
        let syn_expr_refs = Arena::new();
        let syn_types = Arena::new();
        let syn_type_refs = Arena::new();
        let syn_pats = Arena::new();
        let syn_pat_refs = Arena::new();
        let syn_vars = Arena::new();
        let syn_idents = Arena::new();
        let syn_variants = Arena::new();
        let syn_arms = Arena::new();
        let syn_arenas = SynArenas::new(
            &syn_exprs,
            &syn_expr_refs,
            &syn_types,
            &syn_type_refs,
            &syn_pats,
            &syn_pat_refs,
            &syn_vars,
            &syn_idents,
            &syn_variants,
            &syn_arms,
        );
        let syn = parse(&stream, syn_arenas, &mut $interner)?;

        let exprs = Arena::new();
        let expr_refs = Arena::new();
        let cases = Arena::new();
        let case_refs = Arena::new();
        let targets = Arena::new();
        let target_refs = Arena::new();
        let target_opts = Arena::new();
        let target_lists = Arena::new();
        let functions = Arena::new();
        let symbols = Arena::new();
        let captures = Arena::new();
        let expr_arenas = ExprArenas::new(
            &exprs,
            &expr_refs,
            &cases,
            &case_refs,
            &targets,
            &target_refs,
            &target_opts,
            &target_lists,
            &functions,
            &symbols,
            &captures,
        );

        let $root = resolve(syn, expr_arenas, &mut $store, &mut $interner)?;
        typecheck($root, expr_arenas, &mut $store, &$interner)?;

        $body
    }};
}

fn unit_type(text: &str) -> Result<String> {
    with_checked!(text, |root, store, interner| {
        let mut ctx = PrettyContext::new();
        Ok(type_name(&store, &interner, &mut ctx, root.ty.get()))
    })
}

/// Finds the first function definition with the given name.
fn find_function<'a>(root: &'a Expr<'a>, name: &str, interner: &Interner) -> Option<&'a Expr<'a>> {
    fn search<'a>(
        node: &'a Expr<'a>,
        name: &str,
        interner: &Interner,
    ) -> Option<&'a Expr<'a>> {
        if let ExprKind::LetFunc { target, .. } = &node.kind {
            if interner.resolve(target.name) == name {
                return Some(node);
            }
        }
        match &node.kind {
            ExprKind::Block(exprs) => {
                exprs.iter().find_map(|e| search(e, name, interner))
            }
            ExprKind::LetFunc { body, .. } => search(body, name, interner),
            _ => None,
        }
    }
    search(root, name, interner)
}

#[test]
fn block_takes_the_type_of_its_last_expression() -> Result<()> {
    assert_eq!(unit_type("let a = 1\nlet b = true\n(a, b)\n")?, "(int, bool)");
    Ok(())
}

#[test]
fn generalised_function_displays_with_stable_variables() -> Result<()> {
    with_checked!("let pair(a, b) = (a, b)\npair\n", |root, store, interner| {
        let pair = find_function(root, "pair", &interner).expect("pair defined");
        let mut ctx = PrettyContext::new();
        let ty = type_name(&store, &interner, &mut ctx, pair.ty.get());
        assert_eq!(ty, "('a, 'b) -> ('a, 'b)");
        Ok(())
    })
}

#[test]
fn externals_hold_exactly_the_free_locals_in_first_use_order() -> Result<()> {
    let source = "\
let outer(x, y) =
  let inner(z) = y + x + z
  inner(x)
outer(1, 2)
";
    with_checked!(source, |root, _store, interner| {
        let inner = find_function(root, "inner", &interner).expect("inner defined");
        let ExprKind::LetFunc { context, captures, .. } = &inner.kind else {
            panic!("expected a function");
        };

        assert!(context.is_some());
        let names: Vec<&str> = captures
            .iter()
            .map(|c| interner.resolve(c.binding.target().name))
            .collect();
        assert_eq!(names, vec!["y", "x"]);

        Ok(())
    })
}

#[test]
fn function_without_free_variables_has_no_context() -> Result<()> {
    let source = "\
let outer(x) =
  let inner(z) = z * 2
  inner(x)
outer(1)
";
    with_checked!(source, |root, _store, interner| {
        let inner = find_function(root, "inner", &interner).expect("inner defined");
        let ExprKind::LetFunc { context, captures, .. } = &inner.kind else {
            panic!("expected a function");
        };
        assert!(context.is_none());
        assert!(captures.is_empty());
        Ok(())
    })
}

#[test]
fn zero_argument_constructor_use_is_a_nullary_call() -> Result<()> {
    let source = "\
type Color = Red | Green
let c = Red
c
";
    with_checked!(source, |root, _store, _interner| {
        fn find_let_body<'a>(node: &'a Expr<'a>) -> Option<&'a Expr<'a>> {
            match &node.kind {
                ExprKind::Block(exprs) => exprs.iter().find_map(|e| find_let_body(e)),
                ExprKind::LetVar { body, .. } => Some(body),
                _ => None,
            }
        }

        let body = find_let_body(root).expect("let c binds a body");
        match &body.kind {
            ExprKind::Call { callee, args } => {
                assert!(args.is_empty());
                assert!(matches!(callee.kind, ExprKind::Binding(Binding::UnitConstructor(_))));
            }
            other => panic!("expected a nullary constructor call, got {other:?}"),
        }

        Ok(())
    })
}

#[test]
fn dump_renders_an_indented_typed_outline() -> Result<()> {
    with_checked!("let f(x) = x + 1\nf(41)\n", |root, store, interner| {
        let dump = dump_to_string(root, &store, &interner);

        assert!(dump.starts_with("block: int\n"));
        assert!(dump.contains("  letfunc f: (int) -> int\n"));
        assert!(dump.contains("    arg x: int\n"));
        assert!(dump.contains("binary add: int\n"));
        assert!(dump.contains("int 41: int\n"));
        Ok(())
    })
}

#[test]
fn match_dump_shows_cases_and_bindings() -> Result<()> {
    let source = "\
type Option<'a> = None | Some 'a
let x = Some(1)
match x with | Some(v) -> v | None -> 0
";
    with_checked!(source, |root, store, interner| {
        let dump = dump_to_string(root, &store, &interner);
        assert!(dump.contains("match: int\n"));
        assert!(dump.contains("case union [tag 1]"));
        assert!(dump.contains("case bind v"));
        Ok(())
    })
}
