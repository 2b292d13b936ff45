//! Test support for end-to-end pipeline scenarios.
//!
//! The pipeline's arena contexts borrow caller-owned arenas, so each
//! helper here declares the full set, runs the phases, and hands back only
//! owned results (the TIR program, the type store, pretty-printed types,
//! dumps, or the error). Integration tests in `tests/` build on these.

use aike_base::{Arena, CompileError, Interner, Result, SourceFile};
use aike_compile::{lower, TirProgram};
use aike_kernel::{type_name, PrettyContext, TypeStore};
use aike_language::arena_ctx::{ExprArenas, SynArenas};
use aike_language::{dump_to_string, parse, resolve, tokenize, typecheck};

macro_rules! with_pipeline {
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

/// Runs the full pipeline and returns the lowered program together with
/// the type store and interner (needed to interpret the TIR's types and
/// symbols).
pub fn compile_to_tir(text: &str) -> Result<(TirProgram, TypeStore, Interner)> {
    with_pipeline!(text, |root, store, interner| {
        let program = lower(root, &mut store, &interner)?;
        Ok((program, store, interner))
    })
}

/// Runs lexing through type checking and returns the unit's type,
/// pretty-printed.
pub fn check(text: &str) -> Result<String> {
    with_pipeline!(text, |root, store, interner| {
        let mut ctx = PrettyContext::new();
        Ok(type_name(&store, &interner, &mut ctx, root.ty.get()))
    })
}

/// Runs lexing through type checking and returns the typed-AST dump.
pub fn dump_checked(text: &str) -> Result<String> {
    with_pipeline!(text, |root, store, interner| {
        Ok(dump_to_string(root, &store, &interner))
    })
}

/// Runs the full pipeline on source expected to fail and returns the
/// error.
///
/// # Panics
///
/// Panics if the source compiles.
pub fn expect_error(text: &str) -> CompileError {
    match compile_to_tir(text) {
        Ok(_) => panic!("expected a compile error, but the unit compiled:\n{text}"),
        Err(err) => err,
    }
}

/// Like [`expect_error`], but returns the driver-facing rendering with the
/// offending line and caret span.
pub fn expect_error_rendered(text: &str) -> String {
    let source = SourceFile::new("test.aike", text);
    expect_error(text).render(&source)
}
