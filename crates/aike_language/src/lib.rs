//! aike language front-end: lexing, parsing, resolution, type checking
//! and match analysis.
//!
//! The pipeline runs leaves-first; each phase consumes the previous one's
//! output and the first error aborts the unit:
//!
//! | Phase | Entry point | Output |
//! |-------|-------------|--------|
//! | Lexer | [`tokenize`] | token stream + line index |
//! | Parser | [`parse`] | untyped [`ast::SynAst`] |
//! | Resolver | [`resolve`] | typed [`expr::Expr`] skeleton |
//! | Type checker | [`typecheck`] | finalised types + match analysis |
//!
//! The type graph itself lives in [`aike_kernel`]; this crate owns the
//! syntax and the environments. AST nodes are bump-allocated through the
//! arena contexts in [`arena_ctx`] and live until the caller drops the
//! arenas.
//!
//! ```
//! use aike_base::{Arena, Interner, SourceFile};
//! use aike_kernel::TypeStore;
//! use aike_language::{arena_ctx, parse, resolve, tokenize, typecheck};
//!
//! let source = SourceFile::new("demo.aike", "let f(x) = x + 1\nf(41)\n");
//! let mut interner = Interner::new();
//! let mut store = TypeStore::new();
//!
//! let stream = tokenize(&source, &mut interner).unwrap();
//!
//! let syn_exprs = Arena::new();
//! let syn_expr_refs = Arena::new();
//! let syn_types = Arena::new();
//! let syn_type_refs = Arena::new();
//! let syn_pats = Arena::new();
//! let syn_pat_refs = Arena::new();
//! let syn_vars = Arena::new();
//! let syn_idents = Arena::new();
//! let syn_variants = Arena::new();
//! let syn_arms = Arena::new();
//! let syn_arenas = arena_ctx::SynArenas::new(
//!     &syn_exprs, &syn_expr_refs, &syn_types, &syn_type_refs, &syn_pats,
//!     &syn_pat_refs, &syn_vars, &syn_idents, &syn_variants, &syn_arms,
//! );
//! let syn = parse(&stream, syn_arenas, &mut interner).unwrap();
//!
//! let exprs = Arena::new();
//! let expr_refs = Arena::new();
//! let cases = Arena::new();
//! let case_refs = Arena::new();
//! let targets = Arena::new();
//! let target_refs = Arena::new();
//! let target_opts = Arena::new();
//! let target_lists = Arena::new();
//! let functions = Arena::new();
//! let symbols = Arena::new();
//! let captures = Arena::new();
//! let expr_arenas = arena_ctx::ExprArenas::new(
//!     &exprs, &expr_refs, &cases, &case_refs, &targets, &target_refs,
//!     &target_opts, &target_lists, &functions, &symbols, &captures,
//! );
//! let typed = resolve(syn, expr_arenas, &mut store, &mut interner).unwrap();
//!
//! let ty = typecheck(typed, expr_arenas, &mut store, &interner).unwrap();
//! assert_eq!(store.final_type(ty), store.int());
//! ```

pub mod arena_ctx;
pub mod ast;
pub mod dump;
pub mod expr;
pub mod lexer;
pub mod matching;
pub mod parser;
pub mod resolve;
pub mod token;
pub mod typecheck;

pub use dump::{dump, dump_to_string};
pub use lexer::tokenize;
pub use parser::parse;
pub use resolve::resolve;
pub use typecheck::typecheck;
