//! Arena contexts for AST allocation.
//!
//! Two bundles of typed arenas, one per tree layer: [`SynArenas`] for the
//! parser's syntax tree and [`ExprArenas`] for the resolver's typed AST.
//! All nodes of one compilation unit live until its arenas are dropped.
//!
//! The bundles hold references to arenas declared by the caller, so the
//! `'a` lifetime of every tree is the caller's scope:
//!
//! ```
//! use aike_base::Arena;
//! use aike_language::arena_ctx::SynArenas;
//!
//! let exprs = Arena::new();
//! let expr_refs = Arena::new();
//! let types = Arena::new();
//! let type_refs = Arena::new();
//! let pats = Arena::new();
//! let pat_refs = Arena::new();
//! let typed_vars = Arena::new();
//! let idents = Arena::new();
//! let variants = Arena::new();
//! let arms = Arena::new();
//! let arenas = SynArenas::new(
//!     &exprs, &expr_refs, &types, &type_refs, &pats, &pat_refs,
//!     &typed_vars, &idents, &variants, &arms,
//! );
//! # let _ = arenas;
//! ```

use crate::ast::{Ident, SynAst, SynMatchArm, SynPat, SynType, SynTypedVar, SynUnionVariant};
use crate::expr::{BindingTarget, Capture, Expr, FunctionBinding, MatchCase};
use aike_base::{Arena, Symbol};

/// Arenas for the untyped syntax tree.
#[derive(Clone, Copy)]
pub struct SynArenas<'a> {
    pub exprs: &'a Arena<SynAst<'a>>,
    pub expr_refs: &'a Arena<&'a SynAst<'a>>,
    pub types: &'a Arena<SynType<'a>>,
    pub type_refs: &'a Arena<&'a SynType<'a>>,
    pub pats: &'a Arena<SynPat<'a>>,
    pub pat_refs: &'a Arena<&'a SynPat<'a>>,
    pub typed_vars: &'a Arena<SynTypedVar<'a>>,
    pub idents: &'a Arena<Ident>,
    pub variants: &'a Arena<SynUnionVariant<'a>>,
    pub arms: &'a Arena<SynMatchArm<'a>>,
}

impl<'a> SynArenas<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exprs: &'a Arena<SynAst<'a>>,
        expr_refs: &'a Arena<&'a SynAst<'a>>,
        types: &'a Arena<SynType<'a>>,
        type_refs: &'a Arena<&'a SynType<'a>>,
        pats: &'a Arena<SynPat<'a>>,
        pat_refs: &'a Arena<&'a SynPat<'a>>,
        typed_vars: &'a Arena<SynTypedVar<'a>>,
        idents: &'a Arena<Ident>,
        variants: &'a Arena<SynUnionVariant<'a>>,
        arms: &'a Arena<SynMatchArm<'a>>,
    ) -> Self {
        SynArenas {
            exprs,
            expr_refs,
            types,
            type_refs,
            pats,
            pat_refs,
            typed_vars,
            idents,
            variants,
            arms,
        }
    }

    pub fn expr(&self, node: SynAst<'a>) -> &'a SynAst<'a> {
        self.exprs.alloc(node)
    }

    pub fn expr_list<I>(&self, items: I) -> &'a [&'a SynAst<'a>]
    where
        I: IntoIterator<Item = &'a SynAst<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.expr_refs.alloc_slice(items)
    }

    pub fn ty(&self, node: SynType<'a>) -> &'a SynType<'a> {
        self.types.alloc(node)
    }

    pub fn ty_list<I>(&self, items: I) -> &'a [&'a SynType<'a>]
    where
        I: IntoIterator<Item = &'a SynType<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.type_refs.alloc_slice(items)
    }

    pub fn pat(&self, node: SynPat<'a>) -> &'a SynPat<'a> {
        self.pats.alloc(node)
    }

    pub fn pat_list<I>(&self, items: I) -> &'a [&'a SynPat<'a>]
    where
        I: IntoIterator<Item = &'a SynPat<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.pat_refs.alloc_slice(items)
    }

    pub fn typed_var_list<I>(&self, items: I) -> &'a [SynTypedVar<'a>]
    where
        I: IntoIterator<Item = SynTypedVar<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.typed_vars.alloc_slice(items)
    }

    pub fn ident_list<I>(&self, items: I) -> &'a [Ident]
    where
        I: IntoIterator<Item = Ident>,
        I::IntoIter: ExactSizeIterator,
    {
        self.idents.alloc_slice(items)
    }

    pub fn variant_list<I>(&self, items: I) -> &'a [SynUnionVariant<'a>]
    where
        I: IntoIterator<Item = SynUnionVariant<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.variants.alloc_slice(items)
    }

    pub fn arm_list<I>(&self, items: I) -> &'a [SynMatchArm<'a>]
    where
        I: IntoIterator<Item = SynMatchArm<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.arms.alloc_slice(items)
    }
}

/// Arenas for the typed AST and its bindings.
#[derive(Clone, Copy)]
pub struct ExprArenas<'a> {
    pub exprs: &'a Arena<Expr<'a>>,
    pub expr_refs: &'a Arena<&'a Expr<'a>>,
    pub cases: &'a Arena<MatchCase<'a>>,
    pub case_refs: &'a Arena<&'a MatchCase<'a>>,
    pub targets: &'a Arena<BindingTarget>,
    pub target_refs: &'a Arena<&'a BindingTarget>,
    pub target_opts: &'a Arena<Option<&'a BindingTarget>>,
    pub target_lists: &'a Arena<&'a [&'a BindingTarget]>,
    pub functions: &'a Arena<FunctionBinding<'a>>,
    pub symbols: &'a Arena<Symbol>,
    pub captures: &'a Arena<Capture<'a>>,
}

impl<'a> ExprArenas<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exprs: &'a Arena<Expr<'a>>,
        expr_refs: &'a Arena<&'a Expr<'a>>,
        cases: &'a Arena<MatchCase<'a>>,
        case_refs: &'a Arena<&'a MatchCase<'a>>,
        targets: &'a Arena<BindingTarget>,
        target_refs: &'a Arena<&'a BindingTarget>,
        target_opts: &'a Arena<Option<&'a BindingTarget>>,
        target_lists: &'a Arena<&'a [&'a BindingTarget]>,
        functions: &'a Arena<FunctionBinding<'a>>,
        symbols: &'a Arena<Symbol>,
        captures: &'a Arena<Capture<'a>>,
    ) -> Self {
        ExprArenas {
            exprs,
            expr_refs,
            cases,
            case_refs,
            targets,
            target_refs,
            target_opts,
            target_lists,
            functions,
            symbols,
            captures,
        }
    }

    pub fn expr(&self, node: Expr<'a>) -> &'a Expr<'a> {
        self.exprs.alloc(node)
    }

    pub fn expr_list<I>(&self, items: I) -> &'a [&'a Expr<'a>]
    where
        I: IntoIterator<Item = &'a Expr<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.expr_refs.alloc_slice(items)
    }

    pub fn case(&self, node: MatchCase<'a>) -> &'a MatchCase<'a> {
        self.cases.alloc(node)
    }

    pub fn case_list<I>(&self, items: I) -> &'a [&'a MatchCase<'a>]
    where
        I: IntoIterator<Item = &'a MatchCase<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.case_refs.alloc_slice(items)
    }

    pub fn target(&self, target: BindingTarget) -> &'a BindingTarget {
        self.targets.alloc(target)
    }

    pub fn target_list<I>(&self, items: I) -> &'a [&'a BindingTarget]
    where
        I: IntoIterator<Item = &'a BindingTarget>,
        I::IntoIter: ExactSizeIterator,
    {
        self.target_refs.alloc_slice(items)
    }

    pub fn target_opt_list<I>(&self, items: I) -> &'a [Option<&'a BindingTarget>]
    where
        I: IntoIterator<Item = Option<&'a BindingTarget>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.target_opts.alloc_slice(items)
    }

    pub fn target_list_list<I>(&self, items: I) -> &'a [&'a [&'a BindingTarget]]
    where
        I: IntoIterator<Item = &'a [&'a BindingTarget]>,
        I::IntoIter: ExactSizeIterator,
    {
        self.target_lists.alloc_slice(items)
    }

    pub fn function(&self, f: FunctionBinding<'a>) -> &'a FunctionBinding<'a> {
        self.functions.alloc(f)
    }

    pub fn symbol_list<I>(&self, items: I) -> &'a [Symbol]
    where
        I: IntoIterator<Item = Symbol>,
        I::IntoIter: ExactSizeIterator,
    {
        self.symbols.alloc_slice(items)
    }

    pub fn capture_list<I>(&self, items: I) -> &'a [Capture<'a>]
    where
        I: IntoIterator<Item = Capture<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.captures.alloc_slice(items)
    }
}
