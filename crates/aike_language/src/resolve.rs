//! Name and type resolution: syntax tree to typed AST.
//!
//! Resolution runs in two interleaved phases within every block:
//!
//! 1. **Recursive-declaration pre-pass**: adjacent type definitions are
//!    pre-bound with placeholder prototypes, and adjacent function
//!    definitions with fresh function types, before any body is looked at.
//!    This is what admits mutual recursion on both types and functions.
//! 2. **Body resolution**: expressions are translated, names are bound,
//!    patterns become [`MatchCase`] values, and named call arguments are
//!    rewritten to positional slots.
//!
//! Closure capture happens here: when a name resolves to a local defined
//! in a scope shallower than the current function's start scope, the local
//! is appended (once, in first-use order) to the function's externals and
//! the use site becomes an access into the function's context. A defined
//! function referenced across a function boundary is captured the same
//! way, except that what flows through the context is its *context
//! pointer*, not its code; extern functions and constructors carry no
//! context and are referenced directly.

use crate::arena_ctx::ExprArenas;
use crate::ast::{
    Ident, SynAst, SynBinaryOp, SynKind, SynPat, SynPatKind, SynType, SynTypedVar, SynUnaryOp,
    SynUnionPayload,
};
use crate::expr::{Binding, BindingTarget, Capture, Expr, ExprKind, FunctionBinding, MatchCase, MatchCaseKind};
use aike_base::{CompileError, Interner, Location, Result, Symbol};
use aike_kernel::{ProtoId, Prototype, RecordProto, Type, TypeId, TypeList, TypeStore, UnionProto};

struct FunctionInfo<'a> {
    /// Scope-stack depth at which this function's body starts. Names
    /// resolved from shallower scopes are captured.
    scope: usize,
    context: &'a BindingTarget,
    externals: Vec<Binding<'a>>,
}

struct Environment<'a> {
    scopes: Vec<Vec<(Symbol, Binding<'a>)>>,
    functions: Vec<FunctionInfo<'a>>,
    types: Vec<(Symbol, TypeId)>,
    generics: Vec<TypeId>,
}

pub struct Resolver<'a, 'i> {
    arenas: ExprArenas<'a>,
    store: &'i mut TypeStore,
    interner: &'i mut Interner,
    env: Environment<'a>,
    underscore: Symbol,
    context_name: Symbol,
}

/// Resolves a syntax tree against the prelude environment (`unit`, `int`,
/// `float`, `bool`, `char` pre-bound).
pub fn resolve<'a>(
    root: &SynAst<'_>,
    arenas: ExprArenas<'a>,
    store: &mut TypeStore,
    interner: &mut Interner,
) -> Result<&'a Expr<'a>> {
    let types = vec![
        (interner.intern("unit"), store.unit()),
        (interner.intern("int"), store.int()),
        (interner.intern("float"), store.float()),
        (interner.intern("bool"), store.bool_()),
        (interner.intern("char"), store.char_()),
    ];

    let underscore = interner.intern("_");
    let context_name = interner.intern("context");

    let root_context_ty = store.closure_context();
    let root_context = arenas.target(BindingTarget::new(context_name, root_context_ty));

    let mut resolver = Resolver {
        arenas,
        store,
        interner,
        env: Environment {
            scopes: vec![Vec::new()],
            functions: vec![FunctionInfo { scope: 0, context: root_context, externals: Vec::new() }],
            types,
            generics: Vec::new(),
        },
        underscore,
        context_name,
    };

    let expr = resolver.resolve_expr(root)?;

    log::debug!(
        "resolved unit: {} types in scope at end",
        resolver.env.types.len()
    );

    Ok(expr)
}

impl<'a, 'i> Resolver<'a, 'i> {
    fn expr(&self, ty: TypeId, location: Location, kind: ExprKind<'a>) -> &'a Expr<'a> {
        self.arenas.expr(Expr::new(ty, location, kind))
    }

    fn case(&self, ty: TypeId, location: Location, kind: MatchCaseKind<'a>) -> &'a MatchCase<'a> {
        self.arenas.case(MatchCase::new(ty, location, kind))
    }

    fn name(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    fn lookup_binding(&self, name: Symbol) -> Option<(Binding<'a>, usize)> {
        for (scope_index, scope) in self.env.scopes.iter().enumerate().rev() {
            for &(bound_name, binding) in scope.iter().rev() {
                if bound_name == name {
                    return Some((binding, scope_index));
                }
            }
        }
        None
    }

    fn try_resolve_type_name(&mut self, name: Symbol) -> Option<TypeId> {
        let found = self
            .env
            .types
            .iter()
            .rev()
            .find(|&&(bound_name, _)| bound_name == name)
            .map(|&(_, ty)| ty)?;

        if let Type::Instance { proto, args } = self.store.get(found) {
            if !args.is_empty() {
                let proto = *proto;
                let count = args.len();
                let fresh: TypeList = (0..count).map(|_| self.store.fresh_var()).collect();
                return Some(self.store.instance(proto, fresh));
            }
        }

        Some(found)
    }

    fn resolve_type_name(&mut self, name: Symbol, location: Location) -> Result<TypeId> {
        self.try_resolve_type_name(name).ok_or_else(|| {
            CompileError::new(format!("Unknown type {}", self.name(name)), location)
        })
    }

    /// Searches in-scope union types for a variant called `name`.
    fn resolve_union_variant(&self, name: Symbol) -> Option<(ProtoId, u32, TypeId, usize)> {
        for &(_, ty) in self.env.types.iter().rev() {
            let final_ty = self.store.final_type(ty);
            if let Type::Instance { proto, .. } = self.store.get(final_ty) {
                if let Prototype::Union(u) = self.store.proto(*proto) {
                    if let Some(tag) = u.variant_index(name) {
                        return Some((*proto, tag as u32, u.variants[tag].1, u.generics.len()));
                    }
                }
            }
        }
        None
    }

    /// Instantiates a union prototype with fresh type arguments and
    /// returns the instance plus the payload type of the given variant.
    fn instantiate_union(
        &mut self,
        proto: ProtoId,
        payload_decl: TypeId,
        generic_count: usize,
    ) -> (TypeId, TypeId) {
        let args: TypeList = (0..generic_count).map(|_| self.store.fresh_var()).collect();
        let inst = self.store.instance(proto, args);
        let payload = self
            .store
            .member_type(inst, payload_decl)
            .unwrap_or_else(|| self.store.fresh_var());
        (inst, payload)
    }

    // ------------------------------------------------------------------
    // Type syntax
    // ------------------------------------------------------------------

    fn resolve_new_generic(&mut self, ident: Ident, frozen: bool) -> Result<TypeId> {
        for &existing in &self.env.generics {
            if let Type::Generic { name: Some(name), .. } = self.store.get(existing) {
                if *name == ident.name {
                    return Err(CompileError::new(
                        format!("Generic type '{} already exists", self.name(ident.name)),
                        ident.location,
                    ));
                }
            }
        }

        let var = self.store.named_var(ident.name, frozen);
        self.env.generics.push(var);
        Ok(var)
    }

    fn resolve_generic_list(&mut self, generics: &[Ident]) -> Result<Vec<TypeId>> {
        generics.iter().map(|&g| self.resolve_new_generic(g, true)).collect()
    }

    fn resolve_type(
        &mut self,
        ty: Option<&SynType<'_>>,
        allow_new_generics: bool,
    ) -> Result<TypeId> {
        let ty = match ty {
            Some(ty) => ty,
            None => return Ok(self.store.fresh_var()),
        };

        match ty {
            SynType::Name { name, args } => {
                let base = self.resolve_type_name(name.name, name.location)?;

                let resolved: TypeList = args
                    .iter()
                    .map(|&a| self.resolve_type(Some(a), allow_new_generics))
                    .collect::<Result<_>>()?;

                match self.store.get(self.store.final_type(base)) {
                    Type::Instance { proto, args: base_args } => {
                        let proto = *proto;
                        if base_args.is_empty() && !resolved.is_empty() {
                            return Err(CompileError::new(
                                format!(
                                    "Can't instantiate non-generic type {}",
                                    self.name(name.name)
                                ),
                                name.location,
                            ));
                        }
                        if base_args.len() != resolved.len() {
                            return Err(CompileError::new(
                                format!(
                                    "Expected {} type arguments while instantiating {}, but got {}",
                                    base_args.len(),
                                    self.name(name.name),
                                    resolved.len()
                                ),
                                name.location,
                            ));
                        }
                        Ok(self.store.instance(proto, resolved))
                    }
                    _ => {
                        if !resolved.is_empty() {
                            return Err(CompileError::new(
                                format!(
                                    "Can't instantiate non-generic type {}",
                                    self.name(name.name)
                                ),
                                name.location,
                            ));
                        }
                        Ok(base)
                    }
                }
            }

            SynType::Generic(ident) => {
                for &existing in &self.env.generics {
                    if let Type::Generic { name: Some(name), .. } = self.store.get(existing) {
                        if *name == ident.name {
                            return Ok(existing);
                        }
                    }
                }

                if allow_new_generics {
                    self.resolve_new_generic(*ident, false)
                } else {
                    Err(CompileError::new(
                        format!("Unknown type '{}", self.name(ident.name)),
                        ident.location,
                    ))
                }
            }

            SynType::Array(element) => {
                let element = self.resolve_type(Some(element), allow_new_generics)?;
                Ok(self.store.array(element))
            }

            SynType::Function { args, result } => {
                let args: TypeList = args
                    .iter()
                    .map(|&a| self.resolve_type(Some(a), allow_new_generics))
                    .collect::<Result<_>>()?;
                let result = self.resolve_type(Some(result), allow_new_generics)?;
                Ok(self.store.function(args, result))
            }

            SynType::Tuple(members) => {
                let members: TypeList = members
                    .iter()
                    .map(|&m| self.resolve_type(Some(m), allow_new_generics))
                    .collect::<Result<_>>()?;
                Ok(self.store.tuple(members))
            }
        }
    }

    fn resolve_function_type(
        &mut self,
        ret: Option<&SynType<'_>>,
        args: &[SynTypedVar<'_>],
        allow_new_generics: bool,
    ) -> Result<TypeId> {
        let arg_types: TypeList = args
            .iter()
            .map(|a| self.resolve_type(a.ty, allow_new_generics))
            .collect::<Result<_>>()?;
        let result = self.resolve_type(ret, allow_new_generics)?;
        Ok(self.store.function(arg_types, result))
    }

    // ------------------------------------------------------------------
    // Recursive declarations
    // ------------------------------------------------------------------

    fn declare_type(&mut self, name: Ident, generics: &[Ident]) -> Result<TypeId> {
        let generic_count = self.env.generics.len();
        let generic_types = self.resolve_generic_list(generics)?;
        self.env.generics.truncate(generic_count);

        let proto = self.store.declare_proto(name.name);
        let inst = self.store.instance(proto, generic_types.into_iter().collect());
        self.env.types.push((name.name, inst));

        Ok(inst)
    }

    fn declare_type_rec(&mut self, name: Ident, generics: &[Ident]) -> Result<TypeId> {
        for &(bound_name, ty) in self.env.types.iter().rev() {
            if bound_name == name.name {
                if matches!(self.store.get(ty), Type::Instance { .. }) {
                    return Ok(ty);
                }
                break;
            }
        }

        self.declare_type(name, generics)
    }

    fn declare_function(
        &mut self,
        name: Ident,
        ret: Option<&SynType<'_>>,
        args: &[SynTypedVar<'_>],
    ) -> Result<&'a FunctionBinding<'a>> {
        let generic_count = self.env.generics.len();
        let funty = self.resolve_function_type(ret, args, true)?;
        self.env.generics.truncate(generic_count);

        let arg_names = self.arenas.symbol_list(args.iter().map(|a| a.name.name));
        let target = self.arenas.target(BindingTarget::new(name.name, funty));

        let context_ty = self.store.closure_context();
        let context_target = self.arenas.target(BindingTarget::new(self.context_name, context_ty));

        let binding = self.arenas.function(FunctionBinding {
            target,
            arg_names,
            context: Some(context_target),
        });

        if name.name != Symbol::EMPTY {
            if let Some(scope) = self.env.scopes.last_mut() {
                scope.push((name.name, Binding::Function(binding)));
            }
        }

        Ok(binding)
    }

    fn declare_function_rec(
        &mut self,
        name: Ident,
        ret: Option<&SynType<'_>>,
        args: &[SynTypedVar<'_>],
    ) -> Result<&'a FunctionBinding<'a>> {
        if name.name != Symbol::EMPTY {
            if let Some(scope) = self.env.scopes.last() {
                for &(bound_name, binding) in scope.iter().rev() {
                    if bound_name == name.name {
                        if let Binding::Function(f) = binding {
                            return Ok(f);
                        }
                    }
                }
            }
        }

        self.declare_function(name, ret, args)
    }

    /// Pre-binds the run of adjacent type or function declarations starting
    /// at `offset`; returns how many expressions the run covers.
    fn resolve_recursive_declarations(
        &mut self,
        exprs: &[&SynAst<'_>],
        offset: usize,
    ) -> Result<usize> {
        match &exprs[offset].kind {
            SynKind::RecordDef { .. } | SynKind::UnionDef { .. } => {
                let mut count = 0;
                while offset + count < exprs.len() {
                    match &exprs[offset + count].kind {
                        SynKind::RecordDef { name, generics, .. }
                        | SynKind::UnionDef { name, generics, .. } => {
                            self.declare_type_rec(*name, generics)?;
                            count += 1;
                        }
                        _ => break,
                    }
                }
                Ok(count)
            }

            SynKind::LetFunc { .. } => {
                let mut count = 0;
                while offset + count < exprs.len() {
                    match &exprs[offset + count].kind {
                        SynKind::LetFunc { name, ret, args, .. } => {
                            self.declare_function_rec(*name, *ret, args)?;
                            count += 1;
                        }
                        _ => break,
                    }
                }
                Ok(count)
            }

            _ => Ok(1),
        }
    }

    // ------------------------------------------------------------------
    // Binding access and capture
    // ------------------------------------------------------------------

    /// Resolves a value use of `name`, rewriting cross-function references
    /// to context accesses and zero-argument constructors to nullary calls.
    fn resolve_binding_access(
        &mut self,
        name: Symbol,
        location: Location,
    ) -> Result<Option<&'a Expr<'a>>> {
        let (binding, scope) = match self.lookup_binding(name) {
            Some(found) => found,
            None => return Ok(None),
        };

        if let Binding::UnitConstructor(f) = binding {
            let callee = self.expr(f.target.ty.get(), location, ExprKind::Binding(binding));
            let ty = self.store.fresh_var();
            return Ok(Some(self.expr(ty, location, ExprKind::Call { callee, args: &[] })));
        }

        let current = self.env.functions.len() - 1;
        if scope < self.env.functions[current].scope {
            let captured = match binding {
                Binding::Local(_) => true,
                Binding::Function(f) => f.context.is_some(),
                Binding::UnitConstructor(_) => false,
            };

            if captured {
                let (context, index) = {
                    let info = &mut self.env.functions[current];
                    let index =
                        match info.externals.iter().position(|e| e.same_target(&binding)) {
                            Some(index) => index,
                            None => {
                                info.externals.push(binding);
                                info.externals.len() - 1
                            }
                        };
                    (info.context, index)
                };

                return Ok(Some(self.expr(
                    binding.target().ty.get(),
                    location,
                    ExprKind::External { context, binding, name, index: index as u32 },
                )));
            }
        }

        let ty = match binding {
            Binding::Local(target) => target.ty.get(),
            _ => self.store.fresh_var(),
        };

        Ok(Some(self.expr(ty, location, ExprKind::Binding(binding))))
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn bind_pattern_local(&mut self, name: Symbol, ty: TypeId) -> &'a BindingTarget {
        let target = self.arenas.target(BindingTarget::new(name, ty));
        if let Some(scope) = self.env.scopes.last_mut() {
            scope.push((name, Binding::Local(target)));
        }
        target
    }

    fn resolve_pattern(&mut self, pat: &SynPat<'_>) -> Result<&'a MatchCase<'a>> {
        let location = pat.location;

        match &pat.kind {
            SynPatKind::Int(value) => {
                Ok(self.case(self.store.int(), location, MatchCaseKind::Int(*value)))
            }
            SynPatKind::Bool(value) => {
                Ok(self.case(self.store.bool_(), location, MatchCaseKind::Bool(*value)))
            }
            SynPatKind::Char(value) => {
                Ok(self.case(self.store.char_(), location, MatchCaseKind::Char(*value)))
            }

            SynPatKind::Array(elements) => {
                let elements: Vec<&'a MatchCase<'a>> =
                    elements.iter().map(|&e| self.resolve_pattern(e)).collect::<Result<_>>()?;
                let ty = self.store.fresh_var();
                Ok(self.case(
                    ty,
                    location,
                    MatchCaseKind::Array { elements: self.arenas.case_list(elements) },
                ))
            }

            SynPatKind::Tuple(elements) => {
                let elements: Vec<&'a MatchCase<'a>> =
                    elements.iter().map(|&e| self.resolve_pattern(e)).collect::<Result<_>>()?;
                let members: TypeList = elements.iter().map(|e| e.ty.get()).collect();
                let ty = self.store.tuple(members);
                Ok(self.case(
                    ty,
                    location,
                    MatchCaseKind::Members {
                        values: std::cell::Cell::new(self.arenas.case_list(elements)),
                        names: std::cell::Cell::new(&[]),
                    },
                ))
            }

            SynPatKind::CtorAlias { name, alias } => {
                if let Some((proto, tag, payload_decl, generic_count)) =
                    self.resolve_union_variant(name.name)
                {
                    let (inst, payload) =
                        self.instantiate_union(proto, payload_decl, generic_count);
                    let target = self.bind_pattern_local(alias.name, payload);
                    let inner =
                        self.case(payload, location, MatchCaseKind::Any { target: Some(target) });
                    return Ok(self.case(inst, location, MatchCaseKind::Union { tag, pattern: inner }));
                }

                let ty = match self.try_resolve_type_name(name.name) {
                    Some(ty) => ty,
                    None => {
                        return Err(CompileError::new(
                            format!("Unknown type or union tag '{}'", self.name(name.name)),
                            location,
                        ));
                    }
                };

                let target = self.bind_pattern_local(alias.name, ty);
                Ok(self.case(ty, location, MatchCaseKind::Any { target: Some(target) }))
            }

            SynPatKind::Ctor { name, args, arg_names } => {
                let mut names: Vec<Symbol> = Vec::new();
                let mut values: Vec<&'a MatchCase<'a>> = Vec::new();

                for (i, &arg) in args.iter().enumerate() {
                    if !arg_names.is_empty() {
                        names.push(arg_names[i].name);
                    }
                    values.push(self.resolve_pattern(arg)?);
                }

                let members = MatchCaseKind::Members {
                    values: std::cell::Cell::new(self.arenas.case_list(values)),
                    names: std::cell::Cell::new(self.arenas.symbol_list(names)),
                };

                if let Some((proto, tag, payload_decl, generic_count)) =
                    self.resolve_union_variant(name.name)
                {
                    let (inst, payload) =
                        self.instantiate_union(proto, payload_decl, generic_count);
                    let inner = self.case(payload, location, members);
                    return Ok(self.case(inst, location, MatchCaseKind::Union { tag, pattern: inner }));
                }

                let ty = match self.try_resolve_type_name(name.name) {
                    Some(ty) => ty,
                    None => {
                        return Err(CompileError::new(
                            format!("Unknown type or union tag '{}'", self.name(name.name)),
                            location,
                        ));
                    }
                };

                Ok(self.case(ty, location, members))
            }

            SynPatKind::Placeholder(var) => {
                // A bare name may be a zero-argument union variant.
                if let Some((proto, tag, payload_decl, generic_count)) =
                    self.resolve_union_variant(var.name.name)
                {
                    let (inst, payload) =
                        self.instantiate_union(proto, payload_decl, generic_count);
                    let inner = self.case(payload, location, MatchCaseKind::Any { target: None });
                    return Ok(self.case(inst, location, MatchCaseKind::Union { tag, pattern: inner }));
                }

                // A name already bound in this pattern scope means a
                // value-equality check, not a fresh binding.
                let previous = self
                    .env
                    .scopes
                    .last()
                    .and_then(|scope| {
                        scope.iter().rev().find(|&&(bound, _)| bound == var.name.name)
                    })
                    .map(|&(_, binding)| binding);

                if let Some(previous) = previous {
                    let ty = self.resolve_type(var.ty, true)?;
                    return Ok(self.case(ty, location, MatchCaseKind::Value { binding: previous }));
                }

                let ty = self.resolve_type(var.ty, true)?;
                let target = self.bind_pattern_local(var.name.name, ty);
                Ok(self.case(ty, location, MatchCaseKind::Any { target: Some(target) }))
            }

            SynPatKind::Wildcard => {
                let ty = self.store.fresh_var();
                Ok(self.case(ty, location, MatchCaseKind::Any { target: None }))
            }

            SynPatKind::Or(options) => {
                let mut resolved: Vec<&'a MatchCase<'a>> = Vec::new();
                let mut alternatives: Vec<Vec<&'a BindingTarget>> = Vec::new();

                for (i, &option) in options.iter().enumerate() {
                    self.env.scopes.push(Vec::new());
                    resolved.push(self.resolve_pattern(option)?);

                    let scope = self.env.scopes.pop().unwrap_or_default();
                    let mut targets: Vec<&'a BindingTarget> = scope
                        .iter()
                        .filter_map(|&(_, binding)| match binding {
                            Binding::Local(target) => Some(target),
                            _ => None,
                        })
                        .collect();
                    targets.sort_by(|a, b| {
                        self.interner.resolve(a.name).cmp(self.interner.resolve(b.name))
                    });

                    if i != 0 {
                        let first = &alternatives[0];
                        let same = first.len() == targets.len()
                            && first.iter().zip(targets.iter()).all(|(a, b)| a.name == b.name);
                        if !same {
                            return Err(CompileError::new(
                                "Different patterns must use the same placeholders",
                                option.location,
                            ));
                        }
                    }

                    alternatives.push(targets);
                }

                // The sinks are what the arm body sees; every alternative's
                // own bindings unify with them.
                let sinks: Vec<&'a BindingTarget> = alternatives
                    .first()
                    .map(|first| {
                        first
                            .iter()
                            .map(|t| {
                                let ty = self.store.fresh_var();
                                self.bind_pattern_local(t.name, ty)
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                let alt_slices: Vec<&'a [&'a BindingTarget]> = alternatives
                    .into_iter()
                    .map(|alt| self.arenas.target_list(alt))
                    .collect();

                let ty = self.store.fresh_var();
                Ok(self.case(
                    ty,
                    location,
                    MatchCaseKind::Or {
                        options: self.arenas.case_list(resolved),
                        alt_bindings: self.arenas.target_list_list(alt_slices),
                        sinks: self.arenas.target_list(sinks),
                    },
                ))
            }

            SynPatKind::Guard { pattern, condition } => {
                let pattern = self.resolve_pattern(pattern)?;
                let condition = self.resolve_expr(condition)?;
                let ty = self.store.fresh_var();
                Ok(self.case(ty, location, MatchCaseKind::If { pattern, condition }))
            }
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn resolve_record_definition(
        &mut self,
        node: &SynAst<'_>,
        name: Ident,
        generics: &[Ident],
        fields: &[SynTypedVar<'_>],
    ) -> Result<&'a Expr<'a>> {
        let mut inst = self.declare_type_rec(name, generics)?;

        let proto = match self.store.get(inst) {
            Type::Instance { proto, .. } => *proto,
            _ => {
                return Err(CompileError::new(
                    format!("Unknown type {}", self.name(name.name)),
                    name.location,
                ))
            }
        };

        // A redefinition in the same block gets its own prototype.
        if !matches!(self.store.proto(proto), Prototype::Pending { .. }) {
            inst = self.declare_type(name, generics)?;
        }
        let proto = match self.store.get(inst) {
            Type::Instance { proto, .. } => *proto,
            _ => unreachable!("declare_type returns an instance"),
        };

        let generic_types: Vec<TypeId> = match self.store.get(inst) {
            Type::Instance { args, .. } => args.iter().copied().collect(),
            _ => Vec::new(),
        };

        let generic_count = self.env.generics.len();
        self.env.generics.extend(generic_types.iter().copied());

        let mut field_entries: Vec<(Symbol, TypeId)> = Vec::new();
        for field in fields {
            let ty = self.resolve_type(field.ty, false)?;
            field_entries.push((field.name.name, ty));
        }

        let field_types: TypeList = field_entries.iter().map(|&(_, ty)| ty).collect();
        let field_names: Vec<Symbol> = field_entries.iter().map(|&(n, _)| n).collect();

        self.store.define_proto(
            proto,
            Prototype::Record(RecordProto {
                name: name.name,
                fields: field_entries,
                generics: generic_types,
            }),
        );

        let funty = self.store.function(field_types.clone(), inst);
        let target = self.arenas.target(BindingTarget::new(name.name, funty));

        let args: Vec<&'a BindingTarget> = field_names
            .iter()
            .zip(field_types.iter())
            .map(|(&n, &ty)| self.arenas.target(BindingTarget::new(n, ty)))
            .collect();

        let binding = self.arenas.function(FunctionBinding {
            target,
            arg_names: self.arenas.symbol_list(field_names),
            context: None,
        });

        if let Some(scope) = self.env.scopes.last_mut() {
            scope.push((name.name, Binding::Function(binding)));
        }

        self.env.generics.truncate(generic_count);

        Ok(self.expr(
            funty,
            node.location,
            ExprKind::RecordCtor { target, args: self.arenas.target_list(args) },
        ))
    }

    fn resolve_union_definition(
        &mut self,
        node: &SynAst<'_>,
        name: Ident,
        generics: &[Ident],
        variants: &[crate::ast::SynUnionVariant<'_>],
    ) -> Result<&'a Expr<'a>> {
        let mut inst = self.declare_type_rec(name, generics)?;

        let proto = match self.store.get(inst) {
            Type::Instance { proto, .. } => *proto,
            _ => {
                return Err(CompileError::new(
                    format!("Unknown type {}", self.name(name.name)),
                    name.location,
                ))
            }
        };

        if !matches!(self.store.proto(proto), Prototype::Pending { .. }) {
            inst = self.declare_type(name, generics)?;
        }
        let proto = match self.store.get(inst) {
            Type::Instance { proto, .. } => *proto,
            _ => unreachable!("declare_type returns an instance"),
        };

        let generic_types: Vec<TypeId> = match self.store.get(inst) {
            Type::Instance { args, .. } => args.iter().copied().collect(),
            _ => Vec::new(),
        };

        let generic_count = self.env.generics.len();
        self.env.generics.extend(generic_types.iter().copied());

        let mut union_variants: Vec<(Symbol, TypeId)> = Vec::new();
        let mut ctors: Vec<&'a Expr<'a>> = Vec::new();

        for (tag, variant) in variants.iter().enumerate() {
            if union_variants.iter().any(|&(n, _)| n == variant.name.name) {
                return Err(CompileError::new(
                    format!("Variant '{}' is already defined", self.name(variant.name.name)),
                    variant.name.location,
                ));
            }

            let value_name = self.interner.intern("value");

            let (payload, member_types, member_names): (TypeId, TypeList, Vec<Symbol>) =
                match &variant.payload {
                    SynUnionPayload::Record(fields) => {
                        let mut entries: Vec<(Symbol, TypeId)> = Vec::new();
                        for field in fields.iter() {
                            let ty = self.resolve_type(field.ty, false)?;
                            entries.push((field.name.name, ty));
                        }

                        let record = self.store.alloc_proto(Prototype::Record(RecordProto {
                            name: variant.name.name,
                            fields: entries.clone(),
                            generics: generic_types.clone(),
                        }));
                        let payload =
                            self.store.instance(record, generic_types.iter().copied().collect());

                        (
                            payload,
                            entries.iter().map(|&(_, ty)| ty).collect(),
                            entries.iter().map(|&(n, _)| n).collect(),
                        )
                    }

                    SynUnionPayload::Ty(ty) => {
                        let resolved = self.resolve_type(Some(ty), false)?;
                        match self.store.get(self.store.final_type(resolved)) {
                            Type::Tuple(members) => {
                                let members: TypeList = members.clone();
                                let names = vec![value_name; members.len()];
                                (resolved, members, names)
                            }
                            _ => (resolved, std::iter::once(resolved).collect(), vec![value_name]),
                        }
                    }

                    SynUnionPayload::Unit => (self.store.unit(), TypeList::new(), Vec::new()),
                };

            union_variants.push((variant.name.name, payload));

            let funty = self.store.function(member_types.clone(), inst);
            let target = self.arenas.target(BindingTarget::new(variant.name.name, funty));

            let args: Vec<&'a BindingTarget> = member_names
                .iter()
                .zip(member_types.iter())
                .map(|(&n, &ty)| self.arenas.target(BindingTarget::new(n, ty)))
                .collect();

            let binding = self.arenas.function(FunctionBinding {
                target,
                arg_names: self.arenas.symbol_list(member_names),
                context: None,
            });

            let is_unit = matches!(variant.payload, SynUnionPayload::Unit);
            if let Some(scope) = self.env.scopes.last_mut() {
                let bound = if is_unit {
                    Binding::UnitConstructor(binding)
                } else {
                    Binding::Function(binding)
                };
                scope.push((variant.name.name, bound));
            }

            ctors.push(self.expr(
                funty,
                variant.name.location,
                ExprKind::UnionCtor {
                    target,
                    args: self.arenas.target_list(args),
                    tag: tag as u32,
                    payload,
                },
            ));
        }

        self.store.define_proto(
            proto,
            Prototype::Union(UnionProto {
                name: name.name,
                variants: union_variants,
                generics: generic_types,
            }),
        );

        self.env.generics.truncate(generic_count);

        Ok(self.expr(
            self.store.unit(),
            node.location,
            ExprKind::UnionDef { ctors: self.arenas.expr_list(ctors) },
        ))
    }

    fn resolve_let_func(
        &mut self,
        node: &SynAst<'_>,
        name: Ident,
        ret: Option<&SynType<'_>>,
        args: &[SynTypedVar<'_>],
        body: &SynAst<'_>,
    ) -> Result<&'a Expr<'a>> {
        let binding = self.declare_function_rec(name, ret, args)?;

        let context_target = match binding.context {
            Some(context) => context,
            None => unreachable!("defined functions always carry a context target"),
        };

        self.env.functions.push(FunctionInfo {
            scope: self.env.scopes.len(),
            context: context_target,
            externals: Vec::new(),
        });
        self.env.scopes.push(Vec::new());

        let generic_count = self.env.generics.len();

        // The pre-pass resolved this signature in the enclosing generic
        // scope; re-resolve it here so the body and the recorded function
        // type share variables, and re-point the target at the result.
        let funty = self.resolve_function_type(ret, args, true)?;
        binding.target.ty.set(funty);

        let arg_types: Vec<TypeId> = match self.store.get(funty) {
            Type::Function { args, .. } => args.iter().copied().collect(),
            _ => Vec::new(),
        };

        let mut arg_targets: Vec<&'a BindingTarget> = Vec::new();
        for (arg, &ty) in args.iter().zip(arg_types.iter()) {
            let target = self.arenas.target(BindingTarget::new(arg.name.name, ty));
            arg_targets.push(target);
            if let Some(scope) = self.env.scopes.last_mut() {
                scope.push((arg.name.name, Binding::Local(target)));
            }
        }

        let body = self.resolve_expr(body)?;

        let info = match self.env.functions.pop() {
            Some(info) => info,
            None => unreachable!("function info pushed above"),
        };
        self.env.scopes.pop();

        // The context record gets one field per external, in first-use
        // order; a captured function contributes its context pointer.
        let context_ty = context_target.ty.get();
        for external in &info.externals {
            match external {
                Binding::Function(f) => {
                    let field_name = {
                        let base = self.interner.resolve(f.target.name).to_string();
                        self.interner.intern(&format!("{base}.context"))
                    };
                    let field_ty = match f.context {
                        Some(context) => context.ty.get(),
                        None => self.store.unit(),
                    };
                    self.store.context_push_field(context_ty, field_name, field_ty);
                }
                Binding::Local(target) => {
                    self.store.context_push_field(context_ty, target.name, target.ty.get());
                }
                Binding::UnitConstructor(_) => {}
            }
        }

        let has_externals = !info.externals.is_empty();

        // Capture initialisers are resolved in the enclosing environment,
        // which may recursively capture into it.
        let mut captures: Vec<Capture<'a>> = Vec::new();
        for external in &info.externals {
            let target_name = external.target().name;
            let init = match self.resolve_binding_access(target_name, node.location)? {
                Some(init) => init,
                None => {
                    return Err(CompileError::new(
                        format!(
                            "Can't resolve the binding of the function external variable {}",
                            self.name(target_name)
                        ),
                        node.location,
                    ));
                }
            };
            captures.push(Capture { binding: *external, init });
        }

        self.env.generics.truncate(generic_count);

        log::trace!(
            "function {} resolved with {} externals",
            self.name(name.name),
            info.externals.len()
        );

        Ok(self.expr(
            funty,
            node.location,
            ExprKind::LetFunc {
                target: binding.target,
                context: if has_externals { Some(context_target) } else { None },
                args: self.arenas.target_list(arg_targets),
                body,
                captures: self.arenas.capture_list(captures),
            },
        ))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn resolve_expr(&mut self, node: &SynAst<'_>) -> Result<&'a Expr<'a>> {
        let location = node.location;

        match &node.kind {
            SynKind::Unit => Ok(self.expr(self.store.unit(), location, ExprKind::Unit)),
            SynKind::Int(value) => {
                Ok(self.expr(self.store.int(), location, ExprKind::Int(*value)))
            }
            SynKind::Char(value) => {
                Ok(self.expr(self.store.char_(), location, ExprKind::Char(*value)))
            }
            SynKind::Bool(value) => {
                Ok(self.expr(self.store.bool_(), location, ExprKind::Bool(*value)))
            }

            SynKind::Array(elements) => {
                let elements: Vec<&'a Expr<'a>> =
                    elements.iter().map(|&e| self.resolve_expr(e)).collect::<Result<_>>()?;
                let ty = match elements.first() {
                    Some(first) => self.store.array(first.ty.get()),
                    None => self.store.fresh_var(),
                };
                Ok(self.expr(ty, location, ExprKind::Array(self.arenas.expr_list(elements))))
            }

            SynKind::Tuple(elements) => {
                let elements: Vec<&'a Expr<'a>> =
                    elements.iter().map(|&e| self.resolve_expr(e)).collect::<Result<_>>()?;
                let members: TypeList = elements.iter().map(|e| e.ty.get()).collect();
                let ty = self.store.tuple(members);
                Ok(self.expr(ty, location, ExprKind::Tuple(self.arenas.expr_list(elements))))
            }

            SynKind::Var(name) => match self.resolve_binding_access(*name, location)? {
                Some(expr) => Ok(expr),
                None => Err(CompileError::new(
                    format!("Unresolved variable reference {}", self.name(*name)),
                    location,
                )),
            },

            SynKind::Unary { op, operand } => {
                let operand = self.resolve_expr(operand)?;
                let ty = match op {
                    SynUnaryOp::Not => self.store.bool_(),
                    _ => operand.ty.get(),
                };
                Ok(self.expr(ty, location, ExprKind::Unary { op: *op, operand }))
            }

            SynKind::Binary { op: SynBinaryOp::Assign, left, right } => {
                let place = self.resolve_expr(left)?;

                let assignable = matches!(
                    place.kind,
                    ExprKind::Binding(Binding::Local(_))
                        | ExprKind::External { binding: Binding::Local(_), .. }
                        | ExprKind::Index { .. }
                        | ExprKind::Member { .. }
                );
                if !assignable {
                    return Err(CompileError::new(
                        "The left side of ':=' must be a variable, array element or record member",
                        left.location,
                    ));
                }

                let value = self.resolve_expr(right)?;
                Ok(self.expr(self.store.unit(), location, ExprKind::Assign { place, value }))
            }

            SynKind::Binary { op, left, right } => {
                let left = self.resolve_expr(left)?;
                let right = self.resolve_expr(right)?;
                let ty = self.store.fresh_var();
                Ok(self.expr(ty, location, ExprKind::Binary { op: *op, left, right }))
            }

            SynKind::Call { callee, args, arg_names } => {
                let callee = self.resolve_expr(callee)?;

                let resolved_args: Vec<&'a Expr<'a>> = if arg_names.is_empty() {
                    args.iter().map(|&a| self.resolve_expr(a)).collect::<Result<_>>()?
                } else {
                    let function = match callee.kind {
                        ExprKind::Binding(Binding::Function(f)) => f,
                        _ => {
                            return Err(CompileError::new(
                                "Cannot match argument names to a value",
                                location,
                            ));
                        }
                    };

                    let mut slots: Vec<Option<&'a Expr<'a>>> =
                        vec![None; function.arg_names.len()];

                    for (name, &value) in arg_names.iter().zip(args.iter()) {
                        let position = function
                            .arg_names
                            .iter()
                            .position(|&declared| declared == name.name);

                        match position {
                            Some(position) => {
                                if slots[position].is_some() {
                                    return Err(CompileError::new(
                                        format!(
                                            "Value for argument '{}' is already defined",
                                            self.name(name.name)
                                        ),
                                        location,
                                    ));
                                }
                                slots[position] = Some(self.resolve_expr(value)?);
                            }
                            None => {
                                return Err(CompileError::new(
                                    format!(
                                        "Function doesn't accept an argument named '{}'",
                                        self.name(name.name)
                                    ),
                                    location,
                                ));
                            }
                        }
                    }

                    let mut filled = Vec::with_capacity(slots.len());
                    for (i, slot) in slots.into_iter().enumerate() {
                        match slot {
                            Some(value) => filled.push(value),
                            None => {
                                return Err(CompileError::new(
                                    format!(
                                        "Value for argument '{}' is missing",
                                        self.name(function.arg_names[i])
                                    ),
                                    location,
                                ));
                            }
                        }
                    }
                    filled
                };

                let ty = match self.store.get(self.store.final_type(callee.ty.get())) {
                    Type::Function { result, .. } => *result,
                    _ => self.store.fresh_var(),
                };

                Ok(self.expr(
                    ty,
                    location,
                    ExprKind::Call { callee, args: self.arenas.expr_list(resolved_args) },
                ))
            }

            SynKind::Index { array, index } => {
                let array = self.resolve_expr(array)?;
                let index = self.resolve_expr(index)?;

                let ty = match self.store.get(self.store.final_type(array.ty.get())) {
                    Type::Array(element) => *element,
                    _ => self.store.fresh_var(),
                };

                Ok(self.expr(ty, location, ExprKind::Index { array, index }))
            }

            SynKind::Slice { array, start, end } => {
                let array = self.resolve_expr(array)?;
                let start = self.resolve_expr(start)?;
                let end = end.map(|e| self.resolve_expr(e)).transpose()?;

                let ty = match self.store.get(self.store.final_type(array.ty.get())) {
                    Type::Array(_) => array.ty.get(),
                    _ => self.store.fresh_var(),
                };

                Ok(self.expr(ty, location, ExprKind::Slice { array, start, end }))
            }

            SynKind::Member { aggregate, member } => {
                let aggregate = self.resolve_expr(aggregate)?;
                let ty = self.store.fresh_var();
                Ok(self.expr(
                    ty,
                    member.location,
                    ExprKind::Member { aggregate, member: member.name },
                ))
            }

            SynKind::LetVar { var, body } => {
                let ty = self.resolve_type(var.ty, false)?;
                let target = self.arenas.target(BindingTarget::new(var.name.name, ty));

                let body = self.resolve_expr(body)?;

                if let Some(scope) = self.env.scopes.last_mut() {
                    scope.push((var.name.name, Binding::Local(target)));
                }

                Ok(self.expr(ty, location, ExprKind::LetVar { target, body }))
            }

            SynKind::LetVars { vars, body } => {
                let body = self.resolve_expr(body)?;

                let mut targets: Vec<Option<&'a BindingTarget>> = Vec::new();
                for var in vars.iter() {
                    if var.name.name == self.underscore {
                        targets.push(None);
                    } else {
                        let ty = self.resolve_type(var.ty, false)?;
                        let target = self.arenas.target(BindingTarget::new(var.name.name, ty));
                        if let Some(scope) = self.env.scopes.last_mut() {
                            scope.push((var.name.name, Binding::Local(target)));
                        }
                        targets.push(Some(target));
                    }
                }

                Ok(self.expr(
                    self.store.unit(),
                    location,
                    ExprKind::LetVars { targets: self.arenas.target_opt_list(targets), body },
                ))
            }

            SynKind::LetFunc { name, ret, args, body } => {
                self.resolve_let_func(node, *name, *ret, args, body)
            }

            SynKind::ExternFunc { name, ret, args } => {
                let funty = self.resolve_function_type(Some(ret), args, false)?;
                let target = self.arenas.target(BindingTarget::new(name.name, funty));

                let mut arg_targets: Vec<&'a BindingTarget> = Vec::new();
                let mut arg_names: Vec<Symbol> = Vec::new();
                for arg in args.iter() {
                    let ty = self.resolve_type(arg.ty, false)?;
                    arg_targets.push(self.arenas.target(BindingTarget::new(arg.name.name, ty)));
                    arg_names.push(arg.name.name);
                }

                let binding = self.arenas.function(FunctionBinding {
                    target,
                    arg_names: self.arenas.symbol_list(arg_names),
                    context: None,
                });

                if let Some(scope) = self.env.scopes.last_mut() {
                    scope.push((name.name, Binding::Function(binding)));
                }

                Ok(self.expr(
                    funty,
                    location,
                    ExprKind::ExternFunc { target, args: self.arenas.target_list(arg_targets) },
                ))
            }

            SynKind::RecordDef { name, generics, fields } => {
                self.resolve_record_definition(node, *name, generics, fields)
            }

            SynKind::UnionDef { name, generics, variants } => {
                self.resolve_union_definition(node, *name, generics, variants)
            }

            SynKind::If { cond, then_body, else_body } => {
                let cond = self.resolve_expr(cond)?;
                let then_body = self.resolve_expr(then_body)?;
                let else_body = self.resolve_expr(else_body)?;
                let ty = self.store.fresh_var();
                Ok(self.expr(ty, location, ExprKind::If { cond, then_body, else_body }))
            }

            SynKind::ForIn { var, array, body } => {
                let array = self.resolve_expr(array)?;

                let ty = self.resolve_type(var.ty, false)?;
                let target = self.arenas.target(BindingTarget::new(var.name.name, ty));
                if let Some(scope) = self.env.scopes.last_mut() {
                    scope.push((var.name.name, Binding::Local(target)));
                }

                let body = self.resolve_expr(body)?;

                if let Some(scope) = self.env.scopes.last_mut() {
                    scope.pop();
                }

                Ok(self.expr(self.store.unit(), location, ExprKind::ForIn { target, array, body }))
            }

            SynKind::ForInRange { var, start, end, body } => {
                let start = self.resolve_expr(start)?;
                let end = self.resolve_expr(end)?;

                let ty = self.resolve_type(var.ty, false)?;
                let target = self.arenas.target(BindingTarget::new(var.name.name, ty));
                if let Some(scope) = self.env.scopes.last_mut() {
                    scope.push((var.name.name, Binding::Local(target)));
                }

                let body = self.resolve_expr(body)?;

                if let Some(scope) = self.env.scopes.last_mut() {
                    scope.pop();
                }

                Ok(self.expr(
                    self.store.unit(),
                    location,
                    ExprKind::ForInRange { target, start, end, body },
                ))
            }

            SynKind::While { cond, body } => {
                let cond = self.resolve_expr(cond)?;
                let body = self.resolve_expr(body)?;
                Ok(self.expr(self.store.unit(), location, ExprKind::While { cond, body }))
            }

            SynKind::Match { scrutinee, arms } => {
                let scrutinee = self.resolve_expr(scrutinee)?;

                let mut cases: Vec<&'a MatchCase<'a>> = Vec::new();
                let mut bodies: Vec<&'a Expr<'a>> = Vec::new();

                for arm in arms.iter() {
                    // Pattern bindings are visible to the guard and body.
                    self.env.scopes.push(Vec::new());

                    cases.push(self.resolve_pattern(arm.pattern)?);
                    bodies.push(self.resolve_expr(arm.body)?);

                    self.env.scopes.pop();
                }

                let ty = self.store.fresh_var();
                Ok(self.expr(
                    ty,
                    location,
                    ExprKind::Match {
                        scrutinee,
                        cases: self.arenas.case_list(cases),
                        bodies: self.arenas.expr_list(bodies),
                    },
                ))
            }

            SynKind::Block(exprs) => {
                let type_count = self.env.types.len();
                self.env.scopes.push(Vec::new());

                let mut resolved: Vec<&'a Expr<'a>> = Vec::new();
                let mut i = 0;
                while i < exprs.len() {
                    let declarations = self.resolve_recursive_declarations(exprs, i)?;
                    debug_assert!(declarations > 0);

                    for j in 0..declarations {
                        resolved.push(self.resolve_expr(exprs[i + j])?);
                    }

                    i += declarations;
                }

                self.env.scopes.pop();
                self.env.types.truncate(type_count);

                let ty = match resolved.last() {
                    Some(last) => last.ty.get(),
                    None => self.store.unit(),
                };

                Ok(self.expr(ty, location, ExprKind::Block(self.arenas.expr_list(resolved))))
            }
        }
    }
}
