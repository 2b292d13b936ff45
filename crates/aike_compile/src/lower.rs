//! Lowering: typed AST to TIR.
//!
//! Three transformations happen together in one walk from the entry body:
//!
//! 1. **Monomorphisation.** Function definitions are *registered* when
//!    their declaration is reached and *emitted* when a reference is
//!    reached: the reference site's concrete type is matched against the
//!    declared type to bind each generic to a ground type, the resulting
//!    instance key (the mangled concrete type plus the definition site's
//!    own substitutions) is looked up in the instance cache, and a new
//!    [`FuncInstance`] is emitted on a miss. The cache is filled before
//!    the body is lowered, so recursion terminates.
//! 2. **Closure conversion.** A block first allocates a context record
//!    for every adjacent function that captures (so mutually recursive
//!    siblings can reference each other's contexts), then stores each
//!    function's captured values into its record. A captured function
//!    contributes its context pointer; a context field whose source
//!    function never captured anything is simply left null.
//! 3. **Pattern compilation.** Match cases become [`Decision`] trees over
//!    a scrutinee local, with alternation bindings funnelled into shared
//!    sink locals (see [`crate::pattern`]).
//!
//! Lowering assumes its input passed the type checker; the only errors it
//! can raise itself concern generic variables that never received an
//! instantiation.

use crate::pattern::{Decision, Path, Step, Test};
use crate::tir::{
    ContextLayout, Env, FuncInstance, InstanceBody, InstanceId, LocalId, LocalInfo, Tir, TirArm,
    TirProgram,
};
use aike_base::{CompileError, Interner, Location, Result, Symbol};
use aike_kernel::{mangle_instance_key, Prototype, Type, TypeId, TypeList, TypeStore};
use aike_language::expr::{Binding, BindingTarget, Capture, Expr, ExprKind, MatchCase, MatchCaseKind};
use std::collections::HashMap;

/// Generic variable (pruned) to ground type, innermost binding last.
type GenericEnv = Vec<(TypeId, TypeId)>;

/// A registered function-like definition: the declaration node plus the
/// substitution environment that was active at its declaration site.
#[derive(Clone)]
struct Definition<'a> {
    node: &'a Expr<'a>,
    env: GenericEnv,
}

/// Per-instance emission state.
#[derive(Default)]
struct Frame {
    locals: Vec<LocalInfo>,
    local_of: HashMap<usize, LocalId>,
    /// Locals holding the context records of functions declared here.
    context_local_of: HashMap<usize, LocalId>,
    subst: GenericEnv,
}

pub struct Lower<'a, 'c> {
    store: &'c mut TypeStore,
    interner: &'c Interner,
    instances: Vec<Option<FuncInstance>>,
    cache: HashMap<(usize, String), InstanceId>,
    definitions: HashMap<usize, Definition<'a>>,
    frames: Vec<Frame>,
}

fn target_key(target: &BindingTarget) -> usize {
    target as *const BindingTarget as usize
}

/// Lowers a checked unit into a TIR program whose entry instance holds the
/// top-level code.
pub fn lower<'a>(
    root: &'a Expr<'a>,
    store: &mut TypeStore,
    interner: &Interner,
) -> Result<TirProgram> {
    let mut lower = Lower {
        store,
        interner,
        instances: vec![None],
        cache: HashMap::new(),
        definitions: HashMap::new(),
        frames: vec![Frame::default()],
    };

    let body = lower.lower_expr(root)?;

    let result = match lower.resolve_ty(root.ty.get(), root.location) {
        Ok(ty) => ty,
        // The unit may end in a generic declaration that is never
        // instantiated; the entry then yields unit.
        Err(_) => lower.store.unit(),
    };

    let frame = lower.frames.pop().unwrap_or_default();
    lower.instances[0] = Some(FuncInstance {
        symbol: "entrypoint".to_string(),
        params: Vec::new(),
        locals: frame.locals,
        context: None,
        result,
        body: InstanceBody::Defined(body),
    });

    let instances: Option<Vec<FuncInstance>> = lower.instances.into_iter().collect();
    let instances = instances.ok_or_else(|| {
        CompileError::new("internal error: unfinished function instance", root.location)
    })?;

    log::debug!("lowered unit: {} function instances", instances.len());

    Ok(TirProgram { instances, entry: InstanceId(0) })
}

impl<'a, 'c> Lower<'a, 'c> {
    fn frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn add_local(&mut self, name: Option<Symbol>, ty: TypeId) -> LocalId {
        let frame = self.frame_mut();
        let id = LocalId(frame.locals.len() as u32);
        frame.locals.push(LocalInfo { name, ty });
        id
    }

    fn local_for(&self, target: &BindingTarget, location: Location) -> Result<LocalId> {
        self.frames
            .last()
            .and_then(|frame| frame.local_of.get(&target_key(target)).copied())
            .ok_or_else(|| {
                CompileError::new(
                    format!(
                        "Variable {} has not been computed",
                        self.interner.resolve(target.name)
                    ),
                    location,
                )
            })
    }

    fn ensure_local(&mut self, target: &BindingTarget, location: Location) -> Result<LocalId> {
        if let Some(frame) = self.frames.last() {
            if let Some(&local) = frame.local_of.get(&target_key(target)) {
                return Ok(local);
            }
        }

        let ty = self.resolve_ty(target.ty.get(), location)?;
        let local = self.add_local(Some(target.name), ty);
        self.frame_mut().local_of.insert(target_key(target), local);
        Ok(local)
    }

    // ------------------------------------------------------------------
    // Ground types
    // ------------------------------------------------------------------

    fn lookup_generic(&self, var: TypeId) -> Option<TypeId> {
        let frame = self.frames.last()?;
        frame.subst.iter().rev().find(|&&(g, _)| g == var).map(|&(_, ground)| ground)
    }

    fn generic_display(&self, var: TypeId) -> String {
        match self.store.get(var) {
            Type::Generic { name: Some(name), .. } => self.interner.resolve(*name).to_string(),
            _ => "a".to_string(),
        }
    }

    /// Rewrites a type to its ground form under the current frame's
    /// substitution. A variable with no instantiation is an error.
    fn resolve_ty(&mut self, ty: TypeId, location: Location) -> Result<TypeId> {
        let ty = self.store.prune(ty);

        match self.store.get(ty).clone() {
            Type::Generic { .. } => self.lookup_generic(ty).ok_or_else(|| {
                CompileError::new(
                    format!(
                        "No instance of the generic type '{} found",
                        self.generic_display(ty)
                    ),
                    location,
                )
            }),

            Type::Unit | Type::Int | Type::Char | Type::Float | Type::Bool => Ok(ty),

            Type::Array(element) => {
                let element = self.resolve_ty(element, location)?;
                Ok(self.store.array(element))
            }

            Type::Function { args, result } => {
                let args = args
                    .iter()
                    .map(|&a| self.resolve_ty(a, location))
                    .collect::<Result<TypeList>>()?;
                let result = self.resolve_ty(result, location)?;
                Ok(self.store.function(args, result))
            }

            Type::Tuple(members) => {
                let members = members
                    .iter()
                    .map(|&m| self.resolve_ty(m, location))
                    .collect::<Result<TypeList>>()?;
                Ok(self.store.tuple(members))
            }

            Type::Instance { proto, args } => {
                let args = args
                    .iter()
                    .map(|&a| self.resolve_ty(a, location))
                    .collect::<Result<TypeList>>()?;
                Ok(self.store.instance(proto, args))
            }

            Type::ClosureContext { fields } => {
                // A captured context is opaque at the capturing layer; it
                // is not resolved through, which is also what breaks the
                // cycle a self-capturing function closes through its own
                // context type.
                let fields = fields
                    .iter()
                    .map(|f| {
                        let final_ty = self.store.final_type(f.ty);
                        if matches!(self.store.get(final_ty), Type::ClosureContext { .. }) {
                            return Ok(aike_kernel::ContextField { name: f.name, ty: final_ty });
                        }
                        Ok(aike_kernel::ContextField { name: f.name, ty: self.resolve_ty(f.ty, location)? })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.store.alloc(Type::ClosureContext { fields }))
            }
        }
    }

    /// Walks a declared (possibly generic) type against the concrete type
    /// of a reference site, recording a ground binding for every generic
    /// variable reached.
    fn bind_generics(
        &mut self,
        env: &mut GenericEnv,
        declared: TypeId,
        actual: TypeId,
        location: Location,
    ) -> Result<()> {
        let declared = self.store.prune(declared);

        match self.store.get(declared).clone() {
            Type::Generic { .. } => {
                if env.iter().any(|&(g, _)| g == declared) {
                    return Ok(());
                }
                let ground = self.resolve_ty(actual, location)?;
                env.push((declared, ground));
                Ok(())
            }

            Type::Array(d_element) => {
                let actual = self.store.prune(actual);
                if let Type::Array(a_element) = self.store.get(actual).clone() {
                    self.bind_generics(env, d_element, a_element, location)?;
                }
                Ok(())
            }

            Type::Function { args: d_args, result: d_result } => {
                let actual = self.store.prune(actual);
                if let Type::Function { args: a_args, result: a_result } =
                    self.store.get(actual).clone()
                {
                    self.bind_generics(env, d_result, a_result, location)?;
                    for (&d, &a) in d_args.iter().zip(a_args.iter()) {
                        self.bind_generics(env, d, a, location)?;
                    }
                }
                Ok(())
            }

            Type::Tuple(d_members) => {
                let actual = self.store.prune(actual);
                if let Type::Tuple(a_members) = self.store.get(actual).clone() {
                    for (&d, &a) in d_members.iter().zip(a_members.iter()) {
                        self.bind_generics(env, d, a, location)?;
                    }
                }
                Ok(())
            }

            Type::Instance { args: d_args, .. } => {
                let actual = self.store.prune(actual);
                if let Type::Instance { args: a_args, .. } = self.store.get(actual).clone() {
                    for (&d, &a) in d_args.iter().zip(a_args.iter()) {
                        self.bind_generics(env, d, a, location)?;
                    }
                }
                Ok(())
            }

            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Instantiation
    // ------------------------------------------------------------------

    /// Returns the instance of `target` specialised to the reference
    /// site's concrete type, emitting it on a cache miss.
    fn instantiate(
        &mut self,
        target: &BindingTarget,
        use_ty: TypeId,
        location: Location,
    ) -> Result<InstanceId> {
        let tkey = target_key(target);

        let def = self.definitions.get(&tkey).cloned().ok_or_else(|| {
            CompileError::new(
                format!(
                    "Variable {} has not been computed",
                    self.interner.resolve(target.name)
                ),
                location,
            )
        })?;

        let ground_use = self.resolve_ty(use_ty, location)?;

        let key = {
            let substitutions: Vec<TypeId> = def.env.iter().map(|&(_, ground)| ground).collect();
            let store: &TypeStore = self.store;
            let interner = self.interner;
            let mut no_generics = |var: TypeId| {
                Err(CompileError::new(
                    format!("No instance of the generic type '{} found", {
                        match store.get(var) {
                            Type::Generic { name: Some(name), .. } => {
                                interner.resolve(*name).to_string()
                            }
                            _ => "a".to_string(),
                        }
                    }),
                    location,
                ))
            };
            mangle_instance_key(store, interner, ground_use, &substitutions, &mut no_generics)?
        };

        if let Some(&id) = self.cache.get(&(tkey, key.clone())) {
            return Ok(id);
        }

        // Reserve the slot and publish the cache entry first; a recursive
        // reference inside the body must hit the cache.
        let id = InstanceId(self.instances.len() as u32);
        self.instances.push(None);
        self.cache.insert((tkey, key.clone()), id);

        let mut inst_env = def.env.clone();
        self.bind_generics(&mut inst_env, def.node.ty.get(), use_ty, location)?;

        log::trace!(
            "emitting instance {} of {}",
            key,
            self.interner.resolve(target.name)
        );

        let instance = match &def.node.kind {
            ExprKind::LetFunc { .. } => self.emit_function(def.node, inst_env, &key)?,
            ExprKind::ExternFunc { .. } => self.emit_extern(def.node, inst_env)?,
            ExprKind::RecordCtor { .. } => self.emit_record_ctor(def.node, inst_env, &key)?,
            ExprKind::UnionCtor { .. } => self.emit_union_ctor(def.node, inst_env, &key)?,
            _ => {
                return Err(CompileError::new(
                    "internal error: reference to a non-function definition",
                    location,
                ));
            }
        };

        self.instances[id.0 as usize] = Some(instance);
        Ok(id)
    }

    fn emit_function(
        &mut self,
        node: &'a Expr<'a>,
        env: GenericEnv,
        key: &str,
    ) -> Result<FuncInstance> {
        let ExprKind::LetFunc { target, context, args, body, .. } = &node.kind else {
            return Err(CompileError::new("internal error: expected a function", node.location));
        };

        self.frames.push(Frame { subst: env, ..Frame::default() });

        let mut params = Vec::new();
        for arg in args.iter() {
            let ty = self.resolve_ty(arg.ty.get(), node.location)?;
            let local = self.add_local(Some(arg.name), ty);
            self.frame_mut().local_of.insert(target_key(arg), local);
            params.push(local);
        }

        let layout = match context {
            Some(ctx) => {
                let ctx_ty = self.resolve_ty(ctx.ty.get(), node.location)?;
                match self.store.get(ctx_ty) {
                    Type::ClosureContext { fields } => {
                        Some(ContextLayout { fields: fields.clone() })
                    }
                    _ => None,
                }
            }
            None => None,
        };

        let body_tir = self.lower_expr(body)?;

        let funty = self.resolve_ty(node.ty.get(), node.location)?;
        let result = match self.store.get(funty) {
            Type::Function { result, .. } => *result,
            _ => self.store.unit(),
        };

        let frame = self.frames.pop().unwrap_or_default();

        Ok(FuncInstance {
            symbol: format!("{}..{}", self.interner.resolve(target.name), key),
            params,
            locals: frame.locals,
            context: layout,
            result,
            body: InstanceBody::Defined(body_tir),
        })
    }

    fn emit_extern(&mut self, node: &'a Expr<'a>, env: GenericEnv) -> Result<FuncInstance> {
        let ExprKind::ExternFunc { target, args } = &node.kind else {
            return Err(CompileError::new(
                "internal error: expected an extern function",
                node.location,
            ));
        };

        self.frames.push(Frame { subst: env, ..Frame::default() });

        let mut params = Vec::new();
        for arg in args.iter() {
            let ty = self.resolve_ty(arg.ty.get(), node.location)?;
            params.push(self.add_local(Some(arg.name), ty));
        }

        let funty = self.resolve_ty(node.ty.get(), node.location)?;
        let result = match self.store.get(funty) {
            Type::Function { result, .. } => *result,
            _ => self.store.unit(),
        };

        let frame = self.frames.pop().unwrap_or_default();

        Ok(FuncInstance {
            // Externs link against the runtime by their source name.
            symbol: self.interner.resolve(target.name).to_string(),
            params,
            locals: frame.locals,
            context: None,
            result,
            body: InstanceBody::Extern,
        })
    }

    fn emit_record_ctor(
        &mut self,
        node: &'a Expr<'a>,
        env: GenericEnv,
        key: &str,
    ) -> Result<FuncInstance> {
        let ExprKind::RecordCtor { target, args } = &node.kind else {
            return Err(CompileError::new("internal error: expected a constructor", node.location));
        };

        self.frames.push(Frame { subst: env, ..Frame::default() });

        let mut params = Vec::new();
        for arg in args.iter() {
            let ty = self.resolve_ty(arg.ty.get(), node.location)?;
            params.push(self.add_local(Some(arg.name), ty));
        }

        let funty = self.resolve_ty(node.ty.get(), node.location)?;
        let result = match self.store.get(funty) {
            Type::Function { result, .. } => *result,
            _ => self.store.unit(),
        };

        let fields = params.iter().map(|&p| Tir::ReadLocal(p)).collect();
        let frame = self.frames.pop().unwrap_or_default();

        Ok(FuncInstance {
            symbol: format!("{}..{}", self.interner.resolve(target.name), key),
            params,
            locals: frame.locals,
            context: None,
            result,
            body: InstanceBody::Defined(Tir::MakeRecord { ty: result, fields }),
        })
    }

    fn emit_union_ctor(
        &mut self,
        node: &'a Expr<'a>,
        env: GenericEnv,
        key: &str,
    ) -> Result<FuncInstance> {
        let ExprKind::UnionCtor { target, args, tag, payload } = &node.kind else {
            return Err(CompileError::new("internal error: expected a constructor", node.location));
        };

        self.frames.push(Frame { subst: env, ..Frame::default() });

        let mut params = Vec::new();
        for arg in args.iter() {
            let ty = self.resolve_ty(arg.ty.get(), node.location)?;
            params.push(self.add_local(Some(arg.name), ty));
        }

        let funty = self.resolve_ty(node.ty.get(), node.location)?;
        let result = match self.store.get(funty) {
            Type::Function { result, .. } => *result,
            _ => self.store.unit(),
        };

        // All single-argument variants are scalars; tuple and record
        // payloads are built explicitly.
        let payload_value = if params.is_empty() {
            None
        } else {
            let payload_ty = self.resolve_ty(*payload, node.location)?;
            let reads: Vec<Tir> = params.iter().map(|&p| Tir::ReadLocal(p)).collect();

            if matches!(self.store.get(payload_ty), Type::Instance { .. }) {
                Some(Box::new(Tir::MakeRecord { ty: payload_ty, fields: reads }))
            } else if params.len() > 1 {
                Some(Box::new(Tir::Tuple { ty: payload_ty, elements: reads }))
            } else {
                Some(Box::new(Tir::ReadLocal(params[0])))
            }
        };

        let frame = self.frames.pop().unwrap_or_default();

        Ok(FuncInstance {
            symbol: format!("{}..{}", self.interner.resolve(target.name), key),
            params,
            locals: frame.locals,
            context: None,
            result,
            body: InstanceBody::Defined(Tir::MakeUnion {
                ty: result,
                tag: *tag,
                payload: payload_value,
            }),
        })
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Registers a function definition and, if it captures, allocates its
    /// context record. Blocks call this for a whole run of adjacent
    /// function declarations before lowering any of them, which is what
    /// lets mutually recursive siblings store each other's contexts.
    fn predeclare_function(&mut self, node: &'a Expr<'a>, out: &mut Vec<Tir>) -> Result<()> {
        let ExprKind::LetFunc { target, context, .. } = &node.kind else {
            return Ok(());
        };

        let subst = self.frames.last().map(|f| f.subst.clone()).unwrap_or_default();
        self.definitions.insert(target_key(target), Definition { node, env: subst });

        if let Some(ctx) = context {
            if !self
                .frames
                .last()
                .is_some_and(|f| f.context_local_of.contains_key(&target_key(target)))
            {
                let ty = self.resolve_ty(ctx.ty.get(), node.location)?;
                let local = self.add_local(Some(target.name), ty);
                self.frame_mut().context_local_of.insert(target_key(target), local);
                out.push(Tir::AllocContext { local, ty });
            }
        }

        Ok(())
    }

    /// The value stored into one context field; `None` leaves the field
    /// null (a captured function that itself captured nothing).
    fn lower_capture(&mut self, capture: &Capture<'a>) -> Result<Option<Tir>> {
        match capture.binding {
            Binding::Function(f) => match &capture.init.kind {
                ExprKind::Binding(_) => {
                    let local = self
                        .frames
                        .last()
                        .and_then(|frame| frame.context_local_of.get(&target_key(f.target)))
                        .copied();
                    Ok(local.map(Tir::ReadLocal))
                }
                ExprKind::External { index, .. } => {
                    let ty = match f.context {
                        Some(ctx) => self.resolve_ty(ctx.ty.get(), capture.init.location)?,
                        None => self.store.unit(),
                    };
                    Ok(Some(Tir::ReadCaptured { index: *index, ty }))
                }
                _ => Ok(None),
            },
            _ => Ok(Some(self.lower_expr(capture.init)?)),
        }
    }

    fn lower_let_func(&mut self, node: &'a Expr<'a>) -> Result<Tir> {
        let ExprKind::LetFunc { target, context, captures, .. } = &node.kind else {
            return Err(CompileError::new("internal error: expected a function", node.location));
        };

        // Expression-position functions (anonymous ones in particular)
        // were not pre-declared by a block.
        let mut out = Vec::new();
        self.predeclare_function(node, &mut out)?;

        let ctx_local = self
            .frames
            .last()
            .and_then(|frame| frame.context_local_of.get(&target_key(target)))
            .copied();

        if context.is_some() {
            if let Some(ctx_local) = ctx_local {
                for (index, capture) in captures.iter().enumerate() {
                    if let Some(value) = self.lower_capture(capture)? {
                        out.push(Tir::StoreContextField {
                            context: Box::new(Tir::ReadLocal(ctx_local)),
                            index: index as u32,
                            value: Box::new(value),
                        });
                    }
                }
            }
        }

        let value = if target.name == Symbol::EMPTY {
            // An anonymous function is a value; instantiate it right away.
            let instance = self.instantiate(target, node.ty.get(), node.location)?;
            let env = match ctx_local {
                Some(local) => Env::Local(local),
                None => Env::None,
            };
            Tir::Function { instance, env }
        } else {
            Tir::Unit
        };

        if out.is_empty() {
            Ok(value)
        } else {
            out.push(value);
            Ok(Tir::Seq(out))
        }
    }

    fn function_value(
        &mut self,
        f: &'a aike_language::expr::FunctionBinding<'a>,
        use_ty: TypeId,
        location: Location,
    ) -> Result<Tir> {
        let instance = self.instantiate(f.target, use_ty, location)?;

        let env = if f.context.is_some() {
            match self
                .frames
                .last()
                .and_then(|frame| frame.context_local_of.get(&target_key(f.target)))
            {
                Some(&local) => Env::Local(local),
                None => Env::None,
            }
        } else {
            Env::None
        };

        Ok(Tir::Function { instance, env })
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn compile_case(
        &mut self,
        case: &'a MatchCase<'a>,
        path: Path,
        cont: Decision,
    ) -> Result<Decision> {
        match &case.kind {
            MatchCaseKind::Any { target: Some(target) } => {
                let local = self.ensure_local(target, case.location)?;
                Ok(Decision::Bind { path, local, then: Box::new(cont) })
            }
            MatchCaseKind::Any { target: None } => Ok(cont),

            MatchCaseKind::Value { binding } => {
                let local = self.local_for(binding.target(), case.location)?;
                Ok(Decision::Test { path, test: Test::Equals(local), then: Box::new(cont) })
            }

            MatchCaseKind::Bool(value) => {
                Ok(Decision::Test { path, test: Test::Bool(*value), then: Box::new(cont) })
            }
            MatchCaseKind::Int(value) => {
                Ok(Decision::Test { path, test: Test::Int(*value), then: Box::new(cont) })
            }
            MatchCaseKind::Char(value) => {
                Ok(Decision::Test { path, test: Test::Char(*value), then: Box::new(cont) })
            }

            MatchCaseKind::Array { elements } => {
                let mut cont = cont;
                for (i, element) in elements.iter().enumerate().rev() {
                    cont =
                        self.compile_case(element, path.child(Step::ArrayElement(i as u32)), cont)?;
                }
                Ok(Decision::Test {
                    path,
                    test: Test::ArrayLength(elements.len() as u32),
                    then: Box::new(cont),
                })
            }

            MatchCaseKind::Members { values, .. } => {
                let values = values.get();
                let mut cont = cont;
                for (i, value) in values.iter().enumerate().rev() {
                    cont = self.compile_case(value, path.child(Step::Field(i as u32)), cont)?;
                }
                Ok(cont)
            }

            MatchCaseKind::Union { tag, pattern } => {
                let inner = self.compile_case(pattern, path.child(Step::UnionPayload), cont)?;
                Ok(Decision::Test { path, test: Test::UnionTag(*tag), then: Box::new(inner) })
            }

            MatchCaseKind::Or { options, alt_bindings, sinks } => {
                // Alternation bindings funnel into the shared sinks.
                let mut sink_locals = Vec::new();
                for sink in sinks.iter() {
                    sink_locals.push(self.ensure_local(sink, case.location)?);
                }

                for alternative in alt_bindings.iter() {
                    for (target, &local) in alternative.iter().zip(sink_locals.iter()) {
                        self.frame_mut().local_of.insert(target_key(target), local);
                    }
                }

                let mut compiled = Vec::new();
                for option in options.iter() {
                    compiled.push(self.compile_case(option, path.clone(), cont.clone())?);
                }
                Ok(Decision::Alternative(compiled))
            }

            MatchCaseKind::If { pattern, condition } => {
                // Binds happen on the way in, so the guard sees them.
                let condition = self.lower_expr(condition)?;
                let cont = Decision::Guard { condition, then: Box::new(cont) };
                self.compile_case(pattern, path, cont)
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn lower_expr(&mut self, node: &'a Expr<'a>) -> Result<Tir> {
        let location = node.location;

        match &node.kind {
            ExprKind::Unit => Ok(Tir::Unit),
            ExprKind::Int(value) => Ok(Tir::Int(*value)),
            ExprKind::Char(value) => Ok(Tir::Char(*value)),
            ExprKind::Bool(value) => Ok(Tir::Bool(*value)),

            ExprKind::Array(elements) => {
                let ty = self.resolve_ty(node.ty.get(), location)?;
                let element = match self.store.get(ty) {
                    Type::Array(element) => *element,
                    _ => self.store.unit(),
                };
                let elements = elements
                    .iter()
                    .map(|&e| self.lower_expr(e))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Tir::Array { element, elements })
            }

            ExprKind::Tuple(elements) => {
                let ty = self.resolve_ty(node.ty.get(), location)?;
                let elements = elements
                    .iter()
                    .map(|&e| self.lower_expr(e))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Tir::Tuple { ty, elements })
            }

            ExprKind::Binding(binding) => match binding {
                Binding::Local(target) => Ok(Tir::ReadLocal(self.local_for(target, location)?)),
                Binding::Function(f) | Binding::UnitConstructor(f) => {
                    self.function_value(f, node.ty.get(), location)
                }
            },

            ExprKind::External { binding, index, .. } => match binding {
                Binding::Local(_) => {
                    let ty = self.resolve_ty(node.ty.get(), location)?;
                    Ok(Tir::ReadCaptured { index: *index, ty })
                }
                Binding::Function(f) | Binding::UnitConstructor(f) => {
                    let instance = self.instantiate(f.target, node.ty.get(), location)?;
                    Ok(Tir::Function { instance, env: Env::Captured(*index) })
                }
            },

            ExprKind::Unary { op, operand } => Ok(Tir::Unary {
                op: *op,
                operand: Box::new(self.lower_expr(operand)?),
            }),

            ExprKind::Binary { op, left, right } => Ok(Tir::Binary {
                op: *op,
                left: Box::new(self.lower_expr(left)?),
                right: Box::new(self.lower_expr(right)?),
            }),

            ExprKind::Assign { place, value } => Ok(Tir::Assign {
                place: Box::new(self.lower_expr(place)?),
                value: Box::new(self.lower_expr(value)?),
            }),

            ExprKind::Call { callee, args } => {
                let callee = self.lower_expr(callee)?;
                let args =
                    args.iter().map(|&a| self.lower_expr(a)).collect::<Result<Vec<_>>>()?;
                Ok(Tir::Call { callee: Box::new(callee), args })
            }

            ExprKind::Index { array, index } => Ok(Tir::Index {
                array: Box::new(self.lower_expr(array)?),
                index: Box::new(self.lower_expr(index)?),
            }),

            ExprKind::Slice { array, start, end } => Ok(Tir::Slice {
                array: Box::new(self.lower_expr(array)?),
                start: Box::new(self.lower_expr(start)?),
                end: end.map(|e| self.lower_expr(e).map(Box::new)).transpose()?,
            }),

            ExprKind::Member { aggregate, member } => {
                let final_ty = self.store.final_type(aggregate.ty.get());
                let index = match self.store.get(final_ty) {
                    Type::Instance { proto, .. } => match self.store.proto(*proto) {
                        Prototype::Record(record) => record.field_index(*member),
                        _ => None,
                    },
                    _ => None,
                };
                let index = index.ok_or_else(|| {
                    CompileError::new("Expected a record type", aggregate.location)
                })?;

                Ok(Tir::GetField {
                    value: Box::new(self.lower_expr(aggregate)?),
                    index: index as u32,
                })
            }

            ExprKind::LetVar { target, body } => {
                let value = self.lower_expr(body)?;
                let local = self.ensure_local(target, location)?;
                Ok(Tir::SetLocal { local, value: Box::new(value) })
            }

            ExprKind::LetVars { targets, body } => {
                let tuple_ty = self.resolve_ty(body.ty.get(), body.location)?;
                let value = self.lower_expr(body)?;
                let tmp = self.add_local(None, tuple_ty);

                let mut seq = vec![Tir::SetLocal { local: tmp, value: Box::new(value) }];
                for (i, target) in targets.iter().enumerate() {
                    if let Some(target) = target {
                        let local = self.ensure_local(target, location)?;
                        seq.push(Tir::SetLocal {
                            local,
                            value: Box::new(Tir::GetField {
                                value: Box::new(Tir::ReadLocal(tmp)),
                                index: i as u32,
                            }),
                        });
                    }
                }
                seq.push(Tir::Unit);

                Ok(Tir::Seq(seq))
            }

            ExprKind::LetFunc { .. } => self.lower_let_func(node),

            ExprKind::ExternFunc { target, .. } | ExprKind::RecordCtor { target, .. } => {
                let subst = self.frames.last().map(|f| f.subst.clone()).unwrap_or_default();
                self.definitions.insert(target_key(target), Definition { node, env: subst });
                Ok(Tir::Unit)
            }

            ExprKind::UnionCtor { target, .. } => {
                let subst = self.frames.last().map(|f| f.subst.clone()).unwrap_or_default();
                self.definitions.insert(target_key(target), Definition { node, env: subst });
                Ok(Tir::Unit)
            }

            ExprKind::UnionDef { ctors } => {
                for ctor in ctors.iter() {
                    self.lower_expr(ctor)?;
                }
                Ok(Tir::Unit)
            }

            ExprKind::If { cond, then_body, else_body } => Ok(Tir::If {
                cond: Box::new(self.lower_expr(cond)?),
                then_body: Box::new(self.lower_expr(then_body)?),
                else_body: Box::new(self.lower_expr(else_body)?),
            }),

            ExprKind::ForIn { target, array, body } => {
                let array = self.lower_expr(array)?;
                let var = self.ensure_local(target, location)?;
                let body = self.lower_expr(body)?;
                Ok(Tir::ForIn { var, array: Box::new(array), body: Box::new(body) })
            }

            ExprKind::ForInRange { target, start, end, body } => {
                let start = self.lower_expr(start)?;
                let end = self.lower_expr(end)?;
                let var = self.ensure_local(target, location)?;
                let body = self.lower_expr(body)?;
                Ok(Tir::ForRange {
                    var,
                    start: Box::new(start),
                    end: Box::new(end),
                    body: Box::new(body),
                })
            }

            ExprKind::While { cond, body } => Ok(Tir::While {
                cond: Box::new(self.lower_expr(cond)?),
                body: Box::new(self.lower_expr(body)?),
            }),

            ExprKind::Match { scrutinee, cases, bodies } => {
                let scrutinee_ty = self.resolve_ty(scrutinee.ty.get(), scrutinee.location)?;
                let scrutinee_tir = self.lower_expr(scrutinee)?;
                let value = self.add_local(None, scrutinee_ty);

                let mut arms = Vec::new();
                for (case, body) in cases.iter().zip(bodies.iter()) {
                    let pattern = self.compile_case(case, Path::default(), Decision::Success)?;
                    let body = self.lower_expr(body)?;
                    arms.push(TirArm { pattern, body });
                }

                let ty = self.resolve_ty(node.ty.get(), location)?;
                Ok(Tir::Match { value, scrutinee: Box::new(scrutinee_tir), ty, arms })
            }

            ExprKind::Block(exprs) => {
                let mut out = Vec::new();
                let mut i = 0;

                while i < exprs.len() {
                    if matches!(exprs[i].kind, ExprKind::LetFunc { .. }) {
                        let mut count = 0;
                        while i + count < exprs.len()
                            && matches!(exprs[i + count].kind, ExprKind::LetFunc { .. })
                        {
                            self.predeclare_function(exprs[i + count], &mut out)?;
                            count += 1;
                        }
                        for j in 0..count {
                            out.push(self.lower_expr(exprs[i + j])?);
                        }
                        i += count;
                    } else {
                        out.push(self.lower_expr(exprs[i])?);
                        i += 1;
                    }
                }

                match out.len() {
                    0 => Ok(Tir::Unit),
                    1 => Ok(out.pop().unwrap_or(Tir::Unit)),
                    _ => Ok(Tir::Seq(out)),
                }
            }
        }
    }
}
