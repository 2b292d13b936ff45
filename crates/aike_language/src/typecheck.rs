//! Bottom-up type inference over the typed AST.
//!
//! A single pass walks every expression, unifying the constraints of each
//! syntactic form and finalising node types in place. Function references
//! are freshened against the ambient nongeneric set (the enclosing
//! function's parameter and return types), which is what realises
//! let-polymorphism without a separate scheme layer.
//!
//! After inference the match analysis runs over every `match` expression;
//! a redundant arm or a non-exhaustive match is an error (see
//! [`crate::matching`]).

use crate::arena_ctx::ExprArenas;
use crate::ast::{SynBinaryOp, SynUnaryOp};
use crate::expr::{Binding, Expr, ExprKind, MatchCase, MatchCaseKind};
use crate::matching;
use aike_base::{CompileError, Interner, Location, Result};
use aike_kernel::{type_name, PrettyContext, Prototype, RecordProto, Type, TypeId, TypeList, TypeStore};

pub struct TypeChecker<'a, 'i> {
    arenas: ExprArenas<'a>,
    store: &'i mut TypeStore,
    interner: &'i Interner,
    nongen: Vec<TypeId>,
}

/// Infers and finalises the type of the whole unit, then checks every
/// match for redundancy and exhaustiveness.
pub fn typecheck<'a>(
    root: &'a Expr<'a>,
    arenas: ExprArenas<'a>,
    store: &mut TypeStore,
    interner: &Interner,
) -> Result<TypeId> {
    let mut checker = TypeChecker { arenas, store: &mut *store, interner, nongen: Vec::new() };
    let ty = checker.analyze(root)?;
    debug_assert!(checker.nongen.is_empty());

    matching::check_matches(root, store)?;

    Ok(ty)
}

impl<'a, 'i> TypeChecker<'a, 'i> {
    fn must_unify(&mut self, actual: TypeId, expected: TypeId, location: Location) -> Result<()> {
        if self.store.unify(actual, expected) {
            return Ok(());
        }

        let mut ctx = PrettyContext::new();
        let expected = type_name(self.store, self.interner, &mut ctx, expected);
        let actual = type_name(self.store, self.interner, &mut ctx, actual);

        Err(CompileError::new(
            format!("Type mismatch. Expecting a\n    {expected}\nbut given a\n    {actual}"),
            location,
        ))
    }

    fn pretty(&self, ty: TypeId) -> String {
        let mut ctx = PrettyContext::new();
        type_name(self.store, self.interner, &mut ctx, ty)
    }

    /// A function reference is freshened; a local is used as-is.
    fn analyze_binding(&mut self, binding: Binding<'a>) -> TypeId {
        match binding {
            Binding::Local(target) => target.ty.get(),
            Binding::Function(f) | Binding::UnitConstructor(f) => {
                self.store.freshen(f.target.ty.get(), &self.nongen)
            }
        }
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn analyze_case(&mut self, case: &'a MatchCase<'a>) -> Result<TypeId> {
        match &case.kind {
            MatchCaseKind::Any { .. }
            | MatchCaseKind::Bool(_)
            | MatchCaseKind::Int(_)
            | MatchCaseKind::Char(_) => Ok(case.ty.get()),

            MatchCaseKind::Value { binding } => {
                let bound = self.analyze_binding(*binding);
                self.must_unify(case.ty.get(), bound, case.location)?;
                Ok(case.ty.get())
            }

            MatchCaseKind::Array { elements } => {
                if let Some((first, rest)) = elements.split_first() {
                    let t0 = self.analyze_case(first)?;
                    for element in rest {
                        let ti = self.analyze_case(element)?;
                        self.must_unify(ti, t0, element.location)?;
                    }
                    let expected = self.store.array(t0);
                    self.must_unify(case.ty.get(), expected, case.location)?;
                } else {
                    let element = self.store.fresh_var();
                    let expected = self.store.array(element);
                    self.must_unify(case.ty.get(), expected, case.location)?;
                }
                Ok(case.ty.get())
            }

            MatchCaseKind::Members { values, names } => {
                self.analyze_members(case, values, names)?;
                Ok(case.ty.get())
            }

            MatchCaseKind::Union { tag, pattern } => {
                let inst = self.store.final_type(case.ty.get());
                let payload_decl = match self.store.get(inst) {
                    Type::Instance { proto, .. } => match self.store.proto(*proto) {
                        Prototype::Union(u) => u.variants[*tag as usize].1,
                        _ => {
                            return Err(CompileError::new(
                                "Expected a union type",
                                case.location,
                            ))
                        }
                    },
                    _ => return Err(CompileError::new("Expected a union type", case.location)),
                };

                let payload = self.store.member_type(inst, payload_decl).ok_or_else(|| {
                    CompileError::new("Expected a union type", case.location)
                })?;

                // Unify before analysing: member-name resolution inside the
                // payload needs to see the record type.
                self.must_unify(pattern.ty.get(), payload, case.location)?;
                self.analyze_case(pattern)?;

                Ok(case.ty.get())
            }

            MatchCaseKind::Or { options, alt_bindings, sinks } => {
                for option in options.iter() {
                    let ti = self.analyze_case(option)?;
                    self.must_unify(ti, case.ty.get(), option.location)?;
                }

                for (i, sink) in sinks.iter().enumerate() {
                    for alternative in alt_bindings.iter() {
                        self.must_unify(alternative[i].ty.get(), sink.ty.get(), case.location)?;
                    }
                }

                Ok(case.ty.get())
            }

            MatchCaseKind::If { pattern, condition } => {
                let matched = self.analyze_case(pattern)?;
                let cond = self.analyze(condition)?;
                self.must_unify(cond, self.store.bool_(), condition.location)?;
                case.ty.set(matched);
                Ok(matched)
            }
        }
    }

    /// Tuple or record member patterns. Named record patterns are rewritten
    /// to positional ones here, with omitted members filled by wildcards.
    fn analyze_members(
        &mut self,
        case: &'a MatchCase<'a>,
        values: &std::cell::Cell<&'a [&'a MatchCase<'a>]>,
        names: &std::cell::Cell<&'a [aike_base::Symbol]>,
    ) -> Result<()> {
        let final_ty = self.store.final_type(case.ty.get());

        if let Type::Instance { proto, .. } = self.store.get(final_ty) {
            if let Prototype::Record(record) = self.store.proto(*proto) {
                let record: RecordProto = record.clone();

                if !names.get().is_empty() {
                    let mut slots: Vec<Option<&'a MatchCase<'a>>> =
                        vec![None; record.fields.len()];

                    for (&name, &value) in names.get().iter().zip(values.get().iter()) {
                        let index = record.field_index(name).ok_or_else(|| {
                            CompileError::new(
                                format!(
                                    "Type {} doesn't have a member named '{}'",
                                    self.interner.resolve(record.name),
                                    self.interner.resolve(name)
                                ),
                                case.location,
                            )
                        })?;

                        if slots[index].is_some() {
                            return Err(CompileError::new(
                                format!(
                                    "Member '{}' match is already specified",
                                    self.interner.resolve(name)
                                ),
                                case.location,
                            ));
                        }
                        slots[index] = Some(value);
                    }

                    let filled: Vec<&'a MatchCase<'a>> = slots
                        .into_iter()
                        .map(|slot| {
                            slot.unwrap_or_else(|| {
                                let ty = self.store.fresh_var();
                                self.arenas.case(MatchCase::new(
                                    ty,
                                    case.location,
                                    MatchCaseKind::Any { target: None },
                                ))
                            })
                        })
                        .collect();

                    values.set(self.arenas.case_list(filled));
                    names.set(&[]);
                }

                if values.get().len() != record.fields.len() {
                    return Err(CompileError::new(
                        format!(
                            "Type has {} members, but {} are specified",
                            record.fields.len(),
                            values.get().len()
                        ),
                        case.location,
                    ));
                }

                for (value, &(_, field_ty)) in values.get().iter().zip(record.fields.iter()) {
                    let vty = self.analyze_case(value)?;
                    let expected =
                        self.store.member_type(final_ty, field_ty).ok_or_else(|| {
                            CompileError::new("Expected a record type", case.location)
                        })?;
                    self.must_unify(vty, expected, value.location)?;
                }

                return Ok(());
            }
        }

        if let Type::Tuple(members) = self.store.get(final_ty) {
            let members: TypeList = members.clone();

            if !names.get().is_empty() {
                return Err(CompileError::new("Type has no named members", case.location));
            }
            if values.get().len() != members.len() {
                return Err(CompileError::new(
                    format!(
                        "Type has {} member(s), but {} is (are) specified",
                        members.len(),
                        values.get().len()
                    ),
                    case.location,
                ));
            }

            for (value, &member_ty) in values.get().iter().zip(members.iter()) {
                let vty = self.analyze_case(value)?;
                self.must_unify(vty, member_ty, value.location)?;
            }

            return Ok(());
        }

        // A scalar: at most a single positional sub-pattern that matches
        // the value itself.
        if !names.get().is_empty() || values.get().len() > 1 {
            return Err(CompileError::new(
                format!("Type {} has no members", self.pretty(final_ty)),
                case.location,
            ));
        }

        if let Some(&value) = values.get().first() {
            let vty = self.analyze_case(value)?;
            self.must_unify(vty, final_ty, value.location)?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn analyze(&mut self, node: &'a Expr<'a>) -> Result<TypeId> {
        let ty = self.analyze_kind(node)?;
        node.ty.set(ty);
        Ok(ty)
    }

    fn analyze_kind(&mut self, node: &'a Expr<'a>) -> Result<TypeId> {
        match &node.kind {
            ExprKind::Unit
            | ExprKind::Int(_)
            | ExprKind::Char(_)
            | ExprKind::Bool(_)
            | ExprKind::ExternFunc { .. }
            | ExprKind::RecordCtor { .. }
            | ExprKind::UnionCtor { .. }
            | ExprKind::UnionDef { .. } => Ok(node.ty.get()),

            ExprKind::Array(elements) => {
                if let Some((first, rest)) = elements.split_first() {
                    let t0 = self.analyze(first)?;
                    for element in rest {
                        let ti = self.analyze(element)?;
                        self.must_unify(ti, t0, element.location)?;
                    }
                    let expected = self.store.array(t0);
                    self.must_unify(node.ty.get(), expected, node.location)?;
                } else {
                    let element = self.store.fresh_var();
                    let expected = self.store.array(element);
                    self.must_unify(node.ty.get(), expected, node.location)?;
                }
                Ok(node.ty.get())
            }

            ExprKind::Tuple(elements) => {
                let mut members = TypeList::new();
                for element in elements.iter() {
                    members.push(self.analyze(element)?);
                }
                let expected = self.store.tuple(members);
                self.must_unify(node.ty.get(), expected, node.location)?;
                Ok(node.ty.get())
            }

            ExprKind::Binding(binding) => Ok(self.analyze_binding(*binding)),
            ExprKind::External { binding, .. } => Ok(self.analyze_binding(*binding)),

            ExprKind::Unary { op, operand } => {
                let operand_ty = self.analyze(operand)?;
                match op {
                    SynUnaryOp::Plus | SynUnaryOp::Minus => {
                        self.must_unify(operand_ty, self.store.int(), operand.location)?;
                        Ok(self.store.int())
                    }
                    SynUnaryOp::Not => {
                        self.must_unify(operand_ty, self.store.bool_(), operand.location)?;
                        Ok(self.store.bool_())
                    }
                }
            }

            ExprKind::Binary { op, left, right } => {
                let tl = self.analyze(left)?;
                let tr = self.analyze(right)?;

                match op {
                    SynBinaryOp::Add
                    | SynBinaryOp::Subtract
                    | SynBinaryOp::Multiply
                    | SynBinaryOp::Divide => {
                        self.must_unify(tl, self.store.int(), left.location)?;
                        self.must_unify(tr, self.store.int(), right.location)?;
                        Ok(self.store.int())
                    }

                    SynBinaryOp::Less
                    | SynBinaryOp::LessEqual
                    | SynBinaryOp::Greater
                    | SynBinaryOp::GreaterEqual => {
                        self.must_unify(tl, self.store.int(), left.location)?;
                        self.must_unify(tr, self.store.int(), right.location)?;
                        Ok(self.store.bool_())
                    }

                    SynBinaryOp::Equal | SynBinaryOp::NotEqual => {
                        self.must_unify(tr, tl, right.location)?;
                        Ok(self.store.bool_())
                    }

                    SynBinaryOp::And | SynBinaryOp::Or => {
                        self.must_unify(tl, self.store.bool_(), left.location)?;
                        self.must_unify(tr, self.store.bool_(), right.location)?;
                        Ok(self.store.bool_())
                    }

                    SynBinaryOp::Assign => {
                        unreachable!("':=' resolves to ExprKind::Assign")
                    }
                }
            }

            ExprKind::Assign { place, value } => {
                let place_ty = self.analyze(place)?;
                let value_ty = self.analyze(value)?;
                self.must_unify(value_ty, place_ty, value.location)?;
                Ok(self.store.unit())
            }

            ExprKind::Call { callee, args } => {
                let te = self.analyze(callee)?;

                let mut arg_types = TypeList::new();
                for arg in args.iter() {
                    arg_types.push(self.analyze(arg)?);
                }

                // The split exists for error quality: a known function type
                // reports per-argument mismatches and a precise arity error.
                match self.store.get(self.store.final_type(te)).clone() {
                    Type::Function { args: expected, result } => {
                        if expected.len() != arg_types.len() {
                            return Err(CompileError::new(
                                format!(
                                    "Expected {} arguments but given {}",
                                    expected.len(),
                                    arg_types.len()
                                ),
                                node.location,
                            ));
                        }

                        for ((actual, &formal), arg) in
                            arg_types.iter().zip(expected.iter()).zip(args.iter())
                        {
                            self.must_unify(*actual, formal, arg.location)?;
                        }

                        Ok(result)
                    }

                    Type::Generic { .. } => {
                        let result = self.store.fresh_var();
                        let expected = self.store.function(arg_types, result);
                        self.must_unify(te, expected, callee.location)?;
                        Ok(result)
                    }

                    _ => Err(CompileError::new(
                        format!("Cannot call a value of type {}", self.pretty(te)),
                        callee.location,
                    )),
                }
            }

            ExprKind::Index { array, index } => {
                let ta = self.analyze(array)?;
                let ti = self.analyze(index)?;

                let element = self.store.fresh_var();
                let expected = self.store.array(element);
                self.must_unify(ta, expected, array.location)?;
                self.must_unify(ti, self.store.int(), index.location)?;

                Ok(element)
            }

            ExprKind::Slice { array, start, end } => {
                let ta = self.analyze(array)?;
                let ts = self.analyze(start)?;

                let element = self.store.fresh_var();
                let expected = self.store.array(element);
                self.must_unify(ta, expected, array.location)?;
                self.must_unify(ts, self.store.int(), start.location)?;

                if let Some(end) = end {
                    let te = self.analyze(end)?;
                    self.must_unify(te, self.store.int(), end.location)?;
                }

                Ok(ta)
            }

            ExprKind::Member { aggregate, member } => {
                let ta = self.analyze(aggregate)?;
                let final_ty = self.store.final_type(ta);

                if let Type::Instance { proto, .. } = self.store.get(final_ty) {
                    if let Prototype::Record(record) = self.store.proto(*proto) {
                        let index = record.field_index(*member).ok_or_else(|| {
                            CompileError::new(
                                format!(
                                    "Type {} doesn't have a member named '{}'",
                                    self.interner.resolve(record.name),
                                    self.interner.resolve(*member)
                                ),
                                node.location,
                            )
                        })?;

                        let field_ty = record.fields[index].1;
                        return self.store.member_type(final_ty, field_ty).ok_or_else(|| {
                            CompileError::new("Expected a record type", aggregate.location)
                        });
                    }
                }

                Err(CompileError::new("Expected a record type", aggregate.location))
            }

            ExprKind::LetVar { target, body } => {
                let tb = self.analyze(body)?;
                self.must_unify(tb, target.ty.get(), body.location)?;
                Ok(node.ty.get())
            }

            ExprKind::LetVars { targets, body } => {
                let tb = self.analyze(body)?;

                let members: TypeList = targets
                    .iter()
                    .map(|target| match target {
                        Some(target) => target.ty.get(),
                        None => self.store.fresh_var(),
                    })
                    .collect();
                let expected = self.store.tuple(members);
                self.must_unify(tb, expected, body.location)?;

                Ok(node.ty.get())
            }

            ExprKind::LetFunc { body, .. } => {
                let funty = node.ty.get();
                let (arg_types, result) =
                    match self.store.get(self.store.final_type(funty)).clone() {
                        Type::Function { args, result } => (args, result),
                        _ => unreachable!("function bindings carry function types"),
                    };

                // Parameters and the declared result are nongeneric while
                // the body is checked.
                let nongen_mark = self.nongen.len();
                self.nongen.extend(arg_types.iter().copied());
                self.nongen.push(result);

                let tb = self.analyze(body)?;

                self.nongen.truncate(nongen_mark);

                self.must_unify(tb, result, body.location)?;

                Ok(funty)
            }

            ExprKind::If { cond, then_body, else_body } => {
                let tc = self.analyze(cond)?;
                let tt = self.analyze(then_body)?;
                let te = self.analyze(else_body)?;

                self.must_unify(tc, self.store.bool_(), cond.location)?;

                // A missing else means the then-branch must be unit; the
                // message points at the then-branch, not the absent else.
                if matches!(else_body.kind, ExprKind::Unit) {
                    self.must_unify(tt, self.store.unit(), then_body.location)?;
                } else {
                    self.must_unify(te, tt, else_body.location)?;
                }

                Ok(tt)
            }

            ExprKind::ForIn { target, array, body } => {
                let ta = self.analyze(array)?;
                let expected = self.store.array(target.ty.get());
                self.must_unify(ta, expected, array.location)?;

                let tb = self.analyze(body)?;
                self.must_unify(tb, self.store.unit(), body.location)?;

                Ok(self.store.unit())
            }

            ExprKind::ForInRange { target, start, end, body } => {
                let ts = self.analyze(start)?;
                let te = self.analyze(end)?;

                self.must_unify(target.ty.get(), self.store.int(), node.location)?;
                self.must_unify(ts, self.store.int(), start.location)?;
                self.must_unify(te, self.store.int(), end.location)?;

                let tb = self.analyze(body)?;
                self.must_unify(tb, self.store.unit(), body.location)?;

                Ok(self.store.unit())
            }

            ExprKind::While { cond, body } => {
                let tc = self.analyze(cond)?;
                self.must_unify(tc, self.store.bool_(), cond.location)?;

                let tb = self.analyze(body)?;
                self.must_unify(tb, self.store.unit(), body.location)?;

                Ok(self.store.unit())
            }

            ExprKind::Match { scrutinee, cases, bodies } => {
                let tv = self.analyze(scrutinee)?;

                let mut result = None;
                for (case, body) in cases.iter().zip(bodies.iter()) {
                    let tc = self.analyze_case(case)?;
                    self.must_unify(tc, tv, case.location)?;

                    let ti = self.analyze(body)?;
                    match result {
                        None => result = Some(ti),
                        Some(t0) => self.must_unify(ti, t0, body.location)?,
                    }
                }

                Ok(result.unwrap_or_else(|| self.store.unit()))
            }

            ExprKind::Block(exprs) => {
                let Some((last, interior)) = exprs.split_last() else {
                    return Ok(self.store.unit());
                };

                for expr in interior {
                    let ti = self.analyze(expr)?;
                    if !expr.is_declaration() {
                        self.must_unify(ti, self.store.unit(), expr.location)?;
                    }
                }

                self.analyze(last)
            }
        }
    }
}
