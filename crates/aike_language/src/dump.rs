//! Typed-AST pretty printer.
//!
//! Renders a resolved (and usually checked) expression tree as an indented
//! outline with finalised types, one node per line. The sink is an
//! explicit `fmt::Write`, so tests can render into a `String` and drivers
//! can route the output wherever they like.

use crate::ast::{SynBinaryOp, SynUnaryOp};
use crate::expr::{Expr, ExprKind, MatchCase, MatchCaseKind};
use aike_base::Interner;
use aike_kernel::{type_name, PrettyContext, TypeStore};
use std::fmt::{self, Write};

pub struct Dumper<'d> {
    store: &'d TypeStore,
    interner: &'d Interner,
    pretty: PrettyContext,
}

/// Renders `expr` into `out`.
pub fn dump(
    expr: &Expr<'_>,
    store: &TypeStore,
    interner: &Interner,
    out: &mut dyn Write,
) -> fmt::Result {
    let mut dumper = Dumper { store, interner, pretty: PrettyContext::new() };
    dumper.dump_expr(expr, 0, out)
}

/// Convenience wrapper producing a `String`.
pub fn dump_to_string(expr: &Expr<'_>, store: &TypeStore, interner: &Interner) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = dump(expr, store, interner, &mut out);
    out
}

fn binary_op_name(op: SynBinaryOp) -> &'static str {
    match op {
        SynBinaryOp::Add => "add",
        SynBinaryOp::Subtract => "sub",
        SynBinaryOp::Multiply => "mul",
        SynBinaryOp::Divide => "div",
        SynBinaryOp::Less => "lt",
        SynBinaryOp::LessEqual => "le",
        SynBinaryOp::Greater => "gt",
        SynBinaryOp::GreaterEqual => "ge",
        SynBinaryOp::Equal => "eq",
        SynBinaryOp::NotEqual => "ne",
        SynBinaryOp::And => "and",
        SynBinaryOp::Or => "or",
        SynBinaryOp::Assign => "assign",
    }
}

impl<'d> Dumper<'d> {
    fn ty(&mut self, expr: &Expr<'_>) -> String {
        type_name(self.store, self.interner, &mut self.pretty, expr.ty.get())
    }

    fn name(&self, sym: aike_base::Symbol) -> &str {
        let name = self.interner.resolve(sym);
        if name.is_empty() {
            "<anonymous>"
        } else {
            name
        }
    }

    fn line(
        &mut self,
        expr: &Expr<'_>,
        indent: usize,
        out: &mut dyn Write,
        head: &str,
    ) -> fmt::Result {
        let ty = self.ty(expr);
        writeln!(out, "{:indent$}{head}: {ty}", "", indent = indent * 2)
    }

    fn dump_expr(&mut self, expr: &Expr<'_>, indent: usize, out: &mut dyn Write) -> fmt::Result {
        match &expr.kind {
            ExprKind::Unit => self.line(expr, indent, out, "unit"),
            ExprKind::Int(value) => self.line(expr, indent, out, &format!("int {value}")),
            ExprKind::Char(value) => {
                self.line(expr, indent, out, &format!("char '{}'", *value as char))
            }
            ExprKind::Bool(value) => self.line(expr, indent, out, &format!("bool {value}")),

            ExprKind::Array(elements) => {
                self.line(expr, indent, out, "array")?;
                for element in elements.iter() {
                    self.dump_expr(element, indent + 1, out)?;
                }
                Ok(())
            }

            ExprKind::Tuple(elements) => {
                self.line(expr, indent, out, "tuple")?;
                for element in elements.iter() {
                    self.dump_expr(element, indent + 1, out)?;
                }
                Ok(())
            }

            ExprKind::Binding(binding) => {
                let head = format!("binding {}", self.name(binding.target().name));
                self.line(expr, indent, out, &head)
            }

            ExprKind::External { name, index, .. } => {
                let head = format!("external {} [context #{index}]", self.name(*name));
                self.line(expr, indent, out, &head)
            }

            ExprKind::Unary { op, operand } => {
                let name = match op {
                    SynUnaryOp::Plus => "plus",
                    SynUnaryOp::Minus => "minus",
                    SynUnaryOp::Not => "not",
                };
                self.line(expr, indent, out, &format!("unary {name}"))?;
                self.dump_expr(operand, indent + 1, out)
            }

            ExprKind::Binary { op, left, right } => {
                self.line(expr, indent, out, &format!("binary {}", binary_op_name(*op)))?;
                self.dump_expr(left, indent + 1, out)?;
                self.dump_expr(right, indent + 1, out)
            }

            ExprKind::Call { callee, args } => {
                self.line(expr, indent, out, "call")?;
                self.dump_expr(callee, indent + 1, out)?;
                for arg in args.iter() {
                    self.dump_expr(arg, indent + 1, out)?;
                }
                Ok(())
            }

            ExprKind::Index { array, index } => {
                self.line(expr, indent, out, "index")?;
                self.dump_expr(array, indent + 1, out)?;
                self.dump_expr(index, indent + 1, out)
            }

            ExprKind::Slice { array, start, end } => {
                self.line(expr, indent, out, "slice")?;
                self.dump_expr(array, indent + 1, out)?;
                self.dump_expr(start, indent + 1, out)?;
                end.map_or(Ok(()), |e| self.dump_expr(e, indent + 1, out))
            }

            ExprKind::Member { aggregate, member } => {
                let head = format!("member .{}", self.name(*member));
                self.line(expr, indent, out, &head)?;
                self.dump_expr(aggregate, indent + 1, out)
            }

            ExprKind::Assign { place, value } => {
                self.line(expr, indent, out, "assign")?;
                self.dump_expr(place, indent + 1, out)?;
                self.dump_expr(value, indent + 1, out)
            }

            ExprKind::LetVar { target, body } => {
                let head = format!("let {}", self.name(target.name));
                self.line(expr, indent, out, &head)?;
                self.dump_expr(body, indent + 1, out)
            }

            ExprKind::LetVars { targets, body } => {
                let names: Vec<&str> = targets
                    .iter()
                    .map(|t| t.map_or("_", |t| self.interner.resolve(t.name)))
                    .collect();
                let head = format!("let ({})", names.join(", "));
                self.line(expr, indent, out, &head)?;
                self.dump_expr(body, indent + 1, out)
            }

            ExprKind::LetFunc { target, context, args, body, captures } => {
                let head = format!("letfunc {}", self.name(target.name));
                self.line(expr, indent, out, &head)?;

                for arg in args.iter() {
                    let ty = type_name(self.store, self.interner, &mut self.pretty, arg.ty.get());
                    writeln!(
                        out,
                        "{:indent$}arg {}: {ty}",
                        "",
                        self.name(arg.name),
                        indent = (indent + 1) * 2
                    )?;
                }

                if context.is_some() {
                    for capture in captures.iter() {
                        writeln!(
                            out,
                            "{:indent$}captures {}",
                            "",
                            self.name(capture.binding.target().name),
                            indent = (indent + 1) * 2
                        )?;
                    }
                }

                self.dump_expr(body, indent + 1, out)
            }

            ExprKind::ExternFunc { target, .. } => {
                let head = format!("extern {}", self.name(target.name));
                self.line(expr, indent, out, &head)
            }

            ExprKind::RecordCtor { target, .. } => {
                let head = format!("record constructor {}", self.name(target.name));
                self.line(expr, indent, out, &head)
            }

            ExprKind::UnionCtor { target, tag, .. } => {
                let head = format!("union constructor {} [tag {tag}]", self.name(target.name));
                self.line(expr, indent, out, &head)
            }

            ExprKind::UnionDef { ctors } => {
                self.line(expr, indent, out, "union definition")?;
                for ctor in ctors.iter() {
                    self.dump_expr(ctor, indent + 1, out)?;
                }
                Ok(())
            }

            ExprKind::If { cond, then_body, else_body } => {
                self.line(expr, indent, out, "if")?;
                self.dump_expr(cond, indent + 1, out)?;
                self.dump_expr(then_body, indent + 1, out)?;
                self.dump_expr(else_body, indent + 1, out)
            }

            ExprKind::ForIn { target, array, body } => {
                let head = format!("for {}", self.name(target.name));
                self.line(expr, indent, out, &head)?;
                self.dump_expr(array, indent + 1, out)?;
                self.dump_expr(body, indent + 1, out)
            }

            ExprKind::ForInRange { target, start, end, body } => {
                let head = format!("for {} in range", self.name(target.name));
                self.line(expr, indent, out, &head)?;
                self.dump_expr(start, indent + 1, out)?;
                self.dump_expr(end, indent + 1, out)?;
                self.dump_expr(body, indent + 1, out)
            }

            ExprKind::While { cond, body } => {
                self.line(expr, indent, out, "while")?;
                self.dump_expr(cond, indent + 1, out)?;
                self.dump_expr(body, indent + 1, out)
            }

            ExprKind::Match { scrutinee, cases, bodies } => {
                self.line(expr, indent, out, "match")?;
                self.dump_expr(scrutinee, indent + 1, out)?;
                for (case, body) in cases.iter().zip(bodies.iter()) {
                    self.dump_case(case, indent + 1, out)?;
                    self.dump_expr(body, indent + 2, out)?;
                }
                Ok(())
            }

            ExprKind::Block(exprs) => {
                self.line(expr, indent, out, "block")?;
                for inner in exprs.iter() {
                    self.dump_expr(inner, indent + 1, out)?;
                }
                Ok(())
            }
        }
    }

    fn dump_case(&mut self, case: &MatchCase<'_>, indent: usize, out: &mut dyn Write) -> fmt::Result {
        let head = match &case.kind {
            MatchCaseKind::Any { target: Some(target) } => {
                format!("case bind {}", self.name(target.name))
            }
            MatchCaseKind::Any { target: None } => "case _".to_string(),
            MatchCaseKind::Value { binding } => {
                format!("case == {}", self.name(binding.target().name))
            }
            MatchCaseKind::Bool(value) => format!("case {value}"),
            MatchCaseKind::Int(value) => format!("case {value}"),
            MatchCaseKind::Char(value) => format!("case '{}'", *value as char),
            MatchCaseKind::Array { .. } => "case array".to_string(),
            MatchCaseKind::Members { .. } => "case members".to_string(),
            MatchCaseKind::Union { tag, .. } => format!("case union [tag {tag}]"),
            MatchCaseKind::Or { .. } => "case or".to_string(),
            MatchCaseKind::If { .. } => "case guarded".to_string(),
        };

        let ty = type_name(self.store, self.interner, &mut self.pretty, case.ty.get());
        writeln!(out, "{:indent$}{head}: {ty}", "", indent = indent * 2)?;

        match &case.kind {
            MatchCaseKind::Array { elements } => {
                for element in elements.iter() {
                    self.dump_case(element, indent + 1, out)?;
                }
            }
            MatchCaseKind::Members { values, .. } => {
                for value in values.get().iter() {
                    self.dump_case(value, indent + 1, out)?;
                }
            }
            MatchCaseKind::Union { pattern, .. } => self.dump_case(pattern, indent + 1, out)?,
            MatchCaseKind::Or { options, .. } => {
                for option in options.iter() {
                    self.dump_case(option, indent + 1, out)?;
                }
            }
            MatchCaseKind::If { pattern, .. } => self.dump_case(pattern, indent + 1, out)?,
            _ => {}
        }

        Ok(())
    }
}
