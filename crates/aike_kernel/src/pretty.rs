//! Human-readable type formatting with stable variable naming.
//!
//! Diagnostics print both sides of a failed unification, so the same
//! variable must receive the same display name across several calls. A
//! [`PrettyContext`] remembers the assignment: named variables keep their
//! declared name, anonymous variables are numbered `'a`, `'b`, … in first
//! appearance order, skipping names the user already took.

use crate::types::{Type, TypeId, TypeStore};
use aike_base::Interner;
use std::collections::{HashMap, HashSet};

/// Remembers display names chosen for type variables.
#[derive(Default)]
pub struct PrettyContext {
    assigned: HashMap<TypeId, String>,
    used: HashSet<String>,
    next_index: u32,
}

impl PrettyContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn generated_name(index: u32) -> String {
        if index < 26 {
            char::from(b'a' + index as u8).to_string()
        } else {
            format!("a{}", index - 26)
        }
    }

    fn name_for(&mut self, var: TypeId) -> &str {
        if !self.assigned.contains_key(&var) {
            loop {
                let candidate = Self::generated_name(self.next_index);
                self.next_index += 1;
                if self.used.insert(candidate.clone()) {
                    self.assigned.insert(var, candidate);
                    break;
                }
            }
        }
        &self.assigned[&var]
    }
}

/// Formats a type for diagnostics.
pub fn type_name(
    store: &TypeStore,
    interner: &Interner,
    ctx: &mut PrettyContext,
    ty: TypeId,
) -> String {
    let mut out = String::new();
    write_type(store, interner, ctx, ty, &mut out);
    out
}

fn element_needs_parens(store: &TypeStore, ty: TypeId) -> bool {
    matches!(store.get(store.final_type(ty)), Type::Function { .. })
}

fn write_type(
    store: &TypeStore,
    interner: &Interner,
    ctx: &mut PrettyContext,
    ty: TypeId,
    out: &mut String,
) {
    let ty = store.final_type(ty);

    match store.get(ty) {
        Type::Generic { name, .. } => {
            out.push('\'');
            match name {
                Some(name) => {
                    let name = interner.resolve(*name).to_string();
                    ctx.used.insert(name.clone());
                    out.push_str(&name);
                }
                None => {
                    let name = ctx.name_for(ty).to_string();
                    out.push_str(&name);
                }
            }
        }
        Type::Unit => out.push_str("unit"),
        Type::Int => out.push_str("int"),
        Type::Char => out.push_str("char"),
        Type::Float => out.push_str("float"),
        Type::Bool => out.push_str("bool"),
        Type::Tuple(members) => {
            out.push('(');
            for (i, &member) in members.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                write_type(store, interner, ctx, member, out);
            }
            out.push(')');
        }
        Type::Array(element) => {
            let parens = element_needs_parens(store, *element);
            if parens {
                out.push('(');
            }
            write_type(store, interner, ctx, *element, out);
            if parens {
                out.push(')');
            }
            out.push_str("[]");
        }
        Type::Function { args, result } => {
            out.push('(');
            for (i, &arg) in args.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                write_type(store, interner, ctx, arg, out);
            }
            out.push_str(") -> ");
            write_type(store, interner, ctx, *result, out);
        }
        Type::Instance { proto, args } => {
            out.push_str(interner.resolve(store.proto(*proto).name()));
            if !args.is_empty() {
                out.push('<');
                for (i, &arg) in args.iter().enumerate() {
                    if i != 0 {
                        out.push_str(", ");
                    }
                    write_type(store, interner, ctx, arg, out);
                }
                out.push('>');
            }
        }
        Type::ClosureContext { fields } => {
            out.push_str("context [");
            for (i, field) in fields.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                write_type(store, interner, ctx, field.ty, out);
                out.push(' ');
                out.push_str(interner.resolve(field.name));
            }
            out.push(']');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smallvec::smallvec;

    #[test]
    fn primitives_print_their_names() {
        let store = TypeStore::new();
        let interner = Interner::new();
        let mut ctx = PrettyContext::new();
        assert_eq!(type_name(&store, &interner, &mut ctx, store.int()), "int");
        assert_eq!(type_name(&store, &interner, &mut ctx, store.unit()), "unit");
        assert_eq!(type_name(&store, &interner, &mut ctx, store.char_()), "char");
    }

    #[test]
    fn anonymous_variables_are_numbered_in_order() {
        let mut store = TypeStore::new();
        let interner = Interner::new();
        let mut ctx = PrettyContext::new();
        let v1 = store.fresh_var();
        let v2 = store.fresh_var();
        let pair = store.tuple(smallvec![v1, v2, v1]);
        assert_eq!(type_name(&store, &interner, &mut ctx, pair), "('a, 'b, 'a)");
    }

    #[test]
    fn named_variables_keep_their_name_and_block_it() {
        let mut store = TypeStore::new();
        let mut interner = Interner::new();
        let mut ctx = PrettyContext::new();
        let named = store.named_var(interner.intern("a"), false);
        let anon = store.fresh_var();
        let pair = store.tuple(smallvec![named, anon]);
        // The anonymous variable must not collide with the user's 'a.
        assert_eq!(type_name(&store, &interner, &mut ctx, pair), "('a, 'b)");
    }

    #[test]
    fn function_and_array_nesting() {
        let mut store = TypeStore::new();
        let interner = Interner::new();
        let mut ctx = PrettyContext::new();
        let int = store.int();
        let bool_ = store.bool_();
        let f = store.function(smallvec![int, int], bool_);
        let arr_f = store.array(f);
        let arr_i = store.array(int);
        assert_eq!(type_name(&store, &interner, &mut ctx, arr_f), "((int, int) -> bool)[]");
        assert_eq!(type_name(&store, &interner, &mut ctx, arr_i), "int[]");
    }

    #[test]
    fn bound_variables_print_their_target() {
        let mut store = TypeStore::new();
        let interner = Interner::new();
        let mut ctx = PrettyContext::new();
        let v = store.fresh_var();
        let int = store.int();
        assert!(store.unify(v, int));
        assert_eq!(type_name(&store, &interner, &mut ctx, v), "int");
    }

    #[test]
    fn instance_prints_name_and_arguments() {
        let mut store = TypeStore::new();
        let mut interner = Interner::new();
        let mut ctx = PrettyContext::new();
        let proto = store.declare_proto(interner.intern("Option"));
        let int = store.int();
        let inst = store.instance(proto, smallvec![int]);
        assert_eq!(type_name(&store, &interner, &mut ctx, inst), "Option<int>");
    }
}
