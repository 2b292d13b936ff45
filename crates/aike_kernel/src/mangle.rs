//! Deterministic name mangling for backend-visible symbols.
//!
//! The mangle is a prefix grammar over ground types; it is self-delimiting,
//! so mangles concatenate without separators and distinct pruned types
//! always produce distinct strings:
//!
//! | Form | Mangle |
//! |------|--------|
//! | unit, int, char, float, bool | `u` `i` `c` `f` `b` |
//! | array of `T` | `A<T>` |
//! | tuple of n members | `T<n><T1>…<Tn>` |
//! | function, n args | `F<n><T1>…<Tn><R>` |
//! | instance of `Name`, n args | `I<n><T1>…<Tn>N<len><Name>` |
//!
//! A monomorphised function instance is keyed by the mangle of its concrete
//! function type, followed by `..` and the mangle of each generic
//! substitution in declaration order. Identical types MUST mangle to
//! byte-identical strings; the backend relies on it.

use crate::types::{Type, TypeId, TypeStore};
use aike_base::{Interner, Result};

/// Resolves a type variable reached during mangling to a ground type.
///
/// Mangling happens after checking, so a variable can only legitimately
/// remain when a generic function instance is being keyed; the lowering
/// pass supplies its substitution environment here. The callback returns an
/// error (with the location it owns) for a variable with no instantiation.
pub type ResolveGeneric<'r> = dyn FnMut(TypeId) -> Result<TypeId> + 'r;

/// Mangles a type, resolving residual type variables through `resolve`.
pub fn mangle_type(
    store: &TypeStore,
    interner: &Interner,
    ty: TypeId,
    resolve: &mut ResolveGeneric<'_>,
) -> Result<String> {
    let mut out = String::new();
    mangle_into(store, interner, ty, resolve, &mut out)?;
    Ok(out)
}

/// Builds the instance key of a monomorphised function: the mangled
/// concrete function type plus `..` and each substitution's mangle.
pub fn mangle_instance_key(
    store: &TypeStore,
    interner: &Interner,
    fn_type: TypeId,
    substitutions: &[TypeId],
    resolve: &mut ResolveGeneric<'_>,
) -> Result<String> {
    let mut out = mangle_type(store, interner, fn_type, resolve)?;
    if !substitutions.is_empty() {
        out.push_str("..");
        for &sub in substitutions {
            mangle_into(store, interner, sub, resolve, &mut out)?;
        }
    }
    Ok(out)
}

fn mangle_into(
    store: &TypeStore,
    interner: &Interner,
    ty: TypeId,
    resolve: &mut ResolveGeneric<'_>,
    out: &mut String,
) -> Result<()> {
    let ty = store.final_type(ty);

    match store.get(ty) {
        Type::Generic { .. } => {
            let ground = resolve(ty)?;
            debug_assert_ne!(store.final_type(ground), ty);
            mangle_into(store, interner, ground, resolve, out)
        }
        Type::Unit => {
            out.push('u');
            Ok(())
        }
        Type::Int => {
            out.push('i');
            Ok(())
        }
        Type::Char => {
            out.push('c');
            Ok(())
        }
        Type::Float => {
            out.push('f');
            Ok(())
        }
        Type::Bool => {
            out.push('b');
            Ok(())
        }
        Type::Tuple(members) => {
            out.push('T');
            out.push_str(&members.len().to_string());
            for &member in members {
                mangle_into(store, interner, member, resolve, out)?;
            }
            Ok(())
        }
        Type::Array(element) => {
            out.push('A');
            mangle_into(store, interner, *element, resolve, out)
        }
        Type::Function { args, result } => {
            out.push('F');
            out.push_str(&args.len().to_string());
            for &arg in args {
                mangle_into(store, interner, arg, resolve, out)?;
            }
            mangle_into(store, interner, *result, resolve, out)
        }
        Type::Instance { proto, args } => {
            out.push('I');
            out.push_str(&args.len().to_string());
            for &arg in args {
                mangle_into(store, interner, arg, resolve, out)?;
            }
            let name = interner.resolve(store.proto(*proto).name());
            out.push('N');
            out.push_str(&name.len().to_string());
            out.push_str(name);
            Ok(())
        }
        Type::ClosureContext { .. } => Err(aike_base::CompileError::new(
            "a closure context type has no mangled form",
            aike_base::Location::default(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aike_base::{CompileError, Location};
    use pretty_assertions::assert_eq;
    use smallvec::smallvec;

    fn no_generics(var: TypeId) -> Result<TypeId> {
        let _ = var;
        Err(CompileError::new("unexpected type variable", Location::default()))
    }

    fn mangle_ground(store: &TypeStore, interner: &Interner, ty: TypeId) -> String {
        mangle_type(store, interner, ty, &mut no_generics).unwrap()
    }

    #[test]
    fn primitives_use_single_letters() {
        let store = TypeStore::new();
        let interner = Interner::new();
        assert_eq!(mangle_ground(&store, &interner, store.unit()), "u");
        assert_eq!(mangle_ground(&store, &interner, store.int()), "i");
        assert_eq!(mangle_ground(&store, &interner, store.char_()), "c");
        assert_eq!(mangle_ground(&store, &interner, store.float()), "f");
        assert_eq!(mangle_ground(&store, &interner, store.bool_()), "b");
    }

    #[test]
    fn compound_types_follow_the_prefix_grammar() {
        let mut store = TypeStore::new();
        let interner = Interner::new();
        let int = store.int();
        let bool_ = store.bool_();
        let arr = store.array(int);
        let pair = store.tuple(smallvec![int, bool_]);
        let f = store.function(smallvec![arr, pair], bool_);
        assert_eq!(mangle_ground(&store, &interner, arr), "Ai");
        assert_eq!(mangle_ground(&store, &interner, pair), "T2ib");
        assert_eq!(mangle_ground(&store, &interner, f), "F2AiT2ibb");
    }

    #[test]
    fn instance_includes_name_and_length() {
        let mut store = TypeStore::new();
        let mut interner = Interner::new();
        let proto = store.declare_proto(interner.intern("Option"));
        let int = store.int();
        let inst = store.instance(proto, smallvec![int]);
        assert_eq!(mangle_ground(&store, &interner, inst), "I1iN6Option");
    }

    #[test]
    fn bound_variables_mangle_as_their_target() {
        let mut store = TypeStore::new();
        let interner = Interner::new();
        let v = store.fresh_var();
        let int = store.int();
        assert!(store.unify(v, int));
        assert_eq!(mangle_ground(&store, &interner, v), "i");
    }

    #[test]
    fn instance_key_appends_substitutions() {
        let mut store = TypeStore::new();
        let interner = Interner::new();
        let int = store.int();
        let bool_ = store.bool_();
        let pair = store.tuple(smallvec![int, bool_]);
        let f = store.function(smallvec![int, bool_], pair);
        let key =
            mangle_instance_key(&store, &interner, f, &[int, bool_], &mut no_generics).unwrap();
        assert_eq!(key, "F2ibT2ib..ib");
    }

    #[test]
    fn distinct_types_mangle_distinctly() {
        let mut store = TypeStore::new();
        let mut interner = Interner::new();
        let int = store.int();
        let bool_ = store.bool_();
        let proto_a = store.declare_proto(interner.intern("A"));
        let proto_ab = store.declare_proto(interner.intern("Ab"));

        let samples = vec![
            store.int(),
            store.array(int),
            store.tuple(smallvec![int, int]),
            store.tuple(smallvec![int, int, int]),
            store.function(smallvec![int], int),
            store.function(smallvec![int, int], int),
            store.function(smallvec![], bool_),
            store.instance(proto_a, smallvec![int]),
            store.instance(proto_ab, smallvec![int]),
        ];

        let mut seen = std::collections::HashSet::new();
        for &ty in &samples {
            let mangled = mangle_ground(&store, &interner, ty);
            assert!(seen.insert(mangled.clone()), "duplicate mangle {mangled}");
        }
    }
}
