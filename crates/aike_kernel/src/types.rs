//! Type representation and the unification core.
//!
//! All types of one compilation unit live in a [`TypeStore`]: an index arena
//! where a [`TypeId`] names a node and a [`ProtoId`] names the prototype of
//! a user-defined record or union. Instances reference their prototype
//! through the `ProtoId` indirection, which is what lets recursive type
//! definitions close the knot: the prototype slot is created empty during
//! the recursive-declaration pre-pass and bound exactly once afterwards.
//!
//! Shared type nodes are mutated in exactly two ways:
//!
//! - the `instance` link of a generic variable, set by [`TypeStore::unify`]
//!   and path-compressed by [`TypeStore::prune`];
//! - the field list of a closure context, extended while the owning
//!   function's body is being resolved.
//!
//! Everything else is immutable after allocation.

use aike_base::Symbol;
use smallvec::SmallVec;

/// Index of a type node in a [`TypeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a prototype slot in a [`TypeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtoId(u32);

impl ProtoId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Inline-friendly list of type arguments or members.
pub type TypeList = SmallVec<[TypeId; 4]>;

/// One captured variable in a closure context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextField {
    pub name: Symbol,
    pub ty: TypeId,
}

/// A type node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Unit,
    Int,
    Char,
    Float,
    Bool,
    /// Tuple of two or more member types.
    Tuple(TypeList),
    /// Array with the given element type.
    Array(TypeId),
    /// Function from argument types to a result type.
    Function { args: TypeList, result: TypeId },
    /// A type variable. `instance` is the union-find link set by
    /// unification; a frozen variable only ever unifies with itself.
    Generic { name: Option<Symbol>, instance: Option<TypeId>, frozen: bool },
    /// Instantiation of a user-defined prototype with type arguments.
    Instance { proto: ProtoId, args: TypeList },
    /// Compiler-synthesised record of a function's captured variables.
    ClosureContext { fields: Vec<ContextField> },
}

/// Field list of a record prototype: ordered `(name, type)` pairs.
#[derive(Debug, Clone)]
pub struct RecordProto {
    pub name: Symbol,
    pub fields: Vec<(Symbol, TypeId)>,
    pub generics: Vec<TypeId>,
}

impl RecordProto {
    /// Position of the named field, if any.
    pub fn field_index(&self, name: Symbol) -> Option<usize> {
        self.fields.iter().position(|&(n, _)| n == name)
    }
}

/// Variant list of a union prototype. Each variant's payload type is one of
/// unit, a scalar, a tuple, or an instance of an inline record prototype.
#[derive(Debug, Clone)]
pub struct UnionProto {
    pub name: Symbol,
    pub variants: Vec<(Symbol, TypeId)>,
    pub generics: Vec<TypeId>,
}

impl UnionProto {
    /// Position of the named variant, if any.
    pub fn variant_index(&self, name: Symbol) -> Option<usize> {
        self.variants.iter().position(|&(n, _)| n == name)
    }
}

/// A prototype slot. `Pending` is the forward-declared state produced by the
/// recursive-declaration pre-pass; it is overwritten exactly once.
#[derive(Debug, Clone)]
pub enum Prototype {
    Pending { name: Symbol },
    Record(RecordProto),
    Union(UnionProto),
}

impl Prototype {
    pub fn name(&self) -> Symbol {
        match self {
            Prototype::Pending { name } => *name,
            Prototype::Record(r) => r.name,
            Prototype::Union(u) => u.name,
        }
    }

    pub fn generics(&self) -> &[TypeId] {
        match self {
            Prototype::Pending { .. } => &[],
            Prototype::Record(r) => &r.generics,
            Prototype::Union(u) => &u.generics,
        }
    }
}

/// The arena of all type nodes and prototypes of one compilation unit.
///
/// The five primitive types are interned up front and shared; compound
/// types are allocated on demand.
pub struct TypeStore {
    types: Vec<Type>,
    protos: Vec<Prototype>,
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = TypeStore { types: Vec::new(), protos: Vec::new() };
        store.alloc(Type::Unit);
        store.alloc(Type::Int);
        store.alloc(Type::Char);
        store.alloc(Type::Float);
        store.alloc(Type::Bool);
        store
    }

    pub fn unit(&self) -> TypeId {
        TypeId(0)
    }

    pub fn int(&self) -> TypeId {
        TypeId(1)
    }

    pub fn char_(&self) -> TypeId {
        TypeId(2)
    }

    pub fn float(&self) -> TypeId {
        TypeId(3)
    }

    pub fn bool_(&self) -> TypeId {
        TypeId(4)
    }

    pub fn alloc(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// Allocates a fresh anonymous type variable.
    pub fn fresh_var(&mut self) -> TypeId {
        self.alloc(Type::Generic { name: None, instance: None, frozen: false })
    }

    /// Allocates a named type variable, optionally frozen.
    pub fn named_var(&mut self, name: Symbol, frozen: bool) -> TypeId {
        self.alloc(Type::Generic { name: Some(name), instance: None, frozen })
    }

    pub fn array(&mut self, element: TypeId) -> TypeId {
        self.alloc(Type::Array(element))
    }

    pub fn tuple(&mut self, members: TypeList) -> TypeId {
        self.alloc(Type::Tuple(members))
    }

    pub fn function(&mut self, args: TypeList, result: TypeId) -> TypeId {
        self.alloc(Type::Function { args, result })
    }

    pub fn instance(&mut self, proto: ProtoId, args: TypeList) -> TypeId {
        self.alloc(Type::Instance { proto, args })
    }

    /// Allocates an empty closure context; fields are pushed while the
    /// owning function body is resolved.
    pub fn closure_context(&mut self) -> TypeId {
        self.alloc(Type::ClosureContext { fields: Vec::new() })
    }

    /// Appends a captured-variable field to a closure context type.
    ///
    /// # Panics
    ///
    /// Panics if `context` is not a closure context.
    pub fn context_push_field(&mut self, context: TypeId, name: Symbol, ty: TypeId) {
        match &mut self.types[context.index()] {
            Type::ClosureContext { fields } => fields.push(ContextField { name, ty }),
            other => panic!("context_push_field on non-context type {other:?}"),
        }
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    /// Creates a forward-declared prototype slot.
    pub fn declare_proto(&mut self, name: Symbol) -> ProtoId {
        let id = ProtoId(self.protos.len() as u32);
        self.protos.push(Prototype::Pending { name });
        id
    }

    /// Binds a forward-declared prototype. Called exactly once per slot, by
    /// the recursive-declaration pre-pass.
    ///
    /// # Panics
    ///
    /// Panics if the slot was already bound.
    pub fn define_proto(&mut self, id: ProtoId, proto: Prototype) {
        match &self.protos[id.index()] {
            Prototype::Pending { .. } => self.protos[id.index()] = proto,
            bound => panic!("prototype {:?} bound twice (was {bound:?})", id),
        }
    }

    /// Creates an already-bound prototype (used for the inline record
    /// prototypes of union variants, which cannot be recursive).
    pub fn alloc_proto(&mut self, proto: Prototype) -> ProtoId {
        let id = ProtoId(self.protos.len() as u32);
        self.protos.push(proto);
        id
    }

    pub fn proto(&self, id: ProtoId) -> &Prototype {
        &self.protos[id.index()]
    }

    // ------------------------------------------------------------------
    // Pruning and resolution
    // ------------------------------------------------------------------

    /// Follows the `instance` chain of a type variable, path-compressing as
    /// it goes. Returns the representative: a non-generic type or an
    /// unbound variable.
    pub fn prune(&mut self, t: TypeId) -> TypeId {
        if let Type::Generic { instance: Some(next), .. } = self.types[t.index()] {
            let root = self.prune(next);
            if let Type::Generic { instance, .. } = &mut self.types[t.index()] {
                *instance = Some(root);
            }
            root
        } else {
            t
        }
    }

    /// Non-mutating variant of [`prune`](Self::prune): returns the bound
    /// target when one exists, otherwise the type itself.
    pub fn final_type(&self, t: TypeId) -> TypeId {
        match self.types[t.index()] {
            Type::Generic { instance: Some(next), .. } => self.final_type(next),
            _ => t,
        }
    }

    /// Returns `true` if `t` resolves to an unbound type variable.
    pub fn is_unbound_var(&self, t: TypeId) -> bool {
        matches!(self.types[self.final_type(t).index()], Type::Generic { .. })
    }

    // ------------------------------------------------------------------
    // Occurs check
    // ------------------------------------------------------------------

    /// Does the variable `var` occur in `t` (after resolution)?
    pub fn occurs(&self, var: TypeId, t: TypeId) -> bool {
        let t = self.final_type(t);
        if var == t {
            return true;
        }

        match &self.types[t.index()] {
            Type::Array(element) => self.occurs(var, *element),
            Type::Function { args, result } => {
                self.occurs(var, *result) || args.iter().any(|&a| self.occurs(var, a))
            }
            Type::Tuple(members) => members.iter().any(|&m| self.occurs(var, m)),
            Type::Instance { args, .. } => args.iter().any(|&a| self.occurs(var, a)),
            _ => false,
        }
    }

    /// Does `var` occur in any of the given types?
    pub fn occurs_in_any(&self, var: TypeId, types: &[TypeId]) -> bool {
        types.iter().any(|&t| self.occurs(var, t))
    }

    // ------------------------------------------------------------------
    // Unification
    // ------------------------------------------------------------------

    /// Unifies two types, binding unbound variables as needed. Returns
    /// `false` without reporting when the types cannot be made equal; the
    /// caller owns error formatting because it owns the locations.
    pub fn unify(&mut self, a: TypeId, b: TypeId) -> bool {
        let a = self.prune(a);
        let b = self.prune(b);

        if a == b {
            return true;
        }

        if matches!(self.types[a.index()], Type::Generic { frozen: false, .. }) {
            if self.occurs(a, b) {
                return false;
            }
            log::trace!("unify: bind {:?} := {:?}", a, b);
            if let Type::Generic { instance, .. } = &mut self.types[a.index()] {
                *instance = Some(b);
            }
            return true;
        }

        if matches!(self.types[b.index()], Type::Generic { frozen: false, .. }) {
            return self.unify(b, a);
        }

        // A frozen variable only unifies with itself, handled by the
        // identity check above.
        if matches!(self.types[a.index()], Type::Generic { .. })
            || matches!(self.types[b.index()], Type::Generic { .. })
        {
            return false;
        }

        match (self.types[a.index()].clone(), self.types[b.index()].clone()) {
            (Type::Unit, Type::Unit)
            | (Type::Int, Type::Int)
            | (Type::Char, Type::Char)
            | (Type::Float, Type::Float)
            | (Type::Bool, Type::Bool) => true,

            (Type::Array(ea), Type::Array(eb)) => self.unify(ea, eb),

            (
                Type::Function { args: aa, result: ra },
                Type::Function { args: ab, result: rb },
            ) => {
                aa.len() == ab.len()
                    && self.unify(ra, rb)
                    && aa.iter().zip(ab.iter()).all(|(&x, &y)| self.unify(x, y))
            }

            (Type::Tuple(ma), Type::Tuple(mb)) => {
                ma.len() == mb.len() && ma.iter().zip(mb.iter()).all(|(&x, &y)| self.unify(x, y))
            }

            (Type::Instance { proto: pa, args: aa }, Type::Instance { proto: pb, args: ab }) => {
                pa == pb
                    && aa.len() == ab.len()
                    && aa.iter().zip(ab.iter()).all(|(&x, &y)| self.unify(x, y))
            }

            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Generalisation and instantiation
    // ------------------------------------------------------------------

    /// Produces a copy of `t` in which every type variable not occurring in
    /// the `nongen` set is replaced by a fresh unconstrained variable.
    ///
    /// This is the instantiation half of let-polymorphism: a function's
    /// declared type is freshened at every reference site, while the
    /// enclosing function's parameter and return types (the nongenerics)
    /// keep their identity.
    pub fn freshen(&mut self, t: TypeId, nongen: &[TypeId]) -> TypeId {
        let mut remap = std::collections::HashMap::new();
        self.freshen_with(t, nongen, &mut remap)
    }

    fn freshen_with(
        &mut self,
        t: TypeId,
        nongen: &[TypeId],
        remap: &mut std::collections::HashMap<TypeId, TypeId>,
    ) -> TypeId {
        let t = self.prune(t);

        match self.types[t.index()].clone() {
            Type::Generic { .. } => {
                if self.occurs_in_any(t, nongen) {
                    return t;
                }
                if let Some(&mapped) = remap.get(&t) {
                    return mapped;
                }
                let fresh = self.fresh_var();
                remap.insert(t, fresh);
                fresh
            }
            Type::Array(element) => {
                let element = self.freshen_with(element, nongen, remap);
                self.array(element)
            }
            Type::Function { args, result } => {
                let args = args.iter().map(|&a| self.freshen_with(a, nongen, remap)).collect();
                let result = self.freshen_with(result, nongen, remap);
                self.function(args, result)
            }
            Type::Tuple(members) => {
                let members =
                    members.iter().map(|&m| self.freshen_with(m, nongen, remap)).collect();
                self.tuple(members)
            }
            Type::Instance { proto, args } => {
                let args = args.iter().map(|&a| self.freshen_with(a, nongen, remap)).collect();
                self.instance(proto, args)
            }
            _ => t,
        }
    }

    /// Rewrites `t`, replacing every type variable through `map`. Returns
    /// `None` when an unmapped variable is reached; used to instantiate
    /// prototype member types against an instance's type arguments, where
    /// every variable must be one of the prototype's generics.
    pub fn substitute(
        &mut self,
        t: TypeId,
        map: &std::collections::HashMap<TypeId, TypeId>,
    ) -> Option<TypeId> {
        let t = self.prune(t);

        match self.types[t.index()].clone() {
            Type::Generic { .. } => map.get(&t).copied(),
            Type::Array(element) => {
                let element = self.substitute(element, map)?;
                Some(self.array(element))
            }
            Type::Function { args, result } => {
                let args = args
                    .iter()
                    .map(|&a| self.substitute(a, map))
                    .collect::<Option<TypeList>>()?;
                let result = self.substitute(result, map)?;
                Some(self.function(args, result))
            }
            Type::Tuple(members) => {
                let members = members
                    .iter()
                    .map(|&m| self.substitute(m, map))
                    .collect::<Option<TypeList>>()?;
                Some(self.tuple(members))
            }
            Type::Instance { proto, args } => {
                let args = args
                    .iter()
                    .map(|&a| self.substitute(a, map))
                    .collect::<Option<TypeList>>()?;
                Some(self.instance(proto, args))
            }
            _ => Some(t),
        }
    }

    /// Instantiates a member type of a prototype against the type arguments
    /// of `inst`, which must resolve to an instance of that prototype.
    pub fn member_type(&mut self, inst: TypeId, member: TypeId) -> Option<TypeId> {
        let inst = self.final_type(inst);
        let (proto, args) = match &self.types[inst.index()] {
            Type::Instance { proto, args } => (*proto, args.clone()),
            _ => return None,
        };

        let generics = self.proto(proto).generics().to_vec();
        debug_assert_eq!(generics.len(), args.len());

        let map = generics.iter().copied().zip(args.iter().copied()).collect();
        self.substitute(member, &map)
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aike_base::Interner;
    use smallvec::smallvec;

    #[test]
    fn primitives_unify_with_themselves_only() {
        let mut store = TypeStore::new();
        let int = store.int();
        let bool_ = store.bool_();
        assert!(store.unify(int, int));
        assert!(!store.unify(int, bool_));
    }

    #[test]
    fn unbound_var_binds_to_anything() {
        let mut store = TypeStore::new();
        let v = store.fresh_var();
        let int = store.int();
        assert!(store.unify(v, int));
        assert_eq!(store.prune(v), int);
    }

    #[test]
    fn unify_is_symmetric() {
        for order in [false, true] {
            let mut store = TypeStore::new();
            let v = store.fresh_var();
            let int = store.int();
            let arr_v = store.array(v);
            let arr_int = store.array(int);

            let (a, b) = if order { (arr_v, arr_int) } else { (arr_int, arr_v) };
            assert!(store.unify(a, b));
            assert_eq!(store.prune(v), int);
        }
    }

    #[test]
    fn occurs_check_rejects_infinite_type() {
        let mut store = TypeStore::new();
        let v = store.fresh_var();
        let arr = store.array(v);
        assert!(!store.unify(v, arr));
        assert!(store.is_unbound_var(v));
    }

    #[test]
    fn frozen_var_refuses_other_types() {
        let mut interner = Interner::new();
        let mut store = TypeStore::new();
        let a = interner.intern("a");
        let frozen = store.named_var(a, true);
        let int = store.int();
        assert!(store.unify(frozen, frozen));
        assert!(!store.unify(frozen, int));
        assert!(!store.unify(int, frozen));
    }

    #[test]
    fn function_arity_must_agree() {
        let mut store = TypeStore::new();
        let int = store.int();
        let one = store.function(smallvec![int], int);
        let two = store.function(smallvec![int, int], int);
        assert!(!store.unify(one, two));
    }

    #[test]
    fn tuples_unify_pointwise() {
        let mut store = TypeStore::new();
        let v1 = store.fresh_var();
        let v2 = store.fresh_var();
        let int = store.int();
        let bool_ = store.bool_();
        let lhs = store.tuple(smallvec![v1, bool_]);
        let rhs = store.tuple(smallvec![int, v2]);
        assert!(store.unify(lhs, rhs));
        assert_eq!(store.prune(v1), int);
        assert_eq!(store.prune(v2), bool_);
    }

    #[test]
    fn instances_require_identical_prototype() {
        let mut interner = Interner::new();
        let mut store = TypeStore::new();
        let pa = store.declare_proto(interner.intern("A"));
        let pb = store.declare_proto(interner.intern("B"));
        let ia = store.instance(pa, smallvec![]);
        let ib = store.instance(pb, smallvec![]);
        assert!(!store.unify(ia, ib));

        let ia2 = store.instance(pa, smallvec![]);
        assert!(store.unify(ia, ia2));
    }

    #[test]
    fn prune_compresses_chains() {
        let mut store = TypeStore::new();
        let a = store.fresh_var();
        let b = store.fresh_var();
        let int = store.int();
        assert!(store.unify(a, b));
        assert!(store.unify(b, int));
        assert_eq!(store.prune(a), int);
        // After compression the link points straight at the representative.
        match store.get(a) {
            Type::Generic { instance, .. } => assert_eq!(*instance, Some(int)),
            other => panic!("expected variable, got {other:?}"),
        }
    }

    #[test]
    fn freshen_renames_free_variables() {
        let mut store = TypeStore::new();
        let v = store.fresh_var();
        let f = store.function(smallvec![v], v);
        let fresh = store.freshen(f, &[]);

        let (arg, result) = match store.get(fresh) {
            Type::Function { args, result } => (args[0], *result),
            other => panic!("expected function, got {other:?}"),
        };
        assert_ne!(arg, v);
        // Both occurrences map to the same fresh variable.
        assert_eq!(arg, result);
    }

    #[test]
    fn freshen_keeps_nongeneric_variables() {
        let mut store = TypeStore::new();
        let v = store.fresh_var();
        let f = store.function(smallvec![v], v);
        let fresh = store.freshen(f, &[v]);

        match store.get(fresh) {
            Type::Function { args, result } => {
                assert_eq!(args[0], v);
                assert_eq!(*result, v);
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn freshen_instantiates_frozen_prototype_generics() {
        let mut interner = Interner::new();
        let mut store = TypeStore::new();
        let a = store.named_var(interner.intern("a"), true);
        let proto = store.declare_proto(interner.intern("Box"));
        let inst = store.instance(proto, smallvec![a]);
        let ctor = store.function(smallvec![a], inst);

        let fresh = store.freshen(ctor, &[]);
        let arg = match store.get(fresh) {
            Type::Function { args, .. } => args[0],
            other => panic!("expected function, got {other:?}"),
        };
        assert_ne!(arg, a);
        let int = store.int();
        assert!(store.unify(arg, int));
    }

    #[test]
    fn member_type_substitutes_instance_arguments() {
        let mut interner = Interner::new();
        let mut store = TypeStore::new();
        let a = store.named_var(interner.intern("a"), true);
        let proto = store.declare_proto(interner.intern("Pair"));
        let field_ty = store.tuple(smallvec![a, a]);
        store.define_proto(
            proto,
            Prototype::Record(RecordProto {
                name: interner.intern("Pair"),
                fields: vec![(interner.intern("both"), field_ty)],
                generics: vec![a],
            }),
        );

        let int = store.int();
        let inst = store.instance(proto, smallvec![int]);
        let member = store.member_type(inst, field_ty).unwrap();
        let expected = store.tuple(smallvec![int, int]);
        assert!(store.unify(member, expected));
    }
}
