//! The typed intermediate representation consumed by backends.
//!
//! TIR is what is left of a program after monomorphisation, closure
//! conversion and pattern compilation:
//!
//! - every function instance is fully concrete; generic substitutions have
//!   been applied and encoded into the instance's [`FuncInstance::symbol`];
//! - functions are flat: closures have become a code entity plus an
//!   explicit context record, and function *values* are `(code, env)`
//!   pairs built by [`Tir::Function`];
//! - matches have become [`Decision`] trees of primitive tests
//!   (see [`crate::pattern`]).
//!
//! Every node carries or implies a ground [`TypeId`] in the compilation's
//! type store, so a backend never re-infers anything.

use crate::pattern::Decision;
use aike_base::Symbol;
use aike_kernel::{ContextField, TypeId};
use aike_language::ast::{SynBinaryOp, SynUnaryOp};

/// Index of a local slot within one function instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(pub u32);

/// Index of an emitted function instance within a [`TirProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u32);

/// One local slot: parameters first, then let-bounds, loop variables,
/// pattern bindings and compiler temporaries.
#[derive(Debug, Clone)]
pub struct LocalInfo {
    /// Source name, if the slot corresponds to one.
    pub name: Option<Symbol>,
    pub ty: TypeId,
}

/// Layout of a closure context record: one field per captured external, in
/// first-use order. A captured function's field holds its context pointer.
#[derive(Debug, Clone)]
pub struct ContextLayout {
    pub fields: Vec<ContextField>,
}

/// Where a function value's environment pointer comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Env {
    /// The function captures nothing; the environment is null.
    None,
    /// The context record lives in a local of the current frame (the
    /// function was defined here).
    Local(LocalId),
    /// The context pointer was itself captured: field `index` of the
    /// current frame's own context.
    Captured(u32),
}

/// One emitted function.
#[derive(Debug, Clone)]
pub struct FuncInstance {
    /// Backend-visible name: `<source name>..<instance key>` for defined
    /// functions and constructors, the plain source name for externs.
    pub symbol: String,
    /// Locals holding the declared parameters, in order.
    pub params: Vec<LocalId>,
    /// All locals of the frame, indexed by [`LocalId`].
    pub locals: Vec<LocalInfo>,
    /// Present when the function captures: the layout of the context
    /// record it receives as a hidden trailing argument.
    pub context: Option<ContextLayout>,
    pub result: TypeId,
    pub body: InstanceBody,
}

/// Body of an instance; extern functions have none.
#[derive(Debug, Clone)]
pub enum InstanceBody {
    Defined(Tir),
    Extern,
}

/// One arm of a compiled match: a decision tree that tests the scrutinee
/// (falling through to the next arm on failure) and the arm body to
/// evaluate on success.
#[derive(Debug, Clone)]
pub struct TirArm {
    pub pattern: Decision,
    pub body: Tir,
}

/// A lowered, fully-typed expression.
#[derive(Debug, Clone)]
pub enum Tir {
    Unit,
    Int(i64),
    Char(u8),
    Bool(bool),
    Array { element: TypeId, elements: Vec<Tir> },
    Tuple { ty: TypeId, elements: Vec<Tir> },
    ReadLocal(LocalId),
    /// Field `index` of the current frame's context record.
    ReadCaptured { index: u32, ty: TypeId },
    /// A `(code, env)` function value.
    Function { instance: InstanceId, env: Env },
    /// Call through a function value: `code(args…, env)`.
    Call { callee: Box<Tir>, args: Vec<Tir> },
    Unary { op: SynUnaryOp, operand: Box<Tir> },
    Binary { op: SynBinaryOp, left: Box<Tir>, right: Box<Tir> },
    Index { array: Box<Tir>, index: Box<Tir> },
    Slice { array: Box<Tir>, start: Box<Tir>, end: Option<Box<Tir>> },
    /// Field extraction from a record or tuple value.
    GetField { value: Box<Tir>, index: u32 },
    MakeRecord { ty: TypeId, fields: Vec<Tir> },
    MakeUnion { ty: TypeId, tag: u32, payload: Option<Box<Tir>> },
    /// Allocates an (uninitialised) context record into a local; fields
    /// are stored separately so mutually recursive siblings can reference
    /// each other's contexts.
    AllocContext { local: LocalId, ty: TypeId },
    StoreContextField { context: Box<Tir>, index: u32, value: Box<Tir> },
    /// Stores into a local; the expression evaluates to the stored value
    /// (a `let` in tail position yields its bound value).
    SetLocal { local: LocalId, value: Box<Tir> },
    /// Assignment to a place (local, captured, array element or field).
    Assign { place: Box<Tir>, value: Box<Tir> },
    Seq(Vec<Tir>),
    If { cond: Box<Tir>, then_body: Box<Tir>, else_body: Box<Tir> },
    ForIn { var: LocalId, array: Box<Tir>, body: Box<Tir> },
    ForRange { var: LocalId, start: Box<Tir>, end: Box<Tir>, body: Box<Tir> },
    While { cond: Box<Tir>, body: Box<Tir> },
    /// The scrutinee is evaluated once into `value`; arms are tried in
    /// order, falling through on a failed decision tree.
    Match { value: LocalId, scrutinee: Box<Tir>, ty: TypeId, arms: Vec<TirArm> },
}

/// A lowered compilation unit: the instance table plus the entry function
/// (the top-level code, emitted as instance `entry`).
#[derive(Debug)]
pub struct TirProgram {
    pub instances: Vec<FuncInstance>,
    pub entry: InstanceId,
}

impl TirProgram {
    pub fn instance(&self, id: InstanceId) -> &FuncInstance {
        &self.instances[id.0 as usize]
    }

    /// Looks an instance up by its backend symbol.
    pub fn find_symbol(&self, symbol: &str) -> Option<&FuncInstance> {
        self.instances.iter().find(|i| i.symbol == symbol)
    }
}
