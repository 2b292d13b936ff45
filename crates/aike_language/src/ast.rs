//! Untyped syntax tree produced by the parser.
//!
//! All nodes are arena-allocated ([`crate::arena_ctx::SynArenas`]) and refer
//! to each other through `&'a` references; nothing in this layer is mutated
//! after parsing. Every node carries the [`Location`] of the source range it
//! was parsed from, and a node's location subsumes its children's.
//!
//! String literals do not survive into this tree: the parser desugars them
//! to array-of-character literals, in expressions and in patterns alike.

use aike_base::{Location, Symbol};

/// An identifier with the location it was written at.
#[derive(Debug, Clone, Copy)]
pub struct Ident {
    pub name: Symbol,
    pub location: Location,
}

/// A name with an optional declared type, as in `x: int` or plain `x`.
#[derive(Debug, Clone, Copy)]
pub struct SynTypedVar<'a> {
    pub name: Ident,
    pub ty: Option<&'a SynType<'a>>,
}

/// Type syntax. Arrow binds tighter than tuple; the `[]` suffix binds
/// tightest.
#[derive(Debug)]
pub enum SynType<'a> {
    /// A named type, possibly applied: `int`, `Option<'a>`.
    Name { name: Ident, args: &'a [&'a SynType<'a>] },
    /// An apostrophe-prefixed type variable: `'a`.
    Generic(Ident),
    /// Element-type suffix form: `T[]`.
    Array(&'a SynType<'a>),
    /// `(T1, T2) -> R`.
    Function { args: &'a [&'a SynType<'a>], result: &'a SynType<'a> },
    /// `(T1, T2)`.
    Tuple(&'a [&'a SynType<'a>]),
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynUnaryOp {
    Plus,
    Minus,
    Not,
}

/// Infix operators, in precedence-climbing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynBinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Assign,
}

impl SynBinaryOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            SynBinaryOp::Multiply | SynBinaryOp::Divide => 7,
            SynBinaryOp::Add | SynBinaryOp::Subtract => 6,
            SynBinaryOp::Less
            | SynBinaryOp::LessEqual
            | SynBinaryOp::Greater
            | SynBinaryOp::GreaterEqual => 5,
            SynBinaryOp::Equal | SynBinaryOp::NotEqual => 4,
            SynBinaryOp::And => 3,
            SynBinaryOp::Or => 2,
            SynBinaryOp::Assign => 1,
        }
    }
}

/// One variant of a union definition.
#[derive(Debug)]
pub struct SynUnionVariant<'a> {
    pub name: Ident,
    pub payload: SynUnionPayload<'a>,
}

/// Payload of a union variant: nothing, a type (scalar or tuple), or an
/// inline record.
#[derive(Debug)]
pub enum SynUnionPayload<'a> {
    Unit,
    Ty(&'a SynType<'a>),
    Record(&'a [SynTypedVar<'a>]),
}

/// One arm of a `match … with` expression.
#[derive(Debug)]
pub struct SynMatchArm<'a> {
    pub pattern: &'a SynPat<'a>,
    pub body: &'a SynAst<'a>,
}

/// A match pattern.
#[derive(Debug)]
pub struct SynPat<'a> {
    pub location: Location,
    pub kind: SynPatKind<'a>,
}

#[derive(Debug)]
pub enum SynPatKind<'a> {
    Int(i64),
    Bool(bool),
    Char(u8),
    Array(&'a [&'a SynPat<'a>]),
    Tuple(&'a [&'a SynPat<'a>]),
    /// `Ctor(p1, …)` or `Ctor(name = p1, …)`; `arg_names` is empty for the
    /// positional form and parallel to `args` otherwise.
    Ctor { name: Ident, args: &'a [&'a SynPat<'a>], arg_names: &'a [Ident] },
    /// `ctor alias`: match the constructor, bind the payload whole.
    CtorAlias { name: Ident, alias: Ident },
    /// A bare name, optionally typed; resolves to a union tag, an
    /// equality check against an existing binding, or a fresh binding.
    Placeholder(SynTypedVar<'a>),
    /// `_`
    Wildcard,
    /// `p1 | p2 | …`
    Or(&'a [&'a SynPat<'a>]),
    /// `p if cond`
    Guard { pattern: &'a SynPat<'a>, condition: &'a SynAst<'a> },
}

/// An expression (or declaration; declarations are expression-positioned).
#[derive(Debug)]
pub struct SynAst<'a> {
    pub location: Location,
    pub kind: SynKind<'a>,
}

#[derive(Debug)]
pub enum SynKind<'a> {
    Unit,
    Int(i64),
    Char(u8),
    Bool(bool),
    Array(&'a [&'a SynAst<'a>]),
    Tuple(&'a [&'a SynAst<'a>]),
    Var(Symbol),
    Unary { op: SynUnaryOp, operand: &'a SynAst<'a> },
    Binary { op: SynBinaryOp, left: &'a SynAst<'a>, right: &'a SynAst<'a> },
    /// `arg_names` is empty for positional calls and parallel to `args`
    /// for named ones; mixing is rejected in the parser.
    Call { callee: &'a SynAst<'a>, args: &'a [&'a SynAst<'a>], arg_names: &'a [Ident] },
    Index { array: &'a SynAst<'a>, index: &'a SynAst<'a> },
    /// `a[lo..hi]`; a missing `lo` parses as literal `0`, a missing `hi`
    /// means to-the-end.
    Slice { array: &'a SynAst<'a>, start: &'a SynAst<'a>, end: Option<&'a SynAst<'a>> },
    Member { aggregate: &'a SynAst<'a>, member: Ident },
    LetVar { var: SynTypedVar<'a>, body: &'a SynAst<'a> },
    /// Tuple destructuring: `let (a, b) = e`.
    LetVars { vars: &'a [SynTypedVar<'a>], body: &'a SynAst<'a> },
    /// Function definition; an anonymous `fun` has the empty name.
    LetFunc {
        name: Ident,
        ret: Option<&'a SynType<'a>>,
        args: &'a [SynTypedVar<'a>],
        body: &'a SynAst<'a>,
    },
    ExternFunc { name: Ident, ret: &'a SynType<'a>, args: &'a [SynTypedVar<'a>] },
    RecordDef { name: Ident, generics: &'a [Ident], fields: &'a [SynTypedVar<'a>] },
    UnionDef { name: Ident, generics: &'a [Ident], variants: &'a [SynUnionVariant<'a>] },
    If { cond: &'a SynAst<'a>, then_body: &'a SynAst<'a>, else_body: &'a SynAst<'a> },
    ForIn { var: SynTypedVar<'a>, array: &'a SynAst<'a>, body: &'a SynAst<'a> },
    ForInRange {
        var: SynTypedVar<'a>,
        start: &'a SynAst<'a>,
        end: &'a SynAst<'a>,
        body: &'a SynAst<'a>,
    },
    While { cond: &'a SynAst<'a>, body: &'a SynAst<'a> },
    Match { scrutinee: &'a SynAst<'a>, arms: &'a [SynMatchArm<'a>] },
    Block(&'a [&'a SynAst<'a>]),
}

impl<'a> SynAst<'a> {
    pub fn new(location: Location, kind: SynKind<'a>) -> Self {
        SynAst { location, kind }
    }

    /// Is this node a declaration (binds a name for the rest of its block)?
    pub fn is_declaration(&self) -> bool {
        matches!(
            self.kind,
            SynKind::LetVar { .. }
                | SynKind::LetVars { .. }
                | SynKind::LetFunc { .. }
                | SynKind::ExternFunc { .. }
                | SynKind::RecordDef { .. }
                | SynKind::UnionDef { .. }
        )
    }
}
