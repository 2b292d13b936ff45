//! Pure Hindley-Milner type algebra for the aike compiler.
//!
//! This crate knows nothing about syntax or the typed AST; it owns the type
//! graph and the algorithms over it:
//!
//! - [`TypeStore`]: the index arena of type nodes and prototypes, with
//!   prune/occurs/unify/freshen (see [`types`]);
//! - [`pretty`]: diagnostic formatting with stable `'a`, `'b`, ... naming;
//! - [`mangle`]: the deterministic prefix-grammar mangling consumed by
//!   backends.
//!
//! The separation mirrors the rest of the workspace: phases that need
//! types depend on this crate, never the other way around.

pub mod mangle;
pub mod pretty;
pub mod types;

pub use mangle::{mangle_instance_key, mangle_type};
pub use pretty::{type_name, PrettyContext};
pub use types::{
    ContextField, ProtoId, Prototype, RecordProto, Type, TypeId, TypeList, TypeStore, UnionProto,
};
