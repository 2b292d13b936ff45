//! aike middle-end: lowering the checked typed AST into TIR.
//!
//! The backend-facing half of the compiler. [`lower`] consumes the typed
//! AST produced by `aike-language` and emits a [`tir::TirProgram`]:
//! monomorphised function instances keyed by the deterministic mangle from
//! `aike-kernel`, closures flattened into explicit context records, and
//! match patterns compiled into decision trees of primitive tests.
//!
//! TIR carries ground types for every value, so a backend consuming it
//! performs no inference of its own.

pub mod lower;
pub mod pattern;
pub mod tir;

pub use lower::lower;
pub use pattern::{Decision, Path, Step, Test};
pub use tir::{
    ContextLayout, Env, FuncInstance, InstanceBody, InstanceId, LocalId, LocalInfo, Tir, TirArm,
    TirProgram,
};
