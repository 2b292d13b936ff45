//! Structural atoms shared by every aike compiler crate.
//!
//! This crate holds the pieces that all pipeline phases agree on and that
//! carry no language semantics of their own:
//!
//! - [`Location`], [`SourceId`] and [`SourceFile`]: source positions and
//!   the file they belong to;
//! - [`CompileError`] and [`Result`]: located errors with the driver-facing
//!   diagnostic rendering;
//! - [`Arena`]: bump allocation for AST and binding nodes;
//! - [`Interner`] and [`Symbol`]: interned names with O(1) equality.

mod arena;
mod error;
mod intern;
mod span;

pub use arena::Arena;
pub use error::{CompileError, Result};
pub use intern::{Interner, Symbol};
pub use span::{Location, SourceFile, SourceId};
