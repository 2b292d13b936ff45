//! Error type with source location tracking.
//!
//! Every failure in the aike pipeline is a [`CompileError`]: a message plus
//! the narrowest [`Location`] that pinpoints the offending source range.
//! The first error in a phase aborts that phase; there is no recovery and
//! no partial result.
//!
//! # Example
//!
//! ```
//! use aike_base::{CompileError, Location, Result};
//!
//! fn check(n: i64, loc: Location) -> Result<i64> {
//!     if n < 0 {
//!         return Err(CompileError::new("negative size", loc));
//!     }
//!     Ok(n)
//! }
//!
//! let err = check(-1, Location::default()).unwrap_err();
//! assert!(err.to_string().contains("negative size"));
//! ```

use crate::span::{Location, SourceFile};
use std::fmt;

/// A compile error annotated with its source location.
#[derive(Debug, Clone)]
pub struct CompileError {
    /// Human-readable error description.
    pub message: String,
    /// Narrowest location of the offending subexpression.
    pub location: Location,
}

impl CompileError {
    /// Creates an error with the given message and source location.
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        CompileError { message: message.into(), location }
    }

    /// Renders the error in the diagnostic format consumed by drivers:
    ///
    /// ```text
    /// <source>(<line>,<column>): <message>
    /// <offending line>
    ///      ^^^^
    /// ```
    ///
    /// Line and column are one-based in the rendering. The offending line
    /// and the caret span are omitted when the location lies outside the
    /// file (for example a synthesised location).
    pub fn render(&self, source: &SourceFile) -> String {
        let mut out = format!(
            "{}({},{}): {}\n",
            source.name,
            self.location.line + 1,
            self.location.column + 1,
            self.message
        );

        if let Some(line) = source.line_text(self.location.line) {
            let column = self.location.column as usize;
            if column <= line.len() {
                out.push_str(line);
                out.push('\n');
                out.extend(std::iter::repeat(' ').take(column));
                out.extend(std::iter::repeat('^').take((self.location.length as usize).max(1)));
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{}): {}",
            self.location.line + 1,
            self.location.column + 1,
            self.message
        )
    }
}

impl std::error::Error for CompileError {}

/// Alias for `std::result::Result<T, CompileError>`.
pub type Result<T> = std::result::Result<T, CompileError>;
