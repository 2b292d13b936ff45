//! Source location tracking for error reporting.
//!
//! A [`Location`] identifies a contiguous region of one source file: the line
//! and column where the region starts, its byte offset, and its byte length.
//! Every token, syntax node and error in the aike pipeline carries a
//! `Location`, so diagnostics can point at the exact offending characters.
//!
//! Lines and columns are zero-based internally; they are converted to the
//! one-based convention only when a diagnostic is rendered.
//!
//! # Composition
//!
//! Locations compose by span: the location of `a + b` is
//! `a.location.merge(b.location)`, which stretches from the leftmost offset
//! to the rightmost end. A node's location always subsumes the locations of
//! its children.

use std::fmt;

/// Identifies one source file within a compilation session.
///
/// The core compiles a single unit at a time, but locations still carry the
/// file identity so that a driver compiling several units can tell
/// diagnostics apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceId(pub u32);

/// A located region of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// File the region belongs to.
    pub source: SourceId,
    /// Zero-based line of the first byte.
    pub line: u32,
    /// Zero-based column (in bytes) of the first byte within its line.
    pub column: u32,
    /// Byte offset of the first byte from the start of the file.
    pub offset: u32,
    /// Length of the region in bytes.
    pub length: u32,
}

impl Location {
    /// Creates a location from its components.
    pub fn new(source: SourceId, line: u32, column: u32, offset: u32, length: u32) -> Self {
        Location { source, line, column, offset, length }
    }

    /// Byte offset one past the last byte of the region.
    pub fn end(&self) -> u32 {
        self.offset + self.length
    }

    /// Creates a location covering both `self` and `other`.
    ///
    /// The result starts at the leftmost offset and ends at the rightmost
    /// end; line and column follow the leftmost operand.
    pub fn merge(self, other: Location) -> Location {
        debug_assert_eq!(self.source, other.source);

        let (first, _) = if self.offset <= other.offset { (self, other) } else { (other, self) };
        let end = self.end().max(other.end());

        Location {
            source: first.source,
            line: first.line,
            column: first.column,
            offset: first.offset,
            length: end - first.offset,
        }
    }

    /// Returns `true` if `other` lies entirely within `self`.
    pub fn subsumes(&self, other: &Location) -> bool {
        self.source == other.source && self.offset <= other.offset && other.end() <= self.end()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.line + 1, self.column + 1)
    }
}

/// One source file: a name for diagnostics plus the full text.
///
/// The text is expected to be UTF-8 with LF or CRLF line endings; carriage
/// returns are treated as ignorable whitespace by the lexer. Construction
/// never fails; content checks (such as the tab ban) belong to the lexer,
/// which is the first phase to look at every byte.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: SourceId,
    pub name: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        SourceFile { id: SourceId::default(), name: name.into(), text: text.into() }
    }

    /// Returns the full text of the given zero-based line, without its
    /// terminator, or `None` when the file has fewer lines.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        self.text
            .split('\n')
            .nth(line as usize)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }
}
