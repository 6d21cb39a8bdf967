//! Source location tracking and span utilities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a location in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based)
    pub column: u32,
    /// Byte offset from the start of the source
    pub offset: usize,
}

impl Span {
    /// Create a new span
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// Create a dummy span for testing and synthesized nodes
    pub fn dummy() -> Self {
        Self {
            line: 0,
            column: 0,
            offset: 0,
        }
    }

    /// Pick the earlier of two spans (by byte offset)
    pub fn merge(self, other: Span) -> Span {
        if other.offset < self.offset {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
