//! Source location tracking for diagnostics and line directives
//!
//! This module provides the location type attached to globals, statements
//! and instructions. The representation is deliberately small: a filename
//! and a 1-based line number, which is all the line-directive emitter needs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A location in a source file (line is 1-based; 0 means "unknown")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl Location {
    /// Create a location with filename
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: file.to_string(),
            line,
        }
    }

    /// The unknown location, used for synthesized nodes
    pub fn unknown() -> Self {
        Self {
            file: String::new(),
            line: 0,
        }
    }

    /// True if this location carries real source information
    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}:{}", self.file, self.line)
        } else {
            write!(f, "<unknown>")
        }
    }
}
