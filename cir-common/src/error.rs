//! Error handling for the cir IR library
//!
//! This module defines the error taxonomy shared by the layout engine,
//! the constant folder, the visitor and the CFG builder, plus the
//! diagnostic sink used for non-fatal warnings (integer truncation,
//! missing goto labels).

use crate::source_loc::Location;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the IR engines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IrError {
    /// A broken structural invariant; indicates a caller error
    #[error("internal invariant violated: {0}")]
    Bug(String),

    /// A case the library does not handle
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// The layout engine cannot compute a size for this type
    #[error("cannot compute size of {type_name}: {reason}")]
    SizeOf { type_name: String, reason: String },
}

impl IrError {
    pub fn bug(message: impl Into<String>) -> Self {
        IrError::Bug(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        IrError::Unsupported(message.into())
    }

    pub fn size_of(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        IrError::SizeOf {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used across the IR engines
pub type IrResult<T> = Result<T, IrError>;

/// Warning severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A non-fatal diagnostic with an optional location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn warning(message: String) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            location: None,
        }
    }

    pub fn note(message: String) -> Self {
        Self {
            severity: Severity::Note,
            message,
            location: None,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {}: {}", loc, self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Sink for collecting warnings emitted while processing an IR
///
/// Processing never stops on a warning; the caller inspects the reporter
/// afterwards and decides what to surface.
#[derive(Debug, Clone, Default)]
pub struct ErrorReporter {
    diagnostics: Vec<Diagnostic>,
    warning_count: usize,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a warning diagnostic
    pub fn warn(&mut self, message: String) {
        self.diagnostics.push(Diagnostic::warning(message));
        self.warning_count += 1;
    }

    /// Report a warning diagnostic with a location
    pub fn warn_at(&mut self, message: String, location: Location) {
        self.diagnostics.push(Diagnostic::warning(message).at(location));
        self.warning_count += 1;
    }

    /// Report a note diagnostic
    pub fn note(&mut self, message: String) {
        self.diagnostics.push(Diagnostic::note(message));
    }

    /// Check if any warnings have been reported
    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    /// Get the number of warnings
    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    /// Get all diagnostics
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Clear all diagnostics
    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.warning_count = 0;
    }
}
