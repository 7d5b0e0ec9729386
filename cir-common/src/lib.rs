//! cir - Common types
//!
//! This crate provides the leaf types shared by the cir IR library:
//! - Source locations attached to IR nodes
//! - Target machine descriptions (sizes, alignments, dialect)
//! - The error taxonomy and the warning sink

pub mod error;
pub mod machine;
pub mod source_loc;

pub use error::{Diagnostic, ErrorReporter, IrError, IrResult, Severity};
pub use machine::Machine;
pub use source_loc::Location;
