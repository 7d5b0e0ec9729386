//! Top-level globals and the translation-unit container
//!
//! A `Module` is the IR of one C translation unit: an ordered sequence of
//! globals plus an optional global-initializer function. Ordering matters:
//! a composite, enum or typedef definition must appear before the globals
//! that use it other than through pointer indirection.

use crate::attributes::Attribute;
use crate::ir::expressions::Init;
use crate::ir::statements::FunDec;
use crate::ir::symbols::{CompRef, EnumRef, TypedefRef, VarRef};
use cir_common::Location;

/// Top-level declarations and definitions
#[derive(Debug, Clone)]
pub enum Global {
    /// A typedef definition
    Typedef(TypedefRef, Location),
    /// Definition of a struct or union tag
    CompTag(CompRef, Location),
    /// Definition of an enum tag
    EnumTag(EnumRef, Location),
    /// Declaration (prototype) of a variable or function
    VarDecl(VarRef, Location),
    /// Definition of a variable, with an optional initializer
    Var(VarRef, Option<Init>, Location),
    /// Definition of a function
    Fun(FunDec, Location),
    /// Top-level inline assembly
    Asm(String, Location),
    /// A pragma, carried as an attribute-shaped payload
    Pragma(Attribute, Location),
    /// Verbatim text emitted unchanged
    Text(String),
}

impl Global {
    /// The source location, when the global carries one
    pub fn loc(&self) -> Option<&Location> {
        match self {
            Global::Typedef(_, loc)
            | Global::CompTag(_, loc)
            | Global::EnumTag(_, loc)
            | Global::VarDecl(_, loc)
            | Global::Var(_, _, loc)
            | Global::Fun(_, loc)
            | Global::Asm(_, loc)
            | Global::Pragma(_, loc) => Some(loc),
            Global::Text(_) => None,
        }
    }
}

/// The IR of one translation unit
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Name of the file this came from
    pub filename: String,
    /// Globals in file order
    pub globals: Vec<Global>,
    /// Function collecting initializers for globals, when one was built
    pub global_init: Option<FunDec>,
    /// Whether a call to the global initializer has been injected
    pub global_init_called: bool,
}

impl Module {
    pub fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            globals: Vec::new(),
            global_init: None,
            global_init_called: false,
        }
    }

    /// Iterate over the function definitions in file order
    pub fn functions(&self) -> impl Iterator<Item = &FunDec> {
        self.globals.iter().filter_map(|g| match g {
            Global::Fun(f, _) => Some(f),
            _ => None,
        })
    }

    /// Iterate mutably over the function definitions in file order
    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut FunDec> {
        self.globals.iter_mut().filter_map(|g| match g {
            Global::Fun(f, _) => Some(f),
            _ => None,
        })
    }
}
