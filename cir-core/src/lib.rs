//! cir - A typed C intermediate representation
//!
//! This crate provides the IR for ISO C programs together with the
//! engines that operate on it:
//! - IR: types, expressions, lvalues, instructions, statements, globals
//! - Attributes: sorted lists, classification and merging
//! - Type signatures: canonical equivalence checking
//! - Layout: sizes, alignments and field offsets for GCC and MSVC targets
//! - Folding: compile-time evaluation under C arithmetic rules
//! - Visiting: generic rewrite traversal preserving sharing
//! - Printing: emission back to compilable C source
//! - CFG: successor/predecessor links on statements
//! - Alpha: fresh names and deep function cloning
//!
//! The parser producing an initial IR and the driver composing these
//! services live elsewhere; this crate is the library between them.

pub mod alpha;
pub mod attributes;
pub mod cfg;
pub mod fold;
pub mod ir;
pub mod layout;
pub mod printer;
pub mod typesig;
pub mod visit;

pub use alpha::{copy_function, new_alpha_name, AlphaTable};
pub use attributes::{
    attribute_class, partition_attributes, separate_storage_modifiers, AttrClass, AttrList,
    AttrParam, Attribute,
};
pub use cfg::compute_cfg_info;
pub use cir_common::{Diagnostic, ErrorReporter, IrError, IrResult, Location, Machine};
pub use fold::{const_fold, increm, truncate_integer64};
pub use ir::{
    builder, char_const_to_int, hash_name, type_of, type_of_lval, type_offset, AsmDetails,
    BinaryOp, Block, CompInfo, CompRef, CompWeak, Constant, EnumInfo, EnumRef, Exp,
    FieldInfo, FieldRef, FloatKind, FormalParam, FunDec, Global, Host, Init, Instr,
    IntKind, Label, Lval, Module, Offset, Stmt, StmtId, StmtKind, StmtPool, Storage, Type,
    TypedefInfo, TypedefRef, UnaryOp, VarInfo, VarRef, MISSING_FIELD_NAME,
};
pub use layout::{
    align_of, bits_offset, bits_size_of, offset_of_field_acc, size_of, BitPack, FieldAcc,
};
pub use printer::{Printer, PrinterOptions};
pub use typesig::{type_sig, type_sig_with_attrs, types_equal, TypeSig};
pub use visit::{VisitAction, Visitor};
