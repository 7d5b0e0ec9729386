//! The IR datatypes
//!
//! Leaf-to-root: operators, the type language, the shared symbol
//! descriptors, expressions and lvalues, instructions and statements,
//! then globals and the module container. `builder` holds the
//! constructors that maintain the invariants across all of them.

pub mod builder;
pub mod expressions;
pub mod module;
pub mod ops;
pub mod statements;
pub mod symbols;
pub mod types;

pub use expressions::{char_const_to_int, type_of, type_of_lval, type_offset};
pub use expressions::{Constant, Exp, Host, Init, Lval, Offset};
pub use module::{Global, Module};
pub use ops::{BinaryOp, UnaryOp};
pub use statements::{
    AsmDetails, Block, FunDec, Instr, Label, Stmt, StmtId, StmtKind, StmtPool,
};
pub use symbols::{
    hash_name, CompInfo, CompRef, CompWeak, EnumInfo, EnumRef, FieldInfo, FieldRef,
    Storage, TypedefInfo, TypedefRef, VarInfo, VarRef, MISSING_FIELD_NAME,
};
pub use types::{FloatKind, FormalParam, IntKind, Type};
