//! Expression and lvalue nodes
//!
//! Expressions are side-effect free; anything effectful is an instruction.
//! Lvalues are a (host, offset) pair: the host is either a variable or a
//! dereferenced address, the offset a chain of field selections and array
//! indexings. The explicit `StartOf` marker records array-to-pointer decay
//! without printing anything for it.

use crate::attributes::AttrList;
use crate::ir::ops::{BinaryOp, UnaryOp};
use crate::ir::symbols::{FieldRef, VarRef};
use crate::ir::types::{FloatKind, IntKind, Type};
use cir_common::{IrError, IrResult, Machine};

/// Compile-time constants
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// 64-bit integer tagged with its kind; `text` preserves the source
    /// spelling for exact re-emission
    Int {
        value: i64,
        kind: IntKind,
        text: Option<String>,
    },
    /// String literal (without quotes)
    Str(String),
    /// Character literal
    Chr(u8),
    /// Floating constant tagged with its kind
    Real {
        value: f64,
        kind: FloatKind,
        text: Option<String>,
    },
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Const(Constant),
    /// Read of an lvalue
    Lval(Lval),
    SizeOfType(Type),
    SizeOfExpr(Box<Exp>),
    AlignOfType(Type),
    AlignOfExpr(Box<Exp>),
    Unary {
        op: UnaryOp,
        operand: Box<Exp>,
        ty: Type,
    },
    Binary {
        op: BinaryOp,
        left: Box<Exp>,
        right: Box<Exp>,
        ty: Type,
    },
    Cast {
        target: Type,
        operand: Box<Exp>,
    },
    /// Address of an lvalue
    AddrOf(Lval),
    /// Array-to-pointer decay of an array lvalue; never printed
    StartOf(Lval),
}

impl Exp {
    /// Integer constant of kind `int`
    pub fn int_const(value: i64) -> Exp {
        Exp::Const(Constant::Int {
            value,
            kind: IntKind::Int,
            text: None,
        })
    }

    /// Recover the 64-bit value of a constant expression, looking through
    /// casts and character constants
    pub fn is_integer(&self) -> Option<i64> {
        match self {
            Exp::Const(Constant::Int { value, .. }) => Some(*value),
            Exp::Const(Constant::Chr(c)) => Some(*c as i64),
            Exp::Cast { operand, .. } => operand.is_integer(),
            _ => None,
        }
    }

    /// Test for a literal zero
    pub fn is_zero(&self) -> bool {
        self.is_integer() == Some(0)
    }
}

/// The base of an lvalue
#[derive(Debug, Clone, PartialEq)]
pub enum Host {
    /// A declared variable, shared by identity
    Var(VarRef),
    /// Dereference of an address expression
    Mem(Box<Exp>),
}

/// Offset chains applied to a host
#[derive(Debug, Clone, PartialEq)]
pub enum Offset {
    NoOffset,
    /// Select a field, then continue with the rest of the chain
    Field(FieldRef, Box<Offset>),
    /// Index into an array, then continue with the rest of the chain
    Index(Box<Exp>, Box<Offset>),
}

impl Offset {
    /// True when the chain is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Offset::NoOffset)
    }
}

/// An lvalue: a host plus an offset chain
#[derive(Debug, Clone, PartialEq)]
pub struct Lval {
    pub host: Host,
    pub offset: Offset,
}

impl Lval {
    pub fn new(host: Host, offset: Offset) -> Self {
        Self { host, offset }
    }
}

/// Initializers for variable definitions
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// A single expression
    Single(Exp),
    /// Compound initializer for an aggregate; each designator is a single
    /// `Field` or `Index` offset terminated by `NoOffset`
    Compound {
        ty: Type,
        items: Vec<(Offset, Init)>,
    },
}

/// Interpret a character constant as an int value, honoring the target's
/// char signedness
pub fn char_const_to_int(machine: &Machine, c: u8) -> i64 {
    if c < 128 || machine.char_is_unsigned {
        c as i64
    } else {
        c as i64 - 256
    }
}

/// Reconstruct the type of an expression
pub fn type_of(e: &Exp) -> IrResult<Type> {
    match e {
        Exp::Const(Constant::Int { kind, .. }) => Ok(Type::Int(*kind, AttrList::new())),
        Exp::Const(Constant::Chr(_)) => Ok(Type::int()),
        Exp::Const(Constant::Str(_)) => {
            Ok(Type::ptr_to(Type::Int(IntKind::Char, AttrList::new())))
        }
        Exp::Const(Constant::Real { kind, .. }) => {
            Ok(Type::Float(*kind, AttrList::new()))
        }
        Exp::Lval(lv) => type_of_lval(lv),
        Exp::SizeOfType(_)
        | Exp::SizeOfExpr(_)
        | Exp::AlignOfType(_)
        | Exp::AlignOfExpr(_) => Ok(Type::Int(IntKind::UInt, AttrList::new())),
        Exp::Unary { ty, .. } | Exp::Binary { ty, .. } => Ok(ty.clone()),
        Exp::Cast { target, .. } => Ok(target.clone()),
        Exp::AddrOf(lv) => Ok(Type::ptr_to(type_of_lval(lv)?)),
        Exp::StartOf(lv) => match type_of_lval(lv)?.unroll() {
            Type::Array(elem, _, _) => Ok(Type::ptr_to(*elem)),
            other => Err(IrError::bug(format!(
                "StartOf on a non-array lvalue of type {}",
                other
            ))),
        },
    }
}

/// Reconstruct the type of an lvalue
pub fn type_of_lval(lv: &Lval) -> IrResult<Type> {
    let base = match &lv.host {
        Host::Var(vi) => vi.borrow().ty.clone(),
        Host::Mem(addr) => match type_of(addr)?.unroll() {
            Type::Pointer(pointee, _) => *pointee,
            other => {
                return Err(IrError::bug(format!(
                    "Mem on a non-pointer expression of type {}",
                    other
                )))
            }
        },
    };
    type_offset(&base, &lv.offset)
}

/// Apply an offset chain to a base type
pub fn type_offset(base: &Type, offset: &Offset) -> IrResult<Type> {
    match offset {
        Offset::NoOffset => Ok(base.clone()),
        Offset::Index(_, rest) => match base.unroll() {
            Type::Array(elem, _, _) => type_offset(&elem, rest),
            other => Err(IrError::bug(format!(
                "Index offset on a non-array type {}",
                other
            ))),
        },
        Offset::Field(f, rest) => {
            let field_ty = f.borrow().ty.clone();
            type_offset(&field_ty, rest)
        }
    }
}
