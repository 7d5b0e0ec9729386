//! The C type language
//!
//! This module defines the type representation together with the utilities
//! that read, replace and merge type attributes. Composite and enum types
//! refer to their shared descriptors by identity; named types refer to a
//! shared typedef descriptor so the definition and every use stay in sync.

use crate::attributes::{AttrList, AttrParam, Attribute};
use crate::ir::expressions::Exp;
use crate::ir::symbols::{CompRef, EnumRef, TypedefRef};
use std::fmt;

/// Integer kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    Char,
    SChar,
    UChar,
    Int,
    UInt,
    Short,
    UShort,
    Long,
    ULong,
    LongLong,
    ULongLong,
}

impl IntKind {
    /// Whether values of this kind are signed.
    ///
    /// Plain char counts as signed here; targets where char is unsigned
    /// are handled by the folder through the machine description.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntKind::Char
                | IntKind::SChar
                | IntKind::Int
                | IntKind::Short
                | IntKind::Long
                | IntKind::LongLong
        )
    }

    /// The fixed truncation width in bits used by compile-time arithmetic
    /// (the ILP32 table: long is 32 bits)
    pub fn truncation_bits(self) -> u32 {
        match self {
            IntKind::Char | IntKind::SChar | IntKind::UChar => 8,
            IntKind::Short | IntKind::UShort => 16,
            IntKind::Int | IntKind::UInt | IntKind::Long | IntKind::ULong => 32,
            IntKind::LongLong | IntKind::ULongLong => 64,
        }
    }
}

impl fmt::Display for IntKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntKind::Char => "char",
            IntKind::SChar => "signed char",
            IntKind::UChar => "unsigned char",
            IntKind::Int => "int",
            IntKind::UInt => "unsigned int",
            IntKind::Short => "short",
            IntKind::UShort => "unsigned short",
            IntKind::Long => "long",
            IntKind::ULong => "unsigned long",
            IntKind::LongLong => "long long",
            IntKind::ULongLong => "unsigned long long",
        };
        write!(f, "{}", name)
    }
}

/// Floating-point kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    Float,
    Double,
    LongDouble,
}

impl fmt::Display for FloatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FloatKind::Float => "float",
            FloatKind::Double => "double",
            FloatKind::LongDouble => "long double",
        };
        write!(f, "{}", name)
    }
}

/// A formal parameter of a function type
#[derive(Debug, Clone, PartialEq)]
pub struct FormalParam {
    pub name: String,
    pub ty: Type,
    pub attrs: AttrList,
}

impl FormalParam {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
            attrs: AttrList::new(),
        }
    }
}

/// The C type language. Every variant carries an attribute list.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void(AttrList),
    Int(IntKind, AttrList),
    Float(FloatKind, AttrList),
    Pointer(Box<Type>, AttrList),
    /// Array with an optional length expression
    Array(Box<Type>, Option<Box<Exp>>, AttrList),
    Function {
        return_type: Box<Type>,
        /// `None` means an unspecified parameter list, `Some(vec![])` an
        /// explicit `(void)`
        params: Option<Vec<FormalParam>>,
        variadic: bool,
        attrs: AttrList,
    },
    /// Reference to a typedef
    Named(TypedefRef, AttrList),
    /// Reference to a struct or union, shared by identity
    Comp(CompRef, AttrList),
    /// Reference to an enum, shared by identity
    Enum(EnumRef, AttrList),
    /// The built-in va_list handle
    VaList(AttrList),
}

impl Type {
    /// Plain `int` with no attributes
    pub fn int() -> Type {
        Type::Int(IntKind::Int, AttrList::new())
    }

    /// Plain `void` with no attributes
    pub fn void() -> Type {
        Type::Void(AttrList::new())
    }

    /// Unattributed pointer to `t`
    pub fn ptr_to(t: Type) -> Type {
        Type::Pointer(Box::new(t), AttrList::new())
    }

    /// Read the attribute list of the outermost constructor
    pub fn attrs(&self) -> &AttrList {
        match self {
            Type::Void(a)
            | Type::Int(_, a)
            | Type::Float(_, a)
            | Type::Pointer(_, a)
            | Type::Array(_, _, a)
            | Type::Function { attrs: a, .. }
            | Type::Named(_, a)
            | Type::Comp(_, a)
            | Type::Enum(_, a)
            | Type::VaList(a) => a,
        }
    }

    /// Replace the attribute list of the outermost constructor
    pub fn set_attrs(&mut self, new: AttrList) {
        match self {
            Type::Void(a)
            | Type::Int(_, a)
            | Type::Float(_, a)
            | Type::Pointer(_, a)
            | Type::Array(_, _, a)
            | Type::Function { attrs: a, .. }
            | Type::Named(_, a)
            | Type::Comp(_, a)
            | Type::Enum(_, a)
            | Type::VaList(a) => *a = new,
        }
    }

    /// Follow typedef references down to a non-named type.
    ///
    /// The named types' own attributes are dropped on the way; use
    /// `unroll_keep_attrs` when they must be preserved.
    pub fn unroll(&self) -> Type {
        match self {
            Type::Named(td, _) => td.borrow().ty.unroll(),
            other => other.clone(),
        }
    }

    /// Follow typedef references, merging each named type's attributes
    /// into the result
    pub fn unroll_keep_attrs(&self) -> Type {
        match self {
            Type::Named(td, attrs) => {
                let inner = td.borrow().ty.unroll_keep_attrs();
                inner.add_attributes(attrs)
            }
            other => other.clone(),
        }
    }

    /// Merge `extra` into this type's attributes.
    ///
    /// A `mode(<tag>)` attribute applied to an `int` or `unsigned int`
    /// does not survive as an attribute: it rewrites the integer kind per
    /// the GCC width-mode table, preserving signedness. Unrecognized mode
    /// targets are reported and kept as ordinary attributes.
    pub fn add_attributes(&self, extra: &AttrList) -> Type {
        if extra.is_empty() {
            return self.clone();
        }
        match self {
            Type::Int(ik, a) => {
                let mut kind = *ik;
                let mut rest = AttrList::new();
                for attr in extra.iter() {
                    match width_mode_target(&kind, attr) {
                        Some(new_kind) => kind = new_kind,
                        None => rest.add(attr.clone()),
                    }
                }
                Type::Int(kind, a.union(&rest))
            }
            other => {
                let mut t = other.clone();
                t.set_attrs(t.attrs().union(extra));
                t
            }
        }
    }

    /// Drop every attribute whose name appears in `names`
    pub fn remove_attributes(&self, names: &[&str]) -> Type {
        let mut t = self.clone();
        let mut a = t.attrs().clone();
        for name in names {
            a.drop_named(name);
        }
        t.set_attrs(a);
        t
    }

    /// True for integer and enum types
    pub fn is_integral(&self) -> bool {
        matches!(self.unroll(), Type::Int(..) | Type::Enum(..))
    }

    /// True for integer, enum and floating types
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self.unroll(),
            Type::Int(..) | Type::Enum(..) | Type::Float(..)
        )
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.unroll(), Type::Pointer(..))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.unroll(), Type::Array(..))
    }

    pub fn is_function(&self) -> bool {
        matches!(self.unroll(), Type::Function { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self.unroll(), Type::Void(_))
    }
}

/// Decode a `mode(<tag>)` attribute against an integer kind; `Some` is the
/// rewritten kind, `None` means the attribute is kept as-is
fn width_mode_target(kind: &IntKind, attr: &Attribute) -> Option<IntKind> {
    if attr.name != "mode" {
        return None;
    }
    let mode = match attr.params.as_slice() {
        [AttrParam::Cons(mode, args)] if args.is_empty() => mode.as_str(),
        _ => {
            log::error!("malformed width mode attribute {:?}", attr.params);
            return None;
        }
    };
    let rewritten = match (kind, mode) {
        (IntKind::Int, "__QI__") | (IntKind::Int, "__byte__") => IntKind::Char,
        (IntKind::Int, "__HI__") => IntKind::Short,
        (IntKind::Int, "__SI__") => IntKind::Int,
        (IntKind::Int, "__word__") | (IntKind::Int, "__pointer__") => IntKind::Long,
        (IntKind::Int, "__DI__") => IntKind::LongLong,
        (IntKind::UInt, "__QI__") | (IntKind::UInt, "__byte__") => IntKind::UChar,
        (IntKind::UInt, "__HI__") => IntKind::UShort,
        (IntKind::UInt, "__SI__") => IntKind::UInt,
        (IntKind::UInt, "__word__") | (IntKind::UInt, "__pointer__") => IntKind::ULong,
        (IntKind::UInt, "__DI__") => IntKind::ULongLong,
        _ => {
            log::error!("width mode {} applied to unexpected type {}", mode, kind);
            return None;
        }
    };
    Some(rewritten)
}

impl fmt::Display for Type {
    /// Compact notation for diagnostics; the pretty printer owns the real
    /// C rendering
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void(_) => write!(f, "void"),
            Type::Int(ik, _) => write!(f, "{}", ik),
            Type::Float(fk, _) => write!(f, "{}", fk),
            Type::Pointer(base, _) => write!(f, "{} *", base),
            Type::Array(base, Some(_), _) => write!(f, "{} [n]", base),
            Type::Array(base, None, _) => write!(f, "{} []", base),
            Type::Function { return_type, .. } => write!(f, "{} ()", return_type),
            Type::Named(td, _) => write!(f, "{}", td.borrow().name),
            Type::Comp(comp, _) => {
                let ci = comp.borrow();
                let tag = if ci.is_struct { "struct" } else { "union" };
                write!(f, "{} {}", tag, ci.name())
            }
            Type::Enum(en, _) => write!(f, "enum {}", en.borrow().name),
            Type::VaList(_) => write!(f, "__builtin_va_list"),
        }
    }
}
