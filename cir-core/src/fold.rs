//! Compile-time evaluation of constant expressions
//!
//! The folder walks an expression bottom-up and rewrites subexpressions
//! when enough is known. Binary operations fold once both sides are
//! integer constants of the same kind and the result type is integral;
//! the arithmetic is plain 64-bit wrap, and truncation to the constant's
//! kind happens only when a cast demands it. With `machdep` set, sizeof
//! and alignof resolve through the layout engine; otherwise they stay
//! symbolic so the result is target-independent.

use crate::ir::builder::integer;
use crate::ir::expressions::{char_const_to_int, type_of, Constant, Exp};
use crate::ir::ops::{BinaryOp, UnaryOp};
use crate::ir::types::{IntKind, Type};
use crate::layout;
use cir_common::{ErrorReporter, IrResult, Machine};

/// Truncate a 64-bit value to the kind's width, sign- or zero-extending
/// the result back to 64 bits. Returns the value and whether it changed.
pub fn truncate_integer64(kind: IntKind, value: i64) -> (i64, bool) {
    let bits = kind.truncation_bits();
    if bits == 64 {
        return (value, false);
    }
    let shift = 64 - bits;
    let shifted = (value as u64) << shift;
    let truncated = if kind.is_signed() {
        (shifted as i64) >> shift
    } else {
        (shifted >> shift) as i64
    };
    (truncated, truncated != value)
}

/// Whether values of this kind compare and shift as unsigned on the
/// given target (plain char follows the target's char signedness)
fn is_unsigned_kind(machine: &Machine, kind: IntKind) -> bool {
    if kind == IntKind::Char {
        machine.char_is_unsigned
    } else {
        !kind.is_signed()
    }
}

/// Kind-aware greater-or-equal on 64-bit constants
fn ge(unsigned: bool, a: i64, b: i64) -> bool {
    if unsigned {
        (a as u64) >= (b as u64)
    } else {
        a >= b
    }
}

/// An integer constant of a specific kind, without truncation
fn kind_const(value: i64, kind: IntKind) -> Exp {
    Exp::Const(Constant::Int {
        value,
        kind,
        text: None,
    })
}

/// Normalize an operand for integer folding: character constants promote
/// to int, and casts to bare integer types truncate the constant under
/// them. Non-constant operands come back unchanged.
fn mk_int(machine: &Machine, e: &Exp) -> Exp {
    match e {
        Exp::Const(Constant::Chr(c)) => integer(char_const_to_int(machine, *c)),
        Exp::Cast { target, operand } => match target {
            Type::Int(kind, attrs) if attrs.is_empty() => {
                match mk_int(machine, operand) {
                    Exp::Const(Constant::Int { value, .. }) => {
                        let (truncated, _) = truncate_integer64(*kind, value);
                        kind_const(truncated, *kind)
                    }
                    inner => Exp::Cast {
                        target: target.clone(),
                        operand: Box::new(inner),
                    },
                }
            }
            _ => e.clone(),
        },
        _ => e.clone(),
    }
}

fn as_int_const(e: &Exp) -> Option<(i64, IntKind)> {
    match e {
        Exp::Const(Constant::Int { value, kind, .. }) => Some((*value, *kind)),
        _ => None,
    }
}

/// Fold an expression bottom-up.
///
/// `machdep` enables target-dependent rewrites: sizeof/alignof resolve
/// through the layout engine against `machine`. Truncation performed by
/// cast folding reports through `reporter`.
pub fn const_fold(
    machine: &Machine,
    machdep: bool,
    e: &Exp,
    reporter: &mut ErrorReporter,
) -> Exp {
    match e {
        Exp::Binary {
            op,
            left,
            right,
            ty,
        } => const_fold_binop(machine, machdep, *op, left, right, ty, reporter),

        Exp::Unary { op, operand, ty } if ty.is_integral() => {
            let inner = const_fold(machine, machdep, operand, reporter);
            match (op, as_int_const(&mk_int(machine, &inner))) {
                (UnaryOp::Neg, Some((v, kind))) => kind_const(v.wrapping_neg(), kind),
                (UnaryOp::BitNot, Some((v, kind))) => kind_const(!v, kind),
                _ => Exp::Unary {
                    op: *op,
                    operand: Box::new(inner),
                    ty: ty.clone(),
                },
            }
        }

        Exp::Cast { target, operand } => {
            let inner = const_fold(machine, machdep, operand, reporter);
            match (&inner, target.unroll()) {
                (Exp::Const(Constant::Int { value, .. }), Type::Int(kind, attrs))
                    if attrs.is_empty() =>
                {
                    let (truncated, changed) = truncate_integer64(kind, *value);
                    if changed {
                        reporter.warn(format!(
                            "cast truncates {:#x} to {:#x} for {}",
                            value, truncated, kind
                        ));
                    }
                    kind_const(truncated, kind)
                }
                _ => Exp::Cast {
                    target: target.clone(),
                    operand: Box::new(inner),
                },
            }
        }

        Exp::Const(Constant::Chr(c)) => integer(char_const_to_int(machine, *c)),

        Exp::SizeOfType(t) if machdep => match layout::bits_size_of(machine, t) {
            Ok(bits) => kind_const((bits / 8) as i64, IntKind::UInt),
            Err(_) => e.clone(),
        },
        Exp::SizeOfExpr(inner) if machdep => match type_of(inner) {
            Ok(t) => const_fold(machine, machdep, &Exp::SizeOfType(t), reporter),
            Err(_) => e.clone(),
        },
        Exp::AlignOfType(t) if machdep => match layout::align_of(machine, t) {
            Ok(align) => kind_const(align as i64, IntKind::UInt),
            Err(_) => e.clone(),
        },
        Exp::AlignOfExpr(inner) if machdep => match type_of(inner) {
            Ok(t) => const_fold(machine, machdep, &Exp::AlignOfType(t), reporter),
            Err(_) => e.clone(),
        },

        _ => e.clone(),
    }
}

#[allow(clippy::too_many_arguments)]
fn const_fold_binop(
    machine: &Machine,
    machdep: bool,
    op: BinaryOp,
    left: &Exp,
    right: &Exp,
    ty: &Type,
    reporter: &mut ErrorReporter,
) -> Exp {
    let l = const_fold(machine, machdep, left, reporter);
    let r = const_fold(machine, machdep, right, reporter);

    // Pointer arithmetic with a zero offset is the pointer itself
    if matches!(
        op,
        BinaryOp::PtrAdd | BinaryOp::PtrIndex | BinaryOp::PtrSub
    ) {
        if let Some((0, _)) = as_int_const(&mk_int(machine, &r)) {
            return l;
        }
    }

    if ty.is_integral() {
        let li = mk_int(machine, &l);
        let ri = mk_int(machine, &r);
        let lc = as_int_const(&li);
        let rc = as_int_const(&ri);

        // Adding or subtracting a literal zero
        match (op, lc, rc) {
            (BinaryOp::Add, Some((0, _)), _) => return ri,
            (BinaryOp::Add, _, Some((0, _))) => return li,
            (BinaryOp::Sub, _, Some((0, _))) => return li,
            _ => {}
        }

        if let (Some((a, ka)), Some((b, kb))) = (lc, rc) {
            let unsigned = is_unsigned_kind(machine, ka);
            if ka == kb {
                match op {
                    BinaryOp::Add => return kind_const(a.wrapping_add(b), ka),
                    BinaryOp::Sub => return kind_const(a.wrapping_sub(b), ka),
                    BinaryOp::Mul => return kind_const(a.wrapping_mul(b), ka),
                    BinaryOp::Div => match a.checked_div(b) {
                        Some(q) => return kind_const(q, ka),
                        None => {
                            return Exp::Binary {
                                op,
                                left: Box::new(l),
                                right: Box::new(r),
                                ty: ty.clone(),
                            }
                        }
                    },
                    BinaryOp::Mod => match a.checked_rem(b) {
                        Some(m) => return kind_const(m, ka),
                        None => {
                            return Exp::Binary {
                                op,
                                left: Box::new(l),
                                right: Box::new(r),
                                ty: ty.clone(),
                            }
                        }
                    },
                    BinaryOp::BitAnd => return kind_const(a & b, ka),
                    BinaryOp::BitOr => return kind_const(a | b, ka),
                    BinaryOp::BitXor => return kind_const(a ^ b, ka),
                    BinaryOp::Eq => return integer((a == b) as i64),
                    BinaryOp::Ne => return integer((a != b) as i64),
                    BinaryOp::Ge => return integer(ge(unsigned, a, b) as i64),
                    BinaryOp::Lt => return integer(!ge(unsigned, a, b) as i64),
                    BinaryOp::Le => return integer(ge(unsigned, b, a) as i64),
                    BinaryOp::Gt => return integer(!ge(unsigned, b, a) as i64),
                    _ => {}
                }
            }
            // Shifts do not require matching kinds on both sides
            if matches!(op, BinaryOp::Shl | BinaryOp::Shr) && (0..64).contains(&b) {
                match op {
                    BinaryOp::Shl => return kind_const(a << b, ka),
                    BinaryOp::Shr => {
                        let shifted = if unsigned {
                            ((a as u64) >> b) as i64
                        } else {
                            a >> b
                        };
                        return kind_const(shifted, ka);
                    }
                    _ => unreachable!(),
                }
            }
        }
    }

    Exp::Binary {
        op,
        left: Box::new(l),
        right: Box::new(r),
        ty: ty.clone(),
    }
}

/// `e + k`, as pointer or integer addition depending on the type of `e`,
/// folded without target-dependent rewrites
pub fn increm(
    machine: &Machine,
    e: Exp,
    k: i64,
    reporter: &mut ErrorReporter,
) -> IrResult<Exp> {
    let ty = type_of(&e)?;
    let op = if ty.is_pointer() {
        BinaryOp::PtrAdd
    } else {
        BinaryOp::Add
    };
    Ok(const_fold(
        machine,
        false,
        &Exp::Binary {
            op,
            left: Box::new(e),
            right: Box::new(integer(k)),
            ty,
        },
        reporter,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttrList;
    use crate::ir::builder::{make_global_var, var_lval};

    fn fold(e: &Exp) -> Exp {
        let mut reporter = ErrorReporter::new();
        const_fold(&Machine::gcc32(), false, e, &mut reporter)
    }

    fn binop(op: BinaryOp, a: Exp, b: Exp) -> Exp {
        Exp::Binary {
            op,
            left: Box::new(a),
            right: Box::new(b),
            ty: Type::int(),
        }
    }

    #[test]
    fn test_truncate_is_idempotent() {
        for kind in [
            IntKind::SChar,
            IntKind::UChar,
            IntKind::UShort,
            IntKind::Int,
            IntKind::ULong,
            IntKind::LongLong,
        ] {
            for v in [0i64, 1, -1, 0x1FFFF, i64::MIN, i64::MAX, -294_967_296] {
                let (once, _) = truncate_integer64(kind, v);
                let (twice, changed) = truncate_integer64(kind, once);
                assert_eq!(once, twice);
                assert!(!changed);
            }
        }
    }

    #[test]
    fn test_truncate_signs() {
        assert_eq!(truncate_integer64(IntKind::UShort, 0x1FFFF).0, 0xFFFF);
        assert_eq!(truncate_integer64(IntKind::SChar, 0xFF).0, -1);
        assert_eq!(truncate_integer64(IntKind::UChar, -1).0, 255);
        assert_eq!(truncate_integer64(IntKind::Int, 42).0, 42);
    }

    #[test]
    fn test_add_wraps_in_64_bits() {
        // 2_000_000_000 + 2_000_000_000 as int folds to the raw 64-bit sum
        let e = binop(
            BinaryOp::Add,
            integer(2_000_000_000),
            integer(2_000_000_000),
        );
        let folded = fold(&e);
        assert_eq!(
            folded,
            Exp::Const(Constant::Int {
                value: 4_000_000_000,
                kind: IntKind::Int,
                text: None,
            })
        );
    }

    #[test]
    fn test_fold_is_idempotent() {
        let e = binop(
            BinaryOp::Add,
            integer(2_000_000_000),
            integer(2_000_000_000),
        );
        let once = fold(&e);
        assert_eq!(fold(&once), once);
    }

    #[test]
    fn test_division_by_zero_left_alone() {
        let e = binop(BinaryOp::Div, integer(10), integer(0));
        let folded = fold(&e);
        assert!(matches!(folded, Exp::Binary { .. }));

        let e = binop(BinaryOp::Mod, integer(10), integer(0));
        assert!(matches!(fold(&e), Exp::Binary { .. }));
    }

    #[test]
    fn test_unsigned_comparison_splits_on_high_bit() {
        let big = Exp::Const(Constant::Int {
            value: -1, // 0xFFFF_FFFF_FFFF_FFFF as unsigned
            kind: IntKind::ULongLong,
            text: None,
        });
        let one = Exp::Const(Constant::Int {
            value: 1,
            kind: IntKind::ULongLong,
            text: None,
        });
        let e = binop(BinaryOp::Lt, big.clone(), one.clone());
        assert_eq!(fold(&e), integer(0));

        let e = binop(BinaryOp::Gt, big, one);
        assert_eq!(fold(&e), integer(1));
    }

    #[test]
    fn test_signed_comparison() {
        let e = binop(BinaryOp::Lt, integer(-1), integer(1));
        assert_eq!(fold(&e), integer(1));
        let e = binop(BinaryOp::Ge, integer(5), integer(5));
        assert_eq!(fold(&e), integer(1));
    }

    #[test]
    fn test_shift_right_logical_for_unsigned() {
        let a = Exp::Const(Constant::Int {
            value: -8,
            kind: IntKind::ULongLong,
            text: None,
        });
        let e = Exp::Binary {
            op: BinaryOp::Shr,
            left: Box::new(a),
            right: Box::new(integer(1)),
            ty: Type::Int(IntKind::ULongLong, AttrList::new()),
        };
        let folded = fold(&e);
        assert_eq!(
            folded,
            Exp::Const(Constant::Int {
                value: ((-8i64 as u64) >> 1) as i64,
                kind: IntKind::ULongLong,
                text: None,
            })
        );
    }

    #[test]
    fn test_shift_right_arithmetic_for_signed() {
        let e = binop(BinaryOp::Shr, integer(-8), integer(1));
        assert_eq!(
            fold(&e),
            Exp::Const(Constant::Int {
                value: -4,
                kind: IntKind::Int,
                text: None,
            })
        );
    }

    #[test]
    fn test_oversized_shift_left_alone() {
        let e = binop(BinaryOp::Shl, integer(1), integer(64));
        assert!(matches!(fold(&e), Exp::Binary { .. }));
    }

    #[test]
    fn test_cast_truncates_with_warning() {
        let mut reporter = ErrorReporter::new();
        let e = Exp::Cast {
            target: Type::Int(IntKind::SChar, AttrList::new()),
            operand: Box::new(integer(0x1FF)),
        };
        let folded = const_fold(&Machine::gcc32(), false, &e, &mut reporter);
        assert_eq!(
            folded,
            Exp::Const(Constant::Int {
                value: -1,
                kind: IntKind::SChar,
                text: None,
            })
        );
        assert!(reporter.has_warnings());
    }

    #[test]
    fn test_char_constant_promotes_to_int() {
        let e = binop(
            BinaryOp::Add,
            Exp::Const(Constant::Chr(b'a')),
            integer(1),
        );
        assert_eq!(fold(&e), integer(98));
    }

    #[test]
    fn test_unary_folds() {
        let e = Exp::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(integer(5)),
            ty: Type::int(),
        };
        assert_eq!(fold(&e), integer(-5));

        let e = Exp::Unary {
            op: UnaryOp::BitNot,
            operand: Box::new(integer(0)),
            ty: Type::int(),
        };
        assert_eq!(fold(&e), integer(-1));
    }

    #[test]
    fn test_add_zero_simplifies() {
        let x = Exp::Lval(var_lval(&make_global_var("x", Type::int())));
        let e = binop(BinaryOp::Add, x.clone(), integer(0));
        assert_eq!(fold(&e), x);

        let e = binop(BinaryOp::Sub, x.clone(), integer(0));
        assert_eq!(fold(&e), x);
    }

    #[test]
    fn test_ptr_plus_zero_simplifies() {
        let p = Exp::Lval(var_lval(&make_global_var(
            "p",
            Type::ptr_to(Type::int()),
        )));
        let e = Exp::Binary {
            op: BinaryOp::PtrAdd,
            left: Box::new(p.clone()),
            right: Box::new(integer(0)),
            ty: Type::ptr_to(Type::int()),
        };
        assert_eq!(fold(&e), p);
    }

    #[test]
    fn test_sizeof_stays_symbolic_without_machdep() {
        let e = Exp::SizeOfType(Type::int());
        assert_eq!(fold(&e), e);
    }

    #[test]
    fn test_sizeof_resolves_with_machdep() {
        let mut reporter = ErrorReporter::new();
        let e = Exp::SizeOfType(Type::int());
        let folded = const_fold(&Machine::gcc32(), true, &e, &mut reporter);
        assert_eq!(
            folded,
            Exp::Const(Constant::Int {
                value: 4,
                kind: IntKind::UInt,
                text: None,
            })
        );
    }

    #[test]
    fn test_increm_picks_pointer_flavor() {
        let mut reporter = ErrorReporter::new();
        let machine = Machine::gcc32();
        let p = Exp::Lval(var_lval(&make_global_var(
            "p",
            Type::ptr_to(Type::int()),
        )));
        let e = increm(&machine, p, 1, &mut reporter).unwrap();
        assert!(matches!(
            e,
            Exp::Binary {
                op: BinaryOp::PtrAdd,
                ..
            }
        ));

        let n = Exp::Lval(var_lval(&make_global_var("n", Type::int())));
        let e = increm(&machine, n, 1, &mut reporter).unwrap();
        assert!(matches!(
            e,
            Exp::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }
}
