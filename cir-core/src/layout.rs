//! Target-dependent type layout
//!
//! Sizes and field offsets are computed in bits, because bitfields make
//! byte granularity insufficient. The two dialects share one accumulator
//! shape but differ in how bitfields pack: GCC places a bitfield at the
//! next free bit unless it would cross more alignment boundaries of its
//! own type than the type spans, while MSVC maintains an explicit
//! bit-pack per storage unit and closes it whenever the storage width
//! changes or a non-bitfield follows.

use crate::fold::const_fold;
use crate::ir::expressions::{Exp, Offset};
use crate::ir::symbols::{CompRef, FieldRef};
use crate::ir::types::{FloatKind, IntKind, Type};
use cir_common::{ErrorReporter, IrError, IrResult, Machine};

/// Accumulator threaded through a composite's fields
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAcc {
    /// First free bit after the fields seen so far
    pub first_free: u64,
    /// Start bit of the last field placed
    pub last_start: u64,
    /// Width in bits of the last field placed
    pub last_width: u64,
    /// Open MSVC bit pack, if any
    pub pack: Option<BitPack>,
}

/// An open run of bitfields sharing one storage unit (MSVC)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitPack {
    /// Bit where the storage unit starts
    pub start: u64,
    /// Integer kind of the storage unit
    pub kind: IntKind,
    /// Width in bits of the storage unit
    pub width: u64,
}

impl FieldAcc {
    /// The accumulator a composite starts from
    pub fn start() -> Self {
        Self {
            first_free: 0,
            last_start: 0,
            last_width: 0,
            pack: None,
        }
    }
}

fn round_up(n: u64, multiple: u64) -> u64 {
    n.div_ceil(multiple) * multiple
}

/// Byte alignment of a type
pub fn align_of(machine: &Machine, t: &Type) -> IrResult<u32> {
    match t.unroll() {
        Type::Int(kind, _) => Ok(match kind {
            IntKind::Char | IntKind::SChar | IntKind::UChar => 1,
            IntKind::Short | IntKind::UShort => machine.sizeof_short,
            IntKind::Int | IntKind::UInt => machine.sizeof_int,
            IntKind::Long | IntKind::ULong => machine.sizeof_long,
            IntKind::LongLong | IntKind::ULongLong => machine.alignof_longlong,
        }),
        Type::Enum(..) => Ok(machine.sizeof_enum),
        Type::Float(kind, _) => Ok(match kind {
            FloatKind::Float => machine.sizeof_float,
            FloatKind::Double => machine.alignof_double,
            FloatKind::LongDouble => machine.alignof_longdouble,
        }),
        Type::Pointer(..) | Type::VaList(_) => Ok(machine.sizeof_ptr),
        Type::Array(elem, _, _) => align_of(machine, &elem),
        Type::Comp(comp, _) => align_of_comp(machine, &comp),
        Type::Function { .. } => {
            Err(IrError::size_of(t.to_string(), "function type"))
        }
        Type::Void(_) => Err(IrError::size_of(t.to_string(), "void type")),
        Type::Named(..) => unreachable!("unroll returned a named type"),
    }
}

/// Max field alignment; zero-width bitfields do not contribute under GCC,
/// and under MSVC only when they are not preceded by a bitfield
fn align_of_comp(machine: &Machine, comp: &CompRef) -> IrResult<u32> {
    let ci = comp.borrow();
    let mut align = 1;
    let mut prev_was_bitfield = false;
    for f in &ci.fields {
        let field = f.borrow();
        let skip = match field.bitfield {
            Some(0) => !machine.msvc || !prev_was_bitfield,
            _ => false,
        };
        prev_was_bitfield = field.bitfield.is_some();
        if skip {
            continue;
        }
        align = align.max(align_of(machine, &field.ty)?);
    }
    Ok(align)
}

/// Total size of a type in bits
pub fn bits_size_of(machine: &Machine, t: &Type) -> IrResult<u64> {
    match t.unroll() {
        Type::Int(kind, _) => Ok(8 * match kind {
            IntKind::Char | IntKind::SChar | IntKind::UChar => 1,
            IntKind::Short | IntKind::UShort => machine.sizeof_short as u64,
            IntKind::Int | IntKind::UInt => machine.sizeof_int as u64,
            IntKind::Long | IntKind::ULong => machine.sizeof_long as u64,
            IntKind::LongLong | IntKind::ULongLong => machine.sizeof_longlong as u64,
        }),
        Type::Enum(..) => Ok(8 * machine.sizeof_enum as u64),
        Type::Float(kind, _) => Ok(8 * match kind {
            FloatKind::Float => machine.sizeof_float as u64,
            FloatKind::Double => machine.sizeof_double as u64,
            FloatKind::LongDouble => machine.sizeof_longdouble as u64,
        }),
        Type::Pointer(..) => Ok(8 * machine.sizeof_ptr as u64),
        Type::VaList(_) => Ok(8 * machine.sizeof_valist as u64),
        Type::Array(elem, Some(len), _) => {
            let mut scratch = ErrorReporter::new();
            let folded = const_fold(machine, true, &len, &mut scratch);
            match folded.is_integer() {
                Some(n) if n >= 0 => Ok(n as u64 * bits_size_of(machine, &elem)?),
                _ => Err(IrError::size_of(
                    t.to_string(),
                    "array with non-constant length",
                )),
            }
        }
        Type::Array(_, None, _) => {
            Err(IrError::size_of(t.to_string(), "array with no length"))
        }
        Type::Comp(comp, _) => bits_size_of_comp(machine, t, &comp),
        Type::Function { .. } => {
            Err(IrError::size_of(t.to_string(), "function type"))
        }
        Type::Void(_) => Err(IrError::size_of(t.to_string(), "void type")),
        Type::Named(..) => unreachable!("unroll returned a named type"),
    }
}

fn bits_size_of_comp(machine: &Machine, t: &Type, comp: &CompRef) -> IrResult<u64> {
    let ci = comp.borrow();
    if ci.fields.is_empty() {
        return Err(IrError::size_of(t.to_string(), "abstract type"));
    }
    let align_bits = 8 * align_of_comp(machine, comp)? as u64;

    if ci.is_struct {
        let mut acc = FieldAcc::start();
        for f in &ci.fields {
            acc = offset_of_field_acc(machine, f, &acc)?;
        }
        // MSVC structs holding only zero-width bitfields still take one
        // int of storage, unpadded
        if machine.msvc && acc.first_free == 0 {
            return Ok(32);
        }
        Ok(round_up(acc.first_free, align_bits))
    } else {
        let mut max = 0;
        for f in &ci.fields {
            let acc = offset_of_field_acc(machine, f, &FieldAcc::start())?;
            max = max.max(acc.first_free);
        }
        Ok(round_up(max, align_bits))
    }
}

/// Place one more field, returning the advanced accumulator. Dispatches
/// on the machine's dialect.
pub fn offset_of_field_acc(
    machine: &Machine,
    field: &FieldRef,
    acc: &FieldAcc,
) -> IrResult<FieldAcc> {
    if machine.msvc {
        offset_of_field_acc_msvc(machine, field, acc.clone())
    } else {
        offset_of_field_acc_gcc(machine, field, acc)
    }
}

fn offset_of_field_acc_gcc(
    machine: &Machine,
    field: &FieldRef,
    acc: &FieldAcc,
) -> IrResult<FieldAcc> {
    let (ftype, bitfield) = {
        let f = field.borrow();
        (f.ty.unroll(), f.bitfield)
    };
    let align = 8 * align_of(machine, &ftype)? as u64;
    let bits = bits_size_of(machine, &ftype)?;

    Ok(match bitfield {
        // A width of zero ends the current run and pads to the boundary
        // of the field's own type
        Some(0) => {
            let first_free = round_up(acc.first_free, align);
            FieldAcc {
                first_free,
                last_start: first_free,
                last_width: 0,
                pack: None,
            }
        }
        // A bitfield cannot span more alignment boundaries of its type
        // than the type itself does
        Some(w)
            if (acc.first_free + w as u64).div_ceil(align) - acc.first_free / align
                > bits / align =>
        {
            let start = round_up(acc.first_free, align);
            FieldAcc {
                first_free: start + w as u64,
                last_start: start,
                last_width: w as u64,
                pack: None,
            }
        }
        // Otherwise a bitfield sits at the next free bit
        Some(w) => FieldAcc {
            first_free: acc.first_free + w as u64,
            last_start: acc.first_free,
            last_width: w as u64,
            pack: None,
        },
        // Plain fields align and consume their size
        None => {
            let start = round_up(acc.first_free, align);
            FieldAcc {
                first_free: start + bits,
                last_start: start,
                last_width: bits,
                pack: None,
            }
        }
    })
}

fn offset_of_field_acc_msvc(
    machine: &Machine,
    field: &FieldRef,
    mut acc: FieldAcc,
) -> IrResult<FieldAcc> {
    // Closing a pack may force a retry of the same field, so loop
    loop {
        let (ftype, bitfield) = {
            let f = field.borrow();
            (f.ty.unroll(), f.bitfield)
        };
        let align = 8 * align_of(machine, &ftype)? as u64;
        let bits = bits_size_of(machine, &ftype)?;
        let int_kind = match ftype {
            Type::Int(kind, _) => Some(kind),
            _ => None,
        };

        let close_pack = |acc: &FieldAcc, pack: &BitPack| -> u64 {
            if acc.first_free == pack.start {
                pack.start
            } else {
                pack.start + pack.width
            }
        };

        match (int_kind, bitfield, acc.pack) {
            // Zero-width bitfield after a non-bitfield is ignored
            (Some(_), Some(0), None) => {
                return Ok(FieldAcc {
                    first_free: acc.first_free,
                    last_start: acc.first_free,
                    last_width: 0,
                    pack: None,
                });
            }
            // A bitfield of a different storage width closes the pack
            // and the field is retried
            (_, Some(_), Some(pack)) if pack.width != bits => {
                let first_free = close_pack(&acc, &pack);
                acc = FieldAcc {
                    first_free: round_up(first_free, align),
                    last_start: acc.last_start,
                    last_width: acc.last_width,
                    pack: None,
                };
            }
            // Zero width closes the pack and opens a fresh empty one
            (Some(kind), Some(0), Some(pack)) => {
                let first_free = round_up(close_pack(&acc, &pack), align);
                return Ok(FieldAcc {
                    first_free,
                    last_start: first_free,
                    last_width: 0,
                    pack: Some(BitPack {
                        start: first_free,
                        kind,
                        width: bits,
                    }),
                });
            }
            // A bitfield that fits in the open pack goes there
            (Some(_), Some(w), Some(pack))
                if pack.start + pack.width >= acc.first_free + w as u64 =>
            {
                return Ok(FieldAcc {
                    first_free: acc.first_free + w as u64,
                    last_start: acc.first_free,
                    last_width: w as u64,
                    pack: Some(pack),
                });
            }
            // Anything else after an open pack closes it and retries
            (_, _, Some(pack)) => {
                let first_free = close_pack(&acc, &pack);
                acc = FieldAcc {
                    first_free: round_up(first_free, align),
                    last_start: acc.last_start,
                    last_width: acc.last_width,
                    pack: None,
                };
            }
            // First bitfield with no pack open: open one
            (Some(kind), Some(w), None) => {
                let start = round_up(acc.first_free, align);
                return Ok(FieldAcc {
                    first_free: start + w as u64,
                    last_start: start,
                    last_width: w as u64,
                    pack: Some(BitPack {
                        start,
                        kind,
                        width: bits,
                    }),
                });
            }
            // Plain field
            (_, None, None) => {
                let start = round_up(acc.first_free, align);
                return Ok(FieldAcc {
                    first_free: start + bits,
                    last_start: start,
                    last_width: bits,
                    pack: None,
                });
            }
            (None, Some(_), None) => {
                return Err(IrError::bug(format!(
                    "bitfield {} has a non-integer type",
                    field.borrow().name
                )));
            }
        }
    }
}

/// The size of a type as an `int` expression; stays a symbolic
/// `sizeof(t)` when the layout engine cannot compute it
pub fn size_of(machine: &Machine, t: &Type) -> Exp {
    match bits_size_of(machine, t) {
        Ok(bits) => crate::ir::builder::integer((bits / 8) as i64),
        Err(_) => Exp::SizeOfType(t.clone()),
    }
}

/// The (start bit, width in bits) a chain of offsets selects inside a
/// base type
pub fn bits_offset(machine: &Machine, base: &Type, offset: &Offset) -> IrResult<(u64, u64)> {
    let width = bits_size_of(machine, base)?;
    bits_offset_walk(machine, base, width, 0, offset)
}

fn bits_offset_walk(
    machine: &Machine,
    t: &Type,
    width: u64,
    start: u64,
    offset: &Offset,
) -> IrResult<(u64, u64)> {
    match offset {
        Offset::NoOffset => Ok((start, width)),
        Offset::Index(e, rest) => {
            let mut scratch = ErrorReporter::new();
            let folded = const_fold(machine, true, e, &mut scratch);
            let index = folded.is_integer().ok_or_else(|| {
                IrError::size_of(t.to_string(), "index is not a compile-time constant")
            })?;
            let elem = match t.unroll() {
                Type::Array(elem, _, _) => *elem,
                other => {
                    return Err(IrError::bug(format!(
                        "Index offset on non-array type {}",
                        other
                    )))
                }
            };
            let elem_bits = bits_size_of(machine, &elem)?;
            bits_offset_walk(
                machine,
                &elem,
                elem_bits,
                start + index as u64 * elem_bits,
                rest,
            )
        }
        Offset::Field(f, rest) => {
            let comp = f.borrow().comp.upgrade();
            let field_ty = f.borrow().ty.clone();
            if !comp.borrow().is_struct {
                // Every union member starts at the union's own start
                let fwidth = match f.borrow().bitfield {
                    Some(w) => w as u64,
                    None => bits_size_of(machine, &field_ty)?,
                };
                return bits_offset_walk(machine, &field_ty, fwidth, start, rest);
            }
            // Accumulate the fields up to and including the target
            let fields = comp.borrow().fields.clone();
            let mut acc = FieldAcc::start();
            let mut found = false;
            for candidate in &fields {
                acc = offset_of_field_acc(machine, candidate, &acc)?;
                if candidate.ptr_eq(f) {
                    found = true;
                    break;
                }
            }
            if !found {
                return Err(IrError::bug(format!(
                    "field {} not found in {}",
                    f.borrow().name,
                    comp.borrow().name()
                )));
            }
            bits_offset_walk(
                machine,
                &field_ty,
                acc.last_width,
                start + acc.last_start,
                rest,
            )
        }
    }
}
