//! Constructors that maintain the IR invariants
//!
//! Everything here is a thin layer that builds well-formed nodes: variable
//! descriptors with correct ids, composite descriptors whose fields can
//! refer back to the composite being defined, integer constants truncated
//! to their kind, lvalue surgery that folds `AddrOf`/`StartOf` away, and
//! the loop shapes the pretty printer knows how to render back as `while`
//! and `for`.

use crate::attributes::AttrList;
use crate::fold::truncate_integer64;
use crate::ir::expressions::{Constant, Exp, Host, Lval, Offset};
use crate::ir::statements::{Block, FunDec, Instr, StmtId, StmtKind, StmtPool};
use crate::ir::symbols::{
    hash_name, CompInfo, CompRef, CompWeak, FieldInfo, FieldRef, Storage, VarInfo, VarRef,
};
use crate::ir::types::{IntKind, Type};
use cir_common::{ErrorReporter, IrError, IrResult, Location};

/// One field of a composite under construction: name, type, optional
/// bitfield width, attributes
pub type FieldSpec = (String, Type, Option<u32>, AttrList);

// ---------------------------------------------------------------------------
// Variables and composites
// ---------------------------------------------------------------------------

/// Create a global variable descriptor; its id is the hash of its name
pub fn make_global_var(name: &str, ty: Type) -> VarRef {
    let mut vi = VarInfo::new(name, ty);
    vi.is_global = true;
    vi.id = hash_name(name);
    VarRef::new(vi)
}

/// Create a local variable in `fdec`, appending it to the locals list
/// only when `insert` is set
pub fn make_local_var(fdec: &mut FunDec, name: &str, ty: Type, insert: bool) -> VarRef {
    let mut vi = VarInfo::new(name, ty);
    vi.id = fdec.next_local_id;
    fdec.next_local_id += 1;
    let vi = VarRef::new(vi);
    if insert {
        fdec.locals.push(vi.clone());
    }
    vi
}

/// Create a fresh temporary whose name is `basename` plus a unique suffix
pub fn make_temp_var(fdec: &mut FunDec, basename: Option<&str>, ty: Type) -> VarRef {
    let name = format!("{}{}", basename.unwrap_or("tmp"), fdec.next_local_id);
    make_local_var(fdec, &name, ty, true)
}

/// Create a new formal and splice it into the formals list.
///
/// `where_` is `"^"` to prepend, `"$"` to append, or the name of an
/// existing formal to insert after. The function type is re-synchronized
/// through `set_formals`.
pub fn make_formal_var(
    fdec: &mut FunDec,
    where_: &str,
    name: &str,
    ty: Type,
) -> IrResult<VarRef> {
    let mut vi = VarInfo::new(name, ty);
    vi.id = fdec.next_local_id;
    fdec.next_local_id += 1;
    let vi = VarRef::new(vi);

    let mut formals = fdec.formals.clone();
    match where_ {
        "^" => formals.insert(0, vi.clone()),
        "$" => formals.push(vi.clone()),
        anchor => {
            let pos = formals
                .iter()
                .position(|f| f.borrow().name == anchor)
                .ok_or_else(|| {
                    IrError::bug(format!("make_formal_var: no formal named {}", anchor))
                })?;
            formals.insert(pos + 1, vi.clone());
        }
    }
    fdec.set_formals(formals)?;
    Ok(vi)
}

/// Create a composite descriptor whose fields may refer to the composite
/// itself: `field_spec` receives the forward `Comp` type before the
/// fields are stored
pub fn mk_comp_info<F>(is_struct: bool, name: &str, field_spec: F, attrs: AttrList) -> CompRef
where
    F: FnOnce(&Type) -> Vec<FieldSpec>,
{
    let comp = CompRef::new(CompInfo::new(is_struct, name, attrs));
    let forward = Type::Comp(comp.clone(), AttrList::new());
    let fields = field_spec(&forward)
        .into_iter()
        .map(|(fname, fty, fbitfield, fattrs)| {
            FieldRef::new(FieldInfo {
                comp: CompWeak::from_ref(&comp),
                name: fname,
                ty: fty,
                bitfield: fbitfield,
                attrs: fattrs,
            })
        })
        .collect();
    comp.borrow_mut().fields = fields;
    comp
}

/// A function definition with no formals, no locals and an empty body,
/// returning void
pub fn empty_function(name: &str) -> FunDec {
    let fun_ty = Type::Function {
        return_type: Box::new(Type::void()),
        params: Some(Vec::new()),
        variadic: false,
        attrs: AttrList::new(),
    };
    FunDec {
        svar: make_global_var(name, fun_ty),
        formals: Vec::new(),
        locals: Vec::new(),
        next_local_id: 0,
        body: Block::empty(),
        is_inline: false,
        max_stmt_id: None,
        stmts: StmtPool::new(),
    }
}

// ---------------------------------------------------------------------------
// Integer constants
// ---------------------------------------------------------------------------

/// Integer constant of kind `int`
pub fn integer(value: i64) -> Exp {
    Exp::Const(Constant::Int {
        value,
        kind: IntKind::Int,
        text: None,
    })
}

/// Integer constant of the given kind, truncated to the kind's width;
/// warns through `reporter` when truncation changed the value
pub fn kinteger64(kind: IntKind, value: i64, reporter: &mut ErrorReporter) -> Exp {
    let (truncated, changed) = truncate_integer64(kind, value);
    if changed {
        reporter.warn(format!(
            "truncating integer {:#x} to {:#x} for {}",
            value, truncated, kind
        ));
    }
    Exp::Const(Constant::Int {
        value: truncated,
        kind,
        text: None,
    })
}

/// `kinteger64` for values already known to be small
pub fn kinteger(kind: IntKind, value: i64, reporter: &mut ErrorReporter) -> Exp {
    kinteger64(kind, value, reporter)
}

// ---------------------------------------------------------------------------
// Lvalue surgery
// ---------------------------------------------------------------------------

/// The lvalue for a whole variable
pub fn var_lval(vi: &VarRef) -> Lval {
    Lval::new(Host::Var(vi.clone()), Offset::NoOffset)
}

/// Append `toadd` at the innermost `NoOffset` of `off`
pub fn add_offset(off: &Offset, toadd: Offset) -> Offset {
    match off {
        Offset::NoOffset => toadd,
        Offset::Field(f, rest) => {
            Offset::Field(f.clone(), Box::new(add_offset(rest, toadd)))
        }
        Offset::Index(e, rest) => {
            Offset::Index(e.clone(), Box::new(add_offset(rest, toadd)))
        }
    }
}

/// Append `toadd` to the offset chain of an lvalue
pub fn add_offset_lval(lv: &Lval, toadd: Offset) -> Lval {
    Lval::new(lv.host.clone(), add_offset(&lv.offset, toadd))
}

/// Build the lvalue `*(addr) + off`, folding away an `AddrOf` or
/// `StartOf` in the address
pub fn mk_mem(addr: Exp, off: Offset) -> Lval {
    match addr {
        Exp::AddrOf(lv) => add_offset_lval(&lv, off),
        Exp::StartOf(lv) => {
            add_offset_lval(&lv, Offset::Index(Box::new(integer(0)), Box::new(off)))
        }
        other => Lval::new(Host::Mem(Box::new(other)), off),
    }
}

/// Take the address of an lvalue, simplifying `&*e` to `e` and
/// `&a[0]` to the decay of `a`.
///
/// A register variable whose address is taken loses its `register`
/// storage, and its address-taken flag is set.
pub fn mk_addr_of(lv: &Lval) -> Exp {
    if let Host::Var(vi) = &lv.host {
        let mut v = vi.borrow_mut();
        if v.storage == Storage::Register {
            v.storage = Storage::None;
        }
        v.address_taken = true;
    }
    match (&lv.host, &lv.offset) {
        (Host::Mem(e), Offset::NoOffset) => (**e).clone(),
        (host, Offset::Index(z, rest))
            if z.is_zero() && matches!(**rest, Offset::NoOffset) =>
        {
            Exp::StartOf(Lval::new(host.clone(), Offset::NoOffset))
        }
        _ => Exp::AddrOf(lv.clone()),
    }
}

/// `StartOf` for arrays, `mk_addr_of` for everything else
pub fn mk_addr_or_start_of(lv: &Lval) -> Exp {
    match crate::ir::expressions::type_of_lval(lv) {
        Ok(t) if t.is_array() => Exp::StartOf(lv.clone()),
        _ => mk_addr_of(lv),
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Allocate a statement in the pool
pub fn mk_stmt(pool: &mut StmtPool, kind: StmtKind) -> StmtId {
    pool.alloc(kind)
}

/// A block with no attributes
pub fn mk_block(stmts: Vec<StmtId>) -> Block {
    Block::new(stmts)
}

/// A statement that does nothing
pub fn mk_empty_stmt(pool: &mut StmtPool) -> StmtId {
    pool.alloc(StmtKind::Instr(Vec::new()))
}

/// A statement holding a single instruction
pub fn mk_stmt_one_instr(pool: &mut StmtPool, instr: Instr) -> StmtId {
    pool.alloc(StmtKind::Instr(vec![instr]))
}

/// `while (guard) body`, expanded to the `Loop`-plus-leading-`If` shape
/// the pretty printer turns back into a `while`
pub fn mk_while(pool: &mut StmtPool, guard: Exp, body: Vec<StmtId>) -> Vec<StmtId> {
    let lu = Location::unknown();
    let skip = mk_empty_stmt(pool);
    let brk = pool.alloc(StmtKind::Break(lu.clone()));
    let test = pool.alloc(StmtKind::If {
        cond: guard,
        then_blk: mk_block(vec![skip]),
        else_blk: mk_block(vec![brk]),
        loc: lu.clone(),
    });
    let mut loop_body = vec![test];
    loop_body.extend(body);
    vec![pool.alloc(StmtKind::Loop(mk_block(loop_body), lu))]
}

/// `for (start; guard; next) body`
pub fn mk_for(
    pool: &mut StmtPool,
    start: Vec<StmtId>,
    guard: Exp,
    next: Vec<StmtId>,
    body: Vec<StmtId>,
) -> Vec<StmtId> {
    let mut full_body = body;
    full_body.extend(next);
    let mut stmts = start;
    stmts.extend(mk_while(pool, guard, full_body));
    stmts
}

/// `for (iter = first; iter < past; iter = iter + incr) body`, choosing
/// pointer comparison and pointer addition when `iter` is a pointer
pub fn mk_for_incr(
    pool: &mut StmtPool,
    iter: &VarRef,
    first: Exp,
    past: Exp,
    incr: Exp,
    body: Vec<StmtId>,
) -> Vec<StmtId> {
    use crate::ir::ops::BinaryOp;

    let lu = Location::unknown();
    let iter_ty = iter.borrow().ty.clone();
    let (compop, nextop) = if iter_ty.is_pointer() {
        (BinaryOp::PtrLt, BinaryOp::PtrAdd)
    } else {
        (BinaryOp::Lt, BinaryOp::Add)
    };

    let init = mk_stmt_one_instr(
        pool,
        Instr::Set {
            lval: var_lval(iter),
            value: first,
            loc: lu.clone(),
        },
    );
    let guard = Exp::Binary {
        op: compop,
        left: Box::new(Exp::Lval(var_lval(iter))),
        right: Box::new(past),
        ty: Type::int(),
    };
    let advance = mk_stmt_one_instr(
        pool,
        Instr::Set {
            lval: var_lval(iter),
            value: Exp::Binary {
                op: nextop,
                left: Box::new(Exp::Lval(var_lval(iter))),
                right: Box::new(incr),
                ty: iter_ty,
            },
            loc: lu,
        },
    );
    mk_for(pool, vec![init], guard, vec![advance], body)
}

/// Coalesce adjacent `Instr` statements when the second carries no labels
pub fn compact_stmts(pool: &mut StmtPool, stmts: &[StmtId]) -> Vec<StmtId> {
    let mut out: Vec<StmtId> = Vec::new();
    for &sid in stmts {
        let mergeable = matches!(pool.get(sid).kind, StmtKind::Instr(_))
            && pool.get(sid).labels.is_empty();
        if mergeable {
            if let Some(&prev) = out.last() {
                if matches!(pool.get(prev).kind, StmtKind::Instr(_)) {
                    let moved = match &mut pool.get_mut(sid).kind {
                        StmtKind::Instr(is) => std::mem::take(is),
                        _ => unreachable!(),
                    };
                    match &mut pool.get_mut(prev).kind {
                        StmtKind::Instr(is) => is.extend(moved),
                        _ => unreachable!(),
                    }
                    continue;
                }
            }
        }
        out.push(sid);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expressions::type_of_lval;

    #[test]
    fn test_make_global_var_hashes_name() {
        let v = make_global_var("counter", Type::int());
        let vi = v.borrow();
        assert!(vi.is_global);
        assert_eq!(vi.id, hash_name("counter"));
        assert_eq!(vi.storage, Storage::None);
    }

    #[test]
    fn test_local_ids_count_up_from_formals() {
        let mut f = empty_function("f");
        let a = make_formal_var(&mut f, "$", "a", Type::int()).unwrap();
        let b = make_formal_var(&mut f, "$", "b", Type::int()).unwrap();
        let t = make_local_var(&mut f, "t", Type::int(), true);

        assert_eq!(a.borrow().id, 0);
        assert_eq!(b.borrow().id, 1);
        assert_eq!(t.borrow().id, 2);
        assert_eq!(f.locals.len(), 1);
    }

    #[test]
    fn test_make_local_var_without_insert() {
        let mut f = empty_function("f");
        let v = make_local_var(&mut f, "shadow", Type::int(), false);
        assert!(f.locals.is_empty());
        assert_eq!(v.borrow().id, 0);
    }

    #[test]
    fn test_temp_var_names_are_fresh() {
        let mut f = empty_function("f");
        let t0 = make_temp_var(&mut f, None, Type::int());
        let t1 = make_temp_var(&mut f, None, Type::int());
        assert_ne!(t0.borrow().name, t1.borrow().name);
        assert!(t0.borrow().name.starts_with("tmp"));
    }

    #[test]
    fn test_formal_insertion_points() {
        let mut f = empty_function("f");
        make_formal_var(&mut f, "$", "b", Type::int()).unwrap();
        make_formal_var(&mut f, "^", "a", Type::int()).unwrap();
        make_formal_var(&mut f, "a", "mid", Type::int()).unwrap();

        let names: Vec<String> = f.formals.iter().map(|v| v.borrow().name.clone()).collect();
        assert_eq!(names, vec!["a", "mid", "b"]);
        assert!(make_formal_var(&mut f, "nosuch", "x", Type::int()).is_err());
    }

    #[test]
    fn test_mk_comp_info_forward_reference() {
        let comp = mk_comp_info(
            true,
            "node",
            |this| {
                vec![
                    ("data".to_string(), Type::int(), None, AttrList::new()),
                    (
                        "next".to_string(),
                        Type::ptr_to(this.clone()),
                        None,
                        AttrList::new(),
                    ),
                ]
            },
            AttrList::new(),
        );

        let ci = comp.borrow();
        assert_eq!(ci.fields.len(), 2);
        let next_ty = ci.fields[1].borrow().ty.clone();
        match next_ty.unroll() {
            Type::Pointer(inner, _) => match *inner {
                Type::Comp(c, _) => assert!(c.ptr_eq(&comp)),
                other => panic!("expected comp pointee, got {:?}", other),
            },
            other => panic!("expected pointer, got {:?}", other),
        }
    }

    #[test]
    fn test_kinteger64_truncates_and_warns() {
        let mut reporter = ErrorReporter::new();
        let e = kinteger64(IntKind::UShort, 0x1FFFF, &mut reporter);
        assert_eq!(e.is_integer(), Some(0xFFFF));
        assert!(reporter.has_warnings());

        let mut quiet = ErrorReporter::new();
        let e = kinteger64(IntKind::Int, 42, &mut quiet);
        assert_eq!(e.is_integer(), Some(42));
        assert!(!quiet.has_warnings());
    }

    #[test]
    fn test_add_offset_appends_innermost() {
        let comp = mk_comp_info(
            true,
            "s",
            |_| vec![("f".to_string(), Type::int(), None, AttrList::new())],
            AttrList::new(),
        );
        let f = comp.borrow().fields[0].clone();

        let base = Offset::Field(f.clone(), Box::new(Offset::NoOffset));
        let idx = Offset::Index(Box::new(integer(3)), Box::new(Offset::NoOffset));
        let combined = add_offset(&base, idx);

        match combined {
            Offset::Field(_, rest) => {
                assert!(matches!(*rest, Offset::Index(..)));
            }
            other => panic!("expected field first, got {:?}", other),
        }
    }

    #[test]
    fn test_mk_mem_folds_addr_of() {
        let v = make_global_var("x", Type::int());
        let lv = var_lval(&v);
        let folded = mk_mem(Exp::AddrOf(lv.clone()), Offset::NoOffset);
        assert_eq!(folded, lv);
    }

    #[test]
    fn test_mk_mem_folds_start_of() {
        let arr_ty = Type::Array(
            Box::new(Type::int()),
            Some(Box::new(integer(4))),
            AttrList::new(),
        );
        let a = make_global_var("a", arr_ty);
        let folded = mk_mem(Exp::StartOf(var_lval(&a)), Offset::NoOffset);
        // a[0]
        match folded.offset {
            Offset::Index(ref e, ref rest) => {
                assert!(e.is_zero());
                assert!(matches!(**rest, Offset::NoOffset));
            }
            ref other => panic!("expected index, got {:?}", other),
        }
        assert_eq!(type_of_lval(&folded).unwrap(), Type::int());
    }

    #[test]
    fn test_mk_addr_of_simplifications() {
        let p = make_global_var("p", Type::ptr_to(Type::int()));
        let deref = mk_mem(Exp::Lval(var_lval(&p)), Offset::NoOffset);
        // &*p == p
        assert_eq!(mk_addr_of(&deref), Exp::Lval(var_lval(&p)));

        let arr_ty = Type::Array(
            Box::new(Type::int()),
            Some(Box::new(integer(4))),
            AttrList::new(),
        );
        let a = make_global_var("a", arr_ty);
        let elem0 = add_offset_lval(
            &var_lval(&a),
            Offset::Index(Box::new(integer(0)), Box::new(Offset::NoOffset)),
        );
        // &a[0] == StartOf a
        assert_eq!(mk_addr_of(&elem0), Exp::StartOf(var_lval(&a)));
    }

    #[test]
    fn test_mk_addr_of_demotes_register() {
        let mut f = empty_function("f");
        let r = make_local_var(&mut f, "r", Type::int(), true);
        r.borrow_mut().storage = Storage::Register;

        let e = mk_addr_of(&var_lval(&r));
        assert!(matches!(e, Exp::AddrOf(_)));
        assert_eq!(r.borrow().storage, Storage::None);
        assert!(r.borrow().address_taken);
    }

    #[test]
    fn test_mk_addr_or_start_of_picks_decay() {
        let arr_ty = Type::Array(
            Box::new(Type::int()),
            Some(Box::new(integer(4))),
            AttrList::new(),
        );
        let a = make_global_var("a", arr_ty);
        assert!(matches!(mk_addr_or_start_of(&var_lval(&a)), Exp::StartOf(_)));

        let x = make_global_var("x", Type::int());
        assert!(matches!(mk_addr_or_start_of(&var_lval(&x)), Exp::AddrOf(_)));
    }

    #[test]
    fn test_mk_while_shape() {
        let mut pool = StmtPool::new();
        let body = vec![mk_empty_stmt(&mut pool)];
        let stmts = mk_while(&mut pool, integer(1), body);
        assert_eq!(stmts.len(), 1);

        match &pool.get(stmts[0]).kind {
            StmtKind::Loop(blk, _) => {
                let first = blk.stmts[0];
                match &pool.get(first).kind {
                    StmtKind::If { else_blk, .. } => {
                        let brk = else_blk.stmts[0];
                        assert!(matches!(pool.get(brk).kind, StmtKind::Break(_)));
                    }
                    other => panic!("expected leading if, got {:?}", other),
                }
            }
            other => panic!("expected loop, got {:?}", other),
        }
    }

    #[test]
    fn test_compact_stmts_merges_instr_runs() {
        let mut pool = StmtPool::new();
        let lu = Location::unknown();
        let v = make_global_var("x", Type::int());
        let set = |pool: &mut StmtPool| {
            mk_stmt_one_instr(
                pool,
                Instr::Set {
                    lval: var_lval(&v),
                    value: integer(1),
                    loc: lu.clone(),
                },
            )
        };
        let a = set(&mut pool);
        let b = set(&mut pool);
        let ret = pool.alloc(StmtKind::Return(None, lu.clone()));
        let c = set(&mut pool);

        let compacted = compact_stmts(&mut pool, &[a, b, ret, c]);
        assert_eq!(compacted, vec![a, ret, c]);
        match &pool.get(a).kind {
            StmtKind::Instr(is) => assert_eq!(is.len(), 2),
            other => panic!("expected instr, got {:?}", other),
        }
    }

    #[test]
    fn test_compact_stmts_respects_labels() {
        let mut pool = StmtPool::new();
        let lu = Location::unknown();
        let a = mk_empty_stmt(&mut pool);
        let b = mk_empty_stmt(&mut pool);
        pool.get_mut(b).labels.push(crate::ir::statements::Label::Name {
            name: "target".to_string(),
            loc: lu,
            synthetic: false,
        });

        let compacted = compact_stmts(&mut pool, &[a, b]);
        assert_eq!(compacted, vec![a, b]);
    }
}
