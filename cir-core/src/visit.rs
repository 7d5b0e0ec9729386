//! Generic IR traversal and rewriting
//!
//! A visitor gets one callback per node kind and answers with an action:
//! skip the children, replace the node outright, descend, or replace and
//! descend with a post-processing step. The engine mutates nodes in place
//! and never rebuilds a parent whose children did not change, so a
//! do-nothing visitor leaves every list and every shared handle exactly
//! as it found them. Instruction and global callbacks may return a list,
//! which is spliced into the enclosing sequence; attribute callbacks may
//! expand too, after which the list is re-sorted to keep the attribute
//! ordering invariant.

use crate::attributes::{AttrList, AttrParam, Attribute};
use crate::ir::expressions::{Exp, Host, Init, Lval, Offset};
use crate::ir::module::{Global, Module};
use crate::ir::statements::{Block, FunDec, Instr, Stmt, StmtId, StmtKind, StmtPool};
use crate::ir::symbols::VarRef;
use crate::ir::types::Type;
use cir_common::Location;
use log::trace;

/// What a visitor callback tells the engine to do
pub enum VisitAction<T> {
    /// Keep the node unchanged and do not descend
    SkipChildren,
    /// Replace the node and do not descend
    ChangeTo(T),
    /// Descend; the node is rebuilt only if a child changed
    DoChildren,
    /// Replace the node, descend into the replacement, then post-process
    ChangeDoChildrenPost(T, Box<dyn FnOnce(T) -> T>),
}

/// One callback per IR node kind; every default is `DoChildren`
#[allow(unused_variables)]
pub trait Visitor {
    fn vexpr(&mut self, e: &Exp) -> VisitAction<Exp> {
        VisitAction::DoChildren
    }
    fn vlval(&mut self, lv: &Lval) -> VisitAction<Lval> {
        VisitAction::DoChildren
    }
    fn voffset(&mut self, o: &Offset) -> VisitAction<Offset> {
        VisitAction::DoChildren
    }
    /// May splice: the replacement is a list of instructions
    fn vinstr(&mut self, i: &Instr) -> VisitAction<Vec<Instr>> {
        VisitAction::DoChildren
    }
    fn vstmt(&mut self, s: &Stmt) -> VisitAction<Stmt> {
        VisitAction::DoChildren
    }
    fn vblock(&mut self, b: &Block) -> VisitAction<Block> {
        VisitAction::DoChildren
    }
    fn vfunc(&mut self, f: &FunDec) -> VisitAction<FunDec> {
        VisitAction::DoChildren
    }
    /// May splice: the replacement is a list of globals
    fn vglobal(&mut self, g: &Global) -> VisitAction<Vec<Global>> {
        VisitAction::DoChildren
    }
    fn vinit(&mut self, i: &Init) -> VisitAction<Init> {
        VisitAction::DoChildren
    }
    fn vtype(&mut self, t: &Type) -> VisitAction<Type> {
        VisitAction::DoChildren
    }
    /// May expand one attribute into several
    fn vattr(&mut self, a: &Attribute) -> VisitAction<Vec<Attribute>> {
        VisitAction::DoChildren
    }
    /// A variable at its declaration site
    fn vvar_decl(&mut self, v: &VarRef) -> VisitAction<VarRef> {
        VisitAction::DoChildren
    }
    /// A variable at a use site
    fn vvar_use(&mut self, v: &VarRef) -> VisitAction<VarRef> {
        VisitAction::DoChildren
    }
    /// Called at every global, statement and instruction boundary with
    /// the current source location
    fn set_location(&mut self, loc: &Location) {}
}

fn run_action<T>(
    action: VisitAction<T>,
    node: &mut T,
    dummy: fn() -> T,
    children: impl FnOnce(&mut T) -> bool,
) -> bool {
    match action {
        VisitAction::SkipChildren => false,
        VisitAction::ChangeTo(n) => {
            *node = n;
            true
        }
        VisitAction::DoChildren => children(node),
        VisitAction::ChangeDoChildrenPost(n, post) => {
            *node = n;
            children(node);
            let owned = std::mem::replace(node, dummy());
            *node = post(owned);
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions, lvalues, offsets
// ---------------------------------------------------------------------------

/// Visit an expression in place; returns whether anything changed
pub fn visit_expr(v: &mut dyn Visitor, e: &mut Exp) -> bool {
    let action = v.vexpr(e);
    run_action(action, e, || Exp::int_const(0), |e| expr_children(v, e))
}

fn expr_children(v: &mut dyn Visitor, e: &mut Exp) -> bool {
    match e {
        Exp::Const(_) => false,
        Exp::Lval(lv) | Exp::AddrOf(lv) | Exp::StartOf(lv) => visit_lval(v, lv),
        Exp::SizeOfType(t) | Exp::AlignOfType(t) => visit_type(v, t),
        Exp::SizeOfExpr(inner) | Exp::AlignOfExpr(inner) => visit_expr(v, inner),
        Exp::Unary { operand, ty, .. } => {
            let c1 = visit_expr(v, operand);
            visit_type(v, ty) || c1
        }
        Exp::Binary {
            left, right, ty, ..
        } => {
            let c1 = visit_expr(v, left);
            let c2 = visit_expr(v, right);
            visit_type(v, ty) || c1 || c2
        }
        Exp::Cast { target, operand } => {
            let c1 = visit_type(v, target);
            visit_expr(v, operand) || c1
        }
    }
}

/// Visit an lvalue in place
pub fn visit_lval(v: &mut dyn Visitor, lv: &mut Lval) -> bool {
    let action = v.vlval(lv);
    run_action(
        action,
        lv,
        || Lval::new(Host::Mem(Box::new(Exp::int_const(0))), Offset::NoOffset),
        |lv| lval_children(v, lv),
    )
}

fn lval_children(v: &mut dyn Visitor, lv: &mut Lval) -> bool {
    let host_changed = match &mut lv.host {
        Host::Var(vi) => match visit_varuse(v, vi) {
            Some(nv) => {
                lv.host = Host::Var(nv);
                true
            }
            None => false,
        },
        Host::Mem(addr) => visit_expr(v, addr),
    };
    visit_offset(v, &mut lv.offset) || host_changed
}

/// Visit an offset chain in place
pub fn visit_offset(v: &mut dyn Visitor, o: &mut Offset) -> bool {
    let action = v.voffset(o);
    run_action(action, o, || Offset::NoOffset, |o| offset_children(v, o))
}

fn offset_children(v: &mut dyn Visitor, o: &mut Offset) -> bool {
    match o {
        Offset::NoOffset => false,
        Offset::Field(_, rest) => visit_offset(v, rest),
        Offset::Index(e, rest) => {
            let c1 = visit_expr(v, e);
            visit_offset(v, rest) || c1
        }
    }
}

// ---------------------------------------------------------------------------
// Types and attributes
// ---------------------------------------------------------------------------

/// Visit a type in place.
///
/// Uses of composites, enums and typedefs visit only their attributes:
/// the shared definitions are visited at their defining global.
pub fn visit_type(v: &mut dyn Visitor, t: &mut Type) -> bool {
    let action = v.vtype(t);
    run_action(action, t, Type::void, |t| type_children(v, t))
}

fn type_children(v: &mut dyn Visitor, t: &mut Type) -> bool {
    match t {
        Type::Void(a)
        | Type::Int(_, a)
        | Type::Float(_, a)
        | Type::Named(_, a)
        | Type::Comp(_, a)
        | Type::Enum(_, a)
        | Type::VaList(a) => visit_attrs(v, a),
        Type::Pointer(base, a) => {
            let c1 = visit_type(v, base);
            visit_attrs(v, a) || c1
        }
        Type::Array(base, len, a) => {
            let c1 = visit_type(v, base);
            let c2 = match len {
                Some(e) => visit_expr(v, e),
                None => false,
            };
            visit_attrs(v, a) || c1 || c2
        }
        Type::Function {
            return_type,
            params,
            attrs,
            ..
        } => {
            let mut changed = visit_type(v, return_type);
            if let Some(ps) = params {
                for p in ps.iter_mut() {
                    changed |= visit_type(v, &mut p.ty);
                    changed |= visit_attrs(v, &mut p.attrs);
                }
            }
            visit_attrs(v, attrs) || changed
        }
    }
}

/// Visit an attribute list in place; expansion re-sorts the list
pub fn visit_attrs(v: &mut dyn Visitor, attrs: &mut AttrList) -> bool {
    let mut out: Option<Vec<Attribute>> = None;
    for idx in 0..attrs.len() {
        let a = &attrs.as_slice()[idx];
        let repl = match v.vattr(a) {
            VisitAction::SkipChildren => None,
            VisitAction::ChangeTo(list) => Some(list),
            VisitAction::DoChildren => {
                let mut copy = a.clone();
                if attr_children(v, &mut copy) {
                    Some(vec![copy])
                } else {
                    None
                }
            }
            VisitAction::ChangeDoChildrenPost(mut list, post) => {
                for x in list.iter_mut() {
                    attr_children(v, x);
                }
                Some(post(list))
            }
        };
        splice(&mut out, attrs.as_slice(), idx, repl);
    }
    match out {
        Some(list) => {
            *attrs = AttrList::from_attrs(list);
            true
        }
        None => false,
    }
}

fn attr_children(v: &mut dyn Visitor, a: &mut Attribute) -> bool {
    let mut changed = false;
    for p in a.params.iter_mut() {
        changed |= attr_param_children(v, p);
    }
    changed
}

fn attr_param_children(v: &mut dyn Visitor, p: &mut AttrParam) -> bool {
    match p {
        AttrParam::Int(_) | AttrParam::Str(_) | AttrParam::Var(_) => false,
        AttrParam::SizeOfType(t) => visit_type(v, t),
        AttrParam::SizeOfParam(inner) | AttrParam::UnOp(_, inner) => {
            attr_param_children(v, inner)
        }
        AttrParam::BinOp(_, a, b) => {
            let c1 = attr_param_children(v, a);
            attr_param_children(v, b) || c1
        }
        AttrParam::Cons(_, args) => {
            let mut changed = false;
            for arg in args.iter_mut() {
                changed |= attr_param_children(v, arg);
            }
            changed
        }
    }
}

// ---------------------------------------------------------------------------
// Initializers
// ---------------------------------------------------------------------------

/// Visit an initializer in place
pub fn visit_init(v: &mut dyn Visitor, init: &mut Init) -> bool {
    let action = v.vinit(init);
    run_action(
        action,
        init,
        || Init::Single(Exp::int_const(0)),
        |init| init_children(v, init),
    )
}

fn init_children(v: &mut dyn Visitor, init: &mut Init) -> bool {
    match init {
        Init::Single(e) => visit_expr(v, e),
        Init::Compound { ty, items } => {
            let mut changed = visit_type(v, ty);
            for (off, sub) in items.iter_mut() {
                changed |= visit_offset(v, off);
                changed |= visit_init(v, sub);
            }
            changed
        }
    }
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

fn visit_vardecl(v: &mut dyn Visitor, vi: &VarRef) -> Option<VarRef> {
    match v.vvar_decl(vi) {
        VisitAction::SkipChildren => None,
        VisitAction::ChangeTo(nv) => Some(nv),
        VisitAction::DoChildren => {
            vardecl_children(v, vi);
            None
        }
        VisitAction::ChangeDoChildrenPost(nv, post) => {
            vardecl_children(v, &nv);
            Some(post(nv))
        }
    }
}

fn vardecl_children(v: &mut dyn Visitor, vi: &VarRef) {
    // Move the type and attributes out so callbacks may borrow the
    // variable itself
    let mut ty = std::mem::replace(&mut vi.borrow_mut().ty, Type::void());
    visit_type(v, &mut ty);
    vi.borrow_mut().ty = ty;

    let mut attrs = std::mem::take(&mut vi.borrow_mut().attrs);
    visit_attrs(v, &mut attrs);
    vi.borrow_mut().attrs = attrs;
}

fn visit_varuse(v: &mut dyn Visitor, vi: &VarRef) -> Option<VarRef> {
    match v.vvar_use(vi) {
        VisitAction::SkipChildren | VisitAction::DoChildren => None,
        VisitAction::ChangeTo(nv) => Some(nv),
        VisitAction::ChangeDoChildrenPost(nv, post) => Some(post(nv)),
    }
}

// ---------------------------------------------------------------------------
// Instructions, statements, blocks
// ---------------------------------------------------------------------------

/// Splice bookkeeping shared by the list-valued callbacks: `out` stays
/// `None` until the first replacement, at which point the prefix is copied
fn splice<T: Clone>(out: &mut Option<Vec<T>>, source: &[T], idx: usize, repl: Option<Vec<T>>) {
    match (out.as_mut(), repl) {
        (None, None) => {}
        (None, Some(list)) => {
            let mut o: Vec<T> = source[..idx].to_vec();
            o.extend(list);
            *out = Some(o);
        }
        (Some(o), None) => o.push(source[idx].clone()),
        (Some(o), Some(list)) => o.extend(list),
    }
}

/// Visit a list of instructions, splicing replacements in place
pub fn visit_instrs(v: &mut dyn Visitor, instrs: &mut Vec<Instr>) -> bool {
    let mut out: Option<Vec<Instr>> = None;
    for idx in 0..instrs.len() {
        v.set_location(instrs[idx].loc());
        let repl = match v.vinstr(&instrs[idx]) {
            VisitAction::SkipChildren => None,
            VisitAction::ChangeTo(list) => Some(list),
            VisitAction::DoChildren => {
                instr_children(v, &mut instrs[idx]);
                None
            }
            VisitAction::ChangeDoChildrenPost(mut list, post) => {
                for i in list.iter_mut() {
                    instr_children(v, i);
                }
                Some(post(list))
            }
        };
        splice(&mut out, instrs, idx, repl);
    }
    match out {
        Some(list) => {
            *instrs = list;
            true
        }
        None => false,
    }
}

fn instr_children(v: &mut dyn Visitor, i: &mut Instr) -> bool {
    match i {
        Instr::Set { lval, value, .. } => {
            let c1 = visit_lval(v, lval);
            visit_expr(v, value) || c1
        }
        Instr::Call {
            dest, callee, args, ..
        } => {
            let mut changed = match dest {
                Some(lv) => visit_lval(v, lv),
                None => false,
            };
            changed |= visit_expr(v, callee);
            for a in args.iter_mut() {
                changed |= visit_expr(v, a);
            }
            changed
        }
        Instr::Asm(details) => {
            let mut changed = visit_attrs(v, &mut details.attrs);
            for (_, lv) in details.outputs.iter_mut() {
                changed |= visit_lval(v, lv);
            }
            for (_, e) in details.inputs.iter_mut() {
                changed |= visit_expr(v, e);
            }
            changed
        }
    }
}

fn stmt_loc(kind: &StmtKind) -> Option<&Location> {
    match kind {
        StmtKind::Instr(is) => is.first().map(|i| i.loc()),
        StmtKind::Return(_, loc)
        | StmtKind::Goto(_, loc)
        | StmtKind::Break(loc)
        | StmtKind::Continue(loc)
        | StmtKind::If { loc, .. }
        | StmtKind::Switch { loc, .. }
        | StmtKind::Loop(_, loc) => Some(loc),
        StmtKind::Block(_) => None,
    }
}

/// Visit one statement of the pool. A replacement keeps the original id:
/// statement identity is the pool slot.
pub fn visit_stmt(v: &mut dyn Visitor, pool: &mut StmtPool, sid: StmtId) {
    let mut s = pool.take(sid);
    if let Some(loc) = stmt_loc(&s.kind) {
        v.set_location(loc);
    }
    trace!("visiting stmt {}", sid);
    match v.vstmt(&s) {
        VisitAction::SkipChildren => {}
        VisitAction::ChangeTo(mut ns) => {
            ns.sid = sid;
            s = ns;
        }
        VisitAction::DoChildren => {
            stmt_children(v, pool, &mut s);
        }
        VisitAction::ChangeDoChildrenPost(mut ns, post) => {
            ns.sid = sid;
            stmt_children(v, pool, &mut ns);
            s = post(ns);
            s.sid = sid;
        }
    }
    pool.put(sid, s);
}

fn stmt_children(v: &mut dyn Visitor, pool: &mut StmtPool, s: &mut Stmt) {
    match &mut s.kind {
        StmtKind::Instr(is) => {
            visit_instrs(v, is);
        }
        StmtKind::Return(Some(e), _) => {
            visit_expr(v, e);
        }
        StmtKind::Return(None, _)
        | StmtKind::Goto(..)
        | StmtKind::Break(_)
        | StmtKind::Continue(_) => {}
        StmtKind::If {
            cond,
            then_blk,
            else_blk,
            ..
        } => {
            visit_expr(v, cond);
            visit_block(v, pool, then_blk);
            visit_block(v, pool, else_blk);
        }
        StmtKind::Switch { cond, body, .. } => {
            visit_expr(v, cond);
            visit_block(v, pool, body);
        }
        StmtKind::Loop(body, _) => {
            visit_block(v, pool, body);
        }
        StmtKind::Block(body) => {
            visit_block(v, pool, body);
        }
    }
}

/// Visit a block and, through the pool, the statements it lists
pub fn visit_block(v: &mut dyn Visitor, pool: &mut StmtPool, b: &mut Block) {
    match v.vblock(b) {
        VisitAction::SkipChildren => {}
        VisitAction::ChangeTo(nb) => *b = nb,
        VisitAction::DoChildren => block_children(v, pool, b),
        VisitAction::ChangeDoChildrenPost(nb, post) => {
            *b = nb;
            block_children(v, pool, b);
            let owned = std::mem::take(b);
            *b = post(owned);
        }
    }
}

fn block_children(v: &mut dyn Visitor, pool: &mut StmtPool, b: &mut Block) {
    visit_attrs(v, &mut b.attrs);
    for idx in 0..b.stmts.len() {
        visit_stmt(v, pool, b.stmts[idx]);
    }
}

// ---------------------------------------------------------------------------
// Functions, globals, modules
// ---------------------------------------------------------------------------

/// Visit a function definition
pub fn visit_fundec(v: &mut dyn Visitor, f: &mut FunDec) {
    match v.vfunc(f) {
        VisitAction::SkipChildren => {}
        VisitAction::ChangeTo(nf) => *f = nf,
        VisitAction::DoChildren => fundec_children(v, f),
        VisitAction::ChangeDoChildrenPost(nf, post) => {
            *f = nf;
            fundec_children(v, f);
            let owned = std::mem::replace(f, crate::ir::builder::empty_function("__tmp"));
            *f = post(owned);
        }
    }
}

fn fundec_children(v: &mut dyn Visitor, f: &mut FunDec) {
    if let Some(nv) = visit_vardecl(v, &f.svar) {
        f.svar = nv;
    }

    // Visit the formals; a change must go through set_formals so the
    // function type keeps describing the same sequence
    let mut formals_changed = false;
    for idx in 0..f.formals.len() {
        if let Some(nv) = visit_vardecl(v, &f.formals[idx]) {
            f.formals[idx] = nv;
            formals_changed = true;
        }
    }
    if formals_changed {
        let formals = f.formals.clone();
        if let Err(err) = f.set_formals(formals) {
            log::error!("visitor could not re-install formals: {}", err);
        }
    }

    for idx in 0..f.locals.len() {
        if let Some(nv) = visit_vardecl(v, &f.locals[idx]) {
            f.locals[idx] = nv;
        }
    }

    visit_block(v, &mut f.stmts, &mut f.body);
}

/// Visit one global; `Some` replaces it with the returned list
fn visit_global(v: &mut dyn Visitor, g: &mut Global) -> Option<Vec<Global>> {
    if let Some(loc) = g.loc() {
        v.set_location(loc);
    }
    match v.vglobal(g) {
        VisitAction::SkipChildren => None,
        VisitAction::ChangeTo(list) => Some(list),
        VisitAction::DoChildren => {
            global_children(v, g);
            None
        }
        VisitAction::ChangeDoChildrenPost(mut list, post) => {
            for x in list.iter_mut() {
                global_children(v, x);
            }
            Some(post(list))
        }
    }
}

fn global_children(v: &mut dyn Visitor, g: &mut Global) {
    match g {
        Global::Typedef(td, _) => {
            let mut ty = std::mem::replace(&mut td.borrow_mut().ty, Type::void());
            visit_type(v, &mut ty);
            td.borrow_mut().ty = ty;
        }
        Global::CompTag(comp, _) => {
            let fields = comp.borrow().fields.clone();
            for f in &fields {
                let mut ty = std::mem::replace(&mut f.borrow_mut().ty, Type::void());
                visit_type(v, &mut ty);
                f.borrow_mut().ty = ty;

                let mut attrs = std::mem::take(&mut f.borrow_mut().attrs);
                visit_attrs(v, &mut attrs);
                f.borrow_mut().attrs = attrs;
            }
            let mut attrs = std::mem::take(&mut comp.borrow_mut().attrs);
            visit_attrs(v, &mut attrs);
            comp.borrow_mut().attrs = attrs;
        }
        Global::EnumTag(en, _) => {
            let mut items = std::mem::take(&mut en.borrow_mut().items);
            for (_, value) in items.iter_mut() {
                visit_expr(v, value);
            }
            en.borrow_mut().items = items;

            let mut attrs = std::mem::take(&mut en.borrow_mut().attrs);
            visit_attrs(v, &mut attrs);
            en.borrow_mut().attrs = attrs;
        }
        Global::VarDecl(vi, _) => {
            if let Some(nv) = visit_vardecl(v, vi) {
                *vi = nv;
            }
        }
        Global::Var(vi, init, _) => {
            if let Some(nv) = visit_vardecl(v, vi) {
                *vi = nv;
            }
            if let Some(init) = init {
                visit_init(v, init);
            }
        }
        Global::Fun(f, _) => visit_fundec(v, f),
        Global::Pragma(attr, _) => {
            // A pragma holds exactly one attribute; expansion has nowhere
            // to go here
            match v.vattr(attr) {
                VisitAction::SkipChildren => {}
                VisitAction::ChangeTo(mut list) => {
                    if list.len() == 1 {
                        *attr = list.remove(0);
                    } else {
                        log::error!("pragma visitor returned {} attributes", list.len());
                    }
                }
                VisitAction::DoChildren => {
                    attr_children(v, attr);
                }
                VisitAction::ChangeDoChildrenPost(mut list, post) => {
                    for x in list.iter_mut() {
                        attr_children(v, x);
                    }
                    let mut list = post(list);
                    if list.len() == 1 {
                        *attr = list.remove(0);
                    } else {
                        log::error!("pragma visitor returned {} attributes", list.len());
                    }
                }
            }
        }
        Global::Asm(..) | Global::Text(_) => {}
    }
}

/// Visit a list of globals, splicing replacements in place
pub fn visit_globals(v: &mut dyn Visitor, globals: &mut Vec<Global>) {
    let mut out: Option<Vec<Global>> = None;
    for idx in 0..globals.len() {
        trace!("visiting global {}", idx);
        let repl = visit_global(v, &mut globals[idx]);
        splice(&mut out, globals, idx, repl);
    }
    if let Some(list) = out {
        *globals = list;
    }
}

/// Visit a whole module
pub fn visit_module(v: &mut dyn Visitor, m: &mut Module) {
    visit_globals(v, &mut m.globals);
    if let Some(gi) = &mut m.global_init {
        visit_fundec(v, gi);
    }
}
