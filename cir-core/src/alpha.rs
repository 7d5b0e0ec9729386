//! Fresh-name generation and function cloning
//!
//! The alpha table remembers, per name prefix, the largest numeric suffix
//! ever handed out, so renaming to freshness is a suffix bump. The
//! function copier produces an independently mutable clone of a function
//! definition: fresh variable descriptors throughout, a fresh statement
//! pool, and every reference inside the body rewritten to the clones.

use crate::ir::statements::{Block, FunDec, StmtId, StmtKind, StmtPool};
use crate::ir::symbols::{hash_name, VarRef};
use crate::visit::{visit_block, VisitAction, Visitor};
use log::debug;
use std::collections::HashMap;

/// Per-prefix record of the largest numeric suffix used
#[derive(Debug, Clone, Default)]
pub struct AlphaTable {
    max_suffix: HashMap<String, i64>,
}

impl AlphaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct prefixes seen
    pub fn len(&self) -> usize {
        self.max_suffix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.max_suffix.is_empty()
    }

    /// The largest suffix recorded for a prefix, if any
    pub fn suffix_of(&self, prefix: &str) -> Option<i64> {
        self.max_suffix.get(prefix).copied()
    }
}

/// Split a name into its prefix and numeric suffix.
///
/// A suffix is accepted only when it follows an underscore, is non-empty,
/// is all digits, and has no leading zero unless it is exactly "0".
/// Names without an acceptable suffix get suffix -1.
fn split_name(name: &str) -> (&str, i64) {
    if let Some(pos) = name.rfind('_') {
        let digits = &name[pos + 1..];
        let acceptable = !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
            && !(digits.len() > 1 && digits.starts_with('0'));
        if acceptable {
            if let Ok(suffix) = digits.parse::<i64>() {
                return (&name[..pos], suffix);
            }
        }
    }
    (name, -1)
}

/// Return `lookup` if its prefix is new, otherwise the prefix with a
/// bumped suffix; either way the table records the suffix now in use
pub fn new_alpha_name(table: &mut AlphaTable, lookup: &str) -> String {
    let (prefix, suffix) = split_name(lookup);
    match table.max_suffix.get_mut(prefix) {
        Some(used) => {
            let new_suffix = if suffix > *used { suffix } else { *used + 1 };
            *used = new_suffix;
            let fresh = format!("{}_{}", prefix, new_suffix);
            debug!("alpha: {} -> {}", lookup, fresh);
            fresh
        }
        None => {
            table.max_suffix.insert(prefix.to_string(), suffix);
            debug!("alpha: {} is fresh", lookup);
            lookup.to_string()
        }
    }
}

struct RemapVars<'a> {
    map: &'a HashMap<VarRef, VarRef>,
}

impl Visitor for RemapVars<'_> {
    fn vvar_use(&mut self, v: &VarRef) -> VisitAction<VarRef> {
        match self.map.get(v) {
            Some(replacement) => VisitAction::ChangeTo(replacement.clone()),
            None => VisitAction::SkipChildren,
        }
    }
}

fn fresh_clone(vi: &VarRef) -> VarRef {
    VarRef::new(vi.borrow().clone())
}

fn remap_stmt_id(map: &HashMap<StmtId, StmtId>, sid: StmtId) -> StmtId {
    match map.get(&sid) {
        Some(&new_id) => new_id,
        None => {
            log::error!("copy_function: statement {} has no clone", sid);
            sid
        }
    }
}

fn remap_block(map: &HashMap<StmtId, StmtId>, b: &mut Block) {
    for sid in b.stmts.iter_mut() {
        *sid = remap_stmt_id(map, *sid);
    }
}

/// Clone every statement into a fresh pool, recording old-id to new-id in
/// `stmt_map`. Successor and predecessor edges are not carried over; the
/// clone gets them from its own CFG pass.
fn clone_stmts(pool: &StmtPool, stmt_map: &mut HashMap<StmtId, StmtId>) -> StmtPool {
    let mut fresh = StmtPool::new();
    for old_id in pool.ids() {
        let old = pool.get(old_id);
        let new_id = fresh.alloc(old.kind.clone());
        fresh.get_mut(new_id).labels = old.labels.clone();
        stmt_map.insert(old_id, new_id);
    }
    fresh
}

/// Rewrite every statement reference inside the cloned pool through the
/// id map: block statement lists, `Goto` targets and `Switch` case lists
fn patch_stmt_ids(pool: &mut StmtPool, stmt_map: &HashMap<StmtId, StmtId>) {
    for sid in 0..pool.len() as StmtId {
        match &mut pool.get_mut(sid).kind {
            StmtKind::Goto(target, _) => {
                *target = remap_stmt_id(stmt_map, *target);
            }
            StmtKind::If {
                then_blk, else_blk, ..
            } => {
                remap_block(stmt_map, then_blk);
                remap_block(stmt_map, else_blk);
            }
            StmtKind::Switch { body, cases, .. } => {
                remap_block(stmt_map, body);
                for case in cases.iter_mut() {
                    *case = remap_stmt_id(stmt_map, *case);
                }
            }
            StmtKind::Loop(body, _) => remap_block(stmt_map, body),
            StmtKind::Block(body) => remap_block(stmt_map, body),
            StmtKind::Instr(_)
            | StmtKind::Return(..)
            | StmtKind::Break(_)
            | StmtKind::Continue(_) => {}
        }
    }
}

/// Deep-clone a function definition under a new name.
///
/// The clone shares nothing mutable with the original: its declaring
/// variable, formals and locals are fresh descriptors, its statements
/// are cloned into a fresh pool with `Goto` targets and `Switch` case
/// lists patched through an id remap table, and every variable reference
/// in the body is rewritten to the cloned variables. Unnamed formals are
/// given names `arg0`, `arg1`, ...
pub fn copy_function(f: &FunDec, new_name: &str) -> FunDec {
    let mut var_map: HashMap<VarRef, VarRef> = HashMap::new();

    let svar = fresh_clone(&f.svar);
    {
        let mut v = svar.borrow_mut();
        v.name = new_name.to_string();
        v.id = hash_name(new_name);
    }
    var_map.insert(f.svar.clone(), svar.clone());

    let formals: Vec<VarRef> = f
        .formals
        .iter()
        .enumerate()
        .map(|(i, old)| {
            let fresh = fresh_clone(old);
            if fresh.borrow().name.is_empty() {
                fresh.borrow_mut().name = format!("arg{}", i);
            }
            var_map.insert(old.clone(), fresh.clone());
            fresh
        })
        .collect();

    let locals: Vec<VarRef> = f
        .locals
        .iter()
        .map(|old| {
            let fresh = fresh_clone(old);
            var_map.insert(old.clone(), fresh.clone());
            fresh
        })
        .collect();

    // Clone the statements, then patch every id reference so the clone
    // points only into its own pool
    let mut stmt_map: HashMap<StmtId, StmtId> = HashMap::new();
    let mut stmts = clone_stmts(&f.stmts, &mut stmt_map);
    patch_stmt_ids(&mut stmts, &stmt_map);
    let mut body = f.body.clone();
    remap_block(&stmt_map, &mut body);

    let mut copy = FunDec {
        svar,
        formals: Vec::new(),
        locals,
        next_local_id: f.next_local_id,
        body,
        is_inline: f.is_inline,
        max_stmt_id: f.max_stmt_id,
        stmts,
    };

    // Rewrite every variable reference in the cloned body
    let mut remap = RemapVars { map: &var_map };
    visit_block(&mut remap, &mut copy.stmts, &mut copy.body);

    // Install the formals through set_formals so the clone's function
    // type describes them
    if let Err(err) = copy.set_formals(formals) {
        log::error!("copy_function: {}", err);
    }
    debug!("copied function {} as {}", f.svar.borrow().name, new_name);
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{
        empty_function, integer, make_formal_var, make_local_var, mk_stmt_one_instr,
        var_lval,
    };
    use crate::ir::expressions::{Exp, Host};
    use crate::ir::statements::{Instr, Label};
    use crate::ir::types::Type;
    use cir_common::Location;

    #[test]
    fn test_fresh_names_bump_suffixes() {
        let mut table = AlphaTable::new();
        assert_eq!(new_alpha_name(&mut table, "x"), "x");
        assert_eq!(new_alpha_name(&mut table, "x"), "x_1");
        assert_eq!(new_alpha_name(&mut table, "x"), "x_2");
    }

    #[test]
    fn test_requested_suffix_wins_when_larger() {
        let mut table = AlphaTable::new();
        assert_eq!(new_alpha_name(&mut table, "x"), "x");
        assert_eq!(new_alpha_name(&mut table, "x"), "x_1");
        assert_eq!(new_alpha_name(&mut table, "x_5"), "x_5");
        assert_eq!(new_alpha_name(&mut table, "x"), "x_6");
    }

    #[test]
    fn test_leading_zero_suffix_is_part_of_prefix() {
        let mut table = AlphaTable::new();
        assert_eq!(new_alpha_name(&mut table, "x_05"), "x_05");
        // The whole string was the prefix, so the bump starts at 0
        assert_eq!(new_alpha_name(&mut table, "x_05"), "x_05_0");
    }

    #[test]
    fn test_zero_suffix_is_acceptable() {
        let mut table = AlphaTable::new();
        assert_eq!(new_alpha_name(&mut table, "x_0"), "x_0");
        assert_eq!(new_alpha_name(&mut table, "x"), "x_1");
    }

    #[test]
    fn test_fresh_lookup_records_suffix() {
        let mut table = AlphaTable::new();
        assert_eq!(new_alpha_name(&mut table, "y_7"), "y_7");
        assert_eq!(table.suffix_of("y"), Some(7));
        assert_eq!(new_alpha_name(&mut table, "y"), "y_8");
    }

    #[test]
    fn test_split_name_rules() {
        assert_eq!(split_name("a_12"), ("a", 12));
        assert_eq!(split_name("a_0"), ("a", 0));
        assert_eq!(split_name("a_012"), ("a_012", -1));
        assert_eq!(split_name("a_"), ("a_", -1));
        assert_eq!(split_name("abc"), ("abc", -1));
        assert_eq!(split_name("a_b_3"), ("a_b", 3));
    }

    fn sample_function() -> FunDec {
        let mut f = empty_function("orig");
        let n = make_formal_var(&mut f, "$", "n", Type::int()).unwrap();
        let t = make_local_var(&mut f, "t", Type::int(), true);
        let set = mk_stmt_one_instr(
            &mut f.stmts,
            Instr::Set {
                lval: var_lval(&t),
                value: Exp::Lval(var_lval(&n)),
                loc: Location::unknown(),
            },
        );
        let target = mk_stmt_one_instr(
            &mut f.stmts,
            Instr::Set {
                lval: var_lval(&t),
                value: integer(0),
                loc: Location::unknown(),
            },
        );
        let jump = f.stmts.alloc(StmtKind::Goto(target, Location::unknown()));
        f.body = Block::new(vec![set, target, jump]);
        f
    }

    #[test]
    fn test_copy_renames_and_relinks() {
        let f = sample_function();
        let copy = copy_function(&f, "clone");

        assert_eq!(copy.svar.borrow().name, "clone");
        assert_eq!(copy.svar.borrow().id, hash_name("clone"));
        assert!(!copy.svar.ptr_eq(&f.svar));

        // Formals and locals are fresh descriptors
        assert!(!copy.formals[0].ptr_eq(&f.formals[0]));
        assert!(!copy.locals[0].ptr_eq(&f.locals[0]));

        // Body references point at the clone's variables
        match &copy.stmts.get(copy.body.stmts[0]).kind {
            StmtKind::Instr(is) => match &is[0] {
                Instr::Set { lval, value, .. } => {
                    match &lval.host {
                        Host::Var(vi) => assert!(vi.ptr_eq(&copy.locals[0])),
                        other => panic!("expected var host, got {:?}", other),
                    }
                    match value {
                        Exp::Lval(lv) => match &lv.host {
                            Host::Var(vi) => assert!(vi.ptr_eq(&copy.formals[0])),
                            other => panic!("expected var host, got {:?}", other),
                        },
                        other => panic!("expected lval read, got {:?}", other),
                    }
                }
                other => panic!("expected set, got {:?}", other),
            },
            other => panic!("expected instr, got {:?}", other),
        }
    }

    #[test]
    fn test_copy_is_independent() {
        let f = sample_function();
        let copy = copy_function(&f, "clone");

        // Mutating the original does not show through the clone
        f.locals[0].borrow_mut().name = "renamed".to_string();
        assert_eq!(copy.locals[0].borrow().name, "t");

        // Goto targets stay inside the clone's pool
        let jump = copy.body.stmts[2];
        match copy.stmts.get(jump).kind {
            StmtKind::Goto(target, _) => {
                assert!((target as usize) < copy.stmts.len());
                assert_eq!(copy.stmts.get(target).sid, target);
            }
            ref other => panic!("expected goto, got {:?}", other),
        }
    }

    #[test]
    fn test_copy_patches_switch_and_goto_ids() {
        let mut f = empty_function("orig");
        let lu = Location::unknown();
        let case_stmt = f.stmts.alloc(StmtKind::Break(lu.clone()));
        f.stmts.get_mut(case_stmt).labels.push(Label::Case {
            value: integer(1),
            loc: lu.clone(),
        });
        let sw = f.stmts.alloc(StmtKind::Switch {
            cond: integer(0),
            body: Block::new(vec![case_stmt]),
            cases: vec![case_stmt],
            loc: lu,
        });
        f.body = Block::new(vec![sw]);

        let copy = copy_function(&f, "clone");
        assert_eq!(copy.stmts.len(), f.stmts.len());

        match &copy.stmts.get(copy.body.stmts[0]).kind {
            StmtKind::Switch { body, cases, .. } => {
                assert_eq!(cases.len(), 1);
                let target = cases[0];
                assert!((target as usize) < copy.stmts.len());
                assert_eq!(body.stmts, vec![target]);
                assert!(matches!(copy.stmts.get(target).kind, StmtKind::Break(_)));
                assert!(matches!(
                    copy.stmts.get(target).labels[0],
                    Label::Case { .. }
                ));
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn test_copy_drops_stale_cfg_edges() {
        let mut f = sample_function();
        let first = f.body.stmts[0];
        let second = f.body.stmts[1];
        f.stmts.get_mut(first).succs.push(second);
        f.stmts.get_mut(second).preds.push(first);

        let copy = copy_function(&f, "clone");
        for sid in copy.stmts.ids() {
            assert!(copy.stmts.get(sid).succs.is_empty());
            assert!(copy.stmts.get(sid).preds.is_empty());
        }
    }

    #[test]
    fn test_copy_names_unnamed_formals() {
        let mut f = empty_function("orig");
        make_formal_var(&mut f, "$", "", Type::int()).unwrap();
        make_formal_var(&mut f, "$", "named", Type::int()).unwrap();

        let copy = copy_function(&f, "clone");
        assert_eq!(copy.formals[0].borrow().name, "arg0");
        assert_eq!(copy.formals[1].borrow().name, "named");

        // The synchronized function type sees the new names too
        let svar = copy.svar.borrow();
        match &svar.ty {
            Type::Function {
                params: Some(ps), ..
            } => assert_eq!(ps[0].name, "arg0"),
            other => panic!("expected function type, got {:?}", other),
        }
    }

    #[test]
    fn test_copy_formals_share_type_sequence() {
        let f = sample_function();
        let copy = copy_function(&f, "clone");
        let svar = copy.svar.borrow();
        match &svar.ty {
            Type::Function {
                params: Some(ps), ..
            } => {
                assert_eq!(ps.len(), copy.formals.len());
                assert_eq!(ps[0].name, copy.formals[0].borrow().name);
            }
            other => panic!("expected function type, got {:?}", other),
        }
    }
}
