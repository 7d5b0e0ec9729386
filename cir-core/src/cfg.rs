//! Control-flow graph construction
//!
//! Fills in the successor and predecessor id lists on every statement of
//! a function. Statement ids are pool indices and never change; this pass
//! clears stale edges, links the new ones, records the id bound on the
//! function and returns the statements in body order.
//!
//! Break, Continue and Switch are not handled: callers normalize them
//! into gotos first, and asking for a CFG while they are still present is
//! an error.

use crate::ir::statements::{FunDec, StmtId, StmtKind, StmtPool};
use cir_common::{IrError, IrResult};
use log::debug;

fn child_stmt_lists(kind: &StmtKind) -> Vec<Vec<StmtId>> {
    match kind {
        StmtKind::If {
            then_blk, else_blk, ..
        } => vec![then_blk.stmts.clone(), else_blk.stmts.clone()],
        StmtKind::Switch { body, .. } => vec![body.stmts.clone()],
        StmtKind::Loop(body, _) => vec![body.stmts.clone()],
        StmtKind::Block(body) => vec![body.stmts.clone()],
        _ => Vec::new(),
    }
}

fn collect(pool: &mut StmtPool, stmts: &[StmtId], out: &mut Vec<StmtId>) {
    for &sid in stmts {
        {
            let s = pool.get_mut(sid);
            s.succs.clear();
            s.preds.clear();
        }
        out.push(sid);
        let children = child_stmt_lists(&pool.get(sid).kind);
        for list in children {
            collect(pool, &list, out);
        }
    }
}

fn link(pool: &mut StmtPool, from: StmtId, to: StmtId) {
    pool.get_mut(from).succs.push(to);
    pool.get_mut(to).preds.push(from);
}

fn trylink(pool: &mut StmtPool, from: StmtId, to: Option<StmtId>) {
    if let Some(to) = to {
        link(pool, from, to);
    }
}

fn succpred_list(
    pool: &mut StmtPool,
    stmts: &[StmtId],
    fallthrough: Option<StmtId>,
) -> IrResult<()> {
    for i in 0..stmts.len() {
        let ft = if i + 1 < stmts.len() {
            Some(stmts[i + 1])
        } else {
            fallthrough
        };
        succpred_stmt(pool, stmts[i], ft)?;
    }
    Ok(())
}

/// The control-flow-relevant part of a statement, owned so the pool can
/// be mutated while it is inspected
enum FlowShape {
    Straight,
    Stop,
    Jump(StmtId),
    Unnormalized,
    Branch(Vec<StmtId>, Vec<StmtId>),
    Cycle(Vec<StmtId>),
    Nested(Vec<StmtId>),
}

fn flow_shape(kind: &StmtKind) -> FlowShape {
    match kind {
        StmtKind::Instr(_) => FlowShape::Straight,
        StmtKind::Return(..) => FlowShape::Stop,
        StmtKind::Goto(target, _) => FlowShape::Jump(*target),
        StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Switch { .. } => {
            FlowShape::Unnormalized
        }
        StmtKind::If {
            then_blk, else_blk, ..
        } => FlowShape::Branch(then_blk.stmts.clone(), else_blk.stmts.clone()),
        StmtKind::Loop(body, _) => FlowShape::Cycle(body.stmts.clone()),
        StmtKind::Block(body) => FlowShape::Nested(body.stmts.clone()),
    }
}

fn succpred_stmt(pool: &mut StmtPool, sid: StmtId, fallthrough: Option<StmtId>) -> IrResult<()> {
    match flow_shape(&pool.get(sid).kind) {
        FlowShape::Straight => {
            trylink(pool, sid, fallthrough);
            Ok(())
        }
        FlowShape::Stop => Ok(()),
        FlowShape::Jump(target) => {
            link(pool, sid, target);
            Ok(())
        }
        FlowShape::Unnormalized => Err(IrError::unsupported(
            "compute_cfg_info on a function with break, continue or switch; \
             normalize them away first",
        )),
        FlowShape::Branch(then_ids, else_ids) => {
            // Successors read [then branch, else branch]; an empty branch
            // falls through
            match then_ids.first() {
                Some(&head) => link(pool, sid, head),
                None => trylink(pool, sid, fallthrough),
            }
            match else_ids.first() {
                Some(&head) => link(pool, sid, head),
                None => trylink(pool, sid, fallthrough),
            }
            succpred_list(pool, &then_ids, fallthrough)?;
            succpred_list(pool, &else_ids, fallthrough)
        }
        FlowShape::Cycle(body_ids) => {
            let head = *body_ids
                .first()
                .ok_or_else(|| IrError::bug("compute_cfg_info: empty loop body"))?;
            link(pool, sid, head);
            succpred_list(pool, &body_ids, Some(head))
        }
        FlowShape::Nested(body_ids) => {
            match body_ids.first() {
                Some(&head) => link(pool, sid, head),
                None => trylink(pool, sid, fallthrough),
            }
            succpred_list(pool, &body_ids, fallthrough)
        }
    }
}

/// Compute successor/predecessor links for every statement of `f`.
///
/// Records the statement-id bound in `f.max_stmt_id` and returns the
/// statements in body order.
pub fn compute_cfg_info(f: &mut FunDec) -> IrResult<Vec<StmtId>> {
    let body_ids = f.body.stmts.clone();
    let mut all = Vec::new();
    collect(&mut f.stmts, &body_ids, &mut all);
    f.max_stmt_id = Some(f.stmts.len() as StmtId);
    succpred_list(&mut f.stmts, &body_ids, None)?;
    debug!(
        "cfg for {}: {} statements",
        f.svar.borrow().name,
        all.len()
    );
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{
        empty_function, integer, mk_block, mk_empty_stmt, mk_while,
    };
    use crate::ir::statements::Block;
    use cir_common::Location;

    #[test]
    fn test_straight_line_links() {
        let mut f = empty_function("f");
        let lu = Location::unknown();
        let a = mk_empty_stmt(&mut f.stmts);
        let b = mk_empty_stmt(&mut f.stmts);
        let ret = f.stmts.alloc(StmtKind::Return(None, lu));
        f.body = Block::new(vec![a, b, ret]);

        let all = compute_cfg_info(&mut f).unwrap();
        assert_eq!(all, vec![a, b, ret]);
        assert_eq!(f.stmts.get(a).succs, vec![b]);
        assert_eq!(f.stmts.get(b).succs, vec![ret]);
        assert!(f.stmts.get(ret).succs.is_empty());
        assert_eq!(f.stmts.get(ret).preds, vec![b]);
        assert_eq!(f.max_stmt_id, Some(f.stmts.len() as StmtId));
    }

    #[test]
    fn test_goto_links_to_target() {
        let mut f = empty_function("f");
        let lu = Location::unknown();
        let target = mk_empty_stmt(&mut f.stmts);
        let jump = f.stmts.alloc(StmtKind::Goto(target, lu));
        f.body = Block::new(vec![target, jump]);

        compute_cfg_info(&mut f).unwrap();
        assert_eq!(f.stmts.get(jump).succs, vec![target]);
        assert!(f.stmts.get(target).preds.contains(&jump));
    }

    #[test]
    fn test_if_links_both_branches() {
        let mut f = empty_function("f");
        let lu = Location::unknown();
        let then_s = mk_empty_stmt(&mut f.stmts);
        let else_s = mk_empty_stmt(&mut f.stmts);
        let cond = f.stmts.alloc(StmtKind::If {
            cond: integer(1),
            then_blk: mk_block(vec![then_s]),
            else_blk: mk_block(vec![else_s]),
            loc: lu.clone(),
        });
        let after = f.stmts.alloc(StmtKind::Return(None, lu));
        f.body = Block::new(vec![cond, after]);

        compute_cfg_info(&mut f).unwrap();
        assert_eq!(f.stmts.get(cond).succs, vec![then_s, else_s]);
        assert_eq!(f.stmts.get(then_s).succs, vec![after]);
        assert_eq!(f.stmts.get(else_s).succs, vec![after]);
    }

    #[test]
    fn test_if_empty_branch_falls_through() {
        let mut f = empty_function("f");
        let lu = Location::unknown();
        let then_s = mk_empty_stmt(&mut f.stmts);
        let cond = f.stmts.alloc(StmtKind::If {
            cond: integer(1),
            then_blk: mk_block(vec![then_s]),
            else_blk: mk_block(vec![]),
            loc: lu.clone(),
        });
        let after = f.stmts.alloc(StmtKind::Return(None, lu));
        f.body = Block::new(vec![cond, after]);

        compute_cfg_info(&mut f).unwrap();
        assert_eq!(f.stmts.get(cond).succs, vec![then_s, after]);
    }

    #[test]
    fn test_loop_links_back_to_head() {
        let mut f = empty_function("f");
        let lu = Location::unknown();
        let a = mk_empty_stmt(&mut f.stmts);
        let b = mk_empty_stmt(&mut f.stmts);
        let loop_id = f
            .stmts
            .alloc(StmtKind::Loop(mk_block(vec![a, b]), lu));
        f.body = Block::new(vec![loop_id]);

        let all = compute_cfg_info(&mut f).unwrap();
        assert_eq!(all, vec![loop_id, a, b]);
        assert_eq!(f.stmts.get(loop_id).succs, vec![a]);
        assert_eq!(f.stmts.get(a).succs, vec![b]);
        // the last body statement loops back to the head
        assert_eq!(f.stmts.get(b).succs, vec![a]);
        assert!(f.stmts.get(a).preds.contains(&loop_id));
        assert!(f.stmts.get(a).preds.contains(&b));
    }

    #[test]
    fn test_while_shape_is_rejected_until_normalized() {
        // mk_while still contains a Break; the CFG pass wants it
        // normalized away first
        let mut f = empty_function("f");
        let body = vec![mk_empty_stmt(&mut f.stmts)];
        let stmts = mk_while(&mut f.stmts, integer(1), body);
        f.body = Block::new(stmts);

        assert!(matches!(
            compute_cfg_info(&mut f),
            Err(IrError::Unsupported(_))
        ));
    }

    #[test]
    fn test_switch_is_rejected() {
        let mut f = empty_function("f");
        let lu = Location::unknown();
        let sw = f.stmts.alloc(StmtKind::Switch {
            cond: integer(1),
            body: mk_block(vec![]),
            cases: vec![],
            loc: lu,
        });
        f.body = Block::new(vec![sw]);

        assert!(matches!(
            compute_cfg_info(&mut f),
            Err(IrError::Unsupported(_))
        ));
    }

    #[test]
    fn test_recompute_clears_stale_edges() {
        let mut f = empty_function("f");
        let a = mk_empty_stmt(&mut f.stmts);
        let b = mk_empty_stmt(&mut f.stmts);
        f.body = Block::new(vec![a, b]);

        compute_cfg_info(&mut f).unwrap();
        compute_cfg_info(&mut f).unwrap();
        assert_eq!(f.stmts.get(a).succs, vec![b]);
        assert_eq!(f.stmts.get(b).preds, vec![a]);
    }
}
