//! Instructions, statements, blocks and function definitions
//!
//! Instructions are effectful but control-flow free; statements carry the
//! control flow. Every function owns a statement pool: statements are
//! allocated into it and referred to by `StmtId`, so `Goto` targets,
//! `Switch` case lists and the CFG's successor/predecessor edges are plain
//! id lists instead of aliased pointers. A statement's id is its pool
//! index, assigned at allocation and never changed.

use crate::attributes::AttrList;
use crate::ir::expressions::{Exp, Lval};
use crate::ir::symbols::VarRef;
use crate::ir::types::{FormalParam, Type};
use cir_common::{IrError, IrResult, Location};

/// Identifier of a statement inside its function's pool
pub type StmtId = u32;

/// Statement labels
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    /// A named label; `synthetic` marks labels the library invented
    Name {
        name: String,
        loc: Location,
        synthetic: bool,
    },
    /// A `case <value>:` label
    Case { value: Exp, loc: Location },
    /// A `default:` label
    Default { loc: Location },
}

/// Inline assembly payload
#[derive(Debug, Clone, PartialEq)]
pub struct AsmDetails {
    pub attrs: AttrList,
    /// Template strings, one per line
    pub templates: Vec<String>,
    /// (constraint, written lvalue) pairs
    pub outputs: Vec<(String, Lval)>,
    /// (constraint, read expression) pairs
    pub inputs: Vec<(String, Exp)>,
    pub clobbers: Vec<String>,
    pub loc: Location,
}

/// Effectful, control-flow-free operations
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Assignment
    Set {
        lval: Lval,
        value: Exp,
        loc: Location,
    },
    /// Function call with an optional destination
    Call {
        dest: Option<Lval>,
        callee: Exp,
        args: Vec<Exp>,
        loc: Location,
    },
    /// Inline assembly
    Asm(Box<AsmDetails>),
}

impl Instr {
    pub fn loc(&self) -> &Location {
        match self {
            Instr::Set { loc, .. } | Instr::Call { loc, .. } => loc,
            Instr::Asm(details) => &details.loc,
        }
    }
}

/// A sequence of statements with block-level attributes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub attrs: AttrList,
    pub stmts: Vec<StmtId>,
}

impl Block {
    pub fn new(stmts: Vec<StmtId>) -> Self {
        Self {
            attrs: AttrList::new(),
            stmts,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

/// Statement kinds
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// A run of instructions with no interior control flow
    Instr(Vec<Instr>),
    Return(Option<Exp>, Location),
    /// Jump to another statement of the same function
    Goto(StmtId, Location),
    Break(Location),
    Continue(Location),
    If {
        cond: Exp,
        then_blk: Block,
        else_blk: Block,
        loc: Location,
    },
    Switch {
        cond: Exp,
        body: Block,
        /// The statements carrying this switch's case/default labels
        cases: Vec<StmtId>,
        loc: Location,
    },
    /// `while (1)` loop; exits only via break or goto
    Loop(Block, Location),
    Block(Block),
}

/// A statement: labels, kind, and the CFG bookkeeping filled in by
/// `compute_cfg_info`
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub labels: Vec<Label>,
    pub kind: StmtKind,
    /// Pool index; unique within the owning function
    pub sid: StmtId,
    pub succs: Vec<StmtId>,
    pub preds: Vec<StmtId>,
}

impl Stmt {
    /// First named label, used by the goto printer
    pub fn label_name(&self) -> Option<&str> {
        self.labels.iter().find_map(|l| match l {
            Label::Name { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Per-function statement arena
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StmtPool {
    stmts: Vec<Stmt>,
}

impl StmtPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a statement; its id is its pool index
    pub fn alloc(&mut self, kind: StmtKind) -> StmtId {
        let sid = self.stmts.len() as StmtId;
        self.stmts.push(Stmt {
            labels: Vec::new(),
            kind,
            sid,
            succs: Vec::new(),
            preds: Vec::new(),
        });
        sid
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    pub fn get(&self, id: StmtId) -> &Stmt {
        &self.stmts[id as usize]
    }

    pub fn get_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id as usize]
    }

    pub fn ids(&self) -> impl Iterator<Item = StmtId> {
        0..self.stmts.len() as StmtId
    }

    /// Move a statement out for in-place rewriting, leaving a placeholder.
    /// Callers pair this with `put`.
    pub(crate) fn take(&mut self, id: StmtId) -> Stmt {
        let placeholder = Stmt {
            labels: Vec::new(),
            kind: StmtKind::Instr(Vec::new()),
            sid: id,
            succs: Vec::new(),
            preds: Vec::new(),
        };
        std::mem::replace(&mut self.stmts[id as usize], placeholder)
    }

    pub(crate) fn put(&mut self, id: StmtId, s: Stmt) {
        self.stmts[id as usize] = s;
    }
}

/// A function definition
///
/// The formals listed here and the parameters inside the variable's
/// function type are two views of one sequence; `set_formals` and
/// `set_function_type` keep them synchronized and are the only supported
/// ways to change either side.
#[derive(Debug, Clone)]
pub struct FunDec {
    /// The declaring variable, shared with any prototype of the function
    pub svar: VarRef,
    pub formals: Vec<VarRef>,
    pub locals: Vec<VarRef>,
    /// Next id to hand to a formal or local; formals are numbered from 0
    pub next_local_id: u64,
    pub body: Block,
    pub is_inline: bool,
    /// Upper bound on statement ids, recorded by the CFG builder
    pub max_stmt_id: Option<StmtId>,
    /// Pool owning every statement of the body
    pub stmts: StmtPool,
}

impl FunDec {
    /// Install a new formals list, rewriting the parameter list inside
    /// the function type so both views stay the same sequence
    pub fn set_formals(&mut self, formals: Vec<VarRef>) -> IrResult<()> {
        let svar_ty = self.svar.borrow().ty.clone();
        match svar_ty {
            Type::Function {
                return_type,
                params: _,
                variadic,
                attrs,
            } => {
                let params = formals
                    .iter()
                    .map(|vi| {
                        let v = vi.borrow();
                        FormalParam {
                            name: v.name.clone(),
                            ty: v.ty.clone(),
                            attrs: v.attrs.clone(),
                        }
                    })
                    .collect();
                self.svar.borrow_mut().ty = Type::Function {
                    return_type,
                    params: Some(params),
                    variadic,
                    attrs,
                };
                self.formals = formals;
                Ok(())
            }
            _ => Err(IrError::bug(format!(
                "set_formals: {} does not have a function type",
                self.svar.borrow().name
            ))),
        }
    }

    /// Replace the function type, pushing the new parameter types and
    /// attributes onto the existing formals
    pub fn set_function_type(&mut self, ty: Type) -> IrResult<()> {
        match ty.unroll() {
            Type::Function {
                params: Some(params),
                ..
            } => {
                if params.len() != self.formals.len() {
                    return Err(IrError::bug(
                        "set_function_type: parameter count differs from formals",
                    ));
                }
                self.svar.borrow_mut().ty = ty;
                for (p, vi) in params.iter().zip(self.formals.iter()) {
                    let mut v = vi.borrow_mut();
                    v.ty = p.ty.clone();
                    v.attrs = p.attrs.clone();
                }
                Ok(())
            }
            Type::Function { params: None, .. } => Err(IrError::bug(
                "set_function_type: new type has no parameter list",
            )),
            _ => Err(IrError::bug("set_function_type: not a function type")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder;
    use crate::ir::symbols::VarInfo;

    #[test]
    fn test_pool_ids_are_indices() {
        let mut pool = StmtPool::new();
        let a = pool.alloc(StmtKind::Break(Location::unknown()));
        let b = pool.alloc(StmtKind::Continue(Location::unknown()));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(pool.get(a).sid, a);
        assert_eq!(pool.get(b).sid, b);
    }

    #[test]
    fn test_take_put_round_trip() {
        let mut pool = StmtPool::new();
        let id = pool.alloc(StmtKind::Return(None, Location::unknown()));
        let s = pool.take(id);
        assert!(matches!(s.kind, StmtKind::Return(..)));
        pool.put(id, s);
        assert!(matches!(pool.get(id).kind, StmtKind::Return(..)));
    }

    #[test]
    fn test_set_formals_syncs_type() {
        let mut f = builder::empty_function("f");
        let x = VarRef::new(VarInfo::new("x", Type::int()));
        f.set_formals(vec![x.clone()]).unwrap();

        assert_eq!(f.formals.len(), 1);
        let svar = f.svar.borrow();
        match &svar.ty {
            Type::Function { params: Some(ps), .. } => {
                assert_eq!(ps.len(), 1);
                assert_eq!(ps[0].name, "x");
                assert_eq!(ps[0].ty, Type::int());
            }
            other => panic!("expected a function type, got {:?}", other),
        }
    }

    #[test]
    fn test_set_formals_requires_function_type() {
        let mut f = builder::empty_function("f");
        f.svar.borrow_mut().ty = Type::int();
        assert!(f.set_formals(vec![]).is_err());
    }

    #[test]
    fn test_set_function_type_pushes_onto_formals() {
        let mut f = builder::empty_function("f");
        let x = VarRef::new(VarInfo::new("x", Type::int()));
        f.set_formals(vec![x.clone()]).unwrap();

        let new_ty = Type::Function {
            return_type: Box::new(Type::int()),
            params: Some(vec![FormalParam::new("x", Type::ptr_to(Type::int()))]),
            variadic: false,
            attrs: AttrList::new(),
        };
        f.set_function_type(new_ty).unwrap();
        assert_eq!(x.borrow().ty, Type::ptr_to(Type::int()));
    }

    #[test]
    fn test_label_name_lookup() {
        let s = Stmt {
            labels: vec![
                Label::Default {
                    loc: Location::unknown(),
                },
                Label::Name {
                    name: "out".to_string(),
                    loc: Location::unknown(),
                    synthetic: false,
                },
            ],
            kind: StmtKind::Break(Location::unknown()),
            sid: 0,
            succs: Vec::new(),
            preds: Vec::new(),
        };
        assert_eq!(s.label_name(), Some("out"));
    }
}
