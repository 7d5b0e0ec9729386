//! End-to-end tests across the IR services: constructors, folding,
//! visiting, CFG, alpha naming, copying and printing

use cir_core::builder::{
    empty_function, integer, kinteger64, make_formal_var, mk_stmt_one_instr, var_lval,
};
use cir_core::{
    compute_cfg_info, const_fold, copy_function, new_alpha_name, visit, AlphaTable,
    AttrList, BinaryOp, Block, Constant, ErrorReporter, Exp, Global, Instr, IntKind,
    Location, Machine, Module, Printer, PrinterOptions, StmtKind, Type, Visitor,
};

#[test]
fn test_kinteger_truncation_scenario() {
    // kinteger64(UShort, 0x1FFFF) stores 0xFFFF and warns
    let mut reporter = ErrorReporter::new();
    let e = kinteger64(IntKind::UShort, 0x1FFFF, &mut reporter);
    match e {
        Exp::Const(Constant::Int { value, kind, .. }) => {
            assert_eq!(value, 0xFFFF);
            assert_eq!(kind, IntKind::UShort);
        }
        other => panic!("expected constant, got {:?}", other),
    }
    assert_eq!(reporter.warning_count(), 1);
}

#[test]
fn test_fold_wraparound_scenario() {
    // 2_000_000_000 + 2_000_000_000 folds to the raw 64-bit sum; the
    // 32-bit wrap only happens under an explicit cast
    let machine = Machine::gcc32();
    let mut reporter = ErrorReporter::new();
    let sum = Exp::Binary {
        op: BinaryOp::Add,
        left: Box::new(integer(2_000_000_000)),
        right: Box::new(integer(2_000_000_000)),
        ty: Type::int(),
    };
    let folded = const_fold(&machine, false, &sum, &mut reporter);
    assert_eq!(folded.is_integer(), Some(4_000_000_000));

    let cast = Exp::Cast {
        target: Type::int(),
        operand: Box::new(folded),
    };
    let wrapped = const_fold(&machine, false, &cast, &mut reporter);
    assert_eq!(wrapped.is_integer(), Some(-294_967_296));
}

#[test]
fn test_alpha_naming_scenario() {
    let mut table = AlphaTable::new();
    assert_eq!(new_alpha_name(&mut table, "x"), "x");
    assert_eq!(new_alpha_name(&mut table, "x"), "x_1");
    assert_eq!(new_alpha_name(&mut table, "x_5"), "x_5");
    assert_eq!(new_alpha_name(&mut table, "x"), "x_6");
    // A leading-zero suffix makes the whole string the prefix
    assert_eq!(new_alpha_name(&mut table, "x_05"), "x_05");
    assert_eq!(new_alpha_name(&mut table, "x_05"), "x_05_0");
}

fn sample_function() -> cir_core::FunDec {
    let mut f = empty_function("f");
    f.set_function_type(Type::Function {
        return_type: Box::new(Type::int()),
        params: Some(vec![]),
        variadic: false,
        attrs: AttrList::new(),
    })
    .unwrap();
    let x = make_formal_var(&mut f, "$", "x", Type::int()).unwrap();
    let set = mk_stmt_one_instr(
        &mut f.stmts,
        Instr::Set {
            lval: var_lval(&x),
            value: Exp::Binary {
                op: BinaryOp::Add,
                left: Box::new(Exp::Lval(var_lval(&x))),
                right: Box::new(integer(1)),
                ty: Type::int(),
            },
            loc: Location::unknown(),
        },
    );
    let ret = f.stmts.alloc(StmtKind::Return(
        Some(Exp::Lval(var_lval(&x))),
        Location::unknown(),
    ));
    f.body = Block::new(vec![set, ret]);
    f
}

#[test]
fn test_cfg_assigns_bounded_unique_ids() {
    let mut f = sample_function();
    let all = compute_cfg_info(&mut f).unwrap();

    let bound = f.max_stmt_id.unwrap();
    let mut seen = std::collections::HashSet::new();
    for &sid in &all {
        assert!(sid < bound);
        assert!(seen.insert(sid), "statement id {} repeated", sid);
        assert_eq!(f.stmts.get(sid).sid, sid);
    }
}

#[test]
fn test_cfg_leaves_structure_unchanged() {
    let mut f = sample_function();
    let before_body = f.body.clone();
    let before_kinds: Vec<_> = f
        .stmts
        .ids()
        .map(|sid| f.stmts.get(sid).kind.clone())
        .collect();

    compute_cfg_info(&mut f).unwrap();

    assert_eq!(f.body, before_body);
    let after_kinds: Vec<_> = f
        .stmts
        .ids()
        .map(|sid| f.stmts.get(sid).kind.clone())
        .collect();
    assert_eq!(before_kinds, after_kinds);
}

#[test]
fn test_copy_function_scenario() {
    let f = sample_function();
    let copy = copy_function(&f, "g");

    assert_eq!(copy.svar.borrow().name, "g");
    for (old, new) in f.formals.iter().zip(copy.formals.iter()) {
        assert!(!old.ptr_eq(new));
    }
    for (old, new) in f.locals.iter().zip(copy.locals.iter()) {
        assert!(!old.ptr_eq(new));
    }

    // The copy folds and prints independently of the original
    let mut m = Module::new("t.c");
    m.globals.push(Global::Fun(copy, Location::unknown()));
    let mut printer = Printer::new(PrinterOptions::default());
    let out = printer.module_to_string(&m);
    assert!(out.contains("int g(int x)"));
}

#[test]
fn test_nop_visit_then_print_is_stable() {
    struct Nop;
    impl Visitor for Nop {}

    let mut m = Module::new("t.c");
    m.globals
        .push(Global::Fun(sample_function(), Location::unknown()));

    let mut printer = Printer::new(PrinterOptions::default());
    let before = printer.module_to_string(&m);

    visit::visit_module(&mut Nop, &mut m);

    let mut printer = Printer::new(PrinterOptions::default());
    let after = printer.module_to_string(&m);
    assert_eq!(before, after);

    // Printing is deterministic
    let mut printer = Printer::new(PrinterOptions::default());
    assert_eq!(printer.module_to_string(&m), after);
}

#[test]
fn test_printed_function_reads_like_c() {
    let mut m = Module::new("t.c");
    m.globals
        .push(Global::Fun(sample_function(), Location::unknown()));

    let mut printer = Printer::new(PrinterOptions::default());
    let out = printer.module_to_string(&m);

    assert!(out.contains("int f(int x)"), "got:\n{}", out);
    assert!(out.contains("x ++;"), "got:\n{}", out);
    assert!(out.contains("return (x);"), "got:\n{}", out);
    // Balanced braces
    assert_eq!(out.matches('{').count(), out.matches('}').count());
}

#[test]
fn test_fold_visitor_composition() {
    // A visitor that folds every expression with the machine model
    struct FoldAll {
        machine: Machine,
        reporter: ErrorReporter,
    }
    impl Visitor for FoldAll {
        fn vexpr(&mut self, e: &Exp) -> cir_core::VisitAction<Exp> {
            let folded = const_fold(&self.machine, true, e, &mut self.reporter);
            if folded != *e {
                cir_core::VisitAction::ChangeTo(folded)
            } else {
                cir_core::VisitAction::DoChildren
            }
        }
    }

    let mut f = empty_function("f");
    let ret = f.stmts.alloc(StmtKind::Return(
        Some(Exp::Binary {
            op: BinaryOp::Mul,
            left: Box::new(Exp::SizeOfType(Type::int())),
            right: Box::new(Exp::Const(Constant::Int {
                value: 2,
                kind: IntKind::UInt,
                text: None,
            })),
            ty: Type::Int(IntKind::UInt, AttrList::new()),
        }),
        Location::unknown(),
    ));
    f.body = Block::new(vec![ret]);
    let mut m = Module::new("t.c");
    m.globals.push(Global::Fun(f, Location::unknown()));

    let mut folder = FoldAll {
        machine: Machine::gcc32(),
        reporter: ErrorReporter::new(),
    };
    visit::visit_module(&mut folder, &mut m);

    let f = m.functions().next().unwrap();
    match &f.stmts.get(f.body.stmts[0]).kind {
        StmtKind::Return(Some(e), _) => assert_eq!(e.is_integer(), Some(8)),
        other => panic!("expected return, got {:?}", other),
    }
}
