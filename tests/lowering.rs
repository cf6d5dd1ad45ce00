//! Lowering typed ASTs into basic blocks.

mod common;

use bir::ast::{
    AssignTarget, AstConstant, AstExpr, AstExprKind, AstFunctionBody, AstGlobal, AstImport,
    AstStmt, Ident, Literal, UnaryOp,
};
use bir::config::LowerConfig;
use bir::error::LowerError;
use bir::ir::block::BlockId;
use bir::ir::function::{Function, ScopeEntry};
use bir::ir::instr::{BinaryOpKind, NonTerminatorOp, TerminatorOp};
use bir::ir::operand::{Operand, VarId, VarKind, VarRange};
use bir::ir::package::{Package, PackageId};
use bir::lower::{lower, lower_lenient};

use common::{block, function, increment_package, ret, sp, var_def, Fixture};

fn lower_ok(ast: &bir::ast::AstPackage) -> Package {
    lower(ast, &LowerConfig::default()).expect("lowering should succeed")
}

fn term(func: &Function, bb: usize) -> &TerminatorOp {
    &func.blocks()[bb]
        .terminator
        .as_ref()
        .expect("block should be sealed")
        .op
}

fn var_name(func: &Function, op: &Operand) -> String {
    match op {
        Operand::Var(id) => func.var(*id).expect("known var").name.clone(),
        other => panic!("expected a local operand, got {:?}", other),
    }
}

fn assign(name: &str, value: AstExpr, line: i32) -> AstStmt {
    AstStmt::Assign {
        target: AssignTarget::Var(Ident::new(name, sp(line))),
        value,
        span: sp(line),
    }
}

#[test]
fn test_straight_line_function() {
    let pkg = lower_ok(&increment_package());
    assert_eq!(pkg.id, PackageId::new("acme", "demo", "0.1.0"));
    let f = pkg.function("f").expect("f lowered");

    assert_eq!(f.blocks().len(), 1);
    let entry = &f.blocks()[0];
    assert_eq!(entry.name, "bb0");

    let adds: Vec<_> = entry
        .instructions
        .iter()
        .filter(|i| matches!(i.op, NonTerminatorOp::BinaryOp { op: BinaryOpKind::Add, .. }))
        .collect();
    assert_eq!(adds.len(), 1);

    // The add result is moved into the return variable right before returning.
    let Some(NonTerminatorOp::Move { lhs, rhs }) = entry.instructions.last().map(|i| &i.op) else {
        panic!("last instruction should be a move");
    };
    assert_eq!(var_name(f, lhs), "%0");
    assert_eq!(adds[0].op.lhs(), Some(rhs));
    assert_eq!(term(f, 0), &TerminatorOp::Return);

    assert_eq!(f.return_var, Some(VarId(0)));
    assert_eq!(f.args_count, 1);
    assert_eq!(f.required_params[0].name, "x");
    assert_eq!(f.pos.source_file, "demo.bal");
    f.validate().expect("lowered function is well formed");
}

#[test]
fn test_variable_order_and_kinds() {
    let pkg = lower_ok(&increment_package());
    let f = pkg.function("f").unwrap();
    let vars: Vec<(&str, VarKind)> = f
        .local_vars()
        .iter()
        .map(|v| (v.name.as_str(), v.kind))
        .collect();
    assert_eq!(
        vars,
        vec![
            ("%0", VarKind::Return),
            ("x", VarKind::Arg),
            ("%2", VarKind::Temp),
            ("%3", VarKind::Temp),
        ]
    );
    assert_eq!(f.local_vars()[1].meta_var_name.as_deref(), Some("x"));
}

#[test]
fn test_if_else_with_returning_arms() {
    let fx = Fixture::new();
    let body = vec![AstStmt::If {
        cond: fx.bool_var("c", 1),
        then_block: block(vec![ret(fx.int_lit(1, 2))]),
        else_branch: Some(Box::new(AstStmt::Block(block(vec![ret(fx.int_lit(2, 4))])))),
        span: sp(1),
    }];
    let f = function("g", vec![fx.param("c", fx.boolean)], fx.int, body);
    let pkg = lower_ok(&fx.package(vec![f]));
    let g = pkg.function("g").unwrap();

    assert_eq!(g.blocks().len(), 4);
    let TerminatorOp::Branch { cond, on_true, on_false } = term(g, 0) else {
        panic!("entry should branch");
    };
    assert_eq!(var_name(g, cond), "c");
    assert_eq!((*on_true, *on_false), (BlockId(1), BlockId(2)));
    // Both arms jump to the merge block, which carries the return.
    let merge = BlockId(3);
    assert_eq!(term(g, 1), &TerminatorOp::Goto { target: merge });
    assert_eq!(term(g, 2), &TerminatorOp::Goto { target: merge });
    assert_eq!(term(g, 3), &TerminatorOp::Return);
    assert!(g.blocks()[3].instructions.is_empty());

    let preds: Vec<usize> = g
        .blocks()
        .iter()
        .enumerate()
        .filter(|(_, b)| b.successors().contains(&merge))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(preds, vec![1, 2]);

    // Each arm still sets the return variable before jumping.
    for arm in [1, 2] {
        let NonTerminatorOp::Move { lhs, .. } = &g.blocks()[arm].instructions.last().unwrap().op
        else {
            panic!("arm should move into %0");
        };
        assert_eq!(var_name(g, lhs), "%0");
    }
    g.validate().unwrap();
}

#[test]
fn test_nested_returning_if_converges_outward() {
    let fx = Fixture::new();
    let inner = AstStmt::If {
        cond: fx.bool_var("c", 2),
        then_block: block(vec![ret(fx.int_lit(1, 3))]),
        else_branch: Some(Box::new(AstStmt::Block(block(vec![ret(fx.int_lit(2, 5))])))),
        span: sp(2),
    };
    let body = vec![AstStmt::If {
        cond: fx.bool_var("c", 1),
        then_block: block(vec![inner]),
        else_branch: Some(Box::new(AstStmt::Block(block(vec![ret(fx.int_lit(3, 7))])))),
        span: sp(1),
    }];
    let f = function("k", vec![fx.param("c", fx.boolean)], fx.int, body);
    let pkg = lower_ok(&fx.package(vec![f]));
    let k = pkg.function("k").unwrap();

    // bb0 entry, bb1 outer then, bb2 inner then, bb3 inner else,
    // bb4 inner merge, bb5 outer else, bb6 outer merge
    assert_eq!(k.blocks().len(), 7);
    assert_eq!(term(k, 2), &TerminatorOp::Goto { target: BlockId(4) });
    assert_eq!(term(k, 3), &TerminatorOp::Goto { target: BlockId(4) });
    assert_eq!(term(k, 4), &TerminatorOp::Goto { target: BlockId(6) });
    assert_eq!(term(k, 5), &TerminatorOp::Goto { target: BlockId(6) });
    assert_eq!(term(k, 6), &TerminatorOp::Return);
    k.validate().unwrap();
}

#[test]
fn test_if_else_arms_converge_on_one_merge_block() {
    let fx = Fixture::new();
    let body = vec![
        var_def("y", fx.int, Some(fx.int_lit(0, 1)), 1),
        AstStmt::If {
            cond: fx.bool_var("c", 2),
            then_block: block(vec![assign("y", fx.int_lit(1, 3), 3)]),
            else_branch: Some(Box::new(AstStmt::Block(block(vec![assign(
                "y",
                fx.int_lit(2, 5),
                5,
            )])))),
            span: sp(2),
        },
        ret(fx.int_var("y", 7)),
    ];
    let f = function("h", vec![fx.param("c", fx.boolean)], fx.int, body);
    let pkg = lower_ok(&fx.package(vec![f]));
    let h = pkg.function("h").unwrap();

    assert_eq!(h.blocks().len(), 4);
    let merge = BlockId(3);
    assert_eq!(term(h, 1), &TerminatorOp::Goto { target: merge });
    assert_eq!(term(h, 2), &TerminatorOp::Goto { target: merge });
    assert_eq!(term(h, 3), &TerminatorOp::Return);

    let then_move = h.blocks()[1].instructions.last().unwrap();
    let NonTerminatorOp::Move { lhs, .. } = &then_move.op else {
        panic!("then arm should assign");
    };
    assert_eq!(var_name(h, lhs), "y");
}

#[test]
fn test_if_without_else_branches_to_merge() {
    let fx = Fixture::new();
    let body = vec![
        var_def("y", fx.int, Some(fx.int_lit(0, 1)), 1),
        AstStmt::If {
            cond: fx.bool_var("c", 2),
            then_block: block(vec![assign("y", fx.int_lit(1, 3), 3)]),
            else_branch: None,
            span: sp(2),
        },
        ret(fx.int_var("y", 5)),
    ];
    let f = function("h", vec![fx.param("c", fx.boolean)], fx.int, body);
    let pkg = lower_ok(&fx.package(vec![f]));
    let h = pkg.function("h").unwrap();

    assert_eq!(h.blocks().len(), 3);
    let TerminatorOp::Branch { on_true, on_false, .. } = term(h, 0) else {
        panic!("entry should branch");
    };
    assert_eq!((*on_true, *on_false), (BlockId(1), BlockId(2)));
    assert_eq!(term(h, 1), &TerminatorOp::Goto { target: BlockId(2) });
}

#[test]
fn test_while_with_break_and_continue() {
    let fx = Fixture::new();
    let loop_body = vec![
        AstStmt::If {
            cond: fx.lt(fx.int_var("i", 3), fx.int_lit(5, 3)),
            then_block: block(vec![AstStmt::Break { span: sp(3) }]),
            else_branch: None,
            span: sp(3),
        },
        assign("i", fx.add(fx.int_var("i", 4), fx.int_lit(1, 4)), 4),
        AstStmt::Continue { span: sp(5) },
        // Unreachable, skipped.
        assign("i", fx.int_lit(99, 6), 6),
    ];
    let body = vec![
        var_def("i", fx.int, Some(fx.int_lit(0, 1)), 1),
        AstStmt::While {
            cond: fx.lt(fx.int_var("i", 2), fx.int_var("n", 2)),
            body: block(loop_body),
            span: sp(2),
        },
        ret(fx.int_var("i", 8)),
    ];
    let f = function("count", vec![fx.param("n", fx.int)], fx.int, body);
    let pkg = lower_ok(&fx.package(vec![f]));
    let count = pkg.function("count").unwrap();

    // bb0 entry, bb1 head, bb2 body, bb3 end, bb4 break arm, bb5 if-merge
    assert_eq!(count.blocks().len(), 6);
    assert_eq!(term(count, 0), &TerminatorOp::Goto { target: BlockId(1) });
    let TerminatorOp::Branch { on_true, on_false, .. } = term(count, 1) else {
        panic!("loop head should branch");
    };
    assert_eq!((*on_true, *on_false), (BlockId(2), BlockId(3)));
    assert_eq!(term(count, 4), &TerminatorOp::Goto { target: BlockId(3) });
    assert_eq!(term(count, 5), &TerminatorOp::Goto { target: BlockId(1) });
    assert_eq!(term(count, 3), &TerminatorOp::Return);

    // `i = i + 1` only: the assignment after `continue` emitted nothing.
    assert_eq!(count.blocks()[5].instructions.len(), 3);
    count.validate().unwrap();
}

#[test]
fn test_unresolved_reference() {
    let fx = Fixture::new();
    let f = function("f", vec![], fx.int, vec![ret(fx.int_var("z", 3))]);
    let err = lower(&fx.package(vec![f]), &LowerConfig::default()).unwrap_err();
    assert_eq!(
        err,
        LowerError::UnresolvedReference {
            name: "z".to_string(),
            func: "f".to_string(),
            line: 3,
        }
    );
}

fn unsupported_kind(stmts: Vec<AstStmt>) -> &'static str {
    let fx = Fixture::new();
    let f = function("f", vec![fx.param("x", fx.int)], fx.nil, stmts);
    match lower(&fx.package(vec![f]), &LowerConfig::default()) {
        Err(LowerError::UnsupportedConstruct { kind, func, .. }) => {
            assert_eq!(func, "f");
            kind
        }
        other => panic!("expected an unsupported construct, got {:?}", other),
    }
}

#[test]
fn test_unsupported_constructs_are_reported() {
    let fx = Fixture::new();

    let foreach = AstStmt::Foreach {
        var: Ident::new("v", sp(1)),
        collection: fx.int_var("x", 1),
        body: block(vec![]),
        span: sp(1),
    };
    assert_eq!(unsupported_kind(vec![foreach]), "foreach statement");

    let complement = AstExpr::new(
        AstExprKind::Unary {
            op: UnaryOp::Complement,
            operand: Box::new(fx.int_var("x", 1)),
        },
        fx.int,
        sp(1),
    );
    assert_eq!(unsupported_kind(vec![AstStmt::Expr(complement)]), "bitwise complement");

    let check = AstExpr::new(AstExprKind::Check(Box::new(fx.int_var("x", 1))), fx.int, sp(1));
    assert_eq!(unsupported_kind(vec![AstStmt::Expr(check)]), "check expression");

    assert_eq!(
        unsupported_kind(vec![AstStmt::Break { span: sp(1) }]),
        "break outside of a loop"
    );
}

#[test]
fn test_expression_bodied_function_is_unsupported() {
    let fx = Fixture::new();
    let mut f = function("f", vec![], fx.int, vec![]);
    f.body = AstFunctionBody::Expr(fx.int_lit(1, 0));
    let err = lower(&fx.package(vec![f]), &LowerConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        LowerError::UnsupportedConstruct { kind: "expression-bodied function", .. }
    ));
}

#[test]
fn test_temp_names_are_deterministic() {
    let ast = increment_package();
    let names = |pkg: &Package| -> Vec<String> {
        pkg.function("f")
            .unwrap()
            .local_vars()
            .iter()
            .map(|v| v.name.clone())
            .collect()
    };
    let first = lower_ok(&ast);
    let second = lower_ok(&ast);
    assert_eq!(names(&first), names(&second));
    assert_eq!(first, second);
}

#[test]
fn test_shadowing_gets_unique_name_and_scope_entries() {
    let fx = Fixture::new();
    let body = vec![
        var_def("a", fx.int, Some(fx.int_lit(5, 1)), 1),
        AstStmt::Block(block(vec![var_def("x", fx.int, Some(fx.int_var("a", 2)), 2)])),
        ret(fx.int_var("x", 3)),
    ];
    let f = function("s", vec![fx.param("x", fx.int)], fx.int, body);
    let pkg = lower_ok(&fx.package(vec![f]));
    let s = pkg.function("s").unwrap();

    let inner = s.var_by_name("x$4").expect("shadowing local renamed");
    let dcl = s.var(inner).unwrap();
    assert_eq!(dcl.kind, VarKind::Local);
    assert_eq!(dcl.meta_var_name.as_deref(), Some("x"));
    assert_eq!(
        dcl.range,
        Some(VarRange {
            start: BlockId(0),
            end: BlockId(0),
            ins_offset: 2,
        })
    );

    assert_eq!(
        s.scopes,
        vec![
            ScopeEntry { id: 0, ins_offset: 0, parent: None },
            ScopeEntry { id: 1, ins_offset: 2, parent: Some(0) },
        ]
    );

    // After the block closes, `x` is the parameter again.
    let NonTerminatorOp::Move { rhs, .. } = &s.blocks()[0].instructions.last().unwrap().op else {
        panic!("return should move into %0");
    };
    assert_eq!(var_name(s, rhs), "x");
}

fn module_items(fx: &Fixture) -> (AstImport, AstGlobal, AstConstant) {
    let import = AstImport {
        org: Some("ballerina".to_string()),
        name: Some("io".to_string()),
        version: None,
        alias: Some("io".to_string()),
        span: sp(0),
    };
    let global = AstGlobal {
        name: Ident::new("counter", sp(1)),
        ty: fx.int,
        flags: 0,
    };
    let constant = AstConstant {
        name: Ident::new("LIMIT", sp(2)),
        ty: fx.int,
        flags: 0,
        value: AstExpr::literal(Literal::Int(10), fx.int, sp(2)),
    };
    (import, global, constant)
}

#[test]
fn test_constants_and_globals_resolve() {
    let fx = Fixture::new();
    let (import, global, constant) = module_items(&fx);
    let body = vec![
        assign("counter", fx.int_var("LIMIT", 4), 4),
        AstStmt::Expr(AstExpr {
            kind: AstExprKind::Invocation {
                pkg_alias: Some("io".to_string()),
                name: "println".to_string(),
                args: vec![fx.int_var("counter", 5)],
            },
            ty: fx.nil,
            span: sp(5),
        }),
    ];
    let f = function("tick", vec![], fx.nil, body);
    let mut ast = fx.package(vec![f]);
    ast.imports.push(import);
    ast.globals.push(global);
    ast.constants.push(constant);

    let pkg = lower_ok(&ast);
    assert_eq!(pkg.imports, vec![PackageId::new("ballerina", "io", "0.0.0")]);
    assert_eq!(pkg.constants.len(), 1);
    assert_eq!(pkg.globals.len(), 1);

    let tick = pkg.function("tick").unwrap();
    assert_eq!(tick.dependent_globals, vec!["counter".to_string()]);

    let entry = &tick.blocks()[0];
    assert!(matches!(entry.instructions[0].op, NonTerminatorOp::ConstLoad { .. }));
    let NonTerminatorOp::Move { lhs: Operand::Global(g), .. } = &entry.instructions[1].op else {
        panic!("assignment to a global should move into a global operand");
    };
    assert_eq!(g.name, "counter");

    let TerminatorOp::Call { call, then } = term(tick, 0) else {
        panic!("invocation should end the block with a call");
    };
    assert_eq!(call.pkg.name, "io");
    assert_eq!(call.name, "println");
    assert_eq!(*then, BlockId(1));
    assert_eq!(term(tick, 1), &TerminatorOp::Return);
}

#[test]
fn test_assignment_to_constant_is_rejected() {
    let fx = Fixture::new();
    let (_, _, constant) = module_items(&fx);
    let f = function("f", vec![], fx.nil, vec![assign("LIMIT", fx.int_lit(1, 3), 3)]);
    let mut ast = fx.package(vec![f]);
    ast.constants.push(constant);
    let err = lower(&ast, &LowerConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        LowerError::UnsupportedConstruct { kind: "assignment to a constant", .. }
    ));
}

#[test]
fn test_duplicate_definition() {
    let fx = Fixture::new();
    let a = function("f", vec![], fx.nil, vec![]);
    let b = function("f", vec![], fx.nil, vec![]);
    let err = lower(&fx.package(vec![a, b]), &LowerConfig::default()).unwrap_err();
    assert_eq!(err, LowerError::DuplicateDefinition { name: "f".to_string() });
}

#[test]
fn test_lenient_lowering_keeps_good_functions() {
    let fx = Fixture::new();
    let good = function("good", vec![], fx.int, vec![ret(fx.int_lit(1, 1))]);
    let bad = function("bad", vec![], fx.int, vec![ret(fx.int_var("missing", 2))]);
    let (pkg, errors) = lower_lenient(&fx.package(vec![bad, good]), &LowerConfig::default());

    assert_eq!(pkg.functions.len(), 1);
    assert_eq!(pkg.functions[0].name, "good");
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], LowerError::UnresolvedReference { func, .. } if func == "bad"));
}

#[test]
fn test_lenient_lowering_collects_every_error() {
    let fx = Fixture::new();
    let unresolved = function("a", vec![], fx.int, vec![ret(fx.int_var("missing", 1))]);
    let unsupported = function("b", vec![], fx.int, vec![AstStmt::Break { span: sp(2) }]);
    let first = function("c", vec![], fx.int, vec![ret(fx.int_lit(1, 3))]);
    let duplicate = function("c", vec![], fx.int, vec![ret(fx.int_lit(2, 4))]);
    let ast = fx.package(vec![unresolved, unsupported, first, duplicate]);
    let (pkg, errors) = lower_lenient(&ast, &LowerConfig::default());

    assert_eq!(pkg.functions.len(), 1);
    assert_eq!(pkg.functions[0].name, "c");
    assert_eq!(errors.len(), 3, "{errors:?}");
    assert!(matches!(&errors[0], LowerError::UnresolvedReference { .. }));
    assert!(matches!(&errors[1], LowerError::UnsupportedConstruct { .. }));
    assert!(matches!(&errors[2], LowerError::DuplicateDefinition { .. }));

    // The same package fails fast on its first error.
    let err = lower(&ast, &LowerConfig::default()).unwrap_err();
    assert_eq!(err, errors[0]);
}

#[test]
fn test_source_file_falls_back_to_config() {
    let mut ast = increment_package();
    ast.source_file = None;
    let config = LowerConfig {
        source_file: "fallback.bal".to_string(),
    };
    let pkg = lower(&ast, &config).unwrap();
    assert_eq!(pkg.function("f").unwrap().pos.source_file, "fallback.bal");
}

#[test]
fn test_independent_packages_lower_concurrently() {
    let a = increment_package();
    let mut b = increment_package();
    b.name = Some("other".to_string());

    let (pa, pb) = std::thread::scope(|s| {
        let ha = s.spawn(|| lower(&a, &LowerConfig::default()));
        let hb = s.spawn(|| lower(&b, &LowerConfig::default()));
        (ha.join().unwrap(), hb.join().unwrap())
    });
    let (pa, pb) = (pa.unwrap(), pb.unwrap());
    assert_eq!(pa.id.name, "demo");
    assert_eq!(pb.id.name, "other");
    assert_eq!(pa.functions, pb.functions);
}
