//! Text rendering and instruction statistics.

mod common;

use bir::ast::{AstExpr, AstStmt, AssignTarget};
use bir::config::LowerConfig;
use bir::ir::visitor::InstructionStats;
use bir::lower::lower;
use bir::printer::{print_function, print_package};

use common::{block, function, increment_package, ret, sp, var_def, Fixture};

#[test]
fn test_straight_line_text() {
    let pkg = lower(&increment_package(), &LowerConfig::default()).unwrap();
    let expected = "\
module acme/demo:0.1.0;
f(int) -> int{
  bb0 {
    %3 = ConstantLoad 1
    %2 = + x %3;
    %0 = %2;
    return;
  }
}
";
    assert_eq!(print_package(&pkg), expected);
}

#[test]
fn test_branch_goto_and_call_forms() {
    let fx = Fixture::new();
    let body = vec![
        var_def("y", fx.int, None, 1),
        AstStmt::If {
            cond: fx.bool_var("c", 2),
            then_block: block(vec![AstStmt::Assign {
                target: AssignTarget::Var(bir::ast::Ident::new("y", sp(3))),
                value: AstExpr::call("next", vec![fx.int_var("y", 3)], fx.int, sp(3)),
                span: sp(3),
            }]),
            else_branch: None,
            span: sp(2),
        },
        ret(fx.int_var("y", 5)),
    ];
    let f = function("pick", vec![fx.param("c", fx.boolean)], fx.int, body);
    let pkg = lower(&fx.package(vec![f]), &LowerConfig::default()).unwrap();
    let text = print_function(&pkg, pkg.function("pick").unwrap());

    assert!(text.starts_with("pick(boolean) -> int{\n"), "{text}");
    assert!(text.contains("    c ? bb1 : bb3;\n"), "{text}");
    assert!(text.contains("    %3 = next(y) -> bb2;\n"), "{text}");
    assert!(text.contains("  bb2 {\n    y = %3;\n    GOTO bb3;\n  }\n"), "{text}");
    assert!(text.ends_with("    %0 = y;\n    return;\n  }\n}"), "{text}");
}

#[test]
fn test_globals_and_imports_in_header() {
    let fx = Fixture::new();
    let int = fx.int;
    let mut ast = fx.package(vec![]);
    ast.imports.push(bir::ast::AstImport {
        org: Some("ballerina".to_string()),
        name: Some("io".to_string()),
        version: Some("1.2.0".to_string()),
        alias: None,
        span: sp(0),
    });
    ast.globals.push(bir::ast::AstGlobal {
        name: bir::ast::Ident::new("counter", sp(1)),
        ty: int,
        flags: 0,
    });
    let pkg = lower(&ast, &LowerConfig::default()).unwrap();
    assert_eq!(
        print_package(&pkg),
        "module acme/demo:0.1.0;\nimport ballerina/io:1.2.0;\ncounter  int;\n"
    );
}

#[test]
fn test_instruction_stats() {
    let pkg = lower(&increment_package(), &LowerConfig::default()).unwrap();
    let stats = InstructionStats::collect(&pkg);
    assert_eq!(stats.functions, 1);
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.total(), 4);
    assert_eq!(stats.by_kind.get("Add"), Some(&1));
    assert_eq!(stats.by_kind.get("ConstLoad"), Some(&1));
    assert_eq!(stats.by_kind.get("Move"), Some(&1));
    assert_eq!(stats.by_kind.get("Return"), Some(&1));
}
