//! Builders for typed ASTs shared by the integration tests.
#![allow(dead_code)]

use bir::ast::{
    AstBlock, AstExpr, AstFunction, AstFunctionBody, AstPackage, AstParam, AstStmt, BinaryOp,
    Ident, Literal, Span,
};
use bir::ir::types::{TypeId, TypeTable, TypeTag};

/// A type table pre-seeded with the basic types the tests use.
pub struct Fixture {
    pub types: TypeTable,
    pub int: TypeId,
    pub boolean: TypeId,
    pub string: TypeId,
    pub nil: TypeId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut types = TypeTable::new();
        let int = types.basic(TypeTag::Int);
        let boolean = types.basic(TypeTag::Boolean);
        let string = types.basic(TypeTag::String);
        let nil = types.basic(TypeTag::Nil);
        Fixture {
            types,
            int,
            boolean,
            string,
            nil,
        }
    }

    pub fn int_lit(&self, v: i64, line: i32) -> AstExpr {
        AstExpr::literal(Literal::Int(v), self.int, sp(line))
    }

    pub fn bool_lit(&self, v: bool, line: i32) -> AstExpr {
        AstExpr::literal(Literal::Boolean(v), self.boolean, sp(line))
    }

    pub fn int_var(&self, name: &str, line: i32) -> AstExpr {
        AstExpr::var(name, self.int, sp(line))
    }

    pub fn bool_var(&self, name: &str, line: i32) -> AstExpr {
        AstExpr::var(name, self.boolean, sp(line))
    }

    pub fn add(&self, lhs: AstExpr, rhs: AstExpr) -> AstExpr {
        AstExpr::binary(BinaryOp::Add, lhs, rhs, self.int)
    }

    pub fn lt(&self, lhs: AstExpr, rhs: AstExpr) -> AstExpr {
        AstExpr::binary(BinaryOp::Lt, lhs, rhs, self.boolean)
    }

    pub fn param(&self, name: &str, ty: TypeId) -> AstParam {
        AstParam {
            name: Ident::new(name, sp(0)),
            ty,
        }
    }

    pub fn package(self, functions: Vec<AstFunction>) -> AstPackage {
        AstPackage {
            org: Some("acme".to_string()),
            name: Some("demo".to_string()),
            version: Some("0.1.0".to_string()),
            source_file: Some("demo.bal".to_string()),
            functions,
            types: self.types,
            ..AstPackage::default()
        }
    }
}

pub fn sp(line: i32) -> Span {
    Span::new(line, 0)
}

pub fn block(stmts: Vec<AstStmt>) -> AstBlock {
    AstBlock { stmts, span: sp(0) }
}

pub fn function(name: &str, params: Vec<AstParam>, ret: TypeId, stmts: Vec<AstStmt>) -> AstFunction {
    AstFunction {
        name: Ident::new(name, sp(0)),
        params,
        rest_param: None,
        return_type: ret,
        receiver: None,
        flags: 0,
        body: AstFunctionBody::Block(block(stmts)),
    }
}

pub fn ret(value: AstExpr) -> AstStmt {
    let span = value.span;
    AstStmt::Return {
        value: Some(value),
        span,
    }
}

pub fn var_def(name: &str, ty: TypeId, init: Option<AstExpr>, line: i32) -> AstStmt {
    AstStmt::VarDef {
        name: Ident::new(name, sp(line)),
        ty,
        init,
        span: sp(line),
    }
}

/// `function f(int x) returns int { return x + 1; }`
pub fn increment_package() -> AstPackage {
    let fx = Fixture::new();
    let body = vec![ret(fx.add(fx.int_var("x", 1), fx.int_lit(1, 1)))];
    let f = function("f", vec![fx.param("x", fx.int)], fx.int, body);
    fx.package(vec![f])
}
