//! Binary codec: round-trips, header checks and structural invariants.

mod common;

use bir::ast::{AssignTarget, AstExpr, AstExprKind, AstGlobal, AstStmt, Ident, Literal};
use bir::codec::{decode, encode, MAGIC, VERSION};
use bir::config::LowerConfig;
use bir::error::{Error, FormatError, InvariantError};
use bir::ir::function::Function;
use bir::ir::instr::{Instr, TerminatorOp};
use bir::ir::meta::Position;
use bir::ir::package::{Package, PackageId};
use bir::ir::semtype::{
    AtomicType, Bdd, BddAtom, BddNode, ComplexSemType, ProperSubtype, SemNamedType, SemType,
};
use bir::ir::types::{BType, TypeBody, TypeTag};
use bir::lower::lower;

use common::{block, function, increment_package, ret, sp, var_def, Fixture};

/// A package exercising loops, calls, lists, indexing, casts and globals.
fn kitchen_sink() -> Package {
    let mut fx = Fixture::new();
    let int_array = fx.types.intern(BType::new(
        TypeTag::Array,
        TypeBody::Array {
            state: 1,
            size: -1,
            element: fx.int,
        },
    ));

    let list = AstExpr::new(
        AstExprKind::List(vec![fx.int_lit(1, 2), fx.int_lit(2, 2)]),
        int_array,
        sp(2),
    );
    let index = |fx: &Fixture, line| {
        AstExpr::new(
            AstExprKind::Index {
                container: Box::new(AstExpr::var("xs", int_array, sp(line))),
                index: Box::new(fx.int_lit(0, line)),
            },
            fx.int,
            sp(line),
        )
    };
    let body = vec![
        var_def("xs", int_array, Some(list), 2),
        var_def("total", fx.int, Some(index(&fx, 3)), 3),
        AstStmt::While {
            cond: fx.lt(fx.int_var("total", 4), fx.int_var("n", 4)),
            body: block(vec![
                AstStmt::Assign {
                    target: AssignTarget::Index {
                        container: AstExpr::var("xs", int_array, sp(5)),
                        index: fx.int_lit(1, 5),
                    },
                    value: fx.int_var("total", 5),
                    span: sp(5),
                },
                AstStmt::CompoundAssign {
                    target: Ident::new("total", sp(6)),
                    op: bir::ast::BinaryOp::Add,
                    value: fx.int_lit(1, 6),
                    ty: fx.int,
                    span: sp(6),
                },
            ]),
            span: sp(4),
        },
        AstStmt::Assign {
            target: AssignTarget::Var(Ident::new("seen", sp(8))),
            value: AstExpr::new(
                AstExprKind::TypeTest {
                    expr: Box::new(fx.int_var("total", 8)),
                    tested: fx.string,
                },
                fx.boolean,
                sp(8),
            ),
            span: sp(8),
        },
        AstStmt::Assign {
            target: AssignTarget::Wildcard,
            value: AstExpr::call(
                "label",
                vec![AstExpr::literal(Literal::String("done".to_string()), fx.string, sp(9))],
                fx.string,
                sp(9),
            ),
            span: sp(9),
        },
        ret(AstExpr::new(
            AstExprKind::TypeConversion(Box::new(fx.int_var("total", 10))),
            fx.int,
            sp(10),
        )),
    ];
    let sum = function("sum", vec![fx.param("n", fx.int)], fx.int, body);
    let label = function(
        "label",
        vec![fx.param("s", fx.string)],
        fx.string,
        vec![ret(AstExpr::var("s", fx.string, sp(12)))],
    );
    let seen = AstGlobal {
        name: Ident::new("seen", sp(1)),
        ty: fx.boolean,
        flags: 0,
    };
    let mut ast = fx.package(vec![sum, label]);
    ast.globals.push(seen);
    lower(&ast, &LowerConfig::default()).expect("kitchen sink lowers")
}

#[test]
fn test_lowered_package_round_trips() {
    let pkg = kitchen_sink();
    let bytes = encode(&pkg).unwrap();
    assert_eq!(&bytes[..4], &MAGIC);
    assert_eq!(&bytes[4..8], &VERSION.to_be_bytes());

    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, pkg);
    // Encoding is deterministic.
    assert_eq!(encode(&decoded).unwrap(), bytes);
}

#[test]
fn test_straight_line_round_trips() {
    let pkg = lower(&increment_package(), &LowerConfig::default()).unwrap();
    let decoded = decode(&encode(&pkg).unwrap()).unwrap();
    assert_eq!(decoded, pkg);
}

#[test]
fn test_bad_magic_is_rejected() {
    let mut bytes = encode(&kitchen_sink()).unwrap();
    bytes[0] = 0xCA;
    let err = decode(&bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::FormatValidation(FormatError::BadMagic { ref found }) if found == &[0xCA, 0x10, 0xC0, 0xDE]
    ));
    assert_eq!(err.byte_offset(), Some(0));
    assert_eq!(err.diagnostic_code(), "E0001");
}

#[test]
fn test_truncated_stream_is_rejected() {
    let bytes = encode(&kitchen_sink()).unwrap();
    let err = decode(&bytes[..bytes.len() / 2]).unwrap_err();
    assert!(matches!(err, Error::FormatValidation(_)), "got {err:?}");
}

#[test]
fn test_terminator_before_last_instruction_is_an_invariant_violation() {
    // Marker coordinates make the return instruction easy to find in the bytes.
    const LINE: i32 = 0x1357_2468;
    const COL: i32 = 0x0A0B_0C0D;

    let mut pkg = Package::new(PackageId::new("acme", "broken", "0.1.0"));
    let nil = pkg.types.basic(TypeTag::Nil);
    let mut f = Function::new("main", nil);
    let bb0 = f.add_block();
    let pos = Position::new("broken.bal", LINE, COL);
    f.block_mut(bb0).unwrap().terminator = Some(Instr::new(pos, TerminatorOp::Return));
    pkg.functions.push(f);
    let mut bytes = encode(&pkg).unwrap();

    let mut marker = Vec::new();
    for v in [LINE, COL, LINE, COL] {
        marker.extend_from_slice(&v.to_be_bytes());
    }
    let at = bytes
        .windows(marker.len())
        .position(|w| w == marker.as_slice())
        .expect("return position present");
    // [count:i32][file:i32][marker...]; claim a second instruction after the return.
    let count_at = at - 8;
    assert_eq!(&bytes[count_at..count_at + 4], &1i32.to_be_bytes());
    bytes[count_at..count_at + 4].copy_from_slice(&2i32.to_be_bytes());

    let err = decode(&bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::InvariantViolation(InvariantError::TerminatorNotLast { ref func, ref block, index: 0 })
            if func == "main" && block == "bb0"
    ));
}

#[test]
fn test_recursive_semtype_decodes_to_single_atom() {
    const ATOM: i32 = 7;

    // `type Node record {| Node? next; |}`: the mapping's field refers back
    // to the atom being defined.
    let back_ref = SemType::Complex(ComplexSemType {
        all: 0,
        some: 1 << 19,
        subtypes: vec![ProperSubtype::Bdd(Bdd::Node(Box::new(BddNode {
            atom: BddAtom::Rec {
                index: ATOM,
                kind: Some(1),
            },
            left: Bdd::AllOrNothing(true),
            middle: Bdd::AllOrNothing(false),
            right: Bdd::AllOrNothing(false),
        })))],
    });
    let node = SemType::Complex(ComplexSemType {
        all: 0,
        some: 1 << 19,
        subtypes: vec![ProperSubtype::Bdd(Bdd::Node(Box::new(BddNode {
            atom: BddAtom::Type(ATOM),
            left: Bdd::AllOrNothing(true),
            middle: Bdd::AllOrNothing(false),
            right: Bdd::AllOrNothing(false),
        })))],
    });

    let mut pkg = Package::new(PackageId::new("acme", "rec", "0.1.0"));
    pkg.atoms
        .define(
            ATOM,
            AtomicType::Mapping {
                names: vec!["next".to_string()],
                types: vec![Some(back_ref)],
                rest: None,
            },
        )
        .unwrap();
    pkg.types.push(BType::new(
        TypeTag::Finite,
        TypeBody::Finite {
            name: "Node".to_string(),
            flags: 0,
            values: vec![SemNamedType {
                semtype: Some(node),
                name: Some("Node".to_string()),
            }],
        },
    ));

    let decoded = decode(&encode(&pkg).unwrap()).unwrap();
    assert_eq!(decoded.atoms.len(), 1);
    assert!(matches!(
        decoded.atoms.get(ATOM),
        Some(AtomicType::Mapping { names, .. }) if names == &["next".to_string()]
    ));
    assert_eq!(decoded, pkg);
}

#[test]
fn test_packages_decode_concurrently() {
    let a = encode(&kitchen_sink()).unwrap();
    let b = encode(&lower(&increment_package(), &LowerConfig::default()).unwrap()).unwrap();
    let (pa, pb) = std::thread::scope(|s| {
        let ha = s.spawn(|| decode(&a));
        let hb = s.spawn(|| decode(&b));
        (ha.join().unwrap(), hb.join().unwrap())
    });
    assert_eq!(pa.unwrap().functions.len(), 2);
    assert_eq!(pb.unwrap().functions.len(), 1);
}
