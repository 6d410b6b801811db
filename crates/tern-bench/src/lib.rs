//! Shared input builders for the Tern core benchmarks.
//!
//! Builders construct inputs outside the timed closures: wide unions of
//! tagged tuples, deeply recursive alias registries, and wide `case`
//! constructs over those unions.

use tern_ast::{CaseExpr, Clause, Expr, Pat};
use tern_check::TypeRegistry;
use tern_types::{RecordDecl, RecordField, RemoteId, Type};

pub const MODULE: &str = "bench";

/// A union of `width` two-tuples, each tagged with a distinct atom.
pub fn tagged_union(width: usize) -> Type {
    Type::union((0..width).map(|i| {
        Type::Tuple(vec![
            Type::atom_lit(format!("tag{i}")),
            if i % 2 == 0 { Type::Number } else { Type::Atom },
        ])
    }))
}

/// A registry with a chain of `depth` guarded recursive aliases:
/// `t0() :: 'nil'`, and `tN() :: {'cons', term(), tN-1()} | tN-1()`.
pub fn alias_chain(depth: usize) -> TypeRegistry {
    let mut db = TypeRegistry::new();
    db.register_alias(RemoteId::new(MODULE, "t0", 0), vec![], Type::atom_lit("nil"))
        .expect("bench alias registers");
    for level in 1..=depth {
        let prev = Type::Remote(RemoteId::new(MODULE, format!("t{}", level - 1), 0), vec![]);
        db.register_alias(
            RemoteId::new(MODULE, format!("t{level}"), 0),
            vec![],
            Type::union([
                Type::Tuple(vec![Type::atom_lit("cons"), Type::Any, prev.clone()]),
                prev,
            ]),
        )
        .expect("bench alias registers");
    }
    db
}

/// The top alias of an [`alias_chain`] registry.
pub fn chain_top(depth: usize) -> Type {
    Type::Remote(RemoteId::new(MODULE, format!("t{depth}"), 0), vec![])
}

/// A registry with one record of `fields` numeric fields.
pub fn record_registry(fields: usize) -> TypeRegistry {
    let mut db = TypeRegistry::new();
    db.register_record(
        MODULE,
        RecordDecl {
            name: "wide".to_string(),
            fields: (0..fields)
                .map(|i| RecordField {
                    name: format!("f{i}"),
                    ty: Type::Number,
                    default_present: false,
                })
                .collect(),
        },
    )
    .expect("bench record registers");
    db
}

/// A `case` over the subject variable with one tagged-tuple clause per
/// union member.
pub fn wide_case(width: usize) -> CaseExpr {
    CaseExpr {
        expr: Expr::var("Subject"),
        clauses: (0..width)
            .map(|i| {
                Clause::new(
                    vec![Pat::Tuple(vec![
                        Pat::atom(format!("tag{i}")),
                        Pat::var(format!("V{i}")),
                    ])],
                    vec![],
                    vec![],
                )
            })
            .collect(),
    }
}
