use std::hint::black_box;

use divan::{AllocProfiler, Bencher};
use tern_ast::{CaseExpr, Clause, Expr, Guard, Pat, RecordFieldPat, RecordPat, Test};
use tern_bench::{MODULE, alias_chain, chain_top, record_registry, tagged_union, wide_case};
use tern_check::{CheckConfig, Narrower, SubtypeChecker, TypeRegistry};
use tern_types::{Env, RecordId, Type};

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

#[divan::bench(args = [8, 32, 128])]
fn subtype_wide_unions(bencher: Bencher, width: usize) {
    let db = TypeRegistry::new();
    let smaller = tagged_union(width);
    let larger = tagged_union(width + 1);
    bencher.bench(|| {
        let mut sub = SubtypeChecker::new(&db, CheckConfig::default());
        black_box(sub.sub_type(black_box(&smaller), black_box(&larger)))
    });
}

#[divan::bench(args = [4, 16, 64])]
fn subtype_through_alias_chain(bencher: Bencher, depth: usize) {
    let db = alias_chain(depth);
    let top = chain_top(depth);
    let nil = Type::atom_lit("nil");
    bencher.bench(|| {
        let mut sub = SubtypeChecker::new(&db, CheckConfig::default());
        black_box(sub.sub_type(black_box(&nil), black_box(&top)))
    });
}

#[divan::bench(args = [8, 32, 128])]
fn join_fold_over_atoms(bencher: Bencher, width: usize) {
    let db = TypeRegistry::new();
    let tys: Vec<Type> = (0..width)
        .map(|i| Type::atom_lit(format!("a{i}")))
        .collect();
    bencher.bench(|| {
        let mut sub = SubtypeChecker::new(&db, CheckConfig::default());
        black_box(sub.join_all(black_box(tys.clone())))
    });
}

#[divan::bench(args = [2, 4, 6])]
fn case_envs_over_tagged_unions(bencher: Bencher, width: usize) {
    let db = TypeRegistry::new();
    let sel = tagged_union(width);
    let case = wide_case(width);
    let env = Env::new().with("Subject", sel.clone());
    bencher.bench(|| {
        let mut narrow = Narrower::new(&db, CheckConfig::default(), MODULE);
        black_box(
            narrow
                .case_envs(black_box(&case), black_box(&sel), black_box(&env))
                .len(),
        )
    });
}

#[divan::bench(args = [4, 16, 64])]
fn record_field_refinement(bencher: Bencher, fields: usize) {
    let db = record_registry(fields);
    let rec = Type::Record(RecordId::new(MODULE, "wide"));
    let env = Env::new().with("R", rec.clone());
    // case R of #wide{f0 = V} when is_number(V) -> ...
    let case = CaseExpr {
        expr: Expr::var("R"),
        clauses: vec![Clause::new(
            vec![Pat::Record(RecordPat {
                name: "wide".to_string(),
                fields: vec![RecordFieldPat {
                    name: "f0".to_string(),
                    pat: Pat::var("V"),
                }],
                generic: None,
            })],
            vec![Guard::new(vec![Test::call(
                "is_number",
                vec![Test::var("V")],
            )])],
            vec![],
        )],
    };
    bencher.bench(|| {
        let mut narrow = Narrower::new(&db, CheckConfig::default(), MODULE);
        black_box(
            narrow
                .case_envs(black_box(&case), black_box(&rec), black_box(&env))
                .len(),
        )
    });
}
