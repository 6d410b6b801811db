//! Unit tests for occurrence typing: the concrete narrowing scenarios,
//! guard combination, alias projection, and the refinement gate.

use tern_ast::{BinOp, CaseExpr, Clause, Expr, Guard, Pat, RecordFieldPat, RecordPat, Test, UnOp};
use tern_types::{Env, FunType, RecordDecl, RecordField, RecordId, RefinedRecord, Type};

use crate::narrow::Narrower;
use crate::{CheckConfig, TypeRegistry};

const MODULE: &str = "m";

fn field(name: &str, ty: Type) -> RecordField {
    RecordField {
        name: name.to_string(),
        ty,
        default_present: false,
    }
}

/// Records: `r { f :: number() | atom() }`, `pair { a :: atom(), b ::
/// number() }`, `flags { u :: atom(), v :: atom() }`.
fn fixture() -> TypeRegistry {
    let mut db = TypeRegistry::new();
    db.register_record(
        MODULE,
        RecordDecl {
            name: "r".to_string(),
            fields: vec![field("f", Type::union([Type::Number, Type::Atom]))],
        },
    )
    .expect("fixture record registers");
    db.register_record(
        MODULE,
        RecordDecl {
            name: "pair".to_string(),
            fields: vec![field("a", Type::Atom), field("b", Type::Number)],
        },
    )
    .expect("fixture record registers");
    db.register_record(
        MODULE,
        RecordDecl {
            name: "flags".to_string(),
            fields: vec![field("u", Type::Atom), field("v", Type::Atom)],
        },
    )
    .expect("fixture record registers");
    db
}

fn narrower(db: &TypeRegistry) -> Narrower<'_> {
    Narrower::new(db, CheckConfig::default(), MODULE)
}

fn clause(pat: Pat, guards: Vec<Guard>) -> Clause {
    Clause::new(vec![pat], guards, vec![])
}

fn guard_clause(tests: Vec<Test>) -> Clause {
    Clause::new(vec![], vec![Guard::new(tests)], vec![])
}

fn case_on(expr: Expr, clauses: Vec<Clause>) -> CaseExpr {
    CaseExpr { expr, clauses }
}

fn is_test(name: &str, var: &str) -> Test {
    Test::call(name, vec![Test::var(var)])
}

fn rec_pat(name: &str, fields: Vec<(&str, Pat)>, generic: Option<Pat>) -> Pat {
    Pat::Record(RecordPat {
        name: name.to_string(),
        fields: fields
            .into_iter()
            .map(|(name, pat)| RecordFieldPat {
                name: name.to_string(),
                pat,
            })
            .collect(),
        generic: generic.map(Box::new),
    })
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn atom_clauses_discriminate_a_union() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let ab = Type::union([Type::atom_lit("a"), Type::atom_lit("b")]);
    let env = Env::new().with("X", ab.clone());

    let case = case_on(
        Expr::var("X"),
        vec![clause(Pat::atom("a"), vec![]), clause(Pat::atom("b"), vec![])],
    );
    let envs = narrow.case_envs(&case, &ab, &env);

    assert_eq!(envs.len(), 2);
    assert_eq!(envs[0].get("X"), Some(&Type::atom_lit("a")));
    assert_eq!(envs[1].get("X"), Some(&Type::atom_lit("b")));
}

#[test]
fn tuple_patterns_refine_fields_through_aliases() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let ok_branch = Type::Tuple(vec![Type::atom_lit("ok"), Type::Number]);
    let e_branch = Type::Tuple(vec![Type::atom_lit("e"), Type::Atom]);
    let sel = Type::union([ok_branch.clone(), e_branch.clone()]);
    let env = Env::new().with("T", sel.clone());

    let case = case_on(
        Expr::var("T"),
        vec![
            clause(Pat::Tuple(vec![Pat::atom("ok"), Pat::var("V")]), vec![]),
            clause(Pat::Tuple(vec![Pat::atom("e"), Pat::var("V")]), vec![]),
        ],
    );
    let envs = narrow.case_envs(&case, &sel, &env);

    assert_eq!(envs[0].get("T"), Some(&ok_branch));
    assert_eq!(envs[0].get("V"), Some(&Type::Number));
    assert_eq!(envs[1].get("T"), Some(&e_branch));
    assert_eq!(envs[1].get("V"), Some(&Type::Atom));
}

#[test]
fn overlapping_tuple_tags_keep_both_branches() {
    // When the first branch's tag is atom() rather than a literal, the
    // second clause cannot rule that branch out: 'e' inhabits atom().
    let db = fixture();
    let mut narrow = narrower(&db);
    let loose = Type::Tuple(vec![Type::Atom, Type::Number]);
    let e_branch = Type::Tuple(vec![Type::atom_lit("e"), Type::Atom]);
    let sel = Type::union([loose, e_branch.clone()]);
    let env = Env::new().with("T", sel.clone());

    let case = case_on(
        Expr::var("T"),
        vec![
            clause(Pat::Tuple(vec![Pat::atom("ok"), Pat::var("V")]), vec![]),
            clause(Pat::Tuple(vec![Pat::atom("e"), Pat::var("V")]), vec![]),
        ],
    );
    let envs = narrow.case_envs(&case, &sel, &env);

    assert_eq!(
        envs[0].get("T"),
        Some(&Type::Tuple(vec![Type::atom_lit("ok"), Type::Number]))
    );
    assert_eq!(envs[0].get("V"), Some(&Type::Number));
    assert_eq!(
        envs[1].get("T"),
        Some(&Type::union([
            Type::Tuple(vec![Type::atom_lit("e"), Type::Number]),
            e_branch,
        ]))
    );
    assert_eq!(envs[1].get("V"), Some(&Type::union([Type::Number, Type::Atom])));
}

#[test]
fn guarded_predicates_narrow_and_fall_through_conservatively() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let env = Env::new().with("X", Type::Any);

    let clauses = vec![
        guard_clause(vec![Test::bin_op(
            BinOp::OrElse,
            is_test("is_atom", "X"),
            is_test("is_integer", "X"),
        )]),
        guard_clause(vec![Test::atom("true")]),
    ];
    let envs = narrow.if_envs(&clauses, &env);

    assert_eq!(
        envs[0].get("X"),
        Some(&Type::union([Type::Atom, Type::Number]))
    );
    // term() has no representable complement of atom()|number().
    assert_eq!(envs[1].get("X"), Some(&Type::Any));
}

#[test]
fn record_patterns_refine_to_refined_records() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let rec = Type::Record(RecordId::new(MODULE, "r"));
    let env = Env::new().with("R", rec.clone());

    let case = case_on(
        Expr::var("R"),
        vec![clause(
            rec_pat("r", vec![("f", Pat::var("V"))], None),
            vec![Guard::new(vec![is_test("is_atom", "V")])],
        )],
    );
    let envs = narrow.case_envs(&case, &rec, &env);

    let expected = Type::RefinedRecord(RefinedRecord {
        rec: RecordId::new(MODULE, "r"),
        fields: [("f".to_string(), Type::Atom)].into(),
    });
    assert_eq!(envs[0].get("R"), Some(&expected));
    assert_eq!(envs[0].get("V"), Some(&Type::Atom));
}

#[test]
fn fall_through_negations_accumulate_across_clauses() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let env = Env::new().with("X", Type::Any);

    let clauses = vec![
        guard_clause(vec![is_test("is_atom", "X")]),
        guard_clause(vec![is_test("is_integer", "X")]),
        guard_clause(vec![Test::atom("true")]),
    ];
    let envs = narrow.if_envs(&clauses, &env);

    assert_eq!(envs.len(), 3);
    assert_eq!(envs[0].get("X"), Some(&Type::Atom));
    assert_eq!(envs[1].get("X"), Some(&Type::Number));
    // term() minus atom() minus number() stays term() in this algebra.
    assert_eq!(envs[2].get("X"), Some(&Type::Any));
}

#[test]
fn bound_variable_siblings_keep_literal_negations() {
    // A bound variable in one tuple slot proves nothing either way, but
    // it must not wash out what the 'ok' literal in the sibling slot
    // proves about the fall-through branch.
    let db = fixture();
    let mut narrow = narrower(&db);
    let ok_branch = Type::Tuple(vec![Type::Atom, Type::atom_lit("ok")]);
    let e_branch = Type::Tuple(vec![Type::Atom, Type::atom_lit("e")]);
    let sel = Type::union([ok_branch.clone(), e_branch.clone()]);
    let env = Env::new()
        .with("T", sel.clone())
        .with("X", Type::atom_lit("k"));

    let case = case_on(
        Expr::var("T"),
        vec![
            clause(Pat::Tuple(vec![Pat::var("X"), Pat::atom("ok")]), vec![]),
            clause(Pat::Wildcard, vec![]),
        ],
    );
    let envs = narrow.case_envs(&case, &sel, &env);

    assert_eq!(envs[0].get("T"), Some(&ok_branch));
    assert_eq!(envs[1].get("T"), Some(&e_branch));
    assert_eq!(envs[1].get("X"), Some(&Type::atom_lit("k")));
}

#[test]
fn numeric_literal_siblings_keep_literal_negations() {
    // Failing to match the literal 1 proves nothing about the first slot,
    // but the sibling 'ok' literal still rules its branch out on
    // fall-through.
    let db = fixture();
    let mut narrow = narrower(&db);
    let ok_branch = Type::Tuple(vec![Type::Number, Type::atom_lit("ok")]);
    let e_branch = Type::Tuple(vec![Type::Number, Type::atom_lit("e")]);
    let sel = Type::union([ok_branch.clone(), e_branch.clone()]);
    let env = Env::new().with("T", sel.clone());

    let case = case_on(
        Expr::var("T"),
        vec![
            clause(Pat::Tuple(vec![Pat::Int(1), Pat::atom("ok")]), vec![]),
            clause(Pat::Wildcard, vec![]),
        ],
    );
    let envs = narrow.case_envs(&case, &sel, &env);

    assert_eq!(envs[0].get("T"), Some(&ok_branch));
    assert_eq!(envs[1].get("T"), Some(&e_branch));
}

#[test]
fn narrowing_an_already_narrowed_scrutinee_is_idempotent() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let ab = Type::union([Type::atom_lit("a"), Type::atom_lit("b")]);
    let env = Env::new().with("X", ab.clone());

    let case = case_on(
        Expr::var("X"),
        vec![clause(Pat::atom("a"), vec![]), clause(Pat::atom("b"), vec![])],
    );
    let first = narrow.case_envs(&case, &ab, &env);
    let narrowed = first[0].clone();
    let sel = narrowed.get("X").expect("scrutinee is bound").clone();
    let second = narrow.case_envs(&case, &sel, &narrowed);
    assert_eq!(second[0], first[0]);
}

// ---------------------------------------------------------------------------
// Subjects and aliases
// ---------------------------------------------------------------------------

#[test]
fn complex_scrutinees_get_a_synthetic_subject() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let sel = Type::union([Type::atom_lit("a"), Type::atom_lit("b")]);

    let case = case_on(
        Expr::Call {
            name: "pick".to_string(),
            args: vec![],
        },
        vec![clause(Pat::atom("a"), vec![]), clause(Pat::atom("b"), vec![])],
    );
    let envs = narrow.case_envs(&case, &sel, &Env::new());

    // The synthetic name is an opaque token; only its type matters.
    assert_eq!(envs[0].len(), 1);
    let (_, ty) = envs[0].iter().next().expect("one binding");
    assert_eq!(ty, &Type::atom_lit("a"));
    let (_, ty) = envs[1].iter().next().expect("one binding");
    assert_eq!(ty, &Type::atom_lit("b"));
}

#[test]
fn match_patterns_alias_the_whole_subject_and_its_fields() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let sel = Type::Tuple(vec![Type::atom_lit("ok"), Type::Number]);
    let env = Env::new().with("X", sel.clone());

    // case X of V = {ok, W} -> ...
    let case = case_on(
        Expr::var("X"),
        vec![clause(
            Pat::Match(
                Box::new(Pat::var("V")),
                Box::new(Pat::Tuple(vec![Pat::atom("ok"), Pat::var("W")])),
            ),
            vec![],
        )],
    );
    let envs = narrow.case_envs(&case, &sel, &env);

    assert_eq!(envs[0].get("X"), Some(&sel));
    assert_eq!(envs[0].get("V"), Some(&sel));
    assert_eq!(envs[0].get("W"), Some(&Type::Number));
}

#[test]
fn bound_pattern_variables_are_opaque_equality_tests() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let ab = Type::union([Type::atom_lit("a"), Type::atom_lit("b")]);
    let env = Env::new().with("X", ab.clone()).with("Y", Type::atom_lit("a"));

    let case = case_on(
        Expr::var("X"),
        vec![clause(Pat::var("Y"), vec![]), clause(Pat::Wildcard, vec![])],
    );
    let envs = narrow.case_envs(&case, &ab, &env);

    // Equality against an already-bound variable proves nothing either way.
    assert_eq!(envs[0].get("X"), Some(&ab));
    assert_eq!(envs[0].get("Y"), Some(&Type::atom_lit("a")));
    assert_eq!(envs[1].get("X"), Some(&ab));
}

#[test]
fn function_heads_narrow_each_argument() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let tag = Type::union([Type::atom_lit("a"), Type::atom_lit("b")]);

    let clauses = vec![
        Clause::new(vec![Pat::atom("a"), Pat::var("N")], vec![], vec![]),
        Clause::new(vec![Pat::atom("b"), Pat::var("N")], vec![], vec![]),
    ];
    let envs = narrow.clauses_envs(&clauses, &[tag, Type::Number], &Env::new());

    assert_eq!(envs.len(), 2);
    assert_eq!(envs[0].get("N"), Some(&Type::Number));
    assert!(envs[0].iter().any(|(_, ty)| *ty == Type::atom_lit("a")));
    assert_eq!(envs[1].get("N"), Some(&Type::Number));
    assert!(envs[1].iter().any(|(_, ty)| *ty == Type::atom_lit("b")));
}

// ---------------------------------------------------------------------------
// Guard forms
// ---------------------------------------------------------------------------

#[test]
fn guard_sequences_are_disjunctive() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let env = Env::new().with("X", Type::union([Type::Atom, Type::Number, Type::Pid]));

    // when is_atom(X); is_integer(X) -> ...
    let clauses = vec![
        Clause::new(
            vec![],
            vec![
                Guard::new(vec![is_test("is_atom", "X")]),
                Guard::new(vec![is_test("is_integer", "X")]),
            ],
            vec![],
        ),
        guard_clause(vec![Test::atom("true")]),
    ];
    let envs = narrow.if_envs(&clauses, &env);

    assert_eq!(
        envs[0].get("X"),
        Some(&Type::union([Type::Atom, Type::Number]))
    );
    // Both alternatives failed, so both kinds are removed.
    assert_eq!(envs[1].get("X"), Some(&Type::Pid));
}

#[test]
fn negated_tests_swap_their_propositions() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let env = Env::new().with("X", Type::union([Type::atom_lit("a"), Type::Number]));

    let clauses = vec![
        guard_clause(vec![Test::un_op(UnOp::Not, is_test("is_atom", "X"))]),
        guard_clause(vec![Test::atom("true")]),
    ];
    let envs = narrow.if_envs(&clauses, &env);

    assert_eq!(envs[0].get("X"), Some(&Type::Number));
    assert_eq!(envs[1].get("X"), Some(&Type::atom_lit("a")));
}

#[test]
fn conjunctions_narrow_stepwise() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let env = Env::new().with("X", Type::Any);

    let clauses = vec![guard_clause(vec![Test::bin_op(
        BinOp::AndAlso,
        is_test("is_atom", "X"),
        Test::bin_op(BinOp::ExactEq, Test::var("X"), Test::atom("a")),
    )])];
    let envs = narrow.if_envs(&clauses, &env);

    assert_eq!(envs[0].get("X"), Some(&Type::atom_lit("a")));
}

#[test]
fn atom_equality_guards_narrow_unions() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let ab = Type::union([Type::atom_lit("a"), Type::atom_lit("b")]);
    let env = Env::new().with("X", ab);

    let clauses = vec![
        guard_clause(vec![Test::bin_op(
            BinOp::Eq,
            Test::var("X"),
            Test::atom("a"),
        )]),
        guard_clause(vec![Test::atom("true")]),
    ];
    let envs = narrow.if_envs(&clauses, &env);

    assert_eq!(envs[0].get("X"), Some(&Type::atom_lit("a")));
    assert_eq!(envs[1].get("X"), Some(&Type::atom_lit("b")));
}

#[test]
fn arity_and_record_tests_produce_structured_types() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let env = Env::new().with("F", Type::Any).with("R", Type::Any);

    let clauses = vec![guard_clause(vec![
        Test::call("is_function", vec![Test::var("F"), Test::Int(2)]),
        Test::call("is_record", vec![Test::var("R"), Test::atom("pair")]),
    ])];
    let envs = narrow.if_envs(&clauses, &env);

    assert_eq!(
        envs[0].get("F"),
        Some(&Type::Fun(FunType::mono(vec![Type::Any, Type::Any], Type::Any)))
    );
    assert_eq!(envs[0].get("R"), Some(&Type::Record(RecordId::new(MODULE, "pair"))));
}

#[test]
fn comparisons_without_refinement_value_leave_the_env_alone() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let env = Env::new().with("X", Type::Any);

    let clauses = vec![
        guard_clause(vec![Test::bin_op(BinOp::Lt, Test::var("X"), Test::Int(1))]),
        guard_clause(vec![Test::atom("true")]),
    ];
    let envs = narrow.if_envs(&clauses, &env);

    assert_eq!(envs[0].get("X"), Some(&Type::Any));
    assert_eq!(envs[1].get("X"), Some(&Type::Any));
}

// ---------------------------------------------------------------------------
// Record generic sub-patterns
// ---------------------------------------------------------------------------

#[test]
fn generic_record_sub_pattern_applies_to_unnamed_fields() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let rec = Type::Record(RecordId::new(MODULE, "flags"));
    let env = Env::new().with("F", rec.clone());

    // case F of #flags{_ = 'on'} -> ...
    let case = case_on(
        Expr::var("F"),
        vec![clause(rec_pat("flags", vec![], Some(Pat::atom("on"))), vec![])],
    );
    let envs = narrow.case_envs(&case, &rec, &env);

    let expected = Type::RefinedRecord(RefinedRecord {
        rec: RecordId::new(MODULE, "flags"),
        fields: [
            ("u".to_string(), Type::atom_lit("on")),
            ("v".to_string(), Type::atom_lit("on")),
        ]
        .into(),
    });
    assert_eq!(envs[0].get("F"), Some(&expected));
}

#[test]
fn impossible_field_refinement_empties_the_record() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let rec = Type::Record(RecordId::new(MODULE, "pair"));
    let env = Env::new().with("P", rec.clone());

    // The `b` field is number(); an atom pattern there cannot match.
    let case = case_on(
        Expr::var("P"),
        vec![clause(rec_pat("pair", vec![("b", Pat::atom("zero"))], None), vec![])],
    );
    let envs = narrow.case_envs(&case, &rec, &env);

    assert_eq!(envs[0].get("P"), Some(&Type::None));
}

// ---------------------------------------------------------------------------
// Wildcards and unchanged environments
// ---------------------------------------------------------------------------

#[test]
fn wildcard_clauses_pass_the_environment_through() {
    let db = fixture();
    let mut narrow = narrower(&db);
    let ab = Type::union([Type::atom_lit("a"), Type::atom_lit("b")]);
    let env = Env::new().with("X", ab.clone());

    let case = case_on(
        Expr::var("X"),
        vec![clause(Pat::Wildcard, vec![]), clause(Pat::atom("a"), vec![])],
    );
    let envs = narrow.case_envs(&case, &ab, &env);

    assert_eq!(envs[0].get("X"), Some(&ab));
    // Nothing was learned from falling past a wildcard.
    assert_eq!(envs[1].get("X"), Some(&Type::atom_lit("a")));
}

// ---------------------------------------------------------------------------
// The refinement gate
// ---------------------------------------------------------------------------

#[test]
fn refinement_requires_gradual_mode() {
    let db = fixture();
    let strict = Narrower::new(
        &db,
        CheckConfig {
            gradual_typing: false,
            unlimited_refinement: false,
        },
        MODULE,
    );
    assert!(!strict.refinable(&[guard_clause(vec![Test::atom("true")])]));
}

#[test]
fn guard_only_clauses_are_always_refinable() {
    let db = fixture();
    let narrow = narrower(&db);
    let clauses: Vec<Clause> = (0..10)
        .map(|_| guard_clause(vec![Test::atom("true")]))
        .collect();
    assert!(narrow.refinable(&clauses));
}

#[test]
fn pattern_clause_count_is_capped_without_unlimited_refinement() {
    let db = fixture();
    let narrow = narrower(&db);
    let many: Vec<Clause> = (0..7).map(|_| clause(Pat::var("V"), vec![])).collect();
    let few: Vec<Clause> = (0..6).map(|_| clause(Pat::var("V"), vec![])).collect();
    assert!(!narrow.refinable(&many));
    assert!(narrow.refinable(&few));

    let unlimited = Narrower::new(
        &db,
        CheckConfig {
            gradual_typing: true,
            unlimited_refinement: true,
        },
        MODULE,
    );
    assert!(unlimited.refinable(&many));
}

#[test]
fn nonlinear_pattern_variables_disable_refinement() {
    let db = fixture();
    let narrow = narrower(&db);
    let nonlinear = Clause::new(vec![Pat::var("X"), Pat::var("X")], vec![], vec![]);
    let linear = Clause::new(vec![Pat::var("X"), Pat::var("Y")], vec![], vec![]);
    assert!(!narrow.refinable(&[nonlinear]));
    assert!(narrow.refinable(&[linear]));
}
