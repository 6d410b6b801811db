//! Occurrence typing: per-clause environment narrowing.
//!
//! Given a branching construct and an incoming environment, this module
//! produces one narrowed environment per clause so clause bodies can be
//! checked under sharper types. The pipeline:
//!
//! - Patterns and guards are read off into positive/negative propositions
//!   about *objects* (paths into a subject variable)
//! - Propositions are flattened to disjunctive normal form
//! - Each cube of the DNF updates the environment along the object paths,
//!   and the per-cube results are joined
//!
//! The engine never fails: whenever a refinement cannot be proven it emits
//! `Unknown`, which contributes nothing to the DNF and leaves environment
//! entries unchanged.

use std::collections::BTreeMap;

use tern_ast::{BinOp, CaseExpr, Clause, Expr, Guard, Pat, Test, UnOp};
use tern_types::{Env, FunType, RecordId, RefinedRecord, Type};

use crate::subtype::SubtypeChecker;
use crate::{CheckConfig, TypeRegistry};

/// Clause-count cap on refinement when `unlimited_refinement` is off. DNF
/// size grows with accumulated negations, so wide constructs opt out.
const MAX_REFINABLE_CLAUSES: usize = 7;

// ---------------------------------------------------------------------------
// Objects, propositions, cubes
// ---------------------------------------------------------------------------

/// One step of a path into a compound value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// Element `index` (0-based) of a tuple of exactly `arity` elements.
    TupleElem { index: usize, arity: usize },
    /// Named field of a record.
    RecordField { field: String, rec: RecordId },
}

/// A symbolic reference to (part of) the value held by a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obj {
    pub root: String,
    pub path: Vec<PathStep>,
}

impl Obj {
    pub fn var(root: impl Into<String>) -> Obj {
        Obj {
            root: root.into(),
            path: Vec::new(),
        }
    }

    fn child(&self, step: PathStep) -> Obj {
        let mut path = self.path.clone();
        path.push(step);
        Obj {
            root: self.root.clone(),
            path,
        }
    }
}

/// A refinement proposition about objects.
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    /// No information. Contributes nothing to the DNF.
    Unknown,
    /// The object's value inhabits the type.
    Pos(Obj, Type),
    /// The object's value does not inhabit the type.
    Neg(Obj, Type),
    And(Vec<Prop>),
    Or(Vec<Prop>),
}

/// One conjunctive literal cube of a disjunctive normal form.
#[derive(Debug, Clone, Default)]
struct Cube {
    pos: Vec<(Obj, Type)>,
    neg: Vec<(Obj, Type)>,
}

impl Cube {
    fn merge(&self, other: &Cube) -> Cube {
        let mut merged = self.clone();
        merged.pos.extend(other.pos.iter().cloned());
        merged.neg.extend(other.neg.iter().cloned());
        merged
    }
}

/// Flatten a proposition into DNF cubes.
fn dnf(prop: &Prop) -> Vec<Cube> {
    match prop {
        Prop::Unknown => vec![Cube::default()],
        Prop::Pos(obj, ty) => vec![Cube {
            pos: vec![(obj.clone(), ty.clone())],
            neg: Vec::new(),
        }],
        Prop::Neg(obj, ty) => vec![Cube {
            pos: Vec::new(),
            neg: vec![(obj.clone(), ty.clone())],
        }],
        Prop::And(props) => props.iter().fold(vec![Cube::default()], |acc, p| {
            let cubes = dnf(p);
            let mut out = Vec::with_capacity(acc.len() * cubes.len());
            for a in &acc {
                for c in &cubes {
                    out.push(a.merge(c));
                }
            }
            out
        }),
        Prop::Or(props) => {
            if props.is_empty() {
                vec![Cube::default()]
            } else {
                props.iter().flat_map(dnf).collect()
            }
        }
    }
}

fn and_prop(mut props: Vec<Prop>) -> Prop {
    match props.len() {
        0 => Prop::Unknown,
        1 => props.pop().expect("checked length"),
        _ => Prop::And(props),
    }
}

fn or_prop(mut props: Vec<Prop>) -> Prop {
    match props.len() {
        0 => Prop::Unknown,
        1 => props.pop().expect("checked length"),
        _ => Prop::Or(props),
    }
}

/// Pattern aliases: variables bound by a pattern, mapped to the object path
/// where they were bound.
type AliasMap = BTreeMap<String, Obj>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Plus,
    Minus,
}

// ---------------------------------------------------------------------------
// The engine
// ---------------------------------------------------------------------------

/// Produces narrowed per-clause environments for `if`, `case`, and
/// function-head constructs in one module.
///
/// The engine owns the counter minting synthetic subject names (`$1`, `$2`,
/// …). Construct a fresh engine to reset it.
pub struct Narrower<'a> {
    db: &'a TypeRegistry,
    config: CheckConfig,
    module: String,
    fresh: u32,
}

impl<'a> Narrower<'a> {
    pub fn new(db: &'a TypeRegistry, config: CheckConfig, module: impl Into<String>) -> Self {
        Self {
            db,
            config,
            module: module.into(),
            fresh: 0,
        }
    }

    fn fresh_var(&mut self) -> String {
        self.fresh += 1;
        format!("${}", self.fresh)
    }

    fn subty(&self) -> SubtypeChecker<'a> {
        SubtypeChecker::new(self.db, self.config)
    }

    fn is_sub(&self, a: &Type, b: &Type) -> bool {
        self.subty().sub_type(a, b)
    }

    fn is_none(&self, ty: &Type) -> bool {
        self.subty().is_none_type(ty)
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Whether clause refinement is active for these clauses.
    ///
    /// Requires gradual mode. Guard-only clause lists always qualify;
    /// pattern clause lists qualify when they are few enough (or the cap is
    /// lifted) and every clause binds each pattern variable at most once.
    pub fn refinable(&self, clauses: &[Clause]) -> bool {
        if !self.config.gradual_typing {
            return false;
        }
        if clauses.iter().all(|c| c.pats.is_empty()) {
            return true;
        }
        if !(self.config.unlimited_refinement || clauses.len() < MAX_REFINABLE_CLAUSES) {
            return false;
        }
        clauses.iter().all(|clause| {
            let occurrences = clause.pat_var_occurrences();
            let distinct: std::collections::BTreeSet<&String> = occurrences.iter().collect();
            distinct.len() == occurrences.len()
        })
    }

    /// Narrowed environments for guard-only clauses.
    ///
    /// Clause k's environment accumulates the negated guards of clauses
    /// 0..k-1: falling past a clause means its guards did not hold.
    pub fn if_envs(&mut self, clauses: &[Clause], env: &Env) -> Vec<Env> {
        let empty = AliasMap::new();
        let mut acc = env.clone();
        let mut out = Vec::with_capacity(clauses.len());
        for clause in clauses {
            match self.guards_props(&clause.guards, env, &empty) {
                Some((pos, neg)) => {
                    out.push(self.batch_select(&acc, vec![pos], &empty));
                    acc = self.batch_select(&acc, vec![neg], &empty);
                }
                None => out.push(acc.clone()),
            }
        }
        out
    }

    /// Narrowed environments for the clauses of a `case`.
    ///
    /// When the scrutinee is a variable (or a match that binds one), the
    /// occurrence refers to it directly; otherwise a synthetic subject is
    /// introduced and bound to the scrutinee type.
    pub fn case_envs(&mut self, case: &CaseExpr, sel_ty: &Type, env: &Env) -> Vec<Env> {
        let (subject, base) = self.case_subject(&case.expr, sel_ty, env);
        self.clause_envs(&case.clauses, std::slice::from_ref(&subject), &base)
    }

    /// Narrowed environments for function-head clauses: one synthetic
    /// subject per argument, bound to the formal argument type.
    pub fn clauses_envs(&mut self, clauses: &[Clause], arg_tys: &[Type], env: &Env) -> Vec<Env> {
        let mut base = env.clone();
        let subjects: Vec<String> = arg_tys
            .iter()
            .map(|ty| {
                let name = self.fresh_var();
                base.bind(name.clone(), ty.clone());
                name
            })
            .collect();
        self.clause_envs(clauses, &subjects, &base)
    }

    fn case_subject(&mut self, scrutinee: &Expr, sel_ty: &Type, env: &Env) -> (String, Env) {
        match scrutinee {
            Expr::Var(name) => {
                if env.contains(name) {
                    (name.clone(), env.clone())
                } else {
                    (name.clone(), env.with(name.clone(), sel_ty.clone()))
                }
            }
            Expr::Match(pat, _) => match pat.as_ref() {
                Pat::Var(name) if !env.contains(name) => {
                    (name.clone(), env.with(name.clone(), sel_ty.clone()))
                }
                Pat::Var(name) => (name.clone(), env.clone()),
                _ => {
                    let name = self.fresh_var();
                    let base = env.with(name.clone(), sel_ty.clone());
                    (name, base)
                }
            },
            _ => {
                let name = self.fresh_var();
                let base = env.with(name.clone(), sel_ty.clone());
                (name, base)
            }
        }
    }

    /// Shared clause walk for `case` (one subject) and function heads
    /// (one subject per argument).
    fn clause_envs(&mut self, clauses: &[Clause], subjects: &[String], env: &Env) -> Vec<Env> {
        let mut acc = env.clone();
        let mut out = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let mut aliases = AliasMap::new();
            for (subject, pat) in subjects.iter().zip(&clause.pats) {
                self.collect_aliases(&Obj::var(subject.clone()), pat, env, &mut aliases);
            }

            let mut pos_parts = Vec::new();
            let mut neg_parts = Vec::new();
            for (subject, pat) in subjects.iter().zip(&clause.pats) {
                if let Some((pos, neg)) = self.pat_props(&Obj::var(subject.clone()), pat, env) {
                    pos_parts.push(pos);
                    neg_parts.push(neg);
                }
            }
            if let Some((pos, neg)) = self.guards_props(&clause.guards, env, &aliases) {
                pos_parts.push(pos);
                neg_parts.push(neg);
            }

            out.push(self.batch_select(&acc, pos_parts, &aliases));

            // Falling through means the conjunction of pattern and guard
            // did not hold: negations disjoin.
            if !neg_parts.is_empty() {
                let neg = or_prop(neg_parts);
                acc = self.batch_select(&acc, vec![neg], &AliasMap::new());
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Patterns → propositions
    // -----------------------------------------------------------------------

    /// Positive and negative propositions a pattern asserts about `obj`.
    ///
    /// `None` means the pattern matches unconditionally and asserts nothing
    /// (wildcards and fresh variables).
    fn pat_props(&self, obj: &Obj, pat: &Pat, env: &Env) -> Option<(Prop, Prop)> {
        match pat {
            Pat::Wildcard => None,
            Pat::Var(name) => {
                // A bound variable is an equality test we cannot decide.
                if env.contains(name) {
                    Some((Prop::Unknown, Prop::Unknown))
                } else {
                    None
                }
            }
            Pat::Atom(name) => {
                let ty = Type::atom_lit(name.clone());
                Some((
                    Prop::Pos(obj.clone(), ty.clone()),
                    Prop::Neg(obj.clone(), ty),
                ))
            }
            // A numeric literal proves the subject is a number; failing to
            // match it proves nothing.
            Pat::Int(_) | Pat::Float(_) => {
                Some((Prop::Pos(obj.clone(), Type::Number), Prop::Unknown))
            }
            Pat::Tuple(pats) => {
                let skeleton = Type::tuple_of_any(pats.len());
                let mut child_pos = Vec::new();
                let mut child_neg = Vec::new();
                for (index, child_pat) in pats.iter().enumerate() {
                    let child = obj.child(PathStep::TupleElem {
                        index,
                        arity: pats.len(),
                    });
                    if let Some((pos, neg)) = self.pat_props(&child, child_pat, env) {
                        child_pos.push(pos);
                        child_neg.push(neg);
                    }
                }
                Some(composite_props(obj, skeleton, child_pos, child_neg))
            }
            Pat::Record(rp) => {
                let rec = RecordId::new(self.module.clone(), rp.name.clone());
                let skeleton = Type::Record(rec.clone());
                let mut child_pos = Vec::new();
                let mut child_neg = Vec::new();
                for field_pat in &rp.fields {
                    let child = obj.child(PathStep::RecordField {
                        field: field_pat.name.clone(),
                        rec: rec.clone(),
                    });
                    if let Some((pos, neg)) = self.pat_props(&child, &field_pat.pat, env) {
                        child_pos.push(pos);
                        child_neg.push(neg);
                    }
                }
                // The generic sub-pattern applies to every declared field
                // not named explicitly.
                if let Some(generic) = &rp.generic {
                    let db = self.db;
                    if let Some(decl) = db.record(&rec.module, &rec.name) {
                        for field in &decl.fields {
                            if rp.fields.iter().any(|fp| fp.name == field.name) {
                                continue;
                            }
                            let child = obj.child(PathStep::RecordField {
                                field: field.name.clone(),
                                rec: rec.clone(),
                            });
                            if let Some((pos, neg)) = self.pat_props(&child, generic, env) {
                                child_pos.push(pos);
                                child_neg.push(neg);
                            }
                        }
                    }
                }
                Some(composite_props(obj, skeleton, child_pos, child_neg))
            }
            Pat::Match(p1, p2) => match (p1.as_ref(), p2.as_ref()) {
                (Pat::Var(name), inner) | (inner, Pat::Var(name)) => {
                    if env.contains(name) {
                        Some((Prop::Unknown, Prop::Unknown))
                    } else {
                        self.pat_props(obj, inner, env)
                    }
                }
                _ => Some((Prop::Unknown, Prop::Unknown)),
            },
            Pat::String(_) | Pat::Nil | Pat::Cons(..) => Some((Prop::Unknown, Prop::Unknown)),
        }
    }

    /// Collect pattern aliases: fresh variables mapped to the object path
    /// where the pattern binds them. List elements have no path language,
    /// so variables inside list patterns are not collected.
    fn collect_aliases(&self, obj: &Obj, pat: &Pat, env: &Env, aliases: &mut AliasMap) {
        match pat {
            Pat::Var(name) => {
                if !env.contains(name) {
                    aliases.insert(name.clone(), obj.clone());
                }
            }
            Pat::Tuple(pats) => {
                for (index, child_pat) in pats.iter().enumerate() {
                    let child = obj.child(PathStep::TupleElem {
                        index,
                        arity: pats.len(),
                    });
                    self.collect_aliases(&child, child_pat, env, aliases);
                }
            }
            Pat::Record(rp) => {
                let rec = RecordId::new(self.module.clone(), rp.name.clone());
                for field_pat in &rp.fields {
                    let child = obj.child(PathStep::RecordField {
                        field: field_pat.name.clone(),
                        rec: rec.clone(),
                    });
                    self.collect_aliases(&child, &field_pat.pat, env, aliases);
                }
                if let Some(generic) = &rp.generic {
                    let db = self.db;
                    if let Some(decl) = db.record(&rec.module, &rec.name) {
                        for field in &decl.fields {
                            if rp.fields.iter().any(|fp| fp.name == field.name) {
                                continue;
                            }
                            let child = obj.child(PathStep::RecordField {
                                field: field.name.clone(),
                                rec: rec.clone(),
                            });
                            self.collect_aliases(&child, generic, env, aliases);
                        }
                    }
                }
            }
            Pat::Match(p1, p2) => {
                self.collect_aliases(obj, p1, env, aliases);
                self.collect_aliases(obj, p2, env, aliases);
            }
            Pat::Wildcard
            | Pat::Atom(_)
            | Pat::Int(_)
            | Pat::Float(_)
            | Pat::String(_)
            | Pat::Nil
            | Pat::Cons(..) => {}
        }
    }

    // -----------------------------------------------------------------------
    // Guards → propositions
    // -----------------------------------------------------------------------

    /// Combined propositions of a clause's guard sequence. Guards are
    /// OR-connected: positives disjoin, negatives conjoin. Within one guard,
    /// tests are AND-connected. `None` when there are no guards.
    fn guards_props(
        &self,
        guards: &[Guard],
        env: &Env,
        aliases: &AliasMap,
    ) -> Option<(Prop, Prop)> {
        if guards.is_empty() {
            return None;
        }
        let mut pos_all = Vec::with_capacity(guards.len());
        let mut neg_all = Vec::with_capacity(guards.len());
        for guard in guards {
            let mut pos = Vec::with_capacity(guard.tests.len());
            let mut neg = Vec::with_capacity(guard.tests.len());
            for test in &guard.tests {
                let (p, n) = self.test_props(test, env, aliases);
                pos.push(p);
                neg.push(n);
            }
            pos_all.push(and_prop(pos));
            neg_all.push(or_prop(neg));
        }
        Some((or_prop(pos_all), and_prop(neg_all)))
    }

    fn test_props(&self, test: &Test, env: &Env, aliases: &AliasMap) -> (Prop, Prop) {
        match test {
            Test::Call { name, args } => self.call_props(name, args, env, aliases),
            Test::UnOp { op: UnOp::Not, arg } => {
                let (pos, neg) = self.test_props(arg, env, aliases);
                (neg, pos)
            }
            Test::BinOp { op, left, right } => match op {
                BinOp::And | BinOp::AndAlso => {
                    let (p1, n1) = self.test_props(left, env, aliases);
                    let (p2, n2) = self.test_props(right, env, aliases);
                    (Prop::And(vec![p1, p2]), Prop::Or(vec![n1, n2]))
                }
                BinOp::Or | BinOp::OrElse => {
                    let (p1, n1) = self.test_props(left, env, aliases);
                    let (p2, n2) = self.test_props(right, env, aliases);
                    (Prop::Or(vec![p1, p2]), Prop::And(vec![n1, n2]))
                }
                BinOp::Eq | BinOp::ExactEq => self.eq_props(left, right, env, aliases, true),
                BinOp::NotEq | BinOp::ExactNotEq => {
                    self.eq_props(left, right, env, aliases, false)
                }
                BinOp::Lt | BinOp::Gt => (Prop::Unknown, Prop::Unknown),
            },
            Test::Var(_) | Test::Atom(_) | Test::Int(_) | Test::UnOp { .. } => {
                (Prop::Unknown, Prop::Unknown)
            }
        }
    }

    /// An (in)equality against an atom literal narrows the compared
    /// variable; anything else is unknown.
    fn eq_props(
        &self,
        left: &Test,
        right: &Test,
        env: &Env,
        aliases: &AliasMap,
        positive: bool,
    ) -> (Prop, Prop) {
        let (var, lit) = match (left, right) {
            (Test::Var(v), Test::Atom(a)) | (Test::Atom(a), Test::Var(v)) => (v, a),
            _ => return (Prop::Unknown, Prop::Unknown),
        };
        let Some(obj) = self.test_obj(var, env, aliases) else {
            return (Prop::Unknown, Prop::Unknown);
        };
        let ty = Type::atom_lit(lit.clone());
        let pos = Prop::Pos(obj.clone(), ty.clone());
        let neg = Prop::Neg(obj, ty);
        if positive { (pos, neg) } else { (neg, pos) }
    }

    fn call_props(&self, name: &str, args: &[Test], env: &Env, aliases: &AliasMap) -> (Prop, Prop) {
        let unknown = (Prop::Unknown, Prop::Unknown);
        let Some(Test::Var(var)) = args.first() else {
            return unknown;
        };
        let Some(obj) = self.test_obj(var, env, aliases) else {
            return unknown;
        };
        let ty = match (name, &args[1..]) {
            ("is_function", [Test::Int(arity)]) if *arity >= 0 => {
                Type::Fun(FunType::mono(vec![Type::Any; *arity as usize], Type::Any))
            }
            ("is_record", [Test::Atom(rec_name)])
            | ("is_record", [Test::Atom(rec_name), Test::Int(_)]) => {
                Type::Record(RecordId::new(self.module.clone(), rec_name.clone()))
            }
            (_, []) => match unary_type_test(name) {
                Some(ty) => ty,
                None => return unknown,
            },
            _ => return unknown,
        };
        (Prop::Pos(obj.clone(), ty.clone()), Prop::Neg(obj, ty))
    }

    /// Resolve a guard variable to an object: pattern aliases first, then
    /// environment variables. Unbound names cannot be refined.
    fn test_obj(&self, var: &str, env: &Env, aliases: &AliasMap) -> Option<Obj> {
        if let Some(obj) = aliases.get(var) {
            return Some(obj.clone());
        }
        if env.contains(var) {
            return Some(Obj::var(var));
        }
        None
    }

    // -----------------------------------------------------------------------
    // Environment update via DNF
    // -----------------------------------------------------------------------

    /// Refine `env` under the conjunction of `props`.
    ///
    /// Every cube of the DNF updates a copy of the environment along its
    /// literals' paths; each name's per-cube types are then joined. Aliased
    /// names are read by projecting their object path in the updated
    /// environment.
    pub(crate) fn batch_select(&self, env: &Env, props: Vec<Prop>, aliases: &AliasMap) -> Env {
        let cubes = dnf(&Prop::And(props));
        let cube_envs: Vec<Env> = cubes
            .iter()
            .map(|cube| {
                let mut scratch = env.clone();
                for (obj, ty) in &cube.pos {
                    self.update_root(&mut scratch, obj, Polarity::Plus, ty);
                }
                for (obj, ty) in &cube.neg {
                    self.update_root(&mut scratch, obj, Polarity::Minus, ty);
                }
                scratch
            })
            .collect();

        let mut out = Env::new();
        for name in env.names().chain(aliases.keys()) {
            let alternatives: Vec<Type> = cube_envs
                .iter()
                .map(|cube_env| match aliases.get(name) {
                    Some(obj) => {
                        let root_ty = cube_env.get(&obj.root).cloned().unwrap_or(Type::Any);
                        self.type_path_ref(&root_ty, &obj.path)
                    }
                    None => cube_env.get(name).cloned().unwrap_or(Type::Any),
                })
                .collect();
            out.bind(name.clone(), self.subty().join_all(alternatives));
        }
        out
    }

    fn update_root(&self, env: &mut Env, obj: &Obj, pol: Polarity, ty: &Type) {
        let Some(old) = env.get(&obj.root).cloned() else {
            return;
        };
        let updated = self.update(&old, &obj.path, pol, ty);
        env.bind(obj.root.clone(), updated);
    }

    /// Apply a positive or negative refinement to `ty` along `path`.
    ///
    /// Structural descent rebuilds the surrounding type; a path that does
    /// not match the type's shape leaves it unchanged.
    fn update(&self, ty: &Type, path: &[PathStep], pol: Polarity, s: &Type) -> Type {
        let Some((step, rest)) = path.split_first() else {
            return match pol {
                Polarity::Plus => self.restrict(ty, s),
                Polarity::Minus => self.remove(ty, s),
            };
        };
        match (ty, step) {
            (Type::Union(tys), _) => Type::union(tys.iter().map(|t| self.update(t, path, pol, s))),
            (Type::Remote(id, args), _) => match self.db.type_decl_body(id, args) {
                Some(body) => self.update(&body, path, pol, s),
                None => ty.clone(),
            },
            (Type::Tuple(tys), PathStep::TupleElem { index, arity })
                if tys.len() == *arity && *index < tys.len() =>
            {
                let elem = self.update(&tys[*index], rest, pol, s);
                if self.is_none(&elem) {
                    // An uninhabited element empties the whole tuple.
                    Type::None
                } else {
                    let mut tys = tys.clone();
                    tys[*index] = elem;
                    Type::Tuple(tys)
                }
            }
            (Type::Record(rid), PathStep::RecordField { field, rec }) if rid == rec => {
                let db = self.db;
                let Some(decl) = db.record(&rid.module, &rid.name) else {
                    return ty.clone();
                };
                let Some(decl_field) = decl.field(field) else {
                    return ty.clone();
                };
                let updated = self.update(&decl_field.ty, rest, pol, s);
                if self.is_none(&updated) {
                    Type::None
                } else {
                    Type::RefinedRecord(RefinedRecord {
                        rec: rid.clone(),
                        fields: BTreeMap::from([(field.clone(), updated)]),
                    })
                }
            }
            (Type::RefinedRecord(rr), PathStep::RecordField { field, rec }) if rr.rec == *rec => {
                let db = self.db;
                let base = rr.fields.get(field).cloned().or_else(|| {
                    db.record(&rr.rec.module, &rr.rec.name)
                        .and_then(|decl| decl.field(field))
                        .map(|f| f.ty.clone())
                });
                let Some(base) = base else {
                    return ty.clone();
                };
                let updated = self.update(&base, rest, pol, s);
                if self.is_none(&updated) {
                    Type::None
                } else {
                    let mut refined = rr.clone();
                    refined.fields.insert(field.clone(), updated);
                    Type::RefinedRecord(refined)
                }
            }
            _ => ty.clone(),
        }
    }

    /// Narrow `ty` to its part inhabiting `s`.
    ///
    /// Keeps whichever side is provably included in the other, drops types
    /// provably disjoint from `s`, and otherwise leaves `ty` unchanged
    /// (refine what we can prove, skip what we can't).
    fn restrict(&self, ty: &Type, s: &Type) -> Type {
        if self.overlap(ty, s) == Some(false) {
            return Type::None;
        }
        if self.is_sub(ty, s) {
            return ty.clone();
        }
        if self.is_sub(s, ty) {
            return s.clone();
        }
        match ty {
            Type::Union(tys) => Type::union(tys.iter().map(|t| self.restrict(t, s))),
            Type::Remote(id, args) => match self.db.type_decl_body(id, args) {
                Some(body) => self.restrict(&body, s),
                None => ty.clone(),
            },
            Type::Opaque(..) => ty.clone(),
            _ => ty.clone(),
        }
    }

    /// Narrow `ty` to its part outside `s` — by subtype-removal at the
    /// leaves only, never by complementing tuples or records.
    ///
    /// `dynamic()` survives removal: emptiness of a gradual value is never
    /// provable.
    fn remove(&self, ty: &Type, s: &Type) -> Type {
        match ty {
            Type::Dynamic => ty.clone(),
            Type::Union(tys) => Type::union(tys.iter().map(|t| self.remove(t, s))),
            Type::Remote(id, args) => match self.db.type_decl_body(id, args) {
                Some(body) => self.remove(&body, s),
                None => ty.clone(),
            },
            Type::Opaque(..) => ty.clone(),
            _ => {
                if self.is_sub(ty, s) {
                    Type::None
                } else {
                    ty.clone()
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Overlap
    // -----------------------------------------------------------------------

    /// Three-valued overlap: `Some(true)` definitely sharing a value,
    /// `Some(false)` definitely disjoint, `None` unknown.
    ///
    /// Used by `restrict` to answer `none()` cheaply. Unknown is always a
    /// sound answer; a wrong `Some(false)` would mis-refine a live type to
    /// `none()`, so every rule here errs toward true/unknown.
    fn overlap(&self, t: &Type, s: &Type) -> Option<bool> {
        assert!(
            !matches!(s, Type::Remote(..) | Type::Opaque(..) | Type::RefinedRecord(_)),
            "overlap right-hand side must be proposition-derived, got {s}",
        );
        match (t, s) {
            (Type::Any, _) | (_, Type::Any) => Some(true),
            (Type::None, _) | (_, Type::None) => Some(false),
            (Type::Dynamic, _) | (_, Type::Dynamic) => Some(true),
            (Type::Var(_), _) | (_, Type::Var(_)) => Some(true),
            (Type::Remote(id, args), _) => match self.db.type_decl_body(id, args) {
                Some(body) => self.overlap(&body, s),
                None => None,
            },
            (Type::Opaque(..), _) => None,
            (Type::Union(tys), _) => exists3(tys.iter().map(|m| self.overlap(m, s))),
            (_, Type::Union(tys)) => exists3(tys.iter().map(|m| self.overlap(t, m))),
            _ => self.overlap_kinds(t, s),
        }
    }

    fn overlap_kinds(&self, t: &Type, s: &Type) -> Option<bool> {
        let k1 = value_kind(t)?;
        let k2 = value_kind(s)?;
        if k1 != k2 {
            return Some(false);
        }
        match k1 {
            ValueKind::Atom => match (t, s) {
                (Type::AtomLit(a), Type::AtomLit(b)) => Some(a == b),
                _ => Some(true),
            },
            ValueKind::Fun => match (t, s) {
                (Type::Fun(f1), Type::Fun(f2)) => {
                    if f1.args.len() != f2.args.len() {
                        Some(false)
                    } else {
                        None
                    }
                }
                _ => Some(true),
            },
            ValueKind::Tuple => self.overlap_tuples(t, s),
            ValueKind::Number
            | ValueKind::List
            | ValueKind::Map
            | ValueKind::Pid
            | ValueKind::Port
            | ValueKind::Reference
            | ValueKind::Binary => Some(true),
        }
    }

    /// Overlap within the tuple kind. Under the record-as-tagged-tuple
    /// encoding, only the head element discriminates.
    fn overlap_tuples(&self, t: &Type, s: &Type) -> Option<bool> {
        match (t, s) {
            (Type::AnyTuple, _) | (_, Type::AnyTuple) => Some(true),
            (Type::Tuple(elems1), Type::Tuple(elems2)) => {
                if elems1.len() != elems2.len() {
                    return Some(false);
                }
                match (elems1.first(), elems2.first()) {
                    (Some(h1), Some(h2)) => self.overlap(h1, h2),
                    _ => Some(true),
                }
            }
            (Type::Record(r1), Type::Record(r2)) => Some(r1 == r2),
            (Type::RefinedRecord(rr), Type::Record(r2)) => Some(rr.rec == *r2),
            (Type::Record(rid), Type::Tuple(elems)) => {
                let Some(decl) = self.db.record(&rid.module, &rid.name) else {
                    return None;
                };
                if decl.tuple_arity() != elems.len() {
                    return Some(false);
                }
                self.overlap(&Type::AtomLit(decl.name.clone()), &elems[0])
            }
            (Type::RefinedRecord(rr), Type::Tuple(elems)) => {
                let Some(decl) = self.db.record(&rr.rec.module, &rr.rec.name) else {
                    return None;
                };
                if decl.tuple_arity() != elems.len() {
                    return Some(false);
                }
                self.overlap(&Type::AtomLit(decl.name.clone()), &elems[0])
            }
            (Type::Tuple(elems), Type::Record(rid)) => {
                let Some(decl) = self.db.record(&rid.module, &rid.name) else {
                    return None;
                };
                if decl.tuple_arity() != elems.len() {
                    return Some(false);
                }
                self.overlap(&elems[0], &Type::AtomLit(decl.name.clone()))
            }
            _ => Some(true),
        }
    }

    // -----------------------------------------------------------------------
    // Path projection
    // -----------------------------------------------------------------------

    /// Read the type at `path` inside `ty`. Distributes over unions,
    /// expands aliases, propagates `none()`, and answers `term()` when the
    /// path does not match the head's structure.
    fn type_path_ref(&self, ty: &Type, path: &[PathStep]) -> Type {
        let Some((step, rest)) = path.split_first() else {
            return ty.clone();
        };
        match (ty, step) {
            (Type::None, _) => Type::None,
            (Type::Union(tys), _) => Type::union(tys.iter().map(|t| self.type_path_ref(t, path))),
            (Type::Remote(id, args), _) => match self.db.type_decl_body(id, args) {
                Some(body) => self.type_path_ref(&body, path),
                None => Type::Any,
            },
            (Type::Tuple(tys), PathStep::TupleElem { index, arity })
                if tys.len() == *arity && *index < tys.len() =>
            {
                self.type_path_ref(&tys[*index], rest)
            }
            (Type::Record(rid), PathStep::RecordField { field, rec }) if rid == rec => {
                match self.db.record(&rid.module, &rid.name) {
                    Some(decl) => match decl.field(field) {
                        Some(decl_field) => self.type_path_ref(&decl_field.ty, rest),
                        None => Type::Any,
                    },
                    None => Type::Any,
                }
            }
            (Type::RefinedRecord(rr), PathStep::RecordField { field, rec }) if rr.rec == *rec => {
                let base = rr.fields.get(field).cloned().or_else(|| {
                    self.db
                        .record(&rr.rec.module, &rr.rec.name)
                        .and_then(|decl| decl.field(field))
                        .map(|f| f.ty.clone())
                });
                match base {
                    Some(base) => self.type_path_ref(&base, rest),
                    None => Type::Any,
                }
            }
            _ => Type::Any,
        }
    }
}

/// Build a composite pattern's propositions from its skeleton and child
/// props: the shape holds and every child holds; it fails when the shape
/// mismatches or the shape matches but some child fails.
///
/// Only informative child propositions participate. An `Unknown` from a
/// bound variable or a numeric literal would otherwise turn the negative
/// disjunction into a tautology and discard what sibling fields do prove.
fn composite_props(
    obj: &Obj,
    skeleton: Type,
    child_pos: Vec<Prop>,
    child_neg: Vec<Prop>,
) -> (Prop, Prop) {
    let child_pos: Vec<Prop> = child_pos
        .into_iter()
        .filter(|p| *p != Prop::Unknown)
        .collect();
    let child_neg: Vec<Prop> = child_neg
        .into_iter()
        .filter(|p| *p != Prop::Unknown)
        .collect();

    let mut pos = Vec::with_capacity(child_pos.len() + 1);
    pos.push(Prop::Pos(obj.clone(), skeleton.clone()));
    pos.extend(child_pos);
    let pos = Prop::And(pos);

    let shape_neg = Prop::Neg(obj.clone(), skeleton.clone());
    let neg = if child_neg.is_empty() {
        shape_neg
    } else {
        Prop::Or(vec![
            shape_neg,
            Prop::And(vec![Prop::Pos(obj.clone(), skeleton), Prop::Or(child_neg)]),
        ])
    };
    (pos, neg)
}

/// Three-valued exists: any true wins, all false is false, otherwise
/// unknown.
fn exists3(results: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for result in results {
        match result {
            Some(true) => return Some(true),
            Some(false) => {}
            None => unknown = true,
        }
    }
    if unknown { None } else { Some(false) }
}

/// The fixed table of unary type-test guards.
fn unary_type_test(name: &str) -> Option<Type> {
    Some(match name {
        "is_atom" => Type::Atom,
        "is_binary" | "is_bitstring" => Type::Binary,
        "is_boolean" => Type::boolean(),
        "is_float" => Type::Float,
        "is_function" => Type::AnyFun,
        "is_integer" | "is_number" => Type::Number,
        "is_list" => Type::List(Box::new(Type::Any)),
        "is_map" => Type::DictMap(Box::new(Type::Any), Box::new(Type::Any)),
        "is_pid" => Type::Pid,
        "is_port" => Type::Port,
        "is_reference" => Type::Reference,
        "is_tuple" => Type::AnyTuple,
        _ => return None,
    })
}

/// Runtime value kinds: distinct kinds never share a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Atom,
    Number,
    Tuple,
    List,
    Fun,
    Map,
    Pid,
    Port,
    Reference,
    Binary,
}

fn value_kind(ty: &Type) -> Option<ValueKind> {
    match ty {
        Type::Atom | Type::AtomLit(_) => Some(ValueKind::Atom),
        Type::Number | Type::Float => Some(ValueKind::Number),
        Type::AnyTuple | Type::Tuple(_) | Type::Record(_) | Type::RefinedRecord(_) => {
            Some(ValueKind::Tuple)
        }
        Type::Nil | Type::List(_) => Some(ValueKind::List),
        Type::AnyFun | Type::Fun(_) => Some(ValueKind::Fun),
        Type::DictMap(..) | Type::ShapeMap(_) => Some(ValueKind::Map),
        Type::Pid => Some(ValueKind::Pid),
        Type::Port => Some(ValueKind::Port),
        Type::Reference => Some(ValueKind::Reference),
        Type::Binary => Some(ValueKind::Binary),
        Type::Any
        | Type::None
        | Type::Dynamic
        | Type::Union(_)
        | Type::Opaque(..)
        | Type::Remote(..)
        | Type::Var(_) => None,
    }
}
