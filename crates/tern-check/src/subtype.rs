//! The subtyping decision procedure.
//!
//! `sub_type` is total and terminating: recursion through named aliases is
//! closed co-inductively by a per-query memo set of pairs currently being
//! proved. A pair met again while in flight is assumed to hold. The set is
//! per query, never a global cache, so no eviction policy exists or is
//! needed.
//!
//! Rules are tried in a fixed order; the first applicable rule decides.
//! `dynamic()` is both top and bottom, which makes the relation
//! intentionally non-transitive across the gradual fragment.

use std::collections::{BTreeMap, HashSet};

use tern_types::{
    FunType, RecordId, RefinedRecord, Type, TypeVarId, has_dynamic, static_type, subst,
};

use crate::trace::{SubtypeRule, SubtypeStep};
use crate::{CheckConfig, TypeRegistry};

type Seen = HashSet<(Type, Type)>;

/// Decides `t1 <: t2` against a registry, in either gradual or strict mode.
///
/// Cheap to construct; typical callers create one per checking unit and
/// reuse it. Tracing is opt-in and off by default.
pub struct SubtypeChecker<'a> {
    db: &'a TypeRegistry,
    gradual: bool,
    tracing: bool,
    steps: Vec<SubtypeStep>,
}

impl<'a> SubtypeChecker<'a> {
    pub fn new(db: &'a TypeRegistry, config: CheckConfig) -> Self {
        Self {
            db,
            gradual: config.gradual_typing,
            tracing: false,
            steps: Vec::new(),
        }
    }

    /// Enable step-by-step decision tracing for observability tools.
    pub fn enable_tracing(&mut self) {
        self.tracing = true;
    }

    /// Whether decision tracing is currently enabled.
    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    /// The collected decision trace.
    pub fn trace(&self) -> &[SubtypeStep] {
        &self.steps
    }

    /// Take the collected trace, leaving an empty one behind.
    pub fn take_trace(&mut self) -> Vec<SubtypeStep> {
        std::mem::take(&mut self.steps)
    }

    fn record(&mut self, rule: SubtypeRule, left: &Type, right: &Type, detail: &str) {
        if !self.tracing {
            return;
        }
        let step = self.steps.len();
        self.steps.push(SubtypeStep {
            step,
            rule,
            left: left.to_string(),
            right: right.to_string(),
            detail: detail.to_string(),
        });
    }

    // -----------------------------------------------------------------------
    // Subtyping
    // -----------------------------------------------------------------------

    /// Whether `t1 <: t2`.
    pub fn sub_type(&mut self, t1: &Type, t2: &Type) -> bool {
        let mut seen = Seen::new();
        self.sub(t1, t2, &mut seen)
    }

    /// Whether `a` and `b` are equivalent (mutual subtypes).
    pub fn eqv(&mut self, a: &Type, b: &Type) -> bool {
        self.sub_type(a, b) && self.sub_type(b, a)
    }

    /// Whether `ty` behaves as both top and bottom — only the gradual type
    /// and types equivalent to it do.
    pub fn is_dynamic_type(&mut self, ty: &Type) -> bool {
        self.sub_type(ty, &Type::None) && self.sub_type(&Type::Any, ty)
    }

    fn sub(&mut self, t1: &Type, t2: &Type, seen: &mut Seen) -> bool {
        if !seen.is_empty() && seen.contains(&(t1.clone(), t2.clone())) {
            self.record(SubtypeRule::Assumed, t1, t2, "recursive pair assumed");
            return true;
        }
        if t1 == t2 {
            self.record(SubtypeRule::Equal, t1, t2, "");
            return true;
        }
        match (t1, t2) {
            (_, Type::Any) => {
                self.record(SubtypeRule::Top, t1, t2, "");
                true
            }
            (Type::None, _) => {
                self.record(SubtypeRule::Bottom, t1, t2, "");
                true
            }
            (Type::Dynamic, _) | (_, Type::Dynamic) => {
                self.record(SubtypeRule::Dynamic, t1, t2, "");
                true
            }

            (Type::Remote(id, args), _) => match self.db.type_decl_body(id, args) {
                Some(body) => {
                    self.record(SubtypeRule::AliasExpand, t1, t2, "left");
                    seen.insert((t1.clone(), t2.clone()));
                    self.sub(&body, t2, seen)
                }
                None => false,
            },
            (_, Type::Remote(id, args)) => match self.db.type_decl_body(id, args) {
                Some(body) => {
                    self.record(SubtypeRule::AliasExpand, t1, t2, "right");
                    seen.insert((t1.clone(), t2.clone()));
                    self.sub(t1, &body, seen)
                }
                None => false,
            },

            // Opaque types are nominal with invariant arguments.
            (Type::Opaque(id1, args1), Type::Opaque(id2, args2)) => {
                id1 == id2
                    && args1.len() == args2.len()
                    && args1
                        .iter()
                        .zip(args2)
                        .all(|(a1, a2)| self.sub(a1, a2, seen) && self.sub(a2, a1, seen))
            }

            (Type::Union(tys), _) => {
                self.record(SubtypeRule::Union, t1, t2, "for-all on the left");
                tys.iter().all(|t| self.sub(t, t2, seen))
            }

            // Tuple-union distribution: a union inside a tuple element is
            // distributed outward before giving up on the right-hand union.
            (Type::Tuple(tys), Type::Union(alts)) if !tys.is_empty() => {
                let distributed = (0..tys.len())
                    .filter(|&i| matches!(tys[i], Type::Union(_) | Type::Remote(..)))
                    .any(|i| {
                        self.record(SubtypeRule::TupleDistribution, t1, t2, "");
                        let elem = tys[i].clone();
                        self.sub_tuple_elem(&elem, t2, i, tys, seen)
                    });
                distributed || {
                    self.record(SubtypeRule::Union, t1, t2, "exists on the right");
                    alts.iter().any(|t| self.sub(t1, t, seen))
                }
            }

            (_, Type::Union(tys)) => {
                self.record(SubtypeRule::Union, t1, t2, "exists on the right");
                tys.iter().any(|t| self.sub(t1, t, seen))
            }

            // Literal and primitive inclusions.
            (Type::AtomLit(_), Type::Atom) => true,
            (Type::Tuple(_) | Type::Record(_) | Type::RefinedRecord(_), Type::AnyTuple) => true,
            (Type::Nil, Type::List(_)) => true,
            (Type::List(elem), Type::Nil) => self.sub(elem, &Type::None, seen),
            (Type::List(e1), Type::List(e2)) => {
                self.record(SubtypeRule::Decompose, t1, t2, "list element");
                self.sub(e1, e2, seen)
            }

            // A record is its tagged tuple.
            (Type::Record(id), Type::Tuple(_)) => match self.record_as_tuple(id) {
                Some(tup) => {
                    self.record(SubtypeRule::RecordAsTuple, t1, t2, "left");
                    self.sub(&tup, t2, seen)
                }
                None => false,
            },
            (Type::Tuple(_), Type::Record(id)) => match self.record_as_tuple(id) {
                Some(tup) => {
                    self.record(SubtypeRule::RecordAsTuple, t1, t2, "right");
                    self.sub(t1, &tup, seen)
                }
                None => false,
            },
            (Type::RefinedRecord(rr), Type::Tuple(_)) => match self.refined_as_tuple(rr) {
                Some(tup) => {
                    self.record(SubtypeRule::RecordAsTuple, t1, t2, "left");
                    self.sub(&tup, t2, seen)
                }
                None => false,
            },
            (Type::Tuple(_), Type::RefinedRecord(rr)) => match self.refined_as_tuple(rr) {
                Some(tup) => {
                    self.record(SubtypeRule::RecordAsTuple, t1, t2, "right");
                    self.sub(t1, &tup, seen)
                }
                None => false,
            },

            // Refined records narrow their base record.
            (Type::RefinedRecord(rr), Type::Record(id)) => rr.rec == *id,
            (Type::Record(id), Type::RefinedRecord(rr)) => {
                if *id != rr.rec {
                    return false;
                }
                let db = self.db;
                let Some(decl) = db.record(&id.module, &id.name) else {
                    return false;
                };
                rr.fields.iter().all(|(name, refined)| match decl.field(name) {
                    Some(field) => {
                        let declared = field.ty.clone();
                        self.sub(&declared, refined, seen)
                    }
                    None => false,
                })
            }
            (Type::RefinedRecord(r1), Type::RefinedRecord(r2)) => {
                if r1.rec != r2.rec {
                    return false;
                }
                let db = self.db;
                let Some(decl) = db.record(&r1.rec.module, &r1.rec.name) else {
                    return false;
                };
                r2.fields.iter().all(|(name, t2f)| {
                    let t1f = r1
                        .fields
                        .get(name)
                        .cloned()
                        .or_else(|| decl.field(name).map(|f| f.ty.clone()));
                    match t1f {
                        Some(t1f) => self.sub(&t1f, t2f, seen),
                        None => false,
                    }
                })
            }

            // Gradual-mode-only inclusions.
            (Type::AnyTuple, Type::Tuple(_) | Type::Record(_) | Type::RefinedRecord(_))
                if self.gradual =>
            {
                self.record(SubtypeRule::Gradual, t1, t2, "tuple()");
                true
            }
            (Type::Fun(_), Type::AnyFun) if self.gradual => {
                self.record(SubtypeRule::Gradual, t1, t2, "fun()");
                true
            }
            (Type::AnyFun, Type::Fun(_)) if self.gradual => {
                self.record(SubtypeRule::Gradual, t1, t2, "fun()");
                true
            }

            // A function is a subtype of fun() when it accepts everything.
            (Type::Fun(ft), Type::AnyFun) => {
                ft.args.iter().all(|arg| self.sub(&Type::Any, arg, seen))
            }

            (Type::Tuple(tys1), Type::Tuple(tys2)) => {
                if tys1.len() != tys2.len() {
                    return false;
                }
                self.record(SubtypeRule::Decompose, t1, t2, "tuple elements");
                tys1.iter().zip(tys2).all(|(a, b)| self.sub(a, b, seen))
            }

            (Type::Fun(f1), Type::Fun(f2)) => {
                self.record(SubtypeRule::Decompose, t1, t2, "function");
                self.sub_fun(f1, f2, seen)
            }

            (Type::DictMap(k1, v1), Type::DictMap(k2, v2)) => {
                self.record(SubtypeRule::Decompose, t1, t2, "map key/value");
                self.sub(k1, k2, seen) && self.sub(v1, v2, seen)
            }

            (Type::ShapeMap(props), Type::DictMap(k, v)) => {
                let keys = self.join_all(props.iter().map(|p| Type::AtomLit(p.key.clone())));
                let vals = self.join_all(props.iter().map(|p| p.ty.clone()));
                self.sub(&keys, k, seen) && self.sub(&vals, v, seen)
            }

            (Type::ShapeMap(props1), Type::ShapeMap(props2)) => {
                let covered = props1
                    .iter()
                    .all(|p1| props2.iter().any(|p2| p2.key == p1.key));
                if !covered {
                    return false;
                }
                let required_kept = props2
                    .iter()
                    .filter(|p2| p2.required)
                    .all(|p2| props1.iter().any(|p1| p1.key == p2.key && p1.required));
                if !required_kept {
                    return false;
                }
                props1.iter().all(|p1| {
                    let p2 = props2
                        .iter()
                        .find(|p2| p2.key == p1.key)
                        .expect("every left key was checked to appear on the right");
                    self.sub(&p1.ty, &p2.ty, seen)
                })
            }

            // A dict can stand where a shape is expected only when it is
            // fully gradual.
            (Type::DictMap(k, v), Type::ShapeMap(_)) => has_dynamic(k) && has_dynamic(v),

            _ => {
                self.record(SubtypeRule::NoRule, t1, t2, "");
                false
            }
        }
    }

    /// Distribute a union-typed tuple element outward: walk `elem` through
    /// unions and alias expansions, and once it bottoms out rebuild the
    /// original tuple with the refined element and re-enter `sub`.
    fn sub_tuple_elem(
        &mut self,
        elem: &Type,
        t2: &Type,
        idx: usize,
        tuple_elems: &[Type],
        seen: &mut Seen,
    ) -> bool {
        match elem {
            Type::Union(tys) => tys
                .iter()
                .all(|t| self.sub_tuple_elem(t, t2, idx, tuple_elems, seen)),
            Type::Remote(id, args) => match self.db.type_decl_body(id, args) {
                Some(body) => {
                    seen.insert((Type::Tuple(tuple_elems.to_vec()), t2.clone()));
                    self.sub_tuple_elem(&body, t2, idx, tuple_elems, seen)
                }
                None => false,
            },
            _ => {
                let mut rebuilt = tuple_elems.to_vec();
                rebuilt[idx] = elem.clone();
                self.sub(&Type::Tuple(rebuilt), t2, seen)
            }
        }
    }

    fn sub_fun(&mut self, f1: &FunType, f2: &FunType, seen: &mut Seen) -> bool {
        if f1.args.len() != f2.args.len() {
            return false;
        }
        let Some((args2, res2)) = conform_foralls(f1, f2) else {
            return false;
        };
        // Covariant result, contravariant arguments.
        self.sub(&f1.res, &res2, seen)
            && f1
                .args
                .iter()
                .zip(&args2)
                .all(|(a1, a2)| self.sub(a2, a1, seen))
    }

    /// The tagged-tuple encoding of a record: the record name as an atom
    /// followed by the declared field types in declaration order.
    fn record_as_tuple(&self, id: &RecordId) -> Option<Type> {
        let decl = self.db.record(&id.module, &id.name)?;
        let mut elems = Vec::with_capacity(decl.tuple_arity());
        elems.push(Type::AtomLit(decl.name.clone()));
        elems.extend(decl.fields.iter().map(|f| f.ty.clone()));
        Some(Type::Tuple(elems))
    }

    /// Tagged-tuple encoding of a refined record: overridden field types
    /// take the place of the declared ones.
    fn refined_as_tuple(&self, rr: &RefinedRecord) -> Option<Type> {
        let decl = self.db.record(&rr.rec.module, &rr.rec.name)?;
        let mut elems = Vec::with_capacity(decl.tuple_arity());
        elems.push(Type::AtomLit(decl.name.clone()));
        elems.extend(
            decl.fields
                .iter()
                .map(|f| rr.fields.get(&f.name).cloned().unwrap_or_else(|| f.ty.clone())),
        );
        Some(Type::Tuple(elems))
    }

    // -----------------------------------------------------------------------
    // Emptiness and universality
    // -----------------------------------------------------------------------

    /// Whether `ty` is the empty type: `none()`, a union of empty types, or
    /// an alias of one. Opaque types are never empty.
    pub fn is_none_type(&mut self, ty: &Type) -> bool {
        let mut seen = HashSet::new();
        self.is_none(ty, &mut seen)
    }

    fn is_none(&mut self, ty: &Type, seen: &mut HashSet<Type>) -> bool {
        match ty {
            Type::None => true,
            Type::Union(tys) => tys.iter().all(|t| self.is_none(t, seen)),
            Type::Remote(id, args) => {
                if !seen.insert(ty.clone()) {
                    return true;
                }
                match self.db.type_decl_body(id, args) {
                    Some(body) => self.is_none(&body, seen),
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Whether `ty` is the universal type: `term()`, a union containing it,
    /// or an alias of one. Opaque types are never universal.
    pub fn is_any_type(&mut self, ty: &Type) -> bool {
        let mut seen = HashSet::new();
        self.is_any(ty, &mut seen)
    }

    fn is_any(&mut self, ty: &Type, seen: &mut HashSet<Type>) -> bool {
        match ty {
            Type::Any => true,
            Type::Union(tys) => tys.iter().any(|t| self.is_any(t, seen)),
            Type::Remote(id, args) => {
                if !seen.insert(ty.clone()) {
                    return false;
                }
                match self.db.type_decl_body(id, args) {
                    Some(body) => self.is_any(&body, seen),
                    None => false,
                }
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    /// Least upper bound on the static fragment, preserving gradualness.
    ///
    /// Each side is split into its dynamic and static parts. The static
    /// parts join by subsumption (the larger of the two) or by union;
    /// `dynamic()` is unioned back in when either side was gradual.
    pub fn join(&mut self, t1: &Type, t2: &Type) -> Type {
        let dynamic = has_dynamic(t1) || has_dynamic(t2);
        let s1 = static_type(t1);
        let s2 = static_type(t2);
        let joined = if self.sub_type(&s1, &s2) {
            s2
        } else if self.sub_type(&s2, &s1) {
            s1
        } else {
            Type::union([s1, s2])
        };
        if dynamic {
            if self.is_none_type(&joined) {
                Type::Dynamic
            } else {
                Type::union([Type::Dynamic, joined])
            }
        } else {
            joined
        }
    }

    /// Fold [`join`](Self::join) over a sequence, seeded with `none()`.
    pub fn join_all(&mut self, tys: impl IntoIterator<Item = Type>) -> Type {
        tys.into_iter()
            .fold(Type::None, |acc, ty| self.join(&acc, &ty))
    }
}

/// Rename `f2`'s quantified variables to `f1`'s so the two bodies can be
/// compared under one binder list. Renaming bound variables does not change
/// a function type. `None` when the binder lists cannot be conformed.
fn conform_foralls(f1: &FunType, f2: &FunType) -> Option<(Vec<Type>, Type)> {
    if f1.forall == f2.forall {
        return Some((f2.args.clone(), (*f2.res).clone()));
    }
    if f1.forall.len() != f2.forall.len() {
        return None;
    }
    let map: BTreeMap<TypeVarId, Type> = f2
        .forall
        .iter()
        .zip(&f1.forall)
        .map(|(from, to)| (*from, Type::Var(*to)))
        .collect();
    Some((
        f2.args.iter().map(|t| subst(t, &map)).collect(),
        subst(&f2.res, &map),
    ))
}
