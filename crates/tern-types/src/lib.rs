//! Type representations for Tern.
//!
//! This crate defines the semantic types used by the subtyping and
//! occurrence-typing engines. These are distinct from syntactic type
//! annotations in source programs: the loader resolves annotations into
//! values of [`Type`] before the checker ever sees them.
//!
//! Types are immutable values. Unions are canonical on construction
//! (flattened, duplicates merged, `none()` dropped, members ordered), so
//! derived structural equality is also semantic set equality for unions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a bound type variable.
///
/// Bound variables appear in function types (`forall` lists) and in the
/// stored bodies of parameterized aliases. Renaming bound variables does not
/// change a type; the subtyping engine conforms `forall` lists before
/// comparing function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVarId(pub u32);

/// Fully-qualified identifier of a named type alias or opaque type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteId {
    pub module: String,
    pub name: String,
    pub arity: usize,
}

impl RemoteId {
    pub fn new(module: impl Into<String>, name: impl Into<String>, arity: usize) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.module, self.name, self.arity)
    }
}

/// Reference to a nominal record. Records are module-local, so the module
/// name is part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub module: String,
    pub name: String,
}

impl RecordId {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A semantic type in Tern.
///
/// The algebra is closed: the engines dispatch on this enum exhaustively and
/// treat unexpected combinations as "no rule applies" rather than panicking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// Top: every value.
    Any,
    /// Bottom: no value.
    None,
    /// The gradual type: both top and bottom at once.
    Dynamic,

    /// Any atom.
    Atom,
    /// A specific atom literal.
    AtomLit(String),

    Number,
    Float,
    Pid,
    Port,
    Reference,
    Binary,

    /// Any tuple, of any arity.
    AnyTuple,
    /// Fixed-arity tuple.
    Tuple(Vec<Type>),

    /// The empty list. `Nil` is a subtype of every `List(_)`.
    Nil,
    /// Homogeneous (possibly empty) list.
    List(Box<Type>),

    /// Any function, of any arity.
    AnyFun,
    /// Arity-fixed function type with bound type variables.
    Fun(FunType),

    /// Nominal record reference.
    Record(RecordId),
    /// A record with a subset of its fields narrowed below their declared
    /// types.
    RefinedRecord(RefinedRecord),

    /// Map with uniform key and value types.
    DictMap(Box<Type>, Box<Type>),
    /// Map shape with required and optional atom keys.
    ShapeMap(Vec<ShapeProp>),

    /// Set union of alternatives. Always built through [`Type::union`];
    /// the member list is flattened, deduplicated, and ordered.
    Union(Vec<Type>),

    /// Nominal abstract type. The body is intentionally hidden from the
    /// engines.
    Opaque(RemoteId, Vec<Type>),
    /// Named alias whose body is fetched from the registry on demand.
    Remote(RemoteId, Vec<Type>),

    /// Bound type variable.
    Var(TypeVarId),
}

/// Function type: `fun((Args...) -> Res)` with quantified variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunType {
    /// Quantified type variables. Distinct by invariant.
    pub forall: Vec<TypeVarId>,
    pub args: Vec<Type>,
    pub res: Box<Type>,
}

impl FunType {
    /// A monomorphic function type.
    pub fn mono(args: Vec<Type>, res: Type) -> Self {
        Self {
            forall: Vec::new(),
            args,
            res: Box::new(res),
        }
    }
}

/// A record whose listed fields are overridden with narrower types.
///
/// Invariant: every key of `fields` names a declared field of `rec`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefinedRecord {
    pub rec: RecordId,
    pub fields: BTreeMap<String, Type>,
}

/// One key of a shape map: `key := ty` when required, `key => ty` when
/// optional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeProp {
    pub required: bool,
    pub key: String,
    pub ty: Type,
}

impl Type {
    /// A specific atom literal.
    pub fn atom_lit(s: impl Into<String>) -> Type {
        Type::AtomLit(s.into())
    }

    /// The boolean type: `'true' | 'false'`.
    pub fn boolean() -> Type {
        Type::union([Type::atom_lit("true"), Type::atom_lit("false")])
    }

    /// A tuple of the given arity with `term()` elements. This is the
    /// skeleton type a tuple pattern asserts about its subject.
    pub fn tuple_of_any(arity: usize) -> Type {
        Type::Tuple(vec![Type::Any; arity])
    }

    /// Build the canonical union of `tys`.
    ///
    /// Nested unions are flattened, `none()` members are dropped, and
    /// duplicates are merged. An empty union is `none()`; a singleton union
    /// is its only member. Member order is canonical so that unions compare
    /// as sets under derived equality.
    pub fn union(tys: impl IntoIterator<Item = Type>) -> Type {
        let mut members = BTreeSet::new();
        for ty in tys {
            flatten_into(ty, &mut members);
        }
        match members.len() {
            0 => Type::None,
            1 => members.into_iter().next().expect("checked singleton"),
            _ => Type::Union(members.into_iter().collect()),
        }
    }
}

fn flatten_into(ty: Type, acc: &mut BTreeSet<Type>) {
    match ty {
        Type::None => {}
        Type::Union(tys) => {
            for t in tys {
                flatten_into(t, acc);
            }
        }
        other => {
            acc.insert(other);
        }
    }
}

// ---------------------------------------------------------------------------
// Dynamic-part helpers
// ---------------------------------------------------------------------------

/// Whether `dynamic()` appears at the top level of `ty` or as a member of a
/// top-level union. Deeper occurrences (inside a tuple element, say) do not
/// count: they do not make the whole type gradual.
pub fn has_dynamic(ty: &Type) -> bool {
    match ty {
        Type::Dynamic => true,
        Type::Union(tys) => tys.iter().any(has_dynamic),
        _ => false,
    }
}

/// The static part of `ty`: `dynamic()` stripped from the top-level union.
/// Returns `none()` when nothing remains.
pub fn static_type(ty: &Type) -> Type {
    match ty {
        Type::Dynamic => Type::None,
        Type::Union(tys) => Type::union(tys.iter().map(static_type)),
        _ => ty.clone(),
    }
}

// ---------------------------------------------------------------------------
// Substitution and free variables
// ---------------------------------------------------------------------------

/// Substitute `map` for bound variables in `ty`.
///
/// Function types shadow: quantified variables of an inner `fun` are removed
/// from the substitution before descending into its arguments and result.
pub fn subst(ty: &Type, map: &BTreeMap<TypeVarId, Type>) -> Type {
    if map.is_empty() {
        return ty.clone();
    }
    match ty {
        Type::Var(v) => map.get(v).cloned().unwrap_or_else(|| ty.clone()),
        Type::Tuple(tys) => Type::Tuple(tys.iter().map(|t| subst(t, map)).collect()),
        Type::List(t) => Type::List(Box::new(subst(t, map))),
        Type::Fun(ft) => {
            let inner: BTreeMap<TypeVarId, Type> = map
                .iter()
                .filter(|(v, _)| !ft.forall.contains(v))
                .map(|(v, t)| (*v, t.clone()))
                .collect();
            Type::Fun(FunType {
                forall: ft.forall.clone(),
                args: ft.args.iter().map(|t| subst(t, &inner)).collect(),
                res: Box::new(subst(&ft.res, &inner)),
            })
        }
        Type::RefinedRecord(rr) => Type::RefinedRecord(RefinedRecord {
            rec: rr.rec.clone(),
            fields: rr
                .fields
                .iter()
                .map(|(f, t)| (f.clone(), subst(t, map)))
                .collect(),
        }),
        Type::DictMap(k, v) => Type::DictMap(Box::new(subst(k, map)), Box::new(subst(v, map))),
        Type::ShapeMap(props) => Type::ShapeMap(
            props
                .iter()
                .map(|p| ShapeProp {
                    required: p.required,
                    key: p.key.clone(),
                    ty: subst(&p.ty, map),
                })
                .collect(),
        ),
        Type::Union(tys) => Type::union(tys.iter().map(|t| subst(t, map))),
        Type::Opaque(id, args) => {
            Type::Opaque(id.clone(), args.iter().map(|t| subst(t, map)).collect())
        }
        Type::Remote(id, args) => {
            Type::Remote(id.clone(), args.iter().map(|t| subst(t, map)).collect())
        }
        Type::Any
        | Type::None
        | Type::Dynamic
        | Type::Atom
        | Type::AtomLit(_)
        | Type::Number
        | Type::Float
        | Type::Pid
        | Type::Port
        | Type::Reference
        | Type::Binary
        | Type::AnyTuple
        | Type::Nil
        | Type::AnyFun
        | Type::Record(_) => ty.clone(),
    }
}

/// Collect the free type variables of `ty`.
pub fn free_type_vars(ty: &Type) -> BTreeSet<TypeVarId> {
    let mut vars = BTreeSet::new();
    collect_free_type_vars(ty, &mut vars);
    vars
}

fn collect_free_type_vars(ty: &Type, vars: &mut BTreeSet<TypeVarId>) {
    match ty {
        Type::Var(v) => {
            vars.insert(*v);
        }
        Type::Tuple(tys) | Type::Union(tys) => {
            for t in tys {
                collect_free_type_vars(t, vars);
            }
        }
        Type::List(t) => collect_free_type_vars(t, vars),
        Type::Fun(ft) => {
            let mut inner = BTreeSet::new();
            for t in &ft.args {
                collect_free_type_vars(t, &mut inner);
            }
            collect_free_type_vars(&ft.res, &mut inner);
            for v in &ft.forall {
                inner.remove(v);
            }
            vars.extend(inner);
        }
        Type::RefinedRecord(rr) => {
            for t in rr.fields.values() {
                collect_free_type_vars(t, vars);
            }
        }
        Type::DictMap(k, v) => {
            collect_free_type_vars(k, vars);
            collect_free_type_vars(v, vars);
        }
        Type::ShapeMap(props) => {
            for p in props {
                collect_free_type_vars(&p.ty, vars);
            }
        }
        Type::Opaque(_, args) | Type::Remote(_, args) => {
            for t in args {
                collect_free_type_vars(t, vars);
            }
        }
        Type::Any
        | Type::None
        | Type::Dynamic
        | Type::Atom
        | Type::AtomLit(_)
        | Type::Number
        | Type::Float
        | Type::Pid
        | Type::Port
        | Type::Reference
        | Type::Binary
        | Type::AnyTuple
        | Type::Nil
        | Type::AnyFun
        | Type::Record(_) => {}
    }
}

// ---------------------------------------------------------------------------
// Record declarations
// ---------------------------------------------------------------------------

/// A declared record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField {
    pub name: String,
    pub ty: Type,
    /// Whether the declaration supplies a default value for this field.
    pub default_present: bool,
}

/// A record declaration: named, ordered fields.
///
/// Under the tuple encoding, a record value is a tuple whose head is the
/// record name as an atom and whose remaining elements are the fields in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDecl {
    pub name: String,
    pub fields: Vec<RecordField>,
}

impl RecordDecl {
    /// Look up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Arity of the tuple encoding: the tag atom plus one element per field.
    pub fn tuple_arity(&self) -> usize {
        self.fields.len() + 1
    }
}

// ---------------------------------------------------------------------------
// Type environment
// ---------------------------------------------------------------------------

/// Maps variable names to their types.
///
/// Environments are value-like: [`Env::with`] is a functional update
/// returning a new environment. Occurrence typing builds one narrowed
/// environment per clause by restricting an inherited environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Env {
    bindings: BTreeMap<String, Type>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Functional update: a new environment with `name` bound to `ty`.
    pub fn with(&self, name: impl Into<String>, ty: Type) -> Env {
        let mut next = self.clone();
        next.bindings.insert(name.into(), ty);
        next
    }

    /// In-place binding. Used when assembling an environment from scratch.
    pub fn bind(&mut self, name: impl Into<String>, ty: Type) {
        self.bindings.insert(name.into(), ty);
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.bindings.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Type)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl FromIterator<(String, Type)> for Env {
    fn from_iter<I: IntoIterator<Item = (String, Type)>>(iter: I) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Display (user-facing Tern type syntax)
// ---------------------------------------------------------------------------

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "term()"),
            Type::None => write!(f, "none()"),
            Type::Dynamic => write!(f, "dynamic()"),
            Type::Atom => write!(f, "atom()"),
            Type::AtomLit(s) => write!(f, "'{s}'"),
            Type::Number => write!(f, "number()"),
            Type::Float => write!(f, "float()"),
            Type::Pid => write!(f, "pid()"),
            Type::Port => write!(f, "port()"),
            Type::Reference => write!(f, "reference()"),
            Type::Binary => write!(f, "binary()"),
            Type::AnyTuple => write!(f, "tuple()"),
            Type::Tuple(tys) => {
                write!(f, "{{")?;
                for (i, t) in tys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "}}")
            }
            Type::Nil => write!(f, "[]"),
            Type::List(t) => write!(f, "[{t}]"),
            Type::AnyFun => write!(f, "fun()"),
            Type::Fun(ft) => {
                write!(f, "fun((")?;
                for (i, t) in ft.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ") -> {})", ft.res)
            }
            Type::Record(id) => write!(f, "#{id}{{}}"),
            Type::RefinedRecord(rr) => {
                write!(f, "#{}{{", rr.rec)?;
                for (i, (name, ty)) in rr.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} :: {ty}")?;
                }
                write!(f, "}}")
            }
            Type::DictMap(k, v) => write!(f, "#{{{k} => {v}}}"),
            Type::ShapeMap(props) => {
                write!(f, "#{{")?;
                for (i, p) in props.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let arrow = if p.required { ":=" } else { "=>" };
                    write!(f, "'{}' {} {}", p.key, arrow, p.ty)?;
                }
                write!(f, "}}")
            }
            Type::Union(tys) => {
                for (i, t) in tys.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
            Type::Opaque(id, args) | Type::Remote(id, args) => {
                write!(f, "{}:{}(", id.module, id.name)?;
                for (i, t) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Type::Var(v) => write!(f, "T{}", v.0),
        }
    }
}
