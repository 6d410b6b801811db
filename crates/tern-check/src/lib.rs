//! Subtyping and occurrence typing for Tern.
//!
//! This crate implements the type-checking core:
//! - A decision procedure for subtyping over the full type algebra,
//!   terminating on recursive aliases through a per-query memo set
//! - Occurrence typing: one narrowed environment per clause of `if`,
//!   `case`, and multi-clause function heads
//! - The read-only registry the engines consult for record declarations
//!   and alias bodies
//!
//! Data flows strictly downward: occurrence typing consumes subtyping,
//! which consumes the registry. The engines never fail; malformed
//! declarations are rejected with diagnostics at registration time.

pub mod narrow;
pub mod subtype;
pub mod trace;

use std::collections::{BTreeMap, BTreeSet};

use tern_types::{RecordDecl, RemoteId, Type, TypeVarId, free_type_vars, subst};

// Re-export for convenience.
pub use narrow::Narrower;
pub use subtype::SubtypeChecker;
pub use tern_diag::{Category, Diagnostic, DiagnosticError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Checker configuration, passed explicitly to engine constructors.
///
/// `gradual_typing` is the checker's mode: it admits the gradual-only
/// subtyping rules and activates clause refinement. `unlimited_refinement`
/// lifts the clause-count cap on occurrence typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckConfig {
    pub gradual_typing: bool,
    pub unlimited_refinement: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            gradual_typing: true,
            unlimited_refinement: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A registered type alias: formal parameters and a body mentioning them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub params: Vec<TypeVarId>,
    pub body: Type,
}

/// Read-only registry of record and named-type declarations.
///
/// The engines only ever read from it; registration validates declarations
/// up front so lookups during checking cannot misbehave. Missing entries
/// degrade checking (a record-involved subtype check answers `false`, a
/// path update leaves its input unchanged) rather than failing.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    records: BTreeMap<(String, String), RecordDecl>,
    aliases: BTreeMap<RemoteId, TypeDecl>,
    opaques: BTreeSet<RemoteId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record declaration for `module`.
    pub fn register_record(&mut self, module: &str, decl: RecordDecl) -> Result<(), Diagnostic> {
        let key = (module.to_string(), decl.name.clone());
        if self.records.contains_key(&key) {
            return Err(Diagnostic::error(
                Category::DuplicateType,
                format!("record `{}:{}` is already defined", module, decl.name),
            ));
        }

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for field in &decl.fields {
            if !seen.insert(&field.name) {
                return Err(Diagnostic::error(
                    Category::DuplicateField,
                    format!(
                        "duplicate field `{}` in record `{}:{}`",
                        field.name, module, decl.name,
                    ),
                ));
            }
        }

        self.records.insert(key, decl);
        Ok(())
    }

    /// Register a type alias.
    ///
    /// Guarded recursion (the alias reappearing under a constructor in its
    /// own body) is legal; a cycle that only passes through alias references
    /// and union membership is rejected, because expanding such an alias
    /// could never make progress.
    pub fn register_alias(
        &mut self,
        id: RemoteId,
        params: Vec<TypeVarId>,
        body: Type,
    ) -> Result<(), Diagnostic> {
        if params.len() != id.arity {
            return Err(Diagnostic::error(
                Category::ArityMismatch,
                format!(
                    "type `{id}` declares {} parameter(s) but its id has arity {}",
                    params.len(),
                    id.arity,
                ),
            ));
        }
        if self.aliases.contains_key(&id) || self.opaques.contains(&id) {
            return Err(Diagnostic::error(
                Category::DuplicateType,
                format!("type `{id}` is already defined"),
            ));
        }

        let declared: BTreeSet<TypeVarId> = params.iter().copied().collect();
        let undeclared = free_type_vars(&body)
            .difference(&declared)
            .next()
            .copied();
        if let Some(free) = undeclared {
            return Err(Diagnostic::error(
                Category::UnboundTypeParam,
                format!("type `{id}` uses undeclared type variable T{}", free.0),
            ));
        }

        self.aliases.insert(id.clone(), TypeDecl { params, body });
        if self.has_unguarded_cycle() {
            self.aliases.remove(&id);
            return Err(Diagnostic::error(
                Category::UnguardedAliasCycle,
                format!("type `{id}` is recursive without passing through a constructor"),
            )
            .with_help("wrap the recursive reference in a tuple, list, or map"));
        }

        Ok(())
    }

    /// Register an opaque type id. The body stays with its owning module;
    /// the engines treat opaque types nominally.
    pub fn register_opaque(&mut self, id: RemoteId) -> Result<(), Diagnostic> {
        if self.aliases.contains_key(&id) || self.opaques.contains(&id) {
            return Err(Diagnostic::error(
                Category::DuplicateType,
                format!("type `{id}` is already defined"),
            ));
        }
        self.opaques.insert(id);
        Ok(())
    }

    /// Look up a record declaration.
    pub fn record(&self, module: &str, name: &str) -> Option<&RecordDecl> {
        self.records.get(&(module.to_string(), name.to_string()))
    }

    /// The body of alias `id` with `args` substituted for its formal
    /// parameters. `None` when the alias is unknown or applied at the wrong
    /// arity.
    pub fn type_decl_body(&self, id: &RemoteId, args: &[Type]) -> Option<Type> {
        let decl = self.aliases.get(id)?;
        if args.len() != decl.params.len() {
            return None;
        }
        let map: BTreeMap<TypeVarId, Type> = decl
            .params
            .iter()
            .copied()
            .zip(args.iter().cloned())
            .collect();
        Some(subst(&decl.body, &map))
    }

    /// Whether any registered alias reaches itself through alias references
    /// and union membership alone.
    fn has_unguarded_cycle(&self) -> bool {
        self.aliases.keys().any(|id| self.unguarded_cycle_from(id))
    }

    fn unguarded_cycle_from(&self, start: &RemoteId) -> bool {
        let mut visited: BTreeSet<&RemoteId> = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(decl) = self.aliases.get(id) else {
                continue;
            };
            let mut refs = Vec::new();
            unguarded_refs(&decl.body, &mut refs);
            for next in refs {
                if next == start {
                    return true;
                }
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        false
    }
}

/// Alias references reachable without crossing a constructor: the type
/// itself, or members of unions, transitively.
fn unguarded_refs<'t>(ty: &'t Type, out: &mut Vec<&'t RemoteId>) {
    match ty {
        Type::Remote(id, _) => out.push(id),
        Type::Union(tys) => {
            for t in tys {
                unguarded_refs(t, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod narrow_tests;
