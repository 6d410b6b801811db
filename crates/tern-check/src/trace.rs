//! Tracing types for checker observability.
//!
//! These types capture step-by-step traces of subtyping decisions, so tools
//! can expose why the checker accepted or rejected an inclusion. All tracing
//! is opt-in via `SubtypeChecker::enable_tracing()` — zero overhead when
//! disabled.

use serde::Serialize;

/// A single step in a subtyping trace.
#[derive(Debug, Clone, Serialize)]
pub struct SubtypeStep {
    pub step: usize,
    pub rule: SubtypeRule,
    pub left: String,
    pub right: String,
    pub detail: String,
}

/// Which subtyping rule fired at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtypeRule {
    /// The pair is already assumed in the memo set (recursive alias).
    Assumed,
    /// Structural equality — no further work.
    Equal,
    /// Right side is the top type.
    Top,
    /// Left side is the bottom type.
    Bottom,
    /// Either side is `dynamic()`.
    Dynamic,
    /// A named alias was expanded from the registry.
    AliasExpand,
    /// Union decomposition on the left (for-all) or right (exists).
    Union,
    /// A union-typed tuple element was distributed outward.
    TupleDistribution,
    /// A record was compared through its tagged-tuple encoding.
    RecordAsTuple,
    /// A gradual-mode-only inclusion was admitted.
    Gradual,
    /// Componentwise structural recursion (tuples, lists, funs, maps).
    Decompose,
    /// No rule applies — the inclusion does not hold.
    NoRule,
}
