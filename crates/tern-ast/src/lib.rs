//! AST surface consumed by the Tern type-checking core.
//!
//! The loader and elaborator produce these values; the checker only reads
//! them. Patterns and guard tests are what occurrence typing dissects, so
//! they are modeled precisely; expression forms beyond what clause
//! scrutinees need are deliberately coarse.

use std::fmt;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// A clause-head or match pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Pat {
    Wildcard,
    /// A pattern variable. Binds when the name is free, tests equality when
    /// the name is already bound in the environment.
    Var(String),
    Atom(String),
    Int(i64),
    Float(f64),
    String(String),
    Nil,
    Cons(Box<Pat>, Box<Pat>),
    Tuple(Vec<Pat>),
    Record(RecordPat),
    /// `P1 = P2`: both sides match the same value.
    Match(Box<Pat>, Box<Pat>),
}

impl Pat {
    pub fn var(name: impl Into<String>) -> Pat {
        Pat::Var(name.into())
    }

    pub fn atom(name: impl Into<String>) -> Pat {
        Pat::Atom(name.into())
    }
}

/// A record pattern `#name{f1 = P1, ..., _ = P}`.
///
/// `generic` is the generic field pattern: when present, every declared
/// field not listed in `fields` matches against it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPat {
    pub name: String,
    pub fields: Vec<RecordFieldPat>,
    pub generic: Option<Box<Pat>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordFieldPat {
    pub name: String,
    pub pat: Pat,
}

/// Append every variable occurrence in `pat` to `out`, duplicates included,
/// in left-to-right order. Wildcards do not count.
pub fn pat_vars(pat: &Pat, out: &mut Vec<String>) {
    match pat {
        Pat::Var(v) => out.push(v.clone()),
        Pat::Cons(head, tail) => {
            pat_vars(head, out);
            pat_vars(tail, out);
        }
        Pat::Tuple(pats) => {
            for p in pats {
                pat_vars(p, out);
            }
        }
        Pat::Record(rp) => {
            for f in &rp.fields {
                pat_vars(&f.pat, out);
            }
            if let Some(generic) = &rp.generic {
                pat_vars(generic, out);
            }
        }
        Pat::Match(p1, p2) => {
            pat_vars(p1, out);
            pat_vars(p2, out);
        }
        Pat::Wildcard
        | Pat::Atom(_)
        | Pat::Int(_)
        | Pat::Float(_)
        | Pat::String(_)
        | Pat::Nil => {}
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// One guard: a conjunction of tests. A clause carries a *sequence* of
/// guards which is disjunctive (`G1; G2` reads "G1 or G2").
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    pub tests: Vec<Test>,
}

impl Guard {
    pub fn new(tests: Vec<Test>) -> Self {
        Self { tests }
    }
}

/// A guard test expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    Var(String),
    Atom(String),
    Int(i64),
    /// A guard BIF call such as `is_atom(X)` or `is_record(X, r, 3)`.
    Call { name: String, args: Vec<Test> },
    BinOp {
        op: BinOp,
        left: Box<Test>,
        right: Box<Test>,
    },
    UnOp { op: UnOp, arg: Box<Test> },
}

impl Test {
    pub fn var(name: impl Into<String>) -> Test {
        Test::Var(name.into())
    }

    pub fn atom(name: impl Into<String>) -> Test {
        Test::Atom(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Test>) -> Test {
        Test::Call {
            name: name.into(),
            args,
        }
    }

    pub fn bin_op(op: BinOp, left: Test, right: Test) -> Test {
        Test::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn un_op(op: UnOp, arg: Test) -> Test {
        Test::UnOp {
            op,
            arg: Box::new(arg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `==`
    Eq,
    /// `/=`
    NotEq,
    /// `=:=`
    ExactEq,
    /// `=/=`
    ExactNotEq,
    Lt,
    Gt,
    And,
    AndAlso,
    Or,
    OrElse,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::NotEq => "/=",
            BinOp::ExactEq => "=:=",
            BinOp::ExactNotEq => "=/=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::And => "and",
            BinOp::AndAlso => "andalso",
            BinOp::Or => "or",
            BinOp::OrElse => "orelse",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    /// Arithmetic negation; carries no refinement information.
    Neg,
}

// ---------------------------------------------------------------------------
// Expressions and clauses
// ---------------------------------------------------------------------------

/// Expression forms. Only scrutinee shapes matter to the checker core;
/// everything else is carried opaquely for the elaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Var(String),
    Atom(String),
    Int(i64),
    Float(f64),
    String(String),
    Nil,
    Cons(Box<Expr>, Box<Expr>),
    Tuple(Vec<Expr>),
    /// `P = E`.
    Match(Box<Pat>, Box<Expr>),
    Call { name: String, args: Vec<Expr> },
    Case(Box<CaseExpr>),
    If(Box<IfExpr>),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    pub fn atom(name: impl Into<String>) -> Expr {
        Expr::Atom(name.into())
    }
}

/// One clause of a `case`, `if`, or function definition.
///
/// `if` clauses have no patterns; function clauses have one pattern per
/// argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub pats: Vec<Pat>,
    pub guards: Vec<Guard>,
    pub body: Vec<Expr>,
}

impl Clause {
    pub fn new(pats: Vec<Pat>, guards: Vec<Guard>, body: Vec<Expr>) -> Self {
        Self { pats, guards, body }
    }

    /// All pattern variable occurrences across this clause's patterns,
    /// duplicates included.
    pub fn pat_var_occurrences(&self) -> Vec<String> {
        let mut out = Vec::new();
        for pat in &self.pats {
            pat_vars(pat, &mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    pub expr: Expr,
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfExpr {
    pub clauses: Vec<Clause>,
}
