//! Error reporting and diagnostics for Tern.
//!
//! This crate provides structured diagnostics with stable codes. The
//! checking engines themselves never fail; diagnostics originate from
//! declaration registration (duplicate records, malformed aliases) and are
//! rendered elsewhere for display.

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A type or record name is declared more than once.
    DuplicateType,
    /// A record field is declared more than once.
    DuplicateField,
    /// A type alias refers back to itself without passing through a
    /// constructor.
    UnguardedAliasCycle,
    /// A parameterized type was declared or referenced with the wrong
    /// number of arguments.
    ArityMismatch,
    /// An alias body mentions a type variable that is not a formal
    /// parameter.
    UnboundTypeParam,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::DuplicateType,
        Category::DuplicateField,
        Category::UnguardedAliasCycle,
        Category::ArityMismatch,
        Category::UnboundTypeParam,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::DuplicateType => "duplicate_type",
            Category::DuplicateField => "duplicate_field",
            Category::UnguardedAliasCycle => "unguarded_alias_cycle",
            Category::ArityMismatch => "arity_mismatch",
            Category::UnboundTypeParam => "unbound_type_param",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::DuplicateType => "T0001",
            Category::DuplicateField => "T0002",
            Category::UnguardedAliasCycle => "T0003",
            Category::ArityMismatch => "T0004",
            Category::UnboundTypeParam => "T0005",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::DuplicateType => "A type or record name is already defined.",
            Category::DuplicateField => "A record field is declared more than once.",
            Category::UnguardedAliasCycle => {
                "A recursive type alias never passes through a constructor."
            }
            Category::ArityMismatch => {
                "A parameterized type has the wrong number of arguments."
            }
            Category::UnboundTypeParam => {
                "An alias body uses a type variable that is not a declared parameter."
            }
        }
    }

    pub fn example_fix(self) -> &'static str {
        match self {
            Category::DuplicateType => "Rename one of the definitions or delete the duplicate.",
            Category::DuplicateField => "Remove or rename the duplicated field.",
            Category::UnguardedAliasCycle => {
                "Wrap the recursive reference in a tuple, list, or other constructor."
            }
            Category::ArityMismatch => "Apply the type with its declared parameter count.",
            Category::UnboundTypeParam => "Declare the variable as a parameter of the alias.",
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. T0001).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Error,
            category,
            message: message.into(),
            help: None,
        }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Warning,
            category,
            message: message.into(),
            help: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }
}
