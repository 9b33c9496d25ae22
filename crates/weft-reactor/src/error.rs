//! Error taxonomy of the reactor.
//!
//! Almost every condition here is fatal to the whole compilation: the
//! language's cross-reference density means a local error's blast radius
//! cannot be safely bounded, so the reactor fails fast instead of producing
//! partial results. The few tolerated inconsistencies (deviate-delete of a
//! missing statement, duplicate implicit module registration) are logged,
//! never raised.

use weft_model::SourceRef;

use crate::phase::Phase;

/// Terminal failure of a compilation. Each variant names the statement(s)
/// and source position(s) needed to locate the authoring mistake.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReactorError {
    /// An inference action's required phase was never reached by its target:
    /// either a dependency deadlock or fallout of an upstream failure.
    #[error(
        "compilation deadlocked during {phase} phase; blocked prerequisites:\n  {}",
        blocked.join("\n  ")
    )]
    UnsatisfiedPrerequisites {
        phase: Phase,
        /// One rendered line per blocked prerequisite.
        blocked: Vec<String>,
    },

    /// An import/augment/deviate target, uses-grouping or similar reference
    /// is not visible in any applicable namespace.
    #[error("unresolvable reference `{reference}`, declared at {at}")]
    UnresolvableReference { reference: String, at: SourceRef },

    /// A substatement combination, count or nesting not permitted for the
    /// statement's kind.
    #[error(
        "`{statement}` at {at}: substatement `{offending}` not allowed here (allowed: {allowed})"
    )]
    GrammarViolation {
        statement: String,
        offending: String,
        allowed: String,
        at: SourceRef,
    },

    /// Duplicate or mutually incompatible declarations.
    #[error("{message}: first declared at {first}, conflicting declaration at {second}")]
    SemanticConflict {
        message: String,
        first: SourceRef,
        second: SourceRef,
    },

    /// A statement argument failed its kind's parse.
    #[error("invalid argument for `{keyword}` at {at}: {message}")]
    InvalidArgument {
        keyword: String,
        message: String,
        at: SourceRef,
    },

    /// An inference action failed while being applied (deviate validity,
    /// duplicate singleton, and the like).
    #[error("{message}, at {at}")]
    Inference { message: String, at: SourceRef },

    /// No candidate revision satisfies a semantic-version import constraint.
    #[error(
        "module `{importing}` at {at} imports `{import}` with semantic version {requested}; \
         candidates considered: {}",
        considered.join(", ")
    )]
    IncompatibleImport {
        import: String,
        importing: String,
        requested: String,
        considered: Vec<String>,
        at: SourceRef,
    },

    /// The module dependency graph is cyclic.
    #[error("module imports form a cycle among: {}", modules.join(", "))]
    ImportCycle { modules: Vec<String> },
}

pub type Result<T> = std::result::Result<T, ReactorError>;
