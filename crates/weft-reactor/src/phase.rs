//! The global processing-phase state machine.

use std::fmt;

/// One stage of the strictly ordered compilation pipeline.
///
/// Phases are global: no source tree enters phase *P+1* before every tree
/// has completed phase *P* and every inference action scheduled during *P*
/// has fired or permanently failed. Skipping a phase is not possible.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Phase {
    /// Declared skeletons are materialized; no cross-source information yet.
    SourcePreLinkage,
    /// Imports/includes are resolved to other source trees.
    SourceLinkage,
    /// Extension statements become visible as statement kinds.
    StatementDefinition,
    /// Every declared substatement exists; declared trees freeze at the end.
    FullDeclaration,
    /// uses/augment/deviate/feature gating applied; effective model built.
    EffectiveModel,
}

/// All phases, in execution order.
pub const PHASES: [Phase; 5] = [
    Phase::SourcePreLinkage,
    Phase::SourceLinkage,
    Phase::StatementDefinition,
    Phase::FullDeclaration,
    Phase::EffectiveModel,
];

impl Phase {
    /// Position in the pipeline, usable as an array index.
    #[inline]
    pub fn execution_order(self) -> usize {
        self as usize
    }

    /// The phase that must complete before this one starts.
    pub fn prior(self) -> Option<Phase> {
        match self {
            Phase::SourcePreLinkage => None,
            Phase::SourceLinkage => Some(Phase::SourcePreLinkage),
            Phase::StatementDefinition => Some(Phase::SourceLinkage),
            Phase::FullDeclaration => Some(Phase::StatementDefinition),
            Phase::EffectiveModel => Some(Phase::FullDeclaration),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::SourcePreLinkage => "source-pre-linkage",
            Phase::SourceLinkage => "source-linkage",
            Phase::StatementDefinition => "statement-definition",
            Phase::FullDeclaration => "full-declaration",
            Phase::EffectiveModel => "effective-model",
        })
    }
}

/// Outcome of one attempt to advance a source through the current phase.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PhaseProgress {
    /// Nothing moved; the source is blocked on external progress.
    NoProgress,
    /// Something moved but the phase is not complete for this source.
    Progress,
    /// The source has completed the phase.
    Finished,
}
