//! Pluggable per-statement-kind behavior.
//!
//! A `StatementSupport` implements everything the reactor does not know
//! about a statement kind: argument parsing, substatement cardinality,
//! namespace registrations and inference-action setup, expressed as phase
//! callbacks. Supports are registered in per-phase bundles: a keyword is
//! only recognizable once the phase carrying its bundle has been reached,
//! which is how extension-defined grammar becomes visible no earlier than
//! the statement-definition phase.

use std::collections::HashMap;
use std::sync::Arc;

use weft_model::StatementDefinition;

use crate::build::BuildContext;
use crate::context::{ArgValue, CtxId};
use crate::error::{ReactorError, Result};
use crate::phase::Phase;

mod augment;
mod core;
mod deviation;
mod extension;
mod feature;
mod grouping;
mod schema;

pub use deviation::deviate_validity;
pub(crate) use self::core::latest_revision;

/// Occurrence bounds for one substatement kind within a parent kind.
#[derive(Clone, Copy, Debug)]
pub struct SubstatementRule {
    pub keyword: &'static str,
    pub min: u32,
    pub max: u32,
}

impl SubstatementRule {
    pub const fn exactly_one(keyword: &'static str) -> Self {
        Self {
            keyword,
            min: 1,
            max: 1,
        }
    }

    pub const fn at_most_one(keyword: &'static str) -> Self {
        Self {
            keyword,
            min: 0,
            max: 1,
        }
    }

    pub const fn any(keyword: &'static str) -> Self {
        Self {
            keyword,
            min: 0,
            max: u32::MAX,
        }
    }
}

/// Behavior of one statement kind. All callbacks default to no-ops; a
/// support overrides the phases it cares about.
pub trait StatementSupport {
    /// The static descriptor this support produces statements for.
    fn definition(&self) -> StatementDefinition;

    /// Parse the raw argument into its typed value. The default keeps the
    /// raw string; kinds with structured arguments override.
    fn parse_argument(
        &self,
        _build: &mut BuildContext,
        raw: &str,
        _ctx: CtxId,
    ) -> Result<ArgValue> {
        Ok(ArgValue::Str(Arc::from(raw)))
    }

    /// Substatement cardinality table, checked when the parent completes
    /// full declaration. `None` skips the check entirely. Statement kinds
    /// not listed in the table are rejected, except extension-instantiated
    /// ones, which are always tolerated.
    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        None
    }

    fn on_pre_linkage_declared(&self, _build: &mut BuildContext, _ctx: CtxId) -> Result<()> {
        Ok(())
    }

    fn on_linkage_declared(&self, _build: &mut BuildContext, _ctx: CtxId) -> Result<()> {
        Ok(())
    }

    fn on_statement_definition_declared(
        &self,
        _build: &mut BuildContext,
        _ctx: CtxId,
    ) -> Result<()> {
        Ok(())
    }

    fn on_full_definition_declared(&self, _build: &mut BuildContext, _ctx: CtxId) -> Result<()> {
        Ok(())
    }

    /// Invoked on every statement of a freshly copied subtree so that
    /// tree-scoped namespace bindings can be re-established against the
    /// copy's new surroundings.
    fn on_added_by_copy(&self, _build: &mut BuildContext, _ctx: CtxId) -> Result<()> {
        Ok(())
    }

    /// Supports returning `true` keep their statements in the effective
    /// tree even under a disabled `if-feature` on a sibling position.
    fn is_ignoring_if_feature(&self) -> bool {
        false
    }
}

/// Run the support callback matching `phase`.
pub(crate) fn run_phase_callback(
    support: &Arc<dyn StatementSupport>,
    build: &mut BuildContext,
    ctx: CtxId,
    phase: Phase,
) -> Result<()> {
    match phase {
        Phase::SourcePreLinkage => support.on_pre_linkage_declared(build, ctx),
        Phase::SourceLinkage => support.on_linkage_declared(build, ctx),
        Phase::StatementDefinition => support.on_statement_definition_declared(build, ctx),
        Phase::FullDeclaration => support.on_full_definition_declared(build, ctx),
        Phase::EffectiveModel => Ok(()),
    }
}

/// Check a statement's declared substatements against its kind's
/// cardinality table.
pub(crate) fn validate_substatements(build: &BuildContext, ctx: CtxId) -> Result<()> {
    let Some(def) = build.arena.get(ctx).def() else {
        return Ok(());
    };
    let Some(rules) = build.support(def).substatement_rules() else {
        return Ok(());
    };

    let mut counts: HashMap<&str, u32> = HashMap::new();
    for child in build.arena.get(ctx).declared_children() {
        let child_ctx = build.arena.get(*child);
        if child_ctx.keyword().contains(':') {
            // Extension-instantiated substatements are always tolerated.
            continue;
        }
        *counts.entry(child_ctx.keyword()).or_insert(0) += 1;
    }

    let allowed = || {
        rules
            .iter()
            .map(|r| r.keyword)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let statement = build.arena.get(ctx).keyword().to_owned();
    let at = build.arena.get(ctx).source_ref().clone();

    for (keyword, count) in &counts {
        match rules.iter().find(|r| r.keyword == *keyword) {
            None => {
                return Err(ReactorError::GrammarViolation {
                    statement: statement.clone(),
                    offending: (*keyword).to_owned(),
                    allowed: allowed(),
                    at: at.clone(),
                });
            }
            Some(rule) if *count > rule.max => {
                return Err(ReactorError::GrammarViolation {
                    statement: statement.clone(),
                    offending: format!(
                        "{keyword} (declared {count} times, at most {} allowed)",
                        rule.max
                    ),
                    allowed: allowed(),
                    at: at.clone(),
                });
            }
            Some(_) => {}
        }
    }
    for rule in rules {
        if rule.min > 0 && counts.get(rule.keyword).copied().unwrap_or(0) < rule.min {
            return Err(ReactorError::GrammarViolation {
                statement: statement.clone(),
                offending: format!("missing required substatement `{}`", rule.keyword),
                allowed: allowed(),
                at: at.clone(),
            });
        }
    }
    Ok(())
}

/// Keyword → behavior tables, one bundle per phase. Built once per reactor
/// and immutable for the compilation's duration.
pub struct SupportRegistry {
    bundles: [HashMap<&'static str, Arc<dyn StatementSupport>>; 5],
    /// Behavior shared by all extension-instantiated statements.
    unknown: Arc<dyn StatementSupport>,
}

impl SupportRegistry {
    pub fn builder() -> SupportRegistryBuilder {
        SupportRegistryBuilder {
            bundles: Default::default(),
        }
    }

    /// Registry carrying every built-in statement kind.
    pub fn with_builtin_statements() -> Self {
        let mut builder = Self::builder();
        core::register(&mut builder);
        schema::register(&mut builder);
        grouping::register(&mut builder);
        augment::register(&mut builder);
        deviation::register(&mut builder);
        feature::register(&mut builder);
        extension::register(&mut builder);
        builder.build()
    }

    /// Look up a core keyword, honoring bundle visibility: only bundles of
    /// phases up to and including `phase` are consulted.
    pub fn lookup(&self, keyword: &str, phase: Phase) -> Option<Arc<dyn StatementSupport>> {
        self.bundles[..=phase.execution_order()]
            .iter()
            .find_map(|bundle| bundle.get(keyword).map(Arc::clone))
    }

    pub(crate) fn unknown_support(&self) -> Arc<dyn StatementSupport> {
        Arc::clone(&self.unknown)
    }
}

/// Builder for [`SupportRegistry`].
pub struct SupportRegistryBuilder {
    bundles: [HashMap<&'static str, Arc<dyn StatementSupport>>; 5],
}

impl SupportRegistryBuilder {
    /// Register a support in the bundle of `phase`. A keyword may only be
    /// registered once across all bundles.
    pub fn add(
        &mut self,
        phase: Phase,
        keyword: &'static str,
        support: Arc<dyn StatementSupport>,
    ) -> &mut Self {
        let previous = self.bundles[phase.execution_order()].insert(keyword, support);
        assert!(
            previous.is_none(),
            "statement support for `{keyword}` registered twice"
        );
        self
    }

    pub fn build(self) -> SupportRegistry {
        SupportRegistry {
            bundles: self.bundles,
            unknown: Arc::new(extension::UnknownSupport),
        }
    }
}
