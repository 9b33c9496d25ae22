//! The compilation driver: sources in, effective model out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use weft_model::{EffectiveModel, EffectiveStatement, QNameModule, Skeleton, SourceId};

use crate::action::{fail_pending, run_modifiers};
use crate::build::BuildContext;
use crate::error::{ReactorError, Result};
use crate::linkage::resolve_order;
use crate::phase::{Phase, PhaseProgress, PHASES};
use crate::source::SourceContext;
use crate::support::SupportRegistry;

/// Configures and runs one compilation.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use weft_model::{Skeleton, SourceRef};
/// # use weft_reactor::Reactor;
/// # fn skeleton() -> Arc<Skeleton> { unimplemented!() }
/// let model = Reactor::builder()
///     .add_source(skeleton())
///     .build()?;
/// # Ok::<(), weft_reactor::ReactorError>(())
/// ```
pub struct Reactor;

impl Reactor {
    pub fn builder() -> ReactorBuilder {
        ReactorBuilder {
            registry: None,
            sources: Vec::new(),
            features: None,
            permitted_deviations: None,
        }
    }
}

pub struct ReactorBuilder {
    /// Custom statement-support registry; defaults to the built-in set.
    registry: Option<Arc<SupportRegistry>>,
    sources: Vec<Arc<Skeleton>>,
    features: Option<HashSet<(String, String)>>,
    permitted_deviations: Option<HashMap<String, HashSet<String>>>,
}

impl ReactorBuilder {
    /// Add one parsed source tree. Supply order is the tie-break for every
    /// order-sensitive decision, so it is part of the observable contract.
    pub fn add_source(mut self, skeleton: Arc<Skeleton>) -> Self {
        self.sources.push(skeleton);
        self
    }

    /// Replace the built-in statement supports.
    pub fn with_registry(mut self, registry: Arc<SupportRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Restrict `if-feature` gating to the given `(module, feature)` pairs.
    /// Without this call every feature is considered supported.
    pub fn with_supported_features(
        mut self,
        features: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.features = Some(features.into_iter().collect());
        self
    }

    /// Restrict which modules may deviate which target modules. Without
    /// this call deviations are unrestricted.
    pub fn with_permitted_deviations(
        mut self,
        permitted: impl IntoIterator<Item = (String, HashSet<String>)>,
    ) -> Self {
        self.permitted_deviations = Some(permitted.into_iter().collect());
        self
    }

    /// Drive every source through the phase sequence and materialize the
    /// effective model.
    pub fn build(self) -> Result<EffectiveModel> {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(SupportRegistry::with_builtin_statements()));
        let mut build = BuildContext::new(registry, self.features, self.permitted_deviations);

        let mut sources = Vec::with_capacity(self.sources.len());
        for (index, skeleton) in self.sources.iter().enumerate() {
            let source = SourceId(index as u32);
            let root = build.arena.materialize(skeleton, None, source);
            sources.push(SourceContext::new(source, root));
        }

        let roots: Vec<_> = sources.iter().map(|s| s.root()).collect();
        let order = resolve_order(&build, &roots)?;
        tracing::debug!(count = sources.len(), "module dependency order resolved");

        for phase in PHASES {
            run_phase(&mut build, &mut sources, &order, phase)?;
            tracing::debug!(%phase, "phase complete");
        }

        let keywords: Vec<Arc<str>> = (0..build.def_count())
            .map(|index| build.keyword_arc(weft_model::DefId(index as u32)))
            .collect();
        let keyword_of = move |def: weft_model::DefId| Arc::clone(&keywords[def.index()]);

        let mut modules: IndexMap<QNameModule, Arc<EffectiveStatement>> = IndexMap::new();
        for source in &sources {
            let root = source.root();
            // Submodules share their owner's identity; only module roots
            // appear in the model.
            if build.arena.get(root).keyword() != "module" {
                continue;
            }
            let Some(identity) = build.module_identity(root) else {
                continue;
            };
            if let Some(effective) = build.arena.build_effective(root, &keyword_of) {
                modules.insert(identity, effective);
            }
        }
        Ok(EffectiveModel::new(modules, build.interner))
    }
}

/// Drive one phase to global completion: sources are polled in dependency
/// order, with the modifier fixed-point loop interleaved, until all finish
/// or nothing can move.
fn run_phase(
    build: &mut BuildContext,
    sources: &mut [SourceContext],
    order: &[usize],
    phase: Phase,
) -> Result<()> {
    // Actions carried over from earlier phases (path walks in particular)
    // must advance and hook their write intents before the first completion
    // sweep, or the sweep would close targets no intent protects yet.
    run_modifiers(build, phase)?;
    loop {
        let mut progressed = false;
        let mut finished = 0;
        for &index in order {
            match sources[index].try_complete_phase(build, phase)? {
                PhaseProgress::Finished => finished += 1,
                PhaseProgress::Progress => progressed = true,
                PhaseProgress::NoProgress => {}
            }
        }
        if run_modifiers(build, phase)? {
            progressed = true;
        }
        if finished == sources.len() {
            // Late modifiers may still be pending when every tree
            // closed; that is a bug in a statement support.
            let leftover = fail_pending(build, phase)?;
            if !leftover.is_empty() {
                return Err(ReactorError::UnsatisfiedPrerequisites {
                    phase,
                    blocked: leftover,
                });
            }
            return Ok(());
        }
        if !progressed {
            let mut blocked = fail_pending(build, phase)?;
            if blocked.is_empty() {
                for source in sources.iter() {
                    let root = build.arena.get(source.root());
                    if !root.is_phase_complete(phase) {
                        blocked.push(format!(
                            "`{}` at {} cannot finish {phase}",
                            root.keyword(),
                            root.source_ref()
                        ));
                    }
                }
            }
            return Err(ReactorError::UnsatisfiedPrerequisites { phase, blocked });
        }
    }
}
