//! Per-source phase driving: keyword resolution, callback dispatch and
//! completion sweeps over one declared tree.

use std::sync::Arc;

use weft_model::{ArgumentSpec, DefId, SourceId, StatementDefinition};

use crate::build::BuildContext;
use crate::context::{ArgValue, CtxId};
use crate::error::{ReactorError, Result};
use crate::namespace::{NsKey, EXTENSION};
use crate::phase::{Phase, PhaseProgress};
use crate::support::{run_phase_callback, validate_substatements};

/// One source module's tree, tracked through the phase sequence. The
/// reactor repeatedly asks each source to advance the current phase until
/// every source reports [`PhaseProgress::Finished`].
pub(crate) struct SourceContext {
    source: SourceId,
    root: CtxId,
}

impl SourceContext {
    pub(crate) fn new(source: SourceId, root: CtxId) -> Self {
        Self { source, root }
    }

    pub(crate) fn source(&self) -> SourceId {
        self.source
    }

    pub(crate) fn root(&self) -> CtxId {
        self.root
    }

    /// Advance this source through `phase` as far as current global state
    /// allows: resolve newly resolvable keywords, run outstanding phase
    /// callbacks, then try to complete the phase bottom-up.
    pub(crate) fn try_complete_phase(
        &mut self,
        build: &mut BuildContext,
        phase: Phase,
    ) -> Result<PhaseProgress> {
        if build.arena.get(self.root).is_phase_complete(phase) {
            return Ok(PhaseProgress::Finished);
        }

        let mut progress = self.run_callbacks(build, phase)?;
        if self.complete_rec(build, self.root, phase)? {
            progress = true;
        }

        if build.arena.get(self.root).is_phase_complete(phase) {
            Ok(PhaseProgress::Finished)
        } else if progress {
            Ok(PhaseProgress::Progress)
        } else {
            Ok(PhaseProgress::NoProgress)
        }
    }

    /// Pre-order sweep resolving keywords and firing the phase callback on
    /// every statement that has not seen it yet.
    fn run_callbacks(&self, build: &mut BuildContext, phase: Phase) -> Result<bool> {
        let mut progress = false;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if build.arena.get(id).def().is_none() {
                if let Some(def) = resolve_keyword(build, id, phase)? {
                    let support = build.support(def);
                    let raw = build.arena.get(id).raw_argument_arc().cloned();
                    let argument = if build.def(def).takes_argument() {
                        match raw {
                            Some(raw) => Some(support.parse_argument(build, &raw, id)?),
                            None => {
                                return Err(ReactorError::InvalidArgument {
                                    keyword: build.arena.get(id).keyword().to_owned(),
                                    message: "missing argument".to_owned(),
                                    at: build.arena.get(id).source_ref().clone(),
                                });
                            }
                        }
                    } else {
                        raw.map(ArgValue::Str)
                    };
                    let ctx = build.arena.get_mut(id);
                    ctx.set_def(def);
                    ctx.set_argument(argument);
                    progress = true;
                }
            }
            if let Some(def) = build.arena.get(id).def() {
                if !build.arena.get(id).callback_ran(phase) {
                    let support = build.support(def);
                    build.arena.get_mut(id).mark_callback_ran(phase);
                    run_phase_callback(&support, build, id, phase)?;
                    progress = true;
                }
            }
            let children: Vec<CtxId> = build.arena.get(id).effective_children().collect();
            stack.extend(children);
        }
        Ok(progress)
    }

    /// Post-order completion: a statement completes `phase` once all its
    /// substatements have, its callback (if its keyword is resolved) has
    /// run, and no write intent for `phase` is still open against it.
    fn complete_rec(&self, build: &mut BuildContext, id: CtxId, phase: Phase) -> Result<bool> {
        if build.arena.get(id).is_phase_complete(phase) {
            return Ok(false);
        }
        let mut progress = false;
        let children: Vec<CtxId> = build.arena.get(id).effective_children().collect();
        let mut all_children_done = true;
        for child in children {
            if self.complete_rec(build, child, phase)? {
                progress = true;
            }
            if !build.arena.get(child).is_phase_complete(phase) {
                all_children_done = false;
            }
        }
        if !all_children_done {
            return Ok(progress);
        }

        let ctx = build.arena.get(id);
        let resolved = ctx.def().is_some();
        if resolved && !ctx.callback_ran(phase) {
            return Ok(progress);
        }
        if !resolved && phase >= Phase::FullDeclaration {
            // Every keyword must be resolvable by the end of full
            // declaration; what is left is an unknown statement.
            return Err(ReactorError::UnresolvableReference {
                reference: format!("statement keyword `{}`", ctx.keyword()),
                at: ctx.source_ref().clone(),
            });
        }
        if ctx.has_open_mutations(phase) {
            return Ok(progress);
        }
        if phase == Phase::FullDeclaration {
            validate_substatements(build, id)?;
        }
        build.arena.complete_phase(id, phase);
        Ok(true)
    }
}

/// Try to resolve a statement's keyword to an interned definition under the
/// visibility rules of `phase`. `Ok(None)` means "not resolvable yet".
fn resolve_keyword(build: &mut BuildContext, id: CtxId, phase: Phase) -> Result<Option<DefId>> {
    let keyword = Arc::clone(build.arena.get(id).raw_keyword());
    if let Some((prefix, name)) = keyword.split_once(':') {
        // Extension-instantiated statement; resolvable once extension
        // definitions exist.
        if phase < Phase::StatementDefinition {
            return Ok(None);
        }
        let prefix = prefix.to_owned();
        let name = name.to_owned();
        let Some(module) = build.resolve_prefix(id, Some(&prefix)) else {
            return Ok(None);
        };
        let Some(qname) = build.qname_in_module(module, &name) else {
            return Ok(None);
        };
        let Some(extension) = build.ns_get(id, &EXTENSION, &NsKey::QName(qname)) else {
            return Ok(None);
        };
        let argument = build
            .arena
            .find_declared_child(extension, "argument")
            .map(|argument_ctx| {
                let name = build
                    .arena
                    .get(argument_ctx)
                    .raw_argument()
                    .unwrap_or("value")
                    .to_owned();
                let yin_element = build
                    .arena
                    .declared_child_arg(argument_ctx, "yin-element")
                    .is_some_and(|value| &*value == "true");
                if yin_element {
                    ArgumentSpec::element(name)
                } else {
                    ArgumentSpec::attribute(name)
                }
            });
        let def = StatementDefinition::extension(Arc::clone(&keyword), qname, argument);
        let support = build.registry.unknown_support();
        return Ok(Some(build.intern_def(def, support)));
    }

    match build.registry.lookup(&keyword, phase) {
        Some(support) => Ok(Some(build.intern_def(support.definition(), support))),
        None => Ok(None),
    }
}
