//! Deferred inference actions and their prerequisites.
//!
//! A statement support that needs another, possibly not-yet-existing,
//! statement to reach a given phase registers an action through
//! [`ActionBuilder`] instead of resolving eagerly. The engine re-evaluates
//! every queued action's prerequisites after each phase-local change and
//! fires the ones whose prerequisites are all satisfied, repeating to a
//! fixed point before a phase may close. Among simultaneously eligible
//! actions, FIFO registration order is a deliberate, observable tie-break:
//! deviate/augment semantics are order-sensitive when several target the
//! same node.

use weft_model::SourceId;

use crate::build::BuildContext;
use crate::context::CtxId;
use crate::error::Result;
use crate::namespace::{Namespace, NamespaceScope, NsKey};
use crate::phase::Phase;

/// Handle to one prerequisite of one action.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PrereqHandle(usize);

/// Criterion for loose-key namespace prerequisites.
pub type KeyCriterion = Box<dyn Fn(&NsKey) -> bool>;

enum PrereqKind {
    /// Target context must complete `phase`.
    PhaseComplete { target: CtxId, phase: Phase },
    /// A binding must appear in `ns` (visible from `start`) and the bound
    /// context must complete `phase`. The binding is a lazy promise: it may
    /// only come into existence once another action populates the
    /// namespace.
    InNamespace {
        start: CtxId,
        ns: &'static Namespace,
        key: NsKey,
        phase: Phase,
    },
    /// Loose-key variant of [`PrereqKind::InNamespace`].
    InNamespaceBy {
        start: CtxId,
        ns: &'static Namespace,
        criterion: KeyCriterion,
        phase: Phase,
    },
    /// Recursive descent along `steps` in `ns`, re-hooking the write intent
    /// one resolved step at a time until the final target is reached.
    Path {
        root: CtxId,
        ns: &'static Namespace,
        steps: Vec<NsKey>,
        /// Steps resolved so far; `current` is where the walk stands.
        progress: usize,
        current: CtxId,
    },
}

/// One gating condition attached to an action.
pub struct Prereq {
    kind: PrereqKind,
    /// Phase this prerequisite intends to mutate its target in, if any.
    mutation: Option<Phase>,
    /// Where the write intent is currently registered.
    intent_on: Option<CtxId>,
    resolved: Option<CtxId>,
}

impl Prereq {
    fn is_done(&self) -> bool {
        self.resolved.is_some()
    }

    /// Human-readable rendering for deadlock reports.
    pub(crate) fn describe(&self, build: &BuildContext) -> String {
        let key_str = |key: &NsKey| build.render_key(key);
        match &self.kind {
            PrereqKind::PhaseComplete { target, phase } => format!(
                "`{}` at {} to reach {phase}",
                build.arena.get(*target).keyword(),
                build.arena.get(*target).source_ref()
            ),
            PrereqKind::InNamespace { ns, key, phase, .. } => {
                format!("{} `{}` to exist and reach {phase}", ns.name, key_str(key))
            }
            PrereqKind::InNamespaceBy { ns, phase, .. } => {
                format!("a matching {} entry to exist and reach {phase}", ns.name)
            }
            PrereqKind::Path {
                ns,
                steps,
                progress,
                ..
            } => {
                let path: Vec<String> = steps.iter().map(|k| build.render_key(k)).collect();
                format!(
                    "{} path /{} to resolve (stuck after {} step{})",
                    ns.name,
                    path.join("/"),
                    progress,
                    if *progress == 1 { "" } else { "s" }
                )
            }
        }
    }
}

/// Outcome of evaluating one prerequisite (or a whole modifier).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Eval {
    Satisfied,
    Blocked,
    /// The prerequisite resolved to a statement that is not supported
    /// (feature-disabled or deviated away).
    Unavailable,
}

/// A deferred computation gated on one or more statements reaching a phase.
///
/// `apply` runs at most once, with every prerequisite resolved.
/// `prerequisite_failed` runs instead when the surrounding phase closes
/// with prerequisites still unsatisfied: the implementation decides whether
/// that is fatal for its own statement (return the error) or benign (log
/// and return `Ok`; the reactor still reports the deadlock).
/// `prerequisite_unavailable` runs when a prerequisite resolved to an
/// unsupported statement.
pub trait InferenceAction {
    fn apply(&mut self, ctx: &mut ActionContext<'_>) -> Result<()>;

    fn prerequisite_failed(
        &mut self,
        _build: &mut BuildContext,
        _failed: &[String],
    ) -> Result<()> {
        Ok(())
    }

    fn prerequisite_unavailable(&mut self, _build: &mut BuildContext) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ModifierState {
    Pending,
    Applied,
    Aborted,
}

/// A registered action plus its prerequisites: the unit the engine
/// schedules. (The original calls this a "modifier".)
pub struct Modifier {
    pub(crate) source: SourceId,
    pub(crate) phase: Phase,
    prereqs: Vec<Prereq>,
    action: Option<Box<dyn InferenceAction>>,
    pub(crate) state: ModifierState,
}

impl Modifier {
    fn tombstone() -> Self {
        Self {
            source: SourceId(u32::MAX),
            phase: Phase::EffectiveModel,
            prereqs: Vec::new(),
            action: None,
            state: ModifierState::Applied,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.state == ModifierState::Pending
    }

    pub(crate) fn blocked_descriptions(&self, build: &BuildContext) -> Vec<String> {
        self.prereqs
            .iter()
            .filter(|p| !p.is_done())
            .map(|p| p.describe(build))
            .collect()
    }
}

/// Builder handed to statement supports for registering one action.
///
/// Prerequisites declared through `requires_*` gate the action; the ones
/// declared through `mutates_*` additionally declare a write intent that
/// keeps the target from closing the named phase before the action fires.
pub struct ActionBuilder<'a> {
    build: &'a mut BuildContext,
    source: SourceId,
    phase: Phase,
    prereqs: Vec<Prereq>,
}

impl<'a> ActionBuilder<'a> {
    pub(crate) fn new(build: &'a mut BuildContext, source: SourceId, phase: Phase) -> Self {
        Self {
            build,
            source,
            phase,
            prereqs: Vec::new(),
        }
    }

    fn push(&mut self, prereq: Prereq) -> PrereqHandle {
        self.prereqs.push(prereq);
        PrereqHandle(self.prereqs.len() - 1)
    }

    /// Require `target` to complete `phase` before the action fires.
    pub fn requires_ctx(&mut self, target: CtxId, phase: Phase) -> PrereqHandle {
        self.push(Prereq {
            kind: PrereqKind::PhaseComplete { target, phase },
            mutation: None,
            intent_on: None,
            resolved: None,
        })
    }

    /// Require a namespace binding (visible from `start`) to exist and its
    /// context to complete `phase`.
    pub fn requires_ctx_in_ns(
        &mut self,
        start: CtxId,
        ns: &'static Namespace,
        key: NsKey,
        phase: Phase,
    ) -> PrereqHandle {
        self.push(Prereq {
            kind: PrereqKind::InNamespace {
                start,
                ns,
                key,
                phase,
            },
            mutation: None,
            intent_on: None,
            resolved: None,
        })
    }

    /// Loose-key variant of [`ActionBuilder::requires_ctx_in_ns`].
    pub fn requires_ctx_in_ns_by(
        &mut self,
        start: CtxId,
        ns: &'static Namespace,
        criterion: KeyCriterion,
        phase: Phase,
    ) -> PrereqHandle {
        self.push(Prereq {
            kind: PrereqKind::InNamespaceBy {
                start,
                ns,
                criterion,
                phase,
            },
            mutation: None,
            intent_on: None,
            resolved: None,
        })
    }

    /// Declare a write intent on `target` for `phase`. Resolves
    /// immediately; the intent is held until the action fires.
    pub fn mutates_ctx(&mut self, target: CtxId, phase: Phase) -> PrereqHandle {
        self.build.arena.add_mutation(target, phase);
        self.push(Prereq {
            kind: PrereqKind::PhaseComplete {
                target,
                phase: Phase::SourcePreLinkage,
            },
            mutation: Some(phase),
            intent_on: Some(target),
            resolved: Some(target),
        })
    }

    /// Declare a write intent on the effective view of `target`.
    pub fn mutates_effective_ctx(&mut self, target: CtxId) -> PrereqHandle {
        self.mutates_ctx(target, Phase::EffectiveModel)
    }

    /// Declare a write intent on a statement found by walking `steps`
    /// through `ns`, starting at `root`. The walk advances one step at a
    /// time as bindings appear, carrying the write intent along so no
    /// intermediate step can close its effective-model phase while the walk
    /// is still in flight.
    pub fn mutates_effective_ctx_path(
        &mut self,
        root: CtxId,
        ns: &'static Namespace,
        steps: Vec<NsKey>,
    ) -> PrereqHandle {
        assert!(!steps.is_empty(), "namespace path may not be empty");
        self.build.arena.add_mutation(root, Phase::EffectiveModel);
        self.push(Prereq {
            kind: PrereqKind::Path {
                root,
                ns,
                steps,
                progress: 0,
                current: root,
            },
            mutation: Some(Phase::EffectiveModel),
            intent_on: Some(root),
            resolved: None,
        })
    }

    /// Register the action. It becomes eligible to fire once every
    /// prerequisite is satisfied.
    pub fn apply(self, action: Box<dyn InferenceAction>) {
        self.build.modifiers.push(Modifier {
            source: self.source,
            phase: self.phase,
            prereqs: self.prereqs,
            action: Some(action),
            state: ModifierState::Pending,
        });
    }
}

/// Resolution access handed to a firing action.
pub struct ActionContext<'a> {
    pub build: &'a mut BuildContext,
    resolved: Vec<Option<CtxId>>,
}

impl ActionContext<'_> {
    /// Resolve a prerequisite to the context that satisfied it.
    ///
    /// # Panics
    /// Panics when called on an unsatisfied prerequisite; the engine only
    /// fires actions once all prerequisites are satisfied, so hitting this
    /// is a reactor programming error, not a compilation outcome.
    pub fn resolve(&self, handle: PrereqHandle) -> CtxId {
        self.resolved[handle.0]
            .unwrap_or_else(|| panic!("prerequisite {handle:?} resolved before it was satisfied"))
    }
}

/// Evaluate one prerequisite against current build state, registering and
/// re-hooking write intents as path walks advance.
fn evaluate_prereq(build: &mut BuildContext, prereq: &mut Prereq) -> Eval {
    if prereq.is_done() {
        // Mutation prerequisites resolve at registration; requirement
        // prerequisites stay done once satisfied (state never regresses).
        return Eval::Satisfied;
    }
    match &mut prereq.kind {
        PrereqKind::PhaseComplete { target, phase } => {
            if build.arena.get(*target).is_phase_complete(*phase) {
                prereq.resolved = Some(*target);
                Eval::Satisfied
            } else {
                Eval::Blocked
            }
        }
        PrereqKind::InNamespace {
            start,
            ns,
            key,
            phase,
        } => match build.ns_get(*start, ns, key) {
            Some(found) if !build.arena.get(found).is_supported() => Eval::Unavailable,
            Some(found) if build.arena.get(found).is_phase_complete(*phase) => {
                prereq.resolved = Some(found);
                Eval::Satisfied
            }
            _ => Eval::Blocked,
        },
        PrereqKind::InNamespaceBy {
            start,
            ns,
            criterion,
            phase,
        } => match build.ns_get_first_by(*start, ns, &**criterion) {
            Some((_, found)) if !build.arena.get(found).is_supported() => Eval::Unavailable,
            Some((_, found)) if build.arena.get(found).is_phase_complete(*phase) => {
                prereq.resolved = Some(found);
                Eval::Satisfied
            }
            _ => Eval::Blocked,
        },
        PrereqKind::Path {
            ns,
            steps,
            progress,
            current,
            ..
        } => {
            // Advance as many steps as current bindings allow. Each step is
            // looked up locally on the statement reached so far.
            while *progress < steps.len() {
                let key = &steps[*progress];
                let found = match build.arena.get(*current).namespaces.get(ns, key) {
                    Some(found) => found,
                    None => {
                        // Tree-scope lookups fall back to the ancestor walk
                        // for the first step only (the root names a subtree,
                        // not a binding on itself).
                        if *progress == 0 && ns.scope == NamespaceScope::Tree {
                            match build.ns_get(*current, ns, key) {
                                Some(found) => found,
                                None => return Eval::Blocked,
                            }
                        } else {
                            return Eval::Blocked;
                        }
                    }
                };
                if !build.arena.get(found).is_supported() {
                    return Eval::Unavailable;
                }
                if !build.arena.get(found).is_phase_complete(Phase::FullDeclaration) {
                    return Eval::Blocked;
                }
                // Re-hook the write intent from the step we stood on to the
                // one we just reached.
                build.arena.add_mutation(found, Phase::EffectiveModel);
                build.arena.remove_mutation(*current, Phase::EffectiveModel);
                prereq.intent_on = Some(found);
                *current = found;
                *progress += 1;
            }
            prereq.resolved = Some(*current);
            Eval::Satisfied
        }
    }
}

/// Drive the pending modifiers of `phase` to a fixed point. Returns whether
/// anything fired or advanced.
pub(crate) fn run_modifiers(build: &mut BuildContext, phase: Phase) -> Result<bool> {
    let mut any_progress = false;
    loop {
        let mut fired = false;
        let count = build.modifiers.len();
        for index in 0..count {
            if build.modifiers[index].phase != phase || !build.modifiers[index].is_pending() {
                continue;
            }
            let mut modifier = std::mem::replace(&mut build.modifiers[index], Modifier::tombstone());

            let mut outcome = Eval::Satisfied;
            for prereq in &mut modifier.prereqs {
                match evaluate_prereq(build, prereq) {
                    Eval::Satisfied => {}
                    Eval::Blocked => {
                        outcome = Eval::Blocked;
                        break;
                    }
                    Eval::Unavailable => {
                        outcome = Eval::Unavailable;
                        break;
                    }
                }
            }

            match outcome {
                Eval::Blocked => {
                    build.modifiers[index] = modifier;
                }
                Eval::Unavailable => {
                    let result = release_and_finish(build, &mut modifier, ModifierState::Aborted);
                    build.modifiers[index] = modifier;
                    result?;
                    fired = true;
                }
                Eval::Satisfied => {
                    let resolved: Vec<Option<CtxId>> =
                        modifier.prereqs.iter().map(|p| p.resolved).collect();
                    let mut action = modifier
                        .action
                        .take()
                        .expect("pending modifier without action");
                    let result = action.apply(&mut ActionContext { build, resolved });
                    release_intents(build, &mut modifier);
                    modifier.state = ModifierState::Applied;
                    build.modifiers[index] = modifier;
                    result?;
                    fired = true;
                }
            }
        }
        if !fired {
            break;
        }
        any_progress = true;
    }
    Ok(any_progress)
}

fn release_intents(build: &mut BuildContext, modifier: &mut Modifier) {
    for prereq in &mut modifier.prereqs {
        if let (Some(phase), Some(target)) = (prereq.mutation, prereq.intent_on.take()) {
            build.arena.remove_mutation(target, phase);
        }
    }
}

fn release_and_finish(
    build: &mut BuildContext,
    modifier: &mut Modifier,
    state: ModifierState,
) -> Result<()> {
    release_intents(build, modifier);
    modifier.state = state;
    let mut action = modifier
        .action
        .take()
        .expect("pending modifier without action");
    action.prerequisite_unavailable(build)
}

/// Fail every still-pending modifier of `phase`: each action gets
/// `prerequisite_failed` with its blocked prerequisites, then the caller
/// reports the deadlock. Returns the rendered blocked prerequisites.
pub(crate) fn fail_pending(build: &mut BuildContext, phase: Phase) -> Result<Vec<String>> {
    let mut blocked = Vec::new();
    let count = build.modifiers.len();
    for index in 0..count {
        if build.modifiers[index].phase != phase || !build.modifiers[index].is_pending() {
            continue;
        }
        let mut modifier = std::mem::replace(&mut build.modifiers[index], Modifier::tombstone());
        let descriptions = modifier.blocked_descriptions(build);
        release_intents(build, &mut modifier);
        modifier.state = ModifierState::Aborted;
        let mut action = modifier
            .action
            .take()
            .expect("pending modifier without action");
        let result = action.prerequisite_failed(build, &descriptions);
        build.modifiers[index] = modifier;
        result?;
        blocked.extend(descriptions);
    }
    Ok(blocked)
}
