//! The statement context tree: mutable, per-statement compilation state.
//!
//! Contexts live in an arena and refer to each other through `CtxId`
//! handles; parent, original and copy-history links are handle fields, so
//! the cyclic-ish object graph of the original design is safe under a
//! single-threaded arena owner. A context exists only during compilation:
//! once the whole build reaches the effective-model phase its frozen
//! `EffectiveStatement` is all that survives.

use std::sync::Arc;

use weft_model::{DefId, EffectiveStatement, Skeleton, SourceId, SourceRef};

use crate::error::{ReactorError, Result};
use crate::namespace::NamespaceStore;
use crate::phase::Phase;

/// Handle to a statement context in the arena.
///
/// Two contexts are "the same statement" only when their handles are equal;
/// copies produced by uses/augment expansion are distinct contexts linked
/// through copy history, never aliases.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CtxId(u32);

impl CtxId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which construct produced a copied context.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CopyType {
    AddedByUses,
    AddedByAugmentation,
    AddedByUsesAugmentation,
}

/// ORIGINAL, or a link to the context this one was copied from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CopyHistory {
    Original,
    Copy { copy_type: CopyType, original: CtxId },
}

/// Parsed (typed) argument value of a statement.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ArgValue {
    Str(Arc<str>),
    Bool(bool),
    Uint(u64),
    /// `max-elements` without a bound.
    Unbounded,
    /// Possibly-prefixed identifier reference (`pfx:name` or `name`).
    Identifier {
        prefix: Option<Arc<str>>,
        name: Arc<str>,
    },
    /// Schema-node path, absolute (`/pfx:a/pfx:b`) or relative (`a/b`).
    SchemaPath {
        absolute: bool,
        steps: Vec<(Option<Arc<str>>, Arc<str>)>,
    },
    Deviate(DeviateKind),
}

/// The four deviate flavors.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeviateKind {
    NotSupported,
    Add,
    Replace,
    Delete,
}

impl DeviateKind {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "not-supported" => Self::NotSupported,
            "add" => Self::Add,
            "replace" => Self::Replace,
            "delete" => Self::Delete,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSupported => "not-supported",
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }
}

/// One statement context. Fields are crate-private; mutation goes through
/// [`Arena`] so that version bookkeeping cannot be bypassed.
#[derive(Debug)]
pub struct StmtCtx {
    parent: Option<CtxId>,
    source: SourceId,
    keyword: Arc<str>,
    raw_argument: Option<Arc<str>>,
    source_ref: SourceRef,
    declared: Option<Arc<Skeleton>>,

    def: Option<DefId>,
    argument: Option<ArgValue>,

    declared_children: Vec<CtxId>,
    /// Substatements contributed by inference actions, in arrival order.
    effective_children: Vec<CtxId>,

    /// Highest completed phase; monotonic.
    completed: Option<Phase>,
    /// Bitmask of phases whose support callback has run.
    callbacks_run: u8,
    /// Open write intents per phase; a phase cannot complete while one of
    /// its slots is non-zero.
    mutations: [u32; 5],

    copy_history: CopyHistory,
    supported_to_build_effective: bool,
    supported_by_features: bool,

    pub(crate) namespaces: NamespaceStore,

    /// Bumped (here and on every ancestor) whenever the subtree mutates.
    version: u64,
    /// Subtree versions observed at copy time: (own baseline, original's).
    copy_baseline: Option<(u64, u64)>,

    /// Recursion guard for effective construction of self-referential
    /// extension-defined statements.
    in_progress: bool,
    effective: Option<Arc<EffectiveStatement>>,
}

impl StmtCtx {
    pub fn parent(&self) -> Option<CtxId> {
        self.parent
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn raw_keyword(&self) -> &Arc<str> {
        &self.keyword
    }

    pub fn raw_argument(&self) -> Option<&str> {
        self.raw_argument.as_deref()
    }

    pub fn raw_argument_arc(&self) -> Option<&Arc<str>> {
        self.raw_argument.as_ref()
    }

    pub fn source_ref(&self) -> &SourceRef {
        &self.source_ref
    }

    pub fn declared(&self) -> Option<&Arc<Skeleton>> {
        self.declared.as_ref()
    }

    pub fn def(&self) -> Option<DefId> {
        self.def
    }

    pub fn argument(&self) -> Option<&ArgValue> {
        self.argument.as_ref()
    }

    pub fn declared_children(&self) -> &[CtxId] {
        &self.declared_children
    }

    pub fn inferred_children(&self) -> &[CtxId] {
        &self.effective_children
    }

    /// Effective substatement order: declared children first, then inferred
    /// ones in arrival order. Suppressed children are still listed here;
    /// the effective build is what skips them.
    pub fn effective_children(&self) -> impl Iterator<Item = CtxId> + '_ {
        self.declared_children
            .iter()
            .chain(self.effective_children.iter())
            .copied()
    }

    pub fn completed_phase(&self) -> Option<Phase> {
        self.completed
    }

    pub fn is_phase_complete(&self, phase: Phase) -> bool {
        self.completed.is_some_and(|done| done >= phase)
    }

    pub fn copy_history(&self) -> CopyHistory {
        self.copy_history
    }

    pub fn is_supported_to_build_effective(&self) -> bool {
        self.supported_to_build_effective
    }

    pub fn is_supported_by_features(&self) -> bool {
        self.supported_by_features
    }

    /// Whether this statement participates in the effective tree at all.
    pub fn is_supported(&self) -> bool {
        self.supported_to_build_effective && self.supported_by_features
    }

    pub fn has_open_mutations(&self, phase: Phase) -> bool {
        self.mutations[phase.execution_order()] != 0
    }

    pub fn callback_ran(&self, phase: Phase) -> bool {
        self.callbacks_run & (1 << phase.execution_order()) != 0
    }

    pub(crate) fn mark_callback_ran(&mut self, phase: Phase) {
        self.callbacks_run |= 1 << phase.execution_order();
    }

    pub(crate) fn set_def(&mut self, def: DefId) {
        debug_assert!(self.def.is_none(), "statement definition already resolved");
        self.def = Some(def);
    }

    pub(crate) fn set_argument(&mut self, argument: Option<ArgValue>) {
        self.argument = argument;
    }
}

/// Arena owning every statement context of one compilation.
#[derive(Debug, Default)]
pub struct Arena {
    entries: Vec<StmtCtx>,
    /// Monotonic mutation clock feeding per-context versions.
    clock: u64,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: CtxId) -> &StmtCtx {
        &self.entries[id.index()]
    }

    pub fn get_mut(&mut self, id: CtxId) -> &mut StmtCtx {
        &mut self.entries[id.index()]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Materialize one declared skeleton (and its children, recursively)
    /// into contexts.
    pub fn materialize(
        &mut self,
        skeleton: &Arc<Skeleton>,
        parent: Option<CtxId>,
        source: SourceId,
    ) -> CtxId {
        let id = self.alloc(StmtCtx {
            parent,
            source,
            keyword: Arc::from(skeleton.keyword()),
            raw_argument: skeleton.argument().map(Arc::from),
            source_ref: skeleton.source_ref().clone(),
            declared: Some(Arc::clone(skeleton)),
            def: None,
            argument: None,
            declared_children: Vec::new(),
            effective_children: Vec::new(),
            completed: None,
            callbacks_run: 0,
            mutations: [0; 5],
            copy_history: CopyHistory::Original,
            supported_to_build_effective: true,
            supported_by_features: true,
            namespaces: NamespaceStore::default(),
            version: 0,
            copy_baseline: None,
            in_progress: false,
            effective: None,
        });
        for child in skeleton.children() {
            let child_id = self.materialize(child, Some(id), source);
            self.entries[id.index()].declared_children.push(child_id);
        }
        id
    }

    /// Create an inferred statement with no declared counterpart (the
    /// implicit `input`/`output` of an `rpc`). The caller appends it via
    /// [`Arena::add_effective_substatement`]. Like a copy, it arrives fully
    /// declared with every phase callback accounted for; the support that
    /// infers it performs any registration itself.
    pub fn create_inferred(
        &mut self,
        parent: CtxId,
        def: DefId,
        keyword: Arc<str>,
        source_ref: SourceRef,
    ) -> CtxId {
        let source = self.get(parent).source;
        self.alloc(StmtCtx {
            parent: Some(parent),
            source,
            keyword,
            raw_argument: None,
            source_ref,
            declared: None,
            def: Some(def),
            argument: None,
            declared_children: Vec::new(),
            effective_children: Vec::new(),
            completed: Some(Phase::FullDeclaration),
            callbacks_run: 0b11111,
            mutations: [0; 5],
            copy_history: CopyHistory::Original,
            supported_to_build_effective: true,
            supported_by_features: true,
            namespaces: NamespaceStore::default(),
            version: 0,
            copy_baseline: None,
            in_progress: false,
            effective: None,
        })
    }

    fn alloc(&mut self, ctx: StmtCtx) -> CtxId {
        let id = CtxId(self.entries.len() as u32);
        self.entries.push(ctx);
        id
    }

    /// Mark a phase completed. Phases only ever move forward; regressing is
    /// a reactor programming error.
    pub fn complete_phase(&mut self, id: CtxId, phase: Phase) {
        let ctx = self.get_mut(id);
        if let Some(done) = ctx.completed {
            assert!(
                done < phase,
                "context {id:?} attempted to regress from {done} to {phase}"
            );
        }
        ctx.completed = Some(phase);
    }

    /// Register a write intent against `id` for `phase`.
    pub fn add_mutation(&mut self, id: CtxId, phase: Phase) {
        self.get_mut(id).mutations[phase.execution_order()] += 1;
    }

    /// Retire a previously registered write intent.
    pub fn remove_mutation(&mut self, id: CtxId, phase: Phase) {
        let slot = &mut self.get_mut(id).mutations[phase.execution_order()];
        debug_assert!(*slot > 0, "mutation count underflow on {id:?}");
        *slot = slot.saturating_sub(1);
    }

    /// Bump the mutation clock for `id` and every ancestor.
    fn touch(&mut self, id: CtxId) {
        self.clock += 1;
        let stamp = self.clock;
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let ctx = self.get_mut(current);
            ctx.version = stamp;
            cursor = ctx.parent;
        }
    }

    pub fn subtree_version(&self, id: CtxId) -> u64 {
        self.get(id).version
    }

    /// Append an inference-contributed substatement. Fails once the parent
    /// has closed its effective-model phase.
    pub fn add_effective_substatement(&mut self, parent: CtxId, child: CtxId) -> Result<()> {
        if self.get(parent).is_phase_complete(Phase::EffectiveModel) {
            return Err(ReactorError::Inference {
                message: format!(
                    "cannot add effective substatement `{}`: substatement collection on `{}` has closed",
                    self.get(child).keyword(),
                    self.get(parent).keyword()
                ),
                at: self.get(child).source_ref().clone(),
            });
        }
        self.get_mut(parent).effective_children.push(child);
        self.get_mut(child).parent = Some(parent);
        self.touch(parent);
        Ok(())
    }

    /// Remove the first effective substatement matching `def` (and, when
    /// given, `raw_argument`). A declared match is suppressed rather than
    /// removed, keeping the declared tree intact. A missing match is a
    /// tolerated inconsistency: logged, not fatal.
    pub fn remove_effective_substatement(
        &mut self,
        parent: CtxId,
        def: DefId,
        raw_argument: Option<&str>,
    ) -> bool {
        let matches = |arena: &Arena, id: CtxId| {
            let ctx = arena.get(id);
            ctx.def == Some(def)
                && ctx.is_supported()
                && match raw_argument {
                    Some(expected) => ctx.raw_argument() == Some(expected),
                    None => true,
                }
        };

        let inferred_hit = self
            .get(parent)
            .effective_children
            .iter()
            .position(|&id| matches(self, id));
        if let Some(pos) = inferred_hit {
            self.get_mut(parent).effective_children.remove(pos);
            self.touch(parent);
            return true;
        }

        let declared_hit = self
            .get(parent)
            .declared_children
            .iter()
            .copied()
            .find(|&id| matches(self, id));
        if let Some(id) = declared_hit {
            self.set_unsupported(id);
            return true;
        }

        tracing::warn!(
            parent = %self.get(parent).keyword(),
            at = %self.get(parent).source_ref(),
            "no effective substatement to remove; ignoring"
        );
        false
    }

    /// Exclude the subtree from the effective build. Idempotent; the
    /// declared tree is untouched.
    pub fn set_unsupported(&mut self, id: CtxId) {
        if self.get(id).supported_to_build_effective {
            self.get_mut(id).supported_to_build_effective = false;
            self.touch(id);
        }
    }

    /// Mark a statement as disabled by feature gating.
    pub fn set_unsupported_by_features(&mut self, id: CtxId) {
        if self.get(id).supported_by_features {
            self.get_mut(id).supported_by_features = false;
            self.touch(id);
        }
    }

    /// Deep-copy `source` as a new child of `parent`, tagging the result's
    /// copy history. Statement-local namespaces are deliberately not
    /// carried over: copy-sensitive state is rebuilt against the new parent
    /// by the statement supports. Parsed arguments are shared.
    ///
    /// The copy arrives fully declared: its declared phases count as
    /// completed and their callbacks as run, since all inference its
    /// original was subject to has already fired by the time copies are
    /// taken.
    pub fn child_copy_of(
        &mut self,
        source: CtxId,
        parent: CtxId,
        copy_type: CopyType,
    ) -> Result<CtxId> {
        let copy = self.copy_subtree(source, parent, copy_type);
        self.add_effective_substatement(parent, copy)?;
        Ok(copy)
    }

    fn copy_subtree(&mut self, source: CtxId, parent: CtxId, copy_type: CopyType) -> CtxId {
        let src = self.get(source);
        let ctx = StmtCtx {
            parent: Some(parent),
            source: self.get(parent).source,
            keyword: Arc::clone(&src.keyword),
            raw_argument: src.raw_argument.clone(),
            source_ref: src.source_ref.clone(),
            declared: src.declared.clone(),
            def: src.def,
            argument: src.argument.clone(),
            declared_children: Vec::new(),
            effective_children: Vec::new(),
            completed: Some(Phase::FullDeclaration),
            callbacks_run: 0b11111,
            mutations: [0; 5],
            copy_history: CopyHistory::Copy {
                copy_type,
                original: source,
            },
            supported_to_build_effective: src.supported_to_build_effective,
            supported_by_features: src.supported_by_features,
            namespaces: NamespaceStore::default(),
            version: 0,
            copy_baseline: None,
            in_progress: false,
            effective: None,
        };
        let id = self.alloc(ctx);

        let declared: Vec<CtxId> = self.get(source).declared_children.clone();
        for child in declared {
            let child_copy = self.copy_subtree(child, id, copy_type);
            self.entries[id.index()].declared_children.push(child_copy);
        }
        let inferred: Vec<CtxId> = self.get(source).effective_children.clone();
        for child in inferred {
            let child_copy = self.copy_subtree(child, id, copy_type);
            self.entries[id.index()].effective_children.push(child_copy);
        }

        let baseline = (self.get(id).version, self.get(source).version);
        self.get_mut(id).copy_baseline = Some(baseline);
        id
    }

    /// First declared child with the given keyword.
    pub fn find_declared_child(&self, id: CtxId, keyword: &str) -> Option<CtxId> {
        self.get(id)
            .declared_children
            .iter()
            .copied()
            .find(|&child| self.get(child).keyword() == keyword)
    }

    /// Raw argument of the first declared child with the given keyword.
    pub fn declared_child_arg(&self, id: CtxId, keyword: &str) -> Option<Arc<str>> {
        self.find_declared_child(id, keyword)
            .and_then(|child| self.get(child).raw_argument_arc().cloned())
    }

    /// Resolve a copy chain to its ultimate original.
    pub fn original_ctx(&self, id: CtxId) -> CtxId {
        let mut cursor = id;
        while let CopyHistory::Copy { original, .. } = self.get(cursor).copy_history {
            cursor = original;
        }
        cursor
    }

    /// Walk up to the root of the tree containing `id`.
    pub fn root_of(&self, id: CtxId) -> CtxId {
        let mut cursor = id;
        while let Some(parent) = self.get(cursor).parent {
            cursor = parent;
        }
        cursor
    }

    /// Build (and memoize) the immutable effective statement for `id`.
    ///
    /// Unsupported subtrees yield `None`. An untouched copy whose original
    /// is also unchanged since the copy was taken reuses the original's
    /// substatement slice outright, the structural sharing that keeps a
    /// grouping used in ten places from re-allocating ten identical lists.
    pub fn build_effective(
        &mut self,
        id: CtxId,
        keyword_of: &dyn Fn(DefId) -> Arc<str>,
    ) -> Option<Arc<EffectiveStatement>> {
        if !self.get(id).is_supported() {
            return None;
        }
        if let Some(built) = &self.get(id).effective {
            return Some(Arc::clone(built));
        }
        if self.get(id).in_progress {
            // Self-referential extension definition; halt the recursion and
            // emit the statement without substatements.
            tracing::debug!(
                keyword = %self.get(id).keyword(),
                "recursive effective construction detected"
            );
            let ctx = self.get(id);
            return Some(Arc::new(EffectiveStatement::new(
                ctx.def?,
                keyword_of(ctx.def?),
                ctx.raw_argument.clone(),
                ctx.declared.clone(),
                Arc::from(Vec::new()),
            )));
        }
        self.get_mut(id).in_progress = true;

        let def = match self.get(id).def {
            Some(def) => def,
            None => {
                self.get_mut(id).in_progress = false;
                return None;
            }
        };

        let substatements = match self.shared_slice_from_original(id, keyword_of) {
            Some(slice) => slice,
            None => {
                let children: Vec<CtxId> = self.get(id).effective_children().collect();
                let built: Vec<Arc<EffectiveStatement>> = children
                    .into_iter()
                    .filter_map(|child| self.build_effective(child, keyword_of))
                    .collect();
                Arc::from(built)
            }
        };

        let ctx = self.get(id);
        let effective = Arc::new(EffectiveStatement::new(
            def,
            keyword_of(def),
            ctx.raw_argument.clone(),
            ctx.declared.clone(),
            substatements,
        ));
        let ctx = self.get_mut(id);
        ctx.in_progress = false;
        ctx.effective = Some(Arc::clone(&effective));
        Some(effective)
    }

    /// Substatement slice reuse for untouched copies.
    fn shared_slice_from_original(
        &mut self,
        id: CtxId,
        keyword_of: &dyn Fn(DefId) -> Arc<str>,
    ) -> Option<Arc<[Arc<EffectiveStatement>]>> {
        let ctx = self.get(id);
        let CopyHistory::Copy { original, .. } = ctx.copy_history else {
            return None;
        };
        let (own_baseline, original_baseline) = ctx.copy_baseline?;
        if ctx.version != own_baseline || self.get(original).version != original_baseline {
            return None;
        }
        let original_eff = self.build_effective(original, keyword_of)?;
        Some(Arc::clone(original_eff.substatement_slice()))
    }
}
