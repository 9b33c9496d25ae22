//! Shared state of one compilation in flight.
//!
//! `BuildContext` owns the arena, the interned statement definitions, the
//! global namespaces and the modifier queue. It is the only mutation path
//! statement supports and inference actions receive; nothing outside the
//! reactor ever holds one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use weft_model::{DefId, Interner, QName, QNameModule, StatementDefinition, Symbol};

use crate::action::{ActionBuilder, Modifier};
use crate::context::{Arena, CtxId};
use crate::namespace::{Namespace, NamespaceScope, NamespaceStore, NsKey, PREFIX};
use crate::phase::Phase;
use crate::support::{StatementSupport, SupportRegistry};

pub struct BuildContext {
    pub arena: Arena,
    pub interner: Interner,
    pub(crate) registry: Arc<SupportRegistry>,

    /// Build-global namespace storage (the root of the Global scope).
    global_ns: NamespaceStore,

    /// Interned statement definitions and their behaviors, indexed by DefId.
    defs: Vec<StatementDefinition>,
    supports: Vec<Arc<dyn StatementSupport>>,
    keywords: Vec<Arc<str>>,
    def_index: HashMap<(Arc<str>, Option<QName>), DefId>,

    pub(crate) modifiers: Vec<Modifier>,

    /// Module root context → its resolved identity, set during linkage.
    module_identity: HashMap<CtxId, QNameModule>,

    /// Supported features as (module name, feature name); `None` means all
    /// features are supported.
    features: Option<HashSet<(Symbol, Symbol)>>,
    /// Target module name → module names permitted to deviate it; `None`
    /// means deviations are unrestricted.
    permitted_deviations: Option<HashMap<Symbol, HashSet<Symbol>>>,
}

impl BuildContext {
    pub(crate) fn new(
        registry: Arc<SupportRegistry>,
        features: Option<HashSet<(String, String)>>,
        permitted_deviations: Option<HashMap<String, HashSet<String>>>,
    ) -> Self {
        let mut build = Self {
            arena: Arena::new(),
            interner: Interner::new(),
            registry,
            global_ns: NamespaceStore::default(),
            defs: Vec::new(),
            supports: Vec::new(),
            keywords: Vec::new(),
            def_index: HashMap::new(),
            modifiers: Vec::new(),
            module_identity: HashMap::new(),
            features: None,
            permitted_deviations: None,
        };
        build.features = features.map(|set| {
            set.into_iter()
                .map(|(module, feature)| {
                    (
                        build.interner.intern(&module),
                        build.interner.intern(&feature),
                    )
                })
                .collect()
        });
        build.permitted_deviations = permitted_deviations.map(|map| {
            map.into_iter()
                .map(|(target, allowed)| {
                    (
                        build.interner.intern(&target),
                        allowed
                            .into_iter()
                            .map(|name| build.interner.intern(&name))
                            .collect(),
                    )
                })
                .collect()
        });
        build
    }

    // ------------------------------------------------------------------
    // Statement definitions

    /// Intern a definition with its behavior, deduplicating by keyword and
    /// defining extension.
    pub fn intern_def(
        &mut self,
        def: StatementDefinition,
        support: Arc<dyn StatementSupport>,
    ) -> DefId {
        let key = (Arc::from(def.keyword()), def.extension_name());
        if let Some(&existing) = self.def_index.get(&key) {
            return existing;
        }
        let id = DefId(self.defs.len() as u32);
        self.keywords.push(Arc::from(def.keyword()));
        self.defs.push(def);
        self.supports.push(support);
        self.def_index.insert(key, id);
        id
    }

    pub fn def(&self, id: DefId) -> &StatementDefinition {
        &self.defs[id.index()]
    }

    pub fn support(&self, id: DefId) -> Arc<dyn StatementSupport> {
        Arc::clone(&self.supports[id.index()])
    }

    pub fn keyword_arc(&self, id: DefId) -> Arc<str> {
        Arc::clone(&self.keywords[id.index()])
    }

    pub fn def_count(&self) -> usize {
        self.defs.len()
    }

    /// DefId of a core-language keyword, if that keyword has been interned.
    pub fn core_def(&self, keyword: &str) -> Option<DefId> {
        self.def_index.get(&(Arc::from(keyword), None)).copied()
    }

    /// DefId of a core-language keyword, interning it from the registry if
    /// no statement has used it yet. `None` when the registry does not
    /// define the keyword at or before `phase`.
    pub fn ensure_core_def(&mut self, keyword: &str, phase: Phase) -> Option<DefId> {
        if let Some(existing) = self.core_def(keyword) {
            return Some(existing);
        }
        let support = self.registry.lookup(keyword, phase)?;
        Some(self.intern_def(support.definition(), support))
    }

    // ------------------------------------------------------------------
    // Namespace access

    /// Bind `key` in `ns` as seen from `owner`, routing by scope. Returns
    /// `true` when the key was newly bound.
    pub fn ns_put(&mut self, owner: CtxId, ns: &'static Namespace, key: NsKey, value: CtxId) -> bool {
        match ns.scope {
            NamespaceScope::Global => self.global_ns.put(ns, key, value),
            NamespaceScope::Tree | NamespaceScope::Statement => {
                self.arena.get_mut(owner).namespaces.put(ns, key, value)
            }
        }
    }

    /// Scope-aware lookup: Global reads the build root, Tree walks from
    /// `start` to its tree root, Statement reads only `start` itself.
    pub fn ns_get(&self, start: CtxId, ns: &'static Namespace, key: &NsKey) -> Option<CtxId> {
        match ns.scope {
            NamespaceScope::Global => self.global_ns.get(ns, key),
            NamespaceScope::Statement => self.arena.get(start).namespaces.get(ns, key),
            NamespaceScope::Tree => {
                let mut cursor = Some(start);
                while let Some(current) = cursor {
                    if let Some(found) = self.arena.get(current).namespaces.get(ns, key) {
                        return Some(found);
                    }
                    cursor = self.arena.get(current).parent();
                }
                None
            }
        }
    }

    /// Loose-key lookup with the same scoping rules as [`Self::ns_get`].
    pub fn ns_get_first_by(
        &self,
        start: CtxId,
        ns: &'static Namespace,
        criterion: impl Fn(&NsKey) -> bool,
    ) -> Option<(NsKey, CtxId)> {
        match ns.scope {
            NamespaceScope::Global => self.global_ns.get_first_by(ns, criterion),
            NamespaceScope::Statement => {
                self.arena.get(start).namespaces.get_first_by(ns, criterion)
            }
            NamespaceScope::Tree => {
                let mut cursor = Some(start);
                while let Some(current) = cursor {
                    if let Some(found) =
                        self.arena.get(current).namespaces.get_first_by(ns, &criterion)
                    {
                        return Some(found);
                    }
                    cursor = self.arena.get(current).parent();
                }
                None
            }
        }
    }

    pub(crate) fn render_key(&self, key: &NsKey) -> String {
        match key {
            NsKey::Name(sym) => self.interner.resolve(*sym).to_owned(),
            NsKey::QName(qname) => self.interner.resolve(qname.name).to_owned(),
            NsKey::NameRev(sym, Some(rev)) => {
                format!("{}@{rev}", self.interner.resolve(*sym))
            }
            NsKey::NameRev(sym, None) => self.interner.resolve(*sym).to_owned(),
        }
    }

    // ------------------------------------------------------------------
    // Actions

    /// Start building an inference action on behalf of `origin`, scheduled
    /// in `phase`.
    pub fn new_action(&mut self, origin: CtxId, phase: Phase) -> ActionBuilder<'_> {
        let source = self.arena.get(origin).source();
        ActionBuilder::new(self, source, phase)
    }

    // ------------------------------------------------------------------
    // Module identity and prefix resolution

    pub fn set_module_identity(&mut self, module: CtxId, identity: QNameModule) {
        self.module_identity.insert(module, identity);
    }

    pub fn module_identity(&self, module: CtxId) -> Option<QNameModule> {
        self.module_identity.get(&module).copied()
    }

    /// Resolve a possibly-absent prefix to a module root, looking from
    /// `from`: no prefix means the enclosing module; a prefix is looked up
    /// through the tree-scoped prefix namespace.
    pub fn resolve_prefix(&self, from: CtxId, prefix: Option<&str>) -> Option<CtxId> {
        match prefix {
            None => Some(self.arena.root_of(from)),
            Some(prefix) => {
                let sym = self.interner.lookup(prefix)?;
                self.ns_get(from, &PREFIX, &NsKey::Name(sym))
            }
        }
    }

    /// Qualified name of `name` within the module rooted at `module`.
    /// `None` until the module's identity has been resolved during linkage.
    pub fn qname_in_module(&mut self, module: CtxId, name: &str) -> Option<QName> {
        let identity = self.module_identity(module)?;
        let name = self.interner.intern(name);
        Some(QName::new(identity, name))
    }

    // ------------------------------------------------------------------
    // Compilation configuration

    /// Whether a feature is enabled for this compilation.
    pub fn feature_supported(&self, module_name: Symbol, feature: Symbol) -> bool {
        match &self.features {
            None => true,
            Some(set) => set.contains(&(module_name, feature)),
        }
    }

    /// Whether `deviating_module` may deviate statements of `target_module`.
    pub fn deviation_permitted(&self, target_module: Symbol, deviating_module: Symbol) -> bool {
        match &self.permitted_deviations {
            None => true,
            Some(map) => map
                .get(&target_module)
                .is_some_and(|allowed| allowed.contains(&deviating_module)),
        }
    }

    // ------------------------------------------------------------------
    // Copy notification

    /// Replay namespace registrations for a freshly copied subtree: copies
    /// drop statement-scoped state, and tree-scoped bindings have to be
    /// re-established against the new parent.
    pub fn notify_copied(&mut self, root: CtxId) -> crate::error::Result<()> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(def) = self.arena.get(id).def() {
                let support = self.support(def);
                support.on_added_by_copy(self, id)?;
            }
            stack.extend(self.arena.get(id).effective_children());
        }
        Ok(())
    }
}
