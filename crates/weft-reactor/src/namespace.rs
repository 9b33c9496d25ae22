//! Typed, scoped symbol tables ("namespaces").
//!
//! A namespace is a write-once key→context mapping with one of three
//! visibility behaviors: global to the whole compilation, local to one
//! statement subtree, or local to one statement. Storage itself is dumb;
//! scope-aware lookup (ancestor walks, global routing) lives on the build
//! context, which owns all stores.
//!
//! Keys are a closed union rather than a type-erased map: every lookup the
//! reactor performs is by plain name, qualified name, or name+revision.

use indexmap::IndexMap;
use std::collections::HashMap;

use weft_model::{QName, Revision, Symbol};

use crate::context::CtxId;

/// Identity of one namespace kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NamespaceId(u16);

/// Visibility behavior of a namespace.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NamespaceScope {
    /// Visible to every statement in the compilation; stored once per build.
    Global,
    /// Visible to the subtree rooted at the statement where it was bound.
    Tree,
    /// Visible only on the exact statement instance.
    Statement,
}

/// Static descriptor of a namespace kind.
#[derive(Debug)]
pub struct Namespace {
    pub id: NamespaceId,
    pub name: &'static str,
    pub scope: NamespaceScope,
}

macro_rules! namespaces {
    ($($(#[$doc:meta])* $ident:ident = ($idx:expr, $name:literal, $scope:ident);)+) => {
        $(
            $(#[$doc])*
            pub static $ident: Namespace = Namespace {
                id: NamespaceId($idx),
                name: $name,
                scope: NamespaceScope::$scope,
            };
        )+
    };
}

namespaces! {
    /// Module name → module context. First registration wins; later
    /// revisions are reachable through [`MODULE_BY_QNAME`].
    MODULE = (0, "module", Global);
    /// (module name, revision) → module context.
    MODULE_BY_QNAME = (1, "module-by-qname", Global);
    /// Feature qualified name → feature context.
    FEATURE = (2, "feature", Global);
    /// Extension qualified name → extension context.
    EXTENSION = (3, "extension", Global);
    /// Grouping qualified name → grouping context, visible in the subtree
    /// where the grouping is declared.
    GROUPING = (4, "grouping", Tree);
    /// Schema-node qualified name → child context; the child-by-name lookup
    /// within one container/list/module.
    SCHEMA_NODE = (5, "schema-node", Tree);
    /// Prefix string → module context; bound at module roots by the module
    /// itself and by each import.
    PREFIX = (6, "prefix", Tree);
    /// Deviation statement → resolved target context, bound when the
    /// deviation's action fires. Statement-local scratch state.
    DEVIATION_TARGET = (7, "deviation-target", Statement);
    /// (submodule name, revision) → submodule context.
    SUBMODULE = (8, "submodule", Global);
}

/// A namespace key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum NsKey {
    /// Plain name (module names, prefixes).
    Name(Symbol),
    /// Qualified name (schema nodes, groupings, features, extensions).
    QName(QName),
    /// Module name plus optional revision.
    NameRev(Symbol, Option<Revision>),
}

/// Storage for the namespaces bound at one point (one statement context, or
/// the build-global root).
#[derive(Debug, Clone, Default)]
pub struct NamespaceStore {
    maps: HashMap<NamespaceId, IndexMap<NsKey, CtxId>>,
}

impl NamespaceStore {
    /// Bind `key` to `value`. Write-once: rebinding an existing key to a
    /// different value is a reactor programming error, not a compilation
    /// outcome. Rebinding to the same value is a no-op.
    ///
    /// Returns `true` when the key was newly bound.
    pub fn put(&mut self, ns: &Namespace, key: NsKey, value: CtxId) -> bool {
        let map = self.maps.entry(ns.id).or_default();
        match map.get(&key) {
            None => {
                map.insert(key, value);
                true
            }
            Some(existing) if *existing == value => false,
            Some(existing) => panic!(
                "namespace {}: attempted to rebind {key:?} from {existing:?} to {value:?}",
                ns.name
            ),
        }
    }

    /// Exact-key lookup in this store only.
    pub fn get(&self, ns: &Namespace, key: &NsKey) -> Option<CtxId> {
        self.maps.get(&ns.id)?.get(key).copied()
    }

    /// Predicate-based ("loose") lookup: first binding in insertion order
    /// whose key matches the criterion.
    pub fn get_first_by(
        &self,
        ns: &Namespace,
        criterion: impl Fn(&NsKey) -> bool,
    ) -> Option<(NsKey, CtxId)> {
        self.maps
            .get(&ns.id)?
            .iter()
            .find(|(k, _)| criterion(k))
            .map(|(k, v)| (*k, *v))
    }

    /// All bindings of a namespace in this store, in insertion order.
    pub fn all<'a>(&'a self, ns: &Namespace) -> impl Iterator<Item = (&'a NsKey, CtxId)> {
        self.maps
            .get(&ns.id)
            .into_iter()
            .flat_map(|map| map.iter().map(|(k, v)| (k, *v)))
    }
}
