//! The immutable effective model: what consumers traverse after a
//! successful compilation.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::{DefId, Interner, QNameModule, Skeleton};

/// One fully resolved statement.
///
/// Substatement slices are deliberately shareable: a grouping instantiated
/// in ten places reuses one slice allocation wherever the copy was not
/// touched after expansion. `declared` is `None` for inferred statements
/// (an implicit `input` of an `rpc` has no declared counterpart).
#[derive(Debug)]
pub struct EffectiveStatement {
    def: DefId,
    keyword: Arc<str>,
    argument: Option<Arc<str>>,
    declared: Option<Arc<Skeleton>>,
    substatements: Arc<[Arc<EffectiveStatement>]>,
}

impl EffectiveStatement {
    pub fn new(
        def: DefId,
        keyword: Arc<str>,
        argument: Option<Arc<str>>,
        declared: Option<Arc<Skeleton>>,
        substatements: Arc<[Arc<EffectiveStatement>]>,
    ) -> Self {
        Self {
            def,
            keyword,
            argument,
            declared,
            substatements,
        }
    }

    pub fn def(&self) -> DefId {
        self.def
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// The declared statement this was built from, when one exists.
    pub fn declared(&self) -> Option<&Arc<Skeleton>> {
        self.declared.as_ref()
    }

    /// Effective substatements in declaration (or copy) order.
    pub fn substatements(&self) -> &[Arc<EffectiveStatement>] {
        &self.substatements
    }

    /// The raw substatement slice, exposed so callers can observe sharing.
    pub fn substatement_slice(&self) -> &Arc<[Arc<EffectiveStatement>]> {
        &self.substatements
    }

    /// First effective substatement with the given keyword.
    pub fn find_first(&self, keyword: &str) -> Option<&Arc<EffectiveStatement>> {
        self.substatements.iter().find(|s| s.keyword() == keyword)
    }

    /// All effective substatements with the given keyword.
    pub fn find_all<'a>(
        &'a self,
        keyword: &'a str,
    ) -> impl Iterator<Item = &'a Arc<EffectiveStatement>> {
        self.substatements
            .iter()
            .filter(move |s| s.keyword() == keyword)
    }

    /// Resolve a descendant by keyword/argument steps, first match per step.
    pub fn find_path(&self, steps: &[(&str, &str)]) -> Option<&Arc<EffectiveStatement>> {
        let mut current: Option<&Arc<EffectiveStatement>> = None;
        let mut cursor = self;
        for (keyword, argument) in steps {
            let next = cursor
                .substatements
                .iter()
                .find(|s| s.keyword() == *keyword && s.argument() == Some(argument))?;
            cursor = next;
            current = Some(next);
        }
        current
    }
}

impl fmt::Display for EffectiveStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.argument() {
            Some(arg) => write!(f, "{} {arg}", self.keyword),
            None => f.write_str(&self.keyword),
        }
    }
}

/// Result of a successful compilation: one effective root per module,
/// addressable by module identity, plus the interner needed to resolve the
/// symbols baked into qualified names.
#[derive(Debug)]
pub struct EffectiveModel {
    modules: IndexMap<QNameModule, Arc<EffectiveStatement>>,
    interner: Interner,
}

impl EffectiveModel {
    pub fn new(
        modules: IndexMap<QNameModule, Arc<EffectiveStatement>>,
        interner: Interner,
    ) -> Self {
        Self { modules, interner }
    }

    pub fn module(&self, id: QNameModule) -> Option<&Arc<EffectiveStatement>> {
        self.modules.get(&id)
    }

    /// Find a module root by its declared name.
    pub fn module_by_name(&self, name: &str) -> Option<&Arc<EffectiveStatement>> {
        self.modules
            .values()
            .find(|root| root.argument() == Some(name))
    }

    /// Module roots in dependency-resolution order.
    pub fn modules(&self) -> impl Iterator<Item = (QNameModule, &Arc<EffectiveStatement>)> {
        self.modules.iter().map(|(id, root)| (*id, root))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }
}
