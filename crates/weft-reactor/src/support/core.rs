//! Module-header statement supports: module, submodule, namespace, prefix,
//! revision, import, include, and the generic property statements
//! (description, config, min-elements, ...).

use std::sync::Arc;

use weft_model::{ArgumentSpec, QNameModule, Revision, SemVer, SourceRef, StatementDefinition};

use crate::action::{ActionContext, InferenceAction, PrereqHandle};
use crate::build::BuildContext;
use crate::context::{ArgValue, CopyType, CtxId};
use crate::error::{ReactorError, Result};
use crate::namespace::{MODULE, MODULE_BY_QNAME, NsKey, PREFIX, SUBMODULE};
use crate::phase::Phase;

use super::{StatementSupport, SubstatementRule, SupportRegistryBuilder};

pub(super) fn register(builder: &mut SupportRegistryBuilder) {
    builder.add(Phase::SourcePreLinkage, "module", Arc::new(ModuleSupport));
    builder.add(Phase::SourcePreLinkage, "submodule", Arc::new(SubmoduleSupport));
    builder.add(Phase::SourcePreLinkage, "import", Arc::new(ImportSupport));
    builder.add(Phase::SourcePreLinkage, "include", Arc::new(IncludeSupport));
    for simple in SIMPLE_STATEMENTS {
        builder.add(simple.bundle, simple.keyword, Arc::new(*simple));
    }
}

/// How a simple statement's argument is parsed.
#[derive(Clone, Copy, Debug)]
enum ArgKind {
    Str,
    Bool,
    Uint,
    /// `max-elements`: a count or the literal `unbounded`.
    Bound,
    /// A `YYYY-MM-DD` revision literal, kept as a string once validated.
    RevisionDate,
    /// A `major.minor.patch` literal, kept as a string once validated.
    SemVer,
}

/// A statement kind with no behavior beyond argument parsing and
/// cardinality rules.
#[derive(Clone, Copy, Debug)]
struct SimpleSupport {
    keyword: &'static str,
    argument: Option<&'static str>,
    kind: ArgKind,
    bundle: Phase,
    rules: Option<&'static [SubstatementRule]>,
}

const REVISION_RULES: &[SubstatementRule] = &[
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
];

const BELONGS_TO_RULES: &[SubstatementRule] = &[SubstatementRule::exactly_one("prefix")];

const fn simple(keyword: &'static str, argument: &'static str, kind: ArgKind) -> SimpleSupport {
    SimpleSupport {
        keyword,
        argument: Some(argument),
        kind,
        bundle: Phase::FullDeclaration,
        rules: None,
    }
}

const SIMPLE_STATEMENTS: &[SimpleSupport] = &[
    SimpleSupport {
        keyword: "namespace",
        argument: Some("uri"),
        kind: ArgKind::Str,
        bundle: Phase::SourcePreLinkage,
        rules: Some(&[]),
    },
    SimpleSupport {
        keyword: "prefix",
        argument: Some("value"),
        kind: ArgKind::Str,
        bundle: Phase::SourcePreLinkage,
        rules: Some(&[]),
    },
    SimpleSupport {
        keyword: "revision",
        argument: Some("date"),
        kind: ArgKind::RevisionDate,
        bundle: Phase::SourcePreLinkage,
        rules: Some(REVISION_RULES),
    },
    SimpleSupport {
        keyword: "revision-date",
        argument: Some("date"),
        kind: ArgKind::RevisionDate,
        bundle: Phase::SourcePreLinkage,
        rules: Some(&[]),
    },
    SimpleSupport {
        keyword: "semantic-version",
        argument: Some("version"),
        kind: ArgKind::SemVer,
        bundle: Phase::SourcePreLinkage,
        rules: Some(&[]),
    },
    SimpleSupport {
        keyword: "belongs-to",
        argument: Some("module"),
        kind: ArgKind::Str,
        bundle: Phase::SourcePreLinkage,
        rules: Some(BELONGS_TO_RULES),
    },
    simple("organization", "text", ArgKind::Str),
    simple("contact", "text", ArgKind::Str),
    simple("description", "text", ArgKind::Str),
    simple("reference", "text", ArgKind::Str),
    simple("units", "name", ArgKind::Str),
    simple("status", "value", ArgKind::Str),
    simple("presence", "value", ArgKind::Str),
    simple("when", "condition", ArgKind::Str),
    simple("key", "value", ArgKind::Str),
    simple("type", "name", ArgKind::Str),
    simple("default", "value", ArgKind::Str),
    simple("config", "value", ArgKind::Bool),
    simple("mandatory", "value", ArgKind::Bool),
    simple("min-elements", "value", ArgKind::Uint),
    simple("max-elements", "value", ArgKind::Bound),
];

impl StatementSupport for SimpleSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core(
            self.keyword,
            self.argument.map(ArgumentSpec::attribute),
        )
    }

    fn parse_argument(
        &self,
        build: &mut BuildContext,
        raw: &str,
        ctx: CtxId,
    ) -> Result<ArgValue> {
        let invalid = |message: String| ReactorError::InvalidArgument {
            keyword: self.keyword.to_owned(),
            message,
            at: build.arena.get(ctx).source_ref().clone(),
        };
        match self.kind {
            ArgKind::Str => Ok(ArgValue::Str(Arc::from(raw))),
            ArgKind::Bool => match raw {
                "true" => Ok(ArgValue::Bool(true)),
                "false" => Ok(ArgValue::Bool(false)),
                other => Err(invalid(format!("expected `true` or `false`, got `{other}`"))),
            },
            ArgKind::Uint => raw
                .parse::<u64>()
                .map(ArgValue::Uint)
                .map_err(|_| invalid(format!("expected a non-negative integer, got `{raw}`"))),
            ArgKind::Bound => {
                if raw == "unbounded" {
                    Ok(ArgValue::Unbounded)
                } else {
                    raw.parse::<u64>().map(ArgValue::Uint).map_err(|_| {
                        invalid(format!("expected a count or `unbounded`, got `{raw}`"))
                    })
                }
            }
            ArgKind::RevisionDate => {
                Revision::parse(raw).map_err(|e| invalid(e.to_string()))?;
                Ok(ArgValue::Str(Arc::from(raw)))
            }
            ArgKind::SemVer => {
                SemVer::parse(raw).map_err(|e| invalid(e.to_string()))?;
                Ok(ArgValue::Str(Arc::from(raw)))
            }
        }
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        self.rules
    }
}

const MODULE_RULES: &[SubstatementRule] = &[
    SubstatementRule::exactly_one("namespace"),
    SubstatementRule::exactly_one("prefix"),
    SubstatementRule::any("revision"),
    SubstatementRule::any("import"),
    SubstatementRule::any("include"),
    SubstatementRule::at_most_one("organization"),
    SubstatementRule::at_most_one("contact"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::any("container"),
    SubstatementRule::any("leaf"),
    SubstatementRule::any("leaf-list"),
    SubstatementRule::any("list"),
    SubstatementRule::any("choice"),
    SubstatementRule::any("grouping"),
    SubstatementRule::any("uses"),
    SubstatementRule::any("augment"),
    SubstatementRule::any("deviation"),
    SubstatementRule::any("extension"),
    SubstatementRule::any("feature"),
    SubstatementRule::any("rpc"),
];

/// `module`: registers the module name during pre-linkage and resolves the
/// module's identity (namespace URI + latest revision) during linkage.
struct ModuleSupport;

impl StatementSupport for ModuleSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("module", Some(ArgumentSpec::attribute("name")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(MODULE_RULES)
    }

    fn on_pre_linkage_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let Some(name) = build.arena.get(ctx).raw_argument_arc().cloned() else {
            return Err(missing_argument(build, ctx, "module"));
        };
        let sym = build.interner.intern(&name);
        let key = NsKey::Name(sym);
        if build.ns_get(ctx, &MODULE, &key).is_none() {
            build.ns_put(ctx, &MODULE, key, ctx);
        } else {
            // Another revision of the same module; reachable through the
            // qualified namespace. Tolerated, by name the first one wins.
            tracing::warn!(module = %name, "duplicate implicit module registration ignored");
        }
        Ok(())
    }

    fn on_linkage_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let name = build
            .arena
            .get(ctx)
            .raw_argument_arc()
            .cloned()
            .expect("module argument checked during pre-linkage");
        let name_sym = build.interner.intern(&name);

        let uri = build.arena.declared_child_arg(ctx, "namespace").ok_or_else(|| {
            ReactorError::InvalidArgument {
                keyword: "module".to_owned(),
                message: format!("module `{name}` has no namespace statement"),
                at: build.arena.get(ctx).source_ref().clone(),
            }
        })?;
        let revision = latest_revision(build, ctx)?;
        let uri_sym = build.interner.intern(&uri);
        let identity = QNameModule::new(uri_sym, revision);
        build.set_module_identity(ctx, identity);
        build.ns_put(ctx, &MODULE_BY_QNAME, NsKey::NameRev(name_sym, revision), ctx);

        if let Some(prefix) = build.arena.declared_child_arg(ctx, "prefix") {
            bind_prefix(build, ctx, ctx, &prefix, ctx)?;
        }
        Ok(())
    }
}

/// Bind `prefix` → `target` at `module_root`. A prefix already bound to a
/// different module is a conflict in the input, not a reactor bug.
fn bind_prefix(
    build: &mut BuildContext,
    module_root: CtxId,
    target: CtxId,
    prefix: &str,
    declared_at: CtxId,
) -> Result<()> {
    let key = NsKey::Name(build.interner.intern(prefix));
    if let Some(existing) = build.arena.get(module_root).namespaces.get(&PREFIX, &key) {
        if existing == target {
            return Ok(());
        }
        return Err(ReactorError::SemanticConflict {
            message: format!("prefix `{prefix}` bound twice in the same module"),
            first: build.arena.get(existing).source_ref().clone(),
            second: build.arena.get(declared_at).source_ref().clone(),
        });
    }
    build.ns_put(module_root, &PREFIX, key, target);
    Ok(())
}

const SUBMODULE_RULES: &[SubstatementRule] = &[
    SubstatementRule::exactly_one("belongs-to"),
    SubstatementRule::any("revision"),
    SubstatementRule::any("import"),
    SubstatementRule::any("include"),
    SubstatementRule::at_most_one("organization"),
    SubstatementRule::at_most_one("contact"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::any("container"),
    SubstatementRule::any("leaf"),
    SubstatementRule::any("leaf-list"),
    SubstatementRule::any("list"),
    SubstatementRule::any("choice"),
    SubstatementRule::any("grouping"),
    SubstatementRule::any("uses"),
    SubstatementRule::any("augment"),
    SubstatementRule::any("deviation"),
    SubstatementRule::any("extension"),
    SubstatementRule::any("feature"),
    SubstatementRule::any("rpc"),
];

/// `submodule`: a source tree that contributes its body to the module it
/// belongs to. Registered by (name, revision) during pre-linkage; during
/// linkage it adopts the owning module's identity, read straight from the
/// owner's declared header so no cross-source phase ordering is needed.
struct SubmoduleSupport;

impl StatementSupport for SubmoduleSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("submodule", Some(ArgumentSpec::attribute("name")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(SUBMODULE_RULES)
    }

    fn on_pre_linkage_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let Some(name) = build.arena.get(ctx).raw_argument_arc().cloned() else {
            return Err(missing_argument(build, ctx, "submodule"));
        };
        let sym = build.interner.intern(&name);
        let revision = latest_revision(build, ctx)?;
        build.ns_put(ctx, &SUBMODULE, NsKey::NameRev(sym, revision), ctx);
        Ok(())
    }

    fn on_linkage_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let Some(name) = build.arena.get(ctx).raw_argument_arc().cloned() else {
            return Err(missing_argument(build, ctx, "submodule"));
        };
        let at = build.arena.get(ctx).source_ref().clone();
        let Some(owner_name) = build.arena.declared_child_arg(ctx, "belongs-to") else {
            return Err(ReactorError::InvalidArgument {
                keyword: "submodule".to_owned(),
                message: format!("submodule `{name}` has no belongs-to statement"),
                at,
            });
        };
        let owner_sym = build.interner.intern(&owner_name);
        let Some(owner) = build.ns_get(ctx, &MODULE, &NsKey::Name(owner_sym)) else {
            return Err(ReactorError::UnresolvableReference {
                reference: format!("module `{owner_name}`"),
                at,
            });
        };

        let uri = build.arena.declared_child_arg(owner, "namespace").ok_or_else(|| {
            ReactorError::InvalidArgument {
                keyword: "submodule".to_owned(),
                message: format!("module `{owner_name}` has no namespace statement"),
                at: at.clone(),
            }
        })?;
        let revision = latest_revision(build, owner)?;
        let uri_sym = build.interner.intern(&uri);
        build.set_module_identity(ctx, QNameModule::new(uri_sym, revision));

        if let Some(belongs_to) = build.arena.find_declared_child(ctx, "belongs-to") {
            if let Some(prefix) = build.arena.declared_child_arg(belongs_to, "prefix") {
                bind_prefix(build, ctx, owner, &prefix, belongs_to)?;
            }
        }
        Ok(())
    }
}

const INCLUDE_RULES: &[SubstatementRule] = &[
    SubstatementRule::at_most_one("revision-date"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
];

/// Header statements of a submodule; everything else is merged into the
/// including tree.
const SUBMODULE_HEADER: &[&str] = &[
    "belongs-to",
    "revision",
    "import",
    "include",
    "organization",
    "contact",
    "description",
    "reference",
];

/// `include`: resolves the named submodule during linkage, then merges its
/// body into the including tree once the submodule's own effective
/// construction (uses/augment expansion) has settled.
struct IncludeSupport;

impl StatementSupport for IncludeSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("include", Some(ArgumentSpec::attribute("submodule")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(INCLUDE_RULES)
    }

    fn on_linkage_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let Some(name) = build.arena.get(ctx).raw_argument_arc().cloned() else {
            return Err(missing_argument(build, ctx, "include"));
        };
        let name_sym = build.interner.intern(&name);
        let at = build.arena.get(ctx).source_ref().clone();
        let revision = match build.arena.declared_child_arg(ctx, "revision-date") {
            Some(raw) => Some(Revision::parse(&raw).map_err(|e| {
                ReactorError::InvalidArgument {
                    keyword: "revision-date".to_owned(),
                    message: e.to_string(),
                    at: at.clone(),
                }
            })?),
            None => None,
        };

        let found = match revision {
            Some(rev) => build.ns_get(ctx, &SUBMODULE, &NsKey::NameRev(name_sym, Some(rev))),
            None => build
                .ns_get_first_by(ctx, &SUBMODULE, |key| {
                    matches!(key, NsKey::NameRev(sym, _) if *sym == name_sym)
                })
                .map(|(_, found)| found),
        };
        let Some(submodule) = found else {
            return Err(ReactorError::UnresolvableReference {
                reference: format!("included submodule `{name}`"),
                at,
            });
        };

        let root = build.arena.root_of(ctx);
        if build.arena.get(root).keyword() == "module" {
            let owner = build.arena.declared_child_arg(submodule, "belongs-to");
            let module_name = build.arena.get(root).raw_argument().map(str::to_owned);
            if let (Some(owner), Some(module_name)) = (owner, module_name) {
                if &*owner != module_name {
                    return Err(ReactorError::SemanticConflict {
                        message: format!(
                            "submodule `{name}` belongs to module `{owner}`, not `{module_name}`"
                        ),
                        first: build.arena.get(submodule).source_ref().clone(),
                        second: at,
                    });
                }
            }
        }

        let mut action = build.new_action(ctx, Phase::EffectiveModel);
        let source = action.requires_ctx(submodule, Phase::EffectiveModel);
        action.mutates_effective_ctx(root);
        action.apply(Box::new(IncludeAction {
            target: root,
            submodule: source,
            name,
            at,
        }));
        Ok(())
    }
}

struct IncludeAction {
    target: CtxId,
    submodule: PrereqHandle,
    name: Arc<str>,
    at: SourceRef,
}

impl InferenceAction for IncludeAction {
    fn apply(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let submodule = ctx.resolve(self.submodule);
        let build = &mut *ctx.build;
        let children: Vec<CtxId> = build
            .arena
            .get(submodule)
            .effective_children()
            .filter(|&child| {
                let child_ctx = build.arena.get(child);
                child_ctx.is_supported() && !SUBMODULE_HEADER.contains(&child_ctx.keyword())
            })
            .collect();
        for child in children {
            let copy = build
                .arena
                .child_copy_of(child, self.target, CopyType::AddedByAugmentation)?;
            build.notify_copied(copy)?;
        }
        tracing::debug!(submodule = %self.name, "submodule body merged");
        Ok(())
    }

    fn prerequisite_failed(&mut self, _build: &mut BuildContext, _failed: &[String]) -> Result<()> {
        Err(ReactorError::UnresolvableReference {
            reference: format!("included submodule `{}`", self.name),
            at: self.at.clone(),
        })
    }
}

/// Latest declared revision of a module, if any.
pub(crate) fn latest_revision(build: &BuildContext, module: CtxId) -> Result<Option<Revision>> {
    let mut latest: Option<Revision> = None;
    for child in build.arena.get(module).declared_children() {
        let child_ctx = build.arena.get(*child);
        if child_ctx.keyword() != "revision" {
            continue;
        }
        let Some(raw) = child_ctx.raw_argument() else {
            continue;
        };
        let parsed = Revision::parse(raw).map_err(|e| ReactorError::InvalidArgument {
            keyword: "revision".to_owned(),
            message: e.to_string(),
            at: child_ctx.source_ref().clone(),
        })?;
        if latest.is_none_or(|current| parsed > current) {
            latest = Some(parsed);
        }
    }
    Ok(latest)
}

pub(crate) fn missing_argument(build: &BuildContext, ctx: CtxId, keyword: &str) -> ReactorError {
    ReactorError::InvalidArgument {
        keyword: keyword.to_owned(),
        message: "missing argument".to_owned(),
        at: build.arena.get(ctx).source_ref().clone(),
    }
}

const IMPORT_RULES: &[SubstatementRule] = &[
    SubstatementRule::exactly_one("prefix"),
    SubstatementRule::at_most_one("revision-date"),
    SubstatementRule::at_most_one("semantic-version"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
];

/// `import`: waits for the imported module to finish linkage, then binds
/// the import's prefix to it inside the importing module.
struct ImportSupport;

impl StatementSupport for ImportSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("import", Some(ArgumentSpec::attribute("module")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(IMPORT_RULES)
    }

    fn on_linkage_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let Some(name) = build.arena.get(ctx).raw_argument_arc().cloned() else {
            return Err(missing_argument(build, ctx, "import"));
        };
        let name_sym = build.interner.intern(&name);
        let revision = match build.arena.declared_child_arg(ctx, "revision-date") {
            Some(raw) => Some(Revision::parse(&raw).map_err(|e| {
                ReactorError::InvalidArgument {
                    keyword: "revision-date".to_owned(),
                    message: e.to_string(),
                    at: build.arena.get(ctx).source_ref().clone(),
                }
            })?),
            None => None,
        };
        let module_root = build.arena.root_of(ctx);

        let mut action = build.new_action(ctx, Phase::SourceLinkage);
        let target = match revision {
            Some(rev) => action.requires_ctx_in_ns(
                ctx,
                &MODULE_BY_QNAME,
                NsKey::NameRev(name_sym, Some(rev)),
                Phase::SourceLinkage,
            ),
            None => action.requires_ctx_in_ns_by(
                ctx,
                &MODULE_BY_QNAME,
                Box::new(move |key| matches!(key, NsKey::NameRev(sym, _) if *sym == name_sym)),
                Phase::SourceLinkage,
            ),
        };
        action.mutates_ctx(module_root, Phase::SourceLinkage);
        action.apply(Box::new(ImportAction {
            import: ctx,
            module_root,
            target,
        }));
        Ok(())
    }
}

struct ImportAction {
    import: CtxId,
    module_root: CtxId,
    target: PrereqHandle,
}

impl InferenceAction for ImportAction {
    fn apply(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let target = ctx.resolve(self.target);
        let build = &mut *ctx.build;
        // Cardinality rules only run at full declaration; a prefixless
        // import has to be caught here.
        let Some(prefix) = build.arena.declared_child_arg(self.import, "prefix") else {
            return Err(ReactorError::InvalidArgument {
                keyword: "import".to_owned(),
                message: "import has no prefix statement".to_owned(),
                at: build.arena.get(self.import).source_ref().clone(),
            });
        };
        bind_prefix(build, self.module_root, target, &prefix, self.import)?;
        tracing::debug!(
            import = ?build.arena.get(self.import).raw_argument(),
            prefix = %prefix,
            "import linked"
        );
        Ok(())
    }

    fn prerequisite_failed(
        &mut self,
        build: &mut BuildContext,
        _failed: &[String],
    ) -> Result<()> {
        let name = build
            .arena
            .get(self.import)
            .raw_argument()
            .unwrap_or("<unnamed>")
            .to_owned();
        Err(ReactorError::UnresolvableReference {
            reference: format!("imported module `{name}`"),
            at: build.arena.get(self.import).source_ref().clone(),
        })
    }
}
