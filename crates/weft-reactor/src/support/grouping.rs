//! `grouping` and `uses`: reusable subtree definitions and their
//! expansion by copy.

use std::sync::Arc;

use weft_model::{ArgumentSpec, SourceRef, StatementDefinition};

use crate::action::{ActionContext, InferenceAction, PrereqHandle};
use crate::build::BuildContext;
use crate::context::{ArgValue, CopyType, CtxId};
use crate::error::{ReactorError, Result};
use crate::namespace::{NsKey, GROUPING, SCHEMA_NODE};
use crate::phase::Phase;

use super::{StatementSupport, SubstatementRule, SupportRegistryBuilder};

pub(super) fn register(builder: &mut SupportRegistryBuilder) {
    builder.add(Phase::FullDeclaration, "grouping", Arc::new(GroupingSupport));
    builder.add(Phase::FullDeclaration, "uses", Arc::new(UsesSupport));
}

/// Substatement keywords that describe the grouping itself and are not
/// copied to use sites.
const NOT_COPIED: &[&str] = &["description", "reference", "status"];

const GROUPING_RULES: &[SubstatementRule] = &[
    SubstatementRule::any("container"),
    SubstatementRule::any("leaf"),
    SubstatementRule::any("leaf-list"),
    SubstatementRule::any("list"),
    SubstatementRule::any("choice"),
    SubstatementRule::any("uses"),
    SubstatementRule::any("grouping"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
];

struct GroupingSupport;

impl StatementSupport for GroupingSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("grouping", Some(ArgumentSpec::attribute("name")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(GROUPING_RULES)
    }

    fn on_full_definition_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        register_grouping(build, ctx)
    }

    fn on_added_by_copy(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        register_grouping(build, ctx)
    }
}

fn register_grouping(build: &mut BuildContext, ctx: CtxId) -> Result<()> {
    let Some(parent) = build.arena.get(ctx).parent() else {
        return Ok(());
    };
    let Some(name) = build.arena.get(ctx).raw_argument_arc().cloned() else {
        return Err(ReactorError::InvalidArgument {
            keyword: "grouping".to_owned(),
            message: "missing grouping name".to_owned(),
            at: build.arena.get(ctx).source_ref().clone(),
        });
    };
    let key = NsKey::Name(build.interner.intern(&name));
    if let Some(existing) = build.arena.get(parent).namespaces.get(&GROUPING, &key) {
        if existing == ctx {
            return Ok(());
        }
        return Err(ReactorError::SemanticConflict {
            message: format!("grouping `{name}` defined twice in the same scope"),
            first: build.arena.get(existing).source_ref().clone(),
            second: build.arena.get(ctx).source_ref().clone(),
        });
    }
    build.ns_put(parent, &GROUPING, key, ctx);
    Ok(())
}

const USES_RULES: &[SubstatementRule] = &[
    SubstatementRule::any("augment"),
    SubstatementRule::any("if-feature"),
    SubstatementRule::at_most_one("when"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
];

/// `uses`: waits for the referenced grouping to finish its own effective
/// construction (so nested expansions inside the grouping are already
/// present), then copies the grouping's substatements next to itself.
struct UsesSupport;

impl StatementSupport for UsesSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("uses", Some(ArgumentSpec::attribute("name")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(USES_RULES)
    }

    fn parse_argument(&self, build: &mut BuildContext, raw: &str, ctx: CtxId) -> Result<ArgValue> {
        parse_identifier_ref(build, "uses", raw, ctx)
    }

    fn on_full_definition_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let Some(parent) = build.arena.get(ctx).parent() else {
            return Ok(());
        };
        let Some(ArgValue::Identifier { prefix, name }) = build.arena.get(ctx).argument().cloned()
        else {
            return Ok(());
        };
        let at = build.arena.get(ctx).source_ref().clone();

        let start = match &prefix {
            None => ctx,
            Some(prefix) => {
                build
                    .resolve_prefix(ctx, Some(prefix))
                    .ok_or_else(|| ReactorError::UnresolvableReference {
                        reference: format!("prefix `{prefix}`"),
                        at: at.clone(),
                    })?
            }
        };
        let key = NsKey::Name(build.interner.intern(&name));

        let mut action = build.new_action(ctx, Phase::EffectiveModel);
        let grouping = action.requires_ctx_in_ns(start, &GROUPING, key, Phase::EffectiveModel);
        let target = action.mutates_effective_ctx(parent);
        action.apply(Box::new(UsesAction {
            uses: ctx,
            grouping,
            target,
            name,
            at,
        }));
        Ok(())
    }
}

struct UsesAction {
    uses: CtxId,
    grouping: PrereqHandle,
    target: PrereqHandle,
    name: Arc<str>,
    at: SourceRef,
}

impl InferenceAction for UsesAction {
    fn apply(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let grouping = ctx.resolve(self.grouping);
        let target = ctx.resolve(self.target);
        let build = &mut *ctx.build;

        let children: Vec<CtxId> = build
            .arena
            .get(grouping)
            .effective_children()
            .filter(|&child| {
                let child_ctx = build.arena.get(child);
                child_ctx.is_supported() && !NOT_COPIED.contains(&child_ctx.keyword())
            })
            .collect();
        for child in children {
            let copy = build.arena.child_copy_of(child, target, CopyType::AddedByUses)?;
            build.notify_copied(copy)?;
        }

        // `augment` under `uses`: a relative descendant path into the
        // just-copied subtree.
        let augments: Vec<CtxId> = build
            .arena
            .get(self.uses)
            .declared_children()
            .iter()
            .copied()
            .filter(|&child| build.arena.get(child).keyword() == "augment")
            .collect();
        for augment in augments {
            self.apply_uses_augment(build, target, augment)?;
        }
        Ok(())
    }

    fn prerequisite_failed(&mut self, _build: &mut BuildContext, _failed: &[String]) -> Result<()> {
        Err(ReactorError::UnresolvableReference {
            reference: format!("grouping `{}`", self.name),
            at: self.at.clone(),
        })
    }

    fn prerequisite_unavailable(&mut self, build: &mut BuildContext) -> Result<()> {
        tracing::debug!(
            grouping = %self.name,
            at = %self.at,
            "grouping is unsupported; skipping uses expansion"
        );
        build.arena.set_unsupported(self.uses);
        Ok(())
    }
}

impl UsesAction {
    fn apply_uses_augment(
        &self,
        build: &mut BuildContext,
        target: CtxId,
        augment: CtxId,
    ) -> Result<()> {
        let at = build.arena.get(augment).source_ref().clone();
        let Some(ArgValue::SchemaPath { absolute, steps }) =
            build.arena.get(augment).argument().cloned()
        else {
            return Ok(());
        };
        if absolute {
            return Err(ReactorError::InvalidArgument {
                keyword: "augment".to_owned(),
                message: "augment under uses takes a relative descendant path".to_owned(),
                at,
            });
        }

        let root = build.arena.root_of(target);
        let mut current = target;
        for (_, step) in &steps {
            let qname = build.qname_in_module(root, step).ok_or_else(|| {
                ReactorError::UnresolvableReference {
                    reference: format!("schema node `{step}`"),
                    at: at.clone(),
                }
            })?;
            current = build
                .arena
                .get(current)
                .namespaces
                .get(&SCHEMA_NODE, &NsKey::QName(qname))
                .ok_or_else(|| ReactorError::UnresolvableReference {
                    reference: format!(
                        "augment target `{}` in grouping `{}`",
                        render_steps(&steps),
                        self.name
                    ),
                    at: at.clone(),
                })?;
        }

        let children: Vec<CtxId> = build
            .arena
            .get(augment)
            .effective_children()
            .filter(|&child| {
                let child_ctx = build.arena.get(child);
                child_ctx.is_supported() && !NOT_COPIED.contains(&child_ctx.keyword())
            })
            .collect();
        for child in children {
            let copy = build
                .arena
                .child_copy_of(child, current, CopyType::AddedByUsesAugmentation)?;
            build.notify_copied(copy)?;
        }
        Ok(())
    }
}

fn render_steps(steps: &[(Option<Arc<str>>, Arc<str>)]) -> String {
    steps
        .iter()
        .map(|(prefix, name)| match prefix {
            Some(prefix) => format!("{prefix}:{name}"),
            None => name.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Parse a possibly-prefixed identifier reference (`name` or `pfx:name`).
pub(super) fn parse_identifier_ref(
    build: &mut BuildContext,
    keyword: &str,
    raw: &str,
    ctx: CtxId,
) -> Result<ArgValue> {
    let (prefix, name) = match raw.split_once(':') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, raw),
    };
    if name.is_empty() || prefix.is_some_and(str::is_empty) {
        return Err(ReactorError::InvalidArgument {
            keyword: keyword.to_owned(),
            message: format!("malformed identifier reference `{raw}`"),
            at: build.arena.get(ctx).source_ref().clone(),
        });
    }
    Ok(ArgValue::Identifier {
        prefix: prefix.map(Arc::from),
        name: Arc::from(name),
    })
}
