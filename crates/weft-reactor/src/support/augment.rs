//! `augment`: grafting substatements onto a schema node named by path,
//! possibly in another module.

use std::sync::Arc;

use weft_model::{ArgumentSpec, SourceRef, StatementDefinition};

use crate::action::{ActionContext, InferenceAction, PrereqHandle};
use crate::build::BuildContext;
use crate::context::{ArgValue, CopyType, CtxId};
use crate::error::{ReactorError, Result};
use crate::namespace::{NsKey, SCHEMA_NODE};
use crate::phase::Phase;

use super::{StatementSupport, SubstatementRule, SupportRegistryBuilder};

pub(super) fn register(builder: &mut SupportRegistryBuilder) {
    builder.add(Phase::FullDeclaration, "augment", Arc::new(AugmentSupport));
}

/// Substatements describing the augment itself; never copied to the target.
const NOT_COPIED: &[&str] = &["description", "reference", "status", "when", "if-feature"];

const AUGMENT_RULES: &[SubstatementRule] = &[
    SubstatementRule::any("container"),
    SubstatementRule::any("leaf"),
    SubstatementRule::any("leaf-list"),
    SubstatementRule::any("list"),
    SubstatementRule::any("choice"),
    SubstatementRule::any("case"),
    SubstatementRule::any("uses"),
    SubstatementRule::any("if-feature"),
    SubstatementRule::at_most_one("when"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
];

struct AugmentSupport;

impl StatementSupport for AugmentSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("augment", Some(ArgumentSpec::attribute("target-node")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(AUGMENT_RULES)
    }

    fn parse_argument(&self, build: &mut BuildContext, raw: &str, ctx: CtxId) -> Result<ArgValue> {
        parse_schema_path(build, "augment", raw, ctx)
    }

    fn on_full_definition_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let under_uses = build
            .arena
            .get(ctx)
            .parent()
            .is_some_and(|parent| build.arena.get(parent).keyword() == "uses");
        if under_uses {
            // Expanded by the enclosing uses, against the copied subtree.
            return Ok(());
        }

        let at = build.arena.get(ctx).source_ref().clone();
        let Some(ArgValue::SchemaPath { absolute, steps }) =
            build.arena.get(ctx).argument().cloned()
        else {
            return Ok(());
        };
        if !absolute {
            return Err(ReactorError::InvalidArgument {
                keyword: "augment".to_owned(),
                message: "top-level augment takes an absolute schema path".to_owned(),
                at,
            });
        }

        // The first step's prefix names the module whose tree is walked;
        // later steps resolve against whatever module each step's prefix
        // names (the usual case is one prefix throughout).
        let root = resolve_step_root(build, ctx, steps[0].0.as_deref(), &at)?;
        let mut keys = Vec::with_capacity(steps.len());
        for (prefix, name) in &steps {
            let step_root = resolve_step_root(build, ctx, prefix.as_deref(), &at)?;
            let qname = build.qname_in_module(step_root, name).ok_or_else(|| {
                ReactorError::UnresolvableReference {
                    reference: format!("schema node `{name}`"),
                    at: at.clone(),
                }
            })?;
            keys.push(NsKey::QName(qname));
        }
        let path = render_path(&steps);

        let mut action = build.new_action(ctx, Phase::EffectiveModel);
        let target = action.mutates_effective_ctx_path(root, &SCHEMA_NODE, keys);
        action.apply(Box::new(AugmentAction {
            augment: ctx,
            target,
            path,
            at,
        }));
        Ok(())
    }
}

fn resolve_step_root(
    build: &BuildContext,
    ctx: CtxId,
    prefix: Option<&str>,
    at: &SourceRef,
) -> Result<CtxId> {
    build
        .resolve_prefix(ctx, prefix)
        .ok_or_else(|| ReactorError::UnresolvableReference {
            reference: format!("prefix `{}`", prefix.unwrap_or_default()),
            at: at.clone(),
        })
}

struct AugmentAction {
    augment: CtxId,
    target: PrereqHandle,
    path: String,
    at: SourceRef,
}

impl InferenceAction for AugmentAction {
    fn apply(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let target = ctx.resolve(self.target);
        let build = &mut *ctx.build;
        let children: Vec<CtxId> = build
            .arena
            .get(self.augment)
            .effective_children()
            .filter(|&child| {
                let child_ctx = build.arena.get(child);
                child_ctx.is_supported() && !NOT_COPIED.contains(&child_ctx.keyword())
            })
            .collect();
        for child in children {
            let copy = build
                .arena
                .child_copy_of(child, target, CopyType::AddedByAugmentation)?;
            build.notify_copied(copy)?;
        }
        Ok(())
    }

    fn prerequisite_failed(&mut self, _build: &mut BuildContext, _failed: &[String]) -> Result<()> {
        Err(ReactorError::UnresolvableReference {
            reference: format!("augment target `{}`", self.path),
            at: self.at.clone(),
        })
    }

    fn prerequisite_unavailable(&mut self, build: &mut BuildContext) -> Result<()> {
        tracing::debug!(
            target = %self.path,
            at = %self.at,
            "augment target is unsupported; skipping augmentation"
        );
        build.arena.set_unsupported(self.augment);
        Ok(())
    }
}

fn render_path(steps: &[(Option<Arc<str>>, Arc<str>)]) -> String {
    let mut out = String::new();
    for (prefix, name) in steps {
        out.push('/');
        if let Some(prefix) = prefix {
            out.push_str(prefix);
            out.push(':');
        }
        out.push_str(name);
    }
    out
}

/// Parse a schema-node path argument (`/pfx:a/pfx:b` or `a/b`).
pub(super) fn parse_schema_path(
    build: &mut BuildContext,
    keyword: &str,
    raw: &str,
    ctx: CtxId,
) -> Result<ArgValue> {
    let malformed = || ReactorError::InvalidArgument {
        keyword: keyword.to_owned(),
        message: format!("malformed schema path `{raw}`"),
        at: build.arena.get(ctx).source_ref().clone(),
    };

    let absolute = raw.starts_with('/');
    let body = if absolute { &raw[1..] } else { raw };
    if body.is_empty() {
        return Err(malformed());
    }
    let mut steps = Vec::new();
    for segment in body.split('/') {
        let (prefix, name) = match segment.split_once(':') {
            Some((prefix, name)) => (Some(prefix), name),
            None => (None, segment),
        };
        if name.is_empty() || prefix.is_some_and(str::is_empty) {
            return Err(malformed());
        }
        steps.push((prefix.map(Arc::from), Arc::from(name)));
    }
    Ok(ArgValue::SchemaPath { absolute, steps })
}
