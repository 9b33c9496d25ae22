//! `deviation` and `deviate`: post-hoc amendment of another module's
//! effective statements.

use std::sync::Arc;

use weft_model::{ArgumentSpec, DefId, SourceRef, StatementDefinition};

use crate::action::{ActionContext, InferenceAction, PrereqHandle};
use crate::build::BuildContext;
use crate::context::{ArgValue, CopyType, CtxId, DeviateKind};
use crate::error::{ReactorError, Result};
use crate::namespace::{NsKey, DEVIATION_TARGET, SCHEMA_NODE};
use crate::phase::Phase;

use super::augment::parse_schema_path;
use super::{StatementSupport, SubstatementRule, SupportRegistryBuilder};

pub(super) fn register(builder: &mut SupportRegistryBuilder) {
    builder.add(Phase::FullDeclaration, "deviation", Arc::new(DeviationSupport));
    builder.add(Phase::FullDeclaration, "deviate", Arc::new(DeviateSupport));
}

/// Which target statement kinds each deviate property may amend. A property
/// applied to a target kind outside its row is a fatal inference error.
pub fn deviate_validity(property: &str) -> Option<&'static [&'static str]> {
    Some(match property {
        "units" => &["leaf", "leaf-list"],
        "default" => &["leaf", "leaf-list", "choice"],
        "config" => &["container", "leaf", "leaf-list", "list", "choice"],
        "mandatory" => &["leaf", "choice"],
        "min-elements" | "max-elements" => &["leaf-list", "list"],
        _ => return None,
    })
}

/// Property kinds that may appear at most once on a target. `default` is
/// singleton except on a leaf-list.
fn is_singleton(property: &str, target_kind: &str) -> bool {
    match property {
        "units" | "config" | "mandatory" | "min-elements" | "max-elements" => true,
        "default" => target_kind != "leaf-list",
        _ => false,
    }
}

/// Property kinds with an implicit value even when undeclared; `deviate
/// replace` falls back to `add` for these.
fn has_implicit_value(property: &str) -> bool {
    matches!(
        property,
        "config" | "mandatory" | "max-elements" | "min-elements"
    )
}

const DEVIATION_RULES: &[SubstatementRule] = &[
    SubstatementRule::any("deviate"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
];

struct DeviationSupport;

impl StatementSupport for DeviationSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("deviation", Some(ArgumentSpec::attribute("target-node")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(DEVIATION_RULES)
    }

    fn parse_argument(&self, build: &mut BuildContext, raw: &str, ctx: CtxId) -> Result<ArgValue> {
        parse_schema_path(build, "deviation", raw, ctx)
    }

    fn on_full_definition_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let at = build.arena.get(ctx).source_ref().clone();
        let Some(ArgValue::SchemaPath { absolute, steps }) =
            build.arena.get(ctx).argument().cloned()
        else {
            return Ok(());
        };
        if !absolute {
            return Err(ReactorError::InvalidArgument {
                keyword: "deviation".to_owned(),
                message: "deviation takes an absolute schema path".to_owned(),
                at,
            });
        }

        let root = build
            .resolve_prefix(ctx, steps[0].0.as_deref())
            .ok_or_else(|| ReactorError::UnresolvableReference {
                reference: format!("prefix `{}`", steps[0].0.as_deref().unwrap_or_default()),
                at: at.clone(),
            })?;

        // A deviating module may be restricted to an allow-list supplied at
        // compilation start; deviations outside it are dropped, not fatal.
        let own_root = build.arena.root_of(ctx);
        let deviating = build.arena.get(own_root).raw_argument_arc().cloned();
        let target_module = build.arena.get(root).raw_argument_arc().cloned();
        if let (Some(deviating), Some(target_module)) = (&deviating, &target_module) {
            let deviating_sym = build.interner.intern(deviating);
            let target_sym = build.interner.intern(target_module);
            if !build.deviation_permitted(target_sym, deviating_sym) {
                tracing::warn!(
                    module = %deviating,
                    target = %target_module,
                    at = %at,
                    "module is not permitted to deviate target module; deviation dropped"
                );
                return Ok(());
            }
        }

        let mut keys = Vec::with_capacity(steps.len());
        for (prefix, name) in &steps {
            let step_root = build.resolve_prefix(ctx, prefix.as_deref()).ok_or_else(|| {
                ReactorError::UnresolvableReference {
                    reference: format!("prefix `{}`", prefix.as_deref().unwrap_or_default()),
                    at: at.clone(),
                }
            })?;
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
        action.apply(Box::new(DeviationAction {
            deviation: ctx,
            target,
            path,
            at,
        }));
        Ok(())
    }
}

struct DeviateSupport;

impl StatementSupport for DeviateSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("deviate", Some(ArgumentSpec::attribute("value")))
    }

    fn parse_argument(&self, build: &mut BuildContext, raw: &str, ctx: CtxId) -> Result<ArgValue> {
        match DeviateKind::parse(raw) {
            Some(kind) => Ok(ArgValue::Deviate(kind)),
            None => Err(ReactorError::InvalidArgument {
                keyword: "deviate".to_owned(),
                message: format!(
                    "`{raw}` is not a deviate kind (expected not-supported, add, replace or delete)"
                ),
                at: build.arena.get(ctx).source_ref().clone(),
            }),
        }
    }
}

struct DeviationAction {
    deviation: CtxId,
    target: PrereqHandle,
    path: String,
    at: SourceRef,
}

impl InferenceAction for DeviationAction {
    fn apply(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let target = ctx.resolve(self.target);
        let build = &mut *ctx.build;

        let key = NsKey::Name(build.interner.intern(&self.path));
        build.ns_put(self.deviation, &DEVIATION_TARGET, key, target);

        let deviates: Vec<CtxId> = build
            .arena
            .get(self.deviation)
            .declared_children()
            .iter()
            .copied()
            .filter(|&child| build.arena.get(child).keyword() == "deviate")
            .collect();
        for deviate in deviates {
            let Some(ArgValue::Deviate(kind)) = build.arena.get(deviate).argument().cloned() else {
                continue;
            };
            match kind {
                DeviateKind::NotSupported => build.arena.set_unsupported(target),
                DeviateKind::Add => self.apply_add(build, deviate, target)?,
                DeviateKind::Replace => self.apply_replace(build, deviate, target)?,
                DeviateKind::Delete => self.apply_delete(build, deviate, target)?,
            }
        }
        Ok(())
    }

    fn prerequisite_failed(&mut self, _build: &mut BuildContext, _failed: &[String]) -> Result<()> {
        Err(ReactorError::UnresolvableReference {
            reference: format!("deviation target `{}`", self.path),
            at: self.at.clone(),
        })
    }

    fn prerequisite_unavailable(&mut self, _build: &mut BuildContext) -> Result<()> {
        tracing::debug!(
            target = %self.path,
            at = %self.at,
            "deviation target is unsupported; deviation dropped"
        );
        Ok(())
    }
}

impl DeviationAction {
    fn apply_add(&self, build: &mut BuildContext, deviate: CtxId, target: CtxId) -> Result<()> {
        for property in properties(build, deviate) {
            let def = self.check_validity(build, property, target)?;
            let target_kind = build.arena.get(target).keyword().to_owned();
            let keyword = build.arena.get(property).keyword().to_owned();
            if is_singleton(&keyword, &target_kind) {
                if let Some(existing) = find_existing(build, target, def) {
                    return Err(ReactorError::SemanticConflict {
                        message: format!(
                            "deviate add: `{target_kind} {}` already carries a `{keyword}`",
                            build.arena.get(target).raw_argument().unwrap_or_default()
                        ),
                        first: build.arena.get(existing).source_ref().clone(),
                        second: build.arena.get(property).source_ref().clone(),
                    });
                }
            }
            let copy = build
                .arena
                .child_copy_of(property, target, CopyType::AddedByAugmentation)?;
            build.notify_copied(copy)?;
        }
        Ok(())
    }

    fn apply_replace(&self, build: &mut BuildContext, deviate: CtxId, target: CtxId) -> Result<()> {
        for property in properties(build, deviate) {
            let def = self.check_validity(build, property, target)?;
            let keyword = build.arena.get(property).keyword().to_owned();
            let existed = if find_existing(build, target, def).is_some() {
                build.arena.remove_effective_substatement(target, def, None)
            } else {
                false
            };
            if !existed && !has_implicit_value(&keyword) {
                return Err(ReactorError::Inference {
                    message: format!(
                        "deviate replace: `{}` has no `{keyword}` to replace",
                        build.arena.get(target).keyword()
                    ),
                    at: build.arena.get(property).source_ref().clone(),
                });
            }
            let copy = build
                .arena
                .child_copy_of(property, target, CopyType::AddedByAugmentation)?;
            build.notify_copied(copy)?;
        }
        Ok(())
    }

    fn apply_delete(&self, build: &mut BuildContext, deviate: CtxId, target: CtxId) -> Result<()> {
        for property in properties(build, deviate) {
            let def = self.check_validity(build, property, target)?;
            let argument = build.arena.get(property).raw_argument_arc().cloned();
            build
                .arena
                .remove_effective_substatement(target, def, argument.as_deref());
        }
        Ok(())
    }

    /// Validate one deviate property against the target's node kind.
    fn check_validity(
        &self,
        build: &BuildContext,
        property: CtxId,
        target: CtxId,
    ) -> Result<DefId> {
        let property_ctx = build.arena.get(property);
        let keyword = property_ctx.keyword();
        let target_kind = build.arena.get(target).keyword();
        let allowed = deviate_validity(keyword);
        let valid = match allowed {
            Some(kinds) => kinds.contains(&target_kind),
            // Kinds outside the table (description and friends) are not
            // deviatable properties at all.
            None => false,
        };
        if !valid {
            return Err(ReactorError::Inference {
                message: format!(
                    "`{keyword}` cannot deviate a `{target_kind}` (target `{}`)",
                    self.path
                ),
                at: property_ctx.source_ref().clone(),
            });
        }
        property_ctx
            .def()
            .ok_or_else(|| ReactorError::Inference {
                message: format!("deviate property `{keyword}` has no resolved definition"),
                at: property_ctx.source_ref().clone(),
            })
    }
}

/// The deviate's property substatements, in declaration order.
fn properties(build: &BuildContext, deviate: CtxId) -> Vec<CtxId> {
    build
        .arena
        .get(deviate)
        .declared_children()
        .iter()
        .copied()
        .filter(|&child| build.arena.get(child).is_supported())
        .collect()
}

/// First supported substatement of `target` (declared or effective)
/// matching `def`.
fn find_existing(build: &BuildContext, target: CtxId, def: DefId) -> Option<CtxId> {
    build.arena.get(target).effective_children().find(|&child| {
        let ctx = build.arena.get(child);
        ctx.def() == Some(def) && ctx.is_supported()
    })
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
