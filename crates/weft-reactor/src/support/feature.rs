//! `feature` and `if-feature`: conditional presence of statements under a
//! build-time feature set.

use std::sync::Arc;

use weft_model::{ArgumentSpec, SourceRef, StatementDefinition, Symbol};

use crate::action::{ActionContext, InferenceAction, PrereqHandle};
use crate::build::BuildContext;
use crate::context::{ArgValue, CtxId};
use crate::error::{ReactorError, Result};
use crate::namespace::{NsKey, FEATURE};
use crate::phase::Phase;

use super::{StatementSupport, SubstatementRule, SupportRegistryBuilder};

pub(super) fn register(builder: &mut SupportRegistryBuilder) {
    builder.add(Phase::FullDeclaration, "feature", Arc::new(FeatureSupport));
    builder.add(Phase::FullDeclaration, "if-feature", Arc::new(IfFeatureSupport));
}

const FEATURE_RULES: &[SubstatementRule] = &[
    SubstatementRule::any("if-feature"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
];

struct FeatureSupport;

impl StatementSupport for FeatureSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("feature", Some(ArgumentSpec::attribute("name")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(FEATURE_RULES)
    }

    fn on_full_definition_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let Some(name) = build.arena.get(ctx).raw_argument_arc().cloned() else {
            return Err(ReactorError::InvalidArgument {
                keyword: "feature".to_owned(),
                message: "missing feature name".to_owned(),
                at: build.arena.get(ctx).source_ref().clone(),
            });
        };
        let root = build.arena.root_of(ctx);
        if let Some(qname) = build.qname_in_module(root, &name) {
            let key = NsKey::QName(qname);
            if let Some(existing) = build.ns_get(ctx, &FEATURE, &key) {
                if existing != ctx {
                    return Err(ReactorError::SemanticConflict {
                        message: format!("feature `{name}` defined twice"),
                        first: build.arena.get(existing).source_ref().clone(),
                        second: build.arena.get(ctx).source_ref().clone(),
                    });
                }
                return Ok(());
            }
            build.ns_put(ctx, &FEATURE, key, ctx);
        }
        Ok(())
    }
}

/// `if-feature`: resolves the named feature, then disables the parent
/// statement when the feature is absent from the supported-feature set.
struct IfFeatureSupport;

impl StatementSupport for IfFeatureSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("if-feature", Some(ArgumentSpec::attribute("name")))
    }

    fn parse_argument(&self, build: &mut BuildContext, raw: &str, ctx: CtxId) -> Result<ArgValue> {
        super::grouping::parse_identifier_ref(build, "if-feature", raw, ctx)
    }

    fn on_full_definition_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let Some(parent) = build.arena.get(ctx).parent() else {
            return Ok(());
        };
        let parent_ignores = build
            .arena
            .get(parent)
            .def()
            .is_some_and(|def| build.support(def).is_ignoring_if_feature());
        if parent_ignores {
            return Ok(());
        }
        let Some(ArgValue::Identifier { prefix, name }) = build.arena.get(ctx).argument().cloned()
        else {
            return Ok(());
        };
        let at = build.arena.get(ctx).source_ref().clone();

        let module = build.resolve_prefix(ctx, prefix.as_deref()).ok_or_else(|| {
            ReactorError::UnresolvableReference {
                reference: format!("prefix `{}`", prefix.as_deref().unwrap_or_default()),
                at: at.clone(),
            }
        })?;
        let Some(qname) = build.qname_in_module(module, &name) else {
            return Err(ReactorError::UnresolvableReference {
                reference: format!("feature `{name}`"),
                at,
            });
        };
        let module_name = build
            .arena
            .get(module)
            .raw_argument_arc()
            .map(|arg| build.interner.intern(arg));

        let mut action = build.new_action(ctx, Phase::FullDeclaration);
        let feature = action.requires_ctx_in_ns(ctx, &FEATURE, NsKey::QName(qname), Phase::FullDeclaration);
        action.mutates_ctx(parent, Phase::FullDeclaration);
        action.apply(Box::new(IfFeatureAction {
            feature,
            gated: parent,
            module_name,
            feature_name: name,
            at,
        }));
        Ok(())
    }
}

struct IfFeatureAction {
    feature: PrereqHandle,
    /// The statement carrying the if-feature.
    gated: CtxId,
    /// Name symbol of the feature's defining module.
    module_name: Option<Symbol>,
    feature_name: Arc<str>,
    at: SourceRef,
}

impl InferenceAction for IfFeatureAction {
    fn apply(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let _defined = ctx.resolve(self.feature);
        let build = &mut *ctx.build;
        let feature_sym = build.interner.intern(&self.feature_name);
        let supported = match self.module_name {
            Some(module_name) => build.feature_supported(module_name, feature_sym),
            None => true,
        };
        if !supported {
            build.arena.set_unsupported_by_features(self.gated);
        }
        Ok(())
    }

    fn prerequisite_failed(&mut self, _build: &mut BuildContext, _failed: &[String]) -> Result<()> {
        Err(ReactorError::UnresolvableReference {
            reference: format!("feature `{}`", self.feature_name),
            at: self.at.clone(),
        })
    }

    fn prerequisite_unavailable(&mut self, build: &mut BuildContext) -> Result<()> {
        // A feature disabled by its own if-feature disables dependents too.
        build.arena.set_unsupported_by_features(self.gated);
        Ok(())
    }
}
