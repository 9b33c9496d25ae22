//! `extension`, `argument`, `yin-element`, and the shared behavior of
//! extension-instantiated statements.

use std::sync::Arc;

use weft_model::{ArgumentSpec, StatementDefinition};

use crate::build::BuildContext;
use crate::context::{ArgValue, CtxId};
use crate::error::{ReactorError, Result};
use crate::namespace::{NsKey, EXTENSION};
use crate::phase::Phase;

use super::{StatementSupport, SubstatementRule, SupportRegistryBuilder};

pub(super) fn register(builder: &mut SupportRegistryBuilder) {
    builder.add(
        Phase::StatementDefinition,
        "extension",
        Arc::new(ExtensionSupport),
    );
    builder.add(
        Phase::StatementDefinition,
        "argument",
        Arc::new(ArgumentSupport),
    );
    builder.add(
        Phase::StatementDefinition,
        "yin-element",
        Arc::new(YinElementSupport),
    );
}

const EXTENSION_RULES: &[SubstatementRule] = &[
    SubstatementRule::at_most_one("argument"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
];

/// `extension`: announces a new statement kind. Registration happens in
/// the statement-definition phase, which is exactly when instantiations
/// (`pfx:name` keywords) become resolvable.
struct ExtensionSupport;

impl StatementSupport for ExtensionSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("extension", Some(ArgumentSpec::attribute("name")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(EXTENSION_RULES)
    }

    fn on_statement_definition_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        let Some(name) = build.arena.get(ctx).raw_argument_arc().cloned() else {
            return Err(ReactorError::InvalidArgument {
                keyword: "extension".to_owned(),
                message: "missing extension name".to_owned(),
                at: build.arena.get(ctx).source_ref().clone(),
            });
        };
        let root = build.arena.root_of(ctx);
        if let Some(qname) = build.qname_in_module(root, &name) {
            let key = NsKey::QName(qname);
            if let Some(existing) = build.ns_get(ctx, &EXTENSION, &key) {
                if existing != ctx {
                    return Err(ReactorError::SemanticConflict {
                        message: format!("extension `{name}` defined twice"),
                        first: build.arena.get(existing).source_ref().clone(),
                        second: build.arena.get(ctx).source_ref().clone(),
                    });
                }
                return Ok(());
            }
            build.ns_put(ctx, &EXTENSION, key, ctx);
        }
        Ok(())
    }
}

const ARGUMENT_RULES: &[SubstatementRule] = &[SubstatementRule::at_most_one("yin-element")];

struct ArgumentSupport;

impl StatementSupport for ArgumentSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("argument", Some(ArgumentSpec::attribute("name")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(ARGUMENT_RULES)
    }
}

struct YinElementSupport;

impl StatementSupport for YinElementSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("yin-element", Some(ArgumentSpec::attribute("value")))
    }

    fn parse_argument(&self, build: &mut BuildContext, raw: &str, ctx: CtxId) -> Result<ArgValue> {
        match raw {
            "true" => Ok(ArgValue::Bool(true)),
            "false" => Ok(ArgValue::Bool(false)),
            _ => Err(ReactorError::InvalidArgument {
                keyword: "yin-element".to_owned(),
                message: format!("`{raw}` is not a boolean"),
                at: build.arena.get(ctx).source_ref().clone(),
            }),
        }
    }
}

/// Behavior shared by every extension-instantiated statement. Its real
/// definition (keyword, defining extension, argument shape) is built from
/// the resolved `extension` statement at keyword-resolution time; this
/// support only contributes the phase-callback no-ops and a fully
/// permissive grammar.
pub(super) struct UnknownSupport;

impl StatementSupport for UnknownSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("unknown", Some(ArgumentSpec::attribute("value")))
    }
}
