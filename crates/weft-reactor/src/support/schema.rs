//! Schema-node statement supports: the data-definition statements that
//! register themselves in the tree-scoped schema-node namespace, plus
//! `rpc` with its implicit `input`/`output`.

use std::sync::Arc;

use weft_model::{ArgumentSpec, StatementDefinition};

use crate::build::BuildContext;
use crate::context::CtxId;
use crate::error::{ReactorError, Result};
use crate::namespace::{NsKey, SCHEMA_NODE};
use crate::phase::Phase;

use super::{StatementSupport, SubstatementRule, SupportRegistryBuilder};

pub(super) fn register(builder: &mut SupportRegistryBuilder) {
    for node in DATA_NODES {
        builder.add(Phase::FullDeclaration, node.keyword, Arc::new(*node));
    }
    builder.add(Phase::FullDeclaration, "rpc", Arc::new(RpcSupport));
}

const COMMON_BODY: &[SubstatementRule] = &[
    SubstatementRule::any("container"),
    SubstatementRule::any("leaf"),
    SubstatementRule::any("leaf-list"),
    SubstatementRule::any("list"),
    SubstatementRule::any("choice"),
    SubstatementRule::any("uses"),
    SubstatementRule::any("grouping"),
    SubstatementRule::any("if-feature"),
    SubstatementRule::at_most_one("when"),
    SubstatementRule::at_most_one("config"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
    SubstatementRule::at_most_one("presence"),
];

const LEAF_RULES: &[SubstatementRule] = &[
    SubstatementRule::at_most_one("type"),
    SubstatementRule::at_most_one("units"),
    SubstatementRule::at_most_one("default"),
    SubstatementRule::at_most_one("config"),
    SubstatementRule::at_most_one("mandatory"),
    SubstatementRule::any("if-feature"),
    SubstatementRule::at_most_one("when"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
];

const LEAF_LIST_RULES: &[SubstatementRule] = &[
    SubstatementRule::at_most_one("type"),
    SubstatementRule::at_most_one("units"),
    SubstatementRule::any("default"),
    SubstatementRule::at_most_one("config"),
    SubstatementRule::at_most_one("min-elements"),
    SubstatementRule::at_most_one("max-elements"),
    SubstatementRule::any("if-feature"),
    SubstatementRule::at_most_one("when"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
];

const LIST_RULES: &[SubstatementRule] = &[
    // A keyless configuration list is tolerated here; list-key validation
    // is an argument-level rule outside the reactor's scope.
    SubstatementRule::at_most_one("key"),
    SubstatementRule::at_most_one("min-elements"),
    SubstatementRule::at_most_one("max-elements"),
    SubstatementRule::any("container"),
    SubstatementRule::any("leaf"),
    SubstatementRule::any("leaf-list"),
    SubstatementRule::any("list"),
    SubstatementRule::any("choice"),
    SubstatementRule::any("uses"),
    SubstatementRule::any("grouping"),
    SubstatementRule::any("if-feature"),
    SubstatementRule::at_most_one("when"),
    SubstatementRule::at_most_one("config"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
];

const CHOICE_RULES: &[SubstatementRule] = &[
    SubstatementRule::any("case"),
    // Shorthand branches: a data node directly under choice stands for a
    // single-node case.
    SubstatementRule::any("container"),
    SubstatementRule::any("leaf"),
    SubstatementRule::any("leaf-list"),
    SubstatementRule::any("list"),
    SubstatementRule::any("if-feature"),
    SubstatementRule::at_most_one("when"),
    SubstatementRule::at_most_one("default"),
    SubstatementRule::at_most_one("mandatory"),
    SubstatementRule::at_most_one("config"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
];

/// A data-definition statement kind. All of them share one behavior:
/// announce themselves in the parent's schema-node namespace when fully
/// declared, and again whenever a copy lands somewhere new.
#[derive(Clone, Copy, Debug)]
struct DataNodeSupport {
    keyword: &'static str,
    rules: &'static [SubstatementRule],
}

const DATA_NODES: &[DataNodeSupport] = &[
    DataNodeSupport {
        keyword: "container",
        rules: COMMON_BODY,
    },
    DataNodeSupport {
        keyword: "leaf",
        rules: LEAF_RULES,
    },
    DataNodeSupport {
        keyword: "leaf-list",
        rules: LEAF_LIST_RULES,
    },
    DataNodeSupport {
        keyword: "list",
        rules: LIST_RULES,
    },
    DataNodeSupport {
        keyword: "choice",
        rules: CHOICE_RULES,
    },
    DataNodeSupport {
        keyword: "case",
        rules: COMMON_BODY,
    },
    DataNodeSupport {
        keyword: "input",
        rules: COMMON_BODY,
    },
    DataNodeSupport {
        keyword: "output",
        rules: COMMON_BODY,
    },
];

impl StatementSupport for DataNodeSupport {
    fn definition(&self) -> StatementDefinition {
        let argument = match self.keyword {
            "input" | "output" => None,
            _ => Some(ArgumentSpec::attribute("name")),
        };
        StatementDefinition::core(self.keyword, argument)
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(self.rules)
    }

    fn on_full_definition_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        register_schema_node(build, ctx)
    }

    fn on_added_by_copy(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        register_schema_node(build, ctx)
    }
}

/// Bind `ctx` by qualified name in its parent's schema-node namespace.
/// The qualified name takes the namespace of the tree the statement sits
/// in; a node copied in via `uses` belongs to the using module.
pub(crate) fn register_schema_node(build: &mut BuildContext, ctx: CtxId) -> Result<()> {
    let Some(parent) = build.arena.get(ctx).parent() else {
        return Ok(());
    };
    let name: Arc<str> = match build.arena.get(ctx).raw_argument_arc() {
        Some(arg) => Arc::clone(arg),
        // input/output have no argument; their keyword is their name.
        None => Arc::clone(build.arena.get(ctx).raw_keyword()),
    };
    let root = build.arena.root_of(ctx);
    let Some(qname) = build.qname_in_module(root, &name) else {
        // Trees without module identity (library fragments) keep working;
        // nothing can path-reference into them anyway.
        return Ok(());
    };
    let key = NsKey::QName(qname);
    if let Some(existing) = build.arena.get(parent).namespaces.get(&SCHEMA_NODE, &key) {
        if existing == ctx {
            return Ok(());
        }
        return Err(ReactorError::SemanticConflict {
            message: format!(
                "duplicate schema node `{name}` under `{}`",
                build.arena.get(parent).keyword()
            ),
            first: build.arena.get(existing).source_ref().clone(),
            second: build.arena.get(ctx).source_ref().clone(),
        });
    }
    build.ns_put(parent, &SCHEMA_NODE, key, ctx);
    Ok(())
}

const RPC_RULES: &[SubstatementRule] = &[
    SubstatementRule::at_most_one("input"),
    SubstatementRule::at_most_one("output"),
    SubstatementRule::any("grouping"),
    SubstatementRule::any("if-feature"),
    SubstatementRule::at_most_one("description"),
    SubstatementRule::at_most_one("reference"),
    SubstatementRule::at_most_one("status"),
];

/// `rpc`: a schema node that guarantees `input` and `output` exist in its
/// effective view, inferring undeclared ones. Inferred statements carry no
/// declared back-reference.
struct RpcSupport;

impl StatementSupport for RpcSupport {
    fn definition(&self) -> StatementDefinition {
        StatementDefinition::core("rpc", Some(ArgumentSpec::attribute("name")))
    }

    fn substatement_rules(&self) -> Option<&'static [SubstatementRule]> {
        Some(RPC_RULES)
    }

    fn on_full_definition_declared(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        register_schema_node(build, ctx)?;
        for keyword in ["input", "output"] {
            if build.arena.find_declared_child(ctx, keyword).is_some() {
                continue;
            }
            let def = build
                .ensure_core_def(keyword, Phase::FullDeclaration)
                .expect("input/output supports are built in");
            let keyword_arc = build.keyword_arc(def);
            let at = build.arena.get(ctx).source_ref().clone();
            let inferred = build.arena.create_inferred(ctx, def, keyword_arc, at);
            build.arena.add_effective_substatement(ctx, inferred)?;
            register_schema_node(build, inferred)?;
        }
        Ok(())
    }

    fn on_added_by_copy(&self, build: &mut BuildContext, ctx: CtxId) -> Result<()> {
        register_schema_node(build, ctx)
    }
}
