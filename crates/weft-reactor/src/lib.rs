//! Weft reactor: phased compilation of declared statement trees into an
//! effective schema model.
//!
//! This crate provides the cross-source compilation engine:
//! - `reactor` - the driver: sources in, effective model out
//! - `phase` - the phase sequence and per-phase progress reporting
//! - `context` - the arena-backed statement context tree
//! - `namespace` - scoped cross-reference namespaces
//! - `action` - deferred inference actions and their prerequisites
//! - `support` - pluggable per-statement-kind behavior
//! - `linkage` - the module dependency resolver
//! - `error` - the error taxonomy

pub mod action;
pub mod build;
pub mod context;
pub mod error;
mod linkage;
pub mod namespace;
pub mod phase;
pub mod reactor;
mod source;
pub mod support;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod context_tests;
#[cfg(test)]
mod linkage_tests;
#[cfg(test)]
mod namespace_tests;
#[cfg(test)]
mod reactor_tests;

pub use action::{ActionBuilder, ActionContext, InferenceAction, PrereqHandle};
pub use build::BuildContext;
pub use context::{ArgValue, Arena, CopyHistory, CopyType, CtxId, DeviateKind, StmtCtx};
pub use error::{ReactorError, Result};
pub use namespace::{Namespace, NamespaceScope, NsKey};
pub use phase::{Phase, PhaseProgress};
pub use reactor::{Reactor, ReactorBuilder};
pub use support::{
    deviate_validity, StatementSupport, SubstatementRule, SupportRegistry, SupportRegistryBuilder,
};
