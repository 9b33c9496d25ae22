//! Core data structures for the weft schema compiler.
//!
//! Two layers:
//! - **Identity layer**: interned symbols, revisions, qualified names and
//!   source references, the keys everything above is indexed by.
//! - **Statement layer**: static statement-kind descriptors, declared
//!   skeletons (the reactor's input) and the immutable effective model
//!   (its output).
//!
//! The reactor itself lives in `weft-reactor`; this crate has no knowledge
//! of compilation phases or namespaces.

mod effective;
mod name;
mod skeleton;
mod source;
mod stmt;

#[cfg(test)]
mod name_tests;

pub use effective::{EffectiveModel, EffectiveStatement};
pub use name::{Interner, NameParseError, QName, QNameModule, Revision, SemVer, Symbol};
pub use skeleton::Skeleton;
pub use source::{SourceId, SourceRef};
pub use stmt::{ArgumentSpec, DefId, StatementDefinition};
