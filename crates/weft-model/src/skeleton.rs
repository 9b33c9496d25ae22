//! Declared-statement skeletons: the reactor's input.
//!
//! A skeleton is the as-written shape of one statement: keyword text, raw
//! argument, source position and ordered children. A front end outside this
//! workspace produces them from source text; tests build them directly.

use std::sync::Arc;

use crate::SourceRef;

/// One declared statement and its explicit children.
///
/// Immutable once built; the reactor shares skeletons between the working
/// statement contexts and the effective model's declared back-references.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Skeleton {
    keyword: String,
    argument: Option<String>,
    source_ref: SourceRef,
    children: Vec<Arc<Skeleton>>,
}

impl Skeleton {
    pub fn new(
        keyword: impl Into<String>,
        argument: Option<&str>,
        source_ref: SourceRef,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            argument: argument.map(str::to_owned),
            source_ref,
            children: Vec::new(),
        }
    }

    /// Append a child statement, preserving declaration order.
    pub fn with_child(mut self, child: Skeleton) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    pub fn source_ref(&self) -> &SourceRef {
        &self.source_ref
    }

    pub fn children(&self) -> &[Arc<Skeleton>] {
        &self.children
    }
}
