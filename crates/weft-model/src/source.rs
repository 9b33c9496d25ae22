//! Source identities and positions.

use std::fmt;
use std::sync::Arc;

/// Index of one source module/submodule within a compilation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SourceId(pub u32);

impl SourceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position of a statement in its source text.
///
/// Carried by every declared skeleton and quoted in every error, so it is
/// self-contained (the source name is an owned `Arc<str>`, not an interned
/// symbol that would need an interner to render).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SourceRef {
    source: Arc<str>,
    line: u32,
    column: u32,
}

impl SourceRef {
    pub fn new(source: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            source: source.into(),
            line,
            column,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}
