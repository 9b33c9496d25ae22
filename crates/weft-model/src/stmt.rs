//! Static statement-kind descriptors.
//!
//! One `StatementDefinition` exists per statement kind per compilation,
//! interned into a definition table and addressed by `DefId`. Core-language
//! keywords are plain strings; extension-defined keywords additionally carry
//! the extension's qualified name.

use std::fmt;
use std::sync::Arc;

use crate::QName;

/// Handle to an interned [`StatementDefinition`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DefId(pub u32);

impl DefId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Shape of a statement kind's argument.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ArgumentSpec {
    /// Name of the argument as the YIN mapping would label it.
    pub name: Arc<str>,
    /// Whether the YIN mapping encodes the argument as a child element
    /// rather than an attribute.
    pub yin_element: bool,
}

impl ArgumentSpec {
    pub fn attribute(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            yin_element: false,
        }
    }

    pub fn element(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            yin_element: true,
        }
    }
}

/// Static descriptor for one statement kind. Immutable once interned.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StatementDefinition {
    /// Keyword text as written in source (`container`, `acme:annotate`, ...).
    keyword: Arc<str>,
    /// Qualified name of the defining extension, for extension-instantiated
    /// statement kinds. `None` for core-language statements.
    extension: Option<QName>,
    /// Argument shape; `None` for argument-less statements.
    argument: Option<ArgumentSpec>,
}

impl StatementDefinition {
    pub fn core(keyword: impl Into<Arc<str>>, argument: Option<ArgumentSpec>) -> Self {
        Self {
            keyword: keyword.into(),
            extension: None,
            argument,
        }
    }

    pub fn extension(
        keyword: impl Into<Arc<str>>,
        extension: QName,
        argument: Option<ArgumentSpec>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            extension: Some(extension),
            argument,
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn extension_name(&self) -> Option<QName> {
        self.extension
    }

    pub fn argument(&self) -> Option<&ArgumentSpec> {
        self.argument.as_ref()
    }

    pub fn takes_argument(&self) -> bool {
        self.argument.is_some()
    }
}

impl fmt::Display for StatementDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keyword)
    }
}
