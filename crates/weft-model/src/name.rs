//! Interned identifiers: symbols, revisions and qualified names.
//!
//! Every name the reactor keys a namespace by is reduced to a `Symbol`
//! (a cheap u32 handle into an `Interner`), so that `QName` comparison is
//! a couple of integer compares instead of string walks. Symbols are only
//! meaningful relative to the interner that produced them.

use std::collections::HashMap;
use std::fmt;

/// A lightweight handle to an interned string.
///
/// Comparing two symbols is O(1). Symbols are ordered by insertion order,
/// not lexicographically.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Symbol(u32);

impl Symbol {
    /// Raw index, for debugging.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// String interner. Deduplicates strings and returns cheap `Symbol` handles.
#[derive(Debug, Clone, Default)]
pub struct Interner {
    map: HashMap<String, Symbol>,
    strings: Vec<String>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its `Symbol`. Idempotent.
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&sym) = self.map.get(s) {
            return sym;
        }
        let sym = Symbol(self.strings.len() as u32);
        self.strings.push(s.to_owned());
        self.map.insert(s.to_owned(), sym);
        sym
    }

    /// Resolve a `Symbol` back to its string.
    ///
    /// # Panics
    /// Panics if the symbol was not created by this interner.
    #[inline]
    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.0 as usize]
    }

    /// Look up a symbol without interning.
    pub fn lookup(&self, s: &str) -> Option<Symbol> {
        self.map.get(s).copied()
    }

    /// Number of interned strings.
    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Error produced when parsing a [`Revision`] or [`SemVer`] literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {what} literal {literal:?}")]
pub struct NameParseError {
    what: &'static str,
    literal: String,
}

impl NameParseError {
    fn new(what: &'static str, literal: &str) -> Self {
        Self {
            what,
            literal: literal.to_owned(),
        }
    }
}

/// A module revision date, `YYYY-MM-DD`.
///
/// Ordered chronologically; later revisions compare greater.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Revision {
    year: u16,
    month: u8,
    day: u8,
}

impl Revision {
    /// Parse a `YYYY-MM-DD` literal. Only shape and range are validated;
    /// calendar validity (leap days and the like) is not this layer's
    /// concern.
    pub fn parse(s: &str) -> Result<Self, NameParseError> {
        let err = || NameParseError::new("revision", s);
        let bytes = s.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(err());
        }
        let year: u16 = s[0..4].parse().map_err(|_| err())?;
        let month: u8 = s[5..7].parse().map_err(|_| err())?;
        let day: u8 = s[8..10].parse().map_err(|_| err())?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(err());
        }
        Ok(Self { year, month, day })
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// A semantic version triple used by semantic-version import resolution.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SemVer {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl SemVer {
    pub fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a `major.minor.patch` literal.
    pub fn parse(s: &str) -> Result<Self, NameParseError> {
        let err = || NameParseError::new("semantic version", s);
        let mut parts = s.splitn(3, '.');
        let major = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let minor = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let patch = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    /// Import compatibility rule: the candidate satisfies the requested
    /// version when the major components match and the candidate is not
    /// older than the request.
    pub fn satisfies(self, requested: SemVer) -> bool {
        self.major == requested.major && self >= requested
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Identity of one module revision: interned namespace URI plus optional
/// revision date. This is how the effective model addresses modules.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct QNameModule {
    pub namespace: Symbol,
    pub revision: Option<Revision>,
}

impl QNameModule {
    pub fn new(namespace: Symbol, revision: Option<Revision>) -> Self {
        Self {
            namespace,
            revision,
        }
    }
}

/// A qualified name: module identity plus interned local name.
///
/// `Copy` and compared by interned identity; two `QName`s from the same
/// interner are equal iff they name the same thing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct QName {
    pub module: QNameModule,
    pub name: Symbol,
}

impl QName {
    pub fn new(module: QNameModule, name: Symbol) -> Self {
        Self { module, name }
    }
}
