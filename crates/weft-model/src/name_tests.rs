use crate::{Interner, QName, QNameModule, Revision, SemVer};

#[test]
fn interning_is_idempotent() {
    let mut interner = Interner::new();
    let a = interner.intern("container");
    let b = interner.intern("container");
    let c = interner.intern("leaf");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(interner.resolve(a), "container");
    assert_eq!(interner.resolve(c), "leaf");
    assert_eq!(interner.len(), 2);
}

#[test]
fn lookup_does_not_intern() {
    let mut interner = Interner::new();
    assert_eq!(interner.lookup("foo"), None);
    let sym = interner.intern("foo");
    assert_eq!(interner.lookup("foo"), Some(sym));
    assert_eq!(interner.len(), 1);
}

#[test]
fn revision_parses_and_orders() {
    let old = Revision::parse("2019-01-01").unwrap();
    let new = Revision::parse("2020-06-15").unwrap();
    assert!(old < new);
    assert_eq!(new.to_string(), "2020-06-15");
}

#[test]
fn revision_rejects_malformed() {
    assert!(Revision::parse("2019-1-1").is_err());
    assert!(Revision::parse("2019/01/01").is_err());
    assert!(Revision::parse("2019-13-01").is_err());
    assert!(Revision::parse("not-a-date").is_err());
}

#[test]
fn semver_satisfies_same_major_not_older() {
    let requested = SemVer::parse("1.2.0").unwrap();
    assert!(SemVer::new(1, 2, 0).satisfies(requested));
    assert!(SemVer::new(1, 5, 3).satisfies(requested));
    assert!(!SemVer::new(1, 1, 9).satisfies(requested));
    assert!(!SemVer::new(2, 0, 0).satisfies(requested));
}

#[test]
fn qname_equality_is_by_interned_identity() {
    let mut interner = Interner::new();
    let ns = interner.intern("urn:example:foo");
    let rev = Some(Revision::parse("2020-01-01").unwrap());
    let module = QNameModule::new(ns, rev);
    let a = QName::new(module, interner.intern("bar"));
    let b = QName::new(module, interner.intern("bar"));
    let c = QName::new(module, interner.intern("baz"));
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_ne!(a, QName::new(QNameModule::new(ns, None), a.name));
}
