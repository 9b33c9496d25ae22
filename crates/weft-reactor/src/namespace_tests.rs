use std::sync::Arc;

use weft_model::SourceId;

use crate::build::BuildContext;
use crate::context::CtxId;
use crate::namespace::{
    NamespaceStore, NsKey, DEVIATION_TARGET, GROUPING, MODULE,
};
use crate::support::SupportRegistry;
use crate::test_utils::parse;

fn build() -> BuildContext {
    BuildContext::new(
        Arc::new(SupportRegistry::with_builtin_statements()),
        None,
        None,
    )
}

/// Materialize a fixture tree and return (root, every context in the tree).
fn materialize(build: &mut BuildContext, source: &str, text: &str) -> (CtxId, Vec<CtxId>) {
    let skeleton = parse(source, text);
    let root = build
        .arena
        .materialize(&skeleton, None, SourceId(0));
    let mut all = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        all.push(id);
        stack.extend(build.arena.get(id).declared_children().iter().copied());
    }
    (root, all)
}

#[test]
fn put_is_write_once() {
    let mut build = build();
    let (root, _) = materialize(&mut build, "m.weft", "module m;");

    let mut store = NamespaceStore::default();
    let key = NsKey::Name(build.interner.intern("m"));

    assert!(store.put(&MODULE, key, root));
    // Same value again is a no-op, not a new binding.
    assert!(!store.put(&MODULE, key, root));
    assert_eq!(store.get(&MODULE, &key), Some(root));
    assert_eq!(store.get(&MODULE, &NsKey::Name(build.interner.intern("other"))), None);
}

#[test]
#[should_panic(expected = "attempted to rebind")]
fn rebinding_to_a_different_context_panics() {
    let mut build = build();
    let (root, all) = materialize(&mut build, "m.weft", "module m { container c; }");
    let container = all[1];

    let mut store = NamespaceStore::default();
    let key = NsKey::Name(build.interner.intern("m"));
    store.put(&MODULE, key, root);
    store.put(&MODULE, key, container);
}

#[test]
fn get_first_by_follows_insertion_order() {
    let mut build = build();
    let (root, all) = materialize(
        &mut build,
        "m.weft",
        "module m { container a; container b; }",
    );
    let (first, second) = (root, all[1]);

    let one = build.interner.intern("one");
    let two = build.interner.intern("two");

    let mut store = NamespaceStore::default();
    store.put(&MODULE, NsKey::NameRev(one, None), first);
    store.put(&MODULE, NsKey::NameRev(two, None), second);

    let hit = store.get_first_by(&MODULE, |key| matches!(key, NsKey::NameRev(..)));
    assert_eq!(hit, Some((NsKey::NameRev(one, None), first)));

    let bound: Vec<CtxId> = store.all(&MODULE).map(|(_, v)| v).collect();
    assert_eq!(bound, vec![first, second]);
}

#[test]
fn tree_scope_lookup_walks_ancestors() {
    let mut build = build();
    let (root, all) = materialize(
        &mut build,
        "m.weft",
        "module m { container c { leaf l; } }",
    );
    let leaf = all
        .iter()
        .copied()
        .find(|&id| build.arena.get(id).keyword() == "leaf")
        .unwrap();

    let key = NsKey::Name(build.interner.intern("g"));
    assert!(build.ns_put(root, &GROUPING, key, root));

    // Visible from the leaf through the ancestor walk, and from the root
    // itself; a foreign tree sees nothing.
    assert_eq!(build.ns_get(leaf, &GROUPING, &key), Some(root));
    assert_eq!(build.ns_get(root, &GROUPING, &key), Some(root));

    let (other_root, _) = materialize(&mut build, "n.weft", "module n;");
    assert_eq!(build.ns_get(other_root, &GROUPING, &key), None);
}

#[test]
fn global_scope_is_visible_from_every_tree() {
    let mut build = build();
    let (first, _) = materialize(&mut build, "a.weft", "module a;");
    let (second, _) = materialize(&mut build, "b.weft", "module b;");

    let key = NsKey::Name(build.interner.intern("a"));
    build.ns_put(first, &MODULE, key, first);

    assert_eq!(build.ns_get(second, &MODULE, &key), Some(first));
}

#[test]
fn statement_scope_does_not_leak_to_children() {
    let mut build = build();
    let (root, all) = materialize(
        &mut build,
        "m.weft",
        "module m { container c; }",
    );
    let container = all[1];

    let key = NsKey::Name(build.interner.intern("target"));
    build.ns_put(root, &DEVIATION_TARGET, key, container);

    assert_eq!(build.ns_get(root, &DEVIATION_TARGET, &key), Some(container));
    // Statement scope reads only the exact statement, no ancestor walk.
    assert_eq!(build.ns_get(container, &DEVIATION_TARGET, &key), None);
}
