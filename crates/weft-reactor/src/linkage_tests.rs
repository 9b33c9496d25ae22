use std::sync::Arc;

use weft_model::SourceId;

use crate::build::BuildContext;
use crate::context::CtxId;
use crate::error::ReactorError;
use crate::linkage::resolve_order;
use crate::support::SupportRegistry;
use crate::test_utils::parse;

fn build() -> BuildContext {
    BuildContext::new(
        Arc::new(SupportRegistry::with_builtin_statements()),
        None,
        None,
    )
}

fn materialize_all(build: &mut BuildContext, sources: &[(&str, &str)]) -> Vec<CtxId> {
    sources
        .iter()
        .enumerate()
        .map(|(index, (name, text))| {
            let skeleton = parse(name, text);
            build
                .arena
                .materialize(&skeleton, None, SourceId(index as u32))
        })
        .collect()
}

/// Resolve and render the order as module names.
fn order_of(sources: &[(&str, &str)]) -> crate::error::Result<Vec<String>> {
    let mut build = build();
    let roots = materialize_all(&mut build, sources);
    let order = resolve_order(&build, &roots)?;
    Ok(order
        .into_iter()
        .map(|index| {
            build
                .arena
                .get(roots[index])
                .raw_argument()
                .unwrap_or_default()
                .to_owned()
        })
        .collect())
}

const A: (&str, &str) = ("a.weft", "module a { import b { prefix b; } }");
const B: (&str, &str) = ("b.weft", "module b { import c { prefix c; } }");
const C: (&str, &str) = ("c.weft", "module c;");

#[test]
fn imports_sort_before_importers() {
    let order = order_of(&[A, B, C]).unwrap();
    assert_eq!(order, vec!["c", "b", "a"]);
}

#[test]
fn supplied_order_does_not_change_the_result() {
    const PERMUTATIONS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    let modules = [A, B, C];
    for permutation in PERMUTATIONS {
        let supplied: Vec<(&str, &str)> = permutation.iter().map(|&i| modules[i]).collect();
        let order = order_of(&supplied).unwrap();
        assert_eq!(order, vec!["c", "b", "a"], "permutation {permutation:?}");
    }
}

#[test]
fn independent_modules_keep_supplied_order() {
    let order = order_of(&[("z.weft", "module zebra;"), ("a.weft", "module aardvark;")]).unwrap();
    assert_eq!(order, vec!["zebra", "aardvark"]);
}

#[test]
fn duplicate_name_and_revision_is_rejected() {
    let err = order_of(&[("a.weft", "module dup;"), ("b.weft", "module dup;")]).unwrap_err();
    match err {
        ReactorError::SemanticConflict { message, .. } => {
            assert!(message.contains("module `dup` declared twice"), "{message}");
        }
        other => panic!("expected a semantic conflict, got {other}"),
    }
}

#[test]
fn same_name_with_distinct_revisions_is_allowed() {
    let order = order_of(&[
        ("a.weft", "module m { revision 2024-01-01; }"),
        ("b.weft", "module m { revision 2025-06-30; }"),
    ])
    .unwrap();
    assert_eq!(order, vec!["m", "m"]);
}

#[test]
fn missing_import_names_the_module() {
    let err = order_of(&[("a.weft", "module a { import ghost { prefix g; } }")]).unwrap_err();
    match err {
        ReactorError::UnresolvableReference { reference, .. } => {
            assert!(reference.contains("imported module `ghost`"), "{reference}");
        }
        other => panic!("expected an unresolvable reference, got {other}"),
    }
}

#[test]
fn revisioned_import_requires_an_exact_match() {
    let modules = [
        (
            "a.weft",
            "module a { import b { prefix b; revision-date 2023-03-03; } }",
        ),
        ("b.weft", "module b { revision 2024-01-01; }"),
    ];
    let err = order_of(&modules).unwrap_err();
    match err {
        ReactorError::UnresolvableReference { reference, .. } => {
            assert!(reference.contains("revision 2023-03-03"), "{reference}");
        }
        other => panic!("expected an unresolvable reference, got {other}"),
    }
}

#[test]
fn revisionless_import_of_several_revisions_uses_the_first_supplied() {
    let order = order_of(&[
        ("b1.weft", "module b { revision 2024-01-01; }"),
        ("b2.weft", "module b { revision 2023-01-01; }"),
        ("a.weft", "module a { import b { prefix b; } }"),
    ])
    .unwrap();
    assert_eq!(order, vec!["b", "b", "a"]);
}

#[test]
fn semantic_version_import_accepts_a_compatible_candidate() {
    let order = order_of(&[
        (
            "a.weft",
            "module a { import b { prefix b; semantic-version 2.0.0; } }",
        ),
        ("b.weft", "module b { semantic-version 2.3.1; }"),
    ])
    .unwrap();
    assert_eq!(order, vec!["b", "a"]);
}

#[test]
fn semantic_version_import_rejects_a_major_mismatch() {
    let err = order_of(&[
        (
            "a.weft",
            "module a { import b { prefix b; semantic-version 2.0.0; } }",
        ),
        ("b.weft", "module b { semantic-version 1.9.0; }"),
    ])
    .unwrap_err();
    match err {
        ReactorError::IncompatibleImport {
            import,
            importing,
            requested,
            considered,
            ..
        } => {
            assert_eq!(import, "b");
            assert_eq!(importing, "a");
            assert_eq!(requested, "2.0.0");
            assert_eq!(considered, vec!["1.9.0"]);
        }
        other => panic!("expected an incompatible import, got {other}"),
    }
}

#[test]
fn self_import_is_reported_as_a_cycle() {
    let err = order_of(&[("a.weft", "module a { import a { prefix me; } }")]).unwrap_err();
    match err {
        ReactorError::ImportCycle { modules } => assert_eq!(modules, vec!["a"]),
        other => panic!("expected an import cycle, got {other}"),
    }
}

#[test]
fn mutual_imports_list_every_cycle_member_sorted() {
    let err = order_of(&[
        ("b.weft", "module b { import a { prefix a; } }"),
        ("a.weft", "module a { import b { prefix b; } }"),
    ])
    .unwrap_err();
    match err {
        ReactorError::ImportCycle { modules } => assert_eq!(modules, vec!["a", "b"]),
        other => panic!("expected an import cycle, got {other}"),
    }
}
