use std::collections::HashSet;
use std::sync::Arc;

use indoc::indoc;
use weft_model::EffectiveModel;

use crate::error::ReactorError;
use crate::reactor::Reactor;
use crate::test_utils::parse;

fn compile(sources: &[(&str, &str)]) -> Result<EffectiveModel, ReactorError> {
    let mut builder = Reactor::builder();
    for (name, text) in sources {
        builder = builder.add_source(parse(name, text));
    }
    builder.build()
}

fn keywords(statement: &weft_model::EffectiveStatement) -> Vec<String> {
    statement
        .substatements()
        .iter()
        .map(|s| s.keyword().to_owned())
        .collect()
}

const SIMPLE: &str = indoc! {r#"
    module example {
      namespace "urn:example";
      prefix ex;
      revision 2024-01-15;

      container top {
        leaf name {
          type string;
        }
      }
    }
"#};

#[test]
fn single_module_builds_effective_tree() {
    let model = compile(&[("example.weft", SIMPLE)]).unwrap();
    let root = model.module_by_name("example").unwrap();
    assert_eq!(root.keyword(), "module");
    let leaf = root
        .find_path(&[("container", "top"), ("leaf", "name")])
        .unwrap();
    assert_eq!(leaf.find_first("type").unwrap().argument(), Some("string"));
    // Effective nodes keep their declared back-reference.
    assert_eq!(leaf.declared().unwrap().keyword(), "leaf");
}

#[test]
fn module_without_namespace_is_rejected_at_linkage() {
    let err = compile(&[(
        "bad.weft",
        indoc! {r#"
            module bad {
              prefix b;
            }
        "#},
    )])
    .unwrap_err();
    match err {
        ReactorError::InvalidArgument { message, .. } => {
            assert!(message.contains("namespace"), "got: {message}");
        }
        other => panic!("expected an invalid-argument error, got: {other}"),
    }
}

#[test]
fn repeated_singleton_substatement_is_a_grammar_violation() {
    let err = compile(&[(
        "bad.weft",
        indoc! {r#"
            module bad {
              namespace "urn:bad";
              prefix b;
              leaf x {
                type string;
                type uint16;
              }
            }
        "#},
    )])
    .unwrap_err();
    match err {
        ReactorError::GrammarViolation { statement, offending, .. } => {
            assert_eq!(statement, "leaf");
            assert!(offending.contains("type"), "got: {offending}");
        }
        other => panic!("expected a grammar violation, got: {other}"),
    }
}

#[test]
fn unknown_keyword_is_fatal() {
    let err = compile(&[(
        "bad.weft",
        indoc! {r#"
            module bad {
              namespace "urn:bad";
              prefix b;
              gadget x;
            }
        "#},
    )])
    .unwrap_err();
    match err {
        ReactorError::UnresolvableReference { reference, .. } => {
            assert!(reference.contains("gadget"), "got: {reference}");
        }
        other => panic!("expected an unresolvable reference, got: {other}"),
    }
}

#[test]
fn duplicate_module_declaration_is_rejected() {
    let text = indoc! {r#"
        module dup {
          namespace "urn:dup";
          prefix d;
        }
    "#};
    let err = compile(&[("a.weft", text), ("b.weft", text)]).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"module `dup` declared twice: first declared at a.weft:1:1, conflicting declaration at b.weft:1:1"
    );
}

const BAR: &str = indoc! {r#"
    module bar {
      namespace "urn:bar";
      prefix b;

      container box {
        leaf existing {
          type string;
        }
      }
    }
"#};

const FOO_AUGMENTS_BAR: &str = indoc! {r#"
    module foo {
      namespace "urn:foo";
      prefix f;
      import bar {
        prefix b;
      }

      augment "/b:box" {
        leaf extra {
          type string;
        }
      }
    }
"#};

#[test]
fn augment_grafts_leaf_into_imported_module() {
    let model = compile(&[("foo.weft", FOO_AUGMENTS_BAR), ("bar.weft", BAR)]).unwrap();
    let bar = model.module_by_name("bar").unwrap();
    let container = bar.find_first("container").unwrap();
    let names: Vec<_> = container
        .find_all("leaf")
        .filter_map(|leaf| leaf.argument().map(str::to_owned))
        .collect();
    assert_eq!(names, ["existing", "extra"]);
}

#[test]
fn augment_reaches_a_nested_target() {
    let nested = indoc! {r#"
        module bar {
          namespace "urn:bar";
          prefix b;

          container box {
            container sub {
              leaf existing {
                type string;
              }
            }
          }
        }
    "#};
    let foo = indoc! {r#"
        module foo {
          namespace "urn:foo";
          prefix f;
          import bar {
            prefix b;
          }

          augment "/b:box/b:sub" {
            leaf extra {
              type string;
            }
          }
        }
    "#};
    let model = compile(&[("foo.weft", foo), ("bar.weft", nested)]).unwrap();
    let bar = model.module_by_name("bar").unwrap();
    let sub = bar
        .find_path(&[("container", "box"), ("container", "sub")])
        .unwrap();
    let names: Vec<_> = sub
        .find_all("leaf")
        .filter_map(|leaf| leaf.argument().map(str::to_owned))
        .collect();
    assert_eq!(names, ["existing", "extra"]);
}

#[test]
fn import_prefix_reusing_the_module_prefix_is_rejected() {
    let importer = indoc! {r#"
        module d {
          namespace "urn:d";
          prefix d;
          import t {
            prefix d;
          }
        }
    "#};
    let imported = indoc! {r#"
        module t {
          namespace "urn:t";
          prefix t;
        }
    "#};
    let err = compile(&[("d.weft", importer), ("t.weft", imported)]).unwrap_err();
    match err {
        ReactorError::SemanticConflict { message, .. } => {
            assert!(message.contains("prefix `d`"), "got: {message}");
        }
        other => panic!("expected a semantic conflict, got: {other}"),
    }
}

#[test]
fn missing_import_is_fatal_and_names_the_module() {
    let err = compile(&[("foo.weft", FOO_AUGMENTS_BAR)]).unwrap_err();
    match err {
        ReactorError::UnresolvableReference { reference, .. } => {
            assert!(reference.contains("bar"), "got: {reference}");
        }
        other => panic!("expected an unresolvable reference, got: {other}"),
    }
}

#[test]
fn augment_of_missing_target_names_the_path() {
    let foo = indoc! {r#"
        module foo {
          namespace "urn:foo";
          prefix f;
          import bar {
            prefix b;
          }

          augment "/b:crate" {
            leaf extra {
              type string;
            }
          }
        }
    "#};
    let err = compile(&[("foo.weft", foo), ("bar.weft", BAR)]).unwrap_err();
    match err {
        ReactorError::UnresolvableReference { reference, .. } => {
            assert!(reference.contains("/b:crate"), "got: {reference}");
        }
        other => panic!("expected an unresolvable reference, got: {other}"),
    }
}

#[test]
fn import_permutations_compile_identically() {
    let a = indoc! {r#"
        module a {
          namespace "urn:a";
          prefix a;
          import b {
            prefix b;
          }
        }
    "#};
    let b = indoc! {r#"
        module b {
          namespace "urn:b";
          prefix b;
          import c {
            prefix c;
          }
        }
    "#};
    let c = indoc! {r#"
        module c {
          namespace "urn:c";
          prefix c;
        }
    "#};
    let supplied = [("a.weft", a), ("b.weft", b), ("c.weft", c)];
    let permutations: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    for permutation in permutations {
        let sources: Vec<_> = permutation.iter().map(|&i| supplied[i]).collect();
        let model = compile(&sources).unwrap();
        assert_eq!(model.len(), 3, "permutation {permutation:?}");
    }
}

#[test]
fn import_cycle_is_rejected() {
    let a = indoc! {r#"
        module a {
          namespace "urn:a";
          prefix a;
          import b {
            prefix b;
          }
        }
    "#};
    let b = indoc! {r#"
        module b {
          namespace "urn:b";
          prefix b;
          import a {
            prefix a;
          }
        }
    "#};
    let err = compile(&[("a.weft", a), ("b.weft", b)]).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"module imports form a cycle among: a, b");
}

#[test]
fn uses_expands_grouping_into_both_call_sites() {
    let model = compile(&[(
        "m.weft",
        indoc! {r#"
            module m {
              namespace "urn:m";
              prefix m;

              grouping endpoint {
                leaf host {
                  type string;
                }
                leaf port {
                  type uint16;
                }
              }

              container north {
                uses endpoint;
              }
              container south {
                uses endpoint;
              }
            }
        "#},
    )])
    .unwrap();
    let root = model.module_by_name("m").unwrap();
    let north = root.find_path(&[("container", "north"), ("leaf", "host")]).unwrap();
    let south = root.find_path(&[("container", "south"), ("leaf", "host")]).unwrap();
    // Two distinct expansions that share the immutable declared statement,
    // and, both copies being untouched, the built substatement slice too.
    assert!(!Arc::ptr_eq(north, south));
    assert!(Arc::ptr_eq(north.declared().unwrap(), south.declared().unwrap()));
    assert!(Arc::ptr_eq(
        north.substatement_slice(),
        south.substatement_slice()
    ));
    assert_eq!(
        north.find_first("type").unwrap().argument(),
        south.find_first("type").unwrap().argument()
    );
}

#[test]
fn unresolvable_grouping_names_the_grouping() {
    let err = compile(&[(
        "m.weft",
        indoc! {r#"
            module m {
              namespace "urn:m";
              prefix m;

              container north {
                uses endpoint;
              }
            }
        "#},
    )])
    .unwrap_err();
    match err {
        ReactorError::UnresolvableReference { reference, .. } => {
            assert!(reference.contains("endpoint"), "got: {reference}");
        }
        other => panic!("expected an unresolvable reference, got: {other}"),
    }
}

const DEVIATION_TARGET_MODULE: &str = indoc! {r#"
    module t {
      namespace "urn:t";
      prefix t;

      leaf metric {
        type string;
      }
    }
"#};

#[test]
fn deviate_add_then_delete_round_trips() {
    let baseline = compile(&[("t.weft", DEVIATION_TARGET_MODULE)]).unwrap();
    let baseline_leaf = baseline
        .module_by_name("t")
        .unwrap()
        .find_first("leaf")
        .unwrap()
        .clone();

    let deviator = indoc! {r#"
        module d {
          namespace "urn:d";
          prefix d;
          import t {
            prefix t;
          }

          deviation "/t:metric" {
            deviate add {
              units "meters";
            }
            deviate delete {
              units "meters";
            }
          }
        }
    "#};
    let model = compile(&[("t.weft", DEVIATION_TARGET_MODULE), ("d.weft", deviator)]).unwrap();
    let leaf = model.module_by_name("t").unwrap().find_first("leaf").unwrap();
    assert!(leaf.find_first("units").is_none());
    assert_eq!(keywords(leaf), keywords(&baseline_leaf));
}

#[test]
fn deviate_replace_swaps_the_effective_value() {
    let deviator = indoc! {r#"
        module d {
          namespace "urn:d";
          prefix d;
          import t {
            prefix t;
          }

          deviation "/t:metric" {
            deviate add {
              units "meters";
            }
            deviate replace {
              units "miles";
            }
          }
        }
    "#};
    let model = compile(&[("t.weft", DEVIATION_TARGET_MODULE), ("d.weft", deviator)]).unwrap();
    let leaf = model.module_by_name("t").unwrap().find_first("leaf").unwrap();
    let units: Vec<_> = leaf.find_all("units").collect();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].argument(), Some("miles"));
}

#[test]
fn deviate_add_duplicate_singleton_is_rejected() {
    let deviator = indoc! {r#"
        module d {
          namespace "urn:d";
          prefix d;
          import t {
            prefix t;
          }

          deviation "/t:metric" {
            deviate add {
              config true;
              config false;
            }
          }
        }
    "#};
    let err = compile(&[("t.weft", DEVIATION_TARGET_MODULE), ("d.weft", deviator)]).unwrap_err();
    match err {
        ReactorError::SemanticConflict { message, .. } => {
            assert!(message.contains("config"), "got: {message}");
            assert!(message.contains("metric"), "got: {message}");
        }
        other => panic!("expected a semantic conflict, got: {other}"),
    }
}

#[test]
fn deviate_not_supported_removes_the_target() {
    let deviator = indoc! {r#"
        module d {
          namespace "urn:d";
          prefix d;
          import t {
            prefix t;
          }

          deviation "/t:metric" {
            deviate not-supported;
          }
        }
    "#};
    let model = compile(&[("t.weft", DEVIATION_TARGET_MODULE), ("d.weft", deviator)]).unwrap();
    let root = model.module_by_name("t").unwrap();
    assert!(root.find_first("leaf").is_none());
}

#[test]
fn deviate_delete_of_missing_statement_is_tolerated() {
    let deviator = indoc! {r#"
        module d {
          namespace "urn:d";
          prefix d;
          import t {
            prefix t;
          }

          deviation "/t:metric" {
            deviate delete {
              units "meters";
            }
          }
        }
    "#};
    // Nothing to delete: logged, not fatal.
    let model = compile(&[("t.weft", DEVIATION_TARGET_MODULE), ("d.weft", deviator)]).unwrap();
    assert!(model.module_by_name("t").is_some());
}

#[test]
fn deviation_outside_the_permitted_set_is_dropped() {
    let deviator = indoc! {r#"
        module d {
          namespace "urn:d";
          prefix d;
          import t {
            prefix t;
          }

          deviation "/t:metric" {
            deviate not-supported;
          }
        }
    "#};
    let model = Reactor::builder()
        .add_source(parse("t.weft", DEVIATION_TARGET_MODULE))
        .add_source(parse("d.weft", deviator))
        .with_permitted_deviations([("t".to_owned(), HashSet::from(["other".to_owned()]))])
        .build()
        .unwrap();
    // The deviation was ignored, so the leaf survives.
    let root = model.module_by_name("t").unwrap();
    assert!(root.find_first("leaf").is_some());
}

const FEATURED: &str = indoc! {r#"
    module f {
      namespace "urn:f";
      prefix f;

      feature fancy;

      leaf plain {
        type string;
      }
      leaf gated {
        type string;
        if-feature fancy;
      }
    }
"#};

#[test]
fn if_feature_keeps_statement_when_feature_is_supported() {
    let model = Reactor::builder()
        .add_source(parse("f.weft", FEATURED))
        .with_supported_features([("f".to_owned(), "fancy".to_owned())])
        .build()
        .unwrap();
    let root = model.module_by_name("f").unwrap();
    assert!(root.find_path(&[("leaf", "gated")]).is_some());
}

#[test]
fn if_feature_drops_statement_when_feature_is_absent() {
    let model = Reactor::builder()
        .add_source(parse("f.weft", FEATURED))
        .with_supported_features(Vec::<(String, String)>::new())
        .build()
        .unwrap();
    let root = model.module_by_name("f").unwrap();
    assert!(root.find_path(&[("leaf", "plain")]).is_some());
    assert!(root.find_path(&[("leaf", "gated")]).is_none());
}

#[test]
fn undefined_feature_is_fatal() {
    let err = compile(&[(
        "f.weft",
        indoc! {r#"
            module f {
              namespace "urn:f";
              prefix f;

              leaf gated {
                type string;
                if-feature missing;
              }
            }
        "#},
    )])
    .unwrap_err();
    match err {
        ReactorError::UnresolvableReference { reference, .. } => {
            assert!(reference.contains("missing"), "got: {reference}");
        }
        other => panic!("expected an unresolvable reference, got: {other}"),
    }
}

#[test]
fn duplicate_feature_definition_is_rejected() {
    let err = compile(&[(
        "f.weft",
        indoc! {r#"
            module f {
              namespace "urn:f";
              prefix f;

              feature fancy;
              feature fancy;
            }
        "#},
    )])
    .unwrap_err();
    match err {
        ReactorError::SemanticConflict { message, .. } => {
            assert!(message.contains("feature `fancy`"), "got: {message}");
        }
        other => panic!("expected a semantic conflict, got: {other}"),
    }
}

#[test]
fn choice_accepts_case_branches() {
    let model = compile(&[(
        "c.weft",
        indoc! {r#"
            module c {
              namespace "urn:c";
              prefix c;

              choice mode {
                case plain {
                  leaf value {
                    type string;
                  }
                }
                case fancy {
                  container wrapper {
                    leaf value {
                      type string;
                    }
                  }
                }
                leaf shorthand {
                  type string;
                }
              }
            }
        "#},
    )])
    .unwrap();
    let root = model.module_by_name("c").unwrap();
    assert!(root
        .find_path(&[("choice", "mode"), ("case", "plain"), ("leaf", "value")])
        .is_some());
    assert!(root
        .find_path(&[("choice", "mode"), ("leaf", "shorthand")])
        .is_some());
}

#[test]
fn rpc_infers_input_and_output() {
    let model = compile(&[(
        "r.weft",
        indoc! {r#"
            module r {
              namespace "urn:r";
              prefix r;

              rpc ping;
              rpc echo {
                input {
                  leaf payload {
                    type string;
                  }
                }
              }
            }
        "#},
    )])
    .unwrap();
    let root = model.module_by_name("r").unwrap();
    let ping = root.find_path(&[("rpc", "ping")]).unwrap();
    assert!(ping.find_first("input").is_some());
    assert!(ping.find_first("output").is_some());
    let echo = root.find_path(&[("rpc", "echo")]).unwrap();
    let input = echo.find_first("input").unwrap();
    assert!(input.find_path(&[("leaf", "payload")]).is_some());
    // The declared input is not duplicated by inference.
    assert_eq!(echo.find_all("input").count(), 1);
}

#[test]
fn extension_instantiated_keyword_resolves() {
    let model = compile(&[(
        "x.weft",
        indoc! {r#"
            module x {
              namespace "urn:x";
              prefix x;

              extension note {
                argument text;
              }

              container top {
                x:note "remember me";
              }
            }
        "#},
    )])
    .unwrap();
    let root = model.module_by_name("x").unwrap();
    let note = root
        .find_first("container")
        .unwrap()
        .find_first("x:note")
        .unwrap();
    assert_eq!(note.argument(), Some("remember me"));
    assert!(note.def() != root.def());
}

#[test]
fn duplicate_extension_definition_is_rejected() {
    let err = compile(&[(
        "x.weft",
        indoc! {r#"
            module x {
              namespace "urn:x";
              prefix x;

              extension note {
                argument text;
              }
              extension note {
                argument text;
              }
            }
        "#},
    )])
    .unwrap_err();
    match err {
        ReactorError::SemanticConflict { message, .. } => {
            assert!(message.contains("extension `note`"), "got: {message}");
        }
        other => panic!("expected a semantic conflict, got: {other}"),
    }
}

#[test]
fn semantic_version_import_rejects_incompatible_candidates() {
    let provider = indoc! {r#"
        module lib {
          namespace "urn:lib";
          prefix l;
          semantic-version "2.1.0";
        }
    "#};
    let consumer = indoc! {r#"
        module app {
          namespace "urn:app";
          prefix a;
          import lib {
            prefix l;
            semantic-version "3.0.0";
          }
        }
    "#};
    let err = compile(&[("lib.weft", provider), ("app.weft", consumer)]).unwrap_err();
    match err {
        ReactorError::IncompatibleImport { import, requested, .. } => {
            assert_eq!(import, "lib");
            assert_eq!(requested, "3.0.0");
        }
        other => panic!("expected an incompatible import, got: {other}"),
    }
}

#[test]
fn uses_augment_extends_the_copied_subtree() {
    let model = compile(&[(
        "m.weft",
        indoc! {r#"
            module m {
              namespace "urn:m";
              prefix m;

              grouping shell {
                container inner {
                  leaf base {
                    type string;
                  }
                }
              }

              container top {
                uses shell {
                  augment "inner" {
                    leaf added {
                      type string;
                    }
                  }
                }
              }
            }
        "#},
    )])
    .unwrap();
    let root = model.module_by_name("m").unwrap();
    let inner = root
        .find_path(&[("container", "top"), ("container", "inner")])
        .unwrap();
    let names: Vec<_> = inner
        .find_all("leaf")
        .filter_map(|leaf| leaf.argument().map(str::to_owned))
        .collect();
    assert_eq!(names, ["base", "added"]);
    // The grouping's own subtree stays untouched.
    let original = root
        .find_path(&[("grouping", "shell"), ("container", "inner")])
        .unwrap();
    assert!(original.find_path(&[("leaf", "added")]).is_none());
}

const HOST: &str = indoc! {r#"
    module host {
      namespace "urn:host";
      prefix h;
      include parts;

      container base {
        leaf own {
          type string;
        }
      }
    }
"#};

const PARTS: &str = indoc! {r#"
    submodule parts {
      belongs-to host {
        prefix h;
      }

      leaf extra {
        type string;
      }
    }
"#};

#[test]
fn include_merges_submodule_body_into_the_module() {
    let model = compile(&[("host.weft", HOST), ("parts.weft", PARTS)]).unwrap();
    // The submodule contributes to its owner; it is not a module of its own.
    assert_eq!(model.len(), 1);
    let root = model.module_by_name("host").unwrap();
    assert!(root.find_path(&[("container", "base"), ("leaf", "own")]).is_some());
    assert!(root.find_path(&[("leaf", "extra")]).is_some());
    // Submodule header statements stay out of the merged body.
    assert!(root.find_first("belongs-to").is_none());
}

#[test]
fn include_order_does_not_matter() {
    let model = compile(&[("parts.weft", PARTS), ("host.weft", HOST)]).unwrap();
    let root = model.module_by_name("host").unwrap();
    assert!(root.find_path(&[("leaf", "extra")]).is_some());
}

#[test]
fn include_of_missing_submodule_is_fatal() {
    let err = compile(&[("host.weft", HOST)]).unwrap_err();
    match err {
        ReactorError::UnresolvableReference { reference, .. } => {
            assert!(reference.contains("parts"), "got: {reference}");
        }
        other => panic!("expected an unresolvable reference, got: {other}"),
    }
}

#[test]
fn include_of_foreign_submodule_is_rejected() {
    let other = indoc! {r#"
        module other {
          namespace "urn:other";
          prefix o;
        }
    "#};
    let foreign = indoc! {r#"
        submodule parts {
          belongs-to other {
            prefix o;
          }

          leaf extra {
            type string;
          }
        }
    "#};
    let err = compile(&[
        ("host.weft", HOST),
        ("other.weft", other),
        ("parts.weft", foreign),
    ])
    .unwrap_err();
    match err {
        ReactorError::SemanticConflict { message, .. } => {
            assert!(message.contains("belongs to module `other`"), "got: {message}");
        }
        other => panic!("expected a semantic conflict, got: {other}"),
    }
}
