use std::sync::Arc;

use weft_model::{DefId, SourceId};

use crate::context::Arena;
use crate::phase::{Phase, PHASES};
use crate::test_utils::parse;

fn arena_with_module() -> (Arena, crate::context::CtxId) {
    let mut arena = Arena::new();
    let skeleton = parse("m.weft", "module m;");
    let root = arena.materialize(&skeleton, None, SourceId(0));
    (arena, root)
}

#[test]
fn completing_a_phase_covers_every_earlier_one() {
    let (mut arena, root) = arena_with_module();

    arena.complete_phase(root, Phase::SourceLinkage);
    assert!(arena.get(root).is_phase_complete(Phase::SourcePreLinkage));
    assert!(arena.get(root).is_phase_complete(Phase::SourceLinkage));
    assert!(!arena.get(root).is_phase_complete(Phase::StatementDefinition));

    arena.complete_phase(root, Phase::EffectiveModel);
    for phase in PHASES {
        assert!(arena.get(root).is_phase_complete(phase));
    }
}

#[test]
#[should_panic(expected = "attempted to regress")]
fn completing_an_earlier_phase_panics() {
    let (mut arena, root) = arena_with_module();
    arena.complete_phase(root, Phase::FullDeclaration);
    arena.complete_phase(root, Phase::SourceLinkage);
}

#[test]
#[should_panic(expected = "attempted to regress")]
fn completing_the_same_phase_twice_panics() {
    let (mut arena, root) = arena_with_module();
    arena.complete_phase(root, Phase::StatementDefinition);
    arena.complete_phase(root, Phase::StatementDefinition);
}

#[test]
fn inferred_statements_arrive_fully_declared() {
    let (mut arena, root) = arena_with_module();
    let at = arena.get(root).source_ref().clone();

    let inferred = arena.create_inferred(root, DefId(0), Arc::from("input"), at);
    assert_eq!(
        arena.get(inferred).completed_phase(),
        Some(Phase::FullDeclaration)
    );
    for phase in PHASES {
        assert!(arena.get(inferred).callback_ran(phase));
    }
    assert!(!arena.get(inferred).is_phase_complete(Phase::EffectiveModel));
}
