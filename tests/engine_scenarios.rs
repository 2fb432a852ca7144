mod common;

use common::{Tree, actor, all_nodes, assert_consistent, maybe_node, node, open_store};
use fellowship::core::broker::DbBroker;
use fellowship::core::error::{ConflictKind, FellowshipError, ValidationRule};
use fellowship::hierarchy::engine;
use fellowship::hierarchy::journal;
use fellowship::hierarchy::model::{AncestorChain, InactivationCause, Level, Role};
use fellowship::hierarchy::planner::Write;
use std::sync::{Arc, Barrier};
use std::thread;

fn journal_len(store: &fellowship::core::store::Store) -> usize {
    DbBroker::new(store)
        .with_read(|conn| journal::list(conn, None, 10_000))
        .unwrap()
        .len()
}

#[test]
fn disciple_promoted_to_preacher_takes_the_supervisors_chain() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let member_id = t.d.member_id.clone().unwrap();

    let promotion = engine::promote(&store, &member_id, Role::Preacher, &t.s2.id, &actor()).unwrap();

    assert_eq!(promotion.record.level, Level::Preacher);
    assert_eq!(promotion.removed_record_id, t.d.id);
    assert_eq!(
        promotion.record.chain,
        AncestorChain {
            church: Some(t.ch1.id.clone()),
            pastor: Some(t.pa2.id.clone()),
            copastor: Some(t.c2.id.clone()),
            supervisor: Some(t.s2.id.clone()),
            ..AncestorChain::default()
        }
    );
    assert!(maybe_node(&store, &t.d.id).is_none());
    assert!(promotion.orphaned.is_empty());

    let role = engine::resolve_role(&store, &member_id).unwrap();
    assert_eq!(role.role, Some(Role::Preacher));
    assert_eq!(role.record_id.as_deref(), Some(promotion.record.id.as_str()));
    assert_consistent(&store);
}

#[test]
fn promoted_preacher_under_a_zoned_supervisor_joins_the_zone() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let member_id = t.d2.member_id.clone().unwrap();

    let promotion = engine::promote(&store, &member_id, Role::Preacher, &t.s1.id, &actor()).unwrap();

    assert_eq!(promotion.record.chain.zone.as_deref(), Some(t.z1.id.as_str()));
    assert_eq!(promotion.record.chain.supervisor.as_deref(), Some(t.s1.id.as_str()));
    // the zone is the parent that was version-touched
    assert_eq!(node(&store, &t.z1.id).version, t.z1.version + 1);
    assert_consistent(&store);
}

#[test]
fn reassigning_a_copastor_rewrites_the_pastor_of_its_whole_subtree() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let moved = engine::reassign_ancestor(&store, &t.c1.id, &t.pa2.id, &actor()).unwrap();
    assert_eq!(moved.record.chain.pastor.as_deref(), Some(t.pa2.id.as_str()));

    let subtree: Vec<_> = all_nodes(&store)
        .into_iter()
        .filter(|n| n.chain.copastor.as_deref() == Some(t.c1.id.as_str()))
        .collect();
    assert_eq!(subtree.len(), 6, "S1, Z1, P1, FG1, D, D2");
    for n in &subtree {
        assert_eq!(n.chain.pastor.as_deref(), Some(t.pa2.id.as_str()), "{}", n.id);
        assert!(moved.updated_ids.contains(&n.id));
    }

    // records outside the moved subtree are untouched
    assert_eq!(node(&store, &t.c2.id).version, t.c2.version);
    assert_eq!(node(&store, &t.s2.id), t.s2);
    assert_eq!(node(&store, &t.pa1.id), t.pa1);
    assert_eq!(node(&store, &t.pa2.id).version, t.pa2.version + 1);
    assert_consistent(&store);
}

#[test]
fn inactivating_a_preacher_orphans_the_family_group_and_keeps_it_active() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let result = engine::inactivate(
        &store,
        &t.p1.id,
        fellowship::hierarchy::model::InactivationCause::Withdrawal,
        &actor(),
    )
    .unwrap();

    assert!(!result.record.is_active());
    assert_eq!(
        result.record.chain, t.p1.chain,
        "the inactive record keeps its own chain as history"
    );
    assert_eq!(result.orphaned, vec![t.fg1.id.clone()]);

    let fg1 = node(&store, &t.fg1.id);
    assert!(fg1.is_active());
    assert_eq!(fg1.chain.preacher, None);
    assert_eq!(fg1.chain.zone.as_deref(), Some(t.z1.id.as_str()));
    for disciple in [&t.d, &t.d2] {
        let d = node(&store, &disciple.id);
        assert_eq!(d.chain.preacher, None);
        assert_eq!(d.chain.family_group.as_deref(), Some(t.fg1.id.as_str()));
    }
    assert_consistent(&store);
}

#[test]
fn skip_level_promotion_is_rejected_without_writing() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let before = all_nodes(&store);
    let journaled = journal_len(&store);

    let err = engine::promote(
        &store,
        t.d.member_id.as_deref().unwrap(),
        Role::Copastor,
        &t.pa1.id,
        &actor(),
    )
    .unwrap_err();

    match &err {
        FellowshipError::ValidationError(ValidationRule::SkipLevel { from, to }) => {
            assert_eq!((*from, *to), (Role::Disciple, Role::Copastor));
        }
        other => panic!("expected skip-level, got {other:?}"),
    }
    assert!(err.to_string().contains("skip-level"));
    assert_eq!(all_nodes(&store), before);
    assert_eq!(journal_len(&store), journaled);
}

#[test]
fn second_of_two_plans_against_the_same_state_fails_with_concurrent_write() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let first = engine::plan_reassignment(&store, &t.s1.id, &t.c2.id, &actor()).unwrap();
    let second = engine::plan_reassignment(&store, &t.s1.id, &t.c2.id, &actor()).unwrap();
    assert_ne!(first.plan_id, second.plan_id);

    engine::apply(&store, &first).unwrap();
    let after_first = all_nodes(&store);

    let err = engine::apply(&store, &second).unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
    assert!(matches!(
        err,
        FellowshipError::Conflict(ConflictKind::ConcurrentWrite { .. })
    ));
    assert_eq!(all_nodes(&store), after_first, "the losing plan wrote nothing");

    // re-planning against fresh state sees the move already done
    let replan = engine::plan_reassignment(&store, &t.s1.id, &t.c2.id, &actor()).unwrap_err();
    assert!(matches!(
        replan,
        FellowshipError::ValidationError(ValidationRule::NoOpReassignment { .. })
    ));
    assert_consistent(&store);
}

#[test]
fn concurrent_executors_commit_exactly_one_plan() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let store = Arc::new(store);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let s1 = t.s1.id.clone();
            let c2 = t.c2.id.clone();
            thread::spawn(move || {
                let plan = engine::plan_reassignment(&store, &s1, &c2, &actor()).unwrap();
                barrier.wait();
                engine::apply(&store, &plan)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let committed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(committed, 1, "{results:?}");
    let failed = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(failed.is_retryable());

    let s1 = node(&store, &t.s1.id);
    assert_eq!(s1.chain.copastor.as_deref(), Some(t.c2.id.as_str()));
    assert_eq!(s1.version, t.s1.version + 1);
    assert_consistent(&store);
}

#[test]
fn promoting_a_preacher_orphans_the_group_it_led() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let member_id = t.p1.member_id.clone().unwrap();

    let promotion =
        engine::promote(&store, &member_id, Role::Supervisor, &t.c2.id, &actor()).unwrap();

    assert_eq!(promotion.removed_record_id, t.p1.id);
    assert_eq!(promotion.orphaned, vec![t.fg1.id.clone()]);
    assert!(maybe_node(&store, &t.p1.id).is_none());
    assert_eq!(node(&store, &t.fg1.id).chain.preacher, None);
    assert_consistent(&store);
}

#[test]
fn plan_lists_deletion_then_creation_then_parent_touch() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let plan = engine::plan_promotion(
        &store,
        t.p1.member_id.as_deref().unwrap(),
        Role::Supervisor,
        Some(&t.c1.id),
        &actor(),
    )
    .unwrap();

    assert!(matches!(&plan.writes[0], Write::Delete { id, .. } if *id == t.p1.id));
    assert!(matches!(&plan.writes[1], Write::Create { node } if node.level == Level::Supervisor));
    assert!(matches!(&plan.writes[2], Write::Touch { id, .. } if *id == t.c1.id));
    // planning alone writes nothing
    assert!(maybe_node(&store, &t.p1.id).is_some());
}

#[test]
fn promotion_without_an_ancestor_is_rejected() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let err = engine::plan_promotion(
        &store,
        t.d.member_id.as_deref().unwrap(),
        Role::Preacher,
        None,
        &actor(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::ValidationError(ValidationRule::MissingAncestor {
            role: Role::Preacher,
            level: Level::Supervisor,
        })
    ));
}

#[test]
fn promotion_under_an_ancestor_of_the_wrong_level_is_rejected() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let err = engine::promote(
        &store,
        t.d.member_id.as_deref().unwrap(),
        Role::Preacher,
        &t.c1.id,
        &actor(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::ValidationError(ValidationRule::WrongAncestorLevel { .. })
    ));
}

#[test]
fn reassigning_under_a_record_of_the_wrong_level_is_rejected() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    // a supervisor's own zone sits below it, never above
    let err = engine::reassign_ancestor(&store, &t.s1.id, &t.z1.id, &actor()).unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::ValidationError(ValidationRule::WrongAncestorLevel { .. })
    ));

    let err = engine::reassign_ancestor(&store, &t.fg1.id, &t.fg1.id, &actor()).unwrap_err();
    assert!(err.is_client_error());
}

#[test]
fn reassigning_to_the_current_ancestor_is_a_no_op_error() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let err = engine::reassign_ancestor(&store, &t.c1.id, &t.pa1.id, &actor()).unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::ValidationError(ValidationRule::NoOpReassignment { .. })
    ));
}

#[test]
fn a_church_cannot_be_reassigned() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let err = engine::reassign_ancestor(&store, &t.ch1.id, &t.pa1.id, &actor()).unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::ValidationError(ValidationRule::NotReassignable {
            level: Level::Church
        })
    ));
}

#[test]
fn a_family_group_with_a_preacher_cannot_move_zones_directly() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let z2 = fellowship::registry::structure::create_zone(&store, &t.s2.id, "Zona Sur", &actor())
        .unwrap();

    let err = engine::reassign_ancestor(&store, &t.fg1.id, &z2.id, &actor()).unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::ValidationError(ValidationRule::ZoneFollowsPreacher { .. })
    ));
}

#[test]
fn moving_a_preacher_carries_its_family_group_into_the_new_zone() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let z2 = fellowship::registry::structure::create_zone(&store, &t.s2.id, "Zona Sur", &actor())
        .unwrap();

    let moved = engine::reassign_ancestor(&store, &t.p1.id, &z2.id, &actor()).unwrap();
    assert_eq!(moved.record.chain.supervisor.as_deref(), Some(t.s2.id.as_str()));

    let fg1 = node(&store, &t.fg1.id);
    assert_eq!(fg1.chain.zone.as_deref(), Some(z2.id.as_str()));
    assert_eq!(fg1.chain.copastor.as_deref(), Some(t.c2.id.as_str()));
    let d = node(&store, &t.d.id);
    assert_eq!(d.chain.zone.as_deref(), Some(z2.id.as_str()));
    assert_eq!(d.chain.pastor.as_deref(), Some(t.pa2.id.as_str()));
    assert_consistent(&store);
}

#[test]
fn applying_a_committed_plan_again_is_a_replay() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let plan = engine::plan_reassignment(&store, &t.c1.id, &t.pa2.id, &actor()).unwrap();
    let first = engine::apply(&store, &plan).unwrap();
    let state = all_nodes(&store);

    let again = engine::apply(&store, &plan).unwrap();
    assert!(!first.replayed);
    assert!(again.replayed);
    assert_eq!(again.updated_ids, first.updated_ids);
    assert_eq!(all_nodes(&store), state);
}

#[test]
fn reassignment_reaches_a_zone_orphaned_by_its_supervisor() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    engine::inactivate(&store, &t.s1.id, InactivationCause::Relocation, &actor()).unwrap();
    assert_eq!(node(&store, &t.z1.id).chain.supervisor, None);

    let moved = engine::reassign_ancestor(&store, &t.c1.id, &t.pa2.id, &actor()).unwrap();

    for id in [&t.z1.id, &t.p1.id, &t.fg1.id, &t.d.id, &t.d2.id] {
        let n = node(&store, id);
        assert_eq!(n.chain.pastor.as_deref(), Some(t.pa2.id.as_str()), "{}", id);
        assert_eq!(n.chain.copastor.as_deref(), Some(t.c1.id.as_str()), "{}", id);
        assert_eq!(n.chain.church.as_deref(), Some(t.ch1.id.as_str()), "{}", id);
        assert_eq!(n.chain.supervisor, None, "{}", id);
        assert!(moved.updated_ids.contains(id), "{}", id);
    }
    // pointers below the gap are kept
    assert_eq!(node(&store, &t.p1.id).chain.zone.as_deref(), Some(t.z1.id.as_str()));
    assert_eq!(node(&store, &t.d.id).chain.family_group.as_deref(), Some(t.fg1.id.as_str()));
    // the retired supervisor is history and is not rewritten
    assert_eq!(node(&store, &t.s1.id).chain.pastor.as_deref(), Some(t.pa1.id.as_str()));
    assert_consistent(&store);
}

#[test]
fn reassignment_reaches_disciples_orphaned_by_their_family_group() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    engine::inactivate(&store, &t.fg1.id, InactivationCause::Restructuring, &actor()).unwrap();
    assert_eq!(node(&store, &t.d.id).chain.family_group, None);

    engine::reassign_ancestor(&store, &t.c1.id, &t.pa2.id, &actor()).unwrap();

    for id in [&t.d.id, &t.d2.id] {
        let n = node(&store, id);
        assert_eq!(n.chain.pastor.as_deref(), Some(t.pa2.id.as_str()), "{}", id);
        assert_eq!(n.chain.copastor.as_deref(), Some(t.c1.id.as_str()), "{}", id);
        assert_eq!(n.chain.supervisor.as_deref(), Some(t.s1.id.as_str()), "{}", id);
        assert_eq!(n.chain.zone.as_deref(), Some(t.z1.id.as_str()), "{}", id);
        assert_eq!(n.chain.preacher.as_deref(), Some(t.p1.id.as_str()), "{}", id);
        assert_eq!(n.chain.family_group, None, "{}", id);
    }
    assert_eq!(node(&store, &t.fg1.id).chain.pastor.as_deref(), Some(t.pa1.id.as_str()));
    assert_consistent(&store);
}

#[test]
fn moving_a_supervisor_carries_the_orphans_of_its_zone() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    engine::inactivate(&store, &t.p1.id, InactivationCause::Withdrawal, &actor()).unwrap();

    engine::reassign_ancestor(&store, &t.s1.id, &t.c2.id, &actor()).unwrap();

    for id in [&t.fg1.id, &t.d.id, &t.d2.id] {
        let n = node(&store, id);
        assert_eq!(n.chain.copastor.as_deref(), Some(t.c2.id.as_str()), "{}", id);
        assert_eq!(n.chain.pastor.as_deref(), Some(t.pa2.id.as_str()), "{}", id);
        assert_eq!(n.chain.preacher, None, "{}", id);
    }
    assert_consistent(&store);
}
