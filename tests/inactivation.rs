mod common;

use common::{Tree, actor, all_nodes, assert_consistent, enroll, node, open_store};
use fellowship::core::error::{ConflictKind, FellowshipError, ValidationRule};
use fellowship::hierarchy::engine;
use fellowship::hierarchy::inactivation;
use fellowship::hierarchy::model::{InactivationCause, Level, RecordStatus, Role};
use fellowship::hierarchy::planner::Write;

#[test]
fn inactivating_a_supervisor_orphans_its_zone_only() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let result =
        engine::inactivate(&store, &t.s1.id, InactivationCause::Relocation, &actor()).unwrap();

    assert_eq!(result.record.inactivation_cause, Some(InactivationCause::Relocation));
    // the preacher hangs off the zone, so only the zone is a direct child
    assert_eq!(result.orphaned, vec![t.z1.id.clone()]);
    for id in [&t.z1.id, &t.p1.id, &t.fg1.id, &t.d.id, &t.d2.id] {
        let n = node(&store, id);
        assert!(n.is_active(), "{id} stays active");
        assert_eq!(n.chain.supervisor, None, "{id} lost its supervisor pointer");
        assert_eq!(n.chain.copastor.as_deref(), Some(t.c1.id.as_str()));
    }
    assert_consistent(&store);
}

#[test]
fn inactivating_a_church_keeps_pastors_but_clears_their_church() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let result =
        engine::inactivate(&store, &t.ch1.id, InactivationCause::Restructuring, &actor()).unwrap();
    let mut orphaned = result.orphaned.clone();
    orphaned.sort();
    let mut pastors = vec![t.pa1.id.clone(), t.pa2.id.clone()];
    pastors.sort();
    assert_eq!(orphaned, pastors);

    for n in all_nodes(&store).iter().filter(|n| n.is_active()) {
        assert_eq!(n.chain.church, None, "{}", n.id);
    }
    assert_consistent(&store);
}

#[test]
fn inactive_records_cannot_be_inactivated_again() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    engine::inactivate(&store, &t.d.id, InactivationCause::Withdrawal, &actor()).unwrap();

    let err = engine::inactivate(&store, &t.d.id, InactivationCause::Other, &actor()).unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::ValidationError(ValidationRule::InactiveRecord { .. })
    ));
}

#[test]
fn inactive_descendants_are_left_as_they_were() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    engine::inactivate(&store, &t.d.id, InactivationCause::Deceased, &actor()).unwrap();
    let frozen = node(&store, &t.d.id);

    let result =
        engine::inactivate(&store, &t.fg1.id, InactivationCause::Restructuring, &actor()).unwrap();

    assert!(!result.updated_ids.contains(&t.d.id));
    assert_eq!(node(&store, &t.d.id), frozen);
    let d2 = node(&store, &t.d2.id);
    assert_eq!(d2.chain.family_group, None);
    assert_eq!(d2.chain.preacher.as_deref(), Some(t.p1.id.as_str()));
    assert_eq!(result.orphaned, vec![t.d2.id.clone()]);
}

#[test]
fn reassigning_under_an_inactive_ancestor_is_a_conflict() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    engine::inactivate(&store, &t.c2.id, InactivationCause::Withdrawal, &actor()).unwrap();

    let err = engine::reassign_ancestor(&store, &t.s1.id, &t.c2.id, &actor()).unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::Conflict(ConflictKind::InactiveAncestor {
            level: Level::Copastor,
            ..
        })
    ));
}

#[test]
fn an_orphaned_family_group_is_re_parented_by_reassignment() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    engine::inactivate(&store, &t.p1.id, InactivationCause::Withdrawal, &actor()).unwrap();

    let successor = enroll(&store, "Rut", Role::Preacher, &t.s1.id);
    assert_eq!(successor.chain.zone.as_deref(), Some(t.z1.id.as_str()));

    let moved = engine::reassign_ancestor(&store, &t.fg1.id, &successor.id, &actor()).unwrap();
    assert_eq!(moved.record.chain.preacher.as_deref(), Some(successor.id.as_str()));
    for disciple in [&t.d, &t.d2] {
        assert_eq!(
            node(&store, &disciple.id).chain.preacher.as_deref(),
            Some(successor.id.as_str())
        );
    }
    assert_consistent(&store);
}

#[test]
fn a_preacher_leads_at_most_one_group() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let fg2 = fellowship::registry::structure::create_family_group(
        &store, &t.z1.id, None, "Las Palmas", "FG-002", &actor(),
    )
    .unwrap();

    let err = engine::reassign_ancestor(&store, &fg2.id, &t.p1.id, &actor()).unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::Conflict(ConflictKind::PreacherAlreadyLeads { .. })
    ));
}

#[test]
fn planning_an_inactivation_writes_nothing() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let before = all_nodes(&store);

    let plan = inactivation::plan(&store, &t.z1.id, InactivationCause::Restructuring, &actor())
        .unwrap();

    match &plan.writes[0] {
        Write::Update { node, expected_version } => {
            assert_eq!(node.id, t.z1.id);
            assert_eq!(node.status, RecordStatus::Inactive);
            assert_eq!(*expected_version, t.z1.version);
        }
        other => panic!("root write should be an update, got {other:?}"),
    }
    assert_eq!(plan.orphaned, vec![t.p1.id.clone()]);
    assert_eq!(all_nodes(&store), before);
}
