mod common;

use common::{Tree, actor, add_member, node, open_store};
use fellowship::core::broker::{self, DbBroker};
use fellowship::core::config::{self, FellowshipConfig};
use fellowship::core::error::{ConflictKind, FellowshipError};
use fellowship::core::store::Store;
use fellowship::core::time;
use fellowship::hierarchy::engine;
use fellowship::hierarchy::executor;
use fellowship::hierarchy::journal::{self, Resolution};
use fellowship::hierarchy::model::{InactivationCause, Level};
use fellowship::hierarchy::planner::{self, PlanContext};
use fellowship::hierarchy::repo;
use fellowship::registry::structure;
use std::panic::{self, AssertUnwindSafe};

#[test]
fn every_committed_transition_is_journaled() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let moved = engine::reassign_ancestor(&store, &t.c1.id, &t.pa2.id, &actor()).unwrap();

    let (all, for_c1) = DbBroker::new(&store)
        .with_read(|conn| {
            Ok((
                journal::list(conn, None, 100)?,
                journal::list(conn, Some(&t.c1.id), 100)?,
            ))
        })
        .unwrap();
    // one creation per record of the tree, then the move
    assert_eq!(all.len(), 13);
    assert_eq!(for_c1.len(), 2);
    let kinds: Vec<_> = for_c1.iter().map(|e| e.kind.as_str()).collect();
    assert!(kinds.contains(&"create") && kinds.contains(&"reassign"));

    let entry = for_c1.iter().find(|e| e.kind == "reassign").unwrap();
    assert_eq!(entry.plan_id, moved.plan_id);
    assert_eq!(entry.updated_ids, moved.updated_ids);
    assert_eq!(entry.actor, "secretary@central");
}

#[test]
fn replaying_a_plan_id_with_different_writes_is_refused() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);

    let plan = engine::plan_reassignment(&store, &t.c1.id, &t.pa2.id, &actor()).unwrap();
    engine::apply(&store, &plan).unwrap();

    let mut tampered = plan.clone();
    tampered.writes.pop();
    assert_ne!(tampered.fingerprint().unwrap(), plan.fingerprint().unwrap());
    let err = engine::apply(&store, &tampered).unwrap_err();
    assert!(matches!(
        err,
        FellowshipError::Conflict(ConflictKind::UniqueViolation { .. })
    ));
}

#[test]
fn executor_logs_pending_and_terminal_events_per_plan() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let moved = engine::reassign_ancestor(&store, &t.s1.id, &t.c2.id, &actor()).unwrap();

    let events: Vec<_> = DbBroker::new(&store)
        .read_events()
        .unwrap()
        .into_iter()
        .filter(|e| e.intent_ref.as_deref() == Some(moved.plan_id.as_str()))
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].op, "cascade.reassign");
    assert_eq!(events[0].status, broker::STATUS_PENDING);
    assert_eq!(events[1].status, broker::STATUS_SUCCESS);
    assert_eq!(events[0].request_id, events[1].request_id);

    let report = journal::verify(&store).unwrap();
    assert!(report.interrupted.is_empty());
    assert_eq!(report.committed_plans, 13);
}

#[test]
fn crash_inside_a_cascade_rolls_back_and_is_resolved_against_the_journal() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let broker = DbBroker::new(&store);
    let supervisor = t.s1.clone();

    let crashed = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = broker.with_tx(
            &actor(),
            Some("PL_CRASHED"),
            "cascade.reassign",
            |tx| -> Result<(), FellowshipError> {
                repo::touch_node(tx, &supervisor.id, supervisor.version, "secretary@central", "1Z")?;
                panic!("simulated crash mid-cascade");
            },
        );
    }));
    assert!(crashed.is_err());

    // the transaction was dropped uncommitted
    assert_eq!(node(&store, &t.s1.id).version, t.s1.version);

    let replay = broker.verify_replay().unwrap();
    assert_eq!(replay.divergences.len(), 1);
    assert_eq!(
        replay.divergences[0].reason,
        "Pending event without terminal status (potential crash)"
    );

    let report = journal::verify(&store).unwrap();
    assert_eq!(report.interrupted.len(), 1);
    let interrupted = &report.interrupted[0];
    assert_eq!(interrupted.plan_id.as_deref(), Some("PL_CRASHED"));
    assert_eq!(interrupted.op, "cascade.reassign");
    assert_eq!(interrupted.resolution, Resolution::RolledBack);
}

#[test]
fn missing_terminal_event_after_commit_resolves_as_committed() {
    let (_tmp, store) = open_store();
    let t = Tree::build(&store);
    let moved = engine::reassign_ancestor(&store, &t.c1.id, &t.pa2.id, &actor()).unwrap();

    // a process that died between commit and its terminal log line
    DbBroker::new(&store)
        .log_event(
            &time::new_event_id(),
            &actor(),
            Some(&moved.plan_id),
            "cascade.reassign",
            broker::STATUS_PENDING,
            None,
        )
        .unwrap();

    let report = journal::verify(&store).unwrap();
    assert_eq!(report.interrupted.len(), 1);
    assert_eq!(report.interrupted[0].resolution, Resolution::Committed);
}

fn pastor_under_inactive_church(store: &Store) -> Result<executor::CascadeOutcome, FellowshipError> {
    let church = structure::create_church(store, "Iglesia Anexo", None, &actor())?;
    engine::inactivate(store, &church.id, InactivationCause::Restructuring, &actor())?;
    let church = node(store, &church.id);
    let member_id = add_member(store, "Lucas", "Fuera");

    // planned without the validator, as a buggy caller would
    let ctx = PlanContext::new(store, &actor());
    let plan = planner::plan_creation(Level::Pastor, Some(member_id), None, None, Some(&church), &ctx)?;
    executor::execute(store, &plan)
}

#[test]
fn failed_post_commit_verification_is_an_integrity_incident() {
    let (_tmp, store) = open_store();

    let err = pastor_under_inactive_church(&store).unwrap_err();
    let FellowshipError::PartialCascadeFailure { plan_id, detail } = &err else {
        panic!("expected partial cascade failure, got {err:?}");
    };
    assert!(err.is_integrity_incident());
    assert!(detail.contains("inactive"), "{detail}");

    // the writes are committed; the incident is what flags them
    let entry = DbBroker::new(&store)
        .with_read(|conn| journal::find(conn, plan_id))
        .unwrap();
    assert!(entry.is_some());
    let incident = DbBroker::new(&store)
        .read_events()
        .unwrap()
        .into_iter()
        .find(|e| e.op == executor::OP_INTEGRITY_INCIDENT)
        .unwrap();
    assert_eq!(incident.status, broker::STATUS_ERROR);
    assert_eq!(incident.intent_ref.as_deref(), Some(plan_id.as_str()));
}

#[test]
fn verification_can_be_switched_off_in_the_store_config() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join(".fellowship");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(
        config::config_path(&root),
        "verify_after_commit = false\naudit_log = false\n",
    )
    .unwrap();

    let store = Store::open(&root).unwrap();
    assert!(!store.config.verify_after_commit);
    let outcome = pastor_under_inactive_church(&store).unwrap();
    assert!(!outcome.replayed);
    assert!(DbBroker::new(&store).read_events().unwrap().is_empty());
}

#[test]
fn configured_write_limit_rejects_large_cascades() {
    let tmp = tempfile::tempdir().unwrap();
    let config = FellowshipConfig {
        max_cascade_writes: 2,
        ..FellowshipConfig::default()
    };
    let store = Store::open_with_config(tmp.path(), config).unwrap();
    let t = Tree::build(&store);

    let err = engine::plan_reassignment(&store, &t.c1.id, &t.pa2.id, &actor()).unwrap_err();
    assert!(err.to_string().contains("exceeds the configured limit of 2"));
}

#[test]
fn malformed_config_is_a_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(config::config_path(tmp.path()), "max_cascade_writes = \"many\"\n").unwrap();
    let err = Store::open(tmp.path()).unwrap_err();
    assert!(matches!(err, FellowshipError::ConfigError(_)));
}

#[test]
fn listing_with_an_unbounded_limit_returns_everything() {
    let (_tmp, store) = open_store();
    Tree::build(&store);

    let (entries, members) = DbBroker::new(&store)
        .with_read(|conn| {
            Ok((
                journal::list(conn, None, usize::MAX)?,
                fellowship::registry::member::list_members(conn, usize::MAX)?,
            ))
        })
        .unwrap();
    assert_eq!(entries.len(), 12);
    // every record of the tree except the church, zone and family group
    assert_eq!(members.len(), 9);
}
