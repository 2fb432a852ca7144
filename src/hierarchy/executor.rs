//! Cascade executor: applies a plan as one `BEGIN IMMEDIATE` transaction.
//!
//! Every row write is guarded by the version the plan was computed against,
//! so a plan built on state someone else has since changed aborts whole with
//! `Conflict(ConcurrentWrite)` instead of half-applying. The journal row is
//! inserted in the same transaction; executing a plan that is already in the
//! journal changes nothing and returns what was recorded.

use crate::core::broker::{self, DbBroker};
use crate::core::error::{ConflictKind, FellowshipError};
use crate::core::store::Store;
use crate::core::time;
use crate::hierarchy::audit;
use crate::hierarchy::journal::{self, JournalEntry};
use crate::hierarchy::planner::{CascadePlan, Write};
use crate::hierarchy::repo;
use rusqlite::Connection;
use serde::Serialize;

pub const OP_INTEGRITY_INCIDENT: &str = "cascade.integrity_incident";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeOutcome {
    pub plan_id: String,
    pub kind: String,
    pub root_id: String,
    pub updated_ids: Vec<String>,
    pub orphaned_ids: Vec<String>,
    /// The plan had already committed; nothing was written this time.
    pub replayed: bool,
}

impl CascadeOutcome {
    fn from_entry(entry: JournalEntry, replayed: bool) -> Self {
        Self {
            plan_id: entry.plan_id,
            kind: entry.kind,
            root_id: entry.root_id,
            updated_ids: entry.updated_ids,
            orphaned_ids: entry.orphaned_ids,
            replayed,
        }
    }
}

pub fn op_name(plan: &CascadePlan) -> String {
    format!("cascade.{}", plan.kind())
}

fn already_committed(conn: &Connection, plan: &CascadePlan) -> Result<Option<JournalEntry>, FellowshipError> {
    let Some(entry) = journal::find(conn, &plan.plan_id)? else {
        return Ok(None);
    };
    if entry.fingerprint != plan.fingerprint()? {
        return Err(ConflictKind::UniqueViolation {
            record_id: plan.plan_id.clone(),
            detail: "plan id already committed with a different write-set".to_string(),
        }
        .into());
    }
    Ok(Some(entry))
}

/// Apply every write of `plan` on `conn`, stopping at the first stale row.
pub fn apply_writes(conn: &Connection, plan: &CascadePlan) -> Result<(), FellowshipError> {
    for write in &plan.writes {
        let changed = match write {
            Write::Create { node } => {
                repo::insert_node(conn, node)?;
                1
            }
            Write::Update {
                node,
                expected_version,
            } => repo::update_node(conn, node, *expected_version)?,
            Write::Delete {
                id,
                expected_version,
                ..
            } => repo::delete_node(conn, id, *expected_version)?,
            Write::Touch {
                id,
                expected_version,
            } => repo::touch_node(conn, id, *expected_version, plan.actor.as_str(), &plan.ts)?,
        };
        if changed == 0 {
            return Err(ConflictKind::ConcurrentWrite {
                record_id: write.record_id().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

pub fn execute(store: &Store, plan: &CascadePlan) -> Result<CascadeOutcome, FellowshipError> {
    let broker = DbBroker::new(store);
    if let Some(entry) = broker.with_read(|conn| already_committed(conn, plan))? {
        return Ok(CascadeOutcome::from_entry(entry, true));
    }

    let op = op_name(plan);
    let outcome = broker.with_tx(&plan.actor, Some(&plan.plan_id), &op, |tx| {
        // a concurrent executor may have committed the same plan meanwhile
        if let Some(entry) = already_committed(tx, plan)? {
            return Ok(CascadeOutcome::from_entry(entry, true));
        }
        apply_writes(tx, plan)?;
        let entry = journal::record(tx, plan)?;
        Ok(CascadeOutcome::from_entry(entry, false))
    })?;

    if store.config.verify_after_commit && !outcome.replayed {
        verify_committed(store, &broker, plan, &outcome)?;
    }
    Ok(outcome)
}

/// Re-audit the committed records. A violation here means committed state
/// is inconsistent: it is logged as an incident and never retried.
fn verify_committed(
    store: &Store,
    broker: &DbBroker,
    plan: &CascadePlan,
    outcome: &CascadeOutcome,
) -> Result<(), FellowshipError> {
    let violations = audit::audit_records(store, &outcome.updated_ids)?;
    if violations.is_empty() {
        return Ok(());
    }
    let detail = violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    broker.log_event(
        &time::new_event_id(),
        &plan.actor,
        Some(&plan.plan_id),
        OP_INTEGRITY_INCIDENT,
        broker::STATUS_ERROR,
        Some(detail.clone()),
    )?;
    Err(FellowshipError::PartialCascadeFailure {
        plan_id: plan.plan_id.clone(),
        detail,
    })
}
