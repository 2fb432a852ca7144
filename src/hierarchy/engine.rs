//! Public entry points of the hierarchy consistency engine.
//!
//! Each transition runs validate, plan, execute: validation and planning read
//! a snapshot without writing, and execution applies the whole plan in one
//! transaction. The acting user is passed into every call.

use crate::core::actor::Actor;
use crate::core::broker::DbBroker;
use crate::core::error::FellowshipError;
use crate::core::store::Store;
use crate::hierarchy::executor::{self, CascadeOutcome};
use crate::hierarchy::inactivation::{self, Inactivation};
use crate::hierarchy::ledger::{self, RoleSnapshot};
use crate::hierarchy::model::{InactivationCause, Node, Role};
use crate::hierarchy::planner::{self, CascadePlan, PlanContext};
use crate::hierarchy::repo;
use crate::hierarchy::validator;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Promotion {
    pub plan_id: String,
    pub record: Node,
    /// The lower-level record the new one replaced.
    pub removed_record_id: String,
    pub orphaned: Vec<String>,
    pub updated_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reassignment {
    pub plan_id: String,
    pub record: Node,
    pub updated_ids: Vec<String>,
}

pub fn plan_promotion(
    store: &Store,
    member_id: &str,
    target: Role,
    ancestor_id: Option<&str>,
    actor: &Actor,
) -> Result<CascadePlan, FellowshipError> {
    let ctx = PlanContext::new(store, actor);
    DbBroker::new(store).with_read(|conn| {
        let check = validator::validate_promotion(conn, member_id, target, ancestor_id)?;
        planner::plan_promotion(conn, &check, &ctx)
    })
}

pub fn plan_reassignment(
    store: &Store,
    record_id: &str,
    new_ancestor_id: &str,
    actor: &Actor,
) -> Result<CascadePlan, FellowshipError> {
    let ctx = PlanContext::new(store, actor);
    DbBroker::new(store).with_read(|conn| {
        let check = validator::validate_reassignment(conn, record_id, new_ancestor_id)?;
        planner::plan_reassignment(conn, &check, &ctx)
    })
}

fn committed_root(store: &Store, plan: &CascadePlan) -> Result<(CascadeOutcome, Node), FellowshipError> {
    let outcome = executor::execute(store, plan)?;
    let record = DbBroker::new(store).with_read(|conn| repo::require_node(conn, &outcome.root_id))?;
    Ok((outcome, record))
}

/// Promote a member exactly one level, placing the new record under
/// `ancestor_id`. The member's previous record is removed.
pub fn promote(
    store: &Store,
    member_id: &str,
    target: Role,
    ancestor_id: &str,
    actor: &Actor,
) -> Result<Promotion, FellowshipError> {
    let plan = plan_promotion(store, member_id, target, Some(ancestor_id), actor)?;
    let removed_record_id = plan.removed_ids().into_iter().next().unwrap_or_default();
    let (outcome, record) = committed_root(store, &plan)?;
    Ok(Promotion {
        plan_id: outcome.plan_id,
        record,
        removed_record_id,
        orphaned: outcome.orphaned_ids,
        updated_ids: outcome.updated_ids,
    })
}

/// Move a record under a new ancestor, carrying its whole subtree.
pub fn reassign_ancestor(
    store: &Store,
    record_id: &str,
    new_ancestor_id: &str,
    actor: &Actor,
) -> Result<Reassignment, FellowshipError> {
    let plan = plan_reassignment(store, record_id, new_ancestor_id, actor)?;
    let (outcome, record) = committed_root(store, &plan)?;
    Ok(Reassignment {
        plan_id: outcome.plan_id,
        record,
        updated_ids: outcome.updated_ids,
    })
}

pub fn inactivate(
    store: &Store,
    record_id: &str,
    cause: InactivationCause,
    actor: &Actor,
) -> Result<Inactivation, FellowshipError> {
    inactivation::propagate(store, record_id, cause, actor)
}

pub fn resolve_role(store: &Store, member_id: &str) -> Result<RoleSnapshot, FellowshipError> {
    ledger::resolve_role(store, member_id)
}

/// Execute a plan produced earlier by one of the `plan_*` functions.
pub fn apply(store: &Store, plan: &CascadePlan) -> Result<CascadeOutcome, FellowshipError> {
    executor::execute(store, plan)
}
