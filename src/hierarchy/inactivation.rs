//! Inactivation propagator.
//!
//! Inactivating a record keeps it (and its own chain) as history, and cuts
//! the one pointer each active descendant holds to it. Direct children are
//! handed back as orphans to be re-parented by a later reassignment; they are
//! never re-pointed to a sibling, inactivated or deleted here.

use crate::core::actor::Actor;
use crate::core::broker::DbBroker;
use crate::core::error::FellowshipError;
use crate::core::store::Store;
use crate::hierarchy::executor;
use crate::hierarchy::model::{InactivationCause, Node};
use crate::hierarchy::planner::{self, CascadePlan, PlanContext};
use crate::hierarchy::repo;
use crate::hierarchy::validator;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Inactivation {
    pub plan_id: String,
    pub record: Node,
    pub orphaned: Vec<String>,
    pub updated_ids: Vec<String>,
}

pub fn plan(
    store: &Store,
    record_id: &str,
    cause: InactivationCause,
    actor: &Actor,
) -> Result<CascadePlan, FellowshipError> {
    let ctx = PlanContext::new(store, actor);
    DbBroker::new(store).with_read(|conn| {
        let record = validator::validate_inactivation(conn, record_id)?;
        planner::plan_inactivation(conn, &record, cause, &ctx)
    })
}

pub fn propagate(
    store: &Store,
    record_id: &str,
    cause: InactivationCause,
    actor: &Actor,
) -> Result<Inactivation, FellowshipError> {
    let plan = plan(store, record_id, cause, actor)?;
    let outcome = executor::execute(store, &plan)?;
    let record = DbBroker::new(store).with_read(|conn| repo::require_node(conn, &plan.root_id))?;
    Ok(Inactivation {
        plan_id: outcome.plan_id,
        record,
        orphaned: outcome.orphaned_ids,
        updated_ids: outcome.updated_ids,
    })
}
