//! Creation of hierarchy records outside of promotion: churches, zones,
//! family groups, and direct enrollment of a member at a role.
//!
//! Creations go through the same planner and executor as every transition,
//! so the parent is version-touched and the creation is journaled.

use crate::core::actor::Actor;
use crate::core::broker::DbBroker;
use crate::core::error::{FellowshipError, ValidationRule};
use crate::core::store::Store;
use crate::hierarchy::executor;
use crate::hierarchy::model::{Level, Node, Role};
use crate::hierarchy::planner::{self, CascadePlan, PlanContext};
use crate::hierarchy::repo;
use crate::hierarchy::validator;

fn required_name(name: &str) -> Result<String, FellowshipError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationRule::InvalidField {
            field: "name",
            reason: "must not be empty".to_string(),
        }
        .into());
    }
    Ok(trimmed.to_string())
}

fn commit(store: &Store, plan: &CascadePlan) -> Result<Node, FellowshipError> {
    let outcome = executor::execute(store, plan)?;
    DbBroker::new(store).with_read(|conn| repo::require_node(conn, &outcome.root_id))
}

pub fn create_church(
    store: &Store,
    name: &str,
    code: Option<&str>,
    actor: &Actor,
) -> Result<Node, FellowshipError> {
    let ctx = PlanContext::new(store, actor);
    let plan = planner::plan_creation(
        Level::Church,
        None,
        Some(required_name(name)?),
        code.map(str::to_string),
        None,
        &ctx,
    )?;
    commit(store, &plan)
}

/// Place a member who holds no active record directly at `role`.
///
/// This is also how a member re-enters the hierarchy after inactivation,
/// at any level.
pub fn enroll(
    store: &Store,
    member_id: &str,
    role: Role,
    ancestor_id: Option<&str>,
    actor: &Actor,
) -> Result<Node, FellowshipError> {
    let ctx = PlanContext::new(store, actor);
    let plan = DbBroker::new(store).with_read(|conn| {
        let parent = validator::validate_enrollment(conn, member_id, role, ancestor_id)?;
        planner::plan_creation(
            role.level(),
            Some(member_id.to_string()),
            None,
            None,
            Some(&parent),
            &ctx,
        )
    })?;
    commit(store, &plan)
}

pub fn create_zone(
    store: &Store,
    supervisor_id: &str,
    name: &str,
    actor: &Actor,
) -> Result<Node, FellowshipError> {
    let name = required_name(name)?;
    let ctx = PlanContext::new(store, actor);
    let plan = DbBroker::new(store).with_read(|conn| {
        let supervisor = validator::validate_zone_creation(conn, supervisor_id)?;
        planner::plan_creation(Level::Zone, None, Some(name), None, Some(&supervisor), &ctx)
    })?;
    commit(store, &plan)
}

pub fn create_family_group(
    store: &Store,
    zone_id: &str,
    preacher_id: Option<&str>,
    name: &str,
    code: &str,
    actor: &Actor,
) -> Result<Node, FellowshipError> {
    let name = required_name(name)?;
    let code = code.trim();
    if code.is_empty() {
        return Err(ValidationRule::InvalidField {
            field: "code",
            reason: "a family group needs a code".to_string(),
        }
        .into());
    }
    let ctx = PlanContext::new(store, actor);
    let plan = DbBroker::new(store).with_read(|conn| {
        let parent = validator::validate_family_group_creation(conn, zone_id, preacher_id)?;
        planner::plan_creation(
            Level::FamilyGroup,
            None,
            Some(name),
            Some(code.to_string()),
            Some(&parent),
            &ctx,
        )
    })?;
    commit(store, &plan)
}
