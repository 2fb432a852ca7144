//! Hierarchy validator: rejects a transition before anything is planned or
//! written.
//!
//! Each check returns the records the planner needs, already loaded, so the
//! planner never re-derives who the parent is.

use crate::core::error::{ConflictKind, FellowshipError, ValidationRule};
use crate::hierarchy::ledger;
use crate::hierarchy::model::{Level, Node, Role};
use crate::hierarchy::repo;
use crate::hierarchy::transitions::{self, PromotionStep, RoleState};
use crate::registry::member;
use rusqlite::Connection;

#[derive(Debug, Clone)]
pub struct PromotionCheck {
    pub current: Node,
    pub step: PromotionStep,
    /// The ancestor the caller named.
    pub ancestor: Node,
    /// The record the new one hangs off; a supervisor's zone for preachers.
    pub parent: Node,
}

#[derive(Debug, Clone)]
pub struct ReassignmentCheck {
    pub record: Node,
    pub ancestor: Node,
    pub parent: Node,
}

/// Load `ancestor_id` and require it to be active and of one of `expected`.
pub fn require_active_ancestor(
    conn: &Connection,
    subject_id: &str,
    ancestor_id: &str,
    expected: &[Level],
) -> Result<Node, FellowshipError> {
    let ancestor = repo::get_node(conn, ancestor_id)?.ok_or_else(|| {
        FellowshipError::NotFound(format!("Ancestor '{}' not found", ancestor_id))
    })?;
    if !expected.contains(&ancestor.level) {
        return Err(ValidationRule::WrongAncestorLevel {
            record_id: subject_id.to_string(),
            expected: expected.to_vec(),
            found: ancestor.level,
        }
        .into());
    }
    if !ancestor.is_active() {
        return Err(ConflictKind::InactiveAncestor {
            ancestor_id: ancestor.id,
            level: ancestor.level,
        }
        .into());
    }
    Ok(ancestor)
}

/// A preacher placed under a supervisor joins the supervisor's active zone.
pub fn effective_parent(conn: &Connection, level: Level, ancestor: Node) -> Result<Node, FellowshipError> {
    if level == Level::Preacher && ancestor.level == Level::Supervisor {
        if let Some(zone) = repo::active_zone_of(conn, &ancestor.id)? {
            return Ok(zone);
        }
    }
    Ok(ancestor)
}

fn reject_self_and_cycles(record: &Node, ancestor: &Node) -> Result<(), FellowshipError> {
    let same_member = record.member_id.is_some() && record.member_id == ancestor.member_id;
    if ancestor.id == record.id || same_member {
        return Err(ValidationRule::SelfReference {
            record_id: record.id.clone(),
        }
        .into());
    }
    if ancestor.chain.position_of(&record.id).is_some() {
        return Err(ValidationRule::Cycle {
            record_id: record.id.clone(),
            ancestor_id: ancestor.id.clone(),
        }
        .into());
    }
    Ok(())
}

pub fn validate_promotion(
    conn: &Connection,
    member_id: &str,
    target: Role,
    ancestor_id: Option<&str>,
) -> Result<PromotionCheck, FellowshipError> {
    if !member::member_exists(conn, member_id)? {
        return Err(FellowshipError::NotFound(format!("Member '{}' not found", member_id)));
    }
    let current = ledger::active_record(conn, member_id)?.ok_or_else(|| {
        FellowshipError::from(ValidationRule::NoActiveRole {
            member_id: member_id.to_string(),
        })
    })?;
    let role = current.role().ok_or_else(|| {
        FellowshipError::from(ValidationRule::NoActiveRole {
            member_id: member_id.to_string(),
        })
    })?;
    let step = transitions::check_promotion(
        &current.id,
        RoleState {
            role,
            status: current.status,
        },
        target,
    )?;
    let Some(ancestor_id) = ancestor_id else {
        return Err(ValidationRule::MissingAncestor {
            role: target,
            level: step.ancestor_level,
        }
        .into());
    };
    let ancestor = require_active_ancestor(conn, &current.id, ancestor_id, &[step.ancestor_level])?;
    reject_self_and_cycles(&current, &ancestor)?;
    let parent = effective_parent(conn, target.level(), ancestor.clone())?;
    Ok(PromotionCheck {
        current,
        step,
        ancestor,
        parent,
    })
}

pub fn validate_reassignment(
    conn: &Connection,
    record_id: &str,
    new_ancestor_id: &str,
) -> Result<ReassignmentCheck, FellowshipError> {
    let record = repo::require_node(conn, record_id)?;
    let parents = transitions::check_reassignment(&record.id, record.level, record.status)?;
    let ancestor = require_active_ancestor(conn, &record.id, new_ancestor_id, parents)?;
    reject_self_and_cycles(&record, &ancestor)?;

    if record.chain.get(ancestor.level) == Some(ancestor.id.as_str()) {
        return Err(ValidationRule::NoOpReassignment {
            record_id: record.id.clone(),
            ancestor_id: ancestor.id.clone(),
        }
        .into());
    }

    match (record.level, ancestor.level) {
        (Level::FamilyGroup, Level::Zone) => {
            if let Some(preacher_id) = &record.chain.preacher {
                return Err(ValidationRule::ZoneFollowsPreacher {
                    family_group_id: record.id.clone(),
                    preacher_id: preacher_id.clone(),
                }
                .into());
            }
        }
        (Level::FamilyGroup, Level::Preacher) => {
            check_preacher_can_lead(conn, &ancestor, Some(&record.id))?;
        }
        (Level::Zone, Level::Supervisor) => {
            check_supervisor_has_no_zone(conn, &ancestor, Some(&record.id))?;
        }
        _ => {}
    }

    let parent = effective_parent(conn, record.level, ancestor.clone())?;
    Ok(ReassignmentCheck {
        record,
        ancestor,
        parent,
    })
}

pub fn validate_inactivation(conn: &Connection, record_id: &str) -> Result<Node, FellowshipError> {
    let record = repo::require_node(conn, record_id)?;
    transitions::check_inactivation(&record.id, record.status)?;
    Ok(record)
}

/// Checks for placing a member with no active record directly at `role`.
pub fn validate_enrollment(
    conn: &Connection,
    member_id: &str,
    role: Role,
    ancestor_id: Option<&str>,
) -> Result<Node, FellowshipError> {
    if !member::member_exists(conn, member_id)? {
        return Err(FellowshipError::NotFound(format!("Member '{}' not found", member_id)));
    }
    if let Some(existing) = ledger::active_record(conn, member_id)? {
        let held = existing.role().unwrap_or(role);
        return Err(ValidationRule::DuplicateRole {
            member_id: member_id.to_string(),
            role: held,
        }
        .into());
    }
    let Some(ancestor_id) = ancestor_id else {
        return Err(ValidationRule::MissingAncestor {
            role,
            level: role.ancestor_level(),
        }
        .into());
    };
    let ancestor = require_active_ancestor(conn, member_id, ancestor_id, &[role.ancestor_level()])?;
    if ancestor.member_id.as_deref() == Some(member_id) {
        return Err(ValidationRule::SelfReference {
            record_id: member_id.to_string(),
        }
        .into());
    }
    effective_parent(conn, role.level(), ancestor)
}

pub fn validate_zone_creation(conn: &Connection, supervisor_id: &str) -> Result<Node, FellowshipError> {
    let supervisor = require_active_ancestor(conn, "new zone", supervisor_id, &[Level::Supervisor])?;
    check_supervisor_has_no_zone(conn, &supervisor, None)?;
    Ok(supervisor)
}

/// Returns the parent a new family group hangs off: its preacher if one is
/// named, else the zone.
pub fn validate_family_group_creation(
    conn: &Connection,
    zone_id: &str,
    preacher_id: Option<&str>,
) -> Result<Node, FellowshipError> {
    let zone = require_active_ancestor(conn, "new family group", zone_id, &[Level::Zone])?;
    let Some(preacher_id) = preacher_id else {
        return Ok(zone);
    };
    let preacher = require_active_ancestor(conn, "new family group", preacher_id, &[Level::Preacher])?;
    if preacher.chain.zone.as_deref() != Some(zone.id.as_str()) {
        return Err(ValidationRule::ZoneFollowsPreacher {
            family_group_id: "new family group".to_string(),
            preacher_id: preacher.id,
        }
        .into());
    }
    check_preacher_can_lead(conn, &preacher, None)?;
    Ok(preacher)
}

fn check_preacher_can_lead(
    conn: &Connection,
    preacher: &Node,
    group_id: Option<&str>,
) -> Result<(), FellowshipError> {
    if preacher.chain.zone.is_none() {
        return Err(ValidationRule::PreacherWithoutZone {
            preacher_id: preacher.id.clone(),
        }
        .into());
    }
    if let Some(group) = repo::active_group_of(conn, &preacher.id)? {
        if Some(group.id.as_str()) != group_id {
            return Err(ConflictKind::PreacherAlreadyLeads {
                preacher_id: preacher.id.clone(),
                family_group_id: group.id,
            }
            .into());
        }
    }
    Ok(())
}

fn check_supervisor_has_no_zone(
    conn: &Connection,
    supervisor: &Node,
    zone_id: Option<&str>,
) -> Result<(), FellowshipError> {
    if let Some(zone) = repo::active_zone_of(conn, &supervisor.id)? {
        if Some(zone.id.as_str()) != zone_id {
            return Err(ConflictKind::SupervisorHasZone {
                supervisor_id: supervisor.id.clone(),
                zone_id: zone.id,
            }
            .into());
        }
    }
    Ok(())
}
