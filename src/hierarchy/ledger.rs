//! Role ledger: which single active role record a member holds.

use crate::core::broker::DbBroker;
use crate::core::error::{ConflictKind, FellowshipError};
use crate::core::store::Store;
use crate::hierarchy::model::{Node, RecordStatus, Role};
use crate::hierarchy::repo;
use crate::hierarchy::transitions::{self, RoleState, TransitionKind};
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSnapshot {
    pub member_id: String,
    pub role: Option<Role>,
    pub record_id: Option<String>,
    /// Transitions currently legal for this member.
    pub allowed: Vec<TransitionKind>,
    /// Inactive role records kept as history, oldest first.
    pub history: Vec<String>,
}

/// The member's single active role record, if any.
///
/// Fails with `Conflict` when the single-active-role invariant is broken.
pub fn active_record(conn: &Connection, member_id: &str) -> Result<Option<Node>, FellowshipError> {
    let mut active = repo::list_active_by_member(conn, member_id)?;
    match active.len() {
        0 => Ok(None),
        1 => Ok(active.pop()),
        _ => Err(ConflictKind::MultipleActiveRoles {
            member_id: member_id.to_string(),
            record_ids: active.into_iter().map(|n| n.id).collect(),
        }
        .into()),
    }
}

pub fn assert_single_active(conn: &Connection, member_id: &str) -> Result<(), FellowshipError> {
    active_record(conn, member_id).map(|_| ())
}

pub fn snapshot(conn: &Connection, member_id: &str) -> Result<RoleSnapshot, FellowshipError> {
    if !crate::registry::member::member_exists(conn, member_id)? {
        return Err(FellowshipError::NotFound(format!(
            "Member '{}' not found",
            member_id
        )));
    }
    let current = active_record(conn, member_id)?;
    let history = repo::list_by_member(conn, member_id)?
        .into_iter()
        .filter(|n| n.status == RecordStatus::Inactive)
        .map(|n| n.id)
        .collect();
    let (role, record_id, allowed) = match current.and_then(|n| n.role().map(|r| (r, n.id))) {
        Some((role, id)) => {
            let state = RoleState {
                role,
                status: RecordStatus::Active,
            };
            (Some(role), Some(id), transitions::allowed(state))
        }
        None => (None, None, Vec::new()),
    };
    Ok(RoleSnapshot {
        member_id: member_id.to_string(),
        role,
        record_id,
        allowed,
        history,
    })
}

pub fn resolve_role(store: &Store, member_id: &str) -> Result<RoleSnapshot, FellowshipError> {
    DbBroker::new(store).with_read(|conn| snapshot(conn, member_id))
}
