//! Promotion / inactivation / reassignment state machine.
//!
//! A member's role state is `(role, status)`. Legal moves are exactly:
//! - `Promote` one rank up, from an active state;
//! - `Inactivate`, from any active state, keeping the role;
//! - `Reassign`, from any active state, keeping role and status.
//!
//! There is no demotion. A member who needs a lower role is enrolled again
//! once no active record remains.

use crate::core::error::ValidationRule;
use crate::hierarchy::model::{InactivationCause, Level, RecordStatus, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleState {
    pub role: Role,
    pub status: RecordStatus,
}

/// A requested change to the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Promote {
        member_id: String,
        target: Role,
        ancestor_id: String,
    },
    Reassign {
        record_id: String,
        new_ancestor_id: String,
    },
    Inactivate {
        record_id: String,
        cause: InactivationCause,
    },
    Create {
        level: Level,
        ancestor_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Promote,
    Reassign,
    Inactivate,
    Create,
}

impl TransitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionKind::Promote => "promote",
            TransitionKind::Reassign => "reassign",
            TransitionKind::Inactivate => "inactivate",
            TransitionKind::Create => "create",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Transition {
    pub fn kind(&self) -> TransitionKind {
        match self {
            Transition::Promote { .. } => TransitionKind::Promote,
            Transition::Reassign { .. } => TransitionKind::Reassign,
            Transition::Inactivate { .. } => TransitionKind::Inactivate,
            Transition::Create { .. } => TransitionKind::Create,
        }
    }
}

/// Outcome of a legal promotion check: the new role and the level its
/// immediate ancestor must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotionStep {
    pub from: Role,
    pub to: Role,
    pub ancestor_level: Level,
}

pub fn check_promotion(
    record_id: &str,
    current: RoleState,
    target: Role,
) -> Result<PromotionStep, ValidationRule> {
    if current.status != RecordStatus::Active {
        return Err(ValidationRule::InactiveRecord {
            record_id: record_id.to_string(),
        });
    }
    if target <= current.role {
        return Err(ValidationRule::NotAPromotion {
            from: current.role,
            to: target,
        });
    }
    // target outranks current, so a next role exists
    match current.role.next() {
        Some(next) if next == target => Ok(PromotionStep {
            from: current.role,
            to: target,
            ancestor_level: target.ancestor_level(),
        }),
        _ => Err(ValidationRule::SkipLevel {
            from: current.role,
            to: target,
        }),
    }
}

pub fn check_inactivation(record_id: &str, status: RecordStatus) -> Result<(), ValidationRule> {
    match status {
        RecordStatus::Active => Ok(()),
        RecordStatus::Inactive => Err(ValidationRule::InactiveRecord {
            record_id: record_id.to_string(),
        }),
    }
}

pub fn check_reassignment(
    record_id: &str,
    level: Level,
    status: RecordStatus,
) -> Result<&'static [Level], ValidationRule> {
    if status != RecordStatus::Active {
        return Err(ValidationRule::InactiveRecord {
            record_id: record_id.to_string(),
        });
    }
    let parents = level.parent_levels();
    if parents.is_empty() {
        return Err(ValidationRule::NotReassignable { level });
    }
    Ok(parents)
}

/// Every transition kind legal from `state`.
pub fn allowed(state: RoleState) -> Vec<TransitionKind> {
    match state.status {
        RecordStatus::Inactive => Vec::new(),
        RecordStatus::Active => {
            let mut kinds = Vec::new();
            if state.role.next().is_some() {
                kinds.push(TransitionKind::Promote);
            }
            kinds.push(TransitionKind::Reassign);
            kinds.push(TransitionKind::Inactivate);
            kinds
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(role: Role) -> RoleState {
        RoleState {
            role,
            status: RecordStatus::Active,
        }
    }

    #[test]
    fn one_step_promotions_are_legal() {
        let step = check_promotion("DI_1", active(Role::Disciple), Role::Preacher).unwrap();
        assert_eq!(step.ancestor_level, Level::Supervisor);
        let step = check_promotion("CP_1", active(Role::Copastor), Role::Pastor).unwrap();
        assert_eq!(step.ancestor_level, Level::Church);
    }

    #[test]
    fn skipping_a_level_is_rejected() {
        let err = check_promotion("DI_1", active(Role::Disciple), Role::Copastor).unwrap_err();
        assert_eq!(
            err,
            ValidationRule::SkipLevel {
                from: Role::Disciple,
                to: Role::Copastor
            }
        );
        assert_eq!(
            err.to_string(),
            "skip-level: cannot promote disciple directly to copastor"
        );
    }

    #[test]
    fn there_is_no_demotion() {
        let err = check_promotion("SU_1", active(Role::Supervisor), Role::Preacher).unwrap_err();
        assert!(matches!(err, ValidationRule::NotAPromotion { .. }));
        let err = check_promotion("SU_1", active(Role::Supervisor), Role::Supervisor).unwrap_err();
        assert!(matches!(err, ValidationRule::NotAPromotion { .. }));
    }

    #[test]
    fn inactive_records_cannot_move() {
        let state = RoleState {
            role: Role::Preacher,
            status: RecordStatus::Inactive,
        };
        assert!(check_promotion("PR_1", state, Role::Supervisor).is_err());
        assert!(check_inactivation("PR_1", RecordStatus::Inactive).is_err());
        assert!(check_reassignment("PR_1", Level::Preacher, RecordStatus::Inactive).is_err());
        assert!(allowed(state).is_empty());
    }

    #[test]
    fn pastor_can_not_be_promoted() {
        assert!(!allowed(active(Role::Pastor)).contains(&TransitionKind::Promote));
        let err = check_promotion("PA_1", active(Role::Pastor), Role::Pastor).unwrap_err();
        assert!(matches!(err, ValidationRule::NotAPromotion { .. }));
    }

    #[test]
    fn churches_have_nothing_to_reassign() {
        let err = check_reassignment("CH_1", Level::Church, RecordStatus::Active).unwrap_err();
        assert_eq!(err, ValidationRule::NotReassignable { level: Level::Church });
    }
}
