use crate::hierarchy::model::{Level, Role};
use rusqlite;
use std::env;
use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FellowshipError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] env::VarError),
    #[error("Failed to initialize database: {0}")]
    DatabaseInitializationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(ValidationRule),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(ConflictKind),
    /// Some writes of a cascade are visible and others are not. Never retry;
    /// the store needs manual reconciliation.
    #[error("Partial cascade failure in plan {plan_id}: {detail}")]
    PartialCascadeFailure { plan_id: String, detail: String },
}

impl FellowshipError {
    /// Errors detected before any write, safe to hand back to the caller.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FellowshipError::ValidationError(_)
                | FellowshipError::NotFound(_)
                | FellowshipError::Conflict(_)
        )
    }

    /// Only write collisions are worth retrying, and only after re-reading state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FellowshipError::Conflict(ConflictKind::ConcurrentWrite { .. })
        )
    }

    pub fn is_integrity_incident(&self) -> bool {
        matches!(self, FellowshipError::PartialCascadeFailure { .. })
    }

    /// Map SQLite constraint and busy failures onto the domain taxonomy.
    pub fn from_write(err: rusqlite::Error, record_id: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(code, msg) = &err {
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return FellowshipError::Conflict(ConflictKind::UniqueViolation {
                    record_id: record_id.to_string(),
                    detail: msg.clone().unwrap_or_else(|| "unique constraint".to_string()),
                });
            }
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return FellowshipError::Conflict(ConflictKind::ConcurrentWrite {
                    record_id: record_id.to_string(),
                });
            }
        }
        FellowshipError::RusqliteError(err)
    }
}

impl From<ValidationRule> for FellowshipError {
    fn from(rule: ValidationRule) -> Self {
        FellowshipError::ValidationError(rule)
    }
}

impl From<ConflictKind> for FellowshipError {
    fn from(kind: ConflictKind) -> Self {
        FellowshipError::Conflict(kind)
    }
}

/// Structural rule a rejected transition violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationRule {
    SkipLevel { from: Role, to: Role },
    NotAPromotion { from: Role, to: Role },
    DuplicateRole { member_id: String, role: Role },
    NoActiveRole { member_id: String },
    MissingAncestor { role: Role, level: Level },
    WrongAncestorLevel { record_id: String, expected: Vec<Level>, found: Level },
    SelfReference { record_id: String },
    Cycle { record_id: String, ancestor_id: String },
    NoOpReassignment { record_id: String, ancestor_id: String },
    InactiveRecord { record_id: String },
    NotReassignable { level: Level },
    ZoneFollowsPreacher { family_group_id: String, preacher_id: String },
    PreacherWithoutZone { preacher_id: String },
    CascadeTooLarge { writes: usize, limit: usize },
    InvalidField { field: &'static str, reason: String },
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationRule::SkipLevel { from, to } => {
                write!(f, "skip-level: cannot promote {} directly to {}", from, to)
            }
            ValidationRule::NotAPromotion { from, to } => write!(
                f,
                "cannot move {} to {}: there is no demotion transition",
                from, to
            ),
            ValidationRule::DuplicateRole { member_id, role } => write!(
                f,
                "duplicate role: member {} already holds an active {} record",
                member_id, role
            ),
            ValidationRule::NoActiveRole { member_id } => {
                write!(f, "member {} holds no active role record", member_id)
            }
            ValidationRule::MissingAncestor { role, level } => write!(
                f,
                "missing ancestor: a {} record requires a {} ancestor",
                role, level
            ),
            ValidationRule::WrongAncestorLevel {
                record_id,
                expected,
                found,
            } => {
                let expected = expected
                    .iter()
                    .map(|l| l.as_str())
                    .collect::<Vec<_>>()
                    .join(" or ");
                write!(
                    f,
                    "wrong ancestor level for {}: expected {}, found {}",
                    record_id, expected, found
                )
            }
            ValidationRule::SelfReference { record_id } => {
                write!(f, "self-reference: {} cannot be its own ancestor", record_id)
            }
            ValidationRule::Cycle {
                record_id,
                ancestor_id,
            } => write!(
                f,
                "cycle: {} already sits above {} in the hierarchy",
                record_id, ancestor_id
            ),
            ValidationRule::NoOpReassignment {
                record_id,
                ancestor_id,
            } => write!(
                f,
                "no-op reassignment: {} already reports to {}",
                record_id, ancestor_id
            ),
            ValidationRule::InactiveRecord { record_id } => write!(
                f,
                "record {} is inactive; only active records can transition",
                record_id
            ),
            ValidationRule::NotReassignable { level } => {
                write!(f, "a {} has no ancestor to reassign", level)
            }
            ValidationRule::ZoneFollowsPreacher {
                family_group_id,
                preacher_id,
            } => write!(
                f,
                "family group {} follows the zone of preacher {}; reassign the preacher instead",
                family_group_id, preacher_id
            ),
            ValidationRule::PreacherWithoutZone { preacher_id } => write!(
                f,
                "preacher {} has no zone; a family group must belong to a zone",
                preacher_id
            ),
            ValidationRule::CascadeTooLarge { writes, limit } => write!(
                f,
                "cascade of {} writes exceeds the configured limit of {}",
                writes, limit
            ),
            ValidationRule::InvalidField { field, reason } => {
                write!(f, "invalid {}: {}", field, reason)
            }
        }
    }
}

/// Reason a write was refused because of the state it would collide with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    InactiveAncestor { ancestor_id: String, level: Level },
    MultipleActiveRoles { member_id: String, record_ids: Vec<String> },
    PreacherAlreadyLeads { preacher_id: String, family_group_id: String },
    SupervisorHasZone { supervisor_id: String, zone_id: String },
    UniqueViolation { record_id: String, detail: String },
    ConcurrentWrite { record_id: String },
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::InactiveAncestor { ancestor_id, level } => write!(
                f,
                "inactive ancestor: {} {} is inactive and cannot be assigned",
                level, ancestor_id
            ),
            ConflictKind::MultipleActiveRoles {
                member_id,
                record_ids,
            } => write!(
                f,
                "single active role violated: member {} has {} active records ({})",
                member_id,
                record_ids.len(),
                record_ids.join(", ")
            ),
            ConflictKind::PreacherAlreadyLeads {
                preacher_id,
                family_group_id,
            } => write!(
                f,
                "preacher {} already leads active family group {}",
                preacher_id, family_group_id
            ),
            ConflictKind::SupervisorHasZone {
                supervisor_id,
                zone_id,
            } => write!(
                f,
                "supervisor {} already oversees active zone {}",
                supervisor_id, zone_id
            ),
            ConflictKind::UniqueViolation { record_id, detail } => {
                write!(f, "unique constraint violated by {}: {}", record_id, detail)
            }
            ConflictKind::ConcurrentWrite { record_id } => write!(
                f,
                "concurrent write: {} changed since the transition was planned",
                record_id
            ),
        }
    }
}
