//! Hierarchy data model.
//!
//! Every record of every level is a [`Node`] keyed by an opaque prefixed id.
//! Ancestors are stored as explicit id fields ([`AncestorChain`]) so that a
//! cascade is an id-keyed batch of row updates, never a graph mutation.

use crate::core::actor::AuditStamp;
use crate::core::error::{FellowshipError, ValidationRule};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Level of a record in the tree, root first. Declaration order is depth order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Level {
    Church,
    Pastor,
    Copastor,
    Supervisor,
    Zone,
    Preacher,
    FamilyGroup,
    Disciple,
}

static LEVELS: [Level; 8] = [
    Level::Church,
    Level::Pastor,
    Level::Copastor,
    Level::Supervisor,
    Level::Zone,
    Level::Preacher,
    Level::FamilyGroup,
    Level::Disciple,
];

impl Level {
    pub fn all() -> &'static [Level] {
        &LEVELS
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Church => "church",
            Level::Pastor => "pastor",
            Level::Copastor => "copastor",
            Level::Supervisor => "supervisor",
            Level::Zone => "zone",
            Level::Preacher => "preacher",
            Level::FamilyGroup => "family_group",
            Level::Disciple => "disciple",
        }
    }

    pub fn depth(self) -> usize {
        self as usize
    }

    pub fn id_prefix(self) -> &'static str {
        match self {
            Level::Church => "CH",
            Level::Pastor => "PA",
            Level::Copastor => "CP",
            Level::Supervisor => "SU",
            Level::Zone => "ZN",
            Level::Preacher => "PR",
            Level::FamilyGroup => "FG",
            Level::Disciple => "DI",
        }
    }

    /// Column in `hierarchy_nodes` that descendants use to point at this level.
    /// Nothing points at a disciple.
    pub fn column(self) -> Option<&'static str> {
        match self {
            Level::Church => Some("church_id"),
            Level::Pastor => Some("pastor_id"),
            Level::Copastor => Some("copastor_id"),
            Level::Supervisor => Some("supervisor_id"),
            Level::Zone => Some("zone_id"),
            Level::Preacher => Some("preacher_id"),
            Level::FamilyGroup => Some("family_group_id"),
            Level::Disciple => None,
        }
    }

    /// Every level a record of this level keeps a pointer to.
    pub fn ancestor_levels(self) -> &'static [Level] {
        &LEVELS[..self.depth()]
    }

    /// Levels whose record is this record's structural parent, by priority.
    ///
    /// A preacher hangs off its zone when it has one and off its supervisor
    /// otherwise; a family group hangs off its preacher, or off its zone while
    /// it has no preacher.
    pub fn parent_levels(self) -> &'static [Level] {
        match self {
            Level::Church => &[],
            Level::Pastor => &[Level::Church],
            Level::Copastor => &[Level::Pastor],
            Level::Supervisor => &[Level::Copastor],
            Level::Zone => &[Level::Supervisor],
            Level::Preacher => &[Level::Zone, Level::Supervisor],
            Level::FamilyGroup => &[Level::Preacher, Level::Zone],
            Level::Disciple => &[Level::FamilyGroup],
        }
    }

    pub fn role(self) -> Option<Role> {
        match self {
            Level::Pastor => Some(Role::Pastor),
            Level::Copastor => Some(Role::Copastor),
            Level::Supervisor => Some(Role::Supervisor),
            Level::Preacher => Some(Role::Preacher),
            Level::Disciple => Some(Role::Disciple),
            Level::Church | Level::Zone | Level::FamilyGroup => None,
        }
    }

    pub fn holds_member(self) -> bool {
        self.role().is_some()
    }

    /// Level implied by a record id prefix.
    pub fn from_id(id: &str) -> Option<Level> {
        let prefix = id.split('_').next()?;
        LEVELS.iter().copied().find(|l| l.id_prefix() == prefix)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = FellowshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LEVELS
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| {
                ValidationRule::InvalidField {
                    field: "level",
                    reason: format!("unknown level '{}'", s),
                }
                .into()
            })
    }
}

/// Member role, lowest first. Declaration order is rank order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Role {
    Disciple,
    Preacher,
    Supervisor,
    Copastor,
    Pastor,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        self.level().as_str()
    }

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<Role> {
        match self {
            Role::Disciple => Some(Role::Preacher),
            Role::Preacher => Some(Role::Supervisor),
            Role::Supervisor => Some(Role::Copastor),
            Role::Copastor => Some(Role::Pastor),
            Role::Pastor => None,
        }
    }

    pub fn level(self) -> Level {
        match self {
            Role::Disciple => Level::Disciple,
            Role::Preacher => Level::Preacher,
            Role::Supervisor => Level::Supervisor,
            Role::Copastor => Level::Copastor,
            Role::Pastor => Level::Pastor,
        }
    }

    /// Level of the immediate ancestor a record of this role must be placed under.
    pub fn ancestor_level(self) -> Level {
        match self {
            Role::Disciple => Level::FamilyGroup,
            Role::Preacher => Level::Supervisor,
            Role::Supervisor => Level::Copastor,
            Role::Copastor => Level::Pastor,
            Role::Pastor => Level::Church,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = FellowshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Level>()?.role().ok_or_else(|| {
            ValidationRule::InvalidField {
                field: "role",
                reason: format!("'{}' is not a member role", s),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = FellowshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecordStatus::Active),
            "inactive" => Ok(RecordStatus::Inactive),
            other => Err(ValidationRule::InvalidField {
                field: "status",
                reason: format!("unknown status '{}'", other),
            }
            .into()),
        }
    }
}

/// Why a record left the live hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum InactivationCause {
    Withdrawal,
    Relocation,
    Restructuring,
    Deceased,
    Other,
}

impl InactivationCause {
    pub fn as_str(self) -> &'static str {
        match self {
            InactivationCause::Withdrawal => "withdrawal",
            InactivationCause::Relocation => "relocation",
            InactivationCause::Restructuring => "restructuring",
            InactivationCause::Deceased => "deceased",
            InactivationCause::Other => "other",
        }
    }
}

impl FromStr for InactivationCause {
    type Err = FellowshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "withdrawal" => Ok(InactivationCause::Withdrawal),
            "relocation" => Ok(InactivationCause::Relocation),
            "restructuring" => Ok(InactivationCause::Restructuring),
            "deceased" => Ok(InactivationCause::Deceased),
            "other" => Ok(InactivationCause::Other),
            other => Err(ValidationRule::InvalidField {
                field: "cause",
                reason: format!("unknown inactivation cause '{}'", other),
            }
            .into()),
        }
    }
}

/// Denormalized pointers from a record up to its church.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorChain {
    pub church: Option<String>,
    pub pastor: Option<String>,
    pub copastor: Option<String>,
    pub supervisor: Option<String>,
    pub zone: Option<String>,
    pub preacher: Option<String>,
    pub family_group: Option<String>,
}

impl AncestorChain {
    pub fn get(&self, level: Level) -> Option<&str> {
        match level {
            Level::Church => self.church.as_deref(),
            Level::Pastor => self.pastor.as_deref(),
            Level::Copastor => self.copastor.as_deref(),
            Level::Supervisor => self.supervisor.as_deref(),
            Level::Zone => self.zone.as_deref(),
            Level::Preacher => self.preacher.as_deref(),
            Level::FamilyGroup => self.family_group.as_deref(),
            Level::Disciple => None,
        }
    }

    pub fn set(&mut self, level: Level, value: Option<String>) {
        match level {
            Level::Church => self.church = value,
            Level::Pastor => self.pastor = value,
            Level::Copastor => self.copastor = value,
            Level::Supervisor => self.supervisor = value,
            Level::Zone => self.zone = value,
            Level::Preacher => self.preacher = value,
            Level::FamilyGroup => self.family_group = value,
            Level::Disciple => {}
        }
    }

    /// The chain a child of `parent` must carry: the parent's own chain plus
    /// the parent itself.
    pub fn under(parent: &Node) -> AncestorChain {
        let mut chain = parent.chain.restricted(parent.level);
        chain.set(parent.level, Some(parent.id.clone()));
        chain
    }

    /// Copy holding only the pointers a record of `level` may carry.
    pub fn restricted(&self, level: Level) -> AncestorChain {
        let mut chain = AncestorChain::default();
        for &l in level.ancestor_levels() {
            chain.set(l, self.get(l).map(str::to_string));
        }
        chain
    }

    /// Level at which `id` appears in this chain, if it does.
    pub fn position_of(&self, id: &str) -> Option<Level> {
        self.entries().find(|(_, v)| *v == id).map(|(l, _)| l)
    }

    /// Non-null pointers, root first.
    pub fn entries(&self) -> impl Iterator<Item = (Level, &str)> {
        LEVELS.iter().filter_map(move |&l| self.get(l).map(|v| (l, v)))
    }
}

/// One record of any level in the hierarchy arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub level: Level,
    pub member_id: Option<String>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub status: RecordStatus,
    pub inactivation_cause: Option<InactivationCause>,
    pub chain: AncestorChain,
    /// Optimistic concurrency version, bumped on every write.
    pub version: i64,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

impl Node {
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// First structural parent pointer that is set, by priority.
    pub fn primary_parent(&self) -> Option<(Level, &str)> {
        self.level
            .parent_levels()
            .iter()
            .find_map(|&l| self.chain.get(l).map(|id| (l, id)))
    }

    /// The record this one's chain derives from: the primary parent, or
    /// while orphaned, the deepest ancestor still pointed at.
    pub fn chain_anchor(&self) -> Option<(Level, &str)> {
        self.primary_parent().or_else(|| self.chain.entries().last())
    }

    pub fn role(&self) -> Option<Role> {
        self.level.role()
    }
}

/// A member's role record: one of the leadership variants or the base
/// disciple record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: String,
    pub role: Role,
    pub member_id: String,
    pub status: RecordStatus,
    pub chain: AncestorChain,
    pub version: i64,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

impl TryFrom<Node> for RoleRecord {
    type Error = FellowshipError;

    fn try_from(node: Node) -> Result<Self, Self::Error> {
        let (Some(role), Some(member_id)) = (node.level.role(), node.member_id.clone()) else {
            return Err(ValidationRule::InvalidField {
                field: "record",
                reason: format!("{} {} is not a member role record", node.level, node.id),
            }
            .into());
        };
        Ok(Self {
            id: node.id,
            role,
            member_id,
            status: node.status,
            chain: node.chain,
            version: node.version,
            audit: node.audit,
        })
    }
}
