//! Offering income attributed to exactly one contributor.
//!
//! The stored contributor tag is checked against the level of the record it
//! names when the offering is recorded. Offerings keep the contributor's
//! member id too, so they stay attributable after the role record they named
//! is replaced by a promotion.

use crate::core::actor::{Actor, AuditStamp};
use crate::core::broker::DbBroker;
use crate::core::error::{ConflictKind, FellowshipError, ValidationRule};
use crate::core::schemas::OFFERING_COLUMNS;
use crate::core::store::Store;
use crate::core::time;
use crate::hierarchy::model::{Level, Node, RecordStatus, Role};
use crate::hierarchy::repo;
use crate::registry::member;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

static CURRENCY_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum OfferingKind {
    Tithe,
    SundayService,
    FamilyGroupService,
    Fasting,
    Special,
    Other,
}

impl OfferingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OfferingKind::Tithe => "tithe",
            OfferingKind::SundayService => "sunday_service",
            OfferingKind::FamilyGroupService => "family_group_service",
            OfferingKind::Fasting => "fasting",
            OfferingKind::Special => "special",
            OfferingKind::Other => "other",
        }
    }
}

impl FromStr for OfferingKind {
    type Err = FellowshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tithe" => Ok(OfferingKind::Tithe),
            "sunday_service" => Ok(OfferingKind::SundayService),
            "family_group_service" => Ok(OfferingKind::FamilyGroupService),
            "fasting" => Ok(OfferingKind::Fasting),
            "special" => Ok(OfferingKind::Special),
            "other" => Ok(OfferingKind::Other),
            other => Err(ValidationRule::InvalidField {
                field: "kind",
                reason: format!("unknown offering kind '{}'", other),
            }
            .into()),
        }
    }
}

/// Who an offering is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Contributor {
    /// A member through one of their role records.
    Member { role: Role, record_id: String },
    Church { record_id: String },
    FamilyGroup { record_id: String },
    ExternalDonor { name: String },
}

impl Contributor {
    /// Stored `contributor_type` tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Contributor::Member { role, .. } => role.as_str(),
            Contributor::Church { .. } => "church",
            Contributor::FamilyGroup { .. } => "family_group",
            Contributor::ExternalDonor { .. } => "external_donor",
        }
    }

    /// The hierarchy record this contributor names and the level it must have.
    pub fn record_ref(&self) -> Option<(&str, Level)> {
        match self {
            Contributor::Member { role, record_id } => Some((record_id, role.level())),
            Contributor::Church { record_id } => Some((record_id, Level::Church)),
            Contributor::FamilyGroup { record_id } => Some((record_id, Level::FamilyGroup)),
            Contributor::ExternalDonor { .. } => None,
        }
    }

    fn from_columns(tag: &str, record_id: Option<String>, donor: Option<String>) -> Result<Self, FellowshipError> {
        let missing = || FellowshipError::from(ValidationRule::InvalidField {
            field: "contributor",
            reason: format!("{} contributor without a record id", tag),
        });
        match tag {
            "external_donor" => Ok(Contributor::ExternalDonor {
                name: donor.unwrap_or_default(),
            }),
            "church" => Ok(Contributor::Church {
                record_id: record_id.ok_or_else(missing)?,
            }),
            "family_group" => Ok(Contributor::FamilyGroup {
                record_id: record_id.ok_or_else(missing)?,
            }),
            role => Ok(Contributor::Member {
                role: role.parse()?,
                record_id: record_id.ok_or_else(missing)?,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOffering {
    pub kind: OfferingKind,
    pub amount_cents: i64,
    pub currency: String,
    pub received_on: String,
    pub contributor: Contributor,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    pub id: String,
    pub kind: OfferingKind,
    pub amount_cents: i64,
    pub currency: String,
    pub received_on: String,
    pub contributor: Contributor,
    pub contributor_member_id: Option<String>,
    pub church_id: Option<String>,
    pub comments: Option<String>,
    pub status: RecordStatus,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

fn conversion_error(idx: usize, e: FellowshipError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
    )
}

fn offering_from_row(row: &Row<'_>) -> rusqlite::Result<Offering> {
    let kind: String = row.get(1)?;
    let tag: String = row.get(5)?;
    let status: String = row.get(11)?;
    Ok(Offering {
        id: row.get(0)?,
        kind: kind.parse().map_err(|e| conversion_error(1, e))?,
        amount_cents: row.get(2)?,
        currency: row.get(3)?,
        received_on: row.get(4)?,
        contributor: Contributor::from_columns(&tag, row.get(6)?, row.get(8)?)
            .map_err(|e| conversion_error(5, e))?,
        contributor_member_id: row.get(7)?,
        church_id: row.get(9)?,
        comments: row.get(10)?,
        status: status.parse().map_err(|e| conversion_error(11, e))?,
        audit: AuditStamp {
            created_at: row.get(12)?,
            created_by: row.get(13)?,
            updated_at: row.get(14)?,
            updated_by: row.get(15)?,
        },
    })
}

fn validate_new_offering(new: &NewOffering) -> Result<(), FellowshipError> {
    if new.amount_cents <= 0 {
        return Err(ValidationRule::InvalidField {
            field: "amount",
            reason: "must be greater than zero".to_string(),
        }
        .into());
    }
    if !CURRENCY_PATTERN.is_match(&new.currency) {
        return Err(ValidationRule::InvalidField {
            field: "currency",
            reason: format!("'{}' is not an ISO 4217 code", new.currency),
        }
        .into());
    }
    member::validate_date("received_on", &new.received_on)?;
    if let Contributor::ExternalDonor { name } = &new.contributor {
        if name.trim().is_empty() {
            return Err(ValidationRule::InvalidField {
                field: "donor_name",
                reason: "an external donor needs a name".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Load the record a contributor names and require its level to match the tag.
pub fn resolve_contributor(conn: &Connection, contributor: &Contributor) -> Result<Option<Node>, FellowshipError> {
    let Some((record_id, expected)) = contributor.record_ref() else {
        return Ok(None);
    };
    let record = repo::require_node(conn, record_id)?;
    if record.level != expected {
        return Err(ValidationRule::InvalidField {
            field: "contributor",
            reason: format!(
                "tagged {} but {} is a {}",
                contributor.tag(),
                record.id,
                record.level
            ),
        }
        .into());
    }
    if !record.is_active() {
        return Err(ConflictKind::InactiveAncestor {
            ancestor_id: record.id,
            level: record.level,
        }
        .into());
    }
    Ok(Some(record))
}

pub fn record_offering(store: &Store, new: NewOffering, actor: &Actor) -> Result<Offering, FellowshipError> {
    validate_new_offering(&new)?;
    let created_at = time::now_epoch_z();
    // the contributor is checked under the same write lock as the insert, so
    // it cannot be promoted away or inactivated in between
    DbBroker::new(store).with_tx(actor, None, "offering.create", |tx| {
        let record = resolve_contributor(tx, &new.contributor)?;
        let church_id = record.as_ref().and_then(|r| match r.level {
            Level::Church => Some(r.id.clone()),
            _ => r.chain.church.clone(),
        });
        let offering = Offering {
            id: time::new_record_id("OF"),
            kind: new.kind,
            amount_cents: new.amount_cents,
            currency: new.currency,
            received_on: new.received_on,
            contributor_member_id: record.as_ref().and_then(|r| r.member_id.clone()),
            contributor: new.contributor,
            church_id,
            comments: new.comments,
            status: RecordStatus::Active,
            audit: AuditStamp::created(actor, &created_at),
        };
        insert_offering(tx, &offering)?;
        Ok(offering)
    })
}

fn insert_offering(conn: &Connection, offering: &Offering) -> Result<(), FellowshipError> {
    let (record_id, donor_name) = match &offering.contributor {
        Contributor::ExternalDonor { name } => (None, Some(name.clone())),
        other => (other.record_ref().map(|(id, _)| id.to_string()), None),
    };
    conn.execute(
        &format!(
            "INSERT INTO offerings({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            OFFERING_COLUMNS
        ),
        params![
            offering.id,
            offering.kind.as_str(),
            offering.amount_cents,
            offering.currency,
            offering.received_on,
            offering.contributor.tag(),
            record_id,
            offering.contributor_member_id,
            donor_name,
            offering.church_id,
            offering.comments,
            offering.status.as_str(),
            offering.audit.created_at,
            offering.audit.created_by,
            offering.audit.updated_at,
            offering.audit.updated_by,
        ],
    )
    .map_err(|e| FellowshipError::from_write(e, &offering.id))?;
    Ok(())
}

pub fn get_offering(conn: &Connection, id: &str) -> Result<Option<Offering>, FellowshipError> {
    let sql = format!("SELECT {} FROM offerings WHERE id = ?1", OFFERING_COLUMNS);
    Ok(conn.query_row(&sql, params![id], offering_from_row).optional()?)
}

/// All offerings, or those attributed to one hierarchy record.
pub fn list_offerings(conn: &Connection, record_id: Option<&str>) -> Result<Vec<Offering>, FellowshipError> {
    let mut out = Vec::new();
    match record_id {
        Some(record_id) => {
            let sql = format!(
                "SELECT {} FROM offerings WHERE contributor_record_id = ?1 ORDER BY received_on, id",
                OFFERING_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            for o in stmt.query_map(params![record_id], offering_from_row)? {
                out.push(o?);
            }
        }
        None => {
            let sql = format!("SELECT {} FROM offerings ORDER BY received_on, id", OFFERING_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            for o in stmt.query_map([], offering_from_row)? {
                out.push(o?);
            }
        }
    }
    Ok(out)
}

/// Offerings of a member across every role record they have held.
pub fn list_for_member(conn: &Connection, member_id: &str) -> Result<Vec<Offering>, FellowshipError> {
    let sql = format!(
        "SELECT {} FROM offerings WHERE contributor_member_id = ?1 ORDER BY received_on, id",
        OFFERING_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let offerings = stmt
        .query_map(params![member_id], offering_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(offerings)
}

pub fn inactivate_offering(store: &Store, id: &str, actor: &Actor) -> Result<Offering, FellowshipError> {
    DbBroker::new(store).with_conn(actor, Some(id), "offering.inactivate", |conn| {
        let mut offering = get_offering(conn, id)?
            .ok_or_else(|| FellowshipError::NotFound(format!("Offering '{}' not found", id)))?;
        if offering.status == RecordStatus::Inactive {
            return Err(ValidationRule::InactiveRecord {
                record_id: id.to_string(),
            }
            .into());
        }
        offering.status = RecordStatus::Inactive;
        offering.audit = offering.audit.touched(actor, &time::now_epoch_z());
        conn.execute(
            "UPDATE offerings SET status = 'inactive', updated_at = ?1, updated_by = ?2 WHERE id = ?3",
            params![offering.audit.updated_at, offering.audit.updated_by, offering.id],
        )?;
        Ok(offering)
    })
}
