//! Member registry: personal identity, independent of any role record.

use crate::core::actor::{Actor, AuditStamp};
use crate::core::broker::DbBroker;
use crate::core::error::{FellowshipError, ValidationRule};
use crate::core::schemas::MEMBER_COLUMNS;
use crate::core::store::Store;
use crate::core::time;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{5,19}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum MaritalStatus {
    Single,
    Married,
    Widowed,
    Divorced,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl MaritalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MaritalStatus::Single => "single",
            MaritalStatus::Married => "married",
            MaritalStatus::Widowed => "widowed",
            MaritalStatus::Divorced => "divorced",
            MaritalStatus::Other => "other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = FellowshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(invalid("gender", format!("unknown gender '{}'", other))),
        }
    }
}

impl FromStr for MaritalStatus {
    type Err = FellowshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(MaritalStatus::Single),
            "married" => Ok(MaritalStatus::Married),
            "widowed" => Ok(MaritalStatus::Widowed),
            "divorced" => Ok(MaritalStatus::Divorced),
            "other" => Ok(MaritalStatus::Other),
            other => Err(invalid(
                "marital_status",
                format!("unknown marital status '{}'", other),
            )),
        }
    }
}

fn invalid(field: &'static str, reason: String) -> FellowshipError {
    ValidationRule::InvalidField { field, reason }.into()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMember {
    pub first_names: String,
    pub last_names: String,
    pub birth_date: String,
    pub gender: Gender,
    pub marital_status: MaritalStatus,
    #[serde(flatten)]
    pub contact: Contact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub first_names: String,
    pub last_names: String,
    pub birth_date: String,
    pub gender: Gender,
    pub marital_status: MaritalStatus,
    #[serde(flatten)]
    pub contact: Contact,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_names, self.last_names)
    }
}

/// `YYYY-MM-DD` with a plausible month and day.
pub fn validate_date(field: &'static str, value: &str) -> Result<(), FellowshipError> {
    let Some(caps) = DATE_PATTERN.captures(value) else {
        return Err(invalid(field, format!("'{}' is not a YYYY-MM-DD date", value)));
    };
    let month: u32 = caps[2].parse().unwrap_or(0);
    let day: u32 = caps[3].parse().unwrap_or(0);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(invalid(field, format!("'{}' is out of range", value)));
    }
    Ok(())
}

fn validate_contact(contact: &Contact) -> Result<(), FellowshipError> {
    if let Some(email) = &contact.email {
        if !EMAIL_PATTERN.is_match(email) {
            return Err(invalid("email", format!("'{}' is not an email address", email)));
        }
    }
    if let Some(phone) = &contact.phone {
        if !PHONE_PATTERN.is_match(phone) {
            return Err(invalid("phone", format!("'{}' is not a phone number", phone)));
        }
    }
    Ok(())
}

pub fn validate_new_member(new: &NewMember) -> Result<(), FellowshipError> {
    if new.first_names.trim().is_empty() {
        return Err(invalid("first_names", "must not be empty".to_string()));
    }
    if new.last_names.trim().is_empty() {
        return Err(invalid("last_names", "must not be empty".to_string()));
    }
    validate_date("birth_date", &new.birth_date)?;
    validate_contact(&new.contact)
}

fn parse_enum<T: FromStr<Err = FellowshipError>>(idx: usize, raw: String) -> rusqlite::Result<T> {
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })
}

pub(crate) fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        first_names: row.get(1)?,
        last_names: row.get(2)?,
        birth_date: row.get(3)?,
        gender: parse_enum(4, row.get(4)?)?,
        marital_status: parse_enum(5, row.get(5)?)?,
        contact: Contact {
            email: row.get(6)?,
            phone: row.get(7)?,
            country: row.get(8)?,
            city: row.get(9)?,
            address: row.get(10)?,
        },
        audit: AuditStamp {
            created_at: row.get(11)?,
            created_by: row.get(12)?,
            updated_at: row.get(13)?,
            updated_by: row.get(14)?,
        },
    })
}

pub fn member_exists(conn: &Connection, member_id: &str) -> Result<bool, FellowshipError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM members WHERE id = ?1", params![member_id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub fn get_member(conn: &Connection, member_id: &str) -> Result<Option<Member>, FellowshipError> {
    let sql = format!("SELECT {} FROM members WHERE id = ?1", MEMBER_COLUMNS);
    Ok(conn.query_row(&sql, params![member_id], member_from_row).optional()?)
}

pub fn require_member(conn: &Connection, member_id: &str) -> Result<Member, FellowshipError> {
    get_member(conn, member_id)?
        .ok_or_else(|| FellowshipError::NotFound(format!("Member '{}' not found", member_id)))
}

pub fn list_members(conn: &Connection, limit: usize) -> Result<Vec<Member>, FellowshipError> {
    let sql = format!(
        "SELECT {} FROM members ORDER BY last_names, first_names, id LIMIT ?1",
        MEMBER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let members = stmt
        .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], member_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

pub fn create_member(store: &Store, new: NewMember, actor: &Actor) -> Result<Member, FellowshipError> {
    validate_new_member(&new)?;
    let member = Member {
        id: time::new_record_id("ME"),
        first_names: new.first_names.trim().to_string(),
        last_names: new.last_names.trim().to_string(),
        birth_date: new.birth_date,
        gender: new.gender,
        marital_status: new.marital_status,
        contact: new.contact,
        audit: AuditStamp::created(actor, &time::now_epoch_z()),
    };
    DbBroker::new(store).with_conn(actor, None, "member.create", |conn| {
        conn.execute(
            &format!(
                "INSERT INTO members({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                MEMBER_COLUMNS
            ),
            params![
                member.id,
                member.first_names,
                member.last_names,
                member.birth_date,
                member.gender.as_str(),
                member.marital_status.as_str(),
                member.contact.email,
                member.contact.phone,
                member.contact.country,
                member.contact.city,
                member.contact.address,
                member.audit.created_at,
                member.audit.created_by,
                member.audit.updated_at,
                member.audit.updated_by,
            ],
        )
        .map_err(|e| FellowshipError::from_write(e, &member.id))?;
        Ok(())
    })?;
    Ok(member)
}

/// Overwrite the contact fields that are set in `update`; unset fields keep
/// their stored value.
pub fn update_contact(
    store: &Store,
    member_id: &str,
    update: Contact,
    actor: &Actor,
) -> Result<Member, FellowshipError> {
    validate_contact(&update)?;
    DbBroker::new(store).with_conn(actor, Some(member_id), "member.update", |conn| {
        let mut member = require_member(conn, member_id)?;
        let c = &mut member.contact;
        if update.email.is_some() {
            c.email = update.email;
        }
        if update.phone.is_some() {
            c.phone = update.phone;
        }
        if update.country.is_some() {
            c.country = update.country;
        }
        if update.city.is_some() {
            c.city = update.city;
        }
        if update.address.is_some() {
            c.address = update.address;
        }
        member.audit = member.audit.touched(actor, &time::now_epoch_z());
        conn.execute(
            "UPDATE members SET email = ?1, phone = ?2, country = ?3, city = ?4, address = ?5,
                updated_at = ?6, updated_by = ?7
             WHERE id = ?8",
            params![
                member.contact.email,
                member.contact.phone,
                member.contact.country,
                member.contact.city,
                member.contact.address,
                member.audit.updated_at,
                member.audit.updated_by,
                member.id,
            ],
        )
        .map_err(|e| FellowshipError::from_write(e, &member.id))?;
        Ok(member)
    })
}
