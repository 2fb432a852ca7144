//! Typed search over hierarchy records. Every filter resolves to candidate
//! record ids; term parsing is the caller's concern.

use crate::core::error::{FellowshipError, ValidationRule};
use crate::hierarchy::model::{Level, RecordStatus};
use crate::registry::member;
use rusqlite::Connection;
use rusqlite::types::ToSql;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum SearchFilter {
    FirstNames { term: String },
    LastNames { term: String },
    FullName { first: String, last: String },
    /// Structural records (church, zone, family group) by name.
    Name { term: String },
    Code { code: String },
    BirthDateRange { from: String, to: String },
    Status { status: RecordStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub record_id: String,
    pub level: Level,
    pub member_id: Option<String>,
    pub status: RecordStatus,
}

fn like(term: &str) -> Result<String, FellowshipError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(ValidationRule::InvalidField {
            field: "term",
            reason: "search term must not be empty".to_string(),
        }
        .into());
    }
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    Ok(format!("%{}%", escaped))
}

/// Condition and bound values for one filter, over `n` (nodes) and `m` (members).
fn condition(filter: &SearchFilter) -> Result<(String, Vec<String>), FellowshipError> {
    Ok(match filter {
        SearchFilter::FirstNames { term } => (
            "m.first_names LIKE ?1 ESCAPE '\\'".to_string(),
            vec![like(term)?],
        ),
        SearchFilter::LastNames { term } => (
            "m.last_names LIKE ?1 ESCAPE '\\'".to_string(),
            vec![like(term)?],
        ),
        SearchFilter::FullName { first, last } => (
            "m.first_names LIKE ?1 ESCAPE '\\' AND m.last_names LIKE ?2 ESCAPE '\\'".to_string(),
            vec![like(first)?, like(last)?],
        ),
        SearchFilter::Name { term } => (
            "n.name LIKE ?1 ESCAPE '\\'".to_string(),
            vec![like(term)?],
        ),
        SearchFilter::Code { code } => ("n.code = ?1".to_string(), vec![code.trim().to_string()]),
        SearchFilter::BirthDateRange { from, to } => {
            member::validate_date("from", from)?;
            member::validate_date("to", to)?;
            if from > to {
                return Err(ValidationRule::InvalidField {
                    field: "date_range",
                    reason: format!("{} is after {}", from, to),
                }
                .into());
            }
            (
                "m.birth_date BETWEEN ?1 AND ?2".to_string(),
                vec![from.clone(), to.clone()],
            )
        }
        SearchFilter::Status { status } => {
            ("n.status = ?1".to_string(), vec![status.as_str().to_string()])
        }
    })
}

pub fn find(
    conn: &Connection,
    level: Option<Level>,
    filter: &SearchFilter,
) -> Result<Vec<SearchHit>, FellowshipError> {
    let (mut clause, mut values) = condition(filter)?;
    if let Some(level) = level {
        values.push(level.as_str().to_string());
        clause = format!("{} AND n.level = ?{}", clause, values.len());
    }
    let sql = format!(
        "SELECT n.id, n.level, n.member_id, n.status
         FROM hierarchy_nodes n LEFT JOIN members m ON m.id = n.member_id
         WHERE {}
         ORDER BY n.level, n.created_at, n.id",
        clause
    );
    let args: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    let mut hits = Vec::new();
    for row in rows {
        let (record_id, level, member_id, status) = row?;
        hits.push(SearchHit {
            record_id,
            level: level.parse()?,
            member_id,
            status: status.parse()?,
        });
    }
    Ok(hits)
}

/// Just the ids of [`find`].
pub fn find_ids(
    conn: &Connection,
    level: Option<Level>,
    filter: &SearchFilter,
) -> Result<Vec<String>, FellowshipError> {
    Ok(find(conn, level, filter)?.into_iter().map(|h| h.record_id).collect())
}
