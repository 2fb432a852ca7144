//! Cascade journal: one row per committed plan, written in the plan's own
//! transaction.
//!
//! A plan id found here has fully committed. Cross-checking the journal
//! against the broker log tells a crash before commit apart from a crash
//! after it.

use crate::core::broker::DbBroker;
use crate::core::error::FellowshipError;
use crate::core::store::Store;
use crate::hierarchy::planner::CascadePlan;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub plan_id: String,
    pub kind: String,
    pub root_id: String,
    pub fingerprint: String,
    pub actor: String,
    pub write_count: i64,
    pub updated_ids: Vec<String>,
    pub orphaned_ids: Vec<String>,
    pub committed_at: String,
}

fn decode_ids(idx: usize, raw: String) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<JournalEntry> {
    Ok(JournalEntry {
        plan_id: row.get(0)?,
        kind: row.get(1)?,
        root_id: row.get(2)?,
        fingerprint: row.get(3)?,
        actor: row.get(4)?,
        write_count: row.get(5)?,
        updated_ids: decode_ids(6, row.get(6)?)?,
        orphaned_ids: decode_ids(7, row.get(7)?)?,
        committed_at: row.get(8)?,
    })
}

const JOURNAL_COLUMNS: &str =
    "plan_id, kind, root_id, fingerprint, actor, write_count, updated_ids, orphaned_ids, committed_at";

pub fn record(conn: &Connection, plan: &CascadePlan) -> Result<JournalEntry, FellowshipError> {
    let entry = JournalEntry {
        plan_id: plan.plan_id.clone(),
        kind: plan.kind().as_str().to_string(),
        root_id: plan.root_id.clone(),
        fingerprint: plan.fingerprint()?,
        actor: plan.actor.as_str().to_string(),
        write_count: i64::try_from(plan.writes.len()).unwrap_or(i64::MAX),
        updated_ids: plan.updated_ids(),
        orphaned_ids: plan.orphaned.clone(),
        committed_at: plan.ts.clone(),
    };
    conn.execute(
        &format!(
            "INSERT INTO cascade_journal({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            JOURNAL_COLUMNS
        ),
        params![
            entry.plan_id,
            entry.kind,
            entry.root_id,
            entry.fingerprint,
            entry.actor,
            entry.write_count,
            serde_json::to_string(&entry.updated_ids)?,
            serde_json::to_string(&entry.orphaned_ids)?,
            entry.committed_at,
        ],
    )
    .map_err(|e| FellowshipError::from_write(e, &entry.plan_id))?;
    Ok(entry)
}

pub fn find(conn: &Connection, plan_id: &str) -> Result<Option<JournalEntry>, FellowshipError> {
    let sql = format!("SELECT {} FROM cascade_journal WHERE plan_id = ?1", JOURNAL_COLUMNS);
    Ok(conn.query_row(&sql, params![plan_id], entry_from_row).optional()?)
}

/// Most recent entries first.
pub fn list(conn: &Connection, root_id: Option<&str>, limit: usize) -> Result<Vec<JournalEntry>, FellowshipError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut entries = Vec::new();
    match root_id {
        Some(root_id) => {
            let sql = format!(
                "SELECT {} FROM cascade_journal WHERE root_id = ?1 ORDER BY committed_at DESC, plan_id DESC LIMIT ?2",
                JOURNAL_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            for entry in stmt.query_map(params![root_id, limit], entry_from_row)? {
                entries.push(entry?);
            }
        }
        None => {
            let sql = format!(
                "SELECT {} FROM cascade_journal ORDER BY committed_at DESC, plan_id DESC LIMIT ?1",
                JOURNAL_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            for entry in stmt.query_map(params![limit], entry_from_row)? {
                entries.push(entry?);
            }
        }
    }
    Ok(entries)
}

/// State of one cascade whose broker log has no terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The journal row exists, so every write committed; only the log is short.
    Committed,
    /// No journal row: the transaction never committed and rolled back whole.
    RolledBack,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterruptedCascade {
    pub request_id: String,
    pub op: String,
    pub plan_id: Option<String>,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalReport {
    pub events: usize,
    pub committed_plans: usize,
    pub interrupted: Vec<InterruptedCascade>,
}

/// Replay the broker log and resolve every pending-without-terminal event
/// against the journal.
pub fn verify(store: &Store) -> Result<JournalReport, FellowshipError> {
    let broker = DbBroker::new(store);
    let replay = broker.verify_replay()?;
    broker.with_read(|conn| {
        let committed_plans: i64 =
            conn.query_row("SELECT COUNT(*) FROM cascade_journal", [], |row| row.get(0))?;
        let mut interrupted = Vec::new();
        for divergence in replay.divergences {
            let committed = match &divergence.intent_ref {
                Some(plan_id) => find(conn, plan_id)?.is_some(),
                None => false,
            };
            interrupted.push(InterruptedCascade {
                request_id: divergence.request_id,
                op: divergence.op,
                plan_id: divergence.intent_ref,
                resolution: if committed {
                    Resolution::Committed
                } else {
                    Resolution::RolledBack
                },
            });
        }
        Ok(JournalReport {
            events: replay.events,
            committed_plans: committed_plans as usize,
            interrupted,
        })
    })
}
