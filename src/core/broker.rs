use crate::core::actor::Actor;
use crate::core::error;
use crate::core::pool;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// The DB Broker is the single entry point for state access.
///
/// Every operation is bracketed by a `pending` event and a terminal event in
/// `broker.events.jsonl`, which is what [`DbBroker::verify_replay`] reads back.
pub struct DbBroker {
    db_path: PathBuf,
    audit_log_path: Option<PathBuf>,
    busy_timeout_secs: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    /// Shared by the pending event and its terminal event.
    pub request_id: String,
    pub actor: String,
    pub intent_ref: Option<String>,
    pub op: String,
    pub db_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Divergence {
    pub request_id: String,
    pub op: String,
    pub intent_ref: Option<String>,
    pub reason: String,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct ReplayReport {
    pub events: usize,
    pub divergences: Vec<Divergence>,
}

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";
pub const STATUS_BUSY: &str = "busy";

impl DbBroker {
    pub fn new(store: &Store) -> Self {
        Self {
            db_path: store.db_path(),
            audit_log_path: store.config.audit_log.then(|| store.audit_log_path()),
            busy_timeout_secs: store.config.busy_timeout_secs,
        }
    }

    fn db_id(&self) -> String {
        self.db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    /// Run a read-only closure on a fresh WAL read connection.
    /// Reads are not audited.
    pub fn with_read<F, R>(&self, f: F) -> Result<R, error::FellowshipError>
    where
        F: FnOnce(&Connection) -> Result<R, error::FellowshipError>,
    {
        pool::global_pool().with_read(&self.db_path, f)
    }

    /// Run a closure with the serialized write connection, audited.
    pub fn with_conn<F, R>(
        &self,
        actor: &Actor,
        intent_ref: Option<&str>,
        op_name: &str,
        f: F,
    ) -> Result<R, error::FellowshipError>
    where
        F: FnOnce(&Connection) -> Result<R, error::FellowshipError>,
    {
        let request_id = time::new_event_id();
        self.log_event(&request_id, actor, intent_ref, op_name, STATUS_PENDING, None)?;
        let result = pool::global_pool().with_write(&self.db_path, self.busy_timeout_secs, f);
        self.log_outcome(&request_id, actor, intent_ref, op_name, &result)?;
        result
    }

    /// Run a closure inside one immediate transaction, audited.
    pub fn with_tx<F, R>(
        &self,
        actor: &Actor,
        intent_ref: Option<&str>,
        op_name: &str,
        f: F,
    ) -> Result<R, error::FellowshipError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, error::FellowshipError>,
    {
        let request_id = time::new_event_id();
        self.log_event(&request_id, actor, intent_ref, op_name, STATUS_PENDING, None)?;
        let result = pool::global_pool().with_write_tx(&self.db_path, self.busy_timeout_secs, f);
        self.log_outcome(&request_id, actor, intent_ref, op_name, &result)?;
        result
    }

    fn log_outcome<R>(
        &self,
        request_id: &str,
        actor: &Actor,
        intent_ref: Option<&str>,
        op_name: &str,
        result: &Result<R, error::FellowshipError>,
    ) -> Result<(), error::FellowshipError> {
        match result {
            Ok(_) => self.log_event(request_id, actor, intent_ref, op_name, STATUS_SUCCESS, None),
            Err(e) => {
                let status = if pool::is_busy_error(e) {
                    STATUS_BUSY
                } else {
                    STATUS_ERROR
                };
                self.log_event(
                    request_id,
                    actor,
                    intent_ref,
                    op_name,
                    status,
                    Some(e.to_string()),
                )
            }
        }
    }

    /// Append one event to the audit log. A disabled log swallows the event.
    pub fn log_event(
        &self,
        request_id: &str,
        actor: &Actor,
        intent_ref: Option<&str>,
        op: &str,
        status: &str,
        detail: Option<String>,
    ) -> Result<(), error::FellowshipError> {
        let Some(path) = &self.audit_log_path else {
            return Ok(());
        };

        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            request_id: request_id.to_string(),
            actor: actor.as_str().to_string(),
            intent_ref: intent_ref.map(|s| s.to_string()),
            op: op.to_string(),
            db_id: self.db_id(),
            status: status.to_string(),
            detail,
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(error::FellowshipError::IoError)?;
        writeln!(f, "{}", serde_json::to_string(&ev)?).map_err(error::FellowshipError::IoError)?;
        Ok(())
    }

    /// Read the audit log back.
    pub fn read_events(&self) -> Result<Vec<BrokerEvent>, error::FellowshipError> {
        let Some(path) = &self.audit_log_path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(path).map_err(error::FellowshipError::IoError)?;
        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(error::FellowshipError::IoError)?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str::<BrokerEvent>(&line)?);
        }
        Ok(events)
    }

    /// Find requests that logged `pending` but never a terminal status.
    pub fn verify_replay(&self) -> Result<ReplayReport, error::FellowshipError> {
        let events = self.read_events()?;
        let mut open: BTreeMap<String, BrokerEvent> = BTreeMap::new();
        for ev in &events {
            if ev.status == STATUS_PENDING {
                open.insert(ev.request_id.clone(), ev.clone());
            } else {
                open.remove(&ev.request_id);
            }
        }
        let divergences = open
            .into_values()
            .map(|ev| Divergence {
                request_id: ev.request_id,
                op: ev.op,
                intent_ref: ev.intent_ref,
                reason: "Pending event without terminal status (potential crash)".to_string(),
            })
            .collect();
        Ok(ReplayReport {
            events: events.len(),
            divergences,
        })
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "broker",
        "version": "0.1.0",
        "description": "State mutation broker with append-only audit log",
        "commands": [
            { "name": "journal verify", "description": "Report operations without a terminal audit event" }
        ],
        "storage": [crate::core::schemas::BROKER_EVENTS_NAME]
    })
}
