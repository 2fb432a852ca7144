//! Typed persistence over `hierarchy_nodes`: get-by-id, get-by-ancestor,
//! create, update, delete.
//!
//! Every mutating statement is guarded by the row's `version`; a zero row
//! count means someone else wrote the row first.

use crate::core::error::FellowshipError;
use crate::core::actor::AuditStamp;
use crate::core::schemas::NODE_COLUMNS;
use crate::hierarchy::model::{AncestorChain, Level, Node, RecordStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

fn parse_column<T: FromStr<Err = FellowshipError>>(
    idx: usize,
    raw: String,
) -> rusqlite::Result<T> {
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })
}

pub(crate) fn node_from_row(row: &Row<'_>) -> rusqlite::Result<Node> {
    let cause: Option<String> = row.get(6)?;
    Ok(Node {
        id: row.get(0)?,
        level: parse_column(1, row.get(1)?)?,
        member_id: row.get(2)?,
        name: row.get(3)?,
        code: row.get(4)?,
        status: parse_column(5, row.get(5)?)?,
        inactivation_cause: cause.map(|c| parse_column(6, c)).transpose()?,
        chain: AncestorChain {
            church: row.get(7)?,
            pastor: row.get(8)?,
            copastor: row.get(9)?,
            supervisor: row.get(10)?,
            zone: row.get(11)?,
            preacher: row.get(12)?,
            family_group: row.get(13)?,
        },
        version: row.get(14)?,
        audit: AuditStamp {
            created_at: row.get(15)?,
            created_by: row.get(16)?,
            updated_at: row.get(17)?,
            updated_by: row.get(18)?,
        },
    })
}

fn query_nodes(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<Node>, FellowshipError> {
    let mut stmt = conn.prepare(sql)?;
    let nodes = stmt
        .query_map(args, node_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(nodes)
}

pub fn get_node(conn: &Connection, id: &str) -> Result<Option<Node>, FellowshipError> {
    let sql = format!("SELECT {} FROM hierarchy_nodes WHERE id = ?1", NODE_COLUMNS);
    let node = conn
        .query_row(&sql, params![id], node_from_row)
        .optional()?;
    Ok(node)
}

pub fn require_node(conn: &Connection, id: &str) -> Result<Node, FellowshipError> {
    get_node(conn, id)?.ok_or_else(|| FellowshipError::NotFound(format!("Record '{}' not found", id)))
}

/// Every record whose chain points at `ancestor_id` at `level`, shallowest first.
pub fn list_by_ancestor(
    conn: &Connection,
    level: Level,
    ancestor_id: &str,
    active_only: bool,
) -> Result<Vec<Node>, FellowshipError> {
    let Some(column) = level.column() else {
        return Ok(Vec::new());
    };
    let status_clause = if active_only { " AND status = 'active'" } else { "" };
    let sql = format!(
        "SELECT {} FROM hierarchy_nodes WHERE {} = ?1{} ORDER BY created_at, id",
        NODE_COLUMNS, column, status_clause
    );
    let mut nodes = query_nodes(conn, &sql, &[&ancestor_id])?;
    nodes.sort_by_key(|n| n.level);
    Ok(nodes)
}

pub fn list_active_by_member(conn: &Connection, member_id: &str) -> Result<Vec<Node>, FellowshipError> {
    let sql = format!(
        "SELECT {} FROM hierarchy_nodes WHERE member_id = ?1 AND status = 'active' ORDER BY created_at, id",
        NODE_COLUMNS
    );
    query_nodes(conn, &sql, &[&member_id])
}

pub fn list_by_member(conn: &Connection, member_id: &str) -> Result<Vec<Node>, FellowshipError> {
    let sql = format!(
        "SELECT {} FROM hierarchy_nodes WHERE member_id = ?1 ORDER BY created_at, id",
        NODE_COLUMNS
    );
    query_nodes(conn, &sql, &[&member_id])
}

pub fn list_nodes(
    conn: &Connection,
    level: Option<Level>,
    status: Option<RecordStatus>,
) -> Result<Vec<Node>, FellowshipError> {
    let mut conditions: Vec<String> = vec![];
    let mut values: Vec<String> = vec![];
    if let Some(level) = level {
        values.push(level.as_str().to_string());
        conditions.push(format!("level = ?{}", values.len()));
    }
    if let Some(status) = status {
        values.push(status.as_str().to_string());
        conditions.push(format!("status = ?{}", values.len()));
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM hierarchy_nodes{} ORDER BY created_at, id",
        NODE_COLUMNS, where_clause
    );
    let args: Vec<&dyn rusqlite::types::ToSql> =
        values.iter().map(|v| v as &dyn rusqlite::types::ToSql).collect();
    query_nodes(conn, &sql, &args)
}

/// The active zone a supervisor oversees, if any.
pub fn active_zone_of(conn: &Connection, supervisor_id: &str) -> Result<Option<Node>, FellowshipError> {
    let sql = format!(
        "SELECT {} FROM hierarchy_nodes WHERE level = 'zone' AND status = 'active' AND supervisor_id = ?1",
        NODE_COLUMNS
    );
    Ok(query_nodes(conn, &sql, &[&supervisor_id])?.into_iter().next())
}

/// The active family group a preacher leads, if any.
pub fn active_group_of(conn: &Connection, preacher_id: &str) -> Result<Option<Node>, FellowshipError> {
    let sql = format!(
        "SELECT {} FROM hierarchy_nodes WHERE level = 'family_group' AND status = 'active' AND preacher_id = ?1",
        NODE_COLUMNS
    );
    Ok(query_nodes(conn, &sql, &[&preacher_id])?.into_iter().next())
}

pub fn insert_node(conn: &Connection, node: &Node) -> Result<(), FellowshipError> {
    let sql = format!(
        "INSERT INTO hierarchy_nodes({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        NODE_COLUMNS
    );
    conn.execute(
        &sql,
        params![
            node.id,
            node.level.as_str(),
            node.member_id,
            node.name,
            node.code,
            node.status.as_str(),
            node.inactivation_cause.map(|c| c.as_str()),
            node.chain.church,
            node.chain.pastor,
            node.chain.copastor,
            node.chain.supervisor,
            node.chain.zone,
            node.chain.preacher,
            node.chain.family_group,
            node.version,
            node.audit.created_at,
            node.audit.created_by,
            node.audit.updated_at,
            node.audit.updated_by,
        ],
    )
    .map_err(|e| FellowshipError::from_write(e, &node.id))?;
    Ok(())
}

/// Overwrite the mutable columns of `node` if the row is still at `expected_version`.
pub fn update_node(conn: &Connection, node: &Node, expected_version: i64) -> Result<usize, FellowshipError> {
    conn.execute(
        "UPDATE hierarchy_nodes SET
            name = ?1, code = ?2, status = ?3, inactivation_cause = ?4,
            church_id = ?5, pastor_id = ?6, copastor_id = ?7, supervisor_id = ?8,
            zone_id = ?9, preacher_id = ?10, family_group_id = ?11,
            version = ?12, updated_at = ?13, updated_by = ?14
         WHERE id = ?15 AND version = ?16",
        params![
            node.name,
            node.code,
            node.status.as_str(),
            node.inactivation_cause.map(|c| c.as_str()),
            node.chain.church,
            node.chain.pastor,
            node.chain.copastor,
            node.chain.supervisor,
            node.chain.zone,
            node.chain.preacher,
            node.chain.family_group,
            node.version,
            node.audit.updated_at,
            node.audit.updated_by,
            node.id,
            expected_version,
        ],
    )
    .map_err(|e| FellowshipError::from_write(e, &node.id))
}

pub fn delete_node(conn: &Connection, id: &str, expected_version: i64) -> Result<usize, FellowshipError> {
    conn.execute(
        "DELETE FROM hierarchy_nodes WHERE id = ?1 AND version = ?2",
        params![id, expected_version],
    )
    .map_err(|e| FellowshipError::from_write(e, id))
}

/// Bump a row's version without changing it, claiming it for this transaction.
pub fn touch_node(
    conn: &Connection,
    id: &str,
    expected_version: i64,
    actor: &str,
    ts: &str,
) -> Result<usize, FellowshipError> {
    conn.execute(
        "UPDATE hierarchy_nodes SET version = version + 1, updated_at = ?1, updated_by = ?2
         WHERE id = ?3 AND version = ?4",
        params![ts, actor, id, expected_version],
    )
    .map_err(|e| FellowshipError::from_write(e, id))
}
