use crate::core::error;
use crate::core::schemas;
use crate::core::store::Store;
use rusqlite::{Connection, OptionalExtension, params};

pub fn db_connect_pooled(
    db_path: &str,
    busy_timeout_secs: u32,
) -> Result<Connection, error::FellowshipError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(u64::from(busy_timeout_secs)))
        .map_err(error::FellowshipError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::FellowshipError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::FellowshipError::RusqliteError)?;
    Ok(conn)
}

/// Create the hierarchy schema and stamp its version.
pub fn initialize_hierarchy_db(store: &Store) -> Result<(), error::FellowshipError> {
    let db_path = store.db_path();
    let conn = db_connect_pooled(&db_path.to_string_lossy(), store.config.busy_timeout_secs)?;
    conn.execute_batch(schemas::HIERARCHY_DB_SCHEMA_META)?;
    conn.execute_batch(schemas::HIERARCHY_DB_SCHEMA_MEMBERS)?;
    conn.execute_batch(schemas::HIERARCHY_DB_SCHEMA_NODES)?;
    conn.execute_batch(schemas::HIERARCHY_DB_SCHEMA_JOURNAL)?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match current {
        None => {
            conn.execute(
                "INSERT INTO meta(key, value) VALUES('schema_version', ?1)",
                params![schemas::HIERARCHY_SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(v) if v == schemas::HIERARCHY_SCHEMA_VERSION.to_string() => {}
        Some(v) => {
            return Err(error::FellowshipError::DatabaseInitializationError(format!(
                "hierarchy.db schema version {} is not supported (expected {})",
                v,
                schemas::HIERARCHY_SCHEMA_VERSION
            )));
        }
    }
    Ok(())
}

pub fn initialize_offering_db(store: &Store) -> Result<(), error::FellowshipError> {
    let db_path = store.db_path();
    let conn = db_connect_pooled(&db_path.to_string_lossy(), store.config.busy_timeout_secs)?;
    conn.execute_batch(schemas::HIERARCHY_DB_SCHEMA_OFFERINGS)?;
    Ok(())
}
