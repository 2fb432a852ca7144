//! Subsystem registration: one entry per database initializer.
//!
//! Adding a new subsystem: append one entry to `SUBSYSTEMS`.

use crate::core::{db, error};
use crate::core::store::Store;

pub(crate) struct SubsystemInit {
    /// Subsystem identifier, used in initialization errors.
    pub name: &'static str,
    pub initialize_db: fn(&Store) -> Result<(), error::FellowshipError>,
}

/// All subsystems that require database initialization. The hierarchy
/// schema comes first: offerings reference its `members` table.
pub(crate) const SUBSYSTEMS: &[SubsystemInit] = &[
    SubsystemInit {
        name: "hierarchy",
        initialize_db: db::initialize_hierarchy_db,
    },
    SubsystemInit {
        name: "offering",
        initialize_db: db::initialize_offering_db,
    },
];

/// Initialize all subsystem databases sequentially.
pub(crate) fn initialize_all_dbs(store: &Store) -> Result<(), error::FellowshipError> {
    for sub in SUBSYSTEMS {
        (sub.initialize_db)(store).map_err(|e| match e {
            error::FellowshipError::DatabaseInitializationError(msg) => {
                error::FellowshipError::DatabaseInitializationError(format!("{}: {}", sub.name, msg))
            }
            other => other,
        })?;
    }
    Ok(())
}
