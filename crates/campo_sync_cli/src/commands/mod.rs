//! CLI command implementations.

pub mod log;
pub mod process;
pub mod status;

use campo_sync_store::SqliteStore;
use std::path::Path;

/// Opens an existing store; the operator tools never create one by accident.
pub fn open_existing(db: &Path) -> Result<SqliteStore, Box<dyn std::error::Error>> {
    if !db.exists() {
        return Err(format!("No sync store found at {:?}", db).into());
    }
    Ok(SqliteStore::open(db)?)
}
