//! Log command implementation.

use super::open_existing;
use campo_sync_store::SyncStore;
use std::path::Path;

/// Runs the log command.
pub fn run(
    db: &Path,
    device_id: &str,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(db)?;
    let entries = store.device_log(device_id)?;
    let skip = limit.map_or(0, |limit| entries.len().saturating_sub(limit));

    for entry in entries.iter().skip(skip) {
        let id = entry
            .entity_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let mut line = format!(
            "{} {:<8} {} {} {} {}",
            entry.server_timestamp.to_rfc3339(),
            entry.status.as_str(),
            entry.idempotency_key,
            entry.operation,
            entry.entity_type,
            id
        );
        if let Some(message) = &entry.error_message {
            line.push_str(&format!(" ({})", message));
        }
        println!("{}", line);
    }
    Ok(())
}
