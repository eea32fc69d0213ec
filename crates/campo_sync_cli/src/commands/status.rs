//! Status command implementation.

use super::open_existing;
use campo_sync_engine::{BatchProcessor, EngineConfig};
use std::path::Path;
use std::sync::Arc;

/// Runs the status command.
pub fn run(db: &Path, device_id: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(open_existing(db)?);
    let status = BatchProcessor::new(store, EngineConfig::default()).device_status(device_id)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&status)?),
        _ => {
            println!("Device {}", status.device_id);
            println!("  Total synced:      {}", status.total_synced);
            match status.last_sync {
                Some(ts) => println!("  Last sync:         {}", ts.to_rfc3339()),
                None => println!("  Last sync:         never"),
            }
            println!("  Success rate:      {:.1}%", status.success_rate * 100.0);
            println!("  Pending conflicts: {}", status.pending_conflicts);
        }
    }
    Ok(())
}
