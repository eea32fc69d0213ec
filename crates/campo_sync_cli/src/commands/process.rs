//! Process command implementation.

use campo_sync_engine::{BatchProcessor, EngineConfig};
use campo_sync_protocol::{OutcomeStatus, SyncBatch, SyncOperationResponse};
use campo_sync_store::SqliteStore;
use std::path::Path;
use std::sync::Arc;

/// Processes the batch at `batch_path` against the store at `db`,
/// creating the store if needed.
pub fn execute(
    db: &Path,
    batch_path: &Path,
    actor: &str,
    config: EngineConfig,
) -> Result<SyncOperationResponse, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(batch_path)
        .map_err(|e| format!("Cannot read batch {:?}: {}", batch_path, e))?;
    let batch = SyncBatch::decode(&bytes)?;
    tracing::info!(
        device_id = %batch.device_id,
        operations = batch.len(),
        store = %db.display(),
        "replaying batch"
    );

    let store = Arc::new(SqliteStore::open(db)?);
    let processor = BatchProcessor::new(store, config);
    Ok(processor.process(&batch, actor)?)
}

/// Runs the process command.
pub fn run(
    db: &Path,
    batch_path: &Path,
    actor: &str,
    config: EngineConfig,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = execute(db, batch_path, actor, config)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&response)?),
        _ => print_text_output(&response),
    }
    Ok(())
}

fn print_text_output(response: &SyncOperationResponse) {
    println!("Batch processed at {}", response.server_timestamp.to_rfc3339());
    println!("  Operations:        {}", response.processed);
    println!("  Applied:           {}", response.count(OutcomeStatus::Success));
    println!(
        "  Already processed: {}",
        response.count(OutcomeStatus::AlreadyProcessed)
    );
    println!("  Server wins:       {}", response.count(OutcomeStatus::ServerWins));
    println!("  Conflicts:         {}", response.conflicts.len());
    println!("  Errors:            {}", response.errors.len());

    if !response.conflicts.is_empty() {
        println!();
        println!("Conflicts:");
        for conflict in &response.conflicts {
            let id = conflict
                .entity_id
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            println!(
                "  {} {} {} [{}]",
                conflict.idempotency_key, conflict.entity_type, id, conflict.conflict_type
            );
            println!("    {}", conflict.suggested_resolution);
        }
    }

    if !response.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &response.errors {
            println!("  {} {}: {}", error.idempotency_key, error.operation, error.error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campo_sync_protocol::{EntityType, Payload, SyncOperation};
    use chrono::{TimeZone, Utc};

    fn write_batch(dir: &Path) -> std::path::PathBuf {
        let mut data = Payload::new();
        data.insert("kind".into(), serde_json::json!("VISITA"));
        let op = SyncOperation::create(
            "550e8400-e29b-41d4-a716-446655440000",
            EntityType::Activity,
            data,
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap(),
        );
        let path = dir.join("batch.json");
        let batch = SyncBatch::new("android-1", vec![op]);
        std::fs::write(&path, batch.encode().unwrap()).unwrap();
        path
    }

    #[test]
    fn replay_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("store").join("sync.db");
        let batch = write_batch(dir.path());

        let first = execute(&db, &batch, "operador", EngineConfig::default()).unwrap();
        assert_eq!(first.count(OutcomeStatus::Success), 1);

        let second = execute(&db, &batch, "operador", EngineConfig::default()).unwrap();
        assert_eq!(second.count(OutcomeStatus::AlreadyProcessed), 1);
    }

    #[test]
    fn unreadable_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("sync.db");

        let err = execute(&db, &dir.path().join("missing.json"), "operador", EngineConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("Cannot read batch"));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, b"{\"device_id\": 1}").unwrap();
        assert!(execute(&db, &garbage, "operador", EngineConfig::default()).is_err());
    }
}
