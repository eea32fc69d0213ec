//! Conflict resolution strategies.

use crate::merge::merge;
use campo_sync_protocol::{ConflictRecord, ConflictResolutionStrategy, Payload};

/// What to do with a conflicting operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Apply the operation with this data.
    Apply(Payload),
    /// Leave the entity untouched; the server state wins.
    Skip,
    /// No automatic decision; surface the conflict.
    Unresolved,
}

impl Resolution {
    /// Returns true unless the conflict needs a human.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved)
    }
}

/// Resolves `conflict` under `strategy`.
///
/// Pure: nothing is read or written here.
pub fn resolve(conflict: &ConflictRecord, strategy: ConflictResolutionStrategy) -> Resolution {
    match strategy {
        ConflictResolutionStrategy::ClientWins => Resolution::Apply(conflict.client_data.clone()),
        ConflictResolutionStrategy::ServerWins => Resolution::Skip,
        ConflictResolutionStrategy::LastWriteWins => {
            if conflict.server_is_newer() {
                Resolution::Skip
            } else {
                Resolution::Apply(conflict.client_data.clone())
            }
        }
        ConflictResolutionStrategy::Merge => {
            let server = conflict.server_data.clone().unwrap_or_default();
            Resolution::Apply(merge(&server, &conflict.client_data))
        }
        ConflictResolutionStrategy::Manual => Resolution::Unresolved,
    }
}
