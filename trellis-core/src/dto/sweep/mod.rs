//! Sweep DTOs for the host-facing surface

use serde::{Deserialize, Serialize};

/// Result of one artifact-expiry sweep run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepOutcome {
    /// Artifacts destroyed across all batches that succeeded.
    pub removed_count: u64,
    /// Unknown-lock-state artifacts whose classification was written back.
    pub reclassified_count: u64,
    /// Batches processed before the run ended.
    pub batches: u32,
    /// The lease was held by another sweep; no work was done.
    pub skipped: bool,
}
