//! Artifact domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention lock state of an artifact.
///
/// `Unknown` rows predate lock tracking; the sweeper reclassifies them by
/// consulting the owning pipeline and writes the answer back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactLockState {
    Unknown,
    ArtifactsLocked,
    Unlocked,
}

/// A stored output blob attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub file_path: String,
    pub size_bytes: i64,
    /// `None` means the artifact is kept forever.
    pub expire_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Derived from the pipeline lock state at creation, not re-derived
    /// later.
    pub locked: ArtifactLockState,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Artifact {
    /// Whether the artifact's lifecycle ended before `now`.
    pub fn expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        matches!(self.expire_at, Some(at) if at < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn artifact(expire_at: Option<chrono::DateTime<chrono::Utc>>) -> Artifact {
        Artifact {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            file_path: "artifacts.zip".to_string(),
            size_bytes: 1024,
            expire_at,
            locked: ArtifactLockState::Unlocked,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expired() {
        let now = Utc::now();
        assert!(artifact(Some(now - Duration::hours(1))).expired(now));
        assert!(!artifact(Some(now + Duration::hours(1))).expired(now));
    }

    #[test]
    fn test_permanent_artifact_never_expires() {
        assert!(!artifact(None).expired(Utc::now()));
    }
}
