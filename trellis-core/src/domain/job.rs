//! Job domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn alive(self) -> bool {
        matches!(self, Self::Created | Self::Pending | Self::Running)
    }

    pub fn complete(self) -> bool {
        !self.alive()
    }
}

/// One schedulable unit of CI work belonging to a pipeline.
///
/// Created during DAG expansion; mutated by runners and the authorization
/// layer; its artifacts are eventually archived or expired by the sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub stage: String,
    pub status: JobStatus,
    pub ref_name: String,
    /// Whether the job belongs to a tag pipeline.
    pub tag: bool,
    /// Runner tags the job requires.
    pub tags: Vec<String>,
    /// Names of jobs this one depends on.
    pub needs: Vec<String>,
    pub allow_failure: bool,
    /// The actor that triggered the job, if any.
    pub owner_id: Option<Uuid>,
    /// The job's deployment was superseded by a newer one.
    pub outdated_deployment: bool,
    /// Trace may contain secrets in clear text.
    pub debug_mode: bool,
    pub has_artifacts: bool,
    pub artifacts_public: bool,
    pub erased_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Job {
    /// Whether the given actor triggered this job.
    pub fn triggered_by(&self, actor_id: Uuid) -> bool {
        self.owner_id == Some(actor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_alive() {
        assert!(JobStatus::Created.alive());
        assert!(JobStatus::Running.alive());
        assert!(!JobStatus::Success.alive());
        assert!(JobStatus::Failed.complete());
    }
}
