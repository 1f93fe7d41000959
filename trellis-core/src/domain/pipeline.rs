//! Pipeline domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::ArtifactLockState;

/// What triggered a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineSource {
    Push,
    Web,
    Schedule,
    Api,
    Trigger,
    ParentPipeline,
}

impl PipelineSource {
    /// Wire name, also exposed to rules as `CI_PIPELINE_SOURCE`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Web => "web",
            Self::Schedule => "schedule",
            Self::Api => "api",
            Self::Trigger => "trigger",
            Self::ParentPipeline => "parent_pipeline",
        }
    }
}

/// Pipeline lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Created,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl PipelineStatus {
    /// Whether jobs of this pipeline still count against activity limits.
    pub fn alive(self) -> bool {
        matches!(self, Self::Created | Self::Pending | Self::Running)
    }
}

/// Terminal reason a pipeline-creation attempt was rejected.
///
/// Recorded on the command by whichever chain step halted; always rendered
/// to the caller as a structured rejection, never as a raised fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ConfigError,
    SizeLimitExceeded,
    JobActivityLimitExceeded,
    UserNotVerified,
    ExternalValidationFailure,
    ProjectDeleted,
    FilteredByRules,
    FilteredByWorkflowRules,
    UnknownFailure,
}

impl FailureReason {
    /// Wire name used in API payloads and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigError => "config_error",
            Self::SizeLimitExceeded => "size_limit_exceeded",
            Self::JobActivityLimitExceeded => "job_activity_limit_exceeded",
            Self::UserNotVerified => "user_not_verified",
            Self::ExternalValidationFailure => "external_validation_failure",
            Self::ProjectDeleted => "project_deleted",
            Self::FilteredByRules => "filtered_by_rules",
            Self::FilteredByWorkflowRules => "filtered_by_workflow_rules",
            Self::UnknownFailure => "unknown_failure",
        }
    }

    /// Default human-readable message when a step records no custom one.
    pub fn message(self) -> &'static str {
        match self {
            Self::ConfigError => "The pipeline configuration is invalid",
            Self::SizeLimitExceeded => "The pipeline exceeds the maximum number of jobs",
            Self::JobActivityLimitExceeded => "Too many active jobs in this project",
            Self::UserNotVerified => "The account is not verified",
            Self::ExternalValidationFailure => "The pipeline was rejected by an external validator",
            Self::ProjectDeleted => "The project is being deleted",
            Self::FilteredByRules => "No jobs matched the configured rules",
            Self::FilteredByWorkflowRules => "The workflow rules prevented this pipeline",
            Self::UnknownFailure => "The pipeline could not be created",
        }
    }
}

/// A materialized pipeline record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub project_id: Uuid,
    pub ref_name: String,
    pub sha: String,
    /// Whether this pipeline runs for a tag rather than a branch.
    pub tag: bool,
    pub source: PipelineSource,
    pub status: PipelineStatus,
    /// Artifact retention lock inherited by every artifact created under
    /// this pipeline. Set at creation and not re-derived afterwards.
    pub locked: ArtifactLockState,
    pub size: u32,
    pub failure_reason: Option<FailureReason>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}
