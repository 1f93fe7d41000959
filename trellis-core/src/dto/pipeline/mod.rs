//! Pipeline DTOs for the host-facing surface

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::{FailureReason, PipelineSource};
use crate::variables::Variable;

/// Request to create a new pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    /// The ref the pipeline runs for, qualified or short.
    pub origin_ref: String,
    #[serde(default)]
    pub checkout_sha: Option<String>,
    #[serde(default)]
    pub after_sha: Option<String>,
    #[serde(default)]
    pub before_sha: Option<String>,
    #[serde(default)]
    pub source_sha: Option<String>,
    #[serde(default)]
    pub target_sha: Option<String>,
    pub source: PipelineSource,
    /// Set when this request creates a child pipeline.
    #[serde(default)]
    pub parent_pipeline: Option<Uuid>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    /// Inline configuration content; when absent the repository's default
    /// configuration path is read instead.
    #[serde(default)]
    pub content: Option<String>,
    /// Run the whole chain but stop before any write.
    #[serde(default)]
    pub dry_run: bool,
}

/// One job of a created pipeline, as reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub name: String,
    pub stage: String,
}

/// Outcome of a pipeline-creation attempt.
///
/// The chain always terminates in exactly one of these; rejections carry a
/// reason from the fixed taxonomy plus one human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Created {
        id: Uuid,
        size: u32,
        jobs: Vec<JobSummary>,
    },
    Rejected {
        reason: FailureReason,
        message: String,
    },
}

impl PipelineOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}
