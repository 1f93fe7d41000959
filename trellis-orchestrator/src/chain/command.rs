//! Pipeline creation command
//!
//! The mutable aggregate threaded through the chain. Built once per
//! creation attempt via [`CommandBuilder`], written into by the steps, and
//! discarded when the attempt terminates.

use thiserror::Error;
use uuid::Uuid;

use trellis_core::domain::actor::Actor;
use trellis_core::domain::pipeline::{FailureReason, Pipeline, PipelineSource};
use trellis_core::domain::project::Project;
use trellis_core::domain::refs::{GitRef, BLANK_SHA};
use trellis_core::variables::Variables;

use trellis_config::processor::PipelineSeed;
use trellis_config::resolver::ResolvedConfig;
use trellis_config::workflow::WorkflowDecision;

use crate::repo::{IndexError, RepoIndex};

/// Errors from command construction; these are host programming errors,
/// not pipeline rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandBuildError {
    #[error("command is missing the project snapshot")]
    MissingProject,

    #[error("command is missing the actor")]
    MissingActor,

    #[error("command is missing the origin ref")]
    MissingOriginRef,

    #[error("command is missing the pipeline source")]
    MissingSource,
}

/// State for one pipeline-creation attempt.
#[derive(Debug)]
pub struct Command {
    pub project: Project,
    pub actor: Actor,
    pub origin_ref: GitRef,
    pub source: PipelineSource,
    pub checkout_sha: Option<String>,
    pub after_sha: Option<String>,
    before_sha: Option<String>,
    pub source_sha: Option<String>,
    pub target_sha: Option<String>,
    pub parent_pipeline: Option<Uuid>,
    pub variables: Variables,
    /// Inline configuration; when absent the repository default is read.
    pub content: Option<String>,
    pub dry_run: bool,

    // Written by chain steps during processing.
    pub resolved_config: Option<ResolvedConfig>,
    pub workflow_decision: Option<WorkflowDecision>,
    pub seed: Option<PipelineSeed>,
    pub pipeline: Option<Pipeline>,
    failure: Option<(FailureReason, String)>,

    // Repository answers, computed at most once per command.
    branch_exists: Option<bool>,
    tag_exists: Option<bool>,
    ambiguous_ref: Option<bool>,
    protected_ref: Option<bool>,
    resolved_sha: Option<Option<String>>,
}

impl Command {
    pub fn builder() -> CommandBuilder {
        CommandBuilder::default()
    }

    /// Records the terminal failure. The first failure wins; later calls
    /// are ignored so the original reason survives.
    pub fn fail(&mut self, reason: FailureReason, message: impl Into<String>) {
        if self.failure.is_none() {
            self.failure = Some((reason, message.into()));
        }
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure(&self) -> Option<(FailureReason, &str)> {
        self.failure.as_ref().map(|(r, m)| (*r, m.as_str()))
    }

    /// The commit the pipeline runs against, preferring an explicit
    /// checkout sha over the push's after sha.
    pub fn origin_sha(&self) -> Option<&str> {
        self.checkout_sha.as_deref().or(self.after_sha.as_deref())
    }

    /// Falls back to the checkout sha, then the blank sha, mirroring the
    /// semantics of a first push.
    pub fn before_sha(&self) -> &str {
        self.before_sha
            .as_deref()
            .or(self.checkout_sha.as_deref())
            .unwrap_or(BLANK_SHA)
    }

    pub async fn branch_exists(&mut self, repo: &dyn RepoIndex) -> Result<bool, IndexError> {
        if let Some(memo) = self.branch_exists {
            return Ok(memo);
        }

        let exists = self.origin_ref.could_be_branch()
            && repo
                .branch_exists(&self.project.path, self.origin_ref.short_name())
                .await?;
        self.branch_exists = Some(exists);
        Ok(exists)
    }

    pub async fn tag_exists(&mut self, repo: &dyn RepoIndex) -> Result<bool, IndexError> {
        if let Some(memo) = self.tag_exists {
            return Ok(memo);
        }

        let exists = self.origin_ref.could_be_tag()
            && repo
                .tag_exists(&self.project.path, self.origin_ref.short_name())
                .await?;
        self.tag_exists = Some(exists);
        Ok(exists)
    }

    pub async fn ambiguous_ref(&mut self, repo: &dyn RepoIndex) -> Result<bool, IndexError> {
        if let Some(memo) = self.ambiguous_ref {
            return Ok(memo);
        }

        let ambiguous = repo
            .ambiguous_ref(&self.project.path, self.origin_ref.short_name())
            .await?;
        self.ambiguous_ref = Some(ambiguous);
        Ok(ambiguous)
    }

    pub fn protected_ref(&mut self) -> bool {
        if let Some(memo) = self.protected_ref {
            return memo;
        }

        let protected = self.project.protected_for(&self.origin_ref);
        self.protected_ref = Some(protected);
        protected
    }

    /// The sha the pipeline will record: an explicit sha if supplied,
    /// otherwise the ref resolved through the repository.
    pub async fn sha(&mut self, repo: &dyn RepoIndex) -> Result<Option<String>, IndexError> {
        if let Some(memo) = &self.resolved_sha {
            return Ok(memo.clone());
        }

        let sha = match self.origin_sha() {
            Some(sha) => Some(sha.to_string()),
            None => repo.resolve_ref(&self.project.path, &self.origin_ref).await?,
        };
        self.resolved_sha = Some(sha.clone());
        Ok(sha)
    }
}

/// Builder enforcing required fields at the chain's entry.
#[derive(Debug, Default)]
pub struct CommandBuilder {
    project: Option<Project>,
    actor: Option<Actor>,
    origin_ref: Option<GitRef>,
    source: Option<PipelineSource>,
    checkout_sha: Option<String>,
    after_sha: Option<String>,
    before_sha: Option<String>,
    source_sha: Option<String>,
    target_sha: Option<String>,
    parent_pipeline: Option<Uuid>,
    variables: Variables,
    content: Option<String>,
    dry_run: bool,
}

impl CommandBuilder {
    pub fn project(mut self, project: Project) -> Self {
        self.project = Some(project);
        self
    }

    pub fn actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn origin_ref(mut self, origin_ref: impl Into<GitRef>) -> Self {
        self.origin_ref = Some(origin_ref.into());
        self
    }

    pub fn source(mut self, source: PipelineSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn checkout_sha(mut self, sha: Option<String>) -> Self {
        self.checkout_sha = sha;
        self
    }

    pub fn after_sha(mut self, sha: Option<String>) -> Self {
        self.after_sha = sha;
        self
    }

    pub fn before_sha(mut self, sha: Option<String>) -> Self {
        self.before_sha = sha;
        self
    }

    pub fn source_sha(mut self, sha: Option<String>) -> Self {
        self.source_sha = sha;
        self
    }

    pub fn target_sha(mut self, sha: Option<String>) -> Self {
        self.target_sha = sha;
        self
    }

    pub fn parent_pipeline(mut self, pipeline: Option<Uuid>) -> Self {
        self.parent_pipeline = pipeline;
        self
    }

    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn content(mut self, content: Option<String>) -> Self {
        self.content = content;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<Command, CommandBuildError> {
        Ok(Command {
            project: self.project.ok_or(CommandBuildError::MissingProject)?,
            actor: self.actor.ok_or(CommandBuildError::MissingActor)?,
            origin_ref: self.origin_ref.ok_or(CommandBuildError::MissingOriginRef)?,
            source: self.source.ok_or(CommandBuildError::MissingSource)?,
            checkout_sha: self.checkout_sha,
            after_sha: self.after_sha,
            before_sha: self.before_sha,
            source_sha: self.source_sha,
            target_sha: self.target_sha,
            parent_pipeline: self.parent_pipeline,
            variables: self.variables,
            content: self.content,
            dry_run: self.dry_run,
            resolved_config: None,
            workflow_decision: None,
            seed: None,
            pipeline: None,
            failure: None,
            branch_exists: None,
            tag_exists: None,
            ambiguous_ref: None,
            protected_ref: None,
            resolved_sha: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryRepoIndex;
    use std::collections::HashSet;

    pub(crate) fn test_project() -> Project {
        Project {
            id: Uuid::new_v4(),
            path: "group/app".to_string(),
            default_branch: "main".to_string(),
            archived: false,
            pending_delete: false,
            public_builds: true,
            protected_branches: vec!["main".to_string()],
            protected_tags: vec![],
            collaboration_branches: vec![],
        }
    }

    pub(crate) fn test_actor() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            username: "dev".to_string(),
            verified: true,
            capabilities: HashSet::new(),
        }
    }

    fn command() -> Command {
        Command::builder()
            .project(test_project())
            .actor(test_actor())
            .origin_ref("refs/heads/main")
            .source(PipelineSource::Push)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_project() {
        let err = Command::builder()
            .actor(test_actor())
            .origin_ref("main")
            .source(PipelineSource::Push)
            .build()
            .unwrap_err();
        assert_eq!(err, CommandBuildError::MissingProject);
    }

    #[test]
    fn test_before_sha_fallback_chain() {
        let mut cmd = command();
        assert_eq!(cmd.before_sha(), BLANK_SHA);

        cmd.checkout_sha = Some("c0ffee".to_string());
        assert_eq!(cmd.before_sha(), "c0ffee");

        cmd.before_sha = Some("aaaa".to_string());
        assert_eq!(cmd.before_sha(), "aaaa");
    }

    #[test]
    fn test_first_failure_wins() {
        let mut cmd = command();
        cmd.fail(FailureReason::ConfigError, "bad config");
        cmd.fail(FailureReason::UnknownFailure, "later");

        let (reason, message) = cmd.failure().unwrap();
        assert_eq!(reason, FailureReason::ConfigError);
        assert_eq!(message, "bad config");
    }

    #[tokio::test]
    async fn test_branch_exists_memoized() {
        let repo = MemoryRepoIndex::new().add_branch("group/app", "main", "deadbeef");
        let mut cmd = command();

        assert!(cmd.branch_exists(&repo).await.unwrap());

        // Memoized: an empty index now returns the original answer.
        let empty = MemoryRepoIndex::new();
        assert!(cmd.branch_exists(&empty).await.unwrap());
    }

    #[tokio::test]
    async fn test_sha_prefers_explicit_checkout() {
        let repo = MemoryRepoIndex::new().add_branch("group/app", "main", "deadbeef");
        let mut cmd = command();
        cmd.checkout_sha = Some("c0ffee".to_string());

        assert_eq!(cmd.sha(&repo).await.unwrap().as_deref(), Some("c0ffee"));
    }

    #[tokio::test]
    async fn test_sha_resolves_ref_when_not_supplied() {
        let repo = MemoryRepoIndex::new().add_branch("group/app", "main", "deadbeef");
        let mut cmd = command();

        assert_eq!(cmd.sha(&repo).await.unwrap().as_deref(), Some("deadbeef"));
    }
}
