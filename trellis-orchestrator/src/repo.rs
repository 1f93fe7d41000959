//! Repository index collaborator
//!
//! Read access to the content-addressed repository backing a project. The
//! chain only needs existence/ambiguity answers and ref resolution; file
//! content goes through the config fetcher.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use trellis_core::domain::refs::GitRef;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of a project's refs.
#[async_trait]
pub trait RepoIndex: Send + Sync {
    async fn branch_exists(&self, project: &str, name: &str) -> Result<bool, IndexError>;

    async fn tag_exists(&self, project: &str, name: &str) -> Result<bool, IndexError>;

    /// Whether a short name exists as more than one kind of ref.
    async fn ambiguous_ref(&self, project: &str, name: &str) -> Result<bool, IndexError>;

    /// Resolves a ref to its commit sha.
    async fn resolve_ref(&self, project: &str, r: &GitRef) -> Result<Option<String>, IndexError>;

    /// Content of the project's default pipeline configuration file at
    /// `sha`, if one exists.
    async fn default_config(&self, project: &str, sha: &str)
    -> Result<Option<String>, IndexError>;
}

/// In-memory repository index for tests.
#[derive(Debug, Default)]
pub struct MemoryRepoIndex {
    branches: HashMap<(String, String), String>,
    tags: HashMap<(String, String), String>,
    configs: HashMap<(String, String), String>,
}

impl MemoryRepoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_branch(mut self, project: &str, name: &str, sha: &str) -> Self {
        self.branches
            .insert((project.to_string(), name.to_string()), sha.to_string());
        self
    }

    pub fn add_tag(mut self, project: &str, name: &str, sha: &str) -> Self {
        self.tags
            .insert((project.to_string(), name.to_string()), sha.to_string());
        self
    }

    pub fn add_default_config(mut self, project: &str, sha: &str, content: &str) -> Self {
        self.configs
            .insert((project.to_string(), sha.to_string()), content.to_string());
        self
    }
}

#[async_trait]
impl RepoIndex for MemoryRepoIndex {
    async fn branch_exists(&self, project: &str, name: &str) -> Result<bool, IndexError> {
        Ok(self
            .branches
            .contains_key(&(project.to_string(), name.to_string())))
    }

    async fn tag_exists(&self, project: &str, name: &str) -> Result<bool, IndexError> {
        Ok(self
            .tags
            .contains_key(&(project.to_string(), name.to_string())))
    }

    async fn ambiguous_ref(&self, project: &str, name: &str) -> Result<bool, IndexError> {
        let key = (project.to_string(), name.to_string());
        Ok(self.branches.contains_key(&key) && self.tags.contains_key(&key))
    }

    async fn resolve_ref(&self, project: &str, r: &GitRef) -> Result<Option<String>, IndexError> {
        let key = (project.to_string(), r.short_name().to_string());

        if r.could_be_branch() {
            if let Some(sha) = self.branches.get(&key) {
                return Ok(Some(sha.clone()));
            }
        }
        if r.could_be_tag() {
            if let Some(sha) = self.tags.get(&key) {
                return Ok(Some(sha.clone()));
            }
        }

        Ok(None)
    }

    async fn default_config(
        &self,
        project: &str,
        sha: &str,
    ) -> Result<Option<String>, IndexError> {
        Ok(self
            .configs
            .get(&(project.to_string(), sha.to_string()))
            .cloned())
    }
}
