//! Configuration fragment fetching

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Upper bound on a single fragment's size.
pub const MAX_FRAGMENT_SIZE: usize = 1024 * 1024;

/// Errors surfaced by a fetch of one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("fragment is {size} bytes, larger than the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("fetch failed: {0}")]
    Io(String),
}

/// Read access to the stores an include can reference.
///
/// Implementations are supplied by the host: a repository reader, an HTTP
/// client for remote includes, the template catalog, and the artifact blob
/// store. Every method returns the fragment's full text.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// File from `project` at commit `sha`.
    async fn fetch_local(&self, project: &str, sha: &str, file: &str)
    -> Result<String, FetchError>;

    /// File from another project at a ref (defaulting to its HEAD).
    async fn fetch_project(
        &self,
        project: &str,
        ref_name: Option<&str>,
        file: &str,
    ) -> Result<String, FetchError>;

    /// Fragment fetched over http(s).
    async fn fetch_remote(&self, url: &str) -> Result<String, FetchError>;

    /// Named template from the template store.
    async fn fetch_template(&self, name: &str) -> Result<String, FetchError>;

    /// File from a parent pipeline job's archive artifacts.
    async fn fetch_artifact(
        &self,
        parent_pipeline: Uuid,
        job: &str,
        file: &str,
    ) -> Result<String, FetchError>;
}

/// Guards the fragment size bound shared by all fetcher implementations.
pub fn check_fragment_size(content: &str) -> Result<(), FetchError> {
    if content.len() > MAX_FRAGMENT_SIZE {
        return Err(FetchError::TooLarge {
            size: content.len(),
            max: MAX_FRAGMENT_SIZE,
        });
    }

    Ok(())
}

/// In-memory fetcher for tests.
///
/// Fragments are registered under the same composite keys the fetch methods
/// build; an optional per-fetch delay simulates slow I/O for deadline tests.
#[derive(Debug, Default)]
pub struct StubFetcher {
    fragments: HashMap<String, String>,
    delay: Option<Duration>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn add_local(mut self, project: &str, sha: &str, file: &str, content: &str) -> Self {
        self.fragments
            .insert(format!("local:{project}:{sha}:{file}"), content.to_string());
        self
    }

    pub fn add_project(mut self, project: &str, ref_name: &str, file: &str, content: &str) -> Self {
        self.fragments.insert(
            format!("project:{project}:{ref_name}:{file}"),
            content.to_string(),
        );
        self
    }

    pub fn add_remote(mut self, url: &str, content: &str) -> Self {
        self.fragments
            .insert(format!("remote:{url}"), content.to_string());
        self
    }

    pub fn add_template(mut self, name: &str, content: &str) -> Self {
        self.fragments
            .insert(format!("template:{name}"), content.to_string());
        self
    }

    pub fn add_artifact(mut self, job: &str, file: &str, content: &str) -> Self {
        self.fragments
            .insert(format!("artifact:{job}:{file}"), content.to_string());
        self
    }

    async fn lookup(&self, key: String) -> Result<String, FetchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.fragments
            .get(&key)
            .cloned()
            .ok_or(FetchError::NotFound(key))
    }
}

#[async_trait]
impl ConfigFetcher for StubFetcher {
    async fn fetch_local(
        &self,
        project: &str,
        sha: &str,
        file: &str,
    ) -> Result<String, FetchError> {
        self.lookup(format!("local:{project}:{sha}:{file}")).await
    }

    async fn fetch_project(
        &self,
        project: &str,
        ref_name: Option<&str>,
        file: &str,
    ) -> Result<String, FetchError> {
        let ref_name = ref_name.unwrap_or("HEAD");
        self.lookup(format!("project:{project}:{ref_name}:{file}"))
            .await
    }

    async fn fetch_remote(&self, url: &str) -> Result<String, FetchError> {
        self.lookup(format!("remote:{url}")).await
    }

    async fn fetch_template(&self, name: &str) -> Result<String, FetchError> {
        self.lookup(format!("template:{name}")).await
    }

    async fn fetch_artifact(
        &self,
        _parent_pipeline: Uuid,
        job: &str,
        file: &str,
    ) -> Result<String, FetchError> {
        self.lookup(format!("artifact:{job}:{file}")).await
    }
}
