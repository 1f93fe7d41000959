//! Host application gateway
//!
//! The engine does not own git storage, templates, or artifact blobs; the
//! host application exposes them over internal HTTP endpoints. This client
//! implements the repository-index and config-fetcher collaborators on top
//! of those endpoints. Remote includes go straight to their URL.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use trellis_core::domain::refs::GitRef;

use trellis_config::fetcher::{check_fragment_size, ConfigFetcher, FetchError};

use crate::repo::{IndexError, RepoIndex};

/// Default in-repository configuration path.
pub const DEFAULT_CONFIG_FILE: &str = ".trellis.yml";

/// HTTP gateway to the host application's internal API.
#[derive(Debug, Clone)]
pub struct HostGateway {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: Option<String>,
}

impl HostGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    async fn get_exists(&self, url: String) -> Result<bool, IndexError> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let body: ExistsResponse = response
            .error_for_status()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        Ok(body.exists)
    }

    async fn get_text(&self, url: String) -> Result<String, FetchError> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url));
        }

        let content = response
            .error_for_status()
            .map_err(|e| FetchError::Io(e.to_string()))?
            .text()
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;

        check_fragment_size(&content)?;
        Ok(content)
    }
}

#[async_trait]
impl RepoIndex for HostGateway {
    async fn branch_exists(&self, project: &str, name: &str) -> Result<bool, IndexError> {
        self.get_exists(format!(
            "{}/internal/projects/{project}/branches/{name}",
            self.base_url
        ))
        .await
    }

    async fn tag_exists(&self, project: &str, name: &str) -> Result<bool, IndexError> {
        self.get_exists(format!(
            "{}/internal/projects/{project}/tags/{name}",
            self.base_url
        ))
        .await
    }

    async fn ambiguous_ref(&self, project: &str, name: &str) -> Result<bool, IndexError> {
        Ok(self.branch_exists(project, name).await? && self.tag_exists(project, name).await?)
    }

    async fn resolve_ref(&self, project: &str, r: &GitRef) -> Result<Option<String>, IndexError> {
        let url = format!(
            "{}/internal/projects/{project}/refs/{}/sha",
            self.base_url,
            r.short_name()
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: ShaResponse = response
            .error_for_status()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        Ok(body.sha)
    }

    async fn default_config(
        &self,
        project: &str,
        sha: &str,
    ) -> Result<Option<String>, IndexError> {
        match self.fetch_local(project, sha, DEFAULT_CONFIG_FILE).await {
            Ok(content) => Ok(Some(content)),
            Err(FetchError::NotFound(_)) => Ok(None),
            Err(e) => Err(IndexError::Unavailable(e.to_string())),
        }
    }
}

#[async_trait]
impl ConfigFetcher for HostGateway {
    async fn fetch_local(
        &self,
        project: &str,
        sha: &str,
        file: &str,
    ) -> Result<String, FetchError> {
        self.get_text(format!(
            "{}/internal/projects/{project}/files/{sha}/{file}",
            self.base_url
        ))
        .await
    }

    async fn fetch_project(
        &self,
        project: &str,
        ref_name: Option<&str>,
        file: &str,
    ) -> Result<String, FetchError> {
        let ref_name = ref_name.unwrap_or("HEAD");
        self.get_text(format!(
            "{}/internal/projects/{project}/files-at-ref/{ref_name}/{file}",
            self.base_url
        ))
        .await
    }

    async fn fetch_remote(&self, url: &str) -> Result<String, FetchError> {
        self.get_text(url.to_string()).await
    }

    async fn fetch_template(&self, name: &str) -> Result<String, FetchError> {
        self.get_text(format!("{}/internal/templates/{name}", self.base_url))
            .await
    }

    async fn fetch_artifact(
        &self,
        parent_pipeline: Uuid,
        job: &str,
        file: &str,
    ) -> Result<String, FetchError> {
        self.get_text(format!(
            "{}/internal/pipelines/{parent_pipeline}/jobs/{job}/artifacts/{file}",
            self.base_url
        ))
        .await
    }
}
