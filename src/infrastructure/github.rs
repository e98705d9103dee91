//! GitHub access for the upstream module repository.
//!
//! Uses the contents API to list build directories and the raw host to
//! download module binaries.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::{AppError, RepositoryConfig, Result};

/// User agent sent with every request; GitHub rejects anonymous agents.
const USER_AGENT: &str = concat!("ugreen-leds-installer/", env!("CARGO_PKG_VERSION"));

/// One entry of a contents API directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Client for the upstream repository.
pub struct GithubClient {
    http: reqwest::Client,
    repo: RepositoryConfig,
}

impl GithubClient {
    /// Create a client for the configured repository.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(repo: RepositoryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(repo.timeout_secs))
            .build()
            .map_err(|e| AppError::network("Failed to create HTTP client", e))?;

        Ok(Self { http, repo })
    }

    #[must_use]
    pub const fn repository(&self) -> &RepositoryConfig {
        &self.repo
    }

    /// Contents API URL for a repository path on the configured branch.
    #[must_use]
    pub fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.repo.api_base.trim_end_matches('/'),
            self.repo.owner,
            self.repo.name,
            path.trim_matches('/'),
            self.repo.branch
        )
    }

    /// Raw download URL for a repository path on the configured branch.
    #[must_use]
    pub fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.repo.raw_base.trim_end_matches('/'),
            self.repo.owner,
            self.repo.name,
            self.repo.branch,
            path.trim_matches('/')
        )
    }

    /// Names of the subdirectories of `path`.
    ///
    /// # Errors
    /// Returns a network error if the API cannot be reached or answers with
    /// an error status, and a JSON error if the listing is malformed.
    pub async fn list_directories(&self, path: &str) -> Result<Vec<String>> {
        let url = self.contents_url(path);
        tracing::debug!(%url, "Listing repository directory");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| AppError::network(format!("Failed to query {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Network {
                message: format!("GitHub API returned {status} for {url}"),
                source: None,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::network("Failed to read GitHub API response", e))?;

        parse_directory_listing(&body)
    }

    /// Download a repository file.
    ///
    /// # Errors
    /// Returns a network error on connection failure or non-success status.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.raw_url(path);
        tracing::info!(%url, "Downloading");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::network(format!("Failed to download {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Network {
                message: format!("Download of {url} returned {status}"),
                source: None,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::network(format!("Failed to read {url}"), e))?;

        if bytes.is_empty() {
            return Err(AppError::InvalidData {
                message: format!("Downloaded file {url} is empty"),
            });
        }

        Ok(bytes.to_vec())
    }
}

/// Extract directory names from a contents API response body.
///
/// # Errors
/// Returns error if the body is not a JSON array of entries.
pub fn parse_directory_listing(body: &str) -> Result<Vec<String>> {
    let entries: Vec<ContentEntry> = serde_json::from_str(body).map_err(AppError::json_parse)?;

    Ok(entries
        .into_iter()
        .filter(|e| e.kind == "dir")
        .map(|e| e.name)
        .collect())
}
