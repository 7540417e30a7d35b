use std::fmt;

use anyhow::Context;
use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::http::HttpOps;
use super::http::HttpRequest;
use super::http::Method;
use crate::error::ApiError;

pub mod contents;
pub mod pulls;
pub mod refs;

pub use contents::ContentKind;
pub use contents::FileSnapshot;
pub use contents::RepoFiles;
pub use contents::SetFileContents;
pub use pulls::NewPullRequest;
pub use pulls::PullRequest;

/// Every request goes here, whatever scheme or host the caller passed.
pub const API_BASE: &str = "https://api.github.com";
pub const ACCEPT: &str = "application/vnd.github+json";
pub const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "operator-release";

// -----------------------------------------------------------------------------
// Types

/// An `owner/name` pair identifying a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Head locator for a branch of this repo as seen from another repo in
    /// the same fork network.
    pub fn head_locator(&self, branch: &str) -> String {
        format!("{}:{}", self.owner, branch)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(transparent)]
pub struct CommitSha(pub String);

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client to interact with the GitHub REST API.
pub struct GithubClient<H: HttpOps> {
    http: H,
    token: String,
}

impl<H: HttpOps> fmt::Debug for GithubClient<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubClient")
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// GithubClient impl

impl<H: HttpOps> GithubClient<H> {
    pub fn new(http: H, token: String) -> Self {
        Self { http, token }
    }

    /// GET `path` and decode the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.request(Method::Get, path, None).await?;
        decode(&body)
    }

    /// Send `payload` as JSON and decode the JSON response.
    pub async fn send<B, T>(&self, method: Method, path: &str, payload: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let json = serde_json::to_vec(payload).context("Failed to encode request body")?;
        let body = self.request(method, path, Some(json)).await?;
        decode(&body)
    }

    /// Send `payload` as JSON and ignore whatever comes back on success.
    pub async fn send_discarding<B>(&self, method: Method, path: &str, payload: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let json = serde_json::to_vec(payload).context("Failed to encode request body")?;
        self.request(method, path, Some(json)).await?;
        Ok(())
    }

    /// One authenticated round trip. Returns the raw body of a 2xx response;
    /// anything else becomes an [`ApiError`].
    async fn request(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let url = api_url(path);
        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {}", self.token)),
            ("Accept".to_string(), ACCEPT.to_string()),
            ("X-GitHub-Api-Version".to_string(), API_VERSION.to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        debug!(%method, %url, "github request");
        let response = self
            .http
            .execute(HttpRequest {
                method,
                url,
                headers,
                body,
            })
            .await
            .map_err(|e| ApiError::Transport(e.into()))?;
        debug!(status = response.status, "github response");

        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body).into());
        }
        Ok(response.body)
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).context("Failed to parse GitHub API response")
}

/// Pin a caller-supplied path (or full URL) to [`API_BASE`], keeping only its
/// path and query.
pub fn api_url(path: &str) -> String {
    // Only input that parses on its own carries a scheme and host to drop
    let path = match Url::parse(path) {
        Ok(absolute) => match absolute.query() {
            Some(query) => format!("{}?{}", absolute.path(), query),
            None => absolute.path().to_string(),
        },
        Err(_) => path.to_string(),
    };
    if path.starts_with('/') {
        format!("{}{}", API_BASE, path)
    } else {
        format!("{}/{}", API_BASE, path)
    }
}
