use std::fmt;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;
use tracing::instrument;
use url::form_urlencoded;

use super::GithubClient;
use super::RepoId;
use crate::ops::http::HttpOps;
use crate::ops::http::Method;
use crate::versioned::VersionToken;
use crate::versioned::Versioned;
use crate::versioned::VersionedStore;

// -----------------------------------------------------------------------------
// Types

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentKind::File => "file",
            ContentKind::Dir => "dir",
            ContentKind::Symlink => "symlink",
            ContentKind::Submodule => "submodule",
        };
        f.write_str(s)
    }
}

/// A file as read from a repository, with the blob sha needed to replace it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub path: String,
    pub content: Vec<u8>,
    pub sha: String,
    pub kind: ContentKind,
}

/// Parameters for creating or replacing one file on a branch.
#[derive(Debug, Clone)]
pub struct SetFileContents {
    pub repo: RepoId,
    pub branch: String,
    pub path: String,
    pub content: Vec<u8>,
    /// Blob sha of the version being replaced. Leave empty only when the path
    /// does not exist yet.
    pub old_contents_sha: Option<String>,
    /// Commit message; `"Update <path>"` when not set.
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Entry(ContentEntry),
    Listing(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: ContentKind,
    path: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsEntry,
}

#[derive(Debug, Deserialize)]
struct PutContentsEntry {
    sha: String,
}

// -----------------------------------------------------------------------------
// GithubClient impl

impl<H: HttpOps> GithubClient<H> {
    /// Read a file. `git_ref` of `None` (or empty) reads the default branch.
    #[instrument(skip(self))]
    pub async fn get_file_contents(
        &self,
        repo: &RepoId,
        git_ref: Option<&str>,
        path: &str,
    ) -> Result<FileSnapshot> {
        let mut url = format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, path);
        if let Some(git_ref) = git_ref.filter(|r| !r.is_empty()) {
            url.push('?');
            url.push_str(
                &form_urlencoded::Serializer::new(String::new())
                    .append_pair("ref", git_ref)
                    .finish(),
            );
        }

        let entry = match self.get::<ContentsResponse>(&url).await? {
            ContentsResponse::Entry(entry) => entry,
            ContentsResponse::Listing(_) => {
                bail!("{} in {} is a directory, not a file", path, repo)
            }
        };

        let content = match (entry.content.as_deref(), entry.encoding.as_deref()) {
            (Some(encoded), Some("base64") | None) => decode_content(encoded)
                .with_context(|| format!("Invalid base64 content for {}", path))?,
            (_, Some(other)) if entry.kind == ContentKind::File => {
                // GitHub answers with encoding "none" for blobs over 1 MB
                bail!("{} is returned with unsupported encoding {:?}", path, other)
            }
            _ => Vec::new(),
        };

        Ok(FileSnapshot {
            path: entry.path,
            content,
            sha: entry.sha,
            kind: entry.kind,
        })
    }

    /// Create or replace a file on a branch. Returns the new blob sha.
    #[instrument(skip_all, fields(repo = %params.repo, branch = %params.branch, path = %params.path))]
    pub async fn set_file_contents(&self, params: &SetFileContents) -> Result<String> {
        let url = format!(
            "/repos/{}/{}/contents/{}",
            params.repo.owner, params.repo.name, params.path
        );
        let default_message;
        let message = match &params.message {
            Some(message) => message.as_str(),
            None => {
                default_message = format!("Update {}", params.path);
                default_message.as_str()
            }
        };
        let payload = PutContents {
            message,
            content: BASE64.encode(&params.content),
            sha: params.old_contents_sha.as_deref(),
            branch: &params.branch,
        };

        let response: PutContentsResponse = self.send(Method::Put, &url, &payload).await?;
        Ok(response.content.sha)
    }
}

fn decode_content(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(BASE64.decode(compact)?)
}

// -----------------------------------------------------------------------------
// RepoFiles

/// Files of one branch of one repository, as a compare-and-swap store keyed
/// by path and versioned by blob sha.
pub struct RepoFiles<'a, H: HttpOps> {
    gh: &'a GithubClient<H>,
    repo: &'a RepoId,
    branch: &'a str,
    message: Option<String>,
}

impl<'a, H: HttpOps> RepoFiles<'a, H> {
    pub fn new(gh: &'a GithubClient<H>, repo: &'a RepoId, branch: &'a str) -> Self {
        Self {
            gh,
            repo,
            branch,
            message: None,
        }
    }

    /// Commit message for writes through this view.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<H: HttpOps> VersionedStore for RepoFiles<'_, H> {
    type Key = str;
    type Value = Vec<u8>;

    async fn load(&self, path: &str) -> Result<Versioned<Vec<u8>>> {
        let snapshot = self
            .gh
            .get_file_contents(self.repo, Some(self.branch), path)
            .await?;
        Ok(Versioned {
            value: snapshot.content,
            token: VersionToken(snapshot.sha),
        })
    }

    async fn store(
        &self,
        path: &str,
        value: Vec<u8>,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken> {
        let sha = self
            .gh
            .set_file_contents(&SetFileContents {
                repo: self.repo.clone(),
                branch: self.branch.to_string(),
                path: path.to_string(),
                content: value,
                old_contents_sha: expected.map(|t| t.0.clone()),
                message: self.message.clone(),
            })
            .await?;
        Ok(VersionToken(sha))
    }
}
