use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use tracing::instrument;

use super::CommitSha;
use super::GithubClient;
use super::RepoId;
use crate::ops::http::HttpOps;
use crate::ops::http::Method;

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: CommitSha,
}

#[derive(Debug, Serialize)]
struct CreateRef<'a> {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateRef<'a> {
    sha: &'a str,
    force: bool,
}

impl<H: HttpOps> GithubClient<H> {
    /// Resolve a branch to the commit it points at.
    #[instrument(skip(self))]
    pub async fn get_ref(&self, repo: &RepoId, branch: &str) -> Result<CommitSha> {
        let path = format!(
            "/repos/{}/{}/git/ref/heads/{}",
            repo.owner, repo.name, branch
        );
        let git_ref: GitRef = self.get(&path).await?;
        Ok(git_ref.object.sha)
    }

    /// Create `branch` at `sha`. Fails with a conflict if the branch exists.
    #[instrument(skip(self))]
    pub async fn create_ref(&self, repo: &RepoId, branch: &str, sha: &CommitSha) -> Result<()> {
        let path = format!("/repos/{}/{}/git/refs", repo.owner, repo.name);
        let payload = CreateRef {
            ref_name: format!("refs/heads/{}", branch),
            sha: &sha.0,
        };
        self.send_discarding(Method::Post, &path, &payload).await
    }

    /// Move `branch` to `sha`. Without `force` the move must be a fast-forward.
    #[instrument(skip(self))]
    pub async fn update_ref(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &CommitSha,
        force: bool,
    ) -> Result<()> {
        let path = format!(
            "/repos/{}/{}/git/refs/heads/{}",
            repo.owner, repo.name, branch
        );
        let payload = UpdateRef { sha: &sha.0, force };
        self.send_discarding(Method::Patch, &path, &payload).await
    }
}
