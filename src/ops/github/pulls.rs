use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::instrument;
use url::form_urlencoded;

use super::GithubClient;
use super::RepoId;
use crate::ops::http::HttpOps;
use crate::ops::http::Method;

/// A pull request as identified on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(rename = "html_url")]
    pub url: String,
}

/// Parameters for [`GithubClient::ensure_pull_request`].
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub repo: RepoId,
    /// Branch to merge; `owner:branch` when it lives in a fork.
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
}

#[derive(Debug, Serialize)]
struct CreatePullRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
    draft: bool,
}

impl<H: HttpOps> GithubClient<H> {
    /// Return the open PR for `head` into `base`, creating it if there is none.
    #[instrument(skip_all, fields(repo = %params.repo, head = %params.head, base = %params.base))]
    pub async fn ensure_pull_request(&self, params: &NewPullRequest) -> Result<PullRequest> {
        if let Some(existing) = self.find_open_pull_request(params).await? {
            info!(number = existing.number, "pull request already open");
            return Ok(existing);
        }

        let url = format!("/repos/{}/{}/pulls", params.repo.owner, params.repo.name);
        let payload = CreatePullRequest {
            title: &params.title,
            body: &params.body,
            head: &params.head,
            base: &params.base,
            draft: params.draft,
        };
        let created: PullRequest = self.send(Method::Post, &url, &payload).await?;
        info!(number = created.number, "pull request created");
        Ok(created)
    }

    async fn find_open_pull_request(&self, params: &NewPullRequest) -> Result<Option<PullRequest>> {
        // The list filter only understands `owner:branch`
        let head = if params.head.contains(':') {
            params.head.clone()
        } else {
            params.repo.head_locator(&params.head)
        };
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("state", "open")
            .append_pair("head", &head)
            .append_pair("base", &params.base)
            .finish();
        let url = format!(
            "/repos/{}/{}/pulls?{}",
            params.repo.owner, params.repo.name, query
        );
        let open: Vec<PullRequest> = self.get(&url).await?;
        Ok(open.into_iter().next())
    }
}
