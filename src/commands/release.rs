use anyhow::Context;
use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;
use colored::Colorize;
use tracing::info;
use tracing::instrument;

use crate::App;
use crate::ops::github::NewPullRequest;
use crate::ops::github::PullRequest;
use crate::ops::github::RepoFiles;
use crate::ops::http::HttpOps;
use crate::release::PACKAGE_PATH;
use crate::release::ReleaseBranch;
use crate::release::TargetRepo;
use crate::release::Version;
use crate::versioned::VersionedStore as _;

/// Inputs of one run, fixed before the first request goes out.
#[derive(Debug, Clone)]
pub struct ReleasePlan {
    pub version: Version,
    pub branch: ReleaseBranch,
    pub csv: Vec<u8>,
    pub package: Vec<u8>,
}

impl<H: HttpOps> App<H> {
    /// Publish a release to every target catalog.
    ///
    /// For each target repo, in order:
    ///
    /// 1. Force the fork's default branch to upstream's default branch tip.
    /// 2. Create the release branch in the fork at that commit.
    /// 3. Write the version-scoped CSV file (always new).
    /// 4. Replace the shared package file, using the blob sha read from
    ///    upstream as the expected version.
    /// 5. Open the PR from `fork_org:branch` into upstream, or reuse an open one.
    ///
    /// Each PR URL is written to `stdout` as soon as it is known. The first
    /// failure stops the run; whatever was already changed remotely stays.
    pub async fn cmd_release(&self, stdout: &mut impl std::io::Write) -> Result<Vec<PullRequest>> {
        let plan = self.prepare_release(Utc::now()).await?;
        self.publish_release(&plan, stdout).await
    }

    /// Validate the config and load both artifacts. Makes no requests.
    pub async fn prepare_release(&self, started_at: DateTime<Utc>) -> Result<ReleasePlan> {
        let version = self.config.validate()?;

        let csv = tokio::fs::read(&self.config.csv_path)
            .await
            .with_context(|| {
                format!("failed to read CSV file {}", self.config.csv_path.display())
            })?;
        let package = tokio::fs::read(&self.config.package_path)
            .await
            .with_context(|| {
                format!(
                    "failed to read package file {}",
                    self.config.package_path.display()
                )
            })?;

        let branch = ReleaseBranch::new(&version, started_at);
        info!(%version, %branch, "prepared release");
        Ok(ReleasePlan {
            version,
            branch,
            csv,
            package,
        })
    }

    pub async fn publish_release(
        &self,
        plan: &ReleasePlan,
        stdout: &mut impl std::io::Write,
    ) -> Result<Vec<PullRequest>> {
        let mut pull_requests = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let pr = self
                .release_to(target, plan)
                .await
                .with_context(|| format!("failed to update {} repo", target.description))?;
            writeln!(
                stdout,
                "{} {}",
                format!("{}:", target.description).cyan(),
                pr.url
            )?;
            pull_requests.push(pr);
        }
        Ok(pull_requests)
    }

    #[instrument(skip_all, fields(upstream = %target.upstream))]
    async fn release_to(&self, target: &TargetRepo, plan: &ReleasePlan) -> Result<PullRequest> {
        let fork = target.fork(&self.config.fork_org);
        let base = target.default_branch;
        let branch = plan.branch.as_str();

        info!(%fork, "syncing fork with upstream");
        let upstream_tip = self
            .gh
            .get_ref(&target.upstream, base)
            .await
            .with_context(|| format!("failed to get {} branch of {}", base, target.upstream))?;
        self.gh
            .update_ref(&fork, base, &upstream_tip, true)
            .await
            .with_context(|| format!("failed to sync fork {} with {}", fork, target.upstream))?;

        info!(%branch, commit = %upstream_tip, "creating release branch");
        self.gh
            .create_ref(&fork, branch, &upstream_tip)
            .await
            .with_context(|| format!("failed to create release branch {:?} in {}", branch, fork))?;

        let csv_path = plan.version.csv_path();
        info!(path = %csv_path, "writing CSV");
        RepoFiles::new(&self.gh, &fork, branch)
            .with_message(plan.version.csv_commit_message())
            .store(&csv_path, plan.csv.clone(), None)
            .await
            .with_context(|| format!("failed to set contents of file {:?}", csv_path))?;

        info!(path = PACKAGE_PATH, "writing package index");
        let current = RepoFiles::new(&self.gh, &target.upstream, base)
            .load(PACKAGE_PATH)
            .await
            .with_context(|| format!("failed to get contents of file {:?}", PACKAGE_PATH))?;
        RepoFiles::new(&self.gh, &fork, branch)
            .with_message(plan.version.package_commit_message())
            .store(PACKAGE_PATH, plan.package.clone(), Some(&current.token))
            .await
            .with_context(|| format!("failed to set contents of file {:?}", PACKAGE_PATH))?;

        let head = fork.head_locator(branch);
        let pr = self
            .gh
            .ensure_pull_request(&NewPullRequest {
                repo: target.upstream.clone(),
                head: head.clone(),
                base: base.to_string(),
                title: plan.version.pr_title(),
                body: plan.version.pr_body(),
                draft: self.config.draft,
            })
            .await
            .with_context(|| format!("failed to open pull request for {}", head))?;
        info!(url = %pr.url, "pull request ready");

        Ok(pr)
    }
}
