use std::fmt;
use std::sync::LazyLock;

use chrono::DateTime;
use chrono::Utc;
use regex::Regex;

use crate::error::ValidationError;
use crate::ops::github::RepoId;

pub const OPERATOR_NAME: &str = "ibmcloud-operator";

/// Package index shared by every release of the operator.
pub const PACKAGE_PATH: &str = "operators/ibmcloud-operator/ibmcloud-operator.package.yaml";

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9][0-9A-Za-z._+-]*$").expect("valid regex"));

// -----------------------------------------------------------------------------
// Version

/// Release version, always carrying exactly one leading `v`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(String);

impl Version {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::Missing("version"));
        }
        let bare = input.strip_prefix('v').unwrap_or(input);
        if !VERSION_RE.is_match(bare) {
            return Err(ValidationError::MalformedVersion(input.to_string()));
        }
        Ok(Self(format!("v{}", bare)))
    }

    /// `v1.2.3`
    pub fn tagged(&self) -> &str {
        &self.0
    }

    /// `1.2.3`
    pub fn bare(&self) -> &str {
        &self.0[1..]
    }

    pub fn csv_path(&self) -> String {
        format!(
            "operators/{}/{}/ibmcloud_operator.{}.clusterserviceversion.yaml",
            OPERATOR_NAME,
            self.bare(),
            self.tagged()
        )
    }

    pub fn pr_title(&self) -> String {
        format!("operator {} ({})", OPERATOR_NAME, self.bare())
    }

    pub fn pr_body(&self) -> String {
        format!(
            "Release IBM Cloud Operator {}.\n\nAdds the {} cluster service version and points the package channel at it.",
            self.tagged(),
            self.tagged()
        )
    }

    pub fn csv_commit_message(&self) -> String {
        format!("Add {} {} cluster service version", OPERATOR_NAME, self.tagged())
    }

    pub fn package_commit_message(&self) -> String {
        format!("Update {} package to {}", OPERATOR_NAME, self.tagged())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// -----------------------------------------------------------------------------
// ReleaseBranch

/// Branch name shared by every target repo of one run.
///
/// Second resolution: two runs for the same version within one second produce
/// the same name, and the later one fails when it creates the branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseBranch(String);

impl ReleaseBranch {
    pub fn new(version: &Version, started_at: DateTime<Utc>) -> Self {
        Self(format!(
            "release-{}-{}",
            version.tagged(),
            started_at.format("%Y-%m-%dT%H-%M-%SZ")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// -----------------------------------------------------------------------------
// Targets

/// A downstream catalog repository that receives the release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRepo {
    /// Used in error messages: "failed to update {description} repo"
    pub description: &'static str,
    pub upstream: RepoId,
    pub default_branch: &'static str,
}

impl TargetRepo {
    /// The caller's fork of this repo.
    pub fn fork(&self, fork_org: &str) -> RepoId {
        RepoId::new(fork_org, self.upstream.name.clone())
    }
}

/// Catalogs updated on every release, in the order they are processed.
pub fn target_repos() -> Vec<TargetRepo> {
    vec![
        TargetRepo {
            description: "kubernetes operator",
            upstream: RepoId::new("k8s-operatorhub", "community-operators"),
            default_branch: "main",
        },
        TargetRepo {
            description: "openshift operator",
            upstream: RepoId::new("redhat-openshift-ecosystem", "community-operators-prod"),
            default_branch: "main",
        },
    ]
}
