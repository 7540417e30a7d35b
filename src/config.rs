use std::fmt;
use std::path::PathBuf;

use crate::error::ValidationError;
use crate::release::Version;

/// Everything one release run needs, built once at the program boundary.
#[derive(Clone)]
pub struct Config {
    pub version: String,
    pub fork_org: String,
    pub github_token: String,
    pub csv_path: PathBuf,
    pub package_path: PathBuf,
    pub draft: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("version", &self.version)
            .field("fork_org", &self.fork_org)
            .field("github_token", &"<redacted>")
            .field("csv_path", &self.csv_path)
            .field("package_path", &self.package_path)
            .field("draft", &self.draft)
            .finish()
    }
}

impl Config {
    /// Check required inputs and return the normalized version.
    pub fn validate(&self) -> Result<Version, ValidationError> {
        let version = Version::parse(&self.version)?;
        if self.fork_org.trim().is_empty() {
            return Err(ValidationError::Missing("fork organization"));
        }
        if self.github_token.trim().is_empty() {
            return Err(ValidationError::Missing("GitHub token"));
        }
        if self.csv_path.as_os_str().is_empty() {
            return Err(ValidationError::Missing("CSV file path"));
        }
        if self.package_path.as_os_str().is_empty() {
            return Err(ValidationError::Missing("package file path"));
        }
        Ok(version)
    }

    /// Config for tests
    pub fn new_for_tests(csv_path: PathBuf, package_path: PathBuf) -> Self {
        Self {
            version: "1.2.3".to_string(),
            fork_org: "me".to_string(),
            github_token: "test-token".to_string(),
            csv_path,
            package_path,
            draft: false,
        }
    }
}
