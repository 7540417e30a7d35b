use thiserror::Error;

/// Failure classes for a single GitHub API call.
///
/// Every variant produced from an HTTP response keeps the numeric status and
/// the raw response body. The body is not assumed to be JSON.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found (HTTP {status}): {body}")]
    NotFound { status: u16, body: String },

    /// Optimistic-concurrency violation, ref already exists, or a
    /// non-fast-forward ref move without force.
    #[error("conflict (HTTP {status}): {body}")]
    Conflict { status: u16, body: String },

    #[error("request failed (HTTP {status}): {body}")]
    RequestFailed { status: u16, body: String },

    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl ApiError {
    /// Classify a non-2xx response.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let body = String::from_utf8_lossy(body).into_owned();
        match status {
            404 => Self::NotFound { status, body },
            409 | 422 => Self::Conflict { status, body },
            _ => Self::RequestFailed { status, body },
        }
    }

    /// Find the first `ApiError` in an error chain, looking through any
    /// context added on the way up.
    pub fn find(err: &anyhow::Error) -> Option<&ApiError> {
        err.chain().find_map(|e| e.downcast_ref::<ApiError>())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { status, .. }
            | Self::Conflict { status, .. }
            | Self::RequestFailed { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Missing or malformed release input, caught before any request is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid version {0:?}: expected something like 1.2.3 or v1.2.3")]
    MalformedVersion(String),
}
