//! Integration layers for the systems the release pipeline talks to.
//!
//! - [`http`]: the request executor seam (curl in production, mocks in tests)
//! - [`github`]: GitHub REST API client with ref, contents and pull request operations
//!
//! The executor is a trait with real and mock implementations so the client
//! can be exercised without a network.

pub mod github;
pub mod http;
