//! Hubgate Core Library
//!
//! An access layer between many concurrent callers and the GitHub REST API.
//! Callers issue single-entity reads; underneath, the layer
//!
//! - replays unchanged representations via conditional requests ([`transport::etag`]),
//! - waits out an exhausted quota and retries throttled calls ([`transport::rate_limit`]),
//! - folds concurrent reads for one repository into a single listing ([`batch`]).

pub mod batch;
pub mod config;
pub mod error;
pub mod github;
pub mod transport;

// Re-export commonly used types
pub use batch::{BatchCoalescer, BulkLister, Lookup};
pub use config::{ClientConfig, RateLimitConfig};
pub use error::{HubError, HubResult};
pub use github::{Collaborator, GithubClient, Label, Organization, RepoKey};
pub use transport::{ApiRequest, ApiResponse, Transport};
