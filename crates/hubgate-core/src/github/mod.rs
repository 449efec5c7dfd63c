//! GitHub client assembly
//!
//! Wires the transports into one pipeline and binds a batch coalescer to
//! each bulk-listable entity kind.

pub mod client;
pub mod listers;
pub mod models;
pub mod organization;

pub use client::{GithubClient, PER_PAGE, next_page_link};
pub use listers::{CollaboratorLister, LabelLister};
pub use models::{
    Collaborator, Label, Permissions, RateLimitBucket, RateLimitOverview, RateLimitResources,
    RepoKey,
};
pub use organization::Organization;
