//! GitHub REST payloads used by the access layer

use crate::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Repository identifier, the group key for batched lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoKey {
    pub owner: String,
    pub repo: String,
}

impl RepoKey {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> HubResult<Self> {
        let owner = owner.into();
        let repo = repo.into();
        for (what, value) in [("owner", &owner), ("repository", &repo)] {
            if value.is_empty() {
                return Err(HubError::invalid_input(format!("{} must not be empty", what)));
            }
            if value.contains(['/', '?', '#']) || value.chars().any(char::is_whitespace) {
                return Err(HubError::invalid_input(format!(
                    "Invalid {} name: '{}'",
                    what, value
                )));
            }
        }
        Ok(Self { owner, repo })
    }

    /// Path of a sub-resource, relative to the API root
    pub fn path(&self, resource: &str) -> String {
        format!("repos/{}/{}/{}", self.owner, self.repo, resource)
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoKey {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, repo)) => Self::new(owner, repo),
            None => Err(HubError::invalid_input(format!(
                "Expected 'owner/repo', got '{}'",
                s
            ))),
        }
    }
}

/// Issue label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: u64,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: bool,
}

/// Repository permissions granted to a collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub maintain: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub triage: bool,
    #[serde(default)]
    pub pull: bool,
}

impl Permissions {
    /// Highest role the flags add up to
    pub fn role(&self) -> Option<&'static str> {
        if self.admin {
            Some("admin")
        } else if self.maintain {
            Some("maintain")
        } else if self.push {
            Some("push")
        } else if self.triage {
            Some("triage")
        } else if self.pull {
            Some("pull")
        } else {
            None
        }
    }
}

/// Repository collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub site_admin: bool,
    #[serde(default)]
    pub permissions: Option<Permissions>,
    #[serde(default)]
    pub role_name: Option<String>,
}

/// One quota bucket from `GET /rate_limit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitBucket {
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds
    pub reset: u64,
    #[serde(default)]
    pub used: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResources {
    pub core: RateLimitBucket,
    #[serde(default)]
    pub search: Option<RateLimitBucket>,
    #[serde(default)]
    pub graphql: Option<RateLimitBucket>,
}

/// Body of `GET /rate_limit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitOverview {
    pub resources: RateLimitResources,
}
