//! Bulk listings that back the batched lookups

use super::client::GithubClient;
use super::models::{Collaborator, Label, RepoKey};
use crate::batch::BulkLister;
use crate::error::HubResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Lists repository labels, keyed by label name
#[derive(Clone)]
pub struct LabelLister {
    client: Arc<GithubClient>,
}

impl LabelLister {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BulkLister for LabelLister {
    type Group = RepoKey;
    type Item = Label;

    async fn list(&self, group: &RepoKey) -> HubResult<Vec<Label>> {
        self.client.list_labels(group).await
    }

    fn item_key(item: &Label) -> &str {
        &item.name
    }
}

/// Lists repository collaborators, keyed by login
#[derive(Clone)]
pub struct CollaboratorLister {
    client: Arc<GithubClient>,
}

impl CollaboratorLister {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BulkLister for CollaboratorLister {
    type Group = RepoKey;
    type Item = Collaborator;

    async fn list(&self, group: &RepoKey) -> HubResult<Vec<Collaborator>> {
        self.client.list_collaborators(group).await
    }

    fn item_key(item: &Collaborator) -> &str {
        &item.login
    }
}
