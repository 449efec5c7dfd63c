//! Entry point handed to resource logic

use super::client::GithubClient;
use super::listers::{CollaboratorLister, LabelLister};
use super::models::{Collaborator, Label, RepoKey};
use crate::batch::BatchCoalescer;
use crate::config::ClientConfig;
use crate::error::HubResult;
use crate::transport::Transport;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A configured client plus one coalescer per batched entity kind
///
/// # Example
///
/// ```no_run
/// use hubgate_core::{ClientConfig, Organization};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> hubgate_core::HubResult<()> {
/// let org = Organization::from_config(ClientConfig::with_token("ghp_..."))?;
/// let cancel = CancellationToken::new();
///
/// match org.read_label(&cancel, "octocat", "Hello-World", "bug").await? {
///     Some(label) => println!("{} is #{}", label.name, label.color),
///     None => println!("no such label"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Organization {
    name: Option<String>,
    client: Arc<GithubClient>,
    labels: BatchCoalescer<LabelLister>,
    collaborators: BatchCoalescer<CollaboratorLister>,
}

impl Organization {
    /// Build the full access layer from configuration
    pub fn from_config(config: ClientConfig) -> HubResult<Self> {
        let client = GithubClient::new(&config)?;
        Ok(Self::with_client(&config, client))
    }

    /// Build the access layer over a custom leaf transport
    pub fn with_transport(config: ClientConfig, leaf: Arc<dyn Transport>) -> HubResult<Self> {
        let client = GithubClient::with_transport(&config, leaf)?;
        Ok(Self::with_client(&config, client))
    }

    fn with_client(config: &ClientConfig, client: GithubClient) -> Self {
        let client = Arc::new(client);
        Self {
            name: config.organization.clone(),
            labels: BatchCoalescer::new(LabelLister::new(client.clone()), config.batch_window),
            collaborators: BatchCoalescer::new(
                CollaboratorLister::new(client.clone()),
                config.batch_window,
            ),
            client,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn client(&self) -> &GithubClient {
        &self.client
    }

    /// Label coalescer, for callers that want the [`crate::batch::Lookup`] capability
    pub fn labels(&self) -> &BatchCoalescer<LabelLister> {
        &self.labels
    }

    /// Collaborator coalescer
    pub fn collaborators(&self) -> &BatchCoalescer<CollaboratorLister> {
        &self.collaborators
    }

    /// Read one label by exact name
    ///
    /// `Ok(None)` means the repository has no such label.
    pub async fn read_label(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        name: &str,
    ) -> HubResult<Option<Label>> {
        let key = RepoKey::new(owner, repo)?;
        self.labels.lookup(cancel, key, name).await
    }

    /// Read one collaborator by exact login
    ///
    /// `Ok(None)` means the user is not a collaborator.
    pub async fn read_collaborator(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        login: &str,
    ) -> HubResult<Option<Collaborator>> {
        let key = RepoKey::new(owner, repo)?;
        self.collaborators.lookup(cancel, key, login).await
    }
}
