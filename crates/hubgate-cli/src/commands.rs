//! Command implementations

use crate::args::{Cli, Commands};
use anyhow::{Context, Result};
use futures::future::join_all;
use hubgate_core::{ClientConfig, HubResult, Organization, RepoKey};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One line of lookup output
#[derive(Debug, Serialize)]
struct LookupLine<'a> {
    key: &'a str,
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    item: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Build the effective configuration: file, then environment, then flags
pub fn load_config(cli: &Cli) -> Result<ClientConfig> {
    load_config_with(cli, |key| std::env::var(key).ok())
}

fn load_config_with<F>(cli: &Cli, env: F) -> Result<ClientConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_env_with(env)?;

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }
    if let Some(organization) = &cli.organization {
        config.organization = Some(organization.clone());
    }
    if cli.insecure {
        config.insecure = true;
    }

    config.validate()?;
    debug!(?config, "configuration loaded");
    Ok(config)
}

pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let config = load_config(&cli)?;
    let org = Organization::from_config(config)?;

    match cli.command {
        Commands::Label { repo, names } => {
            let repo: RepoKey = repo.parse()?;
            let results = join_all(
                names
                    .iter()
                    .map(|name| org.read_label(&cancel, &repo.owner, &repo.repo, name)),
            )
            .await;
            print_lookups(&names, results)
        }
        Commands::Collaborator { repo, logins } => {
            let repo: RepoKey = repo.parse()?;
            let results = join_all(
                logins
                    .iter()
                    .map(|login| org.read_collaborator(&cancel, &repo.owner, &repo.repo, login)),
            )
            .await;
            print_lookups(&logins, results)
        }
        Commands::RateLimit => {
            let overview = org.client().rate_limit_overview().await?;
            let state = org.client().rate_state();
            let reset_in_secs = state
                .reset_at
                .map(|at| at.saturating_duration_since(tokio::time::Instant::now()).as_secs());
            let report = serde_json::json!({
                "transport": {
                    "remaining": state.remaining,
                    "limit": state.limit,
                    "reset_in_secs": reset_in_secs,
                },
                "resources": overview.resources,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

/// Print one JSON line per key; fail if any lookup failed
fn print_lookups<T: Serialize>(keys: &[String], results: Vec<HubResult<Option<T>>>) -> Result<()> {
    let mut failures = 0;
    for (key, result) in keys.iter().zip(results) {
        let line = match result {
            Ok(item) => LookupLine {
                key,
                found: item.is_some(),
                item: item.map(|i| serde_json::to_value(i)).transpose()?,
                error: None,
            },
            Err(e) => {
                failures += 1;
                LookupLine {
                    key,
                    found: false,
                    item: None,
                    error: Some(e.to_string()),
                }
            }
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    if failures > 0 {
        anyhow::bail!("{} of {} lookups failed", failures, keys.len());
    }
    Ok(())
}
