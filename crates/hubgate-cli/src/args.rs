//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "hubgate.toml";

#[derive(Parser, Debug)]
#[command(name = "hubgate")]
#[command(about = "Batched, cached, rate-aware reads against the GitHub REST API")]
#[command(
    long_about = r#"Batched, cached, rate-aware reads against the GitHub REST API

USAGE:
  hubgate label octo/repo bug enhancement      # Look up labels by name
  hubgate collaborator octo/repo octocat       # Look up collaborators by login
  hubgate rate-limit                           # Show remaining quota

All keys given to one command are looked up concurrently and answered
from a single listing of the repository."#
)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (TOML or JSON)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// API root, e.g. https://ghe.example.com/api/v3
    #[arg(long)]
    pub base_url: Option<String>,

    /// Bearer token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Organization to act on behalf of
    #[arg(long)]
    pub organization: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Look up labels of a repository by exact name
    Label {
        /// Repository as owner/repo
        repo: String,
        /// Label names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Look up collaborators of a repository by login
    Collaborator {
        /// Repository as owner/repo
        repo: String,
        /// User logins
        #[arg(required = true)]
        logins: Vec<String>,
    },

    /// Show the current API quota
    RateLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label_command() {
        let cli = Cli::try_parse_from(["hubgate", "label", "octo/hello", "bug", "docs"]).unwrap();
        match cli.command {
            Commands::Label { repo, names } => {
                assert_eq!(repo, "octo/hello");
                assert_eq!(names, vec!["bug", "docs"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_label_requires_names() {
        assert!(Cli::try_parse_from(["hubgate", "label", "octo/hello"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "hubgate",
            "--base-url",
            "https://ghe.local/api/v3",
            "--insecure",
            "rate-limit",
        ])
        .unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("https://ghe.local/api/v3"));
        assert!(cli.insecure);
        assert!(matches!(cli.command, Commands::RateLimit));
    }
}
