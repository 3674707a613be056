//! Command-line arguments.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use loopauth::core::config::{ENV_CLIENT_ID, ENV_CREDENTIAL_PATH, ENV_DISCOVERY_URL};
use loopauth::ClientConfig;

/// Log in to an OpenID Connect provider and manage the stored tokens.
#[derive(Debug, Parser)]
#[command(name = "loopauth", version)]
pub struct Cli {
    /// JSON configuration file (discovery_url, client_id, credential_path).
    /// Takes precedence over --discovery-url and --client-id
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Discovery document URL, or issuer URL ending in '/'
    #[arg(long, env = ENV_DISCOVERY_URL)]
    pub discovery_url: Option<String>,

    /// Public client identifier
    #[arg(long, env = ENV_CLIENT_ID)]
    pub client_id: Option<String>,

    /// Credential file path
    #[arg(long, env = ENV_CREDENTIAL_PATH)]
    pub credentials: Option<PathBuf>,

    /// Refresh once this fraction of the access token lifetime has elapsed
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,

    /// Print the login URL instead of opening a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand, PartialEq)]
pub enum Command {
    /// Log in through the browser
    Login,
    /// End the session and delete stored credentials
    Logout,
    /// Show who is logged in and when tokens expire
    Status,
    /// Print a valid access token, refreshing it if due
    Token,
    /// Print the access token claims as JSON
    Claims,
    /// Keep the token fresh and print each new one
    Watch,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl Cli {
    /// Resolve the client configuration from the file or the flags.
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => {
                let discovery_url = self
                    .discovery_url
                    .clone()
                    .with_context(|| format!("--discovery-url or {ENV_DISCOVERY_URL} is required"))?;
                let client_id = self
                    .client_id
                    .clone()
                    .with_context(|| format!("--client-id or {ENV_CLIENT_ID} is required"))?;
                ClientConfig::new(discovery_url, client_id)
            }
        };
        if let Some(path) = &self.credentials {
            config.credential_path = path.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("loopauth").chain(args.iter().copied())).unwrap()
    }

    #[rstest]
    #[case("login", Command::Login)]
    #[case("logout", Command::Logout)]
    #[case("status", Command::Status)]
    #[case("token", Command::Token)]
    #[case("claims", Command::Claims)]
    #[case("watch", Command::Watch)]
    fn test_subcommands(#[case] name: &str, #[case] expected: Command) {
        let cli = parse(&["--discovery-url", "https://idp.example/", "--client-id", "cli", name]);
        assert_eq!(cli.command, expected);
    }

    #[test]
    fn test_config_from_flags() {
        let cli = parse(&[
            "--discovery-url",
            "https://idp.example/realms/dev/",
            "--client-id",
            "cli",
            "--credentials",
            "/tmp/creds.json",
            "status",
        ]);
        let config = cli.client_config().unwrap();
        assert_eq!(config.client_id, "cli");
        assert_eq!(config.credential_path, PathBuf::from("/tmp/creds.json"));
        assert_eq!(cli.threshold, 0.5);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_config_rejects_bad_url() {
        let cli = parse(&["--discovery-url", "https://idp.example/realms/dev", "--client-id", "cli", "status"]);
        assert!(cli.client_config().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loopauth.json");
        std::fs::write(
            &path,
            r#"{"provider_wk_url": "https://idp.example/realms/dev/", "client_id": "from-file"}"#,
        )
        .unwrap();

        let cli = parse(&["--config", path.to_str().unwrap(), "--client-id", "ignored", "token"]);
        let config = cli.client_config().unwrap();
        assert_eq!(config.client_id, "from-file");
        assert_eq!(config.discovery_url, "https://idp.example/realms/dev/");
    }
}
