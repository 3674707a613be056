//! `loopauth` command-line tool.

mod cli;

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use loopauth::{AuthError, AutoRefresh, NoBrowser, OidcClient, OidcClientBuilder, UserCredentials};

use crate::cli::{Cli, Command, LogFormat};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Err(e) = run(cli).await {
        tracing::error!("fatal: {e:#}");
        if e.downcast_ref::<AuthError>().is_some_and(AuthError::requires_login) {
            eprintln!("Run `loopauth login` to log in.");
        }
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.client_config()?;
    let mut builder = OidcClientBuilder::new(config).refresh_threshold(cli.threshold);
    if cli.no_browser {
        builder = builder.browser(NoBrowser);
    }
    let client = builder.build().await.context("starting the OIDC client")?;

    match cli.command {
        Command::Login => {
            if let Some(current) = client.snapshot() {
                println!("Already logged in as {}", display_user(&current));
                return Ok(());
            }
            let credentials = client.login().await?;
            println!("Logged in as {}", display_user(&credentials));
        }
        Command::Logout => {
            client.logout().await?;
            println!("Logged out");
        }
        Command::Status => print_status(&client),
        Command::Token => println!("{}", client.access_token().await?),
        Command::Claims => {
            let credentials = client.current_user().await?;
            println!("{}", serde_json::to_string_pretty(&credentials.access_token.payload)?);
        }
        Command::Watch => watch(client).await?,
    }
    Ok(())
}

fn display_user(credentials: &UserCredentials) -> &str {
    credentials.username().unwrap_or("<unknown user>")
}

fn print_status(client: &OidcClient) {
    let Some(credentials) = client.snapshot() else {
        println!("Not logged in");
        return;
    };

    let now = Utc::now();
    println!("User:            {}", display_user(&credentials));
    println!("Scope:           {}", credentials.scope);
    println!(
        "Access token:    expires {} ({}s left)",
        credentials.expires_at().to_rfc3339(),
        credentials.remaining(now).as_secs()
    );
    match credentials.refresh_expires_at() {
        Some(at) => println!("Refresh token:   expires {}", at.to_rfc3339()),
        None => println!("Refresh token:   no expiry given"),
    }
    println!("Credential file: {}", client.store().path().display());
}

async fn watch(client: OidcClient) -> anyhow::Result<()> {
    let auto = AutoRefresh::spawn(Arc::new(client));
    let mut tokens = auto.subscribe();

    loop {
        if let Some(token) = tokens.borrow_and_update().clone() {
            println!("{token}");
        }
        tokio::select! {
            changed = tokens.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                break;
            }
        }
    }

    auto.stop().await;
    Ok(())
}
