//! `ci-relay` entry point.
//!
//! This binary is the composition root. It:
//!
//! 1. parses command-line flags and loads the TOML configuration,
//! 2. installs the tracing subscriber (and OTLP exporter when configured),
//! 3. builds the GitHub and Jenkins adapters and injects them into the
//!    [`relay`] event handlers,
//! 4. serves the [`listener`] endpoints until Ctrl-C or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use relay::{
    BuildTrigger, CommitFetcher, GitHubEventHandler, JenkinsEventHandler, RelaySettings, Sleeper,
};

mod config;
mod telemetry;

use config::Config;
use telemetry::LogFormat;

#[derive(Parser)]
#[command(name = "ci-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relays GitHub pull requests to Jenkins and build results back", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "CI_RELAY_CONFIG", default_value = "ci-relay.toml", global = true)]
    config: PathBuf,

    /// Address to listen on, overriding `server.bind`
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay (default)
    Serve,
    /// Load and validate the configuration, then list the repositories
    CheckConfig,
}

/// [`Sleeper`] backed by the Tokio timer.
struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => check_config(&cli.config),
        Command::Serve => {
            let _telemetry = telemetry::init(cli.log_format)?;
            let config = Config::load(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?;
            serve(config, cli.bind).await
        }
    }
}

fn check_config(path: &std::path::Path) -> Result<()> {
    let config =
        Config::load(path).with_context(|| format!("loading {}", path.display()))?;
    println!("{}: ok", path.display());
    println!("jenkins: {}", config.relay.jenkins.url);
    for repo in &config.repositories {
        println!(
            "  {} -> {} ({:?})",
            repo.github_repo, repo.jenkins_job_name, repo.build_commits
        );
    }
    Ok(())
}

fn build_state(config: &Config) -> Result<listener::AppState> {
    let settings = Arc::new(config.relay.clone());
    let repos = Arc::new(config.repo_configs());
    let timeout = config.http.timeout();

    let github = Arc::new(
        github::GitHubClient::new(settings.clone(), timeout).context("creating GitHub client")?,
    );
    let jenkins =
        Arc::new(jenkins::JenkinsClient::new(timeout).context("creating Jenkins client")?);

    let fetcher = CommitFetcher::new(
        github.clone(),
        Arc::new(TokioSleeper),
        settings.commit_fetch.retry_config(),
    );
    let github_handler = GitHubEventHandler::new(
        repos.clone(),
        github.clone(),
        fetcher,
        BuildTrigger::new(settings.clone(), jenkins),
    );
    let jenkins_handler = JenkinsEventHandler::new(settings, repos, github);

    Ok(listener::AppState::new(github_handler, jenkins_handler))
}

async fn serve(config: Config, bind: Option<SocketAddr>) -> Result<()> {
    let addr = bind.unwrap_or(config.server.bind);
    log_startup(&config.relay, config.repositories.len());

    let state = build_state(&config)?;
    listener::serve(addr, state, shutdown_signal())
        .await
        .context("running listener")?;
    Ok(())
}

fn log_startup(settings: &RelaySettings, repositories: usize) {
    info!(
        jenkins = %settings.jenkins.url,
        github = %settings.github.api_base,
        repositories,
        token_root_build = settings.jenkins.token_root_build,
        "Starting relay"
    );
    if settings.github.token.is_none() {
        warn!("No GitHub token configured; status pushes will be unauthenticated");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown requested");
}
