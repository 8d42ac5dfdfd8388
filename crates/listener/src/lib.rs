//! CI relay HTTP listener.
//!
//! Receives notifications from GitHub and Jenkins and hands them to the
//! [`relay`] event handlers. Every request is processed to completion before
//! the response is written, so the status code reflects what happened.
//!
//! # Endpoints
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET` | `/ping` | Liveness probe, answers `pong` |
//! | `POST` | `/notification/github` | [`relay::GitHubEventHandler`] |
//! | `POST` | `/notification/jenkins` | [`relay::JenkinsEventHandler`] |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Header extraction, body decoding and the mapping of
//! [`relay::RelayError`] onto HTTP status codes live here.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use relay::{GitHubEventHandler, JenkinsEventHandler};
use thiserror::Error;
use tracing::info;

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{github_handler, jenkins_handler, ping_handler, HEADER_EVENT};

/// Shared application state, passed to handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    github: GitHubEventHandler,
    jenkins: JenkinsEventHandler,
}

impl AppState {
    pub fn new(github: GitHubEventHandler, jenkins: JenkinsEventHandler) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { github, jenkins }),
        }
    }

    pub fn github(&self) -> &GitHubEventHandler {
        &self.inner.github
    }

    pub fn jenkins(&self) -> &JenkinsEventHandler {
        &self.inner.jenkins
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/ping", get(ping_handler))
        .route("/notification/github", post(github_handler))
        .route("/notification/jenkins", post(jenkins_handler))
        .with_state(app_state)
}

/// Errors that stop the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Binds `addr` and serves until `shutdown` resolves.
///
/// In-flight requests are allowed to finish before this returns.
pub async fn serve<F>(
    addr: SocketAddr,
    app_state: AppState,
    shutdown: F,
) -> Result<(), ListenerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;
    let local = listener.local_addr().unwrap_or(addr);
    info!(addr = %local, "Listening for notifications");

    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ListenerError::Serve)?;

    info!("Listener stopped");
    Ok(())
}
