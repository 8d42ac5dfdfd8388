//! CI relay GitHub infrastructure adapter.
//!
//! Implements the GitHub-facing traits defined in the [`relay`] crate
//! ([`relay::CommitStatusPublisher`] and [`relay::PullRequestCommits`]) over
//! the GitHub REST API using `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. Endpoint
//! paths, authentication headers, pagination and the mapping of HTTP failures
//! onto [`relay::RetryPolicy`] live here; the [`relay`] crate never sees them.

mod client;

pub use client::{ClientError, GitHubClient, MAX_DESCRIPTION_CHARS};
