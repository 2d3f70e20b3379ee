//! Library root for `activity-feed`.
//!
//! Activity-feed receives GitHub webhook deliveries and turns them into a
//! readable activity stream:
//! - Normalizes push and pull request payloads into uniform event records
//! - Persists the records in an append-only event store
//! - Serves the most recent activity as display messages to polling clients
//!
//! SurrealDB backs the store and axum serves HTTP. The store sits behind a
//! trait so other backends (or mocks) can be swapped in.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use tracing::info;

/// Public async entry for the binary crate.
///
/// Connects the event store and serves the HTTP endpoints until shutdown.
pub async fn start(config: Config) -> Void {
    info!("Starting activity-feed ...");

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
