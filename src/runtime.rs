//! Runtime services and shared state for the activity feed.

use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    service::{db::EventStore, http},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the event store and configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The event store instance.
    pub store: EventStore,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the event store.
        let store = EventStore::surreal(&config).await?;

        Ok(Self { config, store })
    }

    /// Serve HTTP until Ctrl-C.
    pub async fn start(&self) -> Void {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;

        info!("Listening on http://{} ...", addr);

        axum::serve(listener, http::router(self.clone())).with_graceful_shutdown(shutdown_signal()).await?;

        info!("Server shut down.");

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
}
