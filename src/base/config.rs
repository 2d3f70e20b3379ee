//! Load configuration via `config` crate with env-override support.

use std::{net::SocketAddr, ops::Deref, path::Path, sync::Arc};

use serde::Deserialize;

use super::types::{Res, Void};

/// Default address the HTTP server binds to.
fn default_bind_address() -> String {
    "127.0.0.1:5000".to_string()
}

/// Default SurrealDB namespace.
fn default_db_namespace() -> String {
    "activity".to_string()
}

/// Default SurrealDB database.
fn default_db_database() -> String {
    "github_events".to_string()
}

/// Loads a `.env` file into the process environment.
///
/// With no path, searches the working directory and its parents. A missing file is fine;
/// any other failure (unreadable or malformed file) is returned.
pub fn load_dotenv(path: Option<&Path>) -> Void {
    let result = match path {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };

    match result {
        Err(err) if !err.not_found() => Err(err.into()),
        _ => Ok(()),
    }
}

/// Configuration for the activity-feed application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Address the HTTP server listens on (`BIND_ADDRESS`).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Event store connection string, e.g. `ws://127.0.0.1:8000` or `mem://` (`DB_ENDPOINT`).
    pub db_endpoint: String,
    /// Database username (`DB_USERNAME`).
    #[serde(default)]
    pub db_username: Option<String>,
    /// Database password (`DB_PASSWORD`).
    #[serde(default)]
    pub db_password: Option<String>,
    /// Database namespace (`DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("ACTIVITY_FEED"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Checks values that deserialize fine but cannot be used at runtime.
    pub fn validate(&self) -> Void {
        if self.db_endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!("Database endpoint must not be empty."));
        }

        if self.bind_address.parse::<SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("Bind address `{}` is not a valid socket address.", self.bind_address));
        }

        Ok(())
    }

    /// Parsed form of `bind_address`.
    pub fn socket_addr(&self) -> Res<SocketAddr> {
        Ok(self.bind_address.parse()?)
    }
}
