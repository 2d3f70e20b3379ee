//! SurrealDB implementation of the event store.

use std::sync::Arc;

use async_trait::async_trait;
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{NormalizedEvent, Res, Void},
};

use super::{EventQuery, EventStore, GenericEventStore, SortOrder};

/// Table holding every normalized event.
const EVENT_TABLE: &str = "event";

/// Fields selected on read; the storage-assigned `id` is left out.
const EVENT_FIELDS: &str = "event_type, author, from_branch, to_branch, action, merged, timestamp";

// Extra methods on `EventStore` applied by the surreal implementation.

impl EventStore {
    /// Connects to the SurrealDB instance named by the configuration.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let store = SurrealEventStore::new(config).await?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Creates a store backed by a fresh in-memory SurrealDB instance.
    pub async fn surreal_memory() -> Res<Self> {
        let store = SurrealEventStore::memory().await?;
        Ok(Self::new(Arc::new(store)))
    }
}

// Structs.

/// SurrealDB event store.
#[derive(Clone)]
pub struct SurrealEventStore {
    db: Surreal<Any>,
}

impl SurrealEventStore {
    /// Connect, authenticate (when credentials are configured), and define the schema.
    #[instrument(name = "SurrealEventStore::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        let db = any::connect(config.db_endpoint.as_str()).await?;

        if let (Some(username), Some(password)) = (&config.db_username, &config.db_password) {
            db.signin(Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await?;
        }

        db.use_ns(config.db_namespace.as_str()).use_db(config.db_database.as_str()).await?;

        let store = Self { db };
        store.define_schema().await?;

        info!("Event store connected to `{}`.", config.db_endpoint);

        Ok(store)
    }

    /// In-memory instance, mostly for tests.
    pub async fn memory() -> Res<Self> {
        let db = any::connect("mem://").await?;
        db.use_ns("activity").use_db("test").await?;

        let store = Self { db };
        store.define_schema().await?;

        Ok(store)
    }

    async fn define_schema(&self) -> Void {
        self.db
            .query(format!("DEFINE TABLE IF NOT EXISTS {EVENT_TABLE} SCHEMALESS;"))
            .query(format!("DEFINE INDEX IF NOT EXISTS {EVENT_TABLE}_timestamp ON {EVENT_TABLE} FIELDS timestamp;"))
            .await?
            .check()?;

        Ok(())
    }
}

/// Builds the SurrealQL statement for a query. `$after` is bound separately.
fn select_statement(query: &EventQuery) -> String {
    let mut sql = format!("SELECT {EVENT_FIELDS} FROM {EVENT_TABLE}");

    if query.after.is_some() {
        sql.push_str(" WHERE timestamp > $after");
    }

    sql.push_str(match query.order {
        SortOrder::Ascending => " ORDER BY timestamp ASC",
        SortOrder::Descending => " ORDER BY timestamp DESC",
    });

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    sql
}

#[async_trait]
impl GenericEventStore for SurrealEventStore {
    #[instrument(skip_all, fields(event_type = %event.event_type))]
    async fn insert(&self, event: &NormalizedEvent) -> Void {
        self.db
            .query(format!("CREATE {EVENT_TABLE} CONTENT $record"))
            .bind(("record", event.clone()))
            .await?
            .check()?;

        debug!("Stored `{}` event at {}.", event.event_type, event.timestamp);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn query(&self, query: &EventQuery) -> Res<Vec<NormalizedEvent>> {
        let mut request = self.db.query(select_statement(query));

        if let Some(after) = &query.after {
            request = request.bind(("after", after.clone()));
        }

        let mut response = request.await?.check()?;
        let events: Vec<NormalizedEvent> = response.take(0)?;

        Ok(events)
    }
}
