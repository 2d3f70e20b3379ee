//! Service integrations for storage and the network surface.
//!
//! This module contains:
//! - The event store (e.g., SurrealDB)
//! - The HTTP server (axum)
//!
//! The store defines a generic trait alongside its concrete implementation,
//! allowing for extensibility and easy testing.

pub mod db;
pub mod http;
