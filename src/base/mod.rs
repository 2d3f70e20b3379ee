//! Core components, types, and utilities for the activity feed.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - The normalized event model and result handling.

pub mod config;
pub mod types;
