//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Persisted entity models
//! - Post content bodies and validation

mod content;
mod database;
mod models;

pub use content::{
    normalize_tags, PollOption, PostBody, PostContent, MAX_POLL_OPTIONS, MIN_POLL_OPTIONS,
};
pub use database::{Database, PostFilter};
pub use models::*;

#[cfg(test)]
mod database_test;
