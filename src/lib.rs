//! Tag-aware page cache for axum applications.

pub mod cache;
pub mod config;
pub mod error;
pub mod infra;
