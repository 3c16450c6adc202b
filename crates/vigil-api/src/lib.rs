//! HTTP API for Vigil versioned records and tenant policies.
//!
//! This crate provides an Axum HTTP server that exposes, per entity kind,
//! the record operations (create, read current, list, history, as-of,
//! new version, soft delete, verify) and, per policy category, policy
//! resolution with default fallback and audited updates.
//!
//! Callers identify their tenant with `X-Tenant-Id` and themselves with
//! `X-Actor-Id`. Every response body is JSON; errors have the shape
//! `{"error": "...", "status": 409}`.

pub mod context;
pub mod error;
pub mod handlers;
pub mod policies;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
