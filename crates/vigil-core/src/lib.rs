//! Temporal versioning and policy resolution for the Vigil platform.
//!
//! Records are never updated in place. A change closes the current row and
//! inserts its successor in one atomic step, so every business key has a
//! complete, gap-free history and at most one current version.
//!
//! # Modules
//!
//! - [`store`] -- The storage port ([`RecordStore`])
//! - [`memory`] -- In-process store for tests and single-node deployments
//! - [`guard`] -- Compare-and-swap tokens and conflict retry
//! - [`lifecycle`] -- Create, supersede, soft-delete
//! - [`query`] -- Current-state and temporal lookups
//! - [`repository`] -- Per-entity facade over lifecycle and queries
//! - [`policy`] -- Per-tenant policies with default-preset fallback
//! - [`invariants`] -- Whole-chain consistency checks
//! - [`engine`] -- Wires a store, a clock, and config together

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod invariants;
pub mod lifecycle;
pub mod memory;
pub mod policy;
pub mod query;
pub mod repository;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoreConfig;
pub use engine::RecordEngine;
pub use error::{StoreError, VersionError};
pub use guard::{CasToken, RetryPolicy, retry_on_conflict};
pub use invariants::{ChainViolation, check_chain};
pub use lifecycle::{NewRecord, VersionLifecycle};
pub use memory::InMemoryStore;
pub use policy::{PolicyError, PolicyResolver, PolicySource, ResolvedPolicy};
pub use query::{CurrentQuery, HistoryQuery, VersionWithState};
pub use repository::Repository;
pub use store::{RawRecord, RecordStore};
