//! Wiring: one store, one clock, one config, any number of entity kinds.

use std::sync::Arc;

use vigil_types::{Payload, PolicyParams};

use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::memory::InMemoryStore;
use crate::policy::PolicyResolver;
use crate::repository::Repository;
use crate::store::RecordStore;

/// Hands out repositories and policy resolvers that share a store.
#[derive(Clone)]
pub struct RecordEngine {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: CoreConfig,
}

impl RecordEngine {
    /// Engine over `store`, timestamping with `clock`.
    pub const fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, config: CoreConfig) -> Self {
        Self { store, clock, config }
    }

    /// Engine over a fresh [`InMemoryStore`] and the system clock.
    pub fn in_memory(config: CoreConfig) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), Arc::new(SystemClock), config)
    }

    /// The engine's settings.
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Repository for payload type `P`.
    pub fn repository<P: Payload>(&self) -> Repository<P> {
        Repository::new(Arc::clone(&self.store), Arc::clone(&self.clock))
            .with_reopen(self.config.is_reopenable(P::KIND))
            .with_retry(self.config.retry.clone())
    }

    /// Policy resolver for parameter set `P`.
    pub fn policies<P: PolicyParams>(&self) -> PolicyResolver<P> {
        PolicyResolver::new(Arc::clone(&self.store), Arc::clone(&self.clock), &self.config)
    }
}

impl core::fmt::Debug for RecordEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecordEngine")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
