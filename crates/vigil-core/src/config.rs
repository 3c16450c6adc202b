//! Engine-level settings.
//!
//! Loaded from the `core:` section of `vigil-config.yaml` by the server.
//! Every field has a default so an empty section is valid.

use std::collections::BTreeSet;

use serde::Deserialize;
use vigil_types::Preset;

use crate::guard::RetryPolicy;

/// Settings shared by every repository and policy resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CoreConfig {
    /// Entity kinds whose soft-deleted chains may be reopened by a fresh
    /// create on the same business key. Empty by default.
    #[serde(default)]
    pub reopenable_kinds: BTreeSet<String>,

    /// Preset used when a tenant has no policy configured for a category.
    #[serde(default)]
    pub default_preset: Preset,

    /// Retry behavior for read-modify-write helpers.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl CoreConfig {
    /// Whether deleted chains of `kind` may be reopened.
    pub fn is_reopenable(&self, kind: &str) -> bool {
        self.reopenable_kinds.contains(kind)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_uses_defaults() {
        let config: CoreConfig = serde_yml::from_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.default_preset, Preset::Standard);
        assert!(!config.is_reopenable("case"));
    }

    #[test]
    fn parses_full_section() {
        let yaml = r"
reopenable_kinds: [case]
default_preset: STRICT
retry:
  max_attempts: 5
  backoff_ms: 0
";
        let config: CoreConfig = serde_yml::from_str(yaml).unwrap();
        assert!(config.is_reopenable("case"));
        assert!(!config.is_reopenable("note"));
        assert_eq!(config.default_preset, Preset::Strict);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_ms, 0);
    }
}
