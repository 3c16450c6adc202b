//! Type-safe identifier wrappers.
//!
//! Row identifiers are UUID v7 (time-ordered) so that the primary key index
//! stays append-friendly. Business keys, tenant IDs, and actor IDs are
//! strings: they are supplied by callers (`case-1`, `fh-42`) and only
//! generated here when the caller does not provide one.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generates a newtype wrapper around a caller-supplied [`String`] key.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an existing key.
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Borrow the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`].
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the key is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }
    };
}

define_id! {
    /// Unique identifier for one version row of a versioned record.
    RecordId
}

define_key! {
    /// Stable identifier shared by every version of one logical record.
    BusinessKey
}

define_key! {
    /// Identifier of a tenant (one funeral home or group).
    TenantId
}

define_key! {
    /// Identifier of the user or system process that performed a write.
    ActorId
}

impl BusinessKey {
    /// Generate a fresh business key from a UUID v7.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl ActorId {
    /// The actor recorded for writes performed by the platform itself.
    pub fn system() -> Self {
        Self::new("system")
    }
}
