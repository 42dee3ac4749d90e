//! Strongly-typed identifiers for domain entities.
//!
//! Two families of identifiers exist:
//! - Locally minted ids ([`TaskId`]) wrap a ULID and display with a prefix.
//! - Document keys ([`NodeId`], [`EdgeId`], [`WorkflowId`], [`FolderId`]) wrap an
//!   opaque string. They may be assigned by a remote store or come from an older
//!   persisted document, so any non-empty string is accepted and preserved as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid_str = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }
    };
}

/// Macro to generate an opaque string key with a generator for fresh values.
macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing key without validation.
            #[must_use]
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Generates a fresh key using the type's default prefix.
            #[must_use]
            pub fn generate() -> Self {
                Self::generate_with_prefix($prefix)
            }

            /// Generates a fresh key of the form `{prefix}-{ulid}`.
            #[must_use]
            pub fn generate_with_prefix(prefix: &str) -> Self {
                Self(format!("{prefix}-{}", Ulid::new().to_string().to_lowercase()))
            }

            /// Returns the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        id_type: stringify!($name),
                        reason: "key must not be empty".to_string(),
                    });
                }
                Ok(Self(trimmed.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self::new(key)
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }
    };
}

define_id!(
    /// Unique identifier for one run attempt of a node.
    TaskId,
    "task"
);

define_key!(
    /// Identifier of a node within a workflow graph.
    NodeId,
    "node"
);

define_key!(
    /// Identifier of an edge within a workflow graph.
    EdgeId,
    "edge"
);

define_key!(
    /// Identifier of a persisted workflow, assigned by the remote store.
    WorkflowId,
    "wf"
);

define_key!(
    /// Identifier of a folder in the remote store.
    FolderId,
    "folder"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_display_format() {
        let id = TaskId::new();
        assert!(id.to_string().starts_with("task_"));
    }

    #[test]
    fn task_id_parse_with_and_without_prefix() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);

        let raw: TaskId = id.as_ulid().to_string().parse().expect("should parse");
        assert_eq!(id, raw);
    }

    #[test]
    fn task_id_parse_invalid() {
        let err = "task_nope".parse::<TaskId>().unwrap_err();
        assert_eq!(err.id_type, "TaskId");
    }

    #[test]
    fn keys_preserve_arbitrary_strings() {
        let id = NodeId::new("text-1");
        assert_eq!(id.as_str(), "text-1");
        assert_eq!(id.to_string(), "text-1");
    }

    #[test]
    fn generated_keys_are_prefixed_and_unique() {
        let a = NodeId::generate_with_prefix("llm");
        let b = NodeId::generate_with_prefix("llm");
        assert!(a.as_str().starts_with("llm-"));
        assert_ne!(a, b);
        assert!(EdgeId::generate().as_str().starts_with("edge-"));
    }

    #[test]
    fn empty_key_rejected() {
        let err = "  ".parse::<WorkflowId>().unwrap_err();
        assert_eq!(err.id_type, "WorkflowId");
    }

    #[test]
    fn key_serde_is_transparent() {
        let id = EdgeId::new("e1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"e1\"");
        let parsed: EdgeId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
