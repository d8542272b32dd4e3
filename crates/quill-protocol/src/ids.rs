//! Typed ID and revision-token types for the Quill engine.
//!
//! IDs are opaque String wrappers (serde-transparent). Backends are free to
//! choose their own generation scheme; the engine only requires String.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Create a new random ID (UUID v4).
            pub fn new_uuid() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new_uuid()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Unique identifier for a document.
    DocumentId
);
typed_id!(
    /// Unique identifier for an AI edit session.
    SessionId
);
typed_id!(
    /// Unique identifier for a ledger edit record.
    EditId
);
typed_id!(
    /// Identifier linking a session to the conversation turn that opened it.
    TurnId
);

/// Opaque revision token for optimistic concurrency control.
///
/// A fresh token is minted on every accepted write that touches the AI
/// draft; clients echo the token captured at their last hydration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Mint a fresh token.
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self::fresh()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Revision {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_new_is_unique() {
        let a = DocumentId::new_uuid();
        let b = DocumentId::new_uuid();
        assert_ne!(a, b);
    }

    #[test]
    fn session_id_from_string() {
        let id = SessionId::from_string("sess-1");
        assert_eq!(id.as_str(), "sess-1");
        assert_eq!(id.to_string(), "sess-1");
    }

    #[test]
    fn typed_id_serde_roundtrip() {
        let id = EditId::from_string("E001");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"E001\"");
        let back: EditId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn revision_fresh_is_unique() {
        assert_ne!(Revision::fresh(), Revision::fresh());
    }

    #[test]
    fn revision_serde_is_transparent() {
        let rev = Revision::from_string("r-42");
        let json = serde_json::to_string(&rev).unwrap();
        assert_eq!(json, "\"r-42\"");
        let back: Revision = serde_json::from_str(&json).unwrap();
        assert_eq!(rev, back);
    }
}
