//! Core scalar types shared across the gateway.

use std::fmt;

/// Opaque credential key, e.g. `sk-default` or the admin key.
///
/// Newtype instead of a bare `String` so call sites can't accidentally pass a
/// model id or request id where a credential is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CredentialKey(pub String);

impl CredentialKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CredentialKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CredentialKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable model identifier, e.g. `gpt-4o`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ModelId(pub String);

impl ModelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Generate a new request id.
///
/// ULIDs are lexicographically sortable on creation time, which makes
/// request logs sortable by id without a separate timestamp index.
pub fn new_request_id() -> String {
    ulid::Ulid::new().to_string()
}
