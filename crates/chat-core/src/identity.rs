//! Email normalization
//!
//! Turns a user-facing email address into the key used for that user's
//! subtree in the document store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical, path-safe form of a user's email.
///
/// Lowercase, with every `.` and `@` replaced by `-`. Two emails that differ
/// only by case map to the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

impl CanonicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CanonicalId {
    fn from(raw: &str) -> Self {
        canonicalize(raw)
    }
}

/// Normalize a raw email into its storage key.
///
/// Pure and idempotent: `canonicalize(canonicalize(a).as_str()) == canonicalize(a)`.
/// No validation is done here; malformed addresses are rejected at sign-up.
pub fn canonicalize(raw: &str) -> CanonicalId {
    let safe = raw
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '.' | '@' => '-',
            other => other,
        })
        .collect();
    CanonicalId(safe)
}
