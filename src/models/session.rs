//! Session token claims

use serde::{Deserialize, Serialize};

/// Claims carried by a session token.
///
/// Only the subject id and the validity window are encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (student or parent) id
    pub id: i64,
    /// Issued-at, unix seconds
    pub iat: i64,
    /// Expiry, unix seconds
    pub exp: i64,
}

impl Claims {
    /// Seconds until expiry relative to `now`; negative once expired
    pub fn seconds_left(&self, now: i64) -> i64 {
        self.exp - now
    }

    /// Whether an expired token may still be exchanged at `now`
    pub fn within_grace(&self, now: i64, grace_secs: i64) -> bool {
        self.exp + grace_secs > now
    }
}
