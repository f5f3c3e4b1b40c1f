//! Generation-scoped cache storage.
//!
//! The store maps request identities to stored responses inside named
//! cache generations. Exactly one generation is current at a time; the
//! others are stale and get deleted at activation. The `CacheStore`
//! trait is the seam between the worker and its storage: `DiskStore` is
//! the durable production backend, `MemoryStore` backs tests and
//! embedders that do not want persistence.

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::WorkerError;
use crate::policy::RequestKey;

/// A response held in the cache: status, headers, body bytes, and the
/// time it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at: Utc::now(),
        }
    }

    /// The synthetic response returned when the network is down and no
    /// cached fallback exists.
    pub fn offline() -> Self {
        Self::new(
            503,
            vec![("content-type".to_string(), "text/plain".to_string())],
            b"Offline".to_vec(),
        )
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.stored_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 0 {
            // Handle clock skew gracefully
            "just now".to_string()
        } else if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                // Round up: 1d 12h+ becomes 2d
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Durable key/value blob store scoped to a set of cache generations.
///
/// Shared across all concurrent request handlers and across worker
/// restarts. Implementations must provide atomic per-key put/get; no
/// further locking is required of callers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry in a generation.
    async fn get(
        &self,
        generation: &str,
        key: &RequestKey,
    ) -> Result<Option<StoredResponse>, WorkerError>;

    /// Write or overwrite an entry. Overwrites replace the prior value
    /// atomically from the caller's perspective.
    async fn put(
        &self,
        generation: &str,
        key: &RequestKey,
        response: &StoredResponse,
    ) -> Result<(), WorkerError>;

    /// Every request identity present in a generation.
    async fn keys(&self, generation: &str) -> Result<Vec<RequestKey>, WorkerError>;

    /// Names of every generation present, sorted.
    async fn generations(&self) -> Result<Vec<String>, WorkerError>;

    /// Delete a whole generation. Returns whether it existed.
    async fn delete_generation(&self, generation: &str) -> Result<bool, WorkerError>;

    /// Replace a generation with the given entries in one commit. Either
    /// all entries become visible under the generation or none do.
    async fn replace_generation(
        &self,
        generation: &str,
        entries: &[(RequestKey, StoredResponse)],
    ) -> Result<(), WorkerError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_offline_response_shape() {
        let response = StoredResponse::offline();
        assert_eq!(response.status, 503);
        assert_eq!(response.body, b"Offline");
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = StoredResponse::new(
            200,
            vec![("X-Build".to_string(), "42".to_string())],
            Vec::new(),
        );
        assert_eq!(response.header("x-build"), Some("42"));
        assert_eq!(response.header("x-missing"), None);
    }

    #[test]
    fn test_age_display_just_now() {
        let response = StoredResponse::new(200, Vec::new(), Vec::new());
        assert_eq!(response.age_display(), "just now");
    }

    #[test]
    fn test_age_display_rounding() {
        let mut response = StoredResponse::new(200, Vec::new(), Vec::new());
        response.stored_at = Utc::now() - Duration::minutes(5);
        assert_eq!(response.age_display(), "5m ago");

        response.stored_at = Utc::now() - Duration::minutes(95);
        assert_eq!(response.age_display(), "2h ago");

        response.stored_at = Utc::now() - Duration::days(3);
        assert_eq!(response.age_display(), "3d ago");
    }
}
