//! In-memory cache store for tests and non-persistent embedders.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::policy::RequestKey;
use crate::store::{CacheStore, StoredResponse};

/// Entries are keyed by the request digest inside each generation map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    generations: RwLock<HashMap<String, HashMap<String, (RequestKey, StoredResponse)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(
        &self,
        generation: &str,
        key: &RequestKey,
    ) -> Result<Option<StoredResponse>, WorkerError> {
        let generations = self.generations.read().expect("store lock poisoned");
        Ok(generations
            .get(generation)
            .and_then(|entries| entries.get(&key.digest()))
            .map(|(_, response)| response.clone()))
    }

    async fn put(
        &self,
        generation: &str,
        key: &RequestKey,
        response: &StoredResponse,
    ) -> Result<(), WorkerError> {
        let mut generations = self.generations.write().expect("store lock poisoned");
        generations
            .entry(generation.to_string())
            .or_default()
            .insert(key.digest(), (key.clone(), response.clone()));
        Ok(())
    }

    async fn keys(&self, generation: &str) -> Result<Vec<RequestKey>, WorkerError> {
        let generations = self.generations.read().expect("store lock poisoned");
        let mut keys: Vec<RequestKey> = generations
            .get(generation)
            .map(|entries| entries.values().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default();
        keys.sort_by(|a, b| a.url().cmp(b.url()));
        Ok(keys)
    }

    async fn generations(&self) -> Result<Vec<String>, WorkerError> {
        let generations = self.generations.read().expect("store lock poisoned");
        let mut names: Vec<String> = generations.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool, WorkerError> {
        let mut generations = self.generations.write().expect("store lock poisoned");
        Ok(generations.remove(generation).is_some())
    }

    async fn replace_generation(
        &self,
        generation: &str,
        entries: &[(RequestKey, StoredResponse)],
    ) -> Result<(), WorkerError> {
        let staged: HashMap<String, (RequestKey, StoredResponse)> = entries
            .iter()
            .map(|(key, response)| (key.digest(), (key.clone(), response.clone())))
            .collect();
        let mut generations = self.generations.write().expect("store lock poisoned");
        generations.insert(generation.to_string(), staged);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str) -> RequestKey {
        RequestKey::from_parts("GET", url)
    }

    #[tokio::test]
    async fn test_round_trip_and_generations() {
        let store = MemoryStore::new();
        let key = key("https://x.test/a");
        let response = StoredResponse::new(200, Vec::new(), b"a".to_vec());

        store.put("v1", &key, &response).await.unwrap();
        assert_eq!(store.get("v1", &key).await.unwrap().unwrap().body, b"a");
        assert!(store.get("v2", &key).await.unwrap().is_none());
        assert_eq!(store.generations().await.unwrap(), vec!["v1"]);

        assert!(store.delete_generation("v1").await.unwrap());
        assert!(store.generations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_generation_drops_prior_entries() {
        let store = MemoryStore::new();
        let old = key("https://x.test/old");
        store
            .put("v1", &old, &StoredResponse::new(200, Vec::new(), b"old".to_vec()))
            .await
            .unwrap();

        let fresh = vec![(
            key("https://x.test/new"),
            StoredResponse::new(200, Vec::new(), b"new".to_vec()),
        )];
        store.replace_generation("v1", &fresh).await.unwrap();

        assert!(store.get("v1", &old).await.unwrap().is_none());
        assert_eq!(store.keys("v1").await.unwrap().len(), 1);
    }
}
