//! Worker configuration management.
//!
//! The configuration names the origin the worker mediates, the base path
//! the app is served under, the current cache generation tag, and the
//! precache manifest. The generation tag is the sole upgrade mechanism:
//! bumping it invalidates every previously cached entry at activation.
//!
//! Configuration is stored at `~/.config/shellcache/config.json`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::WorkerError;
use crate::policy::AssetPolicy;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default cache generation tag
const DEFAULT_GENERATION: &str = "shellcache-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Origin whose traffic the worker mediates. Requests to any other
    /// origin pass through untouched.
    pub origin: Url,
    /// Base path the app is served under. Use "/" for the root.
    pub base_path: String,
    /// Current cache generation tag.
    pub generation: String,
    /// Paths (relative to the origin) fetched and stored at install time.
    pub precache: Vec<String>,
    /// Override for the on-disk store root. Defaults to the user cache
    /// directory.
    pub store_root: Option<PathBuf>,
}

impl WorkerConfig {
    /// A configuration for the given origin with the default manifest.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            base_path: "/".to_string(),
            generation: DEFAULT_GENERATION.to_string(),
            precache: Self::default_precache("/"),
            store_root: None,
        }
    }

    /// Set the base path, rebuilding the precache manifest to match.
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.to_string();
        self.precache = Self::default_precache(base_path);
        self
    }

    /// The standard six-entry precache manifest for a base path: the root
    /// document and its install/QR entry variants, the manifest
    /// descriptor, and the two icon assets.
    pub fn default_precache(base_path: &str) -> Vec<String> {
        let base = base_path.trim_end_matches('/');
        vec![
            format!("{}/", base),
            format!("{}/?source=installed", base),
            format!("{}/?source=qr", base),
            format!("{}/manifest.json", base),
            format!("{}/icons/icon-192.png", base),
            format!("{}/icons/icon-512.png", base),
        ]
    }

    /// Load the saved configuration, if one exists.
    pub fn load() -> Result<Option<Self>, WorkerError> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save(&self) -> Result<(), WorkerError> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, WorkerError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| WorkerError::Config("Could not find config directory".to_string()))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Root directory of the on-disk cache store.
    pub fn store_root(&self) -> Result<PathBuf, WorkerError> {
        if let Some(ref root) = self.store_root {
            return Ok(root.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| WorkerError::Config("Could not find cache directory".to_string()))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// The precache manifest resolved against the origin, in manifest
    /// order.
    pub fn precache_urls(&self) -> Result<Vec<Url>, WorkerError> {
        self.precache
            .iter()
            .map(|path| self.origin.join(path).map_err(WorkerError::from))
            .collect()
    }

    /// Path of the app shell (the root document), with a trailing slash.
    pub fn shell_path(&self) -> String {
        let base = self.base_path.trim_end_matches('/');
        format!("{}/", base)
    }

    /// URL of the app shell served as the offline navigation fallback.
    pub fn shell_url(&self) -> Result<Url, WorkerError> {
        Ok(self.origin.join(&self.shell_path())?)
    }

    /// The runtime caching predicate for this base path.
    pub fn asset_policy(&self) -> AssetPolicy {
        AssetPolicy::new(&self.base_path)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(base: &str) -> WorkerConfig {
        WorkerConfig::new(Url::parse("https://app.example.com").unwrap()).with_base_path(base)
    }

    #[test]
    fn test_default_precache_has_six_entries() {
        let paths = WorkerConfig::default_precache("/x");
        assert_eq!(
            paths,
            vec![
                "/x/",
                "/x/?source=installed",
                "/x/?source=qr",
                "/x/manifest.json",
                "/x/icons/icon-192.png",
                "/x/icons/icon-512.png",
            ]
        );
    }

    #[test]
    fn test_precache_urls_resolve_against_origin() {
        let config = config_for("/x");
        let urls = config.precache_urls().unwrap();
        assert_eq!(urls.len(), 6);
        assert_eq!(urls[0].as_str(), "https://app.example.com/x/");
        assert_eq!(urls[1].as_str(), "https://app.example.com/x/?source=installed");
        assert_eq!(urls[3].as_str(), "https://app.example.com/x/manifest.json");
    }

    #[test]
    fn test_shell_path_normalizes_trailing_slash() {
        assert_eq!(config_for("/x").shell_path(), "/x/");
        assert_eq!(config_for("/x/").shell_path(), "/x/");
        assert_eq!(config_for("/").shell_path(), "/");
    }

    #[test]
    fn test_shell_url_for_root_base() {
        let config = WorkerConfig::new(Url::parse("https://app.example.com").unwrap());
        assert_eq!(config.shell_url().unwrap().as_str(), "https://app.example.com/");
    }
}
