//! Durable on-disk cache store.
//!
//! Layout: one directory per generation under the store root. Each entry
//! is a metadata JSON document plus a sibling body file, both named by
//! the SHA-256 digest of the request identity:
//!
//! ```text
//! <root>/<generation>/<digest>.json   status, headers, identity, stored_at
//! <root>/<generation>/<digest>.body   raw response bytes
//! ```
//!
//! Writes go through a temp file and a rename; the metadata rename is
//! the commit point for a put.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WorkerError;
use crate::policy::RequestKey;
use crate::store::{CacheStore, StoredResponse};

/// Suffix of entry metadata files
const META_SUFFIX: &str = "json";

/// Suffix of entry body files
const BODY_SUFFIX: &str = "body";

/// Prefix of the staging directory used by `replace_generation`
const STAGING_PREFIX: &str = ".staging-";

/// Metadata persisted beside each body file. Carries the request
/// identity so `keys` can be rebuilt from a directory listing alone.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: PathBuf) -> Result<Self, WorkerError> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, generation: &str) -> Result<PathBuf, WorkerError> {
        validate_generation(generation)?;
        Ok(self.root.join(generation))
    }

    fn write_entry(
        dir: &Path,
        key: &RequestKey,
        response: &StoredResponse,
    ) -> Result<(), WorkerError> {
        let digest = key.digest();
        let meta = EntryMeta {
            method: key.method().to_string(),
            url: key.url().to_string(),
            status: response.status,
            headers: response.headers.clone(),
            stored_at: response.stored_at,
        };

        // Body first, then metadata: a visible metadata file always has
        // its body beside it.
        write_atomic(
            &dir.join(format!("{}.{}", digest, BODY_SUFFIX)),
            &response.body,
        )?;
        write_atomic(
            &dir.join(format!("{}.{}", digest, META_SUFFIX)),
            serde_json::to_string_pretty(&meta)?.as_bytes(),
        )?;
        Ok(())
    }

    fn read_entry(dir: &Path, digest: &str) -> Result<Option<StoredResponse>, WorkerError> {
        let meta_path = dir.join(format!("{}.{}", digest, META_SUFFIX));
        if !meta_path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&meta_path)?;
        let meta: EntryMeta = serde_json::from_str(&contents)?;

        let body_path = dir.join(format!("{}.{}", digest, BODY_SUFFIX));
        let body = match fs::read(&body_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Metadata without a body: lost to a racing overwrite or a
                // partial write. Treat as a miss; the next fetch heals it.
                debug!(path = %body_path.display(), "Cache entry body missing, treating as miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(StoredResponse {
            status: meta.status,
            headers: meta.headers,
            body,
            stored_at: meta.stored_at,
        }))
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn get(
        &self,
        generation: &str,
        key: &RequestKey,
    ) -> Result<Option<StoredResponse>, WorkerError> {
        let dir = self.generation_dir(generation)?;
        if !dir.exists() {
            return Ok(None);
        }
        Self::read_entry(&dir, &key.digest())
    }

    async fn put(
        &self,
        generation: &str,
        key: &RequestKey,
        response: &StoredResponse,
    ) -> Result<(), WorkerError> {
        let dir = self.generation_dir(generation)?;
        fs::create_dir_all(&dir)?;
        Self::write_entry(&dir, key, response)
    }

    async fn keys(&self, generation: &str) -> Result<Vec<RequestKey>, WorkerError> {
        let dir = self.generation_dir(generation)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_SUFFIX) {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            let meta: EntryMeta = serde_json::from_str(&contents)?;
            keys.push(RequestKey::from_parts(&meta.method, &meta.url));
        }
        keys.sort_by(|a, b| a.url().cmp(b.url()));
        Ok(keys)
    }

    async fn generations(&self) -> Result<Vec<String>, WorkerError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool, WorkerError> {
        let dir = self.generation_dir(generation)?;
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        Ok(true)
    }

    async fn replace_generation(
        &self,
        generation: &str,
        entries: &[(RequestKey, StoredResponse)],
    ) -> Result<(), WorkerError> {
        let dir = self.generation_dir(generation)?;
        let staging = self.root.join(format!("{}{}", STAGING_PREFIX, generation));

        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        for (key, response) in entries {
            Self::write_entry(&staging, key, response)?;
        }

        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::rename(&staging, &dir)?;
        Ok(())
    }
}

/// Generation names become directory names; reject anything that could
/// escape the store root.
fn validate_generation(generation: &str) -> Result<(), WorkerError> {
    if generation.is_empty()
        || generation.starts_with('.')
        || generation.contains('/')
        || generation.contains('\\')
    {
        return Err(WorkerError::Config(format!(
            "Invalid generation name: {:?}",
            generation
        )));
    }
    Ok(())
}

/// Write through a temp file and a rename so readers never observe a
/// partial file.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), WorkerError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    if let Err(e) = fs::rename(&tmp, path) {
        // Rename-over-existing can fail on some platforms; clear the
        // destination and retry once.
        if path.exists() {
            fs::remove_file(path)?;
            fs::rename(&tmp, path)?;
        } else {
            return Err(e.into());
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
