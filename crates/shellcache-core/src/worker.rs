//! Worker lifecycle and the per-request serving policy.
//!
//! The `CacheWorker` mediates all same-origin traffic for the host app.
//! Its life runs in two phases before it serves anything: install
//! populates the current cache generation with the precache set, and
//! activation deletes every stale generation. Once active, each request
//! is answered from cache with a background revalidation, or fetched
//! live and conditionally stored, or converted into an offline fallback.
//! No failure on the serving path ever reaches the caller as an error.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::net::Fetcher;
use crate::policy::{same_origin, AssetPolicy, FetchRequest, RequestKey, ServedFrom};
use crate::store::{CacheStore, StoredResponse};

/// Maximum concurrent precache fetches at install time.
/// The manifest is small; 4 parallel fetches keeps install snappy
/// without hammering the origin.
const MAX_PRECACHE_CONCURRENCY: usize = 4;

/// Worker lifecycle states. Only `Active` serves fetch traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Freshly constructed; the current generation may or may not exist.
    New,
    /// Install completed; the current generation is populated.
    Installed,
    /// Activation completed; stale generations are gone and fetches are
    /// being served.
    Active,
}

/// Outcome of handing a request to the worker.
#[derive(Debug)]
pub enum FetchDecision {
    /// Not intercepted; the caller goes to the network itself.
    PassThrough,
    /// A response, tagged with where it came from.
    Served {
        response: StoredResponse,
        source: ServedFrom,
    },
}

pub struct CacheWorker<S, F> {
    config: WorkerConfig,
    policy: AssetPolicy,
    store: Arc<S>,
    fetcher: Arc<F>,
    state: WorkerState,
    revalidations: Mutex<JoinSet<()>>,
}

impl<S, F> CacheWorker<S, F>
where
    S: CacheStore + 'static,
    F: Fetcher + 'static,
{
    pub fn new(config: WorkerConfig, store: S, fetcher: F) -> Self {
        let policy = config.asset_policy();
        Self {
            config,
            policy,
            store: Arc::new(store),
            fetcher: Arc::new(fetcher),
            state: WorkerState::New,
            revalidations: Mutex::new(JoinSet::new()),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == WorkerState::Active
    }

    pub fn generation(&self) -> &str {
        &self.config.generation
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Install phase: fetch the precache set and commit it to the
    /// current generation.
    ///
    /// All-or-nothing: every manifest entry is fetched first, and only a
    /// fully successful batch is committed. A failed install leaves the
    /// store untouched. There is no waiting period; the worker is
    /// immediately eligible for activation.
    pub async fn install(&mut self) -> Result<(), WorkerError> {
        let urls = self.config.precache_urls()?;
        info!(
            generation = %self.config.generation,
            count = urls.len(),
            "Installing precache set"
        );

        let fetcher = Arc::clone(&self.fetcher);
        let entries: Vec<(RequestKey, StoredResponse)> = stream::iter(urls)
            .map(|url| {
                let fetcher = Arc::clone(&fetcher);
                async move {
                    let request = FetchRequest::get(url.clone());
                    match fetcher.fetch(&request).await {
                        Ok(fetched) if fetched.is_ok() => {
                            Ok((request.key(), StoredResponse::from(fetched)))
                        }
                        Ok(fetched) => Err(WorkerError::Precache {
                            url: url.to_string(),
                            reason: format!("status {}", fetched.status),
                        }),
                        Err(e) => Err(WorkerError::Precache {
                            url: url.to_string(),
                            reason: e.to_string(),
                        }),
                    }
                }
            })
            .buffered(MAX_PRECACHE_CONCURRENCY)
            .try_collect()
            .await?;

        self.store
            .replace_generation(&self.config.generation, &entries)
            .await?;
        self.state = WorkerState::Installed;
        info!(generation = %self.config.generation, "Install complete");
        Ok(())
    }

    /// Activation phase: delete every generation other than the current
    /// one, then begin serving.
    ///
    /// Deletion completes before the worker reports active, so a stale
    /// store is never deleted out from under a generation being served.
    /// Idempotent: re-activation with no new generation deletes nothing.
    pub async fn activate(&mut self) -> Result<(), WorkerError> {
        let generations = self.store.generations().await?;
        if !generations.iter().any(|g| g == &self.config.generation) {
            return Err(WorkerError::State(format!(
                "generation {} is not installed",
                self.config.generation
            )));
        }

        for name in generations {
            if name != self.config.generation {
                info!(generation = %name, "Deleting stale cache generation");
                self.store.delete_generation(&name).await?;
            }
        }

        self.state = WorkerState::Active;
        info!(generation = %self.config.generation, "Worker active");
        Ok(())
    }

    // ========================================================================
    // Serving
    // ========================================================================

    /// Serve one request.
    ///
    /// Never returns an error: every path terminates in a valid
    /// (possibly synthetic) response or a pass-through decision.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> FetchDecision {
        if !same_origin(&self.config.origin, &request.url) {
            debug!(url = %request.url, "Cross-origin request, not intercepting");
            return FetchDecision::PassThrough;
        }

        if self.state != WorkerState::Active {
            warn!(url = %request.url, state = ?self.state, "Fetch before activation, not intercepting");
            return FetchDecision::PassThrough;
        }

        let key = request.key();

        // Store read errors degrade to the miss path; the cache heals
        // itself on the next successful fetch.
        let cached = match self.store.get(self.generation(), &key).await {
            Ok(entry) => entry,
            Err(e) => {
                debug!(url = %request.url, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        };

        if let Some(response) = cached {
            debug!(url = %request.url, "Cache hit");
            self.spawn_revalidation(request.clone(), key).await;
            return FetchDecision::Served {
                response,
                source: ServedFrom::Cache,
            };
        }

        self.fetch_and_maybe_store(request, key).await
    }

    /// Wait for every in-flight background revalidation to settle.
    ///
    /// Hosts call this before shutting the worker down; revalidations
    /// outlive the response they were spawned for, but not the worker.
    pub async fn await_revalidations(&self) {
        let mut tasks = self.revalidations.lock().await;
        while tasks.join_next().await.is_some() {}
    }

    /// Launch the stale-while-revalidate refresh for a request just
    /// served from cache. A 200 overwrites the entry; anything else is
    /// swallowed with no retry.
    async fn spawn_revalidation(&self, request: FetchRequest, key: RequestKey) {
        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(&self.store);
        let generation = self.config.generation.clone();

        let mut tasks = self.revalidations.lock().await;
        tasks.spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(fetched) if fetched.is_ok() => {
                    let response = StoredResponse::from(fetched);
                    if let Err(e) = store.put(&generation, &key, &response).await {
                        debug!(url = %request.url, error = %e, "Revalidation write failed");
                    } else {
                        debug!(url = %request.url, "Revalidated cache entry");
                    }
                }
                Ok(fetched) => {
                    debug!(
                        url = %request.url,
                        status = fetched.status,
                        "Revalidation returned non-200, keeping cached copy"
                    );
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Revalidation fetch failed");
                }
            }
        });

        // Reap already-finished tasks so the set stays small across a
        // long session.
        while tasks.try_join_next().is_some() {}
    }

    /// Miss path: fetch live, store a copy when the asset policy allows,
    /// and convert network failure into the offline fallback.
    async fn fetch_and_maybe_store(&self, request: &FetchRequest, key: RequestKey) -> FetchDecision {
        match self.fetcher.fetch(request).await {
            Ok(fetched) if fetched.is_ok() => {
                let response = StoredResponse::from(fetched);
                if self.policy.is_cacheable(&request.method, &request.url) {
                    // Write failures never fail the primary response path.
                    if let Err(e) = self.store.put(self.generation(), &key, &response).await {
                        warn!(url = %request.url, error = %e, "Cache write failed");
                    } else {
                        debug!(url = %request.url, "Stored fetched asset");
                    }
                }
                FetchDecision::Served {
                    response,
                    source: ServedFrom::Network,
                }
            }
            Ok(fetched) => {
                debug!(url = %request.url, status = fetched.status, "Non-200 response, returning unstored");
                FetchDecision::Served {
                    response: StoredResponse::from(fetched),
                    source: ServedFrom::Network,
                }
            }
            Err(e) => self.offline_fallback(request, e).await,
        }
    }

    /// Offline fallback: navigations get the cached app shell; anything
    /// else (and a navigation with no cached shell) gets a synthetic
    /// 503.
    async fn offline_fallback(&self, request: &FetchRequest, error: WorkerError) -> FetchDecision {
        debug!(url = %request.url, error = %error, "Live fetch failed, serving offline fallback");

        if request.is_navigation() {
            if let Ok(shell_url) = self.config.shell_url() {
                let shell_key = RequestKey::new("GET", &shell_url);
                match self.store.get(self.generation(), &shell_key).await {
                    Ok(Some(shell)) => {
                        info!(url = %request.url, "Serving cached shell for offline navigation");
                        return FetchDecision::Served {
                            response: shell,
                            source: ServedFrom::Shell,
                        };
                    }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "Shell lookup failed"),
                }
            }
            warn!(url = %request.url, "No cached shell for offline navigation");
        }

        FetchDecision::Served {
            response: StoredResponse::offline(),
            source: ServedFrom::Offline,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
