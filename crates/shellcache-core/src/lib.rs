//! Offline-first cache worker for installable web apps.
//!
//! shellcache mediates the network traffic a host app issues against its
//! own origin. Requests are answered from a durable, generation-versioned
//! cache with background revalidation (stale-while-revalidate); when the
//! network is unavailable, navigations fall back to the cached app shell
//! and asset fetches to a synthetic offline response. Bumping the
//! generation tag in the configuration invalidates every cached entry at
//! the next activation.
//!
//! The worker runs through two phases before serving: `install` fetches
//! and commits the precache set, `activate` deletes stale generations.
//! Cross-origin requests are never intercepted.
//!
//! ```no_run
//! use shellcache_core::{CacheWorker, DiskStore, FetchRequest, HttpFetcher, WorkerConfig};
//! use url::Url;
//!
//! # async fn run() -> Result<(), shellcache_core::WorkerError> {
//! let config = WorkerConfig::new(Url::parse("https://app.example.com").unwrap());
//! let store = DiskStore::new(config.store_root()?)?;
//! let mut worker = CacheWorker::new(config, store, HttpFetcher::new()?);
//!
//! worker.install().await?;
//! worker.activate().await?;
//!
//! let request = FetchRequest::navigate(Url::parse("https://app.example.com/").unwrap());
//! let decision = worker.handle_fetch(&request).await;
//! # let _ = decision;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod net;
pub mod policy;
pub mod store;
pub mod worker;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use net::{FetchedResponse, Fetcher, HttpFetcher};
pub use policy::{same_origin, AssetPolicy, FetchRequest, RequestKey, RequestMode, ServedFrom};
pub use store::{CacheStore, DiskStore, MemoryStore, StoredResponse};
pub use worker::{CacheWorker, FetchDecision, WorkerState};
