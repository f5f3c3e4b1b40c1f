//! Request identity and the per-request serving policy primitives.
//!
//! This module holds the pure pieces of the serving policy: how a request
//! is identified in the cache, which origin it belongs to, whether it is
//! a navigation, and whether a freshly fetched response is eligible for
//! runtime caching.

use std::fmt;

use sha2::{Digest, Sha256};
use url::Url;

/// Path suffixes always eligible for runtime caching, regardless of
/// directory.
const STATIC_EXTENSIONS: &[&str] = &[".js", ".css", ".woff2"];

/// Directory (relative to the base path) holding build-output assets.
const BUILD_ASSET_DIR: &str = "_next";

/// Directory (relative to the base path) holding icon assets.
const ICON_ASSET_DIR: &str = "icons";

// ============================================================================
// Requests
// ============================================================================

/// How a request intends to use the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Loading a new document.
    Navigate,
    /// Sub-resource fetch (asset or API call).
    #[default]
    SubResource,
}

/// A request as issued by a host page.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
}

impl FetchRequest {
    /// A plain GET sub-resource request.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            mode: RequestMode::SubResource,
        }
    }

    /// A GET request loading a new document.
    pub fn navigate(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            mode: RequestMode::Navigate,
        }
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// The cache identity of this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Identity of a request in the cache: method plus full URL, query
/// included (`/` and `/?source=installed` are distinct entries).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// Rebuild a key from its stored parts.
    pub fn from_parts(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Filename-safe digest of this identity, stable across restarts.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Whether two URLs share a scheme/host/port origin.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

// ============================================================================
// Runtime caching predicate
// ============================================================================

/// Decides whether a freshly fetched successful response may be stored.
///
/// Only recognized static-asset paths are persisted: build-output assets,
/// icon assets, and files with known static extensions. Everything else
/// is returned to the caller without being stored.
#[derive(Debug, Clone)]
pub struct AssetPolicy {
    build_prefix: String,
    icon_prefix: String,
}

impl AssetPolicy {
    pub fn new(base_path: &str) -> Self {
        let base = base_path.trim_end_matches('/');
        Self {
            build_prefix: format!("{}/{}/", base, BUILD_ASSET_DIR),
            icon_prefix: format!("{}/{}/", base, ICON_ASSET_DIR),
        }
    }

    /// Whether a 200 response for this request is eligible for storage.
    pub fn is_cacheable(&self, method: &str, url: &Url) -> bool {
        if !method.eq_ignore_ascii_case("GET") {
            return false;
        }
        let path = url.path();
        path.starts_with(&self.build_prefix)
            || path.starts_with(&self.icon_prefix)
            || STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }
}

// ============================================================================
// Serving outcome
// ============================================================================

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    /// Cache hit; a background revalidation was fired.
    Cache,
    /// Live network response.
    Network,
    /// Cached app shell served in place of a failed navigation.
    Shell,
    /// Synthetic offline response.
    Offline,
}

impl fmt::Display for ServedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "CACHE"),
            Self::Network => write!(f, "NETWORK"),
            Self::Shell => write!(f, "SHELL"),
            Self::Offline => write!(f, "OFFLINE"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_same_origin() {
        let origin = url("https://app.example.com");
        assert!(same_origin(&origin, &url("https://app.example.com/x/page")));
        assert!(!same_origin(&origin, &url("https://api.example.com/x")));
        assert!(!same_origin(&origin, &url("http://app.example.com/x")));
        assert!(!same_origin(&origin, &url("https://app.example.com:8443/x")));
    }

    #[test]
    fn test_request_key_identity() {
        let a = RequestKey::new("get", &url("https://x.test/a?source=qr"));
        let b = RequestKey::from_parts("GET", "https://x.test/a?source=qr");
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());

        // Query strings distinguish entries
        let c = RequestKey::new("GET", &url("https://x.test/a"));
        assert_ne!(a, c);
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_asset_policy_matches_static_paths() {
        let policy = AssetPolicy::new("/app");
        assert!(policy.is_cacheable("GET", &url("https://x.test/app/_next/static/chunk.js")));
        assert!(policy.is_cacheable("GET", &url("https://x.test/app/icons/icon-192.png")));
        assert!(policy.is_cacheable("GET", &url("https://x.test/app/main.js")));
        assert!(policy.is_cacheable("GET", &url("https://x.test/styles/site.css")));
        assert!(policy.is_cacheable("GET", &url("https://x.test/fonts/inter.woff2")));
    }

    #[test]
    fn test_asset_policy_rejects_other_paths() {
        let policy = AssetPolicy::new("/app");
        assert!(!policy.is_cacheable("GET", &url("https://x.test/app/api/weather")));
        assert!(!policy.is_cacheable("GET", &url("https://x.test/app/")));
        assert!(!policy.is_cacheable("GET", &url("https://x.test/app/manifest.json")));
        // Directory match is anchored at the base path
        assert!(!policy.is_cacheable("GET", &url("https://x.test/other/_next/chunk.bin")));
        // Non-GET is never stored
        assert!(!policy.is_cacheable("POST", &url("https://x.test/app/main.js")));
    }

    #[test]
    fn test_asset_policy_root_base() {
        let policy = AssetPolicy::new("/");
        assert!(policy.is_cacheable("GET", &url("https://x.test/_next/static/chunk.js")));
        assert!(policy.is_cacheable("GET", &url("https://x.test/icons/icon-512.png")));
        assert!(!policy.is_cacheable("GET", &url("https://x.test/api/data")));
    }

    #[test]
    fn test_navigation_mode() {
        let nav = FetchRequest::navigate(url("https://x.test/app/"));
        let sub = FetchRequest::get(url("https://x.test/app/main.js"));
        assert!(nav.is_navigation());
        assert!(!sub.is_navigation());
    }
}
