//! Repository providers
//!
//! A provider recognizes resource URLs for one hosting service and knows how
//! to turn a `(url, version)` pair into a fetchable archive URL. Providers
//! are registered in fixed priority order; the first one that identifies a
//! URL wins. Adding a host means registering one more implementation.

/// Capability interface for one hosting service.
pub trait Provider: Send + Sync {
    /// Whether this provider can serve the given resource URL.
    fn identify(&self, url: &str) -> bool;

    /// Archive URL for the given version; each provider defines its own
    /// token for the head revision (version `*`).
    fn zip_url(&self, url: &str, version: &str) -> String;
}

/// GitHub-style hosting: `/archive/<ref>.zip` download URLs.
pub struct GitHub;

impl Provider for GitHub {
    fn identify(&self, url: &str) -> bool {
        host_of(url).is_some_and(|h| h == "github.com" || h == "www.github.com")
    }

    fn zip_url(&self, url: &str, version: &str) -> String {
        let base = url.trim_end_matches('/').trim_end_matches(".git");
        if version == "*" || version.is_empty() {
            format!("{base}/archive/HEAD.zip")
        } else {
            format!("{base}/archive/refs/tags/{version}.zip")
        }
    }
}

/// Bitbucket-style hosting: `/get/<ref>.zip` download URLs.
pub struct Bitbucket;

impl Provider for Bitbucket {
    fn identify(&self, url: &str) -> bool {
        host_of(url).is_some_and(|h| h == "bitbucket.org" || h == "www.bitbucket.org")
    }

    fn zip_url(&self, url: &str, version: &str) -> String {
        let base = url.trim_end_matches('/').trim_end_matches(".git");
        if version == "*" || version.is_empty() {
            format!("{base}/get/master.zip")
        } else {
            format!("{base}/get/{version}.zip")
        }
    }
}

/// Providers in fixed, explicit priority order.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderRegistry {
    /// Registry with no providers; mainly for tests.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Registry with the built-in hosting providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(GitHub));
        registry.register(Box::new(Bitbucket));
        registry
    }

    pub fn register(&mut self, provider: Box<dyn Provider>) {
        self.providers.push(provider);
    }

    /// First registered provider identifying the URL, if any.
    pub fn find(&self, url: &str) -> Option<&dyn Provider> {
        self.providers
            .iter()
            .map(Box::as_ref)
            .find(|p| p.identify(url))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Host portion of a URL, lowercased; credentials and port stripped.
pub fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '#'].as_slice()).next()?;
    let host = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}
