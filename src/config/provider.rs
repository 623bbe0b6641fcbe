//! Configuration providers.
//!
//! A run asks its provider for a [`RunConfig`] exactly once, at the start of
//! the run. Whether that reads the file again or reuses an earlier load is
//! decided by the provider, not by the caller.

use crate::config::{ConfigError, RunConfig, load_config};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Source of the configuration for each aggregation run.
pub trait ConfigProvider: Send + Sync {
    /// Produce the configuration for one run.
    fn load(&self) -> Result<Arc<RunConfig>, ConfigError>;
}

/// How often the configuration file is re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Read and validate the file for every run.
    Always,
    /// Reuse a successful load for the given duration.
    Ttl(Duration),
}

/// Build a file-backed provider with the given freshness policy.
pub fn file_provider(path: impl Into<PathBuf>, freshness: Freshness) -> Arc<dyn ConfigProvider> {
    let provider = FileConfigProvider::new(path);
    match freshness {
        Freshness::Always => Arc::new(provider),
        Freshness::Ttl(ttl) => Arc::new(CachedConfigProvider::new(provider, ttl)),
    }
}

/// Reads the configuration file on every call.
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    /// Create a provider for the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for FileConfigProvider {
    fn load(&self) -> Result<Arc<RunConfig>, ConfigError> {
        debug!(path = %self.path.display(), "loading configuration");
        load_config(&self.path).map(Arc::new)
    }
}

/// Caches successful loads of another provider for a fixed TTL.
///
/// Failed loads are never cached; the next call tries again.
pub struct CachedConfigProvider<P> {
    inner: P,
    ttl: Duration,
    cached: Mutex<Option<(Instant, Arc<RunConfig>)>>,
}

impl<P: ConfigProvider> CachedConfigProvider<P> {
    /// Wrap `inner`, keeping each successful load for `ttl`.
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }
}

impl<P: ConfigProvider> ConfigProvider for CachedConfigProvider<P> {
    fn load(&self) -> Result<Arc<RunConfig>, ConfigError> {
        let mut cached = self.cached.lock();

        if let Some((loaded_at, config)) = cached.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(config));
            }
        }

        let config = self.inner.load()?;
        *cached = Some((Instant::now(), Arc::clone(&config)));
        Ok(config)
    }
}

/// Always hands out the same configuration.
pub struct StaticConfigProvider {
    config: Arc<RunConfig>,
}

impl StaticConfigProvider {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn load(&self) -> Result<Arc<RunConfig>, ConfigError> {
        Ok(Arc::clone(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, validate_config};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ConfigProvider for CountingProvider {
        fn load(&self) -> Result<Arc<RunConfig>, ConfigError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConfigError::ValidationError("broken".to_string()));
            }
            Ok(Arc::new(validate_config(&AppConfig::default()).unwrap()))
        }
    }

    fn counting(fail: bool) -> CountingProvider {
        CountingProvider {
            calls: AtomicUsize::new(0),
            fail,
        }
    }

    #[test]
    fn test_cached_provider_reuses_within_ttl() {
        let provider = CachedConfigProvider::new(counting(false), Duration::from_secs(60));
        let first = provider.load().unwrap();
        let second = provider.load().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cached_provider_expires() {
        let provider = CachedConfigProvider::new(counting(false), Duration::ZERO);
        provider.load().unwrap();
        provider.load().unwrap();
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cached_provider_does_not_cache_errors() {
        let provider = CachedConfigProvider::new(counting(true), Duration::from_secs(60));
        assert!(provider.load().is_err());
        assert!(provider.load().is_err());
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_file_provider_rereads() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(b"ConcurrentRequests: 2\n").unwrap();
        file.flush().unwrap();

        let provider = FileConfigProvider::new(file.path());
        assert_eq!(provider.load().unwrap().probe.concurrency, 2);

        std::fs::write(file.path(), "ConcurrentRequests: 5\n").unwrap();
        assert_eq!(provider.load().unwrap().probe.concurrency, 5);
    }

    #[test]
    fn test_static_provider() {
        let provider = StaticConfigProvider::new(validate_config(&AppConfig::default()).unwrap());
        let first = provider.load().unwrap();
        let second = provider.load().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
