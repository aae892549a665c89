//! Active style resolution with an in-process TTL cache.

use crate::cache::TtlCache;
use crate::traits::StyleStore;
use chimera_core::constants::DEFAULT_STYLE_CACHE_TTL_SECS;
use chimera_core::{
    env_parse, ActiveStyle, ChimeraResult, Clock, StorageError, StyleBundle, StyleError,
    StyleVersion, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Configuration for the active-style cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleCacheConfig {
    /// How long a resolved style is served before re-querying (default: 5 minutes)
    pub ttl: Duration,
}

impl Default for StyleCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_STYLE_CACHE_TTL_SECS),
        }
    }
}

impl StyleCacheConfig {
    /// Create from `CHIMERA_STYLE_CACHE_TTL_SECS` (default: 300).
    pub fn from_env() -> Self {
        Self {
            ttl: Duration::from_secs(env_parse(
                "CHIMERA_STYLE_CACHE_TTL_SECS",
                DEFAULT_STYLE_CACHE_TTL_SECS,
            )),
        }
    }
}

/// Supplies the active style bundle to prompt builders.
///
/// Reads are served from a [`TtlCache`]; any operation that changes the
/// active version invalidates it before returning. When no version is active
/// or the store cannot be read, the built-in bundle is served (and cached).
pub struct StyleConfigProvider {
    store: Arc<dyn StyleStore>,
    cache: TtlCache<ActiveStyle>,
}

impl std::fmt::Debug for StyleConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleConfigProvider")
            .field("ttl", &self.cache.ttl())
            .finish()
    }
}

impl StyleConfigProvider {
    pub fn new(store: Arc<dyn StyleStore>, config: StyleCacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn StyleStore>,
        config: StyleCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache: TtlCache::new(config.ttl, clock),
        }
    }

    /// The style currently in effect.
    pub async fn get_active(&self) -> ActiveStyle {
        if let Some(style) = self.cache.get() {
            return style;
        }

        let generation = self.cache.generation();
        let style = match self.store.active_version().await {
            Ok(Some(version)) => ActiveStyle::from_version(&version),
            Ok(None) => {
                tracing::debug!("No active style version, using built-in style");
                ActiveStyle::builtin()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load active style, using built-in style");
                ActiveStyle::builtin()
            }
        };
        if !self.cache.set_if_current(style.clone(), generation) {
            tracing::debug!("Style changed during load, not caching");
        }
        style
    }

    /// Shorthand for the active bundle alone.
    pub async fn get_active_bundle(&self) -> StyleBundle {
        self.get_active().await.bundle
    }

    /// Drop the cached style so the next read hits the store.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    pub async fn list_versions(&self) -> ChimeraResult<Vec<StyleVersion>> {
        Ok(self.store.list_versions().await?)
    }

    /// Store a new, inactive version.
    pub async fn create_version(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        bundle: StyleBundle,
    ) -> ChimeraResult<StyleVersion> {
        let version = StyleVersion::new(name, description, bundle);
        self.store.insert_version(&version).await?;
        self.invalidate();
        tracing::info!(version_id = %version.id, name = %version.name, "Style version created");
        Ok(version)
    }

    /// Make `version_id` the only active version, then re-verify exclusivity.
    pub async fn set_active(&self, version_id: Uuid) -> ChimeraResult<()> {
        let result = self.store.activate(version_id).await;
        self.invalidate();
        match result {
            Ok(()) => {}
            Err(StorageError::NotFound { .. }) => {
                return Err(StyleError::VersionNotFound { version_id }.into())
            }
            Err(e) => return Err(e.into()),
        }
        self.verify_exclusive().await?;
        tracing::info!(version_id = %version_id, "Style version activated");
        Ok(())
    }

    /// Check that exactly one version is active.
    ///
    /// An empty store (nothing ever activated) also passes.
    pub async fn verify_exclusive(&self) -> ChimeraResult<()> {
        let active_count = self.store.count_active().await?;
        if active_count > 1 {
            tracing::error!(active_count, "Style exclusivity violated");
            return Err(StyleError::ExclusivityViolated { active_count }.into());
        }
        if active_count == 0 && !self.store.list_versions().await?.is_empty() {
            tracing::warn!("Style versions exist but none is active");
            return Err(StyleError::ExclusivityViolated { active_count }.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStyleStore;
    use chimera_core::{ChimeraError, ManualClock};

    fn provider() -> (StyleConfigProvider, Arc<MemoryStyleStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStyleStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let provider =
            StyleConfigProvider::with_clock(store.clone(), StyleCacheConfig::default(), clock.clone());
        (provider, store, clock)
    }

    fn bundle(base: &str) -> StyleBundle {
        let mut bundle = StyleBundle::default();
        bundle.image.base_prompt = base.to_string();
        bundle
    }

    #[tokio::test]
    async fn test_builtin_served_when_nothing_active() {
        let (provider, _, _) = provider();
        let style = provider.get_active().await;
        assert_eq!(style, ActiveStyle::builtin());
        assert!(provider.verify_exclusive().await.is_ok());
    }

    #[tokio::test]
    async fn test_set_active_switches_bundle() {
        let (provider, _, _) = provider();
        let v1 = provider.create_version("v1", None, bundle("ink")).await.unwrap();
        let v2 = provider.create_version("v2", None, bundle("oil")).await.unwrap();

        provider.set_active(v1.id).await.unwrap();
        assert_eq!(provider.get_active().await.version_id, Some(v1.id));

        provider.set_active(v2.id).await.unwrap();
        let active = provider.get_active().await;
        assert_eq!(active.version_id, Some(v2.id));
        assert_eq!(active.bundle.image.base_prompt, "oil");
        assert!(provider.verify_exclusive().await.is_ok());
    }

    #[tokio::test]
    async fn test_cached_until_ttl_without_invalidation() {
        let (provider, store, clock) = provider();
        let v1 = StyleVersion::new("v1", None, bundle("ink"));
        store.insert_version(&v1).await.unwrap();
        assert_eq!(provider.get_active().await.version_id, None);

        // Changed behind the provider's back: served stale until the TTL lapses.
        store.activate(v1.id).await.unwrap();
        clock.advance(Duration::from_secs(299));
        assert_eq!(provider.get_active().await.version_id, None);
        clock.advance(Duration::from_secs(1));
        assert_eq!(provider.get_active().await.version_id, Some(v1.id));
    }

    /// Snapshots the active version, then answers late.
    struct LaggingStyles {
        inner: Arc<MemoryStyleStore>,
        lag: Duration,
    }

    #[::async_trait::async_trait]
    impl StyleStore for LaggingStyles {
        async fn list_versions(&self) -> crate::StorageResult<Vec<StyleVersion>> {
            self.inner.list_versions().await
        }

        async fn active_version(&self) -> crate::StorageResult<Option<StyleVersion>> {
            let snapshot = self.inner.active_version().await;
            tokio::time::sleep(self.lag).await;
            snapshot
        }

        async fn insert_version(&self, version: &StyleVersion) -> crate::StorageResult<()> {
            self.inner.insert_version(version).await
        }

        async fn activate(&self, id: Uuid) -> crate::StorageResult<()> {
            self.inner.activate(id).await
        }

        async fn count_active(&self) -> crate::StorageResult<usize> {
            self.inner.count_active().await
        }
    }

    #[tokio::test]
    async fn test_slow_read_does_not_outlive_activation() {
        let store = Arc::new(LaggingStyles {
            inner: Arc::new(MemoryStyleStore::new()),
            lag: Duration::from_millis(200),
        });
        let provider = Arc::new(StyleConfigProvider::with_clock(
            store,
            StyleCacheConfig::default(),
            Arc::new(ManualClock::starting_now()),
        ));
        let v1 = provider.create_version("v1", None, bundle("ink")).await.unwrap();
        let v2 = provider.create_version("v2", None, bundle("oil")).await.unwrap();
        provider.set_active(v1.id).await.unwrap();

        let reader = {
            let provider = provider.clone();
            tokio::spawn(async move { provider.get_active().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        provider.set_active(v2.id).await.unwrap();

        // The in-flight read may see v1, but must not cache it.
        assert_eq!(reader.await.unwrap().version_id, Some(v1.id));
        let after = provider.get_active().await;
        assert_eq!(after.version_id, Some(v2.id));
        assert_eq!(after.bundle.image.base_prompt, "oil");
    }

    #[tokio::test]
    async fn test_set_active_unknown_version() {
        let (provider, _, _) = provider();
        let missing = Uuid::now_v7();
        let err = provider.set_active(missing).await.unwrap_err();
        assert_eq!(
            err,
            ChimeraError::Style(StyleError::VersionNotFound { version_id: missing })
        );
    }

    #[tokio::test]
    async fn test_verify_flags_no_active_version() {
        let (provider, _, _) = provider();
        provider.create_version("v1", None, bundle("ink")).await.unwrap();
        assert!(matches!(
            provider.verify_exclusive().await,
            Err(ChimeraError::Style(StyleError::ExclusivityViolated { active_count: 0 }))
        ));
    }
}
