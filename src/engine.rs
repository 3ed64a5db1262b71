use std::sync::Arc;

use crate::cache::FlagCache;
use crate::config::{Configuration, DEFAULT_ENDPOINT};
use crate::dedup::RequestDeduplicator;
use crate::error::FlagError;
use crate::identity::{build_request_body, sanitize, Identity};
use crate::merge::merge;
use crate::session::{FlagSession, ResolveOptions};
use crate::storage::{MemoryStorage, Storage};
use crate::transport::Transport;
use crate::value::FlagSet;

/// Builder for a [`FlagEngine`].
///
/// # Examples
/// ```no_run
/// use flagbag_lib::{FlagEngine, FlagValue};
///
/// let engine = FlagEngine::builder("flags_pub_277203581177692685")
///     .default_flag("dog", FlagValue::Bool(false))
///     .build()
///     .unwrap();
/// ```
pub struct FlagEngineBuilder {
    project_key: String,
    endpoint: String,
    default_flags: FlagSet,
    disable_cache: bool,
    storage: Option<Arc<dyn Storage>>,
    transport: Option<Arc<dyn Transport>>,
}

impl FlagEngineBuilder {
    pub fn endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn default_flags(mut self, flags: FlagSet) -> Self {
        self.default_flags = flags;
        self
    }

    pub fn default_flag(mut self, key: &str, value: impl Into<crate::FlagValue>) -> Self {
        self.default_flags.insert(key.to_string(), value.into());
        self
    }

    /// Turns off the persisted cache. Flags are still fetched on every
    /// trigger.
    pub fn disable_cache(mut self, disable: bool) -> Self {
        self.disable_cache = disable;
        self
    }

    /// Storage holding the cache slot. Defaults to process memory.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Transport used for flag requests. Defaults to HTTP when the `http`
    /// feature is enabled, offline otherwise.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<FlagEngine, FlagError> {
        let config = Configuration::new(
            &self.project_key,
            &self.endpoint,
            self.default_flags,
            self.disable_cache,
        )?;

        let transport = self.transport.unwrap_or_else(default_transport);
        let cache = if config.cache_disabled() {
            None
        } else {
            let storage = self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
            Some(FlagCache::new(storage))
        };

        Ok(FlagEngine {
            inner: Arc::new(EngineInner {
                config,
                dedup: RequestDeduplicator::new(transport),
                cache,
            }),
        })
    }
}

#[cfg(feature = "http")]
fn default_transport() -> Arc<dyn Transport> {
    Arc::new(crate::transport::HttpTransport::new())
}

#[cfg(not(feature = "http"))]
fn default_transport() -> Arc<dyn Transport> {
    Arc::new(crate::transport::OfflineTransport)
}

struct EngineInner {
    config: Configuration,
    dedup: RequestDeduplicator,
    cache: Option<FlagCache>,
}

/// Flag resolution context: configuration, in-flight requests and cache.
///
/// Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct FlagEngine {
    inner: Arc<EngineInner>,
}

impl FlagEngine {
    pub fn builder(project_key: &str) -> FlagEngineBuilder {
        FlagEngineBuilder {
            project_key: project_key.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_flags: FlagSet::new(),
            disable_cache: false,
            storage: None,
            transport: None,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    /// The persisted cache, `None` when caching is disabled.
    pub fn cache(&self) -> Option<&FlagCache> {
        self.inner.cache.as_ref()
    }

    /// Number of flag requests currently in flight.
    pub fn pending_requests(&self) -> usize {
        self.inner.dedup.pending()
    }

    /// Fetches raw flags for `identity` through the deduplicator. `None` on
    /// any failure.
    pub async fn fetch_flags(&self, identity: Option<&Identity>) -> Option<FlagSet> {
        let body = build_request_body(identity);
        self.inner
            .dedup
            .fetch(&self.inner.config.request_url(), body)
            .await
    }

    /// One-shot resolution merged with defaults.
    ///
    /// Rejects when the transport cannot send outbound requests. A failed
    /// fetch resolves to the defaults. The result is not persisted.
    pub async fn fetch_once(&self, identity: Option<&Identity>) -> Result<FlagSet, FlagError> {
        if !self.inner.dedup.transport().is_outbound_capable() {
            return Err(FlagError::NetworkUnsupported);
        }
        let identity = sanitize(identity);
        let fetched = self.fetch_flags(identity.as_ref()).await;
        Ok(merge(fetched.as_ref(), self.inner.config.default_flags()).into_owned())
    }

    /// Starts a resolution session. Call [`FlagSession::mount`] to begin
    /// fetching.
    pub fn resolve(&self, options: ResolveOptions) -> FlagSession {
        FlagSession::new(self.clone(), options)
    }
}
