//! The memoizing wrapper.
//!
//! [`Memoize`] collects the caching options and wraps a callable into a
//! [`Memoized`] value. Every operation on the wrapper (cached call,
//! invalidation, forced recalculation) derives its key through the same
//! [`KeyBuilder`], so they always address the same backend slot.
//!
//! ```no_run
//! use callcache::{memoize, Error};
//!
//! async fn double(args: (u64,)) -> Result<u64, Error> {
//!     Ok(args.0 * 2)
//! }
//!
//! # async fn run() -> Result<(), Error> {
//! let cached = memoize(60).group("math").wrap(double)?;
//! assert_eq!(cached.call((3,)).await?, 6);
//! cached.invalidate(&(3,)).await?;
//! assert_eq!(cached.force_recalculate((3,)).await?, 6);
//! # Ok(())
//! # }
//! ```

use crate::args::{CacheArgs, KeyArgs};
use crate::backends::Backend;
use crate::identity::CallableIdentity;
use crate::key_derivation::{CacheKey, KeyBuilder, KeyConfig, NameTransform};
use crate::metrics::Metrics;
use crate::serialization::{BincodeSerializer, Serializer};
use crate::{error::Error, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Starts a [`Memoize`] builder whose entries live for `ttl_secs` seconds.
/// Zero means the entries never expire.
pub fn memoize(ttl_secs: u64) -> Memoize {
    Memoize::new(ttl_secs)
}

/// Options for wrapping a callable.
pub struct Memoize<S = BincodeSerializer> {
    ttl: Option<Duration>,
    group: Option<String>,
    backend: Option<Backend>,
    key_config: KeyConfig,
    name_transform: Option<NameTransform>,
    serializer: S,
}

impl Memoize<BincodeSerializer> {
    /// Creates the builder. Zero means the entries never expire.
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            group: None,
            backend: None,
            key_config: KeyConfig::default(),
            name_transform: None,
            serializer: BincodeSerializer::new(),
        }
    }
}

impl<S: Serializer> Memoize<S> {
    /// Sets the TTL with sub-second precision. A zero duration means the
    /// entries never expire, as with `memoize(0)`.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = (!ttl.is_zero()).then(|| ttl);
        self
    }

    /// Stores entries without expiry.
    pub fn no_expiry(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Tags every entry with `group`, passed through to the backend.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Uses `backend` for storage.
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Rewrites the callable's name per call before it enters the key.
    pub fn name_transform<T>(mut self, transform: T) -> Self
    where
        T: Fn(&str, &KeyArgs) -> String + Send + Sync + 'static,
    {
        self.name_transform = Some(Arc::new(transform));
        self
    }

    /// Overrides key prefix and length limits.
    pub fn key_config(mut self, config: KeyConfig) -> Self {
        self.key_config = config;
        self
    }

    /// Encodes cached values with `serializer`.
    pub fn serializer<S2: Serializer>(self, serializer: S2) -> Memoize<S2> {
        Memoize {
            ttl: self.ttl,
            group: self.group,
            backend: self.backend,
            key_config: self.key_config,
            name_transform: self.name_transform,
            serializer,
        }
    }

    /// Wraps a named `fn` item, deriving its identity from its path.
    ///
    /// Closures have no stable name and are rejected with
    /// [`Error::IdentityResolution`]; use [`Memoize::wrap_as`] for them.
    /// The path comes from [`CallableIdentity::of`], so a compiler upgrade
    /// may rename the keys. Pass an identity built from `module_path!()` to
    /// [`Memoize::wrap_as`] when keys must survive toolchain changes.
    pub fn wrap<A, F, Fut>(self, func: F) -> Result<Memoized<A, F, S>>
    where
        A: CacheArgs,
        F: Fn(A) -> Fut,
    {
        let identity = CallableIdentity::of(&func)?;
        self.wrap_as(identity, func)
    }

    /// Wraps `func` under an explicit identity.
    pub fn wrap_as<A, F, Fut>(
        self,
        identity: CallableIdentity,
        func: F,
    ) -> Result<Memoized<A, F, S>>
    where
        A: CacheArgs,
        F: Fn(A) -> Fut,
    {
        let mut keys = KeyBuilder::new(self.key_config)?;
        if let Some(transform) = self.name_transform {
            keys = keys.with_name_transform(transform);
        }

        let backend = match self.backend {
            Some(backend) => backend,
            None => default_backend()?,
        };

        tracing::debug!(
            identity = %identity,
            group = ?self.group,
            ttl = ?self.ttl,
            "memoizing callable"
        );

        Ok(Memoized {
            identity,
            func,
            backend,
            keys,
            ttl: self.ttl,
            group: self.group,
            serializer: self.serializer,
            metrics: Arc::new(Metrics::new()),
            _args: PhantomData,
        })
    }
}

#[cfg(feature = "memory")]
fn default_backend() -> Result<Backend> {
    Ok(Arc::new(crate::backends::memory::MemoryBackend::new()))
}

#[cfg(not(feature = "memory"))]
fn default_backend() -> Result<Backend> {
    Err(Error::InvalidConfig(
        "no backend given and the `memory` feature is disabled".to_string(),
    ))
}

/// A callable wrapped with a cache.
pub struct Memoized<A, F, S = BincodeSerializer> {
    identity: CallableIdentity,
    func: F,
    backend: Backend,
    keys: KeyBuilder,
    ttl: Option<Duration>,
    group: Option<String>,
    serializer: S,
    metrics: Arc<Metrics>,
    _args: PhantomData<fn(A)>,
}

impl<A, F, S: fmt::Debug> fmt::Debug for Memoized<A, F, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("identity", &self.identity)
            .field("backend", &self.backend)
            .field("keys", &self.keys)
            .field("ttl", &self.ttl)
            .field("group", &self.group)
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}

impl<A, F, S> Memoized<A, F, S>
where
    A: CacheArgs,
    S: Serializer,
{
    /// The identity every key of this wrapper is namespaced under.
    pub fn identity(&self) -> &CallableIdentity {
        &self.identity
    }

    /// Hit/miss and failure counters of this wrapper.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The backend handle.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The group entries are tagged with.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// The key a call with `args` reads and writes.
    pub fn cache_key(&self, args: &A) -> Result<CacheKey> {
        self.keys.build(&self.identity, &args.key_args()?)
    }

    /// Returns the cached result for `args`, computing and storing it on a miss.
    ///
    /// Errors from the callable are returned unchanged and never cached.
    /// Backend failures are logged and counted, and degrade to recomputation.
    pub async fn call<Fut, T, E>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Serialize + DeserializeOwned,
        E: From<Error>,
    {
        let key = self.cache_key(&args)?;

        if let Some(value) = self.lookup(&key).await {
            self.metrics.record_hit();
            tracing::debug!(key = %key, identity = %self.identity, "cache hit");
            return Ok(value);
        }

        self.metrics.record_miss();
        tracing::debug!(key = %key, identity = %self.identity, "cache miss");

        let value = (self.func)(args).await?;
        self.store(&key, &value).await;
        Ok(value)
    }

    /// Blocking form of [`Memoized::call`] for synchronous callers.
    pub fn call_blocking<Fut, T, E>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Serialize + DeserializeOwned,
        E: From<Error>,
    {
        futures::executor::block_on(self.call(args))
    }

    /// Removes the cached result for `args`. Absent entries are not an error.
    pub async fn invalidate(&self, args: &A) -> Result<()> {
        let key = self.cache_key(args)?;
        self.backend.remove(key.as_str(), self.group()).await?;
        self.metrics.record_invalidation();
        tracing::debug!(key = %key, identity = %self.identity, "cache entry invalidated");
        Ok(())
    }

    /// Invokes the callable regardless of any cached entry and writes the
    /// fresh result to the same key.
    pub async fn force_recalculate<Fut, T, E>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Serialize,
        E: From<Error>,
    {
        let key = self.cache_key(&args)?;
        let value = (self.func)(args).await?;
        self.store(&key, &value).await;
        tracing::debug!(key = %key, identity = %self.identity, "cache entry recalculated");
        Ok(value)
    }

    /// Drops every entry in this wrapper's group, including other callables'.
    pub async fn invalidate_group(&self) -> Result<()> {
        let group = self.group().ok_or_else(|| {
            Error::InvalidConfig(format!("`{}` is not memoized in a group", self.identity))
        })?;
        self.backend.invalidate_group(group).await?;
        tracing::debug!(group, identity = %self.identity, "cache group invalidated");
        Ok(())
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.backend.get(key.as_str(), self.group()).await {
            Ok(Some(bytes)) => match self.serializer.deserialize(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "undecodable cache entry, recomputing");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.metrics.record_lookup_failure();
                tracing::warn!(key = %key, error = %e, "cache lookup failed, recomputing");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let bytes = match self.serializer.serialize(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.metrics.record_store_failure();
                tracing::warn!(key = %key, error = %e, "cannot encode computed value");
                return;
            }
        };

        match self
            .backend
            .set(key.as_str(), bytes, self.ttl, self.group())
            .await
        {
            Ok(()) => {
                tracing::debug!(key = %key, ttl = ?self.ttl, "cache entry stored");
            }
            Err(e) => {
                self.metrics.record_store_failure();
                tracing::warn!(key = %key, error = %e, "cache store failed");
            }
        }
    }
}

/// Object-safe view of a memoized callable.
///
/// Lets callers hold wrappers of different callables behind one type, e.g.
/// `Box<dyn CachedCall<(u32,), User, AppError>>`.
#[async_trait]
pub trait CachedCall<A, T, E>: Send + Sync {
    /// Cached invocation.
    async fn call(&self, args: A) -> std::result::Result<T, E>;

    /// Removes the cached result for `args`.
    async fn invalidate(&self, args: &A) -> Result<()>;

    /// Uncached invocation that refreshes the cached result.
    async fn force_recalculate(&self, args: A) -> std::result::Result<T, E>;
}

#[async_trait]
impl<A, F, Fut, T, E, S> CachedCall<A, T, E> for Memoized<A, F, S>
where
    A: CacheArgs + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<T, E>> + Send,
    T: Serialize + DeserializeOwned + Send + Sync,
    E: From<Error> + Send,
    S: Serializer,
{
    async fn call(&self, args: A) -> std::result::Result<T, E> {
        Memoized::call(self, args).await
    }

    async fn invalidate(&self, args: &A) -> Result<()> {
        Memoized::invalidate(self, args).await
    }

    async fn force_recalculate(&self, args: A) -> std::result::Result<T, E> {
        Memoized::force_recalculate(self, args).await
    }
}
