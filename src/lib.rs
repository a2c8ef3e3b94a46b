#![warn(missing_docs)]
//! # callcache
//!
//! Memoizes function results behind a pluggable cache backend, keyed by a
//! deterministic, human-readable rendering of the callable's qualified name
//! and its arguments.
//!
//! ```no_run
//! use callcache::{memoize, Error};
//!
//! async fn load_score(args: (u32,)) -> Result<u64, Error> {
//!     Ok(u64::from(args.0) * 10)
//! }
//!
//! # async fn run() -> Result<(), Error> {
//! let cached = memoize(60).wrap(load_score)?;
//!
//! // Key: [cached]my_crate.load_score|function|[7]|{}
//! let score = cached.call((7,)).await?;
//!
//! cached.invalidate(&(7,)).await?;
//! let fresh = cached.force_recalculate((7,)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Methods are keyed through their receiver's [`InstanceKey`]:
//!
//! ```no_run
//! use callcache::{memoize, Bound, CallableIdentity, Error, InstanceKey};
//! use std::sync::Arc;
//!
//! struct Catalog {
//!     region: String,
//! }
//!
//! impl InstanceKey for Catalog {
//!     fn instance_key(&self) -> String {
//!         self.region.clone()
//!     }
//! }
//!
//! # async fn run() -> Result<(), Error> {
//! let cached = memoize(300).wrap_as(
//!     CallableIdentity::method_of::<Catalog>("price")?,
//!     |call: Bound<Arc<Catalog>, (u32,)>| async move {
//!         Ok::<_, Error>(call.args.0 * 2)
//!     },
//! )?;
//!
//! let catalog = Arc::new(Catalog { region: "eu".into() });
//! let price = cached.call(Bound::new(catalog, (12,))).await?;
//! # Ok(())
//! # }
//! ```

extern crate self as callcache;

pub mod args;
pub mod backends;
pub mod error;
pub mod identity;
pub mod key_derivation;
pub mod memoize;
pub mod metrics;
pub mod serialization;



pub use args::{Bound, CacheArgs, KeyArgs, KeyValue};
pub use error::Error;
pub use identity::{CallableIdentity, CallableKind, InstanceKey};
pub use key_derivation::{CacheKey, KeyBuilder, KeyConfig};
pub use memoize::{memoize, CachedCall, Memoize, Memoized};

#[cfg(feature = "memory")]
pub use backends::memory::MemoryBackend;

#[cfg(feature = "redis-backend")]
pub use backends::redis::RedisBackend;

/// Generates a `<name>_identity()` function next to the annotated function.
///
/// On a free function the identity is a [`CallableKind::Function`] under
/// `module_path!()`. On a method taking `self` it is a
/// [`CallableKind::Method`] owned by `Self`; mark receiver-less associated
/// functions with `#[cache_identity(classmethod)]`. Free function names come
/// from `module_path!()` and stay fixed across compiler versions. Method
/// owners come from [`std::any::type_name`], which carries no such promise.
///
/// ```
/// use callcache::{cache_identity, CallableKind};
///
/// #[cache_identity]
/// fn load_user(id: u32) -> u32 {
///     id
/// }
///
/// let id = load_user_identity().unwrap();
/// assert_eq!(id.kind(), CallableKind::Function);
/// assert!(id.qualified_name().ends_with(".load_user"));
/// ```
#[doc(inline)]
pub use callcache_macros::cache_identity;

/// The main cache result type.
pub type Result<T> = std::result::Result<T, error::Error>;

/// Common prelude for using the library.
pub mod prelude {
    pub use crate::{
        backends::{Backend, CacheBackend},
        cache_identity,
        error::Error,
        memoize,
        metrics::Metrics,
        Bound, CacheArgs, CachedCall, CallableIdentity, InstanceKey, KeyArgs, KeyValue, Memoize,
        Memoized, Result,
    };
}
