//! Short-lived refresh result cache contract and the built-in in-memory implementation.
//!
//! Entries are keyed by the raw session credential that triggered the refresh, so repeated
//! requests bearing the same credential within the TTL reuse one result instead of calling
//! the refresh endpoint again. Results are reused as-is and never re-validated upstream.

pub mod memory;

pub use memory::MemoryRefreshCache;

// self
use crate::{_prelude::*, refresh::RefreshResult};

/// Boxed future returned by [`RefreshCache`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Storage contract for refresh results.
///
/// Implementations must drop entries once their TTL has elapsed and must be safe to share
/// across concurrent requests. A shared external backend can implement this trait to
/// collapse refreshes across processes.
pub trait RefreshCache
where
	Self: Send + Sync,
{
	/// Returns the live entry for `key`, if any.
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<RefreshResult>>;

	/// Stores `result` under `key`, displacing older entries when full.
	fn insert(&self, key: String, result: RefreshResult) -> CacheFuture<'_, ()>;

	/// Drops the entry for `key`, if any.
	fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}

/// Error type produced by [`RefreshCache`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// Backend-level failure for the cache engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
