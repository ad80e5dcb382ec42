//! Observability helpers for refresh paths.
//!
//! # Feature Flags
//!
//! - Spans named `session_refresher.refresh` always carry the `path` (proactive or reactive)
//!   and `stage` (call site) fields.
//! - Enable `metrics` to increment the `session_refresher_refresh_total` counter for every
//!   outcome, labeled by `path` + `outcome`.

mod tracing;

pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Refresh paths observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshPath {
	/// Refresh performed before the handler runs because the credential is near expiry.
	Proactive,
	/// Single-attempt refresh after authentication reported an expired credential.
	Reactive,
}
impl RefreshPath {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshPath::Proactive => "proactive",
			RefreshPath::Reactive => "reactive",
		}
	}
}
impl Display for RefreshPath {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshOutcome {
	/// A refresh was needed and started.
	Attempt,
	/// The result came from the cache.
	CacheHit,
	/// The request waited on a concurrent refresh of the same credential and took its outcome.
	Joined,
	/// Replacement credentials were obtained.
	Success,
	/// The refresh was abandoned.
	Failure,
}
impl RefreshOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshOutcome::Attempt => "attempt",
			RefreshOutcome::CacheHit => "cache_hit",
			RefreshOutcome::Joined => "joined",
			RefreshOutcome::Success => "success",
			RefreshOutcome::Failure => "failure",
		}
	}
}
impl Display for RefreshOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records a refresh outcome via the global metrics recorder (when enabled).
///
/// Failures on the proactive path never surface to the client, so this counter is the only
/// place an operator can see them besides the `warn` log.
pub fn record_refresh_outcome(path: RefreshPath, outcome: RefreshOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"session_refresher_refresh_total",
		"path" => path.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (path, outcome);
}
