//! Refresh endpoint calls: response interpretation and the bounded retry loop.
//!
//! [`RefreshClient::refresh_once`] performs a single attempt and maps the response:
//! `200` is parsed into a [`RefreshResult`], `5xx` becomes a [`TransientError`], and any
//! other status is a permanent [`Error::Rejected`]. [`RefreshClient::refresh`] wraps it in a
//! retry loop that only retries transient failures (timeouts, connect failures, `5xx`),
//! sleeping a linearly growing, jittered delay between attempts.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	credential::Secret,
	error::TransientError,
	http::{RawResponse, RefreshCall, RefreshTransport},
};

/// Successful refresh endpoint response, reused verbatim for cookie propagation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResult {
	/// Replacement session credential.
	pub session: Secret,
	/// Replacement classic credential.
	pub classic: Secret,
	/// Cookie `Max-Age` in seconds.
	#[serde(default)]
	pub max_age: Option<i64>,
	/// Cookie `Domain`.
	#[serde(default)]
	pub domain: Option<String>,
	/// Cookie `Secure` flag.
	#[serde(default)]
	pub secure: bool,
	/// Cookie `SameSite` policy (`lax`, `strict`, or `none`).
	#[serde(default)]
	pub samesite: Option<String>,
}
impl RefreshResult {
	/// Parses a refresh endpoint body, reporting the failing path on error.
	pub fn from_slice(body: &[u8]) -> Result<Self> {
		let mut deserializer = serde_json::Deserializer::from_slice(body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::MalformedResponse { source })
	}
}
impl Debug for RefreshResult {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshResult")
			.field("session", &self.session)
			.field("classic", &self.classic)
			.field("max_age", &self.max_age)
			.field("domain", &self.domain)
			.field("secure", &self.secure)
			.field("samesite", &self.samesite)
			.finish()
	}
}

/// Calls the refresh endpoint through a [`RefreshTransport`] with a bounded retry budget.
#[derive(Clone)]
pub struct RefreshClient {
	transport: Arc<dyn RefreshTransport>,
	max_attempts: u32,
	backoff: StdDuration,
	metrics: Arc<RefreshMetrics>,
}
impl RefreshClient {
	/// Creates a client; `max_attempts` is clamped to at least one.
	pub fn new(
		transport: Arc<dyn RefreshTransport>,
		max_attempts: u32,
		backoff: StdDuration,
		metrics: Arc<RefreshMetrics>,
	) -> Self {
		Self { transport, max_attempts: max_attempts.max(1), backoff, metrics }
	}

	/// Shared counters updated by this client.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Performs exactly one attempt.
	pub async fn refresh_once(&self, call: &RefreshCall) -> Result<RefreshResult> {
		self.metrics.record_network_call();

		let response = self.transport.post_refresh(call).await?;

		interpret(response)
	}

	/// Retries transient failures until the attempt budget is spent.
	pub async fn refresh(&self, call: &RefreshCall) -> Result<RefreshResult> {
		let mut attempt = 0;

		loop {
			attempt += 1;

			let err = match self.refresh_once(call).await {
				Ok(result) => return Ok(result),
				Err(err) => err,
			};

			if !err.is_transient() {
				return Err(err);
			}
			if attempt >= self.max_attempts {
				return Err(Error::RetriesExhausted { attempts: attempt, last: Box::new(err) });
			}

			tracing::debug!(attempt, error = %err, "Refresh attempt failed, retrying.");

			let delay = self.delay_before(attempt + 1);

			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}
		}
	}

	fn delay_before(&self, attempt: u32) -> StdDuration {
		if self.backoff.is_zero() {
			return StdDuration::ZERO;
		}

		let base = self.backoff.saturating_mul(attempt.saturating_sub(1));
		let jitter_ceiling = u64::try_from(self.backoff.as_millis()).unwrap_or(u64::MAX);
		let jitter = StdDuration::from_millis(rand::rng().random_range(0..=jitter_ceiling));

		base.saturating_add(jitter)
	}
}
impl Debug for RefreshClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshClient")
			.field("max_attempts", &self.max_attempts)
			.field("backoff", &self.backoff)
			.finish()
	}
}

fn interpret(response: RawResponse) -> Result<RefreshResult> {
	match response.status {
		200 => RefreshResult::from_slice(&response.body),
		status @ 500..=599 => Err(TransientError::Upstream { status }.into()),
		status => Err(Error::Rejected { status }),
	}
}
