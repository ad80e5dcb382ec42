//! Refresh orchestration shared by the proactive and reactive paths.
//!
//! [`TokenRefreshCoordinator::prepare`] inspects the inbound session cookie before the
//! downstream handler runs. Credentials that are near expiry and carry a refresh capability
//! are exchanged through the retrying [`RefreshClient`]; concurrent requests presenting the
//! same credential share one refresh via a per-credential singleflight guard and the
//! [`RefreshCache`]. Requests queued behind a flight take its outcome, failure included, so
//! an unavailable endpoint costs each request at most one retry budget. Failures are logged
//! and swallowed so the request always proceeds.
//!
//! [`TokenRefreshCoordinator::recover_expired`] is the reactive counterpart: one attempt, no
//! cache, and a terminal response (redirect back on success, `401` otherwise).

// crates.io
use async_lock::MutexGuardArc;
use axum::{
	Json,
	http::{HeaderMap, HeaderValue, StatusCode, header::LOCATION},
	response::{IntoResponse, Response},
};
// self
use crate::{
	_prelude::*,
	cache::{MemoryRefreshCache, RefreshCache},
	config::RefreshSettings,
	cookies,
	credential::{Credential, RefreshDecision},
	http::{RefreshCall, RefreshRequestBody, RefreshTransport},
	obs::{self, RefreshOutcome, RefreshPath, RefreshSpan},
	refresh::{RefreshClient, RefreshMetrics, RefreshResult},
};

/// `Some(result)` when a flight refreshed the credential, `None` when it gave up.
type FlightOutcome = Option<RefreshResult>;
/// Empty until the flight holding the lock settles it.
type FlightSlot = AsyncMutex<Option<FlightOutcome>>;
type FlightGuards = Arc<Mutex<HashMap<String, Arc<FlightSlot>>>>;

/// Message returned when the reactive refresh fails.
pub const REFRESH_FAILED_MESSAGE: &str = "Failed to refresh access token";

/// Coordinates credential refreshes for every request handled by the host.
pub struct TokenRefreshCoordinator {
	settings: RefreshSettings,
	client: RefreshClient,
	cache: Arc<dyn RefreshCache>,
	flight_guards: FlightGuards,
}
impl TokenRefreshCoordinator {
	/// Creates a coordinator from explicit transport and cache backends.
	pub fn new(
		settings: RefreshSettings,
		transport: Arc<dyn RefreshTransport>,
		cache: Arc<dyn RefreshCache>,
	) -> Self {
		let client = RefreshClient::new(
			transport,
			settings.max_attempts,
			settings.retry_backoff,
			Default::default(),
		);

		Self { settings, client, cache, flight_guards: Default::default() }
	}

	/// Creates a coordinator backed by [`crate::http::ReqwestTransport`] and an in-memory cache
	/// sized from `settings`.
	#[cfg(feature = "reqwest")]
	pub fn with_reqwest(settings: RefreshSettings) -> Result<Self, crate::error::ConfigError> {
		let transport = Arc::new(crate::http::ReqwestTransport::new()?);
		let cache = Arc::new(MemoryRefreshCache::new(settings.cache_capacity, settings.cache_ttl));

		Ok(Self::new(settings, transport, cache))
	}

	/// Creates a coordinator with the provided transport and an in-memory cache sized from
	/// `settings`.
	pub fn with_transport(settings: RefreshSettings, transport: Arc<dyn RefreshTransport>) -> Self {
		let cache = Arc::new(MemoryRefreshCache::new(settings.cache_capacity, settings.cache_ttl));

		Self::new(settings, transport, cache)
	}

	/// Settings the coordinator was built with.
	pub fn settings(&self) -> &RefreshSettings {
		&self.settings
	}

	/// Counters describing refresh activity so far.
	pub fn metrics(&self) -> &RefreshMetrics {
		self.client.metrics()
	}

	/// Refreshes the inbound session credential when it is about to expire.
	///
	/// Returns `None` when no refresh was needed or when the refresh was abandoned; the
	/// request should proceed either way.
	pub async fn prepare(&self, headers: &HeaderMap) -> Option<RefreshResult> {
		let raw = cookies::cookie_value(headers, &self.settings.session_cookie_name)?;
		let credential = Credential::parse(raw.expose());

		match credential.decide(OffsetDateTime::now_utc(), self.settings.threshold) {
			RefreshDecision::Refresh => {},
			decision => {
				tracing::trace!(
					credential = %credential.fingerprint(),
					decision = decision.as_str(),
					"Session credential does not need a proactive refresh."
				);

				return None;
			},
		}

		let span = RefreshSpan::new(RefreshPath::Proactive, "prepare");

		span.record_credential(&credential.fingerprint());
		span.instrument(self.refresh_proactively(&credential, headers)).await
	}

	/// Appends `Set-Cookie` headers carrying the refreshed credentials to `headers`.
	pub fn apply(&self, result: &RefreshResult, headers: &mut HeaderMap) {
		let cookies = cookies::refreshed_cookies(
			&self.settings.session_cookie_name,
			&self.settings.classic_cookie_name,
			result,
		);

		cookies::append_set_cookies(headers, &cookies);
	}

	/// Performs a single refresh attempt for a request whose credential already expired.
	///
	/// On success the caller is redirected back to `original_url` with the refreshed cookies;
	/// otherwise a `401` JSON response is returned.
	pub async fn recover_expired(&self, headers: &HeaderMap, original_url: &str) -> Response {
		const PATH: RefreshPath = RefreshPath::Reactive;

		let span = RefreshSpan::new(PATH, "recover_expired");

		if let Some(raw) = cookies::cookie_value(headers, &self.settings.session_cookie_name) {
			span.record_credential(&raw.fingerprint());
		}

		span.instrument(async move {
			obs::record_refresh_outcome(PATH, RefreshOutcome::Attempt);
			self.metrics().record_attempt();

			let call = self.refresh_call(headers);
			let result = match self.client.refresh_once(&call).await {
				Ok(result) => result,
				Err(err) => {
					tracing::warn!(error = %err, "Reactive credential refresh failed.");

					return self.refresh_failed(PATH);
				},
			};
			let location = match HeaderValue::from_str(original_url) {
				Ok(location) => location,
				Err(_) => {
					tracing::warn!("Original request URL is not a valid Location header.");

					return self.refresh_failed(PATH);
				},
			};
			let mut response = (StatusCode::FOUND, [(LOCATION, location)]).into_response();

			self.apply(&result, response.headers_mut());
			self.metrics().record_success();
			obs::record_refresh_outcome(PATH, RefreshOutcome::Success);

			response
		})
		.await
	}

	async fn refresh_proactively(
		&self,
		credential: &Credential,
		headers: &HeaderMap,
	) -> Option<RefreshResult> {
		const PATH: RefreshPath = RefreshPath::Proactive;

		obs::record_refresh_outcome(PATH, RefreshOutcome::Attempt);
		self.metrics().record_attempt();

		let key = credential.raw().expose();

		if let Some(hit) = self.cached(key).await {
			return Some(self.cache_hit(hit));
		}

		let mut flight = self.enter_flight(key).await;

		if let Some(outcome) = flight.outcome() {
			return self.joined(outcome);
		}
		if let Some(hit) = self.cached(key).await {
			return Some(self.cache_hit(hit));
		}

		let call = self.refresh_call(headers);
		let outcome = match self.client.refresh(&call).await {
			Ok(result) => {
				if let Err(err) = self.cache.insert(key.to_owned(), result.clone()).await {
					tracing::warn!(error = %err, "Failed to cache the refreshed credential.");
				}

				self.metrics().record_success();
				obs::record_refresh_outcome(PATH, RefreshOutcome::Success);

				Some(result)
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					"Proactive credential refresh abandoned; continuing with the current credential."
				);
				self.metrics().record_failure();
				obs::record_refresh_outcome(PATH, RefreshOutcome::Failure);

				None
			},
		};

		flight.settle(outcome.clone());

		outcome
	}

	async fn cached(&self, key: &str) -> Option<RefreshResult> {
		match self.cache.get(key).await {
			Ok(hit) => hit,
			Err(err) => {
				tracing::warn!(error = %err, "Refresh cache lookup failed; treating it as a miss.");

				None
			},
		}
	}

	fn cache_hit(&self, hit: RefreshResult) -> RefreshResult {
		tracing::debug!("Reusing a cached refresh result.");
		self.metrics().record_cache_hit();
		obs::record_refresh_outcome(RefreshPath::Proactive, RefreshOutcome::CacheHit);

		hit
	}

	fn joined(&self, outcome: FlightOutcome) -> FlightOutcome {
		self.metrics().record_joined();
		obs::record_refresh_outcome(RefreshPath::Proactive, RefreshOutcome::Joined);

		if outcome.is_none() {
			tracing::debug!("Concurrent refresh of this credential was abandoned; not retrying.");
			self.metrics().record_failure();
		}

		outcome
	}

	fn refresh_failed(&self, path: RefreshPath) -> Response {
		self.metrics().record_failure();
		obs::record_refresh_outcome(path, RefreshOutcome::Failure);

		(StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "message": REFRESH_FAILED_MESSAGE })))
			.into_response()
	}

	fn refresh_call(&self, headers: &HeaderMap) -> RefreshCall {
		RefreshCall {
			url: self.settings.refresh_url.clone(),
			body: RefreshRequestBody {
				session: cookies::cookie_value(headers, &self.settings.session_cookie_name),
				classic: cookies::cookie_value(headers, &self.settings.classic_cookie_name),
			},
			cookie_header: cookies::cookie_header(headers),
			timeout: self.settings.attempt_timeout,
		}
	}

	async fn enter_flight(&self, key: &str) -> FlightGuard {
		let slot = {
			let mut guards = self.flight_guards.lock();

			guards.entry(key.to_owned()).or_default().clone()
		};
		let mut flight =
			FlightGuard { guards: self.flight_guards.clone(), key: key.to_owned(), slot, held: None };

		flight.held = Some(flight.slot.lock_arc().await);

		flight
	}

	#[cfg(test)]
	fn flight_guard_count(&self) -> usize {
		self.flight_guards.lock().len()
	}
}
impl Debug for TokenRefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRefreshCoordinator")
			.field("settings", &self.settings)
			.field("client", &self.client)
			.finish_non_exhaustive()
	}
}

/// Holds the per-credential singleflight lock and drops the map entry once nobody else waits.
///
/// A flight dropped before settling leaves the slot empty, so the next waiter refreshes itself.
struct FlightGuard {
	guards: FlightGuards,
	key: String,
	slot: Arc<FlightSlot>,
	held: Option<MutexGuardArc<Option<FlightOutcome>>>,
}
impl FlightGuard {
	fn outcome(&self) -> Option<FlightOutcome> {
		self.held.as_ref().and_then(|held| (**held).clone())
	}

	fn settle(&mut self, outcome: FlightOutcome) {
		if let Some(held) = self.held.as_mut() {
			**held = Some(outcome);
		}
	}
}
impl Drop for FlightGuard {
	fn drop(&mut self) {
		self.held.take();

		let mut guards = self.guards.lock();

		// Only the map and this guard reference the slot, so no waiter can be stranded.
		if guards.get(&self.key).is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
			&& Arc::strong_count(&self.slot) == 2
		{
			guards.remove(&self.key);
		}
	}
}
