//! Axum integration: the proactive refresh layer, the session gate, and the cookie-name route.
//!
//! ```ignore
//! let coordinator = Arc::new(TokenRefreshCoordinator::with_reqwest(settings)?);
//! let gate = SessionGate::new(coordinator.clone())?;
//! let app = Router::new()
//! 	.route("/protected", get(handler))
//! 	.route_layer(middleware::from_fn_with_state(gate.clone(), require_session))
//! 	.route("/token-names", get(token_names).with_state(gate))
//! 	.layer(middleware::from_fn_with_state(coordinator, refresh_session));
//! ```

// crates.io
use axum::{
	Json,
	extract::{OriginalUri, Request, State},
	http::{HeaderValue, StatusCode, header::LOCATION},
	middleware::Next,
	response::{IntoResponse, Response},
};
// self
use crate::{
	_prelude::*,
	auth::{AuthOutcome, Authenticator, Rejection},
	config::SettingsError,
	coordinator::TokenRefreshCoordinator,
	credential::Credential,
	refresh::RefreshResult,
};

/// Query parameter carrying the original URL on login redirects.
pub const NEXT_PAGE_PARAM: &str = "next_page";

/// Refreshes near-expiry session credentials before the wrapped handler runs.
///
/// The handler response always passes through; when a refresh succeeded, the replacement
/// cookies are appended to it and the [`RefreshResult`] is inserted into the request
/// extensions so inner layers such as [`require_session`] see the new credential.
pub async fn refresh_session(
	State(coordinator): State<Arc<TokenRefreshCoordinator>>,
	mut request: Request,
	next: Next,
) -> Response {
	let refreshed = coordinator.prepare(request.headers()).await;

	if let Some(result) = refreshed.as_ref() {
		request.extensions_mut().insert(result.clone());
	}

	let mut response = next.run(request).await;

	if let Some(result) = refreshed.as_ref() {
		coordinator.apply(result, response.headers_mut());
	}

	response
}

/// State shared by [`require_session`] and [`token_names`].
#[derive(Clone, Debug)]
pub struct SessionGate {
	coordinator: Arc<TokenRefreshCoordinator>,
	authenticator: Arc<Authenticator>,
}
impl SessionGate {
	/// Builds a gate verifying credentials with the configured `JWT_SECRET`.
	pub fn new(coordinator: Arc<TokenRefreshCoordinator>) -> Result<Self, SettingsError> {
		let secret =
			coordinator.settings().jwt_secret.as_ref().ok_or(SettingsError::MissingJwtSecret)?;
		let authenticator = Arc::new(Authenticator::new(secret));

		Ok(Self { coordinator, authenticator })
	}

	/// Builds a gate around an existing authenticator.
	pub fn with_authenticator(
		coordinator: Arc<TokenRefreshCoordinator>,
		authenticator: Arc<Authenticator>,
	) -> Self {
		Self { coordinator, authenticator }
	}

	/// Coordinator used for reactive refreshes.
	pub fn coordinator(&self) -> &Arc<TokenRefreshCoordinator> {
		&self.coordinator
	}

	/// Verifies the credential refreshed earlier in this request, else the inbound cookie.
	fn authenticate(&self, request: &Request) -> AuthOutcome {
		let Some(refreshed) = request.extensions().get::<RefreshResult>() else {
			return self
				.authenticator
				.authenticate(request.headers(), &self.coordinator.settings().session_cookie_name);
		};

		match self.authenticator.verify(&Credential::parse(refreshed.session.expose())) {
			// The endpoint was just called; a second exchange would not do better.
			AuthOutcome::NeedsReactiveRefresh => AuthOutcome::Rejected(Rejection::Invalid {
				reason: "Refreshed session credential is already expired.".into(),
			}),
			outcome => outcome,
		}
	}

	fn login_redirect(&self, original_url: &str) -> Option<Response> {
		let mut login = self.coordinator.settings().login_redirect_url.clone()?;

		login.query_pairs_mut().append_pair(NEXT_PAGE_PARAM, original_url);

		let location = HeaderValue::from_str(login.as_str()).ok()?;

		Some((StatusCode::FOUND, [(LOCATION, location)]).into_response())
	}
}

/// Admits requests carrying a verified session credential.
///
/// Verified claims are inserted into the request extensions as
/// [`crate::auth::SessionClaims`]. When [`refresh_session`] runs outside this layer and
/// refreshed the credential, the refreshed one is verified instead of the inbound cookie.
/// Expired credentials without a refresh capability trigger a single reactive refresh,
/// missing ones get a bare `401`, and invalid ones (expired refreshable credentials whose
/// proactive refresh failed included) are redirected to the login page when one is configured.
pub async fn require_session(
	State(gate): State<SessionGate>,
	mut request: Request,
	next: Next,
) -> Response {
	match gate.authenticate(&request) {
		AuthOutcome::Valid(claims) => {
			request.extensions_mut().insert(claims);

			next.run(request).await
		},
		AuthOutcome::NeedsReactiveRefresh => {
			let original_url = original_url(&request);

			gate.coordinator.recover_expired(request.headers(), &original_url).await
		},
		AuthOutcome::Rejected(Rejection::Missing) => StatusCode::UNAUTHORIZED.into_response(),
		AuthOutcome::Rejected(Rejection::Invalid { reason }) => {
			tracing::info!(reason = %reason, "Rejected an invalid session credential.");

			gate.login_redirect(&original_url(&request))
				.unwrap_or_else(|| StatusCode::UNAUTHORIZED.into_response())
		},
	}
}

/// Cookie names the host uses, for clients that need to read them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenNames {
	/// Session cookie name.
	pub session: String,
	/// Classic cookie name.
	pub classic: String,
}

/// Handler returning the configured cookie names.
pub async fn token_names(State(gate): State<SessionGate>) -> Json<TokenNames> {
	let settings = gate.coordinator.settings();

	Json(TokenNames {
		session: settings.session_cookie_name.clone(),
		classic: settings.classic_cookie_name.clone(),
	})
}

fn original_url(request: &Request) -> String {
	match request.extensions().get::<OriginalUri>() {
		Some(OriginalUri(uri)) => uri.to_string(),
		None => request.uri().to_string(),
	}
}
