mod common;

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use http_body_util::BodyExt;
use serde_json::json;
use session_refresher::{
	auth::SessionClaims,
	axum::{
		Extension, Router,
		body::Body,
		http::{
			Request, Response, StatusCode,
			header::{COOKIE, LOCATION, SET_COOKIE},
		},
		middleware,
		routing::get,
	},
	config::{RefreshSettings, SettingsError},
	coordinator::TokenRefreshCoordinator,
	http::{RawResponse, RefreshCall, RefreshTransport, TransportFuture},
	middleware::{SessionGate, refresh_session, require_session, token_names},
	url::Url,
};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
// self
use common::*;

/// Answers with `statuses` in order, repeating the last one; `200` carries a signed session.
struct ScriptedTransport {
	statuses: Vec<u16>,
	calls: AtomicUsize,
}
impl ScriptedTransport {
	fn new(status: u16) -> Arc<Self> {
		Self::script(&[status])
	}

	fn script(statuses: &[u16]) -> Arc<Self> {
		Arc::new(Self { statuses: statuses.to_vec(), calls: AtomicUsize::new(0) })
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl RefreshTransport for ScriptedTransport {
	fn post_refresh<'a>(&'a self, _: &'a RefreshCall) -> TransportFuture<'a> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);
		let status = self.statuses.get(call).or(self.statuses.last()).copied().unwrap_or(500);
		let body = if status == 200 { refreshed_body() } else { String::new() };
		let response = RawResponse::new(status, body);

		Box::pin(async move { Ok(response) })
	}
}

async fn protected(Extension(claims): Extension<SessionClaims>) -> String {
	claims.sub.unwrap_or_default()
}

fn app(settings: RefreshSettings, transport: Arc<ScriptedTransport>) -> Router {
	let coordinator = Arc::new(TokenRefreshCoordinator::with_transport(settings, transport));
	let gate = SessionGate::new(coordinator.clone()).expect("Gate should build with a secret.");

	Router::new()
		.route("/protected", get(protected))
		.route_layer(middleware::from_fn_with_state(gate.clone(), require_session))
		.route("/token-names", get(token_names))
		.with_state(gate)
		.layer(middleware::from_fn_with_state(coordinator, refresh_session))
}

fn default_app(transport: Arc<ScriptedTransport>) -> Router {
	app(settings("https://auth.example.com/refresh"), transport)
}

fn request(uri: &str, cookies: Option<String>) -> Request<Body> {
	let mut builder = Request::builder().uri(uri);

	if let Some(cookies) = cookies {
		builder = builder.header(COOKIE, cookies);
	}

	builder.body(Body::empty()).expect("Request fixture should build.")
}

fn set_cookie_count(response: &Response<Body>) -> usize {
	response.headers().get_all(SET_COOKIE).iter().count()
}

fn set_cookie_names(response: &Response<Body>) -> Vec<String> {
	response
		.headers()
		.get_all(SET_COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.filter_map(|value| value.split_once('=').map(|(name, _)| name.to_owned()))
		.collect()
}

async fn body_text(response: Response<Body>) -> String {
	let bytes = response.into_body().collect().await.expect("Body should be readable.").to_bytes();

	String::from_utf8(bytes.to_vec()).expect("Body should be UTF-8.")
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
	let bytes = response.into_body().collect().await.expect("Body should be readable.").to_bytes();

	serde_json::from_slice(&bytes).expect("Body should be JSON.")
}

#[tokio::test]
async fn valid_session_passes_through_untouched() {
	let transport = ScriptedTransport::new(200);
	let session = packed_credential(Duration::hours(1), Some("r"));
	let response = default_app(transport.clone())
		.oneshot(request("/protected", Some(cookie_line(&session, "old"))))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(set_cookie_count(&response), 0);
	assert_eq!(transport.calls(), 0);
	assert_eq!(body_text(response).await, "user-1");
}

#[tokio::test]
async fn near_expiry_session_gets_refreshed_cookies_on_the_handler_response() {
	let transport = ScriptedTransport::new(200);
	let session = packed_credential(Duration::seconds(5), Some("r"));
	let response = default_app(transport.clone())
		.oneshot(request("/protected", Some(cookie_line(&session, "old"))))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(set_cookie_count(&response), 2);
	assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn expired_refreshable_session_is_served_with_the_proactively_refreshed_credential() {
	let transport = ScriptedTransport::new(200);
	let session = packed_credential(-Duration::minutes(10), Some("r"));
	let response = default_app(transport.clone())
		.oneshot(request("/protected", Some(cookie_line(&session, "old"))))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(set_cookie_names(&response), ["arxiv_oidc_session", "tapir_session"]);
	assert_eq!(transport.calls(), 1, "The reactive path must not call the endpoint again.");
	assert_eq!(body_text(response).await, "user-1");
}

#[tokio::test]
async fn expired_refreshable_session_is_refused_when_its_refresh_fails() {
	let transport = ScriptedTransport::new(503);
	let settings = settings_builder("https://auth.example.com/refresh")
		.max_attempts(2)
		.build()
		.expect("Settings fixture should build.");
	let session = packed_credential(-Duration::minutes(10), Some("r"));
	let response = app(settings, transport.clone())
		.oneshot(request("/protected", Some(cookie_line(&session, "old"))))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	assert_eq!(set_cookie_count(&response), 0);
	assert_eq!(transport.calls(), 2, "Only the proactive retry budget should be spent.");
}

#[tokio::test]
async fn transient_endpoint_failures_are_retried_before_cookies_are_set() {
	let transport = ScriptedTransport::script(&[503, 503, 200]);
	let session = packed_credential(Duration::seconds(5), Some("r"));
	let response = default_app(transport.clone())
		.oneshot(request("/protected", Some(cookie_line(&session, "old"))))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(transport.calls(), 3);

	let set_cookies = response
		.headers()
		.get_all(SET_COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.map(str::to_owned)
		.collect::<Vec<_>>();

	assert_eq!(set_cookies.len(), 2);
	assert!(set_cookies[0].starts_with("arxiv_oidc_session="));
	assert!(set_cookies[1].starts_with("tapir_session=newc"));
	assert!(set_cookies.iter().all(|cookie| cookie.contains("Max-Age=3600")));
	assert_eq!(body_text(response).await, "user-1");
}

#[tokio::test]
async fn failed_proactive_refresh_still_serves_the_request() {
	let transport = ScriptedTransport::new(400);
	let session = packed_credential(Duration::seconds(5), Some("r"));
	let response = default_app(transport.clone())
		.oneshot(request("/protected", Some(cookie_line(&session, "old"))))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(set_cookie_count(&response), 0);
	assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn expired_session_is_recovered_reactively() {
	let transport = ScriptedTransport::new(200);
	let session = packed_credential(-Duration::minutes(10), None);
	let response = default_app(transport.clone())
		.oneshot(request("/protected?x=1", Some(cookie_line(&session, "old"))))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(
		response.headers().get(LOCATION).and_then(|value| value.to_str().ok()),
		Some("/protected?x=1")
	);
	assert_eq!(set_cookie_count(&response), 2);
	assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn failed_reactive_recovery_is_unauthorized() {
	let transport = ScriptedTransport::new(503);
	let session = packed_credential(-Duration::minutes(10), None);
	let response = default_app(transport.clone())
		.oneshot(request("/protected", Some(cookie_line(&session, "old"))))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	assert_eq!(transport.calls(), 1);
	assert_eq!(body_json(response).await, json!({ "message": "Failed to refresh access token" }));
}

#[tokio::test]
async fn missing_session_is_unauthorized() {
	let transport = ScriptedTransport::new(200);
	let response = default_app(transport.clone())
		.oneshot(request("/protected", None))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn forged_session_is_sent_to_login_when_configured() {
	let exp = (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp();
	let forged = signed_jwt("not-the-secret", exp);
	let settings = settings_builder("https://auth.example.com/refresh")
		.login_redirect_url(
			Url::parse("https://login.example.com/login").expect("Login URL should parse."),
		)
		.build()
		.expect("Settings fixture should build.");
	let response = app(settings, ScriptedTransport::new(200))
		.oneshot(request("/protected?x=1", Some(cookie_line(&forged, "old"))))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(
		response.headers().get(LOCATION).and_then(|value| value.to_str().ok()),
		Some("https://login.example.com/login?next_page=%2Fprotected%3Fx%3D1")
	);

	let response = default_app(ScriptedTransport::new(200))
		.oneshot(request("/protected", Some(cookie_line(&forged, "old"))))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_names_reports_configured_cookies() {
	let settings = settings_builder("https://auth.example.com/refresh")
		.session_cookie_name("sess")
		.classic_cookie_name("legacy")
		.build()
		.expect("Settings fixture should build.");
	let response = app(settings, ScriptedTransport::new(200))
		.oneshot(request("/token-names", None))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_json(response).await, json!({ "session": "sess", "classic": "legacy" }));
}

#[test]
fn gate_requires_a_signing_secret() {
	let settings = RefreshSettings::builder(
		Url::parse("https://auth.example.com/refresh").expect("Refresh URL should parse."),
	)
	.build()
	.expect("Settings without a secret should build.");
	let coordinator =
		Arc::new(TokenRefreshCoordinator::with_transport(settings, ScriptedTransport::new(200)));

	assert!(matches!(SessionGate::new(coordinator), Err(SettingsError::MissingJwtSecret)));
}
