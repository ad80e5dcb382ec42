//! Fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::time::Duration as StdDuration;
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;
use session_refresher::{
	axum::http::{HeaderMap, HeaderValue, header::COOKIE},
	config::{RefreshSettings, RefreshSettingsBuilder},
	url::Url,
};
use time::{Duration, OffsetDateTime};

pub const JWT_SECRET: &str = "integration-secret";
pub const SUCCESS_BODY: &str = r#"{"session":"new","classic":"newc","max_age":3600,"domain":"example.com","secure":true,"samesite":"lax"}"#;

/// Refresh endpoint body whose session verifies against [`JWT_SECRET`] for the next hour.
pub fn refreshed_body() -> String {
	json!({
		"session": packed_credential(Duration::hours(1), Some("r2")),
		"classic": "newc",
		"max_age": 3600,
		"domain": "example.com",
		"secure": true,
		"samesite": "lax",
	})
	.to_string()
}

/// Settings pointing at `refresh_url` with retry sleeps disabled.
pub fn settings_builder(refresh_url: &str) -> RefreshSettingsBuilder {
	RefreshSettings::builder(Url::parse(refresh_url).expect("Refresh URL fixture should parse."))
		.retry_backoff(StdDuration::ZERO)
		.jwt_secret(JWT_SECRET)
}

pub fn settings(refresh_url: &str) -> RefreshSettings {
	settings_builder(refresh_url).build().expect("Settings fixture should build.")
}

/// Packed credential whose envelope expires `expires_in` from now.
pub fn packed_credential(expires_in: Duration, refresh: Option<&str>) -> String {
	let expires_at = OffsetDateTime::now_utc() + expires_in;
	let envelope = json!({ "expires_at": expires_at.unix_timestamp(), "refresh": refresh });

	format!(
		"{}.{}",
		URL_SAFE_NO_PAD.encode(envelope.to_string()),
		signed_jwt(JWT_SECRET, expires_at.unix_timestamp())
	)
}

/// HS256 token for `user-1` expiring at `exp`.
pub fn signed_jwt(secret: &str, exp: i64) -> String {
	jsonwebtoken::encode(
		&Header::new(Algorithm::HS256),
		&json!({ "sub": "user-1", "exp": exp }),
		&EncodingKey::from_secret(secret.as_bytes()),
	)
	.expect("Token fixture should encode.")
}

/// Request headers carrying the default session and classic cookies.
pub fn cookie_headers(session: &str, classic: &str) -> HeaderMap {
	let mut headers = HeaderMap::new();

	headers.insert(
		COOKIE,
		HeaderValue::from_str(&cookie_line(session, classic))
			.expect("Cookie fixture should be valid."),
	);

	headers
}

pub fn cookie_line(session: &str, classic: &str) -> String {
	format!("arxiv_oidc_session={session}; tapir_session={classic}")
}
