//! Inbound cookie lookups and outbound `Set-Cookie` propagation for refreshed credentials.

// crates.io
use axum::http::{
	HeaderMap, HeaderValue,
	header::{COOKIE, SET_COOKIE},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
// self
use crate::{_prelude::*, credential::Secret, refresh::RefreshResult};

/// Returns the value of the cookie called `name`, if the request carries it.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<Secret> {
	CookieJar::from_headers(headers).get(name).map(|cookie| Secret::new(cookie.value()))
}

/// Joins every inbound `Cookie` header into one forwardable value.
pub fn cookie_header(headers: &HeaderMap) -> Option<Secret> {
	let joined = headers
		.get_all(COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.collect::<Vec<_>>()
		.join("; ");

	if joined.is_empty() { None } else { Some(Secret::new(joined)) }
}

/// Builds the replacement session and classic cookies described by `result`.
pub fn refreshed_cookies(
	session_cookie_name: &str,
	classic_cookie_name: &str,
	result: &RefreshResult,
) -> [Cookie<'static>; 2] {
	[
		build_cookie(session_cookie_name, &result.session, result),
		build_cookie(classic_cookie_name, &result.classic, result),
	]
}

/// Appends one `Set-Cookie` header per cookie, skipping values that are not valid headers.
pub fn append_set_cookies(headers: &mut HeaderMap, cookies: &[Cookie<'static>]) {
	for cookie in cookies {
		match HeaderValue::from_str(&cookie.to_string()) {
			Ok(value) => {
				headers.append(SET_COOKIE, value);
			},
			Err(_) => tracing::warn!(
				cookie = cookie.name(),
				"Refreshed cookie is not a valid header value; skipping it."
			),
		}
	}
}

/// Maps the wire `samesite` string onto a cookie policy; unknown values omit the attribute.
pub fn parse_same_site(raw: &str) -> Option<SameSite> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"lax" => Some(SameSite::Lax),
		"strict" => Some(SameSite::Strict),
		"none" => Some(SameSite::None),
		_ => None,
	}
}

fn build_cookie(name: &str, value: &Secret, result: &RefreshResult) -> Cookie<'static> {
	let mut cookie = Cookie::build((name.to_owned(), value.expose().to_owned()))
		.path("/")
		.secure(result.secure)
		.build();

	if let Some(max_age) = result.max_age {
		cookie.set_max_age(Duration::seconds(max_age));
	}
	if let Some(domain) = result.domain.as_deref().filter(|domain| !domain.is_empty()) {
		cookie.set_domain(domain.to_owned());
	}
	if let Some(same_site) = result.samesite.as_deref().and_then(parse_same_site) {
		cookie.set_same_site(same_site);
	}

	cookie
}
