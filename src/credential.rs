//! Session credential inspection: unverified claim decoding and the near-expiry decision.
//!
//! A session cookie carries either the packed form
//! `<base64 envelope>.<jwt header>.<jwt payload>.<jwt signature>`, where the JSON envelope
//! holds `expires_at` and the optional `refresh` token, or a plain three-segment JWT whose
//! payload holds the same claims. Decoding here never verifies signatures; that is the job
//! of [`crate::auth::Authenticator`].

pub mod secret;

pub use secret::Secret;

// crates.io
use base64::{
	Engine,
	engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
// self
use crate::_prelude::*;

const EXPIRES_AT_CLAIM: &str = "expires_at";
const REFRESH_CLAIM: &str = "refresh";
const FINGERPRINT_LEN: usize = 16;

/// Outcome of inspecting a credential against the near-expiry threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshDecision {
	/// Remaining validity is at or above the threshold.
	Fresh,
	/// The credential is near expiry (or its expiry is unknown) but carries no refresh token.
	NoRefreshCapability,
	/// The credential is near expiry and can be refreshed.
	Refresh,
}
impl RefreshDecision {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshDecision::Fresh => "fresh",
			RefreshDecision::NoRefreshCapability => "no_refresh_capability",
			RefreshDecision::Refresh => "refresh",
		}
	}
}
impl Display for RefreshDecision {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Session credential read from the inbound cookie, with its unverified claims.
#[derive(Clone)]
pub struct Credential {
	raw: Secret,
	claims: Option<Map<String, Value>>,
	expires_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Decodes the credential without verifying its signature.
	///
	/// Undecodable values still produce a [`Credential`]; they simply expose no claims.
	pub fn parse(raw: impl Into<String>) -> Self {
		let raw = Secret::new(raw);
		let claims = decode_claims(raw.expose());
		let expires_at = claims.as_ref().and_then(|map| map.get(EXPIRES_AT_CLAIM)).and_then(parse_instant);

		Self { raw, claims, expires_at }
	}

	/// Raw cookie value, used verbatim as the refresh cache key.
	pub fn raw(&self) -> &Secret {
		&self.raw
	}

	/// Decoded claims, if the credential could be decoded at all.
	pub fn claims(&self) -> Option<&Map<String, Value>> {
		self.claims.as_ref()
	}

	/// Parsed `expires_at` claim.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}

	/// Returns `true` when the claims carry a non-null `refresh` entry.
	pub fn has_refresh_capability(&self) -> bool {
		self.claims
			.as_ref()
			.and_then(|map| map.get(REFRESH_CLAIM))
			.is_some_and(|value| !value.is_null())
	}

	/// Returns `true` when the remaining validity is below `threshold`.
	///
	/// A missing or unparseable `expires_at` always needs a refresh.
	pub fn needs_refresh(&self, now: OffsetDateTime, threshold: Duration) -> bool {
		match self.expires_at {
			Some(expires_at) => expires_at - now < threshold,
			None => true,
		}
	}

	/// Combines the expiry check with the refresh capability check.
	pub fn decide(&self, now: OffsetDateTime, threshold: Duration) -> RefreshDecision {
		if !self.needs_refresh(now, threshold) {
			RefreshDecision::Fresh
		} else if self.has_refresh_capability() {
			RefreshDecision::Refresh
		} else {
			RefreshDecision::NoRefreshCapability
		}
	}

	/// Signed JWT portion of the credential, if it has one.
	pub fn jwt(&self) -> Option<&str> {
		let raw = self.raw.expose();

		match raw.matches('.').count() {
			2 => Some(raw),
			3 => raw.split_once('.').map(|(_, jwt)| jwt),
			_ => None,
		}
	}

	/// Log-safe fingerprint of the raw value.
	pub fn fingerprint(&self) -> CredentialFingerprint {
		self.raw.fingerprint()
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("fingerprint", &self.fingerprint())
			.field("decoded", &self.claims.is_some())
			.field("expires_at", &self.expires_at)
			.field("refresh", &self.has_refresh_capability())
			.finish()
	}
}

/// Truncated base64 (no padding) SHA-256 digest of a raw credential.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CredentialFingerprint(String);
impl CredentialFingerprint {
	/// Computes the fingerprint for `raw`.
	pub fn of(raw: &str) -> Self {
		let mut encoded = URL_SAFE_NO_PAD.encode(Sha256::digest(raw.as_bytes()));

		encoded.truncate(FINGERPRINT_LEN);

		Self(encoded)
	}

	/// Returns the fingerprint string.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for CredentialFingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CredentialFingerprint({})", self.0)
	}
}
impl Display for CredentialFingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn decode_claims(raw: &str) -> Option<Map<String, Value>> {
	let segments = raw.split('.').collect::<Vec<_>>();
	let encoded = match segments.as_slice() {
		[envelope] | [envelope, _, _, _] => *envelope,
		[_, payload, _] => *payload,
		_ => return None,
	};

	decode_json_segment(encoded)
}

fn decode_json_segment(segment: &str) -> Option<Map<String, Value>> {
	if segment.is_empty() {
		return None;
	}

	let bytes =
		[URL_SAFE_NO_PAD, URL_SAFE, STANDARD, STANDARD_NO_PAD].iter().find_map(|engine| {
			engine.decode(segment).ok()
		})?;

	match serde_json::from_slice(&bytes).ok()? {
		Value::Object(map) => Some(map),
		_ => None,
	}
}

fn parse_instant(value: &Value) -> Option<OffsetDateTime> {
	match value {
		Value::String(text) => OffsetDateTime::parse(text.trim(), &Rfc3339).ok(),
		Value::Number(number) =>
			number.as_i64().and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok()),
		_ => None,
	}
}
