//! Session credential verification for protected routes.
//!
//! [`Authenticator`] checks the HS256 signature of the JWT carried by the session cookie
//! (plain or packed form) and classifies the result: a valid credential yields its
//! [`SessionClaims`], a correctly signed but expired one without a refresh capability asks for
//! a reactive refresh, and everything else is rejected. Expired credentials that do carry a
//! refresh capability belong to the proactive refresh layer, so they are rejected here.

// crates.io
use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	cookies,
	credential::{Credential, Secret},
};

/// Verified claims of a session credential, inserted into request extensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
	/// Subject identifier, when the issuer provides one.
	#[serde(default)]
	pub sub: Option<String>,
	/// Expiration as a Unix timestamp.
	pub exp: i64,
	/// Remaining claims.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Why a credential was refused without attempting a refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
	/// No session cookie was presented.
	Missing,
	/// The credential is malformed or its signature does not verify.
	Invalid {
		/// Verification failure description.
		reason: String,
	},
}

/// Result of authenticating a request.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthOutcome {
	/// The credential verified.
	Valid(SessionClaims),
	/// The credential verified but expired and cannot be refreshed proactively; a reactive
	/// refresh may recover it.
	NeedsReactiveRefresh,
	/// The credential cannot be used.
	Rejected(Rejection),
}

/// HS256 verifier for session credentials.
#[derive(Clone)]
pub struct Authenticator {
	key: DecodingKey,
	validation: Validation,
}
impl Authenticator {
	/// Creates a verifier for the provided shared secret.
	pub fn new(secret: &Secret) -> Self {
		let mut validation = Validation::new(Algorithm::HS256);

		validation.leeway = 0;

		Self { key: DecodingKey::from_secret(secret.expose().as_bytes()), validation }
	}

	/// Verifies the session cookie called `cookie_name`.
	pub fn authenticate(&self, headers: &HeaderMap, cookie_name: &str) -> AuthOutcome {
		match cookies::cookie_value(headers, cookie_name) {
			Some(raw) => self.verify(&Credential::parse(raw.expose())),
			None => AuthOutcome::Rejected(Rejection::Missing),
		}
	}

	/// Verifies an already parsed credential.
	pub fn verify(&self, credential: &Credential) -> AuthOutcome {
		let Some(jwt) = credential.jwt() else {
			return AuthOutcome::Rejected(Rejection::Invalid {
				reason: "Credential does not carry a signed token.".into(),
			});
		};

		match jsonwebtoken::decode::<SessionClaims>(jwt, &self.key, &self.validation) {
			Ok(data) => AuthOutcome::Valid(data.claims),
			Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
				tracing::debug!(credential = %credential.fingerprint(), "Session credential expired.");

				if credential.has_refresh_capability() {
					AuthOutcome::Rejected(Rejection::Invalid {
						reason: "Session credential expired and its proactive refresh failed.".into(),
					})
				} else {
					AuthOutcome::NeedsReactiveRefresh
				}
			},
			Err(err) => {
				tracing::debug!(
					credential = %credential.fingerprint(),
					error = %err,
					"Session credential failed verification."
				);

				AuthOutcome::Rejected(Rejection::Invalid { reason: err.to_string() })
			},
		}
	}
}
impl Debug for Authenticator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Authenticator").field("algorithm", &Algorithm::HS256).finish_non_exhaustive()
	}
}
