//! Redacting wrapper for raw cookie and credential strings.

// self
use crate::{_prelude::*, credential::CredentialFingerprint};

/// Raw cookie value that only ever renders as its fingerprint.
///
/// Serialization is transparent so the value can travel in refresh request and response
/// bodies unchanged.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
	/// Wraps a raw value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw value; never pass it to a log macro.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// `true` when the cookie carried no value at all.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Log-safe fingerprint of the raw value.
	pub fn fingerprint(&self) -> CredentialFingerprint {
		CredentialFingerprint::of(&self.0)
	}
}
impl From<&str> for Secret {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Secret({})", self.fingerprint())
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(&self.fingerprint(), f)
	}
}
