//! Transport primitives for refresh calls against the external identity provider.
//!
//! The module exposes [`RefreshTransport`] alongside [`RefreshCall`] and [`RawResponse`] so
//! hosts and tests can swap the HTTP stack without touching the retry policy. A transport
//! performs exactly one attempt per call: it must honor [`RefreshCall::timeout`], report
//! timeouts and connect failures through the matching [`TransportError`] variants so the
//! refresh client can classify them as retryable, and return every HTTP status (including
//! errors) as a [`RawResponse`].

// self
use crate::{_prelude::*, credential::Secret, error::TransportError};

/// Boxed future returned by [`RefreshTransport::post_refresh`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of POSTing a refresh request.
pub trait RefreshTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends one refresh attempt.
	fn post_refresh<'a>(&'a self, call: &'a RefreshCall) -> TransportFuture<'a>;
}

/// JSON body posted to the refresh endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequestBody {
	/// Raw session cookie value.
	pub session: Option<Secret>,
	/// Raw classic cookie value.
	pub classic: Option<Secret>,
}

/// Everything a transport needs to perform one refresh attempt.
#[derive(Clone, Debug)]
pub struct RefreshCall {
	/// Refresh endpoint.
	pub url: Url,
	/// JSON body carrying the current credentials.
	pub body: RefreshRequestBody,
	/// Inbound `Cookie` header, forwarded verbatim.
	pub cookie_header: Option<Secret>,
	/// Upper bound for the attempt.
	pub timeout: StdDuration,
}

/// Status and body of a refresh endpoint response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl RawResponse {
	/// Creates a response from a status code and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, body: body.into() }
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Refresh endpoints answer directly, so redirects are never followed; configure any custom
/// client passed to [`ReqwestTransport::with_client`] the same way.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with redirects disabled.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl RefreshTransport for ReqwestTransport {
	fn post_refresh<'a>(&'a self, call: &'a RefreshCall) -> TransportFuture<'a> {
		Box::pin(async move {
			let mut request =
				self.0.post(call.url.clone()).timeout(call.timeout).json(&call.body);

			if let Some(cookies) = call.cookie_header.as_ref() {
				request = request.header(reqwest::header::COOKIE, cookies.expose());
			}

			let response = request.send().await?;
			let status = response.status().as_u16();
			let body = response.bytes().await?.to_vec();

			Ok(RawResponse { status, body })
		})
	}
}
