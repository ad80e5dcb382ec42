//! Crate-level error types shared by the transport, refresh client, and coordinator.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error produced while refreshing a session credential.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; safe to retry.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Refresh endpoint answered with a status that is neither success nor a server error.
	#[error("Refresh endpoint rejected the request with HTTP {status}.")]
	Rejected {
		/// HTTP status code returned by the endpoint.
		status: u16,
	},
	/// Refresh endpoint answered 200 with a body that is not a refresh result.
	#[error("Refresh endpoint returned a malformed body.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Every attempt in the retry budget failed with a transient error.
	#[error("Refresh endpoint did not succeed within {attempts} attempts.")]
	RetriesExhausted {
		/// Number of attempts performed.
		attempts: u32,
		/// Failure observed on the final attempt.
		#[source]
		last: Box<Error>,
	},
}
impl Error {
	/// Returns `true` when another attempt may succeed (timeouts, connect failures, 5xx).
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Transient(_) => true,
			Self::Transport(err) => err.is_transient(),
			_ => false,
		}
	}
}

/// Configuration failures raised while assembling the refresh stack.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Refresh endpoint returned a 5xx status.
	#[error("Refresh endpoint returned server error HTTP {status}.")]
	Upstream {
		/// HTTP status code returned by the endpoint.
		status: u16,
	},
}

/// Transport-level failures.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// The attempt did not complete within the per-attempt timeout.
	#[error("Refresh endpoint did not answer within the attempt timeout.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// A connection to the refresh endpoint could not be established.
	#[error("Could not connect to the refresh endpoint.")]
	Connect {
		/// Transport-specific connect error.
		#[source]
		source: BoxError,
	},
	/// Any other network failure.
	#[error("Network error occurred while calling the refresh endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific timeout.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Wraps a transport-specific connect failure.
	pub fn connect(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Connect { source: Box::new(src) }
	}

	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Timeouts and connect failures are retried; other network errors are not.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Timeout { .. } | Self::Connect { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::timeout(e)
		} else if e.is_connect() {
			Self::connect(e)
		} else {
			Self::network(e)
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::io::{Error as IoError, ErrorKind};
	// self
	use super::*;

	#[test]
	fn transient_classification_covers_timeouts_connects_and_5xx() {
		let timeout: Error = TransportError::timeout(IoError::from(ErrorKind::TimedOut)).into();
		let connect: Error =
			TransportError::connect(IoError::from(ErrorKind::ConnectionRefused)).into();
		let network: Error = TransportError::network(IoError::from(ErrorKind::BrokenPipe)).into();
		let upstream: Error = TransientError::Upstream { status: 503 }.into();

		assert!(timeout.is_transient());
		assert!(connect.is_transient());
		assert!(upstream.is_transient());
		assert!(!network.is_transient());
		assert!(!Error::Rejected { status: 401 }.is_transient());
	}

	#[test]
	fn exhausted_error_exposes_last_failure_as_source() {
		let err = Error::RetriesExhausted {
			attempts: 5,
			last: Box::new(TransientError::Upstream { status: 502 }.into()),
		};
		let source = std::error::Error::source(&err)
			.expect("Exhausted error should expose the final failure as its source.");

		assert!(err.to_string().contains("5 attempts"));
		assert!(source.to_string().contains("502"));
	}
}
