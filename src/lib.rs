//! Keep browser sessions alive behind axum: inspect session cookies, refresh credentials that are
//! about to expire, collapse concurrent refreshes, and hand replacement cookies back to the client.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod cookies;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod http;
pub mod middleware;
pub mod obs;
pub mod refresh;

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::{Duration as StdDuration, Instant},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use axum;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {http_body_util as _, httpmock as _, tower as _};
