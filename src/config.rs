//! Refresh settings, their builder, and environment loading.

// crates.io
use config::{Config, ConfigError as SourceError, Environment, Map};
// self
use crate::{_prelude::*, credential::Secret};

/// Default name of the session credential cookie.
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "arxiv_oidc_session";
/// Default name of the legacy credential cookie.
pub const DEFAULT_CLASSIC_COOKIE_NAME: &str = "tapir_session";

const SEPARATORS: &str = "()<>@,;:\\\"/[]?={}";

/// Errors raised while constructing or validating [`RefreshSettings`].
#[derive(Debug, ThisError)]
pub enum SettingsError {
	/// The environment could not be read or deserialized.
	#[error("Refresh settings could not be loaded from the environment.")]
	Source(#[from] SourceError),
	/// A URL setting could not be parsed.
	#[error("The {setting} setting is not a valid URL.")]
	InvalidUrl {
		/// Which setting failed to parse.
		setting: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// URLs must use HTTP(S).
	#[error("The {setting} setting must use http or https: {url}.")]
	UnsupportedScheme {
		/// Which setting failed validation.
		setting: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// Cookie names must be non-empty tokens.
	#[error("Cookie name `{name}` is not a valid cookie name.")]
	InvalidCookieName {
		/// Cookie name that failed validation.
		name: String,
	},
	/// Session and classic cookies must not share a name.
	#[error("Session and classic cookies must use distinct names, both are `{name}`.")]
	DuplicateCookieName {
		/// Shared cookie name.
		name: String,
	},
	/// At least one attempt is required.
	#[error("The refresh attempt budget must be at least 1.")]
	ZeroAttempts,
	/// The per-attempt timeout must be positive.
	#[error("The refresh attempt timeout must be positive.")]
	ZeroTimeout,
	/// The cache must hold at least one entry.
	#[error("The refresh cache capacity must be at least 1.")]
	ZeroCacheCapacity,
	/// The near-expiry threshold cannot be negative.
	#[error("The near-expiry threshold cannot be negative.")]
	NegativeThreshold,
	/// Session verification was requested without a signing secret.
	#[error("JWT_SECRET must be set to verify session credentials.")]
	MissingJwtSecret,
}

/// Immutable settings consumed by the coordinator and the session gate.
#[derive(Clone, Debug)]
pub struct RefreshSettings {
	/// External endpoint that mints replacement credentials.
	pub refresh_url: Url,
	/// Cookie carrying the session credential.
	pub session_cookie_name: String,
	/// Cookie carrying the legacy credential.
	pub classic_cookie_name: String,
	/// Upper bound for a single refresh attempt.
	pub attempt_timeout: StdDuration,
	/// Total number of refresh attempts, including the first one.
	pub max_attempts: u32,
	/// Remaining validity below which a credential is refreshed.
	pub threshold: Duration,
	/// Base delay between attempts.
	pub retry_backoff: StdDuration,
	/// Maximum number of cached refresh results.
	pub cache_capacity: usize,
	/// Lifetime of a cached refresh result.
	pub cache_ttl: StdDuration,
	/// HS256 secret used to verify session credentials.
	pub jwt_secret: Option<Secret>,
	/// Login page used when a credential is rejected outright.
	pub login_redirect_url: Option<Url>,
}
impl RefreshSettings {
	/// Creates a new builder for the provided refresh endpoint.
	pub fn builder(refresh_url: Url) -> RefreshSettingsBuilder {
		RefreshSettingsBuilder::new(refresh_url)
	}

	/// Loads settings from the process environment.
	pub fn from_env() -> Result<Self, SettingsError> {
		Self::load(Environment::default().try_parsing(true))
	}

	/// Loads settings from an explicit variable map instead of the process environment.
	pub fn from_source(vars: Map<String, String>) -> Result<Self, SettingsError> {
		Self::load(Environment::default().try_parsing(true).source(Some(vars)))
	}

	fn load(environment: Environment) -> Result<Self, SettingsError> {
		let vars: EnvSettings = Config::builder().add_source(environment).build()?.try_deserialize()?;

		vars.into_builder()?.build()
	}

	fn validate(&self) -> Result<(), SettingsError> {
		validate_url("AAA_TOKEN_REFRESH_URL", &self.refresh_url)?;

		if let Some(login) = self.login_redirect_url.as_ref() {
			validate_url("AAA_LOGIN_REDIRECT_URL", login)?;
		}

		validate_cookie_name(&self.session_cookie_name)?;
		validate_cookie_name(&self.classic_cookie_name)?;

		if self.session_cookie_name == self.classic_cookie_name {
			return Err(SettingsError::DuplicateCookieName {
				name: self.session_cookie_name.clone(),
			});
		}
		if self.max_attempts == 0 {
			return Err(SettingsError::ZeroAttempts);
		}
		if self.attempt_timeout.is_zero() {
			return Err(SettingsError::ZeroTimeout);
		}
		if self.cache_capacity == 0 {
			return Err(SettingsError::ZeroCacheCapacity);
		}
		if self.threshold.is_negative() {
			return Err(SettingsError::NegativeThreshold);
		}

		Ok(())
	}
}

/// Builder for [`RefreshSettings`] values.
#[derive(Debug)]
pub struct RefreshSettingsBuilder {
	settings: RefreshSettings,
}
impl RefreshSettingsBuilder {
	const DEFAULT_ATTEMPT_TIMEOUT: StdDuration = StdDuration::from_secs(2);
	const DEFAULT_BACKOFF: StdDuration = StdDuration::from_millis(100);
	const DEFAULT_CACHE_CAPACITY: usize = 100;
	const DEFAULT_CACHE_TTL: StdDuration = StdDuration::from_secs(10);
	const DEFAULT_MAX_ATTEMPTS: u32 = 5;
	const DEFAULT_THRESHOLD: Duration = Duration::seconds(30);

	/// Creates a builder seeded with defaults and the provided refresh endpoint.
	pub fn new(refresh_url: Url) -> Self {
		Self {
			settings: RefreshSettings {
				refresh_url,
				session_cookie_name: DEFAULT_SESSION_COOKIE_NAME.into(),
				classic_cookie_name: DEFAULT_CLASSIC_COOKIE_NAME.into(),
				attempt_timeout: Self::DEFAULT_ATTEMPT_TIMEOUT,
				max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
				threshold: Self::DEFAULT_THRESHOLD,
				retry_backoff: Self::DEFAULT_BACKOFF,
				cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
				cache_ttl: Self::DEFAULT_CACHE_TTL,
				jwt_secret: None,
				login_redirect_url: None,
			},
		}
	}

	/// Overrides the session cookie name.
	pub fn session_cookie_name(mut self, name: impl Into<String>) -> Self {
		self.settings.session_cookie_name = name.into();

		self
	}

	/// Overrides the classic cookie name.
	pub fn classic_cookie_name(mut self, name: impl Into<String>) -> Self {
		self.settings.classic_cookie_name = name.into();

		self
	}

	/// Overrides the per-attempt timeout (defaults to 2 seconds).
	pub fn attempt_timeout(mut self, timeout: StdDuration) -> Self {
		self.settings.attempt_timeout = timeout;

		self
	}

	/// Overrides the attempt budget (defaults to 5).
	pub fn max_attempts(mut self, attempts: u32) -> Self {
		self.settings.max_attempts = attempts;

		self
	}

	/// Overrides the near-expiry threshold (defaults to 30 seconds).
	pub fn threshold(mut self, threshold: Duration) -> Self {
		self.settings.threshold = threshold;

		self
	}

	/// Overrides the base retry delay (defaults to 100 milliseconds).
	pub fn retry_backoff(mut self, backoff: StdDuration) -> Self {
		self.settings.retry_backoff = backoff;

		self
	}

	/// Overrides the cache capacity (defaults to 100 entries).
	pub fn cache_capacity(mut self, capacity: usize) -> Self {
		self.settings.cache_capacity = capacity;

		self
	}

	/// Overrides the cache entry lifetime (defaults to 10 seconds).
	pub fn cache_ttl(mut self, ttl: StdDuration) -> Self {
		self.settings.cache_ttl = ttl;

		self
	}

	/// Sets the HS256 secret used by the session gate.
	pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
		self.settings.jwt_secret = Some(Secret::new(secret));

		self
	}

	/// Sets the login page used for rejected credentials.
	pub fn login_redirect_url(mut self, url: Url) -> Self {
		self.settings.login_redirect_url = Some(url);

		self
	}

	/// Consumes the builder and validates the resulting settings.
	pub fn build(self) -> Result<RefreshSettings, SettingsError> {
		self.settings.validate()?;

		Ok(self.settings)
	}
}

#[derive(Debug, Deserialize)]
struct EnvSettings {
	aaa_token_refresh_url: String,
	auth_session_cookie_name: Option<String>,
	classic_cookie_name: Option<String>,
	token_refresh_timeout_secs: Option<f64>,
	token_refresh_max_retries: Option<u32>,
	token_refresh_threshold_secs: Option<i64>,
	token_refresh_backoff_ms: Option<u64>,
	token_refresh_cache_capacity: Option<usize>,
	token_refresh_cache_ttl_secs: Option<u64>,
	jwt_secret: Option<String>,
	aaa_login_redirect_url: Option<String>,
}
impl EnvSettings {
	fn into_builder(self) -> Result<RefreshSettingsBuilder, SettingsError> {
		let refresh_url = parse_url("AAA_TOKEN_REFRESH_URL", &self.aaa_token_refresh_url)?;
		let mut builder = RefreshSettings::builder(refresh_url);

		if let Some(name) = self.auth_session_cookie_name {
			builder = builder.session_cookie_name(name);
		}
		if let Some(name) = self.classic_cookie_name {
			builder = builder.classic_cookie_name(name);
		}
		if let Some(secs) = self.token_refresh_timeout_secs {
			builder = builder.attempt_timeout(
				StdDuration::try_from_secs_f64(secs).map_err(|_| SettingsError::ZeroTimeout)?,
			);
		}
		if let Some(attempts) = self.token_refresh_max_retries {
			builder = builder.max_attempts(attempts);
		}
		if let Some(secs) = self.token_refresh_threshold_secs {
			builder = builder.threshold(Duration::seconds(secs));
		}
		if let Some(millis) = self.token_refresh_backoff_ms {
			builder = builder.retry_backoff(StdDuration::from_millis(millis));
		}
		if let Some(capacity) = self.token_refresh_cache_capacity {
			builder = builder.cache_capacity(capacity);
		}
		if let Some(secs) = self.token_refresh_cache_ttl_secs {
			builder = builder.cache_ttl(StdDuration::from_secs(secs));
		}
		if let Some(secret) = self.jwt_secret.filter(|value| !value.is_empty()) {
			builder = builder.jwt_secret(secret);
		}
		if let Some(login) = self.aaa_login_redirect_url.filter(|value| !value.is_empty()) {
			builder = builder.login_redirect_url(parse_url("AAA_LOGIN_REDIRECT_URL", &login)?);
		}

		Ok(builder)
	}
}

fn parse_url(setting: &'static str, raw: &str) -> Result<Url, SettingsError> {
	Url::parse(raw.trim()).map_err(|source| SettingsError::InvalidUrl { setting, source })
}

fn validate_url(setting: &'static str, url: &Url) -> Result<(), SettingsError> {
	match url.scheme() {
		"http" | "https" => Ok(()),
		_ => Err(SettingsError::UnsupportedScheme { setting, url: url.to_string() }),
	}
}

fn validate_cookie_name(name: &str) -> Result<(), SettingsError> {
	// RFC 6265 cookie-name is an RFC 2616 token.
	let is_token = |c: char| c.is_ascii_graphic() && !SEPARATORS.contains(c);

	if name.is_empty() || !name.chars().all(is_token) {
		Err(SettingsError::InvalidCookieName { name: name.into() })
	} else {
		Ok(())
	}
}
