//! Runtime configuration for the token lifecycle.
//!
//! Every tunable the refresh coordinator, interceptor, and session controller consult
//! lives here under a name. Values come from [`SessionConfig::new`] plus the `with_*`
//! builders, or from `TOKEN_BROKER_*` environment variables via
//! [`SessionConfig::from_env`].

// self
use crate::{_prelude::*, error::ConfigError};

/// Paths of the authentication endpoints, relative to the API base URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEndpoints {
	/// Credential login.
	pub login: String,
	/// Account registration.
	pub register: String,
	/// Server-side logout for the current device.
	pub logout: String,
	/// Server-side logout for every device.
	pub logout_all: String,
	/// Access token refresh; authenticated by the httpOnly refresh cookie.
	pub refresh: String,
	/// Current user lookup, doubling as the liveness probe.
	pub me: String,
	/// Token/cookie pair validation used by route guards.
	pub check_auth: String,
}
impl Default for AuthEndpoints {
	fn default() -> Self {
		Self {
			login: "/auth/login".into(),
			register: "/auth/register".into(),
			logout: "/auth/logout".into(),
			logout_all: "/auth/logout-all".into(),
			refresh: "/auth/refresh-token".into(),
			me: "/auth/me".into(),
			check_auth: "/auth/check-auth".into(),
		}
	}
}

/// Configuration shared by every component of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
	/// Absolute base URL every request path is appended to.
	pub api_base_url: Url,
	/// Authentication endpoint paths.
	pub endpoints: AuthEndpoints,
	/// Minimum spacing between two refresh network calls.
	pub min_refresh_interval: Duration,
	/// Consecutive failed refreshes tolerated before forcing a logout.
	pub max_refresh_attempts: u32,
	/// Remaining lifetime below which a request refreshes before it is sent.
	pub inline_refresh_threshold: Duration,
	/// Remaining lifetime below which the liveness timer refreshes proactively.
	pub proactive_refresh_threshold: Duration,
	/// Period of the session liveness check.
	pub liveness_interval: Duration,
	/// Upper bound for a single request round trip.
	pub request_timeout: Duration,
	/// Allow one refresh for `token_invalid` failures instead of logging out.
	pub refresh_on_invalid_token: bool,
}
impl SessionConfig {
	/// Default spacing between refresh calls.
	pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::seconds(5);
	/// Default refresh attempt cap.
	pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = 3;
	/// Default inline (per-request) refresh threshold.
	pub const DEFAULT_INLINE_REFRESH_THRESHOLD: Duration = Duration::seconds(60);
	/// Default timer-driven refresh threshold.
	pub const DEFAULT_PROACTIVE_REFRESH_THRESHOLD: Duration = Duration::minutes(5);
	/// Default liveness check period.
	pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::minutes(5);
	/// Default request timeout.
	pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(30);

	const ENV_PREFIX: &'static str = "TOKEN_BROKER_";

	/// Creates a config with default tunables for the provided base URL.
	pub fn new(api_base_url: Url) -> Result<Self, ConfigError> {
		if !matches!(api_base_url.scheme(), "http" | "https") || api_base_url.cannot_be_a_base() {
			return Err(ConfigError::InvalidBaseUrl { url: api_base_url.to_string() });
		}

		Ok(Self {
			api_base_url,
			endpoints: AuthEndpoints::default(),
			min_refresh_interval: Self::DEFAULT_MIN_REFRESH_INTERVAL,
			max_refresh_attempts: Self::DEFAULT_MAX_REFRESH_ATTEMPTS,
			inline_refresh_threshold: Self::DEFAULT_INLINE_REFRESH_THRESHOLD,
			proactive_refresh_threshold: Self::DEFAULT_PROACTIVE_REFRESH_THRESHOLD,
			liveness_interval: Self::DEFAULT_LIVENESS_INTERVAL,
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
			refresh_on_invalid_token: false,
		})
	}

	/// Loads the config from `TOKEN_BROKER_*` environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads the config through an arbitrary variable lookup.
	///
	/// `API_URL` is required; every other variable falls back to its default.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |suffix: &str| {
			let name = format!("{}{suffix}", Self::ENV_PREFIX);
			let value = lookup(&name);

			(name, value)
		};
		let (name, raw_url) = var("API_URL");
		let raw_url = raw_url.ok_or(ConfigError::MissingEnv { name: name.clone() })?;
		let url = Url::parse(raw_url.trim())
			.map_err(|_| ConfigError::InvalidEnv { name, value: raw_url.clone() })?;
		let mut config = Self::new(url)?;
		let seconds = |suffix: &str| -> Result<Option<Duration>, ConfigError> {
			let (name, value) = var(suffix);

			value
				.map(|value| match value.trim().parse::<u32>() {
					Ok(secs) => Ok(Duration::seconds(secs.into())),
					Err(_) => Err(ConfigError::InvalidEnv { name, value }),
				})
				.transpose()
		};

		if let Some(interval) = seconds("MIN_REFRESH_INTERVAL_SECS")? {
			config.min_refresh_interval = interval;
		}
		if let Some(threshold) = seconds("INLINE_REFRESH_THRESHOLD_SECS")? {
			config.inline_refresh_threshold = threshold;
		}
		if let Some(threshold) = seconds("PROACTIVE_REFRESH_THRESHOLD_SECS")? {
			config.proactive_refresh_threshold = threshold;
		}
		if let Some(interval) = seconds("LIVENESS_INTERVAL_SECS")? {
			config.liveness_interval = interval;
		}
		if let Some(timeout) = seconds("REQUEST_TIMEOUT_SECS")? {
			config.request_timeout = timeout;
		}
		if let (name, Some(value)) = var("MAX_REFRESH_ATTEMPTS") {
			config.max_refresh_attempts = value
				.trim()
				.parse()
				.map_err(|_| ConfigError::InvalidEnv { name, value: value.clone() })?;
		}

		Ok(config)
	}

	/// Overrides the endpoint paths.
	pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Overrides the minimum spacing between refresh calls (negative values clamp to zero).
	pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
		self.min_refresh_interval = clamp(interval);

		self
	}

	/// Overrides the refresh attempt cap.
	pub fn with_max_refresh_attempts(mut self, attempts: u32) -> Self {
		self.max_refresh_attempts = attempts;

		self
	}

	/// Overrides the per-request refresh threshold.
	pub fn with_inline_refresh_threshold(mut self, threshold: Duration) -> Self {
		self.inline_refresh_threshold = clamp(threshold);

		self
	}

	/// Overrides the timer-driven refresh threshold.
	pub fn with_proactive_refresh_threshold(mut self, threshold: Duration) -> Self {
		self.proactive_refresh_threshold = clamp(threshold);

		self
	}

	/// Overrides the liveness check period.
	pub fn with_liveness_interval(mut self, interval: Duration) -> Self {
		self.liveness_interval = interval;

		self
	}

	/// Overrides the request timeout.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Opts `token_invalid` failures into a refresh attempt.
	pub fn with_refresh_on_invalid_token(mut self, enabled: bool) -> Self {
		self.refresh_on_invalid_token = enabled;

		self
	}

	/// Resolves a request path against the base URL.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		let base = self.api_base_url.as_str().trim_end_matches('/');
		let joined = if path.starts_with('/') {
			format!("{base}{path}")
		} else {
			format!("{base}/{path}")
		};

		Url::parse(&joined).map_err(|source| ConfigError::InvalidPath { path: path.into(), source })
	}

	pub(crate) fn std_duration(
		value: Duration,
		field: &'static str,
	) -> Result<std::time::Duration, ConfigError> {
		std::time::Duration::try_from(value).map_err(|_| ConfigError::NegativeDuration { field })
	}
}

fn clamp(value: Duration) -> Duration {
	if value.is_negative() { Duration::ZERO } else { value }
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashMap;
	// self
	use super::*;

	fn base() -> Url {
		Url::parse("https://api.example.com/api/").expect("Fixture URL should parse.")
	}

	#[test]
	fn defaults_are_named_constants() {
		let config = SessionConfig::new(base()).expect("HTTPS base should be accepted.");

		assert_eq!(config.min_refresh_interval, Duration::seconds(5));
		assert_eq!(config.max_refresh_attempts, 3);
		assert_eq!(config.inline_refresh_threshold, Duration::seconds(60));
		assert_eq!(config.proactive_refresh_threshold, Duration::minutes(5));
		assert_eq!(config.liveness_interval, Duration::minutes(5));
		assert!(!config.refresh_on_invalid_token);
		assert_eq!(config.endpoints.refresh, "/auth/refresh-token");
	}

	#[test]
	fn rejects_non_http_bases() {
		let url = Url::parse("ftp://example.com").expect("Fixture URL should parse.");

		assert!(matches!(SessionConfig::new(url), Err(ConfigError::InvalidBaseUrl { .. })));
	}

	#[test]
	fn resolve_joins_paths_without_double_slashes() {
		let config = SessionConfig::new(base()).expect("HTTPS base should be accepted.");

		assert_eq!(
			config.resolve("/auth/me").expect("Path should resolve.").as_str(),
			"https://api.example.com/api/auth/me"
		);
		assert_eq!(
			config.resolve("posts?page=2").expect("Path should resolve.").as_str(),
			"https://api.example.com/api/posts?page=2"
		);
	}

	#[test]
	fn builders_clamp_negative_durations() {
		let config = SessionConfig::new(base())
			.expect("HTTPS base should be accepted.")
			.with_min_refresh_interval(Duration::seconds(-1))
			.with_max_refresh_attempts(5);

		assert_eq!(config.min_refresh_interval, Duration::ZERO);
		assert_eq!(config.max_refresh_attempts, 5);
	}

	#[test]
	fn env_lookup_overrides_defaults() {
		let vars = HashMap::from([
			("TOKEN_BROKER_API_URL", "http://localhost:5000"),
			("TOKEN_BROKER_MIN_REFRESH_INTERVAL_SECS", "10"),
			("TOKEN_BROKER_MAX_REFRESH_ATTEMPTS", "2"),
			("TOKEN_BROKER_LIVENESS_INTERVAL_SECS", "60"),
		]);
		let config = SessionConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
			.expect("Environment fixture should load.");

		assert_eq!(config.api_base_url.as_str(), "http://localhost:5000/");
		assert_eq!(config.min_refresh_interval, Duration::seconds(10));
		assert_eq!(config.max_refresh_attempts, 2);
		assert_eq!(config.liveness_interval, Duration::seconds(60));
		assert_eq!(config.inline_refresh_threshold, Duration::seconds(60));
	}

	#[test]
	fn env_lookup_reports_missing_and_invalid_values() {
		let err = SessionConfig::from_lookup(|_| None).expect_err("API URL is required.");

		assert!(matches!(err, ConfigError::MissingEnv { ref name } if name == "TOKEN_BROKER_API_URL"));

		let vars = HashMap::from([
			("TOKEN_BROKER_API_URL", "http://localhost:5000"),
			("TOKEN_BROKER_MAX_REFRESH_ATTEMPTS", "many"),
		]);
		let err = SessionConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
			.expect_err("Non-numeric attempts should be rejected.");

		assert!(matches!(err, ConfigError::InvalidEnv { ref value, .. } if value == "many"));
	}
}
