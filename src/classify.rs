//! Failure classification for authentication errors.
//!
//! Every non-success response is reduced to an [`ErrorClassification`] so the request
//! interceptor and the session controller agree on when a refresh can help. Only the
//! authentication-failure status (`401`) is ever considered refreshable; the message text
//! then disambiguates expired tokens from bad credentials, unverified accounts, and
//! tokens the backend will never accept again.

// self
use crate::{_prelude::*, error::ApiFailure};

/// Status code the backend uses for authentication failures.
pub const AUTH_FAILURE_STATUS: u16 = 401;

/// Endpoints whose failures must never trigger a refresh (substring match on the URL).
pub const REFRESH_EXCLUDED_ENDPOINTS: &[&str] = &[
	"/auth/login",
	"/auth/register",
	"/auth/refresh",
	"/auth/logout",
	"/auth/verify-email",
	"/auth/resend-verification",
	"/auth/send-verification-email",
	"/auth/forgot-password",
	"/auth/reset-password",
];

const INVALID_CREDENTIALS_HINTS: &[&str] = &[
	"invalid credentials",
	"incorrect password",
	"wrong password",
	"invalid password",
	"invalid email or password",
	"invalid username or password",
	"user not found",
];
const VERIFICATION_REQUIRED_HINTS: &[&str] = &[
	"not verified",
	"unverified",
	"verify your email",
	"verification required",
	"email verification",
];
const TOKEN_INVALID_HINTS: &[&str] = &[
	"refresh token",
	"invalid token",
	"token is invalid",
	"invalid signature",
	"jwt malformed",
	"malformed",
	"revoked",
];
const TOKEN_EXPIRED_HINTS: &[&str] = &["jwt expired", "token expired", "expired"];

/// Fixed taxonomy every failure is sorted into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
	/// Access token expired; a refresh can recover.
	TokenExpired,
	/// Token can never be accepted again; the session is over.
	TokenInvalid,
	/// Login credentials were rejected; surface to the user.
	InvalidCredentials,
	/// Account must be verified first; surface to the user.
	VerificationRequired,
	/// Request never produced a response.
	NetworkError,
	/// Anything else, surfaced as-is.
	Other,
}
impl ErrorClassification {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::TokenExpired => "token_expired",
			Self::TokenInvalid => "token_invalid",
			Self::InvalidCredentials => "invalid_credentials",
			Self::VerificationRequired => "verification_required",
			Self::NetworkError => "network_error",
			Self::Other => "other",
		}
	}

	/// Whether refreshing the access token can fix this failure.
	///
	/// `refresh_on_invalid_token` opts `token_invalid` into a single refresh attempt for
	/// backends that report expired tokens with "invalid" phrasing.
	pub const fn allows_refresh(self, refresh_on_invalid_token: bool) -> bool {
		match self {
			Self::TokenExpired => true,
			Self::TokenInvalid => refresh_on_invalid_token,
			_ => false,
		}
	}
}
impl Display for ErrorClassification {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Primitive view of a failed call handed to a [`FailureClassifier`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureContext {
	/// HTTP status code, when a response arrived.
	pub http_status: Option<u16>,
	/// Backend-supplied `message` (or `error`) field.
	pub message: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
	/// Whether the failure happened before any response arrived.
	pub network_error: bool,
}
impl FailureContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Builds a context from a raw response status and body.
	pub fn from_response(status: u16, body: &[u8]) -> Self {
		let mut ctx = Self::default().with_http_status(status);

		match serde_json::from_slice::<serde_json::Value>(body) {
			Ok(value) =>
				if let Some(message) = extract_message(&value) {
					ctx.message = Some(message);
				},
			Err(_) if !body.is_empty() =>
				ctx = ctx.with_body_preview(String::from_utf8_lossy(body).into_owned()),
			Err(_) => {},
		}

		ctx
	}

	/// Convenience constructor for transport-level failures.
	pub fn network_failure() -> Self {
		Self { network_error: true, ..Self::default() }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the backend message.
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());

		self
	}

	/// Adds a body preview, truncated to a bounded length.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Classifies the failure and packages it as an [`ApiFailure`].
	pub fn to_api_failure(&self, classifier: &dyn FailureClassifier) -> ApiFailure {
		ApiFailure {
			status: self.http_status.unwrap_or_default(),
			classification: classifier.classify(self),
			message: self.describe(),
		}
	}

	/// Best human-readable description of the failure.
	pub fn describe(&self) -> String {
		self.message
			.clone()
			.or_else(|| self.body_preview.clone())
			.unwrap_or_else(|| match self.http_status {
				Some(status) => format!("HTTP {status}"),
				None => "no response".into(),
			})
	}
}

/// Strategy hook that maps failures into the taxonomy.
///
/// Backends with their own error vocabulary implement this to teach the interceptor which
/// messages mean "refresh and retry".
pub trait FailureClassifier: Send + Sync {
	/// Classifies a failure.
	fn classify(&self, ctx: &FailureContext) -> ErrorClassification;
}

/// Default classifier matching case-insensitive message hints.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFailureClassifier;
impl FailureClassifier for DefaultFailureClassifier {
	fn classify(&self, ctx: &FailureContext) -> ErrorClassification {
		if ctx.network_error {
			return ErrorClassification::NetworkError;
		}

		let text = ctx.message.as_deref().or(ctx.body_preview.as_deref()).unwrap_or_default();

		match ctx.http_status {
			Some(status) => classify(status, text),
			None => ErrorClassification::Other,
		}
	}
}

/// Classifies a response by status code and message text.
pub fn classify(status: u16, message: &str) -> ErrorClassification {
	if status != AUTH_FAILURE_STATUS {
		return ErrorClassification::Other;
	}

	let lowered = message.to_lowercase();

	// Order matters: "refresh token expired" is fatal, not refreshable.
	[
		(INVALID_CREDENTIALS_HINTS, ErrorClassification::InvalidCredentials),
		(VERIFICATION_REQUIRED_HINTS, ErrorClassification::VerificationRequired),
		(TOKEN_INVALID_HINTS, ErrorClassification::TokenInvalid),
		(TOKEN_EXPIRED_HINTS, ErrorClassification::TokenExpired),
	]
	.into_iter()
	.find(|(hints, _)| hints.iter().any(|hint| lowered.contains(hint)))
	.map_or(ErrorClassification::TokenExpired, |(_, classification)| classification)
}

/// Returns `true` if `url` targets an endpoint that must never trigger a refresh.
pub fn is_excluded_endpoint(url: &str) -> bool {
	REFRESH_EXCLUDED_ENDPOINTS.iter().any(|endpoint| url.contains(endpoint))
}

/// Decides whether a failure on `request_url` should trigger a refresh.
///
/// Treats `token_invalid` as fatal; use [`ErrorClassification::allows_refresh`] directly
/// to opt into refreshing it.
pub fn should_attempt_refresh(classification: ErrorClassification, request_url: &str) -> bool {
	!is_excluded_endpoint(request_url) && classification.allows_refresh(false)
}

fn extract_message(value: &serde_json::Value) -> Option<String> {
	let object = value.as_object()?;

	["message", "error"].into_iter().find_map(|key| match object.get(key)? {
		serde_json::Value::String(text) => Some(text.clone()),
		nested @ serde_json::Value::Object(_) => extract_message(nested),
		_ => None,
	})
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= FailureContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = String::new();

	for (idx, ch) in body.chars().enumerate() {
		if idx >= FailureContext::BODY_PREVIEW_LIMIT {
			buf.push('…');

			break;
		}
		buf.push(ch);
	}

	buf
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn non_auth_statuses_are_other() {
		assert_eq!(classify(403, "jwt expired"), ErrorClassification::Other);
		assert_eq!(classify(500, ""), ErrorClassification::Other);
	}

	#[test]
	fn messages_disambiguate_auth_failures() {
		assert_eq!(classify(401, "jwt expired"), ErrorClassification::TokenExpired);
		assert_eq!(classify(401, "Token EXPIRED"), ErrorClassification::TokenExpired);
		assert_eq!(classify(401, "Invalid credentials"), ErrorClassification::InvalidCredentials);
		assert_eq!(
			classify(401, "Please verify your email first"),
			ErrorClassification::VerificationRequired
		);
		assert_eq!(classify(401, "jwt malformed"), ErrorClassification::TokenInvalid);
		assert_eq!(classify(401, "Refresh token expired"), ErrorClassification::TokenInvalid);
	}

	#[test]
	fn unmatched_auth_failures_default_to_expired() {
		assert_eq!(classify(401, "Unauthorized"), ErrorClassification::TokenExpired);
		assert_eq!(classify(401, ""), ErrorClassification::TokenExpired);
	}

	#[test]
	fn exclusion_list_blocks_auth_endpoints() {
		for url in [
			"https://api.example.com/auth/login",
			"https://api.example.com/auth/register",
			"https://api.example.com/auth/refresh-token",
			"https://api.example.com/auth/logout-all",
			"https://api.example.com/auth/verify-email",
			"https://api.example.com/auth/resend-verification",
			"https://api.example.com/auth/reset-password-request",
			"https://api.example.com/auth/reset-password/abc",
		] {
			assert!(is_excluded_endpoint(url), "{url} should be excluded.");
			assert!(!should_attempt_refresh(ErrorClassification::TokenExpired, url));
		}

		assert!(should_attempt_refresh(
			ErrorClassification::TokenExpired,
			"https://api.example.com/posts"
		));
	}

	#[test]
	fn only_expired_tokens_refresh_by_default() {
		let url = "https://api.example.com/posts";

		assert!(!should_attempt_refresh(ErrorClassification::InvalidCredentials, url));
		assert!(!should_attempt_refresh(ErrorClassification::VerificationRequired, url));
		assert!(!should_attempt_refresh(ErrorClassification::TokenInvalid, url));
		assert!(!should_attempt_refresh(ErrorClassification::NetworkError, url));
		assert!(ErrorClassification::TokenInvalid.allows_refresh(true));
	}

	#[test]
	fn context_extracts_messages_and_previews() {
		let ctx = FailureContext::from_response(401, br#"{"success":false,"message":"jwt expired"}"#);

		assert_eq!(ctx.message.as_deref(), Some("jwt expired"));
		assert_eq!(DefaultFailureClassifier.classify(&ctx), ErrorClassification::TokenExpired);

		let nested =
			FailureContext::from_response(401, br#"{"error":{"message":"Invalid credentials"}}"#);

		assert_eq!(
			DefaultFailureClassifier.classify(&nested),
			ErrorClassification::InvalidCredentials
		);

		let text = FailureContext::from_response(401, b"invalid signature");

		assert_eq!(text.body_preview.as_deref(), Some("invalid signature"));
		assert_eq!(DefaultFailureClassifier.classify(&text), ErrorClassification::TokenInvalid);

		let long = FailureContext::from_response(500, "x".repeat(400).as_bytes());

		assert_eq!(long.body_preview.map(|preview| preview.chars().count()), Some(257));
	}

	#[test]
	fn network_failures_are_classified_without_status() {
		let ctx = FailureContext::network_failure();

		assert_eq!(DefaultFailureClassifier.classify(&ctx), ErrorClassification::NetworkError);
		assert_eq!(ctx.describe(), "no response");
	}
}
