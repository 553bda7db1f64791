//! Redacted bearer token wrapper.

// self
use crate::{_prelude::*, auth::expiry};

/// Short-lived bearer credential attached to authenticated requests.
///
/// The value is opaque to the client except for the self-describing `exp` claim, which
/// [`expiry`] reads without validating any signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);
impl AccessToken {
	/// Wraps a new token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Formats the value for an `Authorization` header.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}

	/// Decoded expiry instant, if the token carries a readable one.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		expiry::decode_expiry(&self.0)
	}

	/// Returns `true` when less than `threshold` of lifetime remains.
	pub fn is_expiring_soon(&self, threshold: Duration) -> bool {
		expiry::is_expiring_soon(&self.0, threshold)
	}
}
impl AsRef<str> for AccessToken {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("AccessToken").field(&"<redacted>").finish()
	}
}
impl Display for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
