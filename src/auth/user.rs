//! Account records returned by the authentication endpoints.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, UserId, Username},
};

/// Identity record for the signed-in account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
	/// Backend-assigned identifier.
	pub id: UserId,
	/// Public handle.
	pub username: Username,
	/// Email address, only present for the account owner.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Display name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub full_name: Option<String>,
	/// Avatar URL.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub avatar: Option<String>,
	/// Whether the email address has been verified.
	#[serde(default)]
	pub is_verified: bool,
	/// Whether the profile is private.
	#[serde(default)]
	pub is_private: bool,
}

/// Credentials accepted by the login endpoint.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
	/// Email address or username.
	pub email_or_username: String,
	/// Plain-text password sent over TLS.
	pub password: String,
}
impl LoginRequest {
	/// Creates a login request.
	pub fn new(email_or_username: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email_or_username: email_or_username.into(), password: password.into() }
	}
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("email_or_username", &self.email_or_username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Fields accepted by the registration endpoint.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
	/// Display name.
	pub full_name: String,
	/// Desired handle.
	pub username: String,
	/// Email address.
	pub email: String,
	/// Plain-text password sent over TLS.
	pub password: String,
}
impl Debug for RegisterRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RegisterRequest")
			.field("full_name", &self.full_name)
			.field("username", &self.username)
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Payload returned by login and registration.
///
/// Deployments that keep the access token in cookies return the bare user record; others
/// return `{ user, accessToken }`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum AuthPayload {
	/// User plus bearer token.
	WithToken {
		/// Signed-in account.
		user: User,
		/// Freshly minted access token.
		#[serde(rename = "accessToken")]
		access_token: AccessToken,
	},
	/// User only; the token travels in cookies.
	UserOnly(User),
}
impl AuthPayload {
	/// Splits the payload into the user and the optional token.
	pub fn into_parts(self) -> (User, Option<AccessToken>) {
		match self {
			Self::WithToken { user, access_token } => (user, Some(access_token)),
			Self::UserOnly(user) => (user, None),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn payload_accepts_both_shapes() {
		let with_token: AuthPayload = serde_json::from_str(
			r#"{"user":{"id":"u1","username":"jane","isVerified":true},"accessToken":"abc"}"#,
		)
		.expect("Payload with token should deserialize.");
		let (user, token) = with_token.into_parts();

		assert_eq!(user.username.as_str(), "jane");
		assert!(user.is_verified);
		assert_eq!(token.as_ref().map(AccessToken::expose), Some("abc"));

		let bare: AuthPayload = serde_json::from_str(
			r#"{"id":"u2","username":"joe","fullName":"Joe","isPrivate":true}"#,
		)
		.expect("Bare user payload should deserialize.");
		let (user, token) = bare.into_parts();

		assert_eq!(user.full_name.as_deref(), Some("Joe"));
		assert!(user.is_private);
		assert!(token.is_none());
	}

	#[test]
	fn credentials_serialize_camel_case_and_redact() {
		let request = LoginRequest::new("jane", "hunter2");
		let body = serde_json::to_value(&request).expect("Login request should serialize.");

		assert_eq!(body["emailOrUsername"], "jane");
		assert!(!format!("{request:?}").contains("hunter2"));
	}
}
