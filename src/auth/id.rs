//! Identifiers of the account a session belongs to.
//!
//! The backend owns the identifier format, so these wrappers accept any string it returns
//! and only exist to keep user ids and usernames from being swapped.

// self
use crate::_prelude::*;

macro_rules! backend_id {
	($name:ident, $doc:literal) => {
		#[doc = $doc]
		#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);
		impl $name {
			/// Wraps a backend-supplied value.
			pub fn new(value: impl Into<String>) -> Self {
				Self(value.into())
			}

			/// Borrows the raw value.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl From<String> for $name {
			fn from(value: String) -> Self {
				Self(value)
			}
		}
		impl From<&str> for $name {
			fn from(value: &str) -> Self {
				Self(value.to_owned())
			}
		}
	};
}

backend_id! { UserId, "Backend-assigned identifier for an account." }
backend_id! { Username, "Public handle chosen by an account holder." }

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn backend_values_are_accepted_verbatim() {
		let id: UserId = serde_json::from_str("\"  legacy id with spaces \"")
			.expect("Any backend string should deserialize.");

		assert_eq!(id.as_str(), "  legacy id with spaces ");

		let long = "a".repeat(512);
		let name: Username =
			serde_json::from_value(serde_json::Value::String(long.clone())).expect("Long handles are allowed.");

		assert_eq!(name.as_ref(), long);
		assert_eq!(serde_json::to_string(&UserId::new("u1")).expect("Id should serialize."), "\"u1\"");
	}
}
