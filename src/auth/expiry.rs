//! Remaining-lifetime estimation for self-describing bearer tokens.
//!
//! Tokens are expected to be JWT-shaped (`header.payload.signature`) with a numeric `exp`
//! claim in the payload. Nothing here verifies a signature; the backend owns that. Any
//! token whose expiry cannot be read is reported as already expiring so callers refresh
//! instead of sending a credential of unknown age.

// crates.io
use base64::{
	Engine,
	engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};
// self
use crate::_prelude::*;

#[derive(Deserialize)]
struct ExpiryClaim {
	exp: Option<serde_json::Number>,
}

/// Reads the `exp` claim from the token payload.
pub fn decode_expiry(token: &str) -> Option<OffsetDateTime> {
	let mut segments = token.split('.');
	let (Some(_header), Some(payload), Some(_signature), None) =
		(segments.next(), segments.next(), segments.next(), segments.next())
	else {
		return None;
	};
	let bytes = URL_SAFE_NO_PAD
		.decode(payload)
		.or_else(|_| URL_SAFE.decode(payload))
		.ok()?;
	let claim = serde_json::from_slice::<ExpiryClaim>(&bytes).ok()?;
	let exp = claim.exp?;
	let seconds = match exp.as_i64() {
		Some(seconds) => seconds,
		None => {
			let fractional = exp.as_f64()?;

			if !fractional.is_finite() {
				return None;
			}

			fractional.floor() as i64
		},
	};

	OffsetDateTime::from_unix_timestamp(seconds).ok()
}

/// Lifetime left at `now`, negative once the token has expired.
pub fn remaining_lifetime(token: &str, now: OffsetDateTime) -> Option<Duration> {
	decode_expiry(token).map(|expires_at| expires_at - now)
}

/// Returns `true` if less than `threshold` remains before the token expires.
pub fn is_expiring_soon(token: &str, threshold: Duration) -> bool {
	is_expiring_soon_at(token, threshold, OffsetDateTime::now_utc())
}

/// Clock-injected variant of [`is_expiring_soon`].
pub fn is_expiring_soon_at(token: &str, threshold: Duration, now: OffsetDateTime) -> bool {
	match remaining_lifetime(token, now) {
		Some(remaining) => remaining < threshold,
		None => true,
	}
}
