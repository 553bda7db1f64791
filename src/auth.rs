//! Identity records, the redacted access token, and the expiry estimator.

pub mod expiry;
pub mod id;
pub mod token;
pub mod user;

pub use expiry::*;
pub use id::*;
pub use token::*;
pub use user::*;
