//! Token value types: redacted secrets and short-lived access tokens.

pub mod access;
pub mod secret;
