//! Secret handling.
//!
//! Re-exports the secrecy types used by [`super::Config`] so callers do not
//! need a direct dependency to read the database URL.

pub use secrecy::{ExposeSecret, SecretString};
