//! Credentials and request signing
//!
//! - [`profile`] — `~/.aws/credentials` / `~/.aws/config` parsing and the
//!   profile model
//! - [`sso`] — token-cache-backed SSO credential resolution
//! - [`signer`] — AWS Signature Version 4 for S3 GETs and presigned URLs

pub mod profile;
pub mod signer;
pub mod sso;

pub use profile::{default_profile_name, load_profiles, refresh_profile_credentials, AwsProfile};
pub use signer::{presigned_get_url, sign_get, SignedRequest, SigningContext};
