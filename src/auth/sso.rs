//! AWS SSO / Identity Center credential resolution
//!
//! Reads the token cache written by `aws sso login` and exchanges the
//! cached access token for temporary role credentials via the regional SSO
//! portal. Never performs a device-code login itself.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::auth::profile::AwsProfile;
use crate::errors::{Result, S3ScopeError};

/// Cached SSO token as written by the AWS CLI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoToken {
    pub access_token: String,
    pub expires_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    /// Milliseconds since the epoch.
    #[serde(default)]
    expiration: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetRoleCredentialsResponse {
    role_credentials: RoleCredentials,
}

/// Cache file name for a login: SHA-1 of the session name when the profile
/// uses an `sso-session` block (CLI v2), else SHA-1 of the start URL (v1).
pub fn cache_file_name(start_url: &str, session_name: Option<&str>) -> String {
    let key = session_name.unwrap_or(start_url);
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    format!("{}.json", hex::encode(hasher.finalize()))
}

fn sso_cache_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(".aws").join("sso").join("cache"))
        .ok_or_else(|| S3ScopeError::Credentials("could not determine home directory".to_string()))
}

fn is_expired(expires_at: &str) -> bool {
    match chrono::DateTime::parse_from_rfc3339(expires_at) {
        Ok(expiry) => expiry <= chrono::Utc::now(),
        // Unparseable expiry: treat the token as stale.
        Err(_) => true,
    }
}

/// Load and validate the cached token for a start URL / session name.
pub fn load_cached_token(
    cache_dir: &std::path::Path,
    start_url: &str,
    session_name: Option<&str>,
) -> Result<SsoToken> {
    let cache_file = cache_dir.join(cache_file_name(start_url, session_name));
    let content = std::fs::read_to_string(&cache_file).map_err(|_| {
        S3ScopeError::Credentials(format!("SSO token cache not found: {}", cache_file.display()))
    })?;
    let token: SsoToken = serde_json::from_str(&content)?;

    if is_expired(&token.expires_at) {
        return Err(S3ScopeError::Credentials(format!(
            "SSO token expired at {}",
            token.expires_at
        )));
    }
    debug!(cache_file = %cache_file.display(), "loaded SSO token from cache");
    Ok(token)
}

/// Exchange the cached token for temporary credentials and store them on
/// the profile.
pub fn resolve_credentials(profile: &mut AwsProfile) -> Result<()> {
    let start_url = profile
        .sso_start_url
        .as_deref()
        .ok_or_else(|| S3ScopeError::Credentials("SSO profile missing sso_start_url".into()))?;
    let sso_region = profile
        .sso_region
        .as_deref()
        .ok_or_else(|| S3ScopeError::Credentials("SSO profile missing sso_region".into()))?;
    let account_id = profile
        .sso_account_id
        .as_deref()
        .ok_or_else(|| S3ScopeError::Credentials("SSO profile missing sso_account_id".into()))?;
    let role_name = profile
        .sso_role_name
        .as_deref()
        .ok_or_else(|| S3ScopeError::Credentials("SSO profile missing sso_role_name".into()))?;

    let token = load_cached_token(&sso_cache_dir()?, start_url, profile.sso_session_name.as_deref())?;

    let endpoint = format!(
        "https://portal.sso.{}.amazonaws.com/federation/credentials?account_id={}&role_name={}",
        sso_region,
        urlencoding::encode(account_id),
        urlencoding::encode(role_name)
    );

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let response = client
        .get(&endpoint)
        .header("x-amz-sso_bearer_token", &token.access_token)
        .send()?;

    if !response.status().is_success() {
        let status = response.status();
        return Err(S3ScopeError::Credentials(format!(
            "SSO GetRoleCredentials returned HTTP {} for profile '{}'",
            status, profile.name
        )));
    }

    let body: GetRoleCredentialsResponse = response.json()?;
    profile.access_key_id = body.role_credentials.access_key_id;
    profile.secret_access_key = body.role_credentials.secret_access_key;
    profile.session_token = Some(body.role_credentials.session_token);
    profile.expiration = body.role_credentials.expiration.map(|ms| ms / 1000);

    info!(profile = %profile.name, "resolved SSO credentials");
    Ok(())
}
