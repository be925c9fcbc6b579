//! Signed session tokens and cookies.
//!
//! A token is `v1.<payload>.<signature>`: the payload is base64url JSON
//! [`SessionClaims`] and the signature is base64url HMAC-SHA256 of the
//! payload part.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::Role;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";
const MAX_TOKEN_LEN: usize = 1024;

/// What a session token asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Signed-in account.
    pub user_id: String,
    /// Role of that account when the token was issued.
    pub role: Role,
    /// Moment the token stops being accepted.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

/// Signing key and cookie settings for sessions.
#[derive(Clone)]
pub struct SessionKeys {
    secret: Arc<[u8]>,
    ttl: Duration,
    cookie_name: String,
    secure: bool,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .field("cookie_name", &self.cookie_name)
            .field("secure", &self.secure)
            .finish()
    }
}

impl SessionKeys {
    /// Create keys from raw parts.
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration, cookie_name: impl Into<String>, secure: bool) -> Self {
        Self {
            secret: Arc::from(secret),
            ttl,
            cookie_name: cookie_name.into(),
            secure,
        }
    }

    /// Create keys from the session section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the secret is missing or too short.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.require_session_secret()?,
            config.session_ttl(),
            config.session.cookie_name.clone(),
            config.session.secure_cookie,
        ))
    }

    /// Name of the session cookie.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Claims for a fresh session starting at `now`.
    #[must_use]
    pub fn claims_for(&self, user_id: &str, role: Role, now: DateTime<Utc>) -> SessionClaims {
        SessionClaims {
            user_id: user_id.to_string(),
            role,
            expires_at: now + self.ttl,
        }
    }

    /// Sign claims into a token.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the claims cannot be serialized.
    pub fn issue(&self, claims: &SessionClaims) -> Result<String> {
        let payload = serde_json::to_vec(claims)?;
        let payload_part = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload_part)?.finalize().into_bytes());
        Ok(format!("{TOKEN_VERSION}.{payload_part}.{signature}"))
    }

    /// Check a token's format, signature, and expiry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSession`] describing the first check that failed.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(Error::InvalidSession("token too long".to_string()));
        }
        let parts: Vec<&str> = token.split('.').collect();
        let (payload_part, signature_part) = match parts.as_slice() {
            [version, payload, signature] if *version == TOKEN_VERSION => (*payload, *signature),
            [version, _, _] => {
                return Err(Error::InvalidSession(format!(
                    "unsupported token version: {version}"
                )))
            }
            _ => return Err(Error::InvalidSession("malformed token".to_string())),
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature_part)
            .map_err(|_| Error::InvalidSession("malformed signature".to_string()))?;
        self.mac(payload_part)?
            .verify_slice(&signature)
            .map_err(|_| Error::InvalidSession("signature mismatch".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| Error::InvalidSession("malformed payload".to_string()))?;
        let claims: SessionClaims = serde_json::from_slice(&payload)
            .map_err(|_| Error::InvalidSession("malformed payload".to_string()))?;

        if claims.expires_at <= now {
            return Err(Error::InvalidSession("session expired".to_string()));
        }
        Ok(claims)
    }

    /// `Set-Cookie` value carrying a token for the full session lifetime.
    #[must_use]
    pub fn set_cookie(&self, token: &str) -> String {
        self.cookie(token, self.ttl.num_seconds())
    }

    /// `Set-Cookie` value that removes the session cookie.
    #[must_use]
    pub fn clear_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}",
            self.cookie_name
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    fn mac(&self, payload_part: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::internal(format!("session key rejected: {e}")))?;
        mac.update(payload_part.as_bytes());
        Ok(mac)
    }
}

/// Find a cookie by name in a `Cookie` request header.
#[must_use]
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}
