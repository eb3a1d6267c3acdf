//! Session cookies
//!
//! The `session` cookie carries an HS256-signed JWT naming the user. Patients
//! get one after an email login, administrators after a password login.
//! Signature and expiry are checked on every request; a cookie that fails
//! either is treated as no session at all.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::TrackerError;

/// Cookie name
pub const SESSION_COOKIE: &str = "session";

/// Payload stored in the session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub email: String,
    /// Set only by the admin login
    #[serde(default)]
    pub admin: bool,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Input for creating a session
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub user_id: String,
    pub email: String,
    pub admin: bool,
}

/// Result of session validation
#[derive(Debug)]
pub struct SessionValidationResult {
    pub valid: bool,
    pub claims: Option<SessionClaims>,
    pub error: Option<String>,
}

impl SessionValidationResult {
    pub fn valid(claims: SessionClaims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

/// Issues and verifies session cookies
#[derive(Clone)]
pub struct SessionManager {
    secret: String,
    max_age_seconds: u64,
    secure_cookie: bool,
}

impl SessionManager {
    /// Returns an error if the secret is empty or shorter than 32 characters
    pub fn new(secret: String, max_age_seconds: u64, secure_cookie: bool) -> Result<Self, TrackerError> {
        if secret.is_empty() {
            return Err(TrackerError::Config("APP_SECRET is required".into()));
        }

        if secret.len() < 32 {
            return Err(TrackerError::Config(
                "APP_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            max_age_seconds,
            secure_cookie,
        })
    }

    /// Manager for dev mode and tests (fixed secret, insecure cookie)
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            max_age_seconds: 30 * 24 * 60 * 60,
            secure_cookie: false,
        }
    }

    pub fn max_age_seconds(&self) -> u64 {
        self.max_age_seconds
    }

    /// Sign a session token for the user
    pub fn issue(&self, input: SessionInput) -> Result<String, TrackerError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TrackerError::Auth(format!("System time error: {}", e)))?
            .as_secs();
        self.issue_at(input, now)
    }

    fn issue_at(&self, input: SessionInput, now: u64) -> Result<String, TrackerError> {
        let claims = SessionClaims {
            sub: input.user_id,
            email: input.email,
            admin: input.admin,
            iat: now,
            exp: now + self.max_age_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| TrackerError::Auth(format!("Failed to sign session: {}", e)))
    }

    /// Verify and decode a session token
    pub fn verify(&self, token: &str) -> SessionValidationResult {
        match decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(data) => SessionValidationResult::valid(data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Session expired",
                    ErrorKind::InvalidToken => "Invalid session",
                    ErrorKind::InvalidSignature => "Invalid session signature",
                    _ => "Session validation failed",
                };
                SessionValidationResult::invalid(error_msg)
            }
        }
    }

    /// `Set-Cookie` value carrying the token
    pub fn session_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE, token, self.max_age_seconds
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the session
    pub fn clear_cookie(&self) -> String {
        let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Pull the session token out of a `Cookie` header
pub fn extract_session_token(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
