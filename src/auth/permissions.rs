//! Access levels for routes

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::SessionClaims;
use crate::engine::UnlockAuthority;

/// Who may call a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum AccessLevel {
    /// No session needed
    #[default]
    Public = 0,
    /// Any signed-in user
    Patient = 1,
    /// Administrator session, confirmed against the database
    Admin = 2,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessLevel::Public => write!(f, "PUBLIC"),
            AccessLevel::Patient => write!(f, "PATIENT"),
            AccessLevel::Admin => write!(f, "ADMIN"),
        }
    }
}

impl AccessLevel {
    /// Level granted by a session
    pub fn for_claims(claims: &SessionClaims) -> Self {
        if claims.admin {
            AccessLevel::Admin
        } else {
            AccessLevel::Patient
        }
    }

    /// Which edge types the holder may use for a single unlock
    pub fn unlock_authority(&self) -> UnlockAuthority {
        match self {
            AccessLevel::Admin => UnlockAuthority::Admin,
            _ => UnlockAuthority::Patient,
        }
    }
}

/// Level required for a request path
pub fn required_access(path: &str) -> AccessLevel {
    match path {
        "/api/login" | "/api/logout" | "/api/admin/login" => AccessLevel::Public,
        p if p.starts_with("/api/admin/") => AccessLevel::Admin,
        p if p.starts_with("/api/") => AccessLevel::Patient,
        // Health, readiness, version, preflight
        _ => AccessLevel::Public,
    }
}
