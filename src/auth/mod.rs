//! Authentication and authorization
//!
//! Provides:
//! - Signed session cookies (HS256 JWT) for patients and administrators
//! - Access levels for routes and the unlock authority they grant
//! - Password hashing with Argon2 (administrators only)

pub mod password;
pub mod permissions;
pub mod session;

pub use password::{hash_password, verify_password, verify_stored_password};
pub use permissions::{required_access, AccessLevel};
pub use session::{
    extract_session_token, SessionClaims, SessionInput, SessionManager, SessionValidationResult,
    SESSION_COOKIE,
};
