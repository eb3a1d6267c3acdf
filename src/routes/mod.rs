//! HTTP routes for the treatment tracker
//!
//! `/api/*` requests are split by access level before they reach a handler:
//!
//! - `/api/login`, `/api/logout`, `/api/admin/login` - no session needed
//! - `/api/admin/*` - administrator session, re-checked against the database
//! - everything else under `/api/` - any signed-in user

pub mod admin;
pub mod auth_routes;
pub mod health;
pub mod patient;

pub use admin::handle_admin_request;
pub use auth_routes::handle_auth_request;
pub use health::{health_check, readiness_check, version_info};
pub use patient::handle_patient_request;

use std::sync::Arc;

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{header, HeaderMap, Request, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::{extract_session_token, required_access, AccessLevel, SessionClaims};
use crate::server::AppState;
use crate::services::response::{error_body, error_response, not_found, JsonResponse};
use crate::types::TrackerError;

/// Boxed error accepted from any request body type
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// Route an `/api/*` request to its handler
pub async fn handle_api_request<B>(req: Request<B>, state: Arc<AppState>) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let path = req.uri().path().to_string();
    let required = required_access(&path);

    // Login and logout are the only public API routes
    if required == AccessLevel::Public {
        return handle_auth_request(req, state).await;
    }

    let claims = match authenticate(req.headers(), &state, required) {
        Ok(claims) => claims,
        Err(response) => return response,
    };

    match required {
        AccessLevel::Admin => handle_admin_request(req, state, claims).await,
        AccessLevel::Patient => handle_patient_request(req, state, claims).await,
        AccessLevel::Public => not_found(&format!("No route for {}", path)),
    }
}

/// Resolve the caller's session and check it against the required level.
///
/// Admin access needs both the signed `admin` claim and a current admin flag
/// in the database, so demoted administrators lose access immediately.
pub fn authenticate(
    headers: &HeaderMap,
    state: &AppState,
    required: AccessLevel,
) -> Result<SessionClaims, JsonResponse> {
    let token = match session_token(headers) {
        Some(token) => token,
        None => {
            return Err(error_body(
                StatusCode::UNAUTHORIZED,
                "Not signed in",
                Some("NO_SESSION"),
            ))
        }
    };

    let validation = state.sessions.verify(token);
    let claims = match validation.claims {
        Some(claims) if validation.valid => claims,
        _ => {
            let message = validation.error.unwrap_or_else(|| "Invalid session".to_string());
            debug!("Rejected session: {}", message);
            return Err(error_body(
                StatusCode::UNAUTHORIZED,
                &message,
                Some("INVALID_SESSION"),
            ));
        }
    };

    let user = match state.services.patients.get(&claims.sub) {
        Ok(Some(user)) => user,
        Ok(None) => {
            return Err(error_body(
                StatusCode::UNAUTHORIZED,
                "Session user no longer exists",
                Some("INVALID_SESSION"),
            ))
        }
        Err(e) => return Err(error_response(e)),
    };

    if required == AccessLevel::Admin && !(claims.admin && user.is_admin) {
        warn!(user_id = %claims.sub, "Non-admin session refused on admin route");
        return Err(error_body(
            StatusCode::FORBIDDEN,
            "Admin access required",
            Some("FORBIDDEN"),
        ));
    }

    Ok(claims)
}

/// Find the session cookie among all `Cookie` headers
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(extract_session_token)
}

/// Read and decode a JSON request body.
///
/// An empty body decodes as `{}` so handlers with all-optional fields accept
/// bodiless POSTs.
pub async fn parse_json_body<T, B>(req: Request<B>, max_bytes: usize) -> Result<T, TrackerError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<BodyError>,
{
    let bytes = Limited::new(req.into_body(), max_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                TrackerError::Http("Request body too large".into())
            } else {
                TrackerError::Http(format!("Failed to read body: {}", e))
            }
        })?
        .to_bytes();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_slice(b"{}")
            .map_err(|e| TrackerError::BadRequest(format!("Missing request body: {}", e)));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| TrackerError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Split `/prefix/{id}/action` into `(id, action)`
pub(crate) fn split_resource<'a>(path: &'a str, prefix: &str) -> Option<(&'a str, &'a str)> {
    let rest = path.strip_prefix(prefix)?;
    let (id, action) = rest.split_once('/')?;
    if id.is_empty() || action.is_empty() || action.contains('/') {
        return None;
    }
    Some((id, action))
}
