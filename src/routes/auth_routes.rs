//! Sign-in routes
//!
//! - POST /api/login - patient sign-in by email address only
//! - POST /api/admin/login - administrator sign-in with email and password
//! - POST /api/logout - clear the session cookie
//!
//! Both logins answer with the user and set the `session` cookie.

use std::sync::Arc;

use hyper::body::Body;
use hyper::{Method, Request, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{parse_json_body, BodyError};
use crate::auth::SessionInput;
use crate::db::UserRow;
use crate::server::AppState;
use crate::services::response::{error_response, json_response, method_not_allowed, not_found, ok, with_cookie, JsonResponse};
use crate::types::TrackerError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// User fields exposed to the browser after sign-in
#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub admin: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub ok: bool,
    pub user: SessionUser,
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    ok: bool,
}

// =============================================================================
// Router
// =============================================================================

/// Handle the public sign-in routes
pub async fn handle_auth_request<B>(req: Request<B>, state: Arc<AppState>) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let path = req.uri().path().to_string();

    match (req.method(), path.as_str()) {
        (&Method::POST, "/api/login") => handle_login(req, state).await,
        (&Method::POST, "/api/admin/login") => handle_admin_login(req, state).await,
        (&Method::POST, "/api/logout") => handle_logout(&state),
        (_, "/api/login") | (_, "/api/admin/login") | (_, "/api/logout") => method_not_allowed(),
        _ => not_found(&format!("No route for {}", path)),
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /api/login
///
/// Patients sign in with their email address alone; the account must already
/// exist (administrators add patients from the dashboard).
pub async fn handle_login<B>(req: Request<B>, state: Arc<AppState>) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let body: LoginRequest = match parse_json_body(req, state.args.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    let user = match state.services.patients.find_by_email(&body.email) {
        Ok(user) => user,
        Err(e) => return error_response(e),
    };

    info!(user_id = %user.id, "Patient signed in");
    session_response(&state, user, false)
}

/// POST /api/admin/login
pub async fn handle_admin_login<B>(req: Request<B>, state: Arc<AppState>) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let body: AdminLoginRequest = match parse_json_body(req, state.args.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    if body.email.trim().is_empty() || body.password.is_empty() {
        return error_response(TrackerError::BadRequest(
            "Missing required fields: email, password".into(),
        ));
    }

    let user = match state
        .services
        .patients
        .authenticate_admin(&body.email, &body.password)
    {
        Ok(user) => user,
        Err(e) => return error_response(e),
    };

    info!(user_id = %user.id, "Admin signed in");
    session_response(&state, user, true)
}

/// POST /api/logout
pub fn handle_logout(state: &AppState) -> JsonResponse {
    with_cookie(ok(&LogoutResponse { ok: true }), &state.sessions.clear_cookie())
}

fn session_response(state: &AppState, user: UserRow, admin: bool) -> JsonResponse {
    let token = match state.sessions.issue(SessionInput {
        user_id: user.id.clone(),
        email: user.email.clone(),
        admin,
    }) {
        Ok(token) => token,
        Err(e) => return error_response(e),
    };

    let body = LoginResponse {
        ok: true,
        user: SessionUser {
            id: user.id,
            email: user.email,
            name: user.name,
            admin,
        },
    };
    with_cookie(
        json_response(StatusCode::OK, &body),
        &state.sessions.session_cookie(&token),
    )
}
