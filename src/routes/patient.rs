//! Patient routes
//!
//! Every handler here runs with a verified session. Reads that show the
//! patient's progress run `ensure_basic_unlocks` first so newly added
//! `always` edges reach existing patients without an explicit action.

use std::sync::Arc;

use hyper::body::Body;
use hyper::{Method, Request};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{parse_json_body, BodyError};
use crate::auth::{AccessLevel, SessionClaims};
use crate::categories;
use crate::db::{SymptomRow, UnlockedStep, UserRow};
use crate::engine::UnlockAuthority;
use crate::server::AppState;
use crate::services::response::{error_response, from_result, method_not_allowed, not_found, ok, JsonResponse};
use crate::types::TrackerError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserRow,
    pub path: Vec<UnlockedStep>,
}

#[derive(Debug, Serialize)]
pub struct SymptomListResponse {
    pub symptoms: Vec<SymptomRow>,
}

#[derive(Debug, Deserialize)]
pub struct UnlockBySymptomsRequest {
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnlockBySymptomsResponse {
    pub unlocked: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockNodeRequest {
    #[serde(default)]
    pub node_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockNodeResponse {
    pub success: bool,
    pub node_id: String,
    pub propagated: Vec<String>,
}

// =============================================================================
// Router
// =============================================================================

/// Handle signed-in `/api/*` routes outside `/api/admin`
pub async fn handle_patient_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    claims: SessionClaims,
) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let path = req.uri().path().to_string();
    let user_id = claims.sub.as_str();

    match (req.method(), path.as_str()) {
        (&Method::GET, "/api/me") => handle_me(&state, user_id),
        (&Method::GET, "/api/tree") => handle_tree(&state, user_id),
        (&Method::GET, "/api/symptoms") => from_result(
            state
                .services
                .symptoms
                .list()
                .map(|symptoms| SymptomListResponse { symptoms }),
        ),
        (&Method::POST, "/api/unlock-by-symptoms") => handle_unlock_by_symptoms(req, &state, user_id).await,
        (&Method::POST, "/api/unlock-node") => handle_unlock_node(req, &state, &claims).await,
        (&Method::GET, p) => match category_from_path(p) {
            Some(category) => handle_category_symptoms(&state, user_id, category),
            None => not_found(&format!("No route for {}", path)),
        },
        (_, "/api/me") | (_, "/api/tree") | (_, "/api/symptoms") => method_not_allowed(),
        (_, "/api/unlock-by-symptoms") | (_, "/api/unlock-node") => method_not_allowed(),
        _ => not_found(&format!("No route for {}", path)),
    }
}

/// `/api/unlock/{category}/symptoms` -> `category`
fn category_from_path(path: &str) -> Option<&str> {
    path.strip_prefix("/api/unlock/")?
        .strip_suffix("/symptoms")
        .filter(|c| !c.is_empty() && !c.contains('/'))
}

// =============================================================================
// Route Handlers
// =============================================================================

/// GET /api/me
fn handle_me(state: &AppState, user_id: &str) -> JsonResponse {
    from_result(load_me(state, user_id))
}

fn load_me(state: &AppState, user_id: &str) -> Result<MeResponse, TrackerError> {
    let path = state.services.progress.patient_path(user_id)?;
    let user = state
        .services
        .patients
        .get(user_id)?
        .ok_or_else(|| TrackerError::NotFound("User not found".to_string()))?;
    Ok(MeResponse { user, path })
}

/// GET /api/tree
fn handle_tree(state: &AppState, user_id: &str) -> JsonResponse {
    if let Err(e) = state.services.progress.ensure_basic_unlocks(user_id) {
        return error_response(e);
    }
    from_result(state.services.tree.patient_tree(user_id))
}

/// GET /api/unlock/{category}/symptoms
fn handle_category_symptoms(state: &AppState, user_id: &str, category: &str) -> JsonResponse {
    if let Err(e) = state.services.progress.ensure_basic_unlocks(user_id) {
        return error_response(e);
    }
    from_result(state.services.tree.category_symptoms(user_id, category))
}

/// POST /api/unlock-by-symptoms
async fn handle_unlock_by_symptoms<B>(req: Request<B>, state: &AppState, user_id: &str) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let body: UnlockBySymptomsRequest = match parse_json_body(req, state.args.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    let category = body.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
    if let Some(category) = category {
        if !categories::is_known(category) {
            return error_response(TrackerError::BadRequest(format!("Unknown category: {}", category)));
        }
    }

    match state
        .services
        .progress
        .apply_symptom_report(user_id, &body.symptoms, category)
    {
        Ok(unlocked) => {
            info!(user_id, unlocked = unlocked.len(), "Symptom report applied");
            ok(&UnlockBySymptomsResponse { unlocked })
        }
        Err(e) => error_response(e),
    }
}

/// POST /api/unlock-node
async fn handle_unlock_node<B>(req: Request<B>, state: &AppState, claims: &SessionClaims) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let body: UnlockNodeRequest = match parse_json_body(req, state.args.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };
    let node_id = match body.node_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => return error_response(TrackerError::BadRequest("nodeId is required".into())),
    };

    // The admin claim only counts while the account is still an admin
    let authority = match AccessLevel::for_claims(claims) {
        AccessLevel::Admin => match state.services.patients.is_admin(&claims.sub) {
            Ok(true) => UnlockAuthority::Admin,
            Ok(false) => UnlockAuthority::Patient,
            Err(e) => return error_response(e),
        },
        level => level.unlock_authority(),
    };

    match state
        .services
        .progress
        .unlock_single_node(&claims.sub, &node_id, authority)
    {
        Ok(unlock) => ok(&UnlockNodeResponse {
            success: true,
            node_id: unlock.node_id,
            propagated: unlock.propagated,
        }),
        Err(e) => error_response(e),
    }
}
