//! Admin dashboard routes
//!
//! ## Endpoints
//!
//! - `GET  /api/admin/stats` - dashboard numbers
//! - `POST /api/admin/users` - add a patient
//! - `POST /api/admin/patients/search` - name/email search (`GET` with `?searchTerm=` also works)
//! - `GET  /api/admin/patients/{id}/unlocks` - a patient's unlock records
//! - `POST /api/admin/patients/{id}/unlock-all` - unlock every node
//! - `POST /api/admin/patients/{id}/reset` - delete records, then bootstrap again
//! - `POST /api/admin/patients/{id}/unlock-node` - single unlock with admin authority
//! - `GET  /api/admin/tree`, `POST /api/admin/tree/save`, `POST /api/admin/tree/save-edge`
//! - `GET|POST /api/admin/symptoms`
//! - `POST /api/admin/clear-data` - `users`, `unlocks` or `all`

use std::sync::Arc;

use chrono::Utc;
use hyper::body::Body;
use hyper::{Method, Request};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{parse_json_body, split_resource, BodyError};
use crate::auth::SessionClaims;
use crate::db::symptoms::CreateSymptomInput;
use crate::db::{SymptomRow, UnlockWithNode, UserRow};
use crate::engine::UnlockAuthority;
use crate::server::AppState;
use crate::services::response::{
    error_response, from_create_result, from_result, method_not_allowed, not_found, ok, JsonResponse,
};
use crate::services::{ClearAction, CreatePatientInput, SaveTreeInput};
use crate::types::TrackerError;

const PATIENTS_PREFIX: &str = "/api/admin/patients/";

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub search_term: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub users: Vec<UserRow>,
}

#[derive(Debug, Serialize)]
pub struct UnlocksResponse {
    pub unlocks: Vec<UnlockWithNode>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub success: bool,
    /// Nodes unlocked again by the bootstrap after the reset
    pub unlocked: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUnlockNodeRequest {
    #[serde(default)]
    pub node_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUnlockNodeResponse {
    pub success: bool,
    pub node_id: String,
    pub propagated: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEdgeRequest {
    #[serde(default)]
    pub edge_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct AdminSymptomsResponse {
    pub symptoms: Vec<SymptomRow>,
}

#[derive(Debug, Deserialize)]
pub struct ClearDataRequest {
    pub action: ClearAction,
}

// =============================================================================
// Router
// =============================================================================

/// Handle `/api/admin/*` routes. The caller has already been confirmed as an
/// administrator.
pub async fn handle_admin_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    claims: SessionClaims,
) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    match (&method, path.as_str()) {
        (&Method::GET, "/api/admin/stats") => from_result(state.services.stats.dashboard(Utc::now())),

        (&Method::POST, "/api/admin/users") => handle_create_patient(req, &state).await,

        (&Method::POST, "/api/admin/patients/search") => handle_search(req, &state).await,
        (&Method::GET, "/api/admin/patients/search") => handle_search_query(&req, &state),

        (&Method::GET, "/api/admin/tree") => from_result(state.services.tree.get_tree()),
        (&Method::POST, "/api/admin/tree/save") => handle_save_tree(req, &state, &claims).await,
        (&Method::POST, "/api/admin/tree/save-edge") => handle_save_edge(req, &state).await,

        (&Method::GET, "/api/admin/symptoms") => from_result(
            state
                .services
                .symptoms
                .list()
                .map(|symptoms| AdminSymptomsResponse { symptoms }),
        ),
        (&Method::POST, "/api/admin/symptoms") => handle_create_symptom(req, &state).await,

        (&Method::POST, "/api/admin/clear-data") => handle_clear_data(req, &state, &claims).await,

        (_, p) if p.starts_with(PATIENTS_PREFIX) => match split_resource(p, PATIENTS_PREFIX) {
            Some((user_id, action)) => {
                let user_id = user_id.to_string();
                handle_patient_action(req, &state, &method, &user_id, action).await
            }
            None => not_found(&format!("No route for {}", path)),
        },

        (_, "/api/admin/stats")
        | (_, "/api/admin/users")
        | (_, "/api/admin/tree")
        | (_, "/api/admin/tree/save")
        | (_, "/api/admin/tree/save-edge")
        | (_, "/api/admin/symptoms")
        | (_, "/api/admin/clear-data") => method_not_allowed(),

        _ => not_found(&format!("No route for {}", path)),
    }
}

/// `/api/admin/patients/{id}/{action}`
async fn handle_patient_action<B>(
    req: Request<B>,
    state: &AppState,
    method: &Method,
    user_id: &str,
    action: &str,
) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let progress = &state.services.progress;

    match (method, action) {
        (&Method::GET, "unlocks") => from_result(
            progress
                .list_unlocks(user_id)
                .map(|unlocks| UnlocksResponse { unlocks }),
        ),
        (&Method::POST, "unlock-all") => from_result(progress.unlock_all(user_id)),
        (&Method::POST, "reset") => from_result(
            progress
                .reset_progress(user_id)
                .map(|unlocked| ResetResponse { success: true, unlocked }),
        ),
        (&Method::POST, "unlock-node") => handle_admin_unlock_node(req, state, user_id).await,
        (_, "unlocks") | (_, "unlock-all") | (_, "reset") | (_, "unlock-node") => method_not_allowed(),
        _ => not_found(&format!("Unknown patient action: {}", action)),
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /api/admin/users
async fn handle_create_patient<B>(req: Request<B>, state: &AppState) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    match parse_json_body::<CreatePatientInput, _>(req, state.args.max_body_bytes).await {
        Ok(input) => from_create_result(state.services.patients.create_patient(input)),
        Err(e) => error_response(e),
    }
}

/// POST /api/admin/patients/search
async fn handle_search<B>(req: Request<B>, state: &AppState) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    match parse_json_body::<SearchRequest, _>(req, state.args.max_body_bytes).await {
        Ok(body) => search(state, &body.search_term),
        Err(e) => error_response(e),
    }
}

/// GET /api/admin/patients/search?searchTerm=...
fn handle_search_query<B>(req: &Request<B>, state: &AppState) -> JsonResponse {
    let query = req.uri().query().unwrap_or("");
    match serde_urlencoded::from_str::<SearchRequest>(query) {
        Ok(body) => search(state, &body.search_term),
        Err(e) => error_response(TrackerError::BadRequest(format!(
            "Invalid query parameters: {}",
            e
        ))),
    }
}

fn search(state: &AppState, term: &str) -> JsonResponse {
    from_result(
        state
            .services
            .patients
            .search(term)
            .map(|users| SearchResponse { users }),
    )
}

/// POST /api/admin/patients/{id}/unlock-node
async fn handle_admin_unlock_node<B>(req: Request<B>, state: &AppState, user_id: &str) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let body: AdminUnlockNodeRequest = match parse_json_body(req, state.args.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };
    let node_id = match body.node_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => return error_response(TrackerError::BadRequest("nodeId is required".into())),
    };

    match state
        .services
        .progress
        .unlock_single_node(user_id, node_id, UnlockAuthority::Admin)
    {
        Ok(unlock) => ok(&AdminUnlockNodeResponse {
            success: true,
            node_id: unlock.node_id,
            propagated: unlock.propagated,
        }),
        Err(e) => error_response(e),
    }
}

/// POST /api/admin/tree/save
async fn handle_save_tree<B>(req: Request<B>, state: &AppState, claims: &SessionClaims) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let input: SaveTreeInput = match parse_json_body(req, state.args.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    let result = state.services.tree.save_tree(input);
    if let Ok(saved) = &result {
        warn!(
            admin = %claims.sub,
            nodes = saved.node_count,
            edges = saved.edge_count,
            "Tree replaced; all unlock records cleared"
        );
    }
    from_result(result)
}

/// POST /api/admin/tree/save-edge
async fn handle_save_edge<B>(req: Request<B>, state: &AppState) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let body: SaveEdgeRequest = match parse_json_body(req, state.args.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };
    let edge_id = match body.edge_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => return error_response(TrackerError::BadRequest("Edge ID is required".into())),
    };

    match state
        .services
        .tree
        .save_edge_description(edge_id, body.description.as_deref())
    {
        Ok(_) => ok(&SuccessResponse { success: true }),
        Err(e) => error_response(e),
    }
}

/// POST /api/admin/symptoms
async fn handle_create_symptom<B>(req: Request<B>, state: &AppState) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    match parse_json_body::<CreateSymptomInput, _>(req, state.args.max_body_bytes).await {
        Ok(input) => from_create_result(state.services.symptoms.create(input)),
        Err(e) => error_response(e),
    }
}

/// POST /api/admin/clear-data
async fn handle_clear_data<B>(req: Request<B>, state: &AppState, claims: &SessionClaims) -> JsonResponse
where
    B: Body,
    B::Error: Into<BodyError>,
{
    let body: ClearDataRequest = match parse_json_body(req, state.args.max_body_bytes).await {
        Ok(b) => b,
        Err(_) => return error_response(TrackerError::BadRequest("Invalid request body".into())),
    };

    info!(admin = %claims.sub, action = ?body.action, "Clearing data");
    from_result(state.services.patients.clear_data(body.action))
}
