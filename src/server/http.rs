//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo, one task per connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::SessionManager;
use crate::config::Args;
use crate::db::TrackerDb;
use crate::routes;
use crate::services::response::{json_response, JsonResponse};
use crate::services::Services;
use crate::types::TrackerError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub db: Arc<TrackerDb>,
    pub services: Services,
    /// Signs and verifies the `session` cookie
    pub sessions: SessionManager,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, db: Arc<TrackerDb>) -> Result<Self, TrackerError> {
        let sessions = args.session_manager()?;
        Ok(Self {
            services: Services::new(db.clone()),
            args,
            db,
            sessions,
            started_at: Instant::now(),
        })
    }
}

/// Bind the configured address and serve until the process exits
pub async fn run(state: Arc<AppState>) -> Result<(), TrackerError> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Treatment tracker listening on {}", state.args.listen);
    serve(listener, state).await
}

/// Accept loop over an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), TrackerError> {
    if state.args.dev_mode {
        warn!("Development mode enabled - session cookies are not Secure");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            to_boxed(routes::health_check(&state))
        }

        // Readiness probe - 200 only when the database answers
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            to_boxed(routes::readiness_check(&state))
        }

        // Version info for deployment verification
        (Method::GET, "/version") => to_boxed(routes::version_info()),

        // CORS preflight
        (Method::OPTIONS, _) => to_boxed(preflight_response()),

        // JSON API: login/logout, patient and admin routes
        (_, p) if p.starts_with("/api/") => {
            to_boxed(routes::handle_api_request(req, Arc::clone(&state)).await)
        }

        _ => to_boxed(not_found_response(&path)),
    };

    Ok(response)
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> JsonResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        header::HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        header::HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

/// Not found response
fn not_found_response(path: &str) -> JsonResponse {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "Not Found",
            "path": path,
            "hint": "API routes live under /api/"
        }),
    )
}

/// State over an in-memory database for handler tests
#[cfg(test)]
pub(crate) fn test_state() -> Arc<AppState> {
    use clap::Parser;

    let args = Args::parse_from(["treatment-tracker", "--dev-mode"]);
    let db = Arc::new(TrackerDb::open_in_memory().unwrap());
    Arc::new(AppState::new(args, db).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_headers() {
        let resp = preflight_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "GET, POST, OPTIONS"
        );
    }

    #[test]
    fn test_state_uses_dev_sessions() {
        let state = test_state();
        assert!(state.args.dev_mode);
        assert!(!state.sessions.session_cookie("t").contains("Secure"));
    }
}
