//! HTTP response building helpers
//!
//! Every handler answers JSON. Errors use `{"error": "...", "code": "..."}`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::types::TrackerError;

pub type JsonResponse = Response<Full<Bytes>>;

/// Error body shared by all routes
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> JsonResponse {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

/// 200 OK
pub fn ok<T: Serialize>(body: &T) -> JsonResponse {
    json_response(StatusCode::OK, body)
}

/// 201 Created
pub fn created<T: Serialize>(body: &T) -> JsonResponse {
    json_response(StatusCode::CREATED, body)
}

/// Error body with an optional machine-readable code
pub fn error_body(status: StatusCode, error: &str, code: Option<&str>) -> JsonResponse {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            code: code.map(String::from),
        },
    )
}

pub fn not_found(message: &str) -> JsonResponse {
    error_body(StatusCode::NOT_FOUND, message, Some("NOT_FOUND"))
}

pub fn method_not_allowed() -> JsonResponse {
    error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed", Some("METHOD_NOT_ALLOWED"))
}

/// Convert a TrackerError to an HTTP response.
///
/// Server-side failures are logged and answered with a generic message.
pub fn error_response(err: TrackerError) -> JsonResponse {
    let status = err.status_code();
    if status.is_server_error() {
        error!(code = err.code(), "Request failed: {}", err);
        return error_body(status, "Internal server error", Some(err.code()));
    }
    error_body(status, err.message(), Some(err.code()))
}

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, TrackerError>) -> JsonResponse {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a create result into a 201 response
pub fn from_create_result<T: Serialize>(result: Result<T, TrackerError>) -> JsonResponse {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}

/// Attach a `Set-Cookie` header
pub fn with_cookie(mut response: JsonResponse, cookie: &str) -> JsonResponse {
    match header::HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
            response
        }
        Err(e) => error_response(TrackerError::Internal(format!("Invalid cookie value: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: JsonResponse) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_error_response_carries_code() {
        let resp = error_response(TrackerError::PreconditionFailed("Node cannot be unlocked yet".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Node cannot be unlocked yet");
        assert_eq!(body["code"], "NOT_UNLOCKABLE");
    }

    #[tokio::test]
    async fn test_server_errors_are_masked() {
        let resp = error_response(TrackerError::Database("no such table: nodes".into()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn test_from_result() {
        let resp = from_result::<()>(Err(TrackerError::Conflict("Node already unlocked".into())));
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let resp = from_create_result(Ok(serde_json::json!({"id": "x"})));
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_with_cookie() {
        let resp = with_cookie(ok(&()), "session=abc; Path=/");
        assert_eq!(resp.headers().get(header::SET_COOKIE).unwrap(), "session=abc; Path=/");
    }
}
