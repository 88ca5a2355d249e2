use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use serde_json::json;

use agw_provider::resolver::ResolveError;
use agw_provider::upstream::UpstreamError;
use agw_provider::usage::QuotaExceeded;
use agw_transform::content::InvalidRequest;
use agw_transform::middleware::TransformError;

/// The request-level error taxonomy. Upstream bodies pass through verbatim;
/// everything else gets a structured error body and never a stack trace.
#[derive(Debug)]
pub enum GatewayError {
    InvalidRequest { field: String, reason: String },
    Unauthorized(String),
    QuotaExceeded(String),
    Upstream { status: StatusCode, body: Bytes },
    UpstreamTimeout(String),
    Internal(String),
}

impl GatewayError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::InvalidRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream { status, .. } => *status,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            GatewayError::Upstream { body, .. } => body,
            GatewayError::InvalidRequest { field, reason } => error_body(
                "invalid_request_error",
                &format!("{field}: {reason}"),
            ),
            GatewayError::Unauthorized(message) => error_body("authentication_error", &message),
            GatewayError::QuotaExceeded(message) => error_body("rate_limit_error", &message),
            GatewayError::UpstreamTimeout(_) => {
                error_body("upstream_timeout", "upstream request timed out")
            }
            // Generic message only; details stay in the logs.
            GatewayError::Internal(_) => error_body("internal_error", "internal server error"),
        };

        let mut resp = Response::new(Body::from(body));
        *resp.status_mut() = status;
        resp.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        resp
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::InvalidRequest { field, reason } => {
                write!(f, "invalid request: {field}: {reason}")
            }
            GatewayError::Unauthorized(message) => write!(f, "unauthorized: {message}"),
            GatewayError::QuotaExceeded(message) => write!(f, "quota exceeded: {message}"),
            GatewayError::Upstream { status, .. } => write!(f, "upstream error: {status}"),
            GatewayError::UpstreamTimeout(message) => write!(f, "upstream timeout: {message}"),
            GatewayError::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for GatewayError {}

fn error_body(kind: &str, message: &str) -> Bytes {
    Bytes::from(
        json!({"error": {"type": kind, "message": message}}).to_string(),
    )
}

impl From<InvalidRequest> for GatewayError {
    fn from(err: InvalidRequest) -> Self {
        GatewayError::InvalidRequest {
            field: err.field,
            reason: err.reason,
        }
    }
}

impl From<TransformError> for GatewayError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Invalid(invalid) => invalid.into(),
            TransformError::ProtoMismatch => {
                GatewayError::Internal("protocol mismatch in conversion pipeline".to_string())
            }
        }
    }
}

impl From<ResolveError> for GatewayError {
    fn from(err: ResolveError) -> Self {
        GatewayError::Unauthorized(err.to_string())
    }
}

impl From<QuotaExceeded> for GatewayError {
    fn from(err: QuotaExceeded) -> Self {
        GatewayError::QuotaExceeded(err.message)
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout(message) => GatewayError::UpstreamTimeout(message),
            UpstreamError::Transport(message) => GatewayError::Upstream {
                status: StatusCode::BAD_GATEWAY,
                body: error_body("upstream_error", &message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_the_specified_status_codes() {
        assert_eq!(
            GatewayError::invalid("model", "empty").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Unauthorized("no".to_string()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::QuotaExceeded("over".to_string()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::UpstreamTimeout("late".to_string()).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::Internal("boom".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn upstream_bodies_pass_through_verbatim() {
        let err = GatewayError::Upstream {
            status: StatusCode::NOT_FOUND,
            body: Bytes::from_static(b"{\"error\":\"model gone\"}"),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
