use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use router_core::RouterError;
use serde::Serialize;
use tracing::error;

/// Wraps every error kind the router surfaces to HTTP, per the "at most one
/// error reason" rule: an enumerated token plus a short message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorReason<'a>,
}

#[derive(Serialize)]
struct ErrorReason<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorReason {
                code: self.code,
                message: &self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::UnknownRoute(route_id) => ApiError {
                status: StatusCode::NOT_FOUND,
                code: "UnknownRoute",
                message: format!("unknown route: {route_id}"),
            },
            RouterError::InvalidParameters(msg) => ApiError {
                status: StatusCode::BAD_REQUEST,
                code: "InvalidParameters",
                message: msg,
            },
            RouterError::NotFound => ApiError {
                status: StatusCode::NOT_FOUND,
                code: "NotFound",
                message: "submission not found".to_string(),
            },
            RouterError::SubmitFailed(msg) => ApiError {
                status: StatusCode::BAD_GATEWAY,
                code: "SubmitFailed",
                message: msg,
            },
            RouterError::Contended => ApiError {
                status: StatusCode::CONFLICT,
                code: "Contended",
                message: "update contended, retries exhausted".to_string(),
            },
            RouterError::InvalidCallback(msg) => ApiError {
                status: StatusCode::BAD_REQUEST,
                code: "InvalidCallback",
                message: msg,
            },
            RouterError::Internal(msg) => {
                error!(error = %msg, "internal router error");
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "Internal",
                    message: "internal server error".to_string(),
                }
            }
        }
    }
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }
}
