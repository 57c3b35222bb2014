use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Failure taxonomy for every handler. `NotFound` deliberately covers both
/// a genuinely absent entity and an entity the caller does not own, so the
/// API never leaks the existence of other users' data.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "Unauthenticated".to_string())
            }
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::UsernameTaken => {
                (StatusCode::CONFLICT, "Username already taken".to_string())
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn response_status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(response_status(ApiError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthenticated_returns_401() {
        assert_eq!(
            response_status(ApiError::Unauthenticated),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn invalid_input_returns_400() {
        assert_eq!(
            response_status(ApiError::InvalidInput("no image".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn username_taken_returns_409() {
        assert_eq!(response_status(ApiError::UsernameTaken), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_returns_500_with_redacted_body() {
        assert_eq!(
            response_status(ApiError::Internal(anyhow::anyhow!("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
