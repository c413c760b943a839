//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::ServiceError;
use domain::{DomainError, ErrorKind};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request that never reached a service.
    BadRequest(String),
    /// The caller did not identify themselves.
    Unauthenticated(String),
    /// Error returned by a storefront service.
    Service(ServiceError),
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Stock => StatusCode::CONFLICT,
        ErrorKind::Coupon => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::StateTransition => StatusCode::CONFLICT,
        ErrorKind::Conflict => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", msg),
            ApiError::Service(err) => match err.kind() {
                Some(kind) => (status_for(kind), kind.as_str(), err.to_string()),
                None => {
                    tracing::error!(error = %err, "internal server error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal",
                        "internal server error".to_string(),
                    )
                }
            },
        };

        metrics::counter!("api_errors_total", "kind" => kind).increment(1);
        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Service(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::StoreError;

    #[test]
    fn test_kind_status_mapping() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Stock), StatusCode::CONFLICT);
        assert_eq!(
            status_for(ErrorKind::Coupon),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(ErrorKind::Authorization), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::StateTransition), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::from(ServiceError::from(StoreError::Corrupt(
            "bad status column".to_string(),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_cart_empty_is_bad_request() {
        let response = ApiError::from(DomainError::CartEmpty).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
