use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// One request-validation failure: which field, and why.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, "field required")
    }
}

/// Error envelope for the HTTP layer. Validation failures carry a list of
/// field descriptors; everything else is a `{detail}` body.
#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        ApiError::Validation(errors)
    }

    pub fn invalid_body(message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError::new("body", message)])
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": errors })),
            )
                .into_response(),
            ApiError::NotFound(detail) => {
                (StatusCode::NOT_FOUND, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::Internal(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": detail })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_carry_field_paths() {
        let errors = vec![
            FieldError::required("workspace_id"),
            FieldError::new("file", "unsupported extension"),
        ];
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json[0]["field"], "workspace_id");
        assert_eq!(json[0]["message"], "field required");
        assert_eq!(json[1]["field"], "file");
    }
}
