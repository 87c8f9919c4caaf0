//! Error handling for the CRM service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Result<T> = std::result::Result<T, AppError>;

/// Field name -> list of human readable validation messages
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {message}")]
    Authentication { message: String },

    #[error("Authorization error: {message}")]
    Authorization { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Validation failed for {} field(s)", .0.len())]
    InvalidFields(FieldErrors),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl AppError {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Single-field validation failure
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::InvalidFields(errors)
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            AppError::Authorization { .. } => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Generic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Authentication { .. } => "AUTH_ERROR",
            AppError::Authorization { .. } => "AUTHZ_ERROR",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::InvalidFields(_) => "VALIDATION_ERROR",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Configuration { .. } => "CONFIG_ERROR",
            AppError::Internal { .. } => "INTERNAL_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::HttpClient(_) => "HTTP_CLIENT_ERROR",
            AppError::Jwt(_) => "JWT_ERROR",
            AppError::Generic(_) => "INTERNAL_ERROR",
        }
    }

    /// Server-side failures never leak their detail to the caller.
    pub fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }

    pub fn to_body(&self) -> ErrorBody {
        let message = if self.is_internal() {
            "An unexpected error occurred".to_string()
        } else {
            self.to_string()
        };

        let details = match self {
            AppError::InvalidFields(fields) => serde_json::to_value(fields).ok(),
            _ => None,
        };

        ErrorBody {
            code: self.error_code().to_string(),
            message,
            details,
        }
    }
}

/// Response extension carrying the error code, read back by request metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_internal() {
            tracing::error!(code = self.error_code(), "API Error: {}", self);
        } else {
            tracing::warn!(code = self.error_code(), "API Error: {}", self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_body(),
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorCode(self.error_code()));
        response
    }
}

/// Flatten `validator` errors into the field -> messages map returned to clients.
/// Nested structs and lists become dotted / indexed keys, e.g. `items[1].quantity`.
pub fn format_validation_errors(errors: &validator::ValidationErrors) -> FieldErrors {
    let mut formatted = FieldErrors::new();
    collect_validation_errors(errors, "", &mut formatted);
    formatted
}

fn collect_validation_errors(errors: &validator::ValidationErrors, prefix: &str, out: &mut FieldErrors) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let key = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages = out.entry(key).or_default();
                messages.extend(field_errors.iter().map(|error| match error.message {
                    Some(ref msg) => msg.to_string(),
                    None => match error.code.as_ref() {
                        "email" => "Invalid email format".to_string(),
                        "length" => "Invalid length".to_string(),
                        "range" => "Value out of range".to_string(),
                        _ => "Invalid value".to_string(),
                    },
                }));
            }
            ValidationErrorsKind::Struct(nested) => collect_validation_errors(nested, &key, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_validation_errors(nested, &format!("{}[{}]", key, index), out);
                }
            }
        }
    }
}

/// Field errors from `validator`, or an empty map, ready to be extended by
/// checks the derive cannot express
pub fn field_errors_of<T: validator::Validate>(value: &T) -> FieldErrors {
    match value.validate() {
        Ok(()) => FieldErrors::new(),
        Err(errors) => format_validation_errors(&errors),
    }
}

pub fn push_field_error(errors: &mut FieldErrors, field: impl Into<String>, message: impl Into<String>) {
    errors.entry(field.into()).or_default().push(message.into());
}

pub fn ensure_valid(errors: FieldErrors) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::InvalidFields(errors))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::InvalidFields(format_validation_errors(&errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::internal("connection reset by peer");
        let body = err.to_body();
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert!(!body.message.contains("connection reset"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn field_errors_are_reported_as_details() {
        let err = AppError::invalid_field("name", "Name must be at least 2 characters");
        let body = err.to_body();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "VALIDATION_ERROR");
        let details = body.details.expect("details");
        assert_eq!(details["name"][0], "Name must be at least 2 characters");
    }

    #[test]
    fn responses_carry_their_error_code() {
        let response = AppError::not_found("Campaign").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.extensions().get::<ErrorCode>(), Some(&ErrorCode("NOT_FOUND")));
    }

    #[test]
    fn not_found_keeps_its_message() {
        let err = AppError::not_found("Customer");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_body().message, "Not found: Customer");
    }

    #[derive(validator::Validate)]
    struct Line {
        #[validate(range(min = 1, message = "Quantity must be at least 1"))]
        quantity: i32,
    }

    #[derive(validator::Validate)]
    struct Order {
        #[validate(length(min = 2))]
        name: String,
        #[validate(nested)]
        items: Vec<Line>,
    }

    #[test]
    fn nested_validation_errors_get_indexed_keys() {
        let order = Order {
            name: "x".to_string(),
            items: vec![Line { quantity: 2 }, Line { quantity: 0 }],
        };
        let mut errors = field_errors_of(&order);
        assert_eq!(errors["name"], vec!["Invalid length".to_string()]);
        assert_eq!(errors["items[1].quantity"], vec!["Quantity must be at least 1".to_string()]);
        assert!(!errors.contains_key("items[0].quantity"));

        push_field_error(&mut errors, "total_amount", "Must not be negative");
        assert!(matches!(ensure_valid(errors), Err(AppError::InvalidFields(map)) if map.len() == 3));
        assert!(ensure_valid(FieldErrors::new()).is_ok());
    }
}
