use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")] Database(#[from] sea_orm::DbErr),

    #[error("Validation error: {message}")] Validation {
        message: String,
        field: Option<String>,
    },

    #[error("{0} not found")] NotFound(String),

    #[error("Transaction failed: {0}")] Transactor(String),

    #[error("Price oracle error: {0}")] Oracle(String),

    #[error("Persistence error: {0}")] Persistence(String),

    #[error("Invalid mnemonic")]
    InvalidMnemonic,

    #[error("Configuration error: {0}")] Config(String),

    #[error("Internal error: {0}")] Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation { message: message.into(), field: None }
    }

    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}

#[derive(serde::Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(serde::Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    pub fn to_error_response(&self) -> ErrorResponse {
        let (code, message, field) = match self {
            AppError::Database(e) => ("DATABASE_ERROR", e.to_string(), None),
            AppError::Validation { message, field } =>
                ("VALIDATION_ERROR", message.clone(), field.clone()),
            AppError::NotFound(what) => ("NOT_FOUND", format!("{} not found", what), None),
            AppError::Transactor(msg) => ("TRANSACTION_FAILED", msg.clone(), None),
            AppError::Oracle(msg) => ("ORACLE_ERROR", msg.clone(), None),
            AppError::Persistence(msg) => ("PERSISTENCE_ERROR", msg.clone(), None),
            AppError::InvalidMnemonic =>
                (
                    "INVALID_MNEMONIC",
                    "Invalid mnemonic phrase".to_string(),
                    Some("mnemonic".to_string()),
                ),
            AppError::Config(msg) => ("CONFIG_ERROR", msg.clone(), None),
            AppError::Internal(msg) => ("INTERNAL_ERROR", msg.clone(), None),
        };

        ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                field,
            },
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => axum::http::StatusCode::NOT_FOUND,
            AppError::Validation { .. } | AppError::InvalidMnemonic => {
                axum::http::StatusCode::BAD_REQUEST
            }
            AppError::Transactor(_) | AppError::Oracle(_) => axum::http::StatusCode::BAD_GATEWAY,
            _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };

        let response = self.to_error_response();
        (status, axum::Json(response)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::validation("bad amount"), 400),
            (AppError::NotFound("Plan".to_string()), 404),
            (AppError::Transactor("rpc down".to_string()), 502),
            (AppError::Persistence("write failed".to_string()), 500),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status().as_u16(), status);
        }
    }

    #[test]
    fn test_validation_field_is_reported() {
        let response = AppError::invalid_field("amount", "amount must be positive")
            .to_error_response();

        assert_eq!(response.error.code, "VALIDATION_ERROR");
        assert_eq!(response.error.field.as_deref(), Some("amount"));
    }
}
