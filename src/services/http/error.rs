use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::ServiceError;

#[derive(Debug)]
pub enum ApiError {
    AuthRequired,
    InvalidToken,
    Forbidden,
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

fn error_body(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "message": message, "error": code }))).into_response()
}

fn rejected(status: StatusCode, code: &str, message: &str) -> Response {
    log::warn!("Rejected request ({}): {}", code, message);
    error_body(status, code, message)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            ApiError::AuthRequired => {
                return error_body(
                    StatusCode::UNAUTHORIZED,
                    "auth_required",
                    "Authentication required",
                )
            }
            ApiError::InvalidToken => {
                return error_body(
                    StatusCode::UNAUTHORIZED,
                    "invalid_token",
                    "Invalid or expired token",
                )
            }
            ApiError::Forbidden => {
                return error_body(StatusCode::FORBIDDEN, "forbidden", "Admin access required")
            }
            ApiError::Service(e) => e,
        };

        let message = e.to_string();
        match e {
            ServiceError::InvalidAmount(_) => {
                rejected(StatusCode::BAD_REQUEST, "invalid_amount", &message)
            }
            ServiceError::InvalidMethod => {
                rejected(StatusCode::BAD_REQUEST, "invalid_method", &message)
            }
            ServiceError::InvalidStatus => {
                rejected(StatusCode::BAD_REQUEST, "invalid_status", &message)
            }
            ServiceError::InvalidRequest(_) => {
                rejected(StatusCode::BAD_REQUEST, "invalid_request", &message)
            }
            ServiceError::InsufficientBalance => {
                rejected(StatusCode::BAD_REQUEST, "insufficient_balance", &message)
            }
            ServiceError::AlreadyProcessed => {
                rejected(StatusCode::BAD_REQUEST, "already_processed", &message)
            }
            ServiceError::UserNotFound => {
                rejected(StatusCode::NOT_FOUND, "user_not_found", &message)
            }
            ServiceError::WithdrawalNotFound => {
                rejected(StatusCode::NOT_FOUND, "withdrawal_not_found", &message)
            }
            ServiceError::Webhook(_) => {
                log::warn!("{}", message);
                (StatusCode::BAD_REQUEST, message).into_response()
            }
            ServiceError::Payment(_) => {
                log::error!("{}", message);
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "payment_error",
                    "Error processing payment",
                )
            }
            ServiceError::Transfer(_) => {
                log::error!("{}", message);
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "withdrawal_error",
                    "Error processing withdrawal",
                )
            }
            ServiceError::Database(_)
            | ServiceError::Communication(_, _)
            | ServiceError::Internal(_) => {
                log::error!("{}", message);
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "Internal server error",
                )
            }
        }
    }
}
