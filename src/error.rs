use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Error codes for categorizing errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum ErrorCode {
    // Authentication errors (1xxx)
    #[serde(rename = "AUTH_1001")]
    TokenMissing,
    #[serde(rename = "AUTH_1002")]
    TokenInvalid,
    #[serde(rename = "AUTH_1003")]
    TokenExpired,

    // Authorization errors (2xxx)
    #[serde(rename = "AUTHZ_2001")]
    InsufficientPermissions,
    #[serde(rename = "AUTHZ_2002")]
    NotOwner,
    #[serde(rename = "AUTHZ_2003")]
    AdminOverrideRequired,
    #[serde(rename = "AUTHZ_2004")]
    PenaltyActive,

    // Validation errors (3xxx)
    #[serde(rename = "VAL_3001")]
    InvalidInput,
    #[serde(rename = "VAL_3002")]
    InvalidFormat,
    #[serde(rename = "BID_3101")]
    InvalidBidPrice,
    #[serde(rename = "BID_3102")]
    ProductOptionNotFound,
    #[serde(rename = "ADM_3201")]
    InvalidReasonCode,

    // Resource and state errors (4xxx)
    #[serde(rename = "RES_4001")]
    NotFound,
    #[serde(rename = "RES_4003")]
    InvalidState,
    #[serde(rename = "TRADE_4302")]
    TradeNotCancellable,

    // Payment errors (5xxx)
    #[serde(rename = "PAY_5001")]
    PaymentAmountMismatch,
    #[serde(rename = "PAY_5002")]
    MerchantMismatch,
    #[serde(rename = "PAY_5003")]
    PaymentNotConfirmed,
    #[serde(rename = "PAY_5004")]
    RefundAmountExceeded,

    // Concurrency errors (6xxx)
    #[serde(rename = "LOCK_6001")]
    LockTimeout,

    // External service errors (8xxx)
    #[serde(rename = "EXT_8001")]
    PaymentProviderError,
    #[serde(rename = "EXT_8002")]
    ExternalServiceTimeout,

    // Rate limiting errors (9xxx)
    #[serde(rename = "RATE_9001")]
    RateLimitExceeded,

    // Internal errors (9xxx)
    #[serde(rename = "INT_9999")]
    InternalServerError,
}

impl ErrorCode {
    /// Get numeric code
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::TokenMissing => 1001,
            ErrorCode::TokenInvalid => 1002,
            ErrorCode::TokenExpired => 1003,

            ErrorCode::InsufficientPermissions => 2001,
            ErrorCode::NotOwner => 2002,
            ErrorCode::AdminOverrideRequired => 2003,
            ErrorCode::PenaltyActive => 2004,

            ErrorCode::InvalidInput => 3001,
            ErrorCode::InvalidFormat => 3002,
            ErrorCode::InvalidBidPrice => 3101,
            ErrorCode::ProductOptionNotFound => 3102,
            ErrorCode::InvalidReasonCode => 3201,

            ErrorCode::NotFound => 4001,
            ErrorCode::InvalidState => 4003,
            ErrorCode::TradeNotCancellable => 4302,

            ErrorCode::PaymentAmountMismatch => 5001,
            ErrorCode::MerchantMismatch => 5002,
            ErrorCode::PaymentNotConfirmed => 5003,
            ErrorCode::RefundAmountExceeded => 5004,

            ErrorCode::LockTimeout => 6001,

            ErrorCode::PaymentProviderError => 8001,
            ErrorCode::ExternalServiceTimeout => 8002,

            ErrorCode::RateLimitExceeded => 9001,

            ErrorCode::InternalServerError => 9999,
        }
    }

    /// Get user-friendly message
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::TokenMissing => "Authentication required. Please log in",
            ErrorCode::TokenInvalid => "Invalid authentication token",
            ErrorCode::TokenExpired => "Your session has expired. Please log in again",

            ErrorCode::InsufficientPermissions => {
                "You don't have permission to perform this action"
            }
            ErrorCode::NotOwner => "Only the owner of this resource may change it",
            ErrorCode::AdminOverrideRequired => "This action requires administrator override",
            ErrorCode::PenaltyActive => "Bidding is restricted while a cancellation penalty is active",

            ErrorCode::InvalidInput => "Invalid input provided",
            ErrorCode::InvalidFormat => "Invalid format provided",
            ErrorCode::InvalidBidPrice => "Bid price must be greater than zero",
            ErrorCode::ProductOptionNotFound => "The product option does not exist",
            ErrorCode::InvalidReasonCode => "Unknown cancellation reason code",

            ErrorCode::NotFound => "The requested resource was not found",
            ErrorCode::InvalidState => "The operation is not valid in the current state",
            ErrorCode::TradeNotCancellable => "Only trades awaiting payment can be cancelled",

            ErrorCode::PaymentAmountMismatch => "Paid amount does not match the trade price",
            ErrorCode::MerchantMismatch => "Merchant reference does not match this payment",
            ErrorCode::PaymentNotConfirmed => "The payment provider has not confirmed this payment",
            ErrorCode::RefundAmountExceeded => "Refund amount exceeds the paid amount",

            ErrorCode::LockTimeout => "The market is busy. Please retry shortly",

            ErrorCode::PaymentProviderError => "Payment provider request failed",
            ErrorCode::ExternalServiceTimeout => "External service request timed out",

            ErrorCode::RateLimitExceeded => "Rate limit exceeded. Please try again later",

            ErrorCode::InternalServerError => "An internal server error occurred",
        }
    }

    /// HTTP status this code is surfaced with
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::TokenMissing | ErrorCode::TokenInvalid | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::InsufficientPermissions
            | ErrorCode::NotOwner
            | ErrorCode::AdminOverrideRequired
            | ErrorCode::PenaltyActive
            | ErrorCode::TradeNotCancellable => StatusCode::FORBIDDEN,

            ErrorCode::InvalidInput
            | ErrorCode::InvalidFormat
            | ErrorCode::InvalidBidPrice
            | ErrorCode::InvalidReasonCode
            | ErrorCode::PaymentAmountMismatch
            | ErrorCode::MerchantMismatch
            | ErrorCode::RefundAmountExceeded => StatusCode::BAD_REQUEST,

            ErrorCode::NotFound | ErrorCode::ProductOptionNotFound => StatusCode::NOT_FOUND,

            ErrorCode::InvalidState | ErrorCode::PaymentNotConfirmed => StatusCode::CONFLICT,

            ErrorCode::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::PaymentProviderError => StatusCode::BAD_GATEWAY,
            ErrorCode::ExternalServiceTimeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub request_id: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub code_number: u16,
    pub message: String,
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Lock on {resource} not acquired. Retry after {retry_after_seconds} seconds")]
    LockTimeout {
        resource: String,
        retry_after_seconds: u64,
    },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("{1}")]
    WithCode(ErrorCode, String),

    #[error("{1}")]
    WithCodeAndDetails(ErrorCode, String, String),

    #[error("Validation failed: {field}")]
    ValidationWithField {
        code: ErrorCode,
        field: String,
        message: String,
    },
}

impl ApiError {
    /// Create error with specific error code
    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError::WithCode(code, message.into())
    }

    /// Create error with code and additional details
    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        ApiError::WithCodeAndDetails(code, message.into(), details.into())
    }

    /// Create validation error for specific field
    pub fn validation_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationWithField {
            code: ErrorCode::InvalidInput,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        ApiError::with_code(ErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn not_owner(resource: &str) -> Self {
        ApiError::with_code(
            ErrorCode::NotOwner,
            format!("Only the owner of this {} may change it", resource),
        )
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ApiError::with_code(ErrorCode::InvalidState, message)
    }

    pub fn penalty_active(until: DateTime<Utc>) -> Self {
        ApiError::with_details(
            ErrorCode::PenaltyActive,
            ErrorCode::PenaltyActive.message(),
            format!("Bidding is restricted until {}", until.to_rfc3339()),
        )
    }

    pub fn lock_timeout(resource: &str) -> Self {
        ApiError::LockTimeout {
            resource: resource.to_string(),
            retry_after_seconds: 1,
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        ApiError::with_code(ErrorCode::PaymentProviderError, message)
    }

    /// Get error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ApiError::Unauthorized(_) => ErrorCode::TokenMissing,
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            ApiError::LockTimeout { .. } => ErrorCode::LockTimeout,
            ApiError::Internal(_) => ErrorCode::InternalServerError,
            ApiError::WithCode(code, _) => *code,
            ApiError::WithCodeAndDetails(code, _, _) => *code,
            ApiError::ValidationWithField { code, .. } => *code,
        }
    }

    /// Get error details
    fn error_details(&self) -> Option<String> {
        match self {
            ApiError::WithCodeAndDetails(_, _, details) => Some(details.clone()),
            ApiError::LockTimeout { resource, .. } => Some(format!("resource: {}", resource)),
            _ => None,
        }
    }

    /// Get field name for validation errors
    fn error_field(&self) -> Option<String> {
        match self {
            ApiError::ValidationWithField { field, .. } => Some(field.clone()),
            _ => None,
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::RateLimitExceeded {
                retry_after_seconds,
            }
            | ApiError::LockTimeout {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    /// Get status code
    pub fn status_code(&self) -> StatusCode {
        self.error_code().status()
    }

    /// Log error with appropriate level
    fn log_error(&self, request_id: &str) {
        match self.status_code() {
            status if status.is_server_error() => {
                error!(
                    request_id = %request_id,
                    error = %self,
                    "Server error occurred"
                );
            }
            status if status.is_client_error() => {
                warn!(
                    request_id = %request_id,
                    error = %self,
                    "Client error occurred"
                );
            }
            _ => {}
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let code = self.error_code();

        self.log_error(&request_id);

        let retry_after = self.retry_after();
        let error_response = ErrorResponse {
            error: ErrorDetail {
                code,
                code_number: code.code(),
                message: match &self {
                    ApiError::WithCode(_, msg) | ApiError::WithCodeAndDetails(_, msg, _) => {
                        msg.clone()
                    }
                    ApiError::ValidationWithField { message, .. } => message.clone(),
                    ApiError::Unauthorized(msg) | ApiError::NotFound(msg) => msg.clone(),
                    _ => code.message().to_string(),
                },
                details: self.error_details(),
                field: self.error_field(),
                retry_after,
            },
            request_id,
            timestamp: Utc::now().to_rfc3339(),
        };

        let mut response = (status, Json(error_response)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }

        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        match err {
            JsonRejection::JsonDataError(e) => ApiError::with_details(
                ErrorCode::InvalidInput,
                "Invalid input provided",
                e.body_text(),
            ),
            JsonRejection::JsonSyntaxError(_) => {
                ApiError::with_code(ErrorCode::InvalidFormat, "Invalid JSON format")
            }
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::with_code(ErrorCode::InvalidFormat, "JSON content type required")
            }
            other => ApiError::with_details(
                ErrorCode::InvalidInput,
                "Invalid request body format",
                other.body_text(),
            ),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::with_details(
            ErrorCode::InvalidInput,
            "Invalid query parameters",
            err.body_text(),
        )
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<_> = field_errors.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        match fields.first() {
            Some((field, errs)) => {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                ApiError::validation_field(field.to_string(), message)
            }
            None => ApiError::with_code(ErrorCode::InvalidInput, errors.to_string()),
        }
    }
}
