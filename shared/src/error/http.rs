//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::OrderNotFound
            | Self::QuoteNotFound
            | Self::InvoiceNotFound
            | Self::ReceiptNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists
            | Self::InvalidStatusTransition
            | Self::OrderAlreadyPaid
            | Self::OrderClosed
            | Self::QuoteNotConvertible
            | Self::QuoteExpired
            | Self::ReceiptNotRefundable => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::NotAuthenticated
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::WebhookSignatureInvalid => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            Self::PermissionDenied | Self::StaffRequired => StatusCode::FORBIDDEN,

            // 502 Bad Gateway (upstream provider failed)
            Self::PaymentProviderError | Self::PaymentFailed => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            Self::Unknown
            | Self::InternalError
            | Self::DatabaseError
            | Self::ConfigError
            | Self::PaymentNotConfigured => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request
            Self::ValidationFailed
            | Self::InvalidRequest
            | Self::InvalidPhoneNumber
            | Self::PaymentInvalidMethod
            | Self::PaymentAmountMismatch
            | Self::RefundAmountInvalid => StatusCode::BAD_REQUEST,
        }
    }
}
