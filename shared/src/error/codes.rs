//! Error codes for the Brandson platform
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Order errors
//! - 4xxx: Quote errors
//! - 5xxx: Payment errors
//! - 6xxx: Invoice errors
//! - 7xxx: Receipt errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enum
///
/// Represented as u16 values on the wire so the web front-end can switch on
/// them without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Status change not allowed from the current state
    InvalidStatusTransition = 6,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Staff or admin role required
    StaffRequired = 2002,

    // ==================== 3xxx: Order ====================
    /// Order not found
    OrderNotFound = 3001,
    /// Order has already been paid
    OrderAlreadyPaid = 3002,
    /// Order is cancelled or refunded
    OrderClosed = 3003,

    // ==================== 4xxx: Quote ====================
    /// Quote not found
    QuoteNotFound = 4001,
    /// Quote cannot be converted to an order
    QuoteNotConvertible = 4002,
    /// Quote validity has passed
    QuoteExpired = 4003,

    // ==================== 5xxx: Payment ====================
    /// Payment processing failed
    PaymentFailed = 5001,
    /// Payment provider returned an error or was unreachable
    PaymentProviderError = 5002,
    /// Phone number is not a valid Kenyan mobile number
    InvalidPhoneNumber = 5003,
    /// Webhook signature missing or invalid
    WebhookSignatureInvalid = 5004,
    /// Payment method not supported for this operation
    PaymentInvalidMethod = 5005,
    /// Payment provider is not configured
    PaymentNotConfigured = 5006,
    /// Paid or requested amount does not match the order total
    PaymentAmountMismatch = 5007,

    // ==================== 6xxx: Invoice ====================
    /// Invoice not found
    InvoiceNotFound = 6001,

    // ==================== 7xxx: Receipt ====================
    /// Receipt not found
    ReceiptNotFound = 7001,
    /// Refund amount outside the allowed range
    RefundAmountInvalid = 7002,
    /// Receipt is not in a refundable state
    ReceiptNotRefundable = 7003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9003,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            Self::Success => "Operation completed successfully",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::InvalidRequest => "Invalid request",
            Self::InvalidStatusTransition => "Status change not allowed",

            // Auth
            Self::NotAuthenticated => "Authentication required",
            Self::TokenExpired => "Token has expired",
            Self::TokenInvalid => "Invalid token",

            // Permission
            Self::PermissionDenied => "Permission denied",
            Self::StaffRequired => "Staff or admin role required",

            // Order
            Self::OrderNotFound => "Order not found",
            Self::OrderAlreadyPaid => "Order has already been paid",
            Self::OrderClosed => "Order is cancelled or refunded",

            // Quote
            Self::QuoteNotFound => "Quote not found",
            Self::QuoteNotConvertible => "Quote cannot be converted to an order",
            Self::QuoteExpired => "Quote has expired",

            // Payment
            Self::PaymentFailed => "Payment failed",
            Self::PaymentProviderError => "Payment provider error",
            Self::InvalidPhoneNumber => "Invalid phone number",
            Self::WebhookSignatureInvalid => "Invalid webhook signature",
            Self::PaymentInvalidMethod => "Invalid payment method",
            Self::PaymentNotConfigured => "Payment provider not configured",
            Self::PaymentAmountMismatch => "Payment amount does not match the order total",

            // Invoice
            Self::InvoiceNotFound => "Invoice not found",

            // Receipt
            Self::ReceiptNotFound => "Receipt not found",
            Self::RefundAmountInvalid => "Invalid refund amount",
            Self::ReceiptNotRefundable => "Receipt cannot be refunded",

            // System
            Self::InternalError => "Internal server error",
            Self::DatabaseError => "Database error",
            Self::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error returned when a u16 does not map to a known [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let code = match value {
            0 => Self::Success,
            1 => Self::Unknown,
            2 => Self::ValidationFailed,
            3 => Self::NotFound,
            4 => Self::AlreadyExists,
            5 => Self::InvalidRequest,
            6 => Self::InvalidStatusTransition,

            1001 => Self::NotAuthenticated,
            1003 => Self::TokenExpired,
            1004 => Self::TokenInvalid,

            2001 => Self::PermissionDenied,
            2002 => Self::StaffRequired,

            3001 => Self::OrderNotFound,
            3002 => Self::OrderAlreadyPaid,
            3003 => Self::OrderClosed,

            4001 => Self::QuoteNotFound,
            4002 => Self::QuoteNotConvertible,
            4003 => Self::QuoteExpired,

            5001 => Self::PaymentFailed,
            5002 => Self::PaymentProviderError,
            5003 => Self::InvalidPhoneNumber,
            5004 => Self::WebhookSignatureInvalid,
            5005 => Self::PaymentInvalidMethod,
            5006 => Self::PaymentNotConfigured,
            5007 => Self::PaymentAmountMismatch,

            6001 => Self::InvoiceNotFound,

            7001 => Self::ReceiptNotFound,
            7002 => Self::RefundAmountInvalid,
            7003 => Self::ReceiptNotRefundable,

            9001 => Self::InternalError,
            9002 => Self::DatabaseError,
            9003 => Self::ConfigError,

            _ => return Err(InvalidErrorCode(value)),
        };
        Ok(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
