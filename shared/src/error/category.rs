//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Authentication errors (1xxx)
    Auth,
    /// Permission errors (2xxx)
    Permission,
    /// Order errors (3xxx)
    Order,
    /// Quote errors (4xxx)
    Quote,
    /// Payment errors (5xxx)
    Payment,
    /// Invoice errors (6xxx)
    Invoice,
    /// Receipt errors (7xxx)
    Receipt,
    /// System errors (8xxx and above)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Auth,
            2000..3000 => Self::Permission,
            3000..4000 => Self::Order,
            4000..5000 => Self::Quote,
            5000..6000 => Self::Payment,
            6000..7000 => Self::Invoice,
            7000..8000 => Self::Receipt,
            _ => Self::System,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Order => "order",
            Self::Quote => "quote",
            Self::Payment => "payment",
            Self::Invoice => "invoice",
            Self::Receipt => "receipt",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(1001), ErrorCategory::Auth);
        assert_eq!(ErrorCategory::from_code(2001), ErrorCategory::Permission);
        assert_eq!(ErrorCategory::from_code(3001), ErrorCategory::Order);
        assert_eq!(ErrorCategory::from_code(4001), ErrorCategory::Quote);
        assert_eq!(ErrorCategory::from_code(5001), ErrorCategory::Payment);
        assert_eq!(ErrorCategory::from_code(6001), ErrorCategory::Invoice);
        assert_eq!(ErrorCategory::from_code(7001), ErrorCategory::Receipt);
        assert_eq!(ErrorCategory::from_code(9001), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(10000), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::InvalidStatusTransition.category(), ErrorCategory::General);
        assert_eq!(ErrorCode::TokenExpired.category(), ErrorCategory::Auth);
        assert_eq!(ErrorCode::StaffRequired.category(), ErrorCategory::Permission);
        assert_eq!(ErrorCode::OrderNotFound.category(), ErrorCategory::Order);
        assert_eq!(ErrorCode::QuoteExpired.category(), ErrorCategory::Quote);
        assert_eq!(ErrorCode::InvalidPhoneNumber.category(), ErrorCategory::Payment);
        assert_eq!(ErrorCode::InvoiceNotFound.category(), ErrorCategory::Invoice);
        assert_eq!(ErrorCode::RefundAmountInvalid.category(), ErrorCategory::Receipt);
        assert_eq!(ErrorCode::DatabaseError.category(), ErrorCategory::System);
    }

    #[test]
    fn test_category_serde() {
        assert_eq!(serde_json::to_string(&ErrorCategory::Invoice).unwrap(), "\"invoice\"");
        let category: ErrorCategory = serde_json::from_str("\"receipt\"").unwrap();
        assert_eq!(category, ErrorCategory::Receipt);
        assert_eq!(category.name(), "receipt");
    }
}
