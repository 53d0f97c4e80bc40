//! Payment provider bridges
//!
//! Each provider implements [`PaymentGateway`]: a domain payment request goes
//! in, a pending-confirmation token (or a typed failure) comes out. Provider
//! callbacks are normalized into [`PaymentOutcome`] / [`RefundOutcome`] for
//! the reconciler.

pub mod mpesa;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::PaymentMethod;
use thiserror::Error;

pub use mpesa::MpesaClient;
pub use stripe::StripeClient;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Invalid phone number format. Use 07XXXXXXXX or 2547XXXXXXXX")]
    InvalidPhone,

    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),

    #[error("Payment provider not configured: missing {}", .0.join(", "))]
    NotConfigured(Vec<&'static str>),

    #[error("Payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Rejected(String),

    #[error("Unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let code = match &err {
            PaymentError::InvalidPhone => ErrorCode::InvalidPhoneNumber,
            PaymentError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            PaymentError::NotConfigured(_) => ErrorCode::PaymentNotConfigured,
            PaymentError::Http(_) | PaymentError::InvalidResponse(_) => {
                ErrorCode::PaymentProviderError
            }
            PaymentError::Rejected(_) => ErrorCode::PaymentFailed,
        };
        AppError::with_message(code, err.to_string())
    }
}

/// Stripe-shaped checkout line (`price_data` / `quantity`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLineItem {
    pub price_data: PriceData,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    pub currency: String,
    pub product_data: ProductData,
    /// Minor units
    pub unit_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub metadata: std::collections::BTreeMap<String, String>,
}

/// A payment to collect through a provider
#[derive(Debug, Clone, Default)]
pub struct PaymentRequest {
    /// Major units
    pub amount: f64,
    pub currency: String,
    /// Order number or free-form account reference
    pub reference: String,
    pub description: String,
    pub phone_number: Option<String>,
    pub customer_email: Option<String>,
    pub items: Vec<CheckoutLineItem>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub order_id: Option<String>,
}

/// Accepted by the provider; confirmation arrives later by callback
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    /// CheckoutRequestID (M-Pesa) or checkout session id (Stripe)
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiation, PaymentError>;

    /// Ask the provider where a pending payment stands; `None` while the
    /// customer has not finished paying
    async fn query(&self, reference: &str) -> Result<Option<PaymentOutcome>, PaymentError>;
}

/// Normalized provider confirmation of a payment attempt
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub provider: PaymentMethod,
    /// CheckoutRequestID (M-Pesa) or event id (Stripe)
    pub idempotency_key: String,
    /// Key of the pending payment: CheckoutRequestID or checkout session id
    pub reference: String,
    pub success: bool,
    /// M-Pesa receipt number or Stripe payment intent
    pub transaction_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub amount: Option<f64>,
    pub description: String,
}

/// Normalized provider refund notification
#[derive(Debug, Clone, PartialEq)]
pub struct RefundOutcome {
    pub provider: PaymentMethod,
    pub idempotency_key: String,
    /// Payment intent (Stripe) the refund belongs to
    pub reference: String,
    /// Cumulative refunded amount, major units
    pub amount_refunded: f64,
    /// Whole payment returned
    pub full: bool,
    pub reason: String,
}
