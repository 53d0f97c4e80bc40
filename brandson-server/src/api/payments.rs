//! Payment endpoints
//!
//! - `POST /payments/mpesa` and `POST /payments/stripe`: direct initiation
//!   (authenticated)
//! - `POST /payments/mpesa/callback` and `POST /payments/stripe/webhook`:
//!   provider notifications (public, raw body)

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{DEFAULT_CURRENCY, PaymentMethod};
use shared::util::now;
use shared::{ApiResponse, money};

use super::extract::JsonBody;
use super::orders::checkout_items;
use crate::auth::CurrentUser;
use crate::db::PendingPayment;
use crate::payments::mpesa::{self, CallbackResult};
use crate::payments::stripe::{self, WebhookAction};
use crate::payments::{CheckoutLineItem, PaymentInitiation, PaymentRequest};
use crate::reconcile::{ReconcileResult, ensure_payable};
use crate::state::AppState;

/// Authenticated initiation routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/mpesa", post(mpesa_initiate))
        .route("/payments/stripe", post(stripe_checkout))
}

/// Provider notification routes; no bearer token
pub fn callback_router() -> Router<AppState> {
    Router::new()
        .route("/payments/mpesa/callback", post(mpesa_callback))
        .route("/payments/stripe/webhook", post(stripe_webhook))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MpesaInitiateRequest {
    pub phone_number: String,
    pub amount: f64,
    pub reference: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeCheckoutRequest {
    /// Ignored when `order_id` is given; the order's own items are charged
    #[serde(default)]
    pub line_items: Vec<CheckoutLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutSessionCreated {
    pub id: String,
    pub url: String,
}

/// Daraja acknowledgement body
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MpesaAck {
    pub result_code: i32,
    pub result_desc: &'static str,
}

/// POST /payments/mpesa
///
/// When `reference` is an order number the STK push is linked to that order
/// and its confirmation settles it; the amount must then be the order total.
pub async fn mpesa_initiate(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(body): JsonBody<MpesaInitiateRequest>,
) -> AppResult<ApiResponse<PaymentInitiation>> {
    if !body.amount.is_finite() || body.amount <= 0.0 {
        return Err(AppError::validation("Amount must be greater than 0").with_detail("field", "amount"));
    }
    let reference = body.reference.trim().to_string();
    if reference.is_empty() {
        return Err(AppError::validation("Reference is required").with_detail("field", "reference"));
    }

    let order = state.orders.get_order_by_number(&reference)?;
    let amount = match &order {
        Some(order) => {
            user.ensure_access(&order.customer_email, order.customer_id.as_deref())?;
            ensure_payable(order)?;
            if !money::money_eq(body.amount, order.total) {
                return Err(AppError::with_message(
                    ErrorCode::PaymentAmountMismatch,
                    format!("Order {} totals {:.2}", order.order_number, order.total),
                )
                .with_detail("field", "amount"));
            }
            order.total
        }
        None => body.amount,
    };

    let request = PaymentRequest {
        amount,
        currency: order
            .as_ref()
            .map(|o| o.currency.clone())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        description: body
            .description
            .unwrap_or_else(|| format!("Payment for {reference}")),
        reference,
        phone_number: Some(body.phone_number),
        ..Default::default()
    };
    let initiation = state.mpesa.initiate(&request).await?;

    if let Some(order) = order {
        state.reconciler.register_pending(&PendingPayment {
            provider: PaymentMethod::Mpesa,
            reference: initiation.reference.clone(),
            order_id: order.id,
            amount: request.amount,
            currency: request.currency,
            created_at: now(),
        })?;
    }

    Ok(ApiResponse::success_with_message(
        initiation,
        "Payment request sent. Please check your phone to complete the payment.",
    ))
}

/// POST /payments/stripe
pub async fn stripe_checkout(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(body): JsonBody<StripeCheckoutRequest>,
) -> AppResult<ApiResponse<CheckoutSessionCreated>> {
    let order = match body.order_id.as_deref() {
        Some(id) => {
            let order = state.orders.get_order(id)?.ok_or_else(|| {
                AppError::with_message(ErrorCode::OrderNotFound, format!("Order {id} not found"))
            })?;
            user.ensure_access(&order.customer_email, order.customer_id.as_deref())?;
            ensure_payable(&order)?;
            Some(order)
        }
        None => None,
    };

    let line_items = match &order {
        Some(order) => checkout_items(order),
        None => body.line_items,
    };
    if line_items.is_empty() {
        return Err(AppError::validation("At least one line item is required")
            .with_detail("field", "lineItems"));
    }

    let (amount, currency) = match &order {
        Some(order) => (order.total, order.currency.clone()),
        None => (
            money::sum(line_items.iter().map(|item| {
                money::from_minor_units(item.price_data.unit_amount) * f64::from(item.quantity)
            })),
            line_items
                .first()
                .map(|item| item.price_data.currency.clone())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        ),
    };

    let request = PaymentRequest {
        amount,
        currency: currency.clone(),
        reference: order
            .as_ref()
            .map(|o| o.order_number.clone())
            .unwrap_or_default(),
        description: "Brandson Media checkout".to_string(),
        customer_email: body.customer_email.or_else(|| order.as_ref().map(|o| o.customer_email.clone())),
        items: line_items,
        success_url: Some(body.success_url),
        cancel_url: Some(body.cancel_url),
        order_id: order.as_ref().map(|o| o.id.clone()),
        ..Default::default()
    };
    let initiation = state.stripe.initiate(&request).await?;

    if let Some(order) = order {
        state.reconciler.register_pending(&PendingPayment {
            provider: PaymentMethod::Stripe,
            reference: initiation.reference.clone(),
            order_id: order.id,
            amount: order.total,
            currency,
            created_at: now(),
        })?;
    }

    Ok(ApiResponse::success(CheckoutSessionCreated {
        id: initiation.reference,
        url: initiation.redirect_url.unwrap_or_default(),
    }))
}

fn mpesa_ack(result_desc: &'static str) -> Json<MpesaAck> {
    Json(MpesaAck {
        result_code: 0,
        result_desc,
    })
}

/// POST /payments/mpesa/callback
///
/// Always answered with 200; failures are logged and the state left untouched.
pub async fn mpesa_callback(State(state): State<AppState>, body: Bytes) -> Json<MpesaAck> {
    let result: CallbackResult = match mpesa::parse_callback(&body) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable M-Pesa callback");
            return mpesa_ack("Callback received");
        }
    };

    tracing::info!(
        checkout_request_id = %result.checkout_request_id,
        result_code = result.result_code,
        result_desc = %result.result_desc,
        mpesa_receipt = ?result.mpesa_receipt,
        "M-Pesa callback received"
    );

    match state.reconciler.apply(&result.into_outcome()) {
        Ok(outcome) => {
            log_reconcile("mpesa", &outcome);
            mpesa_ack("Success")
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to apply M-Pesa callback");
            mpesa_ack("Callback received")
        }
    }
}

/// POST /payments/stripe/webhook
///
/// Must receive the raw body for HMAC signature verification.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(sig_header) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Missing Stripe-Signature header");
        return StatusCode::BAD_REQUEST;
    };

    if let Err(e) =
        stripe::verify_webhook_signature(&body, sig_header, &state.config.stripe_webhook_secret)
    {
        tracing::warn!(error = e, "Webhook signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%e, "Failed to parse webhook JSON");
            return StatusCode::BAD_REQUEST;
        }
    };
    let event_type = event["type"].as_str().unwrap_or("");
    tracing::info!(event_type, "Received Stripe webhook");

    let applied = match stripe::event_action(&event) {
        Ok(WebhookAction::Payment(outcome)) => state.reconciler.apply(&outcome),
        Ok(WebhookAction::Refund(outcome)) => state.reconciler.apply_refund(&outcome),
        Ok(WebhookAction::Ignored) => {
            tracing::debug!(event_type, "Unhandled webhook event type");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::warn!(error = e, event_type, "Malformed webhook event");
            return StatusCode::BAD_REQUEST;
        }
    };

    match applied {
        Ok(outcome) => {
            log_reconcile("stripe", &outcome);
            StatusCode::OK
        }
        // Stripe redelivers on 5xx; the transaction left nothing behind
        Err(e) => {
            tracing::error!(error = %e, event_type, "Failed to apply Stripe webhook");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn log_reconcile(provider: &str, outcome: &ReconcileResult) {
    match outcome {
        ReconcileResult::Applied { order, .. } => tracing::info!(
            provider,
            order_number = %order.order_number,
            payment_status = %order.payment_status,
            "Payment notification applied"
        ),
        ReconcileResult::Duplicate => {
            tracing::info!(provider, "Duplicate payment notification, skipping")
        }
        ReconcileResult::Unmatched => {
            tracing::warn!(provider, "Payment notification matches no pending payment")
        }
        ReconcileResult::Rejected(reason) => {
            tracing::warn!(provider, reason = %reason, "Payment notification rejected")
        }
    }
}
