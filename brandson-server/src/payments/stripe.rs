//! Stripe Checkout via REST API (no SDK dependency)

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use shared::models::PaymentMethod;
use shared::money;

use super::{
    CheckoutLineItem, PaymentError, PaymentGateway, PaymentInitiation, PaymentOutcome,
    PaymentRequest, PriceData, ProductData, RefundOutcome,
};

const API_BASE: &str = "https://api.stripe.com";

/// Replay window for webhook timestamps
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub const METADATA_SOURCE: &str = "brandson-website";

/// Checkout session parameters
#[derive(Debug, Clone, Default)]
pub struct CheckoutRequest {
    pub line_items: Vec<CheckoutLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Subset of a retrieved checkout session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionDetails {
    pub id: String,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub payment_intent: Option<String>,
    pub amount_total: Option<f64>,
    pub customer_email: Option<String>,
    pub order_id: Option<String>,
}

impl CheckoutSessionDetails {
    /// Settled sessions only; open sessions and unpaid completions are `None`
    pub fn into_outcome(self) -> Option<PaymentOutcome> {
        let success = match (self.status.as_deref(), self.payment_status.as_deref()) {
            (_, Some("paid" | "no_payment_required")) => true,
            (Some("expired"), _) => false,
            _ => return None,
        };
        Some(PaymentOutcome {
            provider: PaymentMethod::Stripe,
            idempotency_key: self.id.clone(),
            reference: self.id,
            success,
            transaction_id: self.payment_intent.clone(),
            payment_intent_id: self.payment_intent,
            amount: self.amount_total,
            description: "checkout.session.retrieved".to_string(),
        })
    }
}

/// What a verified webhook event asks of the reconciler
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookAction {
    Payment(PaymentOutcome),
    Refund(RefundOutcome),
    Ignored,
}

pub struct StripeClient {
    secret_key: String,
    webhook_secret: String,
    api_base: String,
    http: reqwest::Client,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base: API_BASE.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Point the client at another API host (local stubs)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    fn ensure_configured(&self) -> Result<(), PaymentError> {
        if self.secret_key.trim().is_empty() {
            return Err(PaymentError::NotConfigured(vec!["STRIPE_SECRET_KEY"]));
        }
        Ok(())
    }

    /// Create a Checkout Session (payment mode)
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if request.line_items.is_empty() {
            return Err(PaymentError::InvalidRequest("Line items are required".into()));
        }
        if request.success_url.is_empty() || request.cancel_url.is_empty() {
            return Err(PaymentError::InvalidRequest(
                "Success and cancel URLs are required".into(),
            ));
        }
        self.ensure_configured()?;

        let resp = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&checkout_form(request))
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        if !status.is_success() {
            return Err(PaymentError::Rejected(stripe_error_message(&body)));
        }

        match (body["id"].as_str(), body["url"].as_str()) {
            (Some(id), Some(url)) => Ok(CheckoutSession {
                id: id.to_string(),
                url: url.to_string(),
            }),
            _ => Err(PaymentError::InvalidResponse(format!(
                "Stripe checkout session without id/url: {body}"
            ))),
        }
    }

    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionDetails, PaymentError> {
        self.ensure_configured()?;
        let resp = self
            .http
            .get(format!("{}/v1/checkout/sessions/{session_id}", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        if !status.is_success() {
            return Err(PaymentError::Rejected(stripe_error_message(&body)));
        }

        let text = |key: &str| body[key].as_str().map(String::from);
        Ok(CheckoutSessionDetails {
            id: text("id").unwrap_or_else(|| session_id.to_string()),
            status: text("status"),
            payment_status: text("payment_status"),
            payment_intent: text("payment_intent"),
            amount_total: body["amount_total"].as_i64().map(money::from_minor_units),
            customer_email: text("customer_email"),
            order_id: body["metadata"]["order_id"].as_str().map(String::from),
        })
    }

    pub fn verify_webhook_signature(&self, payload: &[u8], sig_header: &str) -> Result<(), &'static str> {
        verify_webhook_signature(payload, sig_header, &self.webhook_secret)
    }
}

fn stripe_error_message(body: &Value) -> String {
    body["error"]["message"]
        .as_str()
        .unwrap_or("Stripe request failed")
        .to_string()
}

/// Form-encoded checkout parameters in Stripe's bracket notation
fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("payment_method_types[0]".into(), "card".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("billing_address_collection".into(), "required".into()),
        ("shipping_address_collection[allowed_countries][0]".into(), "KE".into()),
        ("phone_number_collection[enabled]".into(), "true".into()),
        ("metadata[source]".into(), METADATA_SOURCE.into()),
    ];
    if let Some(email) = &request.customer_email {
        form.push(("customer_email".into(), email.clone()));
    }
    if let Some(order_id) = &request.order_id {
        form.push(("metadata[order_id]".into(), order_id.clone()));
        form.push(("client_reference_id".into(), order_id.clone()));
    }

    for (i, item) in request.line_items.iter().enumerate() {
        let price = format!("line_items[{i}][price_data]");
        form.push((format!("{price}[currency]"), item.price_data.currency.to_lowercase()));
        form.push((format!("{price}[unit_amount]"), item.price_data.unit_amount.to_string()));
        let product = &item.price_data.product_data;
        form.push((format!("{price}[product_data][name]"), product.name.clone()));
        if let Some(description) = &product.description {
            form.push((format!("{price}[product_data][description]"), description.clone()));
        }
        for (key, value) in &product.metadata {
            form.push((format!("{price}[product_data][metadata][{key}]"), value.clone()));
        }
        form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
    }
    form
}

fn mac_for(secret: &str, timestamp: &str, payload: &[u8]) -> Result<Hmac<Sha256>, &'static str> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// `Stripe-Signature` header value for `payload` signed at `timestamp`
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, &'static str> {
    let ts = timestamp.to_string();
    let mac = mac_for(secret, &ts, payload)?;
    Ok(format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify Stripe webhook signature (HMAC-SHA256)
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<(), &'static str> {
    verify_webhook_signature_at(payload, sig_header, secret, chrono::Utc::now().timestamp())
}

pub fn verify_webhook_signature_at(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err("Invalid Stripe-Signature header");
    }

    // Secret rotation sends several v1 entries; any match is enough
    let mac = mac_for(secret, timestamp, payload)?;
    let matched = signatures.iter().any(|signature| {
        hex::decode(signature)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err("Webhook signature mismatch");
    }

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err("Webhook timestamp too old");
    }

    Ok(())
}

/// Map a verified event onto a reconciler action
pub fn event_action(event: &Value) -> Result<WebhookAction, &'static str> {
    let event_id = event["id"].as_str().ok_or("Webhook event missing id")?;
    let event_type = event["type"].as_str().unwrap_or("");
    let obj = &event["data"]["object"];

    let session_outcome = |success: bool| -> Result<WebhookAction, &'static str> {
        let session_id = obj["id"].as_str().ok_or("Checkout session missing id")?;
        let payment_intent = obj["payment_intent"].as_str().map(String::from);
        Ok(WebhookAction::Payment(PaymentOutcome {
            provider: PaymentMethod::Stripe,
            idempotency_key: event_id.to_string(),
            reference: session_id.to_string(),
            success,
            transaction_id: payment_intent.clone(),
            payment_intent_id: payment_intent,
            amount: obj["amount_total"].as_i64().map(money::from_minor_units),
            description: event_type.to_string(),
        }))
    };

    match event_type {
        // Delayed methods complete unpaid and settle via async_payment_*
        "checkout.session.completed" if obj["payment_status"].as_str() == Some("unpaid") => {
            Ok(WebhookAction::Ignored)
        }
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            session_outcome(true)
        }
        "checkout.session.async_payment_failed" | "checkout.session.expired" => {
            session_outcome(false)
        }
        "charge.refunded" => {
            let payment_intent = obj["payment_intent"]
                .as_str()
                .ok_or("Charge missing payment_intent")?;
            let refunded = obj["amount_refunded"].as_i64().unwrap_or(0);
            let full = obj["refunded"].as_bool().unwrap_or(false)
                || obj["amount"].as_i64().is_some_and(|amount| refunded >= amount);
            Ok(WebhookAction::Refund(RefundOutcome {
                provider: PaymentMethod::Stripe,
                idempotency_key: event_id.to_string(),
                reference: payment_intent.to_string(),
                amount_refunded: money::from_minor_units(refunded),
                full,
                reason: obj["refunds"]["data"][0]["reason"]
                    .as_str()
                    .unwrap_or("Refunded via Stripe")
                    .to_string(),
            }))
        }
        _ => Ok(WebhookAction::Ignored),
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiation, PaymentError> {
        let line_items = if request.items.is_empty() {
            vec![CheckoutLineItem {
                price_data: PriceData {
                    currency: request.currency.clone(),
                    product_data: ProductData {
                        name: request.description.clone(),
                        description: None,
                        metadata: Default::default(),
                    },
                    unit_amount: money::to_minor_units(request.amount),
                },
                quantity: 1,
            }]
        } else {
            request.items.clone()
        };
        let checkout = CheckoutRequest {
            line_items,
            success_url: request.success_url.clone().unwrap_or_default(),
            cancel_url: request.cancel_url.clone().unwrap_or_default(),
            customer_email: request.customer_email.clone(),
            order_id: request.order_id.clone(),
        };

        match self.create_checkout_session(&checkout).await {
            Ok(session) => {
                tracing::info!(
                    session_id = %session.id,
                    reference = %request.reference,
                    "Stripe checkout session created"
                );
                Ok(PaymentInitiation {
                    reference: session.id,
                    merchant_reference: None,
                    redirect_url: Some(session.url),
                    message: None,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, reference = %request.reference, "Stripe checkout failed");
                Err(e)
            }
        }
    }

    async fn query(&self, reference: &str) -> Result<Option<PaymentOutcome>, PaymentError> {
        Ok(self.retrieve_checkout_session(reference).await?.into_outcome())
    }
}
