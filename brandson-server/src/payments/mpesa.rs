//! M-Pesa (Safaricom Daraja) STK push bridge
//!
//! Flow: OAuth token -> STK push -> customer confirms on the handset ->
//! Daraja posts the result to the callback URL. Tokens are fetched per call.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::models::PaymentMethod;
use shared::money;

use super::{PaymentError, PaymentGateway, PaymentInitiation, PaymentOutcome, PaymentRequest};

const SANDBOX_URL: &str = "https://sandbox.safaricom.co.ke";
const PRODUCTION_URL: &str = "https://api.safaricom.co.ke";

/// Daraja limits
const ACCOUNT_REFERENCE_MAX: usize = 12;
const TRANSACTION_DESC_MAX: usize = 13;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MpesaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "live" => Self::Production,
            _ => Self::Sandbox,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_URL,
            Self::Production => PRODUCTION_URL,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MpesaConfig {
    pub environment: MpesaEnvironment,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub pass_key: String,
    pub shortcode: String,
    pub callback_url: String,
    /// Overrides the environment URL (local stubs)
    pub base_url: Option<String>,
}

impl MpesaConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
            .trim_end_matches('/')
    }

    /// Names of the required settings that are empty
    pub fn validate_config(&self) -> Vec<&'static str> {
        [
            ("MPESA_CONSUMER_KEY", &self.consumer_key),
            ("MPESA_CONSUMER_SECRET", &self.consumer_secret),
            ("MPESA_PASS_KEY", &self.pass_key),
            ("MPESA_SHORTCODE", &self.shortcode),
            ("MPESA_CALLBACK_URL", &self.callback_url),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Normalize a Kenyan mobile number to `2547XXXXXXXX`
///
/// Accepts `2547XXXXXXXX`, `07XXXXXXXX` and `7XXXXXXXX` with any separators.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.starts_with("254") && digits.len() == 12 {
        Some(digits)
    } else if digits.starts_with('0') && digits.len() == 10 {
        Some(format!("254{}", &digits[1..]))
    } else if digits.starts_with('7') && digits.len() == 9 {
        Some(format!("254{digits}"))
    } else {
        None
    }
}

/// `yyyyMMddHHmmss`
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// `base64(shortcode + passkey + timestamp)`
pub fn password(shortcode: &str, pass_key: &str, timestamp: &str) -> String {
    BASE64.encode(format!("{shortcode}{pass_key}{timestamp}"))
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ========== Wire types ==========

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: u64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    call_back_url: &'a str,
    account_reference: String,
    transaction_desc: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    checkout_request_id: Option<String>,
    #[serde(default)]
    response_code: Option<String>,
    #[serde(default)]
    response_description: Option<String>,
    #[serde(default)]
    customer_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DarajaError {
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryResponse {
    #[serde(default)]
    response_code: Option<FlexValue>,
    #[serde(default)]
    result_code: Option<FlexValue>,
    #[serde(default)]
    result_desc: Option<String>,
}

/// Result of an STK push status query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StkQueryResult {
    pub checkout_request_id: String,
    /// `None` while the customer has not yet answered
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
}

/// Daraja sends numbers as JSON numbers or strings depending on the field
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexValue {
    Number(serde_json::Number),
    Text(String),
}

impl FlexValue {
    pub fn to_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl StkQueryResult {
    /// Settled results carry the callback's key, so whichever of query and
    /// callback lands second is a duplicate
    pub fn into_outcome(self) -> Option<PaymentOutcome> {
        let result_code = self.result_code?;
        Some(PaymentOutcome {
            provider: PaymentMethod::Mpesa,
            idempotency_key: self.checkout_request_id.clone(),
            reference: self.checkout_request_id,
            success: result_code == 0,
            transaction_id: None,
            payment_intent_id: None,
            amount: None,
            description: self.result_desc.unwrap_or_default(),
        })
    }
}

// ========== Callback ==========

#[derive(Debug, Clone, Deserialize)]
pub struct MpesaCallback {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,
    pub result_code: FlexValue,
    #[serde(default)]
    pub result_desc: String,
    #[serde(default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackMetadata {
    #[serde(default)]
    pub item: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackItem {
    pub name: String,
    #[serde(default)]
    pub value: Option<FlexValue>,
}

/// Normalized STK callback
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResult {
    pub success: bool,
    pub result_code: i64,
    pub result_desc: String,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpesa_receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<String>,
}

impl CallbackResult {
    pub fn into_outcome(self) -> PaymentOutcome {
        PaymentOutcome {
            provider: PaymentMethod::Mpesa,
            idempotency_key: self.checkout_request_id.clone(),
            reference: self.checkout_request_id,
            success: self.success,
            transaction_id: self.mpesa_receipt,
            payment_intent_id: None,
            amount: self.amount,
            description: self.result_desc,
        }
    }
}

/// Extract the result and the named metadata items of an STK callback
pub fn process_callback(callback: &MpesaCallback) -> CallbackResult {
    let stk = &callback.body.stk_callback;
    // Unparseable codes count as failures
    let result_code = stk.result_code.as_i64().unwrap_or(-1);
    let item = |name: &str| {
        stk.callback_metadata
            .as_ref()
            .and_then(|m| m.item.iter().find(|i| i.name == name))
            .and_then(|i| i.value.as_ref())
    };

    CallbackResult {
        success: result_code == 0,
        result_code,
        result_desc: stk.result_desc.clone(),
        checkout_request_id: stk.checkout_request_id.clone(),
        merchant_request_id: stk.merchant_request_id.clone(),
        mpesa_receipt: item("MpesaReceiptNumber").map(FlexValue::to_text),
        phone_number: item("PhoneNumber").map(FlexValue::to_text),
        amount: item("Amount").and_then(FlexValue::as_f64),
        transaction_date: item("TransactionDate").map(FlexValue::to_text),
    }
}

/// Parse a raw callback body
pub fn parse_callback(body: &[u8]) -> Result<CallbackResult, serde_json::Error> {
    let callback: MpesaCallback = serde_json::from_slice(body)?;
    Ok(process_callback(&callback))
}

// ========== Client ==========

/// STK push parameters
#[derive(Debug, Clone)]
pub struct StkPushRequest {
    pub phone_number: String,
    /// Major units; rounded up to whole shillings
    pub amount: f64,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StkPushAccepted {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub customer_message: Option<String>,
}

pub struct MpesaClient {
    config: MpesaConfig,
    http: reqwest::Client,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    fn ensure_configured(&self) -> Result<(), PaymentError> {
        let missing = self.config.validate_config();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PaymentError::NotConfigured(missing))
        }
    }

    pub async fn access_token(&self) -> Result<String, PaymentError> {
        let resp = self
            .http
            .get(format!("{}/oauth/v1/generate", self.config.base_url()))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PaymentError::Rejected(format!(
                "Failed to authenticate with M-Pesa: {}",
                resp.status()
            )));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        Ok(token.access_token)
    }

    pub async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushAccepted, PaymentError> {
        let phone = normalize_phone(&request.phone_number).ok_or(PaymentError::InvalidPhone)?;
        let amount = money::ceil_units(request.amount);
        if amount == 0 {
            return Err(PaymentError::InvalidRequest("Amount must be greater than 0".into()));
        }
        self.ensure_configured()?;

        let token = self.access_token().await?;
        let ts = timestamp(Utc::now());
        let body = StkPushBody {
            business_short_code: &self.config.shortcode,
            password: password(&self.config.shortcode, &self.config.pass_key, &ts),
            timestamp: ts,
            transaction_type: "CustomerPayBillOnline",
            amount,
            party_a: &phone,
            party_b: &self.config.shortcode,
            phone_number: &phone,
            call_back_url: &self.config.callback_url,
            account_reference: truncate(&request.account_reference, ACCOUNT_REFERENCE_MAX),
            transaction_desc: truncate(&request.transaction_desc, TRANSACTION_DESC_MAX),
        };

        let resp = self
            .http
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url()))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let message = resp
                .json::<DarajaError>()
                .await
                .ok()
                .and_then(|e| e.error_message)
                .unwrap_or_else(|| status.to_string());
            return Err(PaymentError::Rejected(message));
        }

        let data: StkPushResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;

        if data.response_code.as_deref() != Some("0") {
            return Err(PaymentError::Rejected(
                data.response_description
                    .unwrap_or_else(|| "Failed to initiate M-Pesa payment".into()),
            ));
        }
        let checkout_request_id = data
            .checkout_request_id
            .ok_or_else(|| PaymentError::InvalidResponse("missing CheckoutRequestID".into()))?;

        Ok(StkPushAccepted {
            checkout_request_id,
            merchant_request_id: data.merchant_request_id.unwrap_or_default(),
            customer_message: data.customer_message,
        })
    }

    pub async fn query_status(&self, checkout_request_id: &str) -> Result<StkQueryResult, PaymentError> {
        self.ensure_configured()?;
        let token = self.access_token().await?;
        let ts = timestamp(Utc::now());
        let body = StkQueryBody {
            business_short_code: &self.config.shortcode,
            password: password(&self.config.shortcode, &self.config.pass_key, &ts),
            timestamp: ts,
            checkout_request_id,
        };

        let resp = self
            .http
            .post(format!("{}/mpesa/stkpushquery/v1/query", self.config.base_url()))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PaymentError::Rejected(format!(
                "Failed to query transaction status: {}",
                resp.status()
            )));
        }
        let data: StkQueryResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        tracing::debug!(
            checkout_request_id,
            response_code = ?data.response_code.as_ref().map(FlexValue::to_text),
            "STK query answered"
        );

        Ok(StkQueryResult {
            checkout_request_id: checkout_request_id.to_string(),
            result_code: data.result_code.as_ref().and_then(FlexValue::as_i64),
            result_desc: data.result_desc,
        })
    }
}

#[async_trait]
impl PaymentGateway for MpesaClient {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Mpesa
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiation, PaymentError> {
        let phone = request.phone_number.clone().ok_or(PaymentError::InvalidPhone)?;
        let description = if request.description.is_empty() {
            "Payment".to_string()
        } else {
            request.description.clone()
        };
        let push = StkPushRequest {
            phone_number: phone,
            amount: request.amount,
            account_reference: request.reference.clone(),
            transaction_desc: description,
        };

        match self.stk_push(&push).await {
            Ok(accepted) => {
                tracing::info!(
                    checkout_request_id = %accepted.checkout_request_id,
                    reference = %request.reference,
                    amount = request.amount,
                    "M-Pesa STK push initiated"
                );
                Ok(PaymentInitiation {
                    reference: accepted.checkout_request_id,
                    merchant_reference: Some(accepted.merchant_request_id),
                    redirect_url: None,
                    message: accepted.customer_message,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, reference = %request.reference, "M-Pesa STK push failed");
                Err(e)
            }
        }
    }

    async fn query(&self, reference: &str) -> Result<Option<PaymentOutcome>, PaymentError> {
        Ok(self.query_status(reference).await?.into_outcome())
    }
}
