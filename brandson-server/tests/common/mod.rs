//! Router harness: in-memory storage, fake providers, real JWT verification

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use brandson_server::auth::JwtAuthenticator;
use brandson_server::config::Config;
use brandson_server::db::Storage;
use brandson_server::payments::mpesa::MpesaConfig;
use brandson_server::payments::{
    PaymentError, PaymentGateway, PaymentInitiation, PaymentOutcome, PaymentRequest,
};
use brandson_server::{AppState, api};
use serde_json::Value;
use shared::models::{CompanyInfo, PaymentMethod, User, UserRole};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "integration-secret-0123456789abcdef";
pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// Gateway that accepts every request and hands out numbered references
pub struct FakeGateway {
    method: PaymentMethod,
    prefix: &'static str,
    calls: AtomicUsize,
    last_amount: Mutex<Option<f64>>,
    settled: Mutex<Option<bool>>,
}

impl FakeGateway {
    pub fn new(method: PaymentMethod, prefix: &'static str) -> Self {
        Self {
            method,
            prefix,
            calls: AtomicUsize::new(0),
            last_amount: Mutex::new(None),
            settled: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Amount of the most recent initiation
    pub fn last_amount(&self) -> Option<f64> {
        *self.last_amount.lock().unwrap()
    }

    /// Answer later status queries with a settled outcome
    pub fn settle(&self, success: bool) {
        *self.settled.lock().unwrap() = Some(success);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiation, PaymentError> {
        if self.method == PaymentMethod::Mpesa && request.phone_number.is_none() {
            return Err(PaymentError::InvalidPhone);
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_amount.lock().unwrap() = Some(request.amount);
        let reference = format!("{}_{n}", self.prefix);
        Ok(PaymentInitiation {
            redirect_url: (self.method == PaymentMethod::Stripe)
                .then(|| format!("https://checkout.stripe.test/{reference}")),
            reference,
            merchant_reference: None,
            message: None,
        })
    }

    async fn query(&self, reference: &str) -> Result<Option<PaymentOutcome>, PaymentError> {
        let settled = *self.settled.lock().unwrap();
        Ok(settled.map(|success| PaymentOutcome {
            provider: self.method,
            idempotency_key: reference.to_string(),
            reference: reference.to_string(),
            success,
            transaction_id: None,
            payment_intent_id: None,
            amount: None,
            description: "queried".to_string(),
        }))
    }
}

pub fn test_config() -> Config {
    Config {
        environment: "development".into(),
        http_port: 0,
        database_path: String::new(),
        jwt_secret: JWT_SECRET.into(),
        cors_origin: None,
        log_dir: None,
        mpesa: MpesaConfig::default(),
        stripe_secret_key: "sk_test".into(),
        stripe_webhook_secret: WEBHOOK_SECRET.into(),
        stripe_success_url: "https://brandsonmedia.co.ke/checkout/success".into(),
        stripe_cancel_url: "https://brandsonmedia.co.ke/checkout/cancel".into(),
        company: CompanyInfo::default(),
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub mpesa: Arc<FakeGateway>,
    pub stripe: Arc<FakeGateway>,
    auth: JwtAuthenticator,
}

impl TestApp {
    pub fn new() -> Self {
        let storage = Storage::open_in_memory().unwrap();
        let mpesa = Arc::new(FakeGateway::new(PaymentMethod::Mpesa, "ws_CO"));
        let stripe = Arc::new(FakeGateway::new(PaymentMethod::Stripe, "cs_test"));
        let state = AppState::from_parts(
            test_config(),
            storage,
            mpesa.clone(),
            stripe.clone(),
            Arc::new(JwtAuthenticator::new(JWT_SECRET)),
        );
        Self {
            router: api::create_router(state.clone()),
            state,
            mpesa,
            stripe,
            auth: JwtAuthenticator::new(JWT_SECRET),
        }
    }

    pub fn token(&self, user: &User) -> String {
        self.auth.create_token(user).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        user: Option<&User>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn raw_post(&self, uri: &str, headers: &[(&str, &str)], body: String) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }
}

pub fn user(id: &str, email: &str, role: UserRole) -> User {
    User {
        id: id.into(),
        email: email.into(),
        name: id.into(),
        role,
    }
}

pub fn customer() -> User {
    user("cust-1", "wanjiru@example.co.ke", UserRole::Customer)
}

pub fn other_customer() -> User {
    user("cust-2", "otieno@example.co.ke", UserRole::Customer)
}

pub fn staff() -> User {
    user("staff-1", "studio@brandsonmedia.co.ke", UserRole::Staff)
}

pub fn order_body() -> Value {
    serde_json::json!({
        "customerEmail": "wanjiru@example.co.ke",
        "customerName": "Wanjiru Kamau",
        "customerPhone": "0712345678",
        "items": [
            { "productName": "Business Cards", "quantity": 2, "unitPrice": 1500.0 },
            { "productName": "A5 Flyers", "quantity": 1, "unitPrice": 2000.0 }
        ]
    })
}

/// M-Pesa STK callback for `checkout_request_id`
pub fn mpesa_callback(checkout_request_id: &str, result_code: i64, amount: f64) -> String {
    let metadata = if result_code == 0 {
        serde_json::json!({
            "Item": [
                { "Name": "Amount", "Value": amount },
                { "Name": "MpesaReceiptNumber", "Value": "QFT12ABC34" },
                { "Name": "TransactionDate", "Value": 20260301101500u64 },
                { "Name": "PhoneNumber", "Value": 254712345678u64 }
            ]
        })
    } else {
        Value::Null
    };
    let result_desc = if result_code == 0 {
        "The service request is processed successfully."
    } else {
        "Request cancelled by user"
    };
    let mut stk = serde_json::json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": checkout_request_id,
        "ResultCode": result_code,
        "ResultDesc": result_desc,
    });
    if !metadata.is_null() {
        stk["CallbackMetadata"] = metadata;
    }
    serde_json::json!({ "Body": { "stkCallback": stk } }).to_string()
}
