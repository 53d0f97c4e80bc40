//! End-to-end flows through the HTTP router

mod common;

use axum::http::StatusCode;
use brandson_server::payments::stripe::sign_payload;
use chrono::{Duration, Utc};
use common::*;
use serde_json::{Value, json};
use shared::models::{Quote, ReceiptFilter};

async fn create_order(app: &TestApp) -> Value {
    let (status, body) = app
        .call("POST", "/orders", Some(&customer()), Some(order_body()))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["order"].clone()
}

fn stripe_headers(payload: &str) -> String {
    sign_payload(payload.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp()).unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::new();
    let (status, body) = app.call("GET", "/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], 1001);

    let (status, _) = app
        .raw_post(
            "/orders",
            &[("authorization", "Bearer not-a-jwt"), ("content-type", "application/json")],
            order_body().to_string(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call("GET", "/auth/me", Some(&staff()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "staff");
}

#[tokio::test]
async fn test_create_order_derives_totals_and_scopes_customer() {
    let app = TestApp::new();
    let mut input = order_body();
    input["customerEmail"] = json!("someone-else@example.com");
    let (status, body) = app
        .call("POST", "/orders", Some(&customer()), Some(input))
        .await;
    assert_eq!(status, StatusCode::OK);

    let order = &body["data"]["order"];
    assert_eq!(order["customerEmail"], "wanjiru@example.co.ke");
    assert_eq!(order["customerId"], "cust-1");
    assert_eq!(order["subtotal"], 5000.0);
    assert_eq!(order["tax"], 0.0);
    assert_eq!(order["total"], 5000.0);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["paymentStatus"], "pending");
    assert!(body["data"]["estimatedCompletionDate"].is_string());
    assert!(body["message"].as_str().unwrap().contains("created successfully"));
}

#[tokio::test]
async fn test_create_order_validation_errors() {
    let app = TestApp::new();
    let (status, body) = app
        .call(
            "POST",
            "/orders",
            Some(&staff()),
            Some(json!({ "customerEmail": "nope", "customerName": "", "customerPhone": "", "items": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], 2);
}

#[tokio::test]
async fn test_customer_cannot_see_other_customers_orders() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let uri = format!("/orders/{}", order["id"].as_str().unwrap());

    let (status, _) = app.call("GET", &uri, Some(&other_customer()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.call("GET", "/orders", Some(&other_customer()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (status, body) = app.call("GET", &uri, Some(&customer()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], order["id"]);

    let (_, body) = app.call("GET", "/orders", Some(&staff()), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_status_changes_are_staff_only_and_follow_lifecycle() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let uri = format!("/orders/{}/status", order["id"].as_str().unwrap());

    let (status, body) = app
        .call("PUT", &uri, Some(&customer()), Some(json!({ "status": "confirmed" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 2002);

    let (status, body) = app
        .call("PUT", &uri, Some(&staff()), Some(json!({ "status": "delivered" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 6);

    let (status, body) = app
        .call("PUT", &uri, Some(&staff()), Some(json!({ "status": "confirmed" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "confirmed");

    let (status, _) = app
        .call("PUT", &uri, Some(&staff()), Some(json!({ "status": "shipped" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mpesa_payment_reconciles_once() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let order_id = order["id"].as_str().unwrap();

    let (status, body) = app
        .call(
            "POST",
            &format!("/orders/{order_id}/pay"),
            Some(&customer()),
            Some(json!({ "method": "mpesa", "phoneNumber": "0712345678" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let checkout_request_id = body["data"]["reference"].as_str().unwrap().to_string();

    let (_, body) = app
        .call("GET", &format!("/orders/{order_id}"), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["paymentStatus"], "processing");
    assert_eq!(body["data"]["paymentMethod"], "mpesa");

    let callback = mpesa_callback(&checkout_request_id, 0, 5000.0);
    for _ in 0..2 {
        let (status, body) = app
            .raw_post("/payments/mpesa/callback", &[("content-type", "application/json")], callback.clone())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ResultCode"], 0);
        assert_eq!(body["ResultDesc"], "Success");
    }

    let (_, body) = app
        .call("GET", &format!("/orders/{order_id}"), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["paymentStatus"], "paid");
    assert_eq!(body["data"]["status"], "confirmed");
    assert_eq!(body["data"]["metadata"]["paymentReference"], "QFT12ABC34");

    let (status, body) = app
        .call("GET", &format!("/orders/{order_id}/invoice"), Some(&customer()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["total"], 5000.0);

    let (_, body) = app.call("GET", "/invoices", Some(&staff()), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let receipts = app
        .state
        .receipts
        .get_receipts(&ReceiptFilter {
            order_id: Some(order_id.to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].transaction_id, "QFT12ABC34");

    let (status, body) = app
        .call(
            "POST",
            &format!("/orders/{order_id}/pay"),
            Some(&customer()),
            Some(json!({ "method": "mpesa" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 3002);
}

#[tokio::test]
async fn test_failed_mpesa_callback_allows_retry() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let pay_uri = format!("/orders/{}/pay", order["id"].as_str().unwrap());

    let (_, body) = app
        .call("POST", &pay_uri, Some(&customer()), Some(json!({ "method": "mpesa" })))
        .await;
    let reference = body["data"]["reference"].as_str().unwrap().to_string();

    let (status, _) = app
        .raw_post(
            "/payments/mpesa/callback",
            &[("content-type", "application/json")],
            mpesa_callback(&reference, 1032, 0.0),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .call("GET", &format!("/orders/{}", order["id"].as_str().unwrap()), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["paymentStatus"], "failed");
    assert_eq!(body["data"]["status"], "pending");

    let (status, body) = app
        .call("POST", &pay_uri, Some(&customer()), Some(json!({ "method": "mpesa" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["reference"].as_str().unwrap(), reference);
}

#[tokio::test]
async fn test_mpesa_callback_garbage_is_acknowledged() {
    let app = TestApp::new();
    let (status, body) = app
        .raw_post("/payments/mpesa/callback", &[], "not json".to_string())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ResultDesc"], "Callback received");

    let (status, body) = app
        .raw_post(
            "/payments/mpesa/callback",
            &[],
            mpesa_callback("ws_CO_unknown", 0, 100.0),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ResultCode"], 0);
}

#[tokio::test]
async fn test_cash_payments_are_not_initiated_online() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let (status, body) = app
        .call(
            "POST",
            &format!("/orders/{}/pay", order["id"].as_str().unwrap()),
            Some(&customer()),
            Some(json!({ "method": "cash" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5005);
}

#[tokio::test]
async fn test_stripe_checkout_webhook_and_refund() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let order_id = order["id"].as_str().unwrap();

    let (status, body) = app
        .call(
            "POST",
            &format!("/orders/{order_id}/pay"),
            Some(&customer()),
            Some(json!({ "method": "stripe" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let session_id = body["data"]["reference"].as_str().unwrap().to_string();
    assert!(body["data"]["redirectUrl"].as_str().unwrap().ends_with(&session_id));

    let completed = json!({
        "id": "evt_completed_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "payment_intent": "pi_123",
            "payment_status": "paid",
            "amount_total": 500000,
            "metadata": { "order_id": order_id }
        }}
    })
    .to_string();

    let (status, _) = app
        .raw_post("/payments/stripe/webhook", &[], completed.clone())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let tampered = completed.replace("500000", "1");
    let (status, _) = app
        .raw_post(
            "/payments/stripe/webhook",
            &[("stripe-signature", &stripe_headers(&completed))],
            tampered,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app
        .call("GET", &format!("/orders/{order_id}"), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["paymentStatus"], "processing");

    for _ in 0..2 {
        let (status, _) = app
            .raw_post(
                "/payments/stripe/webhook",
                &[("stripe-signature", &stripe_headers(&completed))],
                completed.clone(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = app
        .call("GET", &format!("/orders/{order_id}"), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["paymentStatus"], "paid");
    assert_eq!(body["data"]["metadata"]["paymentIntentId"], "pi_123");

    let (_, body) = app.call("GET", "/receipts", Some(&customer()), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let refunded = json!({
        "id": "evt_refund_1",
        "type": "charge.refunded",
        "data": { "object": {
            "id": "ch_1",
            "payment_intent": "pi_123",
            "amount": 500000,
            "amount_refunded": 500000,
            "refunded": true
        }}
    })
    .to_string();
    let (status, _) = app
        .raw_post(
            "/payments/stripe/webhook",
            &[("stripe-signature", &stripe_headers(&refunded))],
            refunded,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .call("GET", &format!("/orders/{order_id}"), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["paymentStatus"], "refunded");

    let (_, body) = app
        .call("GET", &format!("/orders/{order_id}/invoice"), Some(&staff()), None)
        .await;
    assert_eq!(body["data"]["status"], "refunded");

    let (_, body) = app.call("GET", "/receipts/stats", Some(&staff()), None).await;
    assert_eq!(body["data"]["refundedReceipts"], 1);
}

#[tokio::test]
async fn test_invoice_generation_and_html() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let uri = format!("/orders/{}/invoice", order["id"].as_str().unwrap());

    let (status, _) = app.call("GET", &uri, Some(&customer()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, first) = app.call("POST", &uri, Some(&customer()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["status"], "sent");
    let (_, second) = app.call("POST", &uri, Some(&customer()), None).await;
    assert_eq!(first["data"]["id"], second["data"]["id"]);

    let invoice_id = first["data"]["id"].as_str().unwrap();
    let (status, html) = app
        .call("GET", &format!("/invoices/{invoice_id}/html"), Some(&customer()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let html = html.as_str().unwrap();
    assert!(html.contains(first["data"]["invoiceNumber"].as_str().unwrap()));
    assert!(html.contains("Brandson Media"));

    let (status, _) = app
        .call("GET", &format!("/invoices/{invoice_id}"), Some(&other_customer()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            "PUT",
            &format!("/invoices/{invoice_id}/status"),
            Some(&staff()),
            Some(json!({ "status": "overdue" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "overdue");
}

fn quote_body() -> Value {
    json!({
        "customerName": "Wanjiru Kamau",
        "customerEmail": "wanjiru@example.co.ke",
        "items": [{ "productName": "Roll-up Banner", "quantity": 2, "unitPrice": 7500.0 }],
        "shipping": 500.0
    })
}

#[tokio::test]
async fn test_quote_lifecycle_and_conversion() {
    let app = TestApp::new();
    let (status, body) = app
        .call("POST", "/quotes", Some(&customer()), Some(quote_body()))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let quote_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["total"], 15500.0);
    assert_eq!(body["data"]["status"], "draft");

    let convert_uri = format!("/quotes/{quote_id}/convert");
    let (status, body) = app.call("POST", &convert_uri, Some(&staff()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 4002);

    let status_uri = format!("/quotes/{quote_id}/status");
    let (status, _) = app
        .call("PUT", &status_uri, Some(&customer()), Some(json!({ "status": "sent" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    for next in ["sent", "accepted"] {
        let (status, _) = app
            .call("PUT", &status_uri, Some(&staff()), Some(json!({ "status": next })))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app.call("POST", &convert_uri, Some(&staff()), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["quote"]["status"], "converted");
    let order_id = body["data"]["order"]["id"].clone();
    assert_eq!(body["data"]["quote"]["convertedToOrderId"], order_id);
    assert_eq!(body["data"]["order"]["customerEmail"], "wanjiru@example.co.ke");
    assert_eq!(body["data"]["order"]["total"], 15500.0);
    assert_eq!(body["data"]["order"]["items"].as_array().unwrap().len(), 2);

    let (status, _) = app.call("POST", &convert_uri, Some(&staff()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.call("GET", "/orders", Some(&customer()), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_quote_expiry_sweep() {
    let app = TestApp::new();
    let (_, body) = app
        .call("POST", "/quotes", Some(&staff()), Some(quote_body()))
        .await;
    let quote_id = body["data"]["id"].as_str().unwrap().to_string();
    app.call(
        "PUT",
        &format!("/quotes/{quote_id}/status"),
        Some(&staff()),
        Some(json!({ "status": "sent" })),
    )
    .await;
    app.state
        .storage
        .update(&quote_id, |quote: &mut Quote| -> Result<(), brandson_server::db::StorageError> {
            quote.valid_until = Utc::now() - Duration::days(1);
            Ok(())
        })
        .unwrap();

    let (status, _) = app.call("POST", "/quotes/expire", Some(&customer()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.call("POST", "/quotes/expire", Some(&staff()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expired"], 1);

    let (_, body) = app.call("POST", "/quotes/expire", Some(&staff()), None).await;
    assert_eq!(body["data"]["expired"], 0);

    let (_, body) = app
        .call("GET", &format!("/quotes/{quote_id}"), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["status"], "expired");
}

#[tokio::test]
async fn test_order_filters_and_soft_delete() {
    let app = TestApp::new();
    let first = create_order(&app).await;
    create_order(&app).await;

    let (_, body) = app
        .call("GET", "/orders?status=pending,bogus", Some(&staff()), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let (_, body) = app
        .call(
            "GET",
            &format!("/orders?dateFrom={today}&dateTo={today}"),
            Some(&staff()),
            None,
        )
        .await;
    let orders = body["data"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders[0]["createdAt"].as_str() >= orders[1]["createdAt"].as_str());

    let (status, _) = app
        .call("GET", "/orders?dateFrom=yesterday", Some(&staff()), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/orders/{}", first["id"].as_str().unwrap());
    let (status, _) = app.call("DELETE", &uri, Some(&customer()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call("DELETE", &uri, Some(&staff()), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.call("GET", &uri, Some(&staff()), None).await;
    assert_eq!(body["data"]["status"], "cancelled");

    let (_, body) = app.call("GET", "/orders/stats", Some(&staff()), None).await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["cancelled"], 1);

    let (status, _) = app
        .call("DELETE", "/orders/does-not-exist", Some(&staff()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn mpesa_direct(
    app: &TestApp,
    user: &shared::models::User,
    amount: f64,
    reference: &str,
) -> (StatusCode, Value) {
    app.call(
        "POST",
        "/payments/mpesa",
        Some(user),
        Some(json!({ "phoneNumber": "0712345678", "amount": amount, "reference": reference })),
    )
    .await
}

#[tokio::test]
async fn test_direct_mpesa_charges_the_order_total() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let order_id = order["id"].as_str().unwrap();
    let number = order["orderNumber"].as_str().unwrap();

    let (status, body) = mpesa_direct(&app, &customer(), 1.0, number).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5007);
    assert_eq!(app.mpesa.calls(), 0);

    let (status, body) = mpesa_direct(&app, &customer(), 5000.0, number).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.mpesa.last_amount(), Some(5000.0));
    let reference = body["data"]["reference"].as_str().unwrap().to_string();

    // Paid less than the total: acknowledged, nothing settled
    let (status, _) = app
        .raw_post("/payments/mpesa/callback", &[], mpesa_callback(&reference, 0, 1.0))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app
        .call("GET", &format!("/orders/{order_id}"), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["paymentStatus"], "processing");
    assert!(app.state.receipts.receipts_for_order(order_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_direct_mpesa_refuses_paid_order_before_prompting() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let number = order["orderNumber"].as_str().unwrap();

    let (_, body) = mpesa_direct(&app, &customer(), 5000.0, number).await;
    let reference = body["data"]["reference"].as_str().unwrap().to_string();
    app.raw_post("/payments/mpesa/callback", &[], mpesa_callback(&reference, 0, 5000.0))
        .await;
    assert_eq!(app.mpesa.calls(), 1);

    let (status, body) = mpesa_direct(&app, &customer(), 5000.0, number).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 3002);
    assert_eq!(app.mpesa.calls(), 1);
}

#[tokio::test]
async fn test_direct_stripe_checkout_uses_order_items() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let order_id = order["id"].as_str().unwrap();

    let (status, body) = app
        .call(
            "POST",
            "/payments/stripe",
            Some(&customer()),
            Some(json!({
                "orderId": order_id,
                "successUrl": "https://brandsonmedia.co.ke/ok",
                "cancelUrl": "https://brandsonmedia.co.ke/cancel",
                "lineItems": [{
                    "price_data": {
                        "currency": "kes",
                        "product_data": { "name": "Business Cards" },
                        "unit_amount": 100
                    },
                    "quantity": 1
                }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.stripe.last_amount(), Some(5000.0));

    let (_, body) = app
        .call("GET", &format!("/orders/{order_id}"), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["paymentStatus"], "processing");
    assert_eq!(body["data"]["paymentMethod"], "stripe");
}

#[tokio::test]
async fn test_payment_refresh_settles_through_reconciler() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let order_id = order["id"].as_str().unwrap();
    let refresh_uri = format!("/orders/{order_id}/payment/refresh");

    let (_, body) = app
        .call(
            "POST",
            &format!("/orders/{order_id}/pay"),
            Some(&customer()),
            Some(json!({ "method": "mpesa" })),
        )
        .await;
    let reference = body["data"]["reference"].as_str().unwrap().to_string();

    let (status, body) = app.call("POST", &refresh_uri, Some(&customer()), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["paymentStatus"], "processing");

    let (status, _) = app.call("POST", &refresh_uri, Some(&other_customer()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.mpesa.settle(true);
    let (status, body) = app.call("POST", &refresh_uri, Some(&customer()), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["paymentStatus"], "paid");
    assert_eq!(body["data"]["status"], "confirmed");

    // The provider's own callback arrives afterwards
    let (status, _) = app
        .raw_post("/payments/mpesa/callback", &[], mpesa_callback(&reference, 0, 5000.0))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.state.receipts.receipts_for_order(order_id).unwrap().len(), 1);

    let (status, body) = app.call("POST", &refresh_uri, Some(&customer()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment is paid");
}

#[tokio::test]
async fn test_payment_settles_order_whose_invoice_was_cancelled() {
    let app = TestApp::new();
    let order = create_order(&app).await;
    let order_id = order["id"].as_str().unwrap();

    let (_, body) = app
        .call("POST", &format!("/orders/{order_id}/invoice"), Some(&customer()), None)
        .await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .call(
            "PUT",
            &format!("/invoices/{invoice_id}/status"),
            Some(&staff()),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .call(
            "POST",
            &format!("/orders/{order_id}/pay"),
            Some(&customer()),
            Some(json!({ "method": "mpesa" })),
        )
        .await;
    let reference = body["data"]["reference"].as_str().unwrap().to_string();
    app.raw_post("/payments/mpesa/callback", &[], mpesa_callback(&reference, 0, 5000.0))
        .await;

    let (_, body) = app
        .call("GET", &format!("/orders/{order_id}"), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["paymentStatus"], "paid");
    let (_, body) = app
        .call("GET", &format!("/invoices/{invoice_id}"), Some(&customer()), None)
        .await;
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(app.state.receipts.receipts_for_order(order_id).unwrap().len(), 1);
}
