//! Order API
//!
//! Customers create, view and pay for their own orders; status management
//! is staff-only.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    Invoice, Order, OrderCreateInput, OrderFilter, OrderStats, OrderStatus, OrderUpdate,
    PaymentMethod, PaymentStatus, estimated_completion_date, parse_set,
};
use shared::util::now;
use shared::{ApiResponse, money};

use super::extract::{JsonBody, parse_date_bound};
use super::payments::log_reconcile;
use crate::auth::CurrentUser;
use crate::db::PendingPayment;
use crate::payments::{CheckoutLineItem, PaymentInitiation, PaymentRequest, PriceData, ProductData};
use crate::reconcile::ensure_payable;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create).get(list))
        .route("/orders/stats", get(stats))
        .route("/orders/{id}", get(get_by_id).patch(update).delete(delete))
        .route("/orders/{id}/status", put(update_status))
        .route("/orders/{id}/pay", post(pay))
        .route("/orders/{id}/payment/refresh", post(refresh_payment))
        .route("/orders/{id}/invoice", get(get_invoice).post(create_invoice))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
}

impl OrderQuery {
    /// Customers are always scoped to their own email
    fn into_filter(self, user: &CurrentUser) -> AppResult<OrderFilter> {
        let (customer_id, customer_email) = if user.is_staff() {
            (self.customer_id, self.customer_email)
        } else {
            (None, Some(user.0.email.clone()))
        };
        Ok(OrderFilter {
            status: parse_set(self.status.as_deref(), OrderStatus::parse),
            payment_status: parse_set(self.payment_status.as_deref(), PaymentStatus::parse),
            payment_method: parse_set(self.payment_method.as_deref(), PaymentMethod::parse),
            customer_id,
            customer_email,
            date_from: parse_date_bound("dateFrom", self.date_from.as_deref(), false)?,
            date_to: parse_date_bound("dateTo", self.date_to.as_deref(), true)?,
            search: self.search,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order: Order,
    pub estimated_completion_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    pub method: PaymentMethod,
    pub phone_number: Option<String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

fn order_not_found(id: &str) -> AppError {
    AppError::with_message(ErrorCode::OrderNotFound, format!("Order {id} not found"))
}

/// Load an order the caller may see
fn load_order(state: &AppState, user: &CurrentUser, id: &str) -> AppResult<Order> {
    let order = state.orders.get_order(id)?.ok_or_else(|| order_not_found(id))?;
    user.ensure_access(&order.customer_email, order.customer_id.as_deref())?;
    Ok(order)
}

/// POST /orders
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(mut input): JsonBody<OrderCreateInput>,
) -> AppResult<ApiResponse<OrderCreated>> {
    if !user.is_staff() {
        input.customer_email = user.0.email.clone();
        input.customer_id = Some(user.0.id.clone());
    }
    let order = state.orders.create_order(input)?;
    let estimated_completion_date = estimated_completion_date(&order.items, order.created_at);
    let message = format!(
        "Order {} created successfully. Estimated completion: {}",
        order.order_number,
        estimated_completion_date.format("%d %b %Y")
    );
    Ok(ApiResponse::success_with_message(
        OrderCreated {
            order,
            estimated_completion_date,
        },
        message,
    ))
}

/// GET /orders
pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<OrderQuery>,
) -> AppResult<ApiResponse<Vec<Order>>> {
    let filter = query.into_filter(&user)?;
    Ok(ApiResponse::success(state.orders.get_orders(&filter)?))
}

/// GET /orders/stats
pub async fn stats(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<OrderQuery>,
) -> AppResult<ApiResponse<OrderStats>> {
    let filter = query.into_filter(&user)?;
    Ok(ApiResponse::success(state.orders.get_order_stats(&filter)?))
}

/// GET /orders/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Order>> {
    Ok(ApiResponse::success(load_order(&state, &user, &id)?))
}

/// PATCH /orders/{id}
pub async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<OrderUpdate>,
) -> AppResult<ApiResponse<Order>> {
    user.require_staff()?;
    let order = state
        .orders
        .update_order(&id, update)?
        .ok_or_else(|| order_not_found(&id))?;
    Ok(ApiResponse::success_with_message(order, "Order updated"))
}

/// PUT /orders/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<StatusBody>,
) -> AppResult<ApiResponse<Order>> {
    user.require_staff()?;
    let order = state
        .orders
        .update_order_status(&id, body.status)?
        .ok_or_else(|| order_not_found(&id))?;
    tracing::info!(
        order_number = %order.order_number,
        status = %order.status,
        by = %user.0.email,
        "Order status changed"
    );
    Ok(ApiResponse::success_with_message(
        order,
        format!("Order status updated to {}", body.status),
    ))
}

/// DELETE /orders/{id} (soft cancel)
pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<()>> {
    user.require_staff()?;
    if state.orders.delete_order(&id)? {
        Ok(ApiResponse::ok("Order cancelled"))
    } else {
        Err(order_not_found(&id))
    }
}

/// Stripe line items mirroring the order (minor units)
pub(crate) fn checkout_items(order: &Order) -> Vec<CheckoutLineItem> {
    order
        .items
        .iter()
        .map(|item| CheckoutLineItem {
            price_data: PriceData {
                currency: order.currency.clone(),
                product_data: ProductData {
                    name: item.product_name.clone(),
                    description: item.description.clone().filter(|d| !d.is_empty()),
                    metadata: [("order_number".to_string(), order.order_number.clone())].into(),
                },
                unit_amount: money::to_minor_units(item.unit_price),
            },
            quantity: item.quantity,
        })
        .collect()
}

/// POST /orders/{id}/pay
///
/// Starts a provider payment for the order's total and records the provider
/// reference so the callback can find the order.
pub async fn pay(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<PayRequest>,
) -> AppResult<ApiResponse<PaymentInitiation>> {
    let order = load_order(&state, &user, &id)?;
    ensure_payable(&order)?;

    let gateway = match body.method {
        PaymentMethod::Mpesa => state.mpesa.clone(),
        PaymentMethod::Stripe => state.stripe.clone(),
        other => {
            return Err(AppError::with_message(
                ErrorCode::PaymentInvalidMethod,
                format!("{} payments are recorded by staff, not initiated online", other.label()),
            ));
        }
    };

    let request = PaymentRequest {
        amount: order.total,
        currency: order.currency.clone(),
        reference: order.order_number.clone(),
        description: format!("Order {}", order.order_number),
        phone_number: Some(body.phone_number.unwrap_or_else(|| order.customer_phone.clone())),
        customer_email: Some(order.customer_email.clone()),
        items: checkout_items(&order),
        success_url: Some(
            body.success_url
                .unwrap_or_else(|| state.config.stripe_success_url.clone()),
        ),
        cancel_url: Some(
            body.cancel_url
                .unwrap_or_else(|| state.config.stripe_cancel_url.clone()),
        ),
        order_id: Some(order.id.clone()),
    };
    let initiation = gateway.initiate(&request).await?;

    state.reconciler.register_pending(&PendingPayment {
        provider: gateway.method(),
        reference: initiation.reference.clone(),
        order_id: order.id.clone(),
        amount: order.total,
        currency: order.currency.clone(),
        created_at: now(),
    })?;

    let message = match body.method {
        PaymentMethod::Mpesa => "Payment request sent. Please check your phone to complete the payment.",
        _ => "Checkout session created",
    };
    Ok(ApiResponse::success_with_message(initiation, message))
}

/// POST /orders/{id}/payment/refresh
///
/// Asks the provider about a payment still awaiting its callback and feeds
/// a settled answer through the reconciler, so a late callback for the same
/// payment stays a no-op.
pub async fn refresh_payment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Order>> {
    let order = load_order(&state, &user, &id)?;
    let reference = match order.metadata.provider_reference.clone() {
        Some(reference) if order.payment_status == PaymentStatus::Processing => reference,
        _ => {
            let message = format!("Payment is {}", order.payment_status);
            return Ok(ApiResponse::success_with_message(order, message));
        }
    };
    let gateway = match order.payment_method {
        PaymentMethod::Mpesa => state.mpesa.clone(),
        PaymentMethod::Stripe => state.stripe.clone(),
        other => {
            return Err(AppError::with_message(
                ErrorCode::PaymentInvalidMethod,
                format!("{} payments cannot be queried", other.label()),
            ));
        }
    };

    if let Some(outcome) = gateway.query(&reference).await? {
        let result = state.reconciler.apply(&outcome)?;
        log_reconcile(gateway.method().as_str(), &result);
    }

    let order = state.orders.get_order(&id)?.ok_or_else(|| order_not_found(&id))?;
    let message = format!("Payment is {}", order.payment_status);
    Ok(ApiResponse::success_with_message(order, message))
}

/// GET /orders/{id}/invoice
pub async fn get_invoice(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Invoice>> {
    let order = load_order(&state, &user, &id)?;
    let invoice = state
        .invoices
        .get_invoice_by_order_id(&order.id)?
        .ok_or_else(|| {
            AppError::with_message(
                ErrorCode::InvoiceNotFound,
                format!("No invoice for order {}", order.order_number),
            )
        })?;
    Ok(ApiResponse::success(invoice))
}

/// POST /orders/{id}/invoice (idempotent)
pub async fn create_invoice(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Invoice>> {
    let order = load_order(&state, &user, &id)?;
    let invoice = state.invoices.create_invoice_from_order(&order)?;
    Ok(ApiResponse::success(invoice))
}
