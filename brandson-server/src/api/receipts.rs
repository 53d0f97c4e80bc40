//! Receipt API

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use serde::Deserialize;
use shared::ApiResponse;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    PaymentMethod, Receipt, ReceiptFilter, ReceiptStats, ReceiptStatus, parse_set,
};

use super::extract::{JsonBody, parse_date_bound};
use crate::auth::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/receipts", get(list))
        .route("/receipts/stats", get(stats))
        .route("/receipts/{id}", get(get_by_id))
        .route("/receipts/{id}/refund", post(refund))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptQuery {
    pub status: Option<String>,
    pub payment_method: Option<String>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub order_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
}

impl ReceiptQuery {
    fn into_filter(self, user: &CurrentUser) -> AppResult<ReceiptFilter> {
        let (customer_id, customer_email) = if user.is_staff() {
            (self.customer_id, self.customer_email)
        } else {
            (None, Some(user.0.email.clone()))
        };
        Ok(ReceiptFilter {
            status: parse_set(self.status.as_deref(), ReceiptStatus::parse),
            payment_method: parse_set(self.payment_method.as_deref(), PaymentMethod::parse),
            customer_id,
            customer_email,
            order_id: self.order_id,
            date_from: parse_date_bound("dateFrom", self.date_from.as_deref(), false)?,
            date_to: parse_date_bound("dateTo", self.date_to.as_deref(), true)?,
            search: self.search,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RefundBody {
    pub amount: f64,
    #[serde(default)]
    pub reason: String,
}

fn receipt_not_found(id: &str) -> AppError {
    AppError::with_message(ErrorCode::ReceiptNotFound, format!("Receipt {id} not found"))
}

/// GET /receipts
pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ReceiptQuery>,
) -> AppResult<ApiResponse<Vec<Receipt>>> {
    let filter = query.into_filter(&user)?;
    Ok(ApiResponse::success(state.receipts.get_receipts(&filter)?))
}

/// GET /receipts/stats
pub async fn stats(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ReceiptQuery>,
) -> AppResult<ApiResponse<ReceiptStats>> {
    let filter = query.into_filter(&user)?;
    Ok(ApiResponse::success(state.receipts.get_receipt_stats(&filter)?))
}

/// GET /receipts/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Receipt>> {
    let receipt = state
        .receipts
        .get_receipt(&id)?
        .ok_or_else(|| receipt_not_found(&id))?;
    user.ensure_access(&receipt.customer_email, receipt.customer_id.as_deref())?;
    Ok(ApiResponse::success(receipt))
}

/// POST /receipts/{id}/refund
///
/// Records a refund paid out manually; provider refunds arrive by webhook.
pub async fn refund(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RefundBody>,
) -> AppResult<ApiResponse<Receipt>> {
    user.require_staff()?;
    let reason = match body.reason.trim() {
        "" => "Refund requested",
        reason => reason,
    };
    let receipt = state
        .receipts
        .process_refund(&id, body.amount, reason)?
        .ok_or_else(|| receipt_not_found(&id))?;
    let message = format!("Refund of {:.2} recorded", body.amount);
    Ok(ApiResponse::success_with_message(receipt, message))
}
