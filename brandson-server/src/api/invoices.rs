//! Invoice API

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::response::Html;
use axum::routing::{get, put};
use serde::Deserialize;
use shared::ApiResponse;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{Invoice, InvoiceFilter, InvoiceStats, InvoiceStatus, parse_set};

use super::extract::{JsonBody, parse_date_bound};
use crate::auth::CurrentUser;
use crate::invoices::render_html;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invoices", get(list))
        .route("/invoices/stats", get(stats))
        .route("/invoices/{id}", get(get_by_id))
        .route("/invoices/{id}/html", get(html))
        .route("/invoices/{id}/status", put(update_status))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceQuery {
    pub status: Option<String>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
}

impl InvoiceQuery {
    fn into_filter(self, user: &CurrentUser) -> AppResult<InvoiceFilter> {
        let (customer_id, customer_email) = if user.is_staff() {
            (self.customer_id, self.customer_email)
        } else {
            (None, Some(user.0.email.clone()))
        };
        Ok(InvoiceFilter {
            status: parse_set(self.status.as_deref(), InvoiceStatus::parse),
            customer_id,
            customer_email,
            date_from: parse_date_bound("dateFrom", self.date_from.as_deref(), false)?,
            date_to: parse_date_bound("dateTo", self.date_to.as_deref(), true)?,
            search: self.search,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: InvoiceStatus,
}

fn load_invoice(state: &AppState, user: &CurrentUser, id: &str) -> AppResult<Invoice> {
    let invoice = state.invoices.get_invoice(id)?.ok_or_else(|| {
        AppError::with_message(ErrorCode::InvoiceNotFound, format!("Invoice {id} not found"))
    })?;
    user.ensure_access(&invoice.customer_email, invoice.customer_id.as_deref())?;
    Ok(invoice)
}

/// GET /invoices
pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<InvoiceQuery>,
) -> AppResult<ApiResponse<Vec<Invoice>>> {
    let filter = query.into_filter(&user)?;
    Ok(ApiResponse::success(state.invoices.get_invoices(&filter)?))
}

/// GET /invoices/stats
pub async fn stats(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<InvoiceQuery>,
) -> AppResult<ApiResponse<InvoiceStats>> {
    let filter = query.into_filter(&user)?;
    Ok(ApiResponse::success(state.invoices.get_invoice_stats(&filter)?))
}

/// GET /invoices/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Invoice>> {
    Ok(ApiResponse::success(load_invoice(&state, &user, &id)?))
}

/// GET /invoices/{id}/html (printable document)
pub async fn html(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Html<String>> {
    let invoice = load_invoice(&state, &user, &id)?;
    Ok(Html(render_html(&invoice)))
}

/// PUT /invoices/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<StatusBody>,
) -> AppResult<ApiResponse<Invoice>> {
    user.require_staff()?;
    let invoice = state
        .invoices
        .update_invoice_status(&id, body.status)?
        .ok_or_else(|| {
            AppError::with_message(ErrorCode::InvoiceNotFound, format!("Invoice {id} not found"))
        })?;
    Ok(ApiResponse::success_with_message(
        invoice,
        format!("Invoice marked {}", body.status),
    ))
}
