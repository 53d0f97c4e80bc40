//! Quote API
//!
//! Customers may request and view their own quotes. Status changes,
//! conversion and the expiry sweep are staff operations.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use serde::{Deserialize, Serialize};
use shared::ApiResponse;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{Order, Quote, QuoteCreateInput, QuoteFilter, QuoteStatus, parse_set};
use shared::util::now;

use super::extract::{JsonBody, parse_date_bound};
use crate::auth::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quotes", post(create).get(list))
        .route("/quotes/expire", post(expire))
        .route("/quotes/{id}", get(get_by_id))
        .route("/quotes/{id}/status", put(update_status))
        .route("/quotes/{id}/convert", post(convert))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub status: Option<String>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
}

impl QuoteQuery {
    fn into_filter(self, user: &CurrentUser) -> AppResult<QuoteFilter> {
        let (customer_id, customer_email) = if user.is_staff() {
            (self.customer_id, self.customer_email)
        } else {
            (None, Some(user.0.email.clone()))
        };
        Ok(QuoteFilter {
            status: parse_set(self.status.as_deref(), QuoteStatus::parse),
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
    pub status: QuoteStatus,
}

#[derive(Debug, Serialize)]
pub struct Converted {
    pub quote: Quote,
    pub order: Order,
}

#[derive(Debug, Serialize)]
pub struct ExpiredQuotes {
    pub expired: usize,
    pub quotes: Vec<String>,
}

fn quote_not_found(id: &str) -> AppError {
    AppError::with_message(ErrorCode::QuoteNotFound, format!("Quote {id} not found"))
}

/// POST /quotes
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(mut input): JsonBody<QuoteCreateInput>,
) -> AppResult<ApiResponse<Quote>> {
    if !user.is_staff() {
        input.customer_email = user.0.email.clone();
        input.customer_id = Some(user.0.id.clone());
    }
    let quote = state.quotes.create_quote(input)?;
    let message = format!("Quote {} created", quote.quote_number);
    Ok(ApiResponse::success_with_message(quote, message))
}

/// GET /quotes
pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<QuoteQuery>,
) -> AppResult<ApiResponse<Vec<Quote>>> {
    let filter = query.into_filter(&user)?;
    Ok(ApiResponse::success(state.quotes.get_quotes(&filter)?))
}

/// GET /quotes/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Quote>> {
    let quote = state.quotes.get_quote(&id)?.ok_or_else(|| quote_not_found(&id))?;
    user.ensure_access(&quote.customer_email, quote.customer_id.as_deref())?;
    Ok(ApiResponse::success(quote))
}

/// PUT /quotes/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<StatusBody>,
) -> AppResult<ApiResponse<Quote>> {
    user.require_staff()?;
    let quote = state
        .quotes
        .update_quote_status(&id, body.status)?
        .ok_or_else(|| quote_not_found(&id))?;
    Ok(ApiResponse::success_with_message(
        quote,
        format!("Quote marked {}", body.status),
    ))
}

/// POST /quotes/{id}/convert
pub async fn convert(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Converted>> {
    user.require_staff()?;
    let (quote, order) = state
        .quotes
        .convert_quote_to_order(&id)?
        .ok_or_else(|| quote_not_found(&id))?;
    let message = format!(
        "Quote {} converted to order {}",
        quote.quote_number, order.order_number
    );
    Ok(ApiResponse::success_with_message(Converted { quote, order }, message))
}

/// POST /quotes/expire
///
/// Sweep for an external scheduler; expires past-due open quotes.
pub async fn expire(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<ApiResponse<ExpiredQuotes>> {
    user.require_staff()?;
    let expired = state.quotes.expire_stale_quotes(now())?;
    Ok(ApiResponse::success(ExpiredQuotes {
        expired: expired.len(),
        quotes: expired.into_iter().map(|q| q.quote_number).collect(),
    }))
}
