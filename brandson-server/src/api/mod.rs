//! HTTP routes
//!
//! Everything except health and the provider notification endpoints sits
//! behind [`require_auth`].

pub mod auth;
pub mod extract;
pub mod health;
pub mod invoices;
pub mod orders;
pub mod payments;
pub mod quotes;
pub mod receipts;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Router, middleware};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::state::AppState;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .merge(orders::router())
        .merge(invoices::router())
        .merge(quotes::router())
        .merge(receipts::router())
        .merge(payments::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(payments::callback_router())
        .merge(protected)
        .layer(cors_layer(state.config.cors_origin.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin
        .filter(|o| *o != "*")
        .and_then(|o| o.parse::<HeaderValue>().ok())
    {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}
