//! Brandson commerce server
//!
//! Orders, quotes, invoices and receipts for a print shop, with M-Pesa
//! (Daraja STK push) and Stripe Checkout payments reconciled from provider
//! callbacks.
//!
//! # Module layout
//!
//! - `api`: axum routes and handlers
//! - `auth`: bearer-token verification and caller identity
//! - `db`: redb storage, pending payments, processed callbacks
//! - `orders`, `quotes`, `receipts`, `invoices`: entity stores
//! - `payments`: provider bridges behind [`payments::PaymentGateway`]
//! - `reconcile`: applies provider outcomes to order, invoice and receipt

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod invoices;
pub mod orders;
pub mod payments;
pub mod quotes;
pub mod receipts;
pub mod reconcile;
pub mod state;
pub mod utils;

pub use config::Config;
pub use state::AppState;
