//! Shared types for the Brandson commerce platform
//!
//! Domain entities (orders, quotes, receipts, invoices), their status
//! machines, pure validation, money arithmetic, error codes and the HTTP
//! response envelope. Used by `brandson-server` and by API clients.

pub mod error;
pub mod models;
pub mod money;
pub mod response;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult, ErrorCategory, ErrorCode};
pub use response::ApiResponse;
