//! Data models
//!
//! Shared between brandson-server and API clients. JSON field names are
//! camelCase, enum values snake_case, money `f64` in major units.

pub mod common;
pub mod invoice;
pub mod order;
pub mod quote;
pub mod receipt;
pub mod user;

// Re-exports
pub use common::*;
pub use invoice::*;
pub use order::*;
pub use quote::*;
pub use receipt::*;
pub use user::*;

use thiserror::Error;

use crate::error::AppError;

/// Status change rejected by a lifecycle's transition table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::invalid_transition(err.entity, err.from, err.to)
    }
}

/// A status enum governed by an explicit transition table
pub trait Lifecycle: Copy + PartialEq {
    /// Entity name used in error messages
    const ENTITY: &'static str;

    fn as_str(&self) -> &'static str;

    /// Whether `self -> next` is in the transition table. Self-transitions
    /// are handled by [`Lifecycle::check_transition`] and need not be listed.
    fn allows(&self, next: Self) -> bool;

    /// Re-asserting the current state is accepted as a no-op
    fn check_transition(self, next: Self) -> Result<(), TransitionError> {
        if self == next || self.allows(next) {
            Ok(())
        } else {
            Err(TransitionError {
                entity: Self::ENTITY,
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

/// Parse a comma separated query value (`status=pending,confirmed`) into a
/// set of enum values. Unknown entries are skipped.
pub fn parse_set<T>(raw: Option<&str>, parse: impl Fn(&str) -> Option<T>) -> Option<Vec<T>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(&parse)
            .collect(),
    )
}
