//! Money calculation utilities using rust_decimal for precision
//!
//! Amounts are stored and serialized as `f64` in major currency units.
//! Arithmetic goes through `Decimal` and is rounded back to two places.

use rust_decimal::prelude::*;

use crate::models::LineItem;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Convert f64 to Decimal; non-finite input degrades to zero
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_else(|| {
        tracing::error!(value = ?value, "Non-finite f64 in monetary calculation, defaulting to zero");
        Decimal::ZERO
    })
}

/// Convert Decimal back to f64 for storage, rounded to 2 decimal places
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// `quantity * unit_price`
pub fn line_total(quantity: u32, unit_price: f64) -> f64 {
    to_f64(Decimal::from(quantity) * to_decimal(unit_price))
}

/// Sum of `quantity * unit_price` over the items
pub fn subtotal(items: &[LineItem]) -> f64 {
    let sum = items
        .iter()
        .map(|item| Decimal::from(item.quantity) * to_decimal(item.unit_price))
        .fold(Decimal::ZERO, |acc, x| acc + x);
    to_f64(sum)
}

/// Sum of arbitrary amounts
pub fn sum(amounts: impl IntoIterator<Item = f64>) -> f64 {
    to_f64(
        amounts
            .into_iter()
            .map(to_decimal)
            .fold(Decimal::ZERO, |acc, x| acc + x),
    )
}

/// `a + b` with decimal precision
pub fn add(a: f64, b: f64) -> f64 {
    to_f64(to_decimal(a) + to_decimal(b))
}

/// `a - b` with decimal precision
pub fn sub(a: f64, b: f64) -> f64 {
    to_f64(to_decimal(a) - to_decimal(b))
}

/// `total / count`, zero when `count == 0`
pub fn average(total: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    to_f64(to_decimal(total) / Decimal::from(count))
}

/// Compare two amounts within [`MONEY_TOLERANCE`]
pub fn money_eq(a: f64, b: f64) -> bool {
    (to_decimal(a) - to_decimal(b)).abs() < MONEY_TOLERANCE
}

/// Round an amount up to whole currency units (M-Pesa accepts integers only)
pub fn ceil_units(value: f64) -> u64 {
    to_decimal(value).ceil().to_u64().unwrap_or(0)
}

/// Convert a major-unit amount to minor units (cents), as Stripe expects
pub fn to_minor_units(value: f64) -> i64 {
    (to_decimal(value) * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .unwrap_or(0)
}

/// Inverse of [`to_minor_units`]
pub fn from_minor_units(minor: i64) -> f64 {
    to_f64(Decimal::new(minor, 2))
}
