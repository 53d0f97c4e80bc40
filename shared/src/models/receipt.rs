//! Receipt Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{LineItem, LineItemInput, PaymentMethod, is_valid_email, validate_items};
use super::order::Order;
use super::Lifecycle;
use crate::error::{AppError, ErrorCode};
use crate::money;
use crate::util::{contains_ci, new_id};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl ReceiptStatus {
    pub const ALL: [ReceiptStatus; 4] = [Self::Pending, Self::Completed, Self::Failed, Self::Refunded];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl Lifecycle for ReceiptStatus {
    const ENTITY: &'static str = "Receipt";

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    fn allows(&self, next: Self) -> bool {
        use ReceiptStatus::*;
        matches!(
            (self, next),
            (Pending, Completed | Failed) | (Failed, Pending) | (Completed, Refunded)
        )
    }
}

impl std::fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub receipt_number: String,
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    pub items: Vec<LineItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
    pub payment_date: DateTime<Utc>,
    pub status: ReceiptStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptCreateInput {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub tax: f64,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub payment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<ReceiptStatus>,
}

pub fn validate_receipt(input: &ReceiptCreateInput) -> Vec<String> {
    let mut errors = Vec::new();
    if input.order_id.trim().is_empty() {
        errors.push("Order id is required".to_string());
    }
    if !is_valid_email(&input.customer_email) {
        errors.push("Valid customer email is required".to_string());
    }
    if input.customer_name.trim().is_empty() {
        errors.push("Customer name is required".to_string());
    }
    if input.transaction_id.trim().is_empty() {
        errors.push("Transaction id is required".to_string());
    }
    validate_items(&input.items, &mut errors);
    if !input.tax.is_finite() || input.tax < 0.0 {
        errors.push("Tax cannot be negative".to_string());
    }
    errors
}

impl Receipt {
    pub fn new(input: ReceiptCreateInput, receipt_number: String, now: DateTime<Utc>) -> Self {
        let items: Vec<LineItem> = input.items.into_iter().map(LineItem::from_input).collect();
        let subtotal = money::subtotal(&items);
        let tax = money::to_f64(money::to_decimal(input.tax));
        Self {
            id: new_id(),
            receipt_number,
            order_id: input.order_id,
            customer_id: input.customer_id,
            customer_name: input.customer_name.trim().to_string(),
            customer_email: input.customer_email.trim().to_string(),
            customer_phone: input.customer_phone,
            items,
            subtotal,
            tax,
            total: money::add(subtotal, tax),
            payment_method: input.payment_method,
            transaction_id: input.transaction_id,
            payment_date: input.payment_date.unwrap_or(now),
            status: input.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            refund_amount: None,
            refund_reason: None,
            refund_date: None,
        }
    }

    /// Completed receipt for a confirmed payment on `order`
    pub fn for_payment(
        order: &Order,
        receipt_number: String,
        transaction_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            receipt_number,
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            customer_phone: Some(order.customer_phone.clone()).filter(|p| !p.is_empty()),
            items: order.items.clone(),
            subtotal: order.subtotal,
            tax: order.tax,
            total: order.total,
            payment_method: order.payment_method,
            transaction_id: transaction_id.into(),
            payment_date: now,
            status: ReceiptStatus::Completed,
            created_at: now,
            updated_at: now,
            refund_amount: None,
            refund_reason: None,
            refund_date: None,
        }
    }

    /// Refund a completed receipt; `0 < amount <= total`
    pub fn refund(
        &mut self,
        amount: f64,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if self.status != ReceiptStatus::Completed {
            return Err(AppError::with_message(
                ErrorCode::ReceiptNotRefundable,
                format!(
                    "Receipt {} is {}, only completed receipts can be refunded",
                    self.receipt_number, self.status
                ),
            ));
        }
        let amount_dec = money::to_decimal(amount);
        if !amount.is_finite()
            || amount_dec <= rust_decimal::Decimal::ZERO
            || amount_dec > money::to_decimal(self.total)
        {
            return Err(AppError::with_message(
                ErrorCode::RefundAmountInvalid,
                format!("Refund amount must be greater than 0 and at most {:.2}", self.total),
            )
            .with_detail("amount", amount));
        }
        self.mark_refunded(amount_dec, reason, now);
        Ok(())
    }

    /// Record a provider refund whose `total_refunded` is cumulative over
    /// the payment. A refunded receipt takes later, larger totals; a total
    /// at or below the recorded one is ignored and `false` returned.
    pub fn record_cumulative_refund(
        &mut self,
        total_refunded: f64,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        match self.status {
            ReceiptStatus::Completed => {
                self.refund(total_refunded, reason, now)?;
                Ok(true)
            }
            ReceiptStatus::Refunded => {
                let amount_dec = money::to_decimal(total_refunded);
                if !total_refunded.is_finite() || amount_dec > money::to_decimal(self.total) {
                    return Err(AppError::with_message(
                        ErrorCode::RefundAmountInvalid,
                        format!("Refund amount must be at most {:.2}", self.total),
                    )
                    .with_detail("amount", total_refunded));
                }
                let recorded = money::to_decimal(self.refund_amount.unwrap_or(0.0));
                if amount_dec <= recorded {
                    return Ok(false);
                }
                self.mark_refunded(amount_dec, reason, now);
                Ok(true)
            }
            status => Err(AppError::with_message(
                ErrorCode::ReceiptNotRefundable,
                format!(
                    "Receipt {} is {status}, only completed receipts can be refunded",
                    self.receipt_number
                ),
            )),
        }
    }

    fn mark_refunded(
        &mut self,
        amount: rust_decimal::Decimal,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.status = ReceiptStatus::Refunded;
        self.refund_amount = Some(money::to_f64(amount));
        self.refund_reason = Some(reason.into());
        self.refund_date = Some(now);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReceiptFilter {
    pub status: Option<Vec<ReceiptStatus>>,
    pub payment_method: Option<Vec<PaymentMethod>>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub order_id: Option<String>,
    /// Inclusive bounds on `payment_date`
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl ReceiptFilter {
    pub fn matches(&self, receipt: &Receipt) -> bool {
        if let Some(statuses) = &self.status
            && !statuses.contains(&receipt.status)
        {
            return false;
        }
        if let Some(methods) = &self.payment_method
            && !methods.contains(&receipt.payment_method)
        {
            return false;
        }
        if let Some(customer_id) = &self.customer_id
            && receipt.customer_id.as_ref() != Some(customer_id)
        {
            return false;
        }
        if let Some(email) = &self.customer_email
            && !receipt.customer_email.eq_ignore_ascii_case(email)
        {
            return false;
        }
        if let Some(order_id) = &self.order_id
            && &receipt.order_id != order_id
        {
            return false;
        }
        if self.date_from.is_some_and(|from| receipt.payment_date < from)
            || self.date_to.is_some_and(|to| receipt.payment_date > to)
        {
            return false;
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            return contains_ci(&receipt.receipt_number, &needle)
                || contains_ci(&receipt.customer_name, &needle)
                || contains_ci(&receipt.customer_email, &needle)
                || contains_ci(&receipt.transaction_id, &needle);
        }
        true
    }
}

pub fn sort_receipts(receipts: &mut [Receipt]) {
    receipts.sort_by(|a, b| {
        b.payment_date
            .cmp(&a.payment_date)
            .then_with(|| b.receipt_number.cmp(&a.receipt_number))
    });
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptStats {
    pub total_receipts: usize,
    pub completed_receipts: usize,
    pub refunded_receipts: usize,
    /// Sum of totals of completed receipts
    pub total_revenue: f64,
    /// Sum of refund amounts of refunded receipts
    pub total_refunded: f64,
    pub net_revenue: f64,
}

impl ReceiptStats {
    pub fn from_receipts(receipts: &[Receipt]) -> Self {
        let with_status = |status: ReceiptStatus| receipts.iter().filter(move |r| r.status == status);
        let total_revenue = money::sum(with_status(ReceiptStatus::Completed).map(|r| r.total));
        let total_refunded = money::sum(
            with_status(ReceiptStatus::Refunded).map(|r| r.refund_amount.unwrap_or(0.0)),
        );
        Self {
            total_receipts: receipts.len(),
            completed_receipts: with_status(ReceiptStatus::Completed).count(),
            refunded_receipts: with_status(ReceiptStatus::Refunded).count(),
            total_revenue,
            total_refunded,
            net_revenue: money::sub(total_revenue, total_refunded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 8, 30, 0).unwrap()
    }

    fn input() -> ReceiptCreateInput {
        ReceiptCreateInput {
            order_id: "order-1".into(),
            customer_name: "Jane Smith".into(),
            customer_email: "jane@company.co.ke".into(),
            items: vec![LineItemInput::new("PVC Banners", 2, 4500.0)],
            payment_method: PaymentMethod::Mpesa,
            transaction_id: "QFT12ABC34".into(),
            status: Some(ReceiptStatus::Completed),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_receipt() {
        assert!(validate_receipt(&input()).is_empty());
        let errors = validate_receipt(&ReceiptCreateInput {
            transaction_id: " ".into(),
            ..input()
        });
        assert_eq!(errors, vec!["Transaction id is required"]);
    }

    #[test]
    fn test_refund_bounds() {
        let mut receipt = Receipt::new(input(), "R-2026-001".into(), now());
        assert_eq!(receipt.total, 9000.0);

        let err = receipt.refund(0.0, "none", now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RefundAmountInvalid);
        let err = receipt.refund(9000.01, "too much", now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RefundAmountInvalid);

        receipt.refund(9000.0, "Misprint", now()).unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Refunded);
        assert_eq!(receipt.refund_amount, Some(9000.0));

        let err = receipt.refund(1.0, "again", now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ReceiptNotRefundable);
    }

    #[test]
    fn test_cumulative_refunds_grow_the_recorded_amount() {
        let mut receipt = Receipt::new(input(), "R-2026-003".into(), now());
        assert!(receipt.record_cumulative_refund(1000.0, "Misprint", now()).unwrap());
        assert!(receipt.record_cumulative_refund(2500.0, "Misprint", now()).unwrap());
        assert_eq!(receipt.refund_amount, Some(2500.0));

        assert!(!receipt.record_cumulative_refund(2500.0, "Misprint", now()).unwrap());
        assert!(!receipt.record_cumulative_refund(1000.0, "Late event", now()).unwrap());
        assert_eq!(receipt.refund_amount, Some(2500.0));

        let err = receipt.record_cumulative_refund(9000.5, "too much", now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RefundAmountInvalid);

        assert!(receipt.record_cumulative_refund(9000.0, "Full refund", now()).unwrap());
        assert_eq!(receipt.refund_amount, Some(9000.0));
        assert_eq!(receipt.refund_reason.as_deref(), Some("Full refund"));
        assert_eq!(receipt.status, ReceiptStatus::Refunded);
    }

    #[test]
    fn test_refund_requires_completed() {
        let mut receipt = Receipt::new(
            ReceiptCreateInput {
                status: None,
                ..input()
            },
            "R-2026-002".into(),
            now(),
        );
        assert_eq!(receipt.status, ReceiptStatus::Pending);
        assert!(receipt.refund(10.0, "x", now()).is_err());
    }

    #[test]
    fn test_stats() {
        let completed = Receipt::new(input(), "R-2026-001".into(), now());
        let mut refunded = Receipt::new(input(), "R-2026-002".into(), now());
        refunded.refund(2000.0, "Partial misprint", now()).unwrap();
        let stats = ReceiptStats::from_receipts(&[completed, refunded]);
        assert_eq!(stats.total_receipts, 2);
        assert_eq!(stats.completed_receipts, 1);
        assert_eq!(stats.refunded_receipts, 1);
        assert_eq!(stats.total_revenue, 9000.0);
        assert_eq!(stats.total_refunded, 2000.0);
        assert_eq!(stats.net_revenue, 7000.0);
    }
}
