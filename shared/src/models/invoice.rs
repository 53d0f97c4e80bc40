//! Invoice Model
//!
//! An invoice is a read-mostly projection of an [`Order`]. [`Invoice::from_order`]
//! is pure; numbering and persistence belong to the server.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::common::{Address, CompanyInfo, PaymentMethod};
use super::order::{Order, PaymentStatus};
use super::Lifecycle;
use crate::money;
use crate::util::{contains_ci, new_id};

/// Days between issue and due date
pub const PAYMENT_TERMS_DAYS: i64 = 30;

pub const PAYMENT_TERMS: &str =
    "Payment due within 30 days. Late payments subject to 5% monthly interest.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    #[default]
    Sent,
    Paid,
    Overdue,
    Cancelled,
    Refunded,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        Self::Draft,
        Self::Sent,
        Self::Paid,
        Self::Overdue,
        Self::Cancelled,
        Self::Refunded,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl Lifecycle for InvoiceStatus {
    const ENTITY: &'static str = "Invoice";

    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    fn allows(&self, next: Self) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent | Paid | Cancelled)
                | (Sent, Paid | Overdue | Cancelled)
                | (Overdue, Paid | Cancelled)
                | (Paid, Refunded)
        )
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub id: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub order_id: String,
    pub order_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_address: Option<Address>,
    pub items: Vec<InvoiceItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub currency: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub terms: String,
    pub company_info: CompanyInfo,
}

impl Invoice {
    pub fn from_order(
        order: &Order,
        invoice_number: String,
        issue_date: DateTime<Utc>,
        company: &CompanyInfo,
    ) -> Self {
        let items = order
            .items
            .iter()
            .map(|item| InvoiceItem {
                id: new_id(),
                description: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
            })
            .collect();

        let status = if order.payment_status == PaymentStatus::Paid {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Sent
        };

        Self {
            id: new_id(),
            invoice_number,
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.clone(),
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            customer_phone: order.customer_phone.clone(),
            customer_address: order.customer_address().cloned(),
            items,
            subtotal: order.subtotal,
            tax: order.tax,
            total: order.total,
            currency: order.currency.clone(),
            issue_date,
            due_date: issue_date + Duration::days(PAYMENT_TERMS_DAYS),
            status,
            payment_method: Some(order.payment_method),
            payment_reference: order.metadata.payment_reference.clone(),
            notes: order.notes.clone(),
            terms: PAYMENT_TERMS.to_string(),
            company_info: company.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub status: Option<Vec<InvoiceStatus>>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    /// Inclusive bounds on `issue_date`
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        if let Some(statuses) = &self.status
            && !statuses.contains(&invoice.status)
        {
            return false;
        }
        if let Some(customer_id) = &self.customer_id
            && invoice.customer_id.as_ref() != Some(customer_id)
        {
            return false;
        }
        if let Some(email) = &self.customer_email
            && !invoice.customer_email.eq_ignore_ascii_case(email)
        {
            return false;
        }
        if self.date_from.is_some_and(|from| invoice.issue_date < from)
            || self.date_to.is_some_and(|to| invoice.issue_date > to)
        {
            return false;
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            return contains_ci(&invoice.invoice_number, &needle)
                || contains_ci(&invoice.customer_name, &needle)
                || contains_ci(&invoice.customer_email, &needle)
                || contains_ci(&invoice.order_number, &needle);
        }
        true
    }
}

pub fn sort_invoices(invoices: &mut [Invoice]) {
    invoices.sort_by(|a, b| {
        b.issue_date
            .cmp(&a.issue_date)
            .then_with(|| b.invoice_number.cmp(&a.invoice_number))
    });
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStats {
    pub total: usize,
    pub paid: usize,
    pub sent: usize,
    pub overdue: usize,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub outstanding_amount: f64,
}

impl InvoiceStats {
    pub fn from_invoices(invoices: &[Invoice]) -> Self {
        let count = |status: InvoiceStatus| invoices.iter().filter(|i| i.status == status).count();
        let total_amount = money::sum(invoices.iter().map(|i| i.total));
        let paid_amount = money::sum(
            invoices
                .iter()
                .filter(|i| i.status == InvoiceStatus::Paid)
                .map(|i| i.total),
        );
        Self {
            total: invoices.len(),
            paid: count(InvoiceStatus::Paid),
            sent: count(InvoiceStatus::Sent),
            overdue: count(InvoiceStatus::Overdue),
            total_amount,
            paid_amount,
            outstanding_amount: money::sub(total_amount, paid_amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineItemInput, OrderCreateInput, OrderMetadata};
    use chrono::TimeZone;

    fn order(payment_status: PaymentStatus) -> Order {
        let input = OrderCreateInput {
            customer_email: "amina@example.com".into(),
            customer_name: "Amina Hassan".into(),
            customer_phone: "254733000222".into(),
            items: vec![
                LineItemInput::new("Branded T-Shirts", 40, 650.0),
                LineItemInput::new("Stickers", 500, 4.5),
            ],
            billing_address: Some(Address {
                street: "Kenyatta Ave 5".into(),
                city: "Nairobi".into(),
                state: None,
                postal_code: None,
                country: "Kenya".into(),
            }),
            metadata: Some(OrderMetadata {
                payment_reference: Some("QGH7XYZ".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut order = Order::new(
            input,
            "BRD202608011000".into(),
            Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap(),
        );
        order.payment_status = payment_status;
        order
    }

    #[test]
    fn test_from_order_copies_totals_and_items() {
        let order = order(PaymentStatus::Paid);
        let issued = Utc.with_ymd_and_hms(2026, 8, 2, 10, 0, 0).unwrap();
        let invoice = Invoice::from_order(&order, "INV202608021000".into(), issued, &CompanyInfo::default());

        assert_eq!(invoice.subtotal, order.subtotal);
        assert_eq!(invoice.tax, order.tax);
        assert_eq!(invoice.total, order.total);
        assert_eq!(invoice.items.len(), order.items.len());
        for (line, item) in invoice.items.iter().zip(&order.items) {
            assert_eq!(line.description, item.product_name);
            assert_eq!(line.total_price, item.total_price);
        }
        assert_eq!(invoice.due_date - invoice.issue_date, Duration::days(30));
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.payment_reference.as_deref(), Some("QGH7XYZ"));
        assert_eq!(invoice.customer_address.as_ref().unwrap().city, "Nairobi");
        assert_eq!(invoice.terms, PAYMENT_TERMS);
    }

    #[test]
    fn test_from_unpaid_order_is_sent() {
        for status in [PaymentStatus::Pending, PaymentStatus::Processing, PaymentStatus::Failed] {
            let invoice = Invoice::from_order(&order(status), "INV1".into(), Utc::now(), &CompanyInfo::default());
            assert_eq!(invoice.status, InvoiceStatus::Sent);
        }
    }

    #[test]
    fn test_invoice_transitions() {
        use InvoiceStatus::*;
        assert!(Sent.check_transition(Paid).is_ok());
        assert!(Overdue.check_transition(Paid).is_ok());
        assert!(Paid.check_transition(Refunded).is_ok());
        assert!(Paid.check_transition(Sent).is_err());
        assert!(Cancelled.check_transition(Paid).is_err());
    }

    #[test]
    fn test_stats() {
        let company = CompanyInfo::default();
        let paid = Invoice::from_order(&order(PaymentStatus::Paid), "INV1".into(), Utc::now(), &company);
        let sent = Invoice::from_order(&order(PaymentStatus::Pending), "INV2".into(), Utc::now(), &company);
        let stats = InvoiceStats::from_invoices(&[paid.clone(), sent]);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.paid, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.total_amount, paid.total * 2.0);
        assert_eq!(stats.outstanding_amount, paid.total);
    }
}
