//! Quote Model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::common::{Address, LineItem, LineItemInput, is_valid_email, validate_items};
use super::order::{OrderCreateInput, OrderMetadata};
use super::Lifecycle;
use crate::money;
use crate::util::{contains_ci, new_id};

/// Validity window applied when a quote is created without `validUntil`
pub const DEFAULT_VALIDITY_DAYS: i64 = 30;

/// Product name of the line that carries quoted shipping into an order
pub const SHIPPING_LINE_NAME: &str = "Shipping";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    #[default]
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
    Converted,
}

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 6] = [
        Self::Draft,
        Self::Sent,
        Self::Accepted,
        Self::Rejected,
        Self::Expired,
        Self::Converted,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Expired | Self::Converted)
    }
}

impl Lifecycle for QuoteStatus {
    const ENTITY: &'static str = "Quote";

    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Converted => "converted",
        }
    }

    fn allows(&self, next: Self) -> bool {
        use QuoteStatus::*;
        matches!(
            (self, next),
            (Draft, Sent | Rejected | Expired)
                | (Sent, Accepted | Rejected | Expired)
                | (Accepted, Converted | Expired)
        )
    }
}

impl std::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: String,
    pub quote_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_address: Option<Address>,
    pub items: Vec<LineItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub shipping: f64,
    pub total: f64,
    pub status: QuoteStatus,
    pub quote_date: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_to_order_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteCreateInput {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_address: Option<Address>,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub tax: f64,
    #[serde(default)]
    pub shipping: f64,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn validate_quote(input: &QuoteCreateInput, now: DateTime<Utc>) -> Vec<String> {
    let mut errors = Vec::new();
    if !is_valid_email(&input.customer_email) {
        errors.push("Valid customer email is required".to_string());
    }
    if input.customer_name.trim().is_empty() {
        errors.push("Customer name is required".to_string());
    }
    validate_items(&input.items, &mut errors);
    if !input.tax.is_finite() || input.tax < 0.0 {
        errors.push("Tax cannot be negative".to_string());
    }
    if !input.shipping.is_finite() || input.shipping < 0.0 {
        errors.push("Shipping cannot be negative".to_string());
    }
    if let Some(valid_until) = input.valid_until
        && valid_until <= now
    {
        errors.push("Valid-until date must be in the future".to_string());
    }
    errors
}

impl Quote {
    /// `total = subtotal + tax + shipping`
    pub fn new(input: QuoteCreateInput, quote_number: String, now: DateTime<Utc>) -> Self {
        let items: Vec<LineItem> = input.items.into_iter().map(LineItem::from_input).collect();
        let subtotal = money::subtotal(&items);
        let tax = money::to_f64(money::to_decimal(input.tax));
        let shipping = money::to_f64(money::to_decimal(input.shipping));
        Self {
            id: new_id(),
            quote_number,
            customer_id: input.customer_id,
            customer_name: input.customer_name.trim().to_string(),
            customer_email: input.customer_email.trim().to_string(),
            customer_phone: input.customer_phone,
            customer_address: input.customer_address,
            items,
            subtotal,
            tax,
            shipping,
            total: money::sum([subtotal, tax, shipping]),
            status: QuoteStatus::Draft,
            quote_date: now,
            valid_until: input
                .valid_until
                .unwrap_or(now + Duration::days(DEFAULT_VALIDITY_DAYS)),
            notes: input.notes,
            created_at: now,
            updated_at: now,
            converted_to_order_id: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    /// Awaiting or holding customer acceptance, and still valid
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, QuoteStatus::Sent | QuoteStatus::Accepted) && !self.is_expired(now)
    }

    /// Picked up by the expiry sweep
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.valid_until < now && !self.status.is_terminal()
    }

    /// Order request for the quoted amount: the quote's items, shipping as
    /// its own line and the quoted tax, so the order total equals the quote
    /// total
    pub fn to_order_input(&self) -> OrderCreateInput {
        let mut items: Vec<LineItemInput> = self.items.iter().map(LineItemInput::from).collect();
        if self.shipping > 0.0 {
            items.push(LineItemInput::new(SHIPPING_LINE_NAME, 1, self.shipping));
        }
        OrderCreateInput {
            customer_id: self.customer_id.clone(),
            customer_email: self.customer_email.clone(),
            customer_name: self.customer_name.clone(),
            customer_phone: self.customer_phone.clone().unwrap_or_default(),
            items,
            currency: None,
            shipping_address: self.customer_address.clone(),
            billing_address: None,
            delivery_instructions: None,
            notes: self.notes.clone(),
            metadata: Some(OrderMetadata {
                source: Some("quote".to_string()),
                quote_id: Some(self.id.clone()),
                ..Default::default()
            }),
            due_date: None,
            tax: self.tax,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuoteFilter {
    pub status: Option<Vec<QuoteStatus>>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl QuoteFilter {
    pub fn matches(&self, quote: &Quote) -> bool {
        if let Some(statuses) = &self.status
            && !statuses.contains(&quote.status)
        {
            return false;
        }
        if let Some(customer_id) = &self.customer_id
            && quote.customer_id.as_ref() != Some(customer_id)
        {
            return false;
        }
        if let Some(email) = &self.customer_email
            && !quote.customer_email.eq_ignore_ascii_case(email)
        {
            return false;
        }
        if self.date_from.is_some_and(|from| quote.quote_date < from)
            || self.date_to.is_some_and(|to| quote.quote_date > to)
        {
            return false;
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            return contains_ci(&quote.quote_number, &needle)
                || contains_ci(&quote.customer_name, &needle)
                || contains_ci(&quote.customer_email, &needle);
        }
        true
    }
}

pub fn sort_quotes(quotes: &mut [Quote]) {
    quotes.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.quote_number.cmp(&a.quote_number))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Order, validate_converted_order, validate_order};
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, day, 12, 0, 0).unwrap()
    }

    fn input() -> QuoteCreateInput {
        QuoteCreateInput {
            customer_name: "Otieno Ochieng".into(),
            customer_email: "otieno@example.com".into(),
            customer_phone: Some("0722000111".into()),
            items: vec![LineItemInput::new("A4 Letterheads", 100, 35.0)],
            tax: 560.0,
            shipping: 350.0,
            valid_until: Some(at(10)),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_quote_totals() {
        let quote = Quote::new(input(), "Q-2026-001".into(), at(1));
        assert_eq!(quote.subtotal, 3500.0);
        assert_eq!(quote.total, 4410.0);
        assert_eq!(quote.status, QuoteStatus::Draft);
    }

    #[test]
    fn test_default_validity() {
        let quote = Quote::new(
            QuoteCreateInput {
                valid_until: None,
                ..input()
            },
            "Q-2026-002".into(),
            at(1),
        );
        assert_eq!(quote.valid_until, at(1) + Duration::days(30));
    }

    #[test]
    fn test_validate_quote() {
        assert!(validate_quote(&input(), at(1)).is_empty());
        let errors = validate_quote(
            &QuoteCreateInput {
                shipping: -1.0,
                valid_until: Some(at(1)),
                ..input()
            },
            at(2),
        );
        assert_eq!(
            errors,
            vec![
                "Shipping cannot be negative",
                "Valid-until date must be in the future"
            ]
        );
    }

    #[test]
    fn test_quote_transitions() {
        use QuoteStatus::*;
        assert!(Draft.check_transition(Sent).is_ok());
        assert!(Sent.check_transition(Accepted).is_ok());
        assert!(Accepted.check_transition(Converted).is_ok());
        assert!(Draft.check_transition(Converted).is_err());
        assert!(Expired.check_transition(Sent).is_err());
        assert!(Converted.check_transition(Accepted).is_err());
    }

    #[test]
    fn test_active_and_stale() {
        let mut quote = Quote::new(input(), "Q-2026-001".into(), at(1));
        assert!(!quote.is_active(at(2)));
        quote.status = QuoteStatus::Sent;
        assert!(quote.is_active(at(2)));
        assert!(!quote.is_active(at(11)));
        assert!(quote.is_stale(at(11)));
        quote.status = QuoteStatus::Rejected;
        assert!(!quote.is_stale(at(11)));
    }

    #[test]
    fn test_to_order_input() {
        let quote = Quote::new(input(), "Q-2026-001".into(), at(1));
        let order_input = quote.to_order_input();
        assert_eq!(order_input.items.len(), 2);
        assert_eq!(order_input.items[0].quantity, 100);
        assert_eq!(order_input.items[1].product_name, SHIPPING_LINE_NAME);
        assert_eq!(order_input.items[1].unit_price, 350.0);
        assert_eq!(order_input.tax, 560.0);
        assert_eq!(order_input.customer_phone, "0722000111");
        let metadata = order_input.metadata.as_ref().unwrap();
        assert_eq!(metadata.quote_id.as_deref(), Some(quote.id.as_str()));

        let order = Order::new(order_input, "BRD202606011000".into(), at(2));
        assert_eq!(order.subtotal, 3850.0);
        assert_eq!(order.tax, 560.0);
        assert_eq!(order.total, quote.total);
    }

    #[test]
    fn test_quote_without_phone_or_shipping_converts() {
        let quote = Quote::new(
            QuoteCreateInput {
                customer_phone: None,
                shipping: 0.0,
                ..input()
            },
            "Q-2026-003".into(),
            at(1),
        );
        let order_input = quote.to_order_input();
        assert_eq!(order_input.items.len(), 1);
        assert!(validate_converted_order(&order_input).is_empty());
        assert_eq!(
            validate_order(&order_input),
            vec!["Customer phone number is required"]
        );
    }
}
