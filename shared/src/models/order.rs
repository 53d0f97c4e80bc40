//! Order Model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::common::{Address, LineItem, LineItemInput, PaymentMethod, is_valid_email, validate_items};
use super::{Lifecycle, TransitionError};
use crate::money;
use crate::util::{contains_ci, new_id};

/// Default order currency (Kenyan shilling)
pub const DEFAULT_CURRENCY: &str = "kes";

/// Production lifecycle of an order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Printing,
    QualityCheck,
    ReadyForDelivery,
    OutForDelivery,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        Self::Pending,
        Self::Confirmed,
        Self::Processing,
        Self::Printing,
        Self::QualityCheck,
        Self::ReadyForDelivery,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Cancelled,
        Self::Refunded,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// The single forward step of the production pipeline
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Processing),
            Self::Processing => Some(Self::Printing),
            Self::Printing => Some(Self::QualityCheck),
            Self::QualityCheck => Some(Self::ReadyForDelivery),
            Self::ReadyForDelivery => Some(Self::OutForDelivery),
            Self::OutForDelivery => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled | Self::Refunded => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    /// Counted in the `processing` statistics bucket
    pub fn is_in_production(&self) -> bool {
        matches!(self, Self::Processing | Self::Printing | Self::QualityCheck)
    }
}

impl Lifecycle for OrderStatus {
    const ENTITY: &'static str = "Order";

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Printing => "printing",
            Self::QualityCheck => "quality_check",
            Self::ReadyForDelivery => "ready_for_delivery",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    fn allows(&self, next: Self) -> bool {
        match next {
            Self::Cancelled | Self::Refunded => !self.is_terminal(),
            _ => self.next() == Some(next),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment lifecycle, independent of [`OrderStatus`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Paid,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        Self::Pending,
        Self::Processing,
        Self::Paid,
        Self::Failed,
        Self::Refunded,
        Self::PartiallyRefunded,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Money has been received (possibly partly returned since)
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Paid | Self::PartiallyRefunded | Self::Refunded)
    }
}

impl Lifecycle for PaymentStatus {
    const ENTITY: &'static str = "Payment";

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::PartiallyRefunded => "partially_refunded",
        }
    }

    fn allows(&self, next: Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing | Paid | Failed)
                | (Processing, Paid | Failed)
                | (Failed, Processing | Pending)
                | (Paid, Refunded | PartiallyRefunded)
                | (PartiallyRefunded, PartiallyRefunded | Refunded)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed extension fields attached to an order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    /// Channel the order came from (e.g. `website`, `quote`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Provider receipt / transaction id of the confirmed payment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    /// M-Pesa CheckoutRequestID or Stripe checkout session id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    /// Set when the order was converted from a quote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl OrderMetadata {
    /// Overlay fields present in `other`
    pub fn merge(&mut self, other: OrderMetadata) {
        if other.source.is_some() {
            self.source = other.source;
        }
        if other.payment_reference.is_some() {
            self.payment_reference = other.payment_reference;
        }
        if other.provider_reference.is_some() {
            self.provider_reference = other.provider_reference;
        }
        if other.payment_intent_id.is_some() {
            self.payment_intent_id = other.payment_intent_id;
        }
        if other.quote_id.is_some() {
            self.quote_id = other.quote_id;
        }
        if !other.tags.is_empty() {
            self.tags = other.tags;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub customer_email: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub items: Vec<LineItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: OrderMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreateInput {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: String,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub delivery_instructions: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: Option<OrderMetadata>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Carried over from an accepted quote; never read from requests
    #[serde(skip)]
    pub tax: f64,
}

/// Validate an order creation request; empty means valid
pub fn validate_order(input: &OrderCreateInput) -> Vec<String> {
    validate_order_fields(input, true)
}

/// Orders converted from a quote keep the quote's optional phone
pub fn validate_converted_order(input: &OrderCreateInput) -> Vec<String> {
    validate_order_fields(input, false)
}

fn validate_order_fields(input: &OrderCreateInput, require_phone: bool) -> Vec<String> {
    let mut errors = Vec::new();
    if !is_valid_email(&input.customer_email) {
        errors.push("Valid customer email is required".to_string());
    }
    if input.customer_name.trim().is_empty() {
        errors.push("Customer name is required".to_string());
    }
    if require_phone && input.customer_phone.trim().is_empty() {
        errors.push("Customer phone number is required".to_string());
    }
    validate_items(&input.items, &mut errors);
    if !input.tax.is_finite() || input.tax < 0.0 {
        errors.push("Tax cannot be negative".to_string());
    }
    errors
}

impl Order {
    /// Build a fresh `pending`/`pending` order with derived totals.
    /// Tax is not computed; only a converted quote brings one along.
    pub fn new(input: OrderCreateInput, order_number: String, now: DateTime<Utc>) -> Self {
        let items: Vec<LineItem> = input.items.into_iter().map(LineItem::from_input).collect();
        let subtotal = money::subtotal(&items);
        let tax = money::to_f64(money::to_decimal(input.tax));
        Self {
            id: new_id(),
            order_number,
            customer_id: input.customer_id,
            customer_email: input.customer_email.trim().to_string(),
            customer_name: input.customer_name.trim().to_string(),
            customer_phone: input.customer_phone.trim().to_string(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Other,
            items,
            subtotal,
            tax,
            total: money::add(subtotal, tax),
            currency: input
                .currency
                .filter(|c| !c.trim().is_empty())
                .map(|c| c.trim().to_lowercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            shipping_address: input.shipping_address,
            billing_address: input.billing_address,
            delivery_instructions: input.delivery_instructions,
            notes: input.notes,
            metadata: input.metadata.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            due_date: input.due_date,
            completed_at: None,
        }
    }

    /// Merge a partial update. Both status transitions are checked before
    /// anything is written, so a rejected update leaves the order untouched.
    pub fn apply_update(&mut self, update: OrderUpdate, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if let Some(status) = update.status {
            self.status.check_transition(status)?;
        }
        if let Some(payment_status) = update.payment_status {
            self.payment_status.check_transition(payment_status)?;
        }

        if let Some(status) = update.status {
            if status == OrderStatus::Delivered && self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
            self.status = status;
        }
        if let Some(payment_status) = update.payment_status {
            self.payment_status = payment_status;
        }
        if let Some(method) = update.payment_method {
            self.payment_method = method;
        }
        if let Some(address) = update.shipping_address {
            self.shipping_address = Some(address);
        }
        if let Some(address) = update.billing_address {
            self.billing_address = Some(address);
        }
        if let Some(instructions) = update.delivery_instructions {
            self.delivery_instructions = Some(instructions);
        }
        if let Some(notes) = update.notes {
            self.notes = Some(notes);
        }
        if let Some(metadata) = update.metadata {
            self.metadata.merge(metadata);
        }
        if let Some(due_date) = update.due_date {
            self.due_date = Some(due_date);
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = Some(completed_at);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Address printed on documents: shipping, else billing
    pub fn customer_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref().or(self.billing_address.as_ref())
    }
}

/// Partial order update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub delivery_instructions: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: Option<OrderMetadata>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl OrderUpdate {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn payment(status: PaymentStatus, method: Option<PaymentMethod>) -> Self {
        Self {
            payment_status: Some(status),
            payment_method: method,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<Vec<OrderStatus>>,
    pub payment_status: Option<Vec<PaymentStatus>>,
    pub payment_method: Option<Vec<PaymentMethod>>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub date_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl OrderFilter {
    pub fn for_customer_email(email: impl Into<String>) -> Self {
        Self {
            customer_email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        if let Some(statuses) = &self.status
            && !statuses.contains(&order.status)
        {
            return false;
        }
        if let Some(statuses) = &self.payment_status
            && !statuses.contains(&order.payment_status)
        {
            return false;
        }
        if let Some(methods) = &self.payment_method
            && !methods.contains(&order.payment_method)
        {
            return false;
        }
        if let Some(customer_id) = &self.customer_id
            && order.customer_id.as_ref() != Some(customer_id)
        {
            return false;
        }
        if let Some(email) = &self.customer_email
            && !order.customer_email.eq_ignore_ascii_case(email)
        {
            return false;
        }
        if let Some(from) = self.date_from
            && order.created_at < from
        {
            return false;
        }
        if let Some(to) = self.date_to
            && order.created_at > to
        {
            return false;
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let hit = contains_ci(&order.order_number, &needle)
                || contains_ci(&order.customer_name, &needle)
                || contains_ci(&order.customer_email, &needle)
                || order.customer_phone.contains(search);
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Newest created first; ties broken by order number, descending
pub fn sort_orders(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.order_number.cmp(&a.order_number))
    });
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    /// processing + printing + quality_check
    pub processing: usize,
    /// delivered
    pub completed: usize,
    pub cancelled: usize,
    /// Sum of totals of paid orders
    pub total_revenue: f64,
    pub average_order_value: f64,
}

impl OrderStats {
    pub fn from_orders(orders: &[Order]) -> Self {
        let count = |pred: fn(&OrderStatus) -> bool| orders.iter().filter(|o| pred(&o.status)).count();
        let total_revenue = money::sum(
            orders
                .iter()
                .filter(|o| o.payment_status == PaymentStatus::Paid)
                .map(|o| o.total),
        );
        Self {
            total: orders.len(),
            pending: count(|s| *s == OrderStatus::Pending),
            confirmed: count(|s| *s == OrderStatus::Confirmed),
            processing: count(OrderStatus::is_in_production),
            completed: count(|s| *s == OrderStatus::Delivered),
            cancelled: count(|s| *s == OrderStatus::Cancelled),
            total_revenue,
            average_order_value: money::average(total_revenue, orders.len()),
        }
    }
}

/// `now + 3 days + max(1, ceil(total quantity / 100)) days`
pub fn estimated_completion_date(items: &[LineItem], now: DateTime<Utc>) -> DateTime<Utc> {
    const BASE_DAYS: i64 = 3;
    let quantity: u64 = items.iter().map(|item| u64::from(item.quantity)).sum();
    let printing_days = i64::try_from(quantity.div_ceil(100).max(1)).unwrap_or(1);
    now + Duration::days(BASE_DAYS + printing_days)
}
