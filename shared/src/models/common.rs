//! Value types shared by orders, quotes, receipts and invoices

use serde::{Deserialize, Serialize};

use crate::money;
use crate::util::new_id;

/// Postal address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub country: String,
}

impl Address {
    /// Single-line rendering, empty parts skipped
    pub fn one_line(&self) -> String {
        [
            Some(self.street.as_str()),
            Some(self.city.as_str()),
            self.state.as_deref(),
            self.postal_code.as_deref(),
            Some(self.country.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sides {
    Single,
    Double,
}

/// Print job specification attached to a line item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSpecifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sides: Option<Sides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finishing: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_requirements: Option<String>,
    /// References to files held by the upload service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uploaded_files: Vec<String>,
}

/// Priced line item
///
/// `total_price` is always `quantity * unit_price`; it is derived on
/// construction and never accepted from clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    pub quantity: u32,
    pub unit_price: f64,
    pub total_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifications: Option<ProductSpecifications>,
}

impl LineItem {
    pub fn new(product_name: impl Into<String>, quantity: u32, unit_price: f64) -> Self {
        Self {
            id: new_id(),
            product_id: None,
            product_name: product_name.into(),
            description: None,
            variant_name: None,
            quantity,
            unit_price,
            total_price: money::line_total(quantity, unit_price),
            specifications: None,
        }
    }

    /// Build from validated input. Quantities outside `u32` clamp to zero,
    /// which validation rejects beforehand.
    pub fn from_input(input: LineItemInput) -> Self {
        let quantity = u32::try_from(input.quantity).unwrap_or(0);
        Self {
            id: new_id(),
            product_id: input.product_id,
            product_name: input.product_name.trim().to_string(),
            description: input.description,
            variant_name: input.variant_name,
            quantity,
            unit_price: input.unit_price,
            total_price: money::line_total(quantity, input.unit_price),
            specifications: input.specifications,
        }
    }
}

/// Client-supplied line item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variant_name: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default)]
    pub specifications: Option<ProductSpecifications>,
}

impl LineItemInput {
    pub fn new(product_name: impl Into<String>, quantity: i64, unit_price: f64) -> Self {
        Self {
            product_name: product_name.into(),
            quantity,
            unit_price,
            ..Default::default()
        }
    }
}

impl From<&LineItem> for LineItemInput {
    fn from(item: &LineItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            product_name: item.product_name.clone(),
            description: item.description.clone(),
            variant_name: item.variant_name.clone(),
            quantity: i64::from(item.quantity),
            unit_price: item.unit_price,
            specifications: item.specifications.clone(),
        }
    }
}

/// Append per-item validation messages (1-based positions)
pub fn validate_items(items: &[LineItemInput], errors: &mut Vec<String>) {
    if items.is_empty() {
        errors.push("At least one item is required".to_string());
        return;
    }
    for (index, item) in items.iter().enumerate() {
        let position = index + 1;
        if item.product_name.trim().is_empty() {
            errors.push(format!("Item {position}: Product name is required"));
        }
        if item.quantity <= 0 {
            errors.push(format!("Item {position}: Quantity must be greater than 0"));
        } else if item.quantity > i64::from(u32::MAX) {
            errors.push(format!("Item {position}: Quantity is too large"));
        }
        if !item.unit_price.is_finite() || item.unit_price <= 0.0 {
            errors.push(format!("Item {position}: Unit price must be greater than 0"));
        }
    }
}

/// Email check used across entities: non-blank and contains `@`
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.contains('@')
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
    Stripe,
    Cash,
    BankTransfer,
    #[default]
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mpesa => "mpesa",
            Self::Stripe => "stripe",
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mpesa" => Some(Self::Mpesa),
            "stripe" => Some(Self::Stripe),
            "cash" => Some(Self::Cash),
            "bank_transfer" => Some(Self::BankTransfer),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Human-readable label for documents
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mpesa => "M-Pesa",
            Self::Stripe => "Card (Stripe)",
            Self::Cash => "Cash",
            Self::BankTransfer => "Bank Transfer",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issuer details printed on invoices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
}

impl Default for CompanyInfo {
    fn default() -> Self {
        Self {
            name: "Brandson Media".to_string(),
            address: "Nairobi, Kenya".to_string(),
            phone: "+254 701 869821".to_string(),
            email: "brandsonmedia@gmail.com".to_string(),
            website: "https://brandsonmedia.co.ke".to_string(),
            tax_id: Some("PVT-123456789".to_string()),
        }
    }
}
