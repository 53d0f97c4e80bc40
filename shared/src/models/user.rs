//! Authenticated user as seen by the API

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Customer,
    Staff,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }

    /// Back-office roles allowed to manage any customer's records
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Staff | Self::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

impl User {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    /// Whether this user may see a record belonging to `email` / `customer_id`
    pub fn can_access(&self, email: &str, customer_id: Option<&str>) -> bool {
        self.is_staff()
            || self.email.eq_ignore_ascii_case(email)
            || customer_id == Some(self.id.as_str())
    }
}
