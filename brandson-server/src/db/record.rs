use redb::TableDefinition;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::models::{Invoice, Order, Quote, Receipt};

use super::{INVOICES_TABLE, ORDERS_TABLE, QUOTES_TABLE, RECEIPTS_TABLE};

/// An entity persisted as JSON under its id, with a unique document number
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]>;
    /// Prefix of the number index key
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn number(&self) -> &str;
}

impl Record for Order {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = ORDERS_TABLE;
    const KIND: &'static str = "order";

    fn id(&self) -> &str {
        &self.id
    }

    fn number(&self) -> &str {
        &self.order_number
    }
}

impl Record for Quote {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = QUOTES_TABLE;
    const KIND: &'static str = "quote";

    fn id(&self) -> &str {
        &self.id
    }

    fn number(&self) -> &str {
        &self.quote_number
    }
}

impl Record for Receipt {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = RECEIPTS_TABLE;
    const KIND: &'static str = "receipt";

    fn id(&self) -> &str {
        &self.id
    }

    fn number(&self) -> &str {
        &self.receipt_number
    }
}

impl Record for Invoice {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = INVOICES_TABLE;
    const KIND: &'static str = "invoice";

    fn id(&self) -> &str {
        &self.id
    }

    fn number(&self) -> &str {
        &self.invoice_number
    }
}
