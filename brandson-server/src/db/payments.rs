//! Payment correlation tables: pending payments and processed callbacks

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use shared::models::PaymentMethod;

use super::{PENDING_PAYMENTS_TABLE, PROCESSED_CALLBACKS_TABLE, Storage, StorageResult};

/// A payment initiated with a provider and awaiting its callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    pub provider: PaymentMethod,
    /// CheckoutRequestID (M-Pesa), checkout session or payment intent id (Stripe)
    pub reference: String,
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

fn pending_key(provider: PaymentMethod, reference: &str) -> String {
    format!("{}:{}", provider.as_str(), reference)
}

impl Storage {
    pub fn link_pending_payment(&self, pending: &PendingPayment) -> StorageResult<()> {
        let txn = self.begin_write()?;
        self.link_pending_payment_txn(&txn, pending)?;
        txn.commit()?;
        Ok(())
    }

    pub fn link_pending_payment_txn(
        &self,
        txn: &WriteTransaction,
        pending: &PendingPayment,
    ) -> StorageResult<()> {
        let value = serde_json::to_vec(pending)?;
        let mut table = txn.open_table(PENDING_PAYMENTS_TABLE)?;
        table.insert(
            pending_key(pending.provider, &pending.reference).as_str(),
            value.as_slice(),
        )?;
        Ok(())
    }

    pub fn pending_payment(
        &self,
        provider: PaymentMethod,
        reference: &str,
    ) -> StorageResult<Option<PendingPayment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_PAYMENTS_TABLE)?;
        match table.get(pending_key(provider, reference).as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn pending_payment_txn(
        &self,
        txn: &WriteTransaction,
        provider: PaymentMethod,
        reference: &str,
    ) -> StorageResult<Option<PendingPayment>> {
        let table = txn.open_table(PENDING_PAYMENTS_TABLE)?;
        match table.get(pending_key(provider, reference).as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Whether a provider callback with this idempotency key was already applied
    pub fn is_callback_processed_txn(
        &self,
        txn: &WriteTransaction,
        provider: PaymentMethod,
        key: &str,
    ) -> StorageResult<bool> {
        let table = txn.open_table(PROCESSED_CALLBACKS_TABLE)?;
        Ok(table.get(pending_key(provider, key).as_str())?.is_some())
    }

    pub fn mark_callback_processed_txn(
        &self,
        txn: &WriteTransaction,
        provider: PaymentMethod,
        key: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(PROCESSED_CALLBACKS_TABLE)?;
        table.insert(pending_key(provider, key).as_str(), at.timestamp_millis())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(reference: &str) -> PendingPayment {
        PendingPayment {
            provider: PaymentMethod::Mpesa,
            reference: reference.into(),
            order_id: "order-1".into(),
            amount: 1500.0,
            currency: "kes".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pending_payment_roundtrip_is_provider_scoped() {
        let storage = Storage::open_in_memory().unwrap();
        storage.link_pending_payment(&pending("ws_CO_123")).unwrap();

        let found = storage
            .pending_payment(PaymentMethod::Mpesa, "ws_CO_123")
            .unwrap()
            .unwrap();
        assert_eq!(found.order_id, "order-1");
        assert!(storage
            .pending_payment(PaymentMethod::Stripe, "ws_CO_123")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_processed_callbacks() {
        let storage = Storage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        assert!(!storage
            .is_callback_processed_txn(&txn, PaymentMethod::Stripe, "evt_1")
            .unwrap());
        storage
            .mark_callback_processed_txn(&txn, PaymentMethod::Stripe, "evt_1", Utc::now())
            .unwrap();
        txn.commit().unwrap();

        let txn = storage.begin_write().unwrap();
        assert!(storage
            .is_callback_processed_txn(&txn, PaymentMethod::Stripe, "evt_1")
            .unwrap());
        assert!(!storage
            .is_callback_processed_txn(&txn, PaymentMethod::Mpesa, "evt_1")
            .unwrap());
    }
}
