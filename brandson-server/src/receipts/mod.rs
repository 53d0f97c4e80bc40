//! Receipt store

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use shared::error::AppError;
use shared::models::{
    Lifecycle, Receipt, ReceiptCreateInput, ReceiptFilter, ReceiptStats, ReceiptStatus,
    sort_receipts, validate_receipt,
};
use shared::util::{now, year_number};

use crate::db::{Storage, StorageError, StorageResult, sequence};
use crate::error::ServiceResult;

pub const RECEIPT_NUMBER_PREFIX: &str = "R";

#[derive(Clone)]
pub struct ReceiptStore {
    storage: Storage,
}

impl ReceiptStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn next_receipt_number_txn(
        &self,
        txn: &WriteTransaction,
        at: DateTime<Utc>,
    ) -> StorageResult<String> {
        let seq = self.storage.next_sequence_txn(txn, sequence::RECEIPT)?;
        Ok(year_number(RECEIPT_NUMBER_PREFIX, at, seq))
    }

    pub fn create_receipt(&self, input: ReceiptCreateInput) -> ServiceResult<Receipt> {
        let errors = validate_receipt(&input);
        if !errors.is_empty() {
            return Err(AppError::validation_list(errors).into());
        }
        let at = now();
        let txn = self.storage.begin_write()?;
        let number = self.next_receipt_number_txn(&txn, at)?;
        let receipt = Receipt::new(input, number, at);
        self.storage.insert_txn(&txn, &receipt)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            receipt_number = %receipt.receipt_number,
            order_id = %receipt.order_id,
            total = receipt.total,
            "Receipt created"
        );
        Ok(receipt)
    }

    pub fn get_receipt(&self, id: &str) -> ServiceResult<Option<Receipt>> {
        Ok(self.storage.find_by_id(id)?)
    }

    pub fn get_receipt_by_number(&self, number: &str) -> ServiceResult<Option<Receipt>> {
        Ok(self.storage.find_by_number(number)?)
    }

    pub fn receipts_for_order(&self, order_id: &str) -> ServiceResult<Vec<Receipt>> {
        self.get_receipts(&ReceiptFilter {
            order_id: Some(order_id.to_string()),
            ..Default::default()
        })
    }

    pub fn get_receipts(&self, filter: &ReceiptFilter) -> ServiceResult<Vec<Receipt>> {
        let mut receipts = self
            .storage
            .find_many(|receipt: &Receipt| filter.matches(receipt))?;
        sort_receipts(&mut receipts);
        Ok(receipts)
    }

    pub fn update_receipt_status(
        &self,
        id: &str,
        status: ReceiptStatus,
    ) -> ServiceResult<Option<Receipt>> {
        let at = now();
        Ok(self
            .storage
            .update(id, |receipt: &mut Receipt| -> ServiceResult<()> {
                receipt.status.check_transition(status)?;
                receipt.status = status;
                receipt.updated_at = at;
                Ok(())
            })?)
    }

    /// Refund a completed receipt; `0 < amount <= total`
    pub fn process_refund(
        &self,
        id: &str,
        amount: f64,
        reason: &str,
    ) -> ServiceResult<Option<Receipt>> {
        let at = now();
        let refunded = self
            .storage
            .update(id, |receipt: &mut Receipt| -> ServiceResult<()> {
                receipt.refund(amount, reason, at)?;
                Ok(())
            })?;
        if let Some(receipt) = &refunded {
            tracing::info!(
                receipt_number = %receipt.receipt_number,
                amount,
                reason,
                "Receipt refunded"
            );
        }
        Ok(refunded)
    }

    pub fn get_receipt_stats(&self, filter: &ReceiptFilter) -> ServiceResult<ReceiptStats> {
        let receipts = self.get_receipts(filter)?;
        Ok(ReceiptStats::from_receipts(&receipts))
    }
}
