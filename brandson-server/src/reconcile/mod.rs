//! Payment reconciliation
//!
//! Applies normalized provider confirmations to the order, its invoice and
//! its receipt inside a single write transaction keyed by the provider
//! idempotency key. Redelivered callbacks are no-ops.

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    Invoice, Order, OrderMetadata, OrderStatus, OrderUpdate, PaymentMethod, PaymentStatus,
    Receipt, ReceiptStatus,
};
use shared::money;
use shared::util::now;

use crate::db::{PendingPayment, Storage, StorageError};
use crate::error::{ServiceError, ServiceResult};
use crate::invoices::InvoiceStore;
use crate::payments::{PaymentOutcome, RefundOutcome};
use crate::receipts::ReceiptStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileResult {
    /// State written; `receipt` is the created (payment) or refunded (refund) receipt
    Applied {
        order: Order,
        invoice: Option<Invoice>,
        receipt: Option<Receipt>,
    },
    /// Idempotency key seen before
    Duplicate,
    /// Provider reference not linked to any order
    Unmatched,
    /// Outcome conflicts with the order's state; recorded, nothing changed
    Rejected(String),
}

/// Whether `order` can still take a new payment attempt
pub fn ensure_payable(order: &Order) -> Result<(), AppError> {
    if order.payment_status.is_settled() {
        return Err(AppError::with_message(
            ErrorCode::OrderAlreadyPaid,
            format!("Order {} has already been paid", order.order_number),
        ));
    }
    if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Refunded) {
        return Err(AppError::with_message(
            ErrorCode::OrderClosed,
            format!("Order {} is {}", order.order_number, order.status),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct Reconciler {
    storage: Storage,
    invoices: InvoiceStore,
    receipts: ReceiptStore,
}

impl Reconciler {
    pub fn new(storage: Storage, invoices: InvoiceStore, receipts: ReceiptStore) -> Self {
        Self {
            storage,
            invoices,
            receipts,
        }
    }

    /// Link a provider reference to its order and mark the order's payment
    /// `processing`. `Ok(None)` when the order is unknown.
    pub fn register_pending(&self, pending: &PendingPayment) -> ServiceResult<Option<Order>> {
        let txn = self.storage.begin_write()?;
        let Some(mut order) = self.storage.get_txn::<Order>(&txn, &pending.order_id)? else {
            return Ok(None);
        };
        ensure_payable(&order)?;

        let update = OrderUpdate {
            metadata: Some(OrderMetadata {
                provider_reference: Some(pending.reference.clone()),
                ..Default::default()
            }),
            ..OrderUpdate::payment(PaymentStatus::Processing, Some(pending.provider))
        };
        order.apply_update(update, pending.created_at)?;
        self.storage.put_txn(&txn, &order)?;
        self.storage.link_pending_payment_txn(&txn, pending)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            order_number = %order.order_number,
            provider = pending.provider.as_str(),
            reference = %pending.reference,
            "Payment pending confirmation"
        );
        Ok(Some(order))
    }

    /// Apply a payment confirmation or failure
    pub fn apply(&self, outcome: &PaymentOutcome) -> ServiceResult<ReconcileResult> {
        let at = now();
        let txn = self.storage.begin_write()?;
        if self
            .storage
            .is_callback_processed_txn(&txn, outcome.provider, &outcome.idempotency_key)?
        {
            tracing::info!(
                provider = outcome.provider.as_str(),
                key = %outcome.idempotency_key,
                "Duplicate payment callback, skipping"
            );
            return Ok(ReconcileResult::Duplicate);
        }

        let Some(mut order) = self.resolve_order_txn(&txn, outcome.provider, &outcome.reference)?
        else {
            tracing::warn!(
                provider = outcome.provider.as_str(),
                reference = %outcome.reference,
                "Payment callback for unknown reference"
            );
            return Ok(ReconcileResult::Unmatched);
        };

        let applied = if outcome.success {
            self.confirm_txn(&txn, &mut order, outcome, at)
        } else {
            self.fail_txn(&txn, &mut order, at)
        };

        match applied {
            Ok(result) => {
                self.storage.mark_callback_processed_txn(
                    &txn,
                    outcome.provider,
                    &outcome.idempotency_key,
                    at,
                )?;
                txn.commit().map_err(StorageError::from)?;
                tracing::info!(
                    order_number = %order.order_number,
                    provider = outcome.provider.as_str(),
                    success = outcome.success,
                    payment_status = %order.payment_status,
                    "Payment reconciled"
                );
                Ok(result)
            }
            Err(ServiceError::App(err))
                if matches!(
                    err.code,
                    ErrorCode::InvalidStatusTransition | ErrorCode::PaymentAmountMismatch
                ) =>
            {
                drop(txn);
                self.reject(outcome.provider, &outcome.idempotency_key, &order, err, at)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a provider refund notification (cumulative amount)
    pub fn apply_refund(&self, outcome: &RefundOutcome) -> ServiceResult<ReconcileResult> {
        let at = now();
        let txn = self.storage.begin_write()?;
        if self
            .storage
            .is_callback_processed_txn(&txn, outcome.provider, &outcome.idempotency_key)?
        {
            return Ok(ReconcileResult::Duplicate);
        }
        let Some(mut order) = self.resolve_order_txn(&txn, outcome.provider, &outcome.reference)?
        else {
            tracing::warn!(
                provider = outcome.provider.as_str(),
                reference = %outcome.reference,
                "Refund for unknown payment"
            );
            return Ok(ReconcileResult::Unmatched);
        };

        match self.refund_txn(&txn, &mut order, outcome, at) {
            Ok(result) => {
                self.storage.mark_callback_processed_txn(
                    &txn,
                    outcome.provider,
                    &outcome.idempotency_key,
                    at,
                )?;
                txn.commit().map_err(StorageError::from)?;
                tracing::info!(
                    order_number = %order.order_number,
                    amount = outcome.amount_refunded,
                    full = outcome.full,
                    "Refund reconciled"
                );
                Ok(result)
            }
            Err(ServiceError::App(err))
                if matches!(
                    err.code,
                    ErrorCode::InvalidStatusTransition | ErrorCode::RefundAmountInvalid
                ) =>
            {
                drop(txn);
                self.reject(outcome.provider, &outcome.idempotency_key, &order, err, at)
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_order_txn(
        &self,
        txn: &WriteTransaction,
        provider: PaymentMethod,
        reference: &str,
    ) -> ServiceResult<Option<Order>> {
        let Some(pending) = self.storage.pending_payment_txn(txn, provider, reference)? else {
            return Ok(None);
        };
        Ok(self.storage.get_txn::<Order>(txn, &pending.order_id)?)
    }

    fn confirm_txn(
        &self,
        txn: &WriteTransaction,
        order: &mut Order,
        outcome: &PaymentOutcome,
        at: DateTime<Utc>,
    ) -> ServiceResult<ReconcileResult> {
        if order.payment_status.is_settled() {
            return Ok(ReconcileResult::Rejected(format!(
                "Order {} is already {}",
                order.order_number, order.payment_status
            )));
        }
        if let Some(amount) = outcome.amount
            && !money::money_eq(amount, order.total)
        {
            if money::to_decimal(amount) < money::to_decimal(order.total) {
                return Err(AppError::with_message(
                    ErrorCode::PaymentAmountMismatch,
                    format!(
                        "Received {amount:.2} for order {} totalling {:.2}",
                        order.order_number, order.total
                    ),
                )
                .into());
            }
            tracing::warn!(
                order_number = %order.order_number,
                paid = amount,
                total = order.total,
                "Paid amount exceeds order total"
            );
        }

        let transaction_id = outcome
            .transaction_id
            .clone()
            .unwrap_or_else(|| outcome.reference.clone());
        let mut update = OrderUpdate::payment(PaymentStatus::Paid, Some(outcome.provider));
        if order.status == OrderStatus::Pending {
            update.status = Some(OrderStatus::Confirmed);
        }
        update.metadata = Some(OrderMetadata {
            payment_reference: Some(transaction_id.clone()),
            provider_reference: Some(outcome.reference.clone()),
            payment_intent_id: outcome.payment_intent_id.clone(),
            ..Default::default()
        });
        order.apply_update(update, at)?;
        self.storage.put_txn(txn, &*order)?;

        let invoice = self.invoices.record_payment_txn(txn, order, at)?;
        let number = self.receipts.next_receipt_number_txn(txn, at)?;
        let receipt = Receipt::for_payment(order, number, transaction_id, at);
        self.storage.insert_txn(txn, &receipt)?;

        // Refund events only carry the payment intent
        if let Some(payment_intent) = &outcome.payment_intent_id {
            self.storage.link_pending_payment_txn(
                txn,
                &PendingPayment {
                    provider: outcome.provider,
                    reference: payment_intent.clone(),
                    order_id: order.id.clone(),
                    amount: order.total,
                    currency: order.currency.clone(),
                    created_at: at,
                },
            )?;
        }

        Ok(ReconcileResult::Applied {
            order: order.clone(),
            invoice: Some(invoice),
            receipt: Some(receipt),
        })
    }

    fn fail_txn(
        &self,
        txn: &WriteTransaction,
        order: &mut Order,
        at: DateTime<Utc>,
    ) -> ServiceResult<ReconcileResult> {
        order.apply_update(OrderUpdate::payment(PaymentStatus::Failed, None), at)?;
        self.storage.put_txn(txn, &*order)?;
        Ok(ReconcileResult::Applied {
            order: order.clone(),
            invoice: None,
            receipt: None,
        })
    }

    fn refund_txn(
        &self,
        txn: &WriteTransaction,
        order: &mut Order,
        outcome: &RefundOutcome,
        at: DateTime<Utc>,
    ) -> ServiceResult<ReconcileResult> {
        let status = if outcome.full {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        order.apply_update(OrderUpdate::payment(status, None), at)?;
        self.storage.put_txn(txn, &*order)?;

        let invoice = if outcome.full {
            self.invoices.record_refund_txn(txn, &order.id)?
        } else {
            None
        };

        // Earlier partial refunds already moved the receipt to `refunded`
        let order_id = order.id.clone();
        let mut paid = self.storage.find_many_txn(txn, |receipt: &Receipt| {
            receipt.order_id == order_id
                && matches!(receipt.status, ReceiptStatus::Completed | ReceiptStatus::Refunded)
        })?;
        paid.sort_by_key(|receipt| receipt.created_at);
        let receipt = match paid.into_iter().next() {
            Some(mut receipt) => {
                let amount = if outcome.full {
                    receipt.total
                } else {
                    outcome.amount_refunded
                };
                if receipt.record_cumulative_refund(amount, outcome.reason.as_str(), at)? {
                    self.storage.put_txn(txn, &receipt)?;
                }
                Some(receipt)
            }
            None => None,
        };

        Ok(ReconcileResult::Applied {
            order: order.clone(),
            invoice,
            receipt,
        })
    }

    /// Record the key so redelivery stays a no-op, leaving the order as is
    fn reject(
        &self,
        provider: PaymentMethod,
        key: &str,
        order: &Order,
        err: AppError,
        at: DateTime<Utc>,
    ) -> ServiceResult<ReconcileResult> {
        tracing::warn!(
            order_number = %order.order_number,
            provider = provider.as_str(),
            key,
            error = %err.message,
            "Payment callback rejected"
        );
        let txn = self.storage.begin_write()?;
        self.storage.mark_callback_processed_txn(&txn, provider, key, at)?;
        txn.commit().map_err(StorageError::from)?;
        Ok(ReconcileResult::Rejected(err.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderStore;
    use shared::models::{
        CompanyInfo, InvoiceFilter, InvoiceStatus, LineItemInput, OrderCreateInput, ReceiptFilter,
    };

    struct Fixture {
        orders: OrderStore,
        invoices: InvoiceStore,
        receipts: ReceiptStore,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let storage = Storage::open_in_memory().unwrap();
        let invoices = InvoiceStore::new(storage.clone(), CompanyInfo::default());
        let receipts = ReceiptStore::new(storage.clone());
        Fixture {
            orders: OrderStore::new(storage.clone()),
            reconciler: Reconciler::new(storage, invoices.clone(), receipts.clone()),
            invoices,
            receipts,
        }
    }

    fn pending_order(f: &Fixture, provider: PaymentMethod, reference: &str) -> Order {
        let order = f
            .orders
            .create_order(OrderCreateInput {
                customer_email: "john@example.com".into(),
                customer_name: "John Doe".into(),
                customer_phone: "0712345678".into(),
                items: vec![LineItemInput::new("Business Cards", 500, 10.0)],
                ..Default::default()
            })
            .unwrap();
        f.reconciler
            .register_pending(&PendingPayment {
                provider,
                reference: reference.into(),
                order_id: order.id.clone(),
                amount: order.total,
                currency: order.currency.clone(),
                created_at: now(),
            })
            .unwrap()
            .unwrap()
    }

    fn mpesa_outcome(reference: &str, success: bool) -> PaymentOutcome {
        PaymentOutcome {
            provider: PaymentMethod::Mpesa,
            idempotency_key: reference.into(),
            reference: reference.into(),
            success,
            transaction_id: success.then(|| "QFT12ABC34".to_string()),
            payment_intent_id: None,
            amount: Some(5000.0),
            description: "The service request is processed successfully.".into(),
        }
    }

    #[test]
    fn test_register_pending_marks_processing() {
        let f = fixture();
        let order = pending_order(&f, PaymentMethod::Mpesa, "ws_CO_1");
        assert_eq!(order.payment_status, PaymentStatus::Processing);
        assert_eq!(order.payment_method, PaymentMethod::Mpesa);
        assert_eq!(order.metadata.provider_reference.as_deref(), Some("ws_CO_1"));
    }

    #[test]
    fn test_successful_payment_creates_one_invoice_and_receipt() {
        let f = fixture();
        let order = pending_order(&f, PaymentMethod::Mpesa, "ws_CO_1");

        let ReconcileResult::Applied { order: paid, invoice, receipt } =
            f.reconciler.apply(&mpesa_outcome("ws_CO_1", true)).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.status, OrderStatus::Confirmed);
        assert_eq!(paid.metadata.payment_reference.as_deref(), Some("QFT12ABC34"));
        assert_eq!(invoice.unwrap().status, InvoiceStatus::Paid);
        let receipt = receipt.unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Completed);
        assert_eq!(receipt.transaction_id, "QFT12ABC34");
        assert_eq!(receipt.total, order.total);

        assert_eq!(
            f.reconciler.apply(&mpesa_outcome("ws_CO_1", true)).unwrap(),
            ReconcileResult::Duplicate
        );
        assert_eq!(f.invoices.get_invoices(&InvoiceFilter::default()).unwrap().len(), 1);
        assert_eq!(f.receipts.get_receipts(&ReceiptFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_existing_invoice_is_marked_paid() {
        let f = fixture();
        let order = pending_order(&f, PaymentMethod::Mpesa, "ws_CO_1");
        let invoice = f.invoices.create_invoice_from_order(&order).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);

        f.reconciler.apply(&mpesa_outcome("ws_CO_1", true)).unwrap();
        let invoice = f.invoices.get_invoice(&invoice.id).unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.payment_method, Some(PaymentMethod::Mpesa));
        assert_eq!(invoice.payment_reference.as_deref(), Some("QFT12ABC34"));
    }

    #[test]
    fn test_failed_payment_and_retry() {
        let f = fixture();
        let order = pending_order(&f, PaymentMethod::Mpesa, "ws_CO_1");
        f.reconciler.apply(&mpesa_outcome("ws_CO_1", false)).unwrap();
        let failed = f.orders.get_order(&order.id).unwrap().unwrap();
        assert_eq!(failed.payment_status, PaymentStatus::Failed);
        assert_eq!(failed.status, OrderStatus::Pending);
        assert!(f.receipts.receipts_for_order(&order.id).unwrap().is_empty());

        f.reconciler
            .register_pending(&PendingPayment {
                provider: PaymentMethod::Mpesa,
                reference: "ws_CO_2".into(),
                order_id: order.id.clone(),
                amount: order.total,
                currency: order.currency.clone(),
                created_at: now(),
            })
            .unwrap();
        f.reconciler.apply(&mpesa_outcome("ws_CO_2", true)).unwrap();
        let paid = f.orders.get_order(&order.id).unwrap().unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_unmatched_reference_writes_nothing() {
        let f = fixture();
        assert_eq!(
            f.reconciler.apply(&mpesa_outcome("ws_CO_unknown", true)).unwrap(),
            ReconcileResult::Unmatched
        );
        assert!(f.receipts.get_receipts(&ReceiptFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_failure_after_payment_is_rejected() {
        let f = fixture();
        let order = pending_order(&f, PaymentMethod::Mpesa, "ws_CO_1");
        f.reconciler.apply(&mpesa_outcome("ws_CO_1", true)).unwrap();

        let late_failure = PaymentOutcome {
            idempotency_key: "late-1".into(),
            ..mpesa_outcome("ws_CO_1", false)
        };
        assert!(matches!(
            f.reconciler.apply(&late_failure).unwrap(),
            ReconcileResult::Rejected(_)
        ));
        assert_eq!(
            f.orders.get_order(&order.id).unwrap().unwrap().payment_status,
            PaymentStatus::Paid
        );
        assert_eq!(f.reconciler.apply(&late_failure).unwrap(), ReconcileResult::Duplicate);
    }

    #[test]
    fn test_paid_order_not_payable() {
        let f = fixture();
        let order = pending_order(&f, PaymentMethod::Mpesa, "ws_CO_1");
        f.reconciler.apply(&mpesa_outcome("ws_CO_1", true)).unwrap();
        let paid = f.orders.get_order(&order.id).unwrap().unwrap();
        assert_eq!(ensure_payable(&paid).unwrap_err().code, ErrorCode::OrderAlreadyPaid);
    }

    #[test]
    fn test_stripe_refunds() {
        let f = fixture();
        let order = pending_order(&f, PaymentMethod::Stripe, "cs_test_1");
        f.reconciler
            .apply(&PaymentOutcome {
                provider: PaymentMethod::Stripe,
                idempotency_key: "evt_1".into(),
                reference: "cs_test_1".into(),
                success: true,
                transaction_id: Some("pi_1".into()),
                payment_intent_id: Some("pi_1".into()),
                amount: Some(order.total),
                description: "checkout.session.completed".into(),
            })
            .unwrap();

        let partial = RefundOutcome {
            provider: PaymentMethod::Stripe,
            idempotency_key: "evt_2".into(),
            reference: "pi_1".into(),
            amount_refunded: 1000.0,
            full: false,
            reason: "Misprint".into(),
        };
        let ReconcileResult::Applied { order: refunded, invoice, receipt } =
            f.reconciler.apply_refund(&partial).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(refunded.payment_status, PaymentStatus::PartiallyRefunded);
        assert!(invoice.is_none());
        assert_eq!(receipt.unwrap().refund_amount, Some(1000.0));
        assert_eq!(f.reconciler.apply_refund(&partial).unwrap(), ReconcileResult::Duplicate);

        let second = RefundOutcome {
            idempotency_key: "evt_3".into(),
            amount_refunded: 2500.0,
            ..partial.clone()
        };
        let ReconcileResult::Applied { receipt, .. } = f.reconciler.apply_refund(&second).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(receipt.unwrap().refund_amount, Some(2500.0));

        let full = RefundOutcome {
            idempotency_key: "evt_4".into(),
            amount_refunded: order.total,
            full: true,
            ..partial
        };
        let ReconcileResult::Applied { order: refunded, invoice, .. } =
            f.reconciler.apply_refund(&full).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
        assert_eq!(invoice.unwrap().status, InvoiceStatus::Refunded);

        let receipts = f.receipts.receipts_for_order(&order.id).unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].status, ReceiptStatus::Refunded);
        assert_eq!(receipts[0].refund_amount, Some(order.total));
        let stats = f.receipts.get_receipt_stats(&ReceiptFilter::default()).unwrap();
        assert_eq!(stats.total_refunded, order.total);
    }

    #[test]
    fn test_underpayment_is_rejected() {
        let f = fixture();
        let order = pending_order(&f, PaymentMethod::Mpesa, "ws_CO_1");
        let short = PaymentOutcome {
            amount: Some(1.0),
            ..mpesa_outcome("ws_CO_1", true)
        };
        assert!(matches!(
            f.reconciler.apply(&short).unwrap(),
            ReconcileResult::Rejected(_)
        ));
        let unpaid = f.orders.get_order(&order.id).unwrap().unwrap();
        assert_eq!(unpaid.payment_status, PaymentStatus::Processing);
        assert!(f.receipts.receipts_for_order(&order.id).unwrap().is_empty());
        assert!(f.invoices.get_invoice_by_order_id(&order.id).unwrap().is_none());
        assert!(ensure_payable(&unpaid).is_ok());
    }

    #[test]
    fn test_overpayment_is_applied() {
        let f = fixture();
        pending_order(&f, PaymentMethod::Mpesa, "ws_CO_1");
        let over = PaymentOutcome {
            amount: Some(5001.0),
            ..mpesa_outcome("ws_CO_1", true)
        };
        let ReconcileResult::Applied { order, .. } = f.reconciler.apply(&over).unwrap() else {
            panic!("expected applied");
        };
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_payment_settles_order_with_cancelled_invoice() {
        let f = fixture();
        let order = pending_order(&f, PaymentMethod::Mpesa, "ws_CO_1");
        let invoice = f.invoices.create_invoice_from_order(&order).unwrap();
        f.invoices
            .update_invoice_status(&invoice.id, InvoiceStatus::Cancelled)
            .unwrap()
            .unwrap();

        let ReconcileResult::Applied { order: paid, invoice: reopened, receipt } =
            f.reconciler.apply(&mpesa_outcome("ws_CO_1", true)).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        let reopened = reopened.unwrap();
        assert_eq!(reopened.id, invoice.id);
        assert_eq!(reopened.status, InvoiceStatus::Paid);
        assert_eq!(receipt.unwrap().status, ReceiptStatus::Completed);
    }
}
