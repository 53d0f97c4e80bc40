//! Order store
//!
//! Owns order numbering, validation, partial updates and listing. Every
//! operation is one storage transaction; status changes go through the
//! transition tables in [`shared::models::Lifecycle`].

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use shared::error::AppError;
use shared::models::{
    Order, OrderCreateInput, OrderFilter, OrderStats, OrderStatus, OrderUpdate, PaymentMethod,
    PaymentStatus, sort_orders, validate_converted_order, validate_order,
};
use shared::util::{day_number, now};

use crate::db::{Storage, StorageError, sequence};
use crate::error::ServiceResult;

pub const ORDER_NUMBER_PREFIX: &str = "BRD";

#[derive(Clone)]
pub struct OrderStore {
    storage: Storage,
}

impl OrderStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Validate and persist a new `pending`/`pending` order
    pub fn create_order(&self, input: OrderCreateInput) -> ServiceResult<Order> {
        let txn = self.storage.begin_write()?;
        let order = self.create_order_txn(&txn, input, now())?;
        txn.commit().map_err(StorageError::from)?;
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = order.total,
            "Order created"
        );
        Ok(order)
    }

    pub fn create_order_txn(
        &self,
        txn: &WriteTransaction,
        input: OrderCreateInput,
        now: DateTime<Utc>,
    ) -> ServiceResult<Order> {
        let errors = validate_order(&input);
        self.insert_order_txn(txn, input, errors, now)
    }

    /// Order from an accepted quote; the phone is optional there
    pub fn create_converted_order_txn(
        &self,
        txn: &WriteTransaction,
        input: OrderCreateInput,
        now: DateTime<Utc>,
    ) -> ServiceResult<Order> {
        let errors = validate_converted_order(&input);
        self.insert_order_txn(txn, input, errors, now)
    }

    fn insert_order_txn(
        &self,
        txn: &WriteTransaction,
        input: OrderCreateInput,
        errors: Vec<String>,
        now: DateTime<Utc>,
    ) -> ServiceResult<Order> {
        if !errors.is_empty() {
            return Err(AppError::validation_list(errors).into());
        }
        let seq = self.storage.next_sequence_txn(txn, sequence::ORDER)?;
        let order = Order::new(input, day_number(ORDER_NUMBER_PREFIX, now, seq), now);
        self.storage.insert_txn(txn, &order)?;
        Ok(order)
    }

    pub fn get_order(&self, id: &str) -> ServiceResult<Option<Order>> {
        Ok(self.storage.find_by_id(id)?)
    }

    pub fn get_order_by_number(&self, number: &str) -> ServiceResult<Option<Order>> {
        Ok(self.storage.find_by_number(number)?)
    }

    /// Merge a partial update; `Ok(None)` when the id is unknown
    pub fn update_order(&self, id: &str, update: OrderUpdate) -> ServiceResult<Option<Order>> {
        let at = now();
        let updated = self
            .storage
            .update(id, |order: &mut Order| -> ServiceResult<()> {
                order.apply_update(update, at)?;
                Ok(())
            })?;
        if let Some(order) = &updated {
            tracing::debug!(
                order_id = %order.id,
                status = %order.status,
                payment_status = %order.payment_status,
                "Order updated"
            );
        }
        Ok(updated)
    }

    pub fn update_order_status(&self, id: &str, status: OrderStatus) -> ServiceResult<Option<Order>> {
        self.update_order(id, OrderUpdate::status(status))
    }

    pub fn update_payment_status(
        &self,
        id: &str,
        status: PaymentStatus,
        method: Option<PaymentMethod>,
    ) -> ServiceResult<Option<Order>> {
        self.update_order(id, OrderUpdate::payment(status, method))
    }

    /// Filtered listing, newest first
    pub fn get_orders(&self, filter: &OrderFilter) -> ServiceResult<Vec<Order>> {
        let mut orders = self.storage.find_many(|order: &Order| filter.matches(order))?;
        sort_orders(&mut orders);
        Ok(orders)
    }

    pub fn customer_orders(&self, email: &str) -> ServiceResult<Vec<Order>> {
        self.get_orders(&OrderFilter::for_customer_email(email))
    }

    /// Soft delete: the order moves to `cancelled`. Returns whether it existed.
    pub fn delete_order(&self, id: &str) -> ServiceResult<bool> {
        let found = self.update_order_status(id, OrderStatus::Cancelled)?.is_some();
        if found {
            tracing::info!(order_id = %id, "Order cancelled");
        }
        Ok(found)
    }

    pub fn get_order_stats(&self, filter: &OrderFilter) -> ServiceResult<OrderStats> {
        let orders = self.get_orders(filter)?;
        Ok(OrderStats::from_orders(&orders))
    }
}
