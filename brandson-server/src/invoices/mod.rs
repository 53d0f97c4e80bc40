//! Invoice store
//!
//! Invoices are projections of orders: at most one per order, tracked by the
//! `invoice_by_order` index. Creation is idempotent per order.

mod render;

pub use render::render_html;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use shared::models::{
    CompanyInfo, Invoice, InvoiceFilter, InvoiceStats, InvoiceStatus, Lifecycle, Order,
    sort_invoices,
};
use shared::util::{day_number, now};

use crate::db::{Storage, StorageError, sequence};
use crate::error::ServiceResult;

pub const INVOICE_NUMBER_PREFIX: &str = "INV";

#[derive(Clone)]
pub struct InvoiceStore {
    storage: Storage,
    company: Arc<CompanyInfo>,
}

impl InvoiceStore {
    pub fn new(storage: Storage, company: CompanyInfo) -> Self {
        Self {
            storage,
            company: Arc::new(company),
        }
    }

    pub fn company(&self) -> &CompanyInfo {
        &self.company
    }

    /// Invoice for `order`, creating it when the order has none yet
    pub fn create_invoice_from_order(&self, order: &Order) -> ServiceResult<Invoice> {
        let txn = self.storage.begin_write()?;
        let (invoice, created) = self.create_invoice_from_order_txn(&txn, order, now())?;
        txn.commit().map_err(StorageError::from)?;
        if created {
            tracing::info!(
                invoice_number = %invoice.invoice_number,
                order_number = %order.order_number,
                status = %invoice.status,
                "Invoice created"
            );
        }
        Ok(invoice)
    }

    /// Returns the invoice and whether it was created by this call
    pub fn create_invoice_from_order_txn(
        &self,
        txn: &WriteTransaction,
        order: &Order,
        at: DateTime<Utc>,
    ) -> ServiceResult<(Invoice, bool)> {
        if let Some(existing_id) = self.storage.invoice_id_for_order_txn(txn, &order.id)?
            && let Some(existing) = self.storage.get_txn::<Invoice>(txn, &existing_id)?
        {
            return Ok((existing, false));
        }

        let seq = self.storage.next_sequence_txn(txn, sequence::INVOICE)?;
        let invoice = Invoice::from_order(
            order,
            day_number(INVOICE_NUMBER_PREFIX, at, seq),
            at,
            &self.company,
        );
        self.storage.insert_txn(txn, &invoice)?;
        self.storage.link_invoice_txn(txn, &order.id, &invoice.id)?;
        Ok((invoice, true))
    }

    /// Bring the order's invoice in line with a confirmed payment: create it
    /// (already `paid`) or move the existing one to `paid`. The payment is
    /// authoritative, so a cancelled invoice is reopened as paid.
    pub fn record_payment_txn(
        &self,
        txn: &WriteTransaction,
        order: &Order,
        at: DateTime<Utc>,
    ) -> ServiceResult<Invoice> {
        let (mut invoice, created) = self.create_invoice_from_order_txn(txn, order, at)?;
        if !created {
            if !invoice.status.allows(InvoiceStatus::Paid) {
                tracing::warn!(
                    invoice_number = %invoice.invoice_number,
                    order_number = %order.order_number,
                    status = %invoice.status,
                    "Invoice reopened by confirmed payment"
                );
            }
            invoice.status = InvoiceStatus::Paid;
            invoice.payment_method = Some(order.payment_method);
            invoice.payment_reference = order.metadata.payment_reference.clone();
            self.storage.put_txn(txn, &invoice)?;
        }
        Ok(invoice)
    }

    /// Mark the order's invoice `refunded`, if it has a paid one
    pub fn record_refund_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> ServiceResult<Option<Invoice>> {
        let Some(invoice_id) = self.storage.invoice_id_for_order_txn(txn, order_id)? else {
            return Ok(None);
        };
        let Some(mut invoice) = self.storage.get_txn::<Invoice>(txn, &invoice_id)? else {
            return Ok(None);
        };
        invoice.status.check_transition(InvoiceStatus::Refunded)?;
        invoice.status = InvoiceStatus::Refunded;
        self.storage.put_txn(txn, &invoice)?;
        Ok(Some(invoice))
    }

    pub fn get_invoice(&self, id: &str) -> ServiceResult<Option<Invoice>> {
        Ok(self.storage.find_by_id(id)?)
    }

    pub fn get_invoice_by_number(&self, number: &str) -> ServiceResult<Option<Invoice>> {
        Ok(self.storage.find_by_number(number)?)
    }

    pub fn get_invoice_by_order_id(&self, order_id: &str) -> ServiceResult<Option<Invoice>> {
        match self.storage.invoice_id_for_order(order_id)? {
            Some(id) => self.get_invoice(&id),
            None => Ok(None),
        }
    }

    pub fn update_invoice_status(
        &self,
        id: &str,
        status: InvoiceStatus,
    ) -> ServiceResult<Option<Invoice>> {
        Ok(self
            .storage
            .update(id, |invoice: &mut Invoice| -> ServiceResult<()> {
                invoice.status.check_transition(status)?;
                invoice.status = status;
                Ok(())
            })?)
    }

    /// Filtered listing, newest issue date first
    pub fn get_invoices(&self, filter: &InvoiceFilter) -> ServiceResult<Vec<Invoice>> {
        let mut invoices = self
            .storage
            .find_many(|invoice: &Invoice| filter.matches(invoice))?;
        sort_invoices(&mut invoices);
        Ok(invoices)
    }

    pub fn get_invoice_stats(&self, filter: &InvoiceFilter) -> ServiceResult<InvoiceStats> {
        let invoices = self.get_invoices(filter)?;
        Ok(InvoiceStats::from_invoices(&invoices))
    }
}
