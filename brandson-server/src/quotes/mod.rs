//! Quote store: numbering, status lifecycle, conversion to orders and the
//! expiry sweep

use chrono::{DateTime, Utc};
use shared::error::{AppError, ErrorCode};
use shared::models::{
    Lifecycle, Order, Quote, QuoteCreateInput, QuoteFilter, QuoteStatus, sort_quotes,
    validate_quote,
};
use shared::util::{now, year_number};

use crate::db::{Storage, StorageError, sequence};
use crate::error::ServiceResult;
use crate::orders::OrderStore;

pub const QUOTE_NUMBER_PREFIX: &str = "Q";

#[derive(Clone)]
pub struct QuoteStore {
    storage: Storage,
    orders: OrderStore,
}

impl QuoteStore {
    pub fn new(storage: Storage, orders: OrderStore) -> Self {
        Self { storage, orders }
    }

    pub fn create_quote(&self, input: QuoteCreateInput) -> ServiceResult<Quote> {
        let at = now();
        let errors = validate_quote(&input, at);
        if !errors.is_empty() {
            return Err(AppError::validation_list(errors).into());
        }

        let txn = self.storage.begin_write()?;
        let seq = self.storage.next_sequence_txn(&txn, sequence::QUOTE)?;
        let quote = Quote::new(input, year_number(QUOTE_NUMBER_PREFIX, at, seq), at);
        self.storage.insert_txn(&txn, &quote)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            quote_id = %quote.id,
            quote_number = %quote.quote_number,
            total = quote.total,
            "Quote created"
        );
        Ok(quote)
    }

    pub fn get_quote(&self, id: &str) -> ServiceResult<Option<Quote>> {
        Ok(self.storage.find_by_id(id)?)
    }

    pub fn get_quote_by_number(&self, number: &str) -> ServiceResult<Option<Quote>> {
        Ok(self.storage.find_by_number(number)?)
    }

    pub fn get_quotes(&self, filter: &QuoteFilter) -> ServiceResult<Vec<Quote>> {
        let mut quotes = self.storage.find_many(|quote: &Quote| filter.matches(quote))?;
        sort_quotes(&mut quotes);
        Ok(quotes)
    }

    /// `converted` is reachable only through [`QuoteStore::convert_quote_to_order`]
    pub fn update_quote_status(&self, id: &str, status: QuoteStatus) -> ServiceResult<Option<Quote>> {
        if status == QuoteStatus::Converted {
            return Err(AppError::with_message(
                ErrorCode::QuoteNotConvertible,
                "Quotes are converted through the convert operation",
            )
            .into());
        }
        let at = now();
        Ok(self.storage.update(id, |quote: &mut Quote| -> ServiceResult<()> {
            quote.status.check_transition(status)?;
            quote.status = status;
            quote.updated_at = at;
            Ok(())
        })?)
    }

    /// Create an order from an accepted, still valid quote and mark the quote
    /// `converted`, in one transaction. `Ok(None)` for an unknown quote.
    pub fn convert_quote_to_order(&self, quote_id: &str) -> ServiceResult<Option<(Quote, Order)>> {
        let at = now();
        let txn = self.storage.begin_write()?;
        let Some(mut quote) = self.storage.get_txn::<Quote>(&txn, quote_id)? else {
            return Ok(None);
        };

        if quote.status != QuoteStatus::Accepted {
            return Err(AppError::with_message(
                ErrorCode::QuoteNotConvertible,
                format!(
                    "Quote {} is {}, only accepted quotes can be converted",
                    quote.quote_number, quote.status
                ),
            )
            .into());
        }
        if quote.is_expired(at) {
            return Err(AppError::with_message(
                ErrorCode::QuoteExpired,
                format!(
                    "Quote {} expired on {}",
                    quote.quote_number,
                    quote.valid_until.format("%Y-%m-%d")
                ),
            )
            .into());
        }

        let order = self.orders.create_converted_order_txn(&txn, quote.to_order_input(), at)?;
        quote.status.check_transition(QuoteStatus::Converted)?;
        quote.status = QuoteStatus::Converted;
        quote.converted_to_order_id = Some(order.id.clone());
        quote.updated_at = at;
        self.storage.put_txn(&txn, &quote)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            quote_number = %quote.quote_number,
            order_number = %order.order_number,
            "Quote converted to order"
        );
        Ok(Some((quote, order)))
    }

    /// `sent` or `accepted` and not past `validUntil`
    pub fn active_quotes(&self, at: DateTime<Utc>) -> ServiceResult<Vec<Quote>> {
        let mut quotes = self.storage.find_many(|quote: &Quote| quote.is_active(at))?;
        sort_quotes(&mut quotes);
        Ok(quotes)
    }

    /// Expire every non-terminal quote whose validity has passed. Returns the
    /// quotes expired by this run; a second run at the same instant is a no-op.
    pub fn expire_stale_quotes(&self, at: DateTime<Utc>) -> ServiceResult<Vec<Quote>> {
        let txn = self.storage.begin_write()?;
        let mut stale = self.storage.find_many_txn(&txn, |quote: &Quote| quote.is_stale(at))?;
        for quote in &mut stale {
            quote.status.check_transition(QuoteStatus::Expired)?;
            quote.status = QuoteStatus::Expired;
            quote.updated_at = at;
            self.storage.put_txn(&txn, &*quote)?;
        }
        txn.commit().map_err(StorageError::from)?;

        if !stale.is_empty() {
            tracing::info!(count = stale.len(), "Expired stale quotes");
        }
        Ok(stale)
    }
}
