//! redb-based storage layer
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` / `quotes` / `receipts` / `invoices` | entity id | JSON | Entity records |
//! | `number_index` | `{kind}:{number}` | entity id | Lookup by human-readable number |
//! | `invoice_by_order` | order id | invoice id | One invoice per order |
//! | `pending_payments` | `{provider}:{reference}` | JSON `PendingPayment` | Callback correlation |
//! | `processed_callbacks` | `{provider}:{event id}` | unix millis | Callback idempotency |
//! | `sequences` | counter name | `u64` | Document number counters |
//!
//! Every public operation runs in a single redb transaction. redb serializes
//! writers, so read-modify-write inside one write transaction is atomic.
//! Operations suffixed `_txn` take a caller-owned transaction so several
//! entities can be written together.

mod payments;
mod record;

pub use payments::PendingPayment;
pub use record::Record;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub(crate) const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");
pub(crate) const QUOTES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("quotes");
pub(crate) const RECEIPTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("receipts");
pub(crate) const INVOICES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("invoices");

/// `{kind}:{number}` -> entity id
const NUMBER_INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("number_index");

/// order id -> invoice id
const INVOICE_BY_ORDER_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("invoice_by_order");

/// `{provider}:{reference}` -> JSON-serialized PendingPayment
const PENDING_PAYMENTS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("pending_payments");

/// `{provider}:{event id}` -> processed at (unix millis)
const PROCESSED_CALLBACKS_TABLE: TableDefinition<&str, i64> =
    TableDefinition::new("processed_callbacks");

const SEQUENCES_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Named document counters and their first value
pub mod sequence {
    pub const ORDER: (&str, u64) = ("order", 1000);
    pub const INVOICE: (&str, u64) = ("invoice", 1000);
    pub const QUOTE: (&str, u64) = ("quote", 1);
    pub const RECEIPT: (&str, u64) = ("receipt", 1);
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate {kind} id: {id}")]
    Duplicate { kind: &'static str, id: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Embedded store shared by every component
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
}

impl Storage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and tooling)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(QUOTES_TABLE)?;
            let _ = write_txn.open_table(RECEIPTS_TABLE)?;
            let _ = write_txn.open_table(INVOICES_TABLE)?;
            let _ = write_txn.open_table(NUMBER_INDEX_TABLE)?;
            let _ = write_txn.open_table(INVOICE_BY_ORDER_TABLE)?;
            let _ = write_txn.open_table(PENDING_PAYMENTS_TABLE)?;
            let _ = write_txn.open_table(PROCESSED_CALLBACKS_TABLE)?;
            let _ = write_txn.open_table(SEQUENCES_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Sequences ==========

    /// Increment and return the named counter; the first call returns `start`
    pub fn next_sequence_txn(
        &self,
        txn: &WriteTransaction,
        (name, start): (&str, u64),
    ) -> StorageResult<u64> {
        let mut table = txn.open_table(SEQUENCES_TABLE)?;
        let next = match table.get(name)?.map(|guard| guard.value()) {
            Some(current) => current + 1,
            None => start,
        };
        table.insert(name, next)?;
        Ok(next)
    }

    // ========== Generic record operations ==========

    /// Insert a new record; fails on an existing id
    pub fn insert<T: Record>(&self, record: &T) -> StorageResult<()> {
        let txn = self.begin_write()?;
        self.insert_txn(&txn, record)?;
        txn.commit()?;
        Ok(())
    }

    pub fn insert_txn<T: Record>(&self, txn: &WriteTransaction, record: &T) -> StorageResult<()> {
        if self.get_txn::<T>(txn, record.id())?.is_some() {
            return Err(StorageError::Duplicate {
                kind: T::KIND,
                id: record.id().to_string(),
            });
        }
        self.put_txn(txn, record)
    }

    /// Write (insert or overwrite) a record and its number index entry
    pub fn put_txn<T: Record>(&self, txn: &WriteTransaction, record: &T) -> StorageResult<()> {
        let value = serde_json::to_vec(record)?;
        {
            let mut table = txn.open_table(T::TABLE)?;
            table.insert(record.id(), value.as_slice())?;
        }
        let mut index = txn.open_table(NUMBER_INDEX_TABLE)?;
        index.insert(number_key::<T>(record.number()).as_str(), record.id())?;
        Ok(())
    }

    pub fn find_by_id<T: Record>(&self, id: &str) -> StorageResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_txn<T: Record>(&self, txn: &WriteTransaction, id: &str) -> StorageResult<Option<T>> {
        let table = txn.open_table(T::TABLE)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Lookup by order / quote / receipt / invoice number
    pub fn find_by_number<T: Record>(&self, number: &str) -> StorageResult<Option<T>> {
        let id = {
            let read_txn = self.db.begin_read()?;
            let index = read_txn.open_table(NUMBER_INDEX_TABLE)?;
            match index.get(number_key::<T>(number).as_str())? {
                Some(id) => id.value().to_string(),
                None => return Ok(None),
            }
        };
        self.find_by_id(&id)
    }

    /// All records matching `predicate`, in key order
    pub fn find_many<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> StorageResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;
        let mut records = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let record: T = serde_json::from_slice(value.value())?;
            if predicate(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn find_many_txn<T: Record>(
        &self,
        txn: &WriteTransaction,
        predicate: impl Fn(&T) -> bool,
    ) -> StorageResult<Vec<T>> {
        let table = txn.open_table(T::TABLE)?;
        let mut records = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let record: T = serde_json::from_slice(value.value())?;
            if predicate(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Read-modify-write a single record atomically
    ///
    /// Returns `Ok(None)` for an unknown id. When `mutate` fails the
    /// transaction is dropped and nothing is written.
    pub fn update<T, E>(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut T) -> Result<(), E>,
    ) -> Result<Option<T>, E>
    where
        T: Record,
        E: From<StorageError>,
    {
        let txn = self.begin_write()?;
        let Some(mut record) = self.get_txn::<T>(&txn, id)? else {
            return Ok(None);
        };
        mutate(&mut record)?;
        self.put_txn(&txn, &record)?;
        txn.commit().map_err(StorageError::from)?;
        Ok(Some(record))
    }

    /// Physically remove a record. Business entities are never deleted
    /// through the API; this exists for maintenance tooling.
    pub fn delete<T: Record>(&self, id: &str) -> StorageResult<bool> {
        let txn = self.begin_write()?;
        let Some(record) = self.get_txn::<T>(&txn, id)? else {
            return Ok(false);
        };
        {
            let mut table = txn.open_table(T::TABLE)?;
            table.remove(id)?;
        }
        {
            let mut index = txn.open_table(NUMBER_INDEX_TABLE)?;
            index.remove(number_key::<T>(record.number()).as_str())?;
        }
        txn.commit()?;
        Ok(true)
    }

    // ========== Invoice index ==========

    pub fn invoice_id_for_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<String>> {
        let table = txn.open_table(INVOICE_BY_ORDER_TABLE)?;
        Ok(table.get(order_id)?.map(|guard| guard.value().to_string()))
    }

    pub fn invoice_id_for_order(&self, order_id: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(INVOICE_BY_ORDER_TABLE)?;
        Ok(table.get(order_id)?.map(|guard| guard.value().to_string()))
    }

    pub fn link_invoice_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
        invoice_id: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(INVOICE_BY_ORDER_TABLE)?;
        table.insert(order_id, invoice_id)?;
        Ok(())
    }
}

fn number_key<T: Record>(number: &str) -> String {
    format!("{}:{}", T::KIND, number)
}
