use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use glampstock_core::ProductId;
use glampstock_inventory::{
    InventoryTransaction, LedgerQuery, MovementSum, NewInventoryTransaction, TransactionView,
};

/// Transaction store operation error.
///
/// These are **infrastructure errors** (storage, concurrency control) as opposed to
/// ledger errors (invalid quantity, insufficient stock).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend aborted the unit of work because of a concurrent writer
    /// (serialization failure, deadlock). Safe to retry from the top.
    #[error("concurrent write conflict: {0}")]
    Conflict(String),

    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("failed to decode stored row: {0}")]
    Decode(String),
}

/// Append-only store of inventory movement records.
///
/// ## Write path
///
/// Records are only ever created through a [`UnitOfWork`] opened by [`begin`].
/// A unit of work holds an **exclusive lock on the product's movement set** from
/// the moment `begin` returns until it is committed, rolled back or dropped. Two
/// units of work for the same product therefore never overlap, so a stock check
/// made inside a unit is still valid when its insert commits.
///
/// ## Read path
///
/// `sum_by_type`, `count` and `fetch_page` read committed data and never take the
/// write lock.
///
/// [`begin`]: TransactionStore::begin
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Open an atomic unit of work scoped to one product's movement set.
    async fn begin(&self, product_id: ProductId) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Grouped sum of `quantity` per `(product, movement type)`, restricted to `product_ids`.
    async fn sum_by_type(&self, product_ids: &[ProductId]) -> Result<Vec<MovementSum>, StoreError>;

    /// Number of records matching the query.
    async fn count(&self, query: &LedgerQuery) -> Result<u64, StoreError>;

    /// Matching records, most recent first, joined with the acting user's display fields.
    async fn fetch_page(
        &self,
        query: &LedgerQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TransactionView>, StoreError>;
}

/// One atomic check-then-insert scope.
///
/// Dropping a unit of work without calling [`commit`](UnitOfWork::commit)
/// discards everything it inserted.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Grouped sums as seen from inside this unit (including its own inserts).
    async fn sum_by_type(&mut self, product_ids: &[ProductId]) -> Result<Vec<MovementSum>, StoreError>;

    /// Insert one record. The store assigns its id and timestamp.
    async fn insert(&mut self, record: NewInventoryTransaction) -> Result<InventoryTransaction, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> TransactionStore for Arc<S>
where
    S: TransactionStore + ?Sized,
{
    async fn begin(&self, product_id: ProductId) -> Result<Box<dyn UnitOfWork>, StoreError> {
        (**self).begin(product_id).await
    }

    async fn sum_by_type(&self, product_ids: &[ProductId]) -> Result<Vec<MovementSum>, StoreError> {
        (**self).sum_by_type(product_ids).await
    }

    async fn count(&self, query: &LedgerQuery) -> Result<u64, StoreError> {
        (**self).count(query).await
    }

    async fn fetch_page(
        &self,
        query: &LedgerQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TransactionView>, StoreError> {
        (**self).fetch_page(query, offset, limit).await
    }
}
