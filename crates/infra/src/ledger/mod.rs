//! Inventory stock ledger services.
//!
//! ```text
//! TransactionWriter ──► StockAggregator ──► TransactionStore
//!         │                                     ▲
//!         └──────────── UnitOfWork ─────────────┘
//! LedgerQueryService ─────────────────────────► TransactionStore
//! ```
//!
//! All services are generic over an injected [`TransactionStore`]; they hold no
//! state of their own.

pub mod aggregator;
pub mod query;
pub mod writer;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use glampstock_core::{DomainError, ProductId};
use glampstock_inventory::{Page, PageRequest, RecordMovement, RecordedMovement, TransactionFilter, TransactionView};

use crate::store::{StoreError, TransactionStore};

pub use aggregator::StockAggregator;
pub use query::LedgerQueryService;
pub use writer::TransactionWriter;

/// Ledger operation error.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Quantity was not a finite, positive whole number. Nothing was written.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// An outgoing movement would take stock below zero. Nothing was written.
    #[error(
        "insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// Other malformed input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The store failed; includes concurrency-control conflicts, which the
    /// calling layer may retry.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Whether the caller's input caused the failure (maps to a 4xx response).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, LedgerError::Store(_))
    }

    /// Whether retrying the same call from the top may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Store(StoreError::Conflict(_)))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidQuantity(msg) => LedgerError::InvalidQuantity(msg),
            DomainError::InsufficientStock {
                product_id,
                available,
                requested,
            } => LedgerError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => LedgerError::Validation(msg),
        }
    }
}

/// The ledger's three operations over one shared store.
///
/// This is the handle the API layer holds.
#[derive(Debug)]
pub struct InventoryLedger<S> {
    aggregator: StockAggregator<Arc<S>>,
    writer: TransactionWriter<Arc<S>>,
    query: LedgerQueryService<Arc<S>>,
}

impl<S> Clone for InventoryLedger<S> {
    fn clone(&self) -> Self {
        Self {
            aggregator: self.aggregator.clone(),
            writer: self.writer.clone(),
            query: self.query.clone(),
        }
    }
}

impl<S> InventoryLedger<S>
where
    S: TransactionStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            aggregator: StockAggregator::new(store.clone()),
            writer: TransactionWriter::new(store.clone()),
            query: LedgerQueryService::new(store),
        }
    }

    pub async fn compute_stock(
        &self,
        product_ids: &HashSet<ProductId>,
    ) -> Result<HashMap<ProductId, i64>, LedgerError> {
        self.aggregator.compute_stock(product_ids).await
    }

    pub async fn compute_stock_one(&self, product_id: ProductId) -> Result<i64, LedgerError> {
        self.aggregator.compute_stock_one(product_id).await
    }

    pub async fn create_transaction(&self, cmd: RecordMovement) -> Result<RecordedMovement, LedgerError> {
        self.writer.create_transaction(cmd).await
    }

    pub async fn list_transactions(
        &self,
        product_id: ProductId,
        page: PageRequest,
        filter: TransactionFilter,
    ) -> Result<Page<TransactionView>, LedgerError> {
        self.query.list_transactions(product_id, page, filter).await
    }
}
