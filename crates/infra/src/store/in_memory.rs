use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use glampstock_core::{ProductId, TransactionId, UserId};
use glampstock_inventory::stock::sum_by_type;
use glampstock_inventory::{
    ActorSummary, InventoryTransaction, LedgerQuery, MovementSum, NewInventoryTransaction,
    TransactionView,
};

use super::r#trait::{StoreError, TransactionStore, UnitOfWork};

#[derive(Debug, Default)]
struct Inner {
    log: RwLock<Vec<InventoryTransaction>>,
    actors: RwLock<HashMap<UserId, ActorSummary>>,
    write_locks: Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>,
}

/// In-memory append-only transaction store.
///
/// Intended for tests/dev. Not optimized for performance. Each product has its
/// own async write lock, held by a unit of work until it finishes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionStore {
    inner: Arc<Inner>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an actor's display fields available to listings and search.
    pub fn register_actor(&self, actor: ActorSummary) -> Result<(), StoreError> {
        let mut actors = self.inner.actors.write().map_err(|_| poisoned())?;
        actors.insert(actor.id, actor);
        Ok(())
    }

    fn write_lock_for(&self, product_id: ProductId) -> Result<Arc<AsyncMutex<()>>, StoreError> {
        let mut locks = self.inner.write_locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(product_id).or_default().clone())
    }

    fn matching(&self, query: &LedgerQuery) -> Result<Vec<TransactionView>, StoreError> {
        let log = self.inner.log.read().map_err(|_| poisoned())?;
        let actors = self.inner.actors.read().map_err(|_| poisoned())?;

        let mut views: Vec<(usize, TransactionView)> = log
            .iter()
            .enumerate()
            .filter(|(_, t)| t.product_id == query.product_id)
            .map(|(seq, t)| {
                let view = TransactionView {
                    transaction: t.clone(),
                    actor: t.created_by_id.and_then(|id| actors.get(&id).cloned()),
                };
                (seq, view)
            })
            .filter(|(_, v)| query.filter.matches(v))
            .collect();

        // Most recent first; insertion order breaks timestamp ties.
        views.sort_by(|(a_seq, a), (b_seq, b)| {
            (b.transaction.created_at, b_seq).cmp(&(a.transaction.created_at, a_seq))
        });
        Ok(views.into_iter().map(|(_, v)| v).collect())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn begin(&self, product_id: ProductId) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.write_lock_for(product_id)?.lock_owned().await;
        Ok(Box::new(InMemoryUnitOfWork {
            inner: self.inner.clone(),
            product_id,
            staged: Vec::new(),
            _guard: guard,
        }))
    }

    async fn sum_by_type(&self, product_ids: &[ProductId]) -> Result<Vec<MovementSum>, StoreError> {
        let log = self.inner.log.read().map_err(|_| poisoned())?;
        Ok(sum_by_type(
            log.iter().filter(|t| product_ids.contains(&t.product_id)),
        ))
    }

    async fn count(&self, query: &LedgerQuery) -> Result<u64, StoreError> {
        Ok(self.matching(query)?.len() as u64)
    }

    async fn fetch_page(
        &self,
        query: &LedgerQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TransactionView>, StoreError> {
        Ok(self
            .matching(query)?
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

/// Unit of work over the in-memory log.
///
/// Inserts are staged locally and become visible to other callers on commit.
struct InMemoryUnitOfWork {
    inner: Arc<Inner>,
    product_id: ProductId,
    staged: Vec<InventoryTransaction>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn sum_by_type(&mut self, product_ids: &[ProductId]) -> Result<Vec<MovementSum>, StoreError> {
        let log = self.inner.log.read().map_err(|_| poisoned())?;
        Ok(sum_by_type(
            log.iter()
                .chain(self.staged.iter())
                .filter(|t| product_ids.contains(&t.product_id)),
        ))
    }

    async fn insert(&mut self, record: NewInventoryTransaction) -> Result<InventoryTransaction, StoreError> {
        if record.product_id != self.product_id {
            return Err(StoreError::Backend(format!(
                "unit of work is scoped to product {}, attempted insert for {}",
                self.product_id, record.product_id
            )));
        }

        let last_created_at = {
            let log = self.inner.log.read().map_err(|_| poisoned())?;
            log.iter()
                .chain(self.staged.iter())
                .filter(|t| t.product_id == self.product_id)
                .map(|t| t.created_at)
                .max()
        };
        // Never let a product's timestamps go backwards (wall clock may).
        let now = Utc::now();
        let created_at = last_created_at.map_or(now, |last| last.max(now));

        let stored = InventoryTransaction {
            id: TransactionId::new(),
            product_id: record.product_id,
            movement_type: record.movement_type,
            quantity: record.quantity,
            note: record.note,
            reference: record.reference,
            created_by_id: record.created_by_id,
            created_at,
        };
        self.staged.push(stored.clone());
        Ok(stored)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut log = this.inner.log.write().map_err(|_| poisoned())?;
        log.extend(this.staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
