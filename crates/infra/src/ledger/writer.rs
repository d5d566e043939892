//! The only path that appends movement records.
//!
//! ## Protocol
//!
//! ```text
//! RecordMovement
//!   ↓
//! 1. Normalize quantity (fails fast, before any IO)
//!   ↓
//! 2. begin(product) — exclusive per-product write lock
//!   ↓
//! 3. current = stock inside the unit of work
//!   ↓
//! 4. apply_movement: OUT beyond current → InsufficientStock, roll back
//!   ↓
//! 5. insert, commit → { transaction, stock_after }
//! ```
//!
//! Steps 3–5 run under the same lock, so no other writer for the product can
//! commit between the check and the insert.

use tracing::{info, instrument, warn};

use glampstock_core::DomainError;
use glampstock_inventory::{apply_movement, RecordMovement, RecordedMovement};

use super::aggregator::stock_within;
use super::LedgerError;
use crate::store::TransactionStore;

#[derive(Debug, Clone)]
pub struct TransactionWriter<S> {
    store: S,
}

impl<S> TransactionWriter<S>
where
    S: TransactionStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record one movement. Writes exactly one row on success and none on failure.
    #[instrument(
        skip_all,
        fields(
            product_id = %cmd.product_id,
            movement_type = %cmd.movement_type,
            quantity = cmd.quantity
        ),
        err
    )]
    pub async fn create_transaction(&self, cmd: RecordMovement) -> Result<RecordedMovement, LedgerError> {
        let record = cmd.validate()?;
        let product_id = record.product_id;
        let movement_type = record.movement_type;
        let quantity = record.quantity;

        let mut uow = self.store.begin(product_id).await?;
        let current = stock_within(uow.as_mut(), product_id).await?;

        let stock_after = match apply_movement(product_id, current, movement_type, quantity) {
            Ok(after) => after,
            Err(err @ DomainError::InsufficientStock { .. }) => {
                warn!(available = current, requested = quantity.get(), "withdrawal refused");
                uow.rollback().await?;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        let transaction = uow.insert(record).await?;
        uow.commit().await?;

        info!(
            transaction_id = %transaction.id,
            stock_after,
            "movement recorded"
        );
        Ok(RecordedMovement {
            transaction,
            stock_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glampstock_core::{ProductId, UserId};
    use glampstock_inventory::{LedgerQuery, MovementType, TransactionFilter};

    use crate::ledger::StockAggregator;
    use crate::store::InMemoryTransactionStore;

    fn setup() -> (TransactionWriter<Arc<InMemoryTransactionStore>>, StockAggregator<Arc<InMemoryTransactionStore>>, Arc<InMemoryTransactionStore>) {
        let store = Arc::new(InMemoryTransactionStore::new());
        (
            TransactionWriter::new(store.clone()),
            StockAggregator::new(store.clone()),
            store,
        )
    }

    async fn row_count(store: &InMemoryTransactionStore, product_id: ProductId) -> u64 {
        store
            .count(&LedgerQuery::new(product_id, TransactionFilter::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn records_movement_with_all_fields() {
        let (writer, _, _) = setup();
        let p = ProductId::new();
        let actor = UserId::new();

        let recorded = writer
            .create_transaction(
                RecordMovement::new(p, MovementType::In, 50)
                    .with_note("Spring delivery")
                    .with_reference("PO-2231")
                    .with_actor(actor),
            )
            .await
            .unwrap();

        assert_eq!(recorded.stock_after, 50);
        let t = recorded.transaction;
        assert_eq!(t.product_id, p);
        assert_eq!(t.movement_type, MovementType::In);
        assert_eq!(t.quantity.get(), 50);
        assert_eq!(t.note.as_deref(), Some("Spring delivery"));
        assert_eq!(t.reference.as_deref(), Some("PO-2231"));
        assert_eq!(t.created_by_id, Some(actor));
    }

    #[tokio::test]
    async fn negative_quantity_is_normalized() {
        let (writer, aggregator, _) = setup();
        let p = ProductId::new();
        writer.create_transaction(RecordMovement::new(p, MovementType::In, 10)).await.unwrap();

        let recorded = writer
            .create_transaction(RecordMovement::new(p, MovementType::Out, -4))
            .await
            .unwrap();
        assert_eq!(recorded.transaction.quantity.get(), 4);
        assert_eq!(recorded.stock_after, 6);
        assert_eq!(aggregator.compute_stock_one(p).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn invalid_quantity_writes_nothing() {
        let (writer, aggregator, store) = setup();
        let p = ProductId::new();
        writer.create_transaction(RecordMovement::new(p, MovementType::In, 10)).await.unwrap();

        for raw in [0.0, f64::NAN, f64::INFINITY, -0.0] {
            let err = writer
                .create_transaction(RecordMovement::new(p, MovementType::Out, raw))
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidQuantity(_)), "{raw}: {err:?}");
        }

        assert_eq!(row_count(&store, p).await, 1);
        assert_eq!(aggregator.compute_stock_one(p).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn overdraw_is_refused_and_log_unchanged() {
        let (writer, aggregator, store) = setup();
        let p = ProductId::new();
        writer.create_transaction(RecordMovement::new(p, MovementType::In, 30)).await.unwrap();

        let err = writer
            .create_transaction(RecordMovement::new(p, MovementType::Out, 31))
            .await
            .unwrap_err();
        match err {
            LedgerError::InsufficientStock { product_id, available, requested } => {
                assert_eq!(product_id, p);
                assert_eq!(available, 30);
                assert_eq!(requested, 31);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(row_count(&store, p).await, 1);
        assert_eq!(aggregator.compute_stock_one(p).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn out_from_empty_product_is_refused() {
        let (writer, _, store) = setup();
        let p = ProductId::new();
        let err = writer
            .create_transaction(RecordMovement::new(p, MovementType::Out, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { available: 0, .. }));
        assert_eq!(row_count(&store, p).await, 0);
    }

    #[tokio::test]
    async fn refused_withdrawal_releases_the_product_lock() {
        let (writer, _, _) = setup();
        let p = ProductId::new();
        assert!(writer.create_transaction(RecordMovement::new(p, MovementType::Out, 1)).await.is_err());

        let recorded = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            writer.create_transaction(RecordMovement::new(p, MovementType::In, 1)),
        )
        .await
        .expect("writer must not deadlock after a refused withdrawal")
        .unwrap();
        assert_eq!(recorded.stock_after, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_withdrawals_never_overdraw() {
        const N: i64 = 12;
        const Q: i64 = 7;

        let (writer, aggregator, _) = setup();
        let p = ProductId::new();
        writer
            .create_transaction(RecordMovement::new(p, MovementType::In, (Q * (N - 1)) as f64))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..N {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                writer
                    .create_transaction(RecordMovement::new(p, MovementType::Out, Q as f64))
                    .await
            }));
        }

        let mut successes = 0;
        let mut refusals = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(recorded) => {
                    assert!(recorded.stock_after >= 0);
                    successes += 1;
                }
                Err(LedgerError::InsufficientStock { .. }) => refusals += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(successes, N - 1);
        assert_eq!(refusals, 1);
        assert_eq!(aggregator.compute_stock_one(p).await.unwrap(), 0);
    }
}
