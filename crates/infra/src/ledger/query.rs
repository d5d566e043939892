use tracing::{debug, instrument};

use glampstock_core::ProductId;
use glampstock_inventory::{LedgerQuery, Page, PageRequest, PageWindow, TransactionFilter, TransactionView};

use super::LedgerError;
use crate::store::TransactionStore;

/// Paginated, filterable read access to one product's movement history.
#[derive(Debug, Clone)]
pub struct LedgerQueryService<S> {
    store: S,
}

impl<S> LedgerQueryService<S>
where
    S: TransactionStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Most recent movements first.
    ///
    /// A page past the end is clamped to the last page; an empty history yields
    /// `total_pages == 0` and `current_page == 0`.
    #[instrument(skip_all, fields(product_id = %product_id, page = page.page, page_size = page.page_size), err)]
    pub async fn list_transactions(
        &self,
        product_id: ProductId,
        page: PageRequest,
        filter: TransactionFilter,
    ) -> Result<Page<TransactionView>, LedgerError> {
        let query = LedgerQuery::new(product_id, filter);

        let count = self.store.count(&query).await?;
        let window = PageWindow::resolve(count, page);
        debug!(
            count,
            total_pages = window.total_pages,
            current_page = window.current_page,
            "resolved page window"
        );

        if window.is_empty() {
            return Ok(Page::empty());
        }

        let items = self
            .store
            .fetch_page(&query, window.offset, window.limit)
            .await?;

        Ok(Page {
            items,
            total_pages: window.total_pages,
            current_page: window.current_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glampstock_core::UserId;
    use glampstock_inventory::{ActorSummary, MovementType, RecordMovement};

    use crate::ledger::TransactionWriter;
    use crate::store::InMemoryTransactionStore;

    fn setup() -> (
        Arc<InMemoryTransactionStore>,
        TransactionWriter<Arc<InMemoryTransactionStore>>,
        LedgerQueryService<Arc<InMemoryTransactionStore>>,
    ) {
        let store = Arc::new(InMemoryTransactionStore::new());
        (
            store.clone(),
            TransactionWriter::new(store.clone()),
            LedgerQueryService::new(store),
        )
    }

    async fn record_n(writer: &TransactionWriter<Arc<InMemoryTransactionStore>>, p: ProductId, n: usize) {
        for i in 0..n {
            writer
                .create_transaction(
                    RecordMovement::new(p, MovementType::In, 1).with_note(format!("delivery #{i}")),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn empty_history_has_no_pages() {
        let (_, _, query) = setup();
        let page = query
            .list_transactions(ProductId::new(), PageRequest::new(1, 10), TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(page, Page::empty());
    }

    #[tokio::test]
    async fn page_past_the_end_is_clamped_to_last_page() {
        let (_, writer, query) = setup();
        let p = ProductId::new();
        record_n(&writer, p, 25).await;

        let page = query
            .list_transactions(p, PageRequest::new(5, 10), TransactionFilter::default())
            .await
            .unwrap();

        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 3);
        assert_eq!(page.items.len(), 5);
        // Page 3 holds the five oldest records.
        let notes: Vec<_> = page
            .items
            .iter()
            .map(|v| v.transaction.note.clone().unwrap())
            .collect();
        assert_eq!(notes, ["delivery #4", "delivery #3", "delivery #2", "delivery #1", "delivery #0"]);
    }

    #[tokio::test]
    async fn items_are_most_recent_first() {
        let (_, writer, query) = setup();
        let p = ProductId::new();
        record_n(&writer, p, 12).await;

        let page = query
            .list_transactions(p, PageRequest::new(1, 10), TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 10);
        assert!(page.items.windows(2).all(|w| {
            w[0].transaction.created_at >= w[1].transaction.created_at
        }));
        assert_eq!(page.items[0].transaction.note.as_deref(), Some("delivery #11"));
    }

    #[tokio::test]
    async fn only_the_requested_product_is_listed() {
        let (_, writer, query) = setup();
        let p = ProductId::new();
        record_n(&writer, p, 2).await;
        record_n(&writer, ProductId::new(), 3).await;

        let page = query
            .list_transactions(p, PageRequest::default(), TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|v| v.transaction.product_id == p));
    }

    #[tokio::test]
    async fn filters_by_type_and_search() {
        let (store, writer, query) = setup();
        let p = ProductId::new();
        let actor = ActorSummary {
            id: UserId::new(),
            first_name: "Tomas".to_string(),
            last_name: "Ruiz".to_string(),
            email: "tomas@glamp.example".to_string(),
        };
        store.register_actor(actor.clone()).unwrap();

        writer
            .create_transaction(RecordMovement::new(p, MovementType::In, 20).with_reference("PO-881"))
            .await
            .unwrap();
        writer
            .create_transaction(RecordMovement::new(p, MovementType::Out, 3).with_actor(actor.id))
            .await
            .unwrap();
        writer
            .create_transaction(RecordMovement::new(p, MovementType::Adjustment, 1).with_note("Recount"))
            .await
            .unwrap();

        let outs = query
            .list_transactions(p, PageRequest::default(), TransactionFilter::of_type(MovementType::Out))
            .await
            .unwrap();
        assert_eq!(outs.items.len(), 1);
        assert_eq!(outs.items[0].actor.as_ref(), Some(&actor));

        let by_email = query
            .list_transactions(p, PageRequest::default(), TransactionFilter::search("GLAMP.example"))
            .await
            .unwrap();
        assert_eq!(by_email.items.len(), 1);
        assert_eq!(by_email.items[0].transaction.movement_type, MovementType::Out);

        let by_reference = query
            .list_transactions(p, PageRequest::default(), TransactionFilter::search("po-8"))
            .await
            .unwrap();
        assert_eq!(by_reference.items.len(), 1);

        let combined = query
            .list_transactions(
                p,
                PageRequest::default(),
                TransactionFilter {
                    movement_type: Some(MovementType::In),
                    search: Some("recount".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(combined, Page::empty());
    }
}
