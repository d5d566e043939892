use std::collections::{HashMap, HashSet};

use tracing::instrument;

use glampstock_core::ProductId;
use glampstock_inventory::{net_stock, net_stock_of};

use super::LedgerError;
use crate::store::{StoreError, TransactionStore, UnitOfWork};

/// Derives net stock from the store's grouped movement sums.
///
/// Side-effect free: the same log always yields the same numbers.
#[derive(Debug, Clone)]
pub struct StockAggregator<S> {
    store: S,
}

impl<S> StockAggregator<S>
where
    S: TransactionStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Net stock for every requested product; products without movements are `0`.
    #[instrument(skip_all, fields(products = product_ids.len()), err)]
    pub async fn compute_stock(
        &self,
        product_ids: &HashSet<ProductId>,
    ) -> Result<HashMap<ProductId, i64>, LedgerError> {
        if product_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<ProductId> = product_ids.iter().copied().collect();
        let sums = self.store.sum_by_type(&ids).await?;
        Ok(net_stock(product_ids, &sums))
    }

    #[instrument(skip(self), err)]
    pub async fn compute_stock_one(&self, product_id: ProductId) -> Result<i64, LedgerError> {
        let sums = self.store.sum_by_type(&[product_id]).await?;
        Ok(net_stock_of(product_id, &sums))
    }
}

/// Net stock of one product as seen from inside a unit of work.
pub async fn stock_within(uow: &mut dyn UnitOfWork, product_id: ProductId) -> Result<i64, StoreError> {
    let sums = uow.sum_by_type(&[product_id]).await?;
    Ok(net_stock_of(product_id, &sums))
}
