//! Net stock derived from grouped movement sums.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use glampstock_core::ProductId;

use crate::movement::MovementType;

/// Sum of `quantity` for one `(product, movement type)` group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSum {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub total: i64,
}

/// Fold grouped sums into signed net stock per product.
///
/// Every id in `product_ids` is present in the result; ids without any group
/// map to `0`. Groups for products that were not requested are ignored.
pub fn net_stock<'a>(
    product_ids: impl IntoIterator<Item = &'a ProductId>,
    sums: &[MovementSum],
) -> HashMap<ProductId, i64> {
    let mut stock: HashMap<ProductId, i64> =
        product_ids.into_iter().map(|id| (*id, 0)).collect();

    for sum in sums {
        if let Some(total) = stock.get_mut(&sum.product_id) {
            *total += sum.movement_type.sign() * sum.total;
        }
    }

    stock
}

/// Single-product form of [`net_stock`].
pub fn net_stock_of(product_id: ProductId, sums: &[MovementSum]) -> i64 {
    net_stock([&product_id], sums)
        .get(&product_id)
        .copied()
        .unwrap_or(0)
}

/// Group a slice of records the way the store's aggregate query does.
///
/// Used by stores that keep the log in memory.
pub fn sum_by_type<'a>(
    records: impl IntoIterator<Item = &'a crate::InventoryTransaction>,
) -> Vec<MovementSum> {
    let mut groups: HashMap<(ProductId, MovementType), i64> = HashMap::new();
    for r in records {
        *groups.entry((r.product_id, r.movement_type)).or_insert(0) += r.quantity.get();
    }

    let mut sums: Vec<MovementSum> = groups
        .into_iter()
        .map(|((product_id, movement_type), total)| MovementSum {
            product_id,
            movement_type,
            total,
        })
        .collect();
    // Deterministic order: product, type.
    sums.sort_by_key(|s| (s.product_id, s.movement_type));
    sums
}
