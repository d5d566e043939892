//! Inventory stock ledger domain.
//!
//! This crate contains the ledger's business rules (movement signs, quantity
//! validation, the stock fold, page arithmetic) as deterministic domain logic:
//! no IO, no HTTP, no storage.

pub mod movement;
pub mod query;
pub mod stock;
pub mod transaction;

pub use movement::{apply_movement, MovementType, Quantity};
pub use query::{LedgerQuery, Page, PageRequest, PageWindow, TransactionFilter};
pub use stock::{net_stock, net_stock_of, MovementSum};
pub use transaction::{
    ActorSummary, InventoryTransaction, NewInventoryTransaction, RecordMovement,
    RecordedMovement, TransactionView,
};
