//! Infrastructure layer: transaction stores, ledger services, configuration.

pub mod config;
pub mod ledger;
pub mod store;


pub use config::{ConfigError, StoreConfig};
pub use ledger::{InventoryLedger, LedgerError, LedgerQueryService, StockAggregator, TransactionWriter};
pub use store::{InMemoryTransactionStore, PostgresTransactionStore, StoreError, TransactionStore, UnitOfWork};
