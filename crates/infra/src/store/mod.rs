//! Append-only transaction store boundary.
//!
//! This module defines the persistence abstraction the ledger services are
//! written against, plus an in-memory and a Postgres implementation.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryTransactionStore;
pub use postgres::PostgresTransactionStore;
pub use r#trait::{StoreError, TransactionStore, UnitOfWork};
