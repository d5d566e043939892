//! Postgres-backed transaction store implementation.
//!
//! Records live in the append-only `inventory_transactions` table; `UPDATE` and
//! `DELETE` are rejected by a trigger. Listings join the `users` table owned by
//! the account layer for the acting user's display fields.
//!
//! ## Write serialization
//!
//! [`TransactionStore::begin`] opens a database transaction and immediately takes
//! `pg_advisory_xact_lock(key(product_id))`. The lock is released by Postgres on
//! commit or rollback, including when the connection drops. Every writer for the
//! same product queues on that lock, so the stock it reads cannot change before
//! its insert commits. Readers do not take the lock.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (deadlock detected) | `40P01` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | ColumnDecode / ColumnNotFound / Decode | N/A | `Decode` |
//! | Other | N/A | `Backend` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgExecutor, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use glampstock_core::{ProductId, TransactionId, UserId};
use glampstock_inventory::{
    ActorSummary, InventoryTransaction, LedgerQuery, MovementSum, MovementType,
    NewInventoryTransaction, Quantity, TransactionView,
};

use super::r#trait::{StoreError, TransactionStore, UnitOfWork};
use crate::config::StoreConfig;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inventory_transactions (
    id UUID PRIMARY KEY,
    product_id UUID NOT NULL,
    movement_type TEXT NOT NULL CHECK (movement_type IN ('IN', 'OUT', 'ADJUSTMENT')),
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    note TEXT,
    reference TEXT,
    created_by_id UUID,
    created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
);

CREATE INDEX IF NOT EXISTS inventory_transactions_product_created_idx
    ON inventory_transactions (product_id, created_at DESC, id DESC);

CREATE OR REPLACE FUNCTION inventory_transactions_append_only() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'inventory_transactions is append-only';
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS inventory_transactions_append_only ON inventory_transactions;
CREATE TRIGGER inventory_transactions_append_only
    BEFORE UPDATE OR DELETE ON inventory_transactions
    FOR EACH ROW EXECUTE FUNCTION inventory_transactions_append_only();
"#;

const SUM_BY_TYPE: &str = r#"
SELECT product_id, movement_type, SUM(quantity)::BIGINT AS total
FROM inventory_transactions
WHERE product_id = ANY($1)
GROUP BY product_id, movement_type
ORDER BY product_id, movement_type
"#;

// $1 product, $2 type filter, $3 ILIKE pattern.
const FILTERED_FROM: &str = r#"
FROM inventory_transactions t
LEFT JOIN users u ON u.id = t.created_by_id
WHERE t.product_id = $1
    AND ($2::text IS NULL OR t.movement_type = $2)
    AND ($3::text IS NULL
        OR t.note ILIKE $3
        OR t.reference ILIKE $3
        OR u.first_name ILIKE $3
        OR u.last_name ILIKE $3
        OR u.email ILIKE $3)
"#;

/// Postgres-backed append-only transaction store.
///
/// `Clone` is cheap; the pool is shared.
#[derive(Debug, Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a connection pool from configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables, index and the append-only trigger if missing.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    #[instrument(skip_all, fields(product_id = %product_id), err)]
    async fn begin(&self, product_id: ProductId) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_key(product_id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("advisory_lock", e))?;

        Ok(Box::new(PostgresUnitOfWork { tx, product_id }))
    }

    async fn sum_by_type(&self, product_ids: &[ProductId]) -> Result<Vec<MovementSum>, StoreError> {
        sum_by_type(&self.pool, product_ids).await
    }

    #[instrument(skip_all, fields(product_id = %query.product_id), err)]
    async fn count(&self, query: &LedgerQuery) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) AS total {FILTERED_FROM}");
        let row = sqlx::query(&sql)
            .bind(query.product_id.as_uuid())
            .bind(query.filter.movement_type.map(MovementType::as_str))
            .bind(query.filter.search_text().map(ilike_pattern))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_transactions", e))?;

        let total: i64 = row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_transactions", e))?;
        Ok(total.max(0) as u64)
    }

    #[instrument(skip_all, fields(product_id = %query.product_id), err)]
    async fn fetch_page(
        &self,
        query: &LedgerQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TransactionView>, StoreError> {
        let sql = format!(
            r#"
            SELECT
                t.id, t.product_id, t.movement_type, t.quantity, t.note, t.reference,
                t.created_by_id, t.created_at,
                u.id AS actor_id, u.first_name, u.last_name, u.email
            {FILTERED_FROM}
            ORDER BY t.created_at DESC, t.id DESC
            LIMIT $4 OFFSET $5
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(query.product_id.as_uuid())
            .bind(query.filter.movement_type.map(MovementType::as_str))
            .bind(query.filter.search_text().map(ilike_pattern))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_transactions", e))?;

        rows.iter().map(view_from_row).collect()
    }
}

/// Unit of work holding a database transaction and the product's advisory lock.
struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
    product_id: ProductId,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn sum_by_type(&mut self, product_ids: &[ProductId]) -> Result<Vec<MovementSum>, StoreError> {
        sum_by_type(&mut *self.tx, product_ids).await
    }

    #[instrument(
        skip_all,
        fields(product_id = %record.product_id, movement_type = %record.movement_type),
        err
    )]
    async fn insert(&mut self, record: NewInventoryTransaction) -> Result<InventoryTransaction, StoreError> {
        if record.product_id != self.product_id {
            return Err(StoreError::Backend(format!(
                "unit of work is scoped to product {}, attempted insert for {}",
                self.product_id, record.product_id
            )));
        }

        let id = TransactionId::new();
        // Clamp to the product's latest timestamp so history order is stable.
        let row = sqlx::query(
            r#"
            INSERT INTO inventory_transactions (
                id, product_id, movement_type, quantity, note, reference, created_by_id, created_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                GREATEST(
                    clock_timestamp(),
                    (SELECT MAX(created_at) FROM inventory_transactions WHERE product_id = $2)
                )
            )
            RETURNING created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(record.product_id.as_uuid())
        .bind(record.movement_type.as_str())
        .bind(record.quantity.get() as i32)
        .bind(record.note.as_deref())
        .bind(record.reference.as_deref())
        .bind(record.created_by_id.map(Uuid::from))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_transaction", e))?;

        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| map_sqlx_error("insert_transaction", e))?;

        Ok(InventoryTransaction {
            id,
            product_id: record.product_id,
            movement_type: record.movement_type,
            quantity: record.quantity,
            note: record.note,
            reference: record.reference,
            created_by_id: record.created_by_id,
            created_at,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

async fn sum_by_type<'e, E>(executor: E, product_ids: &[ProductId]) -> Result<Vec<MovementSum>, StoreError>
where
    E: PgExecutor<'e>,
{
    if product_ids.is_empty() {
        return Ok(vec![]);
    }
    let ids: Vec<Uuid> = product_ids.iter().map(|id| *id.as_uuid()).collect();

    let rows = sqlx::query(SUM_BY_TYPE)
        .bind(ids)
        .fetch_all(executor)
        .await
        .map_err(|e| map_sqlx_error("sum_by_type", e))?;

    rows.iter()
        .map(|row| {
            let product_id: Uuid = row.try_get("product_id").map_err(|e| map_sqlx_error("sum_by_type", e))?;
            let movement_type: String = row
                .try_get("movement_type")
                .map_err(|e| map_sqlx_error("sum_by_type", e))?;
            let total: i64 = row.try_get("total").map_err(|e| map_sqlx_error("sum_by_type", e))?;
            Ok(MovementSum {
                product_id: ProductId::from_uuid(product_id),
                movement_type: parse_movement_type(&movement_type)?,
                total,
            })
        })
        .collect()
}

fn view_from_row(row: &PgRow) -> Result<TransactionView, StoreError> {
    let get = |e: sqlx::Error| map_sqlx_error("decode_transaction", e);

    let movement_type: String = row.try_get("movement_type").map_err(get)?;
    let quantity: i32 = row.try_get("quantity").map_err(get)?;
    let created_by_id: Option<Uuid> = row.try_get("created_by_id").map_err(get)?;
    let actor_id: Option<Uuid> = row.try_get("actor_id").map_err(get)?;

    let transaction = InventoryTransaction {
        id: TransactionId::from_uuid(row.try_get("id").map_err(get)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(get)?),
        movement_type: parse_movement_type(&movement_type)?,
        quantity: Quantity::try_from(i64::from(quantity))
            .map_err(|e| StoreError::Decode(format!("quantity: {e}")))?,
        note: row.try_get("note").map_err(get)?,
        reference: row.try_get("reference").map_err(get)?,
        created_by_id: created_by_id.map(UserId::from_uuid),
        created_at: row.try_get("created_at").map_err(get)?,
    };

    let actor = match actor_id {
        Some(id) => Some(ActorSummary {
            id: UserId::from_uuid(id),
            first_name: row.try_get("first_name").map_err(get)?,
            last_name: row.try_get("last_name").map_err(get)?,
            email: row.try_get("email").map_err(get)?,
        }),
        None => None,
    };

    Ok(TransactionView { transaction, actor })
}

fn parse_movement_type(raw: &str) -> Result<MovementType, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Decode(format!("movement_type: {e}")))
}

/// Advisory lock key for a product's movement set.
///
/// Collisions between products only cause extra queuing, never missed locking.
fn advisory_key(product_id: ProductId) -> i64 {
    let (hi, lo) = product_id.as_uuid().as_u64_pair();
    (hi ^ lo) as i64
}

/// `%text%` with `ILIKE` wildcards in the user's text escaped.
fn ilike_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
