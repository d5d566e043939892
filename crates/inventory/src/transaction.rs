use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use glampstock_core::{DomainResult, ProductId, TransactionId, UserId};

use crate::movement::{MovementType, Quantity};

/// One immutable stock movement, as committed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: TransactionId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: Quantity,
    pub note: Option<String>,
    pub reference: Option<String>,
    pub created_by_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl InventoryTransaction {
    /// Signed contribution of this record to the product's net stock.
    pub fn signed_quantity(&self) -> i64 {
        self.quantity.signed(self.movement_type)
    }
}

/// Validated insert payload. Id and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInventoryTransaction {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: Quantity,
    pub note: Option<String>,
    pub reference: Option<String>,
    pub created_by_id: Option<UserId>,
}

/// Command: record a stock movement.
///
/// `quantity` is the raw value received from the caller; it is normalized by
/// [`RecordMovement::validate`] before anything is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub actor_id: Option<UserId>,
}

impl RecordMovement {
    pub fn new(product_id: ProductId, movement_type: MovementType, quantity: impl Into<f64>) -> Self {
        Self {
            product_id,
            movement_type,
            quantity: quantity.into(),
            note: None,
            reference: None,
            actor_id: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Normalize the quantity and free-text fields into an insert payload.
    pub fn validate(&self) -> DomainResult<NewInventoryTransaction> {
        let quantity = Quantity::normalize(self.quantity)?;
        Ok(NewInventoryTransaction {
            product_id: self.product_id,
            movement_type: self.movement_type,
            quantity,
            note: non_blank(self.note.as_deref()),
            reference: non_blank(self.reference.as_deref()),
            created_by_id: self.actor_id,
        })
    }
}

/// Result of a successful [`RecordMovement`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedMovement {
    pub transaction: InventoryTransaction,
    pub stock_after: i64,
}

/// Display fields of the user who recorded a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSummary {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// A ledger listing row: the record plus its actor, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    pub transaction: InventoryTransaction,
    pub actor: Option<ActorSummary>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
