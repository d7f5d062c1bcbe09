//! # Inventory Movement Coordinator
//!
//! Validates and applies IN / OUT / TRANSFER movements against the stock
//! ledger, appending journal entries.
//!
//! ## One Movement, One Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_movement(TRANSFER, p, 5, from: A, to: B)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate (branch requirements per type, quantity > 0)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN ───► adjust(A, -5)  ← conditional update, floor check inside   │
//! │        ───► adjust(B, +5)                                              │
//! │        ───► append journal entry (one row, both branches on it)       │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  Any step failing aborts the whole transaction: a transfer either      │
//! │  moves stock AND records itself, or does neither.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SALE / VOID_SALE movements never enter here - the sale coordinator emits
//! them inside its own transaction.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use vetpos_core::{
    validation, Actor, CreateMovementCommand, InventoryMovement, MovementType, StockRecord,
};
use vetpos_db::repository::stock::AdjustOutcome;
use vetpos_db::repository::{movement, stock};
use vetpos_db::Database;

/// Maps an adjustment outcome onto the service error taxonomy.
///
/// Shared with the sale coordinator, which deducts stock the same way.
pub(crate) fn require_applied(
    outcome: AdjustOutcome,
    branch_id: &str,
    product_id: &str,
    requested: i64,
) -> ServiceResult<i64> {
    match outcome {
        AdjustOutcome::Applied { quantity } => Ok(quantity),
        AdjustOutcome::Insufficient { available } => Err(ServiceError::InsufficientStock {
            product_id: product_id.to_string(),
            branch_id: branch_id.to_string(),
            available,
            requested,
        }),
    }
}

/// Coordinator for stock reads and manual inventory movements.
#[derive(Debug, Clone)]
pub struct InventoryService {
    db: Database,
}

impl InventoryService {
    /// Creates a new InventoryService.
    pub fn new(db: Database) -> Self {
        InventoryService { db }
    }

    /// Gets the stock record for `(branch, product)`, if one exists.
    pub async fn get_stock(
        &self,
        branch_id: &str,
        product_id: &str,
    ) -> ServiceResult<Option<StockRecord>> {
        Ok(self.db.stocks().get(branch_id, product_id).await?)
    }

    /// Lists all stock records at a branch.
    pub async fn list_stock(&self, branch_id: &str) -> ServiceResult<Vec<StockRecord>> {
        Ok(self.db.stocks().list_for_branch(branch_id).await?)
    }

    /// Lists recent journal entries, newest first.
    pub async fn list_movements(&self, limit: u32) -> ServiceResult<Vec<InventoryMovement>> {
        Ok(self.db.movements().list_recent(limit).await?)
    }

    /// Creates an IN / OUT / TRANSFER movement.
    ///
    /// ## Behavior by Type
    /// - IN: credits `to_branch`
    /// - OUT: debits `from_branch`; going negative requires a privileged actor
    /// - TRANSFER: debits source, credits destination, as one unit
    ///
    /// Exactly one journal entry is appended, after the ledger adjustments
    /// succeed. Failure anywhere aborts the whole operation.
    pub async fn create_movement(
        &self,
        cmd: CreateMovementCommand,
        actor: &Actor,
    ) -> ServiceResult<InventoryMovement> {
        validation::validate_movement(&cmd)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        match cmd.movement_type {
            MovementType::In => {
                let to_branch = require_branch(cmd.to_branch_id.as_deref(), "to_branch_id")?;
                stock::adjust(&mut tx, to_branch, &cmd.product_id, cmd.quantity, false).await?;
            }
            MovementType::Out => {
                let from_branch = require_branch(cmd.from_branch_id.as_deref(), "from_branch_id")?;
                let outcome = stock::adjust(
                    &mut tx,
                    from_branch,
                    &cmd.product_id,
                    -cmd.quantity,
                    actor.is_privileged(),
                )
                .await?;
                let quantity =
                    require_applied(outcome, from_branch, &cmd.product_id, cmd.quantity)?;
                if quantity < 0 {
                    warn!(
                        branch_id = %from_branch,
                        product_id = %cmd.product_id,
                        quantity = %quantity,
                        actor = %actor.id,
                        "Stock went negative under privileged override"
                    );
                }
            }
            MovementType::Transfer => {
                let from_branch = require_branch(cmd.from_branch_id.as_deref(), "from_branch_id")?;
                let to_branch = require_branch(cmd.to_branch_id.as_deref(), "to_branch_id")?;

                // Source first: if it fails, the destination is untouched
                // and the transaction holds nothing to roll back.
                let outcome = stock::adjust(
                    &mut tx,
                    from_branch,
                    &cmd.product_id,
                    -cmd.quantity,
                    actor.is_privileged(),
                )
                .await?;
                require_applied(outcome, from_branch, &cmd.product_id, cmd.quantity)?;

                stock::adjust(&mut tx, to_branch, &cmd.product_id, cmd.quantity, false).await?;
            }
            MovementType::Sale | MovementType::VoidSale => {
                // validate_movement already rejected these; keep the match
                // exhaustive without a reachable panic.
                return Err(ServiceError::forbidden(
                    "sale movements are created by the sale coordinator",
                ));
            }
        }

        let movement = InventoryMovement {
            id: Uuid::new_v4().to_string(),
            movement_type: cmd.movement_type,
            product_id: cmd.product_id.clone(),
            quantity: cmd.quantity,
            from_branch_id: cmd.from_branch_id.clone(),
            to_branch_id: cmd.to_branch_id.clone(),
            reason: cmd.reason.clone(),
            reference_sale_id: None,
            line_index: None,
            created_by: actor.id.clone(),
            created_at: now,
        };
        movement::append(&mut tx, &movement).await?;

        tx.commit().await?;

        info!(
            movement_id = %movement.id,
            movement_type = ?movement.movement_type,
            product_id = %movement.product_id,
            quantity = %movement.quantity,
            "Movement created"
        );

        Ok(movement)
    }
}

/// Extracts a branch id that validation already guaranteed is present.
fn require_branch<'a>(branch: Option<&'a str>, field: &str) -> ServiceResult<&'a str> {
    branch.ok_or_else(|| {
        ServiceError::Validation(vetpos_core::ValidationError::Required {
            field: field.to_string(),
        })
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
