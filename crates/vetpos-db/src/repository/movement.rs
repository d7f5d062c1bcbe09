//! # Movement Journal Repository
//!
//! Append-only record of every stock change and its cause.
//!
//! ## Invariant
//! For every `(branch, product)` pair, the ledger quantity equals the
//! signed sum of journal entries referencing it:
//!
//! ```text
//! stock(b, p) == Σ (+quantity where to_branch_id   = b)
//!              + Σ (-quantity where from_branch_id = b)
//! ```
//!
//! [`MovementRepository::ledger_delta`] computes the right-hand side; audit
//! checks and tests compare it against the ledger.
//!
//! Movements are immutable: this module exposes exactly one write, `append`.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use vetpos_core::InventoryMovement;

const SELECT_COLUMNS: &str = r#"
    SELECT id, movement_type, product_id, quantity,
           from_branch_id, to_branch_id, reason,
           reference_sale_id, line_index, created_by, created_at
    FROM inventory_movements
"#;

/// Repository for movement journal reads.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    /// Creates a new MovementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// Gets a movement by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<InventoryMovement>> {
        let movement = sqlx::query_as::<_, InventoryMovement>(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(movement)
    }

    /// Lists the most recent movements, newest first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(
            &format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC LIMIT ?1"),
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Lists the movements a sale produced (SALE and VOID_SALE entries),
    /// in line order.
    pub async fn list_for_sale(&self, sale_id: &str) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(
            &format!("{SELECT_COLUMNS} WHERE reference_sale_id = ?1 ORDER BY created_at, line_index"),
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Signed sum of all journal entries affecting `(branch, product)`.
    ///
    /// This is what the ledger quantity must always equal.
    pub async fn ledger_delta(&self, branch_id: &str, product_id: &str) -> DbResult<i64> {
        let delta: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(
                SUM(CASE WHEN to_branch_id = ?1 THEN quantity ELSE 0 END) -
                SUM(CASE WHEN from_branch_id = ?1 THEN quantity ELSE 0 END),
                0)
            FROM inventory_movements
            WHERE product_id = ?2
              AND (from_branch_id = ?1 OR to_branch_id = ?1)
            "#,
        )
        .bind(branch_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(delta)
    }
}

/// Appends a journal entry.
///
/// Called after the ledger adjustment(s) for the same cause succeeded, in
/// the same transaction - a movement must never exist without its matching
/// ledger state, nor the other way around.
pub async fn append(conn: &mut SqliteConnection, movement: &InventoryMovement) -> DbResult<()> {
    debug!(
        id = %movement.id,
        movement_type = ?movement.movement_type,
        product_id = %movement.product_id,
        quantity = %movement.quantity,
        "Appending movement"
    );

    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, movement_type, product_id, quantity,
            from_branch_id, to_branch_id, reason,
            reference_sale_id, line_index, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&movement.id)
    .bind(movement.movement_type)
    .bind(&movement.product_id)
    .bind(movement.quantity)
    .bind(&movement.from_branch_id)
    .bind(&movement.to_branch_id)
    .bind(&movement.reason)
    .bind(&movement.reference_sale_id)
    .bind(movement.line_index)
    .bind(&movement.created_by)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use uuid::Uuid;
    use vetpos_core::MovementType;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn in_movement(product_id: &str, to_branch: &str, quantity: i64) -> InventoryMovement {
        InventoryMovement {
            id: Uuid::new_v4().to_string(),
            movement_type: MovementType::In,
            product_id: product_id.to_string(),
            quantity,
            from_branch_id: None,
            to_branch_id: Some(to_branch.to_string()),
            reason: "restock".to_string(),
            reference_sale_id: None,
            line_index: None,
            created_by: "u1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_fetch_round_trip() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let movement = in_movement("p1", "b1", 7);
        append(&mut conn, &movement).await.unwrap();
        drop(conn);

        let fetched = db.movements().get_by_id(&movement.id).await.unwrap().unwrap();
        assert_eq!(fetched.movement_type, MovementType::In);
        assert_eq!(fetched.quantity, 7);
        assert_eq!(fetched.to_branch_id.as_deref(), Some("b1"));
    }

    #[tokio::test]
    async fn test_ledger_delta_sums_both_directions() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        append(&mut conn, &in_movement("p1", "b1", 10)).await.unwrap();

        let mut transfer = in_movement("p1", "b2", 4);
        transfer.movement_type = MovementType::Transfer;
        transfer.from_branch_id = Some("b1".to_string());
        append(&mut conn, &transfer).await.unwrap();
        drop(conn);

        let repo = db.movements();
        assert_eq!(repo.ledger_delta("b1", "p1").await.unwrap(), 6);
        assert_eq!(repo.ledger_delta("b2", "p1").await.unwrap(), 4);
        assert_eq!(repo.ledger_delta("b3", "p1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_sale_line_movement_is_rejected() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let mut movement = in_movement("p1", "b1", 1);
        movement.movement_type = MovementType::Sale;
        movement.to_branch_id = None;
        movement.from_branch_id = Some("b1".to_string());
        movement.reference_sale_id = Some("sale-1".to_string());
        movement.line_index = Some(0);
        append(&mut conn, &movement).await.unwrap();

        // Same (type, sale, line) key must hit the unique index.
        movement.id = Uuid::new_v4().to_string();
        let err = append(&mut conn, &movement).await.unwrap_err();
        assert!(matches!(err, crate::error::DbError::UniqueViolation { .. }));
    }
}
