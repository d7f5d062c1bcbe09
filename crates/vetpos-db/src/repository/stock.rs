//! # Stock Ledger Repository
//!
//! Owns the current quantity of a product at a branch.
//!
//! ## The Conditional Update
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Update Strategy                                │
//! │                                                                         │
//! │  ❌ WRONG: read, decide, write (lost updates under concurrency)        │
//! │     let stock = SELECT quantity ...;                                   │
//! │     if stock.quantity >= qty { UPDATE ... SET quantity = stock - qty } │
//! │                                                                         │
//! │  ✅ CORRECT: one conditional statement, the floor check inside it      │
//! │     UPDATE stocks SET quantity = quantity - qty                        │
//! │     WHERE branch_id = ? AND product_id = ?                             │
//! │       AND quantity - qty >= 0                                          │
//! │     RETURNING quantity                                                 │
//! │                                                                         │
//! │  Two sales racing for the last unit: one statement applies, the       │
//! │  other matches zero rows and reports insufficiency. No interleaving    │
//! │  can lose an update or take the quantity below the floor.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are created lazily: the first write for a `(branch, product)` pair
//! inserts the record with quantity equal to the supplied delta.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use vetpos_core::StockRecord;

/// Repository for stock ledger reads.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Gets the stock record for a `(branch, product)` pair.
    ///
    /// ## Returns
    /// * `Ok(Some(StockRecord))` - Record exists
    /// * `Ok(None)` - No movement has ever touched this pair
    pub async fn get(&self, branch_id: &str, product_id: &str) -> DbResult<Option<StockRecord>> {
        let record = sqlx::query_as::<_, StockRecord>(
            r#"
            SELECT id, branch_id, product_id, quantity, updated_at
            FROM stocks
            WHERE branch_id = ?1 AND product_id = ?2
            "#,
        )
        .bind(branch_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Lists every stock record at a branch, ordered by product id.
    pub async fn list_for_branch(&self, branch_id: &str) -> DbResult<Vec<StockRecord>> {
        let records = sqlx::query_as::<_, StockRecord>(
            r#"
            SELECT id, branch_id, product_id, quantity, updated_at
            FROM stocks
            WHERE branch_id = ?1
            ORDER BY product_id
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

/// Result of a conditional stock adjustment.
///
/// Insufficiency is an expected business outcome, not a storage failure,
/// so it travels as data rather than as a `DbError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustOutcome {
    /// The adjustment applied; carries the new quantity.
    Applied { quantity: i64 },
    /// The floor check failed; carries the quantity that was observed.
    Insufficient { available: i64 },
}

/// Atomically adjusts the quantity for `(branch, product)` by `delta`.
///
/// ## Behavior
/// - First write for the pair creates the record at `quantity = delta`
/// - `allow_negative` lifts the zero floor (privileged override)
/// - The floor check happens INSIDE the update statement; callers never
///   pre-read the quantity to decide whether to write
///
/// ## Arguments
/// * `conn` - Connection or transaction this write belongs to
/// * `delta` - Signed change (negative for deductions)
/// * `allow_negative` - Permit the result to go below zero
pub async fn adjust(
    conn: &mut SqliteConnection,
    branch_id: &str,
    product_id: &str,
    delta: i64,
    allow_negative: bool,
) -> DbResult<AdjustOutcome> {
    let now = Utc::now();

    debug!(branch_id = %branch_id, product_id = %product_id, delta = %delta, "Adjusting stock");

    if delta >= 0 || allow_negative {
        // No floor to enforce: upsert unconditionally.
        let quantity: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stocks (id, branch_id, product_id, quantity, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (branch_id, product_id) DO UPDATE SET
                quantity = stocks.quantity + excluded.quantity,
                updated_at = excluded.updated_at
            RETURNING quantity
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(branch_id)
        .bind(product_id)
        .bind(delta)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        return Ok(AdjustOutcome::Applied { quantity });
    }

    // Deduction with a floor: the conditional update IS the stock check.
    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE stocks
        SET quantity = quantity + ?3, updated_at = ?4
        WHERE branch_id = ?1 AND product_id = ?2 AND quantity + ?3 >= 0
        RETURNING quantity
        "#,
    )
    .bind(branch_id)
    .bind(product_id)
    .bind(delta)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some(quantity) => Ok(AdjustOutcome::Applied { quantity }),
        None => {
            // Zero rows: either the record is missing (treated as zero
            // stock) or the floor check failed. Report what's there.
            let available: Option<i64> =
                sqlx::query_scalar("SELECT quantity FROM stocks WHERE branch_id = ?1 AND product_id = ?2")
                    .bind(branch_id)
                    .bind(product_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            Ok(AdjustOutcome::Insufficient {
                available: available.unwrap_or(0),
            })
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
