//! # Sale Repository
//!
//! Database operations for sales and sale line items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. INSERT (one transaction with stock + movements)                    │
//! │     └── insert() → Sale { status: Completed | PendingDelivery }        │
//! │                                                                         │
//! │  2. (DELIVERY CHANNEL) COMPLETE                                        │
//! │     └── complete_pending_delivery() when the order is delivered        │
//! │                                                                         │
//! │  3. (OPTIONAL) VOID                                                    │
//! │     └── mark_voided() → Sale { status: Voided }  - one-way, guarded    │
//! │                                                                         │
//! │  Items are immutable after creation. There is no update path.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use vetpos_core::{Sale, SaleLineItem};

const SELECT_SALE: &str = r#"
    SELECT id, branch_id, customer_id,
           subtotal_cents, discount_cents, total_cents,
           payment_method, cash_session_id, channel, status,
           voided_by, void_reason, voided_at,
           created_by, created_at
    FROM sales
"#;

const SELECT_ITEMS: &str = r#"
    SELECT id, sale_id, product_id, name, kind,
           quantity, unit_price_cents, total_cents
    FROM sale_items
    WHERE sale_id = ?1
    ORDER BY id
"#;

/// Repository for sale reads.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale with its line items.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!("{SELECT_SALE} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(mut sale) = sale else {
            return Ok(None);
        };

        sale.items = sqlx::query_as::<_, SaleLineItem>(SELECT_ITEMS)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(sale))
    }

    /// Lists the most recent sales (items included), newest first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<Sale>> {
        let mut sales = sqlx::query_as::<_, Sale>(&format!(
            "{SELECT_SALE} ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        for sale in &mut sales {
            sale.items = sqlx::query_as::<_, SaleLineItem>(SELECT_ITEMS)
                .bind(&sale.id)
                .fetch_all(&self.pool)
                .await?;
        }

        Ok(sales)
    }

    /// Lists one creator's sales in a date window, newest first.
    pub async fn list_for_creator(
        &self,
        created_by: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<Sale>> {
        let mut sales = sqlx::query_as::<_, Sale>(&format!(
            "{SELECT_SALE} WHERE created_by = ?1 AND created_at >= ?2 AND created_at <= ?3 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(created_by)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        for sale in &mut sales {
            sale.items = sqlx::query_as::<_, SaleLineItem>(SELECT_ITEMS)
                .bind(&sale.id)
                .fetch_all(&self.pool)
                .await?;
        }

        Ok(sales)
    }
}

/// Fetches a sale with items inside a transaction (for void).
pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let sale = sqlx::query_as::<_, Sale>(&format!("{SELECT_SALE} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(mut sale) = sale else {
        return Ok(None);
    };

    sale.items = sqlx::query_as::<_, SaleLineItem>(SELECT_ITEMS)
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(Some(sale))
}

/// Inserts a sale and all of its line items.
pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(id = %sale.id, total = %sale.total_cents, items = sale.items.len(), "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, branch_id, customer_id,
            subtotal_cents, discount_cents, total_cents,
            payment_method, cash_session_id, channel, status,
            voided_by, void_reason, voided_at,
            created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.branch_id)
    .bind(&sale.customer_id)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_cents)
    .bind(sale.total_cents)
    .bind(sale.payment_method)
    .bind(&sale.cash_session_id)
    .bind(sale.channel)
    .bind(sale.status)
    .bind(&sale.voided_by)
    .bind(&sale.void_reason)
    .bind(sale.voided_at)
    .bind(&sale.created_by)
    .bind(sale.created_at)
    .execute(&mut *conn)
    .await?;

    for item in &sale.items {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, name, kind,
                quantity, unit_price_cents, total_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.name)
        .bind(item.kind)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.total_cents)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Flips a sale to VOIDED, recording who, why and when.
///
/// ## Returns
/// `true` if the flip happened; `false` if the sale was already voided
/// (the guard is part of the statement, so a racing double-void loses here
/// rather than silently repeating).
pub async fn mark_voided(
    conn: &mut SqliteConnection,
    sale_id: &str,
    voided_by: &str,
    reason: &str,
    voided_at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sales SET
            status = 'VOIDED',
            voided_by = ?2,
            void_reason = ?3,
            voided_at = ?4
        WHERE id = ?1 AND status != 'VOIDED'
        "#,
    )
    .bind(sale_id)
    .bind(voided_by)
    .bind(reason)
    .bind(voided_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Completes a PENDING_DELIVERY sale once its delivery lands.
///
/// ## Returns
/// `true` if a pending sale was completed; `false` if the sale was in any
/// other status (already completed, or voided - both are left alone).
pub async fn complete_pending_delivery(
    conn: &mut SqliteConnection,
    sale_id: &str,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE sales SET status = 'COMPLETED' WHERE id = ?1 AND status = 'PENDING_DELIVERY'",
    )
    .bind(sale_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Unit Tests
// =============================================================================
