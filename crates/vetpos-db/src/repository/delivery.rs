//! # Delivery Order Repository
//!
//! Dispatch records derived from sales.
//!
//! The order lifecycle runs independently of its sale, with two couplings
//! handled by the coordinators: voiding a sale fails its undelivered order,
//! and marking an order DELIVERED completes a PENDING_DELIVERY sale.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use vetpos_core::{DeliveryOrder, DeliveryStatus};

const SELECT_ORDER: &str = r#"
    SELECT id, sale_id, branch_id, assigned_user_id, status,
           customer_snapshot, shipping_cost_cents, scheduled_at,
           created_at, updated_at
    FROM delivery_orders
"#;

/// Repository for delivery order reads.
#[derive(Debug, Clone)]
pub struct DeliveryRepository {
    pool: SqlitePool,
}

impl DeliveryRepository {
    /// Creates a new DeliveryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeliveryRepository { pool }
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<DeliveryOrder>> {
        let order = sqlx::query_as::<_, DeliveryOrder>(&format!("{SELECT_ORDER} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// Gets the order created for a sale, if any.
    pub async fn find_by_sale(&self, sale_id: &str) -> DbResult<Option<DeliveryOrder>> {
        let order = sqlx::query_as::<_, DeliveryOrder>(&format!("{SELECT_ORDER} WHERE sale_id = ?1"))
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// Lists orders newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<DeliveryStatus>, limit: u32) -> DbResult<Vec<DeliveryOrder>> {
        let orders = match status {
            Some(status) => {
                sqlx::query_as::<_, DeliveryOrder>(&format!(
                    "{SELECT_ORDER} WHERE status = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
                ))
                .bind(status)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DeliveryOrder>(&format!(
                    "{SELECT_ORDER} ORDER BY created_at DESC, id DESC LIMIT ?1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(orders)
    }

    /// Lists a courier's orders plus the unassigned pool, newest first.
    ///
    /// This is the courier's work screen: everything assigned to them, and
    /// the PENDING orders nobody has picked up yet.
    pub async fn list_for_courier(&self, courier_id: &str, limit: u32) -> DbResult<Vec<DeliveryOrder>> {
        let orders = sqlx::query_as::<_, DeliveryOrder>(&format!(
            "{SELECT_ORDER} WHERE assigned_user_id = ?1 OR status = 'PENDING' \
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))
        .bind(courier_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }
}

/// Transaction-scoped order fetch.
pub async fn get(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<DeliveryOrder>> {
    let order = sqlx::query_as::<_, DeliveryOrder>(&format!("{SELECT_ORDER} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(order)
}

/// Inserts a delivery order (same transaction as its sale).
pub async fn insert(conn: &mut SqliteConnection, order: &DeliveryOrder) -> DbResult<()> {
    debug!(id = %order.id, sale_id = %order.sale_id, status = ?order.status, "Creating delivery order");

    sqlx::query(
        r#"
        INSERT INTO delivery_orders (
            id, sale_id, branch_id, assigned_user_id, status,
            customer_snapshot, shipping_cost_cents, scheduled_at,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&order.id)
    .bind(&order.sale_id)
    .bind(&order.branch_id)
    .bind(&order.assigned_user_id)
    .bind(order.status)
    .bind(Json(&order.customer_snapshot))
    .bind(order.shipping_cost_cents)
    .bind(order.scheduled_at)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Sets an order's status.
///
/// ## Returns
/// `true` if the order exists.
pub async fn set_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: DeliveryStatus,
    updated_at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query("UPDATE delivery_orders SET status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(status)
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Assigns a courier and moves the order to ASSIGNED.
pub async fn assign(
    conn: &mut SqliteConnection,
    id: &str,
    courier_id: &str,
    updated_at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE delivery_orders SET assigned_user_id = ?2, status = 'ASSIGNED', updated_at = ?3 \
         WHERE id = ?1",
    )
    .bind(id)
    .bind(courier_id)
    .bind(updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fails every non-terminal order for a sale (void cascade).
///
/// ## Returns
/// Number of orders cancelled.
pub async fn fail_open_for_sale(
    conn: &mut SqliteConnection,
    sale_id: &str,
    updated_at: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE delivery_orders SET status = 'FAILED', updated_at = ?2
        WHERE sale_id = ?1 AND status NOT IN ('DELIVERED', 'FAILED')
        "#,
    )
    .bind(sale_id)
    .bind(updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================
