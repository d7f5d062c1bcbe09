//! # Customer Repository
//!
//! Customer records and their running balances.
//!
//! ## Balance Updates Are Deltas
//! Balances only ever move by relative amounts
//! (`debt_cents = debt_cents + ?`), never by absolute assignment: two
//! concurrent sales for the same customer both land, in either order,
//! without one overwriting the other.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use vetpos_core::Customer;

const SELECT_CUSTOMER: &str = r#"
    SELECT id, first_name, last_name, phone, email, notes,
           discount_bps, debt_cents, total_spent_cents, created_at
    FROM customers
"#;

/// Repository for customer reads and registration.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(&format!("{SELECT_CUSTOMER} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    /// Lists customers carrying outstanding debt, largest first.
    pub async fn list_debtors(&self, limit: u32) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(&format!(
            "{SELECT_CUSTOMER} WHERE debt_cents > 0 ORDER BY debt_cents DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Inserts a customer record.
    ///
    /// Customer CRUD lives in the surrounding application; this exists so
    /// the balance tracker (and its tests) has records to operate on.
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, first_name, last_name, phone, email, notes,
                discount_bps, debt_cents, total_spent_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(&customer.notes)
        .bind(customer.discount_bps)
        .bind(customer.debt_cents)
        .bind(customer.total_spent_cents)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Transaction-scoped customer fetch.
pub async fn get(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(&format!("{SELECT_CUSTOMER} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(customer)
}

/// Applies relative balance changes to a customer.
///
/// ## Arguments
/// * `debt_delta_cents` - Change to the running debt. Negative for payments
///   and reversals; the result may go below zero (credit balance kept, not
///   clamped - overpayment information is never thrown away)
/// * `spent_delta_cents` - Change to the lifetime spend
///
/// ## Returns
/// `true` if the customer exists.
pub async fn adjust_balances(
    conn: &mut SqliteConnection,
    id: &str,
    debt_delta_cents: i64,
    spent_delta_cents: i64,
) -> DbResult<bool> {
    debug!(
        id = %id,
        debt_delta = %debt_delta_cents,
        spent_delta = %spent_delta_cents,
        "Adjusting customer balances"
    );

    let result = sqlx::query(
        r#"
        UPDATE customers SET
            debt_cents = debt_cents + ?2,
            total_spent_cents = total_spent_cents + ?3
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(debt_delta_cents)
    .bind(spent_delta_cents)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Unit Tests
// =============================================================================
