//! # Cash Session Repository
//!
//! Till sessions and their reconciliation totals.
//!
//! ## Recompute vs Snapshot
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  OPEN session                      CLOSED session                      │
//! │  ────────────                      ──────────────                      │
//! │  sales_* columns are stale;        sales_* columns are the frozen      │
//! │  callers recompute from the        close-time snapshot; NEVER          │
//! │  sales table on every read         recomputed again                    │
//! │  (completed_totals below)                                              │
//! │                                                                         │
//! │  The ONLY write that persists totals is store_close, and its WHERE     │
//! │  clause refuses to touch a session that is already CLOSED.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use sqlx::types::Json;
use tracing::debug;

use crate::error::DbResult;
use vetpos_core::{CashSession, PaymentMethod};

const SELECT_SESSION: &str = r#"
    SELECT id, branch_id, opened_by, opened_at,
           opening_balance_cents, opening_denominations, status,
           sales_cash_cents, sales_transfer_cents, sales_debit_cents,
           sales_credit_cents, sales_debt_cents, closing_balance_expected_cents,
           closed_at, closed_by, closing_balance_real_cents, closing_denominations,
           manual_transbank_cents, manual_withdrawals_cents, manual_expenses_cents,
           manual_other_day_cash_cents, manual_other_day_transbank_cents,
           manual_debt_cents, manual_transfer_cents, manual_next_day_cash_cents,
           handover_to_user_id, handover_denominations, handover_date,
           declared_total_cents
    FROM cash_sessions
"#;

/// Completed-sale totals for one session, grouped by payment method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodTotals {
    pub cash_cents: i64,
    pub transfer_cents: i64,
    pub debit_cents: i64,
    pub credit_cents: i64,
    pub debt_cents: i64,
}

/// Repository for cash session reads and single-statement updates.
#[derive(Debug, Clone)]
pub struct CashSessionRepository {
    pool: SqlitePool,
}

impl CashSessionRepository {
    /// Creates a new CashSessionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CashSessionRepository { pool }
    }

    /// Gets a session by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(&format!("{SELECT_SESSION} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    /// Finds the OPEN session for a `(branch, operator)` pair, if any.
    pub async fn find_open(&self, branch_id: &str, opened_by: &str) -> DbResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(&format!(
            "{SELECT_SESSION} WHERE branch_id = ?1 AND opened_by = ?2 AND status = 'OPEN'"
        ))
        .bind(branch_id)
        .bind(opened_by)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Lists sessions newest first, optionally scoped to a branch.
    pub async fn history(&self, branch_id: Option<&str>, limit: u32) -> DbResult<Vec<CashSession>> {
        let sessions = match branch_id {
            Some(branch) => {
                sqlx::query_as::<_, CashSession>(&format!(
                    "{SELECT_SESSION} WHERE branch_id = ?1 ORDER BY opened_at DESC, id DESC LIMIT ?2"
                ))
                .bind(branch)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, CashSession>(&format!(
                    "{SELECT_SESSION} ORDER BY opened_at DESC, id DESC LIMIT ?1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(sessions)
    }

    /// Updates the handover fields on a session, open or closed.
    ///
    /// Handover is drawer logistics, not reconciliation: the operator may
    /// record who receives tomorrow's float after the session is closed.
    ///
    /// ## Returns
    /// `true` if the session exists.
    pub async fn update_handover(
        &self,
        session_id: &str,
        handover_to_user_id: Option<&str>,
        handover_denominations: &vetpos_core::Denominations,
        handover_date: Option<&str>,
        manual_next_day_cash_cents: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cash_sessions SET
                handover_to_user_id = ?2,
                handover_denominations = ?3,
                handover_date = ?4,
                manual_next_day_cash_cents = ?5
            WHERE id = ?1
            "#,
        )
        .bind(session_id)
        .bind(handover_to_user_id)
        .bind(Json(handover_denominations))
        .bind(handover_date)
        .bind(manual_next_day_cash_cents)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Transaction-scoped session fetch.
pub async fn get(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<CashSession>> {
    let session = sqlx::query_as::<_, CashSession>(&format!("{SELECT_SESSION} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(session)
}

/// Transaction-scoped lookup of the OPEN session for `(branch, operator)`.
///
/// Used by the sale coordinator to tag sales with the operator's session.
pub async fn find_open(
    conn: &mut SqliteConnection,
    branch_id: &str,
    opened_by: &str,
) -> DbResult<Option<CashSession>> {
    let session = sqlx::query_as::<_, CashSession>(&format!(
        "{SELECT_SESSION} WHERE branch_id = ?1 AND opened_by = ?2 AND status = 'OPEN'"
    ))
    .bind(branch_id)
    .bind(opened_by)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(session)
}

/// Inserts a freshly opened session.
///
/// The partial unique index on `(branch_id, opened_by) WHERE status = 'OPEN'`
/// makes a racing second open fail with a unique violation instead of
/// producing two live drawers.
pub async fn insert(conn: &mut SqliteConnection, session: &CashSession) -> DbResult<()> {
    debug!(id = %session.id, branch_id = %session.branch_id, opened_by = %session.opened_by, "Opening cash session");

    sqlx::query(
        r#"
        INSERT INTO cash_sessions (
            id, branch_id, opened_by, opened_at,
            opening_balance_cents, opening_denominations, status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&session.id)
    .bind(&session.branch_id)
    .bind(&session.opened_by)
    .bind(session.opened_at)
    .bind(session.opening_balance_cents)
    .bind(Json(&session.opening_denominations))
    .bind(session.status)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Sums COMPLETED sales tagged with this session, grouped by method.
pub async fn completed_totals(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<MethodTotals> {
    let rows: Vec<(PaymentMethod, i64)> = sqlx::query_as(
        r#"
        SELECT payment_method, COALESCE(SUM(total_cents), 0)
        FROM sales
        WHERE cash_session_id = ?1 AND status = 'COMPLETED'
        GROUP BY payment_method
        "#,
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut totals = MethodTotals::default();
    for (method, cents) in rows {
        match method {
            PaymentMethod::Cash => totals.cash_cents = cents,
            PaymentMethod::Transfer => totals.transfer_cents = cents,
            PaymentMethod::Debit => totals.debit_cents = cents,
            PaymentMethod::Credit => totals.credit_cents = cents,
            PaymentMethod::Debt => totals.debt_cents = cents,
        }
    }

    Ok(totals)
}

/// Persists the close: frozen totals, manual fields, status CLOSED.
///
/// ## Returns
/// `true` if the session was OPEN and is now CLOSED; `false` if it was
/// already closed (the caller surfaces that as a conflict).
pub async fn store_close(conn: &mut SqliteConnection, session: &CashSession) -> DbResult<bool> {
    debug!(id = %session.id, declared_total = %session.declared_total_cents, "Closing cash session");

    let result = sqlx::query(
        r#"
        UPDATE cash_sessions SET
            status = 'CLOSED',
            closed_at = ?2,
            closed_by = ?3,
            sales_cash_cents = ?4,
            sales_transfer_cents = ?5,
            sales_debit_cents = ?6,
            sales_credit_cents = ?7,
            sales_debt_cents = ?8,
            closing_balance_expected_cents = ?9,
            closing_balance_real_cents = ?10,
            closing_denominations = ?11,
            manual_transbank_cents = ?12,
            manual_withdrawals_cents = ?13,
            manual_expenses_cents = ?14,
            manual_other_day_cash_cents = ?15,
            manual_other_day_transbank_cents = ?16,
            manual_debt_cents = ?17,
            manual_transfer_cents = ?18,
            manual_next_day_cash_cents = ?19,
            handover_to_user_id = ?20,
            handover_denominations = ?21,
            handover_date = ?22,
            declared_total_cents = ?23
        WHERE id = ?1 AND status = 'OPEN'
        "#,
    )
    .bind(&session.id)
    .bind(session.closed_at)
    .bind(&session.closed_by)
    .bind(session.sales_cash_cents)
    .bind(session.sales_transfer_cents)
    .bind(session.sales_debit_cents)
    .bind(session.sales_credit_cents)
    .bind(session.sales_debt_cents)
    .bind(session.closing_balance_expected_cents)
    .bind(session.closing_balance_real_cents)
    .bind(Json(&session.closing_denominations))
    .bind(session.manual_transbank_cents)
    .bind(session.manual_withdrawals_cents)
    .bind(session.manual_expenses_cents)
    .bind(session.manual_other_day_cash_cents)
    .bind(session.manual_other_day_transbank_cents)
    .bind(session.manual_debt_cents)
    .bind(session.manual_transfer_cents)
    .bind(session.manual_next_day_cash_cents)
    .bind(&session.handover_to_user_id)
    .bind(Json(&session.handover_denominations))
    .bind(&session.handover_date)
    .bind(session.declared_total_cents)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Unit Tests
// =============================================================================
