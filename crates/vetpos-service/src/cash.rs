//! # Cash Session Aggregator
//!
//! Groups sales under a till session, recomputes payment-method totals on
//! demand, and merges manually entered reconciliation fields at close time.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   open(branch, operator) ──────► OPEN ── close(manual fields) ──► CLOSED│
//! │        │                          │                                 │   │
//! │        │ already open?            │ current(): totals recomputed    │   │
//! │        └── returns the existing   │ live from COMPLETED sales       │   │
//! │            session (idempotent)   │ tagged with the session id      │   │
//! │                                   │                                 │   │
//! │                                   ▼                                 ▼   │
//! │                        expected_cash =              totals frozen;      │
//! │                        opening + sales_cash         reads return the    │
//! │                                                     stored snapshot     │
//! │                                                                         │
//! │  close() is the ONLY path that persists computed totals, and a closed  │
//! │  session is never recomputed again.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use vetpos_core::{
    validation, Actor, CashSession, CloseSessionCommand, Denominations, HandoverCommand,
    OpenSessionCommand, SessionStatus,
};
use vetpos_db::repository::cash_session::{self, MethodTotals};
use vetpos_db::{Database, DbError};

/// Coordinator for till sessions.
#[derive(Debug, Clone)]
pub struct CashService {
    db: Database,
}

impl CashService {
    /// Creates a new CashService.
    pub fn new(db: Database) -> Self {
        CashService { db }
    }

    /// Opens a session for `(branch, operator)`, or returns the one already
    /// open - opening is idempotent, a drawer can't be opened twice.
    pub async fn open_session(
        &self,
        cmd: OpenSessionCommand,
        actor: &Actor,
    ) -> ServiceResult<CashSession> {
        validation::validate_open_session(&cmd)?;

        if let Some(existing) = self
            .db
            .cash_sessions()
            .find_open(&cmd.branch_id, &actor.id)
            .await?
        {
            return self.with_live_totals(existing).await;
        }

        let session = CashSession {
            id: Uuid::new_v4().to_string(),
            branch_id: cmd.branch_id.clone(),
            opened_by: actor.id.clone(),
            opened_at: Utc::now(),
            opening_balance_cents: cmd.opening_balance_cents,
            opening_denominations: cmd.opening_denominations.clone(),
            status: SessionStatus::Open,
            sales_cash_cents: 0,
            sales_transfer_cents: 0,
            sales_debit_cents: 0,
            sales_credit_cents: 0,
            sales_debt_cents: 0,
            closing_balance_expected_cents: cmd.opening_balance_cents,
            closed_at: None,
            closed_by: None,
            closing_balance_real_cents: 0,
            closing_denominations: Denominations::new(),
            manual_transbank_cents: 0,
            manual_withdrawals_cents: 0,
            manual_expenses_cents: 0,
            manual_other_day_cash_cents: 0,
            manual_other_day_transbank_cents: 0,
            manual_debt_cents: 0,
            manual_transfer_cents: 0,
            manual_next_day_cash_cents: 0,
            handover_to_user_id: None,
            handover_denominations: Denominations::new(),
            handover_date: None,
            declared_total_cents: 0,
        };

        let mut tx = self.db.begin().await?;
        match cash_session::insert(&mut tx, &session).await {
            Ok(()) => {}
            // Lost an open race: someone else's insert hit the partial
            // unique index first. Their session is the session.
            Err(DbError::UniqueViolation { .. }) => {
                drop(tx);
                if let Some(existing) = self
                    .db
                    .cash_sessions()
                    .find_open(&cmd.branch_id, &actor.id)
                    .await?
                {
                    return self.with_live_totals(existing).await;
                }
                return Err(ServiceError::conflict("session open race lost"));
            }
            Err(other) => return Err(other.into()),
        }
        tx.commit().await?;

        info!(
            session_id = %session.id,
            branch_id = %session.branch_id,
            opened_by = %session.opened_by,
            opening_balance = %session.opening_balance_cents,
            "Cash session opened"
        );

        Ok(session)
    }

    /// The operator's OPEN session at a branch, with live totals.
    pub async fn current_session(
        &self,
        branch_id: &str,
        actor: &Actor,
    ) -> ServiceResult<Option<CashSession>> {
        match self.db.cash_sessions().find_open(branch_id, &actor.id).await? {
            Some(session) => Ok(Some(self.with_live_totals(session).await?)),
            None => Ok(None),
        }
    }

    /// Gets a session by id.
    ///
    /// OPEN sessions get their totals recomputed live; CLOSED sessions
    /// return the frozen close-time snapshot untouched.
    pub async fn get_session(&self, session_id: &str) -> ServiceResult<CashSession> {
        let session = self
            .db
            .cash_sessions()
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("CashSession", session_id))?;

        if session.is_open() {
            self.with_live_totals(session).await
        } else {
            Ok(session)
        }
    }

    /// Closes a session: recomputes totals one final time, merges the
    /// operator's manual fields, freezes the declared total, marks CLOSED.
    ///
    /// ## Errors
    /// - `NotFound` - unknown session id
    /// - `Conflict` - the session is already closed
    pub async fn close_session(
        &self,
        session_id: &str,
        cmd: CloseSessionCommand,
        actor: &Actor,
    ) -> ServiceResult<CashSession> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let mut session = cash_session::get(&mut tx, session_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("CashSession", session_id))?;
        if !session.is_open() {
            return Err(ServiceError::conflict(format!(
                "cash session {session_id} already closed"
            )));
        }

        // Final recomputation, inside the same transaction that freezes it.
        let totals = cash_session::completed_totals(&mut tx, session_id).await?;
        apply_totals(&mut session, totals);

        session.closing_balance_real_cents = cmd.closing_balance_real_cents;
        session.closing_denominations = cmd.closing_denominations.clone();
        session.manual_transbank_cents = cmd.manual_transbank_cents;
        session.manual_withdrawals_cents = cmd.manual_withdrawals_cents;
        session.manual_expenses_cents = cmd.manual_expenses_cents;
        session.manual_other_day_cash_cents = cmd.manual_other_day_cash_cents;
        session.manual_other_day_transbank_cents = cmd.manual_other_day_transbank_cents;
        session.manual_debt_cents = cmd.manual_debt_cents;
        session.manual_transfer_cents = cmd.manual_transfer_cents;
        session.manual_next_day_cash_cents = cmd.manual_next_day_cash_cents;
        session.handover_to_user_id = cmd.handover_to_user_id.clone();
        session.handover_denominations = cmd.handover_denominations.clone();
        session.handover_date = cmd.handover_date.clone();

        session.status = SessionStatus::Closed;
        session.closed_at = Some(now);
        session.closed_by = Some(actor.id.clone());
        session.declared_total_cents = session.compute_declared_total().cents();

        let closed = cash_session::store_close(&mut tx, &session).await?;
        if !closed {
            return Err(ServiceError::conflict(format!(
                "cash session {session_id} already closed"
            )));
        }
        tx.commit().await?;

        info!(
            session_id = %session.id,
            closed_by = %actor.id,
            expected_cash = %session.closing_balance_expected_cents,
            counted_cash = %session.closing_balance_real_cents,
            declared_total = %session.declared_total_cents,
            "Cash session closed"
        );

        Ok(session)
    }

    /// Records who the drawer is handed to for the next day. Works on open
    /// and closed sessions: handover is drawer logistics, not part of the
    /// frozen reconciliation.
    pub async fn update_handover(
        &self,
        session_id: &str,
        cmd: HandoverCommand,
    ) -> ServiceResult<CashSession> {
        let updated = self
            .db
            .cash_sessions()
            .update_handover(
                session_id,
                cmd.handover_to_user_id.as_deref(),
                &cmd.handover_denominations,
                cmd.handover_date.as_deref(),
                cmd.manual_next_day_cash_cents,
            )
            .await?;
        if !updated {
            return Err(ServiceError::not_found("CashSession", session_id));
        }

        info!(session_id = %session_id, "Handover details updated");

        // Closed sessions come back as the stored snapshot.
        self.get_session(session_id).await
    }

    /// Session history, newest first, optionally scoped to a branch.
    pub async fn session_history(
        &self,
        branch_id: Option<&str>,
        limit: u32,
    ) -> ServiceResult<Vec<CashSession>> {
        Ok(self.db.cash_sessions().history(branch_id, limit).await?)
    }

    /// Recomputes an OPEN session's totals from its COMPLETED sales.
    async fn with_live_totals(&self, mut session: CashSession) -> ServiceResult<CashSession> {
        let mut conn = self.db.pool().acquire().await.map_err(DbError::from)?;
        let totals = cash_session::completed_totals(&mut conn, &session.id).await?;
        apply_totals(&mut session, totals);
        Ok(session)
    }
}

/// Writes recomputed totals onto the session struct.
fn apply_totals(session: &mut CashSession, totals: MethodTotals) {
    session.sales_cash_cents = totals.cash_cents;
    session.sales_transfer_cents = totals.transfer_cents;
    session.sales_debit_cents = totals.debit_cents;
    session.sales_credit_cents = totals.credit_cents;
    session.sales_debt_cents = totals.debt_cents;
    session.closing_balance_expected_cents =
        session.opening_balance_cents + totals.cash_cents;
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryService;
    use crate::sales::SaleService;
    use vetpos_core::{
        CreateMovementCommand, CreateSaleCommand, LineKind, MovementType, PaymentMethod,
        SaleLineInput,
    };
    use vetpos_db::DbConfig;

    struct Harness {
        cash: CashService,
        sales: SaleService,
        inventory: InventoryService,
    }

    async fn harness() -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Harness {
            cash: CashService::new(db.clone()),
            sales: SaleService::new(db.clone()),
            inventory: InventoryService::new(db),
        }
    }

    fn operator() -> Actor {
        Actor {
            id: "u-operator".to_string(),
            name: "Operator".to_string(),
            roles: vec!["sales".to_string()],
        }
    }

    fn open_cmd(branch: &str, opening: i64) -> OpenSessionCommand {
        OpenSessionCommand {
            branch_id: branch.to_string(),
            opening_balance_cents: opening,
            opening_denominations: Denominations::new(),
        }
    }

    async fn seed_and_sell(h: &Harness, method: PaymentMethod, total: i64) {
        h.inventory
            .create_movement(
                CreateMovementCommand {
                    movement_type: MovementType::In,
                    product_id: "p1".to_string(),
                    quantity: 1,
                    from_branch_id: None,
                    to_branch_id: Some("b1".to_string()),
                    reason: "restock".to_string(),
                },
                &operator(),
            )
            .await
            .unwrap();

        let customer_id = if method == PaymentMethod::Debt {
            // Register a debtor account on demand.
            let id = format!("c-{total}");
            h.sales_db()
                .customers()
                .insert(&vetpos_core::Customer {
                    id: id.clone(),
                    first_name: "Cliente".to_string(),
                    last_name: "Deudor".to_string(),
                    phone: "-".to_string(),
                    email: None,
                    notes: None,
                    discount_bps: 0,
                    debt_cents: 0,
                    total_spent_cents: 0,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
            Some(id)
        } else {
            None
        };

        h.sales
            .create_sale(
                CreateSaleCommand {
                    branch_id: "b1".to_string(),
                    customer_id,
                    items: vec![SaleLineInput {
                        product_id: Some("p1".to_string()),
                        name: "Product".to_string(),
                        kind: LineKind::Product,
                        quantity: 1,
                        unit_price_cents: total,
                        total_cents: total,
                    }],
                    subtotal_cents: total,
                    discount_cents: 0,
                    total_cents: total,
                    payment_method: method,
                    cash_session_id: None,
                    delivery: None,
                },
                &operator(),
            )
            .await
            .unwrap();
    }

    impl Harness {
        fn sales_db(&self) -> &Database {
            // The services share one Database clone; reach through cash.
            &self.cash.db
        }
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let h = harness().await;

        let first = h.cash.open_session(open_cmd("b1", 10_000), &operator()).await.unwrap();
        let second = h.cash.open_session(open_cmd("b1", 99_999), &operator()).await.unwrap();
        assert_eq!(first.id, second.id);
        // The original opening balance stands; the second request's numbers
        // are ignored.
        assert_eq!(second.opening_balance_cents, 10_000);
    }

    #[tokio::test]
    async fn test_current_session_recomputes_live_totals() {
        let h = harness().await;
        let session = h.cash.open_session(open_cmd("b1", 5_000), &operator()).await.unwrap();

        seed_and_sell(&h, PaymentMethod::Cash, 1_000).await;
        seed_and_sell(&h, PaymentMethod::Transfer, 500).await;

        let current = h.cash.current_session("b1", &operator()).await.unwrap().unwrap();
        assert_eq!(current.id, session.id);
        assert_eq!(current.sales_cash_cents, 1_000);
        assert_eq!(current.sales_transfer_cents, 500);
        assert_eq!(current.closing_balance_expected_cents, 6_000);
    }

    #[tokio::test]
    async fn test_close_freezes_totals_and_declared_formula() {
        let h = harness().await;
        let session = h.cash.open_session(open_cmd("b1", 5_000), &operator()).await.unwrap();

        seed_and_sell(&h, PaymentMethod::Cash, 1_000).await;
        seed_and_sell(&h, PaymentMethod::Transfer, 500).await;
        seed_and_sell(&h, PaymentMethod::Debt, 2_000).await;

        let closed = h
            .cash
            .close_session(
                &session.id,
                CloseSessionCommand {
                    closing_balance_real_cents: 6_000,
                    manual_debt_cents: 2_000,
                    manual_transbank_cents: 0,
                    manual_transfer_cents: 500,
                    manual_withdrawals_cents: 300,
                    manual_expenses_cents: 200,
                    manual_other_day_cash_cents: 100,
                    manual_other_day_transbank_cents: 0,
                    ..Default::default()
                },
                &operator(),
            )
            .await
            .unwrap();

        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.sales_cash_cents, 1_000);
        assert_eq!(closed.sales_transfer_cents, 500);
        assert_eq!(closed.sales_debt_cents, 2_000);
        assert_eq!(closed.closing_balance_expected_cents, 6_000);
        // 6000 + 2000 + 0 + 500 - 300 - 200 + 100 + 0
        assert_eq!(closed.declared_total_cents, 8_100);
    }

    #[tokio::test]
    async fn test_close_twice_conflicts() {
        let h = harness().await;
        let session = h.cash.open_session(open_cmd("b1", 0), &operator()).await.unwrap();

        h.cash
            .close_session(&session.id, CloseSessionCommand::default(), &operator())
            .await
            .unwrap();
        let err = h
            .cash
            .close_session(&session.id, CloseSessionCommand::default(), &operator())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_closed_session_snapshot_is_never_recomputed() {
        let h = harness().await;
        let session = h.cash.open_session(open_cmd("b1", 0), &operator()).await.unwrap();
        seed_and_sell(&h, PaymentMethod::Cash, 1_000).await;

        let closed = h
            .cash
            .close_session(&session.id, CloseSessionCommand::default(), &operator())
            .await
            .unwrap();
        assert_eq!(closed.sales_cash_cents, 1_000);

        // A sale tagged to the closed session afterwards (e.g. an explicit
        // tag) must not alter the stored snapshot.
        h.inventory
            .create_movement(
                CreateMovementCommand {
                    movement_type: MovementType::In,
                    product_id: "p9".to_string(),
                    quantity: 1,
                    from_branch_id: None,
                    to_branch_id: Some("b1".to_string()),
                    reason: "restock".to_string(),
                },
                &operator(),
            )
            .await
            .unwrap();
        h.sales
            .create_sale(
                CreateSaleCommand {
                    branch_id: "b1".to_string(),
                    customer_id: None,
                    items: vec![SaleLineInput {
                        product_id: Some("p9".to_string()),
                        name: "Late sale".to_string(),
                        kind: LineKind::Product,
                        quantity: 1,
                        unit_price_cents: 9_999,
                        total_cents: 9_999,
                    }],
                    subtotal_cents: 9_999,
                    discount_cents: 0,
                    total_cents: 9_999,
                    payment_method: PaymentMethod::Cash,
                    cash_session_id: Some(session.id.clone()),
                    delivery: None,
                },
                &operator(),
            )
            .await
            .unwrap();

        let fetched = h.cash.get_session(&session.id).await.unwrap();
        assert_eq!(fetched.sales_cash_cents, 1_000);
    }

    #[tokio::test]
    async fn test_handover_editable_after_close() {
        let h = harness().await;
        let session = h.cash.open_session(open_cmd("b1", 0), &operator()).await.unwrap();
        h.cash
            .close_session(&session.id, CloseSessionCommand::default(), &operator())
            .await
            .unwrap();

        let mut denominations = Denominations::new();
        denominations.insert("10000".to_string(), 3);
        let updated = h
            .cash
            .update_handover(
                &session.id,
                HandoverCommand {
                    handover_to_user_id: Some("u-next".to_string()),
                    handover_denominations: denominations,
                    handover_date: Some("2026-08-08".to_string()),
                    manual_next_day_cash_cents: 30_000,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.handover_to_user_id.as_deref(), Some("u-next"));
        assert_eq!(updated.manual_next_day_cash_cents, 30_000);
        assert_eq!(updated.status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn test_operator_can_reopen_after_close() {
        let h = harness().await;
        let first = h.cash.open_session(open_cmd("b1", 0), &operator()).await.unwrap();
        h.cash
            .close_session(&first.id, CloseSessionCommand::default(), &operator())
            .await
            .unwrap();

        let second = h.cash.open_session(open_cmd("b1", 500), &operator()).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(h.cash.session_history(Some("b1"), 10).await.unwrap().len(), 2);
    }
}
