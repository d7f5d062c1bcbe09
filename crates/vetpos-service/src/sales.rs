//! # Sale Transaction Coordinator
//!
//! Orchestrates creation and voiding of sales: stock deduction/restoration,
//! journal entries, customer balance updates and delivery-order creation,
//! as one logical unit.
//!
//! ## The Sale Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_sale                                                            │
//! │                                                                         │
//! │  validate command ─── fails here? NOTHING has been touched             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │   1. check customer (DEBT sales need a live account)                   │
//! │   2. ledger: conditional deduction per PRODUCT line                    │
//! │   3. sale + line items                                                 │
//! │   4. journal: one SALE entry per PRODUCT line, keyed (sale, line)      │
//! │   5. customer balances (debt and/or lifetime spend)                    │
//! │   6. delivery order (customer snapshot frozen here)                    │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Failure at ANY step aborts the transaction. The sale never exists     │
//! │  without its movements, nor movements without matching ledger state.   │
//! │                                                                         │
//! │  void_sale is the structural inverse: restore ledger, append           │
//! │  VOID_SALE entries, flip status (guarded - a second void is a          │
//! │  conflict, not a repeat), reverse customer balances, fail the          │
//! │  undelivered delivery order.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::inventory::require_applied;
use vetpos_core::{
    validation, Actor, CreateSaleCommand, DeliveryOrder, DeliveryStatus, InventoryMovement,
    LineKind, MovementType, PaymentMethod, Sale, SaleChannel, SaleLineItem, SaleStatus,
};
use vetpos_db::repository::{cash_session, customer, delivery, movement, sale, stock};
use vetpos_db::Database;

/// What `create_sale` hands back: the persisted sale and, when dispatch was
/// requested, its delivery order.
#[derive(Debug, Clone, Serialize)]
pub struct SaleReceipt {
    pub sale: Sale,
    pub delivery: Option<DeliveryOrder>,
}

/// Coordinator for sale creation and voiding.
#[derive(Debug, Clone)]
pub struct SaleService {
    db: Database,
}

impl SaleService {
    /// Creates a new SaleService.
    pub fn new(db: Database) -> Self {
        SaleService { db }
    }

    /// Gets a sale with its line items.
    pub async fn get_sale(&self, id: &str) -> ServiceResult<Sale> {
        self.db
            .sales()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sale", id))
    }

    /// Lists the most recent sales, newest first.
    pub async fn list_recent(&self, limit: u32) -> ServiceResult<Vec<Sale>> {
        Ok(self.db.sales().list_recent(limit).await?)
    }

    /// Lists one creator's sales in a date window ("my sales" screen).
    pub async fn list_for_creator(
        &self,
        created_by: &str,
        from: chrono::DateTime<Utc>,
        to: chrono::DateTime<Utc>,
    ) -> ServiceResult<Vec<Sale>> {
        Ok(self.db.sales().list_for_creator(created_by, from, to).await?)
    }

    /// Creates a sale.
    ///
    /// ## Stock Override
    /// PRODUCT lines without sufficient branch stock reject the whole sale,
    /// unless the actor is privileged - then the deduction proceeds into
    /// negative quantity and is logged.
    ///
    /// ## Session Tagging
    /// The sale is tagged with `cmd.cash_session_id` when given; otherwise
    /// with the actor's OPEN session at the branch, if any. Reconciliation
    /// later sums COMPLETED sales by that tag.
    pub async fn create_sale(
        &self,
        cmd: CreateSaleCommand,
        actor: &Actor,
    ) -> ServiceResult<SaleReceipt> {
        validation::validate_sale(&cmd)?;

        let now = Utc::now();
        let sale_id = Uuid::new_v4().to_string();
        let mut tx = self.db.begin().await?;

        // Customer lookup up front: a DEBT sale against a missing account
        // must fail before any stock effect.
        let customer = match cmd.customer_id.as_deref() {
            Some(id) => customer::get(&mut tx, id).await?,
            None => None,
        };
        if cmd.payment_method == PaymentMethod::Debt && customer.is_none() {
            return Err(ServiceError::not_found(
                "Customer",
                cmd.customer_id.as_deref().unwrap_or(""),
            ));
        }

        // 1. Ledger deductions, one conditional update per PRODUCT line.
        for line in &cmd.items {
            if line.kind != LineKind::Product {
                continue;
            }
            let Some(product_id) = line.product_id.as_deref() else {
                continue; // validate_sale guarantees this for PRODUCT lines
            };

            let outcome = stock::adjust(
                &mut tx,
                &cmd.branch_id,
                product_id,
                -line.quantity,
                actor.is_privileged(),
            )
            .await?;
            let quantity = require_applied(outcome, &cmd.branch_id, product_id, line.quantity)?;
            if quantity < 0 {
                warn!(
                    branch_id = %cmd.branch_id,
                    product_id = %product_id,
                    quantity = %quantity,
                    actor = %actor.id,
                    "Sale drove stock negative under privileged override"
                );
            }
        }

        // Resolve the till session this sale reconciles under.
        let cash_session_id = match cmd.cash_session_id.clone() {
            Some(id) => Some(id),
            None => cash_session::find_open(&mut tx, &cmd.branch_id, &actor.id)
                .await?
                .map(|s| s.id),
        };

        // 2. The sale and its lines.
        let items: Vec<SaleLineItem> = cmd
            .items
            .iter()
            .map(|line| SaleLineItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                product_id: line.product_id.clone(),
                name: line.name.clone(),
                kind: line.kind,
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                total_cents: line.total_cents,
            })
            .collect();

        let sale = Sale {
            id: sale_id.clone(),
            branch_id: cmd.branch_id.clone(),
            customer_id: cmd.customer_id.clone(),
            items,
            subtotal_cents: cmd.subtotal_cents,
            discount_cents: cmd.discount_cents,
            total_cents: cmd.total_cents,
            payment_method: cmd.payment_method,
            cash_session_id,
            channel: if cmd.delivery.is_some() {
                SaleChannel::Delivery
            } else {
                SaleChannel::Store
            },
            status: if cmd.delivery.is_some() {
                SaleStatus::PendingDelivery
            } else {
                SaleStatus::Completed
            },
            voided_by: None,
            void_reason: None,
            voided_at: None,
            created_by: actor.id.clone(),
            created_at: now,
        };
        sale::insert(&mut tx, &sale).await?;

        // 3. Journal entries, keyed by (sale, line index).
        for (index, line) in cmd.items.iter().enumerate() {
            if line.kind != LineKind::Product {
                continue;
            }
            let Some(product_id) = line.product_id.as_deref() else {
                continue;
            };

            movement::append(
                &mut tx,
                &InventoryMovement {
                    id: Uuid::new_v4().to_string(),
                    movement_type: MovementType::Sale,
                    product_id: product_id.to_string(),
                    quantity: line.quantity,
                    from_branch_id: Some(cmd.branch_id.clone()),
                    to_branch_id: None,
                    reason: "POS sale".to_string(),
                    reference_sale_id: Some(sale_id.clone()),
                    line_index: Some(index as i64),
                    created_by: actor.id.clone(),
                    created_at: now,
                },
            )
            .await?;
        }

        // 4. Customer balances. DEBT increases the running debt and the
        // lifetime spend; any other method increases the spend only.
        if let Some(customer) = &customer {
            let debt_delta = if cmd.payment_method == PaymentMethod::Debt {
                cmd.total_cents
            } else {
                0
            };
            customer::adjust_balances(&mut tx, &customer.id, debt_delta, cmd.total_cents).await?;
        }

        // 5. Delivery order, carrying the contact snapshot.
        let delivery = if let Some(request) = &cmd.delivery {
            let order = DeliveryOrder {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                branch_id: cmd.branch_id.clone(),
                assigned_user_id: request.assigned_user_id.clone(),
                status: if request.assigned_user_id.is_some() {
                    DeliveryStatus::Assigned
                } else {
                    DeliveryStatus::Pending
                },
                customer_snapshot: request.customer_snapshot.clone(),
                shipping_cost_cents: request.shipping_cost_cents,
                scheduled_at: request.scheduled_at,
                created_at: now,
                updated_at: now,
            };
            delivery::insert(&mut tx, &order).await?;
            Some(order)
        } else {
            None
        };

        tx.commit().await?;

        info!(
            sale_id = %sale.id,
            branch_id = %sale.branch_id,
            total = %sale.total_cents,
            payment_method = ?sale.payment_method,
            items = sale.items.len(),
            delivery = delivery.is_some(),
            "Sale created"
        );

        Ok(SaleReceipt { sale, delivery })
    }

    /// Voids a sale, reversing exactly the effects its creation applied.
    ///
    /// Privileged actors only. A second void attempt is rejected with
    /// [`ServiceError::Conflict`], never silently repeated.
    pub async fn void_sale(&self, sale_id: &str, actor: &Actor, reason: &str) -> ServiceResult<Sale> {
        if !actor.is_privileged() {
            return Err(ServiceError::forbidden("only administrators can void sales"));
        }
        validation::validate_reason(reason)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let mut sale = sale::fetch(&mut tx, sale_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sale", sale_id))?;
        if sale.is_voided() {
            return Err(ServiceError::conflict(format!("sale {sale_id} already voided")));
        }

        // Restore the ledger and journal the restoration, line by line.
        for (index, item) in sale.items.iter().enumerate() {
            if item.kind != LineKind::Product {
                continue;
            }
            let Some(product_id) = item.product_id.as_deref() else {
                continue;
            };

            stock::adjust(&mut tx, &sale.branch_id, product_id, item.quantity, false).await?;
            movement::append(
                &mut tx,
                &InventoryMovement {
                    id: Uuid::new_v4().to_string(),
                    movement_type: MovementType::VoidSale,
                    product_id: product_id.to_string(),
                    quantity: item.quantity,
                    from_branch_id: None,
                    to_branch_id: Some(sale.branch_id.clone()),
                    reason: reason.to_string(),
                    reference_sale_id: Some(sale.id.clone()),
                    line_index: Some(index as i64),
                    created_by: actor.id.clone(),
                    created_at: now,
                },
            )
            .await?;
        }

        // One-way status flip; the guard inside the statement makes a
        // racing double-void lose cleanly.
        let flipped = sale::mark_voided(&mut tx, sale_id, &actor.id, reason, now).await?;
        if !flipped {
            return Err(ServiceError::conflict(format!("sale {sale_id} already voided")));
        }

        // Reverse the customer-balance effects creation applied. The debt
        // of a DEBT sale comes back off the account: voided inventory and
        // an open invoice must not survive together.
        if let Some(customer_id) = &sale.customer_id {
            let debt_delta = if sale.payment_method == PaymentMethod::Debt {
                -sale.total_cents
            } else {
                0
            };
            // A sale recorded against an untracked customer id applied no
            // balance change at creation, so zero rows here is symmetric.
            customer::adjust_balances(&mut tx, customer_id, debt_delta, -sale.total_cents).await?;
        }

        // Cascade: an undelivered order for this sale is failed.
        let cancelled = delivery::fail_open_for_sale(&mut tx, sale_id, now).await?;

        tx.commit().await?;

        sale.status = SaleStatus::Voided;
        sale.voided_by = Some(actor.id.clone());
        sale.void_reason = Some(reason.to_string());
        sale.voided_at = Some(now);

        info!(
            sale_id = %sale.id,
            actor = %actor.id,
            cancelled_deliveries = cancelled,
            "Sale voided"
        );

        Ok(sale)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cash::CashService;
    use crate::inventory::InventoryService;
    use vetpos_core::{
        CreateMovementCommand, Customer, CustomerSnapshot, DeliveryRequest, Denominations,
        OpenSessionCommand, SaleLineInput,
    };
    use vetpos_db::DbConfig;

    fn init_tracing() {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter("warn")
                .try_init();
        });
    }

    struct Harness {
        db: Database,
        sales: SaleService,
        inventory: InventoryService,
        cash: CashService,
    }

    async fn harness() -> Harness {
        init_tracing();
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Harness {
            sales: SaleService::new(db.clone()),
            inventory: InventoryService::new(db.clone()),
            cash: CashService::new(db.clone()),
            db,
        }
    }

    fn cashier() -> Actor {
        Actor {
            id: "u-cashier".to_string(),
            name: "Cashier".to_string(),
            roles: vec!["sales".to_string()],
        }
    }

    fn admin() -> Actor {
        Actor {
            id: "u-admin".to_string(),
            name: "Admin".to_string(),
            roles: vec!["admin".to_string()],
        }
    }

    async fn seed_stock(h: &Harness, branch: &str, product: &str, quantity: i64) {
        h.inventory
            .create_movement(
                CreateMovementCommand {
                    movement_type: MovementType::In,
                    product_id: product.to_string(),
                    quantity,
                    from_branch_id: None,
                    to_branch_id: Some(branch.to_string()),
                    reason: "initial stock".to_string(),
                },
                &cashier(),
            )
            .await
            .unwrap();
    }

    async fn seed_customer(h: &Harness, id: &str) {
        h.db.customers()
            .insert(&Customer {
                id: id.to_string(),
                first_name: "María".to_string(),
                last_name: "Rojas".to_string(),
                phone: "+56 9 1234 5678".to_string(),
                email: None,
                notes: None,
                discount_bps: 0,
                debt_cents: 0,
                total_spent_cents: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    fn product_line(product: &str, qty: i64, unit_price: i64) -> SaleLineInput {
        SaleLineInput {
            product_id: Some(product.to_string()),
            name: format!("Product {product}"),
            kind: LineKind::Product,
            quantity: qty,
            unit_price_cents: unit_price,
            total_cents: qty * unit_price,
        }
    }

    fn sale_cmd(branch: &str, items: Vec<SaleLineInput>) -> CreateSaleCommand {
        let subtotal: i64 = items.iter().map(|i| i.total_cents).sum();
        CreateSaleCommand {
            branch_id: branch.to_string(),
            customer_id: None,
            items,
            subtotal_cents: subtotal,
            discount_cents: 0,
            total_cents: subtotal,
            payment_method: PaymentMethod::Cash,
            cash_session_id: None,
            delivery: None,
        }
    }

    #[tokio::test]
    async fn test_two_line_sale_deducts_stock_and_journals() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 10).await;

        let cmd = sale_cmd("b1", vec![product_line("p1", 2, 500), product_line("p1", 3, 500)]);
        let receipt = h.sales.create_sale(cmd, &cashier()).await.unwrap();

        let stock = h.inventory.get_stock("b1", "p1").await.unwrap().unwrap();
        assert_eq!(stock.quantity, 5);

        let movements = h.db.movements().list_for_sale(&receipt.sale.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.movement_type == MovementType::Sale));
        assert!(movements
            .iter()
            .all(|m| m.reference_sale_id.as_deref() == Some(receipt.sale.id.as_str())));
    }

    #[tokio::test]
    async fn test_void_restores_stock_and_second_void_conflicts() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 10).await;

        let cmd = sale_cmd("b1", vec![product_line("p1", 2, 500), product_line("p1", 3, 500)]);
        let receipt = h.sales.create_sale(cmd, &cashier()).await.unwrap();

        let voided = h
            .sales
            .void_sale(&receipt.sale.id, &admin(), "wrong customer")
            .await
            .unwrap();
        assert_eq!(voided.status, SaleStatus::Voided);
        assert_eq!(voided.void_reason.as_deref(), Some("wrong customer"));

        let stock = h.inventory.get_stock("b1", "p1").await.unwrap().unwrap();
        assert_eq!(stock.quantity, 10);

        let movements = h.db.movements().list_for_sale(&receipt.sale.id).await.unwrap();
        assert_eq!(movements.len(), 4);
        assert_eq!(
            movements
                .iter()
                .filter(|m| m.movement_type == MovementType::VoidSale)
                .count(),
            2
        );

        // Second void: conflict, stock untouched.
        let err = h
            .sales
            .void_sale(&receipt.sale.id, &admin(), "again")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        let stock = h.inventory.get_stock("b1", "p1").await.unwrap().unwrap();
        assert_eq!(stock.quantity, 10);
    }

    #[tokio::test]
    async fn test_void_requires_privilege() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 5).await;
        let receipt = h
            .sales
            .create_sale(sale_cmd("b1", vec![product_line("p1", 1, 500)]), &cashier())
            .await
            .unwrap();

        let err = h
            .sales
            .void_sale(&receipt.sale.id, &cashier(), "oops")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_debt_without_customer_rejected_before_any_mutation() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 10).await;

        let mut cmd = sale_cmd("b1", vec![product_line("p1", 2, 500)]);
        cmd.payment_method = PaymentMethod::Debt;
        let err = h.sales.create_sale(cmd, &cashier()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // No stock mutation, no stray movements.
        let stock = h.inventory.get_stock("b1", "p1").await.unwrap().unwrap();
        assert_eq!(stock.quantity, 10);
        assert_eq!(h.inventory.list_movements(10).await.unwrap().len(), 1); // seed IN only
    }

    #[tokio::test]
    async fn test_debt_sale_updates_customer_balances() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 10).await;
        seed_customer(&h, "c1").await;

        let mut cmd = sale_cmd("b1", vec![product_line("p1", 2, 500)]);
        cmd.payment_method = PaymentMethod::Debt;
        cmd.customer_id = Some("c1".to_string());
        h.sales.create_sale(cmd, &cashier()).await.unwrap();

        let customer = h.db.customers().get_by_id("c1").await.unwrap().unwrap();
        assert_eq!(customer.debt_cents, 1000);
        assert_eq!(customer.total_spent_cents, 1000);
    }

    #[tokio::test]
    async fn test_cash_sale_updates_spend_only() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 10).await;
        seed_customer(&h, "c1").await;

        let mut cmd = sale_cmd("b1", vec![product_line("p1", 1, 700)]);
        cmd.customer_id = Some("c1".to_string());
        h.sales.create_sale(cmd, &cashier()).await.unwrap();

        let customer = h.db.customers().get_by_id("c1").await.unwrap().unwrap();
        assert_eq!(customer.debt_cents, 0);
        assert_eq!(customer.total_spent_cents, 700);
    }

    #[tokio::test]
    async fn test_void_reverses_customer_balances() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 10).await;
        seed_customer(&h, "c1").await;

        let mut cmd = sale_cmd("b1", vec![product_line("p1", 2, 500)]);
        cmd.payment_method = PaymentMethod::Debt;
        cmd.customer_id = Some("c1".to_string());
        let receipt = h.sales.create_sale(cmd, &cashier()).await.unwrap();

        h.sales
            .void_sale(&receipt.sale.id, &admin(), "returned goods")
            .await
            .unwrap();

        // Voiding takes the invoice obligation back off the account.
        let customer = h.db.customers().get_by_id("c1").await.unwrap().unwrap();
        assert_eq!(customer.debt_cents, 0);
        assert_eq!(customer.total_spent_cents, 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rejects_whole_sale() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 10).await;
        seed_stock(&h, "b1", "p2", 1).await;

        // First line would succeed; second fails; nothing may stick.
        let cmd = sale_cmd("b1", vec![product_line("p1", 2, 500), product_line("p2", 3, 200)]);
        let err = h.sales.create_sale(cmd, &cashier()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientStock { available: 1, requested: 3, .. }
        ));

        assert_eq!(h.inventory.get_stock("b1", "p1").await.unwrap().unwrap().quantity, 10);
        assert_eq!(h.inventory.get_stock("b1", "p2").await.unwrap().unwrap().quantity, 1);
        assert_eq!(h.inventory.list_movements(10).await.unwrap().len(), 2); // seeds only
    }

    #[tokio::test]
    async fn test_privileged_override_permits_negative_stock() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 1).await;

        let cmd = sale_cmd("b1", vec![product_line("p1", 3, 500)]);
        h.sales.create_sale(cmd, &admin()).await.unwrap();

        let stock = h.inventory.get_stock("b1", "p1").await.unwrap().unwrap();
        assert_eq!(stock.quantity, -2);
    }

    #[tokio::test]
    async fn test_delivery_sale_creates_pending_order_and_cascades_on_void() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 5).await;

        let mut cmd = sale_cmd("b1", vec![product_line("p1", 1, 3000)]);
        cmd.delivery = Some(DeliveryRequest {
            shipping_cost_cents: 2000,
            customer_snapshot: CustomerSnapshot {
                name: "María Rojas".to_string(),
                phone: Some("+56 9 1234 5678".to_string()),
                address: Some("Av. Siempreviva 742".to_string()),
            },
            scheduled_at: None,
            assigned_user_id: None,
        });
        let receipt = h.sales.create_sale(cmd, &cashier()).await.unwrap();

        assert_eq!(receipt.sale.status, SaleStatus::PendingDelivery);
        assert_eq!(receipt.sale.channel, SaleChannel::Delivery);
        let order = receipt.delivery.unwrap();
        assert_eq!(order.status, DeliveryStatus::Pending);
        assert_eq!(order.customer_snapshot.name, "María Rojas");

        h.sales
            .void_sale(&receipt.sale.id, &admin(), "customer cancelled")
            .await
            .unwrap();

        let order = h.db.deliveries().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(order.status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn test_preassigned_courier_starts_order_assigned() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 5).await;

        let mut cmd = sale_cmd("b1", vec![product_line("p1", 1, 3000)]);
        cmd.delivery = Some(DeliveryRequest {
            shipping_cost_cents: 0,
            customer_snapshot: CustomerSnapshot::default(),
            scheduled_at: None,
            assigned_user_id: Some("u-courier".to_string()),
        });
        let receipt = h.sales.create_sale(cmd, &cashier()).await.unwrap();
        assert_eq!(receipt.delivery.unwrap().status, DeliveryStatus::Assigned);
    }

    #[tokio::test]
    async fn test_sale_auto_tags_operators_open_session() {
        let h = harness().await;
        seed_stock(&h, "b1", "p1", 5).await;

        let session = h
            .cash
            .open_session(
                OpenSessionCommand {
                    branch_id: "b1".to_string(),
                    opening_balance_cents: 10_000,
                    opening_denominations: Denominations::new(),
                },
                &cashier(),
            )
            .await
            .unwrap();

        let receipt = h
            .sales
            .create_sale(sale_cmd("b1", vec![product_line("p1", 1, 500)]), &cashier())
            .await
            .unwrap();
        assert_eq!(receipt.sale.cash_session_id.as_deref(), Some(session.id.as_str()));

        // A different operator with no session stays untagged.
        let receipt = h
            .sales
            .create_sale(sale_cmd("b1", vec![product_line("p1", 1, 500)]), &admin())
            .await
            .unwrap();
        assert!(receipt.sale.cash_session_id.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_sales_never_lose_updates() {
        let h = harness().await;
        const N: i64 = 16;
        seed_stock(&h, "b1", "p1", N).await;

        let mut handles = Vec::new();
        for _ in 0..N {
            let sales = h.sales.clone();
            handles.push(tokio::spawn(async move {
                sales
                    .create_sale(sale_cmd("b1", vec![product_line("p1", 1, 500)]), &cashier())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Every unit accounted for: exactly zero left, one movement per sale.
        let stock = h.inventory.get_stock("b1", "p1").await.unwrap().unwrap();
        assert_eq!(stock.quantity, 0);

        let movements = h.inventory.list_movements(100).await.unwrap();
        let sale_movements = movements
            .iter()
            .filter(|m| m.movement_type == MovementType::Sale)
            .count();
        assert_eq!(sale_movements, N as usize);

        // And the ledger still equals the journal sum.
        assert_eq!(h.db.movements().ledger_delta("b1", "p1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_one_more_concurrent_sale_than_stock_fails_exactly_once() {
        let h = harness().await;
        const N: i64 = 8;
        seed_stock(&h, "b1", "p1", N - 1).await;

        let mut handles = Vec::new();
        for _ in 0..N {
            let sales = h.sales.clone();
            handles.push(tokio::spawn(async move {
                sales
                    .create_sale(sale_cmd("b1", vec![product_line("p1", 1, 500)]), &cashier())
                    .await
            }));
        }

        let mut failures = 0;
        for handle in handles {
            if handle.await.unwrap().is_err() {
                failures += 1;
            }
        }
        assert_eq!(failures, 1);
        assert_eq!(h.inventory.get_stock("b1", "p1").await.unwrap().unwrap().quantity, 0);
    }
}
