//! # Domain Types
//!
//! Core domain types for the VetPOS transactional core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌───────────────────┐   ┌─────────────────┐     │
//! │  │   StockRecord   │   │ InventoryMovement │   │      Sale       │     │
//! │  │  ─────────────  │   │  ───────────────  │   │  ─────────────  │     │
//! │  │  branch+product │◄──│  IN/OUT/TRANSFER  │   │  items[]        │     │
//! │  │  quantity       │   │  SALE/VOID_SALE   │◄──│  status         │     │
//! │  └─────────────────┘   └───────────────────┘   └────────┬────────┘     │
//! │                                                         │              │
//! │  ┌─────────────────┐   ┌───────────────────┐   ┌────────▼────────┐     │
//! │  │   CashSession   │   │     Customer      │   │  DeliveryOrder  │     │
//! │  │  ─────────────  │   │  ───────────────  │   │  ─────────────  │     │
//! │  │  OPEN → CLOSED  │   │  debt/total_spent │   │  PENDING → ...  │     │
//! │  └─────────────────┘   └───────────────────┘   └─────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants Owned Here
//! - A stock quantity equals the signed sum of the movements referencing it
//! - Movements are immutable once created
//! - A sale's total equals subtotal minus discount
//! - Sale status only ever flips one way, to VOIDED
//! - A cash session closes exactly once; its totals are frozen afterwards
//!
//! ## Dual-Key Identity Pattern
//! Every entity carries a UUID v4 `id` (immutable, used for relations).
//! Branch, product, customer and user identities are resolved by the
//! surrounding application and arrive here as opaque id strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::money::Money;

/// Counted physical currency units keyed by face value, e.g.
/// `{"10000": 2, "1000": 5}`.
pub type Denominations = BTreeMap<String, i64>;

// =============================================================================
// Stock Ledger
// =============================================================================

/// Current quantity of one product at one branch.
///
/// ## Lifecycle
/// Created lazily on the first movement into a `(branch, product)` pair and
/// never deleted. The quantity may only go negative under privileged
/// override.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockRecord {
    pub id: String,
    pub branch_id: String,
    pub product_id: String,
    /// Current quantity. Invariant: equals the signed sum of all movements
    /// referencing this `(branch, product)` pair.
    pub quantity: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Movement Journal
// =============================================================================

/// The cause of a stock quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Goods received into a branch (`to_branch_id` required).
    In,
    /// Goods leaving a branch: shrinkage, adjustment (`from_branch_id` required).
    Out,
    /// Stock moved between branches (both branch ids required).
    Transfer,
    /// Deduction caused by a sale. Emitted internally by the sale
    /// coordinator, never accepted from generic clients.
    Sale,
    /// Restoration caused by voiding a sale. Internal only.
    VoidSale,
}

/// One atomic change to the stock ledger, and its cause.
///
/// Append-only: a movement is never mutated or deleted. The journal is the
/// source of truth the ledger can always be rebuilt from.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryMovement {
    pub id: String,
    pub movement_type: MovementType,
    pub product_id: String,
    /// Always positive; the direction is carried by the type and branches.
    pub quantity: i64,
    pub from_branch_id: Option<String>,
    pub to_branch_id: Option<String>,
    pub reason: String,
    /// Sale this movement belongs to, for SALE / VOID_SALE types.
    pub reference_sale_id: Option<String>,
    /// Position of the originating line within the sale. Together with the
    /// sale id and type this keys sale movements uniquely, so re-running a
    /// sale's movement creation cannot duplicate journal entries.
    pub line_index: Option<i64>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl InventoryMovement {
    /// Signed effect of this movement on the given branch's stock.
    ///
    /// Used by consistency checks: summing this over all movements for a
    /// `(branch, product)` pair must reproduce the ledger quantity.
    pub fn signed_quantity_for(&self, branch_id: &str) -> i64 {
        let mut delta = 0;
        if self.from_branch_id.as_deref() == Some(branch_id) {
            delta -= self.quantity;
        }
        if self.to_branch_id.as_deref() == Some(branch_id) {
            delta += self.quantity;
        }
        delta
    }
}

// =============================================================================
// Sale
// =============================================================================

/// The status of a sale transaction.
///
/// Transitions are one-directional:
/// `COMPLETED → VOIDED`, `PENDING_DELIVERY → COMPLETED | VOIDED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Completed,
    Voided,
    PendingDelivery,
}

/// How the customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Debit,
    Credit,
    /// Charged to the customer's running account (requires a customer).
    Debt,
}

/// Sales channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleChannel {
    Store,
    Delivery,
}

/// What a sale line is selling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineKind {
    /// A stocked product; deducts from the branch ledger.
    Product,
    /// A service (consultation, grooming, ...); no stock effect.
    Service,
    /// Shipping charge; no stock effect.
    Shipping,
}

/// One product/service/shipping line within a sale.
///
/// Lines snapshot the name and unit price at time of sale; they never change
/// when the catalog does. The sale-level discount is NOT distributed onto
/// lines: `total = quantity × unit_price` always holds per line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleLineItem {
    pub id: String,
    pub sale_id: String,
    /// Present for PRODUCT lines; services and shipping have no product.
    pub product_id: Option<String>,
    /// Name at time of sale (frozen).
    pub name: String,
    pub kind: LineKind,
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// Line total: `quantity × unit_price_cents`.
    pub total_cents: i64,
}

impl SaleLineItem {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A completed or pending commercial transaction.
///
/// Items are immutable after creation. The only permitted mutation is the
/// one-way flip to VOIDED, which records who voided it, why and when.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub branch_id: String,
    pub customer_id: Option<String>,
    /// Line items; loaded separately from the `sale_items` table.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<SaleLineItem>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    /// Invariant: `total = subtotal - discount`.
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    /// Till session this sale is reconciled under, if one was open.
    pub cash_session_id: Option<String>,
    pub channel: SaleChannel,
    pub status: SaleStatus,
    pub voided_by: Option<String>,
    pub void_reason: Option<String>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Returns the sale total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Whether this sale has been voided.
    #[inline]
    pub fn is_voided(&self) -> bool {
        self.status == SaleStatus::Voided
    }
}

// =============================================================================
// Cash Session
// =============================================================================

/// Till session status. `OPEN → CLOSED` exactly once; CLOSED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Closed,
}

/// One till-opening-to-close period for one operator at one branch.
///
/// ## Recomputation Rule
/// While OPEN, the `sales_*` totals are recomputed on demand from the
/// COMPLETED sales tagged with this session's id. Once CLOSED they are a
/// frozen snapshot - read paths must never recompute a closed session.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashSession {
    pub id: String,
    pub branch_id: String,
    pub opened_by: String,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    pub opening_balance_cents: i64,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub opening_denominations: Denominations,
    pub status: SessionStatus,

    // Computed totals from sales, grouped by payment method.
    pub sales_cash_cents: i64,
    pub sales_transfer_cents: i64,
    pub sales_debit_cents: i64,
    pub sales_credit_cents: i64,
    pub sales_debt_cents: i64,
    /// `opening_balance + sales_cash`: what the drawer should hold.
    pub closing_balance_expected_cents: i64,

    // Close-time fields.
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
    /// What the operator actually counted in the drawer.
    pub closing_balance_real_cents: i64,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub closing_denominations: Denominations,

    // Operator-entered reconciliation fields, merged at close.
    pub manual_transbank_cents: i64,
    pub manual_withdrawals_cents: i64,
    pub manual_expenses_cents: i64,
    pub manual_other_day_cash_cents: i64,
    pub manual_other_day_transbank_cents: i64,
    pub manual_debt_cents: i64,
    pub manual_transfer_cents: i64,
    pub manual_next_day_cash_cents: i64,

    // Handover to the next operator; editable even after close.
    pub handover_to_user_id: Option<String>,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub handover_denominations: Denominations,
    pub handover_date: Option<String>,

    /// Final declared total, frozen by `close`. Zero until then.
    pub declared_total_cents: i64,
}

impl CashSession {
    /// Whether this session is still open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    /// The declared total the operator signs off at close:
    ///
    /// ```text
    /// closing_balance_real + debt + transbank + transfers
    ///   - withdrawals - expenses
    ///   + other_day_cash + other_day_transbank
    /// ```
    pub fn compute_declared_total(&self) -> Money {
        Money::from_cents(self.closing_balance_real_cents)
            + Money::from_cents(self.manual_debt_cents)
            + Money::from_cents(self.manual_transbank_cents)
            + Money::from_cents(self.manual_transfer_cents)
            - Money::from_cents(self.manual_withdrawals_cents)
            - Money::from_cents(self.manual_expenses_cents)
            + Money::from_cents(self.manual_other_day_cash_cents)
            + Money::from_cents(self.manual_other_day_transbank_cents)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A person with a running account (known as a "tutor" in the clinic UI:
/// the owner responsible for one or more patients).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub notes: Option<String>,
    /// Standing discount in basis points (1000 = 10%).
    pub discount_bps: i64,
    /// Outstanding balance from DEBT-method sales. Negative means the
    /// customer overpaid and carries a credit.
    pub debt_cents: i64,
    /// Lifetime spend; increased by every sale regardless of method.
    pub total_spent_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Display name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Returns the debt as Money (negative = credit balance).
    #[inline]
    pub fn debt(&self) -> Money {
        Money::from_cents(self.debt_cents)
    }
}

// =============================================================================
// Delivery Order
// =============================================================================

/// Dispatch lifecycle. Independent of the sale's status, except that voiding
/// a sale fails its undelivered order, and delivering completes a
/// PENDING_DELIVERY sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    InTransit,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    /// Terminal states can no longer change.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

/// Point-in-time copy of the customer's contact details, captured when the
/// sale is created so later edits to the customer record don't change where
/// a dispatched order is headed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct CustomerSnapshot {
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Dispatch record derived from a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DeliveryOrder {
    pub id: String,
    pub sale_id: String,
    pub branch_id: String,
    pub assigned_user_id: Option<String>,
    pub status: DeliveryStatus,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub customer_snapshot: CustomerSnapshot,
    pub shipping_cost_cents: i64,
    #[ts(as = "Option<String>")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Actor
// =============================================================================

/// The authenticated identity performing an operation, resolved by the
/// surrounding application. The core only cares about the id (for audit
/// fields) and the role flags (for override decisions).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub roles: Vec<String>,
}

impl Actor {
    /// Whether this actor may override stock checks and void sales.
    pub fn is_privileged(&self) -> bool {
        self.roles.iter().any(|r| r == "admin" || r == "superadmin")
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(from: Option<&str>, to: Option<&str>, qty: i64) -> InventoryMovement {
        InventoryMovement {
            id: "m1".to_string(),
            movement_type: MovementType::Transfer,
            product_id: "p1".to_string(),
            quantity: qty,
            from_branch_id: from.map(String::from),
            to_branch_id: to.map(String::from),
            reason: "test".to_string(),
            reference_sale_id: None,
            line_index: None,
            created_by: "u1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_signed_quantity_for_branches() {
        let m = movement(Some("a"), Some("b"), 5);
        assert_eq!(m.signed_quantity_for("a"), -5);
        assert_eq!(m.signed_quantity_for("b"), 5);
        assert_eq!(m.signed_quantity_for("c"), 0);
    }

    #[test]
    fn test_actor_privilege() {
        let cashier = Actor {
            id: "u1".to_string(),
            name: "Cashier".to_string(),
            roles: vec!["sales".to_string()],
        };
        assert!(!cashier.is_privileged());

        let admin = Actor {
            id: "u2".to_string(),
            name: "Admin".to_string(),
            roles: vec!["sales".to_string(), "admin".to_string()],
        };
        assert!(admin.is_privileged());
    }

    #[test]
    fn test_declared_total_formula() {
        let mut session = test_session();
        session.closing_balance_real_cents = 100_000;
        session.manual_debt_cents = 20_000;
        session.manual_transbank_cents = 50_000;
        session.manual_transfer_cents = 10_000;
        session.manual_withdrawals_cents = 5_000;
        session.manual_expenses_cents = 3_000;
        session.manual_other_day_cash_cents = 2_000;
        session.manual_other_day_transbank_cents = 1_000;

        // 100000 + 20000 + 50000 + 10000 - 5000 - 3000 + 2000 + 1000
        assert_eq!(session.compute_declared_total().cents(), 175_000);
    }

    #[test]
    fn test_delivery_terminal_states() {
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::InTransit.is_terminal());
    }

    fn test_session() -> CashSession {
        CashSession {
            id: "s1".to_string(),
            branch_id: "b1".to_string(),
            opened_by: "u1".to_string(),
            opened_at: Utc::now(),
            opening_balance_cents: 0,
            opening_denominations: Denominations::new(),
            status: SessionStatus::Open,
            sales_cash_cents: 0,
            sales_transfer_cents: 0,
            sales_debit_cents: 0,
            sales_credit_cents: 0,
            sales_debt_cents: 0,
            closing_balance_expected_cents: 0,
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
        }
    }
}
