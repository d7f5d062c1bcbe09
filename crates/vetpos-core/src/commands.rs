//! # Command DTOs
//!
//! Typed commands for every mutating core operation.
//!
//! ## Why Typed Commands?
//! The surrounding HTTP layer deserializes request bodies directly into
//! these structs. Nothing reaches a coordinator as a loose field dictionary:
//! a command either deserializes and validates, or the request is rejected
//! before any storage access. See [`crate::validation`] for the rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{
    CustomerSnapshot, Denominations, LineKind, MovementType, PaymentMethod,
};

// =============================================================================
// Inventory
// =============================================================================

/// Request to record an IN / OUT / TRANSFER movement.
///
/// SALE and VOID_SALE movements are emitted internally by the sale
/// coordinator and are rejected here by validation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateMovementCommand {
    pub movement_type: MovementType,
    pub product_id: String,
    /// Always positive; direction comes from the type.
    pub quantity: i64,
    pub from_branch_id: Option<String>,
    pub to_branch_id: Option<String>,
    pub reason: String,
}

// =============================================================================
// Sales
// =============================================================================

/// One line of a sale request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineInput {
    /// Required for PRODUCT lines.
    pub product_id: Option<String>,
    pub name: String,
    pub kind: LineKind,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Must equal `quantity × unit_price_cents`.
    pub total_cents: i64,
}

/// Dispatch details attached to a sale request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeliveryRequest {
    pub shipping_cost_cents: i64,
    pub customer_snapshot: CustomerSnapshot,
    #[ts(as = "Option<String>")]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Pre-selected courier; the order starts ASSIGNED when present.
    pub assigned_user_id: Option<String>,
}

/// Request to create a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateSaleCommand {
    pub branch_id: String,
    pub customer_id: Option<String>,
    pub items: Vec<SaleLineInput>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    /// Must equal `subtotal_cents - discount_cents`.
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    /// Till session to reconcile under. When absent, the coordinator tags
    /// the operator's open session for the branch, if any.
    pub cash_session_id: Option<String>,
    pub delivery: Option<DeliveryRequest>,
}

// =============================================================================
// Cash Sessions
// =============================================================================

/// Request to open a till session.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpenSessionCommand {
    pub branch_id: String,
    pub opening_balance_cents: i64,
    #[serde(default)]
    pub opening_denominations: Denominations,
}

/// Operator-entered reconciliation fields merged at close time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct CloseSessionCommand {
    /// What the operator counted in the drawer.
    pub closing_balance_real_cents: i64,
    pub closing_denominations: Denominations,
    pub manual_transbank_cents: i64,
    pub manual_withdrawals_cents: i64,
    pub manual_expenses_cents: i64,
    pub manual_other_day_cash_cents: i64,
    pub manual_other_day_transbank_cents: i64,
    pub manual_debt_cents: i64,
    pub manual_transfer_cents: i64,
    pub manual_next_day_cash_cents: i64,
    pub handover_to_user_id: Option<String>,
    pub handover_denominations: Denominations,
    pub handover_date: Option<String>,
}

/// Request to record who the drawer is handed to for the next day.
/// Allowed on open and closed sessions alike.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct HandoverCommand {
    pub handover_to_user_id: Option<String>,
    pub handover_denominations: Denominations,
    pub handover_date: Option<String>,
    pub manual_next_day_cash_cents: i64,
}
