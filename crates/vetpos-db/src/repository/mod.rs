//! # Repository Module
//!
//! Database repository implementations for VetPOS.
//!
//! ## Two Kinds of Access
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. Pool-scoped READS: repository structs over the pool                │
//! │                                                                         │
//! │     db.stocks().get(branch, product)                                   │
//! │     db.sales().get_by_id(id)                                           │
//! │                                                                         │
//! │  2. Transaction-composable WRITES: module-level functions taking        │
//! │     &mut SqliteConnection, so a coordinator can string several of      │
//! │     them into ONE transaction                                          │
//! │                                                                         │
//! │     let mut tx = db.begin().await?;                                    │
//! │     stock::adjust(&mut tx, ...).await?;                                │
//! │     movement::append(&mut tx, ...).await?;                             │
//! │     tx.commit().await?;                                                │
//! │                                                                         │
//! │  A write that belongs to a multi-entity operation NEVER runs against   │
//! │  the pool directly - that's how half-applied sales happen.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`stock`] - Stock ledger (conditional quantity updates)
//! - [`movement`] - Append-only movement journal
//! - [`sale`] - Sales and line items
//! - [`cash_session`] - Till sessions and reconciliation totals
//! - [`customer`] - Customer running balances
//! - [`delivery`] - Delivery orders

pub mod cash_session;
pub mod customer;
pub mod delivery;
pub mod movement;
pub mod sale;
pub mod stock;
