//! # vetpos-service: Transactional Coordinators for VetPOS
//!
//! The operations the surrounding application calls into. This crate is
//! where the system's one hard promise is kept: **per-branch stock, the
//! movement journal, sale records, customer balances and cash-session
//! figures never drift apart**, no matter how requests interleave or where
//! they fail.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        VetPOS Architecture                              │
//! │                                                                         │
//! │  HTTP layer (out of scope: auth, routing, serialization)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              ★ vetpos-service (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │  InventoryService   create_movement (IN/OUT/TRANSFER)          │   │
//! │  │  SaleService        create_sale, void_sale                     │   │
//! │  │  CashService        open/current/close/handover/history        │   │
//! │  │  CustomerService    record_debt_payment                        │   │
//! │  │  DeliveryService    assign, update_status                      │   │
//! │  │                                                                 │   │
//! │  │  Every multi-entity write = ONE database transaction           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                              │                                  │
//! │       ▼                              ▼                                  │
//! │  vetpos-core                    vetpos-db                              │
//! │  (validation, types)            (pool, repositories, migrations)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! 1. A stock quantity never silently diverges from the sum of movements
//!    that produced it
//! 2. A sale applies all of its effects (ledger, journal, sale row,
//!    customer balance, delivery order) or none of them
//! 3. Voiding deterministically reverses exactly what creation applied,
//!    and a second void is a conflict, not a repeat
//! 4. A closed cash session's figures are a frozen, reproducible function
//!    of the sales tagged to it plus the operator's manual fields
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vetpos_db::{Database, DbConfig};
//! use vetpos_service::{InventoryService, SaleService};
//!
//! let db = Database::new(DbConfig::new("./vetpos.db")).await?;
//! let sales = SaleService::new(db.clone());
//! let receipt = sales.create_sale(command, &actor).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cash;
pub mod customers;
pub mod deliveries;
pub mod error;
pub mod inventory;
pub mod sales;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cash::CashService;
pub use customers::CustomerService;
pub use deliveries::DeliveryService;
pub use error::{ServiceError, ServiceResult};
pub use inventory::InventoryService;
pub use sales::{SaleReceipt, SaleService};
