//! # Service Error Type
//!
//! The error taxonomy callers of the core see.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow                                           │
//! │                                                                         │
//! │  ValidationError (vetpos-core) ──┐                                     │
//! │                                  ├──► ServiceError ──► HTTP layer      │
//! │  DbError (vetpos-db) ────────────┘         │                           │
//! │                                            ▼                           │
//! │   Validation        → 400   caller error, never retried               │
//! │   InsufficientStock → 409   recoverable: override or reduce qty       │
//! │   Conflict          → 409   double-void, reclose, lost race           │
//! │   NotFound          → 404                                              │
//! │   Forbidden         → 403   privileged operation                       │
//! │   Internal          → 500   storage failure; the transaction it       │
//! │                             belonged to has already rolled back        │
//! │                                                                         │
//! │  A caller NEVER observes a half-applied operation: every failure       │
//! │  path either happened before the transaction or aborted it.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use vetpos_core::ValidationError;
use vetpos_db::DbError;

/// Errors surfaced by the core's operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or missing required fields - caller error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Business rule violation: not enough stock at the branch.
    /// Recoverable by privileged override or by reducing the quantity.
    #[error("Insufficient stock for product {product_id} at branch {branch_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        branch_id: String,
        available: i64,
        requested: i64,
    },

    /// Unknown sale/session/customer/order id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The operation contradicts current state: double-void, closing a
    /// closed session, changing a terminal delivery.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Privileged operation attempted by an unprivileged actor.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Storage-layer failure. The enclosing transaction has rolled back;
    /// no partial state is observable.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }

    /// Creates a Forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::Forbidden(message.into())
    }
}

/// Converts database errors to service errors.
impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            DbError::UniqueViolation { field, .. } => {
                ServiceError::Conflict(format!("duplicate {field}"))
            }
            other => {
                // Log the storage detail, surface a categorized error.
                tracing::error!(error = %other, "Storage failure");
                ServiceError::Internal(other.to_string())
            }
        }
    }
}

/// Lets coordinators use `?` directly on sqlx calls (commit in particular).
impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::from(DbError::from(err))
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_not_found_maps_through() {
        let err = ServiceError::from(DbError::not_found("Sale", "s-1"));
        assert!(matches!(err, ServiceError::NotFound { .. }));
        assert_eq!(err.to_string(), "Sale not found: s-1");
    }

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let err = ServiceError::from(DbError::UniqueViolation {
            field: "cash_sessions.branch_id".to_string(),
            value: "unknown".to_string(),
        });
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}
