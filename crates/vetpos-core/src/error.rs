//! # Error Types
//!
//! Domain-specific error types for vetpos-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  vetpos-core errors (this file)                                        │
//! │  └── ValidationError  - Command validation failures                    │
//! │                                                                         │
//! │  vetpos-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  vetpos-service errors (separate crate)                                │
//! │  └── ServiceError     - What callers of the core see                   │
//! │                                                                         │
//! │  Flow: ValidationError → ServiceError ← DbError                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field, id, quantities)
//! 3. Errors are enum variants, never String

use thiserror::Error;

/// Command validation errors.
///
/// These occur when a typed command doesn't meet the business rules for its
/// operation. Validation runs before any storage access, so a command that
/// fails here has caused no state change whatsoever.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value is not in the allowed set for this operation.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Two amounts that must agree don't.
    ///
    /// ## When This Occurs
    /// - A line total that isn't `quantity × unit_price`
    /// - A sale total that isn't `subtotal - discount`
    #[error("{field} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        field: String,
        expected: i64,
        actual: i64,
    },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Unit Tests
// =============================================================================
