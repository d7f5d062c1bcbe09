//! # Validation Module
//!
//! Command validation for the transactional core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                      │
//! │  ├── Wrong types, unknown enum values rejected                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - business rule validation                       │
//! │  ├── Branch requirements per movement type                             │
//! │  ├── Sale arithmetic (line totals, subtotal, discount)                 │
//! │  └── DEBT payment requires a customer                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE / foreign key constraints                       │
//! │  └── Conditional stock updates                                         │
//! │                                                                         │
//! │  A command that fails here has touched NOTHING: no stock change, no    │
//! │  movement, no sale row. That ordering is load-bearing for the          │
//! │  "rejected before any mutation" guarantees.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::{CreateMovementCommand, CreateSaleCommand, OpenSessionCommand};
use crate::error::{ValidationError, ValidationResult};
use crate::money::Money;
use crate::types::{LineKind, MovementType, PaymentMethod};
use crate::{MAX_LINE_QUANTITY, MAX_REASON_LENGTH, MAX_SALE_ITEMS};

// =============================================================================
// Movements
// =============================================================================

/// Validates a movement command against the rules for its type.
///
/// ## Rules
/// - quantity must be positive (direction comes from the type)
/// - IN requires `to_branch_id`
/// - OUT requires `from_branch_id`
/// - TRANSFER requires both
/// - SALE / VOID_SALE are internal-only and rejected here
pub fn validate_movement(cmd: &CreateMovementCommand) -> ValidationResult<()> {
    if cmd.quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    validate_reason(&cmd.reason)?;

    match cmd.movement_type {
        MovementType::In => {
            if cmd.to_branch_id.is_none() {
                return Err(ValidationError::Required {
                    field: "to_branch_id".to_string(),
                });
            }
        }
        MovementType::Out => {
            if cmd.from_branch_id.is_none() {
                return Err(ValidationError::Required {
                    field: "from_branch_id".to_string(),
                });
            }
        }
        MovementType::Transfer => {
            if cmd.from_branch_id.is_none() || cmd.to_branch_id.is_none() {
                return Err(ValidationError::Required {
                    field: "from_branch_id and to_branch_id".to_string(),
                });
            }
        }
        MovementType::Sale | MovementType::VoidSale => {
            // Only the sale coordinator may emit these.
            return Err(ValidationError::NotAllowed {
                field: "movement_type".to_string(),
                allowed: vec!["IN".to_string(), "OUT".to_string(), "TRANSFER".to_string()],
            });
        }
    }

    Ok(())
}

/// Validates a free-text reason field.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    if reason.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }
    if reason.len() > MAX_REASON_LENGTH {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LENGTH,
        });
    }
    Ok(())
}

// =============================================================================
// Sales
// =============================================================================

/// Validates a sale command before the coordinator touches any state.
///
/// ## Rules
/// - at least one line, at most [`MAX_SALE_ITEMS`]
/// - per line: positive quantity (capped), non-negative unit price,
///   `total = quantity × unit_price`, PRODUCT lines carry a product id
/// - `subtotal = Σ line totals`
/// - discount within `[0, subtotal]`, `total = subtotal - discount`
/// - DEBT payment requires a customer id
pub fn validate_sale(cmd: &CreateSaleCommand) -> ValidationResult<()> {
    if cmd.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    if cmd.items.len() > MAX_SALE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_ITEMS as i64,
        });
    }

    let mut subtotal = Money::zero();
    for (index, line) in cmd.items.iter().enumerate() {
        if line.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: format!("items[{}].quantity", index),
            });
        }
        if line.quantity > MAX_LINE_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: format!("items[{}].quantity", index),
                min: 1,
                max: MAX_LINE_QUANTITY,
            });
        }
        if line.unit_price_cents < 0 {
            return Err(ValidationError::OutOfRange {
                field: format!("items[{}].unit_price_cents", index),
                min: 0,
                max: i64::MAX,
            });
        }
        if line.kind == LineKind::Product && line.product_id.is_none() {
            return Err(ValidationError::Required {
                field: format!("items[{}].product_id", index),
            });
        }

        let expected = Money::from_cents(line.unit_price_cents).multiply_quantity(line.quantity);
        if expected.cents() != line.total_cents {
            return Err(ValidationError::Mismatch {
                field: format!("items[{}].total_cents", index),
                expected: expected.cents(),
                actual: line.total_cents,
            });
        }
        subtotal += expected;
    }

    if subtotal.cents() != cmd.subtotal_cents {
        return Err(ValidationError::Mismatch {
            field: "subtotal_cents".to_string(),
            expected: subtotal.cents(),
            actual: cmd.subtotal_cents,
        });
    }

    if cmd.discount_cents < 0 || cmd.discount_cents > cmd.subtotal_cents {
        return Err(ValidationError::OutOfRange {
            field: "discount_cents".to_string(),
            min: 0,
            max: cmd.subtotal_cents,
        });
    }

    let expected_total = subtotal - Money::from_cents(cmd.discount_cents);
    if expected_total.cents() != cmd.total_cents {
        return Err(ValidationError::Mismatch {
            field: "total_cents".to_string(),
            expected: expected_total.cents(),
            actual: cmd.total_cents,
        });
    }

    if cmd.payment_method == PaymentMethod::Debt && cmd.customer_id.is_none() {
        return Err(ValidationError::Required {
            field: "customer_id".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Cash Sessions
// =============================================================================

/// Validates a session-open command.
pub fn validate_open_session(cmd: &OpenSessionCommand) -> ValidationResult<()> {
    if cmd.opening_balance_cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "opening_balance_cents".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    for (face, count) in &cmd.opening_denominations {
        if *count < 0 {
            return Err(ValidationError::OutOfRange {
                field: format!("opening_denominations[{}]", face),
                min: 0,
                max: i64::MAX,
            });
        }
    }
    Ok(())
}

/// Validates a debt payment amount.
pub fn validate_payment_amount(amount_cents: i64) -> ValidationResult<()> {
    if amount_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount_cents".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::SaleLineInput;
    use crate::types::Denominations;

    fn movement_cmd(movement_type: MovementType) -> CreateMovementCommand {
        CreateMovementCommand {
            movement_type,
            product_id: "p1".to_string(),
            quantity: 5,
            from_branch_id: Some("a".to_string()),
            to_branch_id: Some("b".to_string()),
            reason: "restock".to_string(),
        }
    }

    fn product_line(qty: i64, unit_price: i64) -> SaleLineInput {
        SaleLineInput {
            product_id: Some("p1".to_string()),
            name: "Dog food 3kg".to_string(),
            kind: LineKind::Product,
            quantity: qty,
            unit_price_cents: unit_price,
            total_cents: qty * unit_price,
        }
    }

    fn sale_cmd(items: Vec<SaleLineInput>) -> CreateSaleCommand {
        let subtotal: i64 = items.iter().map(|i| i.total_cents).sum();
        CreateSaleCommand {
            branch_id: "b1".to_string(),
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

    #[test]
    fn test_movement_branch_requirements() {
        let mut cmd = movement_cmd(MovementType::In);
        cmd.to_branch_id = None;
        assert!(validate_movement(&cmd).is_err());

        let mut cmd = movement_cmd(MovementType::Out);
        cmd.from_branch_id = None;
        assert!(validate_movement(&cmd).is_err());

        let mut cmd = movement_cmd(MovementType::Transfer);
        cmd.to_branch_id = None;
        assert!(validate_movement(&cmd).is_err());

        assert!(validate_movement(&movement_cmd(MovementType::Transfer)).is_ok());
    }

    #[test]
    fn test_movement_rejects_internal_types() {
        assert!(matches!(
            validate_movement(&movement_cmd(MovementType::Sale)),
            Err(ValidationError::NotAllowed { .. })
        ));
        assert!(matches!(
            validate_movement(&movement_cmd(MovementType::VoidSale)),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_movement_rejects_non_positive_quantity() {
        let mut cmd = movement_cmd(MovementType::In);
        cmd.quantity = 0;
        assert!(matches!(
            validate_movement(&cmd),
            Err(ValidationError::MustBePositive { .. })
        ));
    }

    #[test]
    fn test_sale_accepts_valid_command() {
        let cmd = sale_cmd(vec![product_line(2, 500), product_line(3, 200)]);
        assert!(validate_sale(&cmd).is_ok());
    }

    #[test]
    fn test_sale_rejects_empty_items() {
        let cmd = sale_cmd(vec![]);
        assert!(matches!(
            validate_sale(&cmd),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_sale_rejects_line_total_mismatch() {
        let mut line = product_line(2, 500);
        line.total_cents = 999;
        let mut cmd = sale_cmd(vec![line]);
        cmd.subtotal_cents = 999;
        cmd.total_cents = 999;
        assert!(matches!(
            validate_sale(&cmd),
            Err(ValidationError::Mismatch { .. })
        ));
    }

    #[test]
    fn test_sale_rejects_total_not_subtotal_minus_discount() {
        let mut cmd = sale_cmd(vec![product_line(2, 500)]);
        cmd.discount_cents = 100;
        // total left at subtotal: now wrong
        assert!(matches!(
            validate_sale(&cmd),
            Err(ValidationError::Mismatch { .. })
        ));

        cmd.total_cents = 900;
        assert!(validate_sale(&cmd).is_ok());
    }

    #[test]
    fn test_sale_rejects_debt_without_customer() {
        let mut cmd = sale_cmd(vec![product_line(1, 1000)]);
        cmd.payment_method = PaymentMethod::Debt;
        assert!(matches!(
            validate_sale(&cmd),
            Err(ValidationError::Required { ref field }) if field == "customer_id"
        ));

        cmd.customer_id = Some("c1".to_string());
        assert!(validate_sale(&cmd).is_ok());
    }

    #[test]
    fn test_sale_rejects_product_line_without_product_id() {
        let mut line = product_line(1, 1000);
        line.product_id = None;
        let cmd = sale_cmd(vec![line]);
        assert!(matches!(
            validate_sale(&cmd),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_service_line_needs_no_product_id() {
        let line = SaleLineInput {
            product_id: None,
            name: "Consultation".to_string(),
            kind: LineKind::Service,
            quantity: 1,
            unit_price_cents: 15_000,
            total_cents: 15_000,
        };
        assert!(validate_sale(&sale_cmd(vec![line])).is_ok());
    }

    #[test]
    fn test_open_session_rejects_negative_counts() {
        let mut denominations = Denominations::new();
        denominations.insert("1000".to_string(), -1);
        let cmd = OpenSessionCommand {
            branch_id: "b1".to_string(),
            opening_balance_cents: 0,
            opening_denominations: denominations,
        };
        assert!(validate_open_session(&cmd).is_err());
    }

    #[test]
    fn test_payment_amount_must_be_positive() {
        assert!(validate_payment_amount(0).is_err());
        assert!(validate_payment_amount(-5).is_err());
        assert!(validate_payment_amount(100).is_ok());
    }
}
