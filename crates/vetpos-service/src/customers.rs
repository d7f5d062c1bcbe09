//! # Customer Balance Tracker
//!
//! Maintains the running debt and lifetime spend per customer.
//!
//! Sale-driven updates happen inside the sale coordinator's transaction;
//! what lives here is the standalone operation: a customer paying down
//! their account at the counter.
//!
//! ## Overpayment Is Credit
//! A payment larger than the outstanding debt drives the balance negative
//! and stays that way. Clamping at zero would silently discard money the
//! customer handed over; a negative balance is the record that the next
//! DEBT sale draws against.

use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use vetpos_core::{validation, Actor, Customer};
use vetpos_db::repository::customer;
use vetpos_db::Database;

/// Coordinator for customer balance operations.
#[derive(Debug, Clone)]
pub struct CustomerService {
    db: Database,
}

impl CustomerService {
    /// Creates a new CustomerService.
    pub fn new(db: Database) -> Self {
        CustomerService { db }
    }

    /// Gets a customer.
    pub async fn get(&self, id: &str) -> ServiceResult<Customer> {
        self.db
            .customers()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", id))
    }

    /// Lists customers carrying outstanding debt, largest first.
    pub async fn list_debtors(&self, limit: u32) -> ServiceResult<Vec<Customer>> {
        Ok(self.db.customers().list_debtors(limit).await?)
    }

    /// Records a payment against a customer's running debt.
    ///
    /// `debt -= amount`; the result may go negative (credit balance).
    /// Lifetime spend is untouched - it was counted when the DEBT sale
    /// was made.
    pub async fn record_debt_payment(
        &self,
        customer_id: &str,
        amount_cents: i64,
        actor: &Actor,
    ) -> ServiceResult<Customer> {
        validation::validate_payment_amount(amount_cents)?;

        let mut tx = self.db.begin().await?;
        let updated = customer::adjust_balances(&mut tx, customer_id, -amount_cents, 0).await?;
        if !updated {
            return Err(ServiceError::not_found("Customer", customer_id));
        }
        let customer = customer::get(&mut tx, customer_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", customer_id))?;
        tx.commit().await?;

        info!(
            customer_id = %customer_id,
            amount = %amount_cents,
            remaining_debt = %customer.debt_cents,
            actor = %actor.id,
            "Debt payment recorded"
        );

        Ok(customer)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
