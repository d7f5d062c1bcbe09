//! # Delivery Dispatch Coordinator
//!
//! Assignment and status tracking for delivery orders.
//!
//! Orders are created by the sale coordinator; this service runs their
//! lifecycle afterwards. The one cross-entity rule lives in
//! `update_status`: landing a delivery completes its PENDING_DELIVERY sale,
//! in the same transaction.

use chrono::Utc;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use vetpos_core::{Actor, DeliveryOrder, DeliveryStatus};
use vetpos_db::repository::{delivery, sale};
use vetpos_db::Database;

/// Coordinator for delivery orders.
#[derive(Debug, Clone)]
pub struct DeliveryService {
    db: Database,
}

impl DeliveryService {
    /// Creates a new DeliveryService.
    pub fn new(db: Database) -> Self {
        DeliveryService { db }
    }

    /// Gets an order.
    pub async fn get(&self, id: &str) -> ServiceResult<DeliveryOrder> {
        self.db
            .deliveries()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("DeliveryOrder", id))
    }

    /// Lists orders, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<DeliveryStatus>,
        limit: u32,
    ) -> ServiceResult<Vec<DeliveryOrder>> {
        Ok(self.db.deliveries().list(status, limit).await?)
    }

    /// A courier's work queue: their assignments plus the unassigned pool.
    pub async fn list_for_courier(
        &self,
        courier_id: &str,
        limit: u32,
    ) -> ServiceResult<Vec<DeliveryOrder>> {
        Ok(self.db.deliveries().list_for_courier(courier_id, limit).await?)
    }

    /// Assigns a courier to an order (privileged).
    pub async fn assign(
        &self,
        order_id: &str,
        courier_id: &str,
        actor: &Actor,
    ) -> ServiceResult<DeliveryOrder> {
        if !actor.is_privileged() {
            return Err(ServiceError::forbidden(
                "only administrators can assign deliveries",
            ));
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let order = delivery::get(&mut tx, order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("DeliveryOrder", order_id))?;
        if order.status.is_terminal() {
            return Err(ServiceError::conflict(format!(
                "delivery order {order_id} is {:?}",
                order.status
            )));
        }

        delivery::assign(&mut tx, order_id, courier_id, now).await?;
        tx.commit().await?;

        info!(order_id = %order_id, courier_id = %courier_id, "Delivery assigned");

        self.get(order_id).await
    }

    /// Moves an order through its lifecycle.
    ///
    /// DELIVERED additionally completes the sale it came from, if that sale
    /// is still PENDING_DELIVERY - one transaction covers both.
    pub async fn update_status(
        &self,
        order_id: &str,
        status: DeliveryStatus,
        actor: &Actor,
    ) -> ServiceResult<DeliveryOrder> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let mut order = delivery::get(&mut tx, order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("DeliveryOrder", order_id))?;
        if order.status.is_terminal() {
            return Err(ServiceError::conflict(format!(
                "delivery order {order_id} is {:?}",
                order.status
            )));
        }

        delivery::set_status(&mut tx, order_id, status, now).await?;

        let mut sale_completed = false;
        if status == DeliveryStatus::Delivered {
            sale_completed = sale::complete_pending_delivery(&mut tx, &order.sale_id).await?;
        }

        tx.commit().await?;

        order.status = status;
        order.updated_at = now;

        info!(
            order_id = %order_id,
            status = ?status,
            sale_completed = sale_completed,
            actor = %actor.id,
            "Delivery status updated"
        );

        Ok(order)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
