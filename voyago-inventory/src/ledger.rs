use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

use voyago_core::ResourceKind;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("insufficient inventory for {resource_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        resource_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("invalid reservation request: {0}")]
    Validation(String),

    #[error("corrupt reservation row: {0}")]
    CorruptRow(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Adapter seam between the shared reservation state machine and a concrete
/// inventory table. Both operations run inside the caller's transaction, so
/// a failed debit rolls back with everything else.
#[async_trait]
pub trait ResourceLedger: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Lock the resource row and take `quantity` units out of availability.
    async fn debit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        resource_id: Uuid,
        quantity: i32,
    ) -> Result<(), InventoryError>;

    /// Restore `quantity` units of availability.
    async fn credit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        resource_id: Uuid,
        quantity: i32,
    ) -> Result<(), InventoryError>;
}

/// Hotel room types carry an integer availability counter.
pub struct RoomTypeLedger;

#[async_trait]
impl ResourceLedger for RoomTypeLedger {
    fn kind(&self) -> ResourceKind {
        ResourceKind::HotelRoom
    }

    async fn debit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        resource_id: Uuid,
        quantity: i32,
    ) -> Result<(), InventoryError> {
        let available: Option<i32> =
            sqlx::query_scalar("SELECT available FROM room_types WHERE id = $1 FOR UPDATE")
                .bind(resource_id)
                .fetch_optional(&mut **tx)
                .await?;

        let available = available.ok_or_else(|| InventoryError::NotFound(resource_id.to_string()))?;

        if available < quantity {
            return Err(InventoryError::InsufficientInventory {
                resource_id,
                requested: quantity,
                available,
            });
        }

        sqlx::query("UPDATE room_types SET available = available - $2 WHERE id = $1")
            .bind(resource_id)
            .bind(quantity)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn credit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        resource_id: Uuid,
        quantity: i32,
    ) -> Result<(), InventoryError> {
        let result = sqlx::query("UPDATE room_types SET available = available + $2 WHERE id = $1")
            .bind(resource_id)
            .bind(quantity)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            warn!(resource_id = %resource_id, "credit against missing room type");
        }

        Ok(())
    }
}

/// Rental cars are single units with a boolean availability flag.
pub struct RentalCarLedger;

#[async_trait]
impl ResourceLedger for RentalCarLedger {
    fn kind(&self) -> ResourceKind {
        ResourceKind::RentalCar
    }

    async fn debit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        resource_id: Uuid,
        quantity: i32,
    ) -> Result<(), InventoryError> {
        if quantity != 1 {
            return Err(InventoryError::Validation(
                "rental cars are reserved one unit at a time".into(),
            ));
        }

        let available: Option<bool> =
            sqlx::query_scalar("SELECT available FROM rental_cars WHERE id = $1 FOR UPDATE")
                .bind(resource_id)
                .fetch_optional(&mut **tx)
                .await?;

        let available = available.ok_or_else(|| InventoryError::NotFound(resource_id.to_string()))?;

        if !available {
            return Err(InventoryError::InsufficientInventory {
                resource_id,
                requested: 1,
                available: 0,
            });
        }

        sqlx::query("UPDATE rental_cars SET available = FALSE WHERE id = $1")
            .bind(resource_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn credit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        resource_id: Uuid,
        _quantity: i32,
    ) -> Result<(), InventoryError> {
        let result = sqlx::query("UPDATE rental_cars SET available = TRUE WHERE id = $1")
            .bind(resource_id)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            warn!(resource_id = %resource_id, "credit against missing rental car");
        }

        Ok(())
    }
}
