use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use voyago_core::reservation::{hold_expiry, Reservation, ReservationStatus, ResourceKind};

use crate::ledger::{InventoryError, ResourceLedger};

/// Outcome of a cancel call. Cancellation is compensation and must be safe
/// to replay: cancelling a reservation that is already terminal (or was
/// never created) is a successful no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The hold was pending; inventory has been restored.
    Released,
    /// Nothing to do: absent or already confirmed/cancelled/expired.
    AlreadyResolved,
}

/// The reservation state machine, shared by every inventory kind and
/// parameterized by a [`ResourceLedger`] adapter.
///
/// All correctness comes from row-locked database transactions: each
/// operation is one committed-or-rolled-back unit, and no lock is ever held
/// across anything but local statements.
pub struct ReservationManager {
    pool: PgPool,
    ledger: Arc<dyn ResourceLedger>,
    hold_ttl_seconds: u64,
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    resource_kind: String,
    resource_id: Uuid,
    booking_id: Uuid,
    quantity: i32,
    status: String,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_reservation(self) -> Result<Reservation, InventoryError> {
        let status = ReservationStatus::parse(&self.status)
            .ok_or_else(|| InventoryError::CorruptRow(format!("status '{}'", self.status)))?;
        let resource_kind = match self.resource_kind.as_str() {
            "HOTEL_ROOM" => ResourceKind::HotelRoom,
            "RENTAL_CAR" => ResourceKind::RentalCar,
            other => return Err(InventoryError::CorruptRow(format!("resource_kind '{}'", other))),
        };

        Ok(Reservation {
            id: self.id,
            resource_kind,
            resource_id: self.resource_id,
            booking_id: self.booking_id,
            quantity: self.quantity,
            status,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

impl ReservationManager {
    pub fn new(pool: PgPool, ledger: Arc<dyn ResourceLedger>, hold_ttl_seconds: u64) -> Self {
        Self {
            pool,
            ledger,
            hold_ttl_seconds,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.ledger.kind()
    }

    /// Place a hold: debit the ledger and insert a PENDING reservation with
    /// a TTL, in one transaction. Concurrent creates against the same
    /// resource serialize on the ledger row lock, so availability can never
    /// go negative.
    #[instrument(skip(self), fields(kind = self.ledger.kind().as_str()))]
    pub async fn create(
        &self,
        resource_id: Uuid,
        booking_id: Uuid,
        quantity: i32,
    ) -> Result<Reservation, InventoryError> {
        if quantity < 1 {
            return Err(InventoryError::Validation(
                "quantity must be at least 1".into(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        self.ledger.debit(&mut tx, resource_id, quantity).await?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = hold_expiry(now, self.hold_ttl_seconds);

        sqlx::query(
            r#"
            INSERT INTO reservations
                (id, resource_kind, resource_id, booking_id, quantity, status, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            "#,
        )
        .bind(id)
        .bind(self.ledger.kind().as_str())
        .bind(resource_id)
        .bind(booking_id)
        .bind(quantity)
        .bind(ReservationStatus::Pending.as_str())
        .bind(expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            reservation_id = %id,
            resource_id = %resource_id,
            booking_id = %booking_id,
            quantity,
            "reservation created"
        );

        Ok(Reservation {
            id,
            resource_kind: self.ledger.kind(),
            resource_id,
            booking_id,
            quantity,
            status: ReservationStatus::Pending,
            expires_at: Some(expires_at),
            created_at: now,
        })
    }

    /// Confirm a pending hold. Anything that is not currently PENDING —
    /// already confirmed, expired, cancelled, or never created — reports
    /// NotFound uniformly; confirmation is attempted once per saga and the
    /// caller is not meant to distinguish those cases.
    #[instrument(skip(self), fields(kind = self.ledger.kind().as_str()))]
    pub async fn confirm(&self, reservation_id: Uuid) -> Result<Reservation, InventoryError> {
        let mut tx = self.pool.begin().await?;

        let row = self.lock_reservation(&mut tx, reservation_id).await?;

        let Some(row) = row else {
            return Err(InventoryError::NotFound(reservation_id.to_string()));
        };
        if row.status != ReservationStatus::Pending.as_str() {
            return Err(InventoryError::NotFound(reservation_id.to_string()));
        }

        sqlx::query(
            "UPDATE reservations SET status = $2, expires_at = NULL, updated_at = now() WHERE id = $1",
        )
        .bind(reservation_id)
        .bind(ReservationStatus::Confirmed.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(reservation_id = %reservation_id, "reservation confirmed");

        let mut reservation = row.into_reservation()?;
        reservation.status = ReservationStatus::Confirmed;
        reservation.expires_at = None;
        Ok(reservation)
    }

    /// Cancel a hold and restore inventory. Idempotent by contract: the
    /// saga's failure path calls this unconditionally, so a missing or
    /// already-terminal reservation commits a no-op and reports success.
    #[instrument(skip(self), fields(kind = self.ledger.kind().as_str()))]
    pub async fn cancel(&self, reservation_id: Uuid) -> Result<CancelOutcome, InventoryError> {
        let mut tx = self.pool.begin().await?;

        let row = self.lock_reservation(&mut tx, reservation_id).await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(CancelOutcome::AlreadyResolved);
        };
        if row.status != ReservationStatus::Pending.as_str() {
            tx.commit().await?;
            return Ok(CancelOutcome::AlreadyResolved);
        }

        sqlx::query(
            "UPDATE reservations SET status = $2, expires_at = NULL, updated_at = now() WHERE id = $1",
        )
        .bind(reservation_id)
        .bind(ReservationStatus::Cancelled.as_str())
        .execute(&mut *tx)
        .await?;

        self.ledger.credit(&mut tx, row.resource_id, row.quantity).await?;

        tx.commit().await?;

        info!(
            reservation_id = %reservation_id,
            resource_id = %row.resource_id,
            quantity = row.quantity,
            "reservation cancelled, inventory restored"
        );

        Ok(CancelOutcome::Released)
    }

    /// Reclaim every pending hold whose TTL has lapsed, in one batch
    /// transaction. Races benignly with late confirm/cancel calls: the row
    /// locks impose a total order and the loser observes "not pending".
    pub async fn sweep_expired(&self) -> Result<u64, InventoryError> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, resource_kind, resource_id, booking_id, quantity, status, expires_at, created_at
            FROM reservations
            WHERE resource_kind = $1 AND status = $2 AND expires_at < now()
            FOR UPDATE
            "#,
        )
        .bind(self.ledger.kind().as_str())
        .bind(ReservationStatus::Pending.as_str())
        .fetch_all(&mut *tx)
        .await?;

        for row in &rows {
            self.ledger.credit(&mut tx, row.resource_id, row.quantity).await?;
            sqlx::query(
                "UPDATE reservations SET status = $2, expires_at = NULL, updated_at = now() WHERE id = $1",
            )
            .bind(row.id)
            .bind(ReservationStatus::Expired.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(rows.len() as u64)
    }

    pub async fn get(&self, reservation_id: Uuid) -> Result<Reservation, InventoryError> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, resource_kind, resource_id, booking_id, quantity, status, expires_at, created_at
            FROM reservations
            WHERE id = $1 AND resource_kind = $2
            "#,
        )
        .bind(reservation_id)
        .bind(self.ledger.kind().as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| InventoryError::NotFound(reservation_id.to_string()))?
            .into_reservation()
    }

    async fn lock_reservation(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        reservation_id: Uuid,
    ) -> Result<Option<ReservationRow>, InventoryError> {
        let row = sqlx::query_as(
            r#"
            SELECT id, resource_kind, resource_id, booking_id, quantity, status, expires_at, created_at
            FROM reservations
            WHERE id = $1 AND resource_kind = $2
            FOR UPDATE
            "#,
        )
        .bind(reservation_id)
        .bind(self.ledger.kind().as_str())
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, kind: &str) -> ReservationRow {
        ReservationRow {
            id: Uuid::new_v4(),
            resource_kind: kind.to_string(),
            resource_id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            quantity: 2,
            status: status.to_string(),
            expires_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn row_converts_to_domain_reservation() {
        let reservation = row("PENDING", "HOTEL_ROOM").into_reservation().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.resource_kind, ResourceKind::HotelRoom);
        assert_eq!(reservation.quantity, 2);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = row("HELD", "RENTAL_CAR").into_reservation().unwrap_err();
        assert!(matches!(err, InventoryError::CorruptRow(_)));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = row("PENDING", "JET_SKI").into_reservation().unwrap_err();
        assert!(matches!(err, InventoryError::CorruptRow(_)));
    }
}
