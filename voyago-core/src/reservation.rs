use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which inventory service owns the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    HotelRoom,
    RentalCar,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::HotelRoom => "HOTEL_ROOM",
            ResourceKind::RentalCar => "RENTAL_CAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ReservationStatus::Pending),
            "CONFIRMED" => Some(ReservationStatus::Confirmed),
            "CANCELLED" => Some(ReservationStatus::Cancelled),
            "EXPIRED" => Some(ReservationStatus::Expired),
            _ => None,
        }
    }
}

/// A time-bounded claim on inventory pending confirmation or cancellation.
///
/// Owned exclusively by the inventory side; the booking aggregate holds only
/// the reservation id and never mutates the row directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub resource_kind: ResourceKind,
    pub resource_id: Uuid,
    pub booking_id: Uuid,
    pub quantity: i32,
    pub status: ReservationStatus,
    /// Set only while PENDING; cleared on every transition out of it.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Expiry instant for a hold created now.
pub fn hold_expiry(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    now + Duration::seconds(ttl_seconds as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Cancelled,
            ReservationStatus::Expired,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::parse("HELD"), None);
    }

    #[test]
    fn hold_expiry_is_ttl_from_now() {
        let now = Utc::now();
        let expiry = hold_expiry(now, 900);
        assert_eq!((expiry - now).num_seconds(), 900);
    }
}
