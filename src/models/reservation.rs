//! Reservation (hold) model and queue ordering

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Reservation lifecycle.
///
/// `Active -> Notified -> Fulfilled | Expired`, and `Active | Notified | Expired -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Notified,
    Fulfilled,
    Expired,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Notified => "notified",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    /// Still waiting in, or holding the head of, the queue
    pub fn is_pending(&self) -> bool {
        matches!(self, ReservationStatus::Active | ReservationStatus::Notified)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "notified" => Ok(ReservationStatus::Notified),
            "fulfilled" => Ok(ReservationStatus::Fulfilled),
            "expired" => Ok(ReservationStatus::Expired),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            _ => Err(format!("Invalid reservation status: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for ReservationStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for ReservationStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: &str = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for ReservationStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Reservation model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub book_id: i32,
    pub member_id: i32,
    pub requested_at: DateTime<Utc>,
    pub status: ReservationStatus,
    pub notified_at: Option<DateTime<Utc>>,
    /// Pickup deadline, set once notified
    pub expires_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// What cancelling a reservation does to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTransition {
    /// Active entry leaves the queue, nothing else moves
    LeaveQueue,
    /// Notified entry gives up the held book, which must be passed on
    ReleaseHold,
    /// Hold already lapsed; the reservation is closed as cancelled with no
    /// effect on the book
    Withdraw,
    /// Already cancelled; nothing to do
    AlreadyCancelled,
}

impl Reservation {
    /// FIFO order: `requested_at` ascending, ties by ascending id
    pub fn queue_cmp(&self, other: &Reservation) -> Ordering {
        self.requested_at
            .cmp(&other.requested_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Notified
            && self.expires_at.map(|deadline| deadline < now).unwrap_or(false)
    }

    pub fn cancel_transition(&self) -> AppResult<CancelTransition> {
        match self.status {
            ReservationStatus::Active => Ok(CancelTransition::LeaveQueue),
            ReservationStatus::Notified => Ok(CancelTransition::ReleaseHold),
            ReservationStatus::Expired => Ok(CancelTransition::Withdraw),
            ReservationStatus::Cancelled => Ok(CancelTransition::AlreadyCancelled),
            ReservationStatus::Fulfilled => Err(AppError::InvalidStateTransition(format!(
                "Reservation {} is fulfilled and can no longer be cancelled",
                self.id
            ))),
        }
    }
}

/// The Active reservation that is next in line, if any.
///
/// `reservations` is the locked queue of one book; the coordinator promotes
/// whatever this returns.
pub fn next_in_line(reservations: &[Reservation]) -> Option<&Reservation> {
    reservations
        .iter()
        .filter(|r| r.status == ReservationStatus::Active)
        .min_by(|a, b| a.queue_cmp(b))
}

/// Queue entry with its 1-based position, as shown to members and staff
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueEntry {
    pub position: usize,
    pub reservation: Reservation,
}

/// Order pending reservations for display: the current holder first, then
/// the Active entries in FIFO order.
pub fn queue_positions(mut reservations: Vec<Reservation>) -> Vec<QueueEntry> {
    reservations.retain(|r| r.status.is_pending());
    reservations.sort_by(|a, b| {
        let held = |r: &Reservation| r.status != ReservationStatus::Notified;
        held(a).cmp(&held(b)).then_with(|| a.queue_cmp(b))
    });
    reservations
        .into_iter()
        .enumerate()
        .map(|(index, reservation)| QueueEntry {
            position: index + 1,
            reservation,
        })
        .collect()
}
