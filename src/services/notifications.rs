//! Hold notifications, sent after the granting transaction has committed

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::reservation::{Reservation, ReservationStatus},
    repository::Repository,
    services::email::EmailService,
};

/// A granted hold the member must be told about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldNotice {
    pub reservation_id: i32,
    pub book_id: i32,
    pub member_id: i32,
    pub pickup_deadline: DateTime<Utc>,
}

impl HoldNotice {
    /// `None` unless the reservation is Notified with a deadline
    pub fn for_reservation(reservation: &Reservation) -> Option<Self> {
        if reservation.status != ReservationStatus::Notified {
            return None;
        }
        reservation.expires_at.map(|pickup_deadline| Self {
            reservation_id: reservation.id,
            book_id: reservation.book_id,
            member_id: reservation.member_id,
            pickup_deadline,
        })
    }
}

/// Message transport for hold notices (email, SMS, ...)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HoldNotifier: Send + Sync {
    async fn notify(&self, notice: &HoldNotice) -> AppResult<()>;
}

/// Transport that only logs; used when mail delivery is disabled
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl HoldNotifier for LogNotifier {
    async fn notify(&self, notice: &HoldNotice) -> AppResult<()> {
        tracing::info!(
            reservation_id = notice.reservation_id,
            member_id = notice.member_id,
            book_id = notice.book_id,
            pickup_deadline = %notice.pickup_deadline,
            "Hold ready for pickup"
        );
        Ok(())
    }
}

/// Transport that mails the member, resolving address and title from storage
#[derive(Clone)]
pub struct EmailNotifier {
    repository: Repository,
    email: EmailService,
}

impl EmailNotifier {
    pub fn new(repository: Repository, email: EmailService) -> Self {
        Self { repository, email }
    }
}

#[async_trait]
impl HoldNotifier for EmailNotifier {
    async fn notify(&self, notice: &HoldNotice) -> AppResult<()> {
        let contact = self.repository.members.contact(notice.member_id).await?;
        let address = contact.email.ok_or_else(|| {
            AppError::TransportFailure(format!("Member {} has no email address", notice.member_id))
        })?;
        let book = self.repository.books.get_by_id(notice.book_id).await?;

        self.email
            .send_hold_ready(
                &address,
                contact.display_name.as_deref(),
                &book.title,
                notice.pickup_deadline,
            )
            .await
    }
}

/// Per-notice delivery failure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeliveryFailure {
    pub reservation_id: i32,
    pub error: String,
}

/// What happened to the notices of one operation
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct DispatchReport {
    pub delivered: Vec<i32>,
    pub failed: Vec<DeliveryFailure>,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.delivered.extend(other.delivered);
        self.failed.extend(other.failed);
    }
}

/// Delivers hold notices once their transaction is committed.
///
/// Failures are logged and reported, never retried here, and never undo the
/// hold: an undelivered hold simply runs out and is reclaimed by the expiry
/// sweep.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn HoldNotifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn HoldNotifier>) -> Self {
        Self { notifier }
    }

    pub async fn dispatch<'a, I>(&self, promoted: I) -> DispatchReport
    where
        I: IntoIterator<Item = &'a Reservation>,
    {
        let mut report = DispatchReport::default();

        for reservation in promoted {
            let Some(notice) = HoldNotice::for_reservation(reservation) else {
                continue;
            };

            match self.notifier.notify(&notice).await {
                Ok(()) => report.delivered.push(notice.reservation_id),
                Err(e) => {
                    tracing::warn!(
                        reservation_id = notice.reservation_id,
                        member_id = notice.member_id,
                        error = %e,
                        "Hold notification not delivered"
                    );
                    report.failed.push(DeliveryFailure {
                        reservation_id: notice.reservation_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
