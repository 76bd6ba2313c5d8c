//! Reservation queue: reserve, cancel and the expiry sweep

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookStatus,
        member::Requester,
        reservation::{queue_positions, CancelTransition, QueueEntry, Reservation, ReservationStatus},
    },
    repository::Repository,
    services::{
        coordinator::{Promotion, TransitionCoordinator},
        notifications::{DispatchReport, NotificationDispatcher},
    },
};

/// Result of a cancellation
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub reservation: Reservation,
    /// Set when the cancelled reservation was holding the book
    pub promotion: Option<Promotion>,
    pub notifications: DispatchReport,
}

/// What one expiry sweep did
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ExpiryReport {
    pub expired: Vec<i32>,
    pub promoted: Vec<i32>,
    /// Books that went back to Available
    pub released_books: Vec<i32>,
    /// Books whose sweep iteration failed and was rolled back
    pub failed_books: Vec<i32>,
    pub notifications: DispatchReport,
}

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
    coordinator: TransitionCoordinator,
    dispatcher: NotificationDispatcher,
}

impl ReservationsService {
    pub fn new(
        repository: Repository,
        coordinator: TransitionCoordinator,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            repository,
            coordinator,
            dispatcher,
        }
    }

    /// Queue a member for a book that is currently on loan
    #[tracing::instrument(skip(self))]
    pub async fn reserve(&self, book_id: i32, member_id: i32) -> AppResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.repository.pool.begin().await?;

        let book = self.repository.books.lock(&mut tx, book_id).await?;
        if book.status() != BookStatus::OnLoan {
            return Err(AppError::Conflict(format!(
                "Book {} is {}; only books on loan can be reserved",
                book_id,
                book.status()
            )));
        }

        if let Some(loan) = self
            .repository
            .loans
            .find_open_for_book(&mut tx, book_id)
            .await?
        {
            if loan.member_id == member_id {
                return Err(AppError::Conflict(format!(
                    "Member {} already has book {} on loan",
                    member_id, book_id
                )));
            }
        }

        if self
            .repository
            .reservations
            .find_pending(&mut tx, book_id, member_id)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateReservation { book_id, member_id });
        }

        let reservation = self
            .repository
            .reservations
            .insert(&mut tx, book_id, member_id, now)
            .await?;

        tx.commit().await?;

        tracing::info!(reservation_id = reservation.id, book_id, member_id, "Reservation queued");

        Ok(reservation)
    }

    /// Cancel a reservation on behalf of its member or an administrator.
    ///
    /// Cancelling the Notified holder passes the book on to the next member
    /// in the queue, or releases it.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, reservation_id: i32, requester: Requester) -> AppResult<Cancellation> {
        let now = Utc::now();

        let reservation = self.repository.reservations.get_by_id(reservation_id).await?;
        if reservation.member_id != requester.member_id && !requester.is_admin() {
            return Err(AppError::Authorization(format!(
                "Reservation {} belongs to another member",
                reservation_id
            )));
        }

        let mut tx = self.repository.pool.begin().await?;

        let book = self.repository.books.lock(&mut tx, reservation.book_id).await?;
        let reservation = self
            .repository
            .reservations
            .lock(&mut tx, reservation_id)
            .await?;

        let (reservation, promotion) = match reservation.cancel_transition()? {
            CancelTransition::AlreadyCancelled => (reservation, None),
            CancelTransition::LeaveQueue | CancelTransition::Withdraw => {
                let cancelled = self
                    .repository
                    .reservations
                    .close(&mut tx, reservation_id, ReservationStatus::Cancelled, now)
                    .await?;
                (cancelled, None)
            }
            CancelTransition::ReleaseHold => {
                let cancelled = self
                    .repository
                    .reservations
                    .close(&mut tx, reservation_id, ReservationStatus::Cancelled, now)
                    .await?;
                let promotion = self
                    .coordinator
                    .promote_or_release(&mut tx, &book, now)
                    .await?;
                (cancelled, Some(promotion))
            }
        };

        tx.commit().await?;

        tracing::info!(
            reservation_id,
            book_id = reservation.book_id,
            status = %reservation.status,
            "Reservation cancelled"
        );

        let notifications = self
            .dispatcher
            .dispatch(promotion.as_ref().and_then(Promotion::promoted))
            .await;

        Ok(Cancellation {
            reservation,
            promotion,
            notifications,
        })
    }

    /// Expire Notified holds whose pickup deadline has passed.
    ///
    /// Called by an external scheduler. Each book is handled in its own
    /// transaction under its row lock; a second call with no time elapsed
    /// finds nothing to do.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale(&self) -> AppResult<ExpiryReport> {
        self.expire_stale_at(Utc::now()).await
    }

    pub async fn expire_stale_at(&self, now: DateTime<Utc>) -> AppResult<ExpiryReport> {
        let mut report = ExpiryReport::default();

        let book_ids = self.repository.reservations.books_with_stale_holds(now).await?;

        for book_id in book_ids {
            match self.expire_book(book_id, now).await {
                Ok((expired, promotion)) => {
                    report.expired.extend(expired);
                    match &promotion {
                        Some(Promotion::Promoted(reservation)) => report.promoted.push(reservation.id),
                        Some(Promotion::Settled(BookStatus::Available)) => {
                            report.released_books.push(book_id)
                        }
                        _ => {}
                    }
                    let notifications = self
                        .dispatcher
                        .dispatch(promotion.as_ref().and_then(Promotion::promoted))
                        .await;
                    report.notifications.merge(notifications);
                }
                Err(e) => {
                    tracing::error!(book_id, error = %e, "Expiry sweep failed for book");
                    report.failed_books.push(book_id);
                }
            }
        }

        if !report.expired.is_empty() {
            tracing::info!(
                expired = report.expired.len(),
                promoted = report.promoted.len(),
                released = report.released_books.len(),
                "Expired stale holds"
            );
        }

        Ok(report)
    }

    async fn expire_book(
        &self,
        book_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<(Vec<i32>, Option<Promotion>)> {
        let mut tx = self.repository.pool.begin().await?;

        let book = self.repository.books.lock(&mut tx, book_id).await?;
        // re-checked under the book lock
        let stale: Vec<Reservation> = self
            .repository
            .reservations
            .notified_for_book(&mut tx, book_id)
            .await?
            .into_iter()
            .filter(|r| r.is_expired_at(now))
            .collect();
        if stale.is_empty() {
            // another sweep or a pickup got there first
            tx.commit().await?;
            return Ok((Vec::new(), None));
        }

        let mut expired = Vec::with_capacity(stale.len());
        for reservation in &stale {
            self.repository
                .reservations
                .close(&mut tx, reservation.id, ReservationStatus::Expired, now)
                .await?;
            expired.push(reservation.id);
        }

        let promotion = self
            .coordinator
            .promote_or_release(&mut tx, &book, now)
            .await?;

        tx.commit().await?;

        Ok((expired, Some(promotion)))
    }

    pub async fn get(&self, reservation_id: i32) -> AppResult<Reservation> {
        self.repository.reservations.get_by_id(reservation_id).await
    }

    /// Pending reservations of a book, holder first
    pub async fn queue(&self, book_id: i32) -> AppResult<Vec<QueueEntry>> {
        // 404 for unknown books rather than an empty queue
        self.repository.books.get_by_id(book_id).await?;
        let pending = self.repository.reservations.pending_for_book(book_id).await?;
        Ok(queue_positions(pending))
    }

    pub async fn member_reservations(&self, member_id: i32) -> AppResult<Vec<Reservation>> {
        self.repository.reservations.for_member(member_id).await
    }
}
