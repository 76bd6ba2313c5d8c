//! Transition coordinator: the only writer of book circulation status.
//!
//! Every caller locks the book row first and passes the [`LockedBook`] in,
//! so the decision below is taken with the row lock held and lands in the
//! caller's transaction. Notifications owed by a promotion are returned to
//! the caller, which dispatches them after commit.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookStatus, LockedBook},
        reservation::{next_in_line, Reservation, ReservationStatus},
    },
    repository::Repository,
};

/// Outcome of [`TransitionCoordinator::promote_or_release`]
#[derive(Debug, Clone)]
pub enum Promotion {
    /// The next Active reservation now holds the book; a notice is owed
    Promoted(Reservation),
    /// The book settled on a status without promoting anyone
    Settled(BookStatus),
    /// Catalog override in place; nothing was touched
    Suppressed(BookStatus),
}

impl Promotion {
    pub fn promoted(&self) -> Option<&Reservation> {
        match self {
            Promotion::Promoted(reservation) => Some(reservation),
            _ => None,
        }
    }

    pub fn book_status(&self) -> BookStatus {
        match self {
            Promotion::Promoted(_) => BookStatus::Reserved,
            Promotion::Settled(status) | Promotion::Suppressed(status) => *status,
        }
    }
}

/// Decision taken for a locked book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Suppress,
    Settle(BookStatus),
    Promote(i32),
}

/// Decide what happens to a book after a triggering event.
///
/// `open_loan` and `holding` describe the loan and Notified reservation that
/// still exist after the caller's own write; `next` is the head of the Active
/// queue.
pub fn decide(
    status: BookStatus,
    open_loan: bool,
    holding: bool,
    next: Option<&Reservation>,
) -> Transition {
    if status.is_override() {
        return Transition::Suppress;
    }
    if open_loan || holding {
        return Transition::Settle(BookStatus::derive(open_loan, holding));
    }
    match next {
        Some(reservation) => Transition::Promote(reservation.id),
        None => Transition::Settle(BookStatus::Available),
    }
}

#[derive(Clone)]
pub struct TransitionCoordinator {
    repository: Repository,
    hold_period: Duration,
}

impl TransitionCoordinator {
    pub fn new(repository: Repository, hold_period: Duration) -> Self {
        Self {
            repository,
            hold_period,
        }
    }

    /// Pass the book to the next Active reservation, or release it.
    pub async fn promote_or_release(
        &self,
        conn: &mut PgConnection,
        book: &LockedBook,
        now: DateTime<Utc>,
    ) -> AppResult<Promotion> {
        if book.status().is_override() {
            tracing::info!(book_id = book.id(), status = %book.status(), "Circulation suppressed by catalog status");
            return Ok(Promotion::Suppressed(book.status()));
        }

        let open_loan = self
            .repository
            .loans
            .find_open_for_book(&mut *conn, book.id())
            .await?
            .is_some();
        let holding = self
            .repository
            .reservations
            .find_notified(&mut *conn, book.id())
            .await?
            .is_some();
        let queue = if open_loan || holding {
            Vec::new()
        } else {
            self.repository
                .reservations
                .active_for_book(&mut *conn, book.id())
                .await?
        };

        match decide(book.status(), open_loan, holding, next_in_line(&queue)) {
            Transition::Suppress => Ok(Promotion::Suppressed(book.status())),
            Transition::Settle(status) => {
                self.repository
                    .books
                    .set_status(&mut *conn, book, status)
                    .await?;
                tracing::info!(book_id = book.id(), status = %status, "Book status settled");
                Ok(Promotion::Settled(status))
            }
            Transition::Promote(reservation_id) => {
                let expires_at = now + self.hold_period;
                let reservation = self
                    .repository
                    .reservations
                    .mark_notified(&mut *conn, reservation_id, now, expires_at)
                    .await?;
                self.repository
                    .books
                    .set_status(&mut *conn, book, BookStatus::Reserved)
                    .await?;
                tracing::info!(
                    book_id = book.id(),
                    reservation_id,
                    member_id = reservation.member_id,
                    expires_at = %expires_at,
                    "Hold granted to next reservation"
                );
                Ok(Promotion::Promoted(reservation))
            }
        }
    }

    /// Hand the book to `member_id` for a new loan.
    ///
    /// An Available book goes straight to OnLoan. A Reserved book only goes
    /// to the member holding its Notified reservation, which becomes
    /// Fulfilled. Anything else is `BookNotAvailable`.
    pub async fn claim_for_loan(
        &self,
        conn: &mut PgConnection,
        book: &LockedBook,
        member_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>> {
        let fulfilled = match book.status() {
            BookStatus::Available => None,
            BookStatus::Reserved => {
                let hold = self
                    .repository
                    .reservations
                    .find_notified(&mut *conn, book.id())
                    .await?
                    .filter(|r| r.member_id == member_id)
                    .ok_or(AppError::BookNotAvailable(book.id()))?;
                let fulfilled = self
                    .repository
                    .reservations
                    .close(&mut *conn, hold.id, ReservationStatus::Fulfilled, now)
                    .await?;
                tracing::info!(book_id = book.id(), reservation_id = hold.id, member_id, "Hold picked up");
                Some(fulfilled)
            }
            _ => return Err(AppError::BookNotAvailable(book.id())),
        };

        self.repository
            .books
            .set_status(&mut *conn, book, BookStatus::OnLoan)
            .await?;

        Ok(fulfilled)
    }
}
