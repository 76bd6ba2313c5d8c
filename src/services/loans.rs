//! Loan manager: checkout, checkin, forced return and renewal

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::{
        book::BookStatus,
        loan::{Loan, LoanDetails},
        reservation::Reservation,
    },
    repository::Repository,
    services::{
        coordinator::{Promotion, TransitionCoordinator},
        notifications::{DispatchReport, NotificationDispatcher},
    },
};

/// Result of a checkout
#[derive(Debug, Clone)]
pub struct Checkout {
    pub loan: Loan,
    /// Hold picked up by this checkout, if the book was reserved for the member
    pub fulfilled: Option<Reservation>,
}

/// Result of a checkin or forced return
#[derive(Debug, Clone)]
pub struct Checkin {
    pub loan: Loan,
    pub promotion: Promotion,
    pub notifications: DispatchReport,
}

/// Summary of the book side of a return, for API responses
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnSummary {
    pub loan: LoanDetails,
    pub book_status: BookStatus,
    /// Reservation that now holds the book
    pub promoted_reservation_id: Option<i32>,
    pub notifications: DispatchReport,
}

impl Checkin {
    pub fn summary(&self, now: DateTime<Utc>) -> ReturnSummary {
        ReturnSummary {
            loan: self.loan.details(now),
            book_status: self.promotion.book_status(),
            promoted_reservation_id: self.promotion.promoted().map(|r| r.id),
            notifications: self.notifications.clone(),
        }
    }
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    coordinator: TransitionCoordinator,
    dispatcher: NotificationDispatcher,
    policy: CirculationConfig,
}

impl LoansService {
    pub fn new(
        repository: Repository,
        coordinator: TransitionCoordinator,
        dispatcher: NotificationDispatcher,
        policy: CirculationConfig,
    ) -> Self {
        Self {
            repository,
            coordinator,
            dispatcher,
            policy,
        }
    }

    /// Default due date for a loan starting at `now`
    pub fn default_due_date(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.policy.loan_period()
    }

    /// Lend a book to a member.
    ///
    /// The book must be Available, or Reserved with `member_id` holding the
    /// Notified reservation (the pickup), else `BookNotAvailable`.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(
        &self,
        book_id: i32,
        member_id: i32,
        due_date: DateTime<Utc>,
    ) -> AppResult<Checkout> {
        let now = Utc::now();
        if due_date <= now {
            return Err(AppError::Validation("Due date must be in the future".to_string()));
        }

        let mut tx = self.repository.pool.begin().await?;

        let book = self.repository.books.lock(&mut tx, book_id).await?;
        let fulfilled = self
            .coordinator
            .claim_for_loan(&mut tx, &book, member_id, now)
            .await?;
        let loan = self
            .repository
            .loans
            .insert(&mut tx, book_id, member_id, now, due_date)
            .await?;

        tx.commit().await?;

        tracing::info!(loan_id = loan.id, book_id, member_id, due_date = %due_date, "Book checked out");

        Ok(Checkout { loan, fulfilled })
    }

    /// Return a borrowed book
    #[tracing::instrument(skip(self))]
    pub async fn checkin(&self, loan_id: i32) -> AppResult<Checkin> {
        self.close_loan(loan_id, false).await
    }

    /// Administrative return; goes through the same promotion path as a checkin
    #[tracing::instrument(skip(self))]
    pub async fn force_return(&self, loan_id: i32) -> AppResult<Checkin> {
        self.close_loan(loan_id, true).await
    }

    async fn close_loan(&self, loan_id: i32, forced: bool) -> AppResult<Checkin> {
        let now = Utc::now();

        let loan = self.repository.loans.get_by_id(loan_id).await?;
        if !loan.is_open() {
            return Err(AppError::AlreadyReturned(loan_id));
        }

        let mut tx = self.repository.pool.begin().await?;

        // book first, then loan: the lock order every operation uses
        let book = self.repository.books.lock(&mut tx, loan.book_id).await?;
        let loan = self.repository.loans.lock(&mut tx, loan_id).await?;
        if !loan.is_open() {
            return Err(AppError::AlreadyReturned(loan_id));
        }

        let loan = self
            .repository
            .loans
            .close(&mut tx, loan_id, now, forced)
            .await?;
        let promotion = self
            .coordinator
            .promote_or_release(&mut tx, &book, now)
            .await?;

        tx.commit().await?;

        tracing::info!(
            loan_id,
            book_id = loan.book_id,
            forced,
            book_status = %promotion.book_status(),
            "Book returned"
        );

        let notifications = self.dispatcher.dispatch(promotion.promoted()).await;

        Ok(Checkin {
            loan,
            promotion,
            notifications,
        })
    }

    /// Extend an open loan.
    ///
    /// Refused once the renewal limit is reached or when someone is waiting
    /// for the book.
    #[tracing::instrument(skip(self))]
    pub async fn renew(&self, loan_id: i32, due_date: Option<DateTime<Utc>>) -> AppResult<Loan> {
        let now = Utc::now();

        let loan = self.repository.loans.get_by_id(loan_id).await?;
        if !loan.is_open() {
            return Err(AppError::AlreadyReturned(loan_id));
        }

        let mut tx = self.repository.pool.begin().await?;

        let book = self.repository.books.lock(&mut tx, loan.book_id).await?;
        let loan = self.repository.loans.lock(&mut tx, loan_id).await?;
        if !loan.is_open() {
            return Err(AppError::AlreadyReturned(loan_id));
        }
        if loan.renewals >= self.policy.max_renewals {
            return Err(AppError::Conflict(format!(
                "Maximum renewals reached ({}/{})",
                loan.renewals, self.policy.max_renewals
            )));
        }
        if self
            .repository
            .reservations
            .has_active(&mut tx, book.id())
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Book {} has pending reservations and cannot be renewed",
                book.id()
            )));
        }

        let new_due_date = due_date.unwrap_or_else(|| loan.due_date.max(now) + self.policy.loan_period());
        if new_due_date <= loan.due_date {
            return Err(AppError::Validation(
                "New due date must be later than the current one".to_string(),
            ));
        }

        let loan = self
            .repository
            .loans
            .extend(&mut tx, loan_id, new_due_date, now)
            .await?;

        tx.commit().await?;

        tracing::info!(loan_id, due_date = %loan.due_date, renewals = loan.renewals, "Loan renewed");

        Ok(loan)
    }

    pub async fn get(&self, loan_id: i32) -> AppResult<LoanDetails> {
        let loan = self.repository.loans.get_by_id(loan_id).await?;
        Ok(loan.details(Utc::now()))
    }

    /// Open loans of a member
    pub async fn member_loans(&self, member_id: i32) -> AppResult<Vec<LoanDetails>> {
        let now = Utc::now();
        let loans = self.repository.loans.open_for_member(member_id).await?;
        Ok(loans.iter().map(|loan| loan.details(now)).collect())
    }

    pub async fn overdue(&self) -> AppResult<Vec<LoanDetails>> {
        let now = Utc::now();
        let loans = self.repository.loans.overdue(now).await?;
        Ok(loans.iter().map(|loan| loan.details(now)).collect())
    }

    /// Count active loans
    pub async fn count_active(&self) -> AppResult<i64> {
        self.repository.loans.count_active().await
    }
}
