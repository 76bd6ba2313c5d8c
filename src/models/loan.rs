//! Loan model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Loan model from database. `return_date = NULL` means the loan is open.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    pub member_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub renewals: i16,
    pub renewed_at: Option<DateTime<Utc>>,
    /// Closed by an administrative forced return
    pub forced: bool,
}

/// Loan status derived from its dates; never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    OnLoan,
    Overdue,
    Returned,
}

impl Loan {
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> LoanStatus {
        match self.return_date {
            Some(_) => LoanStatus::Returned,
            None if self.due_date < now => LoanStatus::Overdue,
            None => LoanStatus::OnLoan,
        }
    }

    pub fn details(&self, now: DateTime<Utc>) -> LoanDetails {
        LoanDetails {
            id: self.id,
            book_id: self.book_id,
            member_id: self.member_id,
            loan_date: self.loan_date,
            due_date: self.due_date,
            return_date: self.return_date,
            renewals: self.renewals,
            forced: self.forced,
            status: self.status_at(now),
        }
    }
}

/// Loan with its derived status, for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub book_id: i32,
    pub member_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub renewals: i16,
    pub forced: bool,
    pub status: LoanStatus,
}
