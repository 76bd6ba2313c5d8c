//! Loans repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::loan::Loan,
};

const LOAN_COLUMNS: &str =
    "id, book_id, member_id, loan_date, due_date, return_date, renewals, renewed_at, forced";

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Re-read a loan under lock inside a transaction
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    pub async fn find_open_for_book(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
    ) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE book_id = $1 AND return_date IS NULL",
            LOAN_COLUMNS
        ))
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(loan)
    }

    /// Open a loan. The partial unique index backs the one-open-loan rule.
    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        member_id: i32,
        loan_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            r#"
            INSERT INTO loans (book_id, member_id, loan_date, due_date, renewals, forced)
            VALUES ($1, $2, $3, $4, 0, FALSE)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(book_id)
        .bind(member_id)
        .bind(loan_date)
        .bind(due_date)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::on_unique_violation(e, || AppError::BookNotAvailable(book_id)))
    }

    /// Record the return of an open loan
    pub async fn close(
        &self,
        conn: &mut PgConnection,
        id: i32,
        returned_at: DateTime<Utc>,
        forced: bool,
    ) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            r#"
            UPDATE loans SET return_date = $2, forced = $3
            WHERE id = $1 AND return_date IS NULL
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(id)
        .bind(returned_at)
        .bind(forced)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::AlreadyReturned(id))
    }

    /// Move the due date of an open loan
    pub async fn extend(
        &self,
        conn: &mut PgConnection,
        id: i32,
        due_date: DateTime<Utc>,
        renewed_at: DateTime<Utc>,
    ) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            r#"
            UPDATE loans SET due_date = $2, renewed_at = $3, renewals = renewals + 1
            WHERE id = $1 AND return_date IS NULL
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(id)
        .bind(due_date)
        .bind(renewed_at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::AlreadyReturned(id))
    }

    /// Open loans for a member, oldest due date first
    pub async fn open_for_member(&self, member_id: i32) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE member_id = $1 AND return_date IS NULL ORDER BY due_date",
            LOAN_COLUMNS
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    /// Open loans whose due date has passed
    pub async fn overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE return_date IS NULL AND due_date < $1 ORDER BY due_date",
            LOAN_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    /// Count active loans
    pub async fn count_active(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE return_date IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
