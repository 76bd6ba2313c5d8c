//! Reservation queue storage

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::reservation::{Reservation, ReservationStatus},
};

const RESERVATION_COLUMNS: &str =
    "id, book_id, member_id, requested_at, status, notified_at, expires_at, closed_at";

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    /// Active or Notified reservation of a member for a book
    pub async fn find_pending(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        member_id: i32,
    ) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE book_id = $1 AND member_id = $2 AND status IN ('active', 'notified')
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .bind(member_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(reservation)
    }

    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        member_id: i32,
        requested_at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            r#"
            INSERT INTO reservations (book_id, member_id, requested_at, status)
            VALUES ($1, $2, $3, 'active')
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .bind(member_id)
        .bind(requested_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            AppError::on_unique_violation(e, || AppError::DuplicateReservation { book_id, member_id })
        })
    }

    /// Active queue of a book, locked, in FIFO order
    pub async fn active_for_book(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
    ) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE book_id = $1 AND status = 'active'
            ORDER BY requested_at ASC, id ASC
            FOR UPDATE
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(reservations)
    }

    /// The reservation currently holding the book, if any
    pub async fn find_notified(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
    ) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE book_id = $1 AND status = 'notified'
            ORDER BY notified_at ASC, id ASC
            LIMIT 1
            FOR UPDATE
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(reservation)
    }

    pub async fn has_active(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reservations WHERE book_id = $1 AND status = 'active')",
        )
        .bind(book_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(exists)
    }

    pub async fn mark_notified(
        &self,
        conn: &mut PgConnection,
        id: i32,
        notified_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            r#"
            UPDATE reservations SET status = 'notified', notified_at = $2, expires_at = $3
            WHERE id = $1 AND status = 'active'
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .bind(notified_at)
        .bind(expires_at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            AppError::InvalidStateTransition(format!("Reservation {} is no longer active", id))
        })
    }

    /// Move a pending reservation to a terminal state. An expired
    /// reservation may still be closed as cancelled.
    pub async fn close(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: ReservationStatus,
        closed_at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            r#"
            UPDATE reservations SET status = $2, closed_at = $3
            WHERE id = $1
              AND (status IN ('active', 'notified')
                   OR (status = 'expired' AND $2 = 'cancelled'))
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(closed_at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            AppError::InvalidStateTransition(format!(
                "Reservation {} is not pending and cannot become {}",
                id, status
            ))
        })
    }

    /// Pending reservations of a book in FIFO order
    pub async fn pending_for_book(&self, book_id: i32) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE book_id = $1 AND status IN ('active', 'notified')
            ORDER BY requested_at ASC, id ASC
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reservations)
    }

    pub async fn for_member(&self, member_id: i32) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE member_id = $1 ORDER BY requested_at DESC, id DESC",
            RESERVATION_COLUMNS
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reservations)
    }

    /// Books with at least one Notified reservation past its deadline
    pub async fn books_with_stale_holds(&self, now: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let book_ids = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT DISTINCT book_id FROM reservations
            WHERE status = 'notified' AND expires_at < $1
            ORDER BY book_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(book_ids)
    }

    /// Notified holds of one book, locked
    pub async fn notified_for_book(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
    ) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE book_id = $1 AND status = 'notified'
            ORDER BY expires_at ASC, id ASC
            FOR UPDATE
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(reservations)
    }
}
