//! Book registry: reads and writes the circulation status column

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookStatus, LockedBook},
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT id, title, status, updated_at FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    pub async fn get_status(&self, id: i32) -> AppResult<BookStatus> {
        sqlx::query_scalar::<_, BookStatus>("SELECT status FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Lock the book row until the surrounding transaction ends.
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<LockedBook> {
        sqlx::query_as::<_, Book>(
            "SELECT id, title, status, updated_at FROM books WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(LockedBook::new)
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Only the transition coordinator writes this column.
    pub(crate) async fn set_status(
        &self,
        conn: &mut PgConnection,
        book: &LockedBook,
        status: BookStatus,
    ) -> AppResult<()> {
        if book.status() == status {
            return Ok(());
        }

        sqlx::query("UPDATE books SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status)
            .bind(book.id())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
