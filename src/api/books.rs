//! Book circulation status endpoint

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{error::AppResult, models::book::Book};

use super::AuthenticatedMember;

/// Get a book with its circulation status
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedMember(_claims): AuthenticatedMember,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Book>> {
    let book = state.services.repository.books.get_by_id(book_id).await?;
    Ok(Json(book))
}
