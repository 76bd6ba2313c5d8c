//! Reservation queue endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        book::BookStatus,
        reservation::{QueueEntry, Reservation},
    },
    services::{notifications::DispatchReport, reservations::ExpiryReport},
};

use super::AuthenticatedMember;

/// Reservation request
#[derive(Deserialize, Validate, ToSchema)]
pub struct ReserveRequest {
    /// Member to queue
    #[validate(range(min = 1, message = "Invalid member id"))]
    pub member_id: i32,
}

/// Cancellation response
#[derive(Serialize, ToSchema)]
pub struct CancelResponse {
    pub reservation: Reservation,
    /// Book status after the cancellation, when it released a hold
    pub book_status: Option<BookStatus>,
    /// Reservation that received the book in its place
    pub promoted_reservation_id: Option<i32>,
    pub notifications: DispatchReport,
}

/// Queue a member for a book on loan
#[utoipa::path(
    post,
    path = "/books/{id}/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = ReserveRequest,
    responses(
        (status = 201, description = "Reservation queued", body = Reservation),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book not on loan or reservation already pending")
    )
)]
pub async fn reserve(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Path(book_id): Path<i32>,
    Json(request): Json<ReserveRequest>,
) -> AppResult<(StatusCode, Json<Reservation>)> {
    request.validate()?;
    claims.require_self_or_staff(request.member_id)?;

    let reservation = state
        .services
        .reservations
        .reserve(book_id, request.member_id)
        .await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Pending reservations of a book, current holder first
#[utoipa::path(
    get,
    path = "/books/{id}/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Reservation queue", body = Vec<QueueEntry>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn book_queue(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Vec<QueueEntry>>> {
    claims.require_librarian()?;

    let queue = state.services.reservations.queue(book_id).await?;
    Ok(Json(queue))
}

/// Get a reservation
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation", body = Reservation),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Path(reservation_id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    let reservation = state.services.reservations.get(reservation_id).await?;
    claims.require_self_or_staff(reservation.member_id)?;
    Ok(Json(reservation))
}

/// Cancel a reservation
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = CancelResponse),
        (status = 403, description = "Not the owner of the reservation"),
        (status = 404, description = "Reservation not found"),
        (status = 422, description = "Reservation already fulfilled")
    )
)]
pub async fn cancel(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Path(reservation_id): Path<i32>,
) -> AppResult<Json<CancelResponse>> {
    let cancellation = state
        .services
        .reservations
        .cancel(reservation_id, claims.requester())
        .await?;

    Ok(Json(CancelResponse {
        book_status: cancellation.promotion.as_ref().map(|p| p.book_status()),
        promoted_reservation_id: cancellation
            .promotion
            .as_ref()
            .and_then(|p| p.promoted())
            .map(|r| r.id),
        reservation: cancellation.reservation,
        notifications: cancellation.notifications,
    }))
}

/// Reservations of a member, newest first
#[utoipa::path(
    get,
    path = "/members/{id}/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member's reservations", body = Vec<Reservation>)
    )
)]
pub async fn member_reservations(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Path(member_id): Path<i32>,
) -> AppResult<Json<Vec<Reservation>>> {
    claims.require_self_or_staff(member_id)?;

    let reservations = state.services.reservations.member_reservations(member_id).await?;
    Ok(Json(reservations))
}

/// Expire holds past their pickup deadline (scheduler trigger)
#[utoipa::path(
    post,
    path = "/reservations/expire",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep report", body = ExpiryReport),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn expire_stale(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
) -> AppResult<Json<ExpiryReport>> {
    claims.require_admin()?;

    let report = state.services.reservations.expire_stale().await?;
    Ok(Json(report))
}
