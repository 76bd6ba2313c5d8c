//! Loan management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::loan::LoanDetails,
    services::loans::ReturnSummary,
};

use super::AuthenticatedMember;

/// Checkout request
#[derive(Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    /// Book to lend
    #[validate(range(min = 1, message = "Invalid book id"))]
    pub book_id: i32,
    /// Borrowing member
    #[validate(range(min = 1, message = "Invalid member id"))]
    pub member_id: i32,
    /// Due date; defaults to the configured loan period
    pub due_date: Option<DateTime<Utc>>,
}

/// Checkout response
#[derive(Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub loan: LoanDetails,
    /// Reservation fulfilled by this checkout, when the member picked up a hold
    pub fulfilled_reservation_id: Option<i32>,
}

/// Renewal request
#[derive(Deserialize, ToSchema)]
pub struct RenewLoanRequest {
    /// Explicit new due date; defaults to one more loan period
    pub due_date: Option<DateTime<Utc>>,
}

/// Lend a book to a member
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Loan created", body = CheckoutResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book not available")
    )
)]
pub async fn checkout(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<CheckoutResponse>)> {
    request.validate()?;
    claims.require_self_or_staff(request.member_id)?;

    let loans = &state.services.loans;
    let due_date = request
        .due_date
        .unwrap_or_else(|| loans.default_due_date(Utc::now()));

    let checkout = loans
        .checkout(request.book_id, request.member_id, due_date)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            loan: checkout.loan.details(Utc::now()),
            fulfilled_reservation_id: checkout.fulfilled.map(|r| r.id),
        }),
    ))
}

/// Get a loan
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get(loan_id).await?;
    claims.require_self_or_staff(loan.member_id)?;
    Ok(Json(loan))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = ReturnSummary),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn checkin(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<ReturnSummary>> {
    claims.require_librarian()?;

    let checkin = state.services.loans.checkin(loan_id).await?;
    Ok(Json(checkin.summary(Utc::now())))
}

/// Administrative return of a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/force-return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan closed", body = ReturnSummary),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn force_return(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<ReturnSummary>> {
    claims.require_admin()?;

    let checkin = state.services.loans.force_return(loan_id).await?;
    Ok(Json(checkin.summary(Utc::now())))
}

/// Renew a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/renew",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = RenewLoanRequest,
    responses(
        (status = 200, description = "Loan renewed", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Renewal limit reached, book reserved or already returned")
    )
)]
pub async fn renew_loan(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Path(loan_id): Path<i32>,
    request: Option<Json<RenewLoanRequest>>,
) -> AppResult<Json<LoanDetails>> {
    let current = state.services.loans.get(loan_id).await?;
    claims.require_self_or_staff(current.member_id)?;

    let due_date = request.and_then(|Json(r)| r.due_date);
    let loan = state.services.loans.renew(loan_id, due_date).await?;
    Ok(Json(loan.details(Utc::now())))
}

/// Open loans of a member
#[utoipa::path(
    get,
    path = "/members/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member's open loans", body = Vec<LoanDetails>)
    )
)]
pub async fn member_loans(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
    Path(member_id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_self_or_staff(member_id)?;

    let loans = state.services.loans.member_loans(member_id).await?;
    Ok(Json(loans))
}

/// Open loans past their due date
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans", body = Vec<LoanDetails>)
    )
)]
pub async fn overdue_loans(
    State(state): State<crate::AppState>,
    AuthenticatedMember(claims): AuthenticatedMember,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_librarian()?;

    let loans = state.services.loans.overdue().await?;
    Ok(Json(loans))
}
