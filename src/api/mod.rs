//! API handlers for the circulation REST endpoints

pub mod books;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod reservations;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    Router,
};

use crate::{error::AppError, models::member::MemberClaims, AppState};

/// Extractor for the member identity carried by the bearer token
pub struct AuthenticatedMember(pub MemberClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedMember {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = MemberClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedMember(claims))
    }
}

/// Routes mounted under `/api/v1`
pub fn routes(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Books
        .route("/books/:id", get(books::get_book))
        .route("/books/:id/reservations", get(reservations::book_queue))
        .route("/books/:id/reservations", post(reservations::reserve))
        // Loans
        .route("/loans", post(loans::checkout))
        .route("/loans/overdue", get(loans::overdue_loans))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/return", post(loans::checkin))
        .route("/loans/:id/force-return", post(loans::force_return))
        .route("/loans/:id/renew", post(loans::renew_loan))
        // Members
        .route("/members/:id/loans", get(loans::member_loans))
        .route("/members/:id/reservations", get(reservations::member_reservations))
        // Reservations
        .route("/reservations/expire", post(reservations::expire_stale))
        .route("/reservations/:id", get(reservations::get_reservation))
        .route("/reservations/:id/cancel", post(reservations::cancel))
        .with_state(state)
}
