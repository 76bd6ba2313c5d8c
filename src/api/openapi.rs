//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health, loans, reservations};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Circulation API",
        version = "1.0.0",
        description = "Book loans, reservation queues and pickup holds",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::get_book,
        // Loans
        loans::checkout,
        loans::get_loan,
        loans::checkin,
        loans::force_return,
        loans::renew_loan,
        loans::member_loans,
        loans::overdue_loans,
        // Reservations
        reservations::reserve,
        reservations::book_queue,
        reservations::get_reservation,
        reservations::cancel,
        reservations::member_reservations,
        reservations::expire_stale,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::BookStatus,
            // Loans
            loans::CheckoutRequest,
            loans::CheckoutResponse,
            loans::RenewLoanRequest,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanStatus,
            crate::services::loans::ReturnSummary,
            // Reservations
            reservations::ReserveRequest,
            reservations::CancelResponse,
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationStatus,
            crate::models::reservation::QueueEntry,
            crate::services::reservations::ExpiryReport,
            crate::services::notifications::DispatchReport,
            crate::services::notifications::DeliveryFailure,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Book circulation status"),
        (name = "loans", description = "Checkout, return and renewal"),
        (name = "reservations", description = "Reservation queue and holds")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
