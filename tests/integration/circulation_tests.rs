//! Circulation integration tests against PostgreSQL
//!
//! Run with: DATABASE_URL=postgres://... cargo test -- --ignored

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use circulation_server::{
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::{BookStatus, Requester, ReservationStatus, Role},
    repository::Repository,
    services::{
        coordinator::Promotion,
        notifications::{HoldNotice, HoldNotifier},
        Services,
    },
};

/// Notifier that records every notice it is asked to deliver
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<HoldNotice>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn sent_for(&self, reservation_id: i32) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.reservation_id == reservation_id)
            .count()
    }
}

#[async_trait]
impl HoldNotifier for RecordingNotifier {
    async fn notify(&self, notice: &HoldNotice) -> AppResult<()> {
        self.sent.lock().unwrap().push(notice.clone());
        if self.fail {
            Err(AppError::TransportFailure("mailbox unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

struct Harness {
    pool: PgPool,
    services: Services,
    notifier: Arc<RecordingNotifier>,
}

async fn connect() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn harness_with(notifier: RecordingNotifier) -> Harness {
    let pool = connect().await;
    let notifier = Arc::new(notifier);
    let services = Services::new(
        Repository::new(pool.clone()),
        CirculationConfig::default(),
        notifier.clone(),
    );
    Harness {
        pool,
        services,
        notifier,
    }
}

async fn harness() -> Harness {
    harness_with(RecordingNotifier::default()).await
}

impl Harness {
    async fn book(&self) -> i32 {
        sqlx::query_scalar("INSERT INTO books (title) VALUES ('The Dispossessed') RETURNING id")
            .fetch_one(&self.pool)
            .await
            .expect("Failed to create book")
    }

    async fn member(&self) -> i32 {
        sqlx::query_scalar(
            "INSERT INTO members (email, display_name) VALUES ('reader@example.org', 'Reader') RETURNING id",
        )
        .fetch_one(&self.pool)
        .await
        .expect("Failed to create member")
    }

    async fn status(&self, book_id: i32) -> BookStatus {
        self.services
            .repository
            .books
            .get_status(book_id)
            .await
            .expect("Failed to read status")
    }

    async fn reservation_status(&self, reservation_id: i32) -> ReservationStatus {
        self.services
            .reservations
            .get(reservation_id)
            .await
            .expect("Failed to read reservation")
            .status
    }

    /// Checked-out book with its loan id
    async fn lent_book(&self) -> (i32, i32) {
        let book_id = self.book().await;
        let borrower = self.member().await;
        let checkout = self
            .services
            .loans
            .checkout(book_id, borrower, Utc::now() + Duration::days(14))
            .await
            .expect("Checkout failed");
        (book_id, checkout.loan.id)
    }

    async fn expire_hold(&self, reservation_id: i32) {
        sqlx::query("UPDATE reservations SET expires_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
            .bind(reservation_id)
            .execute(&self.pool)
            .await
            .expect("Failed to backdate hold");
    }

    /// Loan, hold and status consistency for one book
    async fn assert_invariants(&self, book_id: i32) {
        let open_loans: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE book_id = $1 AND return_date IS NULL")
                .bind(book_id)
                .fetch_one(&self.pool)
                .await
                .unwrap();
        let notified: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE book_id = $1 AND status = 'notified'",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .unwrap();
        let duplicate_pending: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM (
                SELECT member_id FROM reservations
                WHERE book_id = $1 AND status IN ('active', 'notified')
                GROUP BY member_id HAVING COUNT(*) > 1
            ) d
            "#,
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .unwrap();

        assert!(open_loans <= 1, "book {} has {} open loans", book_id, open_loans);
        assert_eq!(duplicate_pending, 0);
        let status = self.status(book_id).await;
        if !status.is_override() {
            assert_eq!(status, BookStatus::derive(open_loans == 1, notified > 0));
        }
    }
}

// Scenario A
#[tokio::test]
#[ignore]
async fn test_checkout_checkin_round_trip() {
    let h = harness().await;
    let book_id = h.book().await;
    let member = h.member().await;

    let checkout = h
        .services
        .loans
        .checkout(book_id, member, Utc::now() + Duration::days(14))
        .await
        .unwrap();
    assert!(checkout.loan.is_open());
    assert!(checkout.fulfilled.is_none());
    assert_eq!(h.status(book_id).await, BookStatus::OnLoan);
    assert!(h.services.loans.count_active().await.unwrap() >= 1);
    h.assert_invariants(book_id).await;

    let checkin = h.services.loans.checkin(checkout.loan.id).await.unwrap();
    assert!(!checkin.loan.is_open());
    assert!(matches!(checkin.promotion, Promotion::Settled(BookStatus::Available)));
    assert!(checkin.notifications.delivered.is_empty());
    assert_eq!(h.status(book_id).await, BookStatus::Available);
    h.assert_invariants(book_id).await;
}

// Scenario B
#[tokio::test]
#[ignore]
async fn test_checkin_promotes_waiting_reservation() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let waiting = h.member().await;

    let reservation = h.services.reservations.reserve(book_id, waiting).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Active);

    let before = Utc::now();
    let checkin = h.services.loans.checkin(loan_id).await.unwrap();

    let promoted = checkin.promotion.promoted().expect("reservation should be promoted");
    assert_eq!(promoted.id, reservation.id);
    assert_eq!(promoted.status, ReservationStatus::Notified);
    let expires_at = promoted.expires_at.unwrap();
    assert!(expires_at >= before + Duration::days(3));
    assert!(expires_at <= Utc::now() + Duration::days(3));

    assert_eq!(h.status(book_id).await, BookStatus::Reserved);
    assert_eq!(checkin.notifications.delivered, vec![reservation.id]);
    assert_eq!(h.notifier.sent_for(reservation.id), 1);
    h.assert_invariants(book_id).await;
}

// Scenario C
#[tokio::test]
#[ignore]
async fn test_promotion_is_fifo() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let first_member = h.member().await;
    let second_member = h.member().await;

    let first = h.services.reservations.reserve(book_id, first_member).await.unwrap();
    let second = h.services.reservations.reserve(book_id, second_member).await.unwrap();
    assert!(first.requested_at <= second.requested_at);

    let checkin = h.services.loans.checkin(loan_id).await.unwrap();
    assert_eq!(checkin.promotion.promoted().map(|r| r.id), Some(first.id));
    assert_eq!(h.reservation_status(second.id).await, ReservationStatus::Active);
    assert_eq!(h.notifier.sent_for(second.id), 0);

    let queue = h.services.reservations.queue(book_id).await.unwrap();
    let order: Vec<i32> = queue.iter().map(|e| e.reservation.id).collect();
    assert_eq!(order, vec![first.id, second.id]);
}

#[tokio::test]
#[ignore]
async fn test_equal_request_times_promote_lower_id_first() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let a = h.member().await;
    let b = h.member().await;

    let first = h.services.reservations.reserve(book_id, a).await.unwrap();
    let second = h.services.reservations.reserve(book_id, b).await.unwrap();
    sqlx::query("UPDATE reservations SET requested_at = $1 WHERE id = ANY($2)")
        .bind(Utc::now() - Duration::minutes(5))
        .bind(vec![first.id, second.id])
        .execute(&h.pool)
        .await
        .unwrap();

    let checkin = h.services.loans.checkin(loan_id).await.unwrap();
    assert_eq!(checkin.promotion.promoted().map(|r| r.id), Some(first.id.min(second.id)));
}

// Scenario D, with a second reservation waiting
#[tokio::test]
#[ignore]
async fn test_expiry_promotes_next_reservation() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let first_member = h.member().await;
    let second_member = h.member().await;

    let first = h.services.reservations.reserve(book_id, first_member).await.unwrap();
    let second = h.services.reservations.reserve(book_id, second_member).await.unwrap();
    h.services.loans.checkin(loan_id).await.unwrap();
    h.expire_hold(first.id).await;

    let report = h.services.reservations.expire_stale().await.unwrap();
    assert!(report.expired.contains(&first.id));
    assert!(report.promoted.contains(&second.id));
    assert!(report.failed_books.is_empty());

    assert_eq!(h.reservation_status(first.id).await, ReservationStatus::Expired);
    assert_eq!(h.reservation_status(second.id).await, ReservationStatus::Notified);
    assert_eq!(h.status(book_id).await, BookStatus::Reserved);
    assert_eq!(h.notifier.sent_for(second.id), 1);
    h.assert_invariants(book_id).await;
}

// Scenario D, empty queue
#[tokio::test]
#[ignore]
async fn test_expiry_releases_book_when_queue_empty() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let member = h.member().await;

    let reservation = h.services.reservations.reserve(book_id, member).await.unwrap();
    h.services.loans.checkin(loan_id).await.unwrap();
    h.expire_hold(reservation.id).await;

    let report = h.services.reservations.expire_stale().await.unwrap();
    assert!(report.expired.contains(&reservation.id));
    assert!(report.released_books.contains(&book_id));
    assert_eq!(h.status(book_id).await, BookStatus::Available);
    h.assert_invariants(book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_expiry_sweep_is_idempotent() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let member = h.member().await;

    let reservation = h.services.reservations.reserve(book_id, member).await.unwrap();
    h.services.loans.checkin(loan_id).await.unwrap();
    h.expire_hold(reservation.id).await;

    let now = Utc::now();
    let first = h.services.reservations.expire_stale_at(now).await.unwrap();
    assert!(first.expired.contains(&reservation.id));
    let status_after_first = h.status(book_id).await;

    let second = h.services.reservations.expire_stale_at(now).await.unwrap();
    assert!(!second.expired.contains(&reservation.id));
    assert!(!second.released_books.contains(&book_id));
    assert_eq!(h.status(book_id).await, status_after_first);
    assert_eq!(h.reservation_status(reservation.id).await, ReservationStatus::Expired);
}

#[tokio::test]
#[ignore]
async fn test_unexpired_hold_is_left_alone() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let member = h.member().await;

    let reservation = h.services.reservations.reserve(book_id, member).await.unwrap();
    h.services.loans.checkin(loan_id).await.unwrap();

    let report = h.services.reservations.expire_stale().await.unwrap();
    assert!(!report.expired.contains(&reservation.id));
    assert_eq!(h.reservation_status(reservation.id).await, ReservationStatus::Notified);
    assert_eq!(h.status(book_id).await, BookStatus::Reserved);
}

// Scenario E
#[tokio::test]
#[ignore]
async fn test_concurrent_checkouts_one_wins() {
    let h = harness().await;
    let book_id = h.book().await;
    let a = h.member().await;
    let b = h.member().await;
    let due = Utc::now() + Duration::days(14);

    let (first, second) = tokio::join!(
        h.services.loans.checkout(book_id, a, due),
        h.services.loans.checkout(book_id, b, due),
    );

    let results = [first, second];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::BookNotAvailable(id)) if *id == book_id))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(refused, 1);
    assert_eq!(h.status(book_id).await, BookStatus::OnLoan);
    h.assert_invariants(book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_checkout_refused_when_not_available() {
    let h = harness().await;
    let (book_id, _) = h.lent_book().await;
    let other = h.member().await;

    let err = h
        .services
        .loans
        .checkout(book_id, other, Utc::now() + Duration::days(7))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BookNotAvailable(_)));

    let missing = h
        .services
        .loans
        .checkout(i32::MAX, other, Utc::now() + Duration::days(7))
        .await
        .unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));
}

#[tokio::test]
#[ignore]
async fn test_catalog_override_blocks_checkout_and_promotion() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let member = h.member().await;
    h.services.reservations.reserve(book_id, member).await.unwrap();

    sqlx::query("UPDATE books SET status = 'maintenance' WHERE id = $1")
        .bind(book_id)
        .execute(&h.pool)
        .await
        .unwrap();

    let checkin = h.services.loans.checkin(loan_id).await.unwrap();
    assert!(matches!(checkin.promotion, Promotion::Suppressed(BookStatus::Maintenance)));
    assert_eq!(h.status(book_id).await, BookStatus::Maintenance);

    let err = h
        .services
        .loans
        .checkout(book_id, member, Utc::now() + Duration::days(7))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BookNotAvailable(_)));
}

#[tokio::test]
#[ignore]
async fn test_checkin_twice_is_already_returned() {
    let h = harness().await;
    let (_, loan_id) = h.lent_book().await;

    h.services.loans.checkin(loan_id).await.unwrap();
    let err = h.services.loans.checkin(loan_id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyReturned(id) if id == loan_id));

    let err = h.services.loans.checkin(i32::MAX).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[ignore]
async fn test_force_return_promotes_like_checkin() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let member = h.member().await;
    let reservation = h.services.reservations.reserve(book_id, member).await.unwrap();

    let checkin = h.services.loans.force_return(loan_id).await.unwrap();
    assert!(checkin.loan.forced);
    assert_eq!(checkin.promotion.promoted().map(|r| r.id), Some(reservation.id));
    assert_eq!(h.status(book_id).await, BookStatus::Reserved);
    h.assert_invariants(book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_holder_picks_up_reserved_book() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let holder = h.member().await;
    let stranger = h.member().await;
    let reservation = h.services.reservations.reserve(book_id, holder).await.unwrap();
    h.services.loans.checkin(loan_id).await.unwrap();

    let due = Utc::now() + Duration::days(14);
    let err = h.services.loans.checkout(book_id, stranger, due).await.unwrap_err();
    assert!(matches!(err, AppError::BookNotAvailable(_)));

    let checkout = h.services.loans.checkout(book_id, holder, due).await.unwrap();
    assert_eq!(checkout.fulfilled.map(|r| r.id), Some(reservation.id));
    assert_eq!(h.reservation_status(reservation.id).await, ReservationStatus::Fulfilled);
    assert_eq!(h.status(book_id).await, BookStatus::OnLoan);
    h.assert_invariants(book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_reserve_preconditions() {
    let h = harness().await;
    let available = h.book().await;
    let member = h.member().await;

    let err = h.services.reservations.reserve(available, member).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let (book_id, _) = h.lent_book().await;
    h.services.reservations.reserve(book_id, member).await.unwrap();
    let err = h.services.reservations.reserve(book_id, member).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::DuplicateReservation { book_id: b, member_id: m } if b == book_id && m == member
    ));
    h.assert_invariants(book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_borrower_cannot_reserve_own_loan() {
    let h = harness().await;
    let book_id = h.book().await;
    let member = h.member().await;
    h.services
        .loans
        .checkout(book_id, member, Utc::now() + Duration::days(14))
        .await
        .unwrap();

    let err = h.services.reservations.reserve(book_id, member).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[ignore]
async fn test_cancel_notified_hold_promotes_next() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let first_member = h.member().await;
    let second_member = h.member().await;
    let first = h.services.reservations.reserve(book_id, first_member).await.unwrap();
    let second = h.services.reservations.reserve(book_id, second_member).await.unwrap();
    h.services.loans.checkin(loan_id).await.unwrap();

    let requester = Requester {
        member_id: first_member,
        role: Role::Member,
    };
    let cancellation = h.services.reservations.cancel(first.id, requester).await.unwrap();
    assert_eq!(cancellation.reservation.status, ReservationStatus::Cancelled);
    let promotion = cancellation.promotion.expect("holder cancellation re-promotes");
    assert_eq!(promotion.promoted().map(|r| r.id), Some(second.id));
    assert_eq!(h.status(book_id).await, BookStatus::Reserved);
    assert_eq!(h.notifier.sent_for(second.id), 1);
    h.assert_invariants(book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_cancel_notified_hold_releases_book() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let member = h.member().await;
    let reservation = h.services.reservations.reserve(book_id, member).await.unwrap();
    h.services.loans.checkin(loan_id).await.unwrap();

    let admin = Requester {
        member_id: h.member().await,
        role: Role::Admin,
    };
    let cancellation = h.services.reservations.cancel(reservation.id, admin).await.unwrap();
    assert!(matches!(
        cancellation.promotion,
        Some(Promotion::Settled(BookStatus::Available))
    ));
    assert_eq!(h.status(book_id).await, BookStatus::Available);
    h.assert_invariants(book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_cancel_active_has_no_cascade() {
    let h = harness().await;
    let (book_id, _) = h.lent_book().await;
    let member = h.member().await;
    let reservation = h.services.reservations.reserve(book_id, member).await.unwrap();

    let requester = Requester {
        member_id: member,
        role: Role::Member,
    };
    let cancellation = h.services.reservations.cancel(reservation.id, requester).await.unwrap();
    assert!(cancellation.promotion.is_none());
    assert_eq!(h.status(book_id).await, BookStatus::OnLoan);

    // cancelling again is a no-op
    let again = h.services.reservations.cancel(reservation.id, requester).await.unwrap();
    assert_eq!(again.reservation.status, ReservationStatus::Cancelled);
}

#[tokio::test]
#[ignore]
async fn test_cancel_rules() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;
    let holder = h.member().await;
    let reservation = h.services.reservations.reserve(book_id, holder).await.unwrap();

    let stranger = Requester {
        member_id: h.member().await,
        role: Role::Member,
    };
    let err = h.services.reservations.cancel(reservation.id, stranger).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    h.services.loans.checkin(loan_id).await.unwrap();
    h.services
        .loans
        .checkout(book_id, holder, Utc::now() + Duration::days(14))
        .await
        .unwrap();

    let owner = Requester {
        member_id: holder,
        role: Role::Member,
    };
    let err = h.services.reservations.cancel(reservation.id, owner).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    // a lapsed hold can still be withdrawn; the book is not touched
    let (other_book, other_loan) = h.lent_book().await;
    let lapsed = h.services.reservations.reserve(other_book, holder).await.unwrap();
    h.services.loans.checkin(other_loan).await.unwrap();
    h.expire_hold(lapsed.id).await;
    h.services.reservations.expire_stale().await.unwrap();
    assert_eq!(h.reservation_status(lapsed.id).await, ReservationStatus::Expired);
    assert_eq!(h.status(other_book).await, BookStatus::Available);

    let cancellation = h.services.reservations.cancel(lapsed.id, owner).await.unwrap();
    assert_eq!(cancellation.reservation.status, ReservationStatus::Cancelled);
    assert!(cancellation.promotion.is_none());
    assert_eq!(h.reservation_status(lapsed.id).await, ReservationStatus::Cancelled);
    assert_eq!(h.status(other_book).await, BookStatus::Available);

    let again = h.services.reservations.cancel(lapsed.id, owner).await.unwrap();
    assert_eq!(again.reservation.status, ReservationStatus::Cancelled);
    h.assert_invariants(other_book).await;
}

#[tokio::test]
#[ignore]
async fn test_sweep_rolls_back_failing_book_and_continues() {
    let h = harness().await;

    let (failing_book, failing_loan) = h.lent_book().await;
    let failing_member = h.member().await;
    let stuck = h
        .services
        .reservations
        .reserve(failing_book, failing_member)
        .await
        .unwrap();
    h.services.loans.checkin(failing_loan).await.unwrap();

    let (healthy_book, healthy_loan) = h.lent_book().await;
    let healthy_member = h.member().await;
    let lapsed = h
        .services
        .reservations
        .reserve(healthy_book, healthy_member)
        .await
        .unwrap();
    h.services.loans.checkin(healthy_loan).await.unwrap();

    h.expire_hold(stuck.id).await;
    h.expire_hold(lapsed.id).await;

    // make the expiry write fail for one book only
    let constraint = format!("reject_expiry_for_book_{}", failing_book);
    sqlx::query(&format!(
        "ALTER TABLE reservations ADD CONSTRAINT {} CHECK (book_id <> {} OR status <> 'expired') NOT VALID",
        constraint, failing_book
    ))
    .execute(&h.pool)
    .await
    .unwrap();

    let report = h.services.reservations.expire_stale().await;
    // read before the constraint goes, while no sweep can move this book
    let stuck_status = h.reservation_status(stuck.id).await;
    let failing_status = h.status(failing_book).await;

    sqlx::query(&format!("ALTER TABLE reservations DROP CONSTRAINT {}", constraint))
        .execute(&h.pool)
        .await
        .unwrap();

    let report = report.unwrap();
    assert!(report.failed_books.contains(&failing_book));
    assert!(!report.expired.contains(&stuck.id));
    assert_eq!(stuck_status, ReservationStatus::Notified);
    assert_eq!(failing_status, BookStatus::Reserved);

    assert!(!report.failed_books.contains(&healthy_book));
    assert!(report.expired.contains(&lapsed.id));
    assert!(report.released_books.contains(&healthy_book));
    assert_eq!(h.reservation_status(lapsed.id).await, ReservationStatus::Expired);
    assert_eq!(h.status(healthy_book).await, BookStatus::Available);

    h.assert_invariants(failing_book).await;
    h.assert_invariants(healthy_book).await;
}

#[tokio::test]
#[ignore]
async fn test_failed_notification_keeps_hold() {
    let h = harness_with(RecordingNotifier::failing()).await;
    let (book_id, loan_id) = h.lent_book().await;
    let member = h.member().await;
    let reservation = h.services.reservations.reserve(book_id, member).await.unwrap();

    let checkin = h.services.loans.checkin(loan_id).await.unwrap();
    assert_eq!(checkin.notifications.failed.len(), 1);
    assert_eq!(checkin.notifications.failed[0].reservation_id, reservation.id);

    assert!(!checkin.loan.is_open());
    assert_eq!(h.reservation_status(reservation.id).await, ReservationStatus::Notified);
    assert_eq!(h.status(book_id).await, BookStatus::Reserved);
}

#[tokio::test]
#[ignore]
async fn test_renewal_rules() {
    let h = harness().await;
    let (book_id, loan_id) = h.lent_book().await;

    let renewed = h.services.loans.renew(loan_id, None).await.unwrap();
    assert_eq!(renewed.renewals, 1);

    let member = h.member().await;
    h.services.reservations.reserve(book_id, member).await.unwrap();
    let err = h.services.loans.renew(loan_id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    h.services.loans.checkin(loan_id).await.unwrap();
    let err = h.services.loans.renew(loan_id, None).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyReturned(_)));
}
