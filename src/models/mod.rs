//! Data models for circulation

pub mod book;
pub mod loan;
pub mod member;
pub mod reservation;

// Re-export commonly used types
pub use book::{Book, BookStatus, LockedBook};
pub use loan::{Loan, LoanDetails, LoanStatus};
pub use member::{MemberClaims, MemberContact, Requester, Role};
pub use reservation::{QueueEntry, Reservation, ReservationStatus};
