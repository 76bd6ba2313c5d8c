//! Book model and circulation status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;

/// Circulation status of a book.
///
/// `Maintenance` and `Lost` are written by the catalog only; while one of them
/// is set, circulation neither derives nor overwrites the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Available,
    OnLoan,
    Reserved,
    Maintenance,
    Lost,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "available",
            BookStatus::OnLoan => "on_loan",
            BookStatus::Reserved => "reserved",
            BookStatus::Maintenance => "maintenance",
            BookStatus::Lost => "lost",
        }
    }

    /// Catalog-owned status that suppresses the circulation derivation
    pub fn is_override(&self) -> bool {
        matches!(self, BookStatus::Maintenance | BookStatus::Lost)
    }

    /// Status implied by the loan and reservation tables.
    pub fn derive(open_loan: bool, notified_hold: bool) -> Self {
        if open_loan {
            BookStatus::OnLoan
        } else if notified_hold {
            BookStatus::Reserved
        } else {
            BookStatus::Available
        }
    }
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(BookStatus::Available),
            "on_loan" => Ok(BookStatus::OnLoan),
            "reserved" => Ok(BookStatus::Reserved),
            "maintenance" => Ok(BookStatus::Maintenance),
            "lost" => Ok(BookStatus::Lost),
            _ => Err(format!("Invalid book status: {}", s)),
        }
    }
}

// SQLx conversion: stored as lowercase text
impl sqlx::Type<Postgres> for BookStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for BookStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: &str = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BookStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Book row. Title and existence are owned by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub status: BookStatus,
    pub updated_at: DateTime<Utc>,
}

/// A book read with `FOR UPDATE` inside an open transaction.
///
/// Only the books repository builds one, so holding a `LockedBook` means the
/// row lock is held until the transaction ends.
#[derive(Debug, Clone)]
pub struct LockedBook(Book);

impl LockedBook {
    pub(crate) fn new(book: Book) -> Self {
        Self(book)
    }

    pub fn id(&self) -> i32 {
        self.0.id
    }

    pub fn status(&self) -> BookStatus {
        self.0.status
    }
}
