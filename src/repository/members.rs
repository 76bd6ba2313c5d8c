//! Read-only access to member contact details

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::member::MemberContact,
};

#[derive(Clone)]
pub struct MembersRepository {
    pool: Pool<Postgres>,
}

impl MembersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn contact(&self, member_id: i32) -> AppResult<MemberContact> {
        sqlx::query_as::<_, MemberContact>(
            "SELECT id, email, display_name FROM members WHERE id = $1",
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", member_id)))
    }
}
