//! Member identity as supplied by the identity collaborator

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::AppError;

/// Contact details read from the member records projection
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemberContact {
    pub id: i32,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Role carried in the identity token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Librarian,
    Admin,
}

/// Who is asking, as far as the circulation core is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub member_id: i32,
    pub role: Role,
}

impl Requester {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// JWT claims issued by the identity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberClaims {
    pub sub: String,
    pub member_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl MemberClaims {
    /// Encode claims; used by tooling and tests, tokens are normally issued elsewhere
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn requester(&self) -> Requester {
        Requester {
            member_id: self.member_id,
            role: self.role,
        }
    }

    pub fn require_librarian(&self) -> Result<(), AppError> {
        if self.role >= Role::Librarian {
            Ok(())
        } else {
            Err(AppError::Authorization("Librarian role required".to_string()))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator role required".to_string()))
        }
    }

    /// Members act for themselves; staff act for anyone
    pub fn require_self_or_staff(&self, member_id: i32) -> Result<(), AppError> {
        if self.member_id == member_id || self.role >= Role::Librarian {
            Ok(())
        } else {
            Err(AppError::Authorization(format!(
                "Not allowed to act for member {}",
                member_id
            )))
        }
    }
}
