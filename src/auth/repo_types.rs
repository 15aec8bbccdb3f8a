use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Role stored in the `user_role` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRole {
    Patient,
    Doctor,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,              // unique user ID
    pub email: String,         // normalized to lowercase
    pub phone: Option<String>, // normalized to +971XXXXXXXXX
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub full_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool, // set once either contact channel confirms
    pub email_verified: bool,
    pub phone_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(skip_serializing, default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>, // soft-delete marker
}

/// Insert payload for a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub full_name: String,
    pub role: UserRole,
}

/// Which contact channel an OTP confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyChannel {
    Email,
    Phone,
}

impl VerifyChannel {
    /// Identifiers containing `@` are emails, everything else is a phone.
    pub fn for_identifier(identifier: &str) -> Self {
        if identifier.contains('@') {
            VerifyChannel::Email
        } else {
            VerifyChannel::Phone
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("phone already registered")]
    DuplicatePhone,
    #[error("emirates id already registered")]
    DuplicateEmiratesId,
    #[error("passport number already registered")]
    DuplicatePassport,
    #[error("database unavailable")]
    Unavailable(#[source] sqlx::Error),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // Unique violations carry the index name, which tells us which
        // field collided. The partial indexes ignore soft-deleted rows.
        let constraint = match &e {
            sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation => {
                db.constraint().map(str::to_owned)
            }
            _ => None,
        };
        match constraint.as_deref() {
            Some("users_email_live_idx") => StoreError::DuplicateEmail,
            Some("users_phone_live_idx") => StoreError::DuplicatePhone,
            Some("patients_emirates_id_live_idx") => StoreError::DuplicateEmiratesId,
            Some("patients_passport_live_idx") => StoreError::DuplicatePassport,
            _ => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                    StoreError::Unavailable(e)
                }
                other => StoreError::Database(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_follows_the_identifier_shape() {
        assert_eq!(
            VerifyChannel::for_identifier("a@b.com"),
            VerifyChannel::Email
        );
        assert_eq!(
            VerifyChannel::for_identifier("+971501234567"),
            VerifyChannel::Phone
        );
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&UserRole::Patient).unwrap(),
            "\"patient\""
        );
        assert_eq!(
            serde_json::from_str::<UserRole>("\"doctor\"").unwrap(),
            UserRole::Doctor
        );
    }
}
